//! Default locations for the store and the daemon socket.

use std::path::PathBuf;

/// Store under the XDG data directory, `~/.local/share/stash` on Linux.
pub fn default_store_dir() -> PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join("stash"),
        None => PathBuf::from(".stash"),
    }
}

/// Socket in the per-user runtime directory, with a per-uid /tmp
/// fallback for systems without one.
pub fn default_socket_path() -> PathBuf {
    match dirs::runtime_dir() {
        Some(dir) => dir.join("stash.sock"),
        None => {
            let uid = unsafe { libc::getuid() };
            std::env::temp_dir().join(format!("stash-{uid}.sock"))
        }
    }
}
