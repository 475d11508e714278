use std::path::PathBuf;

/// Configuration for a daemon instance.
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    /// Directory holding the keyspace and write spools.
    pub store_dir: PathBuf,
    /// Unix socket path to serve on.
    pub socket_path: PathBuf,
    /// Refuse zero-length payloads instead of recording tombstones.
    pub deny_empty: bool,
}

impl DaemonConfig {
    pub fn new(store_dir: impl Into<PathBuf>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            socket_path: socket_path.into(),
            deny_empty: false,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::new(".", "stash.sock")
    }
}
