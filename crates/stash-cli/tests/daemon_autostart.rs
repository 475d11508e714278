//! End-to-end exercises of the connect-or-spawn path against the real
//! `stash` binary.
//!
//! Covers:
//! - First connection spawns a daemon and completes an exchange over it
//! - Later connections reuse the spawned daemon instead of starting another
//! - A child that never reports readiness trips the spawn timeout
//!
//! Spawned daemons are sent SIGTERM at the end of a test and are expected
//! to unlink their socket on the way out.

use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use stash_client::{ClientError, Dialer};
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

/// Pid of the daemon serving `socket`, found by scanning /proc for a
/// command line naming that socket path. The path lives in a fresh
/// temporary directory, so it identifies exactly one process.
fn daemon_pid(socket: &Path) -> Option<i32> {
    let needle = socket.as_os_str().as_bytes();
    for entry in std::fs::read_dir("/proc").ok()? {
        let Ok(entry) = entry else { continue };
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() else {
            continue;
        };
        let Ok(cmdline) = std::fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        if cmdline.windows(needle.len()).any(|w| w == needle) {
            return Some(pid);
        }
    }
    None
}

/// Terminate the daemon serving `socket` and wait for it to unlink the
/// socket file, which it only does on a clean shutdown.
async fn terminate_daemon(socket: &Path) {
    let pid = daemon_pid(socket).expect("no daemon process found for socket");
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    for _ in 0..100 {
        if !socket.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("daemon kept its socket after SIGTERM");
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn connect_spawns_a_daemon_and_later_dials_reuse_it() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store");
    let socket = dir.path().join("stash.sock");

    // Nothing is listening yet, so this connect must spawn the daemon.
    let mut client = Dialer::new(&store, &socket)
        .program(env!("CARGO_BIN_EXE_stash"))
        .connect()
        .await
        .unwrap();
    let receipt = client.set_bytes("ci/token", b"s3cret").await.unwrap();
    assert_eq!(receipt.revision, 1);

    // A dialer whose program cannot run can only succeed by reusing the
    // daemon the first call left behind.
    let mut second = Dialer::new(&store, &socket)
        .program("/nonexistent/stash")
        .connect()
        .await
        .unwrap();
    let (payload, meta) = second.get_bytes("ci/token", None).await.unwrap();
    assert_eq!(payload, b"s3cret");
    assert_eq!(meta.digest, receipt.digest);

    drop(client);
    drop(second);
    terminate_daemon(&socket).await;
}

#[tokio::test]
async fn child_that_never_reports_ready_trips_the_spawn_timeout() {
    let dir = TempDir::new().unwrap();

    // A helper that ignores its arguments, stays alive, and never prints
    // the readiness line, so only the spawn timeout can end the wait.
    let helper = dir.path().join("never-ready.sh");
    std::fs::write(&helper, "#!/bin/sh\nexec sleep 60\n").unwrap();
    let mut perms = std::fs::metadata(&helper).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&helper, perms).unwrap();

    let result = Dialer::new(dir.path().join("store"), dir.path().join("stash.sock"))
        .program(&helper)
        .spawn_timeout(Duration::from_millis(200))
        .connect()
        .await;

    match result {
        Err(ClientError::DaemonStart(message)) => {
            assert!(message.contains("not ready"), "unexpected message: {message}");
        }
        Ok(_) => panic!("connect succeeded without a daemon"),
        Err(other) => panic!("expected a start failure, got {other}"),
    }
}
