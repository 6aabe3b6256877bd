use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use tokio::net::UnixListener;
use tracing::debug;

use crate::error::{Result, TransportError};

/// Capacity of `sockaddr_un.sun_path`: 108 bytes on Linux, 104 on the BSDs and macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// Removes the socket file on drop, but only if it is still the one we created.
pub(crate) struct SocketPathGuard {
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

pub(crate) fn bind(addr: &str) -> Result<(UnixListener, SocketPathGuard)> {
    let path = PathBuf::from(addr);

    let path_bytes = path.as_os_str().len();
    if path_bytes >= MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: addr.to_string(),
            len: path_bytes,
            max: MAX_PATH_LEN,
        });
    }

    // A leftover socket from a dead process is replaced; any other file is an error.
    if path.exists() {
        let metadata = std::fs::symlink_metadata(&path).map_err(|e| unix_bind_error(addr, e))?;
        if metadata.file_type().is_socket() {
            debug!(?path, "replacing stale socket file");
            std::fs::remove_file(&path).map_err(|e| unix_bind_error(addr, e))?;
        } else {
            return Err(unix_bind_error(
                addr,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                ),
            ));
        }
    }

    let listener = UnixListener::bind(&path).map_err(|e| unix_bind_error(addr, e))?;
    let created_inode = std::fs::symlink_metadata(&path)
        .ok()
        .map(|m| (m.dev(), m.ino()));

    Ok((
        listener,
        SocketPathGuard {
            path,
            created_inode,
        },
    ))
}

fn unix_bind_error(addr: &str, source: std::io::Error) -> TransportError {
    TransportError::Bind {
        network: "unix".to_string(),
        addr: addr.to_string(),
        source,
    }
}

impl SocketPathGuard {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketPathGuard {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(self.path()) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "removing socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::listener::StreamListener;
    use crate::network::Network;
    use crate::TransportError;

    fn temp_sock(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "muxwire-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("test.sock")
    }

    #[tokio::test]
    async fn socket_file_removed_on_drop() {
        let path = temp_sock("drop");
        let listener = StreamListener::bind(Network::Unix, path.to_str().unwrap())
            .await
            .unwrap();
        assert!(path.exists());
        drop(listener);
        assert!(!path.exists(), "socket file should be cleaned up on drop");
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn rejects_existing_regular_file() {
        let path = temp_sock("regular");
        std::fs::write(&path, b"regular-file").unwrap();
        let err = StreamListener::bind(Network::Unix, path.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn rejects_overlong_path() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let err = StreamListener::bind(Network::Unix, &long_path)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::PathTooLong { .. }));
    }
}
