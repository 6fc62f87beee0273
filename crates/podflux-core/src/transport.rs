// crates/podflux-core/src/transport.rs

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::config::{AppConfig, Protocol, RemoteConfig};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {host}:{port}: {message}")]
    Connect {
        host: String,
        port: u16,
        message: String,
    },

    #[error("authentication failed for {username}@{host}")]
    Auth { host: String, username: String },

    #[error("host key verification failed for {host}: {message}")]
    HostKey { host: String, message: String },

    #[error("{operation} '{path}' failed: {message}")]
    Io {
        operation: &'static str,
        path: String,
        message: String,
    },

    #[error("remote path '{0}' not found")]
    NotFound(String),

    #[error("remote '{remote}' cannot be opened: {reason}")]
    Unsupported { remote: String, reason: String },
}

/// A file in a POD directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub modified: Option<DateTime<Utc>>,
}

/// Read side of a remote session. Implementations release the session on drop.
pub trait RemoteSource {
    fn list_dirs(&self) -> Result<Vec<String>, TransportError>;
    fn list_files(&self, dir: &str) -> Result<Vec<RemoteEntry>, TransportError>;
    fn read(&self, dir: &str, name: &str) -> Result<Vec<u8>, TransportError>;
}

/// Write side of a remote session. Implementations release the session on drop.
pub trait RemoteDestination {
    fn write(&mut self, name: &str, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Opens sessions against named remotes.
pub trait Connector {
    fn open_source(&self, remote: &str) -> Result<Box<dyn RemoteSource>, TransportError>;
    fn open_destination(&self, remote: &str) -> Result<Box<dyn RemoteDestination>, TransportError>;
}

/// A directory on a mounted filesystem acting as a remote.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    root: PathBuf,
}

impl LocalDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn io_error(operation: &'static str, path: &Path, err: std::io::Error) -> TransportError {
    if err.kind() == ErrorKind::NotFound {
        TransportError::NotFound(path.display().to_string())
    } else {
        TransportError::Io {
            operation,
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl RemoteSource for LocalDirectory {
    fn list_dirs(&self) -> Result<Vec<String>, TransportError> {
        let entries = fs::read_dir(&self.root).map_err(|err| io_error("list", &self.root, err))?;
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_error("list", &self.root, err))?;
            let is_dir = entry
                .file_type()
                .map_err(|err| io_error("stat", &entry.path(), err))?
                .is_dir();
            if is_dir {
                dirs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn list_files(&self, dir: &str) -> Result<Vec<RemoteEntry>, TransportError> {
        let path = self.root.join(dir);
        let entries = fs::read_dir(&path).map_err(|err| io_error("list", &path, err))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_error("list", &path, err))?;
            let metadata = entry
                .metadata()
                .map_err(|err| io_error("stat", &entry.path(), err))?;
            if !metadata.is_file() {
                continue;
            }
            files.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    fn read(&self, dir: &str, name: &str) -> Result<Vec<u8>, TransportError> {
        let path = self.root.join(dir).join(name);
        fs::read(&path).map_err(|err| io_error("read", &path, err))
    }
}

impl RemoteDestination for LocalDirectory {
    fn write(&mut self, name: &str, bytes: &[u8]) -> Result<(), TransportError> {
        fs::create_dir_all(&self.root).map_err(|err| io_error("create", &self.root, err))?;
        let path = self.root.join(name);
        fs::write(&path, bytes).map_err(|err| io_error("write", &path, err))?;
        debug!(path = %path.display(), bytes = bytes.len(), "file written");
        Ok(())
    }
}

#[cfg(feature = "sftp")]
pub use sftp::SftpSession;

#[cfg(feature = "sftp")]
mod sftp {
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::path::PathBuf;

    use chrono::DateTime;
    use ssh2::{CheckResult, KnownHostFileKind, Session, Sftp};
    use tracing::{debug, info, warn};

    use super::{RemoteDestination, RemoteEntry, RemoteSource, TransportError};
    use crate::config::{RemoteConfig, Secret};

    /// One authenticated SFTP session, closed when dropped.
    pub struct SftpSession {
        host: String,
        root: PathBuf,
        session: Session,
        sftp: Sftp,
    }

    impl SftpSession {
        pub fn connect(remote: &RemoteConfig, password: &Secret) -> Result<Self, TransportError> {
            let connect_error = |message: String| TransportError::Connect {
                host: remote.host.clone(),
                port: remote.port,
                message,
            };

            let tcp = TcpStream::connect((remote.host.as_str(), remote.port))
                .map_err(|err| connect_error(err.to_string()))?;
            let mut session = Session::new().map_err(|err| connect_error(err.to_string()))?;
            session.set_tcp_stream(tcp);
            session
                .handshake()
                .map_err(|err| connect_error(err.to_string()))?;

            verify_host_key(&session, remote)?;

            let auth_error = || TransportError::Auth {
                host: remote.host.clone(),
                username: remote.username.clone(),
            };
            session
                .userauth_password(&remote.username, password.expose())
                .map_err(|_| auth_error())?;
            if !session.authenticated() {
                return Err(auth_error());
            }

            let sftp = session
                .sftp()
                .map_err(|err| connect_error(err.to_string()))?;
            info!(host = %remote.host, port = remote.port, "sftp session opened");

            Ok(Self {
                host: remote.host.clone(),
                root: remote.root.clone(),
                session,
                sftp,
            })
        }

        fn io_error(
            &self,
            operation: &'static str,
            path: &std::path::Path,
            err: ssh2::Error,
        ) -> TransportError {
            // LIBSSH2_FX_NO_SUCH_FILE
            if matches!(err.code(), ssh2::ErrorCode::SFTP(2)) {
                TransportError::NotFound(path.display().to_string())
            } else {
                TransportError::Io {
                    operation,
                    path: format!("{}:{}", self.host, path.display()),
                    message: err.message().to_string(),
                }
            }
        }
    }

    fn verify_host_key(session: &Session, remote: &RemoteConfig) -> Result<(), TransportError> {
        let host_key_error = |message: &str| TransportError::HostKey {
            host: remote.host.clone(),
            message: message.to_string(),
        };

        let Some(path) = &remote.known_hosts else {
            return Err(host_key_error("no known_hosts file configured"));
        };
        let mut known_hosts = session
            .known_hosts()
            .map_err(|err| host_key_error(err.message()))?;
        known_hosts
            .read_file(path, KnownHostFileKind::OpenSSH)
            .map_err(|err| host_key_error(err.message()))?;
        let (key, _) = session
            .host_key()
            .ok_or_else(|| host_key_error("server presented no host key"))?;

        match known_hosts.check_port(&remote.host, remote.port, key) {
            CheckResult::Match => Ok(()),
            CheckResult::NotFound => Err(host_key_error("host is not listed in known_hosts")),
            CheckResult::Mismatch => Err(host_key_error("host key does not match known_hosts")),
            CheckResult::Failure => Err(host_key_error("known_hosts check failed")),
        }
    }

    impl RemoteSource for SftpSession {
        fn list_dirs(&self) -> Result<Vec<String>, TransportError> {
            let entries = self
                .sftp
                .readdir(&self.root)
                .map_err(|err| self.io_error("list", &self.root, err))?;
            let mut dirs: Vec<String> = entries
                .into_iter()
                .filter(|(_, stat)| stat.is_dir())
                .filter_map(|(path, _)| {
                    path.file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                })
                .filter(|name| name != "." && name != "..")
                .collect();
            dirs.sort();
            Ok(dirs)
        }

        fn list_files(&self, dir: &str) -> Result<Vec<RemoteEntry>, TransportError> {
            let path = self.root.join(dir);
            let entries = self
                .sftp
                .readdir(&path)
                .map_err(|err| self.io_error("list", &path, err))?;
            let mut files: Vec<RemoteEntry> = entries
                .into_iter()
                .filter(|(_, stat)| stat.is_file())
                .filter_map(|(entry_path, stat)| {
                    let name = entry_path.file_name()?.to_string_lossy().into_owned();
                    let modified = stat
                        .mtime
                        .and_then(|secs| i64::try_from(secs).ok())
                        .and_then(|secs| DateTime::from_timestamp(secs, 0));
                    Some(RemoteEntry { name, modified })
                })
                .collect();
            files.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(files)
        }

        fn read(&self, dir: &str, name: &str) -> Result<Vec<u8>, TransportError> {
            let path = self.root.join(dir).join(name);
            let mut file = self
                .sftp
                .open(&path)
                .map_err(|err| self.io_error("open", &path, err))?;
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)
                .map_err(|err| TransportError::Io {
                    operation: "read",
                    path: format!("{}:{}", self.host, path.display()),
                    message: err.to_string(),
                })?;
            debug!(path = %path.display(), bytes = buffer.len(), "remote file read");
            Ok(buffer)
        }
    }

    impl RemoteDestination for SftpSession {
        fn write(&mut self, name: &str, bytes: &[u8]) -> Result<(), TransportError> {
            let path = self.root.join(name);
            let mut file = self
                .sftp
                .create(&path)
                .map_err(|err| self.io_error("create", &path, err))?;
            file.write_all(bytes).map_err(|err| TransportError::Io {
                operation: "write",
                path: format!("{}:{}", self.host, path.display()),
                message: err.to_string(),
            })?;
            info!(path = %path.display(), "Successfully created file");
            Ok(())
        }
    }

    impl Drop for SftpSession {
        fn drop(&mut self) {
            if let Err(err) = self.session.disconnect(None, "podflux session closed", None) {
                warn!(host = %self.host, error = %err, "sftp disconnect failed");
            } else {
                debug!(host = %self.host, "sftp session closed");
            }
        }
    }
}

/// Opens sessions for the remotes named in [`AppConfig`].
pub struct ConfiguredConnector<'a> {
    config: &'a AppConfig,
}

impl<'a> ConfiguredConnector<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self { config }
    }

    fn remote(&self, name: &str) -> Result<&'a RemoteConfig, TransportError> {
        self.config
            .remotes
            .get(name)
            .ok_or_else(|| TransportError::Unsupported {
                remote: name.to_string(),
                reason: "not configured".to_string(),
            })
    }

    #[cfg(feature = "sftp")]
    fn open_sftp(&self, name: &str, remote: &RemoteConfig) -> Result<SftpSession, TransportError> {
        let password = remote
            .resolve_password(name)
            .map_err(|_| TransportError::Auth {
                host: remote.host.clone(),
                username: remote.username.clone(),
            })?;
        SftpSession::connect(remote, &password)
    }
}

#[cfg(not(feature = "sftp"))]
fn sftp_disabled(name: &str) -> TransportError {
    TransportError::Unsupported {
        remote: name.to_string(),
        reason: "podflux was built without the `sftp` feature".to_string(),
    }
}

impl Connector for ConfiguredConnector<'_> {
    fn open_source(&self, remote: &str) -> Result<Box<dyn RemoteSource>, TransportError> {
        let config = self.remote(remote)?;
        match config.protocol {
            Protocol::Local => Ok(Box::new(LocalDirectory::new(config.root.clone()))),
            #[cfg(feature = "sftp")]
            Protocol::Sftp => Ok(Box::new(self.open_sftp(remote, config)?)),
            #[cfg(not(feature = "sftp"))]
            Protocol::Sftp => Err(sftp_disabled(remote)),
        }
    }

    fn open_destination(&self, remote: &str) -> Result<Box<dyn RemoteDestination>, TransportError> {
        let config = self.remote(remote)?;
        match config.protocol {
            Protocol::Local => Ok(Box::new(LocalDirectory::new(config.root.clone()))),
            #[cfg(feature = "sftp")]
            Protocol::Sftp => Ok(Box::new(self.open_sftp(remote, config)?)),
            #[cfg(not(feature = "sftp"))]
            Protocol::Sftp => Err(sftp_disabled(remote)),
        }
    }
}
