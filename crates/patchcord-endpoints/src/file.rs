//! File endpoint: reads or writes a local file.

use std::fmt;

use async_trait::async_trait;
use patchcord_core::{Endpoint, EndpointCore, EndpointError, Seed};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum FileMode {
    Read,
    Write,
    Append,
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileMode::Read => write!(f, "read"),
            FileMode::Write => write!(f, "write"),
            FileMode::Append => write!(f, "append"),
        }
    }
}

/// Reads an existing file (`mode=read`, the default), truncates and writes
/// (`mode=write`), or appends (`mode=append`). As a sink it keeps the
/// pairing alive across producer end-of-stream; as a source it does not.
pub struct FileEndpoint {
    core: EndpointCore,
    path: String,
    mode: FileMode,
    file: Mutex<Option<File>>,
}

impl FileEndpoint {
    /// Build from a raw seed string.
    pub fn from_seed(seed: &str) -> Result<Self, EndpointError> {
        Self::new(Seed::parse(seed))
    }

    pub(crate) fn new(seed: Seed) -> Result<Self, EndpointError> {
        if seed.kind() != "file" {
            return Err(EndpointError::UnsupportedSeed(seed.kind().to_string()));
        }

        let mut path = String::new();
        let mut mode = FileMode::Read;
        for (key, value) in seed.options() {
            match key {
                "addr" => path = value.to_string(),
                "mode" => match value {
                    "" => {}
                    "read" => mode = FileMode::Read,
                    "write" => mode = FileMode::Write,
                    "append" => mode = FileMode::Append,
                    other => {
                        return Err(EndpointError::UnknownMode {
                            kind: seed.kind().to_string(),
                            mode: other.to_string(),
                        })
                    }
                },
                other => {
                    return Err(EndpointError::UnknownOption {
                        kind: seed.kind().to_string(),
                        key: other.to_string(),
                    })
                }
            }
        }
        if path.is_empty() {
            return Err(EndpointError::MissingName(seed.kind().to_string()));
        }

        Ok(Self {
            core: EndpointCore::new(seed),
            path,
            mode,
            file: Mutex::new(None),
        })
    }

    async fn open_file(&self) -> std::io::Result<File> {
        match self.mode {
            FileMode::Read => File::open(&self.path).await,
            FileMode::Write => File::create(&self.path).await,
            FileMode::Append => {
                OpenOptions::new()
                    .read(true)
                    .append(true)
                    .create(true)
                    .open(&self.path)
                    .await
            }
        }
    }
}

#[async_trait]
impl Endpoint for FileEndpoint {
    async fn up(&self) -> Result<(), EndpointError> {
        let _lifecycle = self.core.begin().await;
        if self.core.is_up() {
            return Ok(());
        }

        let file = self.open_file().await?;
        *self.file.lock().await = Some(file);
        self.core.set_up(true);
        info!(path = %self.path, mode = %self.mode, "opened file");
        Ok(())
    }

    async fn down(&self) -> Result<(), EndpointError> {
        let _lifecycle = self.core.begin().await;
        if !self.core.is_up() {
            return Ok(());
        }

        self.core.set_up(false);
        if let Some(mut file) = self.file.lock().await.take() {
            file.flush().await?;
        }
        Ok(())
    }

    async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.core.is_up() {
            debug!(endpoint = %self, "read: not up");
            return Ok(0);
        }
        if self.mode != FileMode::Read {
            // Nothing to read from a sink.
            return Ok(0);
        }

        match self.file.lock().await.as_mut() {
            Some(file) => {
                let n = file.read(buf).await?;
                debug!(endpoint = %self, bytes = n, "read");
                Ok(n)
            }
            None => Ok(0),
        }
    }

    async fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        if !self.core.is_up() {
            debug!(endpoint = %self, "write: not up");
            return Ok(0);
        }
        if self.mode == FileMode::Read {
            // Sources discard writes.
            return Ok(buf.len());
        }

        match self.file.lock().await.as_mut() {
            Some(file) => {
                file.write_all(buf).await?;
                debug!(endpoint = %self, bytes = buf.len(), "write");
                Ok(buf.len())
            }
            None => Ok(0),
        }
    }

    fn is_up(&self) -> bool {
        self.core.is_up()
    }

    fn keep_alive(&self) -> bool {
        match self.mode {
            FileMode::Write | FileMode::Append => self.core.is_up(),
            FileMode::Read => false,
        }
    }

    fn kind(&self) -> &str {
        self.core.kind()
    }
}

impl fmt::Display for FileEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.seed().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_name_is_rejected() {
        assert!(matches!(
            FileEndpoint::from_seed("file:"),
            Err(EndpointError::MissingName(_))
        ));
        assert!(matches!(
            FileEndpoint::from_seed("file"),
            Err(EndpointError::MissingName(_))
        ));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(matches!(
            FileEndpoint::from_seed("file:in,mode=asdf"),
            Err(EndpointError::UnknownMode { .. })
        ));
    }

    #[test]
    fn empty_mode_keeps_default() {
        let endpoint = FileEndpoint::from_seed("file:in,mode=").unwrap();
        assert_eq!(endpoint.mode, FileMode::Read);
    }

    #[test]
    fn unknown_option_is_rejected() {
        assert!(matches!(
            FileEndpoint::from_seed("file:in,asdf"),
            Err(EndpointError::UnknownOption { .. })
        ));
    }

    #[tokio::test]
    async fn read_mode_discards_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in");
        std::fs::write(&path, b"data").unwrap();

        let endpoint = FileEndpoint::from_seed(&format!("file:{}", path.display())).unwrap();
        endpoint.up().await.unwrap();
        assert_eq!(endpoint.write(b"dropped").await.unwrap(), 7);
        endpoint.down().await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"data");
    }

    #[tokio::test]
    async fn lifecycle_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");

        let endpoint =
            FileEndpoint::from_seed(&format!("file:{},mode=write", path.display())).unwrap();
        endpoint.up().await.unwrap();
        endpoint.up().await.unwrap();
        assert!(endpoint.is_up());

        endpoint.down().await.unwrap();
        endpoint.down().await.unwrap();
        assert!(!endpoint.is_up());

        // After down, both directions report end-of-stream.
        let mut buf = [0u8; 4];
        assert_eq!(endpoint.read(&mut buf).await.unwrap(), 0);
        assert_eq!(endpoint.write(b"x").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn down_after_failed_up_is_a_noop() {
        let endpoint = FileEndpoint::from_seed("file:/noexist/in").unwrap();
        assert!(endpoint.up().await.is_err());
        assert!(!endpoint.is_up());
        endpoint.down().await.unwrap();
    }
}
