//! Built-in interfaces
//!
//! - `none.Null` - for devices that need no bus
//! - `file.TextFile` - line-oriented text source: a serial tty, a sysfs
//!   attribute or a 1-wire `w1_slave` file

use super::{config_str, Interface};
use crate::config::CapabilitySpec;
use crate::error::{CapabilityError, RegistryError};
use async_trait::async_trait;
use std::any::Any;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Interface for devices that sample without a bus
#[derive(Debug, Default)]
pub struct NullInterface;

#[async_trait]
impl Interface for NullInterface {
    async fn initialise(&self) -> Result<(), CapabilityError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Text source read through the filesystem.
///
/// Snapshot files (sysfs, 1-wire) are re-read whole on every
/// [`read_all`](TextFile::read_all). Streams (a serial tty) keep one open
/// reader and hand out a line per [`read_line`](TextFile::read_line).
pub struct TextFile {
    path: PathBuf,
    reader: Arc<Mutex<Option<BufReader<File>>>>,
}

impl TextFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        let path = config_str(spec, "path")?.ok_or_else(|| RegistryError::InvalidConfig {
            module: spec.module.clone(),
            class: spec.class.clone(),
            message: "missing config 'path'".to_string(),
        })?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole current content of the file
    pub async fn read_all(&self) -> Result<String, CapabilityError> {
        let path = self.path.clone();
        blocking(move || {
            std::fs::read_to_string(&path)
                .map_err(|e| CapabilityError::new(format!("{}: {}", path.display(), e)))
        })
        .await
    }

    /// Next line from the stream, without the line terminator.
    ///
    /// End of file resets the reader so a rotated or reopened file is
    /// picked up on the next call.
    pub async fn read_line(&self) -> Result<String, CapabilityError> {
        let path = self.path.clone();
        let reader = Arc::clone(&self.reader);
        blocking(move || next_line(&path, &reader)).await
    }
}

/// Run `read` on tokio's blocking pool
async fn blocking<T, F>(read: F) -> Result<T, CapabilityError>
where
    F: FnOnce() -> Result<T, CapabilityError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(read)
        .await
        .map_err(|e| CapabilityError::new(format!("read task failed: {}", e)))?
}

fn next_line(
    path: &Path,
    reader: &Mutex<Option<BufReader<File>>>,
) -> Result<String, CapabilityError> {
    let mut guard = reader
        .lock()
        .map_err(|_| CapabilityError::new("text file reader poisoned"))?;

    if guard.is_none() {
        let file = File::open(path)
            .map_err(|e| CapabilityError::new(format!("{}: {}", path.display(), e)))?;
        *guard = Some(BufReader::new(file));
    }

    let mut line = String::new();
    let read = match guard.as_mut() {
        Some(reader) => reader.read_line(&mut line)?,
        None => 0,
    };
    if read == 0 {
        *guard = None;
        return Err(CapabilityError::new(format!(
            "{}: end of stream",
            path.display()
        )));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[async_trait]
impl Interface for TextFile {
    async fn initialise(&self) -> Result<(), CapabilityError> {
        if self.path.exists() {
            tracing::info!("Text interface ready at {}", self.path.display());
            Ok(())
        } else {
            Err(CapabilityError::new(format!(
                "{} does not exist",
                self.path.display()
            )))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
