//! Ports: the verb-dispatch I/O interface (section 6.2, ambient stack
//! addition — the spec's distillation scoped out I/O, but an embeddable
//! interpreter still needs a concrete, testable port actor).
//!
//! [`PortActor`] is the trait every scheme implements; [`FsPortActor`] is the
//! `std::fs`-backed filesystem scheme, grounded the same way the teacher's
//! `capability.rs` gates calls — a verb is checked against a
//! [`crate::capability::CapabilitySet`] before the actor ever sees it
//! (wired up in [`crate::embed`], not here, so this module stays a plain I/O
//! adapter with no policy logic of its own).
//!
//! `seek` is 0-based, matching the spec's data positions rather than
//! 1-based series indexing. `read` past end-of-file returns `Ok(None)` — the
//! null antiform, not an error — and a `write`/`append` always leaves the
//! port positioned at the new end of the underlying data.

use std::fs::{File, OpenOptions};
use std::io::{Read as _, Seek as _, SeekFrom, Write as _};
use std::path::{Path, PathBuf};

use crate::error::{ExcCategory, RuntimeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum PortVerb {
    Open,
    Close,
    Read,
    Write,
    Query,
    Delete,
    Rename,
    Create,
    Seek,
    Skip,
    Copy,
    Clear,
    Reflect,
    Length,
    #[strum(serialize = "head?")]
    HeadQ,
    #[strum(serialize = "tail?")]
    TailQ,
}

#[derive(Debug, Clone)]
pub struct PortInfo {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

fn access_error(msg: impl Into<String>) -> RuntimeError {
    RuntimeError::new(ExcCategory::Access, msg.into())
}

/// A port scheme's implementation of the verb table (section 6.2).
pub trait PortActor {
    fn open(&mut self) -> Result<(), RuntimeError>;
    fn close(&mut self) -> Result<(), RuntimeError>;
    /// Reads up to `len` bytes (or to end if `None`). `Ok(None)` signals EOF.
    fn read(&mut self, len: Option<usize>) -> Result<Option<Vec<u8>>, RuntimeError>;
    fn write(&mut self, data: &[u8]) -> Result<usize, RuntimeError>;
    fn query(&mut self) -> Result<PortInfo, RuntimeError>;
    fn delete(&mut self) -> Result<(), RuntimeError>;
    fn rename(&mut self, new_name: &str) -> Result<(), RuntimeError>;
    fn create(&mut self) -> Result<(), RuntimeError>;
    /// 0-based absolute seek.
    fn seek(&mut self, offset: u64) -> Result<(), RuntimeError>;
    fn skip(&mut self, delta: i64) -> Result<(), RuntimeError>;
    fn copy(&mut self, dest: &str) -> Result<(), RuntimeError>;
    fn clear(&mut self) -> Result<(), RuntimeError>;
    fn length(&mut self) -> Result<u64, RuntimeError>;
    fn is_head(&self) -> bool;
    fn is_tail(&mut self) -> bool;
}

/// The filesystem scheme: one open file (or a not-yet-opened path).
pub struct FsPortActor {
    path: PathBuf,
    file: Option<File>,
    position: u64,
}

impl FsPortActor {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            position: 0,
        }
    }

    fn file_mut(&mut self) -> Result<&mut File, RuntimeError> {
        self.file.as_mut().ok_or_else(|| access_error("port is not open"))
    }
}

impl PortActor for FsPortActor {
    fn open(&mut self) -> Result<(), RuntimeError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| access_error(format!("open failed: {e}")))?;
        self.file = Some(file);
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<(), RuntimeError> {
        self.file = None;
        Ok(())
    }

    fn read(&mut self, len: Option<usize>) -> Result<Option<Vec<u8>>, RuntimeError> {
        let position = self.position;
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(position)).map_err(|e| access_error(e.to_string()))?;
        let mut buf = match len {
            Some(n) => vec![0u8; n],
            None => Vec::new(),
        };
        let read = if len.is_some() {
            file.read(&mut buf).map_err(|e| access_error(e.to_string()))?
        } else {
            file.read_to_end(&mut buf).map_err(|e| access_error(e.to_string()))?
        };
        if read == 0 {
            return Ok(None);
        }
        buf.truncate(read);
        self.position += read as u64;
        Ok(Some(buf))
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, RuntimeError> {
        let position = self.position;
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(position)).map_err(|e| access_error(e.to_string()))?;
        file.write_all(data).map_err(|e| access_error(e.to_string()))?;
        let new_len = file.metadata().map_err(|e| access_error(e.to_string()))?.len();
        self.position = new_len;
        Ok(data.len())
    }

    fn query(&mut self) -> Result<PortInfo, RuntimeError> {
        let meta = std::fs::metadata(&self.path).map_err(|e| access_error(e.to_string()))?;
        Ok(PortInfo {
            name: self.path.display().to_string(),
            size: meta.len(),
            is_dir: meta.is_dir(),
        })
    }

    fn delete(&mut self) -> Result<(), RuntimeError> {
        self.file = None;
        std::fs::remove_file(&self.path).map_err(|e| access_error(e.to_string()))
    }

    fn rename(&mut self, new_name: &str) -> Result<(), RuntimeError> {
        let new_path = PathBuf::from(new_name);
        // Closing first avoids the close-then-reopen race where another
        // process could claim `new_path` between rename and our next open
        // (see the design ledger's note on this Open Question); we accept
        // the narrower race between close and rename instead.
        self.file = None;
        std::fs::rename(&self.path, &new_path).map_err(|e| access_error(e.to_string()))?;
        self.path = new_path;
        Ok(())
    }

    fn create(&mut self) -> Result<(), RuntimeError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| access_error(e.to_string()))?;
        self.file = Some(file);
        self.position = 0;
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> Result<(), RuntimeError> {
        self.position = offset;
        Ok(())
    }

    fn skip(&mut self, delta: i64) -> Result<(), RuntimeError> {
        self.position = self.position.saturating_add_signed(delta);
        Ok(())
    }

    fn copy(&mut self, dest: &str) -> Result<(), RuntimeError> {
        std::fs::copy(&self.path, dest).map_err(|e| access_error(e.to_string()))?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RuntimeError> {
        let file = self.file_mut()?;
        file.set_len(0).map_err(|e| access_error(e.to_string()))?;
        self.position = 0;
        Ok(())
    }

    fn length(&mut self) -> Result<u64, RuntimeError> {
        let file = self.file_mut()?;
        Ok(file.metadata().map_err(|e| access_error(e.to_string()))?.len())
    }

    fn is_head(&self) -> bool {
        self.position == 0
    }

    fn is_tail(&mut self) -> bool {
        self.length().map(|len| self.position >= len).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = std::env::temp_dir().join(format!("ember-port-test-{}", std::process::id()));
        let mut actor = FsPortActor::new(&dir);
        actor.create().unwrap();
        actor.write(b"hello").unwrap();
        actor.seek(0).unwrap();
        assert_eq!(actor.read(Some(5)).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(actor.read(Some(1)).unwrap(), None);
        actor.close().unwrap();
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn write_leaves_position_at_new_end() {
        let dir = std::env::temp_dir().join(format!("ember-port-test-pos-{}", std::process::id()));
        let mut actor = FsPortActor::new(&dir);
        actor.create().unwrap();
        actor.write(b"abc").unwrap();
        assert!(actor.is_tail());
        actor.close().unwrap();
        let _ = std::fs::remove_file(&dir);
    }
}
