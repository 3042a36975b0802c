use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::CacheBackend;
use crate::error::CacheError;

/// Stores each key as one file under a base directory.
///
/// Keys are percent-encoded into file names, so `wardrobe:u1:garments` and
/// `wardrobe_u1_garments` never collide. Each write goes to its own uniquely
/// named temp file in the same directory, which is then renamed over the
/// target. A crash mid-write leaves the old value intact, and concurrent
/// writers of one key never share a temp file.
#[derive(Debug, Clone)]
pub struct FileCache {
    base: PathBuf,
}

impl FileCache {
    pub fn new(base: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let base = base.into();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{}.cache", encode_key(key)))
    }
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => out.push(byte as char),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

impl CacheBackend for FileCache {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CacheError::Io(err)),
        }
    }

    fn write(&self, key: &str, value: String) -> Result<(), CacheError> {
        let mut staged = NamedTempFile::new_in(&self.base)?;
        staged.write_all(value.as_bytes())?;
        staged
            .persist(self.path_for(key))
            .map_err(|err| CacheError::Io(err.error))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(CacheError::Io(err)),
        }
    }
}
