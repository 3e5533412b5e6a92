use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

/// Filesystem half of the storage core. Locators are opaque names handed
/// out by `FileStore`; nothing user-supplied ever reaches a path here.
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, locator: &str) -> PathBuf {
        self.root.join(locator)
    }

    /// Creates the file, failing if the locator already exists. Locators
    /// are random so a collision means something is badly wrong.
    pub fn write_new(&self, locator: &str, bytes: &[u8]) -> io::Result<()> {
        let mut f = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path_for(locator))?;
        f.write_all(bytes)
    }

    pub fn read_all(&self, locator: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path_for(locator))
    }

    /// Ok(false) when the bytes were already gone; Err only for a real
    /// IO failure.
    pub fn remove_if_exists(&self, locator: &str) -> io::Result<bool> {
        match fs::remove_file(self.path_for(locator)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
