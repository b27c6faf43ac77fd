use crate::error::PersistError;
use crate::types::Index;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// On-disk home of the persisted index.
///
/// Saves are atomic at whole-index granularity: the blob is written to a
/// staging file beside its destination and renamed into place, so a reader or
/// a crash sees either the previous index file or the new one, never a
/// partial write.
pub struct IndexStorage {
    root: PathBuf,
}

impl IndexStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn index_file(&self) -> PathBuf {
        self.root.join("index.bin")
    }

    fn staging_file(&self) -> PathBuf {
        self.root.join("index.bin.tmp")
    }

    /// Persist a freshly built index, replacing any previous one.
    pub fn save(&self, index: &Index) -> Result<(), PersistError> {
        fs::create_dir_all(&self.root)?;
        let bytes = bincode::serialize(index)?;
        let staging = self.staging_file();
        let mut f = File::create(&staging)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
        fs::rename(&staging, self.index_file())?;
        Ok(())
    }

    /// Load the persisted index; `None` when none has been saved yet.
    pub fn load(&self) -> Result<Option<Index>, PersistError> {
        let mut f = match File::open(self.index_file()) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        Ok(Some(bincode::deserialize(&buf)?))
    }
}
