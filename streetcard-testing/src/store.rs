use std::{
    fs, io,
    path::{Path, PathBuf},
};

use streetcard_logic::{CardStore, PersistenceError};

/// [CardStore] keeping one file per key in a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl CardStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        match fs::read(self.key_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(why) if why.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(why) => Err(PersistenceError(why.to_string())),
        }
    }

    fn write(&self, key: &str, bytes: Vec<u8>) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir).map_err(|why| PersistenceError(why.to_string()))?;
        fs::write(self.key_path(key), bytes).map_err(|why| PersistenceError(why.to_string()))
    }
}
