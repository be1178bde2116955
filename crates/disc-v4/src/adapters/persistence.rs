use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::domain::NodeRecord;
use crate::ports::{NodeStore, StoreError};

/// Node table snapshot kept as a JSON array of records.
///
/// A missing file loads as an empty table. Saving writes a sibling
/// temporary file and renames it over the old snapshot.
#[derive(Debug, Clone)]
pub struct JsonNodeStore {
    path: PathBuf,
}

impl JsonNodeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, err: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            error: err.to_string(),
        }
    }
}

impl NodeStore for JsonNodeStore {
    fn load(&self) -> Result<Vec<NodeRecord>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.io_error(err)),
        };
        serde_json::from_str(&content).map_err(|e| StoreError::Format(e.to_string()))
    }

    fn save(&self, records: &[NodeRecord]) -> Result<(), StoreError> {
        let json =
            serde_json::to_string_pretty(records).map_err(|e| StoreError::Format(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}
