// lake_exporter - Prometheus metrics exporter for wassertemperatur.org
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::record::LakeRecord;
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum StoreError {
    Io(PathBuf, io::Error),
    Format(PathBuf, serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "unable to access {}: {}", path.display(), e),
            Self::Format(path, e) => write!(f, "invalid lake state in {}: {}", path.display(), e),
        }
    }
}

impl error::Error for StoreError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(_, e) => Some(e),
            Self::Format(_, e) => Some(e),
        }
    }
}

/// Persisted configuration for a single lake.
///
/// `lake_id` is the key of the entry and stays the same when the entry is pointed at a
/// different URL. The name and ID are only used for display when there isn't any live
/// data for the lake.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LakeEntry {
    pub lake_url: String,
    pub lake_name: String,
    pub lake_id: String,
}

impl From<&LakeRecord> for LakeEntry {
    fn from(record: &LakeRecord) -> Self {
        LakeEntry {
            lake_url: record.lake_url.clone(),
            lake_name: record.lake_name.clone(),
            lake_id: record.lake_id.clone(),
        }
    }
}

/// JSON file holding all configured lakes.
#[derive(Debug, Clone)]
pub struct EntryStore {
    path: PathBuf,
}

impl EntryStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        EntryStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all entries, an empty list if the file doesn't exist yet.
    pub async fn load(&self) -> Result<Vec<LakeEntry>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(self.path.clone(), e)),
        };

        serde_json::from_slice(&bytes).map_err(|e| StoreError::Format(self.path.clone(), e))
    }

    /// Replace the contents of the file with `entries`.
    ///
    /// Entries are written to a temporary file that is then renamed over the existing
    /// one so a partially written file is never visible.
    pub async fn save(&self, entries: &[LakeEntry]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|e| StoreError::Format(self.path.clone(), e))?;
        let tmp = self.path.with_extension("tmp");

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::Io(tmp.clone(), e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Io(self.path.clone(), e))?;

        tracing::debug!(message = "saved lake state", path = %self.path.display(), entries = entries.len());
        Ok(())
    }
}
