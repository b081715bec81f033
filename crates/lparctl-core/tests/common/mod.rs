//! Shared test infrastructure for lparctl-core integration tests.
//!
//! ```ignore
//! mod common;
//! use common::MemorySync;
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use lparctl_core::uuid_table::TableSync;
use lparctl_core::{Error, Result};

/// Remote side of the table kept in memory, counting transfers.
#[derive(Debug, Default)]
pub struct MemorySync {
    pub remote: HashMap<PathBuf, Vec<u8>>,
    pub pushes: usize,
    pub pulls: usize,
}

impl TableSync for MemorySync {
    fn push_table(&mut self, local: &Path, remote: &Path) -> Result<()> {
        let bytes = fs::read(local)?;
        self.remote.insert(remote.to_path_buf(), bytes);
        self.pushes += 1;
        Ok(())
    }

    fn pull_table(&mut self, remote: &Path, local: &Path) -> Result<()> {
        let bytes = self
            .remote
            .get(remote)
            .ok_or_else(|| Error::NotFound(remote.display().to_string()))?;
        fs::write(local, bytes)?;
        self.pulls += 1;
        Ok(())
    }
}
