//! Partition id ↔ UUID correspondence table.
//!
//! The console only knows small integer partition ids, which get reused when
//! a partition is recreated. This table invents a UUID for each partition the
//! first time it is seen and keeps it for good.
//!
//! The table is persisted as a flat sequence of [`RECORD_LEN`]-byte records
//! (little-endian `i32` id, then the 16 UUID bytes) with no header. The record
//! count is not stored; it comes from the live partition count observed at
//! [`UuidTable::init`]. A local copy is rewritten and pushed to the console
//! after every mutation so other clients see the same UUIDs.
//!
//! Removal tombstones entries (`id == -1`, nil UUID) in place; the table
//! never shrinks.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::inventory::LiveIds;

/// Size of one persisted record
pub const RECORD_LEN: usize = 4 + 16;

/// Id stored in a removed entry
pub const TOMBSTONE_ID: i32 = -1;

/// File transfer seam between the table and the console.
pub trait TableSync {
    /// Uploads the local table file, replacing the remote copy
    fn push_table(&mut self, local: &Path, remote: &Path) -> Result<()>;

    /// Downloads the remote copy; [`Error::NotFound`] when there is none
    fn pull_table(&mut self, remote: &Path, local: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Entry {
    pub id: i32,
    pub uuid: Uuid,
}

impl Entry {
    pub const fn new(id: i32, uuid: Uuid) -> Self {
        Self { id, uuid }
    }

    pub const fn tombstone() -> Self {
        Self {
            id: TOMBSTONE_ID,
            uuid: Uuid::nil(),
        }
    }

    pub const fn is_tombstone(&self) -> bool {
        self.id == TOMBSTONE_ID
    }
}

/// Serializes entries into the on-disk record format.
pub fn encode_entries(entries: &[Entry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * RECORD_LEN);
    for entry in entries {
        out.extend_from_slice(&entry.id.to_le_bytes());
        out.extend_from_slice(entry.uuid.as_bytes());
    }
    out
}

/// Reads the first `count` records from `bytes`.
///
/// Trailing bytes beyond `count` records are ignored. Fewer than `count`
/// complete records is a parse error.
pub fn decode_entries(bytes: &[u8], count: usize) -> Result<Vec<Entry>> {
    let needed = count
        .checked_mul(RECORD_LEN)
        .ok_or_else(|| Error::parse("record count overflows"))?;
    if bytes.len() < needed {
        return Err(Error::parse(format!(
            "table holds {} bytes, {count} records need {needed}",
            bytes.len()
        )));
    }
    let entries = bytes[..needed]
        .chunks_exact(RECORD_LEN)
        .map(|record| {
            let (id, uuid) = record.split_at(4);
            let id = i32::from_le_bytes([id[0], id[1], id[2], id[3]]);
            let uuid = Uuid::from_slice(uuid).map_err(|e| Error::parse(e.to_string()))?;
            Ok(Entry { id, uuid })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(entries)
}

/// Where the table lives on each side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePaths {
    pub local: PathBuf,
    pub remote: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Uninitialized,
    Initializing,
    Ready,
    Persisting,
}

#[derive(Debug)]
pub struct UuidTable {
    paths: TablePaths,
    entries: Vec<Entry>,
    issued: HashSet<Uuid>,
    state: TableState,
}

impl UuidTable {
    pub fn new(paths: TablePaths) -> Self {
        Self {
            paths,
            entries: Vec::new(),
            issued: HashSet::new(),
            state: TableState::Uninitialized,
        }
    }

    pub fn paths(&self) -> &TablePaths {
        &self.paths
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Loads or creates the table for the live partition set.
    ///
    /// On failure the table is left uninitialized and must not be used.
    pub fn init<S: TableSync + ?Sized>(&mut self, sync: &mut S, live: &LiveIds) -> Result<()> {
        self.state = TableState::Initializing;
        self.entries.clear();
        self.issued.clear();
        match self.load_or_create(sync, live) {
            Ok(()) => {
                self.state = TableState::Ready;
                Ok(())
            }
            Err(err) => {
                self.entries.clear();
                self.issued.clear();
                self.state = TableState::Uninitialized;
                Err(err)
            }
        }
    }

    fn load_or_create<S: TableSync + ?Sized>(&mut self, sync: &mut S, live: &LiveIds) -> Result<()> {
        let ids = live.reconcile()?;
        if ids.is_empty() {
            debug!("no live partitions, starting with an empty table");
            return Ok(());
        }

        self.ensure_local_dir()?;
        match sync.pull_table(&self.paths.remote, &self.paths.local) {
            Ok(()) => {
                let bytes = fs::read(&self.paths.local)?;
                if bytes.len() < ids.len() * RECORD_LEN {
                    return Err(Error::ShortTable {
                        records: bytes.len() / RECORD_LEN,
                        live: ids.len(),
                    });
                }
                if bytes.len() > ids.len() * RECORD_LEN {
                    warn!(
                        bytes = bytes.len(),
                        records = ids.len(),
                        "table file is longer than the live partition count"
                    );
                }
                self.entries = decode_entries(&bytes, ids.len())?;
                self.issued = self.entries.iter().map(|e| e.uuid).collect();
                info!(records = self.entries.len(), "loaded uuid table");
                Ok(())
            }
            Err(Error::NotFound(_)) => {
                for &id in ids {
                    let uuid = self.generate_uuid();
                    self.entries.push(Entry::new(id, uuid));
                }
                self.write_local()?;
                sync.push_table(&self.paths.local, &self.paths.remote)?;
                info!(records = self.entries.len(), "created uuid table");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// A fresh random UUID distinct from every UUID this table has issued.
    pub fn generate_uuid(&mut self) -> Uuid {
        loop {
            let candidate = Uuid::new_v4();
            if !candidate.is_nil() && self.issued.insert(candidate) {
                return candidate;
            }
        }
    }

    /// First live entry with this id; tombstones never match.
    pub fn lookup(&self, id: i32) -> Option<Uuid> {
        if id == TOMBSTONE_ID {
            return None;
        }
        self.entries.iter().find(|e| e.id == id).map(|e| e.uuid)
    }

    /// Appends an entry, then persists the whole table.
    ///
    /// Live entries already holding `id` are tombstoned first, so the new
    /// UUID is the one [`lookup`](Self::lookup) returns.
    pub fn add<S: TableSync + ?Sized>(&mut self, sync: &mut S, uuid: Uuid, id: i32) -> Result<()> {
        self.ensure_ready()?;
        if id < 0 {
            return Err(Error::InvalidPartitionId(id));
        }
        let replaced = self.tombstone(id);
        if replaced > 0 {
            debug!(id, replaced, "replacing existing table entry");
        }
        self.issued.insert(uuid);
        self.entries.push(Entry::new(id, uuid));
        self.persist(sync)
    }

    /// Tombstones every entry with this id, then persists the whole table.
    ///
    /// Returns how many entries were tombstoned; the table is persisted even
    /// when that is zero.
    pub fn remove<S: TableSync + ?Sized>(&mut self, sync: &mut S, id: i32) -> Result<usize> {
        self.ensure_ready()?;
        let removed = self.tombstone(id);
        self.persist(sync)?;
        Ok(removed)
    }

    fn tombstone(&mut self, id: i32) -> usize {
        if id == TOMBSTONE_ID {
            return 0;
        }
        let mut count = 0;
        for entry in self.entries.iter_mut().filter(|e| e.id == id) {
            *entry = Entry::tombstone();
            count += 1;
        }
        count
    }

    /// Rewrites the local file from memory.
    pub fn write_local(&self) -> Result<()> {
        self.ensure_local_dir()?;
        fs::write(&self.paths.local, encode_entries(&self.entries))?;
        Ok(())
    }

    fn ensure_local_dir(&self) -> Result<()> {
        if let Some(parent) = self.paths.local.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    fn persist<S: TableSync + ?Sized>(&mut self, sync: &mut S) -> Result<()> {
        self.state = TableState::Persisting;
        let result = self
            .write_local()
            .and_then(|()| sync.push_table(&self.paths.local, &self.paths.remote));
        self.state = TableState::Ready;
        if result.is_ok() {
            debug!(records = self.entries.len(), "persisted uuid table");
        }
        result
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            TableState::Ready => Ok(()),
            _ => Err(Error::TableNotReady),
        }
    }
}
