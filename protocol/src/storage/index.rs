//! # Block Index
//!
//! A rebuildable SQLite cache from block hash and block height to a
//! [`BlockLocation`] in the segment store.
//!
//! ```text
//! blocks(hash BLOB PRIMARY KEY, height INTEGER, file TEXT, offset INTEGER, length INTEGER)
//! idx_blocks_height ON blocks(height)
//! ```
//!
//! The index is never authoritative. Deleting the file and replaying
//! `enumerate_metadata(0)` through a bulk session reproduces the same rows.
//! Callers that need lookups to be complete compare
//! [`BlockIndex::total_indexed_count`] with the segment store's block count
//! first and ingest the missing suffix.
//!
//! ## Ingest Modes
//!
//! - **Incremental**: [`BlockIndex::add_block`]: one upsert on a short-lived
//!   connection. Used by the ledger writer after each append.
//! - **Bulk**: `begin_bulk_ingest` / `ingest_block` / `end_bulk_ingest`: one
//!   connection and one transaction across many upserts. Used for catch-up
//!   and rebuilds. Nothing is visible to readers until the commit.

use rusqlite::{params, OptionalExtension};
use std::path::{Path, PathBuf};

use super::block::BlockLocation;
use super::sqlite::{open_connection, remove_database_files, BulkSlot};
use crate::error::{LedgerError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    hash BLOB PRIMARY KEY,
    height INTEGER NOT NULL,
    file TEXT NOT NULL,
    offset INTEGER NOT NULL,
    length INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_blocks_height ON blocks(height);
"#;

const UPSERT: &str =
    "INSERT OR REPLACE INTO blocks (hash, height, file, offset, length) VALUES (?1, ?2, ?3, ?4, ?5)";

const SELECT_COLUMNS: &str = "SELECT hash, height, file, offset, length FROM blocks";

type RawRow = (Vec<u8>, i64, String, i64, i64);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_location((hash, height, file, offset, length): RawRow) -> Result<BlockLocation> {
    let hash: [u8; 32] = hash.as_slice().try_into().map_err(|_| {
        LedgerError::corrupt(format!("index row at height {height} has a {}-byte hash", hash.len()))
    })?;
    Ok(BlockLocation {
        hash,
        segment_file: file,
        height: height as u64,
        offset: offset as u64,
        length: length as u32,
    })
}

/// Hash/height → location cache backed by SQLite.
pub struct BlockIndex {
    path: PathBuf,
    bulk: BulkSlot,
}

impl BlockIndex {
    /// Open (creating if needed) the index at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        open_connection(&path)?.execute_batch(SCHEMA)?;
        Ok(Self {
            bulk: BulkSlot::new(path.clone(), "block index"),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Single-row upsert on its own connection.
    pub fn add_block(&self, location: &BlockLocation) -> Result<()> {
        self.bulk.ensure_idle()?;
        let conn = open_connection(&self.path)?;
        conn.execute(
            UPSERT,
            params![
                &location.hash[..],
                location.height as i64,
                location.segment_file,
                location.offset as i64,
                i64::from(location.length),
            ],
        )?;
        tracing::debug!(height = location.height, hash = %location.hash_hex(), "block indexed");
        Ok(())
    }

    pub fn begin_bulk_ingest(&self) -> Result<()> {
        self.bulk.begin()?;
        tracing::debug!(path = %self.path.display(), "block index bulk ingest started");
        Ok(())
    }

    /// Upsert inside the active bulk session.
    pub fn ingest_block(&self, location: &BlockLocation) -> Result<()> {
        self.bulk.with(|session| {
            session.conn().prepare_cached(UPSERT)?.execute(params![
                &location.hash[..],
                location.height as i64,
                location.segment_file,
                location.offset as i64,
                i64::from(location.length),
            ])?;
            session.rows += 1;
            Ok(())
        })
    }

    /// Commit the bulk session and release its connection.
    pub fn end_bulk_ingest(&self) -> Result<u64> {
        let rows = self.bulk.end()?;
        tracing::info!(rows, "block index bulk ingest committed");
        Ok(rows)
    }

    /// Discard the bulk session without committing.
    pub fn abort_bulk_ingest(&self) {
        self.bulk.abort();
    }

    pub fn lookup_by_hash(&self, hash: &[u8; 32]) -> Result<Option<BlockLocation>> {
        let conn = open_connection(&self.path)?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE hash = ?1"),
            params![&hash[..]],
            read_row,
        )
        .optional()?
        .map(into_location)
        .transpose()
    }

    pub fn lookup_by_height(&self, height: u64) -> Result<Option<BlockLocation>> {
        let conn = open_connection(&self.path)?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE height = ?1"),
            params![height as i64],
            read_row,
        )
        .optional()?
        .map(into_location)
        .transpose()
    }

    pub fn total_indexed_count(&self) -> Result<u64> {
        let conn = open_connection(&self.path)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Every row, ordered by height.
    pub fn locations(&self) -> Result<Vec<BlockLocation>> {
        let conn = open_connection(&self.path)?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY height"))?;
        let rows = stmt.query_map([], read_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(into_location(row?)?);
        }
        Ok(out)
    }

    /// Delete the index file and recreate an empty schema.
    pub fn reset(&self) -> Result<()> {
        self.bulk.ensure_idle()?;
        remove_database_files(&self.path)?;
        open_connection(&self.path)?.execute_batch(SCHEMA)?;
        tracing::info!(path = %self.path.display(), "block index reset");
        Ok(())
    }
}
