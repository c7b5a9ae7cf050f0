//! SQLite tables behind the ownership projector.
//!
//! ```text
//! CardOwnership(CardHash TEXT PRIMARY KEY, OwnerPublicKey BLOB NOT NULL)
//! OwnershipCheckpoint(Id INTEGER PRIMARY KEY CHECK (Id = 1), BlockIndex INTEGER NOT NULL)
//! CardLock(CardHash TEXT PRIMARY KEY, BlockIndex INTEGER NOT NULL, TransactionId TEXT NOT NULL)
//! ```
//!
//! Card hashes are stored hex-encoded. `CardOwnership` and the checkpoint
//! change only inside a bulk session, so a crash mid catch-up rolls both
//! back together. Locks are written one row at a time.

use rusqlite::{params, OptionalExtension};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::storage::sqlite::{open_connection, remove_database_files, BulkSlot};
use crate::transaction::{CardHash, Transaction};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS CardOwnership (
    CardHash TEXT PRIMARY KEY,
    OwnerPublicKey BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS OwnershipCheckpoint (
    Id INTEGER PRIMARY KEY CHECK (Id = 1),
    BlockIndex INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS CardLock (
    CardHash TEXT PRIMARY KEY,
    BlockIndex INTEGER NOT NULL,
    TransactionId TEXT NOT NULL
);
"#;

const UPSERT_OWNER: &str = "INSERT INTO CardOwnership (CardHash, OwnerPublicKey) VALUES (?1, ?2) \
     ON CONFLICT(CardHash) DO UPDATE SET OwnerPublicKey = excluded.OwnerPublicKey";

const TRANSFER_OWNER: &str = "UPDATE CardOwnership SET OwnerPublicKey = ?2 WHERE CardHash = ?1";

const UPSERT_CHECKPOINT: &str = "INSERT INTO OwnershipCheckpoint (Id, BlockIndex) VALUES (1, ?1) \
     ON CONFLICT(Id) DO UPDATE SET BlockIndex = excluded.BlockIndex";

/// A card referenced by a transaction that is not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    pub card_hash: CardHash,
    pub height: u64,
    pub transaction_id: String,
}

fn parse_card_hex(raw: &str) -> Option<CardHash> {
    hex::decode(raw).ok()?.try_into().ok()
}

pub struct OwnershipStore {
    path: PathBuf,
    bulk: BulkSlot,
}

impl OwnershipStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        open_connection(&path)?.execute_batch(SCHEMA)?;
        Ok(Self {
            bulk: BulkSlot::new(path.clone(), "ownership store"),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Confirmed owner of `card`, if it was ever minted.
    pub fn get_owner(&self, card: &CardHash) -> Result<Option<Vec<u8>>> {
        let conn = open_connection(&self.path)?;
        Ok(conn
            .query_row(
                "SELECT OwnerPublicKey FROM CardOwnership WHERE CardHash = ?1",
                params![hex::encode(card)],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Highest fully applied height; `None` before the first catch-up.
    pub fn checkpoint(&self) -> Result<Option<u64>> {
        let conn = open_connection(&self.path)?;
        let height: Option<i64> = conn
            .query_row(
                "SELECT BlockIndex FROM OwnershipCheckpoint WHERE Id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(height.map(|h| h as u64))
    }

    pub fn owned_card_count(&self) -> Result<u64> {
        let conn = open_connection(&self.path)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM CardOwnership", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// All `(card, owner)` rows sorted by card.
    pub fn ownership_rows(&self) -> Result<Vec<(CardHash, Vec<u8>)>> {
        let conn = open_connection(&self.path)?;
        let mut stmt =
            conn.prepare("SELECT CardHash, OwnerPublicKey FROM CardOwnership ORDER BY CardHash")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            let (card, owner) = row?;
            if let Some(card) = parse_card_hex(&card) {
                out.push((card, owner));
            }
        }
        Ok(out)
    }

    pub fn lock_for(&self, card: &CardHash) -> Result<Option<LockEntry>> {
        let conn = open_connection(&self.path)?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT BlockIndex, TransactionId FROM CardLock WHERE CardHash = ?1",
                params![hex::encode(card)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(height, transaction_id)| LockEntry {
            card_hash: *card,
            height: height as u64,
            transaction_id,
        }))
    }

    /// Every lock, ordered by height.
    pub fn locks(&self) -> Result<Vec<LockEntry>> {
        let conn = open_connection(&self.path)?;
        let mut stmt = conn.prepare(
            "SELECT CardHash, BlockIndex, TransactionId FROM CardLock ORDER BY BlockIndex, CardHash",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (card, height, transaction_id) = row?;
            if let Some(card_hash) = parse_card_hex(&card) {
                out.push(LockEntry {
                    card_hash,
                    height: height as u64,
                    transaction_id,
                });
            }
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------------

    pub fn lock_card(&self, card: &CardHash, height: u64, transaction_id: &str) -> Result<()> {
        self.bulk.ensure_idle()?;
        open_connection(&self.path)?.execute(
            "INSERT INTO CardLock (CardHash, BlockIndex, TransactionId) VALUES (?1, ?2, ?3) \
             ON CONFLICT(CardHash) DO UPDATE SET BlockIndex = excluded.BlockIndex, \
             TransactionId = excluded.TransactionId",
            params![hex::encode(card), height as i64, transaction_id],
        )?;
        tracing::debug!(card = %hex::encode(card), height, "card locked");
        Ok(())
    }

    pub fn unlock_card(&self, card: &CardHash) -> Result<()> {
        self.bulk.ensure_idle()?;
        open_connection(&self.path)?.execute(
            "DELETE FROM CardLock WHERE CardHash = ?1",
            params![hex::encode(card)],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Bulk Session
    // -----------------------------------------------------------------------

    pub fn begin_bulk(&self) -> Result<()> {
        self.bulk.begin()
    }

    /// Apply the ownership effect of `tx` inside the bulk session.
    ///
    /// A mint sets the owner outright. A trade moves each card to the
    /// counterparty; a card with no ownership row is left alone.
    pub fn apply_transaction(&self, tx: &Transaction) -> Result<()> {
        self.bulk.with(|session| {
            let conn = session.conn();
            match tx {
                Transaction::Mint(m) => {
                    conn.prepare_cached(UPSERT_OWNER)?
                        .execute(params![hex::encode(m.card_hash), m.recipient_key])?;
                    session.rows += 1;
                }
                Transaction::Trade(t) => {
                    let moves = t
                        .cards_from_user1
                        .iter()
                        .map(|card| (card, &t.user2_key))
                        .chain(t.cards_from_user2.iter().map(|card| (card, &t.user1_key)));
                    let mut rows = 0;
                    for (card, new_owner) in moves {
                        let changed = conn
                            .prepare_cached(TRANSFER_OWNER)?
                            .execute(params![hex::encode(card), new_owner])?;
                        if changed == 0 {
                            tracing::warn!(card = %hex::encode(card), "trade references unminted card");
                        }
                        rows += changed as u64;
                    }
                    session.rows += rows;
                }
            }
            Ok(())
        })
    }

    /// Record `height` as fully applied, inside the bulk session.
    pub fn set_checkpoint(&self, height: u64) -> Result<()> {
        self.bulk.with(|session| {
            session
                .conn()
                .prepare_cached(UPSERT_CHECKPOINT)?
                .execute(params![height as i64])?;
            Ok(())
        })
    }

    /// Drop locks at or below `height`, inside the bulk session.
    pub fn clear_locks_through(&self, height: u64) -> Result<u64> {
        self.bulk.with(|session| {
            let removed = session
                .conn()
                .execute("DELETE FROM CardLock WHERE BlockIndex <= ?1", params![height as i64])?;
            Ok(removed as u64)
        })
    }

    pub fn end_bulk(&self) -> Result<u64> {
        self.bulk.end()
    }

    pub fn abort_bulk(&self) {
        self.bulk.abort();
    }

    /// Delete the database and recreate an empty schema.
    pub fn reset(&self) -> Result<()> {
        self.bulk.ensure_idle()?;
        remove_database_files(&self.path)?;
        open_connection(&self.path)?.execute_batch(SCHEMA)?;
        tracing::info!(path = %self.path.display(), "ownership store reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transaction::{MintTransaction, Timestamp, TradeSignatures, TradeTransaction};

    fn store(dir: &Path) -> OwnershipStore {
        OwnershipStore::open(dir.join("ownership.sqlite")).unwrap()
    }

    fn mint(card: CardHash, to: &[u8]) -> Transaction {
        Transaction::Mint(MintTransaction {
            authority_key: vec![1; 33],
            recipient_key: to.to_vec(),
            card_hash: card,
            timestamp: Timestamp::from_ticks(0),
            authority_signature: Some(vec![0; 64]),
        })
    }

    fn trade(u1: &[u8], u2: &[u8], from1: Vec<CardHash>, from2: Vec<CardHash>) -> Transaction {
        Transaction::Trade(TradeTransaction {
            user1_key: u1.to_vec(),
            user2_key: u2.to_vec(),
            cards_from_user1: from1,
            cards_from_user2: from2,
            timestamp: Timestamp::from_ticks(0),
            signatures: TradeSignatures::default(),
        })
    }

    #[test]
    fn empty_store_has_no_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert_eq!(store.checkpoint().unwrap(), None);
        assert_eq!(store.get_owner(&[1; 32]).unwrap(), None);
    }

    #[test]
    fn mint_then_trade_moves_cards() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.begin_bulk().unwrap();
        store.apply_transaction(&mint([1; 32], b"alice")).unwrap();
        store.apply_transaction(&mint([2; 32], b"bob")).unwrap();
        store
            .apply_transaction(&trade(b"alice", b"bob", vec![[1; 32]], vec![[2; 32]]))
            .unwrap();
        store.set_checkpoint(3).unwrap();
        store.end_bulk().unwrap();

        assert_eq!(store.get_owner(&[1; 32]).unwrap().as_deref(), Some(&b"bob"[..]));
        assert_eq!(store.get_owner(&[2; 32]).unwrap().as_deref(), Some(&b"alice"[..]));
        assert_eq!(store.checkpoint().unwrap(), Some(3));
        assert_eq!(store.owned_card_count().unwrap(), 2);
    }

    #[test]
    fn trade_of_unminted_card_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.begin_bulk().unwrap();
        store
            .apply_transaction(&trade(b"a", b"b", vec![[9; 32]], vec![]))
            .unwrap();
        store.end_bulk().unwrap();
        assert_eq!(store.get_owner(&[9; 32]).unwrap(), None);
    }

    #[test]
    fn aborted_bulk_rolls_back_owner_and_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.begin_bulk().unwrap();
        store.apply_transaction(&mint([1; 32], b"alice")).unwrap();
        store.set_checkpoint(0).unwrap();
        store.abort_bulk();
        assert_eq!(store.get_owner(&[1; 32]).unwrap(), None);
        assert_eq!(store.checkpoint().unwrap(), None);
    }

    #[test]
    fn writes_outside_session_are_misuse() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let err = store.apply_transaction(&mint([1; 32], b"a")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrencyMisuse);
        assert_eq!(store.set_checkpoint(1).unwrap_err().kind(), ErrorKind::ConcurrencyMisuse);
    }

    #[test]
    fn locks_do_not_touch_ownership() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.lock_card(&[4; 32], 7, "tx-a").unwrap();
        store.lock_card(&[4; 32], 8, "tx-b").unwrap();

        let lock = store.lock_for(&[4; 32]).unwrap().unwrap();
        assert_eq!(lock.height, 8);
        assert_eq!(lock.transaction_id, "tx-b");
        assert_eq!(store.get_owner(&[4; 32]).unwrap(), None);

        store.unlock_card(&[4; 32]).unwrap();
        assert!(store.locks().unwrap().is_empty());
    }

    #[test]
    fn clear_locks_through_height() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.lock_card(&[1; 32], 3, "a").unwrap();
        store.lock_card(&[2; 32], 6, "b").unwrap();

        store.begin_bulk().unwrap();
        assert_eq!(store.clear_locks_through(5).unwrap(), 1);
        store.end_bulk().unwrap();

        let remaining = store.locks().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].card_hash, [2; 32]);
    }
}
