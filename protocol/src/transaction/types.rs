//! Core transaction types: the `Mint | Trade` sum type, the tick-based
//! [`Timestamp`], and the two-slot [`TradeSignatures`] record.

use chrono::{DateTime, Utc};

use crate::config::{MINT_DISCRIMINATOR, TRADE_DISCRIMINATOR};
use crate::crypto::keys::same_public_key;
use crate::error::{LedgerError, Result};

/// SHA-256 of a card name.
pub type CardHash = [u8; 32];

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Ticks between 0001-01-01T00:00:00Z and the Unix epoch.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// 100 ns ticks per second.
const TICKS_PER_SECOND: i64 = 10_000_000;

/// A UTC instant counted in 100-nanosecond ticks since 0001-01-01T00:00:00Z.
///
/// This is the unit stored on disk (8 bytes, little-endian, signed). The
/// canonical text form always carries seven fractional digits so that the
/// signed string is independent of trailing zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let secs = dt.timestamp();
        let sub_ticks = i64::from(dt.timestamp_subsec_nanos()) / 100;
        Self(UNIX_EPOCH_TICKS + secs * TICKS_PER_SECOND + sub_ticks)
    }

    /// The instant as a chrono value, if it is representable.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let unix_ticks = self.0.checked_sub(UNIX_EPOCH_TICKS)?;
        let secs = unix_ticks.div_euclid(TICKS_PER_SECOND);
        let nanos = (unix_ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
        DateTime::from_timestamp(secs, nanos)
    }

    /// Round-trip ISO 8601 form, e.g. `2026-03-01T09:30:00.1234567Z`.
    pub fn to_iso8601(self) -> Result<String> {
        let dt = self.to_datetime().ok_or_else(|| {
            LedgerError::corrupt(format!("timestamp {} ticks is out of range", self.0))
        })?;
        let fraction = self.0.rem_euclid(TICKS_PER_SECOND);
        Ok(format!("{}.{fraction:07}Z", dt.format("%Y-%m-%dT%H:%M:%S")))
    }
}

// ---------------------------------------------------------------------------
// Mint
// ---------------------------------------------------------------------------

/// Creation of a card by the minting authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintTransaction {
    pub authority_key: Vec<u8>,
    pub recipient_key: Vec<u8>,
    pub card_hash: CardHash,
    pub timestamp: Timestamp,
    pub authority_signature: Option<Vec<u8>>,
}

impl MintTransaction {
    /// Unsigned mint stamped with the current time.
    pub fn new(authority_key: Vec<u8>, recipient_key: Vec<u8>, card_hash: CardHash) -> Self {
        Self {
            authority_key,
            recipient_key,
            card_hash,
            timestamp: Timestamp::now(),
            authority_signature: None,
        }
    }

    pub fn is_fully_signed(&self) -> bool {
        self.authority_signature.is_some()
    }

    /// `hex(authority):hex(recipient):hex(card):ISO8601(timestamp)`
    pub fn canonical_string(&self) -> Result<String> {
        Ok(format!(
            "{}:{}:{}:{}",
            hex::encode(&self.authority_key),
            hex::encode(&self.recipient_key),
            hex::encode(self.card_hash),
            self.timestamp.to_iso8601()?
        ))
    }
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// Which party of a trade a signature belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeParty {
    User1,
    User2,
}

/// The two order-independent signature slots of a trade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeSignatures {
    pub user1: Option<Vec<u8>>,
    pub user2: Option<Vec<u8>>,
}

impl TradeSignatures {
    pub fn is_complete(&self) -> bool {
        self.user1.is_some() && self.user2.is_some()
    }

    /// Match `signer_key` against the declared parties.
    ///
    /// Fails with `ValidationFailure` when the key is neither party.
    pub fn party_for(user1_key: &[u8], user2_key: &[u8], signer_key: &[u8]) -> Result<TradeParty> {
        if same_public_key(signer_key, user1_key) {
            Ok(TradeParty::User1)
        } else if same_public_key(signer_key, user2_key) {
            Ok(TradeParty::User2)
        } else {
            Err(LedgerError::invalid(
                "signing key does not match either party of the trade",
            ))
        }
    }

    /// Store `signature` in the slot belonging to `party`, replacing any
    /// earlier signature from the same party.
    pub fn fill(&mut self, party: TradeParty, signature: Vec<u8>) {
        match party {
            TradeParty::User1 => self.user1 = Some(signature),
            TradeParty::User2 => self.user2 = Some(signature),
        }
    }

    pub fn get(&self, party: TradeParty) -> Option<&[u8]> {
        match party {
            TradeParty::User1 => self.user1.as_deref(),
            TradeParty::User2 => self.user2.as_deref(),
        }
    }
}

/// Exchange of cards between two users. Both must sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeTransaction {
    pub user1_key: Vec<u8>,
    pub user2_key: Vec<u8>,
    pub cards_from_user1: Vec<CardHash>,
    pub cards_from_user2: Vec<CardHash>,
    pub timestamp: Timestamp,
    pub signatures: TradeSignatures,
}

impl TradeTransaction {
    /// Unsigned trade stamped with the current time.
    pub fn new(
        user1_key: Vec<u8>,
        user2_key: Vec<u8>,
        cards_from_user1: Vec<CardHash>,
        cards_from_user2: Vec<CardHash>,
    ) -> Self {
        Self {
            user1_key,
            user2_key,
            cards_from_user1,
            cards_from_user2,
            timestamp: Timestamp::now(),
            signatures: TradeSignatures::default(),
        }
    }

    pub fn is_fully_signed(&self) -> bool {
        self.signatures.is_complete()
    }

    pub fn key_of(&self, party: TradeParty) -> &[u8] {
        match party {
            TradeParty::User1 => &self.user1_key,
            TradeParty::User2 => &self.user2_key,
        }
    }

    /// `hex(u1):hex(u2):csv(cards1):csv(cards2):ISO8601(timestamp)`
    pub fn canonical_string(&self) -> Result<String> {
        Ok(format!(
            "{}:{}:{}:{}:{}",
            hex::encode(&self.user1_key),
            hex::encode(&self.user2_key),
            csv_hex(&self.cards_from_user1),
            csv_hex(&self.cards_from_user2),
            self.timestamp.to_iso8601()?
        ))
    }
}

fn csv_hex(cards: &[CardHash]) -> String {
    cards.iter().map(hex::encode).collect::<Vec<_>>().join(",")
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Mint(MintTransaction),
    Trade(TradeTransaction),
}

impl Transaction {
    /// Wire discriminator of this variant.
    pub fn discriminator(&self) -> u8 {
        match self {
            Transaction::Mint(_) => MINT_DISCRIMINATOR,
            Transaction::Trade(_) => TRADE_DISCRIMINATOR,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Transaction::Mint(_) => "mint",
            Transaction::Trade(_) => "trade",
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Transaction::Mint(m) => m.timestamp,
            Transaction::Trade(t) => t.timestamp,
        }
    }

    pub fn is_fully_signed(&self) -> bool {
        match self {
            Transaction::Mint(m) => m.is_fully_signed(),
            Transaction::Trade(t) => t.is_fully_signed(),
        }
    }

    /// The signature-free text that gets hashed and signed.
    pub fn canonical_string(&self) -> Result<String> {
        match self {
            Transaction::Mint(m) => m.canonical_string(),
            Transaction::Trade(t) => t.canonical_string(),
        }
    }

    /// Every card whose ownership this transaction touches.
    pub fn referenced_cards(&self) -> Vec<CardHash> {
        match self {
            Transaction::Mint(m) => vec![m.card_hash],
            Transaction::Trade(t) => t
                .cards_from_user1
                .iter()
                .chain(t.cards_from_user2.iter())
                .copied()
                .collect(),
        }
    }
}

impl From<MintTransaction> for Transaction {
    fn from(tx: MintTransaction) -> Self {
        Transaction::Mint(tx)
    }
}

impl From<TradeTransaction> for Transaction {
    fn from(tx: TradeTransaction) -> Self {
        Transaction::Trade(tx)
    }
}
