//! Card metadata: the name behind each on-chain card hash.
//!
//! The ledger itself only ever sees `SHA-256(name)`. Repositories keep the
//! name → hash mapping so that operators can refer to cards by name.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::crypto::hash::card_hash;
use crate::error::{LedgerError, Result};
use crate::transaction::CardHash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub name: String,
    #[serde(with = "hex_hash")]
    pub hash: CardHash,
}

impl Card {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let hash = card_hash(&name);
        Self { name, hash }
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Save/load/exists by card name.
pub trait CardRepository: Send + Sync {
    fn save_card(&self, card: &Card) -> Result<()>;
    fn load_card(&self, name: &str) -> Result<Card>;
    fn card_exists(&self, name: &str) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// FileCardRepository
// ---------------------------------------------------------------------------

/// One `<name>.json` file per card.
#[derive(Debug, Clone)]
pub struct FileCardRepository {
    dir: PathBuf,
}

impl FileCardRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let forbidden = |c: char| matches!(c, '/' | '\\' | '\0') || c.is_control();
        if name.is_empty() || name == "." || name == ".." || name.chars().any(forbidden) {
            return Err(LedgerError::invalid(format!("invalid card name {name:?}")));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

impl CardRepository for FileCardRepository {
    fn save_card(&self, card: &Card) -> Result<()> {
        let path = self.path_for(&card.name)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, serde_json::to_string_pretty(card)?)?;
        tracing::debug!(card = %card.name, path = %path.display(), "card saved");
        Ok(())
    }

    fn load_card(&self, name: &str) -> Result<Card> {
        let path = self.path_for(name)?;
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LedgerError::not_found(format!("card {name:?}"))
            } else {
                LedgerError::Io(e)
            }
        })?;
        let card: Card = serde_json::from_str(&raw)?;
        if card.hash != card_hash(&card.name) {
            return Err(LedgerError::corrupt(format!(
                "card file {} has a hash that does not match its name",
                path.display()
            )));
        }
        Ok(card)
    }

    fn card_exists(&self, name: &str) -> Result<bool> {
        Ok(self.path_for(name)?.exists())
    }
}

// ---------------------------------------------------------------------------
// InMemoryCardRepository
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryCardRepository {
    cards: RwLock<HashMap<String, Card>>,
}

impl InMemoryCardRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CardRepository for InMemoryCardRepository {
    fn save_card(&self, card: &Card) -> Result<()> {
        self.cards.write().insert(card.name.clone(), card.clone());
        Ok(())
    }

    fn load_card(&self, name: &str) -> Result<Card> {
        self.cards
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| LedgerError::not_found(format!("card {name:?}")))
    }

    fn card_exists(&self, name: &str) -> Result<bool> {
        Ok(self.cards.read().contains_key(name))
    }
}

mod hex_hash {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let raw = String::deserialize(deserializer)?;
        let bytes = hex::decode(raw).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("card hash must be 32 bytes"))
    }
}
