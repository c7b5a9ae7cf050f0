//! Wallet files: a P-256 key pair stored as hex in a small JSON document.
//!
//! ```json
//! { "PublicKey": "03ab…", "PrivateKey": "5f1c…" }
//! ```
//!
//! Wallets are not encrypted. On Unix the file is written with mode 0600.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::crypto::keys::CardKeypair;
use crate::error::{LedgerError, Result};

/// A public/private key pair as raw bytes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Wallet {
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub private_key: Vec<u8>,
}

impl Wallet {
    /// Fresh P-256 key pair.
    pub fn generate() -> Self {
        Self::from_keypair(&CardKeypair::generate())
    }

    pub fn from_keypair(keypair: &CardKeypair) -> Self {
        Self {
            public_key: keypair.public_key_bytes(),
            private_key: keypair.private_key_bytes(),
        }
    }

    /// Signing key pair for this wallet. Fails if the stored public key does
    /// not belong to the stored private key.
    pub fn keypair(&self) -> Result<CardKeypair> {
        let keypair = CardKeypair::from_private_bytes(&self.private_key)?;
        if !crate::crypto::keys::same_public_key(&keypair.public_key_bytes(), &self.public_key) {
            return Err(LedgerError::invalid(
                "wallet public key does not match its private key",
            ));
        }
        Ok(keypair)
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("public_key", &hex::encode(&self.public_key))
            .finish_non_exhaustive()
    }
}

/// Loads and stores wallets.
pub trait WalletReader: Send + Sync {
    fn load_wallet(&self, path: &Path) -> Result<Wallet>;
    fn save_wallet(&self, path: &Path, wallet: &Wallet) -> Result<()>;
}

/// [`WalletReader`] over JSON files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWalletReader;

impl WalletReader for JsonWalletReader {
    fn load_wallet(&self, path: &Path) -> Result<Wallet> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LedgerError::not_found(format!("wallet {}", path.display()))
            } else {
                LedgerError::Io(e)
            }
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save_wallet(&self, path: &Path, wallet: &Wallet) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(wallet)?;
        std::fs::write(path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys/alice.json");
        let wallet = Wallet::generate();

        JsonWalletReader.save_wallet(&path, &wallet).unwrap();
        let loaded = JsonWalletReader.load_wallet(&path).unwrap();
        assert_eq!(loaded, wallet);
        assert_eq!(
            loaded.keypair().unwrap().public_key_bytes(),
            wallet.public_key
        );
    }

    #[test]
    fn json_uses_hex_fields() {
        let wallet = Wallet {
            public_key: vec![0xab],
            private_key: vec![0xcd],
        };
        let json = serde_json::to_string(&wallet).unwrap();
        assert_eq!(json, r#"{"PublicKey":"ab","PrivateKey":"cd"}"#);
    }

    #[test]
    fn missing_wallet_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonWalletReader
            .load_wallet(&dir.path().join("nope.json"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn mismatched_keys_rejected() {
        let mut wallet = Wallet::generate();
        wallet.public_key = Wallet::generate().public_key;
        assert!(wallet.keypair().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn wallet_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.json");
        JsonWalletReader.save_wallet(&path, &Wallet::generate()).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
