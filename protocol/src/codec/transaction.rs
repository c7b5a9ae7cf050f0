//! Transaction payload layout.
//!
//! ```text
//! header  version(1)=1 | discriminator(1)      1 = Mint, 2 = Trade
//!
//! Mint    authorityKeyLen(4) authorityKey
//!         recipientKeyLen(4) recipientKey
//!         card(32)
//!         timestamp(8)
//!         sigLen(4) sig                        sigLen = 0 → unsigned
//!
//! Trade   user1KeyLen(4) user1Key
//!         user2KeyLen(4) user2Key
//!         count1(4) cards1(32 each)
//!         count2(4) cards2(32 each)
//!         timestamp(8)
//!         sig1Len(4) sig1
//!         sig2Len(4) sig2
//! ```

use super::reader::ByteReader;
use super::{put_bytes, put_hash_list, put_i64, put_signature};
use crate::config::{FORMAT_VERSION, MINT_DISCRIMINATOR, TRADE_DISCRIMINATOR};
use crate::error::{LedgerError, Result};
use crate::transaction::{
    MintTransaction, Timestamp, TradeSignatures, TradeTransaction, Transaction,
};

pub fn encode_transaction(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.push(FORMAT_VERSION);
    out.push(tx.discriminator());
    match tx {
        Transaction::Mint(m) => {
            put_bytes(&mut out, &m.authority_key);
            put_bytes(&mut out, &m.recipient_key);
            out.extend_from_slice(&m.card_hash);
            put_i64(&mut out, m.timestamp.ticks());
            put_signature(&mut out, m.authority_signature.as_deref());
        }
        Transaction::Trade(t) => {
            put_bytes(&mut out, &t.user1_key);
            put_bytes(&mut out, &t.user2_key);
            put_hash_list(&mut out, &t.cards_from_user1);
            put_hash_list(&mut out, &t.cards_from_user2);
            put_i64(&mut out, t.timestamp.ticks());
            put_signature(&mut out, t.signatures.user1.as_deref());
            put_signature(&mut out, t.signatures.user2.as_deref());
        }
    }
    out
}

/// Decode any transaction, dispatching on the discriminator byte.
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction> {
    let mut reader = ByteReader::new(bytes);
    let discriminator = read_header(&mut reader)?;
    let tx = match discriminator {
        MINT_DISCRIMINATOR => Transaction::Mint(read_mint_body(&mut reader)?),
        TRADE_DISCRIMINATOR => Transaction::Trade(read_trade_body(&mut reader)?),
        other => {
            return Err(LedgerError::corrupt(format!(
                "unknown transaction discriminator {other}"
            )))
        }
    };
    reader.finish("transaction")?;
    Ok(tx)
}

/// Decode a payload that must be a mint.
pub fn decode_mint(bytes: &[u8]) -> Result<MintTransaction> {
    let mut reader = ByteReader::new(bytes);
    expect_discriminator(read_header(&mut reader)?, MINT_DISCRIMINATOR)?;
    let mint = read_mint_body(&mut reader)?;
    reader.finish("mint")?;
    Ok(mint)
}

/// Decode a payload that must be a trade.
pub fn decode_trade(bytes: &[u8]) -> Result<TradeTransaction> {
    let mut reader = ByteReader::new(bytes);
    expect_discriminator(read_header(&mut reader)?, TRADE_DISCRIMINATOR)?;
    let trade = read_trade_body(&mut reader)?;
    reader.finish("trade")?;
    Ok(trade)
}

fn read_header(reader: &mut ByteReader<'_>) -> Result<u8> {
    let version = reader.read_u8("transaction version")?;
    if version != FORMAT_VERSION {
        return Err(LedgerError::corrupt(format!(
            "unsupported transaction version {version}"
        )));
    }
    reader.read_u8("transaction discriminator")
}

fn expect_discriminator(found: u8, expected: u8) -> Result<()> {
    if found != expected {
        return Err(LedgerError::corrupt(format!(
            "discriminator mismatch: expected {expected}, found {found}"
        )));
    }
    Ok(())
}

fn read_signature(reader: &mut ByteReader<'_>, what: &str) -> Result<Option<Vec<u8>>> {
    let sig = reader.read_prefixed(what)?;
    Ok(if sig.is_empty() { None } else { Some(sig.to_vec()) })
}

fn read_mint_body(reader: &mut ByteReader<'_>) -> Result<MintTransaction> {
    Ok(MintTransaction {
        authority_key: reader.read_prefixed("authority key")?.to_vec(),
        recipient_key: reader.read_prefixed("recipient key")?.to_vec(),
        card_hash: reader.read_array32("card hash")?,
        timestamp: Timestamp::from_ticks(reader.read_i64("mint timestamp")?),
        authority_signature: read_signature(reader, "authority signature")?,
    })
}

fn read_trade_body(reader: &mut ByteReader<'_>) -> Result<TradeTransaction> {
    let user1_key = reader.read_prefixed("user1 key")?.to_vec();
    let user2_key = reader.read_prefixed("user2 key")?.to_vec();
    let cards_from_user1 = reader.read_hash_list("cards from user1")?;
    let cards_from_user2 = reader.read_hash_list("cards from user2")?;
    let timestamp = Timestamp::from_ticks(reader.read_i64("trade timestamp")?);
    let signatures = TradeSignatures {
        user1: read_signature(reader, "user1 signature")?,
        user2: read_signature(reader, "user2 signature")?,
    };
    Ok(TradeTransaction {
        user1_key,
        user2_key,
        cards_from_user1,
        cards_from_user2,
        timestamp,
        signatures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample_mint(signed: bool) -> MintTransaction {
        MintTransaction {
            authority_key: vec![2; 33],
            recipient_key: vec![3; 33],
            card_hash: [0xab; 32],
            timestamp: Timestamp::from_ticks(638_400_000_000_000_000),
            authority_signature: signed.then(|| vec![0x55; 64]),
        }
    }

    fn sample_trade() -> TradeTransaction {
        TradeTransaction {
            user1_key: vec![2; 33],
            user2_key: vec![3; 33],
            cards_from_user1: vec![[1; 32], [2; 32]],
            cards_from_user2: vec![],
            timestamp: Timestamp::from_ticks(-5),
            signatures: TradeSignatures {
                user1: None,
                user2: Some(vec![7; 64]),
            },
        }
    }

    #[test]
    fn mint_layout_is_exact() {
        let bytes = encode_transaction(&Transaction::Mint(sample_mint(false)));
        // header + 2 prefixed keys + card + timestamp + empty signature
        assert_eq!(bytes.len(), 2 + (4 + 33) * 2 + 32 + 8 + 4);
        assert_eq!(&bytes[..2], &[1, 1]);
        assert_eq!(&bytes[2..6], &33u32.to_le_bytes());
        assert_eq!(&bytes[bytes.len() - 4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn unsigned_and_signed_mints_roundtrip() {
        for signed in [false, true] {
            let tx = Transaction::Mint(sample_mint(signed));
            assert_eq!(decode_transaction(&encode_transaction(&tx)).unwrap(), tx);
        }
    }

    #[test]
    fn partially_signed_trade_roundtrip() {
        let tx = Transaction::Trade(sample_trade());
        let decoded = decode_transaction(&encode_transaction(&tx)).unwrap();
        assert_eq!(decoded, tx);
        assert!(!decoded.is_fully_signed());
    }

    #[test]
    fn typed_decode_rejects_other_variant() {
        let bytes = encode_transaction(&Transaction::Trade(sample_trade()));
        let err = decode_mint(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
        assert!(decode_trade(&bytes).is_ok());
    }

    #[test]
    fn unknown_discriminator_is_corrupt() {
        let mut bytes = encode_transaction(&Transaction::Mint(sample_mint(true)));
        bytes[1] = 9;
        assert_eq!(
            decode_transaction(&bytes).unwrap_err().kind(),
            ErrorKind::CorruptData
        );
    }

    #[test]
    fn every_truncation_is_corrupt() {
        let bytes = encode_transaction(&Transaction::Trade(sample_trade()));
        for cut in 0..bytes.len() {
            let err = decode_transaction(&bytes[..cut]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::CorruptData, "cut at {cut}");
        }
    }

    #[test]
    fn bad_version_is_corrupt() {
        let mut bytes = encode_transaction(&Transaction::Mint(sample_mint(false)));
        bytes[0] = 2;
        assert!(decode_transaction(&bytes).is_err());
    }
}
