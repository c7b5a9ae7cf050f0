//! Transaction signing with P-256 key pairs.
//!
//! The signed message is the UTF-8 canonical string; ECDSA hashes it with
//! SHA-256 internally. A mint is signed straight into its authority slot. A
//! trade works out which party the signer is by comparing the signer's
//! derived public key against `user1_key` and `user2_key`, so the two parties
//! can sign in either order.

use super::types::{MintTransaction, TradeSignatures, TradeTransaction, Transaction};
use crate::crypto::keys::CardKeypair;
use crate::error::Result;

impl MintTransaction {
    pub fn sign(&mut self, keypair: &CardKeypair) -> Result<()> {
        let message = self.canonical_string()?;
        self.authority_signature = Some(keypair.sign(message.as_bytes()));
        Ok(())
    }
}

impl TradeTransaction {
    /// Sign as whichever party `keypair` belongs to.
    ///
    /// Fails with `ValidationFailure` if the key is neither party; the
    /// transaction is left untouched in that case.
    pub fn sign(&mut self, keypair: &CardKeypair) -> Result<()> {
        let party =
            TradeSignatures::party_for(&self.user1_key, &self.user2_key, &keypair.public_key_bytes())?;
        let message = self.canonical_string()?;
        self.signatures.fill(party, keypair.sign(message.as_bytes()));
        Ok(())
    }
}

impl Transaction {
    pub fn sign(&mut self, keypair: &CardKeypair) -> Result<()> {
        match self {
            Transaction::Mint(m) => m.sign(keypair),
            Transaction::Trade(t) => t.sign(keypair),
        }
    }
}

/// Sign a transaction in place. Alias for [`Transaction::sign`].
pub fn sign_transaction(tx: &mut Transaction, keypair: &CardKeypair) -> Result<()> {
    tx.sign(keypair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn mint_sign_fills_authority_slot() {
        let authority = CardKeypair::generate();
        let mut mint = MintTransaction::new(authority.public_key_bytes(), vec![7; 33], [1; 32]);
        assert!(!mint.is_fully_signed());
        mint.sign(&authority).unwrap();
        assert!(mint.is_fully_signed());
    }

    #[test]
    fn trade_parties_sign_in_any_order() {
        let alice = CardKeypair::generate();
        let bob = CardKeypair::generate();
        let mut trade = TradeTransaction::new(
            alice.public_key_bytes(),
            bob.public_key_bytes(),
            vec![[1; 32]],
            vec![[2; 32]],
        );

        trade.sign(&bob).unwrap();
        assert!(trade.signatures.user1.is_none());
        assert!(trade.signatures.user2.is_some());

        trade.sign(&alice).unwrap();
        assert!(trade.is_fully_signed());
    }

    #[test]
    fn outsider_cannot_sign_trade() {
        let alice = CardKeypair::generate();
        let bob = CardKeypair::generate();
        let mallory = CardKeypair::generate();
        let mut tx = Transaction::from(TradeTransaction::new(
            alice.public_key_bytes(),
            bob.public_key_bytes(),
            vec![[1; 32]],
            vec![],
        ));

        let err = sign_transaction(&mut tx, &mallory).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        assert!(matches!(&tx, Transaction::Trade(t) if t.signatures == TradeSignatures::default()));
    }
}
