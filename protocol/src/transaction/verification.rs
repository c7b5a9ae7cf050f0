//! Cryptographic checks and identity of signed transactions.
//!
//! Signature checks here are stateless: they only prove that each present
//! key signed the canonical string. Authority and ownership rules need the
//! ledger's state and live in [`crate::ledger::writer`].

use super::types::{MintTransaction, TradeParty, TradeTransaction, Transaction};
use crate::codec;
use crate::crypto::keys::verify_signature;
use crate::error::{LedgerError, Result};

impl MintTransaction {
    pub fn verify_signature(&self) -> Result<()> {
        let signature = self
            .authority_signature
            .as_deref()
            .ok_or_else(|| LedgerError::invalid("mint is not signed by the authority"))?;
        let message = self.canonical_string()?;
        if !verify_signature(&self.authority_key, message.as_bytes(), signature) {
            return Err(LedgerError::invalid(
                "authority signature does not verify against the authority key",
            ));
        }
        Ok(())
    }
}

impl TradeTransaction {
    pub fn verify_signatures(&self) -> Result<()> {
        let message = self.canonical_string()?;
        for (party, label) in [(TradeParty::User1, "user1"), (TradeParty::User2, "user2")] {
            let signature = self
                .signatures
                .get(party)
                .ok_or_else(|| LedgerError::invalid(format!("trade is missing the {label} signature")))?;
            if !verify_signature(self.key_of(party), message.as_bytes(), signature) {
                return Err(LedgerError::invalid(format!(
                    "{label} signature does not verify against {label} key"
                )));
            }
        }
        Ok(())
    }
}

impl Transaction {
    /// Verify every signature the variant requires.
    pub fn verify_signatures(&self) -> Result<()> {
        match self {
            Transaction::Mint(m) => m.verify_signature(),
            Transaction::Trade(t) => t.verify_signatures(),
        }
    }

    /// Encoded bytes of the fully signed transaction.
    ///
    /// These bytes feed the block hash, so an unsigned transaction has none.
    pub fn signed_bytes(&self) -> Result<Vec<u8>> {
        if !self.is_fully_signed() {
            return Err(LedgerError::invalid(format!(
                "{} transaction is not fully signed",
                self.kind_name()
            )));
        }
        Ok(codec::encode_transaction(self))
    }

    /// Hex of the signed bytes; `None` until fully signed.
    pub fn id(&self) -> Option<String> {
        self.signed_bytes().ok().map(hex::encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::CardKeypair;
    use crate::error::ErrorKind;

    fn signed_trade() -> (TradeTransaction, CardKeypair, CardKeypair) {
        let alice = CardKeypair::generate();
        let bob = CardKeypair::generate();
        let mut trade = TradeTransaction::new(
            alice.public_key_bytes(),
            bob.public_key_bytes(),
            vec![[1; 32]],
            vec![[2; 32]],
        );
        trade.sign(&alice).unwrap();
        trade.sign(&bob).unwrap();
        (trade, alice, bob)
    }

    #[test]
    fn signed_mint_verifies() {
        let authority = CardKeypair::generate();
        let mut mint = MintTransaction::new(authority.public_key_bytes(), vec![9; 33], [3; 32]);
        mint.sign(&authority).unwrap();
        assert!(mint.verify_signature().is_ok());
    }

    #[test]
    fn mint_signed_by_other_key_fails() {
        let authority = CardKeypair::generate();
        let impostor = CardKeypair::generate();
        let mut mint = MintTransaction::new(authority.public_key_bytes(), vec![9; 33], [3; 32]);
        mint.sign(&impostor).unwrap();
        let err = mint.verify_signature().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    }

    #[test]
    fn tampered_trade_fails() {
        let (mut trade, _, _) = signed_trade();
        assert!(trade.verify_signatures().is_ok());
        trade.cards_from_user2.push([9; 32]);
        assert!(trade.verify_signatures().is_err());
    }

    #[test]
    fn swapped_signature_fails() {
        let (mut trade, _, _) = signed_trade();
        let stolen = trade.signatures.user2.clone();
        trade.signatures.user1 = stolen;
        let err = trade.verify_signatures().unwrap_err();
        assert!(err.to_string().contains("user1"));
    }

    #[test]
    fn id_absent_until_fully_signed() {
        let alice = CardKeypair::generate();
        let bob = CardKeypair::generate();
        let mut tx = Transaction::from(TradeTransaction::new(
            alice.public_key_bytes(),
            bob.public_key_bytes(),
            vec![],
            vec![[4; 32]],
        ));
        tx.sign(&alice).unwrap();
        assert!(tx.id().is_none());
        assert_eq!(tx.signed_bytes().unwrap_err().kind(), ErrorKind::ValidationFailure);

        tx.sign(&bob).unwrap();
        let id = tx.id().unwrap();
        assert_eq!(id, hex::encode(codec::encode_transaction(&tx)));
    }
}
