use crate::error::{NodeError, Result};
use crate::network::TransactionEnvelope;
use crate::utils::SignatureVerifier;
use std::sync::{Arc, RwLock};

/// In-memory buffer of transaction payloads whose signatures checked out
///
/// Payloads are appended in arrival order and never removed here; the same
/// payload received twice is staged twice.
pub struct TransactionStage {
    inner: RwLock<Vec<Vec<u8>>>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl TransactionStage {
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> TransactionStage {
        TransactionStage {
            inner: RwLock::new(Vec::new()),
            verifier,
        }
    }

    /// Verify the envelope's signature over its payload and stage the
    /// payload if it holds
    pub fn stage(&self, envelope: &TransactionEnvelope) -> Result<()> {
        if !self.verifier.verify(
            &envelope.public_key,
            &envelope.signature,
            &envelope.payload,
        ) {
            return Err(NodeError::VerificationFailure);
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|e| NodeError::Network(format!("Failed to acquire stage lock: {e}")))?;
        inner.push(envelope.payload.clone());
        Ok(())
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        match self.inner.read() {
            Ok(inner) => inner.clone(),
            Err(_) => {
                log::error!("Failed to acquire read lock on transaction stage");
                Vec::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(inner) => inner.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on transaction stage");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{EcdsaP256Verifier, KeyPair};

    struct FixedVerifier(bool);

    impl SignatureVerifier for FixedVerifier {
        fn verify(&self, _: &[u8], _: &[u8], _: &[u8]) -> bool {
            self.0
        }
    }

    fn envelope() -> TransactionEnvelope {
        TransactionEnvelope::new(vec![1], vec![2], b"payload".to_vec())
    }

    #[test]
    fn test_stages_when_verifier_accepts() {
        let stage = TransactionStage::new(Arc::new(FixedVerifier(true)));
        stage.stage(&envelope()).unwrap();
        assert_eq!(stage.payloads(), vec![b"payload".to_vec()]);
    }

    #[test]
    fn test_rejected_signature_leaves_stage_unchanged() {
        let stage = TransactionStage::new(Arc::new(FixedVerifier(false)));
        let result = stage.stage(&envelope());
        assert_eq!(result, Err(NodeError::VerificationFailure));
        assert!(stage.is_empty());
    }

    #[test]
    fn test_duplicates_are_staged_again() {
        let stage = TransactionStage::new(Arc::new(FixedVerifier(true)));
        stage.stage(&envelope()).unwrap();
        stage.stage(&envelope()).unwrap();
        assert_eq!(stage.len(), 2);
    }

    #[test]
    fn test_staged_iff_signature_valid() {
        let stage = TransactionStage::new(Arc::new(EcdsaP256Verifier));
        let key = KeyPair::generate().unwrap();

        let valid = TransactionEnvelope::sign(&key, b"send 5".to_vec()).unwrap();
        let mut forged = valid.clone();
        forged.payload = b"send 500".to_vec();

        assert!(stage.stage(&valid).is_ok());
        assert!(stage.stage(&forged).is_err());
        assert_eq!(stage.payloads(), vec![b"send 5".to_vec()]);
    }
}
