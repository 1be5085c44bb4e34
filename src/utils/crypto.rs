use crate::error::{NodeError, Result};
use data_encoding::HEXLOWER;
use ring::digest::{Context, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, KeyPair as _, UnparsedPublicKey, ECDSA_P256_SHA256_FIXED,
    ECDSA_P256_SHA256_FIXED_SIGNING,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Signature verification capability consumed by the transaction stage
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, public_key: &[u8], signature: &[u8], message: &[u8]) -> bool;
}

/// ECDSA P-256 / SHA-256 with fixed-length signatures
#[derive(Debug, Default, Clone, Copy)]
pub struct EcdsaP256Verifier;

impl SignatureVerifier for EcdsaP256Verifier {
    fn verify(&self, public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
        ecdsa_p256_sha256_sign_verify(public_key, signature, message)
    }
}

pub fn ecdsa_p256_sha256_sign_verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    let peer_public_key = UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, public_key);
    peer_public_key.verify(message, signature).is_ok()
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    context.finish().as_ref().to_vec()
}

/// Lowercase hex SHA-256 of `data`, used to name payloads in logs
pub fn digest_hex(data: &[u8]) -> String {
    HEXLOWER.encode(&sha256_digest(data))
}

/// PKCS#8 encoded signing key; the document is wiped when dropped
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    pkcs8: Vec<u8>,
    #[zeroize(skip)]
    public_key: Vec<u8>,
}

impl KeyPair {
    pub fn generate() -> Result<KeyPair> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .map_err(|e| NodeError::Crypto(format!("Failed to generate ECDSA key pair: {e}")))?
            .as_ref()
            .to_vec();
        Self::from_pkcs8(pkcs8)
    }

    pub fn from_pkcs8(pkcs8: Vec<u8>) -> Result<KeyPair> {
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &pkcs8, &rng)
            .map_err(|e| NodeError::Crypto(format!("Failed to load PKCS8 key pair: {e}")))?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(KeyPair { pkcs8, public_key })
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &self.pkcs8, &rng)
                .map_err(|e| NodeError::Crypto(format!("Failed to load PKCS8 key pair: {e}")))?;
        let signature = key_pair
            .sign(&rng, message)
            .map_err(|e| NodeError::Crypto(format!("Failed to sign message: {e}")))?;
        Ok(signature.as_ref().to_vec())
    }
}
