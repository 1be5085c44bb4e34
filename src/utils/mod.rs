//! Utility functions and helpers
//!
//! Signing/verification helpers and the bincode configuration the wire
//! codec is built on.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    digest_hex, ecdsa_p256_sha256_sign_verify, sha256_digest, EcdsaP256Verifier, KeyPair,
    SignatureVerifier,
};

pub use serialization::{deserialize, serialize};
