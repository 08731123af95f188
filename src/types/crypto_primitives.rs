/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide two categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate.
//! 2. **Digital Signatures**: provided by the [`ed25519_dalek`] crate.

use super::data_types::{Address, CryptoHash, SignatureBytes, VerifyingKeyBytes};

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

/// A facade around [`SigningKey`] that implements method for [`sign`](Self::sign)-ing messages as well
/// as getters for the [`public`](Self::public) key and [`address`](Self::address) associated with the
/// signing key.
#[derive(Clone)]
pub(crate) struct Keypair(pub(crate) SigningKey);

impl Keypair {
    /// Create a `Keypair` that wraps over `signing_key`.
    pub(crate) fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Sign an arbitrary `message` with the `Keypair`.
    pub(crate) fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(message).to_bytes())
    }

    /// Get the `VerifyingKey` of this `Keypair`.
    pub(crate) fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }

    /// Get the `Address` of this `Keypair`.
    pub(crate) fn address(&self) -> Address {
        address_of(&self.public())
    }
}

/// Derive the `Address` of a validator: the last 20 bytes of the SHA256 digest of its verifying key.
pub fn address_of(verifying_key: &VerifyingKey) -> Address {
    let digest = CryptoHasher::digest(verifying_key.to_bytes());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..32]);
    Address::new(bytes)
}

/// Compute the SHA256 digest of `bytes`.
pub fn hash(bytes: &[u8]) -> CryptoHash {
    CryptoHash::new(CryptoHasher::digest(bytes).into())
}

/// Check that `signature` was made by `signer` over `message`, and if so return the `Address` of
/// `signer`.
///
/// Returns `None` if `signer` is not a valid Ed25519 point or the signature does not verify.
pub(crate) fn verify_signature(
    signer: &VerifyingKeyBytes,
    message: &[u8],
    signature: &SignatureBytes,
) -> Option<Address> {
    let verifying_key = VerifyingKey::from_bytes(signer).ok()?;
    let signature = Signature::from_bytes(&signature.bytes());
    verifying_key
        .verify(message, &signature)
        .ok()
        .map(|_| address_of(&verifying_key))
}
