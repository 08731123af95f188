/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Signed messages.

use super::{
    crypto_primitives::verify_signature,
    data_types::{Address, SignatureBytes, VerifyingKeyBytes},
};

/// Data types that contain: 1. A message, and 2. A digital signature over said message made by a
/// signer identified in the data type itself.
pub(crate) trait SignedMessage: Clone {
    /// Get the bytes that are passed as input into the signing function to form the signature
    /// of the `SignedMessage`.
    fn message_bytes(&self) -> Vec<u8>;

    /// Get the signature of the `SignedMessage`.
    fn signature_bytes(&self) -> SignatureBytes;

    /// Get the verifying key that claims to have produced `signature_bytes`.
    fn signer(&self) -> VerifyingKeyBytes;

    /// Verify that `signature_bytes` is a signature created by `signer` over `message_bytes`, and if so,
    /// return the `Address` of the signer.
    fn recover_signer(&self) -> Option<Address> {
        verify_signature(
            &self.signer(),
            &self.message_bytes(),
            &self.signature_bytes(),
        )
    }
}
