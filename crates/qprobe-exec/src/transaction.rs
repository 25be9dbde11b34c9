//! Transaction wire format.
//!
//! ```text
//! source[32] | destination[32] | amount i64 LE | tick u32 LE
//!   | input_type u16 LE | input_size u16 LE | payload | signature[64]
//! ```
//!
//! The signature covers every byte before it. Signed transactions travel as
//! standard base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{SignError, TransactionError};
use crate::sign::{TransactionSigner, SIGNATURE_BYTES};

pub const HEADER_BYTES: usize = 32 + 32 + 8 + 4 + 2 + 2;

/// A transaction ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub source: [u8; 32],
    pub destination: [u8; 32],
    pub amount: i64,
    pub tick: u32,
    pub input_type: u16,
    pub payload: Vec<u8>,
}

impl UnsignedTransaction {
    /// Serialized header plus payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        let input_size = u16::try_from(self.payload.len())
            .map_err(|_| TransactionError::PayloadTooLarge(self.payload.len()))?;

        let mut out = Vec::with_capacity(HEADER_BYTES + self.payload.len() + SIGNATURE_BYTES);
        out.extend_from_slice(&self.source);
        out.extend_from_slice(&self.destination);
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.tick.to_le_bytes());
        out.extend_from_slice(&self.input_type.to_le_bytes());
        out.extend_from_slice(&input_size.to_le_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

/// A signed, serialized transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub bytes: Vec<u8>,
}

impl SignedTransaction {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Append the signer's signature over the serialized body.
pub async fn sign_transaction(
    body: Vec<u8>,
    signer: &dyn TransactionSigner,
) -> Result<SignedTransaction, SignError> {
    let signature = signer.sign(&body).await?;
    let mut bytes = body;
    bytes.extend_from_slice(&signature);
    Ok(SignedTransaction { bytes })
}
