//! Partially signed transaction handed from one principal to the next.

use cnft_wallet::{UnsignedTx, Witness};
use serde::{Deserialize, Serialize};

/// A finalized body plus the witnesses collected so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignedTx {
    /// Plan kind the body was built from (`"payment"`, `"mint"`, ...).
    pub kind: String,
    /// Hex-encoded transaction body.
    pub body_hex: String,
    /// Witnesses in signing order.
    pub witnesses: Vec<Witness>,
}

impl PartialSignedTx {
    pub fn new(kind: impl Into<String>, body: &UnsignedTx) -> Self {
        Self {
            kind: kind.into(),
            body_hex: body.body_hex(),
            witnesses: Vec::new(),
        }
    }

    pub fn add_witness(&mut self, witness: Witness) {
        self.witnesses.push(witness);
    }

    /// Whether `body` is byte-identical to the stored body.
    pub fn matches(&self, body: &UnsignedTx) -> bool {
        hex::decode(&self.body_hex).is_ok_and(|stored| stored == body.body)
    }

    /// Serialize to a JSON byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("PartialSignedTx serialization should not fail")
    }

    /// Deserialize from a JSON byte slice.
    pub fn deserialize(data: &[u8]) -> Result<Self, String> {
        serde_json::from_slice(data).map_err(|e| format!("Failed to deserialize PartialSignedTx: {}", e))
    }

    /// Serialize to a JSON string.
    pub fn to_string(&self) -> String {
        serde_json::to_string(self).expect("PartialSignedTx to_string should not fail")
    }

    /// Deserialize from a JSON string.
    pub fn from_string(s: &str) -> Result<Self, String> {
        serde_json::from_str(s).map_err(|e| format!("Failed to parse PartialSignedTx: {}", e))
    }
}
