//! Transaction builder.
//!
//! Assembles a [`TxDescription`] from pinned inputs, outputs, minted assets,
//! metadata and scripts. `build()` fails closed: anything missing or
//! malformed is a [`TxError::Validation`] before the description ever
//! reaches the transaction library.

use crate::plutus::PlutusData;
use crate::types::*;
use crate::TxError;
use cnft_types::constants::MAX_METADATA_STR_LEN;
use cnft_types::{AssetMap, Utxo};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct TxBuilder {
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    mint: AssetMap,
    mint_redeemer: Option<PlutusData>,
    metadata: BTreeMap<u64, Value>,
    scripts: Vec<Script>,
    valid_to_ms: Option<u64>,
    required_signers: Vec<String>,
    change_address: Option<String>,
}

impl TxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a wallet output as an input.
    pub fn collect_from(mut self, utxo: Utxo) -> Self {
        self.inputs.push(TxInput {
            utxo,
            redeemer: None,
            datum: None,
        });
        self
    }

    /// Pin several wallet outputs.
    pub fn collect_all(mut self, utxos: impl IntoIterator<Item = Utxo>) -> Self {
        for utxo in utxos {
            self = self.collect_from(utxo);
        }
        self
    }

    /// Spend a script-locked output with a redeemer, supplying its datum
    /// when the output only carries a hash.
    pub fn collect_with(mut self, utxo: Utxo, redeemer: &PlutusData, datum: Option<Vec<u8>>) -> Self {
        self.inputs.push(TxInput {
            utxo,
            redeemer: Some(redeemer.to_hex()),
            datum: datum.map(hex::encode),
        });
        self
    }

    /// Pin a fully specified input.
    pub fn with_input(mut self, input: TxInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn pay_to(mut self, address: impl Into<String>, assets: AssetMap) -> Self {
        self.outputs.push(TxOutput {
            address: address.into(),
            assets,
            datum: None,
        });
        self
    }

    /// Pay to an address with an attached datum (CBOR bytes).
    pub fn pay_to_with_datum(mut self, address: impl Into<String>, assets: AssetMap, datum: &[u8]) -> Self {
        self.outputs.push(TxOutput {
            address: address.into(),
            assets,
            datum: Some(hex::encode(datum)),
        });
        self
    }

    pub fn mint(mut self, assets: AssetMap) -> Self {
        self.mint.merge(&assets);
        self
    }

    pub fn mint_redeemer(mut self, redeemer: PlutusData) -> Self {
        self.mint_redeemer = Some(redeemer);
        self
    }

    /// Attach a metadata value under `label`, replacing any previous value.
    pub fn attach_metadata(mut self, label: u64, value: Value) -> Self {
        self.metadata.insert(label, value);
        self
    }

    pub fn attach_script(mut self, script: Script) -> Self {
        if !self.scripts.contains(&script) {
            self.scripts.push(script);
        }
        self
    }

    /// Upper validity bound, POSIX milliseconds.
    pub fn valid_to(mut self, unix_ms: u64) -> Self {
        self.valid_to_ms = Some(unix_ms);
        self
    }

    pub fn add_signer(mut self, key_hash: impl Into<String>) -> Self {
        self.required_signers.push(key_hash.into());
        self
    }

    pub fn change_to(mut self, address: impl Into<String>) -> Self {
        self.change_address = Some(address.into());
        self
    }

    pub fn build(self) -> Result<TxDescription, TxError> {
        if self.inputs.is_empty() && self.outputs.is_empty() && self.mint.is_empty() {
            return Err(TxError::Validation("transaction has no inputs or outputs".into()));
        }

        let mut seen = BTreeSet::new();
        for input in &self.inputs {
            if !seen.insert(&input.utxo.out_ref) {
                return Err(TxError::Validation(format!(
                    "input {} pinned twice",
                    input.utxo.out_ref
                )));
            }
        }

        for (i, out) in self.outputs.iter().enumerate() {
            if out.address.trim().is_empty() {
                return Err(TxError::Validation(format!("output {} has no address", i)));
            }
            if out.assets.is_empty() {
                return Err(TxError::Validation(format!("output {} carries no value", i)));
            }
        }

        if !self.mint.is_empty() {
            if self.scripts.is_empty() {
                return Err(TxError::Validation("mint requires a policy script".into()));
            }
            if self.mint.get(&cnft_types::AssetId::Lovelace).is_some() {
                return Err(TxError::Validation("cannot mint lovelace".into()));
            }
        }

        for (label, value) in &self.metadata {
            check_metadata(value).map_err(|s| {
                TxError::Validation(format!(
                    "metadata {} string exceeds {} bytes: {:.16}...",
                    label, MAX_METADATA_STR_LEN, s
                ))
            })?;
        }

        if let Some(change) = &self.change_address {
            if change.trim().is_empty() {
                return Err(TxError::Validation("empty change address".into()));
            }
        }

        Ok(TxDescription {
            inputs: self.inputs,
            outputs: self.outputs,
            mint: self.mint,
            mint_redeemer: self.mint_redeemer.map(|r| r.to_hex()),
            metadata: self.metadata,
            scripts: self.scripts,
            valid_to_ms: self.valid_to_ms,
            required_signers: self.required_signers,
            change_address: self.change_address,
        })
    }
}

/// Ledger metadata strings are capped; returns the first offender.
fn check_metadata(value: &Value) -> Result<(), String> {
    match value {
        Value::String(s) if s.len() > MAX_METADATA_STR_LEN => Err(s.clone()),
        Value::Array(items) => items.iter().try_for_each(check_metadata),
        Value::Object(map) => map.iter().try_for_each(|(k, v)| {
            if k.len() > MAX_METADATA_STR_LEN {
                return Err(k.clone());
            }
            check_metadata(v)
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnft_types::{AssetId, OutputRef, PolicyId};
    use serde_json::json;

    fn utxo(index: u32) -> Utxo {
        Utxo::new(
            OutputRef::new("a".repeat(64), index),
            "addr_test1self",
            AssetMap::from_lovelace(10_000_000u64),
        )
    }

    fn script() -> Script {
        Script {
            kind: ScriptKind::Native,
            cbor: "8200581c".to_string(),
        }
    }

    #[test]
    fn test_build_payment() {
        let desc = TxBuilder::new()
            .pay_to("addr_test1dest", AssetMap::from_lovelace(2_000_000u64))
            .attach_metadata(674, json!({ "msg": ["thanks"] }))
            .build()
            .unwrap();
        assert!(desc.inputs.is_empty());
        assert_eq!(desc.outputs.len(), 1);
        assert_eq!(desc.metadata[&674]["msg"][0], "thanks");
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(TxBuilder::new().build(), Err(TxError::Validation(_))));
    }

    #[test]
    fn test_output_validation() {
        let r = TxBuilder::new().pay_to("", AssetMap::from_lovelace(1u64)).build();
        assert!(matches!(r, Err(TxError::Validation(_))));
        let r = TxBuilder::new().pay_to("addr_test1x", AssetMap::new()).build();
        assert!(matches!(r, Err(TxError::Validation(_))));
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let r = TxBuilder::new().collect_from(utxo(0)).collect_from(utxo(0)).build();
        assert!(matches!(r, Err(TxError::Validation(_))));
        let ok = TxBuilder::new().collect_from(utxo(0)).collect_from(utxo(1)).build();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_mint_needs_script() {
        let asset = AssetId::native(PolicyId::from_bytes([7u8; 28]), b"Token1".to_vec());
        let minted = AssetMap::new().with(asset, 1u64);
        let r = TxBuilder::new().collect_from(utxo(0)).mint(minted.clone()).build();
        assert!(matches!(r, Err(TxError::Validation(_))));

        let desc = TxBuilder::new()
            .collect_from(utxo(0))
            .mint(minted)
            .attach_script(script())
            .attach_script(script())
            .build()
            .unwrap();
        assert_eq!(desc.scripts.len(), 1);
        assert_eq!(desc.mint.len(), 1);
    }

    #[test]
    fn test_metadata_string_limit() {
        let long = "x".repeat(65);
        let r = TxBuilder::new()
            .pay_to("addr_test1x", AssetMap::from_lovelace(1u64))
            .attach_metadata(721, json!({ "a": { "b": [long] } }))
            .build();
        assert!(matches!(r, Err(TxError::Validation(_))));
    }

    #[test]
    fn test_script_spend_encodes_redeemer() {
        let desc = TxBuilder::new()
            .collect_with(utxo(2), &PlutusData::unit(1), Some(vec![0xd8, 0x79, 0x80]))
            .change_to("addr_test1buyer")
            .build()
            .unwrap();
        assert_eq!(desc.inputs[0].redeemer.as_deref(), Some("d87a80"));
        assert_eq!(desc.inputs[0].datum.as_deref(), Some("d87980"));
        assert_eq!(desc.change_address.as_deref(), Some("addr_test1buyer"));
    }
}
