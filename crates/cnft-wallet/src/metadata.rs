//! Vending metadata files.
//!
//! Each file holds one asset: `{"<asset name>": { ...CIP-25 body... }}`.
//! Files are checked when a session is prepared so the loop never meets a
//! body the chain would refuse.

use crate::error::WalletError;
use cnft_tx::MintDescriptor;
use cnft_types::constants::{MAX_METADATA_STR_LEN, NFT_METADATA_LABEL};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;

const IPFS_SCHEME: &str = "ipfs://";

/// CIDv1 links are published without the scheme.
const INVALID_IPFS_PREFIX: &str = "ipfs://bafy";

fn looks_like_policy_id(key: &str) -> bool {
    key.len() == 56 && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Validate one file's JSON and turn it into a descriptor.
pub fn parse_descriptor(source: &str, value: &Value) -> Result<MintDescriptor, WalletError> {
    let obj = value
        .as_object()
        .ok_or_else(|| WalletError::Validation(format!("{}: metadata must be a JSON object", source)))?;
    if obj.contains_key(&NFT_METADATA_LABEL.to_string()) {
        return Err(WalletError::Validation(format!(
            "{}: do not use the \"{}\" label, use the asset name directly",
            source, NFT_METADATA_LABEL
        )));
    }
    if obj.len() != 1 {
        return Err(WalletError::Validation(format!(
            "{}: put exactly 1 asset in each file, found {}",
            source,
            obj.len()
        )));
    }
    let descriptor = MintDescriptor::from_json(value)?;
    check_descriptor(source, &descriptor)?;
    Ok(descriptor)
}

/// Checks on an already-parsed descriptor.
pub fn check_descriptor(source: &str, descriptor: &MintDescriptor) -> Result<(), WalletError> {
    if looks_like_policy_id(&descriptor.name) {
        return Err(WalletError::Validation(format!(
            "{}: suspected policy ID \"{}\", use the asset name directly",
            source, descriptor.name
        )));
    }
    check_values(source, &descriptor.name, &descriptor.metadata)
}

fn check_values(source: &str, key: &str, value: &Value) -> Result<(), WalletError> {
    match value {
        Value::String(s) => {
            if s.starts_with(INVALID_IPFS_PREFIX) {
                return Err(WalletError::Validation(format!(
                    "{}: invalid IPFS link starting with {} (remove '{}')",
                    source, INVALID_IPFS_PREFIX, IPFS_SCHEME
                )));
            }
            if s.len() > MAX_METADATA_STR_LEN {
                return Err(WalletError::Validation(format!(
                    "{}: value for {} exceeds {} characters",
                    source, key, MAX_METADATA_STR_LEN
                )));
            }
            Ok(())
        }
        Value::Object(map) => map.iter().try_for_each(|(k, v)| check_values(source, k, v)),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, v)| check_values(source, &i.to_string(), v)),
        _ => Ok(()),
    }
}

/// Asset names must be unique across a session's queue.
pub fn check_unique(descriptors: &[MintDescriptor]) -> Result<(), WalletError> {
    let mut seen = BTreeSet::new();
    for d in descriptors {
        if !seen.insert(d.name.as_str()) {
            return Err(WalletError::Validation(format!("duplicate asset name {:?}", d.name)));
        }
    }
    Ok(())
}

/// Read and validate metadata files in the given order.
pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<MintDescriptor>, WalletError> {
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let source = path.display().to_string();
        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| WalletError::Validation(format!("error reading {}: {}", source, e)))?;
        out.push(parse_descriptor(&source, &value)?);
    }
    check_unique(&out)?;
    log::info!("loaded {} metadata file(s)", out.len());
    Ok(out)
}

/// Every `.json` file in `dir`, sorted by file name.
pub fn load_dir(dir: &Path) -> Result<Vec<MintDescriptor>, WalletError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();
    load_files(&paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_descriptor() {
        let d = parse_descriptor(
            "a.json",
            &json!({ "Tang 1": { "name": "Tang #1", "image": "ipfs://QmXyz", "traits": ["red", "hat"] } }),
        )
        .unwrap();
        assert_eq!(d.name, "Tang 1");
        assert_eq!(d.metadata["name"], "Tang #1");
    }

    #[test]
    fn test_rejections() {
        let cases = [
            json!({ "721": { "x": {} } }),
            json!({ "a": {}, "b": {} }),
            serde_json::from_str(&format!(r#"{{"{}": {{"name": "x"}}}}"#, "ab".repeat(28))).unwrap(),
            json!({ "A": { "image": "ipfs://bafybeigdyrzt" } }),
            json!({ "A": { "description": "x".repeat(65) } }),
            json!({ "A": { "files": [{ "src": "y".repeat(70) }] } }),
            json!([1, 2]),
        ];
        for c in &cases {
            let err = parse_descriptor("f.json", c).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Validation, "{}", c);
        }
        assert!(parse_descriptor("f.json", &json!({ "A": { "n": 5, "s": "x".repeat(64) } })).is_ok());
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2.json"), r#"{"B": {"name": "B"}}"#).unwrap();
        std::fs::write(dir.path().join("1.json"), r#"{"A": {"name": "A"}}"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let loaded = load_dir(dir.path()).unwrap();
        let names: Vec<_> = loaded.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);

        std::fs::write(dir.path().join("3.json"), r#"{"A": {"name": "again"}}"#).unwrap();
        assert!(load_dir(dir.path()).is_err());
        std::fs::write(dir.path().join("3.json"), "{not json").unwrap();
        let err = load_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("3.json"));
    }
}
