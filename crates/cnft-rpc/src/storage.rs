//! Content-addressed metadata storage client.
//!
//! Uploads a binary blob and returns the content identifier (CID) that
//! on-chain metadata links to as `ipfs://<cid>`.

use crate::client::{RpcClient, RpcConfig};
use crate::error::RpcError;
use serde::Deserialize;

/// Default storage API base.
pub const STORAGE_URL: &str = "https://api.nft.storage";

#[derive(Debug, Deserialize)]
struct UploadValue {
    cid: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    ok: bool,
    value: Option<UploadValue>,
}

pub struct StorageRpc {
    client: RpcClient,
}

impl StorageRpc {
    /// Client for the default endpoint, authenticated with `api_key`.
    pub fn new(api_key: &str) -> Self {
        Self::with_config(RpcConfig {
            url: STORAGE_URL.to_string(),
            bearer_token: Some(api_key.to_string()),
            ..Default::default()
        })
    }

    pub fn with_config(config: RpcConfig) -> Self {
        Self {
            client: RpcClient::with_config(config),
        }
    }

    /// Store `blob`, returning its CID.
    pub async fn store_blob(&self, blob: &[u8]) -> Result<String, RpcError> {
        let val = self.client.post_bytes("upload", blob).await?;
        parse_upload(val)
    }
}

fn parse_upload(val: serde_json::Value) -> Result<String, RpcError> {
    let resp: UploadResponse = serde_json::from_value(val)?;
    match resp.value {
        Some(v) if resp.ok && !v.cid.is_empty() => Ok(v.cid),
        _ => Err(RpcError::NoResult {
            context: "upload".to_string(),
        }),
    }
}

/// `ipfs://` link for a CID.
pub fn ipfs_link(cid: &str) -> String {
    format!("ipfs://{}", cid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upload() {
        let cid = parse_upload(serde_json::json!({
            "ok": true,
            "value": { "cid": "bafkreidivzimqfqtoqxkrpge6bjyhlvxqs3rhe73owtmdulaxr5do5in7u" }
        }))
        .unwrap();
        assert!(cid.starts_with("bafkrei"));
        assert_eq!(ipfs_link("Qm1"), "ipfs://Qm1");

        let failed = parse_upload(serde_json::json!({ "ok": false }));
        assert!(matches!(failed, Err(RpcError::NoResult { .. })));
    }
}
