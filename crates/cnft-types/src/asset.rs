//! Asset identifiers and multi-asset balances.
//!
//! An asset is identified by a 28-byte minting policy plus an arbitrary-length
//! name. Lovelace is the distinguished asset with a zero-length policy. All
//! quantities are arbitrary precision so large fungible supplies never
//! truncate.

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constants::POLICY_ID_BYTES;
use crate::TypesError;

/// Unbounded non-negative asset quantity.
pub type Quantity = BigUint;

/// Parse a decimal quantity string.
pub fn parse_quantity(s: &str) -> Result<Quantity, TypesError> {
    BigUint::from_str(s.trim()).map_err(|_| TypesError::InvalidQuantity(s.to_string()))
}

// =============================================================================
// Policy Id
// =============================================================================

/// Minting policy identifier (blake2b-224 of the policy script).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolicyId([u8; POLICY_ID_BYTES]);

impl PolicyId {
    pub fn from_bytes(bytes: [u8; POLICY_ID_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        if s.len() != POLICY_ID_BYTES * 2 {
            return Err(TypesError::InvalidPolicyLength(s.len()));
        }
        let bytes = hex::decode(s).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
        let mut arr = [0u8; POLICY_ID_BYTES];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; POLICY_ID_BYTES] {
        &self.0
    }
}

impl fmt::Debug for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PolicyId({})", self.to_hex())
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PolicyId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, TypesError> {
        Self::from_hex(s)
    }
}

impl Serialize for PolicyId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PolicyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

// =============================================================================
// Asset Id
// =============================================================================

/// Full asset identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetId {
    /// The native currency.
    Lovelace,
    /// A native token: policy plus raw asset name bytes.
    Native { policy: PolicyId, name: Vec<u8> },
}

impl AssetId {
    pub fn native(policy: PolicyId, name: impl Into<Vec<u8>>) -> Self {
        AssetId::Native {
            policy,
            name: name.into(),
        }
    }

    /// Parse a unit string: `"lovelace"` or `policy_hex ++ name_hex`.
    pub fn from_unit(unit: &str) -> Result<Self, TypesError> {
        if unit.is_empty() || unit == "lovelace" {
            return Ok(AssetId::Lovelace);
        }
        if !unit.is_ascii() {
            return Err(TypesError::InvalidHex(unit.to_string()));
        }
        let policy_len = POLICY_ID_BYTES * 2;
        if unit.len() < policy_len {
            return Err(TypesError::InvalidPolicyLength(unit.len()));
        }
        let policy = PolicyId::from_hex(&unit[..policy_len])?;
        let name = hex::decode(&unit[policy_len..])
            .map_err(|e| TypesError::InvalidHex(e.to_string()))?;
        Ok(AssetId::Native { policy, name })
    }

    /// Unit string as used by indexers and wallets.
    pub fn unit(&self) -> String {
        match self {
            AssetId::Lovelace => "lovelace".to_string(),
            AssetId::Native { policy, name } => format!("{}{}", policy.to_hex(), hex::encode(name)),
        }
    }

    pub fn policy(&self) -> Option<&PolicyId> {
        match self {
            AssetId::Lovelace => None,
            AssetId::Native { policy, .. } => Some(policy),
        }
    }

    pub fn name(&self) -> &[u8] {
        match self {
            AssetId::Lovelace => &[],
            AssetId::Native { name, .. } => name,
        }
    }

    pub fn name_hex(&self) -> String {
        hex::encode(self.name())
    }

    pub fn is_lovelace(&self) -> bool {
        matches!(self, AssetId::Lovelace)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unit())
    }
}

impl FromStr for AssetId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, TypesError> {
        Self::from_unit(s)
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.unit())
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_unit(&s).map_err(de::Error::custom)
    }
}

// =============================================================================
// Asset Map
// =============================================================================

/// Multi-asset balance. Zero quantities are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetMap(BTreeMap<AssetId, Quantity>);

impl AssetMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn from_lovelace(amount: impl Into<Quantity>) -> Self {
        let mut map = Self::new();
        map.add(AssetId::Lovelace, amount.into());
        map
    }

    /// Builder-style add.
    pub fn with(mut self, asset: AssetId, amount: impl Into<Quantity>) -> Self {
        self.add(asset, amount.into());
        self
    }

    pub fn add(&mut self, asset: AssetId, amount: Quantity) {
        if amount.is_zero() {
            return;
        }
        *self.0.entry(asset).or_default() += amount;
    }

    pub fn merge(&mut self, other: &AssetMap) {
        for (asset, amount) in other.iter() {
            self.add(asset.clone(), amount.clone());
        }
    }

    /// Subtract `other`, or `None` if any asset would go negative.
    pub fn checked_sub(&self, other: &AssetMap) -> Option<AssetMap> {
        let mut out = self.clone();
        for (asset, amount) in other.iter() {
            let have = out.0.get(asset)?;
            if have < amount {
                return None;
            }
            let rest = have - amount;
            if rest.is_zero() {
                out.0.remove(asset);
            } else {
                out.0.insert(asset.clone(), rest);
            }
        }
        Some(out)
    }

    pub fn remove(&mut self, asset: &AssetId) -> Option<Quantity> {
        self.0.remove(asset)
    }

    pub fn get(&self, asset: &AssetId) -> Option<&Quantity> {
        self.0.get(asset)
    }

    /// Quantity held of `asset` (zero when absent).
    pub fn quantity(&self, asset: &AssetId) -> Quantity {
        self.0.get(asset).cloned().unwrap_or_default()
    }

    pub fn lovelace(&self) -> Quantity {
        self.quantity(&AssetId::Lovelace)
    }

    pub fn contains(&self, asset: &AssetId) -> bool {
        self.0.contains_key(asset)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetId, &Quantity)> {
        self.0.iter()
    }

    pub fn native_assets(&self) -> impl Iterator<Item = (&AssetId, &Quantity)> {
        self.0.iter().filter(|(asset, _)| !asset.is_lovelace())
    }

    pub fn has_native_assets(&self) -> bool {
        self.native_assets().next().is_some()
    }

    /// Sum of every asset held under `policy`.
    pub fn policy_total(&self, policy: &PolicyId) -> Quantity {
        self.native_assets()
            .filter(|(asset, _)| asset.policy() == Some(policy))
            .map(|(_, amount)| amount)
            .sum()
    }
}

impl FromIterator<(AssetId, Quantity)> for AssetMap {
    fn from_iter<I: IntoIterator<Item = (AssetId, Quantity)>>(iter: I) -> Self {
        let mut map = AssetMap::new();
        for (asset, amount) in iter {
            map.add(asset, amount);
        }
        map
    }
}

impl Serialize for AssetMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k.unit(), v.to_string())))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuantityRepr {
    Text(String),
    Int(u64),
}

impl<'de> Deserialize<'de> for AssetMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, QuantityRepr>::deserialize(deserializer)?;
        let mut map = AssetMap::new();
        for (unit, amount) in raw {
            let asset = AssetId::from_unit(&unit).map_err(de::Error::custom)?;
            let amount = match amount {
                QuantityRepr::Text(s) => parse_quantity(&s).map_err(de::Error::custom)?,
                QuantityRepr::Int(n) => Quantity::from(n),
            };
            map.add(asset, amount);
        }
        Ok(map)
    }
}

/// Serde adapter writing a [`Quantity`] as a decimal string and reading
/// either a string or an integer. Use with `#[serde(with = "...")]`.
pub mod quantity_str {
    use super::{parse_quantity, Quantity, QuantityRepr};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(q: &Quantity, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&q.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Quantity, D::Error> {
        match QuantityRepr::deserialize(deserializer)? {
            QuantityRepr::Text(s) => parse_quantity(&s).map_err(de::Error::custom),
            QuantityRepr::Int(n) => Ok(Quantity::from(n)),
        }
    }
}
