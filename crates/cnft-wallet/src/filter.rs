//! Eligibility filtering and holdings gates.

use crate::error::WalletError;
use cnft_types::{AssetId, AssetMap, LedgerSnapshot, PolicyId, Quantity, Utxo};
use num_traits::Zero;
use std::collections::BTreeSet;

/// Assets and outputs that passed a filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eligible {
    pub matched_assets: AssetMap,
    /// Each containing output once, in snapshot order.
    pub matched_outputs: Vec<Utxo>,
}

impl Eligible {
    /// Sum of all matched quantities.
    pub fn total(&self) -> Quantity {
        self.matched_assets.native_assets().map(|(_, q)| q).sum()
    }
}

/// Native assets in `snapshot` under the allowed policies, minus `exclusions`.
///
/// `None` applies no policy filtering; `Some(&[])` allows nothing.
pub fn filter(
    snapshot: &LedgerSnapshot,
    policies: Option<&[PolicyId]>,
    exclusions: &BTreeSet<AssetId>,
) -> Eligible {
    let mut eligible = Eligible::default();
    for utxo in &snapshot.utxos {
        let mut matched = false;
        for (asset, qty) in utxo.assets.native_assets() {
            let allowed = match (policies, asset.policy()) {
                (None, _) => true,
                (Some(list), Some(p)) => list.contains(p),
                (Some(_), None) => false,
            };
            if allowed && !exclusions.contains(asset) {
                eligible.matched_assets.add(asset.clone(), qty.clone());
                matched = true;
            }
        }
        if matched {
            eligible.matched_outputs.push(utxo.clone());
        }
    }
    eligible
}

// =============================================================================
// Gates
// =============================================================================

/// Holdings requirement guarding a paid action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGate {
    /// At least `min_units` summed across all `policies`.
    Total { policies: Vec<PolicyId>, min_units: Quantity },
    /// Any one policy reaching its own minimum.
    AnyOf(Vec<(PolicyId, Quantity)>),
}

impl TokenGate {
    pub fn total(policies: Vec<PolicyId>, min_units: impl Into<Quantity>) -> Self {
        TokenGate::Total {
            policies,
            min_units: min_units.into(),
        }
    }

    pub fn any_of(requirements: Vec<(PolicyId, Quantity)>) -> Self {
        TokenGate::AnyOf(requirements)
    }

    /// The qualifying tally, or an authorization error.
    pub fn require(&self, snapshot: &LedgerSnapshot) -> Result<Quantity, WalletError> {
        match self {
            TokenGate::Total { policies, min_units } => {
                let held = filter(snapshot, Some(policies), &BTreeSet::new()).total();
                if held >= *min_units {
                    Ok(held)
                } else {
                    Err(WalletError::Authorization(format!(
                        "requires {} units under {} polic{}, found {}",
                        min_units,
                        policies.len(),
                        if policies.len() == 1 { "y" } else { "ies" },
                        held
                    )))
                }
            }
            TokenGate::AnyOf(reqs) => {
                let total = snapshot.total();
                for (policy, min) in reqs {
                    let held = total.policy_total(policy);
                    if held >= *min {
                        return Ok(held);
                    }
                }
                Err(WalletError::Authorization(format!(
                    "none of {} required collections held in sufficient quantity",
                    reqs.len()
                )))
            }
        }
    }
}

/// Fail when `items` exceeds `ratio` per unit held under `policies`.
pub fn require_ratio(
    snapshot: &LedgerSnapshot,
    policies: &[PolicyId],
    items: usize,
    ratio: u64,
) -> Result<(), WalletError> {
    if items == 0 {
        return Ok(());
    }
    let held = filter(snapshot, Some(policies), &BTreeSet::new()).total();
    if held.is_zero() || Quantity::from(items) > held.clone() * Quantity::from(ratio) {
        return Err(WalletError::Authorization(format!(
            "{} items require at least one held unit per {} (holding {})",
            items, ratio, held
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{asset, policy, utxo, SELF_ADDR};

    fn snapshot() -> LedgerSnapshot {
        LedgerSnapshot {
            utxos: vec![
                utxo(1, 0, SELF_ADDR, AssetMap::from_lovelace(2_000_000u64).with(asset(1, "A"), 2u64)),
                utxo(1, 1, SELF_ADDR, AssetMap::from_lovelace(3_000_000u64)),
                utxo(2, 0, SELF_ADDR, AssetMap::from_lovelace(1_500_000u64)
                    .with(asset(1, "B"), 1u64)
                    .with(asset(2, "C"), 5u64)),
                utxo(3, 0, SELF_ADDR, AssetMap::from_lovelace(1_500_000u64).with(asset(3, "D"), 1u64)),
            ],
            change_address: SELF_ADDR.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_by_policy() {
        let snap = snapshot();
        let allowed = [policy(1)];
        let e = filter(&snap, Some(&allowed), &BTreeSet::new());
        assert_eq!(e.matched_outputs.len(), 2);
        assert_eq!(e.total(), Quantity::from(3u64));
        assert!(e.matched_outputs.iter().all(|u| u.assets.policy_total(&policy(1)) > Quantity::zero()));
        assert!(!e.matched_assets.contains(&asset(2, "C")));
    }

    #[test]
    fn test_none_and_empty_differ() {
        let snap = snapshot();
        let all = filter(&snap, None, &BTreeSet::new());
        assert_eq!(all.matched_outputs.len(), 3);
        assert_eq!(all.total(), Quantity::from(9u64));

        let nothing = filter(&snap, Some(&[]), &BTreeSet::new());
        assert!(nothing.matched_outputs.is_empty());
        assert!(nothing.matched_assets.is_empty());
    }

    #[test]
    fn test_exclusions_are_full_asset_ids() {
        let snap = snapshot();
        let excl: BTreeSet<_> = [asset(1, "A")].into_iter().collect();
        let e = filter(&snap, Some(&[policy(1)]), &excl);
        assert_eq!(e.matched_outputs.len(), 1);
        assert_eq!(e.matched_outputs[0].out_ref.tx_hash, crate::testing::hash(2));
    }

    #[test]
    fn test_matched_sum_equals_outputs_sum() {
        let snap = snapshot();
        let allowed = [policy(1), policy(2)];
        let e = filter(&snap, Some(&allowed), &BTreeSet::new());
        let mut from_outputs = Quantity::zero();
        for u in &e.matched_outputs {
            for p in &allowed {
                from_outputs += u.assets.policy_total(p);
            }
        }
        assert_eq!(e.total(), from_outputs);
    }

    #[test]
    fn test_token_gate_total() {
        let snap = snapshot();
        assert_eq!(
            TokenGate::total(vec![policy(1), policy(3)], 4u64).require(&snap).unwrap(),
            Quantity::from(4u64)
        );
        let err = TokenGate::total(vec![policy(1)], 4u64).require(&snap).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Authorization);
    }

    #[test]
    fn test_token_gate_any_of() {
        let snap = snapshot();
        let gate = TokenGate::any_of(vec![
            (policy(9), Quantity::from(1u64)),
            (policy(2), Quantity::from(5u64)),
        ]);
        assert_eq!(gate.require(&snap).unwrap(), Quantity::from(5u64));
        let gate = TokenGate::any_of(vec![(policy(2), Quantity::from(6u64))]);
        assert!(gate.require(&snap).is_err());
    }

    #[test]
    fn test_require_ratio() {
        let snap = snapshot();
        // three units under policy 1
        assert!(require_ratio(&snap, &[policy(1)], 30, 10).is_ok());
        assert!(require_ratio(&snap, &[policy(1)], 31, 10).is_err());
        assert!(require_ratio(&snap, &[policy(9)], 1, 10).is_err());
        assert!(require_ratio(&snap, &[policy(9)], 0, 10).is_ok());
    }
}
