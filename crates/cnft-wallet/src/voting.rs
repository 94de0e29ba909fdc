//! On-chain polls: voting power, casting a vote, redeeming ballots.
//!
//! Voting power is the same policy and exclusion walk as [`filter`]: every
//! eligible token under the poll's voting policy is worth one ballot.

use crate::backend::Indexer;
use crate::context::Context;
use crate::error::WalletError;
use crate::filter::{filter, Eligible};
use cnft_tx::{Ballot, Poll, TallyPlan, VotePlan};
use cnft_types::{AssetId, LedgerSnapshot};
use std::collections::BTreeSet;

/// Tokens in `snapshot` that can vote in `poll`.
pub fn voting_power(snapshot: &LedgerSnapshot, poll: &Poll, exclusions: &BTreeSet<AssetId>) -> Eligible {
    filter(snapshot, Some(std::slice::from_ref(&poll.reference_policy)), exclusions)
}

/// Plan a vote for `choice` with every eligible token the wallet holds.
pub async fn cast(
    ctx: &Context,
    poll: &Poll,
    choice: &str,
    exclusions: &BTreeSet<AssetId>,
) -> Result<VotePlan, WalletError> {
    let snapshot = ctx.snapshot().await?;
    let power = voting_power(&snapshot, poll, exclusions);
    if power.matched_assets.is_empty() {
        return Err(WalletError::Authorization(format!(
            "no voting tokens under {} in this wallet",
            poll.reference_policy
        )));
    }
    log::info!("casting {} ballot(s) for {:?}", power.matched_assets.len(), choice);
    let now_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
    Ok(VotePlan::cast(
        poll,
        snapshot.change_address.as_str(),
        choice,
        &power.matched_assets,
        now_ms,
    )?)
}

/// Ballot outputs sitting at the poll's counter.
pub async fn ballots(indexer: &dyn Indexer, poll: &Poll) -> Result<Vec<Ballot>, WalletError> {
    let mut found = Vec::new();
    for utxo in indexer.utxos_at(&poll.counter_address).await? {
        if let Some(ballot) = Ballot::from_utxo(poll, utxo)? {
            found.push(ballot);
        }
    }
    Ok(found)
}

/// Plan collecting every ballot at the counter, repaying each voter.
pub async fn redeem(ctx: &Context, poll: &Poll) -> Result<TallyPlan, WalletError> {
    let snapshot = ctx.snapshot().await?;
    let found = ballots(ctx.indexer.as_ref(), poll).await?;
    let plan = TallyPlan::new(poll, found, snapshot.change_address)?;
    for (choice, count) in plan.results() {
        log::info!("{:?}: {} ballot(s)", choice, count);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{self, asset, policy, utxo, FakeIndexer, FakeTx, FakeWallet, SELF_ADDR};
    use crate::Signer;
    use cnft_tx::{MintPolicy, Script, ScriptKind, TxPlan, VoteDatum};
    use cnft_types::{AssetMap, Quantity};
    use std::sync::Arc;

    const COUNTER: &str = "addr_test1wcounter";

    fn poll() -> Poll {
        Poll {
            reference_policy: policy(1),
            ballot_policy: MintPolicy {
                id: policy(7),
                script: Script {
                    kind: ScriptKind::PlutusV2,
                    cbor: "590a01".into(),
                },
                expiry_slot: None,
            },
            counter_address: COUNTER.into(),
            counter_script: Script {
                kind: ScriptKind::PlutusV2,
                cbor: "58b001".into(),
            },
            owner_key_hash: "ab".repeat(28),
            closes_ms: u64::MAX,
        }
    }

    fn holdings() -> Vec<cnft_types::Utxo> {
        vec![
            utxo(1, 0, SELF_ADDR, AssetMap::from_lovelace(2_000_000u64).with(asset(1, "A"), 1u64)),
            utxo(1, 1, SELF_ADDR, AssetMap::from_lovelace(2_000_000u64)
                .with(asset(1, "B"), 1u64)
                .with(asset(2, "X"), 1u64)),
            utxo(1, 2, SELF_ADDR, AssetMap::from_lovelace(9_000_000u64)),
        ]
    }

    fn counter_output(index: u32, voter: &str, vote: &str, names: &[&str]) -> cnft_types::Utxo {
        let mut assets = AssetMap::from_lovelace(1_500_000u64);
        for n in names {
            assets.add(asset(7, n), Quantity::from(1u32));
        }
        let mut u = utxo(50, index, COUNTER, assets);
        u.datum = Some(
            VoteDatum {
                voter: voter.into(),
                vote: vote.into(),
            }
            .to_data()
            .to_hex(),
        );
        u
    }

    #[test]
    fn test_voting_power_follows_filter() {
        let snapshot = LedgerSnapshot {
            utxos: holdings(),
            change_address: SELF_ADDR.into(),
            ..Default::default()
        };
        let power = voting_power(&snapshot, &poll(), &BTreeSet::new());
        assert_eq!(power.total(), Quantity::from(2u32));
        assert_eq!(power.matched_outputs.len(), 2);

        let excluded: BTreeSet<_> = [asset(1, "A")].into_iter().collect();
        let power = voting_power(&snapshot, &poll(), &excluded);
        assert_eq!(power.total(), Quantity::from(1u32));
        assert!(!power.matched_assets.contains(&asset(2, "X")));
    }

    #[tokio::test]
    async fn test_cast_and_settle_vote() {
        let wallet = FakeWallet::new(holdings());
        let tx = FakeTx::with_ledger(wallet.clone());
        let ctx = testing::context(wallet.clone(), tx.clone(), FakeIndexer::new()).await;

        let plan = cast(&ctx, &poll(), "yes", &BTreeSet::new()).await.unwrap();
        assert_eq!(plan.datum.voter, SELF_ADDR);
        assert_eq!(plan.ballots().policy_total(&policy(7)), Quantity::from(2u32));

        let outcome = ctx.executor().submit(&TxPlan::from(plan), &[Signer::Wallet]).await;
        assert!(outcome.hash().is_some(), "{:?}", outcome.error());
        // the voting tokens come straight back to the wallet
        let h = outcome.hash().unwrap();
        let back: Vec<_> = wallet.holdings().into_iter().filter(|u| u.out_ref.tx_hash == h).collect();
        assert_eq!(back.len(), 1);
        assert!(back[0].assets.contains(&asset(1, "A")) && back[0].assets.contains(&asset(1, "B")));
    }

    #[tokio::test]
    async fn test_cast_without_voting_tokens() {
        let wallet = FakeWallet::new(vec![utxo(1, 0, SELF_ADDR, AssetMap::from_lovelace(9_000_000u64))]);
        let ctx = testing::context(wallet, Arc::new(FakeTx::default()), FakeIndexer::new()).await;
        let err = cast(&ctx, &poll(), "yes", &BTreeSet::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[tokio::test]
    async fn test_redeem_collects_every_ballot() {
        let indexer = FakeIndexer::new();
        indexer.at.lock().unwrap().insert(
            COUNTER.into(),
            vec![
                counter_output(0, "addr_test1qalice", "yes", &["A", "B"]),
                // another poll's ballots share the counter
                utxo(50, 1, COUNTER, AssetMap::from_lovelace(1_500_000u64).with(asset(8, "Z"), 1u64)),
                counter_output(2, "addr_test1qbob", "no", &["C"]),
            ],
        );
        let ctx = testing::context(FakeWallet::new(holdings()), Arc::new(FakeTx::default()), indexer).await;

        let plan = redeem(&ctx, &poll()).await.unwrap();
        assert_eq!(plan.ballots.len(), 2);
        assert_eq!(plan.change_to, SELF_ADDR);
        assert_eq!(plan.results()["yes"], Quantity::from(2u32));
        let owed = plan.repayments();
        assert_eq!(owed["addr_test1qbob"].quantity(&asset(7, "C")), Quantity::from(1u32));
    }

    #[tokio::test]
    async fn test_redeem_with_empty_counter() {
        let ctx = testing::context(FakeWallet::new(holdings()), Arc::new(FakeTx::default()), FakeIndexer::new()).await;
        let err = redeem(&ctx, &poll()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
