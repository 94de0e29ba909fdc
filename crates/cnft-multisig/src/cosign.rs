//! Two-phase signing across principals that never share keys.
//!
//! The initiator finalizes a plan and signs it without submitting. Each
//! later principal rebuilds the same plan on its own side, checks that the
//! finalized body is byte-identical to the one it was handed, and adds its
//! witness. The last principal submits.

use crate::tx_set::PartialSignedTx;
use crate::MultisigError;
use cnft_tx::TxPlan;
use cnft_wallet::settle::check_hash;
use cnft_wallet::{SettleError, Signer, Stage, TxBackend, UnsignedTx};

async fn rebuild(tx: &dyn TxBackend, plan: &TxPlan) -> Result<UnsignedTx, MultisigError> {
    let draft = plan.lower().map_err(SettleError::from)?;
    let body = tx.finalize(&draft).await.map_err(|source| SettleError::Stage {
        stage: Stage::Finalize,
        source,
    })?;
    Ok(body)
}

async fn rebuild_matching(
    tx: &dyn TxBackend,
    plan: &TxPlan,
    stored: &PartialSignedTx,
) -> Result<UnsignedTx, MultisigError> {
    if stored.kind != plan.kind() {
        return Err(MultisigError::KindMismatch {
            stored: stored.kind.clone(),
            rebuilt: plan.kind().to_string(),
        });
    }
    let body = rebuild(tx, plan).await?;
    if !stored.matches(&body) {
        log::warn!("{} plan rebuilt to a different body; refusing to sign", plan.kind());
        return Err(MultisigError::BodyMismatch {
            stored: stored.body_hex.clone(),
            rebuilt: body.body_hex(),
        });
    }
    Ok(body)
}

async fn sign(tx: &dyn TxBackend, body: &UnsignedTx, signer: &Signer) -> Result<cnft_wallet::Witness, MultisigError> {
    let witness = tx.sign(body, signer).await.map_err(|source| SettleError::Stage {
        stage: Stage::Sign,
        source,
    })?;
    Ok(witness)
}

/// Phase one: finalize `plan` and sign it as `signer`. Nothing is submitted.
pub async fn initiate(tx: &dyn TxBackend, plan: &TxPlan, signer: &Signer) -> Result<PartialSignedTx, MultisigError> {
    let body = rebuild(tx, plan).await?;
    let mut partial = PartialSignedTx::new(plan.kind(), &body);
    partial.add_witness(sign(tx, &body, signer).await?);
    log::info!("{} transaction initiated with 1 witness", plan.kind());
    Ok(partial)
}

/// Add `signer`'s witness to `stored` without submitting, for groups with
/// more than two principals.
pub async fn cosign(
    tx: &dyn TxBackend,
    plan: &TxPlan,
    stored: &PartialSignedTx,
    signer: &Signer,
) -> Result<PartialSignedTx, MultisigError> {
    let body = rebuild_matching(tx, plan, stored).await?;
    let mut next = stored.clone();
    next.add_witness(sign(tx, &body, signer).await?);
    log::info!("{} transaction now has {} witnesses", plan.kind(), next.witnesses.len());
    Ok(next)
}

/// Phase two: rebuild, verify, add our witness, assemble and submit.
///
/// Returns the transaction hash. A body mismatch fails before anything is
/// signed or submitted.
pub async fn complete(
    tx: &dyn TxBackend,
    plan: &TxPlan,
    stored: &PartialSignedTx,
    signer: &Signer,
) -> Result<String, MultisigError> {
    let body = rebuild_matching(tx, plan, stored).await?;
    let mut witnesses = stored.witnesses.clone();
    witnesses.push(sign(tx, &body, signer).await?);

    let signed = tx
        .assemble(&body, &witnesses)
        .await
        .map_err(|source| SettleError::Stage {
            stage: Stage::Sign,
            source,
        })?;
    let hash = tx.submit(&signed).await.map_err(|source| SettleError::Stage {
        stage: Stage::Submit,
        source,
    })?;
    check_hash(&hash)?;
    log::info!("{} transaction submitted with {} witnesses: {}", plan.kind(), witnesses.len(), hash);
    Ok(hash)
}
