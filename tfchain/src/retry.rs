use std::future::Future;
use std::time::Duration;

use log::error;
use subxt::utils::AccountId32;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::client::SubstrateClient;
use crate::error::{Error, Result};

const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Retry an extrinsic until it lands, the work turns out to be done already,
/// or the caller cancels.
///
/// One attempt is made up front. After a failure the loop waits ten seconds
/// (or returns the last error when cancelled first), then probes the matching
/// idempotency storage: another validator finishing the work counts as
/// success, otherwise the call is attempted again.
async fn retry_call<C, CF, P, PF>(
    cancel: &CancellationToken,
    what: &str,
    mut call: C,
    probe: P,
) -> Result<()>
where
    C: FnMut() -> CF,
    CF: Future<Output = Result<()>>,
    P: Fn() -> PF,
    PF: Future<Output = Result<bool>>,
{
    let mut last = call().await;
    while let Err(err) = last {
        error!("error while {what}: {err}");
        tokio::select! {
            _ = cancel.cancelled() => return Err(err),
            _ = sleep(RETRY_DELAY) => {}
        }
        if probe().await? {
            return Ok(());
        }
        last = call().await;
    }
    Ok(())
}

impl SubstrateClient {
    pub async fn retry_propose_mint_or_vote(
        &self,
        cancel: &CancellationToken,
        tx_id: &str,
        target: &AccountId32,
        amount: u64,
    ) -> Result<()> {
        retry_call(
            cancel,
            "proposing mint or voting",
            || self.propose_or_vote_mint_transaction(tx_id, target, amount),
            || async {
                match self.is_minted_already(tx_id).await {
                    Err(Error::MintTransactionNotFound) => Ok(false),
                    other => other,
                }
            },
        )
        .await
    }

    pub async fn retry_propose_burn_or_add_sig(
        &self,
        cancel: &CancellationToken,
        burn_id: u64,
        target: &str,
        amount: u64,
        signature: &str,
        stellar_address: &str,
        sequence_number: u64,
    ) -> Result<()> {
        retry_call(
            cancel,
            "proposing burn or adding signature",
            || {
                self.propose_burn_transaction_or_add_sig(
                    burn_id,
                    target,
                    amount,
                    signature,
                    stellar_address,
                    sequence_number,
                )
            },
            || self.is_burned_already(burn_id),
        )
        .await
    }

    pub async fn retry_set_burn_executed(
        &self,
        cancel: &CancellationToken,
        burn_id: u64,
    ) -> Result<()> {
        retry_call(
            cancel,
            "setting burn transaction as executed",
            || self.set_burn_transaction_executed(burn_id),
            || self.is_burned_already(burn_id),
        )
        .await
    }

    pub async fn retry_create_refund_or_add_sig(
        &self,
        cancel: &CancellationToken,
        tx_hash: &str,
        target: &str,
        amount: i64,
        signature: &str,
        stellar_address: &str,
        sequence_number: u64,
    ) -> Result<()> {
        retry_call(
            cancel,
            "creating refund transaction or adding signature",
            || {
                self.create_refund_transaction_or_add_sig(
                    tx_hash,
                    target,
                    amount,
                    signature,
                    stellar_address,
                    sequence_number,
                )
            },
            || self.is_refunded_already(tx_hash),
        )
        .await
    }

    pub async fn retry_set_refund_executed(
        &self,
        cancel: &CancellationToken,
        tx_hash: &str,
    ) -> Result<()> {
        retry_call(
            cancel,
            "setting refund transaction as executed",
            || self.set_refund_transaction_executed(tx_hash),
            || self.is_refunded_already(tx_hash),
        )
        .await
    }
}
