use anyhow::{Context, Result};
use log::info;
use tfchain_client::{RefundExpiredEvent, RefundReadyEvent};
use tokio_util::sync::CancellationToken;

use crate::bridge::Bridge;
use crate::chain::BridgeChain;
use crate::error::BridgeError;
use crate::logger;
use crate::stellar::{horizon::HorizonTransaction, BridgeWallet};

impl<C: BridgeChain, W: BridgeWallet> Bridge<C, W> {
    /// Reroute an unprocessable deposit into the refund flow. A fresh refund
    /// and an expired one are the same thing: both need a signature round
    /// under a new sequence number, so this feeds the expired handler.
    pub(crate) async fn refund(
        &mut self,
        destination: &str,
        amount: i64,
        tx: &HorizonTransaction,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        logger::event(
            "refund_initiated",
            "refund",
            &tx.hash,
            &format!("refunding {destination}: {reason}"),
        );
        self.handle_refund_expired(
            RefundExpiredEvent {
                hash: tx.hash.clone(),
                target: destination.to_string(),
                amount: amount as u64,
            },
            cancel,
        )
        .await?;

        info!("saving cursor now {}", tx.paging_token);
        self.persistency
            .save_stellar_cursor(&tx.paging_token)
            .context("error while saving cursor")?;
        Ok(())
    }

    /// Sign the refund payout and store the signature on chain. A refund that
    /// is already executed is plain success here, there is nothing to redo.
    pub(crate) async fn handle_refund_expired(
        &mut self,
        event: RefundExpiredEvent,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.tfchain.is_refunded_already(&event.hash).await? {
            info!("tx {} is refunded already, skipping...", event.hash);
            logger::event(
                "refund_skipped",
                "refund",
                &event.hash,
                "refund is already executed",
            );
            return Ok(());
        }

        let (signature, sequence_number) = self
            .wallet
            .create_refund_and_return_signature(&event.target, event.amount, &event.hash)
            .await?;
        let stellar_address = self.wallet.address().to_string();
        self.tfchain
            .retry_create_refund_or_add_sig(
                cancel,
                &event.hash,
                &event.target,
                event.amount as i64,
                &signature,
                &stellar_address,
                sequence_number,
            )
            .await
    }

    /// Quorum reached on a refund: pay the deposit back on stellar with the
    /// original hash in a return memo, then flag the refund as executed.
    pub(crate) async fn handle_refund_ready(
        &mut self,
        event: RefundReadyEvent,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.tfchain.is_refunded_already(&event.hash).await? {
            info!("tx {} is refunded already, skipping...", event.hash);
            return Err(BridgeError::TransactionAlreadyRefunded.into());
        }

        let refund = self.tfchain.get_refund_transaction(&event.hash).await?;
        let target = String::from_utf8_lossy(&refund.target).into_owned();
        let tx_hash = String::from_utf8_lossy(&refund.tx_hash).into_owned();

        self.wallet
            .create_refund_payment_with_signatures_and_submit(
                &target,
                refund.amount,
                &tx_hash,
                &refund.signatures,
                refund.sequence_number as i64,
            )
            .await?;

        self.tfchain.retry_set_refund_executed(cancel, &tx_hash).await
    }
}
