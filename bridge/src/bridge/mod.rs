mod mint;
mod refund;
mod withdraw;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use tfchain_client::{EventBatch, SubstrateClient};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::chain::BridgeChain;
use crate::config::BridgeConfig;
use crate::error::{is_already_processed, BridgeError};
use crate::logger;
use crate::persistency::ChainPersistency;
use crate::stellar::{BridgeWallet, MintEventBatch, StellarWallet};

/// Interval of the bridge account balance stat.
const STAT_INTERVAL: Duration = Duration::from_secs(60);

/// Joins the two event streams and drives the deposit, withdraw and refund
/// flows. Owns both gateways, the resume cursors and the deposit fee for the
/// lifetime of the process.
pub struct Bridge<C = SubstrateClient, W = StellarWallet> {
    tfchain: C,
    wallet: W,
    persistency: ChainPersistency,
    deposit_fee: i64,
}

impl Bridge {
    pub async fn new(config: &BridgeConfig) -> Result<Self> {
        let urls: Vec<&str> = config.tfchain_url.split(',').map(str::trim).collect();
        let tfchain = SubstrateClient::new(urls, &config.tfchain_seed)
            .await
            .context("failed to create tfchain client")?;

        let persistency = ChainPersistency::new(&config.persistency_file);
        let wallet = StellarWallet::new(&config.stellar)
            .await
            .context("failed to create stellar wallet")?;

        if config.rescan_bridge_account {
            // a zero cursor makes the stream replay every transaction ever
            // made on the bridge account and mint accordingly
            persistency.save_stellar_cursor("0")?;
            persistency.save_height(0)?;
        }

        let deposit_fee = tfchain.get_deposit_fee().await? as i64;
        info!("bridge deposit fee is {deposit_fee} stroops");

        Ok(Self::with_parts(tfchain, wallet, persistency, deposit_fee))
    }

    /// Spawn both producers and drive the event loop until cancellation or an
    /// unrecoverable handler error.
    pub async fn start(mut self, cancel: CancellationToken) -> Result<()> {
        let state = self
            .persistency
            .get_height()
            .context("failed to get block height from persistency")?;

        info!("starting stellar subscription...");
        let (stellar_tx, stellar_rx) = mpsc::channel(1);
        let streamer = self.wallet.transaction_streamer();
        let stellar_task = tokio::spawn(streamer.run(
            state.stellar_cursor.clone(),
            stellar_tx,
            cancel.clone(),
        ));

        info!("starting tfchain subscription...");
        let (chain_tx, chain_rx) = mpsc::channel(1);
        let chain_client = self.tfchain.clone();
        let chain_cancel = cancel.clone();
        let chain_task = tokio::spawn(async move {
            if let Err(err) = chain_client
                .subscribe_bridge_events(chain_tx, chain_cancel)
                .await
            {
                warn!("tfchain subscription ended: {err}");
            }
        });

        let result = self.run(stellar_rx, chain_rx, &cancel).await;

        cancel.cancel();
        let _ = stellar_task.await;
        let _ = chain_task.await;
        result
    }
}

impl<C: BridgeChain, W: BridgeWallet> Bridge<C, W> {
    pub(crate) fn with_parts(
        tfchain: C,
        wallet: W,
        persistency: ChainPersistency,
        deposit_fee: i64,
    ) -> Self {
        Self {
            tfchain,
            wallet,
            persistency,
            deposit_fee,
        }
    }

    pub fn stellar_address(&self) -> &str {
        self.wallet.address()
    }

    /// The select loop. Handlers run one at a time; the producers block on
    /// the rendezvous channels while a handler is busy.
    pub(crate) async fn run(
        &mut self,
        mut stellar_rx: mpsc::Receiver<MintEventBatch>,
        mut chain_rx: mpsc::Receiver<EventBatch>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut stat = tokio::time::interval(STAT_INTERVAL);
        stat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(BridgeError::Cancelled.into()),
                batch = chain_rx.recv() => {
                    let batch = batch.ok_or_else(|| anyhow!("tfchain subscription closed"))?;
                    self.handle_chain_batch(batch, cancel).await?;
                }
                batch = stellar_rx.recv() => {
                    let batch = batch.ok_or_else(|| anyhow!("stellar subscription closed"))?;
                    self.handle_stellar_batch(batch, cancel).await?;
                }
                _ = stat.tick() => self.stat_bridge_account().await,
            }
        }
    }

    /// Handlers of one block run in a fixed order: a withdraw must have been
    /// proposed before its ready event can be acted on, same for refunds.
    pub(crate) async fn handle_chain_batch(
        &mut self,
        batch: EventBatch,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let events = batch.events.context("failed to process events")?;

        for event in events.withdraw_created {
            if let Err(err) = self.handle_withdraw_created(event, cancel).await {
                // burned or refunded (minted back on tfchain) before: skip
                if is_already_processed(&err) {
                    continue;
                }
                return Err(err.context("failed to handle withdraw created"));
            }
        }

        for event in events.withdraw_expired {
            if let Err(err) = self.handle_withdraw_expired(event, cancel).await {
                if is_already_processed(&err) {
                    continue;
                }
                return Err(err.context("failed to handle withdraw expired"));
            }
        }

        for event in events.withdraw_ready {
            let id = event.id;
            if let Err(err) = self.handle_withdraw_ready(event, cancel).await {
                if is_already_processed(&err) {
                    continue;
                }
                return Err(err.context("failed to handle withdraw ready"));
            }
            info!("withdraw {id} processed");
        }

        for event in events.refund_created {
            logger::event(
                "refund_created",
                "refund",
                &event.hash,
                "refund transaction created on tfchain",
            );
        }

        for event in events.refund_expired {
            if let Err(err) = self.handle_refund_expired(event, cancel).await {
                if is_already_processed(&err) {
                    continue;
                }
                return Err(err.context("failed to handle refund expired"));
            }
        }

        for event in events.refund_ready {
            let hash = event.hash.clone();
            if let Err(err) = self.handle_refund_ready(event, cancel).await {
                if is_already_processed(&err) {
                    continue;
                }
                return Err(err.context("failed to handle refund ready"));
            }
            info!("refund {hash} processed");
        }

        self.persistency.save_height(batch.height)?;
        Ok(())
    }

    pub(crate) async fn handle_stellar_batch(
        &mut self,
        batch: MintEventBatch,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for event in batch.events {
            let hash = event.tx.hash.clone();
            if let Err(err) = self.mint(&event.senders, &event.tx, cancel).await {
                if is_already_processed(&err) {
                    continue;
                }
                return Err(err.context("failed to handle mint"));
            }
            info!("mint {hash} processed");
        }
        Ok(())
    }

    async fn stat_bridge_account(&mut self) {
        match self.wallet.stat_bridge_account().await {
            Ok(balance) => {
                if let Ok(value) = balance.parse::<f64>() {
                    metrics::gauge!("bridge_wallet_balance").set(value);
                }
                logger::metric("wallet_balance", "vault", "", &balance);
            }
            Err(err) => warn!("failed to stat bridge account: {err:#}"),
        }
    }
}
