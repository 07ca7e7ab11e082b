use std::time::Duration;

use backoff::ExponentialBackoff;
use futures::StreamExt;
use log::{info, warn};
use subxt::backend::StreamOfResults;
use subxt::blocks::Block;
use subxt::events::StaticEvent;
use subxt::utils::AccountId32;
use subxt::OnlineClient;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::{SubstrateClient, TfchainConfig};
use crate::error::{Error, Result};

/// Total time spent trying to reopen a dropped finalized-heads subscription
/// before giving up.
const RESUBSCRIBE_MAX_ELAPSED: Duration = Duration::from_secs(600);

type FinalizedBlocks = StreamOfResults<Block<TfchainConfig, OnlineClient<TfchainConfig>>>;

/// Raw scale layouts of the bridge pallet events this validator acts on.
/// The pallet emits tuple variants, decoded here positionally.
mod raw {
    use super::*;
    use subxt::ext::scale_decode;

    #[derive(Debug, Clone, scale_decode::DecodeAsType)]
    #[decode_as_type(crate_path = "subxt::ext::scale_decode")]
    pub struct BurnTransactionCreated(pub u64, pub AccountId32, pub Vec<u8>, pub u64);

    impl StaticEvent for BurnTransactionCreated {
        const PALLET: &'static str = "TFTBridgeModule";
        const EVENT: &'static str = "BurnTransactionCreated";
    }

    #[derive(Debug, Clone, scale_decode::DecodeAsType)]
    #[decode_as_type(crate_path = "subxt::ext::scale_decode")]
    pub struct BurnTransactionReady(pub u64);

    impl StaticEvent for BurnTransactionReady {
        const PALLET: &'static str = "TFTBridgeModule";
        const EVENT: &'static str = "BurnTransactionReady";
    }

    #[derive(Debug, Clone, scale_decode::DecodeAsType)]
    #[decode_as_type(crate_path = "subxt::ext::scale_decode")]
    pub struct BurnTransactionExpired(
        pub u64,
        pub Option<AccountId32>,
        pub Vec<u8>,
        pub u64,
    );

    impl StaticEvent for BurnTransactionExpired {
        const PALLET: &'static str = "TFTBridgeModule";
        const EVENT: &'static str = "BurnTransactionExpired";
    }

    #[derive(Debug, Clone, scale_decode::DecodeAsType)]
    #[decode_as_type(crate_path = "subxt::ext::scale_decode")]
    pub struct RefundTransactionCreated(pub Vec<u8>, pub Vec<u8>, pub u64);

    impl StaticEvent for RefundTransactionCreated {
        const PALLET: &'static str = "TFTBridgeModule";
        const EVENT: &'static str = "RefundTransactionCreated";
    }

    #[derive(Debug, Clone, scale_decode::DecodeAsType)]
    #[decode_as_type(crate_path = "subxt::ext::scale_decode")]
    pub struct RefundTransactionReady(pub Vec<u8>);

    impl StaticEvent for RefundTransactionReady {
        const PALLET: &'static str = "TFTBridgeModule";
        const EVENT: &'static str = "RefundTransactionReady";
    }

    #[derive(Debug, Clone, scale_decode::DecodeAsType)]
    #[decode_as_type(crate_path = "subxt::ext::scale_decode")]
    pub struct RefundTransactionExpired(pub Vec<u8>, pub Vec<u8>, pub u64);

    impl StaticEvent for RefundTransactionExpired {
        const PALLET: &'static str = "TFTBridgeModule";
        const EVENT: &'static str = "RefundTransactionExpired";
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawCreatedEvent {
    pub id: u64,
    pub source: AccountId32,
    pub target: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawReadyEvent {
    pub id: u64,
}

/// Expired withdraws minted before runtime 147 carry no source account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawExpiredEvent {
    pub id: u64,
    pub source: Option<AccountId32>,
    pub target: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundCreatedEvent {
    pub hash: String,
    pub target: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundReadyEvent {
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundExpiredEvent {
    pub hash: String,
    pub target: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeEvents {
    pub withdraw_created: Vec<WithdrawCreatedEvent>,
    pub withdraw_ready: Vec<WithdrawReadyEvent>,
    pub withdraw_expired: Vec<WithdrawExpiredEvent>,
    pub refund_created: Vec<RefundCreatedEvent>,
    pub refund_ready: Vec<RefundReadyEvent>,
    pub refund_expired: Vec<RefundExpiredEvent>,
}

/// Bridge events of one finalized block. A decode or fetch failure is carried
/// inside the batch so the consumer decides whether it is fatal.
#[derive(Debug)]
pub struct EventBatch {
    pub height: u32,
    pub events: Result<BridgeEvents>,
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl SubstrateClient {
    /// Follow finalized heads and push one [`EventBatch`] per block into
    /// `sender`. Runs until cancelled or until the subscription cannot be
    /// reopened within the backoff window.
    pub async fn subscribe_bridge_events(
        &self,
        sender: mpsc::Sender<EventBatch>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut blocks = self.resubscribe().await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = blocks.next() => match next {
                    Some(Ok(block)) => {
                        let batch = self.events_for_block(&block).await;
                        if sender.send(batch).await.is_err() {
                            // consumer went away
                            return Ok(());
                        }
                    }
                    Some(Err(err)) => {
                        warn!("error with finalized heads subscription: {err}");
                        blocks = self.resubscribe().await?;
                    }
                    None => {
                        warn!("finalized heads subscription closed");
                        blocks = self.resubscribe().await?;
                    }
                },
            }
        }
    }

    /// Heads may skip numbers after a resubscribe; each batch carries its own
    /// height so the consumer never has to assume contiguity.
    async fn resubscribe(&self) -> Result<FinalizedBlocks> {
        let bo = ExponentialBackoff {
            max_elapsed_time: Some(RESUBSCRIBE_MAX_ELAPSED),
            ..ExponentialBackoff::default()
        };
        backoff::future::retry_notify(
            bo,
            || async {
                self.api()
                    .blocks()
                    .subscribe_finalized()
                    .await
                    .map_err(|e| backoff::Error::transient(Error::from(e)))
            },
            |err, wait| warn!("connection to chain lost, reopening connection in {wait:?}: {err}"),
        )
        .await
    }

    async fn events_for_block(
        &self,
        block: &Block<TfchainConfig, OnlineClient<TfchainConfig>>,
    ) -> EventBatch {
        let height = block.number();
        // block 0 carries no events worth decoding
        if height == 0 {
            return EventBatch {
                height,
                events: Ok(BridgeEvents::default()),
            };
        }

        info!("fetching events for blockheight {height}");
        let events = match block.events().await {
            Ok(records) => decode_bridge_events(&records),
            Err(err) => Err(Error::from(err)),
        };
        if let Err(err) = &events {
            warn!("failed to decode block events for height {height}: {err}");
        }
        EventBatch { height, events }
    }
}

fn decode_bridge_events(records: &subxt::events::Events<TfchainConfig>) -> Result<BridgeEvents> {
    let mut out = BridgeEvents::default();

    for ev in records.find::<raw::BurnTransactionCreated>() {
        let ev = ev?;
        info!("found burn transaction created event, ID {}", ev.0);
        out.withdraw_created.push(WithdrawCreatedEvent {
            id: ev.0,
            source: ev.1,
            target: lossy(&ev.2),
            amount: ev.3,
        });
    }

    for ev in records.find::<raw::BurnTransactionReady>() {
        let ev = ev?;
        info!("found burn transaction ready event, ID {}", ev.0);
        out.withdraw_ready.push(WithdrawReadyEvent { id: ev.0 });
    }

    for ev in records.find::<raw::BurnTransactionExpired>() {
        let ev = ev?;
        info!("found burn transaction expired event, ID {}", ev.0);
        out.withdraw_expired.push(WithdrawExpiredEvent {
            id: ev.0,
            source: ev.1,
            target: lossy(&ev.2),
            amount: ev.3,
        });
    }

    for ev in records.find::<raw::RefundTransactionCreated>() {
        let ev = ev?;
        info!("found refund transaction created event, hash {}", lossy(&ev.0));
        out.refund_created.push(RefundCreatedEvent {
            hash: lossy(&ev.0),
            target: lossy(&ev.1),
            amount: ev.2,
        });
    }

    for ev in records.find::<raw::RefundTransactionReady>() {
        let ev = ev?;
        info!("found refund transaction ready event, hash {}", lossy(&ev.0));
        out.refund_ready.push(RefundReadyEvent { hash: lossy(&ev.0) });
    }

    for ev in records.find::<raw::RefundTransactionExpired>() {
        let ev = ev?;
        info!("found expired refund transaction, hash {}", lossy(&ev.0));
        out.refund_expired.push(RefundExpiredEvent {
            hash: lossy(&ev.0),
            target: lossy(&ev.1),
            amount: ev.2,
        });
    }

    Ok(out)
}
