use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use log::{debug, info};
use tfchain_client::AccountId32;
use tokio_util::sync::CancellationToken;

use crate::bridge::Bridge;
use crate::chain::BridgeChain;
use crate::error::BridgeError;
use crate::logger;
use crate::stellar::{horizon::HorizonTransaction, BridgeWallet};

/// Memo kinds a deposit can be routed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GridKind {
    Twin,
    Farm,
    Node,
    Entity,
}

/// Parse a deposit memo of the shape `<kind>_<numeric id>`.
pub(crate) fn parse_memo(memo: &str) -> Result<(GridKind, u32)> {
    let mut chunks = memo.split('_');
    let (Some(kind), Some(id), None) = (chunks.next(), chunks.next(), chunks.next()) else {
        bail!("memo text is not correctly formatted");
    };
    let id: u32 = id.parse().context("memo id is not a number")?;
    let kind = match kind {
        "twin" => GridKind::Twin,
        "farm" => GridKind::Farm,
        "node" => GridKind::Node,
        "entity" => GridKind::Entity,
        other => bail!("grid type {other} not supported"),
    };
    Ok((kind, id))
}

impl<C: BridgeChain, W: BridgeWallet> Bridge<C, W> {
    /// Deposit handler. Anything that cannot be minted is rerouted to the
    /// refund flow; only a deposit that is the stellar leg of one of our own
    /// refunds (a return memo) is skipped outright.
    pub(crate) async fn mint(
        &mut self,
        senders: &HashMap<String, i64>,
        tx: &HorizonTransaction,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.tfchain.is_minted_already(&tx.hash).await? {
            info!("transaction {} is already minted", tx.hash);
            return Err(BridgeError::TransactionAlreadyMinted.into());
        }

        if senders.is_empty() {
            return Ok(());
        }

        if senders.len() > 1 {
            info!("cannot process mint transaction, multiple senders found, refunding now");
            // only the first sender iterated gets its money back; the rest of
            // the deposit stays on the bridge account for manual follow-up
            let Some((sender, amount)) = senders.iter().next() else {
                return Ok(());
            };
            return self
                .refund(sender, *amount, tx, "multiple senders found", cancel)
                .await;
        }

        let Some((receiver, &amount)) = senders.iter().next() else {
            return Ok(());
        };

        if tx.memo.is_empty() {
            info!("transaction {} has an empty memo, refunding now", tx.hash);
            return self.refund(receiver, amount, tx, "empty memo", cancel).await;
        }

        if tx.memo_type == "return" {
            debug!(
                "transaction {} has a return memo hash, skipping this transaction",
                tx.hash
            );
            // this is the stellar side of a refund we issued; refunding it
            // again would loop forever
            self.persistency
                .save_stellar_cursor(&tx.paging_token)
                .context("error while saving cursor")?;
            info!("stellar cursor saved {}", tx.paging_token);
            return Ok(());
        }

        if amount <= self.deposit_fee {
            info!(
                "deposited amount {amount} is below the deposit fee, refunding now"
            );
            return self
                .refund(receiver, amount, tx, "insufficient deposit amount", cancel)
                .await;
        }

        let destination = match self.substrate_address_from_memo(&tx.memo).await {
            Ok(destination) => destination,
            Err(err) => {
                info!("error while decoding tx memo: {err:#}");
                return self.refund(receiver, amount, tx, "malformed memo", cancel).await;
            }
        };

        info!(
            "target substrate address to mint on: {destination}, amount {amount}, tx {}",
            tx.hash
        );
        self.tfchain
            .retry_propose_mint_or_vote(cancel, &tx.hash, &destination, amount as u64)
            .await?;
        logger::event("mint_proposed", "mint", &tx.hash, "mint proposed on tfchain");

        self.persistency
            .save_stellar_cursor(&tx.paging_token)
            .context("error while saving cursor")?;
        Ok(())
    }

    /// Resolve a memo to the account the mint should land on.
    async fn substrate_address_from_memo(&self, memo: &str) -> Result<AccountId32> {
        let (kind, id) = parse_memo(memo)?;
        match kind {
            GridKind::Twin => Ok(self.tfchain.get_twin(id).await?.account),
            GridKind::Farm => {
                let farm = self.tfchain.get_farm(id).await?;
                Ok(self.tfchain.get_twin(farm.twin_id).await?.account)
            }
            GridKind::Node => {
                let node = self.tfchain.get_node(id).await?;
                Ok(self.tfchain.get_twin(node.twin_id).await?.account)
            }
            GridKind::Entity => Ok(self.tfchain.get_entity(id).await?.account),
        }
    }
}
