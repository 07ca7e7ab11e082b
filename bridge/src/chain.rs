use anyhow::Result;
use async_trait::async_trait;
use tfchain_client::{
    AccountId32, BurnTransaction, Entity, Error as ChainError, Farm, Node, RefundTransaction,
    SubstrateClient, Twin,
};
use tokio_util::sync::CancellationToken;

/// TFChain operations the bridge handlers depend on: idempotency probes,
/// record fetches, tfgrid lookups for the memo routing, and the retried
/// write operations.
#[async_trait]
pub trait BridgeChain: Send + Sync {
    /// True if a mint for this deposit hash was already executed. An absent
    /// record reads as false.
    async fn is_minted_already(&self, tx_id: &str) -> Result<bool>;

    async fn is_burned_already(&self, burn_id: u64) -> Result<bool>;

    async fn is_refunded_already(&self, tx_hash: &str) -> Result<bool>;

    async fn get_burn_transaction(&self, burn_id: u64) -> Result<BurnTransaction>;

    async fn get_refund_transaction(&self, tx_hash: &str) -> Result<RefundTransaction>;

    async fn get_twin(&self, id: u32) -> Result<Twin>;

    async fn get_farm(&self, id: u32) -> Result<Farm>;

    async fn get_node(&self, id: u32) -> Result<Node>;

    async fn get_entity(&self, id: u32) -> Result<Entity>;

    async fn retry_propose_mint_or_vote(
        &self,
        cancel: &CancellationToken,
        tx_id: &str,
        target: &AccountId32,
        amount: u64,
    ) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    async fn retry_propose_burn_or_add_sig(
        &self,
        cancel: &CancellationToken,
        burn_id: u64,
        target: &str,
        amount: u64,
        signature: &str,
        stellar_address: &str,
        sequence_number: u64,
    ) -> Result<()>;

    async fn retry_set_burn_executed(&self, cancel: &CancellationToken, burn_id: u64)
        -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    async fn retry_create_refund_or_add_sig(
        &self,
        cancel: &CancellationToken,
        tx_hash: &str,
        target: &str,
        amount: i64,
        signature: &str,
        stellar_address: &str,
        sequence_number: u64,
    ) -> Result<()>;

    async fn retry_set_refund_executed(
        &self,
        cancel: &CancellationToken,
        tx_hash: &str,
    ) -> Result<()>;
}

#[async_trait]
impl BridgeChain for SubstrateClient {
    async fn is_minted_already(&self, tx_id: &str) -> Result<bool> {
        match SubstrateClient::is_minted_already(self, tx_id).await {
            Err(ChainError::MintTransactionNotFound) => Ok(false),
            other => Ok(other?),
        }
    }

    async fn is_burned_already(&self, burn_id: u64) -> Result<bool> {
        Ok(SubstrateClient::is_burned_already(self, burn_id).await?)
    }

    async fn is_refunded_already(&self, tx_hash: &str) -> Result<bool> {
        Ok(SubstrateClient::is_refunded_already(self, tx_hash).await?)
    }

    async fn get_burn_transaction(&self, burn_id: u64) -> Result<BurnTransaction> {
        Ok(SubstrateClient::get_burn_transaction(self, burn_id).await?)
    }

    async fn get_refund_transaction(&self, tx_hash: &str) -> Result<RefundTransaction> {
        Ok(SubstrateClient::get_refund_transaction(self, tx_hash).await?)
    }

    async fn get_twin(&self, id: u32) -> Result<Twin> {
        Ok(SubstrateClient::get_twin(self, id).await?)
    }

    async fn get_farm(&self, id: u32) -> Result<Farm> {
        Ok(SubstrateClient::get_farm(self, id).await?)
    }

    async fn get_node(&self, id: u32) -> Result<Node> {
        Ok(SubstrateClient::get_node(self, id).await?)
    }

    async fn get_entity(&self, id: u32) -> Result<Entity> {
        Ok(SubstrateClient::get_entity(self, id).await?)
    }

    async fn retry_propose_mint_or_vote(
        &self,
        cancel: &CancellationToken,
        tx_id: &str,
        target: &AccountId32,
        amount: u64,
    ) -> Result<()> {
        Ok(SubstrateClient::retry_propose_mint_or_vote(self, cancel, tx_id, target, amount).await?)
    }

    async fn retry_propose_burn_or_add_sig(
        &self,
        cancel: &CancellationToken,
        burn_id: u64,
        target: &str,
        amount: u64,
        signature: &str,
        stellar_address: &str,
        sequence_number: u64,
    ) -> Result<()> {
        Ok(SubstrateClient::retry_propose_burn_or_add_sig(
            self,
            cancel,
            burn_id,
            target,
            amount,
            signature,
            stellar_address,
            sequence_number,
        )
        .await?)
    }

    async fn retry_set_burn_executed(
        &self,
        cancel: &CancellationToken,
        burn_id: u64,
    ) -> Result<()> {
        Ok(SubstrateClient::retry_set_burn_executed(self, cancel, burn_id).await?)
    }

    async fn retry_create_refund_or_add_sig(
        &self,
        cancel: &CancellationToken,
        tx_hash: &str,
        target: &str,
        amount: i64,
        signature: &str,
        stellar_address: &str,
        sequence_number: u64,
    ) -> Result<()> {
        Ok(SubstrateClient::retry_create_refund_or_add_sig(
            self,
            cancel,
            tx_hash,
            target,
            amount,
            signature,
            stellar_address,
            sequence_number,
        )
        .await?)
    }

    async fn retry_set_refund_executed(
        &self,
        cancel: &CancellationToken,
        tx_hash: &str,
    ) -> Result<()> {
        Ok(SubstrateClient::retry_set_refund_executed(self, cancel, tx_hash).await?)
    }
}
