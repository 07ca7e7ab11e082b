use subxt::dynamic::Value;
use subxt::utils::AccountId32;

use crate::client::SubstrateClient;
use crate::error::{Error, Result};

impl SubstrateClient {
    /// Probe `ExecutedMintTransactions`. An absent record surfaces as
    /// [`Error::MintTransactionNotFound`], which callers treat as "not minted
    /// yet".
    pub async fn is_minted_already(&self, mint_tx_id: &str) -> Result<bool> {
        let record = self
            .fetch_storage(
                "TFTBridgeModule",
                "ExecutedMintTransactions",
                vec![Value::from_bytes(mint_tx_id)],
            )
            .await?;
        if record.is_none() {
            return Err(Error::MintTransactionNotFound);
        }
        Ok(true)
    }

    pub async fn propose_or_vote_mint_transaction(
        &self,
        tx_id: &str,
        target: &AccountId32,
        amount: u64,
    ) -> Result<()> {
        let tx = subxt::dynamic::tx(
            "TFTBridgeModule",
            "propose_or_vote_mint_transaction",
            vec![
                Value::from_bytes(tx_id),
                Value::from_bytes(target.0),
                Value::u128(amount.into()),
            ],
        );
        self.submit_watched(&tx).await
    }
}
