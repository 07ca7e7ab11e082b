use subxt::dynamic::Value;
use subxt::ext::scale_decode;
use subxt::utils::AccountId32;

use crate::client::SubstrateClient;
use crate::error::{Error, Result};

/// Detached stellar signature stored on chain next to a burn or refund record.
#[derive(Debug, Clone, PartialEq, Eq, scale_decode::DecodeAsType)]
#[decode_as_type(crate_path = "subxt::ext::scale_decode")]
pub struct StellarSignature {
    pub signature: Vec<u8>,
    pub stellar_address: Vec<u8>,
}

/// Withdraw record as stored in `TFTBridgeModule.BurnTransactions`.
#[derive(Debug, Clone, scale_decode::DecodeAsType)]
#[decode_as_type(crate_path = "subxt::ext::scale_decode")]
pub struct BurnTransaction {
    pub block: u32,
    pub amount: u64,
    pub source: Option<AccountId32>,
    pub target: Vec<u8>,
    pub signatures: Vec<StellarSignature>,
    pub sequence_number: u64,
}

impl SubstrateClient {
    pub async fn get_burn_transaction(&self, burn_id: u64) -> Result<BurnTransaction> {
        let record = self
            .fetch_storage(
                "TFTBridgeModule",
                "BurnTransactions",
                vec![Value::u128(burn_id.into())],
            )
            .await?
            .ok_or(Error::BurnTransactionNotFound)?;
        Ok(record.as_type::<BurnTransaction>()?)
    }

    pub async fn is_burned_already(&self, burn_id: u64) -> Result<bool> {
        let record = self
            .fetch_storage(
                "TFTBridgeModule",
                "ExecutedBurnTransactions",
                vec![Value::u128(burn_id.into())],
            )
            .await?;
        Ok(record.is_some())
    }

    pub async fn propose_burn_transaction_or_add_sig(
        &self,
        burn_id: u64,
        target: &str,
        amount: u64,
        signature: &str,
        stellar_address: &str,
        sequence_number: u64,
    ) -> Result<()> {
        let tx = subxt::dynamic::tx(
            "TFTBridgeModule",
            "propose_burn_transaction_or_add_sig",
            vec![
                Value::u128(burn_id.into()),
                Value::from_bytes(target),
                Value::u128(amount.into()),
                Value::from_bytes(signature),
                Value::from_bytes(stellar_address),
                Value::u128(sequence_number.into()),
            ],
        );
        self.submit_watched(&tx).await
    }

    pub async fn set_burn_transaction_executed(&self, burn_id: u64) -> Result<()> {
        let tx = subxt::dynamic::tx(
            "TFTBridgeModule",
            "set_burn_transaction_executed",
            vec![Value::u128(burn_id.into())],
        );
        self.submit_watched(&tx).await
    }

    /// User-side entry point of the withdraw flow: burn TFT on chain and have
    /// the bridge pay it out to `target` on stellar.
    pub async fn swap_to_stellar(&self, target: &str, amount: u128) -> Result<()> {
        let tx = subxt::dynamic::tx(
            "TFTBridgeModule",
            "swap_to_stellar",
            vec![Value::from_bytes(target), Value::u128(amount)],
        );
        self.submit_watched(&tx).await
    }
}
