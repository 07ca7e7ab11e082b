use subxt::dynamic::Value;
use subxt::ext::scale_decode;

use crate::burning::StellarSignature;
use crate::client::SubstrateClient;
use crate::error::{Error, Result};

/// Refund record as stored in `TFTBridgeModule.RefundTransactions`, keyed by
/// the hash of the original stellar deposit.
#[derive(Debug, Clone, scale_decode::DecodeAsType)]
#[decode_as_type(crate_path = "subxt::ext::scale_decode")]
pub struct RefundTransaction {
    pub block: u32,
    pub amount: u64,
    pub target: Vec<u8>,
    pub tx_hash: Vec<u8>,
    pub signatures: Vec<StellarSignature>,
    pub sequence_number: u64,
}

impl SubstrateClient {
    pub async fn get_refund_transaction(&self, tx_hash: &str) -> Result<RefundTransaction> {
        let record = self
            .fetch_storage(
                "TFTBridgeModule",
                "RefundTransactions",
                vec![Value::from_bytes(tx_hash)],
            )
            .await?
            .ok_or(Error::RefundTransactionNotFound)?;
        Ok(record.as_type::<RefundTransaction>()?)
    }

    pub async fn is_refunded_already(&self, tx_hash: &str) -> Result<bool> {
        let record = self
            .fetch_storage(
                "TFTBridgeModule",
                "ExecutedRefundTransactions",
                vec![Value::from_bytes(tx_hash)],
            )
            .await?;
        Ok(record.is_some())
    }

    pub async fn create_refund_transaction_or_add_sig(
        &self,
        tx_hash: &str,
        target: &str,
        amount: i64,
        signature: &str,
        stellar_address: &str,
        sequence_number: u64,
    ) -> Result<()> {
        let tx = subxt::dynamic::tx(
            "TFTBridgeModule",
            "create_refund_transaction_or_add_sig",
            vec![
                Value::from_bytes(tx_hash),
                Value::from_bytes(target),
                Value::u128(amount as u128),
                Value::from_bytes(signature),
                Value::from_bytes(stellar_address),
                Value::u128(sequence_number.into()),
            ],
        );
        self.submit_watched(&tx).await
    }

    pub async fn set_refund_transaction_executed(&self, tx_hash: &str) -> Result<()> {
        let tx = subxt::dynamic::tx(
            "TFTBridgeModule",
            "set_refund_transaction_executed",
            vec![Value::from_bytes(tx_hash)],
        );
        self.submit_watched(&tx).await
    }
}
