use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::Deserialize;

/// Thin horizon REST client covering the handful of endpoints the bridge
/// consumes. Pagination state lives with the caller as an opaque cursor.
#[derive(Debug, Clone)]
pub struct Horizon {
    http: reqwest::Client,
    base: String,
}

impl Horizon {
    pub fn new(base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub async fn account(&self, account_id: &str) -> Result<HorizonAccount> {
        let url = format!("{}/accounts/{}", self.base, account_id);
        self.get_json(&url)
            .await
            .with_context(|| format!("failed to get account details for account: {account_id}"))
    }

    /// One page of transactions touching `account_id`, oldest first, strictly
    /// after `cursor`. An empty page means the tail has been reached.
    pub async fn account_transactions(
        &self,
        account_id: &str,
        cursor: &str,
    ) -> Result<Vec<HorizonTransaction>> {
        let url = format!("{}/accounts/{}/transactions", self.base, account_id);
        debug!("fetching transactions for {account_id} from cursor {cursor:?}");
        let page: Page<HorizonTransaction> = self
            .http
            .get(&url)
            .query(&[("order", "asc"), ("cursor", cursor)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("failed to decode transactions page")?;
        Ok(page.embedded.records)
    }

    pub async fn transaction_effects(&self, tx_hash: &str) -> Result<Vec<HorizonEffect>> {
        let url = format!("{}/transactions/{}/effects", self.base, tx_hash);
        let page: Page<HorizonEffect> = self.get_json(&url).await?;
        Ok(page.embedded.records)
    }

    pub async fn transaction_operations(&self, tx_hash: &str) -> Result<Vec<HorizonOperation>> {
        let url = format!("{}/transactions/{}/operations", self.base, tx_hash);
        let page: Page<HorizonOperation> = self.get_json(&url).await?;
        Ok(page.embedded.records)
    }

    /// Submit a signed envelope. Horizon reports rejections as a problem
    /// document whose extras carry the result codes; the whole body is kept
    /// in the error for the operator.
    pub async fn submit_transaction(&self, envelope_xdr: &str) -> Result<HorizonTransaction> {
        let url = format!("{}/transactions", self.base);
        let response = self
            .http
            .post(&url)
            .form(&[("tx", envelope_xdr)])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("horizon rejected transaction ({status}): {body}"));
        }
        response
            .json()
            .await
            .context("failed to decode submitted transaction")
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        Ok(self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(rename = "_embedded")]
    embedded: Embedded<T>,
}

#[derive(Debug, Deserialize)]
struct Embedded<T> {
    records: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HorizonTransaction {
    pub hash: String,
    #[serde(default)]
    pub successful: bool,
    #[serde(default)]
    pub paging_token: String,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub memo_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HorizonAccount {
    pub account_id: String,
    pub sequence: String,
    pub thresholds: Thresholds,
    #[serde(default)]
    pub balances: Vec<Balance>,
}

impl HorizonAccount {
    pub fn sequence_number(&self) -> Result<i64> {
        self.sequence
            .parse()
            .with_context(|| format!("invalid sequence number {:?}", self.sequence))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thresholds {
    #[serde(default)]
    pub low_threshold: u8,
    #[serde(default)]
    pub med_threshold: u8,
    #[serde(default)]
    pub high_threshold: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Balance {
    #[serde(default)]
    pub balance: String,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub asset_type: String,
    #[serde(default)]
    pub asset_code: Option<String>,
    #[serde(default)]
    pub asset_issuer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HorizonEffect {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub asset_code: Option<String>,
    #[serde(default)]
    pub asset_issuer: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HorizonOperation {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub asset_code: Option<String>,
    #[serde(default)]
    pub asset_issuer: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_an_account_with_trustlines() {
        let raw = r#"{
            "account_id": "GBRIDGE",
            "sequence": "17179869184",
            "thresholds": {"low_threshold": 1, "med_threshold": 2, "high_threshold": 3},
            "balances": [
                {"balance": "100.0000000", "asset_type": "native"},
                {"balance": "5.5000000", "limit": "922337203685.4775807",
                 "asset_type": "credit_alphanum4", "asset_code": "TFT",
                 "asset_issuer": "GISSUER"}
            ]
        }"#;
        let account: HorizonAccount = serde_json::from_str(raw).unwrap();
        assert_eq!(account.sequence_number().unwrap(), 17_179_869_184);
        assert_eq!(account.thresholds.med_threshold, 2);
        assert_eq!(account.balances.len(), 2);
        assert_eq!(account.balances[1].asset_code.as_deref(), Some("TFT"));
    }

    #[test]
    fn decodes_a_transaction_page() {
        let raw = r#"{
            "_embedded": {"records": [
                {"hash": "abc01", "successful": true, "paging_token": "100",
                 "memo": "twin_42", "memo_type": "text"},
                {"hash": "abc02", "successful": false, "paging_token": "101",
                 "memo_type": "none"}
            ]}
        }"#;
        let page: Page<HorizonTransaction> = serde_json::from_str(raw).unwrap();
        assert_eq!(page.embedded.records.len(), 2);
        assert_eq!(page.embedded.records[0].memo, "twin_42");
        assert!(!page.embedded.records[1].successful);
        assert!(page.embedded.records[1].memo.is_empty());
    }
}
