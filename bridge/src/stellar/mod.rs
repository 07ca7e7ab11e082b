pub mod amount;
pub mod horizon;
pub mod txn;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use log::{debug, error, info};
use stellar_xdr::curr::Memo;
use tfchain_client::StellarSignature;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::StellarConfig;
use self::horizon::{Horizon, HorizonTransaction};

/// How long the tail poller sleeps when horizon has no new transactions.
const TAIL_POLL_DELAY: Duration = Duration::from_secs(10);
/// Backoff after a failed horizon fetch.
const FETCH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Stellar operations the bridge handlers depend on. The wallet owns the
/// shared account's sequence cache, so the signing operations take `&mut`.
#[async_trait]
pub trait BridgeWallet: Send {
    /// This validator's stellar address.
    fn address(&self) -> &str;

    /// Verify `account` holds a TFT trustline with a positive limit.
    async fn check_account(&self, account: &str) -> Result<()>;

    /// Build and sign a payment for withdraw `tx_id`; returns the base64
    /// signature and the sequence number it commits to.
    async fn create_payment_and_return_signature(
        &mut self,
        target: &str,
        amount: u64,
        tx_id: u64,
    ) -> Result<(String, u64)>;

    /// As above but with a `MemoReturn` carrying the refunded deposit hash.
    async fn create_refund_and_return_signature(
        &mut self,
        target: &str,
        amount: u64,
        tx_hash: &str,
    ) -> Result<(String, u64)>;

    /// Rebuild the payment at `sequence_number`, attach the stored quorum
    /// signatures and submit it.
    async fn create_payment_with_signatures_and_submit(
        &mut self,
        target: &str,
        amount: u64,
        signatures: &[StellarSignature],
        sequence_number: i64,
    ) -> Result<()>;

    /// As above with the refund memo rebuilt from `tx_hash`.
    async fn create_refund_payment_with_signatures_and_submit(
        &mut self,
        target: &str,
        amount: u64,
        tx_hash: &str,
        signatures: &[StellarSignature],
        sequence_number: i64,
    ) -> Result<()>;

    /// TFT balance of the bridge account, for telemetry.
    async fn stat_bridge_account(&self) -> Result<String>;
}

/// Sequence cache for the shared bridge account.
///
/// Every bridge payment consumes exactly one sequence number. The first
/// validator to propose picks the next free one and stores it on chain;
/// co-signers adopt the stored number so all signatures cover one identical
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SequenceCache(i64);

impl SequenceCache {
    pub(crate) fn new(current: i64) -> Self {
        Self(current)
    }

    /// A zero hint means we originate the proposal and claim the next number;
    /// any other hint pins the cache to the proposer's choice.
    pub(crate) fn next(&mut self, hint: i64) -> i64 {
        if hint == 0 {
            self.0 += 1;
        } else {
            self.0 = hint;
        }
        self.0
    }

    pub(crate) fn reset(&mut self, on_chain: i64) {
        self.0 = on_chain;
    }

    pub(crate) fn current(&self) -> i64 {
        self.0
    }
}

/// The bridge wallet: this validator's keypair plus the view on the shared
/// custodial account all payments are funded from.
pub struct StellarWallet {
    keypair: SigningKey,
    address: String,
    config: StellarConfig,
    horizon: Horizon,
    signature_count: usize,
    sequence: SequenceCache,
}

impl StellarWallet {
    pub async fn new(config: &StellarConfig) -> Result<Self> {
        let secret = stellar_strkey::ed25519::PrivateKey::from_string(&config.stellar_seed)
            .map_err(|e| anyhow!("invalid stellar secret: {e}"))?;
        let keypair = SigningKey::from_bytes(&secret.0);
        let address = stellar_strkey::ed25519::PublicKey(keypair.verifying_key().to_bytes())
            .to_string()
            .to_string();

        let horizon = Horizon::new(&config.horizon_url());
        let account = horizon.account(&config.stellar_bridge_account).await?;

        let mut signature_count = account.thresholds.med_threshold as usize;
        if signature_count == 0 {
            signature_count = 1;
        }
        info!("required signature count {signature_count}");

        let sequence = SequenceCache::new(account.sequence_number()?);
        info!(
            "account {} loaded with sequence number {}",
            account.account_id,
            sequence.current()
        );

        Ok(Self {
            keypair,
            address,
            config: config.clone(),
            horizon,
            signature_count,
            sequence,
        })
    }

    /// Producer half for the engine: tails the bridge account transactions.
    pub fn transaction_streamer(&self) -> TransactionStreamer {
        let (asset_code, asset_issuer) = self.config.stellar_network.tft_asset();
        TransactionStreamer {
            horizon: self.horizon.clone(),
            bridge_account: self.config.stellar_bridge_account.clone(),
            asset_code: asset_code.to_string(),
            asset_issuer: asset_issuer.to_string(),
        }
    }

    async fn payment_transaction(
        &mut self,
        target: &str,
        amount: u64,
        sequence_hint: i64,
        memo: Memo,
    ) -> Result<stellar_xdr::curr::Transaction> {
        if amount == 0 {
            bail!("invalid amount");
        }
        let source = self
            .horizon
            .account(&self.config.stellar_bridge_account)
            .await
            .context("failed to get source account")?;
        let (code, issuer) = self.config.stellar_network.tft_asset();
        let sequence = self.sequence.next(sequence_hint);
        txn::build_payment(
            &source.account_id,
            target,
            txn::credit_asset(code, issuer)?,
            amount as i64,
            sequence,
            memo,
        )
    }

    async fn submit(&mut self, envelope: &stellar_xdr::curr::TransactionEnvelope) -> Result<()> {
        let encoded = txn::envelope_base64(envelope)?;
        match self.horizon.submit_transaction(&encoded).await {
            Ok(tx) => {
                info!("transaction submitted to the stellar network, hash {}", tx.hash);
                Ok(())
            }
            Err(err) => {
                error!("error while submitting transaction: {err:#}");
                self.reset_account_sequence().await?;
                Err(err.context("error submitting transaction"))
            }
        }
    }

    /// Re-read the on-chain sequence after a failed submission; the cache may
    /// have drifted past numbers that never landed.
    async fn reset_account_sequence(&mut self) -> Result<()> {
        info!("resetting account sequence");
        let account = self
            .horizon
            .account(&self.config.stellar_bridge_account)
            .await?;
        self.sequence.reset(account.sequence_number()?);
        Ok(())
    }
}

#[async_trait]
impl BridgeWallet for StellarWallet {
    fn address(&self) -> &str {
        &self.address
    }

    async fn check_account(&self, account: &str) -> Result<()> {
        let account = self.horizon.account(account).await?;
        let (code, issuer) = self.config.stellar_network.tft_asset();

        for balance in &account.balances {
            if balance.asset_code.as_deref() != Some(code)
                || balance.asset_issuer.as_deref() != Some(issuer)
            {
                continue;
            }
            let limit: f64 = match balance.limit.as_deref().unwrap_or("").parse() {
                Ok(limit) => limit,
                // no limit means no trustline entry worth considering
                Err(_) => continue,
            };
            if limit > 0.0 {
                return Ok(());
            }
        }
        bail!("address has no trustline")
    }

    async fn create_payment_and_return_signature(
        &mut self,
        target: &str,
        amount: u64,
        tx_id: u64,
    ) -> Result<(String, u64)> {
        debug!("signing payment for withdraw {tx_id}");
        let tx = self
            .payment_transaction(target, amount, 0, Memo::None)
            .await?;
        let signature = txn::sign(&tx, self.config.stellar_network.passphrase(), &self.keypair)?;
        Ok((txn::signature_base64(&signature), tx.seq_num.0 as u64))
    }

    async fn create_refund_and_return_signature(
        &mut self,
        target: &str,
        amount: u64,
        tx_hash: &str,
    ) -> Result<(String, u64)> {
        let memo = txn::return_memo(tx_hash)?;
        let tx = self.payment_transaction(target, amount, 0, memo).await?;
        let signature = txn::sign(&tx, self.config.stellar_network.passphrase(), &self.keypair)?;
        Ok((txn::signature_base64(&signature), tx.seq_num.0 as u64))
    }

    async fn create_payment_with_signatures_and_submit(
        &mut self,
        target: &str,
        amount: u64,
        signatures: &[StellarSignature],
        sequence_number: i64,
    ) -> Result<()> {
        let tx = self
            .payment_transaction(target, amount, sequence_number, Memo::None)
            .await?;
        let envelope = txn::attach_signatures(tx, signatures, self.signature_count)?;
        self.submit(&envelope).await
    }

    async fn create_refund_payment_with_signatures_and_submit(
        &mut self,
        target: &str,
        amount: u64,
        tx_hash: &str,
        signatures: &[StellarSignature],
        sequence_number: i64,
    ) -> Result<()> {
        let memo = txn::return_memo(tx_hash)?;
        let tx = self
            .payment_transaction(target, amount, sequence_number, memo)
            .await?;
        let envelope = txn::attach_signatures(tx, signatures, self.signature_count)?;
        self.submit(&envelope).await
    }

    async fn stat_bridge_account(&self) -> Result<String> {
        let account = self
            .horizon
            .account(&self.config.stellar_bridge_account)
            .await?;
        let (code, issuer) = self.config.stellar_network.tft_asset();
        account
            .balances
            .iter()
            .find(|b| {
                b.asset_code.as_deref() == Some(code) && b.asset_issuer.as_deref() == Some(issuer)
            })
            .map(|b| b.balance.clone())
            .ok_or_else(|| anyhow!("bridge account holds no TFT balance"))
    }
}

/// One incoming transaction that credited the bridge account, with the
/// deposited amount aggregated per sending address.
#[derive(Debug, Clone)]
pub struct MintEvent {
    pub senders: HashMap<String, i64>,
    pub tx: HorizonTransaction,
}

/// What the stellar producer pushes into the engine, one batch per fetched
/// transaction.
#[derive(Debug, Clone, Default)]
pub struct MintEventBatch {
    pub events: Vec<MintEvent>,
}

/// Tail producer over the bridge account's transactions. Replays history from
/// the given cursor first, then keeps polling for new entries.
pub struct TransactionStreamer {
    horizon: Horizon,
    bridge_account: String,
    asset_code: String,
    asset_issuer: String,
}

impl TransactionStreamer {
    pub async fn run(
        self,
        mut cursor: String,
        sender: mpsc::Sender<MintEventBatch>,
        cancel: CancellationToken,
    ) {
        'stream: loop {
            if cancel.is_cancelled() {
                return;
            }
            debug!(
                "fetching stellar transactions, account {} horizon {} cursor {:?}",
                self.bridge_account,
                self.horizon.base_url(),
                cursor
            );

            let page = match self
                .horizon
                .account_transactions(&self.bridge_account, &cursor)
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    error!("error getting transactions for stellar account: {err:#}");
                    if sleep_or_cancelled(&cancel, FETCH_RETRY_DELAY).await {
                        return;
                    }
                    continue;
                }
            };

            if page.is_empty() {
                if sleep_or_cancelled(&cancel, TAIL_POLL_DELAY).await {
                    return;
                }
                continue;
            }

            for tx in page {
                let events = match self.process_transaction(&tx).await {
                    Ok(events) => events,
                    Err(err) => {
                        // leave the cursor where it is and refetch the page
                        error!("error while fetching transaction effects: {err:#}");
                        if sleep_or_cancelled(&cancel, FETCH_RETRY_DELAY).await {
                            return;
                        }
                        continue 'stream;
                    }
                };
                if sender.send(MintEventBatch { events }).await.is_err() {
                    return;
                }
                cursor = tx.paging_token.clone();
            }
        }
    }

    /// Turn one horizon transaction into at most one [`MintEvent`].
    ///
    /// Only successful transactions that credited the bridge account with TFT
    /// count. Amounts come from the payment operations targeting the bridge
    /// account, aggregated per sender. A transaction carrying any non-payment
    /// operation is skipped entirely.
    async fn process_transaction(&self, tx: &HorizonTransaction) -> Result<Vec<MintEvent>> {
        if !tx.successful {
            return Ok(vec![]);
        }
        info!("received transaction on bridge stellar account, hash {}", tx.hash);

        let effects = self.horizon.transaction_effects(&tx.hash).await?;
        let credited = effects.iter().any(|effect| {
            effect.account == self.bridge_account
                && effect.kind == "account_credited"
                && effect.asset_code.as_deref() == Some(self.asset_code.as_str())
                && effect.asset_issuer.as_deref() == Some(self.asset_issuer.as_str())
        });
        if !credited {
            return Ok(vec![]);
        }

        let operations = self.horizon.transaction_operations(&tx.hash).await?;
        let mut senders: HashMap<String, i64> = HashMap::new();
        for op in operations {
            if op.kind != "payment" {
                return Ok(vec![]);
            }
            if op.to.as_deref() != Some(self.bridge_account.as_str()) {
                continue;
            }
            let Some(from) = op.from else { continue };
            let deposited = match op.amount.as_deref().map(amount::parse) {
                Some(Ok(amount)) => amount,
                _ => continue,
            };
            *senders.entry(from).or_insert(0) += deposited;
        }

        Ok(vec![MintEvent {
            senders,
            tx: tx.clone(),
        }])
    }
}

async fn sleep_or_cancelled(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = sleep(delay) => false,
    }
}
