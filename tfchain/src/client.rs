use std::time::{Duration, SystemTime, UNIX_EPOCH};

use backoff::ExponentialBackoff;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use subxt::dynamic::{DecodedValueThunk, Value};
use subxt::ext::sp_core::{crypto::Ss58Codec, sr25519, Pair as _};
use subxt::tx::{PairSigner, Payload, TxStatus};
use subxt::utils::AccountId32;
use subxt::{OnlineClient, PolkadotConfig};

use crate::error::{Error, Result};

pub type TfchainConfig = PolkadotConfig;

/// Blocks are produced every 6 seconds; a node whose latest timestamp is more
/// than two block times behind the wall clock is lagging and gets skipped.
pub const ACCEPTABLE_DELAY: Duration = Duration::from_secs(12);

const CONNECT_MAX_ELAPSED: Duration = Duration::from_secs(60);
const EXTRINSIC_TIMEOUT: Duration = Duration::from_secs(30);

/// The sr25519 key this validator signs tfchain extrinsics with.
#[derive(Clone)]
pub struct Identity {
    signer: PairSigner<TfchainConfig, sr25519::Pair>,
    account: AccountId32,
    address: String,
}

impl Identity {
    /// Derive an identity from a mnemonic phrase or secret URI.
    pub fn from_sr25519_phrase(seed: &str) -> Result<Self> {
        let pair = sr25519::Pair::from_string(seed, None)
            .map_err(|e| Error::InvalidSeed(format!("{e:?}")))?;
        let account = AccountId32(pair.public().0);
        let address = pair.public().to_ss58check();
        Ok(Self {
            signer: PairSigner::new(pair),
            account,
            address,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn account(&self) -> &AccountId32 {
        &self.account
    }

    pub(crate) fn signer(&self) -> &PairSigner<TfchainConfig, sr25519::Pair> {
        &self.signer
    }
}

/// Holds the configured websocket endpoints and hands out a healthy connection.
pub struct Manager {
    urls: Vec<String>,
}

impl Manager {
    pub fn new<S: Into<String>>(urls: impl IntoIterator<Item = S>) -> Self {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }

    /// Connect to one of the endpoints. The pool is shuffled once and then
    /// walked round-robin; full passes without a healthy node back off
    /// exponentially.
    pub async fn connect(&self) -> Result<OnlineClient<TfchainConfig>> {
        let mut urls = self.urls.clone();
        urls.shuffle(&mut rand::thread_rng());
        if urls.is_empty() {
            return Err(Error::NoReachableEndpoint);
        }

        let pass = || async {
            for url in &urls {
                match Self::try_connect(url).await {
                    Ok(client) => return Ok(client),
                    Err(err) => warn!("failed to connect to {url}: {err}"),
                }
            }
            Err(backoff::Error::transient(Error::NoReachableEndpoint))
        };

        let bo = ExponentialBackoff {
            max_elapsed_time: Some(CONNECT_MAX_ELAPSED),
            ..ExponentialBackoff::default()
        };
        backoff::future::retry_notify(bo, pass, |err, wait| {
            warn!("no endpoint reachable ({err}), retrying in {wait:?}")
        })
        .await
    }

    async fn try_connect(url: &str) -> Result<OnlineClient<TfchainConfig>> {
        debug!("connecting to {url}");
        let client = OnlineClient::<TfchainConfig>::from_url(url).await?;

        let addr = subxt::dynamic::storage("Timestamp", "Now", Vec::<Value>::new());
        let now_ms = client
            .storage()
            .at_latest()
            .await?
            .fetch(&addr)
            .await?
            .ok_or_else(|| Error::Decode("Timestamp.Now is missing".into()))?
            .as_type::<u64>()?;

        let wall_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let age_ms = wall_ms.saturating_sub(now_ms);
        if age_ms > ACCEPTABLE_DELAY.as_millis() as u64 {
            return Err(Error::OutdatedChain(age_ms / 1000));
        }

        Ok(client)
    }
}

/// Connected tfchain client bound to this validator's identity.
#[derive(Clone)]
pub struct SubstrateClient {
    api: OnlineClient<TfchainConfig>,
    identity: Identity,
}

impl SubstrateClient {
    /// Connect and verify the identity is a member of the bridge validator set.
    pub async fn new<S: Into<String>>(
        urls: impl IntoIterator<Item = S>,
        seed: &str,
    ) -> Result<Self> {
        let api = Manager::new(urls).connect().await?;
        let identity = Identity::from_sr25519_phrase(seed)?;
        info!("key with address {} loaded", identity.address());

        let client = Self { api, identity };
        if !client.is_validator(client.identity.account()).await? {
            return Err(Error::NotAValidator(client.identity.address().to_string()));
        }
        Ok(client)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub(crate) fn api(&self) -> &OnlineClient<TfchainConfig> {
        &self.api
    }

    /// Membership check against `TFTBridgeModule.Validators`.
    pub async fn is_validator(&self, account: &AccountId32) -> Result<bool> {
        let validators = self
            .fetch_storage("TFTBridgeModule", "Validators", vec![])
            .await?
            .ok_or(Error::ValidatorSetNotFound)?
            .as_type::<Vec<AccountId32>>()?;
        Ok(validators.contains(account))
    }

    pub async fn get_deposit_fee(&self) -> Result<u64> {
        let fee = self
            .fetch_storage("TFTBridgeModule", "DepositFee", vec![])
            .await?
            .ok_or(Error::DepositFeeNotFound)?
            .as_type::<u64>()?;
        Ok(fee)
    }

    pub(crate) async fn fetch_storage(
        &self,
        pallet: &str,
        entry: &str,
        keys: Vec<Value>,
    ) -> Result<Option<DecodedValueThunk>> {
        let addr = subxt::dynamic::storage(pallet, entry, keys);
        Ok(self.api.storage().at_latest().await?.fetch(&addr).await?)
    }

    /// Sign, submit and watch an extrinsic until it lands in a block.
    ///
    /// Pool statuses keep the watch alive, a block inclusion is checked for
    /// `ExtrinsicFailed` (subxt decodes the dispatch error from metadata), a
    /// dropped or invalid transaction is fatal and a watch error is surfaced
    /// as retryable so the caller re-submits. A watch that makes no progress
    /// for 30 seconds times out.
    pub(crate) async fn submit_watched<P: Payload>(&self, tx: &P) -> Result<()> {
        let mut progress = self
            .api
            .tx()
            .sign_and_submit_then_watch_default(tx, self.identity.signer())
            .await?;

        loop {
            let next = tokio::time::timeout(EXTRINSIC_TIMEOUT, progress.next())
                .await
                .map_err(|_| Error::ExtrinsicTimeout(EXTRINSIC_TIMEOUT.as_secs()))?;
            let Some(status) = next else {
                return Err(Error::ExtrinsicRetryable(
                    "watch stream ended without a final status".into(),
                ));
            };
            match status? {
                TxStatus::Validated | TxStatus::Broadcasted { .. } | TxStatus::NoLongerInBestBlock => {
                    continue
                }
                TxStatus::InBestBlock(in_block) | TxStatus::InFinalizedBlock(in_block) => {
                    debug!("extrinsic included in block {:?}", in_block.block_hash());
                    in_block.wait_for_success().await?;
                    return Ok(());
                }
                TxStatus::Error { message } => return Err(Error::ExtrinsicRetryable(message)),
                TxStatus::Invalid { message } => return Err(Error::ExtrinsicInvalid(message)),
                TxStatus::Dropped { message } => return Err(Error::ExtrinsicDropped(message)),
            }
        }
    }
}
