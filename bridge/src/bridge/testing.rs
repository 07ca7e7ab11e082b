//! Mock gateways for exercising the handlers without a network.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tfchain_client::{
    AccountId32, BurnTransaction, Entity, Farm, Node, RefundTransaction, StellarSignature, Twin,
};
use tokio_util::sync::CancellationToken;

use crate::bridge::Bridge;
use crate::chain::BridgeChain;
use crate::persistency::ChainPersistency;
use crate::stellar::horizon::HorizonTransaction;
use crate::stellar::{BridgeWallet, SequenceCache};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChainCall {
    ProposeMint {
        tx_id: String,
        target: [u8; 32],
        amount: u64,
    },
    ProposeBurn {
        burn_id: u64,
        target: String,
        amount: u64,
        stellar_address: String,
        sequence_number: u64,
    },
    SetBurnExecuted {
        burn_id: u64,
    },
    CreateRefund {
        tx_hash: String,
        target: String,
        amount: i64,
        sequence_number: u64,
    },
    SetRefundExecuted {
        tx_hash: String,
    },
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockChain {
    pub minted: Arc<Mutex<HashSet<String>>>,
    pub burned: Arc<Mutex<HashSet<u64>>>,
    pub refunded: Arc<Mutex<HashSet<String>>>,
    pub burn_records: Arc<Mutex<HashMap<u64, BurnTransaction>>>,
    pub refund_records: Arc<Mutex<HashMap<String, RefundTransaction>>>,
    pub twins: Arc<Mutex<HashMap<u32, [u8; 32]>>>,
    pub farms: Arc<Mutex<HashMap<u32, u32>>>,
    pub nodes: Arc<Mutex<HashMap<u32, u32>>>,
    pub entities: Arc<Mutex<HashMap<u32, [u8; 32]>>>,
    pub calls: Arc<Mutex<Vec<ChainCall>>>,
}

impl MockChain {
    fn record(&self, call: ChainCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BridgeChain for MockChain {
    async fn is_minted_already(&self, tx_id: &str) -> Result<bool> {
        Ok(self.minted.lock().unwrap().contains(tx_id))
    }

    async fn is_burned_already(&self, burn_id: u64) -> Result<bool> {
        Ok(self.burned.lock().unwrap().contains(&burn_id))
    }

    async fn is_refunded_already(&self, tx_hash: &str) -> Result<bool> {
        Ok(self.refunded.lock().unwrap().contains(tx_hash))
    }

    async fn get_burn_transaction(&self, burn_id: u64) -> Result<BurnTransaction> {
        self.burn_records
            .lock()
            .unwrap()
            .get(&burn_id)
            .cloned()
            .ok_or_else(|| anyhow!("burn tx not found"))
    }

    async fn get_refund_transaction(&self, tx_hash: &str) -> Result<RefundTransaction> {
        self.refund_records
            .lock()
            .unwrap()
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| anyhow!("refund tx not found"))
    }

    async fn get_twin(&self, id: u32) -> Result<Twin> {
        let account = self
            .twins
            .lock()
            .unwrap()
            .get(&id)
            .copied()
            .ok_or_else(|| anyhow!("twin {id} not found"))?;
        Ok(Twin {
            id,
            account: AccountId32(account),
        })
    }

    async fn get_farm(&self, id: u32) -> Result<Farm> {
        let twin_id = self
            .farms
            .lock()
            .unwrap()
            .get(&id)
            .copied()
            .ok_or_else(|| anyhow!("farm {id} not found"))?;
        Ok(Farm { id, twin_id })
    }

    async fn get_node(&self, id: u32) -> Result<Node> {
        let twin_id = self
            .nodes
            .lock()
            .unwrap()
            .get(&id)
            .copied()
            .ok_or_else(|| anyhow!("node {id} not found"))?;
        Ok(Node { id, twin_id })
    }

    async fn get_entity(&self, id: u32) -> Result<Entity> {
        let account = self
            .entities
            .lock()
            .unwrap()
            .get(&id)
            .copied()
            .ok_or_else(|| anyhow!("entity {id} not found"))?;
        Ok(Entity {
            id,
            account: AccountId32(account),
        })
    }

    async fn retry_propose_mint_or_vote(
        &self,
        _cancel: &CancellationToken,
        tx_id: &str,
        target: &AccountId32,
        amount: u64,
    ) -> Result<()> {
        self.record(ChainCall::ProposeMint {
            tx_id: tx_id.to_string(),
            target: target.0,
            amount,
        });
        Ok(())
    }

    async fn retry_propose_burn_or_add_sig(
        &self,
        _cancel: &CancellationToken,
        burn_id: u64,
        target: &str,
        amount: u64,
        _signature: &str,
        stellar_address: &str,
        sequence_number: u64,
    ) -> Result<()> {
        self.record(ChainCall::ProposeBurn {
            burn_id,
            target: target.to_string(),
            amount,
            stellar_address: stellar_address.to_string(),
            sequence_number,
        });
        Ok(())
    }

    async fn retry_set_burn_executed(
        &self,
        _cancel: &CancellationToken,
        burn_id: u64,
    ) -> Result<()> {
        self.record(ChainCall::SetBurnExecuted { burn_id });
        Ok(())
    }

    async fn retry_create_refund_or_add_sig(
        &self,
        _cancel: &CancellationToken,
        tx_hash: &str,
        target: &str,
        amount: i64,
        _signature: &str,
        _stellar_address: &str,
        sequence_number: u64,
    ) -> Result<()> {
        self.record(ChainCall::CreateRefund {
            tx_hash: tx_hash.to_string(),
            target: target.to_string(),
            amount,
            sequence_number,
        });
        Ok(())
    }

    async fn retry_set_refund_executed(
        &self,
        _cancel: &CancellationToken,
        tx_hash: &str,
    ) -> Result<()> {
        self.record(ChainCall::SetRefundExecuted {
            tx_hash: tx_hash.to_string(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WalletCall {
    SignPayment {
        target: String,
        amount: u64,
        tx_id: u64,
    },
    SignRefund {
        target: String,
        amount: u64,
        tx_hash: String,
    },
    SubmitPayment {
        target: String,
        amount: u64,
        signatures: usize,
        sequence_number: i64,
    },
    SubmitRefund {
        target: String,
        amount: u64,
        tx_hash: String,
        signatures: usize,
        sequence_number: i64,
    },
}

pub(crate) struct MockWallet {
    pub address: String,
    pub sequence: SequenceCache,
    pub trustlines: Arc<Mutex<HashSet<String>>>,
    pub required_signatures: usize,
    pub fail_submit: Arc<AtomicBool>,
    pub calls: Arc<Mutex<Vec<WalletCall>>>,
}

impl MockWallet {
    fn record(&self, call: WalletCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BridgeWallet for MockWallet {
    fn address(&self) -> &str {
        &self.address
    }

    async fn check_account(&self, account: &str) -> Result<()> {
        if self.trustlines.lock().unwrap().contains(account) {
            Ok(())
        } else {
            bail!("address has no trustline")
        }
    }

    async fn create_payment_and_return_signature(
        &mut self,
        target: &str,
        amount: u64,
        tx_id: u64,
    ) -> Result<(String, u64)> {
        let sequence = self.sequence.next(0);
        self.record(WalletCall::SignPayment {
            target: target.to_string(),
            amount,
            tx_id,
        });
        Ok(("c2lnbmF0dXJl".to_string(), sequence as u64))
    }

    async fn create_refund_and_return_signature(
        &mut self,
        target: &str,
        amount: u64,
        tx_hash: &str,
    ) -> Result<(String, u64)> {
        let sequence = self.sequence.next(0);
        self.record(WalletCall::SignRefund {
            target: target.to_string(),
            amount,
            tx_hash: tx_hash.to_string(),
        });
        Ok(("c2lnbmF0dXJl".to_string(), sequence as u64))
    }

    async fn create_payment_with_signatures_and_submit(
        &mut self,
        target: &str,
        amount: u64,
        signatures: &[StellarSignature],
        sequence_number: i64,
    ) -> Result<()> {
        if signatures.len() < self.required_signatures {
            bail!("not enough signatures, aborting");
        }
        if self.fail_submit.load(Ordering::SeqCst) {
            bail!("horizon rejected transaction (504): tx_failed");
        }
        self.sequence.next(sequence_number);
        self.record(WalletCall::SubmitPayment {
            target: target.to_string(),
            amount,
            signatures: signatures.len().min(self.required_signatures),
            sequence_number,
        });
        Ok(())
    }

    async fn create_refund_payment_with_signatures_and_submit(
        &mut self,
        target: &str,
        amount: u64,
        tx_hash: &str,
        signatures: &[StellarSignature],
        sequence_number: i64,
    ) -> Result<()> {
        if signatures.len() < self.required_signatures {
            bail!("not enough signatures, aborting");
        }
        if self.fail_submit.load(Ordering::SeqCst) {
            bail!("horizon rejected transaction (504): tx_failed");
        }
        self.sequence.next(sequence_number);
        self.record(WalletCall::SubmitRefund {
            target: target.to_string(),
            amount,
            tx_hash: tx_hash.to_string(),
            signatures: signatures.len().min(self.required_signatures),
            sequence_number,
        });
        Ok(())
    }

    async fn stat_bridge_account(&self) -> Result<String> {
        Ok("100.0000000".to_string())
    }
}

pub(crate) struct TestState {
    pub chain: MockChain,
    pub wallet_calls: Arc<Mutex<Vec<WalletCall>>>,
    pub trustlines: Arc<Mutex<HashSet<String>>>,
    pub fail_submit: Arc<AtomicBool>,
    path: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestState {
    pub fn persistency(&self) -> ChainPersistency {
        ChainPersistency::new(&self.path)
    }
}

pub(crate) const TEST_DEPOSIT_FEE: i64 = 1_000_000;

pub(crate) fn test_bridge() -> (Bridge<MockChain, MockWallet>, TestState) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("node.json");

    let chain = MockChain::default();
    let wallet_calls = Arc::new(Mutex::new(Vec::new()));
    let trustlines = Arc::new(Mutex::new(HashSet::new()));
    let fail_submit = Arc::new(AtomicBool::new(false));
    let wallet = MockWallet {
        address: "GVALIDATOR".to_string(),
        sequence: SequenceCache::new(0),
        trustlines: trustlines.clone(),
        required_signatures: 2,
        fail_submit: fail_submit.clone(),
        calls: wallet_calls.clone(),
    };

    let bridge = Bridge::with_parts(
        chain.clone(),
        wallet,
        ChainPersistency::new(&path),
        TEST_DEPOSIT_FEE,
    );
    let state = TestState {
        chain,
        wallet_calls,
        trustlines,
        fail_submit,
        path,
        _dir: dir,
    };
    (bridge, state)
}

pub(crate) fn deposit_tx(
    hash: &str,
    paging_token: &str,
    memo: &str,
    memo_type: &str,
) -> HorizonTransaction {
    HorizonTransaction {
        hash: hash.to_string(),
        successful: true,
        paging_token: paging_token.to_string(),
        memo: memo.to_string(),
        memo_type: memo_type.to_string(),
    }
}

pub(crate) fn stored_signatures(count: usize) -> Vec<StellarSignature> {
    (0..count)
        .map(|i| StellarSignature {
            signature: format!("c2ln{i}").into_bytes(),
            stellar_address: format!("GSIGNER{i}").into_bytes(),
        })
        .collect()
}
