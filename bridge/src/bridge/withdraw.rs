use anyhow::Result;
use log::{debug, info};
use tfchain_client::{WithdrawCreatedEvent, WithdrawExpiredEvent, WithdrawReadyEvent};
use tokio_util::sync::CancellationToken;

use crate::bridge::Bridge;
use crate::chain::BridgeChain;
use crate::error::BridgeError;
use crate::logger;
use crate::stellar::BridgeWallet;

impl<C: BridgeChain, W: BridgeWallet> Bridge<C, W> {
    /// A withdraw was created on tfchain: verify the target can receive TFT,
    /// sign the payout and put our signature on chain.
    pub(crate) async fn handle_withdraw_created(
        &mut self,
        withdraw: WithdrawCreatedEvent,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.tfchain.is_burned_already(withdraw.id).await? {
            info!("withdraw {} is burned already, skipping...", withdraw.id);
            return Err(BridgeError::TransactionAlreadyBurned.into());
        }

        if let Err(err) = self.wallet.check_account(&withdraw.target).await {
            info!(
                "withdraw {} target {} cannot receive TFT: {err:#}",
                withdraw.id, withdraw.target
            );
            return self.handle_bad_withdraw(withdraw, cancel).await;
        }

        let (signature, sequence_number) = self
            .wallet
            .create_payment_and_return_signature(&withdraw.target, withdraw.amount, withdraw.id)
            .await?;
        debug!("stellar account sequence number: {sequence_number}");

        let stellar_address = self.wallet.address().to_string();
        self.tfchain
            .retry_propose_burn_or_add_sig(
                cancel,
                withdraw.id,
                &withdraw.target,
                withdraw.amount,
                &signature,
                &stellar_address,
                sequence_number,
            )
            .await?;
        logger::event(
            "withdraw_proposed",
            "withdraw",
            &withdraw.id.to_string(),
            "withdraw signature proposed on tfchain",
        );
        Ok(())
    }

    /// An expired withdraw is re-entered with a fresh sequence number so
    /// signatures can accumulate again. Records minted before runtime 147
    /// carry no source account and take the recovery path instead.
    pub(crate) async fn handle_withdraw_expired(
        &mut self,
        expired: WithdrawExpiredEvent,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match expired.source {
            Some(source) => {
                self.handle_withdraw_created(
                    WithdrawCreatedEvent {
                        id: expired.id,
                        source,
                        target: expired.target,
                        amount: expired.amount,
                    },
                    cancel,
                )
                .await
            }
            None => self.handle_legacy_withdraw_expired(expired, cancel).await,
        }
    }

    async fn handle_legacy_withdraw_expired(
        &mut self,
        expired: WithdrawExpiredEvent,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.tfchain.is_burned_already(expired.id).await? {
            info!("withdraw {} is burned already, skipping...", expired.id);
            return Err(BridgeError::TransactionAlreadyBurned.into());
        }

        if let Err(err) = self.wallet.check_account(&expired.target).await {
            // without a source account there is nothing to mint back to;
            // mark the withdraw executed and leave a trace for the operators
            logger::alert(
                "transfer_failed",
                "withdraw",
                &expired.id.to_string(),
                &format!(
                    "target {} lost its trustline and the record has no source account, \
                     giving up: {err:#}",
                    expired.target
                ),
            );
            return self.tfchain.retry_set_burn_executed(cancel, expired.id).await;
        }

        let (signature, sequence_number) = self
            .wallet
            .create_payment_and_return_signature(&expired.target, expired.amount, expired.id)
            .await?;
        let stellar_address = self.wallet.address().to_string();
        self.tfchain
            .retry_propose_burn_or_add_sig(
                cancel,
                expired.id,
                &expired.target,
                expired.amount,
                &signature,
                &stellar_address,
                sequence_number,
            )
            .await
    }

    /// Quorum reached: rebuild the payout with the stored signatures and
    /// sequence, submit it to stellar, then flag the burn as executed.
    pub(crate) async fn handle_withdraw_ready(
        &mut self,
        ready: WithdrawReadyEvent,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.tfchain.is_burned_already(ready.id).await? {
            info!("withdraw {} is burned already, skipping...", ready.id);
            return Err(BridgeError::TransactionAlreadyBurned.into());
        }

        let burn = self.tfchain.get_burn_transaction(ready.id).await?;
        if burn.signatures.is_empty() {
            info!("found 0 signatures, aborting");
            return Err(BridgeError::NoSignatures.into());
        }

        let target = String::from_utf8_lossy(&burn.target).into_owned();
        if let Err(err) = self
            .wallet
            .create_payment_with_signatures_and_submit(
                &target,
                burn.amount,
                &burn.signatures,
                burn.sequence_number as i64,
            )
            .await
        {
            // the chain expires unexecuted withdraws and re-announces them;
            // waiting for that retry beats taking the whole loop down
            logger::alert(
                "withdraw_postponed",
                "withdraw",
                &ready.id.to_string(),
                &format!("stellar submission failed, waiting for the chain to retry: {err:#}"),
            );
            return Ok(());
        }

        self.tfchain.retry_set_burn_executed(cancel, ready.id).await
    }

    /// The withdraw target cannot hold TFT: compensate the source on tfchain
    /// under a synthetic `refund-<id>` mint and close the burn.
    pub(crate) async fn handle_bad_withdraw(
        &mut self,
        withdraw: WithdrawCreatedEvent,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!(
            "withdraw {} is an invalid burn transaction, minting on chain again...",
            withdraw.id
        );
        let mint_id = format!("refund-{}", withdraw.id);

        if self.tfchain.is_minted_already(&mint_id).await? {
            debug!("transaction {mint_id} is already minted");
            return Err(BridgeError::TransactionAlreadyMinted.into());
        }

        info!("going to propose mint transaction for {mint_id}");
        self.tfchain
            .retry_propose_mint_or_vote(cancel, &mint_id, &withdraw.source, withdraw.amount)
            .await?;

        info!("setting invalid burn transaction {} as executed", withdraw.id);
        self.tfchain.retry_set_burn_executed(cancel, withdraw.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{stored_signatures, test_bridge, ChainCall, WalletCall};
    use crate::error::is_already_processed;
    use tfchain_client::{AccountId32, BurnTransaction};

    fn created(id: u64, target: &str, amount: u64) -> WithdrawCreatedEvent {
        WithdrawCreatedEvent {
            id,
            source: AccountId32([1u8; 32]),
            target: target.to_string(),
            amount,
        }
    }

    fn burn_record(target: &str, amount: u64, signatures: usize, sequence: u64) -> BurnTransaction {
        BurnTransaction {
            block: 1,
            amount,
            source: Some(AccountId32([1u8; 32])),
            target: target.as_bytes().to_vec(),
            signatures: stored_signatures(signatures),
            sequence_number: sequence,
        }
    }

    #[tokio::test]
    async fn created_withdraw_is_signed_and_proposed() {
        let (mut bridge, state) = test_bridge();
        state.trustlines.lock().unwrap().insert("GXY".to_string());
        let cancel = CancellationToken::new();

        bridge
            .handle_withdraw_created(created(7, "GXY", 10_000_000), &cancel)
            .await
            .unwrap();

        assert_eq!(
            state.wallet_calls.lock().unwrap().clone(),
            vec![WalletCall::SignPayment {
                target: "GXY".into(),
                amount: 10_000_000,
                tx_id: 7,
            }]
        );
        assert_eq!(
            state.chain.calls.lock().unwrap().clone(),
            vec![ChainCall::ProposeBurn {
                burn_id: 7,
                target: "GXY".into(),
                amount: 10_000_000,
                stellar_address: "GVALIDATOR".into(),
                sequence_number: 1,
            }]
        );
    }

    #[tokio::test]
    async fn burned_withdraw_short_circuits() {
        let (mut bridge, state) = test_bridge();
        state.chain.burned.lock().unwrap().insert(7);
        let cancel = CancellationToken::new();

        let err = bridge
            .handle_withdraw_created(created(7, "GXY", 10_000_000), &cancel)
            .await
            .unwrap_err();
        assert!(is_already_processed(&err));
        assert!(state.chain.calls.lock().unwrap().is_empty());
        assert!(state.wallet_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ready_withdraw_submits_and_marks_executed() {
        let (mut bridge, state) = test_bridge();
        state
            .chain
            .burn_records
            .lock()
            .unwrap()
            .insert(7, burn_record("GXY", 10_000_000, 2, 250));
        let cancel = CancellationToken::new();

        bridge
            .handle_withdraw_ready(WithdrawReadyEvent { id: 7 }, &cancel)
            .await
            .unwrap();

        assert_eq!(
            state.wallet_calls.lock().unwrap().clone(),
            vec![WalletCall::SubmitPayment {
                target: "GXY".into(),
                amount: 10_000_000,
                signatures: 2,
                sequence_number: 250,
            }]
        );
        assert_eq!(
            state.chain.calls.lock().unwrap().clone(),
            vec![ChainCall::SetBurnExecuted { burn_id: 7 }]
        );
    }

    #[tokio::test]
    async fn ready_withdraw_after_execution_short_circuits() {
        let (mut bridge, state) = test_bridge();
        state.chain.burned.lock().unwrap().insert(7);
        let cancel = CancellationToken::new();

        let err = bridge
            .handle_withdraw_ready(WithdrawReadyEvent { id: 7 }, &cancel)
            .await
            .unwrap_err();
        assert!(is_already_processed(&err));
        assert!(state.wallet_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ready_withdraw_without_signatures_is_fatal() {
        let (mut bridge, state) = test_bridge();
        state
            .chain
            .burn_records
            .lock()
            .unwrap()
            .insert(7, burn_record("GXY", 10_000_000, 0, 250));
        let cancel = CancellationToken::new();

        let err = bridge
            .handle_withdraw_ready(WithdrawReadyEvent { id: 7 }, &cancel)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<BridgeError>(),
            Some(&BridgeError::NoSignatures)
        );
        assert!(!is_already_processed(&err));
    }

    #[tokio::test]
    async fn failed_stellar_submission_postpones_instead_of_failing() {
        let (mut bridge, state) = test_bridge();
        state
            .chain
            .burn_records
            .lock()
            .unwrap()
            .insert(7, burn_record("GXY", 10_000_000, 2, 250));
        state
            .fail_submit
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let cancel = CancellationToken::new();

        bridge
            .handle_withdraw_ready(WithdrawReadyEvent { id: 7 }, &cancel)
            .await
            .unwrap();

        // no executed flag while the payout has not happened
        assert!(state.chain.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn withdraw_to_account_without_trustline_mints_back() {
        let (mut bridge, state) = test_bridge();
        let cancel = CancellationToken::new();

        let mut event = created(9, "GNOTRUSTLINE", 5_000_000);
        event.source = AccountId32([5u8; 32]);
        bridge.handle_withdraw_created(event, &cancel).await.unwrap();

        assert_eq!(
            state.chain.calls.lock().unwrap().clone(),
            vec![
                ChainCall::ProposeMint {
                    tx_id: "refund-9".into(),
                    target: [5u8; 32],
                    amount: 5_000_000,
                },
                ChainCall::SetBurnExecuted { burn_id: 9 },
            ]
        );
        // never touched stellar
        assert!(state.wallet_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_withdraw_replay_skips_on_existing_mint() {
        let (mut bridge, state) = test_bridge();
        state
            .chain
            .minted
            .lock()
            .unwrap()
            .insert("refund-9".to_string());
        let cancel = CancellationToken::new();

        let err = bridge
            .handle_withdraw_created(created(9, "GNOTRUSTLINE", 5_000_000), &cancel)
            .await
            .unwrap_err();
        assert!(is_already_processed(&err));
        assert!(state.chain.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_withdraw_with_source_re_enters_the_flow() {
        let (mut bridge, state) = test_bridge();
        state.trustlines.lock().unwrap().insert("GXY".to_string());
        let cancel = CancellationToken::new();

        bridge
            .handle_withdraw_expired(
                WithdrawExpiredEvent {
                    id: 11,
                    source: Some(AccountId32([2u8; 32])),
                    target: "GXY".into(),
                    amount: 7_000_000,
                },
                &cancel,
            )
            .await
            .unwrap();

        let calls = state.chain.calls.lock().unwrap().clone();
        assert!(matches!(calls[0], ChainCall::ProposeBurn { burn_id: 11, .. }));
    }

    #[tokio::test]
    async fn legacy_expired_withdraw_without_trustline_gives_up() {
        let (mut bridge, state) = test_bridge();
        let cancel = CancellationToken::new();

        bridge
            .handle_withdraw_expired(
                WithdrawExpiredEvent {
                    id: 12,
                    source: None,
                    target: "GNOTRUSTLINE".into(),
                    amount: 7_000_000,
                },
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(
            state.chain.calls.lock().unwrap().clone(),
            vec![ChainCall::SetBurnExecuted { burn_id: 12 }]
        );
    }

    #[tokio::test]
    async fn legacy_expired_withdraw_with_trustline_is_re_signed() {
        let (mut bridge, state) = test_bridge();
        state.trustlines.lock().unwrap().insert("GXY".to_string());
        let cancel = CancellationToken::new();

        bridge
            .handle_withdraw_expired(
                WithdrawExpiredEvent {
                    id: 13,
                    source: None,
                    target: "GXY".into(),
                    amount: 7_000_000,
                },
                &cancel,
            )
            .await
            .unwrap();

        let calls = state.chain.calls.lock().unwrap().clone();
        assert!(matches!(calls[0], ChainCall::ProposeBurn { burn_id: 13, .. }));
    }
}
