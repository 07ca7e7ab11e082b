use thiserror::Error;

/// Outcomes a handler reports upward instead of plain success.
///
/// The already-* variants are idempotency markers: the work was observed to be
/// done (usually by a quorum of other validators), the event loop logs and
/// moves on. They are detected by downcast on the anyhow chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("transaction is already minted")]
    TransactionAlreadyMinted,

    #[error("transaction is already burned")]
    TransactionAlreadyBurned,

    #[error("transaction is already refunded")]
    TransactionAlreadyRefunded,

    #[error("transaction has no signatures")]
    NoSignatures,

    #[error("bridge cancelled")]
    Cancelled,
}

impl BridgeError {
    /// True for the markers the event loop skips over.
    pub fn is_already_processed(&self) -> bool {
        matches!(
            self,
            BridgeError::TransactionAlreadyMinted
                | BridgeError::TransactionAlreadyBurned
                | BridgeError::TransactionAlreadyRefunded
        )
    }
}

/// Whether an error coming out of a handler only marks already-processed work.
pub fn is_already_processed(err: &anyhow::Error) -> bool {
    err.downcast_ref::<BridgeError>()
        .is_some_and(BridgeError::is_already_processed)
}

/// Whether the error is the clean-cancellation marker.
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<BridgeError>(), Some(BridgeError::Cancelled))
}
