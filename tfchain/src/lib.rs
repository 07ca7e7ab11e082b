mod burning;
mod client;
mod error;
mod events;
mod minting;
mod refunds;
mod retry;
mod tfgrid;

pub use burning::{BurnTransaction, StellarSignature};
pub use client::{Identity, Manager, SubstrateClient, TfchainConfig, ACCEPTABLE_DELAY};
pub use error::{Error, Result};
pub use events::{
    BridgeEvents, EventBatch, RefundCreatedEvent, RefundExpiredEvent, RefundReadyEvent,
    WithdrawCreatedEvent, WithdrawExpiredEvent, WithdrawReadyEvent,
};
pub use refunds::RefundTransaction;
pub use tfgrid::{Entity, Farm, Node, Twin};

pub use subxt::utils::AccountId32;
