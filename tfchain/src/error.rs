use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("mint tx not found")]
    MintTransactionNotFound,

    #[error("burn tx not found")]
    BurnTransactionNotFound,

    #[error("refund tx not found")]
    RefundTransactionNotFound,

    #[error("deposit fee not found")]
    DepositFeeNotFound,

    #[error("twin {0} not found")]
    TwinNotFound(u32),

    #[error("farm {0} not found")]
    FarmNotFound(u32),

    #[error("node {0} not found")]
    NodeNotFound(u32),

    #[error("entity {0} not found")]
    EntityNotFound(u32),

    #[error("validator set not found")]
    ValidatorSetNotFound,

    #[error("account {0} is not a validator for the bridge runtime")]
    NotAValidator(String),

    #[error("invalid sr25519 seed: {0}")]
    InvalidSeed(String),

    #[error("no tfchain endpoint could be reached")]
    NoReachableEndpoint,

    #[error("latest block is {0} seconds old, node is lagging")]
    OutdatedChain(u64),

    #[error("extrinsic watch reported an error: {0}")]
    ExtrinsicRetryable(String),

    #[error("extrinsic was dropped from the pool: {0}")]
    ExtrinsicDropped(String),

    #[error("extrinsic is invalid: {0}")]
    ExtrinsicInvalid(String),

    #[error("no extrinsic status received within {0} seconds")]
    ExtrinsicTimeout(u64),

    #[error("malformed storage value: {0}")]
    Decode(String),

    #[error(transparent)]
    Subxt(#[from] subxt::Error),

    #[error(transparent)]
    SubxtDecode(#[from] subxt::error::DecodeError),

    #[error(transparent)]
    SubxtCore(#[from] subxt::ext::subxt_core::Error),
}
