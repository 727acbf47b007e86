//! Error taxonomy of the backend.
//!
//! Three layers: [`ValidationError`] for data that can never become valid by
//! retrying, [`ClientError`] for transient ledger I/O (swallowed by the
//! funder's poll loop up to its iteration budget) and [`FundingError`] for the
//! terminal outcomes of the funding protocol.

use crate::channel::PartIdx;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Rejection of malformed or unsupported parameters, state, assets or
/// signatures. Never retried; surfaced to the caller immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid channel parameters: {0}")]
    InvalidParameters(&'static str),
    #[error("invalid channel state: {0}")]
    InvalidState(&'static str),
    #[error("balance does not fit into the ledger's unsigned 64-bit unit")]
    BalanceOverflow,
    #[error("asset is not representable on this backend")]
    UnsupportedAssetType,
    #[error("invalid asset: {0}")]
    InvalidAsset(&'static str),
    #[error("unknown instruction discriminant {0}")]
    UnknownInstruction(u8),
    #[error("malformed instruction data: {0}")]
    MalformedInstruction(&'static str),
    #[error("invalid signature length {0}, expected 65")]
    InvalidSignatureLength(usize),
}

/// Transient I/O failure against the ledger: a read, submission or
/// confirmation that may succeed on a later attempt.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("rpc: {0}")]
    Rpc(String),
    #[error("account {0} not found")]
    AccountNotFound(Pubkey),
    #[error("account data malformed: {0}")]
    Decode(String),
    #[error("transaction signing failed: {0}")]
    Sign(#[from] solana_sdk::signer::SignerError),
}

/// Failures of the in-memory wallet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("account not found")]
    AccountNotFound,
    #[error("account already exists")]
    AccountAlreadyExists,
}

/// Umbrella error of the contract backend operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Terminal outcome of a funding request.
#[derive(Error, Debug)]
pub enum FundingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Client(#[from] ClientError),
    /// The iteration budget was exhausted or the caller cancelled before both
    /// parties were funded. Carries the indices that never completed and the
    /// error of the best-effort abort submission if that failed as well.
    #[error("funding timed out for parties {timed_out:?}")]
    Timeout {
        timed_out: Vec<PartIdx>,
        abort_failure: Option<Box<Error>>,
    },
    /// The observed on-chain state contradicts a protocol invariant, e.g. a
    /// funded flag that was reset. Fatal, never ignored.
    #[error("on-chain state violates protocol invariant: {0}")]
    ProtocolViolation(&'static str),
    /// The channel references a local asset this funder does not serve.
    #[error("asset {0} is not served by this funder")]
    UnknownAsset(Pubkey),
}

impl From<Error> for FundingError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(e) => FundingError::Validation(e),
            Error::Client(e) => FundingError::Client(e),
        }
    }
}
