use crate::error::ClientError;
use async_trait::async_trait;
use solana_sdk::{
    hash::Hash as Blockhash, pubkey::Pubkey, signature::Signature, transaction::Transaction,
};

/// Transaction submission and ledger state reads, as provided by an RPC
/// node. All results reflect eventually consistent ledger state: a
/// submission having succeeded does not imply a subsequent read observes its
/// effect.
///
/// Every error is transient from the backend's point of view; retrying is
/// the caller's decision.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Submits a signed transaction without waiting for confirmation.
    async fn send_tx(&self, tx: &Transaction) -> Result<Signature, ClientError>;

    /// Submits a signed transaction and waits until it is confirmed.
    async fn send_and_confirm_tx(&self, tx: &Transaction) -> Result<Signature, ClientError>;

    /// Raw contents of the account at `address`;
    /// [`ClientError::AccountNotFound`] if it does not exist.
    async fn get_account_data(&self, address: &Pubkey) -> Result<Vec<u8>, ClientError>;

    /// A recent block reference for transaction construction.
    async fn get_latest_blockhash(&self) -> Result<Blockhash, ClientError>;

    /// Balance held in the given asset account. The zero address denotes the
    /// native balance of the caller's own account.
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, ClientError>;
}
