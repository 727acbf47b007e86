//! On-chain and off-chain identity of a channel participant.
//!
//! A [`Participant`] binds three independent identifiers: the Solana account
//! that pays for and authorizes transactions, the secp256k1 public key that
//! verifies signatures over channel states, and the fixed-width cross-chain
//! address used by other ledgers participating in the same logical channel.
//! An [`Account`] additionally holds the signing key behind the public key.

mod account;
mod participant;

use crate::error::WalletError;
use solana_sdk::{pubkey::Pubkey, signature::Keypair};
use std::{collections::HashMap, sync::Mutex};

pub use account::Account;
pub use participant::Participant;

/// Length of a cross-chain address in bytes.
pub const CC_ADDRESS_LENGTH: usize = 20;

/// A wallet that stores accounts in memory, keyed by the participant's
/// on-chain address. Nothing is persisted.
#[derive(Debug, Default)]
pub struct EphemeralWallet {
    accounts: Mutex<HashMap<Pubkey, Account>>,
}

impl EphemeralWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the account associated with the given participant.
    pub fn unlock(&self, participant: &Participant) -> Result<Account, WalletError> {
        let accounts = self.accounts.lock().expect("wallet lock poisoned");
        accounts
            .get(&participant.solana_address)
            .cloned()
            .ok_or(WalletError::AccountNotFound)
    }

    /// Adds the given account to the wallet.
    pub fn add_account(&self, account: Account) -> Result<(), WalletError> {
        let mut accounts = self.accounts.lock().expect("wallet lock poisoned");
        match accounts.entry(account.participant_address()) {
            std::collections::hash_map::Entry::Occupied(_) => {
                Err(WalletError::AccountAlreadyExists)
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(account);
                Ok(())
            }
        }
    }

    /// Generates a new account, adds it to the wallet and returns it together
    /// with the Solana keypair controlling its on-chain address.
    pub fn add_new_account<R: rand::Rng + rand::CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<(Account, Keypair), WalletError> {
        let (account, keypair) = Account::new_random(rng);
        self.add_account(account.clone())?;
        Ok((account, keypair))
    }
}
