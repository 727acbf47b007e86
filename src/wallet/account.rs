use super::{Participant, CC_ADDRESS_LENGTH};
use crate::{
    error::ValidationError,
    sig::{keccak256, Sig, Signer},
};
use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer as SolanaKeySigner};

/// An account a participant signs channel states with.
///
/// The secp256k1 signing key is independent of the Solana keypair that
/// controls `participant_address`; the latter stays with the transaction
/// submission layer.
#[derive(Debug, Clone)]
pub struct Account {
    signer: Signer,
    /// The on-chain address of the participant this account belongs to.
    participant_address: Pubkey,
    /// The cross-chain address of the participant.
    cc_addr: [u8; CC_ADDRESS_LENGTH],
}

impl Account {
    /// Creates an account from a raw secp256k1 private key.
    pub fn new(
        private_key: &[u8; 32],
        participant_address: Pubkey,
        cc_addr: [u8; CC_ADDRESS_LENGTH],
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            signer: Signer::from_bytes(private_key)?,
            participant_address,
            cc_addr,
        })
    }

    /// Creates an account with a random signing key and the given on-chain
    /// address.
    pub fn new_random_with_address<R: rand::Rng + rand::CryptoRng>(
        rng: &mut R,
        participant_address: Pubkey,
    ) -> Self {
        Self {
            signer: Signer::new(rng),
            participant_address,
            cc_addr: [0u8; CC_ADDRESS_LENGTH],
        }
    }

    /// Creates an account with a random signing key and a fresh Solana
    /// keypair, returning both.
    pub fn new_random<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> (Self, Keypair) {
        let keypair = Keypair::new();
        let account = Self::new_random_with_address(rng, keypair.pubkey());
        (account, keypair)
    }

    pub fn participant_address(&self) -> Pubkey {
        self.participant_address
    }

    /// The participant identity this account belongs to.
    pub fn participant(&self) -> Participant {
        Participant::new(
            self.participant_address,
            self.signer.public_key(),
            self.cc_addr,
        )
    }

    /// Signs arbitrary data: the data is hashed, prefixed per the Ethereum
    /// personal-message convention, hashed again and signed recoverably.
    pub fn sign_data(&self, data: &[u8]) -> Sig {
        self.signer.sign_eth(keccak256(data))
    }
}
