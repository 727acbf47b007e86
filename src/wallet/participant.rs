use super::CC_ADDRESS_LENGTH;
use crate::{error::ValidationError, sig::PubKey};
use solana_sdk::pubkey::Pubkey;

/// Binary length of an encoded participant: 65-byte public key, 32-byte
/// Solana address, cross-chain address.
pub(crate) const ENCODED_LEN: usize = 65 + 32 + CC_ADDRESS_LENGTH;

/// The on-chain representation of a channel participant.
///
/// The Solana address and the off-chain public key are independent
/// identities; neither can be derived from the other and both are carried
/// through the encoding unconflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    /// The on-chain Solana address of the participant.
    pub solana_address: Pubkey,
    /// Verifies signatures over channel states.
    pub pub_key: PubKey,
    /// The cross-chain address of the participant.
    pub cc_addr: [u8; CC_ADDRESS_LENGTH],
}

impl Participant {
    pub fn new(
        solana_address: Pubkey,
        pub_key: PubKey,
        cc_addr: [u8; CC_ADDRESS_LENGTH],
    ) -> Self {
        Self {
            solana_address,
            pub_key,
            cc_addr,
        }
    }

    /// Encodes the participant as `pub_key || solana_address || cc_addr`.
    pub fn to_bytes(&self) -> [u8; ENCODED_LEN] {
        let mut bytes = [0u8; ENCODED_LEN];
        bytes[..65].copy_from_slice(&self.pub_key.0);
        bytes[65..97].copy_from_slice(self.solana_address.as_ref());
        bytes[97..].copy_from_slice(&self.cc_addr);
        bytes
    }

    /// Decodes a participant, validating the public key.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ValidationError> {
        if data.len() != ENCODED_LEN {
            return Err(ValidationError::InvalidParameters(
                "participant encoding has wrong length",
            ));
        }
        let pub_key = PubKey::from_bytes(data[..65].try_into().unwrap())?;
        let solana_address = Pubkey::try_from(&data[65..97]).unwrap();
        let mut cc_addr = [0u8; CC_ADDRESS_LENGTH];
        cc_addr.copy_from_slice(&data[97..]);
        Ok(Self {
            solana_address,
            pub_key,
            cc_addr,
        })
    }
}
