//! Off-chain channel data model and the operations binding it to the chain:
//! channel id derivation, state signing and verification, funding and the
//! dispute interface.

pub mod adjudicator;
pub mod asset;
pub mod funder;
mod types;

pub use asset::{Asset, Ccid, ContractLid, SolanaAsset, SolanaCrossAsset};
pub use types::{Allocation, App, Params, State, SubAlloc, U256};

use crate::{
    encoding,
    error::ValidationError,
    sig::{self, Sig},
    wallet::{Account, Participant},
};
use borsh::{BorshDeserialize, BorshSerialize};

/// Backend identifier of this ledger within a multi-ledger channel.
pub const BACKEND_ID: u32 = 6;

/// Index of a party in the channel. `0` is the party that opens the channel
/// on-chain.
pub type PartIdx = usize;

/// Identifies a channel; derived by hashing the encoded channel parameters.
#[derive(BorshSerialize, BorshDeserialize, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct ChannelId(pub [u8; 32]);

impl core::fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("0x")?;
        for b in self.0 {
            f.write_fmt(format_args!("{:02x}", b))?;
        }
        Ok(())
    }
}

impl AsRef<[u8]> for ChannelId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Calculates the channel id: the Keccak-256 hash of the canonical encoding
/// of the parameters.
pub fn calc_channel_id(params: &Params) -> Result<ChannelId, ValidationError> {
    let encoded = encoding::Params::try_from(params)?;
    Ok(ChannelId(sig::keccak256(&encoding::to_bytes(&encoded)).0))
}

/// Signs a channel state with the given account.
///
/// The signature covers the canonical on-chain encoding of the state, so a
/// state that cannot be encoded cannot be signed either.
pub fn sign_state(account: &Account, state: &State) -> Result<Sig, ValidationError> {
    let encoded = encoding::ChannelState::try_from(state)?;
    Ok(account.sign_data(&encoding::to_bytes(&encoded)))
}

/// Verifies a participant's signature over a channel state.
///
/// Returns `Ok(false)` for any well-formed but wrong signature; only a state
/// that cannot be encoded is an error.
pub fn verify_state(
    participant: &Participant,
    state: &State,
    sig: &Sig,
) -> Result<bool, ValidationError> {
    let encoded = encoding::ChannelState::try_from(state)?;
    let msg = sig::keccak256(&encoding::to_bytes(&encoded));
    Ok(sig::verify(msg, sig, &participant.pub_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Account;
    use rand::{rngs::StdRng, SeedableRng};

    fn test_setup() -> (Params, State, Account) {
        let mut rng = StdRng::seed_from_u64(42);
        let (account_a, _) = Account::new_random(&mut rng);
        let (account_b, _) = Account::new_random(&mut rng);

        let params = Params {
            participants: vec![account_a.participant(), account_b.participant()],
            nonce: [7u8; 32],
            challenge_duration: 60,
            ledger_channel: true,
            virtual_channel: false,
            app: App::None,
        };
        let alloc = Allocation::new(
            vec![Asset::Solana(SolanaCrossAsset::sol())],
            vec![vec![U256::from(100u64), U256::from(200u64)]],
        );
        let state = State::new(&params, alloc).unwrap();
        (params, state, account_a)
    }

    #[test]
    fn channel_id_is_deterministic() {
        let (params, _, _) = test_setup();
        assert_eq!(
            calc_channel_id(&params).unwrap(),
            calc_channel_id(&params).unwrap()
        );
    }

    #[test]
    fn channel_id_depends_on_nonce() {
        let (params, _, _) = test_setup();
        let mut other = params.clone();
        other.nonce = [8u8; 32];
        assert_ne!(
            calc_channel_id(&params).unwrap(),
            calc_channel_id(&other).unwrap()
        );
    }

    #[test]
    fn sign_then_verify_state() {
        let (_, state, account) = test_setup();

        let sig = sign_state(&account, &state).unwrap();
        assert!(verify_state(&account.participant(), &state, &sig).unwrap());

        let mut changed = state.clone();
        changed.version += 1;
        assert!(!verify_state(&account.participant(), &changed, &sig).unwrap());
    }

    #[test]
    fn verify_state_wrong_participant_is_false() {
        let (params, state, account) = test_setup();

        let sig = sign_state(&account, &state).unwrap();
        // params.participants[1] belongs to the other account.
        assert!(!verify_state(&params.participants[1], &state, &sig).unwrap());
    }
}
