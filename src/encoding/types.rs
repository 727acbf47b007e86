use crate::{
    channel::{self, Allocation, App, Asset, PartIdx},
    error::ValidationError,
    sig::PubKey,
    wallet, ChannelId,
};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

/// On-chain form of a channel participant.
///
/// Layout: `[l2_pubkey: 65][solana_address: 32][cc_address: 20]`. The
/// off-chain public key and the on-chain address are independent and both
/// are carried in full.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    pub l2_pubkey: [u8; 65],
    pub solana_address: [u8; 32],
    pub cc_address: [u8; 20],
}

impl From<&wallet::Participant> for Participant {
    fn from(p: &wallet::Participant) -> Self {
        Self {
            l2_pubkey: p.pub_key.0,
            solana_address: p.solana_address.to_bytes(),
            cc_address: p.cc_addr,
        }
    }
}

impl TryFrom<&Participant> for wallet::Participant {
    type Error = ValidationError;

    fn try_from(p: &Participant) -> Result<Self, Self::Error> {
        Ok(wallet::Participant::new(
            Pubkey::new_from_array(p.solana_address),
            PubKey::from_bytes(&p.l2_pubkey)?,
            p.cc_address,
        ))
    }
}

/// On-chain form of the channel parameters.
///
/// Layout: `[a][b][nonce: 32][challenge_duration: u64]`.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    pub a: Participant,
    pub b: Participant,
    pub nonce: [u8; 32],
    pub challenge_duration: u64,
}

impl TryFrom<&channel::Params> for Params {
    type Error = ValidationError;

    fn try_from(params: &channel::Params) -> Result<Self, Self::Error> {
        if !params.ledger_channel {
            return Err(ValidationError::InvalidParameters("expected ledger channel"));
        }
        if params.virtual_channel {
            return Err(ValidationError::InvalidParameters(
                "expected non-virtual channel",
            ));
        }
        if params.app != App::None {
            return Err(ValidationError::InvalidParameters("expected no app"));
        }
        let [a, b] = params.participants.as_slice() else {
            return Err(ValidationError::InvalidParameters(
                "expected exactly two participants",
            ));
        };

        Ok(Self {
            a: a.into(),
            b: b.into(),
            nonce: params.nonce,
            challenge_duration: params.challenge_duration,
        })
    }
}

/// On-chain form of a channel state.
///
/// Layout: `[channel_id: 32][balances][version: u64][finalized: bool]`.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    pub channel_id: ChannelId,
    pub balances: Balances,
    pub version: u64,
    pub finalized: bool,
}

impl TryFrom<&channel::State> for ChannelState {
    type Error = ValidationError;

    fn try_from(state: &channel::State) -> Result<Self, Self::Error> {
        if !state.app_data.is_empty() {
            return Err(ValidationError::InvalidState("expected no app data"));
        }
        Ok(Self {
            channel_id: state.id,
            balances: Balances::try_from(&state.allocation)?,
            version: state.version,
            finalized: state.is_final,
        })
    }
}

/// On-chain form of an allocation.
///
/// Layout: `[tokens: Vec<CrossAsset>][bal_a: Vec<u64>][bal_b: Vec<u64>]`,
/// with `bal_a[i]`/`bal_b[i]` the balance of party A/B in `tokens[i]`.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct Balances {
    pub tokens: Vec<CrossAsset>,
    pub bal_a: Vec<u64>,
    pub bal_b: Vec<u64>,
}

impl TryFrom<&Allocation> for Balances {
    type Error = ValidationError;

    fn try_from(alloc: &Allocation) -> Result<Self, Self::Error> {
        alloc.valid()?;
        if !alloc.locked.is_empty() {
            return Err(ValidationError::InvalidState("expected no locked funds"));
        }

        let tokens = alloc
            .assets
            .iter()
            .map(CrossAsset::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut bal_a = Vec::with_capacity(alloc.balances.len());
        let mut bal_b = Vec::with_capacity(alloc.balances.len());
        for asset_bals in &alloc.balances {
            bal_a.push(balance_to_u64(asset_bals[0])?);
            bal_b.push(balance_to_u64(asset_bals[1])?);
        }

        Ok(Self {
            tokens,
            bal_a,
            bal_b,
        })
    }
}

/// Narrows an off-chain balance to the ledger's unsigned 64-bit unit.
pub fn balance_to_u64(value: channel::U256) -> Result<u64, ValidationError> {
    if value.bits() > 64 {
        return Err(ValidationError::BalanceOverflow);
    }
    Ok(value.low_u64())
}

/// On-chain form of a channel asset, bridging address spaces of all ledgers
/// a channel may reference.
///
/// Layout: `[chain: u64][solana_address: 32][eth_address: 20]`. Exactly one
/// of the two addresses is meaningful; the other is all zero.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossAsset {
    pub chain: u64,
    pub solana_address: [u8; 32],
    pub eth_address: [u8; 20],
}

impl TryFrom<&Asset> for CrossAsset {
    type Error = ValidationError;

    fn try_from(asset: &Asset) -> Result<Self, Self::Error> {
        match asset {
            Asset::Solana(sa) => {
                // The ledger identifier must fit the wire format's 8-byte
                // chain field.
                let chain: u64 = sa
                    .id()
                    .ledger_id()
                    .as_str()
                    .parse()
                    .map_err(|_| ValidationError::UnsupportedAssetType)?;
                let solana_address = sa
                    .asset
                    .address()
                    .map_or([0u8; 32], |mint| mint.to_bytes());
                Ok(Self {
                    chain,
                    solana_address,
                    eth_address: [0u8; 20],
                })
            }
            Asset::Eth { chain, holder } => Ok(Self {
                chain: *chain,
                solana_address: [0u8; 32],
                eth_address: *holder,
            }),
        }
    }
}

/// Per-channel mutable on-chain flags tracking funding, closing and dispute
/// progress. Created all-false at channel open and mutated only by
/// successful on-chain instructions; this backend only ever observes it.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Control {
    pub funded_a: bool,
    pub funded_b: bool,
    pub closed: bool,
    pub withdrawn_a: bool,
    pub withdrawn_b: bool,
    pub disputed: bool,
    /// Ledger timestamp of the last update.
    pub timestamp: u64,
}

impl Control {
    /// Funded flag of the given party.
    pub fn funded(&self, idx: PartIdx) -> bool {
        match idx {
            0 => self.funded_a,
            _ => self.funded_b,
        }
    }
}

/// Full contents of a channel account on-chain.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub params: Params,
    pub state: ChannelState,
    pub control: Control,
}
