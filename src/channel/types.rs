//! The off-chain channel data model handed to this backend by the host
//! protocol: parameters, state and allocation with arbitrary-precision
//! balances. The on-chain counterparts with their fixed widths live in
//! [`crate::encoding`].

use super::{asset::Asset, calc_channel_id, ChannelId};
use crate::{error::ValidationError, wallet::Participant};
use solana_sdk::pubkey::Pubkey;
use uint::construct_uint;

construct_uint! {
    /// 256-bit unsigned integer used for off-chain balances.
    pub struct U256(4);
}

/// The application governing a channel. This backend supports no on-chain
/// application logic; only [`App::None`] channels can be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum App {
    #[default]
    None,
    /// An on-chain program carrying app logic. Unsupported here, present so
    /// that proposals carrying one are rejected rather than misread.
    Program(Pubkey),
}

/// Parameters of a channel, agreed upon off-chain before opening. Immutable
/// once the channel exists; together with the derived [`ChannelId`] they
/// identify the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    pub participants: Vec<Participant>,
    pub nonce: [u8; 32],
    /// On-chain dispute timeout window in seconds.
    pub challenge_duration: u64,
    pub ledger_channel: bool,
    pub virtual_channel: bool,
    pub app: App,
}

/// Complete state of a channel at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub id: ChannelId,
    pub version: u64,
    pub allocation: Allocation,
    /// Application payload; must be empty on this backend.
    pub app_data: Vec<u8>,
    pub is_final: bool,
}

impl State {
    /// Initial state of a channel: version zero, not final, id derived from
    /// the parameters.
    pub fn new(params: &Params, allocation: Allocation) -> Result<Self, ValidationError> {
        allocation.valid()?;
        Ok(Self {
            id: calc_channel_id(params)?,
            version: 0,
            allocation,
            app_data: Vec::new(),
            is_final: false,
        })
    }

    /// Creates the successor of this state with the version incremented.
    /// A finalized state admits no successor.
    pub fn make_next_state(&self) -> Result<Self, ValidationError> {
        if self.is_final {
            return Err(ValidationError::InvalidState(
                "finalized state admits no successor",
            ));
        }
        Ok(Self {
            id: self.id,
            version: self.version + 1,
            allocation: self.allocation.clone(),
            app_data: self.app_data.clone(),
            is_final: self.is_final,
        })
    }
}

/// Funds held in a channel: one balance per asset and participant, plus
/// locked sub-channel funds (always empty on this backend).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub assets: Vec<Asset>,
    /// Indexed `[asset][participant]`.
    pub balances: Vec<Vec<U256>>,
    pub locked: Vec<SubAlloc>,
}

/// Funds locked for a sub-channel. Carried so that states holding them can
/// be recognized and rejected; sub-channels themselves are unsupported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAlloc {
    pub id: ChannelId,
    pub balances: Vec<U256>,
}

impl Allocation {
    pub fn new(assets: Vec<Asset>, balances: Vec<Vec<U256>>) -> Self {
        Self {
            assets,
            balances,
            locked: Vec::new(),
        }
    }

    /// Number of participants the balance vectors cover.
    pub fn num_parts(&self) -> usize {
        self.balances.first().map_or(0, Vec::len)
    }

    /// Checks the shape of the allocation: one balance vector per asset, all
    /// vectors covering the same two participants.
    pub fn valid(&self) -> Result<(), ValidationError> {
        if self.balances.len() != self.assets.len() {
            return Err(ValidationError::InvalidState(
                "expected one balance vector per asset",
            ));
        }
        if self.balances.iter().any(|bals| bals.len() != 2) {
            return Err(ValidationError::InvalidState(
                "expected exactly two participants per balance vector",
            ));
        }
        Ok(())
    }
}
