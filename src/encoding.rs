//! Canonical on-chain encoding.
//!
//! The on-chain program decodes its account data and instruction payloads by
//! position, not by name: field order and fixed widths are part of the
//! format. Everything here is Borsh-encoded — vectors carry a little-endian
//! `u32` count, integers are little-endian, booleans are one byte and the
//! instruction envelope starts with a one-byte discriminant.
//!
//! Conversions from the off-chain model in [`crate::channel`] validate what
//! this backend supports: strict two-party, app-less ledger channels with no
//! locked funds and balances that fit the ledger's 64-bit unit.

mod instructions;
mod types;

pub use instructions::{
    make_abort_funding_instruction, make_fund_instruction, make_open_instruction,
    AbortFundingInstruction, ChannelInstruction, CloseInstruction, DisputeInstruction,
    ForceCloseInstruction, FundInstruction, OpenInstruction, WithdrawInstruction,
};
pub use types::{
    balance_to_u64, Balances, Channel, ChannelState, Control, CrossAsset, Params, Participant,
};

use borsh::BorshSerialize;

/// Borsh-encodes a value into a fresh buffer.
pub fn to_bytes<T: BorshSerialize>(value: &T) -> Vec<u8> {
    borsh::to_vec(value).expect("borsh serialization into a Vec cannot fail")
}
