use super::{ChannelState, Params};
use crate::{
    channel::{self, PartIdx},
    error::ValidationError,
    ChannelId,
};
use borsh::{BorshDeserialize, BorshSerialize};

/// Number of instruction variants; discriminants `0..COUNT` are valid.
const INSTRUCTION_COUNT: u8 = 7;

/// The instruction envelope dispatched by the on-chain program.
///
/// The Borsh enum discriminant is the leading byte of the instruction data:
/// Open=0, Fund=1, Close=2, ForceClose=3, Dispute=4, Withdraw=5,
/// AbortFunding=6. Variant order is part of the wire format.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub enum ChannelInstruction {
    Open(OpenInstruction),
    Fund(FundInstruction),
    Close(CloseInstruction),
    ForceClose(ForceCloseInstruction),
    Dispute(DisputeInstruction),
    Withdraw(WithdrawInstruction),
    AbortFunding(AbortFundingInstruction),
}

/// Creates the channel account with its parameters and initial state.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct OpenInstruction {
    pub params: Params,
    pub state: ChannelState,
}

/// Deposits the sender's outstanding contribution. `party_idx` is false for
/// party A, true for party B.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundInstruction {
    pub channel_id: ChannelId,
    pub party_idx: bool,
}

/// Collaboratively closes the channel with a final state signed by both
/// parties.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct CloseInstruction {
    pub state: ChannelState,
    pub sig_a: [u8; 65],
    pub sig_b: [u8; 65],
}

/// Closes a disputed channel after its challenge duration elapsed.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForceCloseInstruction {
    pub channel_id: ChannelId,
}

/// Registers a disputed state on-chain.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct DisputeInstruction {
    pub state: ChannelState,
    pub sig_a: [u8; 65],
    pub sig_b: [u8; 65],
}

/// Pays out a party's share of a closed channel.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawInstruction {
    pub channel_id: ChannelId,
    pub party_idx: bool,
    /// Set when one party withdraws on behalf of both.
    pub one_withdrawer: bool,
}

/// Abandons a channel whose funding never completed, refunding deposits.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortFundingInstruction {
    pub channel_id: ChannelId,
}

impl ChannelInstruction {
    /// Encodes the instruction for submission.
    pub fn encode(&self) -> Vec<u8> {
        super::to_bytes(self)
    }

    /// Decodes an instruction, rejecting unknown discriminants and payloads
    /// that are truncated or carry trailing bytes.
    pub fn decode(data: &[u8]) -> Result<Self, ValidationError> {
        let (&tag, _) = data
            .split_first()
            .ok_or(ValidationError::MalformedInstruction("empty instruction data"))?;
        if tag >= INSTRUCTION_COUNT {
            return Err(ValidationError::UnknownInstruction(tag));
        }
        Self::try_from_slice(data).map_err(|_| {
            ValidationError::MalformedInstruction("truncated payload or trailing bytes")
        })
    }
}

/// Converts a party index to its wire form; only two-party channels exist.
fn party_flag(idx: PartIdx) -> Result<bool, ValidationError> {
    match idx {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(ValidationError::InvalidParameters(
            "party index must be 0 or 1",
        )),
    }
}

/// Builds the instruction data opening a channel with the given parameters
/// and initial state.
pub fn make_open_instruction(
    params: &channel::Params,
    state: &channel::State,
) -> Result<Vec<u8>, ValidationError> {
    let instruction = ChannelInstruction::Open(OpenInstruction {
        params: params.try_into()?,
        state: state.try_into()?,
    });
    Ok(instruction.encode())
}

/// Builds the instruction data funding the given party's side of a channel.
pub fn make_fund_instruction(
    channel_id: ChannelId,
    part_idx: PartIdx,
) -> Result<Vec<u8>, ValidationError> {
    let instruction = ChannelInstruction::Fund(FundInstruction {
        channel_id,
        party_idx: party_flag(part_idx)?,
    });
    Ok(instruction.encode())
}

/// Builds the instruction data aborting an incompletely funded channel.
pub fn make_abort_funding_instruction(channel_id: ChannelId) -> Vec<u8> {
    ChannelInstruction::AbortFunding(AbortFundingInstruction { channel_id }).encode()
}
