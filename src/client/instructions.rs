use crate::{
    channel::{Params, PartIdx, State},
    encoding,
    error::ValidationError,
    ChannelId,
};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program,
};

/// Program-derived address of a channel account, from the seeds
/// `["channel", channel_id]`.
pub fn channel_pda(channel_id: &ChannelId, program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"channel", channel_id.as_ref()], program_id).0
}

/// Account metas every channel instruction runs with: the channel account,
/// the acting participant (fee payer and signer) and the system program.
fn channel_accounts(channel_account: Pubkey, participant: Pubkey) -> Vec<AccountMeta> {
    vec![
        AccountMeta::new(channel_account, false),
        AccountMeta::new(participant, true),
        AccountMeta::new_readonly(system_program::id(), false),
    ]
}

/// Builds the Open instruction creating the channel account for the given
/// parameters and initial state.
pub fn new_open_instruction(
    program_id: Pubkey,
    participant: Pubkey,
    params: &Params,
    state: &State,
) -> Result<Instruction, ValidationError> {
    let data = encoding::make_open_instruction(params, state)?;
    let pda = channel_pda(&state.id, &program_id);
    Ok(Instruction::new_with_bytes(
        program_id,
        &data,
        channel_accounts(pda, participant),
    ))
}

/// Builds the Fund instruction depositing the given party's contribution.
pub fn new_fund_instruction(
    program_id: Pubkey,
    participant: Pubkey,
    channel_id: ChannelId,
    part_idx: PartIdx,
) -> Result<Instruction, ValidationError> {
    let data = encoding::make_fund_instruction(channel_id, part_idx)?;
    let pda = channel_pda(&channel_id, &program_id);
    Ok(Instruction::new_with_bytes(
        program_id,
        &data,
        channel_accounts(pda, participant),
    ))
}

/// Builds the AbortFunding instruction abandoning an incompletely funded
/// channel.
pub fn new_abort_funding_instruction(
    program_id: Pubkey,
    participant: Pubkey,
    channel_id: ChannelId,
) -> Instruction {
    let data = encoding::make_abort_funding_instruction(channel_id);
    let pda = channel_pda(&channel_id, &program_id);
    Instruction::new_with_bytes(program_id, &data, channel_accounts(pda, participant))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_pda_is_deterministic_per_channel() {
        let program = Pubkey::new_unique();
        let id = ChannelId([5; 32]);

        assert_eq!(channel_pda(&id, &program), channel_pda(&id, &program));
        assert_ne!(
            channel_pda(&id, &program),
            channel_pda(&ChannelId([6; 32]), &program)
        );
    }

    #[test]
    fn fund_instruction_targets_channel_account() {
        let program = Pubkey::new_unique();
        let participant = Pubkey::new_unique();
        let id = ChannelId([1; 32]);

        let ix = new_fund_instruction(program, participant, id, 0).unwrap();
        assert_eq!(ix.program_id, program);
        assert_eq!(ix.accounts[0].pubkey, channel_pda(&id, &program));
        assert!(ix.accounts[1].is_signer);
        assert_eq!(ix.accounts[2].pubkey, system_program::id());
        assert_eq!(ix.data[0], 1); // Fund discriminant
    }
}
