use super::{instructions, Sender};
use crate::{
    channel::{Params, PartIdx, State},
    encoding::Channel,
    error::{ClientError, Error, ValidationError},
    wallet::Participant,
    ChannelId,
};
use borsh::BorshDeserialize;
use solana_sdk::{
    instruction::Instruction,
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer as SolanaKeySigner,
    transaction::Transaction,
};
use tokio::sync::Mutex;
use tracing::debug;

/// The transaction-signing identity of this process: the Solana keypair
/// paying for and authorizing submissions, the participant it acts for and
/// the transport used to reach the ledger.
pub struct SolanaSigner<S> {
    payer: Keypair,
    participant: Participant,
    sender: S,
}

impl<S> SolanaSigner<S> {
    /// The payer keypair must control the participant's on-chain address.
    pub fn new(payer: Keypair, participant: Participant, sender: S) -> Result<Self, ValidationError> {
        if payer.pubkey() != participant.solana_address {
            return Err(ValidationError::InvalidParameters(
                "payer key does not control the participant's address",
            ));
        }
        Ok(Self {
            payer,
            participant,
            sender,
        })
    }
}

/// Gateway for all on-chain operations of this backend.
///
/// Submissions run under a single lock spanning build, sign and submit, so
/// at most one signed transaction per signing key is in flight at a time.
pub struct ContractBackend<S> {
    signer: SolanaSigner<S>,
    submit_lock: Mutex<()>,
}

impl<S: Sender> ContractBackend<S> {
    pub fn new(signer: SolanaSigner<S>) -> Self {
        Self {
            signer,
            submit_lock: Mutex::new(()),
        }
    }

    pub fn participant(&self) -> &Participant {
        &self.signer.participant
    }

    /// Builds, signs and submits a transaction carrying one instruction.
    async fn invoke_signed_tx(
        &self,
        instruction: Instruction,
        confirm: bool,
    ) -> Result<Signature, ClientError> {
        let _guard = self.submit_lock.lock().await;

        let blockhash = self.signer.sender.get_latest_blockhash().await?;
        let message = Message::new(&[instruction], Some(&self.signer.payer.pubkey()));
        let mut tx = Transaction::new_unsigned(message);
        tx.try_sign(&[&self.signer.payer], blockhash)?;

        if confirm {
            self.signer.sender.send_and_confirm_tx(&tx).await
        } else {
            self.signer.sender.send_tx(&tx).await
        }
    }

    /// Submits the Open instruction creating the channel account.
    pub async fn open(
        &self,
        perun_addr: Pubkey,
        params: &Params,
        state: &State,
    ) -> Result<(), Error> {
        let ix = instructions::new_open_instruction(
            perun_addr,
            self.signer.participant.solana_address,
            params,
            state,
        )?;
        debug!(channel = ?state.id, "submitting open instruction");
        self.invoke_signed_tx(ix, false).await?;
        Ok(())
    }

    /// Submits the Fund instruction for the given party index.
    pub async fn fund(
        &self,
        perun_addr: Pubkey,
        channel_id: ChannelId,
        part_idx: PartIdx,
    ) -> Result<(), Error> {
        let ix = instructions::new_fund_instruction(
            perun_addr,
            self.signer.participant.solana_address,
            channel_id,
            part_idx,
        )?;
        debug!(channel = ?channel_id, part_idx, "submitting fund instruction");
        self.invoke_signed_tx(ix, false).await?;
        Ok(())
    }

    /// Submits the AbortFunding instruction for the given channel.
    pub async fn abort_funding(
        &self,
        perun_addr: Pubkey,
        channel_id: ChannelId,
    ) -> Result<(), Error> {
        let ix = instructions::new_abort_funding_instruction(
            perun_addr,
            self.signer.participant.solana_address,
            channel_id,
        );
        debug!(channel = ?channel_id, "submitting abort-funding instruction");
        self.invoke_signed_tx(ix, false).await?;
        Ok(())
    }

    /// Reads and decodes the channel account of the given channel.
    pub async fn get_channel_info(
        &self,
        perun_addr: Pubkey,
        channel_id: ChannelId,
    ) -> Result<Channel, ClientError> {
        let pda = instructions::channel_pda(&channel_id, &perun_addr);
        let data = self.signer.sender.get_account_data(&pda).await?;
        Channel::try_from_slice(&data).map_err(|err| ClientError::Decode(err.to_string()))
    }

    /// Balance of the given asset account; the zero address denotes the
    /// native balance of this signer's account.
    pub async fn get_balance(&self, asset_addr: Pubkey) -> Result<u64, ClientError> {
        self.signer.sender.get_balance(&asset_addr).await
    }
}
