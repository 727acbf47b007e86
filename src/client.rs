//! Interaction with the ledger: transaction building, signing and
//! submission, and reads of channel accounts.
//!
//! The actual RPC transport lives behind the [`Sender`] trait; everything
//! here only decides *what* to submit and guards the signing path.

mod backend;
mod instructions;
mod sender;

pub use backend::{ContractBackend, SolanaSigner};
pub use instructions::{
    channel_pda, new_abort_funding_instruction, new_fund_instruction, new_open_instruction,
};
pub use sender::Sender;
