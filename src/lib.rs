//! Solana backend for Perun payment channels.
//!
//! This crate bridges the chain-agnostic two-party channel protocol and the
//! Solana execution model. It provides the canonical Borsh encoding of channel
//! parameters, state and participants consumed by the on-chain program
//! ([`encoding`]), the cross-chain asset identity scheme ([`channel::asset`]),
//! the signing identity binding an off-chain secp256k1 key to on-chain
//! addresses ([`wallet`], [`sig`]) and the polling funding coordinator that
//! drives a channel from "parameters agreed" to "both parties funded"
//! ([`channel::funder`]).
//!
//! Transaction submission and ledger reads are behind the [`client::Sender`]
//! trait; the backend never talks to an RPC node directly. All components are
//! constructed explicitly and passed to where they are used, there is no
//! global backend registry.

pub mod channel;
pub mod client;
pub mod encoding;
mod error;
pub mod sig;
pub mod wallet;

pub use channel::{ChannelId, PartIdx};
pub use error::{ClientError, Error, FundingError, ValidationError, WalletError};
