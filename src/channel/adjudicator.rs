//! On-chain dispute and withdrawal entry points.
//!
//! This module fixes the interface the host protocol programs against; the
//! dispute execution itself is left to a follow-on system.
//! [`Adjudicator::progress`] is a no-op because this backend supports no app
//! channels. The event subscription is already functional for what the
//! control record exposes: registration and conclusion of a dispute.

use super::{Params, PartIdx, State};
use crate::{
    client::{ContractBackend, Sender},
    error::{ClientError, Error},
    sig::Sig,
    ChannelId,
};
use solana_sdk::pubkey::Pubkey;
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tokio::time;
use tracing::debug;

/// Events the subscription buffers between polls; older events are dropped
/// first when the buffer overflows.
pub const DEFAULT_BUFFER_SIZE: usize = 3;
/// Delay between two polls of the channel account for adjudicator events.
pub const DEFAULT_SUBSCRIPTION_POLLING_INTERVAL: Duration = Duration::from_secs(4);

/// A request against the adjudicator: the channel, the acting party and the
/// fully signed state to act on.
#[derive(Debug, Clone)]
pub struct AdjudicatorReq {
    pub params: Params,
    pub state: State,
    pub sigs: Vec<Sig>,
    pub idx: PartIdx,
}

/// An event observed on the adjudicator: a channel's dispute progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjudicatorEvent {
    /// A state was registered for dispute; the challenge duration runs.
    Registered { id: ChannelId, version: u64 },
    /// A disputed state was replaced by a newer signed one.
    Progressed { id: ChannelId, version: u64 },
    /// The channel concluded; final balances can be withdrawn.
    Concluded { id: ChannelId, version: u64 },
}

/// The dispute/withdraw entry points of the on-chain program.
pub struct Adjudicator<S> {
    cb: Arc<ContractBackend<S>>,
    perun_addr: Pubkey,
}

impl<S: Sender> Adjudicator<S> {
    pub fn new(cb: Arc<ContractBackend<S>>, perun_addr: Pubkey) -> Self {
        Self { cb, perun_addr }
    }

    pub fn perun_addr(&self) -> Pubkey {
        self.perun_addr
    }

    /// Publishes a disputed state on-chain.
    pub async fn register(&self, _req: AdjudicatorReq) -> Result<(), Error> {
        unimplemented!("dispute registration is left to the dispute follow-up")
    }

    /// Claims this party's final balance of a concluded channel.
    pub async fn withdraw(&self, _req: AdjudicatorReq) -> Result<(), Error> {
        unimplemented!("withdrawal is left to the dispute follow-up")
    }

    /// Force-progresses an app channel. No-op: this backend supports no app
    /// channels, so there is never a state to progress.
    pub async fn progress(&self, _req: AdjudicatorReq) -> Result<(), Error> {
        Ok(())
    }

    /// Subscribes to adjudicator events of one channel.
    ///
    /// The subscription is lazy and pull-based: the channel account is only
    /// polled while [`PollingSubscription::next`] is awaited, nothing is
    /// pushed. Dropping and re-subscribing is always safe since events are
    /// derived from the account's current control record, not from
    /// consumable notifications.
    pub fn subscribe(&self, channel_id: ChannelId) -> PollingSubscription<S> {
        PollingSubscription {
            cb: Arc::clone(&self.cb),
            perun_addr: self.perun_addr,
            channel_id,
            polling_interval: DEFAULT_SUBSCRIPTION_POLLING_INTERVAL,
            buffer: VecDeque::with_capacity(DEFAULT_BUFFER_SIZE),
            seen_disputed: false,
            seen_concluded: false,
            closed: false,
            err: None,
        }
    }
}

/// A restartable, pull-based adjudicator event subscription with a bounded
/// internal buffer.
pub struct PollingSubscription<S> {
    cb: Arc<ContractBackend<S>>,
    perun_addr: Pubkey,
    channel_id: ChannelId,
    polling_interval: Duration,
    buffer: VecDeque<AdjudicatorEvent>,
    seen_disputed: bool,
    seen_concluded: bool,
    closed: bool,
    err: Option<Error>,
}

impl<S: Sender> PollingSubscription<S> {
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    /// Awaits the next adjudicator event.
    ///
    /// Returns `None` once the subscription is closed or the channel account
    /// turned undecodable (see [`Self::err`]). Transient read failures are
    /// retried on the next polling interval indefinitely; cancellation is the
    /// caller's choice of dropping or closing the subscription.
    pub async fn next(&mut self) -> Option<AdjudicatorEvent> {
        loop {
            if self.closed || self.err.is_some() {
                return None;
            }
            if let Some(event) = self.buffer.pop_front() {
                return Some(event);
            }

            match self.cb.get_channel_info(self.perun_addr, self.channel_id).await {
                Ok(channel) => {
                    let ctrl = channel.control;
                    let version = channel.state.version;
                    if ctrl.disputed && !self.seen_disputed {
                        self.seen_disputed = true;
                        self.push_event(AdjudicatorEvent::Registered {
                            id: self.channel_id,
                            version,
                        });
                    }
                    if ctrl.closed && !self.seen_concluded {
                        self.seen_concluded = true;
                        self.push_event(AdjudicatorEvent::Concluded {
                            id: self.channel_id,
                            version,
                        });
                    }
                }
                Err(err @ ClientError::Decode(_)) => {
                    // Not transient: the account exists but is not a channel.
                    self.err = Some(err.into());
                    return None;
                }
                Err(err) => {
                    debug!(channel = ?self.channel_id, %err, "event poll failed, retrying");
                }
            }

            if self.buffer.is_empty() {
                time::sleep(self.polling_interval).await;
            }
        }
    }

    /// The error that terminated the subscription, if any.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Closes the subscription; subsequent calls to [`Self::next`] return
    /// `None`.
    pub fn close(&mut self) {
        self.closed = true;
    }

    fn push_event(&mut self, event: AdjudicatorEvent) {
        if self.buffer.len() == DEFAULT_BUFFER_SIZE {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }
}
