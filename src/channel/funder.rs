//! The funding coordinator.
//!
//! Drives a channel from "parameters agreed off-chain" to "both parties
//! funded on-chain", or aborts. Party 0 creates the channel account; both
//! parties then poll the on-chain control record until it shows both funded
//! flags, submitting their own contribution when it is their turn. There is
//! no coordination between the parties beyond the shared control record:
//! every decision is derived from the freshest on-chain read, never from a
//! locally cached view.

use super::{asset::Asset, Params, PartIdx, State, U256};
use crate::{
    client::{ContractBackend, Sender},
    encoding::{Balances, Control},
    error::{Error, FundingError, ValidationError},
};
use solana_sdk::pubkey::Pubkey;
use std::{sync::Arc, time::Duration};
use tokio::{sync::oneshot, time};
use tracing::{debug, info, warn};

/// Poll ticks before a funding attempt is abandoned.
pub const MAX_ITERS_UNTIL_ABORT: usize = 30;
/// Delay between two polls of the channel account.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(4);

/// A funding request as handed over by the host protocol: the channel to
/// fund, this process's party index and the agreed contributions.
#[derive(Debug, Clone)]
pub struct FundingReq {
    pub part_idx: PartIdx,
    pub params: Params,
    pub state: State,
    /// Agreed contribution per asset and participant, indexed like the
    /// allocation's balances.
    pub agreement: Vec<Vec<U256>>,
}

/// Funds channels against one Perun program instance.
///
/// Process-local configuration only; nothing is persisted. The funder for a
/// channel holding native SOL must list [`Pubkey::default()`] among its
/// served asset addresses.
pub struct Funder<S> {
    cb: Arc<ContractBackend<S>>,
    perun_addr: Pubkey,
    asset_addrs: Vec<Pubkey>,
    max_iters: usize,
    polling_interval: Duration,
}

impl<S: Sender> Funder<S> {
    pub fn new(cb: Arc<ContractBackend<S>>, perun_addr: Pubkey, asset_addrs: Vec<Pubkey>) -> Self {
        Self {
            cb,
            perun_addr,
            asset_addrs,
            max_iters: MAX_ITERS_UNTIL_ABORT,
            polling_interval: DEFAULT_POLLING_INTERVAL,
        }
    }

    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn with_polling_interval(mut self, polling_interval: Duration) -> Self {
        self.polling_interval = polling_interval;
        self
    }

    pub fn perun_addr(&self) -> Pubkey {
        self.perun_addr
    }

    pub fn asset_addrs(&self) -> &[Pubkey] {
        &self.asset_addrs
    }

    /// Opens the channel if this party is responsible for it, then funds it.
    ///
    /// Returns once both parties are funded, or with
    /// [`FundingError::Timeout`] after the iteration budget is exhausted.
    /// `cancel` is raced against every poll tick; firing it (or dropping its
    /// sender) aborts the funding attempt cooperatively.
    pub async fn fund(
        &self,
        cancel: oneshot::Receiver<()>,
        req: FundingReq,
    ) -> Result<(), FundingError> {
        if req.part_idx > 1 {
            return Err(ValidationError::InvalidParameters("party index must be 0 or 1").into());
        }
        req.state.allocation.valid()?;
        if req.agreement.len() != req.state.allocation.assets.len()
            || req.agreement.iter().any(|bals| bals.len() != 2)
        {
            return Err(ValidationError::InvalidState(
                "funding agreement shape does not match the allocation",
            )
            .into());
        }

        // Only party 0 creates the channel account; both racing to create it
        // would pay account creation twice. Skipped when the account already
        // exists so that repeated funding calls stay harmless.
        if req.part_idx == 0
            && self
                .cb
                .get_channel_info(self.perun_addr, req.state.id)
                .await
                .is_err()
        {
            self.open_channel(&req).await?;
        }

        // Settle delay before the channel account is expected to be readable.
        time::sleep(2 * self.polling_interval).await;

        self.fund_party(cancel, &req).await
    }

    async fn open_channel(&self, req: &FundingReq) -> Result<(), FundingError> {
        info!(channel = ?req.state.id, "opening channel");
        self.cb
            .open(self.perun_addr, &req.params, &req.state)
            .await
            .map_err(FundingError::from)
    }

    async fn fund_party(
        &self,
        mut cancel: oneshot::Receiver<()>,
        req: &FundingReq,
    ) -> Result<(), FundingError> {
        let party = party_name(req.part_idx);
        let assets = &req.state.allocation.assets;
        let mut last_ctrl: Option<Control> = None;

        for _ in 0..self.max_iters {
            tokio::select! {
                _ = &mut cancel => {
                    warn!(party, channel = ?req.state.id, "funding cancelled");
                    return Err(self.abort_with_timeout(req, last_ctrl).await);
                }
                _ = time::sleep(self.polling_interval) => {}
            }

            debug!(party, channel = ?req.state.id, "polling channel");
            let channel = match self.cb.get_channel_info(self.perun_addr, req.state.id).await {
                Ok(channel) => channel,
                Err(err) => {
                    // Transient by definition; the tick is simply lost. The
                    // same policy applies to both parties.
                    debug!(party, %err, "channel not readable, retrying");
                    continue;
                }
            };

            let ctrl = channel.control;
            check_funded_monotonic(&last_ctrl, &ctrl)?;
            last_ctrl = Some(ctrl);

            // A party with nothing to contribute counts as funded.
            let complete = (ctrl.funded_a || !need_funding(&req.agreement, assets, 0))
                && (ctrl.funded_b || !need_funding(&req.agreement, assets, 1));
            if complete {
                info!(party, channel = ?req.state.id, "channel funded");
                return Ok(());
            }

            if ctrl.funded(req.part_idx) {
                // Our submission took effect; wait for the peer.
                continue;
            }

            // Party 0 may fund immediately; party 1 once party 0 is funded or
            // never needed to act (skip-ahead).
            let my_turn = req.part_idx == 0
                || ctrl.funded_a
                || !need_funding(&req.agreement, assets, 0);
            if !my_turn {
                continue;
            }

            if !need_funding(&req.agreement, assets, req.part_idx) {
                info!(party, channel = ?req.state.id, "no funding required");
                return Ok(());
            }

            match self.fund_channel(req).await {
                Ok(()) => {
                    // Submission is not success; only the next control read
                    // is authoritative.
                    self.log_balances(party, req).await;
                }
                Err(FundingError::Client(err)) => {
                    warn!(party, %err, "fund submission failed, retrying");
                }
                Err(err) => return Err(err),
            }
        }

        Err(self.abort_with_timeout(req, last_ctrl).await)
    }

    /// Submits this party's Fund instruction after checking the channel's
    /// local assets are ones this funder serves.
    async fn fund_channel(&self, req: &FundingReq) -> Result<(), FundingError> {
        // Re-encode the balances; a state that cannot be encoded must never
        // reach the chain.
        Balances::try_from(&req.state.allocation)?;
        self.check_assets(&req.state.allocation.assets)?;

        self.cb
            .fund(self.perun_addr, req.state.id, req.part_idx)
            .await
            .map_err(FundingError::from)
    }

    fn check_assets(&self, assets: &[Asset]) -> Result<(), FundingError> {
        for asset in assets {
            if let Asset::Solana(sa) = asset {
                let addr = sa.asset.address().unwrap_or_default();
                if !self.asset_addrs.contains(&addr) {
                    return Err(FundingError::UnknownAsset(addr));
                }
            }
        }
        Ok(())
    }

    async fn log_balances(&self, party: &'static str, req: &FundingReq) {
        for asset in &req.state.allocation.assets {
            if let Asset::Solana(sa) = asset {
                let addr = sa.asset.address().unwrap_or_default();
                match self.cb.get_balance(addr).await {
                    Ok(balance) => debug!(party, %addr, balance, "asset balance"),
                    Err(err) => debug!(party, %addr, %err, "balance query failed"),
                }
            }
        }
    }

    /// Best-effort abort, reported inside the timeout error rather than
    /// replacing it.
    async fn abort_with_timeout(&self, req: &FundingReq, last_ctrl: Option<Control>) -> FundingError {
        let timed_out: Vec<PartIdx> = match last_ctrl {
            Some(ctrl) => (0..2).filter(|&idx| !ctrl.funded(idx)).collect(),
            None => vec![0, 1],
        };
        warn!(channel = ?req.state.id, ?timed_out, "aborting channel funding");
        let abort_failure = self.abort_channel(&req.state).await.err().map(Box::new);
        FundingError::Timeout {
            timed_out,
            abort_failure,
        }
    }

    /// Submits the AbortFunding instruction for the channel of `state`.
    pub async fn abort_channel(&self, state: &State) -> Result<(), Error> {
        self.cb.abort_funding(self.perun_addr, state.id).await
    }
}

/// True iff the party has a non-zero contribution in any asset of this
/// ledger. Foreign-ledger assets are funded by their own backend.
fn need_funding(agreement: &[Vec<U256>], assets: &[Asset], idx: PartIdx) -> bool {
    assets
        .iter()
        .zip(agreement)
        .any(|(asset, bals)| matches!(asset, Asset::Solana(_)) && !bals[idx].is_zero())
}

/// Funded flags only ever go from false to true while a channel is open; an
/// observed reset means the chain contradicts the protocol.
fn check_funded_monotonic(prev: &Option<Control>, cur: &Control) -> Result<(), FundingError> {
    if let Some(prev) = prev {
        if (prev.funded_a && !cur.funded_a) || (prev.funded_b && !cur.funded_b) {
            return Err(FundingError::ProtocolViolation("funded flag was reset"));
        }
    }
    Ok(())
}

fn party_name(idx: PartIdx) -> &'static str {
    if idx == 1 {
        "party B"
    } else {
        "party A"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::{App, Allocation, ContractLid, SolanaCrossAsset},
        client::{channel_pda, SolanaSigner},
        encoding::{Channel, ChannelInstruction, ChannelState},
        error::ClientError,
        wallet::Account,
    };
    use async_trait::async_trait;
    use rand::{rngs::StdRng, SeedableRng};
    use solana_sdk::{
        hash::Hash as Blockhash, signature::Signature, transaction::Transaction,
    };
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    /// In-memory ledger shared by both parties' mock senders. Applies
    /// decoded channel instructions the way the on-chain program would.
    #[derive(Default)]
    struct MockLedger {
        channels: HashMap<Pubkey, Channel>,
        balances: HashMap<Pubkey, u64>,
        /// Serve these controls (for any channel) on successive reads
        /// before falling back to the stored one.
        control_script: Vec<Control>,
        fail_reads: bool,
        fail_first_reads: usize,
        reads: usize,
        submissions: usize,
    }

    #[derive(Clone)]
    struct MockSender {
        program_id: Pubkey,
        ledger: Arc<Mutex<MockLedger>>,
    }

    impl MockSender {
        fn apply(&self, tx: &Transaction) -> Result<(), ClientError> {
            let mut ledger = self.ledger.lock().unwrap();
            ledger.submissions += 1;

            let data = &tx.message.instructions[0].data;
            let instruction = ChannelInstruction::decode(data)
                .map_err(|err| ClientError::Rpc(format!("program rejected: {err}")))?;
            match instruction {
                ChannelInstruction::Open(open) => {
                    let pda = channel_pda(&open.state.channel_id, &self.program_id);
                    if ledger.channels.contains_key(&pda) {
                        return Err(ClientError::Rpc("channel account in use".into()));
                    }
                    ledger.channels.insert(
                        pda,
                        Channel {
                            params: open.params,
                            state: open.state,
                            control: Control::default(),
                        },
                    );
                }
                ChannelInstruction::Fund(fund) => {
                    let pda = channel_pda(&fund.channel_id, &self.program_id);
                    let channel = ledger
                        .channels
                        .get_mut(&pda)
                        .ok_or_else(|| ClientError::Rpc("no such channel".into()))?;
                    let flag = if fund.party_idx {
                        &mut channel.control.funded_b
                    } else {
                        &mut channel.control.funded_a
                    };
                    if *flag {
                        return Err(ClientError::Rpc("party already funded".into()));
                    }
                    *flag = true;
                }
                ChannelInstruction::AbortFunding(abort) => {
                    let pda = channel_pda(&abort.channel_id, &self.program_id);
                    if let Some(channel) = ledger.channels.get_mut(&pda) {
                        channel.control.closed = true;
                    }
                }
                _ => {}
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Sender for MockSender {
        async fn send_tx(&self, tx: &Transaction) -> Result<Signature, ClientError> {
            self.apply(tx)?;
            Ok(Signature::default())
        }

        async fn send_and_confirm_tx(&self, tx: &Transaction) -> Result<Signature, ClientError> {
            self.apply(tx)?;
            Ok(Signature::default())
        }

        async fn get_account_data(&self, address: &Pubkey) -> Result<Vec<u8>, ClientError> {
            let mut ledger = self.ledger.lock().unwrap();
            ledger.reads += 1;
            if ledger.fail_reads || ledger.reads <= ledger.fail_first_reads {
                return Err(ClientError::Rpc("ledger unreachable".into()));
            }
            let mut channel = ledger
                .channels
                .get(address)
                .cloned()
                .ok_or(ClientError::AccountNotFound(*address))?;
            let scripted = ledger.reads.saturating_sub(ledger.fail_first_reads) - 1;
            if let Some(ctrl) = ledger.control_script.get(scripted) {
                channel.control = *ctrl;
            }
            Ok(crate::encoding::to_bytes(&channel))
        }

        async fn get_latest_blockhash(&self) -> Result<Blockhash, ClientError> {
            let ledger = self.ledger.lock().unwrap();
            if ledger.fail_reads {
                return Err(ClientError::Rpc("ledger unreachable".into()));
            }
            Ok(Blockhash::default())
        }

        async fn get_balance(&self, address: &Pubkey) -> Result<u64, ClientError> {
            let ledger = self.ledger.lock().unwrap();
            Ok(ledger.balances.get(address).copied().unwrap_or(0))
        }
    }

    struct Party {
        funder: Funder<MockSender>,
        req: FundingReq,
    }

    /// Two accounts, one SOL channel, one funder per party, sharing a mock
    /// ledger.
    fn setup(bal_a: u64, bal_b: u64) -> (Vec<Party>, Arc<Mutex<MockLedger>>, Pubkey) {
        let mut rng = StdRng::seed_from_u64(99);
        let program_id = Pubkey::new_unique();
        let ledger = Arc::new(Mutex::new(MockLedger::default()));

        let alloc = Allocation::new(
            vec![Asset::Solana(SolanaCrossAsset::sol())],
            vec![vec![U256::from(bal_a), U256::from(bal_b)]],
        );

        let accounts: Vec<_> = (0..2).map(|_| Account::new_random(&mut rng)).collect();
        let params = Params {
            participants: accounts.iter().map(|(a, _)| a.participant()).collect(),
            nonce: [1u8; 32],
            challenge_duration: 60,
            ledger_channel: true,
            virtual_channel: false,
            app: App::None,
        };
        let state = State::new(&params, alloc).unwrap();

        let parties = accounts
            .into_iter()
            .enumerate()
            .map(|(idx, (account, keypair))| {
                let sender = MockSender {
                    program_id,
                    ledger: Arc::clone(&ledger),
                };
                let signer = SolanaSigner::new(keypair, account.participant(), sender).unwrap();
                let funder = Funder::new(
                    Arc::new(ContractBackend::new(signer)),
                    program_id,
                    // The native asset resolves to the zero address.
                    vec![Pubkey::default()],
                )
                .with_max_iters(10);
                Party {
                    funder,
                    req: FundingReq {
                        part_idx: idx,
                        params: params.clone(),
                        state: state.clone(),
                        agreement: state.allocation.balances.clone(),
                    },
                }
            })
            .collect();

        (parties, ledger, program_id)
    }

    fn stored_control(
        ledger: &Arc<Mutex<MockLedger>>,
        program_id: &Pubkey,
        state: &State,
    ) -> Control {
        let pda = channel_pda(&state.id, program_id);
        ledger.lock().unwrap().channels[&pda].control
    }

    /// Pre-creates the channel account, as party 0's open would.
    fn open_directly(ledger: &Arc<Mutex<MockLedger>>, program_id: &Pubkey, req: &FundingReq) {
        let pda = channel_pda(&req.state.id, program_id);
        let channel = Channel {
            params: (&req.params).try_into().unwrap(),
            state: ChannelState::try_from(&req.state).unwrap(),
            control: Control::default(),
        };
        ledger.lock().unwrap().channels.insert(pda, channel);
    }

    #[tokio::test(start_paused = true)]
    async fn both_parties_converge() {
        let (mut parties, ledger, program_id) = setup(100, 200);
        let party_b = parties.pop().unwrap();
        let party_a = parties.pop().unwrap();

        let (_cancel_a, rx_a) = oneshot::channel();
        let (_cancel_b, rx_b) = oneshot::channel();
        let (res_a, res_b) = tokio::join!(
            party_a.funder.fund(rx_a, party_a.req.clone()),
            party_b.funder.fund(rx_b, party_b.req.clone()),
        );
        res_a.unwrap();
        res_b.unwrap();

        let ctrl = stored_control(&ledger, &program_id, &party_a.req.state);
        assert!(ctrl.funded_a && ctrl.funded_b);
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_ledger_times_out_after_budget() {
        let (mut parties, ledger, _) = setup(100, 200);
        let party_b = parties.pop().unwrap();
        ledger.lock().unwrap().fail_reads = true;

        let (_cancel, rx) = oneshot::channel();
        let err = party_b.funder.fund(rx, party_b.req).await.unwrap_err();
        match err {
            FundingError::Timeout {
                timed_out,
                abort_failure,
            } => {
                assert_eq!(timed_out, vec![0, 1]);
                // The abort submission cannot reach the ledger either.
                assert!(abort_failure.is_some());
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        // One read per tick, nothing beyond the budget.
        assert_eq!(ledger.lock().unwrap().reads, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn party_b_skips_ahead_when_party_a_needs_nothing() {
        let (mut parties, ledger, program_id) = setup(0, 200);
        let party_b = parties.pop().unwrap();
        open_directly(&ledger, &program_id, &party_b.req);

        let (_cancel, rx) = oneshot::channel();
        party_b.funder.fund(rx, party_b.req.clone()).await.unwrap();

        let ctrl = stored_control(&ledger, &program_id, &party_b.req.state);
        assert!(ctrl.funded_b);
        assert!(!ctrl.funded_a);
    }

    #[tokio::test(start_paused = true)]
    async fn party_b_waits_for_party_a() {
        // Party A has a contribution but never acts: B must not submit and
        // times out with both indices unfunded.
        let (mut parties, ledger, program_id) = setup(100, 200);
        let party_b = parties.pop().unwrap();
        open_directly(&ledger, &program_id, &party_b.req);

        let (_cancel, rx) = oneshot::channel();
        let err = party_b.funder.fund(rx, party_b.req.clone()).await.unwrap_err();
        assert!(matches!(err, FundingError::Timeout { ref timed_out, .. } if *timed_out == vec![0, 1]));

        // B never submitted a fund instruction (only the abort went out).
        let ctrl = stored_control(&ledger, &program_id, &party_b.req.state);
        assert!(!ctrl.funded_b);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_need_party_returns_without_submitting() {
        let (mut parties, ledger, program_id) = setup(0, 200);
        parties.pop();
        let party_a = parties.pop().unwrap();

        let (_cancel, rx) = oneshot::channel();
        party_a.funder.fund(rx, party_a.req.clone()).await.unwrap();

        // Party A opened the channel but never funded.
        let ctrl = stored_control(&ledger, &program_id, &party_a.req.state);
        assert!(!ctrl.funded_a);
        assert_eq!(ledger.lock().unwrap().submissions, 1); // the open only
    }

    #[tokio::test(start_paused = true)]
    async fn funding_twice_is_a_noop() {
        let (mut parties, ledger, _program_id) = setup(100, 200);
        let party_b = parties.pop().unwrap();
        let party_a = parties.pop().unwrap();

        let (_ca, rx_a) = oneshot::channel();
        let (_cb, rx_b) = oneshot::channel();
        let (res_a, res_b) = tokio::join!(
            party_a.funder.fund(rx_a, party_a.req.clone()),
            party_b.funder.fund(rx_b, party_b.req.clone()),
        );
        res_a.unwrap();
        res_b.unwrap();

        let submissions = ledger.lock().unwrap().submissions;

        // The channel is already funded: the second call observes both flags
        // on its first poll and submits nothing, not even a new open.
        let (_cancel, rx) = oneshot::channel();
        party_a.funder.fund(rx, party_a.req.clone()).await.unwrap();
        assert_eq!(ledger.lock().unwrap().submissions, submissions);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_funding() {
        let (mut parties, ledger, program_id) = setup(100, 200);
        let party_b = parties.pop().unwrap();
        open_directly(&ledger, &program_id, &party_b.req);

        let (cancel, rx) = oneshot::channel();
        drop(cancel); // cancel before the first tick
        let err = party_b.funder.fund(rx, party_b.req.clone()).await.unwrap_err();
        assert!(matches!(err, FundingError::Timeout { .. }));

        // The abort instruction reached the ledger.
        let ctrl = stored_control(&ledger, &program_id, &party_b.req.state);
        assert!(ctrl.closed);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_read_failures_are_tolerated() {
        let (mut parties, ledger, program_id) = setup(0, 200);
        let party_b = parties.pop().unwrap();
        open_directly(&ledger, &program_id, &party_b.req);
        ledger.lock().unwrap().fail_first_reads = 3;

        let (_cancel, rx) = oneshot::channel();
        party_b.funder.fund(rx, party_b.req.clone()).await.unwrap();

        let ctrl = stored_control(&ledger, &program_id, &party_b.req.state);
        assert!(ctrl.funded_b);
    }

    #[tokio::test(start_paused = true)]
    async fn funded_flag_reset_is_a_protocol_violation() {
        let (mut parties, ledger, program_id) = setup(100, 200);
        let party_b = parties.pop().unwrap();
        open_directly(&ledger, &program_id, &party_b.req);
        ledger.lock().unwrap().control_script = vec![
            Control {
                funded_a: true,
                ..Control::default()
            },
            Control::default(), // funded_a reset: invalid
        ];

        let (_cancel, rx) = oneshot::channel();
        let err = party_b.funder.fund(rx, party_b.req.clone()).await.unwrap_err();
        assert!(matches!(err, FundingError::ProtocolViolation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn unserved_asset_is_rejected() {
        let (mut parties, ledger, program_id) = setup(100, 200);
        let mut party_a = parties.swap_remove(0);

        // Replace the allocation with a token this funder does not serve.
        let mint = Pubkey::new_unique();
        party_a.req.state.allocation.assets =
            vec![Asset::Solana(SolanaCrossAsset::token(mint, ContractLid::new("6")))];
        open_directly(&ledger, &program_id, &party_a.req);

        let (_cancel, rx) = oneshot::channel();
        let err = party_a.funder.fund(rx, party_a.req.clone()).await.unwrap_err();
        assert!(matches!(err, FundingError::UnknownAsset(addr) if addr == mint));
    }
}
