//! Lifecycle Driver
//!
//! One tick: read the current round, then start, resolve, or wait.
//!
//! ```text
//! NoRound ──start──▶ RoundActive ──now ≥ end+grace──▶ RoundExpiredUnresolved
//!                        ▲                                     │ resolve
//!                        └──────────start next──────── RoundResolved
//! ```
//!
//! A resolve is chained into the next start within the same tick. Every
//! failure is contained in the tick that hit it; the loop never exits.

use super::{Clock, PriceSource, RoundChain};
use crate::config::KeeperConfig;
use crate::services::chain_errors::{ChainError, Disposition};
use crate::services::metrics::KeeperMetrics;
use crate::types::{PriceSample, Round, RoundCall, RoundPhase, StartCall};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A round is running; nothing to do
    Waiting { round_id: u64 },
    /// This tick opened a new round
    Started { round_id: u64 },
    /// The contract refused a transition as premature
    Deferred { round_id: u64 },
    /// Retry after the error backoff
    Failed { reason: String },
}

impl TickOutcome {
    /// How long to sleep before the next tick
    pub fn delay(&self, config: &KeeperConfig) -> Duration {
        match self {
            TickOutcome::Failed { .. } => Duration::from_secs(config.error_backoff_secs),
            _ => Duration::from_secs(config.poll_interval_secs),
        }
    }
}

/// Drives rounds through start -> expire -> resolve -> start
pub struct LifecycleDriver<C, P, K> {
    chain: C,
    prices: P,
    clock: K,
    config: KeeperConfig,
    metrics: KeeperMetrics,
    phase: RoundPhase,
    /// Latest round id observed on-chain
    last_round_id: u64,
    /// (round id, unix time of the last info-level progress line)
    last_seen: Option<(u64, u64)>,
    last_dev_fee_check: Option<u64>,
}

impl<C: RoundChain, P: PriceSource, K: Clock> LifecycleDriver<C, P, K> {
    pub fn new(chain: C, prices: P, clock: K, config: KeeperConfig, metrics: KeeperMetrics) -> Self {
        Self {
            chain,
            prices,
            clock,
            config,
            metrics,
            phase: RoundPhase::NoRound,
            last_round_id: 0,
            last_seen: None,
            last_dev_fee_check: None,
        }
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn metrics(&self) -> &KeeperMetrics {
        &self.metrics
    }

    /// Run ticks forever
    pub async fn run(&mut self) {
        info!(
            "Keeper loop started (poll {}s, grace {}s, backoff {}s)",
            self.config.poll_interval_secs, self.config.grace_secs, self.config.error_backoff_secs
        );

        let mut last_heartbeat = self.clock.now();

        loop {
            let outcome = self.tick().await;

            let now = self.clock.now();
            if self.config.heartbeat_secs > 0
                && now.saturating_sub(last_heartbeat) >= self.config.heartbeat_secs
            {
                let m = self.metrics.snapshot();
                info!(
                    "Heartbeat: round=#{} phase={} ticks={} started={} resolved={} already_done={} errors={} fallbacks={}",
                    self.last_round_id,
                    self.phase,
                    m.ticks,
                    m.rounds_started,
                    m.rounds_resolved,
                    m.already_done,
                    m.loop_errors,
                    m.price_fallbacks
                );
                last_heartbeat = now;
            }

            tokio::time::sleep(outcome.delay(&self.config)).await;
        }
    }

    /// One loop iteration. Never panics on chain or price failures.
    pub async fn tick(&mut self) -> TickOutcome {
        self.metrics.inc_ticks();

        self.check_dev_fee().await;

        let outcome = match self.advance().await {
            Ok(outcome) => outcome,
            Err(e) => TickOutcome::Failed { reason: e.to_string() },
        };

        if let TickOutcome::Failed { reason } = &outcome {
            self.metrics.inc_loop_errors();
            error!("Tick failed: {}", reason);
        }

        outcome
    }

    async fn advance(&mut self) -> Result<TickOutcome, ChainError> {
        let round_id = self.chain.current_round_id().await?;
        self.last_round_id = round_id;

        if round_id == 0 {
            self.set_phase(RoundPhase::NoRound);
            info!("No round on-chain yet, starting the first one");
            return self.start_round(0, StartCall::First).await;
        }

        let round = self.chain.get_round(round_id).await?;

        if round.resolved {
            self.set_phase(RoundPhase::RoundResolved);
            info!("Round #{} is resolved, starting the next one", round_id);
            return self.start_next(round_id).await;
        }

        let now = self.clock.now();
        if !round.is_expired(now, self.config.grace_secs) {
            self.set_phase(RoundPhase::RoundActive);
            self.log_active(&round, now);
            return Ok(TickOutcome::Waiting { round_id });
        }

        self.set_phase(RoundPhase::RoundExpiredUnresolved);
        self.resolve(&round).await
    }

    /// Resolve an expired round, then chain straight into the next start
    async fn resolve(&mut self, round: &Round) -> Result<TickOutcome, ChainError> {
        let sample = self.fetch_price().await;
        let now = self.clock.now();

        info!(
            "Resolving round #{}: close {} vs strike {} (ended {}s ago)",
            round.id,
            sample,
            PriceSample::primary(round.strike_price_cents),
            now.saturating_sub(round.end_time)
        );

        let call = RoundCall::ResolveRound {
            closing_cents: sample.value_cents,
            proof_hash: sample.proof_hash(now),
        };

        match self.chain.submit(call).await {
            Ok(receipt) => {
                self.metrics.inc_rounds_resolved();
                info!(
                    "Round #{} resolved ({}) in block {}",
                    round.id,
                    if sample.value_cents > round.strike_price_cents { "UP" } else { "DOWN" },
                    receipt.block_number
                );
            }
            Err(e) => match e.disposition() {
                Disposition::AlreadyDone => {
                    self.metrics.inc_already_done();
                    info!("Round #{} was already resolved: {}", round.id, e);
                }
                Disposition::NotYetEligible => {
                    info!("Round #{} not ended on-chain yet, retrying next tick", round.id);
                    return Ok(TickOutcome::Deferred { round_id: round.id });
                }
                Disposition::Unknown => {
                    self.metrics.inc_tx_failures();
                    warn!("Resolve of round #{} failed: {}", round.id, e);
                    return Err(e);
                }
            },
        }

        // Only start the next round once resolution is visible on-chain
        let confirmed = self.chain.get_round(round.id).await?;
        if !confirmed.resolved {
            return Ok(TickOutcome::Failed {
                reason: format!("round #{} still unresolved after resolve", round.id),
            });
        }

        self.set_phase(RoundPhase::RoundResolved);
        self.start_next(round.id).await
    }

    /// Start the round after `resolved_id`, unless someone already did
    async fn start_next(&mut self, resolved_id: u64) -> Result<TickOutcome, ChainError> {
        let current = self.chain.current_round_id().await?;
        if current > resolved_id {
            self.last_round_id = current;
            self.metrics.inc_already_done();
            info!("Round #{} was already started", current);
            self.set_phase(RoundPhase::RoundActive);
            return Ok(TickOutcome::Waiting { round_id: current });
        }

        self.start_round(resolved_id, self.config.start_call).await
    }

    async fn start_round(&mut self, previous_id: u64, kind: StartCall) -> Result<TickOutcome, ChainError> {
        let sample = self.fetch_price().await;
        let call = kind.build(sample.value_cents);
        let next_id = previous_id + 1;

        info!("Starting round #{} via {} with strike {}", next_id, call.label(), sample);

        match self.chain.submit(call).await {
            Ok(receipt) => {
                self.metrics.inc_rounds_started();
                self.set_phase(RoundPhase::RoundActive);
                self.last_round_id = next_id;
                self.last_seen = None;
                info!("Round #{} started in block {}", next_id, receipt.block_number);
                Ok(TickOutcome::Started { round_id: next_id })
            }
            Err(e) => match e.disposition() {
                Disposition::AlreadyDone => {
                    self.metrics.inc_already_done();
                    self.last_round_id = next_id;
                    info!("Round #{} was already started: {}", next_id, e);
                    Ok(TickOutcome::Waiting { round_id: next_id })
                }
                Disposition::NotYetEligible => {
                    info!("Contract not ready for round #{}: {}", next_id, e);
                    Ok(TickOutcome::Deferred { round_id: previous_id })
                }
                Disposition::Unknown => {
                    self.metrics.inc_tx_failures();
                    warn!("Starting round #{} failed: {}", next_id, e);
                    Err(e)
                }
            },
        }
    }

    /// Distribute accrued dev fees when the contract allows it.
    /// Failures are logged and never affect the round lifecycle.
    async fn check_dev_fee(&mut self) {
        let interval = self.config.dev_fee_check_secs;
        if interval == 0 {
            return;
        }

        let now = self.clock.now();
        if let Some(last) = self.last_dev_fee_check {
            if now.saturating_sub(last) < interval {
                return;
            }
        }
        self.last_dev_fee_check = Some(now);

        let status = match self.chain.dev_fee_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!("Dev fee check failed: {}", e);
                return;
            }
        };

        if !status.is_due() {
            debug!(
                "Dev fee not due (accrued {} wei, next in {}s)",
                status.accrued_wei, status.seconds_until_next
            );
            return;
        }

        info!("Distributing {} wei of dev fees", status.accrued_wei);
        match self.chain.submit(RoundCall::DistributeDevFee).await {
            Ok(receipt) => {
                self.metrics.inc_dev_fees_distributed();
                info!("Dev fees distributed in block {}", receipt.block_number);
            }
            Err(e) => warn!("Dev fee distribution failed: {}", e),
        }
    }

    async fn fetch_price(&self) -> PriceSample {
        let sample = self.prices.fetch_price().await;
        if sample.is_fallback() {
            self.metrics.inc_price_fallbacks();
        }
        sample
    }

    fn set_phase(&mut self, phase: RoundPhase) {
        if self.phase != phase {
            debug!("Phase: {} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn log_active(&mut self, round: &Round, now: u64) {
        let left = round.seconds_left(now).max(0);
        let due = match self.last_seen {
            Some((id, logged_at)) => id != round.id || now.saturating_sub(logged_at) >= self.config.log_every_secs,
            None => true,
        };

        if due {
            info!(
                "Round #{} active: {}s left, {} bets, strike {}",
                round.id,
                left,
                round.total_bets,
                PriceSample::primary(round.strike_price_cents)
            );
            self.last_seen = Some((round.id, now));
        } else {
            debug!("Round #{} active: {}s left", round.id, left);
        }
    }
}
