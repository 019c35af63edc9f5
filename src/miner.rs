//! Cooperative proof-of-work search
//!
//! A [`Miner`] owns at most one [`MiningAttempt`]. The search evaluates one
//! nonce per trial, checks the cancellation token and the published chain
//! tip at every trial boundary, and yields to the runtime every
//! `yield_every` trials so that a stop request is observed after at most one
//! further trial.

use crate::address::Address;
use crate::chain::{observed_current, ChainSnapshot};
use crate::crypto::{check_difficulty, KeccakHasher};
use crate::preimage::Preimage;
use crate::types::{BlockHash, ChainState, MinerMessage, Nonce};
use crate::{Error, Result};
use clap::ValueEnum;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument, Span};

/// Lifecycle of the miner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MinerState {
    Idle,
    Armed,
    Searching,
    Found,
    Cancelled,
    Stale,
}

impl fmt::Display for MinerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MinerState::Idle => "idle",
            MinerState::Armed => "armed",
            MinerState::Searching => "searching",
            MinerState::Found => "found",
            MinerState::Cancelled => "cancelled",
            MinerState::Stale => "stale",
        };
        f.write_str(name)
    }
}

/// What to do when the chain tip moves during a search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicy {
    /// Abandon the attempt at the next trial boundary
    #[default]
    Abort,
    /// Keep searching the old target; the ledger rejects it at simulation
    Ignore,
}

impl fmt::Display for StalePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StalePolicy::Abort => write!(f, "abort"),
            StalePolicy::Ignore => write!(f, "ignore"),
        }
    }
}

/// Miner tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinerConfig {
    /// Trials between two yields to the runtime
    pub yield_every: u64,
    pub stale_policy: StalePolicy,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            yield_every: 1,
            stale_policy: StalePolicy::Abort,
        }
    }
}

/// In-progress search state
#[derive(Debug, Clone)]
pub struct MiningAttempt {
    pub target_index: u64,
    pub difficulty: u32,
    pub prev_hash: Vec<u8>,
    pub message: MinerMessage,
    pub miner: Address,
    pub nonce: Nonce,
    pub last_hash: Option<BlockHash>,
    preimage: Preimage,
}

impl MiningAttempt {
    /// Build an attempt on top of the snapshot's tip, starting at nonce 0
    pub fn new(snapshot: &ChainSnapshot, message: MinerMessage, miner: Address) -> Result<Self> {
        let difficulty = snapshot.state.difficulty;
        check_difficulty(difficulty)?;

        let target_index = snapshot
            .current()
            .checked_add(1)
            .ok_or_else(|| Error::invalid_state("Chain index overflow"))?;
        let prev_hash = snapshot.block.hash.as_bytes().to_vec();
        let nonce = Nonce::default();
        let preimage = Preimage::new(target_index, &message, &prev_hash, nonce, &miner);

        Ok(Self {
            target_index,
            difficulty,
            prev_hash,
            message,
            miner,
            nonce,
            last_hash: None,
            preimage,
        })
    }

    /// Whether the chain tip `observed_current` invalidates this attempt
    pub fn is_stale_at(&self, observed_current: u64) -> bool {
        observed_current != self.target_index - 1
    }

    fn solution(&self, hash: BlockHash) -> Solution {
        Solution {
            target_index: self.target_index,
            difficulty: self.difficulty,
            nonce: self.nonce,
            hash,
            message: self.message.clone(),
            miner: self.miner,
            prev_hash: self.prev_hash.clone(),
        }
    }
}

/// A nonce whose hash meets the attempt's difficulty
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Solution {
    pub target_index: u64,
    pub difficulty: u32,
    pub nonce: Nonce,
    pub hash: BlockHash,
    pub message: MinerMessage,
    pub miner: Address,
    #[serde(with = "crate::types::hex_bytes")]
    pub prev_hash: Vec<u8>,
}

impl Solution {
    /// Fail with `StaleAttempt` unless `state` still points at the block
    /// this solution extends
    pub fn ensure_current(&self, state: &ChainState) -> Result<()> {
        if state.current.checked_add(1) != Some(self.target_index) {
            return Err(Error::stale(self.target_index, state.current));
        }
        Ok(())
    }
}

/// Result of one search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(Solution),
    /// Stopped by the cancellation token before evaluating `nonce`
    Cancelled { nonce: Nonce },
    /// The chain tip moved away from the attempt's target
    Stale {
        target_index: u64,
        observed_current: u64,
    },
}

impl SearchOutcome {
    fn state(&self) -> MinerState {
        match self {
            SearchOutcome::Found(_) => MinerState::Found,
            SearchOutcome::Cancelled { .. } => MinerState::Cancelled,
            SearchOutcome::Stale { .. } => MinerState::Stale,
        }
    }
}

/// Per-trial progress published for telemetry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MiningProgress {
    pub state: MinerState,
    pub target_index: u64,
    pub nonce: Nonce,
    pub hash: Option<BlockHash>,
    /// Trials completed in this attempt
    pub trials: u64,
}

/// Mining statistics across attempts
#[derive(Debug, Clone, Default)]
pub struct MiningStats {
    /// Total hashes computed
    pub total_hashes: u64,
    /// Number of solutions found
    pub solutions_found: u64,
    /// Attempts abandoned because the tip moved
    pub stale_attempts: u64,
    /// Attempts stopped by the operator
    pub cancelled_attempts: u64,
    /// Time spent searching
    pub mining_time: Duration,
    /// Hash rate of the last attempt (hashes per second)
    pub current_hash_rate: f64,
}

impl MiningStats {
    /// Account for a finished attempt
    pub fn record(&mut self, trials: u64, elapsed: Duration, outcome: &SearchOutcome) {
        self.total_hashes += trials;
        self.mining_time += elapsed;
        self.current_hash_rate = compute_hash_rate(trials, elapsed);

        match outcome {
            SearchOutcome::Found(_) => self.solutions_found += 1,
            SearchOutcome::Cancelled { .. } => self.cancelled_attempts += 1,
            SearchOutcome::Stale { .. } => self.stale_attempts += 1,
        }
    }

    /// Average hash rate over all attempts (hashes per second)
    pub fn average_hash_rate(&self) -> f64 {
        compute_hash_rate(self.total_hashes, self.mining_time)
    }
}

/// Hash rate over a time period
pub fn compute_hash_rate(hashes: u64, elapsed: Duration) -> f64 {
    if elapsed.as_secs_f64() > 0.0 {
        hashes as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    }
}

/// Create a tracing span for a mining attempt
pub fn mining_span(target_index: u64, difficulty: u32) -> Span {
    tracing::info_span!("mining", target_index, difficulty)
}

/// Operator start/stop switch.
///
/// Stopping is sticky: the token stays cancelled until [`MiningToggle::arm`]
/// installs a fresh one.
#[derive(Debug, Default)]
pub struct MiningToggle {
    token: Mutex<CancellationToken>,
}

impl MiningToggle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for the next search, replacing a stopped one
    pub fn arm(&self) -> CancellationToken {
        let mut token = self.token.lock();
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
        token.clone()
    }

    /// Stop the current search
    pub fn stop(&self) {
        self.token.lock().cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.lock().is_cancelled()
    }

    /// Current token without rearming
    pub fn token(&self) -> CancellationToken {
        self.token.lock().clone()
    }
}

/// Single-attempt proof-of-work miner
pub struct Miner {
    config: MinerConfig,
    state: MinerState,
    attempt: Option<MiningAttempt>,
    stats: MiningStats,
    hasher: KeccakHasher,
}

impl Miner {
    /// Create an idle miner
    pub fn new(config: MinerConfig) -> Self {
        Self {
            config,
            state: MinerState::Idle,
            attempt: None,
            stats: MiningStats::default(),
            hasher: KeccakHasher::new(),
        }
    }

    pub fn state(&self) -> MinerState {
        self.state
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Armed attempt, if any
    pub fn attempt(&self) -> Option<&MiningAttempt> {
        self.attempt.as_ref()
    }

    pub fn stats(&self) -> &MiningStats {
        &self.stats
    }

    /// Prepare an attempt against the snapshot's tip, replacing any armed one
    pub fn arm(
        &mut self,
        snapshot: &ChainSnapshot,
        message: MinerMessage,
        miner: Address,
    ) -> Result<&MiningAttempt> {
        let attempt = MiningAttempt::new(snapshot, message, miner)?;

        info!(
            target_index = attempt.target_index,
            difficulty = attempt.difficulty,
            prev_hash = %hex::encode(&attempt.prev_hash),
            "Miner armed"
        );

        self.state = MinerState::Armed;
        let attempt = self.attempt.insert(attempt);
        Ok(&*attempt)
    }

    /// Drop the armed attempt
    pub fn disarm(&mut self) {
        self.attempt = None;
        self.state = MinerState::Idle;
    }

    /// Run the armed attempt until it is found, cancelled or stale.
    ///
    /// `tip` is the published chain tip, read without blocking at every
    /// trial when the stale policy is `Abort`. `progress` holds the latest
    /// update only: it is overwritten after every trial and once more with
    /// the terminal state, so a slow reader never queues anything.
    /// The miner is idle again when this returns.
    pub async fn search(
        &mut self,
        cancel: &CancellationToken,
        tip: Option<&watch::Receiver<Option<ChainSnapshot>>>,
        progress: Option<&watch::Sender<Option<MiningProgress>>>,
    ) -> Result<SearchOutcome> {
        let attempt = self
            .attempt
            .take()
            .ok_or_else(|| Error::invalid_state("Miner is not armed"))?;
        let span = mining_span(attempt.target_index, attempt.difficulty);

        let result = self
            .run(attempt, cancel, tip, progress)
            .instrument(span)
            .await;

        self.state = MinerState::Idle;
        result
    }

    async fn run(
        &mut self,
        mut attempt: MiningAttempt,
        cancel: &CancellationToken,
        tip: Option<&watch::Receiver<Option<ChainSnapshot>>>,
        progress: Option<&watch::Sender<Option<MiningProgress>>>,
    ) -> Result<SearchOutcome> {
        self.state = MinerState::Searching;
        info!(stale_policy = %self.config.stale_policy, "Search started");

        let yield_every = self.config.yield_every.max(1);
        let watch_tip = match self.config.stale_policy {
            StalePolicy::Abort => tip,
            StalePolicy::Ignore => None,
        };
        let started = Instant::now();
        let mut trials = 0u64;

        let outcome = loop {
            if cancel.is_cancelled() {
                break SearchOutcome::Cancelled {
                    nonce: attempt.nonce,
                };
            }

            if let Some(observed) = watch_tip.and_then(observed_current) {
                if attempt.is_stale_at(observed) {
                    break SearchOutcome::Stale {
                        target_index: attempt.target_index,
                        observed_current: observed,
                    };
                }
            }

            attempt.preimage.set_nonce(attempt.nonce);
            let (found, hash) = self
                .hasher
                .hash_and_check(attempt.preimage.bytes(), attempt.difficulty);
            attempt.last_hash = Some(hash);
            trials += 1;

            if found {
                break SearchOutcome::Found(attempt.solution(hash));
            }

            publish(
                progress,
                MiningProgress {
                    state: MinerState::Searching,
                    target_index: attempt.target_index,
                    nonce: attempt.nonce,
                    hash: Some(hash),
                    trials,
                },
            );

            attempt.nonce = attempt
                .nonce
                .next()
                .ok_or_else(|| Error::invalid_state("Nonce space exhausted"))?;

            if trials % yield_every == 0 {
                tokio::task::yield_now().await;
            }
        };

        let elapsed = started.elapsed();
        self.state = outcome.state();
        self.stats.record(trials, elapsed, &outcome);

        publish(
            progress,
            MiningProgress {
                state: self.state,
                target_index: attempt.target_index,
                nonce: attempt.nonce,
                hash: attempt.last_hash,
                trials,
            },
        );

        match &outcome {
            SearchOutcome::Found(solution) => info!(
                nonce = solution.nonce.value(),
                hash = %solution.hash,
                trials,
                elapsed_ms = elapsed.as_millis() as u64,
                "Solution found"
            ),
            SearchOutcome::Cancelled { nonce } => {
                info!(nonce = nonce.value(), trials, "Search cancelled")
            }
            SearchOutcome::Stale {
                observed_current, ..
            } => info!(observed_current, trials, "Chain tip moved, attempt is stale"),
        }
        debug!(
            hash_rate = self.stats.current_hash_rate,
            total_hashes = self.stats.total_hashes,
            "Search finished"
        );

        Ok(outcome)
    }
}

fn publish(progress: Option<&watch::Sender<Option<MiningProgress>>>, update: MiningProgress) {
    if let Some(tx) = progress {
        // receiver may be gone
        let _ = tx.send(Some(update));
    }
}
