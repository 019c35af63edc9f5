//! Chain state synchronization
//!
//! Reads the chain tip from the ledger and publishes it to a single-slot
//! watch cell on a fixed polling schedule. Miners read the latest value
//! from the cell without waiting for a fresh poll.

use crate::types::{Block, ChainState};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default delay before the first poll
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(1);

/// Default interval between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(8);

/// Read access to the mining contract's storage
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Current global mining state
    async fn get_instance_state(&self) -> Result<ChainState>;

    /// Block record at `index`
    async fn get_block(&self, index: u64) -> Result<Block>;
}

/// Chain tip as observed by one poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainSnapshot {
    pub state: ChainState,
    /// Block at `state.current`
    pub block: Block,
}

impl ChainSnapshot {
    /// Index of the last mined block
    pub fn current(&self) -> u64 {
        self.state.current
    }

    /// Whether this snapshot is a new mining target compared to `previous`.
    ///
    /// Only `current` is compared; difficulty or metadata changes alone do
    /// not count.
    pub fn changed_since(&self, previous: Option<&ChainSnapshot>) -> bool {
        previous.map_or(true, |prev| prev.current() != self.current())
    }
}

/// Latest chain tip published in a watch cell, if any
pub fn observed_current(tip: &watch::Receiver<Option<ChainSnapshot>>) -> Option<u64> {
    tip.borrow().as_ref().map(ChainSnapshot::current)
}

/// Fetches chain snapshots from a ledger
#[derive(Clone)]
pub struct ChainStateReader {
    ledger: Arc<dyn LedgerReader>,
}

impl ChainStateReader {
    /// Create a reader over a ledger
    pub fn new(ledger: Arc<dyn LedgerReader>) -> Self {
        Self { ledger }
    }

    /// Fetch the current state and the block it points to.
    ///
    /// Transport failures surface as `LedgerUnavailable`; nothing is retried.
    #[instrument(skip(self))]
    pub async fn fetch_latest(&self) -> Result<ChainSnapshot> {
        let state = self.ledger.get_instance_state().await?;
        let block = self.ledger.get_block(state.current).await?;

        if block.index != state.current {
            return Err(Error::ledger_schema(format!(
                "Block stored under index {} reports index {}",
                state.current, block.index
            )));
        }

        debug!(
            current = state.current,
            difficulty = state.difficulty,
            "Fetched chain state"
        );

        Ok(ChainSnapshot { state, block })
    }
}

/// Polling cadence of the chain watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Delay before the first poll
    pub initial_delay: Duration,
    /// Interval between subsequent polls
    pub interval: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_POLL_DELAY,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Background task publishing chain snapshots
pub struct ChainWatcher;

impl ChainWatcher {
    /// Spawn the polling task.
    ///
    /// The returned cell holds `None` until the first successful poll and is
    /// only updated when `current` changes. The task ends when `shutdown` is
    /// cancelled or every receiver is dropped.
    pub fn spawn(
        reader: ChainStateReader,
        schedule: PollSchedule,
        shutdown: CancellationToken,
    ) -> (watch::Receiver<Option<ChainSnapshot>>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(None);

        let handle = tokio::spawn(async move {
            let start = Instant::now() + schedule.initial_delay;
            let mut ticker = interval_at(start, schedule.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                initial_delay_ms = schedule.initial_delay.as_millis() as u64,
                interval_ms = schedule.interval.as_millis() as u64,
                "Chain watcher started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let result = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = reader.fetch_latest() => result,
                };

                match result {
                    Ok(snapshot) => {
                        let current = snapshot.current();
                        let difficulty = snapshot.state.difficulty;
                        let mined_at = snapshot.block.mined_at();
                        let published = tx.send_if_modified(|slot| {
                            if snapshot.changed_since(slot.as_ref()) {
                                *slot = Some(snapshot);
                                true
                            } else {
                                false
                            }
                        });

                        if published {
                            info!(
                                current,
                                difficulty,
                                mined_at = %mined_at.map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339()),
                                "New chain tip"
                            );
                        } else {
                            debug!(current, "Chain tip unchanged");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, category = e.category(), "Chain state poll failed");
                    }
                }

                if tx.is_closed() {
                    debug!("All chain state receivers dropped");
                    break;
                }
            }

            info!("Chain watcher stopped");
        });

        (rx, handle)
    }
}
