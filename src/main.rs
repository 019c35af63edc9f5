//! FCM Miner - Main Application
//!
//! Mines blocks of the FCM Soroban contract and prints each winning `mine`
//! transaction for manual signing and broadcast.

use fcm_miner::{
    chain::{ChainSnapshot, ChainStateReader, ChainWatcher, LedgerReader},
    client::SorobanClient,
    miner::{compute_hash_rate, MiningProgress, MiningStats, MiningToggle, SearchOutcome},
    transaction::{LedgerWriter, SubmittablePayload, TransactionAssembler},
    utils::{format_duration, format_hash_rate, init_logging},
    Address, Config, Error, Miner, MinerMessage, MinerState, Result, Solution, APP_DESCRIPTION,
    APP_NAME, APP_VERSION,
};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Interval between two progress log lines
const PROGRESS_REPORT_INTERVAL: Duration = Duration::from_secs(5);

type Tip = watch::Receiver<Option<ChainSnapshot>>;
type Progress = watch::Sender<Option<MiningProgress>>;

/// Receives every assembled transaction
type PayloadSink = Box<dyn Fn(&SubmittablePayload) + Send + Sync>;

/// Stops the current search and the background tasks together
#[derive(Clone)]
struct StopHandle {
    toggle: Arc<MiningToggle>,
    shutdown: CancellationToken,
}

impl StopHandle {
    fn new() -> Self {
        Self {
            toggle: Arc::new(MiningToggle::new()),
            shutdown: CancellationToken::new(),
        }
    }

    fn stop(&self) {
        self.toggle.stop();
        self.shutdown.cancel();
    }
}

/// What became of a found solution
enum Submission {
    /// Handed to the sink; the tip it extends
    Assembled { current: u64 },
    /// The tip moved before the transaction could be built
    Discarded,
    Shutdown,
}

/// Main mining coordinator
struct MiningCoordinator {
    config: Config,
    reader: Arc<dyn LedgerReader>,
    writer: Arc<dyn LedgerWriter>,
    contract: Address,
    miner: Address,
    message: MinerMessage,
    stop: StopHandle,
    sink: PayloadSink,
}

impl MiningCoordinator {
    /// Create a coordinator talking to the configured RPC endpoint
    fn new(config: Config) -> Result<Self> {
        let client = Arc::new(SorobanClient::new(
            &config.rpc_url,
            config.contract_address()?,
            config.http_timeout_duration(),
        )?);

        let coordinator = Self::with_ledger(config, client.clone(), client)?;
        Ok(coordinator.with_sink(Box::new(|payload: &SubmittablePayload| {
            println!("{}", payload)
        })))
    }

    fn with_ledger(
        config: Config,
        reader: Arc<dyn LedgerReader>,
        writer: Arc<dyn LedgerWriter>,
    ) -> Result<Self> {
        let contract = config.contract_address()?;
        let miner = config.miner_address()?;
        let message = config.miner_message()?;

        Ok(Self {
            config,
            reader,
            writer,
            contract,
            miner,
            message,
            stop: StopHandle::new(),
            sink: Box::new(|_: &SubmittablePayload| {}),
        })
    }

    fn with_sink(mut self, sink: PayloadSink) -> Self {
        self.sink = sink;
        self
    }

    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stop mining on Ctrl-C
    fn install_signal_handler(&self) {
        let stop = self.stop_handle();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupt received, stopping"),
                Err(e) => error!("Failed to listen for interrupt: {}", e),
            }
            stop.stop();
        });
    }

    /// Run until stopped or until a simulation is rejected
    async fn run(self) -> Result<MiningStats> {
        let reader = ChainStateReader::new(Arc::clone(&self.reader));
        let (mut tip, watcher) = ChainWatcher::spawn(
            reader,
            self.config.poll_schedule()?,
            self.stop.shutdown.clone(),
        );

        let assembler =
            TransactionAssembler::new(Arc::clone(&self.writer), self.contract, self.config.base_fee);

        let (progress_tx, progress_rx) = watch::channel(None);
        let reporter = tokio::spawn(report_progress(progress_rx, self.stop.shutdown.clone()));

        let mut miner = Miner::new(self.config.miner_config());
        let result = self
            .mining_loop(&mut miner, &mut tip, &assembler, &progress_tx)
            .await;

        self.stop.shutdown.cancel();
        if let Err(e) = watcher.await {
            warn!("Chain watcher task failed: {}", e);
        }
        if let Err(e) = reporter.await {
            warn!("Progress reporter task failed: {}", e);
        }

        let stats = miner.stats().clone();
        info!(
            total_hashes = stats.total_hashes,
            solutions = stats.solutions_found,
            stale = stats.stale_attempts,
            average_rate = %format_hash_rate(stats.average_hash_rate()),
            "Mining stopped"
        );

        result.map(|()| stats)
    }

    async fn mining_loop(
        &self,
        miner: &mut Miner,
        tip: &mut Tip,
        assembler: &TransactionAssembler,
        progress: &Progress,
    ) -> Result<()> {
        let retry_delay = self.config.poll_schedule()?.interval;

        loop {
            let Some(snapshot) = self.next_snapshot(tip).await? else {
                return Ok(());
            };

            let cancel = self.stop.toggle.arm();
            miner.arm(&snapshot, self.message.clone(), self.miner)?;

            match miner.search(&cancel, Some(&*tip), Some(progress)).await? {
                SearchOutcome::Found(solution) => {
                    match self.submit(&solution, tip, assembler, retry_delay).await? {
                        Submission::Assembled { current } => {
                            if !self.wait_for_new_tip(tip, current).await? {
                                return Ok(());
                            }
                        }
                        Submission::Discarded => {}
                        Submission::Shutdown => return Ok(()),
                    }
                }
                SearchOutcome::Stale {
                    target_index,
                    observed_current,
                } => {
                    info!(target_index, observed_current, "Chain tip moved, restarting");
                }
                SearchOutcome::Cancelled { nonce } => {
                    info!(nonce = nonce.value(), "Mining cancelled");
                    return Ok(());
                }
            }
        }
    }

    /// Assemble the solution's transaction, retrying transient failures on
    /// the next tip change or poll interval for as long as it stays current
    async fn submit(
        &self,
        solution: &Solution,
        tip: &mut Tip,
        assembler: &TransactionAssembler,
        retry_delay: Duration,
    ) -> Result<Submission> {
        let mut attempts = 0u32;

        loop {
            let current = match latest_snapshot(tip) {
                Some(latest) => {
                    if let Err(e) = solution.ensure_current(&latest.state) {
                        info!("Discarding solution: {}", e);
                        return Ok(Submission::Discarded);
                    }
                    latest.current()
                }
                None => solution.target_index.saturating_sub(1),
            };

            attempts += 1;
            match assembler.assemble(solution).await {
                Ok(payload) => {
                    info!(
                        block = solution.target_index,
                        nonce = solution.nonce.value(),
                        hash = %solution.hash,
                        fee = payload.fee,
                        attempts,
                        "Transaction assembled, sign and submit it to claim the block"
                    );
                    (self.sink)(&payload);
                    return Ok(Submission::Assembled { current });
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        block = solution.target_index,
                        attempts,
                        "Failed to assemble transaction, keeping solution: {}",
                        e
                    );
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = self.stop.shutdown.cancelled() => return Ok(Submission::Shutdown),
                _ = tokio::time::sleep(retry_delay) => {}
                changed = tip.changed() => {
                    changed.map_err(|_| Error::invalid_state("Chain watcher stopped"))?;
                }
            }
        }
    }

    /// Latest published snapshot, waiting for the first one
    async fn next_snapshot(&self, tip: &mut Tip) -> Result<Option<ChainSnapshot>> {
        let waited = async {
            tip.wait_for(Option::is_some)
                .await
                .map(|slot| slot.clone())
        };

        tokio::select! {
            _ = self.stop.shutdown.cancelled() => Ok(None),
            slot = waited => slot.map_err(|_| Error::invalid_state("Chain watcher stopped")),
        }
    }

    /// Wait until the published tip differs from `current`.
    /// Returns false on shutdown.
    async fn wait_for_new_tip(&self, tip: &mut Tip, current: u64) -> Result<bool> {
        let waited = async {
            tip.wait_for(|slot| slot.as_ref().map(ChainSnapshot::current) != Some(current))
                .await
                .map(|_| ())
        };

        tokio::select! {
            _ = self.stop.shutdown.cancelled() => Ok(false),
            changed = waited => changed
                .map(|()| true)
                .map_err(|_| Error::invalid_state("Chain watcher stopped")),
        }
    }
}

fn latest_snapshot(tip: &Tip) -> Option<ChainSnapshot> {
    tip.borrow().clone()
}

/// Trials run between two progress readings
fn trials_since(previous: Option<&MiningProgress>, latest: &MiningProgress) -> u64 {
    match previous {
        Some(p) if p.target_index == latest.target_index && p.trials <= latest.trials => {
            latest.trials - p.trials
        }
        _ => latest.trials,
    }
}

/// Log the latest progress at a fixed cadence
async fn report_progress(
    progress: watch::Receiver<Option<MiningProgress>>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(PROGRESS_REPORT_INTERVAL);
    let mut previous: Option<MiningProgress> = None;
    let mut window_start = Instant::now();
    let mut attempt_started = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let latest = progress.borrow().clone();
        let window = window_start.elapsed();
        window_start = Instant::now();

        let Some(latest) = latest else { continue };
        let trials = trials_since(previous.as_ref(), &latest);
        if previous.as_ref().map(|p| p.target_index) != Some(latest.target_index) {
            attempt_started = Instant::now();
        }

        if latest.state == MinerState::Searching {
            info!(
                block = latest.target_index,
                nonce = latest.nonce.value(),
                hash = ?latest.hash.map(|h| h.to_hex()),
                rate = %format_hash_rate(compute_hash_rate(trials, window)),
                elapsed = %format_duration(attempt_started.elapsed().as_secs()),
                "Mining"
            );
        } else {
            debug!(state = %latest.state, trials = latest.trials, "Attempt finished");
        }
        previous = Some(latest);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load and validate configuration
    let config = Config::load().await?;

    // Handle special commands
    if config.info {
        print_info();
        return Ok(());
    }

    if config.print_config {
        print_configuration(&config)?;
        return Ok(());
    }

    let _log_guard = init_logging(config.log_level, config.log_format, config.log_file.as_deref())?;

    info!("Starting {} v{}", APP_NAME, APP_VERSION);
    info!(
        rpc = %config.rpc_url,
        contract = %config.contract_id,
        stale_policy = %config.stale_policy,
        "Configuration loaded"
    );

    let coordinator = MiningCoordinator::new(config)?;
    coordinator.install_signal_handler();

    match coordinator.run().await {
        Ok(_) => Ok(()),
        Err(Error::Simulation { diagnostic }) => {
            error!("Simulation rejected the transaction");
            eprintln!("{}", diagnostic);
            Err(Error::simulation(diagnostic))
        }
        Err(e) => Err(e),
    }
}

/// Print basic program information
fn print_info() {
    println!("{} v{}", APP_NAME, APP_VERSION);
    println!("{}", APP_DESCRIPTION);
}

/// Print current configuration
fn print_configuration(config: &Config) -> Result<()> {
    let config_yaml = serde_yaml::to_string(config)?;
    println!("{}", config_yaml);
    Ok(())
}
