//! End-to-end mining against an in-memory ledger

use assert_matches::assert_matches;
use async_trait::async_trait;
use fcm_miner::{
    chain::{ChainSnapshot, ChainStateReader, ChainWatcher, LedgerReader, PollSchedule},
    miner::{MinerConfig, MiningToggle, SearchOutcome, StalePolicy},
    transaction::{AccountState, LedgerWriter, Simulation, TransactionAssembler},
    xdr::decode_base64,
    Address, Block, BlockHash, ChainState, Error, Miner, MinerMessage, Nonce, Result,
};
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MINER: &str = "GAAACAQDAQCQMBYIBEFAWDANBYHRAEISCMKBKFQXDAMRUGY4DUPB7JZX";
const CONTRACT: &str = "CC5TSJ3E26YUYGYQKOBNJQLPX4XMUHUY7Q26JX53CJ2YUIZB5HVXXRV6";
const GOLDEN_HASH: &str = "0e58fccb41ffda64e15b5301ebb336da40061a3d1367686e02c8960891a14617";

/// Ledger holding one chain tip and answering simulations
struct MemoryLedger {
    state: Mutex<ChainState>,
    sequence: i64,
    rejection: Option<String>,
    simulated: Mutex<Vec<String>>,
}

impl MemoryLedger {
    fn new(current: u64, difficulty: u32) -> Self {
        let miner = miner();
        Self {
            state: Mutex::new(ChainState {
                fcm: contract(),
                current,
                difficulty,
                is_nuked: false,
                finder: miner,
            }),
            sequence: 41,
            rejection: None,
            simulated: Mutex::new(Vec::new()),
        }
    }

    fn rejecting(mut self, diagnostic: &str) -> Self {
        self.rejection = Some(diagnostic.to_string());
        self
    }

    fn advance(&self) {
        self.state.lock().current += 1;
    }
}

#[async_trait]
impl LedgerReader for MemoryLedger {
    async fn get_instance_state(&self) -> Result<ChainState> {
        Ok(self.state.lock().clone())
    }

    async fn get_block(&self, index: u64) -> Result<Block> {
        Ok(Block {
            index,
            message: "genesis".to_string(),
            prev_hash: vec![0; 32],
            nonce: 0,
            miner: miner(),
            hash: BlockHash::default(),
            timestamp: 1_700_000_000,
        })
    }
}

#[async_trait]
impl LedgerWriter for MemoryLedger {
    async fn load_account(&self, account: &Address) -> Result<AccountState> {
        let account_id = account
            .account_id()
            .ok_or_else(|| Error::encoding("not an account"))?;
        Ok(AccountState {
            account_id,
            sequence: self.sequence,
        })
    }

    async fn simulate(&self, envelope_xdr: &str) -> Result<Simulation> {
        self.simulated.lock().push(envelope_xdr.to_string());
        if let Some(diagnostic) = &self.rejection {
            return Err(Error::simulation(diagnostic.clone()));
        }
        Ok(Simulation {
            transaction_data: vec![0xAB; 8],
            min_resource_fee: 12_345,
            auth: Vec::new(),
            latest_ledger: 100,
        })
    }
}

fn miner() -> Address {
    Address::from_str(MINER).unwrap()
}

fn contract() -> Address {
    Address::from_str(CONTRACT).unwrap()
}

fn message() -> MinerMessage {
    MinerMessage::new("hello").unwrap()
}

fn fast_schedule() -> PollSchedule {
    PollSchedule {
        initial_delay: Duration::from_millis(1),
        interval: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn test_mine_and_assemble() {
    let ledger = Arc::new(MemoryLedger::new(4, 1));
    let reader = ChainStateReader::new(ledger.clone());
    let assembler = TransactionAssembler::new(ledger.clone(), contract(), 10_000_000);

    let snapshot = reader.fetch_latest().await.unwrap();
    let mut miner_core = Miner::new(MinerConfig::default());
    miner_core.arm(&snapshot, message(), miner()).unwrap();

    let outcome = miner_core
        .search(&CancellationToken::new(), None, None)
        .await
        .unwrap();
    let solution = assert_matches!(outcome, SearchOutcome::Found(solution) => solution);

    assert_eq!(solution.target_index, 5);
    assert_eq!(solution.nonce, Nonce::new(1));
    assert_eq!(solution.hash.to_hex(), GOLDEN_HASH);

    let latest = reader.fetch_latest().await.unwrap();
    tokio_test::assert_ok!(solution.ensure_current(&latest.state));

    let payload = assembler.assemble(&solution).await.unwrap();
    assert_eq!(payload.sequence, 42);
    assert_eq!(payload.fee, 10_012_345);

    let envelope = decode_base64(&payload.envelope_xdr).unwrap();
    let hash = solution.hash.as_bytes();
    assert!(envelope.windows(hash.len()).any(|window| window == hash));
    // soroban data followed by an empty signature list
    let mut tail = vec![0xAB; 8];
    tail.extend_from_slice(&[0, 0, 0, 0]);
    assert!(envelope.ends_with(&tail));

    // the unpriced call went through simulation exactly once
    assert_eq!(ledger.simulated.lock().len(), 1);
    assert_ne!(ledger.simulated.lock()[0], payload.envelope_xdr);
    assert_eq!(miner_core.stats().solutions_found, 1);
}

#[tokio::test]
async fn test_solution_is_discarded_after_tip_moves() {
    let ledger = Arc::new(MemoryLedger::new(4, 1));
    let reader = ChainStateReader::new(ledger.clone());

    let snapshot = reader.fetch_latest().await.unwrap();
    let mut miner_core = Miner::new(MinerConfig::default());
    miner_core.arm(&snapshot, message(), miner()).unwrap();
    let outcome = miner_core
        .search(&CancellationToken::new(), None, None)
        .await
        .unwrap();
    let solution = assert_matches!(outcome, SearchOutcome::Found(solution) => solution);

    ledger.advance();
    let latest = reader.fetch_latest().await.unwrap();
    assert_matches!(
        solution.ensure_current(&latest.state),
        Err(Error::StaleAttempt {
            target_index: 5,
            observed_current: 5
        })
    );
}

#[tokio::test]
async fn test_watcher_tip_change_aborts_search() {
    let ledger = Arc::new(MemoryLedger::new(4, 64));
    let shutdown = CancellationToken::new();
    let (mut tip, watcher) = ChainWatcher::spawn(
        ChainStateReader::new(ledger.clone()),
        fast_schedule(),
        shutdown.clone(),
    );

    let snapshot: ChainSnapshot = tip
        .wait_for(Option::is_some)
        .await
        .unwrap()
        .clone()
        .unwrap();
    assert_eq!(snapshot.current(), 4);

    let mut miner_core = Miner::new(MinerConfig::default());
    miner_core.arm(&snapshot, message(), miner()).unwrap();

    let cancel = CancellationToken::new();
    let advance = async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        ledger.advance();
    };
    let (outcome, ()) = tokio::join!(miner_core.search(&cancel, Some(&tip), None), advance);

    assert_matches!(
        outcome,
        Ok(SearchOutcome::Stale {
            target_index: 5,
            observed_current: 5
        })
    );
    assert_eq!(miner_core.stats().stale_attempts, 1);

    shutdown.cancel();
    watcher.await.unwrap();
}

#[tokio::test]
async fn test_ignore_policy_runs_until_stopped() {
    let ledger = Arc::new(MemoryLedger::new(4, 64));
    let shutdown = CancellationToken::new();
    let (mut tip, watcher) = ChainWatcher::spawn(
        ChainStateReader::new(ledger.clone()),
        fast_schedule(),
        shutdown.clone(),
    );
    let snapshot = tip
        .wait_for(Option::is_some)
        .await
        .unwrap()
        .clone()
        .unwrap();

    let mut miner_core = Miner::new(MinerConfig {
        yield_every: 1,
        stale_policy: StalePolicy::Ignore,
    });
    miner_core.arm(&snapshot, message(), miner()).unwrap();

    let toggle = MiningToggle::new();
    let cancel = toggle.arm();
    let operator = async {
        ledger.advance();
        tokio::time::sleep(Duration::from_millis(50)).await;
        toggle.stop();
    };
    let (outcome, ()) = tokio::join!(miner_core.search(&cancel, Some(&tip), None), operator);

    assert_matches!(outcome, Ok(SearchOutcome::Cancelled { .. }));
    assert!(toggle.is_stopped());

    shutdown.cancel();
    watcher.await.unwrap();
}

#[tokio::test]
async fn test_simulation_rejection_is_reported_verbatim() {
    let diagnostic = "HostError: Error(Contract, #3)";
    let ledger = Arc::new(MemoryLedger::new(4, 1).rejecting(diagnostic));
    let assembler = TransactionAssembler::new(ledger.clone(), contract(), 10_000_000);

    let hash = BlockHash::from_str(GOLDEN_HASH).unwrap();
    let err = assembler
        .assemble_parts(&miner(), &hash, &message(), Nonce::new(1))
        .await
        .unwrap_err();

    assert_matches!(&err, Error::Simulation { diagnostic: d } if d == diagnostic);
    assert!(!err.is_retryable());
}
