//! Transaction assembly for winning nonces
//!
//! Builds the unsigned `mine` invocation, prices it through a ledger
//! simulation and returns the assembled envelope for manual signing and
//! broadcast.

use crate::address::Address;
use crate::miner::Solution;
use crate::types::{BlockHash, MinerMessage, Nonce};
use crate::xdr::{ScVal, WriteXdr, XdrWriter};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Contract entry point for submitting a block
pub const MINE_FUNCTION: &str = "mine";

/// Default inclusion fee in stroops
pub const DEFAULT_BASE_FEE: u32 = 10_000_000;

const ENVELOPE_TYPE_TX: i32 = 2;
const KEY_TYPE_ED25519: i32 = 0;
const PRECOND_TIME: i32 = 1;
const MEMO_NONE: i32 = 0;
const OPERATION_INVOKE_HOST_FUNCTION: i32 = 24;
const HOST_FUNCTION_INVOKE_CONTRACT: i32 = 0;

/// Ledger account of the miner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    pub account_id: [u8; 32],
    /// Sequence number of the last transaction sent from the account
    pub sequence: i64,
}

/// Resource parameters returned by a successful simulation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Simulation {
    /// `SorobanTransactionData` XDR
    pub transaction_data: Vec<u8>,
    /// Resource fee in stroops
    pub min_resource_fee: u64,
    /// `SorobanAuthorizationEntry` XDR, one per entry
    pub auth: Vec<Vec<u8>>,
    pub latest_ledger: u32,
}

/// Write access to the ledger needed to prepare a submission
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    /// Current account state of `account`
    async fn load_account(&self, account: &Address) -> Result<AccountState>;

    /// Dry-run a base64 transaction envelope.
    ///
    /// A rejected call fails with [`Error::Simulation`] carrying the
    /// ledger's diagnostic.
    async fn simulate(&self, envelope_xdr: &str) -> Result<Simulation>;
}

/// Arguments of the `mine` entry point, in call order
pub fn mine_call_args(
    hash: &BlockHash,
    message: &MinerMessage,
    nonce: Nonce,
    miner: &Address,
) -> Vec<ScVal> {
    vec![
        ScVal::Bytes(hash.as_bytes().to_vec()),
        ScVal::String(message.as_str().to_owned()),
        ScVal::U64(nonce.value()),
        ScVal::Address(*miner),
    ]
}

/// Unsigned transaction with a single contract invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeTransaction {
    source: [u8; 32],
    fee: u32,
    sequence: i64,
    contract: Address,
    function: String,
    args: Vec<ScVal>,
    auth: Vec<Vec<u8>>,
    soroban_data: Option<Vec<u8>>,
}

impl InvokeTransaction {
    /// Create an unpriced invocation
    pub fn new(
        source: [u8; 32],
        sequence: i64,
        fee: u32,
        contract: Address,
        function: impl Into<String>,
        args: Vec<ScVal>,
    ) -> Self {
        Self {
            source,
            fee,
            sequence,
            contract,
            function: function.into(),
            args,
            auth: Vec::new(),
            soroban_data: None,
        }
    }

    pub fn fee(&self) -> u32 {
        self.fee
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    pub fn args(&self) -> &[ScVal] {
        &self.args
    }

    /// Whether resource data from a simulation has been attached
    pub fn is_priced(&self) -> bool {
        self.soroban_data.is_some()
    }

    /// Attach simulation results: resource fee, auth entries and resource
    /// footprint
    pub fn apply_simulation(&mut self, simulation: &Simulation) -> Result<()> {
        let fee = u32::try_from(simulation.min_resource_fee)
            .ok()
            .and_then(|resource_fee| self.fee.checked_add(resource_fee))
            .ok_or_else(|| {
                Error::simulation(format!(
                    "Resource fee {} does not fit the transaction fee",
                    simulation.min_resource_fee
                ))
            })?;

        self.fee = fee;
        if self.auth.is_empty() {
            self.auth = simulation.auth.clone();
        }
        self.soroban_data = Some(simulation.transaction_data.clone());
        Ok(())
    }
}

impl WriteXdr for InvokeTransaction {
    fn write_xdr(&self, w: &mut XdrWriter) {
        w.write_i32(ENVELOPE_TYPE_TX);

        // source account (muxed, plain ed25519)
        w.write_i32(KEY_TYPE_ED25519);
        w.write_fixed(&self.source);
        w.write_u32(self.fee);
        w.write_i64(self.sequence);

        // unbounded time bounds
        w.write_i32(PRECOND_TIME);
        w.write_u64(0);
        w.write_u64(0);

        w.write_i32(MEMO_NONE);

        // one operation, no operation source
        w.write_u32(1);
        w.write_bool(false);
        w.write_i32(OPERATION_INVOKE_HOST_FUNCTION);
        w.write_i32(HOST_FUNCTION_INVOKE_CONTRACT);
        self.contract.write_xdr(w);
        w.write_var_opaque(self.function.as_bytes());
        w.write_u32(self.args.len() as u32);
        for arg in &self.args {
            arg.write_xdr(w);
        }
        w.write_u32(self.auth.len() as u32);
        for entry in &self.auth {
            w.write_raw(entry);
        }

        match &self.soroban_data {
            Some(data) => {
                w.write_i32(1);
                w.write_raw(data);
            }
            None => w.write_i32(0),
        }

        // no signatures
        w.write_u32(0);
    }
}

/// Assembled, unsigned transaction ready for manual broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittablePayload {
    /// Base64 `TransactionEnvelope` XDR
    pub envelope_xdr: String,
    pub fee: u32,
    pub sequence: i64,
}

impl fmt::Display for SubmittablePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.envelope_xdr)
    }
}

/// Turns winning nonces into submittable transactions
pub struct TransactionAssembler {
    ledger: Arc<dyn LedgerWriter>,
    contract: Address,
    base_fee: u32,
}

impl TransactionAssembler {
    pub fn new(ledger: Arc<dyn LedgerWriter>, contract: Address, base_fee: u32) -> Self {
        Self {
            ledger,
            contract,
            base_fee,
        }
    }

    /// Assemble the `mine` call for a solution
    pub async fn assemble(&self, solution: &Solution) -> Result<SubmittablePayload> {
        self.assemble_parts(
            &solution.miner,
            &solution.hash,
            &solution.message,
            solution.nonce,
        )
        .await
    }

    /// Look up the miner's account, simulate the call and attach the
    /// simulation results
    #[instrument(skip_all, fields(miner = %miner, nonce = nonce.value()))]
    pub async fn assemble_parts(
        &self,
        miner: &Address,
        hash: &BlockHash,
        message: &MinerMessage,
        nonce: Nonce,
    ) -> Result<SubmittablePayload> {
        let source = miner
            .account_id()
            .ok_or_else(|| Error::encoding("Miner identity must be an account address"))?;

        let account = self.ledger.load_account(miner).await?;
        let sequence = account
            .sequence
            .checked_add(1)
            .ok_or_else(|| Error::ledger_schema("Account sequence number overflow"))?;

        let mut tx = InvokeTransaction::new(
            source,
            sequence,
            self.base_fee,
            self.contract,
            MINE_FUNCTION,
            mine_call_args(hash, message, nonce, miner),
        );

        debug!(sequence, "Simulating mine call");
        let simulation = self.ledger.simulate(&tx.to_xdr_base64()).await?;
        tx.apply_simulation(&simulation)?;

        info!(
            fee = tx.fee(),
            resource_fee = simulation.min_resource_fee,
            sequence,
            "Transaction assembled"
        );

        Ok(SubmittablePayload {
            envelope_xdr: tx.to_xdr_base64(),
            fee: tx.fee(),
            sequence,
        })
    }
}
