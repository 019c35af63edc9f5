//! Soroban RPC client for the FCM contract
//!
//! JSON-RPC 2.0 over HTTPS. Implements both ledger interfaces used by the
//! miner: contract storage reads for the chain state and the account lookup
//! and simulation needed to assemble a submission. Requests are never
//! retried here; the chain watcher's polling cadence does that.

use crate::address::Address;
use crate::chain::LedgerReader;
use crate::transaction::{AccountState, LedgerWriter, Simulation};
use crate::types::{Block, ChainState};
use crate::xdr::{decode_base64, ContractDataDurability, LedgerEntryData, LedgerKey, ReadXdr, ScVal, WriteXdr};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Public Soroban RPC endpoint
pub const DEFAULT_RPC_URL: &str = "https://soroban-rpc.creit.tech";

/// Deployed FCM contract
pub const DEFAULT_CONTRACT_ID: &str = "CC5TSJ3E26YUYGYQKOBNJQLPX4XMUHUY7Q26JX53CJ2YUIZB5HVXXRV6";

/// Storage key prefix of block records
const BLOCK_KEY: &str = "Block";

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct GetLedgerEntriesParams {
    keys: Vec<String>,
}

/// One entry of a `getLedgerEntries` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryResult {
    /// Base64 `LedgerKey`
    pub key: String,
    /// Base64 `LedgerEntryData`
    pub xdr: String,
    pub last_modified_ledger_seq: Option<u32>,
    pub live_until_ledger_seq: Option<u32>,
}

/// `getLedgerEntries` result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLedgerEntriesResponse {
    #[serde(default)]
    pub entries: Option<Vec<LedgerEntryResult>>,
    #[serde(default)]
    pub latest_ledger: u32,
}

#[derive(Debug, Serialize)]
struct SimulateTransactionParams<'a> {
    transaction: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulateTransactionResponse {
    error: Option<String>,
    transaction_data: Option<String>,
    min_resource_fee: Option<String>,
    #[serde(default)]
    results: Option<Vec<SimulateHostFunctionResult>>,
    #[serde(default)]
    latest_ledger: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct SimulateHostFunctionResult {
    #[serde(default)]
    auth: Vec<String>,
}

impl SimulateTransactionResponse {
    fn into_simulation(self) -> Result<Simulation> {
        if let Some(diagnostic) = self.error {
            return Err(Error::simulation(diagnostic));
        }

        let transaction_data = self
            .transaction_data
            .ok_or_else(|| Error::ledger_schema("Simulation returned no transaction data"))
            .and_then(|data| decode_base64(&data))?;

        let min_resource_fee = match self.min_resource_fee {
            Some(fee) => fee.parse::<u64>().map_err(|e| {
                Error::ledger_schema(format!("Invalid minResourceFee {:?}: {}", fee, e))
            })?,
            None => 0,
        };

        let auth = self
            .results
            .unwrap_or_default()
            .into_iter()
            .flat_map(|result| result.auth)
            .map(|entry| decode_base64(&entry))
            .collect::<Result<Vec<_>>>()?;

        Ok(Simulation {
            transaction_data,
            min_resource_fee,
            auth,
            latest_ledger: self.latest_ledger,
        })
    }
}

/// Soroban RPC client bound to one contract
pub struct SorobanClient {
    client: Client,
    rpc_url: Url,
    contract: Address,
    next_id: AtomicU64,
}

impl SorobanClient {
    /// Create a new client
    pub fn new(rpc_url: impl AsRef<str>, contract: Address, timeout: Duration) -> Result<Self> {
        let rpc_url = Url::parse(rpc_url.as_ref())
            .map_err(|e| Error::config(format!("Invalid RPC URL: {}", e)))?;

        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(Error::from)?;

        Ok(Self {
            client,
            rpc_url,
            contract,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    pub fn contract(&self) -> &Address {
        &self.contract
    }

    /// Issue one JSON-RPC call
    async fn call<P, T>(&self, method: &str, params: P) -> Result<T>
    where
        P: Serialize + Send,
        T: DeserializeOwned,
    {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        debug!(method, id = request.id, "Sending RPC request");

        let response = self
            .client
            .post(self.rpc_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(Error::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ledger_unavailable(format!(
                "{} failed: HTTP {}",
                method, status
            )));
        }

        let body = response.text().await.map_err(Error::from)?;
        let response: RpcResponse<T> = serde_json::from_str(&body)
            .map_err(|e| Error::ledger_schema(format!("Malformed {} response: {}", method, e)))?;

        match (response.result, response.error) {
            (_, Some(err)) => Err(Error::ledger_unavailable(format!(
                "{} failed: {} (code {})",
                method, err.message, err.code
            ))),
            (Some(result), None) => Ok(result),
            (None, None) => Err(Error::ledger_schema(format!(
                "{} returned neither result nor error",
                method
            ))),
        }
    }

    /// Fetch raw ledger entries
    #[instrument(skip(self, keys), fields(count = keys.len()))]
    pub async fn get_ledger_entries(&self, keys: &[LedgerKey]) -> Result<GetLedgerEntriesResponse> {
        let params = GetLedgerEntriesParams {
            keys: keys.iter().map(WriteXdr::to_xdr_base64).collect(),
        };
        self.call("getLedgerEntries", params).await
    }

    /// Fetch and decode a single ledger entry, `None` if it does not exist
    pub async fn get_ledger_entry(&self, key: LedgerKey) -> Result<Option<LedgerEntryData>> {
        let response = self.get_ledger_entries(std::slice::from_ref(&key)).await?;
        match response.entries.unwrap_or_default().first() {
            Some(entry) => Ok(Some(LedgerEntryData::from_xdr_base64(&entry.xdr)?)),
            None => Ok(None),
        }
    }

    /// Persistent contract storage value under `key`
    pub async fn get_contract_data(&self, key: ScVal) -> Result<ScVal> {
        let ledger_key = LedgerKey::ContractData {
            contract: self.contract,
            key,
            durability: ContractDataDurability::Persistent,
        };

        match self.get_ledger_entry(ledger_key).await? {
            Some(LedgerEntryData::ContractData { val, .. }) => Ok(val),
            Some(_) => Err(Error::ledger_schema("Expected a contract data entry")),
            None => Err(Error::ledger_schema(format!(
                "Contract data not found on {}",
                self.contract
            ))),
        }
    }
}

/// Storage key of the block record at `index`
pub fn block_key(index: u64) -> ScVal {
    ScVal::Vec(Some(vec![ScVal::symbol(BLOCK_KEY), ScVal::U64(index)]))
}

/// Chain state held in the first instance storage entry
pub fn state_from_instance(instance: &ScVal) -> Result<ChainState> {
    let storage = match instance {
        ScVal::ContractInstance(instance) => instance.storage.as_deref().unwrap_or_default(),
        other => {
            return Err(Error::ledger_schema(format!(
                "Expected contract instance, got {}",
                other.type_name()
            )))
        }
    };

    let (_, state) = storage
        .first()
        .ok_or_else(|| Error::ledger_schema("Contract instance storage is empty"))?;
    ChainState::from_sc_val(state)
}

#[async_trait]
impl LedgerReader for SorobanClient {
    #[instrument(skip(self))]
    async fn get_instance_state(&self) -> Result<ChainState> {
        let instance = self.get_contract_data(ScVal::LedgerKeyContractInstance).await?;
        state_from_instance(&instance)
    }

    #[instrument(skip(self))]
    async fn get_block(&self, index: u64) -> Result<Block> {
        let value = self.get_contract_data(block_key(index)).await?;
        Block::from_sc_val(&value)
    }
}

#[async_trait]
impl LedgerWriter for SorobanClient {
    #[instrument(skip(self), fields(account = %account))]
    async fn load_account(&self, account: &Address) -> Result<AccountState> {
        let account_id = account
            .account_id()
            .ok_or_else(|| Error::encoding(format!("{} is not an account address", account)))?;

        match self.get_ledger_entry(LedgerKey::Account(account_id)).await? {
            Some(LedgerEntryData::Account {
                account_id,
                seq_num,
                ..
            }) => Ok(AccountState {
                account_id,
                sequence: seq_num,
            }),
            Some(_) => Err(Error::ledger_schema("Expected an account entry")),
            None => Err(Error::simulation(format!("Account not found: {}", account))),
        }
    }

    #[instrument(skip_all)]
    async fn simulate(&self, envelope_xdr: &str) -> Result<Simulation> {
        let response: SimulateTransactionResponse = self
            .call(
                "simulateTransaction",
                SimulateTransactionParams {
                    transaction: envelope_xdr,
                },
            )
            .await?;
        response.into_simulation()
    }
}
