//! The JSON-RPC surface `solcov-trace` needs, and two implementations:
//! [`HttpProvider`] for a real Ethereum-compatible node, and
//! [`RecordedProvider`] for tests.
//!
//! We speak raw JSON-RPC over `reqwest` rather than pulling in a full
//! provider stack: every method here is non-standard or debug-only
//! (`debug_traceTransaction`, `evm_snapshot`/`evm_revert`), so there is
//! little a higher-level client would save us.

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use solcov_common::Error;

/// The subset of `eth_getTransactionByHash` fields the tracer needs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    pub to: Option<Address>,
    #[serde(default)]
    pub input: String,
}

/// One entry of `debug_traceTransaction`'s `structLogs`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StructLog {
    pub depth: u64,
    pub op: String,
    pub pc: usize,
    #[serde(default)]
    pub stack: Vec<String>,
    #[serde(default)]
    pub memory: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceResult {
    #[serde(rename = "structLogs")]
    pub struct_logs: Vec<StructLog>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PendingBlock {
    #[serde(default)]
    pub transactions: Vec<String>,
}

/// An EIP-1193-ish JSON-RPC endpoint, async so a real HTTP provider and an
/// in-memory fixture can share one trait object.
#[async_trait]
pub trait JsonRpcProvider: Send + Sync {
    async fn get_transaction_by_hash(&self, hash: &str) -> solcov_common::Result<TransactionInfo>;
    async fn debug_trace_transaction(&self, hash: &str) -> solcov_common::Result<TraceResult>;
    async fn get_code(&self, address: Address) -> solcov_common::Result<String>;
    async fn call(&self, tx: Value) -> solcov_common::Result<String>;
    async fn send_transaction(&self, tx: Value) -> solcov_common::Result<String>;
    async fn get_block_by_number_pending(&self) -> solcov_common::Result<PendingBlock>;
    async fn evm_snapshot(&self) -> solcov_common::Result<String>;
    async fn evm_revert(&self, snapshot_id: &str) -> solcov_common::Result<bool>;
}

/// A provider backed by a real node over HTTP JSON-RPC.
pub struct HttpProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), url: url.into() }
    }

    async fn request(&self, method: &'static str, params: Value) -> solcov_common::Result<Value> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let resp: Value = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Rpc { method, source: e.into() })?
            .json()
            .await
            .map_err(|e| Error::Rpc { method, source: e.into() })?;
        if let Some(err) = resp.get("error") {
            return Err(Error::Rpc { method, source: eyre::eyre!("{err}") });
        }
        Ok(resp.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl JsonRpcProvider for HttpProvider {
    async fn get_transaction_by_hash(&self, hash: &str) -> solcov_common::Result<TransactionInfo> {
        let result = self.request("eth_getTransactionByHash", json!([hash])).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn debug_trace_transaction(&self, hash: &str) -> solcov_common::Result<TraceResult> {
        let result = self.request("debug_traceTransaction", json!([hash, {}])).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn get_code(&self, address: Address) -> solcov_common::Result<String> {
        let result = self.request("eth_getCode", json!([address, "latest"])).await?;
        Ok(result.as_str().unwrap_or("0x").to_string())
    }

    async fn call(&self, tx: Value) -> solcov_common::Result<String> {
        let result = self.request("eth_call", json!([tx, "latest"])).await?;
        Ok(result.as_str().unwrap_or("0x").to_string())
    }

    async fn send_transaction(&self, tx: Value) -> solcov_common::Result<String> {
        let result = self.request("eth_sendTransaction", json!([tx])).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    async fn get_block_by_number_pending(&self) -> solcov_common::Result<PendingBlock> {
        let result = self.request("eth_getBlockByNumber", json!(["pending", false])).await?;
        Ok(serde_json::from_value(result).unwrap_or_default())
    }

    async fn evm_snapshot(&self) -> solcov_common::Result<String> {
        let result = self.request("evm_snapshot", json!([])).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    async fn evm_revert(&self, snapshot_id: &str) -> solcov_common::Result<bool> {
        let result = self.request("evm_revert", json!([snapshot_id])).await?;
        Ok(result.as_bool().unwrap_or(false))
    }
}

/// A fixture-backed provider for tests, keyed by transaction hash.
#[derive(Debug, Clone, Default)]
pub struct RecordedProvider {
    pub transactions: rustc_hash::FxHashMap<String, TransactionInfo>,
    pub traces: rustc_hash::FxHashMap<String, TraceResult>,
    pub code: rustc_hash::FxHashMap<Address, String>,
}

impl RecordedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transaction(mut self, hash: &str, to: Option<Address>, input: &str) -> Self {
        self.transactions.insert(hash.to_string(), TransactionInfo { to, input: input.to_string() });
        self
    }

    pub fn with_trace(mut self, hash: &str, struct_logs: Vec<StructLog>) -> Self {
        self.traces.insert(hash.to_string(), TraceResult { struct_logs });
        self
    }

    pub fn with_code(mut self, address: Address, bytecode: &str) -> Self {
        self.code.insert(address, bytecode.to_string());
        self
    }
}

#[async_trait]
impl JsonRpcProvider for RecordedProvider {
    async fn get_transaction_by_hash(&self, hash: &str) -> solcov_common::Result<TransactionInfo> {
        Ok(self.transactions.get(hash).cloned().unwrap_or_default())
    }

    async fn debug_trace_transaction(&self, hash: &str) -> solcov_common::Result<TraceResult> {
        Ok(self.traces.get(hash).cloned().unwrap_or(TraceResult { struct_logs: vec![] }))
    }

    async fn get_code(&self, address: Address) -> solcov_common::Result<String> {
        Ok(self.code.get(&address).cloned().unwrap_or_else(|| "0x".to_string()))
    }

    async fn call(&self, _tx: Value) -> solcov_common::Result<String> {
        Ok("0x".to_string())
    }

    async fn send_transaction(&self, _tx: Value) -> solcov_common::Result<String> {
        Ok(String::new())
    }

    async fn get_block_by_number_pending(&self) -> solcov_common::Result<PendingBlock> {
        Ok(PendingBlock::default())
    }

    async fn evm_snapshot(&self) -> solcov_common::Result<String> {
        Ok("0x0".to_string())
    }

    async fn evm_revert(&self, _snapshot_id: &str) -> solcov_common::Result<bool> {
        Ok(true)
    }
}
