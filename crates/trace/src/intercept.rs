//! The provider decorator a test-runner harness installs to capture
//! coverage transparently, by wrapping `eth_sendTransaction` and
//! `eth_call`. Wiring this into an actual harness is out of scope here —
//! this module only has to be usable by one.

use serde_json::Value;
use solcov_common::Result;

use crate::Trace;
use crate::provider::JsonRpcProvider;

/// A callback invoked with a freshly reconstructed [`Trace`] for a
/// transaction hash the interceptor observed.
pub trait TraceSink: Send + Sync {
    fn record(&self, tx_hash: &str, trace: Trace);
}

/// Wraps a [`JsonRpcProvider`], forwarding every call but additionally
/// reconstructing and recording a [`Trace`] for transactions it sees.
///
/// `eth_call` is read-only and produces no transaction hash to trace
/// directly, so it is replayed as a throwaway `eth_sendTransaction` inside
/// a snapshot/revert bracket purely to obtain a trace; the call's own
/// result is still the one returned to the caller.
///
/// The replay happens *after* the original call's result has already been
/// captured — if the node's state updates order differently between an
/// isolated `eth_call` and the replayed send, the recorded trace can
/// diverge from what the caller actually observed. This mirrors a known
/// quirk of the original instrumentation and is preserved rather than
/// silently changed.
pub struct CoverInterceptor<P, S> {
    inner: P,
    sink: S,
}

impl<P: JsonRpcProvider, S: TraceSink> CoverInterceptor<P, S> {
    pub fn new(inner: P, sink: S) -> Self {
        Self { inner, sink }
    }

    /// `eth_sendTransaction`: forward, then check the pending block. An
    /// empty pending block means an auto-mining node already mined the
    /// transaction, so it can be traced immediately. Tracing failures are
    /// logged and swallowed — a coverage-gathering side effect must never
    /// fail the caller's actual transaction.
    pub async fn intercept_send_transaction(&self, tx: Value) -> Result<String> {
        let hash = self.inner.send_transaction(tx).await?;
        let pending = self.inner.get_block_by_number_pending().await?;
        if pending.transactions.is_empty() {
            self.trace_and_report(&hash).await;
        }
        Ok(hash)
    }

    /// `eth_call`: forward and capture the result first, then snapshot,
    /// replay the same call as a real transaction to obtain a trace, and
    /// revert the snapshot so the replay leaves no lasting state change.
    pub async fn intercept_call(&self, tx: Value) -> Result<String> {
        let result = self.inner.call(tx.clone()).await?;
        let snapshot = self.inner.evm_snapshot().await?;
        let hash = self.inner.send_transaction(tx).await?;
        self.trace_and_report(&hash).await;
        self.inner.evm_revert(&snapshot).await?;
        Ok(result)
    }

    async fn trace_and_report(&self, tx_hash: &str) {
        match Trace::crawl(&self.inner, tx_hash).await {
            Ok(trace) => self.sink.record(tx_hash, trace),
            Err(error) => tracing::warn!(%tx_hash, %error, "failed to trace transaction, skipping"),
        }
    }
}
