use arc_swap::ArcSwap;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, info};

use super::{LedgerClient, LedgerConfig, LedgerError};
use crate::types::PeerId;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Ledger client speaking JSON-RPC 2.0 over HTTP.
///
/// | Operation | Method | Params |
/// |-----------|--------|--------|
/// | height | `chain_getHeight` | `[]` |
/// | tempo | `subnet_getTempo` | `[netuid]` |
/// | last update | `subnet_getLastUpdate` | `[netuid]`, result indexed by uid |
/// | submit | `subnet_setWeights` | `[netuid, uids, weights, wait_for_inclusion]` |
pub struct JsonRpcLedgerClient {
    endpoint: String,
    netuid: u16,
    timeout: Duration,
    client: ArcSwap<Client>,
    next_id: AtomicU64,
}

impl JsonRpcLedgerClient {
    /// # Errors
    ///
    /// Returns [`LedgerError::Connection`] if no endpoint is configured or the HTTP client
    /// fails to build.
    pub fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| LedgerError::Connection("no ledger endpoint configured".to_string()))?;
        Self::new(endpoint, config.netuid, config.request_timeout())
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::Connection`] if the HTTP client fails to build.
    pub fn new(
        endpoint: impl Into<String>,
        netuid: u16,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let client = Self::build_client(timeout)?;
        Ok(Self {
            endpoint: endpoint.into(),
            netuid,
            timeout,
            client: ArcSwap::from_pointee(client),
            next_id: AtomicU64::new(1),
        })
    }

    fn build_client(timeout: Duration) -> Result<Client, LedgerError> {
        ClientBuilder::new()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| LedgerError::Connection(format!("HTTP client build failed: {e}")))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let client = self.client.load_full();

        let response = client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Connection(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Connection(format!("{method}: HTTP {}", status.as_u16())));
        }

        let decoded: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("{method}: {e}")))?;

        if let Some(error) = decoded.error {
            debug!(method = method, code = error.code, "ledger returned rpc error");
            return Err(LedgerError::InvalidResponse(format!(
                "{method}: rpc error {}: {}",
                error.code, error.message
            )));
        }
        Ok(decoded.result)
    }

    async fn read<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, LedgerError> {
        self.call(method, params)
            .await
            .map_err(|e| LedgerError::ReadFailure(e.to_string()))?
            .ok_or_else(|| LedgerError::ReadFailure(format!("{method}: missing result")))
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    async fn read_height(&self) -> Result<u64, LedgerError> {
        self.read("chain_getHeight", json!([])).await
    }

    async fn read_tempo(&self) -> Result<u64, LedgerError> {
        self.read("subnet_getTempo", json!([self.netuid])).await
    }

    async fn read_last_update(&self, peer: PeerId) -> Result<Option<u64>, LedgerError> {
        let by_uid: Vec<Option<u64>> =
            self.read("subnet_getLastUpdate", json!([self.netuid])).await?;
        Ok(by_uid.get(usize::from(peer.uid())).copied().flatten())
    }

    async fn submit_weights(
        &self,
        uids: &[PeerId],
        weights: &[f64],
        wait_for_inclusion: bool,
    ) -> Result<(), LedgerError> {
        let uids: Vec<u16> = uids.iter().map(|uid| uid.uid()).collect();
        let accepted: Option<bool> = self
            .call(
                "subnet_setWeights",
                json!([self.netuid, uids, weights, wait_for_inclusion]),
            )
            .await
            .map_err(|e| LedgerError::SubmitFailure(e.to_string()))?;

        match accepted {
            Some(false) => {
                Err(LedgerError::SubmitFailure("subnet_setWeights: not included".to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn reconnect(&self) -> Result<(), LedgerError> {
        let client = Self::build_client(self.timeout)?;
        self.client.store(Arc::new(client));
        info!(endpoint = %self.endpoint, "ledger client reconnected");
        Ok(())
    }
}
