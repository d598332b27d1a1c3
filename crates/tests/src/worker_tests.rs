//! Broker to worker to upstream over real HTTP.

use relay_core::{
    broker::BrokerError,
    config::AppConfig,
    ledger::InMemoryLedger,
    runtime::RelayRuntime,
    types::{Peer, PeerId},
    worker::{ChannelForwarder, WorkerConfig},
};
use server::worker::create_worker_app;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, task::JoinHandle};

/// Serves a worker on a random local port.
async fn spawn_worker(worker: WorkerConfig) -> (SocketAddr, JoinHandle<()>) {
    let config = AppConfig { worker, ..Default::default() };
    let forwarder = Arc::new(ChannelForwarder::from_config(&config.worker).unwrap());
    let app = create_worker_app(forwarder, &config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

fn broker_runtime(self_uid: u16, peers: Vec<Peer>) -> RelayRuntime {
    let mut config = AppConfig::default();
    config.peers.self_uid = self_uid;
    config.peers.roster = peers;
    config.broker.peer_timeout_ms = 2_000;

    RelayRuntime::builder()
        .with_config(config)
        .with_ledger(Arc::new(InMemoryLedger::new(PeerId(self_uid))))
        .disable_committer()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_request_travels_through_worker_to_upstream() {
    let mut upstream = mockito::Server::new_async().await;
    let mock = upstream
        .mock("POST", "/")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({"method": "eth_chainId"})))
        .with_status(200)
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x2105"}"#)
        .create_async()
        .await;

    let mut worker = WorkerConfig::default();
    worker.routes.insert("base-mainnet".to_string(), upstream.url());
    let (addr, worker_handle) = spawn_worker(worker).await;

    let runtime = broker_runtime(0, vec![Peer::new(1, addr.to_string())]);
    let result = runtime
        .broker()
        .serve("base-mainnet", r#"{"jsonrpc":"2.0","id":1,"method":"eth_chainId","params":[]}"#)
        .await;

    assert_eq!(result, Ok(r#"{"jsonrpc":"2.0","id":1,"result":"0x2105"}"#.to_string()));
    mock.assert_async().await;

    let record = runtime.tracker().record(PeerId(1)).unwrap();
    assert_eq!((record.total_requests, record.total_responses), (1, 1));

    runtime.shutdown().await;
    worker_handle.abort();
}

#[tokio::test]
async fn test_upstream_status_comes_back_as_upstream_error() {
    let mut upstream = mockito::Server::new_async().await;
    let _mock = upstream.mock("POST", "/").with_status(500).create_async().await;

    let mut worker = WorkerConfig::default();
    worker.routes.insert("eth-sepolia".to_string(), upstream.url());
    let (addr, worker_handle) = spawn_worker(worker).await;

    let runtime = broker_runtime(0, vec![Peer::new(1, addr.to_string())]);
    let result = runtime.broker().serve("eth-sepolia", "{}").await;

    assert_eq!(
        result,
        Err(BrokerError::UpstreamError("upstream request failed with status 500".to_string()))
    );

    runtime.shutdown().await;
    worker_handle.abort();
}

#[tokio::test]
async fn test_unlisted_broker_gets_no_usable_response() {
    let worker = WorkerConfig { allowed_uids: Some(vec![42]), ..Default::default() };
    let (addr, worker_handle) = spawn_worker(worker).await;

    let runtime = broker_runtime(7, vec![Peer::new(1, addr.to_string())]);
    let result = runtime.broker().serve("eth-mainnet", "{}").await;

    assert_eq!(result, Err(BrokerError::NoUsableResponse));
    let record = runtime.tracker().record(PeerId(1)).unwrap();
    assert_eq!((record.total_requests, record.total_responses), (1, 0));

    runtime.shutdown().await;
    worker_handle.abort();
}

#[tokio::test]
async fn test_unreachable_worker_counts_as_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let runtime = broker_runtime(0, vec![Peer::new(1, addr.to_string())]);
    let result = runtime.broker().serve("eth-mainnet", "{}").await;

    assert_eq!(result, Err(BrokerError::NoUsableResponse));
    assert_eq!(runtime.tracker().record(PeerId(1)).unwrap().total_responses, 0);

    runtime.shutdown().await;
}
