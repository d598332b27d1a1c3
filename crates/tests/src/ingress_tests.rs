//! The broker's persistent stream ingress against a mock entrypoint.

use crate::mock_infrastructure::{roster, MockEntrypoint, PeerScript, ScriptedTransport};
use relay_core::{config::AppConfig, ledger::InMemoryLedger, runtime::RelayRuntime, types::PeerId};
use std::{sync::Arc, time::Duration};

const WAIT: Duration = Duration::from_secs(3);

fn stream_config(url: String) -> AppConfig {
    let mut config = AppConfig::default();
    config.peers.roster = roster(&[1, 2]);
    config.broker.sample_size = 2;
    config.broker.peer_timeout_ms = 200;
    config.ingress.stream_url = Some(url);
    config.ingress.reconnect_delay_seconds = 1;
    config
}

fn start_runtime(config: AppConfig, transport: ScriptedTransport) -> RelayRuntime {
    RelayRuntime::builder()
        .with_config(config)
        .with_transport(Arc::new(transport))
        .with_ledger(Arc::new(InMemoryLedger::new(PeerId(0))))
        .disable_committer()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_stream_request_gets_raw_response_text() {
    let entrypoint = MockEntrypoint::new().await.unwrap();
    let transport = ScriptedTransport::new()
        .with(1, PeerScript::respond(r#"{"jsonrpc":"2.0","id":7,"result":"0xabc"}"#))
        .with(2, PeerScript::respond(r#"{"jsonrpc":"2.0","id":7,"result":"0xabc"}"#));
    let runtime = start_runtime(stream_config(entrypoint.url()), transport);

    assert!(entrypoint.wait_for_connections(1, WAIT).await);
    entrypoint.push(r#"{"channel_id":"eth-mainnet","payload":"{\"id\":7}"}"#);

    let reply = entrypoint.next_reply(WAIT).await.unwrap();
    assert_eq!(reply, r#"{"jsonrpc":"2.0","id":7,"result":"0xabc"}"#);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_stream_errors_are_wrapped() {
    let entrypoint = MockEntrypoint::new().await.unwrap();
    let transport = ScriptedTransport::new()
        .with(1, PeerScript::error("upstream request failed with status 429"))
        .with(2, PeerScript::error("upstream request failed with status 429"));
    let runtime = start_runtime(stream_config(entrypoint.url()), transport);
    assert!(entrypoint.wait_for_connections(1, WAIT).await);

    entrypoint.push(r#"{"channel_id":"eth-mainnet","payload":"{}"}"#);
    let reply: serde_json::Value =
        serde_json::from_str(&entrypoint.next_reply(WAIT).await.unwrap()).unwrap();
    assert_eq!(reply, serde_json::json!({"error": "upstream request failed with status 429"}));

    entrypoint.push(r#"{"channel_id":"dogecoin-mainnet","payload":"{}"}"#);
    let reply: serde_json::Value =
        serde_json::from_str(&entrypoint.next_reply(WAIT).await.unwrap()).unwrap();
    assert_eq!(reply, serde_json::json!({"error": "Unsupported channel: dogecoin-mainnet"}));

    entrypoint.push("not json");
    let reply: serde_json::Value =
        serde_json::from_str(&entrypoint.next_reply(WAIT).await.unwrap()).unwrap();
    assert!(reply["error"].as_str().unwrap().starts_with("Invalid request"));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_no_usable_response_is_internal_error() {
    let entrypoint = MockEntrypoint::new().await.unwrap();
    let transport = ScriptedTransport::new().with(1, PeerScript::Hang).with(2, PeerScript::Empty);
    let runtime = start_runtime(stream_config(entrypoint.url()), transport);
    assert!(entrypoint.wait_for_connections(1, WAIT).await);

    entrypoint.push(r#"{"channel_id":"arbitrum-mainnet","payload":"{}"}"#);
    let reply = entrypoint.next_reply(WAIT).await.unwrap();
    assert_eq!(reply, r#"{"error":"Internal error"}"#);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_stream_reconnects_after_close() {
    let entrypoint = MockEntrypoint::new().await.unwrap();
    let transport = ScriptedTransport::new()
        .with(1, PeerScript::respond("0x1"))
        .with(2, PeerScript::respond("0x1"));
    let runtime = start_runtime(stream_config(entrypoint.url()), transport);
    assert!(entrypoint.wait_for_connections(1, WAIT).await);

    entrypoint.disconnect_all();
    assert!(entrypoint.wait_for_connections(2, WAIT).await);

    entrypoint.push(r#"{"channel_id":"eth-mainnet","payload":"{}"}"#);
    assert_eq!(entrypoint.next_reply(WAIT).await.as_deref(), Some("0x1"));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_reading_frames() {
    let entrypoint = MockEntrypoint::new().await.unwrap();
    let transport = ScriptedTransport::new()
        .with(1, PeerScript::respond("0x1"))
        .with(2, PeerScript::respond("0x1"));
    let runtime = start_runtime(stream_config(entrypoint.url()), transport);
    assert!(entrypoint.wait_for_connections(1, WAIT).await);

    tokio::time::timeout(WAIT, runtime.shutdown()).await.unwrap();

    entrypoint.push(r#"{"channel_id":"eth-mainnet","payload":"{}"}"#);
    assert!(entrypoint.next_reply(Duration::from_millis(300)).await.is_none());
    assert_eq!(entrypoint.connection_count(), 1);
}
