//! Epoch gating, weight submission and roster refresh against the in-memory ledger.

use crate::mock_infrastructure::{
    roster, FixtureBuilder, PeerScript, ScriptedTransport, SELF_UID,
};
use relay_core::{
    committer::{CycleOutcome, SkipReason},
    ledger::LedgerError,
    types::PeerId,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;

const PAYLOAD: &str = r#"{"method":"eth_chainId"}"#;

#[tokio::test]
async fn test_commit_once_per_epoch_crossing() {
    let fixture = FixtureBuilder::new(roster(&[1, 2, 3]), Arc::new(ScriptedTransport::new())).build();
    fixture.ledger.set_tempo(10);
    fixture.ledger.set_height(100);
    fixture.ledger.set_last_update(PeerId(SELF_UID), 88);

    assert_eq!(fixture.committer.run_cycle().await, CycleOutcome::Committed { distance: 12, peers: 3 });
    assert_eq!(fixture.committer.run_cycle().await, CycleOutcome::NotDue { distance: 0, tempo: 10 });

    // distance == tempo + 1 is still not due.
    fixture.ledger.advance(11);
    assert_eq!(fixture.committer.run_cycle().await, CycleOutcome::NotDue { distance: 11, tempo: 10 });

    fixture.ledger.advance(1);
    assert_eq!(fixture.committer.run_cycle().await, CycleOutcome::Committed { distance: 12, peers: 3 });
    assert_eq!(fixture.ledger.submissions().len(), 2);
}

#[tokio::test]
async fn test_committed_weights_follow_reputation() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with(1, PeerScript::respond("0x1"))
            .with(2, PeerScript::Refuse),
    );
    let fixture = FixtureBuilder::new(roster(&[1, 2]), transport).sample_size(2).build();
    for _ in 0..5 {
        assert!(fixture.broker.serve("eth-mainnet", PAYLOAD).await.is_ok());
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    fixture.ledger.set_tempo(10);
    fixture.ledger.set_height(500);
    assert!(matches!(fixture.committer.run_cycle().await, CycleOutcome::Committed { .. }));

    let submission = fixture.ledger.submissions().pop().unwrap();
    assert_eq!(submission.uids, vec![PeerId(1), PeerId(2)]);
    assert!(submission.wait_for_inclusion);
    assert!((submission.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    assert!(submission.weights[0] > submission.weights[1]);

    // One EMA step from 1.0: the responsive peer keeps 1.0, the silent one drops to 0.9.
    assert!((fixture.tracker.score(PeerId(1)).unwrap() - 1.0).abs() < 1e-12);
    assert!((fixture.tracker.score(PeerId(2)).unwrap() - 0.9).abs() < 1e-12);
}

#[tokio::test]
async fn test_bootstrap_fallback_and_roster_growth_mid_epoch() {
    let fixture = FixtureBuilder::new(roster(&[1, 2, 3]), Arc::new(ScriptedTransport::new())).build();
    fixture.ledger.set_tempo(20);
    fixture.ledger.set_height(5);

    // Never submitted: distance falls back to tempo + 2, which is due.
    fixture.directory.replace_roster(roster(&[1, 2, 3, 4]));
    assert_eq!(fixture.committer.run_cycle().await, CycleOutcome::Committed { distance: 22, peers: 3 });

    // The refresh after the commit picked up peer 4 at the initial score.
    assert_eq!(fixture.tracker.roster(), vec![PeerId(1), PeerId(2), PeerId(3), PeerId(4)]);
    assert_eq!(fixture.tracker.score(PeerId(4)), Some(1.0));

    fixture.ledger.advance(21);
    assert_eq!(fixture.committer.run_cycle().await, CycleOutcome::NotDue { distance: 21, tempo: 20 });

    fixture.ledger.advance(1);
    assert_eq!(fixture.committer.run_cycle().await, CycleOutcome::Committed { distance: 22, peers: 4 });

    let submissions = fixture.ledger.submissions();
    assert_eq!(submissions[0].uids.len(), 3);
    assert_eq!(submissions[1].uids, vec![PeerId(1), PeerId(2), PeerId(3), PeerId(4)]);
    assert_eq!(submissions[1].height, 27);
}

#[tokio::test]
async fn test_single_read_failure_is_absorbed_by_reconnect() {
    let fixture = FixtureBuilder::new(roster(&[1]), Arc::new(ScriptedTransport::new())).build();
    fixture.ledger.set_tempo(10);
    fixture.ledger.set_height(50);
    fixture.ledger.fail_next_reads(1);

    assert!(matches!(fixture.committer.run_cycle().await, CycleOutcome::Committed { .. }));
    assert_eq!(fixture.ledger.reconnect_count(), 1);
}

#[tokio::test]
async fn test_read_failing_after_reconnect_skips_cycle() {
    let fixture = FixtureBuilder::new(roster(&[1]), Arc::new(ScriptedTransport::new())).build();
    fixture.ledger.set_tempo(10);
    fixture.ledger.set_height(50);
    fixture.ledger.fail_next_reads(2);

    let outcome = fixture.committer.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::Skipped(SkipReason::LedgerRead(LedgerError::ReadFailure(_)))));
    assert!(fixture.ledger.submissions().is_empty());

    // Nothing sticky: the next cycle goes through.
    assert!(matches!(fixture.committer.run_cycle().await, CycleOutcome::Committed { .. }));
}

#[tokio::test]
async fn test_failed_submit_is_retried_by_next_cycle() {
    let fixture = FixtureBuilder::new(roster(&[1, 2]), Arc::new(ScriptedTransport::new())).build();
    fixture.ledger.set_tempo(10);
    fixture.ledger.set_height(50);
    fixture.ledger.fail_next_submits(1);

    assert!(matches!(
        fixture.committer.run_cycle().await,
        CycleOutcome::Skipped(SkipReason::Submit(_))
    ));
    assert!(matches!(fixture.committer.run_cycle().await, CycleOutcome::Committed { .. }));
    assert_eq!(fixture.ledger.submissions().len(), 1);
}

#[tokio::test]
async fn test_empty_roster_skips_cycle() {
    let fixture = FixtureBuilder::new(Vec::new(), Arc::new(ScriptedTransport::new())).build();
    fixture.ledger.set_tempo(10);
    fixture.ledger.set_height(50);

    assert_eq!(fixture.committer.run_cycle().await, CycleOutcome::Skipped(SkipReason::EmptyRoster));
    assert!(fixture.ledger.submissions().is_empty());
}

#[tokio::test]
async fn test_scheduled_loop_stops_on_shutdown() {
    let fixture = FixtureBuilder::new(roster(&[1, 2]), Arc::new(ScriptedTransport::new())).build();
    fixture.ledger.set_tempo(1000);
    fixture.ledger.set_height(10);

    let (shutdown_tx, _) = broadcast::channel(1);
    let handle = fixture.committer.start_with_shutdown(shutdown_tx.subscribe());

    // The first tick fires immediately and commits through the bootstrap fallback.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fixture.ledger.submissions().len(), 1);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();

    // Due again, but no cycle may start after shutdown.
    fixture.ledger.advance(5000);
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(fixture.ledger.submissions().len(), 1);
}
