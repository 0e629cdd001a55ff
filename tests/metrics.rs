#![cfg(feature = "metrics")]
//! Tests for `wiresession` metrics.
//!
//! Counters and gauges are observed with
//! `metrics_util::debugging::DebuggingRecorder` installed as a thread-local
//! recorder.

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use serial_test::serial;
use tokio::io::AsyncWriteExt;
use wiresession::{
    Direction,
    FixedLengthProtocol,
    LengthPrefixedProtocol,
    MetricsMonitor,
    SessionConfig,
    active_session_count,
    metrics as session_metrics,
};

mod common;
use common::{Harness, TestResult, TestStream, join, spawn, wait_for};

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && label.is_none_or(|(k, v)| {
                    key.key().labels().any(|l| l.key() == k && l.value() == v)
                })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

/// Run `body` on a current-thread runtime so thread-local metrics reach the
/// recorder.
fn block_on<F: std::future::Future>(body: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| panic!("build runtime: {e}"));
    runtime.block_on(body)
}

#[rstest]
#[case(Direction::Inbound, "inbound")]
#[case(Direction::Outbound, "outbound")]
fn byte_counter_is_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || session_metrics::add_bytes(direction, 42));
    assert_eq!(
        counter(&snapshotter, session_metrics::BYTES_TOTAL, Some(("direction", label))),
        42
    );
}

#[test]
fn error_counter_is_labelled_by_kind() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        session_metrics::inc_errors("decode");
        session_metrics::inc_errors("decode");
        session_metrics::inc_errors("write");
    });
    assert_eq!(
        counter(&snapshotter, session_metrics::ERRORS_TOTAL, Some(("kind", "decode"))),
        2
    );
    assert_eq!(
        counter(&snapshotter, session_metrics::ERRORS_TOTAL, Some(("kind", "write"))),
        1
    );
}

#[test]
fn running_session_records_messages_bytes_and_errors() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let outcome: TestResult = metrics::with_local_recorder(&recorder, || {
        block_on(async {
            let (stream, mut client) = TestStream::pair();
            let config = SessionConfig::default()
                .buffer_size(64)
                .monitor(std::sync::Arc::new(MetricsMonitor));
            let harness = Harness::new();
            let (_session, task) =
                spawn(LengthPrefixedProtocol::new(8), harness.handler(), config, stream);

            client.write_all(&[0, 0, 0, 2, b'o', b'k']).await?;
            wait_for(|| harness.log.messages().len() == 1).await?;
            client.write_all(&[0, 0, 0, 200]).await?;
            assert!(join(task).await?.is_err());
            Ok(())
        })
    });
    assert!(outcome.is_ok(), "session run failed: {outcome:?}");

    assert_eq!(counter(&snapshotter, session_metrics::MESSAGES_PROCESSED, None), 1);
    assert_eq!(
        counter(&snapshotter, session_metrics::BYTES_TOTAL, Some(("direction", "inbound"))),
        10
    );
    assert_eq!(
        counter(&snapshotter, session_metrics::ERRORS_TOTAL, Some(("kind", "decode"))),
        1
    );
}

#[rstest]
#[tokio::test]
#[serial]
async fn active_session_count_tracks_running_drivers() -> TestResult {
    let harness = Harness::new();
    let before = active_session_count();
    let (stream, client) = TestStream::pair();
    let (_session, task) = spawn(
        FixedLengthProtocol::new(4),
        harness.handler(),
        harness.config(),
        stream,
    );

    wait_for(|| active_session_count() == before + 1).await?;
    drop(client);
    join(task).await??;
    assert_eq!(active_session_count(), before);
    Ok(())
}
