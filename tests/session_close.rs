//! Tests for the close state machine on a running session.

use std::sync::atomic::Ordering;

use rstest::rstest;
use tokio::io::AsyncReadExt;
use wiresession::{EnqueueError, FixedLengthProtocol, SessionStatus, StateEvent};

mod common;
use common::{Harness, TestResult, TestStream, join, spawn};

#[rstest]
#[tokio::test]
async fn concurrent_closes_shut_the_stream_once() -> TestResult {
    let harness = Harness::new();
    let (stream, _client) = TestStream::pair();
    let shutdowns = stream.shutdown_counter();
    let (session, task) = spawn(
        FixedLengthProtocol::new(4),
        harness.handler(),
        harness.config(),
        stream,
    );

    let threads: Vec<_> = [true, false, true]
        .into_iter()
        .map(|immediate| {
            let session = session.clone();
            std::thread::spawn(move || session.close(immediate))
        })
        .collect();
    for thread in threads {
        thread.join().map_err(|_| "close thread panicked")?;
    }
    session.close(true);
    join(task).await??;

    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(harness.log.count_event(StateEvent::Closed), 1);
    assert_eq!(session.status(), SessionStatus::Closed);
    assert_eq!(harness.pool.acquired(), harness.pool.released());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn graceful_close_drains_pending_writes() -> TestResult {
    let harness = Harness::new();
    let (stream, mut client) = TestStream::pair();
    let (session, task) = spawn(
        FixedLengthProtocol::new(4),
        harness.handler(),
        harness.config(),
        stream,
    );

    session.write(b"goodbye")?;
    session.close(false);
    assert_ne!(session.status(), SessionStatus::Enabled);

    let mut wire = Vec::new();
    client.read_to_end(&mut wire).await?;
    assert_eq!(wire, b"goodbye");
    join(task).await??;

    assert_eq!(harness.log.count_event(StateEvent::Closing), 1);
    assert_eq!(harness.log.count_event(StateEvent::Closed), 1);
    assert_eq!(harness.pool.acquired(), harness.pool.released());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn immediate_close_discards_queued_writes() -> TestResult {
    let harness = Harness::new();
    let (stream, mut client) = TestStream::pair();
    let (session, task) = spawn(
        FixedLengthProtocol::new(4),
        harness.handler(),
        harness.config(),
        stream,
    );

    session.write(b"never sent")?;
    session.close(true);
    join(task).await??;

    let mut wire = Vec::new();
    client.read_to_end(&mut wire).await?;
    assert!(wire.is_empty());
    assert_eq!(harness.log.count_event(StateEvent::Closing), 0);
    assert_eq!(harness.pool.acquired(), harness.pool.released());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn closed_session_rejects_writes() -> TestResult {
    let harness = Harness::new();
    let (stream, _client) = TestStream::pair();
    let (session, task) = spawn(
        FixedLengthProtocol::new(4),
        harness.handler(),
        harness.config(),
        stream,
    );

    session.close(true);
    join(task).await??;
    assert!(session.is_invalid());
    assert_eq!(session.write(b"late"), Err(EnqueueError::Closed));
    let buffer = session.acquire_buffer();
    assert_eq!(session.send(buffer).await, Err(EnqueueError::Closed));
    assert_eq!(harness.pool.acquired(), harness.pool.released());
    Ok(())
}
