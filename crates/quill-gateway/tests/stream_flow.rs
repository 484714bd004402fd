//! End-to-end flows through the gateway stream layer: connect, replay,
//! live relay, terminal teardown, and the not-found path.

use quill_core::{ChannelMessage, SideChannel, TranscriptStore};
use quill_gateway::{AppState, GatewayConfig, StreamError, WireEvent, open_stream};
use quill_proto::{
    AgentIdentity, ConversationEntry, EntryMetadata, JobId, JobStatus, JobSummary,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

fn fast_config() -> GatewayConfig {
    GatewayConfig {
        // Long enough that no heartbeat fires during a test
        heartbeat_interval: Duration::from_secs(60),
        lookup_retry: Duration::from_millis(50),
        close_grace: Duration::from_millis(10),
        verbose_diagnostics: false,
    }
}

fn gateway() -> AppState {
    AppState::new(Arc::new(TranscriptStore::new()), SideChannel::new())
        .with_config(fast_config())
}

fn entry(text: &str, iteration: u32) -> ConversationEntry {
    ConversationEntry::new(AgentIdentity::new("ceo", "CEO"), text, iteration)
}

async fn next_event(stream: &mut ReceiverStream<WireEvent>) -> WireEvent {
    timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timed out waiting for event")
        .expect("stream ended unexpectedly")
}

/// Reads past the `connected` and `history` events, returning the history.
async fn skip_preamble(stream: &mut ReceiverStream<WireEvent>) -> Vec<ConversationEntry> {
    match next_event(stream).await {
        WireEvent::Connected(_) => {}
        other => panic!("expected connected, got {other:?}"),
    }
    match next_event(stream).await {
        WireEvent::History(entries) => entries,
        other => panic!("expected history, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connect_replays_history_then_relays_live_entries() {
    let state = gateway();
    let id = JobId::new("job-1");
    state.store.create_job(id.clone(), "research");
    state.store.append_entry(&id, entry("one", 1)).unwrap();

    let mut events = open_stream(&state, id.clone()).await.unwrap();

    match next_event(&mut events).await {
        WireEvent::Connected(snapshot) => {
            assert_eq!(snapshot.id, id);
            assert_eq!(snapshot.status, JobStatus::Running);
        }
        other => panic!("expected connected, got {other:?}"),
    }
    match next_event(&mut events).await {
        WireEvent::History(entries) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].message, "one");
        }
        other => panic!("expected history, got {other:?}"),
    }

    state.store.append_entry(&id, entry("two", 2)).unwrap();
    match next_event(&mut events).await {
        WireEvent::LogEntry(e) => assert_eq!(e.message, "two"),
        other => panic!("expected log-entry, got {other:?}"),
    }

    let summary = JobSummary {
        total_turns: 2,
        agents: vec!["ceo".to_string()],
        duration_ms: 5,
    };
    state.store.complete_job(&id, summary.clone()).unwrap();
    match next_event(&mut events).await {
        WireEvent::JobCompleted(s) => assert_eq!(s, summary),
        other => panic!("expected job-completed, got {other:?}"),
    }

    // Connection winds down after the terminal event
    assert!(
        timeout(Duration::from_secs(2), events.next())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_viewer_of_finished_job_gets_history_and_terminal_marker() {
    let state = gateway();
    let id = JobId::new("job-1");
    state.store.create_job(id.clone(), "research");
    state.store.append_entry(&id, entry("done work", 1)).unwrap();
    state
        .store
        .complete_job(&id, JobSummary { total_turns: 1, ..JobSummary::default() })
        .unwrap();

    let mut events = open_stream(&state, id).await.unwrap();

    let history = skip_preamble(&mut events).await;
    assert_eq!(history.len(), 1);

    match next_event(&mut events).await {
        WireEvent::JobAlreadyCompleted(terminal) => {
            assert_eq!(terminal.status, JobStatus::Completed);
            assert_eq!(terminal.summary.unwrap().total_turns, 1);
            assert!(terminal.error.is_none());
        }
        other => panic!("expected job-already-completed, got {other:?}"),
    }
    assert!(
        timeout(Duration::from_secs(2), events.next())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_unknown_job_reports_every_known_id() {
    let state = gateway();
    state.store.create_job(JobId::new("alpha"), "t");
    state.store.create_job(JobId::new("beta"), "t");

    let error = open_stream(&state, JobId::new("gamma")).await.unwrap_err();
    match error {
        StreamError::JobNotFound { job_id, known_jobs } => {
            assert_eq!(job_id, JobId::new("gamma"));
            assert_eq!(known_jobs.len(), 2);
            assert!(known_jobs.contains(&JobId::new("alpha")));
            assert!(known_jobs.contains(&JobId::new("beta")));
        }
    }
}

#[tokio::test]
async fn test_lookup_retry_finds_job_registered_just_after_connect() {
    let state = gateway();
    let id = JobId::new("job-1");

    let store = Arc::clone(&state.store);
    let late_id = id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.create_job(late_id, "research");
    });

    // First lookup misses; the one-shot re-check lands after creation
    let mut events = open_stream(&state, id).await.unwrap();
    let history = skip_preamble(&mut events).await;
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_side_channel_messages_are_filtered_by_job() {
    let state = gateway();
    let id = JobId::new("job-1");
    state.store.create_job(id.clone(), "research");
    state.store.create_job(JobId::new("job-2"), "research");

    let mut events = open_stream(&state, id).await.unwrap();
    skip_preamble(&mut events).await;

    state
        .channel
        .publish(ChannelMessage::new("job-2", "worker", "not for this viewer"));
    state.channel.publish(
        ChannelMessage::new("job-1", "planner", "status update")
            .with_name("Planner")
            .with_iteration(2),
    );

    match next_event(&mut events).await {
        WireEvent::LogEntry(entry) => {
            assert_eq!(entry.message, "status update");
            assert_eq!(entry.agent_name, "Planner");
            assert_eq!(entry.iteration, 2);
        }
        other => panic!("expected log-entry, got {other:?}"),
    }
}

#[tokio::test]
async fn test_one_viewer_disconnecting_does_not_affect_another() {
    let state = gateway();
    let id = JobId::new("job-1");
    state.store.create_job(id.clone(), "research");

    let mut first = open_stream(&state, id.clone()).await.unwrap();
    let mut second = open_stream(&state, id.clone()).await.unwrap();
    skip_preamble(&mut first).await;
    skip_preamble(&mut second).await;

    drop(first);
    state.store.append_entry(&id, entry("still flowing", 1)).unwrap();

    match next_event(&mut second).await {
        WireEvent::LogEntry(e) => assert_eq!(e.message, "still flowing"),
        other => panic!("expected log-entry, got {other:?}"),
    }
}

#[tokio::test]
async fn test_job_failure_reaches_the_viewer_and_ends_the_stream() {
    let state = gateway();
    let id = JobId::new("job-1");
    state.store.create_job(id.clone(), "research");

    let mut events = open_stream(&state, id.clone()).await.unwrap();
    skip_preamble(&mut events).await;

    state.store.fail_job(&id, "agent crashed").unwrap();

    match next_event(&mut events).await {
        WireEvent::JobFailed { error } => assert_eq!(error, "agent crashed"),
        other => panic!("expected job-failed, got {other:?}"),
    }
    assert!(
        timeout(Duration::from_secs(2), events.next())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_heartbeats_flow_while_the_connection_is_live() {
    let state = gateway().with_config(GatewayConfig {
        heartbeat_interval: Duration::from_millis(20),
        ..fast_config()
    });
    let id = JobId::new("job-1");
    state.store.create_job(id.clone(), "research");

    let mut events = open_stream(&state, id).await.unwrap();
    skip_preamble(&mut events).await;

    match next_event(&mut events).await {
        WireEvent::Heartbeat { .. } => {}
        other => panic!("expected heartbeat, got {other:?}"),
    }
}

#[tokio::test]
async fn test_quiet_job_viewer_dropping_tears_the_connection_down() {
    let state = gateway().with_config(GatewayConfig {
        heartbeat_interval: Duration::from_millis(20),
        ..fast_config()
    });
    let id = JobId::new("job-1");
    state.store.create_job(id.clone(), "research");

    let mut events = open_stream(&state, id.clone()).await.unwrap();
    skip_preamble(&mut events).await;
    assert_eq!(state.channel.receiver_count(), 1);

    // No store traffic at all: only the heartbeat can notice the drop
    drop(events);
    for _ in 0..100 {
        if state.channel.receiver_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.channel.receiver_count(), 0);
}

#[tokio::test]
async fn test_metadata_is_stripped_unless_diagnostics_requested() {
    let metadata = EntryMetadata {
        model: Some("gpt-x".to_string()),
        ..EntryMetadata::default()
    };

    for (verbose, expect_metadata) in [(false, false), (true, true)] {
        let state = gateway().with_config(GatewayConfig {
            verbose_diagnostics: verbose,
            ..fast_config()
        });
        let id = JobId::new("job-1");
        state.store.create_job(id.clone(), "research");
        state
            .store
            .append_entry(&id, entry("replayed", 1).with_metadata(Some(metadata.clone())))
            .unwrap();

        let mut events = open_stream(&state, id.clone()).await.unwrap();
        let history = skip_preamble(&mut events).await;
        assert_eq!(history[0].metadata.is_some(), expect_metadata);

        state
            .store
            .append_entry(&id, entry("live", 2).with_metadata(Some(metadata.clone())))
            .unwrap();
        match next_event(&mut events).await {
            WireEvent::LogEntry(e) => assert_eq!(e.metadata.is_some(), expect_metadata),
            other => panic!("expected log-entry, got {other:?}"),
        }
    }
}
