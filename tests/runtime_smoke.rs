use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc as std_mpsc,
    },
    time::Duration,
};

use obs_scheduler::{
    core::store::{ErrorKind, ScheduleStore},
    item::ItemDraft,
    op::StoredOp,
    persist::{OpSink, PersistError, PersistResult, sqlite::SqliteOpSink},
    runtime::{
        events::ScheduleEvent,
        handle::{RuntimeConfig, RuntimeError, spawn_scheduler},
    },
    schedule::EntryDraft,
    types::{ItemKind, KindFilter, OpSeq},
};

fn video(name: &str) -> ItemDraft {
    ItemDraft::new(name, 5000, ItemKind::Video)
}

/// Blocks every append until the test releases (or drops) the gate.
struct GatedSink {
    gate: std_mpsc::Receiver<()>,
    committed: Arc<Mutex<Vec<OpSeq>>>,
}

impl OpSink for GatedSink {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        let _ = self.gate.recv();
        let mut committed = self.committed.lock().expect("lock");
        committed.extend(ops.iter().map(|o| o.seq));
        Ok(committed.last().copied().unwrap_or(0))
    }
}

/// SQLite sink whose appends wait on a gate.
struct GatedSqlite {
    gate: std_mpsc::Receiver<()>,
    inner: SqliteOpSink,
}

impl OpSink for GatedSqlite {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        let _ = self.gate.recv();
        self.inner.append_ops(ops)
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.inner.flush()
    }
}

/// Rejects every append while `down` is set.
struct FlakySink {
    down: Arc<AtomicBool>,
    committed: Arc<Mutex<Vec<OpSeq>>>,
}

impl OpSink for FlakySink {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        if self.down.load(Ordering::SeqCst) {
            return Err(PersistError::Message("disk unavailable".to_string()));
        }
        let mut committed = self.committed.lock().expect("lock");
        committed.extend(ops.iter().map(|o| o.seq));
        Ok(committed.last().copied().unwrap_or(0))
    }
}

async fn next_non_durable(sub: &mut tokio::sync::broadcast::Receiver<ScheduleEvent>) -> ScheduleEvent {
    loop {
        let evt = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("event")
            .expect("recv");
        if !matches!(evt, ScheduleEvent::DurableUpTo { .. }) {
            return evt;
        }
    }
}

#[tokio::test]
async fn mutations_reply_and_emit_events_in_order() {
    let handle = spawn_scheduler(ScheduleStore::new(), None, RuntimeConfig::default());
    let mut sub = handle.subscribe();

    let item = handle.create_item(video("intro.mp4")).await.expect("create");
    let view = handle
        .replace_schedule(vec![
            EntryDraft::new(200, item.id.clone()),
            EntryDraft::new(100, item.id.clone()),
        ])
        .await
        .expect("replace");
    assert_eq!(view.start_timestamps(), vec![100, 200]);
    handle.set_contest_start(Some(10)).await.expect("clock");
    let snap = handle.save_snapshot("v1").await.expect("save");
    handle.delete_item(item.id.clone()).await.expect("delete");
    let restored = handle.restore_snapshot(snap.id.clone()).await.expect("restore");
    assert!(restored.schedule.is_empty());
    assert_eq!(restored.contest_timestamp, Some(10));

    assert_eq!(
        next_non_durable(&mut sub).await,
        ScheduleEvent::ItemCreated { id: item.id.clone() }
    );
    assert_eq!(
        next_non_durable(&mut sub).await,
        ScheduleEvent::ScheduleReplaced { entries: 2 }
    );
    assert_eq!(
        next_non_durable(&mut sub).await,
        ScheduleEvent::ContestClockSet {
            start_timestamp: Some(10)
        }
    );
    assert_eq!(
        next_non_durable(&mut sub).await,
        ScheduleEvent::SnapshotSaved { id: snap.id.clone() }
    );
    assert_eq!(
        next_non_durable(&mut sub).await,
        ScheduleEvent::ItemDeleted {
            id: item.id.clone(),
            removed_entries: 2
        }
    );
    assert_eq!(
        next_non_durable(&mut sub).await,
        ScheduleEvent::SnapshotRestored {
            id: snap.id,
            entries: 0
        }
    );

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn failed_mutation_returns_store_error_and_emits_nothing() {
    let handle = spawn_scheduler(ScheduleStore::new(), None, RuntimeConfig::default());
    handle.create_item(video("a")).await.expect("create");
    let mut sub = handle.subscribe();

    let err = handle.create_item(video("a")).await.unwrap_err();
    match err {
        RuntimeError::Store(store_err) => assert_eq!(store_err.kind(), ErrorKind::Conflict),
        other => panic!("unexpected error: {other:?}"),
    }
    let err = handle
        .replace_schedule(vec![EntryDraft::new(1, "missing")])
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Store(_)));

    assert!(sub.try_recv().is_err());
    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn stalled_sink_surfaces_queue_pressure_then_catches_up() {
    let committed = Arc::new(Mutex::new(Vec::new()));
    let (release, gate) = std_mpsc::channel();
    let sink = GatedSink {
        gate,
        committed: Arc::clone(&committed),
    };
    let cfg = RuntimeConfig {
        persist_queue_bound: 1,
        ..RuntimeConfig::default()
    };
    let handle = spawn_scheduler(ScheduleStore::new(), Some(Box::new(sink)), cfg);
    let mut sub = handle.subscribe();

    let mut accepted = 0u64;
    let mut pressure = None;
    for i in 0..16 {
        match handle.create_item(video(&format!("clip-{i}"))).await {
            Ok(_) => accepted += 1,
            Err(err) => {
                pressure = Some(err);
                break;
            }
        }
    }
    assert!(
        matches!(pressure, Some(RuntimeError::Persist(_))),
        "expected a full persistence queue, got {pressure:?}"
    );

    drop(release);
    let durable = handle.flush().await.expect("flush");
    assert!(durable >= accepted);

    let mut durable_event = None;
    while let Ok(Ok(evt)) = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await {
        if let ScheduleEvent::DurableUpTo { op_seq } = evt {
            durable_event = Some(op_seq);
        }
        if durable_event == Some(durable) {
            break;
        }
    }
    assert_eq!(durable_event, Some(durable));

    handle.shutdown().await.expect("shutdown");
    assert!(!committed.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn flush_makes_everything_durable_for_the_next_process() {
    let tmp = tempfile::TempDir::new().expect("tmp");
    let db_path = tmp.path().join("runtime.db");

    let sink = SqliteOpSink::open(&db_path).expect("open");
    let store = sink.load_store().expect("load");
    let cfg = RuntimeConfig {
        flush_every_op: false,
        ..RuntimeConfig::default()
    };
    let handle = spawn_scheduler(store, Some(Box::new(sink)), cfg);

    let item = handle.create_item(video("intro.mp4")).await.expect("create");
    handle
        .add_entry(item.id.clone(), Some(1_000))
        .await
        .expect("add");
    handle.set_contest_start(Some(500)).await.expect("clock");
    let durable = handle.flush().await.expect("flush");
    assert_eq!(durable, 3);

    let expected = handle.schedule().await.expect("schedule");
    handle.shutdown().await.expect("shutdown");
    assert!(matches!(
        handle.schedule().await,
        Err(RuntimeError::ChannelClosed)
    ));

    let reopened = SqliteOpSink::open(&db_path).expect("reopen");
    assert_eq!(reopened.load_store().expect("load").schedule(), expected);
}

#[tokio::test]
async fn rejected_write_leaves_memory_and_disk_in_step() {
    let tmp = tempfile::TempDir::new().expect("tmp");
    let db_path = tmp.path().join("pressure.db");

    let inner = SqliteOpSink::open(&db_path).expect("open");
    let store = inner.load_store().expect("load");
    let (release, gate) = std_mpsc::channel();
    let cfg = RuntimeConfig {
        persist_queue_bound: 1,
        ..RuntimeConfig::default()
    };
    let handle = spawn_scheduler(store, Some(Box::new(GatedSqlite { gate, inner })), cfg);

    let mut accepted = Vec::new();
    let mut rejected = None;
    for i in 0..16 {
        let name = format!("clip-{i}");
        match handle.create_item(video(&name)).await {
            Ok(item) => accepted.push(item.id),
            Err(err) => {
                rejected = Some((name, err));
                break;
            }
        }
    }
    let (rejected_name, err) = rejected.expect("queue should fill");
    assert!(matches!(err, RuntimeError::Persist(_)), "got {err:?}");

    let items = handle.list_items(KindFilter::All).await.expect("list");
    assert_eq!(items.len(), accepted.len());
    assert!(items.iter().all(|i| i.name != rejected_name));

    let first = accepted.first().cloned().expect("at least one accepted");
    let err = handle
        .replace_schedule(vec![EntryDraft::new(10, first)])
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Persist(_)));
    assert!(handle.schedule().await.expect("schedule").schedule.is_empty());

    drop(release);
    handle.flush().await.expect("flush");
    let expected_items = handle.list_items(KindFilter::All).await.expect("list");
    let expected_schedule = handle.schedule().await.expect("schedule");
    handle.shutdown().await.expect("shutdown");

    let reopened = SqliteOpSink::open(&db_path)
        .expect("reopen")
        .load_store()
        .expect("load");
    assert_eq!(reopened.list_items_cloned(KindFilter::All), expected_items);
    assert_eq!(reopened.schedule(), expected_schedule);
}

#[tokio::test]
async fn failed_batch_is_retried_until_the_sink_recovers() {
    let down = Arc::new(AtomicBool::new(true));
    let committed = Arc::new(Mutex::new(Vec::new()));
    let sink = FlakySink {
        down: Arc::clone(&down),
        committed: Arc::clone(&committed),
    };
    let cfg = RuntimeConfig {
        flush_every_op: false,
        batch_max_latency_ms: 60_000,
        ..RuntimeConfig::default()
    };
    let handle = spawn_scheduler(ScheduleStore::new(), Some(Box::new(sink)), cfg);

    handle.create_item(video("intro.mp4")).await.expect("create");
    let err = handle.flush().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Persist(_)), "got {err:?}");
    let err = handle.flush().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Persist(_)), "still failing: {err:?}");
    assert!(committed.lock().expect("lock").is_empty());

    down.store(false, Ordering::SeqCst);
    assert_eq!(handle.flush().await.expect("flush"), 1);
    assert_eq!(*committed.lock().expect("lock"), vec![1]);

    handle.create_item(video("outro.mp4")).await.expect("create");
    handle.shutdown().await.expect("shutdown");
    assert_eq!(*committed.lock().expect("lock"), vec![1, 2]);
}

#[tokio::test]
async fn shutdown_reports_ops_that_never_became_durable() {
    let down = Arc::new(AtomicBool::new(true));
    let sink = FlakySink {
        down,
        committed: Arc::new(Mutex::new(Vec::new())),
    };
    let cfg = RuntimeConfig {
        flush_every_op: false,
        batch_max_latency_ms: 60_000,
        ..RuntimeConfig::default()
    };
    let handle = spawn_scheduler(ScheduleStore::new(), Some(Box::new(sink)), cfg);
    handle.create_item(video("intro.mp4")).await.expect("create");

    let err = handle.shutdown().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Persist(_)), "got {err:?}");
}
