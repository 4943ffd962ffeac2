use std::sync::Arc;

use log::{info, warn};
use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    time::{Duration, Instant},
};

use crate::{
    core::store::{ScheduleStore, StoreError},
    item::{Item, ItemDraft},
    op::StoredOp,
    persist::{OpSink, PersistError},
    schedule::{EntryDraft, ScheduleView},
    snapshot::SnapshotMeta,
    types::{EntryId, ItemId, KindFilter, OpSeq, SnapshotId, Timestamp},
};

use super::events::ScheduleEvent;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("persistence: {0}")]
    Persist(#[from] PersistError),
    #[error("scheduler runtime is not running")]
    ChannelClosed,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Commit every op as soon as it arrives instead of batching.
    pub flush_every_op: bool,
    pub batch_max_ops: usize,
    pub batch_max_latency_ms: u64,
    pub persist_queue_bound: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_every_op: true,
            batch_max_ops: 32,
            batch_max_latency_ms: 75,
            persist_queue_bound: 64,
        }
    }
}

/// Cloneable front door to the single-writer loop.
pub struct SchedulerHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<ScheduleEvent>,
}

impl Clone for SchedulerHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, RuntimeError>>;

enum Command {
    ListItems {
        filter: KindFilter,
        resp: oneshot::Sender<Vec<Item>>,
    },
    CreateItem {
        draft: ItemDraft,
        resp: Reply<Item>,
    },
    UpdateItem {
        id: ItemId,
        draft: ItemDraft,
        resp: Reply<Item>,
    },
    UpsertItem {
        draft: ItemDraft,
        resp: Reply<Item>,
    },
    DeleteItem {
        id: ItemId,
        resp: Reply<()>,
    },
    GetSchedule {
        resp: oneshot::Sender<ScheduleView>,
    },
    ReplaceSchedule {
        entries: Vec<EntryDraft>,
        resp: Reply<ScheduleView>,
    },
    AddEntry {
        item_id: ItemId,
        start: Option<Timestamp>,
        resp: Reply<ScheduleView>,
    },
    RemoveEntry {
        entry_id: EntryId,
        resp: Reply<ScheduleView>,
    },
    RescheduleEntry {
        entry_id: EntryId,
        start: Timestamp,
        resp: Reply<ScheduleView>,
    },
    GetContestStart {
        resp: oneshot::Sender<Option<Timestamp>>,
    },
    SetContestStart {
        start: Option<Timestamp>,
        resp: Reply<ScheduleView>,
    },
    SaveSnapshot {
        label: String,
        resp: Reply<SnapshotMeta>,
    },
    ListSnapshots {
        resp: oneshot::Sender<Vec<SnapshotMeta>>,
    },
    RestoreSnapshot {
        id: SnapshotId,
        resp: Reply<ScheduleView>,
    },
    Flush {
        resp: Reply<OpSeq>,
    },
    Shutdown {
        resp: Reply<()>,
    },
}

enum PersistMsg {
    Op(StoredOp),
    Flush {
        resp: oneshot::Sender<Result<OpSeq, PersistError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
}

/// Starts the command loop (and, with a sink, the persistence worker).
///
/// Must be called from within a tokio runtime.
pub fn spawn_scheduler(
    store: ScheduleStore,
    sink: Option<Box<dyn OpSink>>,
    config: RuntimeConfig,
) -> SchedulerHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    let (events_tx, _) = broadcast::channel::<ScheduleEvent>(1024);

    let (persist_tx_opt, mut durable_rx) = if let Some(sink) = sink {
        let (persist_tx, persist_rx) = mpsc::channel::<PersistMsg>(config.persist_queue_bound);
        let (durable_tx, durable_rx) = mpsc::unbounded_channel::<Result<OpSeq, PersistError>>();
        spawn_persistence_worker(sink, persist_rx, durable_tx, config.clone());
        (Some(persist_tx), Some(durable_rx))
    } else {
        (None, None)
    };

    let events_tx_loop = events_tx.clone();
    info!("scheduler runtime started (durable={})", persist_tx_opt.is_some());

    tokio::spawn(async move {
        let mut store = store;

        loop {
            if let Some(rx) = durable_rx.as_mut() {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break; };
                        if handle_command(cmd, &mut store, &events_tx_loop, persist_tx_opt.as_ref()).await {
                            break;
                        }
                    }
                    durable = rx.recv() => {
                        match durable {
                            Some(Ok(op_seq)) => {
                                let _ = events_tx_loop.send(ScheduleEvent::DurableUpTo { op_seq });
                            }
                            Some(Err(err)) => warn!("persistence failed: {err}"),
                            None => {}
                        }
                    }
                }
            } else {
                let Some(cmd) = cmd_rx.recv().await else { break; };
                if handle_command(cmd, &mut store, &events_tx_loop, persist_tx_opt.as_ref()).await {
                    break;
                }
            }
        }
        info!("scheduler runtime stopped");
    });

    SchedulerHandle { cmd_tx, events_tx }
}

impl SchedulerHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleEvent> {
        self.events_tx.subscribe()
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    pub async fn list_items(&self, filter: KindFilter) -> Result<Vec<Item>, RuntimeError> {
        self.call(|resp| Command::ListItems { filter, resp }).await
    }

    pub async fn create_item(&self, draft: ItemDraft) -> Result<Item, RuntimeError> {
        self.call(|resp| Command::CreateItem { draft, resp }).await?
    }

    pub async fn update_item(&self, id: ItemId, draft: ItemDraft) -> Result<Item, RuntimeError> {
        self.call(|resp| Command::UpdateItem { id, draft, resp })
            .await?
    }

    /// Media-inventory upsert by name.
    pub async fn upsert_item(&self, draft: ItemDraft) -> Result<Item, RuntimeError> {
        self.call(|resp| Command::UpsertItem { draft, resp }).await?
    }

    pub async fn delete_item(&self, id: ItemId) -> Result<(), RuntimeError> {
        self.call(|resp| Command::DeleteItem { id, resp }).await?
    }

    pub async fn schedule(&self) -> Result<ScheduleView, RuntimeError> {
        self.call(|resp| Command::GetSchedule { resp }).await
    }

    pub async fn replace_schedule(
        &self,
        entries: Vec<EntryDraft>,
    ) -> Result<ScheduleView, RuntimeError> {
        self.call(|resp| Command::ReplaceSchedule { entries, resp })
            .await?
    }

    pub async fn add_entry(
        &self,
        item_id: ItemId,
        start: Option<Timestamp>,
    ) -> Result<ScheduleView, RuntimeError> {
        self.call(|resp| Command::AddEntry {
            item_id,
            start,
            resp,
        })
        .await?
    }

    pub async fn remove_entry(&self, entry_id: EntryId) -> Result<ScheduleView, RuntimeError> {
        self.call(|resp| Command::RemoveEntry { entry_id, resp })
            .await?
    }

    pub async fn reschedule_entry(
        &self,
        entry_id: EntryId,
        start: Timestamp,
    ) -> Result<ScheduleView, RuntimeError> {
        self.call(|resp| Command::RescheduleEntry {
            entry_id,
            start,
            resp,
        })
        .await?
    }

    pub async fn contest_start(&self) -> Result<Option<Timestamp>, RuntimeError> {
        self.call(|resp| Command::GetContestStart { resp }).await
    }

    pub async fn set_contest_start(
        &self,
        start: Option<Timestamp>,
    ) -> Result<ScheduleView, RuntimeError> {
        self.call(|resp| Command::SetContestStart { start, resp })
            .await?
    }

    pub async fn save_snapshot(
        &self,
        label: impl Into<String>,
    ) -> Result<SnapshotMeta, RuntimeError> {
        let label = label.into();
        self.call(|resp| Command::SaveSnapshot { label, resp })
            .await?
    }

    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotMeta>, RuntimeError> {
        self.call(|resp| Command::ListSnapshots { resp }).await
    }

    pub async fn restore_snapshot(&self, id: SnapshotId) -> Result<ScheduleView, RuntimeError> {
        self.call(|resp| Command::RestoreSnapshot { id, resp })
            .await?
    }

    /// Waits until every op accepted so far is durable.
    pub async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        self.call(|resp| Command::Flush { resp }).await?
    }

    /// Drains the persistence queue and stops the loop.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.call(|resp| Command::Shutdown { resp }).await?
    }
}

/// Slot in the persistence queue, taken before the store is touched.
type Slot<'a> = Option<mpsc::Permit<'a, PersistMsg>>;

/// Reserves queue space for one op. A full or closed queue fails the
/// request while the store is still unchanged.
fn reserve(persist_tx: Option<&mpsc::Sender<PersistMsg>>) -> Result<Slot<'_>, RuntimeError> {
    let Some(tx) = persist_tx else {
        return Ok(None);
    };
    tx.try_reserve().map(Some).map_err(|err| {
        RuntimeError::Persist(PersistError::Message(format!(
            "write rejected, persistence queue unavailable: {err}"
        )))
    })
}

/// Hands a committed op to its reserved slot and announces it.
fn publish(
    slot: Slot<'_>,
    stored: StoredOp,
    event: ScheduleEvent,
    store: &ScheduleStore,
    events_tx: &broadcast::Sender<ScheduleEvent>,
) {
    match slot {
        Some(permit) => permit.send(PersistMsg::Op(stored)),
        None => {
            let _ = events_tx.send(ScheduleEvent::DurableUpTo {
                op_seq: store.latest_op_seq(),
            });
        }
    }
    let _ = events_tx.send(event);
}

/// Same as [`publish`] for edits that may turn out to be no-ops.
fn publish_optional(
    slot: Slot<'_>,
    stored: Option<StoredOp>,
    view: &ScheduleView,
    store: &ScheduleStore,
    events_tx: &broadcast::Sender<ScheduleEvent>,
) {
    let Some(stored) = stored else {
        return;
    };
    let event = ScheduleEvent::ScheduleReplaced {
        entries: view.schedule.len(),
    };
    publish(slot, stored, event, store, events_tx);
}

async fn handle_command(
    cmd: Command,
    store: &mut ScheduleStore,
    events_tx: &broadcast::Sender<ScheduleEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
) -> bool {
    match cmd {
        Command::ListItems { filter, resp } => {
            let _ = resp.send(store.list_items_cloned(filter));
        }
        Command::CreateItem { draft, resp } => {
            let res = reserve(persist_tx).and_then(|slot| {
                let (item, stored) = store.create_item(draft)?;
                let event = ScheduleEvent::ItemCreated { id: item.id.clone() };
                publish(slot, stored, event, store, events_tx);
                Ok(item)
            });
            let _ = resp.send(res);
        }
        Command::UpdateItem { id, draft, resp } => {
            let res = reserve(persist_tx).and_then(|slot| {
                let (item, stored) = store.update_item(&id, draft)?;
                publish(slot, stored, ScheduleEvent::ItemUpdated { id }, store, events_tx);
                Ok(item)
            });
            let _ = resp.send(res);
        }
        Command::UpsertItem { draft, resp } => {
            let existed = store.item_by_name(&draft.name).is_some();
            let res = reserve(persist_tx).and_then(|slot| {
                let (item, stored) = store.upsert_item(draft)?;
                let id = item.id.clone();
                let event = if existed {
                    ScheduleEvent::ItemUpdated { id }
                } else {
                    ScheduleEvent::ItemCreated { id }
                };
                publish(slot, stored, event, store, events_tx);
                Ok(item)
            });
            let _ = resp.send(res);
        }
        Command::DeleteItem { id, resp } => {
            let res = reserve(persist_tx).and_then(|slot| {
                let (removed_entries, stored) = store.delete_item(&id)?;
                let event = ScheduleEvent::ItemDeleted { id, removed_entries };
                publish(slot, stored, event, store, events_tx);
                Ok(())
            });
            let _ = resp.send(res);
        }
        Command::GetSchedule { resp } => {
            let _ = resp.send(store.schedule());
        }
        Command::ReplaceSchedule { entries, resp } => {
            let res = reserve(persist_tx).and_then(|slot| {
                let (view, stored) = store.replace_schedule(entries)?;
                let event = ScheduleEvent::ScheduleReplaced {
                    entries: view.schedule.len(),
                };
                publish(slot, stored, event, store, events_tx);
                Ok(view)
            });
            let _ = resp.send(res);
        }
        Command::AddEntry {
            item_id,
            start,
            resp,
        } => {
            let res = reserve(persist_tx).and_then(|slot| {
                let (view, stored) = store.add_entry(&item_id, start)?;
                let event = ScheduleEvent::ScheduleReplaced {
                    entries: view.schedule.len(),
                };
                publish(slot, stored, event, store, events_tx);
                Ok(view)
            });
            let _ = resp.send(res);
        }
        Command::RemoveEntry { entry_id, resp } => {
            let res = reserve(persist_tx).and_then(|slot| {
                let (view, stored) = store.remove_entry(&entry_id)?;
                publish_optional(slot, stored, &view, store, events_tx);
                Ok(view)
            });
            let _ = resp.send(res);
        }
        Command::RescheduleEntry {
            entry_id,
            start,
            resp,
        } => {
            let res = reserve(persist_tx).and_then(|slot| {
                let (view, stored) = store.reschedule_entry(&entry_id, start)?;
                publish_optional(slot, stored, &view, store, events_tx);
                Ok(view)
            });
            let _ = resp.send(res);
        }
        Command::GetContestStart { resp } => {
            let _ = resp.send(store.contest_start());
        }
        Command::SetContestStart { start, resp } => {
            let res = reserve(persist_tx).and_then(|slot| {
                let (view, stored) = store.set_contest_start(start)?;
                let event = ScheduleEvent::ContestClockSet {
                    start_timestamp: start,
                };
                publish(slot, stored, event, store, events_tx);
                Ok(view)
            });
            let _ = resp.send(res);
        }
        Command::SaveSnapshot { label, resp } => {
            let res = reserve(persist_tx).and_then(|slot| {
                let (meta, stored) = store.save_snapshot(label)?;
                let event = ScheduleEvent::SnapshotSaved { id: meta.id.clone() };
                publish(slot, stored, event, store, events_tx);
                Ok(meta)
            });
            let _ = resp.send(res);
        }
        Command::ListSnapshots { resp } => {
            let _ = resp.send(store.list_snapshots());
        }
        Command::RestoreSnapshot { id, resp } => {
            let res = reserve(persist_tx).and_then(|slot| {
                let (view, stored) = store.restore_snapshot(&id)?;
                let event = ScheduleEvent::SnapshotRestored {
                    id,
                    entries: view.schedule.len(),
                };
                publish(slot, stored, event, store, events_tx);
                Ok(view)
            });
            let _ = resp.send(res);
        }
        Command::Flush { resp } => {
            let out = if let Some(tx) = persist_tx {
                let (flush_tx, flush_rx) = oneshot::channel();
                if tx.send(PersistMsg::Flush { resp: flush_tx }).await.is_err() {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    flush_rx
                        .await
                        .map_err(|_| RuntimeError::ChannelClosed)
                        .and_then(|r| r.map_err(RuntimeError::from))
                }
            } else {
                Ok(store.latest_op_seq())
            };
            let _ = resp.send(out);
        }
        Command::Shutdown { resp } => {
            let out = if let Some(tx) = persist_tx {
                let (done_tx, done_rx) = oneshot::channel();
                if tx.send(PersistMsg::Shutdown { resp: done_tx }).await.is_err() {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    done_rx
                        .await
                        .map_err(|_| RuntimeError::ChannelClosed)
                        .and_then(|r| r.map_err(RuntimeError::from))
                }
            } else {
                Ok(())
            };
            let _ = resp.send(out);
            return true;
        }
    }

    // Committed ops were already handed to `publish`.
    store.drain_pending_ops();
    false
}

/// Owns the sink and the not-yet-durable batch.
///
/// A batch the sink rejects stays pending and is retried on the next commit,
/// so `flush` only reports success once every accepted op is durable.
struct PersistWorker {
    sink: Arc<Mutex<Box<dyn OpSink>>>,
    pending: Vec<StoredOp>,
    durable: OpSeq,
    /// Set when a commit task died with its batch; every later commit fails.
    lost: Option<String>,
    durable_tx: mpsc::UnboundedSender<Result<OpSeq, PersistError>>,
    max_latency: Duration,
}

fn spawn_persistence_worker(
    sink: Box<dyn OpSink>,
    rx: mpsc::Receiver<PersistMsg>,
    durable_tx: mpsc::UnboundedSender<Result<OpSeq, PersistError>>,
    config: RuntimeConfig,
) {
    let worker = PersistWorker {
        sink: Arc::new(Mutex::new(sink)),
        pending: Vec::new(),
        durable: 0,
        lost: None,
        durable_tx,
        max_latency: Duration::from_millis(config.batch_max_latency_ms),
    };
    tokio::spawn(worker.run(rx, config));
}

impl PersistWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<PersistMsg>, config: RuntimeConfig) {
        let mut deadline = Instant::now() + self.max_latency;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        None => {
                            let _ = self.commit(true).await;
                            break;
                        }
                        Some(PersistMsg::Op(stored)) => {
                            self.pending.push(stored);
                            if config.flush_every_op || self.pending.len() >= config.batch_max_ops {
                                let _ = self.commit(true).await;
                                deadline = Instant::now() + self.max_latency;
                            }
                        }
                        Some(PersistMsg::Flush { resp }) => {
                            let result = self.commit(true).await.map(|_| self.durable);
                            let _ = resp.send(result);
                            deadline = Instant::now() + self.max_latency;
                        }
                        Some(PersistMsg::Shutdown { resp }) => {
                            let result = self.commit(true).await;
                            match &result {
                                Ok(()) => info!("persistence worker drained at op seq {}", self.durable),
                                Err(err) => warn!(
                                    "persistence worker stopped with {} ops not durable: {err}",
                                    self.pending.len()
                                ),
                            }
                            let _ = resp.send(result);
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !self.pending.is_empty() => {
                    let _ = self.commit(false).await;
                    deadline = Instant::now() + self.max_latency;
                }
            }
        }
    }

    /// Hands the pending batch to the sink on a blocking thread. With
    /// `checkpoint`, the sink is flushed too, even when nothing is pending.
    async fn commit(&mut self, checkpoint: bool) -> Result<(), PersistError> {
        if let Some(reason) = &self.lost {
            return Err(PersistError::Message(reason.clone()));
        }
        if self.pending.is_empty() && !checkpoint {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.pending);
        let sink = Arc::clone(&self.sink);
        let joined = tokio::task::spawn_blocking(move || {
            let mut sink = sink.blocking_lock();
            let appended = if batch.is_empty() {
                Ok(None)
            } else {
                sink.append_ops(&batch).map(Some)
            };
            let flushed = match appended {
                Ok(_) if checkpoint => sink.flush(),
                _ => Ok(()),
            };
            (batch, appended, flushed)
        })
        .await;

        let (batch, appended, flushed) = match joined {
            Ok(outcome) => outcome,
            Err(err) => {
                let reason = format!("persistence task failed, ops after seq {} lost: {err}", self.durable);
                self.lost = Some(reason.clone());
                let _ = self.durable_tx.send(Err(PersistError::Message(reason.clone())));
                return Err(PersistError::Message(reason));
            }
        };

        match appended {
            Ok(Some(seq)) => {
                self.durable = self.durable.max(seq);
                let _ = self.durable_tx.send(Ok(self.durable));
            }
            Ok(None) => {}
            Err(err) => {
                // The sink's transaction rolled back; keep the batch for the retry.
                self.pending = batch;
                let _ = self.durable_tx.send(Err(PersistError::Message(format!(
                    "{} ops pending retry: {err}",
                    self.pending.len()
                ))));
                return Err(err);
            }
        }
        flushed
    }
}
