//! SQLite-backed sink that materializes ops into relational tables.
//!
//! Each batch handed to [`OpSink::append_ops`] runs in one transaction: the
//! table writes and the journal rows for the batch commit together or not at
//! all.

use std::path::Path;

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, Transaction, params};

use crate::{
    core::store::{ScheduleStore, StoreImageV1},
    item::Item,
    op::{Op, StoredOp, StoredOpEnvelope},
    schedule::{CONTEST_STATE_ID, ContestState, ScheduleEntry},
    snapshot::{ScheduleSnapshot, SnapshotMeta, SnapshotPayload},
    types::{ItemKind, OpSeq, Timestamp},
};

use super::{OpSink, PersistError, PersistResult};

/// Journal plus materialized `items`, `schedule_entries`, `contest_state`
/// and `schedule_snapshots` tables.
pub struct SqliteOpSink {
    conn: Connection,
}

impl SqliteOpSink {
    /// Opens or creates a database at `path`.
    ///
    /// Enables WAL mode, `synchronous=NORMAL`, and foreign keys.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        info!("opened schedule database at {}", path.as_ref().display());
        Self::init_connection(conn)
    }

    /// Opens an in-memory database.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    /// Rebuilds the in-memory store from the materialized tables.
    pub fn load_store(&self) -> PersistResult<ScheduleStore> {
        let image = StoreImageV1 {
            next_op_seq: self.latest_seq()? + 1,
            items: self.load_items()?,
            entries: self.load_entries()?,
            contest: self.load_contest()?,
            snapshots: self.load_snapshots()?,
        };
        info!(
            "loaded {} items, {} schedule entries, {} snapshots",
            image.items.len(),
            image.entries.len(),
            image.snapshots.len()
        );
        Ok(ScheduleStore::from_image(image)?)
    }

    /// Journaled ops with a sequence above `seq`, oldest first.
    pub fn load_ops_after(&self, seq: OpSeq) -> PersistResult<Vec<StoredOp>> {
        let mut stmt = self
            .conn
            .prepare("SELECT seq, ts_ms, payload FROM journal WHERE seq > ?1 ORDER BY seq ASC")?;
        let rows = stmt
            .query_map(params![seq as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, Vec<u8>>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(row_seq, ts_ms, payload)| {
                let mut stored = decode_stored_op_payload(&payload).map_err(|reason| {
                    PersistError::Message(format!("journal row {row_seq}: {reason}"))
                })?;
                // Index columns are authoritative over the envelope copy.
                stored.seq = row_seq as OpSeq;
                stored.ts_ms = ts_ms as u64;
                Ok(stored)
            })
            .collect()
    }

    /// Returns the latest sequence persisted in the journal.
    pub fn latest_seq(&self) -> PersistResult<OpSeq> {
        let seq: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM journal", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(seq.unwrap_or(0) as OpSeq)
    }

    /// Number of rows in `contest_state`; never more than one.
    pub fn contest_row_count(&self) -> PersistResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM contest_state", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn load_items(&self) -> PersistResult<Vec<Item>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, duration_ms, is_video, created_at, updated_at FROM items ORDER BY name ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let duration_ms: i64 = row.get(2)?;
            Ok(Item {
                id: row.get::<_, String>(0)?.into(),
                name: row.get(1)?,
                duration_ms: duration_ms.max(0) as u64,
                kind: ItemKind::from_is_video(row.get(3)?),
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn load_entries(&self) -> PersistResult<Vec<ScheduleEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_timestamp, item_id FROM schedule_entries ORDER BY position ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ScheduleEntry {
                id: row.get::<_, String>(0)?.into(),
                start_timestamp: row.get(1)?,
                item_id: row.get::<_, String>(2)?.into(),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn load_contest(&self) -> PersistResult<Option<ContestState>> {
        let row: Option<Option<Timestamp>> = self
            .conn
            .query_row(
                "SELECT start_timestamp FROM contest_state WHERE id = ?1",
                params![CONTEST_STATE_ID],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.map(|start_timestamp| ContestState { start_timestamp }))
    }

    fn load_snapshots(&self) -> PersistResult<Vec<ScheduleSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, label, created_at, start_timestamp, payload FROM schedule_snapshots ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let created_at: DateTime<Utc> = row.get(2)?;
            let meta = SnapshotMeta {
                id: row.get::<_, String>(0)?.into(),
                label: row.get(1)?,
                created_at,
                start_timestamp: row.get(3)?,
            };
            Ok(ScheduleSnapshot::new(
                meta,
                SnapshotPayload::from_stored(row.get(4)?),
            ))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl OpSink for SqliteOpSink {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        let Some(last) = ops.last() else {
            return self.latest_seq();
        };

        let tx = self.conn.transaction()?;
        for stored in ops {
            materialize(&tx, &stored.op)?;
            let payload = serde_json::to_vec(&StoredOpEnvelope::new(stored.clone()))?;
            tx.execute(
                "INSERT INTO journal(seq, ts_ms, kind, payload) VALUES (?1, ?2, ?3, ?4)",
                params![
                    stored.seq as i64,
                    stored.ts_ms as i64,
                    stored.op.kind(),
                    payload
                ],
            )?;
        }
        tx.commit()?;
        debug!("committed {} ops through seq {}", ops.len(), last.seq);
        Ok(last.seq)
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }
}

fn materialize(tx: &Transaction<'_>, op: &Op) -> PersistResult<()> {
    match op {
        Op::PutItem { item } => {
            tx.execute(
                "INSERT INTO items(id, name, duration_ms, is_video, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   duration_ms = excluded.duration_ms,
                   is_video = excluded.is_video,
                   updated_at = excluded.updated_at",
                params![
                    item.id.as_str(),
                    item.name,
                    item.duration_ms as i64,
                    item.kind.is_video(),
                    item.created_at,
                    item.updated_at
                ],
            )?;
        }
        Op::DeleteItem { id } => {
            tx.execute(
                "DELETE FROM schedule_entries WHERE item_id = ?1",
                params![id.as_str()],
            )?;
            let n = tx.execute("DELETE FROM items WHERE id = ?1", params![id.as_str()])?;
            if n == 0 {
                return Err(PersistError::Message(format!("delete of missing item {id}")));
            }
        }
        Op::ReplaceSchedule { entries } => write_entries(tx, entries)?,
        Op::SetContestStart { start_timestamp } => write_contest(tx, *start_timestamp)?,
        Op::SaveSnapshot { snapshot } => {
            tx.execute(
                "INSERT INTO schedule_snapshots(id, label, created_at, start_timestamp, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    snapshot.id().as_str(),
                    snapshot.label(),
                    snapshot.created_at(),
                    snapshot.start_timestamp(),
                    snapshot.payload().as_str()
                ],
            )?;
        }
        Op::RestoreSnapshot {
            entries,
            start_timestamp,
            ..
        } => {
            write_entries(tx, entries)?;
            write_contest(tx, Some(*start_timestamp))?;
        }
    }
    Ok(())
}

fn write_entries(tx: &Transaction<'_>, entries: &[ScheduleEntry]) -> PersistResult<()> {
    tx.execute("DELETE FROM schedule_entries", [])?;
    let mut stmt = tx.prepare(
        "INSERT INTO schedule_entries(id, position, start_timestamp, item_id) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (position, entry) in entries.iter().enumerate() {
        stmt.execute(params![
            entry.id.as_str(),
            position as i64,
            entry.start_timestamp,
            entry.item_id.as_str()
        ])?;
    }
    Ok(())
}

fn write_contest(tx: &Transaction<'_>, start_timestamp: Option<Timestamp>) -> PersistResult<()> {
    tx.execute(
        "INSERT INTO contest_state(id, start_timestamp) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET start_timestamp = excluded.start_timestamp",
        params![CONTEST_STATE_ID, start_timestamp],
    )?;
    Ok(())
}

fn decode_stored_op_payload(payload: &[u8]) -> Result<StoredOp, String> {
    let envelope = serde_json::from_slice::<StoredOpEnvelope>(payload)
        .map_err(|e| format!("op payload decode failed: {e}"))?;
    if envelope.format_version != crate::op::OP_FORMAT_VERSION {
        return Err(format!(
            "unsupported op format version: {}",
            envelope.format_version
        ));
    }
    Ok(envelope.stored)
}
