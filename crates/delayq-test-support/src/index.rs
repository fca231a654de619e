//! In-memory `EventIndex` implementations for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use delayq_core::error::{QueueError, Result};
use delayq_core::event::{EventId, IndexRow, NewIndexRecord};
use delayq_core::query::{IndexQuery, Order};
use delayq_core::queue_type::QueueType;
use delayq_core::repository::EventIndex;

#[derive(Debug, Clone, Copy)]
struct Row {
    surrogate_id: i64,
    queue_type: QueueType,
    event_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Table {
    next_surrogate_id: i64,
    rows: HashMap<EventId, Row>,
}

#[derive(Debug)]
enum Undo {
    Inserted(EventId),
    Deleted(EventId, Row),
}

/// The shared table behind one or more [`InMemoryEventIndex`] sessions.
///
/// Each session applies its writes to the table immediately and keeps an undo
/// log until it commits, so uncommitted writes are visible to other sessions.
/// Deletes are atomic under the table lock, which is enough to model the
/// delete-and-report-existence claim.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIndexTable {
    table: Arc<Mutex<Table>>,
}

impl InMemoryIndexTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new session (connection) on this table.
    #[must_use]
    pub fn session(&self) -> InMemoryEventIndex {
        InMemoryEventIndex {
            table: self.clone(),
            undo: Mutex::new(Vec::new()),
            commits: Mutex::new(0),
        }
    }

    /// Inserts a row directly, bypassing any session. Useful for seeding
    /// integrity failures (an index row with no payload).
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert_committed(&self, record: &NewIndexRecord) {
        let mut table = self.table.lock().unwrap();
        insert_row(&mut table, record);
    }

    /// Returns true if a row exists for `event_id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn contains(&self, event_id: EventId) -> bool {
        self.table.lock().unwrap().rows.contains_key(&event_id)
    }

    /// Total number of rows across all queue types.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().unwrap().rows.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All rows of one queue type as `(event_id, event_at)`, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn rows(&self, queue_type: QueueType) -> Vec<(EventId, DateTime<Utc>)> {
        let table = self.table.lock().unwrap();
        let mut rows: Vec<_> = table
            .rows
            .iter()
            .filter(|(_, row)| row.queue_type == queue_type)
            .map(|(id, row)| (*id, row.event_at, row.surrogate_id))
            .collect();
        rows.sort_by_key(|(_, event_at, surrogate_id)| (*event_at, *surrogate_id));
        rows.into_iter().map(|(id, at, _)| (id, at)).collect()
    }
}

fn insert_row(table: &mut Table, record: &NewIndexRecord) {
    table.next_surrogate_id += 1;
    let row = Row {
        surrogate_id: table.next_surrogate_id,
        queue_type: record.queue_type,
        event_at: record.event_at,
    };
    table.rows.insert(record.event_id, row);
}

/// A session on an [`InMemoryIndexTable`].
#[derive(Debug)]
pub struct InMemoryEventIndex {
    table: InMemoryIndexTable,
    undo: Mutex<Vec<Undo>>,
    commits: Mutex<usize>,
}

impl InMemoryEventIndex {
    /// Number of `commit` calls that had pending writes to finalize.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        *self.commits.lock().unwrap()
    }

    /// Number of writes waiting for `commit` or `rollback`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.undo.lock().unwrap().len()
    }
}

#[async_trait]
impl EventIndex for InMemoryEventIndex {
    async fn insert(&self, record: &NewIndexRecord) -> Result<()> {
        let mut table = self.table.table.lock().unwrap();
        if table.rows.contains_key(&record.event_id) {
            return Err(QueueError::Infrastructure(format!(
                "duplicate key value violates unique constraint: {}",
                record.event_id
            )));
        }
        insert_row(&mut table, record);
        self.undo
            .lock()
            .unwrap()
            .push(Undo::Inserted(record.event_id));
        Ok(())
    }

    async fn select(&self, query: &IndexQuery) -> Result<Vec<IndexRow>> {
        let table = self.table.table.lock().unwrap();
        let mut rows: Vec<(i64, IndexRow)> = table
            .rows
            .iter()
            .filter(|(_, row)| row.queue_type == query.queue_type && query.matches(row.event_at))
            .map(|(event_id, row)| {
                (
                    row.surrogate_id,
                    IndexRow {
                        event_id: *event_id,
                        event_at: row.event_at,
                    },
                )
            })
            .collect();
        rows.sort_by_key(|(surrogate_id, row)| (row.event_at, *surrogate_id));
        if query.order == Order::Desc {
            rows.reverse();
        }
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        Ok(rows.into_iter().take(limit).map(|(_, row)| row).collect())
    }

    async fn queue_type_of(&self, event_id: EventId) -> Result<Option<QueueType>> {
        let table = self.table.table.lock().unwrap();
        Ok(table.rows.get(&event_id).map(|row| row.queue_type))
    }

    async fn delete(&self, event_id: EventId) -> Result<bool> {
        let mut table = self.table.table.lock().unwrap();
        match table.rows.remove(&event_id) {
            Some(row) => {
                self.undo.lock().unwrap().push(Undo::Deleted(event_id, row));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn commit(&self) -> Result<()> {
        let mut undo = self.undo.lock().unwrap();
        if !undo.is_empty() {
            undo.clear();
            *self.commits.lock().unwrap() += 1;
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut undo = std::mem::take(&mut *self.undo.lock().unwrap());
        let mut table = self.table.table.lock().unwrap();
        while let Some(entry) = undo.pop() {
            match entry {
                Undo::Inserted(event_id) => {
                    table.rows.remove(&event_id);
                }
                Undo::Deleted(event_id, row) => {
                    table.rows.insert(event_id, row);
                }
            }
        }
        Ok(())
    }
}

/// An event index that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventIndex;

#[async_trait]
impl EventIndex for FailingEventIndex {
    async fn insert(&self, _record: &NewIndexRecord) -> Result<()> {
        Err(QueueError::Infrastructure("connection refused".into()))
    }

    async fn select(&self, _query: &IndexQuery) -> Result<Vec<IndexRow>> {
        Err(QueueError::Infrastructure("connection refused".into()))
    }

    async fn queue_type_of(&self, _event_id: EventId) -> Result<Option<QueueType>> {
        Err(QueueError::Infrastructure("connection refused".into()))
    }

    async fn delete(&self, _event_id: EventId) -> Result<bool> {
        Err(QueueError::Infrastructure("connection refused".into()))
    }

    async fn commit(&self) -> Result<()> {
        Err(QueueError::Infrastructure("connection refused".into()))
    }

    async fn rollback(&self) -> Result<()> {
        Ok(())
    }
}
