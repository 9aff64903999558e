//! Event audit log operations.

use hindsight_types::{Domain, Event};
use rusqlite::{Row, params};
use tracing::debug;

use crate::error::Result;

use super::{KnowledgeStore, format_ts, parse_ts};

impl KnowledgeStore {
    /// Append an event to the audit log.
    pub fn insert_event(&self, event: &Event) -> Result<i64> {
        let data = serde_json::to_string(&event.data)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO events (type, domain, data, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                event.kind,
                event.domain.as_str(),
                data,
                format_ts(&event.created_at),
            ],
        )?;
        let id = conn.last_insert_rowid();

        debug!(id, kind = %event.kind, domain = %event.domain, "Inserted event");
        Ok(id)
    }

    /// Most recent events, optionally filtered by domain and type.
    pub fn query_events(
        &self,
        domain: Option<&Domain>,
        kind: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT type, domain, data, created_at
            FROM events
            WHERE (?1 IS NULL OR domain = ?1)
              AND (?2 IS NULL OR type = ?2)
            ORDER BY created_at DESC, id DESC
            LIMIT ?3
            "#,
        )?;

        let mut rows = stmt.query(params![domain.map(|d| d.as_str()), kind, limit as i64])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(Self::row_to_event(row)?);
        }
        Ok(events)
    }

    fn row_to_event(row: &Row<'_>) -> Result<Event> {
        let domain: String = row.get(1)?;
        let data: String = row.get(2)?;
        let created_at: String = row.get(3)?;
        Ok(Event {
            kind: row.get(0)?,
            domain: Domain::from(domain),
            data: serde_json::from_str(&data)?,
            created_at: parse_ts(&created_at)?,
        })
    }
}
