//! Decision append and query operations.

use hindsight_types::{Decision, Domain};
use rusqlite::{Row, params};
use tracing::debug;

use crate::error::Result;

use super::{KnowledgeStore, format_ts, parse_ts};

impl KnowledgeStore {
    /// Append a decision. No deduplication.
    pub fn insert_decision(&self, decision: &Decision) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO decisions (domain, decision, reasoning, context, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                decision.domain.as_str(),
                decision.decision,
                decision.reasoning,
                decision.context,
                format_ts(&decision.created_at),
            ],
        )?;
        let id = conn.last_insert_rowid();

        debug!(id, domain = %decision.domain, "Inserted decision");
        Ok(id)
    }

    /// Most recent decisions for a domain, newest first.
    pub fn query_decisions(&self, domain: &Domain, limit: usize) -> Result<Vec<Decision>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT domain, decision, reasoning, context, created_at
            FROM decisions
            WHERE domain = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#,
        )?;

        let mut rows = stmt.query(params![domain.as_str(), limit as i64])?;
        let mut decisions = Vec::new();
        while let Some(row) = rows.next()? {
            decisions.push(Self::row_to_decision(row)?);
        }
        Ok(decisions)
    }

    fn row_to_decision(row: &Row<'_>) -> Result<Decision> {
        let domain: String = row.get(0)?;
        let created_at: String = row.get(4)?;
        Ok(Decision {
            domain: Domain::from(domain),
            decision: row.get(1)?,
            reasoning: row.get(2)?,
            context: row.get(3)?,
            created_at: parse_ts(&created_at)?,
        })
    }
}
