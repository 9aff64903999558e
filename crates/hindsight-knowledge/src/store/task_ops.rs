//! Task history append and similarity query operations.

use std::cmp::Reverse;

use hindsight_types::{Domain, Outcome, TaskHistoryEntry};
use rusqlite::{Row, params_from_iter};
use tracing::debug;

use crate::error::{PersistenceError, Result};

use super::{KnowledgeStore, escape_like, format_ts, parse_ts};

impl KnowledgeStore {
    /// Append a task history entry. No deduplication.
    pub fn insert_task_history(&self, entry: &TaskHistoryEntry) -> Result<i64> {
        let learnings = serde_json::to_string(&entry.learnings)?;
        let files = serde_json::to_string(&entry.files_modified)?;

        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO task_history
                (domain, task_description, outcome, learnings, files_modified, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            rusqlite::params![
                entry.domain.as_str(),
                entry.task_description,
                entry.outcome.as_str(),
                learnings,
                files,
                format_ts(&entry.created_at),
            ],
        )?;
        let id = conn.last_insert_rowid();

        debug!(id, domain = %entry.domain, outcome = entry.outcome.as_str(), "Inserted task history");
        Ok(id)
    }

    /// Past tasks in `domain` whose description contains any of `keywords`.
    ///
    /// Matching is case-insensitive substring matching, not semantic search.
    /// Results are ranked by how many keywords matched, then by recency.
    /// An empty keyword list matches nothing.
    ///
    /// SQLite's `lower()` folds ASCII only, so `LIKE` narrows candidates just
    /// for ASCII keywords. With any non-ASCII keyword every task in the domain
    /// is scored in Rust instead.
    pub fn query_similar_tasks(
        &self,
        domain: &Domain,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<TaskHistoryEntry>> {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut bind: Vec<String> = Vec::with_capacity(keywords.len() + 1);
        bind.push(domain.as_str().to_string());

        let prefilter = keywords.iter().all(|k| k.is_ascii());
        let clauses = if prefilter {
            bind.extend(keywords.iter().map(|k| format!("%{}%", escape_like(k))));
            let likes = (0..keywords.len())
                .map(|i| format!("lower(task_description) LIKE ?{} ESCAPE '\\'", i + 2))
                .collect::<Vec<_>>()
                .join(" OR ");
            format!("AND ({likes})")
        } else {
            String::new()
        };
        let sql = format!(
            r#"
            SELECT domain, task_description, outcome, learnings, files_modified, created_at
            FROM task_history
            WHERE domain = ?1 {clauses}
            "#
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind.iter()))?;

        let mut candidates = Vec::new();
        while let Some(row) = rows.next()? {
            let entry = Self::row_to_task(row)?;
            let description = entry.task_description.to_lowercase();
            let score = keywords.iter().filter(|k| description.contains(k.as_str())).count();
            if score > 0 {
                candidates.push((score, entry));
            }
        }

        candidates.sort_by_key(|(score, entry)| (Reverse(*score), Reverse(entry.created_at)));
        candidates.truncate(limit);
        Ok(candidates.into_iter().map(|(_, e)| e).collect())
    }

    /// Most recent task history entries for a domain.
    pub fn recent_tasks(&self, domain: &Domain, limit: usize) -> Result<Vec<TaskHistoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT domain, task_description, outcome, learnings, files_modified, created_at
            FROM task_history
            WHERE domain = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#,
        )?;
        let mut rows = stmt.query(rusqlite::params![domain.as_str(), limit as i64])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(Self::row_to_task(row)?);
        }
        Ok(tasks)
    }

    fn row_to_task(row: &Row<'_>) -> Result<TaskHistoryEntry> {
        let domain: String = row.get(0)?;
        let outcome: String = row.get(2)?;
        let learnings: String = row.get(3)?;
        let files: String = row.get(4)?;
        let created_at: String = row.get(5)?;
        Ok(TaskHistoryEntry {
            domain: Domain::from(domain),
            task_description: row.get(1)?,
            outcome: Outcome::parse(&outcome)
                .ok_or_else(|| PersistenceError::InvalidData(format!("unknown outcome '{outcome}'")))?,
            learnings: serde_json::from_str(&learnings)?,
            files_modified: serde_json::from_str(&files)?,
            created_at: parse_ts(&created_at)?,
        })
    }
}
