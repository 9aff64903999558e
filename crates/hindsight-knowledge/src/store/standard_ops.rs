//! Standard upsert-by-rule and query operations.

use hindsight_types::{Domain, EnforcementLevel, Standard};
use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

use crate::error::{PersistenceError, Result};

use super::query::{StandardId, UpsertOutcome};
use super::{KnowledgeStore, format_ts, parse_ts};

impl KnowledgeStore {
    /// Insert a standard unless one already exists for `(domain, rule)`.
    ///
    /// The first write wins: a later call with a different rationale,
    /// category or examples leaves the stored record unchanged. The check and
    /// insert run as one statement against the unique constraint, so
    /// concurrent writers cannot both insert.
    pub fn upsert_standard(&self, standard: &Standard) -> Result<UpsertOutcome> {
        let examples = serde_json::to_string(&standard.examples)?;

        self.with_transaction(|conn| {
            let inserted = conn.execute(
                r#"
                INSERT INTO standards
                    (domain, category, rule, rationale, examples, enforcement_level, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (domain, rule) DO NOTHING
                "#,
                params![
                    standard.domain.as_str(),
                    standard.category,
                    standard.rule,
                    standard.rationale,
                    examples,
                    standard.enforcement_level.as_str(),
                    format_ts(&standard.created_at),
                ],
            )?;

            if inserted == 1 {
                let id = conn.last_insert_rowid();
                debug!(id, domain = %standard.domain, rule = %standard.rule, "Inserted standard");
                return Ok(UpsertOutcome::Inserted(id));
            }

            let id: StandardId = conn
                .query_row(
                    "SELECT id FROM standards WHERE domain = ?1 AND rule = ?2",
                    params![standard.domain.as_str(), standard.rule],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| {
                    PersistenceError::InvalidData(format!(
                        "standard '{}' conflicted but no row exists",
                        standard.rule
                    ))
                })?;
            debug!(id, domain = %standard.domain, rule = %standard.rule, "Standard already known");
            Ok(UpsertOutcome::Existing(id))
        })
    }

    /// All standards for a domain, oldest first.
    pub fn query_standards(&self, domain: &Domain) -> Result<Vec<Standard>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT domain, category, rule, rationale, examples, enforcement_level, created_at
            FROM standards
            WHERE domain = ?1
            ORDER BY created_at ASC, id ASC
            "#,
        )?;

        let mut rows = stmt.query(params![domain.as_str()])?;
        let mut standards = Vec::new();
        while let Some(row) = rows.next()? {
            standards.push(Self::row_to_standard(row)?);
        }
        Ok(standards)
    }

    /// Look up the standard stored for `(domain, rule)`.
    pub fn get_standard(&self, domain: &Domain, rule: &str) -> Result<Option<Standard>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT domain, category, rule, rationale, examples, enforcement_level, created_at
            FROM standards
            WHERE domain = ?1 AND rule = ?2
            "#,
        )?;

        let mut rows = stmt.query(params![domain.as_str(), rule])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_standard(row)?)),
            None => Ok(None),
        }
    }

    fn row_to_standard(row: &Row<'_>) -> Result<Standard> {
        let domain: String = row.get(0)?;
        let examples: String = row.get(4)?;
        let level: String = row.get(5)?;
        let created_at: String = row.get(6)?;
        Ok(Standard {
            domain: Domain::from(domain),
            category: row.get(1)?,
            rule: row.get(2)?,
            rationale: row.get(3)?,
            examples: serde_json::from_str(&examples)?,
            enforcement_level: EnforcementLevel::parse(&level),
            created_at: parse_ts(&created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hindsight_types::StandardExample;

    #[test]
    fn test_first_write_wins() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let first = Standard::new(Domain::Web, "styling", "no_inline_styles", "Use CSS modules");
        let second = Standard::new(Domain::Web, "css", "no_inline_styles", "Different reason")
            .with_enforcement(EnforcementLevel::Required);

        let a = store.upsert_standard(&first).unwrap();
        let b = store.upsert_standard(&second).unwrap();
        assert!(a.is_inserted());
        assert_eq!(b, UpsertOutcome::Existing(a.id()));

        let stored = store.query_standards(&Domain::Web).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].rationale, "Use CSS modules");
        assert_eq!(stored[0].category, "styling");
        assert_eq!(stored[0].enforcement_level, EnforcementLevel::Recommended);
    }

    #[test]
    fn test_same_rule_in_other_domain_is_distinct() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store
            .upsert_standard(&Standard::new(Domain::Web, "c", "rule", "r"))
            .unwrap();
        let other = store
            .upsert_standard(&Standard::new(Domain::Mobile, "c", "rule", "r"))
            .unwrap();
        assert!(other.is_inserted());
        assert_eq!(store.stats().unwrap().standard_count, 2);
    }

    #[test]
    fn test_standard_roundtrip_with_examples() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let s = Standard::new(Domain::Web, "a11y", "img_alt_required", "Screen readers")
            .with_example(StandardExample {
                offending: Some("<img src=x>".into()),
                fixed: Some("<img src=x alt=\"\">".into()),
            })
            .with_enforcement(EnforcementLevel::Required);
        store.upsert_standard(&s).unwrap();

        assert_eq!(
            store.get_standard(&Domain::Web, "img_alt_required").unwrap(),
            Some(s)
        );
        assert!(store.get_standard(&Domain::Web, "missing").unwrap().is_none());
    }
}
