//! Persistent knowledge store for hindsight.
//!
//! Holds what pipeline runs have learned about a project, across sessions:
//! - **Decisions**: architectural choices and their reasoning (append-only)
//! - **Standards**: enforceable rules, unique per `(domain, rule)`
//! - **Task history**: request, outcome and files touched per run (append-only)
//! - **Events**: audit log of executions and gate results (append-only)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  KnowledgeStore                                                     │
//! │  - Single SQLite file, WAL mode, bounded busy timeout               │
//! │  - decisions / standards / task_history / events / meta tables      │
//! │  - standards: UNIQUE(domain, rule) + ON CONFLICT DO NOTHING         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use hindsight_knowledge::KnowledgeStore;
//! use hindsight_types::{Domain, Standard};
//!
//! let store = KnowledgeStore::open(".hindsight/knowledge.db")?;
//! store.upsert_standard(&Standard::new(
//!     Domain::Web,
//!     "styling",
//!     "no_inline_styles",
//!     "Inline styles bypass the design system",
//! ))?;
//! let rules = store.query_standards(&Domain::Web)?;
//! # Ok::<(), hindsight_knowledge::PersistenceError>(())
//! ```

pub mod backend;
pub mod error;
pub mod keywords;
pub mod store;

pub use backend::KnowledgeBackend;
pub use error::{PersistenceError, Result};
pub use keywords::extract_keywords;
pub use store::{DEFAULT_BUSY_TIMEOUT, KnowledgeStats, KnowledgeStore, StandardId, UpsertOutcome};
