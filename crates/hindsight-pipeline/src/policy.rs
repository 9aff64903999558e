//! Policies deciding whether a newly derived standard is persisted.
//!
//! Extraction never asks the user anything itself. An interactive front end
//! supplies a policy that prompts; CI uses [`AlwaysPersist`] or
//! [`NeverPersist`].

use hindsight_config::PersistMode;
use hindsight_types::Standard;

/// Decides whether a candidate standard should be written to the store.
pub trait PersistPolicy: Send + Sync {
    fn should_persist(&self, candidate: &Standard) -> bool;
}

/// Persist every candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPersist;

impl PersistPolicy for AlwaysPersist {
    fn should_persist(&self, _candidate: &Standard) -> bool {
        true
    }
}

/// Persist no candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverPersist;

impl PersistPolicy for NeverPersist {
    fn should_persist(&self, _candidate: &Standard) -> bool {
        false
    }
}

impl<F> PersistPolicy for F
where
    F: Fn(&Standard) -> bool + Send + Sync,
{
    fn should_persist(&self, candidate: &Standard) -> bool {
        self(candidate)
    }
}

/// Policy matching the `[learning] persist` setting.
pub fn policy_for(mode: PersistMode) -> Box<dyn PersistPolicy> {
    match mode {
        PersistMode::Always => Box::new(AlwaysPersist),
        PersistMode::Never => Box::new(NeverPersist),
    }
}
