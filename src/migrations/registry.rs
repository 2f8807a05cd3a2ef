//! Procedural step registry
//!
//! Compiled migration steps are linked into the embedding binary and
//! registered here during program startup, before the catalog is built.
//! The registry is an explicit object the embedder owns; there is no
//! process-wide registration state.

use std::collections::HashMap;

use super::definitions::MigrationFn;
use crate::error::{MigrateError, MigrateResult};

/// One registered procedural step
#[derive(Clone)]
pub struct ProceduralStep {
    /// Registration name, shown in logs and status output
    pub name: String,
    /// Forward action; `None` is a legal no-op
    pub up_fn: Option<MigrationFn>,
    /// Reverse action; `None` is a legal no-op
    pub down_fn: Option<MigrationFn>,
}

/// Registry of procedural steps keyed by `(service, version)`
#[derive(Default)]
pub struct Registry {
    steps: HashMap<(String, i64), ProceduralStep>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled step. Re-registering the same
    /// `(service, version)` is a startup-time error.
    pub fn register(
        &mut self,
        service: &str,
        version: i64,
        name: &str,
        up_fn: Option<MigrationFn>,
        down_fn: Option<MigrationFn>,
    ) -> MigrateResult<()> {
        if version <= 0 {
            return Err(MigrateError::InvalidMigrationName {
                name: name.to_string(),
                reason: "migration versions must be greater than zero".to_string(),
            });
        }
        let key = (service.to_string(), version);
        if self.steps.contains_key(&key) {
            return Err(MigrateError::DuplicateVersion {
                service: service.to_string(),
                version,
            });
        }
        self.steps.insert(
            key,
            ProceduralStep {
                name: name.to_string(),
                up_fn,
                down_fn,
            },
        );
        Ok(())
    }

    pub fn get(&self, service: &str, version: i64) -> Option<&ProceduralStep> {
        self.steps.get(&(service.to_string(), version))
    }

    /// All registered steps for one service
    pub fn steps_for(&self, service: &str) -> Vec<(i64, &ProceduralStep)> {
        self.steps
            .iter()
            .filter(|((s, _), _)| s == service)
            .map(|((_, version), step)| (*version, step))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
