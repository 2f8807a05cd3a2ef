//! Migration catalog
//!
//! Collects migration steps from a script directory and the procedural
//! step registry, validates them and merges them into one version-ordered
//! sequence with next/previous links. Script parsing is lazy; the catalog
//! only records sources, the executor parses them at run time.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::definitions::{Migration, MigrationKind};
use super::registry::Registry;
use crate::error::{MigrateError, MigrateResult};

/// Version-ordered sequence of migration steps for one service
#[derive(Debug, Default)]
pub struct Catalog {
    migrations: Vec<Migration>,
}

impl Catalog {
    /// Collect every migration for a service from the script directory and
    /// the registry
    pub fn collect(service: &str, dir: &Path, registry: &Registry) -> MigrateResult<Self> {
        Self::collect_range(service, dir, registry, 0, i64::MAX)
    }

    /// Collect migrations, trimmed to the inclusive `[min, max]` version
    /// range. Links are assigned over the full catalog before trimming, so
    /// link integrity reflects the complete set.
    pub fn collect_range(
        service: &str,
        dir: &Path,
        registry: &Registry,
        min: i64,
        max: i64,
    ) -> MigrateResult<Self> {
        let mut by_version: HashMap<i64, Migration> = HashMap::new();

        for path in script_sources(dir)? {
            let version = numeric_component(&path)?;
            let kind = match path.extension().and_then(|e| e.to_str()) {
                Some("sql") => MigrationKind::Script,
                _ => MigrationKind::Procedural,
            };

            if by_version.contains_key(&version) {
                return Err(MigrateError::DuplicateVersion {
                    service: service.to_string(),
                    version,
                });
            }

            let migration = match kind {
                MigrationKind::Script => {
                    // A version claimed by both a script file and a
                    // registration is a conflict.
                    if registry.get(service, version).is_some() {
                        return Err(MigrateError::DuplicateVersion {
                            service: service.to_string(),
                            version,
                        });
                    }
                    Migration {
                        service: service.to_string(),
                        version,
                        next: None,
                        previous: None,
                        source: path.to_string_lossy().into_owned(),
                        kind,
                        registered: false,
                        up_fn: None,
                        down_fn: None,
                    }
                }
                MigrationKind::Procedural => {
                    // Source markers resolve to their registration when one
                    // exists; an unlinked marker only fails when invoked.
                    let step = registry.get(service, version);
                    Migration {
                        service: service.to_string(),
                        version,
                        next: None,
                        previous: None,
                        source: path.to_string_lossy().into_owned(),
                        kind,
                        registered: step.is_some(),
                        up_fn: step.and_then(|s| s.up_fn.clone()),
                        down_fn: step.and_then(|s| s.down_fn.clone()),
                    }
                }
            };
            by_version.insert(version, migration);
        }

        // Registered steps with no source marker still join the catalog.
        for (version, step) in registry.steps_for(service) {
            if by_version.contains_key(&version) {
                continue;
            }
            by_version.insert(
                version,
                Migration {
                    service: service.to_string(),
                    version,
                    next: None,
                    previous: None,
                    source: step.name.clone(),
                    kind: MigrationKind::Procedural,
                    registered: true,
                    up_fn: step.up_fn.clone(),
                    down_fn: step.down_fn.clone(),
                },
            );
        }

        let mut migrations: Vec<Migration> = by_version.into_values().collect();
        migrations.sort_by_key(|m| m.version);

        for i in 0..migrations.len() {
            migrations[i].previous = i.checked_sub(1).map(|p| migrations[p].version);
            migrations[i].next = migrations.get(i + 1).map(|n| n.version);
        }

        migrations.retain(|m| m.version >= min && m.version <= max);

        Ok(Self { migrations })
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// The step whose version equals `version`
    pub fn current(&self, version: i64) -> MigrateResult<&Migration> {
        self.migrations
            .iter()
            .find(|m| m.version == version)
            .ok_or(MigrateError::NoSuchVersion(version))
    }

    /// The lowest-versioned step strictly above `version`
    pub fn next_after(&self, version: i64) -> Option<&Migration> {
        self.migrations.iter().find(|m| m.version > version)
    }
}

/// Enumerate recognized migration sources in a directory
fn script_sources(dir: &Path) -> MigrateResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| MigrateError::SourceUnavailable {
        name: dir.to_string_lossy().into_owned(),
        cause: e.to_string(),
    })?;

    let mut sources = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MigrateError::SourceUnavailable {
            name: dir.to_string_lossy().into_owned(),
            cause: e.to_string(),
        })?;
        let path = entry.path();
        let recognized = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |ext| ext == "sql" || ext == "rs");
        if recognized {
            sources.push(path);
        }
    }
    Ok(sources)
}

/// Parse the numeric version from a migration file name of the form
/// `<version>_<description>.<ext>`
fn numeric_component(path: &Path) -> MigrateResult<i64> {
    let base = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let invalid = |reason: &str| MigrateError::InvalidMigrationName {
        name: base.clone(),
        reason: reason.to_string(),
    };

    let idx = base.find('_').ok_or_else(|| invalid("no separator found"))?;
    let version: i64 = base[..idx]
        .parse()
        .map_err(|_| invalid("version prefix is not a number"))?;
    if version <= 0 {
        return Err(invalid("migration versions must be greater than zero"));
    }
    Ok(version)
}
