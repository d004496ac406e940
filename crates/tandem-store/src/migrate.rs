//! Ordered, run-once migrations.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::error::StoreError;
use crate::storage::Storage;

/// Key holding the highest applied migration version.
pub const SCHEMA_VERSION_KEY: &str = "__tandem:schema_version";

type Apply = Arc<dyn Fn(Arc<dyn Storage>) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// One schema step.
#[derive(Clone)]
pub struct Migration {
    version: u64,
    name: String,
    apply: Apply,
}

impl Migration {
    /// A migration at `version`. Versions start at 1.
    pub fn new<F, Fut, E>(version: u64, name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(Arc<dyn Storage>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display,
    {
        Self {
            version,
            name: name.into(),
            apply: Arc::new(move |storage| {
                apply(storage)
                    .map(|result| result.map_err(|e| e.to_string()))
                    .boxed()
            }),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Versions applied by this run, in order.
    pub applied: Vec<u64>,
    /// Schema version after the run.
    pub version: u64,
}

/// Applies migrations in declaration order, each exactly once.
///
/// The highest applied version is stored under [`SCHEMA_VERSION_KEY`]
/// after every successful step, so a failed run resumes at the failing
/// migration and a completed one is a no-op on the next start.
#[derive(Debug, Clone)]
pub struct Migrator {
    migrations: Vec<Migration>,
}

impl Migrator {
    /// Validate the list: versions must be positive and strictly increasing.
    pub fn new(migrations: Vec<Migration>) -> Result<Self, StoreError> {
        let mut last = 0;
        for migration in &migrations {
            if migration.version <= last {
                return Err(StoreError::InvalidMigrations(format!(
                    "version {} ({}) does not follow {}",
                    migration.version, migration.name, last
                )));
            }
            last = migration.version;
        }
        Ok(Self { migrations })
    }

    /// Highest declared version.
    pub fn latest(&self) -> u64 {
        self.migrations.last().map_or(0, |m| m.version)
    }

    /// Version currently recorded in `storage`.
    pub async fn current_version(storage: &dyn Storage) -> Result<u64, StoreError> {
        match storage.get(SCHEMA_VERSION_KEY).await? {
            None => Ok(0),
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| StoreError::Backend(format!("bad schema version {}", n))),
            Some(other) => Err(StoreError::Backend(format!("bad schema version {}", other))),
        }
    }

    /// Apply every migration newer than the recorded version.
    pub async fn run(&self, storage: Arc<dyn Storage>) -> Result<MigrationReport, StoreError> {
        let recorded = Self::current_version(storage.as_ref()).await?;
        let mut report = MigrationReport {
            applied: Vec::new(),
            version: recorded,
        };

        for migration in self.migrations.iter().filter(|m| m.version > recorded) {
            tracing::info!(
                version = migration.version,
                name = %migration.name,
                "applying migration"
            );
            (migration.apply)(Arc::clone(&storage))
                .await
                .map_err(|message| StoreError::Migration {
                    version: migration.version,
                    name: migration.name.clone(),
                    message,
                })?;
            storage
                .set(SCHEMA_VERSION_KEY, Value::from(migration.version))
                .await?;
            report.applied.push(migration.version);
            report.version = migration.version;
        }

        if report.applied.is_empty() {
            tracing::debug!(version = report.version, "schema up to date");
        }
        Ok(report)
    }
}
