//! Ordered content migration pipeline.

use thiserror::Error;
use tracing::{debug, warn};

use crate::format::FrontmatterFormat;
use crate::migration::{Migration, MigrationError};
use crate::migrations::{
    DottedKeyToTableMigration, IdentifierReferenceMigration, TableSpacingMigration,
    YamlToTomlMigration,
};

/// A pipeline step failed. The pipeline was aborted and `original` holds the
/// exact bytes it was given.
#[derive(Debug, Error)]
#[error("migration {migration} failed: {source}")]
pub struct PipelineError {
    pub migration: String,
    #[source]
    pub source: MigrationError,
    pub original: Vec<u8>,
}

impl PipelineError {
    /// The unmodified input content.
    pub fn into_original(self) -> Vec<u8> {
        self.original
    }
}

impl From<PipelineError> for pagekey_core::Error {
    fn from(e: PipelineError) -> Self {
        pagekey_core::Error::Migration(e.to_string())
    }
}

/// Runs an explicit, ordered list of migrations over one document.
pub struct ContentPipeline {
    migrations: Vec<Box<dyn Migration>>,
}

impl ContentPipeline {
    /// Build a pipeline from migrations in the order they should run.
    pub fn new(migrations: Vec<Box<dyn Migration>>) -> Self {
        Self { migrations }
    }

    /// Read-path default: merge dotted keys into tables, then normalize
    /// table spacing. Spacing runs last so earlier structural edits cannot
    /// reintroduce spacing violations.
    pub fn rolling() -> Self {
        Self::new(vec![
            Box::new(DottedKeyToTableMigration),
            Box::new(TableSpacingMigration),
        ])
    }

    /// Convert YAML frontmatter to TOML, then run the rolling set.
    pub fn format_upgrade() -> Self {
        Self::new(vec![
            Box::new(YamlToTomlMigration),
            Box::new(DottedKeyToTableMigration),
            Box::new(TableSpacingMigration),
        ])
    }

    /// Rewrite identifier-valued fields to their canonical form.
    pub fn identifier_fixes() -> Self {
        Self::new(vec![
            Box::new(IdentifierReferenceMigration::page_identifier()),
            Box::new(IdentifierReferenceMigration::inventory_container()),
            Box::new(TableSpacingMigration),
        ])
    }

    /// Names of the registered migrations, in run order.
    pub fn migration_names(&self) -> Vec<&str> {
        self.migrations.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Apply every applicable migration in registration order.
    ///
    /// Content with an unknown format, or too short to sniff, is returned
    /// unchanged. The format is re-sniffed before each step so a format
    /// conversion hands off to migrations of the new format.
    pub fn apply_migrations(&self, content: &[u8]) -> Result<Vec<u8>, PipelineError> {
        if FrontmatterFormat::detect(content) == FrontmatterFormat::Unknown {
            return Ok(content.to_vec());
        }

        let mut current = content.to_vec();
        for migration in &self.migrations {
            let format = FrontmatterFormat::detect(&current);
            if !migration.supported_formats().contains(&format) {
                continue;
            }
            if !migration.applies_to(&current) {
                continue;
            }

            match migration.apply(&current) {
                Ok(next) => {
                    debug!(
                        migration = migration.name(),
                        %format,
                        before = current.len(),
                        after = next.len(),
                        "Applied content migration"
                    );
                    current = next;
                }
                Err(source) => {
                    warn!(
                        migration = migration.name(),
                        %format,
                        error = %source,
                        "Content migration failed, keeping original content"
                    );
                    return Err(PipelineError {
                        migration: migration.name().to_string(),
                        source,
                        original: content.to_vec(),
                    });
                }
            }
        }
        Ok(current)
    }
}

impl Default for ContentPipeline {
    fn default() -> Self {
        Self::rolling()
    }
}
