//! Content migration trait.

use thiserror::Error;

use crate::format::FrontmatterFormat;

/// Error raised by a single migration step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    #[error("content is not valid UTF-8")]
    InvalidUtf8,

    #[error("frontmatter could not be located")]
    MissingFrontmatter,

    #[error("failed to parse {format} frontmatter: {reason}")]
    Parse {
        format: FrontmatterFormat,
        reason: String,
    },

    #[error("migrated {format} frontmatter is invalid: {reason}")]
    InvalidOutput {
        format: FrontmatterFormat,
        reason: String,
    },

    #[error("failed to convert frontmatter: {0}")]
    Conversion(String),

    #[error("field {field} not found")]
    FieldNotFound { field: String },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// One stateless content transformation.
///
/// Migrations are registered into a [`ContentPipeline`](crate::ContentPipeline)
/// in an explicit order. The pipeline only calls [`Migration::applies_to`]
/// for content whose sniffed format is in [`Migration::supported_formats`],
/// and only calls [`Migration::apply`] when `applies_to` returned true.
pub trait Migration: Send + Sync {
    /// Stable name used in logs and errors.
    fn name(&self) -> &str;

    /// Formats this migration understands.
    fn supported_formats(&self) -> &[FrontmatterFormat];

    /// Whether `content` needs this migration.
    fn applies_to(&self, content: &[u8]) -> bool;

    /// Transform `content`. Must not be called when `applies_to` is false.
    fn apply(&self, content: &[u8]) -> Result<Vec<u8>, MigrationError>;
}
