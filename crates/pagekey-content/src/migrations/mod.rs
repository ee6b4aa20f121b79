//! Built-in content migrations.
//!
//! Each migration is a small stateless type implementing
//! [`Migration`](crate::Migration). Pipelines are assembled from them
//! explicitly; see [`ContentPipeline`](crate::ContentPipeline).

mod dotted_keys;
mod identifier_reference;
mod table_spacing;
mod yaml_to_toml;

pub use dotted_keys::DottedKeyToTableMigration;
pub use identifier_reference::IdentifierReferenceMigration;
pub use table_spacing::TableSpacingMigration;
pub use yaml_to_toml::YamlToTomlMigration;

use crate::format::{split_frontmatter, FrontmatterSplit};
use crate::migration::MigrationError;

/// Borrow `content` as UTF-8 and split off its frontmatter.
fn split(content: &[u8]) -> Result<FrontmatterSplit<'_>, MigrationError> {
    let text = std::str::from_utf8(content).map_err(|_| MigrationError::InvalidUtf8)?;
    split_frontmatter(text).ok_or(MigrationError::MissingFrontmatter)
}

/// Reassemble a document with new frontmatter, keeping fences and body.
fn reassemble(split: &FrontmatterSplit<'_>, frontmatter: &str) -> Vec<u8> {
    let mut out = String::with_capacity(
        split.open.len() + frontmatter.len() + split.close.len() + split.body.len(),
    );
    out.push_str(split.open);
    out.push_str(frontmatter);
    out.push_str(split.close);
    out.push_str(split.body);
    out.into_bytes()
}
