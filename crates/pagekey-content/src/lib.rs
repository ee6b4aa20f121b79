//! # pagekey-content
//!
//! Rolling content migrations for stored pages.
//!
//! Every page read hands its raw bytes to a [`ContentPipeline`]. The
//! pipeline sniffs the frontmatter format, runs each registered
//! [`Migration`] that supports that format and applies to the content, and
//! returns the migrated bytes. If any step fails the whole pipeline aborts
//! and the caller gets the original bytes back inside the error, so a page
//! is never left half-migrated.
//!
//! ## Example
//!
//! ```
//! use pagekey_content::ContentPipeline;
//!
//! let pipeline = ContentPipeline::rolling();
//! let content = b"+++\ninventory.container = \"box\"\n+++\nbody\n";
//! let migrated = pipeline.apply_migrations(content).unwrap();
//! assert_eq!(
//!     String::from_utf8(migrated).unwrap(),
//!     "+++\n[inventory]\ncontainer = \"box\"\n+++\nbody\n"
//! );
//! ```

pub mod fields;
pub mod format;
pub mod migration;
pub mod migrations;
pub mod pipeline;
mod toml_lines;

pub use fields::string_field;
pub use format::{split_frontmatter, FrontmatterFormat, FrontmatterSplit};
pub use migration::{Migration, MigrationError};
pub use migrations::{
    DottedKeyToTableMigration, IdentifierReferenceMigration, TableSpacingMigration,
    YamlToTomlMigration,
};
pub use pipeline::{ContentPipeline, PipelineError};
