//! Blank-line-before-table spacing.

use crate::format::FrontmatterFormat;
use crate::migration::{Migration, MigrationError};
use crate::toml_lines::statements;

use super::{reassemble, split};

/// Puts exactly one blank line before every TOML table header, except a
/// header that is the first non-blank line of the frontmatter.
///
/// Runs last in every pipeline, after structural rewrites have settled.
#[derive(Debug, Default, Clone, Copy)]
pub struct TableSpacingMigration;

impl Migration for TableSpacingMigration {
    fn name(&self) -> &str {
        "table_spacing"
    }

    fn supported_formats(&self) -> &[FrontmatterFormat] {
        &[FrontmatterFormat::Toml]
    }

    fn applies_to(&self, content: &[u8]) -> bool {
        split(content)
            .map(|s| respace(s.frontmatter) != s.frontmatter)
            .unwrap_or(false)
    }

    fn apply(&self, content: &[u8]) -> Result<Vec<u8>, MigrationError> {
        let split = split(content)?;
        let frontmatter = respace(split.frontmatter);
        Ok(reassemble(&split, &frontmatter))
    }
}

fn respace(frontmatter: &str) -> String {
    let mut out = String::with_capacity(frontmatter.len() + 8);
    let mut blanks: Vec<&str> = Vec::new();
    let mut seen_content = false;

    for stmt in statements(frontmatter) {
        if stmt.is_blank() {
            blanks.push(stmt.text);
            continue;
        }
        if stmt.header().is_some() && seen_content {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            let blank = blanks.first().copied().unwrap_or(line_ending(&out));
            out.push_str(blank);
        } else {
            blanks.iter().for_each(|b| out.push_str(b));
        }
        blanks.clear();
        out.push_str(stmt.text);
        seen_content = true;
    }
    blanks.iter().for_each(|b| out.push_str(b));
    out
}

/// Line ending used by the text so far.
fn line_ending(text: &str) -> &'static str {
    if text.ends_with("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}
