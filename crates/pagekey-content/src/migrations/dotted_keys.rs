//! Dotted-key → table merge.
//!
//! Older releases wrote nested fields as top-level dotted assignments
//! (`inventory.container = "box"`). Once another writer added an explicit
//! `[inventory]` table the document stopped being valid TOML. This migration
//! moves every top-level dotted assignment into its table, merging with a
//! table that already exists.

use std::collections::{BTreeMap, HashSet};

use crate::format::FrontmatterFormat;
use crate::migration::{Migration, MigrationError};
use crate::toml_lines::{format_key_path, statements, Statement};

use super::{reassemble, split};

/// Merges top-level `a.b.c = v` assignments into `[a.b]` tables.
///
/// - Dotted lines whose prefix is itself a top-level scalar are left alone.
/// - Inside an existing table the dotted lines come first, then the table's
///   own lines; on a duplicate key the table's own line wins.
/// - Tables are emitted sorted by name, unless the frontmatter uses arrays of
///   tables, whose sub-tables depend on their position. Then existing order
///   is kept and new tables are appended.
/// - Ungrouped top-level lines stay at the top, unchanged.
/// - Comment lines directly above a header travel with that header.
#[derive(Debug, Default, Clone, Copy)]
pub struct DottedKeyToTableMigration;

impl Migration for DottedKeyToTableMigration {
    fn name(&self) -> &str {
        "dotted_key_to_table"
    }

    fn supported_formats(&self) -> &[FrontmatterFormat] {
        &[FrontmatterFormat::Toml]
    }

    fn applies_to(&self, content: &[u8]) -> bool {
        split(content)
            .map(|s| rewrite(s.frontmatter).is_some())
            .unwrap_or(false)
    }

    fn apply(&self, content: &[u8]) -> Result<Vec<u8>, MigrationError> {
        let split = split(content)?;
        let Some(frontmatter) = rewrite(split.frontmatter) else {
            return Ok(content.to_vec());
        };

        toml::from_str::<toml::Table>(&frontmatter).map_err(|e| {
            MigrationError::InvalidOutput {
                format: FrontmatterFormat::Toml,
                reason: e.to_string(),
            }
        })?;

        Ok(reassemble(&split, &frontmatter))
    }
}

struct Block<'a> {
    leading: Vec<Statement<'a>>,
    header: Option<&'a str>,
    path: Vec<String>,
    moved: Vec<String>,
    body: Vec<Statement<'a>>,
}

/// Rewritten frontmatter, or `None` when there is nothing to merge.
fn rewrite(frontmatter: &str) -> Option<String> {
    let stmts = statements(frontmatter);
    let first_header = stmts
        .iter()
        .position(|s| s.header().is_some())
        .unwrap_or(stmts.len());
    let (top, rest) = stmts.split_at(first_header);
    let lead = if rest.is_empty() { 0 } else { trailing_comments(top) };
    let (top, first_leading) = top.split_at(top.len() - lead);

    let scalars: HashSet<&[String]> = top.iter().filter_map(|s| s.assignment_path()).collect();
    let array_tables: HashSet<&[String]> = rest
        .iter()
        .filter_map(|s| s.header())
        .filter(|(_, array)| *array)
        .map(|(path, _)| path)
        .collect();

    let mut groups: BTreeMap<Vec<String>, Vec<(String, String)>> = BTreeMap::new();
    let mut moved_indexes = HashSet::new();
    for (index, stmt) in top.iter().enumerate() {
        let Some(path) = stmt.assignment_path() else {
            continue;
        };
        if path.len() < 2 {
            continue;
        }
        let prefix = &path[..path.len() - 1];
        let shadows_scalar = (1..=prefix.len()).any(|n| scalars.contains(&prefix[..n]));
        if shadows_scalar || array_tables.contains(prefix) {
            continue;
        }

        let leaf = path[path.len() - 1].clone();
        let value = stmt.value_text().unwrap_or_default();
        let line = format!("{} ={}", format_key_path(std::slice::from_ref(&leaf)), value);
        groups.entry(prefix.to_vec()).or_default().push((leaf, line));
        moved_indexes.insert(index);
    }

    if groups.is_empty() {
        return None;
    }

    let mut blocks: Vec<Block<'_>> = Vec::new();
    for stmt in rest {
        match stmt.header() {
            Some((path, _)) => {
                let leading = match blocks.last_mut() {
                    Some(prev) => {
                        let n = trailing_comments(&prev.body);
                        prev.body.split_off(prev.body.len() - n)
                    }
                    None => first_leading.to_vec(),
                };
                blocks.push(Block {
                    leading,
                    header: Some(stmt.text),
                    path: path.to_vec(),
                    moved: Vec::new(),
                    body: Vec::new(),
                });
            }
            None => {
                if let Some(block) = blocks.last_mut() {
                    block.body.push(stmt.clone());
                }
            }
        }
    }
    let is_array_block = |block: &Block<'_>| {
        block
            .header
            .is_some_and(|h| h.trim_start().starts_with("[["))
    };

    for (prefix, lines) in groups {
        let existing = blocks
            .iter()
            .position(|b| b.path == prefix && !is_array_block(b));
        match existing {
            Some(i) => {
                let own_keys: HashSet<&[String]> = blocks[i]
                    .body
                    .iter()
                    .filter_map(|s| s.assignment_path())
                    .collect();
                let keep: Vec<String> = lines
                    .into_iter()
                    .filter(|(leaf, _)| !own_keys.contains(std::slice::from_ref(leaf)))
                    .map(|(_, line)| line)
                    .collect();
                blocks[i].moved.extend(keep);
            }
            None => blocks.push(Block {
                leading: Vec::new(),
                header: None,
                path: prefix,
                moved: lines.into_iter().map(|(_, line)| line).collect(),
                body: Vec::new(),
            }),
        }
    }

    if array_tables.is_empty() {
        blocks.sort_by(|a, b| a.path.cmp(&b.path));
    }

    let mut kept_top: Vec<&Statement<'_>> = top
        .iter()
        .enumerate()
        .filter(|(i, _)| !moved_indexes.contains(i))
        .map(|(_, s)| s)
        .collect();
    while kept_top.last().is_some_and(|s| s.is_blank()) {
        kept_top.pop();
    }

    let mut out = String::with_capacity(frontmatter.len() + 32);
    for stmt in kept_top {
        out.push_str(stmt.text);
    }

    for block in blocks {
        ensure_newline(&mut out);
        if !out.is_empty() {
            out.push('\n');
        }
        for stmt in &block.leading {
            ensure_newline(&mut out);
            out.push_str(stmt.text);
        }
        ensure_newline(&mut out);
        match block.header {
            Some(header) => out.push_str(header),
            None => {
                out.push('[');
                out.push_str(&format_key_path(&block.path));
                out.push(']');
            }
        }
        for line in &block.moved {
            ensure_newline(&mut out);
            out.push_str(line);
        }
        let mut body = block.body;
        while body.last().is_some_and(|s| s.is_blank()) {
            body.pop();
        }
        for stmt in body {
            ensure_newline(&mut out);
            out.push_str(stmt.text);
        }
    }
    ensure_newline(&mut out);
    Some(out)
}

/// Length of the run of comment lines ending `stmts`.
fn trailing_comments(stmts: &[Statement<'_>]) -> usize {
    stmts.iter().rev().take_while(|s| s.is_comment()).count()
}

fn ensure_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}
