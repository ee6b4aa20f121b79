//! Identifier-valued field rewrites.

use pagekey_core::normalize;

use crate::fields::split_string_field;
use crate::format::{FrontmatterFormat, FrontmatterSplit};
use crate::migration::{Migration, MigrationError};
use crate::toml_lines::{statements, StatementKind};

use super::{reassemble, split};

/// Rewrites one identifier-valued frontmatter field to its canonical form.
///
/// Applies only when the field exists, holds a string, and that string
/// normalizes to something different. Only the field's own line changes;
/// sibling keys, tables and the body are left as they were. A value written
/// as an inline table member cannot be rewritten and fails the step.
#[derive(Debug, Clone, Copy)]
pub struct IdentifierReferenceMigration {
    name: &'static str,
    path: &'static [&'static str],
}

impl IdentifierReferenceMigration {
    pub const fn new(name: &'static str, path: &'static [&'static str]) -> Self {
        Self { name, path }
    }

    /// The page's own `identifier` field.
    pub const fn page_identifier() -> Self {
        Self::new("identifier_field", &["identifier"])
    }

    /// The `inventory.container` cross-reference.
    pub const fn inventory_container() -> Self {
        Self::new("inventory_container_field", &["inventory", "container"])
    }

    /// Dotted field path, for logs.
    pub fn field(&self) -> String {
        self.path.join(".")
    }

    /// `(current, canonical)` when the field needs rewriting.
    fn pending(&self, split: &FrontmatterSplit<'_>) -> Option<(String, String)> {
        let current = split_string_field(split, self.path)?;
        let canonical = normalize(&current).ok()?;
        (canonical != current).then_some((current, canonical))
    }
}

impl Migration for IdentifierReferenceMigration {
    fn name(&self) -> &str {
        self.name
    }

    fn supported_formats(&self) -> &[FrontmatterFormat] {
        &[FrontmatterFormat::Toml, FrontmatterFormat::Yaml]
    }

    fn applies_to(&self, content: &[u8]) -> bool {
        split(content)
            .map(|s| self.pending(&s).is_some())
            .unwrap_or(false)
    }

    fn apply(&self, content: &[u8]) -> Result<Vec<u8>, MigrationError> {
        let split = split(content)?;
        let Some((_, canonical)) = self.pending(&split) else {
            return Ok(content.to_vec());
        };

        let frontmatter = match split.format {
            FrontmatterFormat::Toml => rewrite_toml(split.frontmatter, self.path, &canonical),
            FrontmatterFormat::Yaml => rewrite_yaml(split.frontmatter, self.path, &canonical),
            other => {
                return Err(MigrationError::Parse {
                    format: other,
                    reason: "no fenced frontmatter".to_string(),
                })
            }
        }
        .ok_or_else(|| MigrationError::FieldNotFound {
            field: self.field(),
        })?;

        let check = FrontmatterSplit {
            frontmatter: &frontmatter,
            ..split.clone()
        };
        if split_string_field(&check, self.path).as_deref() != Some(canonical.as_str()) {
            return Err(MigrationError::InvalidOutput {
                format: split.format,
                reason: format!("{} was not rewritten to {canonical}", self.field()),
            });
        }

        Ok(reassemble(&split, &frontmatter))
    }
}

fn line_ending(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

/// Whitespace and comment after a value, without the line ending. YAML only
/// opens a quote at the start of the scalar and needs a blank before `#`.
fn trailing_comment(value: &str, yaml: bool) -> Option<&str> {
    let value = value.trim_end_matches(['\r', '\n']);
    let scalar = value.trim_start();
    let offset = value.len() - scalar.len();

    let mut quote: Option<char> = None;
    let mut prev = ' ';
    let mut chars = scalar.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match quote {
            Some('"') if c == '\\' => {
                chars.next();
            }
            Some(q) if c == q => {
                // '' is an escaped quote inside a YAML single-quoted scalar.
                if yaml && q == '\'' && chars.peek().is_some_and(|&(_, n)| n == '\'') {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            Some(_) => {}
            None if matches!(c, '"' | '\'') && (!yaml || i == 0) => quote = Some(c),
            None if c == '#' && (!yaml || prev.is_whitespace()) => {
                let at = offset + i;
                let start = value[..at].trim_end().len();
                return Some(&value[start..]);
            }
            None => {}
        }
        prev = c;
    }
    None
}

fn rewrite_toml(frontmatter: &str, path: &[&str], canonical: &str) -> Option<String> {
    let mut table: Option<Vec<String>> = Some(Vec::new());
    let mut out = String::with_capacity(frontmatter.len() + canonical.len());
    let mut rewritten = false;

    for stmt in statements(frontmatter) {
        match &stmt.kind {
            StatementKind::Header { path: header, array } => {
                table = (!array).then(|| header.clone());
            }
            StatementKind::Assignment { path: key, eq } if !rewritten => {
                let matches = table.as_ref().is_some_and(|t| {
                    t.len() + key.len() == path.len()
                        && t.iter().chain(key.iter()).zip(path).all(|(a, b)| a == b)
                });
                if matches {
                    out.push_str(&stmt.text[..=*eq]);
                    out.push(' ');
                    out.push_str(&toml::Value::String(canonical.to_string()).to_string());
                    out.push_str(trailing_comment(&stmt.text[*eq + 1..], false).unwrap_or(""));
                    out.push_str(line_ending(stmt.text));
                    rewritten = true;
                    continue;
                }
            }
            _ => {}
        }
        out.push_str(stmt.text);
    }
    rewritten.then_some(out)
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_content(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

/// Raw key text and unquoted key of a `key: value` line.
fn yaml_key(line: &str) -> Option<(&str, String)> {
    let trimmed = line.trim_start_matches(' ');
    if trimmed.starts_with('-') {
        return None;
    }
    let colon = trimmed
        .char_indices()
        .find(|(i, c)| {
            *c == ':'
                && trimmed[i + 1..]
                    .chars()
                    .next()
                    .map_or(true, char::is_whitespace)
        })
        .map(|(i, _)| i)?;
    let raw = trimmed[..colon].trim_end();
    let key = raw
        .strip_prefix('"')
        .and_then(|k| k.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|k| k.strip_suffix('\'')))
        .unwrap_or(raw);
    Some((raw, key.to_string()))
}

/// Index of the line holding the block-mapping key at `path`.
fn find_yaml_line(lines: &[&str], path: &[&str]) -> Option<usize> {
    let mut start = 0;
    let mut end = lines.len();
    let mut found = None;

    for key in path {
        let level = lines[start..end]
            .iter()
            .find(|l| is_content(l))
            .map(|l| indent_of(l))?;
        let index = (start..end).find(|&i| {
            is_content(lines[i])
                && indent_of(lines[i]) == level
                && yaml_key(lines[i]).is_some_and(|(_, k)| k == *key)
        })?;
        found = Some(index);
        start = index + 1;
        end = (start..end)
            .find(|&i| is_content(lines[i]) && indent_of(lines[i]) <= level)
            .unwrap_or(end);
    }
    found
}

fn rewrite_yaml(frontmatter: &str, path: &[&str], canonical: &str) -> Option<String> {
    let lines: Vec<&str> = frontmatter.split_inclusive('\n').collect();
    let index = find_yaml_line(&lines, path)?;
    let line = lines[index];
    let indent = indent_of(line);
    let (raw_key, _) = yaml_key(line)?;

    let scalar = serde_yaml::to_string(canonical).ok()?;
    let mut out = String::with_capacity(frontmatter.len() + canonical.len());
    for l in &lines[..index] {
        out.push_str(l);
    }
    out.push_str(&line[..indent]);
    out.push_str(raw_key);
    out.push_str(": ");
    out.push_str(scalar.trim_end());
    let value = line[indent + raw_key.len()..]
        .trim_start()
        .strip_prefix(':')
        .unwrap_or("");
    out.push_str(trailing_comment(value, true).unwrap_or(""));
    out.push_str(line_ending(line));

    // Continuation lines of a block or folded scalar go with the old value.
    let rest = &lines[index + 1..];
    let continuation = rest
        .iter()
        .take_while(|l| !is_content(l) || indent_of(l) > indent)
        .count();
    let continuation = rest[..continuation]
        .iter()
        .rposition(|l| is_content(l))
        .map_or(0, |last| last + 1);
    for l in &rest[continuation..] {
        out.push_str(l);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(m: IdentifierReferenceMigration, input: &str) -> String {
        String::from_utf8(m.apply(input.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn test_toml_identifier_rewritten() {
        let input = "+++\ntitle = \"Keep Me\"\nidentifier = \"MyPage\" \n\n[inventory]\nitems = []\n+++\nbody stays\n";
        let m = IdentifierReferenceMigration::page_identifier();
        assert!(m.applies_to(input.as_bytes()));
        assert_eq!(
            apply(m, input),
            "+++\ntitle = \"Keep Me\"\nidentifier = \"my_page\"\n\n[inventory]\nitems = []\n+++\nbody stays\n"
        );
    }

    #[test]
    fn test_toml_nested_field_rewritten() {
        let input = "+++\nidentifier = \"x\"\n\n[inventory]\ncontainer = \"Big Box\"\nitems = []\n+++\n";
        let m = IdentifierReferenceMigration::inventory_container();
        assert_eq!(
            apply(m, input),
            "+++\nidentifier = \"x\"\n\n[inventory]\ncontainer = \"big_box\"\nitems = []\n+++\n"
        );
    }

    #[test]
    fn test_toml_dotted_field_rewritten() {
        let input = "+++\ninventory.container = \"Big Box\"\n+++\n";
        let m = IdentifierReferenceMigration::inventory_container();
        assert_eq!(apply(m, input), "+++\ninventory.container = \"big_box\"\n+++\n");
    }

    #[test]
    fn test_same_key_in_other_table_untouched() {
        let input = "+++\n[other]\nidentifier = \"Nope\"\n+++\n";
        let m = IdentifierReferenceMigration::page_identifier();
        assert!(!m.applies_to(input.as_bytes()));
    }

    #[test]
    fn test_canonical_value_does_not_apply() {
        let m = IdentifierReferenceMigration::page_identifier();
        assert!(!m.applies_to(b"+++\nidentifier = \"my_page\"\n+++\n"));
    }

    #[test]
    fn test_missing_or_non_string_does_not_apply() {
        let m = IdentifierReferenceMigration::page_identifier();
        assert!(!m.applies_to(b"+++\ntitle = \"x\"\n+++\n"));
        assert!(!m.applies_to(b"+++\nidentifier = 42\n+++\n"));
    }

    #[test]
    fn test_unnormalizable_value_does_not_apply() {
        let m = IdentifierReferenceMigration::page_identifier();
        assert!(!m.applies_to(b"+++\nidentifier = \"!!!\"\n+++\n"));
    }

    #[test]
    fn test_inline_table_member_fails() {
        let m = IdentifierReferenceMigration::inventory_container();
        let input = b"+++\ninventory = { container = \"Big Box\" }\n+++\n";
        assert!(m.applies_to(input));
        let err = m.apply(input).unwrap_err();
        assert!(matches!(err, MigrationError::FieldNotFound { .. }));
    }

    #[test]
    fn test_yaml_top_level_field() {
        let input = "---\ntitle: Keep\nidentifier: MyPage\ntags:\n  - a\n---\nbody\n";
        let m = IdentifierReferenceMigration::page_identifier();
        assert_eq!(
            apply(m, input),
            "---\ntitle: Keep\nidentifier: my_page\ntags:\n  - a\n---\nbody\n"
        );
    }

    #[test]
    fn test_yaml_nested_field() {
        let input = "---\nother:\n  container: Elsewhere\ninventory:\n  items: []\n  container: \"Big Box\"\n---\n";
        let m = IdentifierReferenceMigration::inventory_container();
        assert_eq!(
            apply(m, input),
            "---\nother:\n  container: Elsewhere\ninventory:\n  items: []\n  container: big_box\n---\n"
        );
    }

    #[test]
    fn test_yaml_block_scalar_replaced() {
        let input = "---\nidentifier: >\n  My\n  Page\ntitle: t\n---\n";
        let m = IdentifierReferenceMigration::page_identifier();
        assert_eq!(apply(m, input), "---\nidentifier: my_page\ntitle: t\n---\n");
    }

    #[test]
    fn test_toml_trailing_comment_kept() {
        let m = IdentifierReferenceMigration::page_identifier();
        assert_eq!(
            apply(m, "+++\nidentifier = \"MyPage\" # legacy\n+++\n"),
            "+++\nidentifier = \"my_page\" # legacy\n+++\n"
        );
        assert_eq!(
            apply(m, "+++\nidentifier = \"My # Page\"  # was \"x\"\n+++\n"),
            "+++\nidentifier = \"my_page\"  # was \"x\"\n+++\n"
        );
    }

    #[test]
    fn test_yaml_trailing_comment_kept() {
        let m = IdentifierReferenceMigration::page_identifier();
        assert_eq!(
            apply(m, "---\nidentifier: MyPage # legacy\n---\n"),
            "---\nidentifier: my_page # legacy\n---\n"
        );
        assert_eq!(
            apply(m, "---\nidentifier: 'My''s # Page'\t# old\n---\n"),
            "---\nidentifier: my_s_page\t# old\n---\n"
        );
        // `#` glued to a plain scalar is part of the value.
        assert_eq!(
            apply(m, "---\nidentifier: My#Page\n---\n"),
            "---\nidentifier: my_page\n---\n"
        );
    }

    #[test]
    fn test_names() {
        assert_eq!(
            IdentifierReferenceMigration::page_identifier().name(),
            "identifier_field"
        );
        assert_eq!(
            IdentifierReferenceMigration::inventory_container().field(),
            "inventory.container"
        );
    }
}
