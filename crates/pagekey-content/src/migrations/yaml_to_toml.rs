//! YAML → TOML frontmatter conversion.

use crate::format::FrontmatterFormat;
use crate::migration::{Migration, MigrationError};

use super::split;

/// Rewrites `---` fenced YAML frontmatter as `+++` fenced TOML. The body is
/// kept as-is. Values TOML cannot represent (such as `null`) fail the step.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlToTomlMigration;

impl Migration for YamlToTomlMigration {
    fn name(&self) -> &str {
        "yaml_to_toml"
    }

    fn supported_formats(&self) -> &[FrontmatterFormat] {
        &[FrontmatterFormat::Yaml]
    }

    fn applies_to(&self, content: &[u8]) -> bool {
        split(content).is_ok()
    }

    fn apply(&self, content: &[u8]) -> Result<Vec<u8>, MigrationError> {
        let split = split(content)?;

        let yaml: serde_yaml::Value =
            serde_yaml::from_str(split.frontmatter).map_err(|e| MigrationError::Parse {
                format: FrontmatterFormat::Yaml,
                reason: e.to_string(),
            })?;

        let table = match yaml {
            serde_yaml::Value::Null => toml::Table::new(),
            serde_yaml::Value::Mapping(_) => {
                if contains_null(&yaml) {
                    return Err(MigrationError::Conversion(
                        "null values have no TOML representation".to_string(),
                    ));
                }
                match toml::Value::try_from(&yaml)
                    .map_err(|e| MigrationError::Conversion(e.to_string()))?
                {
                    toml::Value::Table(table) => table,
                    other => {
                        return Err(MigrationError::Conversion(format!(
                            "expected a table, got {}",
                            other.type_str()
                        )))
                    }
                }
            }
            other => {
                return Err(MigrationError::Conversion(format!(
                    "frontmatter is not a mapping: {:?}",
                    other
                )))
            }
        };

        let frontmatter =
            toml::to_string(&table).map_err(|e| MigrationError::Conversion(e.to_string()))?;

        let line_ending = if split.close.ends_with("\r\n") {
            "\r\n"
        } else if split.close.ends_with('\n') {
            "\n"
        } else {
            ""
        };

        let mut out = String::with_capacity(content.len() + 8);
        out.push_str("+++\n");
        out.push_str(&frontmatter);
        if !frontmatter.is_empty() && !frontmatter.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("+++");
        out.push_str(line_ending);
        out.push_str(split.body);
        Ok(out.into_bytes())
    }
}

fn contains_null(value: &serde_yaml::Value) -> bool {
    match value {
        serde_yaml::Value::Null => true,
        serde_yaml::Value::Sequence(items) => items.iter().any(contains_null),
        serde_yaml::Value::Mapping(map) => map.values().any(contains_null),
        serde_yaml::Value::Tagged(tagged) => contains_null(&tagged.value),
        _ => false,
    }
}
