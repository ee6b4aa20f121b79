//! Reading individual frontmatter fields.

use crate::format::{split_frontmatter, FrontmatterFormat, FrontmatterSplit};

/// String value at `path` in a page's frontmatter, if present.
///
/// Works for YAML, TOML and leading-object JSON frontmatter. Missing fields,
/// non-string values and unparseable frontmatter all yield `None`.
///
/// ```
/// use pagekey_content::string_field;
///
/// let page = b"+++\nidentifier = \"MyPage\"\n[inventory]\ncontainer = \"Box\"\n+++\n";
/// assert_eq!(string_field(page, &["identifier"]).as_deref(), Some("MyPage"));
/// assert_eq!(string_field(page, &["inventory", "container"]).as_deref(), Some("Box"));
/// ```
pub fn string_field(content: &[u8], path: &[&str]) -> Option<String> {
    match FrontmatterFormat::detect(content) {
        FrontmatterFormat::Json => {
            let value = serde_json::Deserializer::from_slice(content)
                .into_iter::<serde_json::Value>()
                .next()?
                .ok()?;
            let mut current = &value;
            for key in path {
                current = current.get(*key)?;
            }
            current.as_str().map(str::to_string)
        }
        FrontmatterFormat::Yaml | FrontmatterFormat::Toml => {
            let text = std::str::from_utf8(content).ok()?;
            split_string_field(&split_frontmatter(text)?, path)
        }
        FrontmatterFormat::Unknown => None,
    }
}

/// String value at `path`, parsed with the split format's own parser.
pub(crate) fn split_string_field(split: &FrontmatterSplit<'_>, path: &[&str]) -> Option<String> {
    match split.format {
        FrontmatterFormat::Toml => {
            let table: toml::Table = toml::from_str(split.frontmatter).ok()?;
            let (last, parents) = path.split_last()?;
            let mut current = &table;
            for key in parents {
                current = current.get(*key)?.as_table()?;
            }
            current.get(*last)?.as_str().map(str::to_string)
        }
        FrontmatterFormat::Yaml => {
            let value: serde_yaml::Value = serde_yaml::from_str(split.frontmatter).ok()?;
            let mut current = &value;
            for key in path {
                current = current.get(*key)?;
            }
            current.as_str().map(str::to_string)
        }
        _ => None,
    }
}
