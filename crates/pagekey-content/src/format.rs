//! Frontmatter format detection and splitting.

use std::fmt;

use pagekey_core::defaults::FORMAT_SNIFF_LEN;

/// Structured-header format of a stored page, inferred from its first bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontmatterFormat {
    /// `---` fenced YAML
    Yaml,
    /// `+++` fenced TOML
    Toml,
    /// Leading `{` JSON object
    Json,
    /// Anything else, including content too short to sniff
    Unknown,
}

impl FrontmatterFormat {
    /// Sniff the format from a fixed-length prefix of `content`.
    pub fn detect(content: &[u8]) -> Self {
        if content.len() < FORMAT_SNIFF_LEN {
            return FrontmatterFormat::Unknown;
        }
        if content.starts_with(b"---") {
            FrontmatterFormat::Yaml
        } else if content.starts_with(b"+++") {
            FrontmatterFormat::Toml
        } else if content.starts_with(b"{") {
            FrontmatterFormat::Json
        } else {
            FrontmatterFormat::Unknown
        }
    }

    /// Fence line delimiting the frontmatter, if the format uses one.
    pub fn fence(&self) -> Option<&'static str> {
        match self {
            FrontmatterFormat::Yaml => Some("---"),
            FrontmatterFormat::Toml => Some("+++"),
            FrontmatterFormat::Json | FrontmatterFormat::Unknown => None,
        }
    }
}

impl fmt::Display for FrontmatterFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrontmatterFormat::Yaml => write!(f, "yaml"),
            FrontmatterFormat::Toml => write!(f, "toml"),
            FrontmatterFormat::Json => write!(f, "json"),
            FrontmatterFormat::Unknown => write!(f, "unknown"),
        }
    }
}

/// A fenced document cut into its parts. Concatenating `open`,
/// `frontmatter`, `close` and `body` reproduces the input exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontmatterSplit<'a> {
    pub format: FrontmatterFormat,
    /// Opening fence line, including its line ending.
    pub open: &'a str,
    /// Everything between the fences.
    pub frontmatter: &'a str,
    /// Closing fence line, including its line ending if present.
    pub close: &'a str,
    /// Page body after the closing fence.
    pub body: &'a str,
}

/// Split a YAML or TOML fenced document. Returns `None` for other formats
/// and for documents whose opening fence is never closed.
pub fn split_frontmatter(content: &str) -> Option<FrontmatterSplit<'_>> {
    let format = FrontmatterFormat::detect(content.as_bytes());
    let fence = format.fence()?;

    let open_len = content.find('\n')? + 1;
    if content[..open_len].trim_end() != fence {
        return None;
    }

    let mut offset = open_len;
    for line in content[open_len..].split_inclusive('\n') {
        if line.trim_end() == fence {
            let close_end = offset + line.len();
            return Some(FrontmatterSplit {
                format,
                open: &content[..open_len],
                frontmatter: &content[open_len..offset],
                close: &content[offset..close_end],
                body: &content[close_end..],
            });
        }
        offset += line.len();
    }
    None
}
