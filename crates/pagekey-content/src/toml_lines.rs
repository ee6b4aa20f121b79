//! Line-preserving view of TOML frontmatter.
//!
//! Structural migrations rewrite frontmatter textually so that every line
//! they do not touch survives byte-for-byte. This module cuts TOML text into
//! statements: a statement is one or more whole lines, and a multi-line
//! value (array, inline table, triple-quoted string) stays inside the
//! statement that opened it.

/// What a statement is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StatementKind {
    Blank,
    Comment,
    /// `[a.b]` or `[[a.b]]`
    Header { path: Vec<String>, array: bool },
    /// `key = value`; `eq` is the byte offset of `=` within the statement text.
    Assignment { path: Vec<String>, eq: usize },
    /// Anything unparseable, kept verbatim.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Statement<'a> {
    pub kind: StatementKind,
    pub text: &'a str,
}

impl Statement<'_> {
    pub fn is_blank(&self) -> bool {
        self.kind == StatementKind::Blank
    }

    pub fn is_comment(&self) -> bool {
        self.kind == StatementKind::Comment
    }

    pub fn header(&self) -> Option<(&[String], bool)> {
        match &self.kind {
            StatementKind::Header { path, array } => Some((path.as_slice(), *array)),
            _ => None,
        }
    }

    pub fn assignment_path(&self) -> Option<&[String]> {
        match &self.kind {
            StatementKind::Assignment { path, .. } => Some(path.as_slice()),
            _ => None,
        }
    }

    /// Text after the `=` of an assignment, including the line ending.
    pub fn value_text(&self) -> Option<&str> {
        match &self.kind {
            StatementKind::Assignment { eq, .. } => Some(&self.text[eq + 1..]),
            _ => None,
        }
    }
}

/// Cut TOML text into statements. Concatenating every statement's text
/// reproduces the input.
pub(crate) fn statements(src: &str) -> Vec<Statement<'_>> {
    let lines: Vec<(usize, &str)> = src
        .split_inclusive('\n')
        .scan(0usize, |offset, line| {
            let start = *offset;
            *offset += line.len();
            Some((start, line))
        })
        .collect();

    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let (start, line) = lines[i];
        let trimmed = line.trim();

        if trimmed.is_empty() {
            out.push(Statement {
                kind: StatementKind::Blank,
                text: line,
            });
            i += 1;
            continue;
        }
        if trimmed.starts_with('#') {
            out.push(Statement {
                kind: StatementKind::Comment,
                text: line,
            });
            i += 1;
            continue;
        }
        if trimmed.starts_with('[') {
            out.push(Statement {
                kind: parse_header(trimmed).unwrap_or(StatementKind::Other),
                text: line,
            });
            i += 1;
            continue;
        }

        let Some(eq) = find_unquoted(line, b'=') else {
            out.push(Statement {
                kind: StatementKind::Other,
                text: line,
            });
            i += 1;
            continue;
        };
        let Some(path) = parse_key_path(&line[..eq]) else {
            out.push(Statement {
                kind: StatementKind::Other,
                text: line,
            });
            i += 1;
            continue;
        };

        let mut scanner = ValueScanner::default();
        scanner.feed_line(&line[eq + 1..]);
        let mut end = i + 1;
        while !scanner.is_complete() && end < lines.len() {
            scanner.feed_line(lines[end].1);
            end += 1;
        }
        let stop = lines
            .get(end)
            .map(|(offset, _)| *offset)
            .unwrap_or(src.len());
        out.push(Statement {
            kind: StatementKind::Assignment { path, eq },
            text: &src[start..stop],
        });
        i = end;
    }
    out
}

fn parse_header(trimmed: &str) -> Option<StatementKind> {
    let (array, inner) = if let Some(rest) = trimmed.strip_prefix("[[") {
        (true, rest.split_once("]]")?.0)
    } else {
        (false, trimmed.strip_prefix('[')?.split_once(']')?.0)
    };
    let path = parse_key_path(inner)?;
    Some(StatementKind::Header { path, array })
}

/// Parse a (possibly dotted, possibly quoted) TOML key into its segments.
pub(crate) fn parse_key_path(key: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut closed = false;
    let mut chars = key.trim().chars();

    while let Some(c) = chars.next() {
        if closed && c != '.' && !c.is_whitespace() {
            return None;
        }
        match c {
            '"' | '\'' => {
                if quoted || !current.is_empty() {
                    return None;
                }
                let quote = c;
                quoted = true;
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some('\\') if quote == '"' => {
                            if let Some(escaped) = chars.next() {
                                current.push(escaped);
                            }
                        }
                        Some(ch) => current.push(ch),
                        None => return None,
                    }
                }
            }
            '.' => {
                if current.is_empty() && !quoted {
                    return None;
                }
                segments.push(std::mem::take(&mut current));
                quoted = false;
                closed = false;
            }
            c if c.is_whitespace() => closed = quoted || !current.is_empty(),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => {
                if quoted {
                    return None;
                }
                current.push(c)
            }
            _ => return None,
        }
    }
    if current.is_empty() && !quoted {
        return None;
    }
    segments.push(current);
    Some(segments)
}

/// Render key segments back into TOML key syntax.
pub(crate) fn format_key_path(path: &[String]) -> String {
    path.iter()
        .map(|segment| {
            let bare = !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if bare {
                segment.clone()
            } else {
                toml::Value::String(segment.clone()).to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Byte offset of the first `needle` outside a quoted string.
fn find_unquoted(line: &str, needle: u8) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' && q == b'"' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == needle {
                    return Some(i);
                }
                match b {
                    b'"' | b'\'' => quote = Some(b),
                    b'#' => return None,
                    _ => {}
                }
            }
        }
        i += 1;
    }
    None
}

/// Tracks whether a TOML value spanning several lines has ended.
#[derive(Debug, Default)]
struct ValueScanner {
    depth: i32,
    multiline: Option<&'static [u8]>,
}

impl ValueScanner {
    fn is_complete(&self) -> bool {
        self.depth <= 0 && self.multiline.is_none()
    }

    fn feed_line(&mut self, line: &str) {
        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if let Some(delim) = self.multiline {
                if bytes[i] == b'\\' && delim == b"\"\"\"" {
                    i += 2;
                } else if bytes[i..].starts_with(delim) {
                    self.multiline = None;
                    i += delim.len();
                } else {
                    i += 1;
                }
                continue;
            }
            match bytes[i] {
                b'#' => return,
                b'"' if bytes[i..].starts_with(b"\"\"\"") => {
                    self.multiline = Some(b"\"\"\"");
                    i += 3;
                }
                b'\'' if bytes[i..].starts_with(b"'''") => {
                    self.multiline = Some(b"'''");
                    i += 3;
                }
                b'"' => i = skip_string(bytes, i + 1, b'"'),
                b'\'' => i = skip_string(bytes, i + 1, b'\''),
                b'[' | b'{' => {
                    self.depth += 1;
                    i += 1;
                }
                b']' | b'}' => {
                    self.depth -= 1;
                    i += 1;
                }
                _ => i += 1,
            }
        }
    }
}

/// Index just past the closing quote of a single-line string.
fn skip_string(bytes: &[u8], mut i: usize, quote: u8) -> usize {
    while i < bytes.len() {
        if bytes[i] == b'\\' && quote == b'"' {
            i += 2;
            continue;
        }
        if bytes[i] == quote || bytes[i] == b'\n' {
            return i + 1;
        }
        i += 1;
    }
    i
}
