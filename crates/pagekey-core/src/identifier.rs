//! Identifier normalization.
//!
//! Maps a raw page identifier (as typed by a user or persisted by an older
//! release) onto its canonical form. Canonical identifiers are:
//!
//! - idempotent: `normalize(normalize(x)) == normalize(x)`
//! - URL path safe: percent-encoding then decoding reproduces them exactly
//! - free of adversarial code points (invisible formatting characters,
//!   private-use characters, non-whitespace control characters)
//!
//! Letters and digits of every script survive, so `東京` and `สวัสดี` are
//! valid canonical identifiers. Rust strings cannot hold unpaired surrogates;
//! keys decoded lossily from disk arrive with U+FFFD in their place, which is
//! a symbol and gets replaced like any other punctuation.
//!
//! The three invariants are re-checked on every call. A violation is a logic
//! defect and is reported as [`IdentifierError::InvariantViolated`], distinct
//! from the caller-facing [`IdentifierError::Empty`] rejection.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Any UUID embedded in an identifier switches off snake_case splitting.
static UUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("UUID pattern is a valid regex")
});

/// Anything but a letter, digit or mark of any script, `_` or `-`. General
/// categories only: symbols carrying the Alphabetic property (such as the
/// enclosed letters in U+1F130..U+1F189) are not letters.
static DISALLOWED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\p{L}\p{N}\p{M}_-]").expect("disallowed class is a valid regex")
});

/// Unicode general category Cf (format characters).
const FORMAT_RANGES: &[(u32, u32)] = &[
    (0x00AD, 0x00AD),
    (0x0600, 0x0605),
    (0x061C, 0x061C),
    (0x06DD, 0x06DD),
    (0x070F, 0x070F),
    (0x0890, 0x0891),
    (0x08E2, 0x08E2),
    (0x180E, 0x180E),
    (0x200B, 0x200F),
    (0x202A, 0x202E),
    (0x2060, 0x2064),
    (0x2066, 0x206F),
    (0xFEFF, 0xFEFF),
    (0xFFF9, 0xFFFB),
    (0x110BD, 0x110BD),
    (0x110CD, 0x110CD),
    (0x13430, 0x1343F),
    (0x1BCA0, 0x1BCA3),
    (0x1D173, 0x1D17A),
    (0xE0001, 0xE0001),
    (0xE0020, 0xE007F),
];

/// Variation selectors render nothing on their own.
const VARIATION_SELECTOR_RANGES: &[(u32, u32)] = &[(0xFE00, 0xFE0F), (0xE0100, 0xE01EF)];

/// Unicode general category Co (private use).
const PRIVATE_USE_RANGES: &[(u32, u32)] = &[
    (0xE000, 0xF8FF),
    (0xF0000, 0xFFFFD),
    (0x100000, 0x10FFFD),
];

/// Which post-condition a normalized identifier failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantCheck {
    /// Output still contained an adversarial code point.
    AdversarialFree,
    /// Normalizing the output again produced something different.
    Idempotent,
    /// Percent-encoding round trip changed the output.
    UrlSafe,
}

impl fmt::Display for InvariantCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantCheck::AdversarialFree => write!(f, "adversarial-free"),
            InvariantCheck::Idempotent => write!(f, "idempotence"),
            InvariantCheck::UrlSafe => write!(f, "url-safety"),
        }
    }
}

/// Error returned by [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Every character of the input was stripped. The identifier must be
    /// rejected; there is no default to fall back on.
    #[error("identifier {raw:?} is empty after sanitization")]
    Empty { raw: String },

    /// The normalizer produced output that breaks one of its own invariants.
    #[error("normalizing {raw:?} produced {normalized:?}, which fails the {check} check")]
    InvariantViolated {
        raw: String,
        normalized: String,
        check: InvariantCheck,
    },
}

/// Normalize a raw identifier into its canonical form.
///
/// # Errors
///
/// [`IdentifierError::Empty`] when nothing survives sanitization (e.g. `""`
/// or `"///"`), [`IdentifierError::InvariantViolated`] when a post-condition
/// check fails.
///
/// # Examples
///
/// ```
/// use pagekey_core::normalize;
///
/// assert_eq!(normalize("MyPage").unwrap(), "my_page");
/// assert_eq!(normalize("foo__").unwrap(), "foo__");
/// assert!(normalize("///").is_err());
/// ```
pub fn normalize(raw: &str) -> Result<String, IdentifierError> {
    let normalized = normalize_unchecked(raw)?;
    verify(raw, &normalized)?;
    Ok(normalized)
}

/// True for code points that are stripped outright: format characters,
/// variation selectors, private-use characters, and control characters other
/// than tab, newline and carriage return.
pub fn is_adversarial(c: char) -> bool {
    let cp = c as u32;
    in_ranges(cp, FORMAT_RANGES)
        || in_ranges(cp, VARIATION_SELECTOR_RANGES)
        || in_ranges(cp, PRIVATE_USE_RANGES)
        || (c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
}

fn in_ranges(cp: u32, ranges: &[(u32, u32)]) -> bool {
    ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&cp))
}

fn normalize_unchecked(raw: &str) -> Result<String, IdentifierError> {
    let composed: String = raw.nfkc().collect();

    // Recompose after stripping: a removed zero-width character may have
    // separated a base letter from its combining mark.
    let stripped: String = composed
        .chars()
        .filter(|&c| !is_adversarial(c))
        .nfkc()
        .collect();

    let sanitized = DISALLOWED.replace_all(&stripped, "_");

    let cased: String = if UUID_PATTERN.is_match(&sanitized) {
        sanitized.to_lowercase()
    } else {
        to_snake_case(&sanitized)
    }
    .nfkc()
    .collect();

    let filtered = DISALLOWED.replace_all(&cased, "");
    let collapsed = collapse_underscores(&filtered);

    let body = collapsed.trim_matches('_');
    if body.is_empty() {
        return Err(IdentifierError::Empty {
            raw: raw.to_string(),
        });
    }

    let mut out = String::with_capacity(body.len() + 3);
    if raw.starts_with('_') && !raw.starts_with("__") {
        out.push('_');
    }
    out.push_str(body);
    if raw.ends_with("__") {
        out.push_str("__");
    } else if raw.ends_with('_') {
        out.push('_');
    }
    Ok(out)
}

fn verify(raw: &str, normalized: &str) -> Result<(), IdentifierError> {
    let violation = |check| IdentifierError::InvariantViolated {
        raw: raw.to_string(),
        normalized: normalized.to_string(),
        check,
    };

    if normalized.chars().any(is_adversarial) {
        return Err(violation(InvariantCheck::AdversarialFree));
    }

    match normalize_unchecked(normalized) {
        Ok(again) if again == normalized => {}
        _ => return Err(violation(InvariantCheck::Idempotent)),
    }

    let encoded = urlencoding::encode(normalized);
    match urlencoding::decode(&encoded) {
        Ok(decoded) if decoded == normalized => Ok(()),
        _ => Err(violation(InvariantCheck::UrlSafe)),
    }
}

/// Split camelCase words with underscores and lowercase everything.
///
/// A boundary sits before an uppercase letter that follows a lowercase letter
/// or digit (`MyPage`), and before the last uppercase letter of a run that
/// starts a new word (`HTTPServer` becomes `http_server`). Hyphens act as
/// word separators. Digits never start a new word, so `L3` stays `l3`.
fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' {
            out.push('_');
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let after_lower = prev.is_lowercase() || prev.is_numeric();
            let ends_acronym = prev.is_uppercase() && next.is_some_and(char::is_lowercase);
            if after_lower || ends_acronym {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

fn collapse_underscores(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_underscore = false;
    for c in s.chars() {
        if c == '_' {
            if !prev_underscore {
                out.push(c);
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }
    out
}
