// Trainer name validation: length, character set and a blocked-word list.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use crate::error::AppError;

pub const MIN_NAME_CHARS: usize = 2;
pub const MAX_NAME_CHARS: usize = 20;
pub const DEFAULT_NAME: &str = "Trainer";

const BLOCKED_PATTERNS: &[&str] = &[
    // Slurs
    r"\bn[i1]gg",
    r"\bf[a@]g",
    r"\bk[i1]ke",
    r"\bch[i1]nk",
    r"\bsp[i1]c",
    r"\bwetback",
    r"\btr[a@]nn",
    // Profanity
    r"\bf+u+c+k",
    r"\bs+h+[i1]+t+",
    r"\ba+s+s+h+o+l+e",
    r"\bb[i1]tch",
    r"\bc+u+n+t",
    r"\bd[i1]ck",
    r"\bcock",
    r"\bpussy",
    r"\bwh[o0]re",
    r"\bslut",
    // Sexual
    r"\bporn",
    r"\bsex",
    r"\brape",
    r"\bpedo",
    r"\bmolest",
    // Violence
    r"\bkill\s*(yo)?u",
    r"\bmurder",
    r"\bsuicid",
    // Leet variants
    r"\b[a@][s$][s$]",
    r"\bp[e3]n[i1][s$]",
];

lazy_static! {
    static ref ALLOWED_CHARS: Regex = Regex::new(r"^[\w\s.'-]+$").unwrap();
    static ref BLOCKED: Vec<Regex> = BLOCKED_PATTERNS
        .iter()
        .map(|p| RegexBuilder::new(p).case_insensitive(true).build().unwrap())
        .collect();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("Name cannot be empty")]
    Empty,
    #[error("Name must be at least 2 characters")]
    TooShort,
    #[error("Name must be 20 characters or less")]
    TooLong,
    #[error("Name contains invalid characters")]
    InvalidCharacters,
    #[error("Name contains inappropriate content")]
    Inappropriate,
}

impl From<NameError> for AppError {
    fn from(e: NameError) -> Self {
        AppError::InvalidInput(e.to_string())
    }
}

/// Validate a trainer name, returning it trimmed.
pub fn check_name(name: &str) -> Result<&str, NameError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(NameError::Empty);
    }

    let len = name.chars().count();
    if len < MIN_NAME_CHARS {
        return Err(NameError::TooShort);
    }
    if len > MAX_NAME_CHARS {
        return Err(NameError::TooLong);
    }
    if !ALLOWED_CHARS.is_match(name) {
        return Err(NameError::InvalidCharacters);
    }
    if BLOCKED.iter().any(|re| re.is_match(name)) {
        return Err(NameError::Inappropriate);
    }
    Ok(name)
}

/// Collapse whitespace and cap the length. Does not filter content; run
/// [`check_name`] first.
pub fn sanitize_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped: String = collapsed.chars().take(MAX_NAME_CHARS).collect();
    let capped = capped.trim();
    if capped.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        capped.to_string()
    }
}
