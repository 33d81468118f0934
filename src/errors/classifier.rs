//! Mapping from raw fetch failures to classified errors
//!
//! Typed [`FetchError`] variants map directly onto an [`ErrorKind`]. Free-form
//! text is matched against an ordered pattern table; the first match wins, so
//! timeout signatures take priority over connection signatures, which take
//! priority over anti-bot signatures.

use super::{ClassifiedError, ErrorKind, FetchError};
use once_cell::sync::Lazy;
use regex::Regex;

/// Bumped whenever [`PATTERNS`] changes meaning.
pub const PATTERN_TABLE_VERSION: u32 = 1;

/// Ordered `(pattern, kind)` table, matched case-insensitively.
const PATTERNS: &[(&str, ErrorKind)] = &[
    // Timeouts
    (r"timed?\s*out", ErrorKind::Timeout),
    (r"deadline (has )?(elapsed|exceeded)", ErrorKind::Timeout),
    // Connectivity
    (r"connection (refused|reset|closed|aborted)", ErrorKind::ConnectionFailure),
    (r"(failed|unable) to connect", ErrorKind::ConnectionFailure),
    (r"broken pipe", ErrorKind::ConnectionFailure),
    (r"dns (error|resolution)", ErrorKind::ConnectionFailure),
    // Missing tooling
    (r"command not found", ErrorKind::ToolingMissing),
    (r"no such file or directory", ErrorKind::ToolingMissing),
    (r"executable .*not found", ErrorKind::ToolingMissing),
    // Anti-bot measures
    (r"captcha", ErrorKind::AntiBotBlocked),
    (r"unusual traffic", ErrorKind::AntiBotBlocked),
    (r"automated (requests|queries)", ErrorKind::AntiBotBlocked),
    (r"browser has been closed", ErrorKind::AntiBotBlocked),
    (r"too many requests", ErrorKind::AntiBotBlocked),
];

static COMPILED: Lazy<Vec<(Regex, ErrorKind)>> = Lazy::new(|| {
    PATTERNS
        .iter()
        .filter_map(|(pattern, kind)| {
            Regex::new(&format!("(?i){pattern}"))
                .ok()
                .map(|re| (re, *kind))
        })
        .collect()
});

/// Classify a raw fetch failure.
///
/// Pure and idempotent: the same input always yields the same output.
pub fn classify(error: &FetchError) -> ClassifiedError {
    let kind = match error {
        FetchError::Timeout(_) => ErrorKind::Timeout,
        FetchError::Connection(_) => ErrorKind::ConnectionFailure,
        FetchError::ToolingMissing(_) => ErrorKind::ToolingMissing,
        FetchError::Blocked(_) => ErrorKind::AntiBotBlocked,
        FetchError::InvalidInput(_) => ErrorKind::InvalidInput,
        FetchError::NoResults => ErrorKind::NoResults,
        FetchError::MalformedResponse(_) => ErrorKind::MalformedResponse,
        FetchError::Other(text) => return classify_message(text),
    };
    ClassifiedError::from_kind(kind)
}

/// Classify free-form error text against the pattern table.
pub fn classify_message(raw: &str) -> ClassifiedError {
    match COMPILED.iter().find(|(re, _)| re.is_match(raw)) {
        Some((_, kind)) => ClassifiedError::from_kind(*kind),
        None => ClassifiedError {
            kind: ErrorKind::Unknown,
            message: format!(
                "An unexpected error occurred during flight search: {}",
                raw.trim()
            ),
        },
    }
}
