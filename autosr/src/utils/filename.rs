//! Recording filename rules.
//!
//! Target names come from remote sites and end up as directory and file
//! names, so they are sanitized first. Recordings are named after the day they
//! start; a numeric suffix keeps a second recording on the same day from
//! overwriting the first.

use std::path::Path;

use chrono::NaiveDate;

use crate::Result;
use crate::utils::fs::path_exists;

/// Extension of recorded files.
pub const RECORDING_EXTENSION: &str = "ts";

/// Characters that are invalid in Windows filenames.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive).
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitize a target name for use as a path component on all platforms.
///
/// Control and reserved characters collapse into a single `_`, leading and
/// trailing spaces and dots are trimmed, and reserved device names get a `_`
/// prefix. An empty result becomes `unnamed`.
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_control() || INVALID_CHARS.contains(&c) {
            if !result.ends_with('_') {
                result.push('_');
            }
        } else {
            result.push(c);
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let stem = trimmed.split('.').next().unwrap_or(trimmed).to_uppercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        return format!("_{trimmed}");
    }

    trimmed.to_string()
}

/// `<YYYY-MM-DD>-<name>` stem for a recording started on `date`.
pub fn dated_stem(date: NaiveDate, name: &str) -> String {
    format!("{}-{}", date.format("%Y-%m-%d"), name)
}

/// Candidate file name for the `attempt`-th recording with the same stem.
///
/// The first recording has no suffix; later ones are numbered from 2.
pub fn numbered_file_name(stem: &str, attempt: u32) -> String {
    if attempt <= 1 {
        format!("{stem}.{RECORDING_EXTENSION}")
    } else {
        format!("{stem} {attempt}.{RECORDING_EXTENSION}")
    }
}

/// First file name in `dir` derived from `stem` that does not exist yet.
pub async fn unique_file_name(dir: &Path, stem: &str) -> Result<String> {
    let mut attempt = 1;
    loop {
        let candidate = numbered_file_name(stem, attempt);
        if !path_exists(&dir.join(&candidate)).await? {
            return Ok(candidate);
        }
        attempt += 1;
    }
}
