//! Scanner for CGMiner API text responses.
//!
//! Responses are `|`-separated records, each starting with a tag such as
//! `SUMMARY,` and carrying comma-separated `KEY=VALUE` fields. Avalon
//! firmware adds bracketed sub-fields to `estats`, e.g. `WORKMODE[1]`,
//! `PS[0 1209 2349 55 1306 2350 1364]` and
//! `SYSTEMSTATU[Work: In Work,Hash Board: 1]`.
//!
//! All lookups are literal, case-sensitive, first-occurrence substring
//! searches. The device never escapes delimiters, so a value containing
//! `,`, `|` or `]` is cut short at that character.

use crate::status::{SummaryInfo, VersionInfo, WorkMode};

const RECORD_SEPARATOR: char = '|';
const FIELD_SEPARATOR: char = ',';

/// Return the record starting at the first occurrence of `tag`, up to
/// (excluding) the next `|`. Empty when `tag` does not occur.
pub fn extract_tagged_block<'a>(response: &'a str, tag: &str) -> &'a str {
    let Some(start) = response.find(tag) else {
        return "";
    };
    let rest = &response[start..];
    match rest.find(RECORD_SEPARATOR) {
        Some(end) => &rest[..end],
        None => rest,
    }
}

/// Return the value of `key=` within `block`, up to the next `,`.
/// Empty when the key does not occur.
pub fn extract_field<'a>(block: &'a str, key: &str) -> &'a str {
    let pattern = format!("{key}=");
    let Some(idx) = block.find(&pattern) else {
        return "";
    };
    let rest = &block[idx + pattern.len()..];
    match rest.find(FIELD_SEPARATOR) {
        Some(end) => &rest[..end],
        None => rest,
    }
}

/// Text between `open` and the next `]`, or `None` if either is missing.
fn bracketed<'a>(response: &'a str, open: &str) -> Option<&'a str> {
    let start = response.find(open)? + open.len();
    let rest = &response[start..];
    let end = rest.find(']')?;
    Some(&rest[..end])
}

/// Parse the reply to `version`.
pub fn parse_version(response: &str) -> VersionInfo {
    let block = extract_tagged_block(response, "VERSION,");
    if block.is_empty() {
        return VersionInfo::default();
    }

    VersionInfo {
        cgminer: extract_field(block, "CGMiner").to_string(),
        api: extract_field(block, "API").to_string(),
        prod: extract_field(block, "PROD").to_string(),
        model: extract_field(block, "MODEL").to_string(),
        mac: extract_field(block, "MAC").to_string(),
    }
}

/// Parse the reply to `summary`.
pub fn parse_summary(response: &str) -> SummaryInfo {
    let block = extract_tagged_block(response, "SUMMARY,");
    if block.is_empty() {
        return SummaryInfo::default();
    }

    SummaryInfo {
        elapsed: extract_field(block, "Elapsed").to_string(),
        mhs_av: extract_field(block, "MHS av").to_string(),
        mhs_5s: extract_field(block, "MHS 5s").to_string(),
        accepted: extract_field(block, "Accepted").to_string(),
        rejected: extract_field(block, "Rejected").to_string(),
        hw_errors: extract_field(block, "Hardware Errors").to_string(),
    }
}

/// Work mode index from `WORKMODE[n]`, trimmed. Empty when absent.
pub fn extract_work_mode_index(response: &str) -> &str {
    bracketed(response, "WORKMODE[").map_or("", str::trim)
}

/// Instantaneous power from `PS[...]`.
///
/// The power-supply array is a space-separated list of numbers whose last
/// entry is the current draw in watts. A single-entry array is returned
/// as is. Empty when absent.
pub fn extract_instant_power(response: &str) -> &str {
    let Some(values) = bracketed(response, "PS[") else {
        return "";
    };
    let values = values.trim();
    match values.rfind(' ') {
        Some(last_space) => values[last_space + 1..].trim(),
        None => values,
    }
}

/// Work state from `SYSTEMSTATU[... Work: <state>, ...]`, e.g. `In Work`.
/// Empty when the block or the `Work:` key is absent.
pub fn extract_work_state(response: &str) -> &str {
    const TAG: &str = "SYSTEMSTATU[";
    const KEY: &str = "Work:";

    let Some(start) = response.find(TAG) else {
        return "";
    };
    let Some(len) = response[start..].find(']') else {
        return "";
    };
    let block = &response[start..start + len];

    let Some(idx) = block.find(KEY) else {
        return "";
    };
    let rest = block[idx + KEY.len()..].trim_start_matches([' ', '\t']);
    let value = match rest.find(FIELD_SEPARATOR) {
        Some(end) => &rest[..end],
        None => rest,
    };
    value.trim()
}

/// The parts of an `estats` reply the dashboard uses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EstatsInfo {
    /// `None` when the index is missing or not one of 0, 1, 2.
    pub work_mode: Option<WorkMode>,
    pub power: String,
    pub work_state: String,
}

/// Parse the reply to `estats`.
pub fn parse_estats(response: &str) -> EstatsInfo {
    EstatsInfo {
        work_mode: WorkMode::from_index(extract_work_mode_index(response)),
        power: extract_instant_power(response).to_string(),
        work_state: extract_work_state(response).to_string(),
    }
}
