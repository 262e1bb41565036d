//! Expansion of the `scanNumber` selection.
//!
//! Accepted forms: a non-negative integer, a numeric string (`"7"`), a
//! half-open range string (`"3:6"` selects 3, 4 and 5) or a list nesting any
//! of these.

use crate::domain::{ConfigResult, EddError};
use serde_json::Value;

const CODE: &str = "INPUT.SCAN_NUMBER";

pub fn parse_scan_numbers(value: &Value) -> ConfigResult<Vec<u32>> {
    let mut scans = Vec::new();
    collect(value, &mut scans)?;
    if scans.is_empty() {
        return Err(invalid(value, "selects no scan"));
    }
    let mut seen = std::collections::BTreeSet::new();
    if let Some(duplicate) = scans.iter().find(|scan| !seen.insert(**scan)) {
        return Err(invalid(value, &format!("selects scan {duplicate} more than once")));
    }
    Ok(scans)
}

/// Parses a command-line selection: JSON (`7`, `[1, 2]`) or a bare string
/// (`3:6`).
pub fn parse_scan_argument(argument: &str) -> ConfigResult<Vec<u32>> {
    let value = serde_json::from_str::<Value>(argument.trim())
        .unwrap_or_else(|_| Value::String(argument.to_string()));
    parse_scan_numbers(&value)
}

fn collect(value: &Value, scans: &mut Vec<u32>) -> ConfigResult<()> {
    match value {
        Value::Number(number) => {
            let scan = number
                .as_u64()
                .and_then(|scan| u32::try_from(scan).ok())
                .ok_or_else(|| invalid(value, "is not a non-negative integer"))?;
            scans.push(scan);
        }
        Value::String(text) => match text.split_once(':') {
            Some((start, end)) => {
                let start = parse_bound(value, start)?;
                let end = parse_bound(value, end)?;
                if start >= end {
                    return Err(invalid(value, "is an empty range"));
                }
                scans.extend(start..end);
            }
            None => scans.push(parse_bound(value, text)?),
        },
        Value::Array(items) => {
            for item in items {
                collect(item, scans)?;
            }
        }
        Value::Null | Value::Bool(_) | Value::Object(_) => {
            return Err(invalid(value, "is not a scan number, list or range"));
        }
    }
    Ok(())
}

fn parse_bound(value: &Value, text: &str) -> ConfigResult<u32> {
    text.trim()
        .parse::<u32>()
        .map_err(|_| invalid(value, "is not a non-negative integer"))
}

fn invalid(value: &Value, reason: &str) -> EddError {
    EddError::configuration(CODE, format!("scanNumber {value} {reason}"))
}
