//! Snippet parser: turns `key: value, key: value` email snippets into lead drafts.
//!
//! Grammar:
//! 1. Split on `,` into segments.
//! 2. Split each segment on its first `:`; key is trimmed and lower-cased,
//!    value trimmed. Segments without `:` are dropped.
//! 3. Later occurrences of a key overwrite earlier ones.
//! 4. `name`, `category` and `date` are required (empty counts as missing).
//! 5. `date` is `D/M/Y`; a 2-digit year is read as `20YY`.

use std::collections::HashMap;

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::lead::{LeadDraft, LeadStatus};

/// Why a snippet did not yield a lead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnippetRejection {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("unparseable date '{0}'")]
    InvalidDate(String),
}

pub fn parse_snippet(snippet: &str) -> Result<LeadDraft, SnippetRejection> {
    let fields = split_fields(snippet);

    let name = required(&fields, "name")?;
    let category = required(&fields, "category")?;
    let date_text = required(&fields, "date")?;
    let date = parse_lead_date(&date_text)
        .ok_or_else(|| SnippetRejection::InvalidDate(date_text.clone()))?;

    Ok(LeadDraft {
        name,
        category,
        date,
        phone: optional(&fields, "phone"),
        email: optional(&fields, "email").map(|e| e.to_lowercase()),
        budget: optional(&fields, "budget"),
        source: optional(&fields, "source"),
        status: LeadStatus::New,
    })
}

fn split_fields(snippet: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for segment in snippet.split(',') {
        if let Some((key, value)) = segment.split_once(':') {
            fields.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }
    fields
}

fn required(
    fields: &HashMap<String, String>,
    key: &'static str,
) -> Result<String, SnippetRejection> {
    optional(fields, key).ok_or(SnippetRejection::MissingField(key))
}

fn optional(fields: &HashMap<String, String>, key: &str) -> Option<String> {
    fields.get(key).filter(|v| !v.is_empty()).cloned()
}

/// Parses `D/M/Y` (day first). Each component must be all digits; the
/// year is either 2 digits (expanded to `20YY`) or 4 digits. Impossible
/// calendar dates are rejected.
pub fn parse_lead_date(text: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = text.trim().split('/').map(str::trim).collect();
    let &[day, month, year] = parts.as_slice() else {
        return None;
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !(all_digits(day) && all_digits(month) && all_digits(year)) {
        return None;
    }
    if day.len() > 2 || month.len() > 2 {
        return None;
    }

    let year: i32 = match year.len() {
        2 => format!("20{year}").parse().ok()?,
        4 => year.parse().ok()?,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month.parse().ok()?, day.parse().ok()?)
}
