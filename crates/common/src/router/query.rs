//! Generated query cleanup and validation

use serde::{Deserialize, Serialize};

/// Statement-leading keyword a generated query must start with
pub const READ_ONLY_KEYWORD: &str = "select";

const FENCE: &str = "```";

/// Why a generated query was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryRejection {
    NotSelect,
    MultipleStatements,
}

impl QueryRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryRejection::NotSelect => "not SELECT",
            QueryRejection::MultipleStatements => "multiple statements",
        }
    }
}

/// A query produced by the model, after cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub text: String,
    /// True only when `text` is a single read-only statement
    pub validated: bool,
    pub rejection: Option<QueryRejection>,
}

impl GeneratedQuery {
    /// Clean up raw model output and validate it
    pub fn from_model_output(output: &str) -> Self {
        let text = strip_fences(output);
        let rejection = check_read_only(&text).err();
        Self {
            text,
            validated: rejection.is_none(),
            rejection,
        }
    }
}

/// Drop the first and last line when the text opens with a code fence,
/// then trim.
pub fn strip_fences(output: &str) -> String {
    let trimmed = output.trim();
    if !trimmed.starts_with(FENCE) {
        return trimmed.to_string();
    }

    let lines: Vec<&str> = trimmed.lines().collect();
    if lines.len() < 2 {
        return String::new();
    }
    lines[1..lines.len() - 1].join("\n").trim().to_string()
}

/// Starts with the read-only keyword (any case) and holds one statement.
/// A `;` followed by more text means a second statement.
pub fn is_read_only(text: &str) -> bool {
    check_read_only(text).is_ok()
}

/// Like [`is_read_only`], naming the rule that failed
pub fn check_read_only(text: &str) -> Result<(), QueryRejection> {
    let starts_read_only = text
        .get(..READ_ONLY_KEYWORD.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(READ_ONLY_KEYWORD));

    if !starts_read_only {
        Err(QueryRejection::NotSelect)
    } else if has_trailing_statement(text) {
        Err(QueryRejection::MultipleStatements)
    } else {
        Ok(())
    }
}

fn has_trailing_statement(text: &str) -> bool {
    text.split_once(';')
        .is_some_and(|(_, rest)| !rest.trim().trim_matches(';').trim().is_empty())
}
