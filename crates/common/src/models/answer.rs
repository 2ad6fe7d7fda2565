//! Answer envelope returned to callers

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result row: column name to scalar value
pub type Row = Map<String, Value>;

/// The answer payload. Serialized untagged so callers see a plain string,
/// a single object, or an array of objects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Answer {
    Text(String),
    Row(Row),
    Rows(Vec<Row>),
}

impl Answer {
    /// Render the answer as plain text for prompts and message history
    pub fn render(&self) -> String {
        match self {
            Answer::Text(text) => text.clone(),
            Answer::Row(row) => Value::Object(row.clone()).to_string(),
            Answer::Rows(rows) => {
                Value::Array(rows.iter().cloned().map(Value::Object).collect()).to_string()
            }
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Answer::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Apply `f` to every piece of text in the answer. Non-string row
    /// values are left untouched.
    pub fn map_text(&mut self, mut f: impl FnMut(&str) -> String) {
        match self {
            Answer::Text(text) => *text = f(text),
            Answer::Row(row) => map_row_text(row, &mut f),
            Answer::Rows(rows) => {
                for row in rows.iter_mut() {
                    map_row_text(row, &mut f);
                }
            }
        }
    }
}

fn map_row_text(row: &mut Row, f: &mut impl FnMut(&str) -> String) {
    for value in row.values_mut() {
        if let Value::String(s) = value {
            *s = f(s);
        }
    }
}

/// Stable response contract of the answering core
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerEnvelope {
    pub answer: Answer,
    pub sources: Vec<String>,
}

impl AnswerEnvelope {
    pub fn new(answer: Answer, sources: Vec<String>) -> Self {
        Self { answer, sources }
    }

    /// A text answer with no sources, used for refusals
    pub fn text(answer: impl Into<String>) -> Self {
        Self { answer: Answer::Text(answer.into()), sources: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_untagged_serialization() {
        let envelope = AnswerEnvelope::new(
            Answer::Row(row(json!({ "price": 999 }))),
            vec!["SELECT MAX(price) AS p FROM products".to_string()],
        );
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "answer": { "price": 999 },
                "sources": ["SELECT MAX(price) AS p FROM products"]
            })
        );

        let empty = AnswerEnvelope::new(Answer::Rows(vec![]), vec![]);
        assert_eq!(serde_json::to_value(&empty).unwrap()["answer"], json!([]));
    }

    #[test]
    fn test_map_text_skips_non_strings() {
        let mut answer = Answer::Rows(vec![row(json!({
            "email": "a@b.com",
            "total": 12.5,
        }))]);
        answer.map_text(|s| s.to_uppercase());

        match answer {
            Answer::Rows(rows) => {
                assert_eq!(rows[0]["email"], json!("A@B.COM"));
                assert_eq!(rows[0]["total"], json!(12.5));
            }
            other => panic!("unexpected answer {:?}", other),
        }
    }

    #[test]
    fn test_render_row_as_json() {
        let answer = Answer::Row(row(json!({ "name": "Widget" })));
        assert_eq!(answer.render(), r#"{"name":"Widget"}"#);
        assert_eq!(Answer::Text("4".into()).render(), "4");
    }
}
