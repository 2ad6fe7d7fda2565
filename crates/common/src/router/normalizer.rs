//! Result row normalization
//!
//! Aggregate queries come back with decorated column names such as
//! `MAX(price)` or `count(*)`. Normalization lower-cases every key and
//! strips the aggregate wrapper so callers always see `price` or `count`.
//! Values are never touched.

use crate::models::Row;

/// Aggregate wrappers stripped from column names
pub const AGGREGATE_WRAPPERS: &[&str] = &["max", "min", "avg", "sum", "count"];

/// Normalize every key of `row`. When two keys normalize to the same name
/// the later one wins. Idempotent.
pub fn normalize(row: &Row) -> Row {
    row.iter()
        .map(|(key, value)| (normalize_key(key), value.clone()))
        .collect()
}

/// Lower-case `key` and strip aggregate decoration from it
pub fn normalize_key(key: &str) -> String {
    let lowered = key.to_lowercase();
    if !(lowered.contains('(') && lowered.contains(')')) {
        return lowered;
    }

    let mut stripped = lowered;
    let mut wrapper = None;
    for name in AGGREGATE_WRAPPERS {
        if let Some(next) = strip_call(&stripped, name) {
            stripped = next;
            wrapper.get_or_insert(*name);
        }
    }

    let column: String = stripped.chars().filter(|c| *c != '(' && *c != ')').collect();
    let column = column.trim();

    match (column, wrapper) {
        ("" | "*", Some(name)) => name.to_string(),
        _ => column.to_string(),
    }
}

/// Remove every `name(` that starts a word, so `sum(` inside
/// `checksum(` is left alone. `None` when nothing was removed.
fn strip_call(text: &str, name: &str) -> Option<String> {
    let call = format!("{}(", name);
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut found = false;

    while let Some(pos) = rest.find(&call) {
        let starts_word = rest[..pos]
            .chars()
            .next_back()
            .map_or(out.chars().next_back().map_or(true, is_boundary), is_boundary);

        out.push_str(&rest[..pos]);
        if starts_word {
            found = true;
        } else {
            out.push_str(&call);
        }
        rest = &rest[pos + call.len()..];
    }
    out.push_str(rest);

    found.then_some(out)
}

fn is_boundary(c: char) -> bool {
    !(c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_strips_aggregate_wrappers() {
        assert_eq!(normalize_key("MAX(price)"), "price");
        assert_eq!(normalize_key("avg(p.price)"), "p.price");
        assert_eq!(normalize_key("SUM(quantity)"), "quantity");
        assert_eq!(normalize_key("min( price )"), "price");
        assert_eq!(normalize_key("count(*)"), "count");
        assert_eq!(normalize_key("COUNT(id)"), "id");
    }

    #[test]
    fn test_plain_keys_only_lowercased() {
        assert_eq!(normalize_key("Name"), "name");
        assert_eq!(normalize_key("total_spent"), "total_spent");
        assert_eq!(normalize_key("checksum(a)"), "checksuma");
    }

    #[test]
    fn test_values_untouched() {
        let normalized = normalize(&row(json!({
            "max(price)": 999,
            "Name": "Deluxe Widget",
            "AVG(rating)": 4.5,
            "discount": null,
        })));
        assert_eq!(
            Value::Object(normalized),
            json!({
                "price": 999,
                "name": "Deluxe Widget",
                "rating": 4.5,
                "discount": null,
            })
        );
    }

    #[test]
    fn test_idempotent() {
        let rows = [
            json!({ "max(price)": 999 }),
            json!({ "COUNT(*)": 3, "Country": "NZ" }),
            json!({ "sum(max(x))": 1, "min(a)": 2 }),
            json!({ "p": 1, "round(total)": 2.5 }),
            json!({}),
        ];
        for r in rows {
            let once = normalize(&row(r.clone()));
            assert_eq!(normalize(&once), once, "row: {}", r);
        }
    }
}
