//! Field-path resolution against structured JSON records.
//!
//! Path expressions are a small JSONPath subset:
//!
//! | Form | Meaning |
//! |---|---|
//! | `$` (optional prefix) | the record root |
//! | `name` / `.name` | object member |
//! | `['name']` | object member with arbitrary characters |
//! | `[3]` | array element |
//! | `*` / `[*]` | every member of an object or array |
//!
//! A path yields zero or more matches. When a blocking path ends on an array,
//! its scalar elements are flattened into the value list. Array wildcards keep
//! element order; object wildcards visit members in sorted key order.

use crate::error::{BlockingError, ExtractionError};
use crate::record::RecordRef;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

/// A parsed field-path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parses a path expression. Malformed expressions are configuration errors.
    pub fn parse(expr: &str) -> Result<Self, BlockingError> {
        let raw = expr.trim();
        if raw.is_empty() {
            return Err(invalid_path(expr, "empty expression"));
        }
        let rooted = raw.starts_with('$');
        let rest = raw.strip_prefix('$').unwrap_or(raw);
        let bytes = rest.as_bytes();
        let mut segments = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'.' => {
                    let end = key_end(rest, i + 1);
                    segments.push(key_segment(&rest[i + 1..end]).ok_or_else(|| {
                        invalid_path(raw, "empty member name after '.'")
                    })?);
                    i = end;
                }
                b'[' => {
                    let close = rest[i..]
                        .find(']')
                        .map(|p| i + p)
                        .ok_or_else(|| invalid_path(raw, "unclosed '['"))?;
                    segments.push(bracket_segment(&rest[i + 1..close]).ok_or_else(|| {
                        invalid_path(raw, "bracket must hold an index, '*' or a quoted name")
                    })?);
                    i = close + 1;
                }
                _ if i == 0 && !rooted => {
                    let end = key_end(rest, 0);
                    segments.push(key_segment(&rest[..end]).ok_or_else(|| {
                        invalid_path(raw, "empty member name")
                    })?);
                    i = end;
                }
                _ => return Err(invalid_path(raw, "unexpected character")),
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The expression as written (trimmed).
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// All values the path matches in `record`.
    ///
    /// Array elements come in index order, object members in sorted key order.
    pub fn resolve<'a>(&self, record: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![record];
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                match (segment, value) {
                    (Segment::Key(key), Value::Object(map)) => next.extend(map.get(key)),
                    (Segment::Index(n), Value::Array(items)) => next.extend(items.get(*n)),
                    (Segment::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                    (Segment::Wildcard, Value::Object(map)) => next.extend(map.values()),
                    _ => {}
                }
            }
            if next.is_empty() {
                return next;
            }
            current = next;
        }
        current
    }
}

fn key_end(s: &str, start: usize) -> usize {
    s[start..]
        .find(['.', '['])
        .map(|p| start + p)
        .unwrap_or(s.len())
}

fn key_segment(key: &str) -> Option<Segment> {
    match key.trim() {
        "" => None,
        "*" => Some(Segment::Wildcard),
        k => Some(Segment::Key(k.to_string())),
    }
}

fn bracket_segment(inner: &str) -> Option<Segment> {
    let inner = inner.trim();
    if inner == "*" {
        return Some(Segment::Wildcard);
    }
    for quote in ['\'', '"'] {
        if let Some(name) = inner
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return Some(Segment::Key(name.to_string()));
        }
    }
    inner.parse().ok().map(Segment::Index)
}

fn invalid_path(expr: &str, reason: &str) -> BlockingError {
    BlockingError::Config(format!("invalid field path '{}': {}", expr, reason))
}

/// String form of a scalar JSON value; `None` for null, arrays and objects.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Resolves the identifier and blocking values of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldExtractor {
    id_path: FieldPath,
    fields: Vec<FieldPath>,
}

impl FieldExtractor {
    /// Parses the identifier path and the ordered blocking-field paths.
    pub fn new<S: AsRef<str>>(id_path: &str, fields: &[S]) -> Result<Self, BlockingError> {
        let id_path = FieldPath::parse(id_path)?;
        let fields = fields
            .iter()
            .map(|f| FieldPath::parse(f.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { id_path, fields })
    }

    /// The identifier path.
    pub fn id_path(&self) -> &FieldPath {
        &self.id_path
    }

    /// The blocking-field paths, in order.
    pub fn fields(&self) -> &[FieldPath] {
        &self.fields
    }

    /// Extracts `(identifier, values)` from one record.
    ///
    /// The identifier path must match exactly one non-empty scalar. Blocking
    /// paths that match nothing simply contribute no values.
    pub fn extract(&self, record: &Value) -> Result<RecordRef, ExtractionError> {
        let path = self.id_path.as_str();
        let matches: Vec<&Value> = self
            .id_path
            .resolve(record)
            .into_iter()
            .filter(|v| !v.is_null())
            .collect();
        let id = match matches.as_slice() {
            [] => {
                return Err(ExtractionError::MissingId {
                    path: path.to_string(),
                })
            }
            [single] => scalar_text(single).ok_or_else(|| ExtractionError::NonScalarId {
                path: path.to_string(),
            })?,
            many => {
                return Err(ExtractionError::AmbiguousId {
                    path: path.to_string(),
                    count: many.len(),
                })
            }
        };
        if id.is_empty() {
            return Err(ExtractionError::EmptyId {
                path: path.to_string(),
            });
        }

        let mut values = Vec::new();
        for field in &self.fields {
            for matched in field.resolve(record) {
                match matched {
                    Value::Array(items) => values.extend(items.iter().filter_map(scalar_text)),
                    other => values.extend(scalar_text(other)),
                }
            }
        }
        Ok(RecordRef::new(id, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor(id: &str, fields: &[&str]) -> FieldExtractor {
        FieldExtractor::new(id, fields).unwrap()
    }

    #[test]
    fn test_parse_forms() {
        let p = FieldPath::parse("$.person.names[0]").unwrap();
        assert_eq!(
            p.segments,
            vec![
                Segment::Key("person".into()),
                Segment::Key("names".into()),
                Segment::Index(0)
            ]
        );
        let p = FieldPath::parse("addresses[*].city").unwrap();
        assert_eq!(
            p.segments,
            vec![
                Segment::Key("addresses".into()),
                Segment::Wildcard,
                Segment::Key("city".into())
            ]
        );
        let p = FieldPath::parse("$['first name']").unwrap();
        assert_eq!(p.segments, vec![Segment::Key("first name".into())]);
        assert!(FieldPath::parse("$").unwrap().segments.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse("a[1").is_err());
        assert!(FieldPath::parse("a[x]").is_err());
        assert!(FieldPath::parse("$name").is_err());
    }

    #[test]
    fn test_extract_simple() {
        let ex = extractor("$.id", &["$.first", "$.last"]);
        let rec = ex
            .extract(&json!({"id": "r1", "first": "John", "last": "Smith"}))
            .unwrap();
        assert_eq!(rec.id, "r1");
        assert_eq!(rec.values, vec!["John", "Smith"]);
    }

    #[test]
    fn test_numeric_id_and_values() {
        let ex = extractor("id", &["age", "active"]);
        let rec = ex.extract(&json!({"id": 42, "age": 31, "active": true})).unwrap();
        assert_eq!(rec.id, "42");
        assert_eq!(rec.values, vec!["31", "true"]);
    }

    #[test]
    fn test_list_values_flattened_in_path_order() {
        let ex = extractor("id", &["aliases", "name"]);
        let rec = ex
            .extract(&json!({"id": "a", "name": "Bob", "aliases": ["Rob", null, "Bobby"]}))
            .unwrap();
        assert_eq!(rec.values, vec!["Rob", "Bobby", "Bob"]);
    }

    #[test]
    fn test_wildcard_over_objects() {
        let ex = extractor("id", &["addresses[*].city"]);
        let rec = ex
            .extract(&json!({
                "id": "a",
                "addresses": [{"city": "Oslo"}, {"zip": "1"}, {"city": "Bergen"}]
            }))
            .unwrap();
        assert_eq!(rec.values, vec!["Oslo", "Bergen"]);
    }

    #[test]
    fn test_object_wildcard_visits_keys_sorted() {
        let path = FieldPath::parse("$.names.*").unwrap();
        let record = json!({"names": {"zeta": "z", "alpha": "a", "mid": "m"}});
        let found: Vec<&str> = path
            .resolve(&record)
            .into_iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(found, vec!["a", "m", "z"]);
    }

    #[test]
    fn test_missing_field_contributes_nothing() {
        let ex = extractor("id", &["name", "nickname"]);
        let rec = ex.extract(&json!({"id": "a", "name": "Ann"})).unwrap();
        assert_eq!(rec.values, vec!["Ann"]);
    }

    #[test]
    fn test_missing_id_is_error() {
        let ex = extractor("id", &["name"]);
        assert_eq!(
            ex.extract(&json!({"name": "Ann"})),
            Err(ExtractionError::MissingId { path: "id".into() })
        );
        assert_eq!(
            ex.extract(&json!({"id": null, "name": "Ann"})),
            Err(ExtractionError::MissingId { path: "id".into() })
        );
    }

    #[test]
    fn test_ambiguous_and_non_scalar_id() {
        let ex = extractor("ids[*]", &["name"]);
        assert_eq!(
            ex.extract(&json!({"ids": ["a", "b"]})),
            Err(ExtractionError::AmbiguousId {
                path: "ids[*]".into(),
                count: 2
            })
        );
        let ex = extractor("id", &["name"]);
        assert!(matches!(
            ex.extract(&json!({"id": {"k": 1}})),
            Err(ExtractionError::NonScalarId { .. })
        ));
        assert!(matches!(
            ex.extract(&json!({"id": ""})),
            Err(ExtractionError::EmptyId { .. })
        ));
    }

    #[test]
    fn test_non_object_record() {
        let ex = extractor("id", &["name"]);
        assert!(matches!(
            ex.extract(&json!([1, 2, 3])),
            Err(ExtractionError::MissingId { .. })
        ));
    }
}
