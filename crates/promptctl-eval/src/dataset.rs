use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use promptctl_core::error::LoadError;

use crate::assertion::Assertion;

/// Input for one test case: a bare string or named placeholder values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestInput {
    Text(String),
    Variables(Map<String, Value>),
}

impl From<&str> for TestInput {
    fn from(text: &str) -> Self {
        TestInput::Text(text.to_string())
    }
}

impl From<Map<String, Value>> for TestInput {
    fn from(vars: Map<String, Value>) -> Self {
        TestInput::Variables(vars)
    }
}

/// A single test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Unique, non-empty identifier within its test set.
    pub id: String,
    pub input: TestInput,
    /// Reference output, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Checks applied to the model output, in order.
    #[serde(default, rename = "assert", skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<Assertion>,
    /// Additional metadata (tags, category, difficulty, etc.)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl TestCase {
    pub fn new(id: impl Into<String>, input: impl Into<TestInput>) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            expected: None,
            assertions: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Build a case whose input is the given JSON object.
    pub fn with_variables(id: impl Into<String>, vars: Value) -> Self {
        let input = match vars {
            Value::Object(map) => TestInput::Variables(map),
            Value::String(s) => TestInput::Text(s),
            other => TestInput::Text(other.to_string()),
        };
        Self::new(id, input)
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// An ordered collection of test cases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSet {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub cases: Vec<TestCase>,
}

impl TestSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            cases: Vec::new(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn add_case(&mut self, case: TestCase) -> &mut Self {
        self.cases.push(case);
        self
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Load a test file. Every failure is reported against the file path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let label = path.display().to_string();
        let mut set = Self::parse(&text, &label).map_err(|e| match e {
            LoadError::Parse { .. } => e,
            other => LoadError::Parse {
                path: label.clone(),
                reason: other.to_string(),
            },
        })?;
        if set.name.is_empty() {
            set.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        Ok(set)
    }

    /// Parse a JSON array of test cases, or an object with a `cases` array.
    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        Self::parse(json, "<inline>")
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn parse(json: &str, source: &str) -> Result<Self, LoadError> {
        let value: Value = serde_json::from_str(json).map_err(|e| LoadError::Parse {
            path: source.into(),
            reason: e.to_string(),
        })?;

        let (name, description, items) = match value {
            Value::Array(items) => (String::new(), String::new(), items),
            Value::Object(mut obj) => {
                let name = obj
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let description = obj
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                match obj.remove("cases") {
                    Some(Value::Array(items)) => (name, description, items),
                    _ => return Err(LoadError::NotAnArray(source.into())),
                }
            }
            _ => return Err(LoadError::NotAnArray(source.into())),
        };

        Ok(Self {
            name,
            description,
            cases: parse_cases(items)?,
        })
    }
}

fn parse_cases(items: Vec<Value>) -> Result<Vec<TestCase>, LoadError> {
    let mut seen = HashSet::new();
    let mut cases = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let id = match item.get("id") {
            None | Some(Value::Null) => return Err(LoadError::MissingId { index }),
            Some(Value::String(s)) if s.is_empty() => return Err(LoadError::EmptyId { index }),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(LoadError::InvalidTestCase {
                    id: other.to_string(),
                    reason: "\"id\" must be a string".into(),
                })
            }
        };
        if item.get("input").is_none() {
            return Err(LoadError::MissingInput { id });
        }

        let case: TestCase =
            serde_json::from_value(item).map_err(|e| LoadError::InvalidTestCase {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        if !seen.insert(case.id.clone()) {
            return Err(LoadError::DuplicateId(case.id));
        }
        cases.push(case);
    }

    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_creation() {
        let ts = TestSet::new("jokes").with_description("joke prompts");
        assert_eq!(ts.name, "jokes");
        assert_eq!(ts.description, "joke prompts");
        assert!(ts.is_empty());
        assert_eq!(ts.len(), 0);
    }

    #[test]
    fn add_case() {
        let mut ts = TestSet::new("test");
        ts.add_case(TestCase::new("t1", "hello"));
        ts.add_case(TestCase::with_variables("t2", json!({"topic": "cats"})));
        assert_eq!(ts.len(), 2);
        assert_eq!(ts.cases[0].id, "t1");
        assert!(matches!(ts.cases[1].input, TestInput::Variables(_)));
    }

    #[test]
    fn from_json_array() {
        let ts = TestSet::from_json(
            r#"[
                {"id": "t1", "input": {"topic": "cats"}, "assert": [{"type": "contains", "value": "cat"}]},
                {"id": "t2", "input": "plain text", "expected": "ok"}
            ]"#,
        )
        .unwrap();
        assert_eq!(ts.len(), 2);
        assert_eq!(ts.cases[0].assertions.len(), 1);
        assert_eq!(ts.cases[1].input, TestInput::Text("plain text".into()));
        assert_eq!(ts.cases[1].expected.as_deref(), Some("ok"));
        assert!(ts.cases[1].assertions.is_empty());
    }

    #[test]
    fn from_json_object_with_cases() {
        let ts = TestSet::from_json(
            r#"{"name": "suite", "description": "d", "cases": [{"id": "a", "input": "x"}]}"#,
        )
        .unwrap();
        assert_eq!(ts.name, "suite");
        assert_eq!(ts.description, "d");
        assert_eq!(ts.len(), 1);
    }

    #[test]
    fn rejects_non_array() {
        let err = TestSet::from_json(r#""nope""#).unwrap_err();
        assert!(matches!(err, LoadError::NotAnArray(_)));
        let err = TestSet::from_json(r#"{"name": "x"}"#).unwrap_err();
        assert!(matches!(err, LoadError::NotAnArray(_)));
    }

    #[test]
    fn rejects_missing_or_empty_id() {
        let err = TestSet::from_json(r#"[{"input": "x"}]"#).unwrap_err();
        assert!(matches!(err, LoadError::MissingId { index: 0 }));

        let err = TestSet::from_json(r#"[{"id": "ok", "input": "x"}, {"id": "", "input": "x"}]"#)
            .unwrap_err();
        assert!(matches!(err, LoadError::EmptyId { index: 1 }));
    }

    #[test]
    fn rejects_missing_input() {
        let err = TestSet::from_json(r#"[{"id": "t1"}]"#).unwrap_err();
        assert!(matches!(err, LoadError::MissingInput { ref id } if id == "t1"));
    }

    #[test]
    fn rejects_unsupported_input_shape() {
        let err = TestSet::from_json(r#"[{"id": "t1", "input": 42}]"#).unwrap_err();
        assert!(matches!(err, LoadError::InvalidTestCase { .. }));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = TestSet::from_json(r#"[{"id": "t1", "input": "a"}, {"id": "t1", "input": "b"}]"#)
            .unwrap_err();
        assert!(matches!(err, LoadError::DuplicateId(ref id) if id == "t1"));
    }

    #[test]
    fn malformed_assertions_load_and_fail_later() {
        let ts = TestSet::from_json(
            r#"[{"id": "t", "input": "x", "assert": [{"type": "regex", "pattern": 5}, {"value": "x"}]}]"#,
        )
        .unwrap();
        let assertions = &ts.cases[0].assertions;
        assert_eq!(assertions[0], Assertion::regex("5"));
        assert_eq!(assertions[1].kind(), "undefined");
        assert!(!assertions[1].evaluate("x").pass);
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = TestSet::from_json("[{").unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn load_wraps_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, r#"[{"input": "x"}]"#).unwrap();

        let err = TestSet::load(&path).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to parse test file"));
        assert!(msg.contains("broken.json"));
        assert!(msg.contains("missing \"id\""));
    }

    #[test]
    fn load_names_set_after_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smoke.json");
        std::fs::write(&path, r#"[{"id": "t1", "input": "x"}]"#).unwrap();

        let ts = TestSet::load(&path).unwrap();
        assert_eq!(ts.name, "smoke");
        assert_eq!(ts.len(), 1);
    }

    #[test]
    fn serde_roundtrip() {
        let mut ts = TestSet::new("roundtrip");
        ts.add_case(
            TestCase::with_variables("t1", json!({"q": "hello"}))
                .with_expected("world")
                .with_assertion(Assertion::contains("wor")),
        );

        let json_str = ts.to_json().unwrap();
        let ts2 = TestSet::from_json(&json_str).unwrap();
        assert_eq!(ts2.name, "roundtrip");
        assert_eq!(ts2.cases, ts.cases);
    }
}
