use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::prompt::value_text;

/// Kind reported for an assertion object without a `type` key.
const MISSING_KIND: &str = "undefined";

/// A single pass/fail check applied to model output.
///
/// Deserialized from `{"type": "<kind>", ...params}`. Unrecognised or missing
/// kinds are kept as [`Assertion::Unknown`], and parameters of the wrong JSON
/// type are coerced to text, so a malformed assertion fails at evaluation
/// time rather than at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAssertion", into = "RawAssertion")]
pub enum Assertion {
    Equals {
        value: Option<Value>,
    },
    Contains {
        value: Option<Value>,
    },
    Regex {
        pattern: Option<String>,
        flags: Option<String>,
    },
    JsonSchema {
        schema: Option<Value>,
    },
    /// Reserved for model-graded checks.
    Custom {
        provider: Option<String>,
        threshold: Option<f64>,
        value: Option<Value>,
    },
    Unknown {
        kind: String,
    },
}

/// Wire shape shared by every assertion kind. Every field is an untyped
/// value so that no parameter can make the whole test file unreadable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawAssertion {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    flags: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    threshold: Option<Value>,
}

/// Text form of a parameter; `null` counts as absent.
fn text_param(value: Option<Value>) -> Option<String> {
    value.filter(|v| !v.is_null()).map(|v| value_text(&v))
}

fn number_param(value: Option<Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl From<RawAssertion> for Assertion {
    fn from(raw: RawAssertion) -> Self {
        let kind = match &raw.kind {
            None => MISSING_KIND.to_string(),
            Some(kind) => value_text(kind),
        };
        match kind.as_str() {
            "equals" => Assertion::Equals { value: raw.value },
            "contains" => Assertion::Contains { value: raw.value },
            "regex" => Assertion::Regex {
                pattern: text_param(raw.pattern),
                flags: text_param(raw.flags),
            },
            "json_schema" => Assertion::JsonSchema { schema: raw.schema },
            "custom" => Assertion::Custom {
                provider: text_param(raw.provider),
                threshold: number_param(raw.threshold),
                value: raw.value,
            },
            _ => Assertion::Unknown { kind },
        }
    }
}

impl From<Assertion> for RawAssertion {
    fn from(assertion: Assertion) -> Self {
        let kind = Some(Value::String(assertion.kind().to_string()));
        match assertion {
            Assertion::Equals { value } | Assertion::Contains { value } => RawAssertion {
                kind,
                value,
                ..Default::default()
            },
            Assertion::Regex { pattern, flags } => RawAssertion {
                kind,
                pattern: pattern.map(Value::String),
                flags: flags.map(Value::String),
                ..Default::default()
            },
            Assertion::JsonSchema { schema } => RawAssertion {
                kind,
                schema,
                ..Default::default()
            },
            Assertion::Custom {
                provider,
                threshold,
                value,
            } => RawAssertion {
                kind,
                value,
                provider: provider.map(Value::String),
                threshold: threshold.map(Value::from),
                ..Default::default()
            },
            Assertion::Unknown { .. } => RawAssertion {
                kind,
                ..Default::default()
            },
        }
    }
}

impl Assertion {
    pub fn equals(value: impl Into<String>) -> Self {
        Assertion::Equals {
            value: Some(Value::String(value.into())),
        }
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Assertion::Contains {
            value: Some(Value::String(value.into())),
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Assertion::Regex {
            pattern: Some(pattern.into()),
            flags: None,
        }
    }

    pub fn regex_with_flags(pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        Assertion::Regex {
            pattern: Some(pattern.into()),
            flags: Some(flags.into()),
        }
    }

    pub fn json_schema(schema: Value) -> Self {
        Assertion::JsonSchema {
            schema: Some(schema),
        }
    }

    /// The `type` tag of this assertion.
    pub fn kind(&self) -> &str {
        match self {
            Assertion::Equals { .. } => "equals",
            Assertion::Contains { .. } => "contains",
            Assertion::Regex { .. } => "regex",
            Assertion::JsonSchema { .. } => "json_schema",
            Assertion::Custom { .. } => "custom",
            Assertion::Unknown { kind } => kind,
        }
    }

    /// Evaluate this assertion against model output.
    pub fn evaluate(&self, output: &str) -> AssertionResult {
        evaluate_assertion(output, self)
    }
}

/// Outcome of one assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub pass: bool,
    /// 1.0 on pass, 0.0 otherwise.
    pub score: f64,
    /// Present whenever `pass` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AssertionResult {
    pub fn pass() -> Self {
        Self {
            pass: true,
            score: 1.0,
            reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            pass: false,
            score: 0.0,
            reason: Some(reason.into()),
        }
    }

    fn check(pass: bool, reason: impl FnOnce() -> String) -> Self {
        if pass {
            Self::pass()
        } else {
            Self::fail(reason())
        }
    }
}

/// Evaluate `assertion` against `output`. Never fails: bad patterns or
/// schemas produce a failing result with a diagnostic reason.
pub fn evaluate_assertion(output: &str, assertion: &Assertion) -> AssertionResult {
    match assertion {
        Assertion::Equals { value } => match present(value) {
            None => AssertionResult::fail("Assertion value missing"),
            Some(expected) => {
                let pass = matches!(expected, Value::String(s) if s == output);
                AssertionResult::check(pass, || {
                    format!("Expected \"{}\", got \"{output}\"", value_text(expected))
                })
            }
        },
        Assertion::Contains { value } => match present(value) {
            None => AssertionResult::fail("Assertion value missing"),
            Some(needle) => {
                let needle = value_text(needle);
                AssertionResult::check(output.contains(&needle), || {
                    format!("Expected to contain \"{needle}\"")
                })
            }
        },
        Assertion::Regex { pattern, flags } => {
            let Some(pattern) = pattern.as_deref().filter(|p| !p.is_empty()) else {
                return AssertionResult::fail("Regex pattern missing");
            };
            let flags = flags.as_deref().unwrap_or("");
            match RegexMatcher::compile(pattern, flags).and_then(|m| m.is_match(output)) {
                Ok(matched) => AssertionResult::check(matched, || {
                    format!("Expected to match regex /{pattern}/{flags}")
                }),
                Err(e) => AssertionResult::fail(format!("Assertion error: {e}")),
            }
        }
        Assertion::JsonSchema { schema } => match present(schema) {
            None => AssertionResult::fail("JSON Schema missing"),
            Some(schema) => evaluate_json_schema(output, schema),
        },
        Assertion::Custom { .. } => AssertionResult::fail("Custom assertions not yet implemented"),
        Assertion::Unknown { kind } => {
            AssertionResult::fail(format!("Unknown assertion type: {kind}"))
        }
    }
}

/// Treat an explicit JSON `null` like an absent parameter.
fn present(value: &Option<Value>) -> Option<&Value> {
    value.as_ref().filter(|v| !v.is_null())
}

fn evaluate_json_schema(output: &str, schema: &Value) -> AssertionResult {
    let Ok(instance) = serde_json::from_str::<Value>(output) else {
        return AssertionResult::fail("Output is not valid JSON");
    };

    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(e) => return AssertionResult::fail(format!("Assertion error: {e}")),
    };

    let errors: Vec<String> = validator
        .iter_errors(&instance)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        AssertionResult::pass()
    } else {
        AssertionResult::fail(format!(
            "JSON Schema validation failed: {}",
            errors.join(", ")
        ))
    }
}

/// A regex compiled from a pattern plus ECMAScript-style flag letters.
///
/// Backed by `fancy_regex`, so lookaround and backreferences work.
struct RegexMatcher {
    regex: Regex,
    /// `y`: the match must start at offset 0.
    sticky: bool,
}

impl RegexMatcher {
    fn compile(pattern: &str, flags: &str) -> Result<Self, String> {
        let invalid = || format!("Invalid regular expression flags '{flags}'");
        let mut inline = String::new();
        let mut sticky = false;
        let mut seen = String::new();

        for flag in flags.chars() {
            if seen.contains(flag) {
                return Err(invalid());
            }
            seen.push(flag);
            match flag {
                'i' | 'm' | 's' => inline.push(flag),
                'y' => sticky = true,
                // Unicode is always on; global and indices have no effect on
                // a single test.
                'u' | 'v' | 'g' | 'd' => {}
                _ => return Err(invalid()),
            }
        }
        if seen.contains('u') && seen.contains('v') {
            return Err(invalid());
        }

        let source = if inline.is_empty() {
            pattern.to_string()
        } else {
            format!("(?{inline}){pattern}")
        };
        let regex = Regex::new(&source).map_err(|e| e.to_string())?;
        Ok(Self { regex, sticky })
    }

    fn is_match(&self, text: &str) -> Result<bool, String> {
        let found = if self.sticky {
            self.regex
                .find(text)
                .map(|m| m.is_some_and(|m| m.start() == 0))
        } else {
            self.regex.is_match(text)
        };
        found.map_err(|e| e.to_string())
    }
}
