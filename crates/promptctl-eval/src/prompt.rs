use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use promptctl_core::error::LoadError;

use crate::dataset::TestInput;

/// A prompt template plus its generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    /// Template text with `{{placeholder}}` tokens.
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Front-matter keys without a typed field.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

/// System and user text produced for one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            name: None,
            model: None,
            temperature: None,
            max_output_tokens: None,
            extra: Map::new(),
            source_path: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    /// Identifier used in trace events: the prompt name, else its source path.
    pub fn prompt_id(&self) -> Option<String> {
        self.name.clone().or_else(|| {
            self.source_path
                .as_ref()
                .map(|p| p.display().to_string())
        })
    }

    /// Render this prompt's body against a test input.
    pub fn render(&self, input: &TestInput) -> RenderedPrompt {
        render_prompt(&self.body, input)
    }

    /// Load a prompt file. Markdown files may start with a YAML front-matter
    /// block; any other file is taken verbatim as the body.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_markdown = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
            .unwrap_or(false);

        let mut prompt = if is_markdown {
            Self::from_markdown(&text)?
        } else {
            Self::new(text.trim())
        };
        prompt.source_path = Some(std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()));
        Ok(prompt)
    }

    /// Parse markdown text with optional `---` delimited YAML front matter.
    pub fn from_markdown(text: &str) -> Result<Self, LoadError> {
        let Some((yaml, body)) = split_front_matter(text) else {
            return Ok(Self::new(text.trim()));
        };

        let mut prompt = Self::new(body.trim());
        let data: serde_yaml::Value =
            serde_yaml::from_str(yaml).map_err(|e| LoadError::Frontmatter(e.to_string()))?;

        let fields = match data {
            serde_yaml::Value::Null => return Ok(prompt),
            serde_yaml::Value::Mapping(_) => match serde_json::to_value(&data) {
                Ok(Value::Object(map)) => map,
                Ok(_) => return Err(LoadError::Frontmatter("expected a mapping".into())),
                Err(e) => return Err(LoadError::Frontmatter(e.to_string())),
            },
            _ => return Err(LoadError::Frontmatter("expected a mapping".into())),
        };

        for (key, value) in fields {
            // Known keys with the wrong type are dropped.
            match key.as_str() {
                "name" => prompt.name = value.as_str().map(String::from),
                "model" => prompt.model = value.as_str().map(String::from),
                "temperature" => prompt.temperature = value.as_f64(),
                "max_output_tokens" => {
                    prompt.max_output_tokens = value.as_u64().and_then(|n| u32::try_from(n).ok())
                }
                _ => {
                    prompt.extra.insert(key, value);
                }
            }
        }
        Ok(prompt)
    }
}

/// Split `---\n<yaml>\n---\n<body>` into its two halves.
fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Largest integer a double holds exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// String form of a JSON value as inserted into templates and messages.
///
/// Strings are used raw and integral floats lose their fraction. Arrays are
/// the text of their elements joined with `,`, with `null` elements left
/// empty. Objects are compact JSON.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                item => value_text(item),
            })
            .collect::<Vec<_>>()
            .join(","),
        other => integral_numbers(other).to_string(),
    }
}

/// Copy of `value` with every float that has no fractional part written as
/// an integer, so `1.0` prints as `1`.
fn integral_numbers(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_INTEGER => Value::from(f as i64),
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(integral_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| (key.clone(), integral_numbers(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Substitute `{{key}}` placeholders in `template` from `input`.
///
/// Substitution is literal and best-effort: unknown keys are ignored and
/// unmatched placeholders are left in place. The user text is always the raw
/// input as pretty-printed JSON.
pub fn render_prompt(template: &str, input: &TestInput) -> RenderedPrompt {
    let (system, raw) = match input {
        TestInput::Variables(vars) => {
            let mut system = template.to_string();
            for (key, value) in vars {
                let token = format!("{{{{{key}}}}}");
                system = system.replace(&token, &value_text(value));
            }
            (system, Value::Object(vars.clone()))
        }
        TestInput::Text(text) => (
            template.replace("{{input}}", text),
            Value::String(text.clone()),
        ),
    };

    let user = format!(
        "INPUT:\n{}",
        serde_json::to_string_pretty(&integral_numbers(&raw)).unwrap_or_default()
    );

    RenderedPrompt { system, user }
}
