//! Output formatting for the lessonpath CLI.
//!
//! Text output is one line per record, identifier first, then `key:value`
//! pairs. JSON output is pretty-printed and lists are wrapped in an envelope.

use anyhow::Result;
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Machine-readable JSON
    Json,
    /// Concise text
    #[default]
    Text,
}

impl OutputFormat {
    #[must_use]
    pub const fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Fields rendered first, without a label, in text output.
const ID_KEYS: [&str; 3] = ["lesson_id", "user_id", "id"];

#[derive(Debug, Clone)]
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Format data according to the configured output format
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
            OutputFormat::Text => Ok(render_text(&serde_json::to_value(data)?)),
        }
    }

    /// Format and print data to stdout
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails
    pub fn print<T: Serialize>(&self, data: &T) -> Result<()> {
        let output = self.format(data)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{output}")?;
        Ok(())
    }

    /// Format a list; JSON wraps it as `{ <collection_name>, count, advice }`.
    pub fn format_list<T: Serialize>(
        &self,
        data: &[T],
        empty_message: &str,
        collection_name: &str,
        advice: &[&str],
    ) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                let mut envelope = serde_json::Map::new();
                envelope.insert(collection_name.to_string(), serde_json::to_value(data)?);
                envelope.insert("count".to_string(), serde_json::json!(data.len()));
                envelope.insert("advice".to_string(), serde_json::json!(advice));
                Ok(serde_json::to_string_pretty(&serde_json::Value::Object(
                    envelope,
                ))?)
            }
            OutputFormat::Text if data.is_empty() => Ok(empty_message.to_string()),
            OutputFormat::Text => self.format(&data),
        }
    }

    /// Print a list with a custom empty message
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails
    pub fn print_list<T: Serialize>(
        &self,
        data: &[T],
        empty_message: &str,
        collection_name: &str,
        advice: &[&str],
    ) -> Result<()> {
        let output = self.format_list(data, empty_message, collection_name, advice)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{output}")?;
        Ok(())
    }

    /// Print an optional record; text output shows `none_message` for `None`,
    /// JSON shows `null`.
    pub fn print_optional<T: Serialize>(&self, data: Option<&T>, none_message: &str) -> Result<()> {
        match (data, self.format) {
            (Some(data), _) => self.print(data),
            (None, OutputFormat::Json) => self.print(&serde_json::Value::Null),
            (None, OutputFormat::Text) => {
                let mut stdout = io::stdout().lock();
                writeln!(stdout, "{none_message}")?;
                Ok(())
            }
        }
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(OutputFormat::default())
    }
}

fn render_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut parts: Vec<String> = ID_KEYS
                .iter()
                .filter_map(|key| map.get(*key))
                .map(render_field_value)
                .collect();

            for (key, val) in map {
                if ID_KEYS.contains(&key.as_str()) {
                    continue;
                }
                match val {
                    serde_json::Value::Array(arr) if arr.is_empty() => {}
                    serde_json::Value::Null => {}
                    _ => parts.push(format!("{key}:{}", render_field_value(val))),
                }
            }
            parts.join("  ")
        }
        serde_json::Value::Array(arr) => arr.iter().map(render_text).collect::<Vec<_>>().join("\n"),
        _ => render_field_value(value),
    }
}

fn render_field_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) if s.contains(' ') || s.contains('\n') => {
            format!("\"{}\"", s.replace('\n', "\\n"))
        }
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(render_field_value).collect();
            format!("[{}]", items.join(","))
        }
        serde_json::Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| format!("{k}:{}", render_field_value(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}
