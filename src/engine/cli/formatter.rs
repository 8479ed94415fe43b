//! CLI Output Formatting Module
//! Provides consistent, colorized output for terminal UX

use colored::Colorize;
use serde_json::Value;

pub struct CliFormatter;

impl CliFormatter {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    /// Print an error message
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    /// Print a section header
    pub fn header(title: &str) {
        println!("\n{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(title.chars().count()).bright_black());
    }

    /// Print a key-value pair
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", key.bright_white().bold(), value);
    }

    pub fn item(text: &str) {
        println!("  {} {}", "•".bright_black(), text);
    }

    /// Print a code block
    pub fn code_block(code: &str, language: &str) {
        println!("\n{}", format!("```{}", language).bright_black());
        for line in code.lines() {
            println!("  {}", line.bright_white());
        }
        println!("{}\n", "```".bright_black());
    }

    /// Print one parameter payload as `name = value` lines
    pub fn params(payload: &serde_json::Map<String, Value>) {
        if payload.is_empty() {
            Self::item("(no parameters)");
        }
        for (name, value) in payload {
            Self::kv(name, &format_value(value));
        }
    }
}

/// Compact rendering of a bound value: strings quoted, structures as JSON
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&json!("abc")), "'abc'");
        assert_eq!(format_value(&json!(null)), "NULL");
        assert_eq!(format_value(&json!(42)), "42");
        assert_eq!(format_value(&json!({"$oid": "x"})), r#"{"$oid":"x"}"#);
    }
}
