// Output formatting for CLI

use crate::cli::config::OutputFormat;
use crate::cli::CliResult;
use std::io::Write;

/// Format and output reports
pub struct OutputFormatter {
    format: OutputFormat,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    /// Output one report
    pub fn output(&self, report: &serde_json::Value, writer: &mut impl Write) -> CliResult<()> {
        match self.format {
            OutputFormat::Pretty => writeln!(writer, "{}", serde_json::to_string_pretty(report)?)?,
            OutputFormat::Json => writeln!(writer, "{}", serde_json::to_string(report)?)?,
            OutputFormat::KeyValue => self.output_key_value(report, "", writer)?,
        }
        Ok(())
    }

    /// Output as flattened key-value pairs
    fn output_key_value(
        &self,
        value: &serde_json::Value,
        prefix: &str,
        writer: &mut impl Write,
    ) -> CliResult<()> {
        match value {
            serde_json::Value::Object(obj) => {
                for (key, inner) in obj {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    self.output_key_value(inner, &path, writer)?;
                }
            }
            serde_json::Value::Array(items) => {
                for (i, inner) in items.iter().enumerate() {
                    self.output_key_value(inner, &format!("{}[{}]", prefix, i), writer)?;
                }
            }
            other => writeln!(writer, "{}: {}", prefix, format_value(other))?,
        }
        Ok(())
    }

    /// Print success message
    pub fn print_success(&self, message: &str) {
        if !self.quiet {
            eprintln!("✓ {}", message);
        }
    }

    /// Print error message
    pub fn print_error(&self, message: &str) {
        eprintln!("✗ {}", message);
    }
}

/// Format a scalar JSON value for display
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "(null)".to_string(),
        other => other.to_string(),
    }
}
