//! User-visible run output.
//!
//! One informational line per completed transfer/delete and one error line
//! per failed or warned item, rendered either as plain text or as JSON.

use colored::Colorize;
use humansize::{format_size, DECIMAL};
use serde::Serialize;
use std::fmt;

use crate::error::FD_LIMIT_GUIDANCE;

/// How run output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Record emitted for every completed operation.
#[derive(Debug, Serialize)]
pub struct InfoMessage {
    pub operation: &'static str,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl InfoMessage {
    pub fn print(&self, format: LogFormat) {
        match format {
            LogFormat::Text => println!("{self}"),
            LogFormat::Json => {
                if let Ok(line) = serde_json::to_string(self) {
                    println!("{line}");
                }
            }
        }
    }
}

impl fmt::Display for InfoMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.operation, self.source)?;
        if let Some(destination) = &self.destination {
            write!(f, " {destination}")?;
        }
        if let Some(size) = self.size {
            write!(f, " ({})", format_size(size, DECIMAL))?;
        }
        Ok(())
    }
}

/// Record emitted for every failed or warned item.
#[derive(Debug, Serialize)]
struct ErrorMessage {
    command: String,
    operation: String,
    error: String,
}

pub fn print_error(command: &str, operation: &str, err: &impl fmt::Display, format: LogFormat) {
    print_with_severity("ERROR".red().bold(), command, operation, err, format);
}

pub fn print_warning(command: &str, operation: &str, err: &impl fmt::Display, format: LogFormat) {
    print_with_severity("WARN".yellow().bold(), command, operation, err, format);
}

fn print_with_severity(
    severity: colored::ColoredString,
    command: &str,
    operation: &str,
    err: &impl fmt::Display,
    format: LogFormat,
) {
    match format {
        LogFormat::Text => eprintln!("{severity} \"{command}\" ({operation}): {err}"),
        LogFormat::Json => {
            let message = ErrorMessage {
                command: command.to_string(),
                operation: operation.to_string(),
                error: err.to_string(),
            };
            if let Ok(line) = serde_json::to_string(&message) {
                eprintln!("{line}");
            }
        }
    }
}

/// Printed once before aborting on file-descriptor exhaustion.
pub fn print_fd_limit_guidance() {
    eprintln!("{}", FD_LIMIT_GUIDANCE.trim());
}
