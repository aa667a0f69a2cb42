use std::io::{self, Write};

use serde::Serialize;

use crate::validator::{ProgressEvent, ProgressSink, ValidationReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &ValidationReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn render(report: &ValidationReport) -> io::Result<String> {
        serde_json::to_string_pretty(report).map_err(io::Error::other)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}
