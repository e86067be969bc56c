//! Output formatting utilities
//!
//! Provides table and JSON output formatting for CLI commands.

use crate::cli::args::OutputFormat;
use crate::services::UsageSample;
use crate::stabilizer::StabilizerPhase;
use serde::Serialize;
use std::io::{self, Write};

/// Format and print output based on the selected format
pub fn print_output<T: Serialize + TableDisplay>(data: &T, format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match format {
        OutputFormat::Table => {
            writeln!(handle, "{}", data.to_table())?;
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
            writeln!(handle, "{}", json)?;
        }
        OutputFormat::Compact => {
            writeln!(handle, "{}", data.to_compact())?;
        }
    }

    Ok(())
}

/// Print one record of a stream; JSON is emitted one object per line
pub fn print_line<T: Serialize + TableDisplay>(data: &T, format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    let line = match format {
        OutputFormat::Table => data.to_table(),
        OutputFormat::Json => serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Compact => data.to_compact(),
    };
    writeln!(handle, "{}", line)?;
    handle.flush()
}

/// Trait for types that can be displayed as a table
pub trait TableDisplay {
    /// Format as a table string
    fn to_table(&self) -> String;

    /// Format as a compact single line
    fn to_compact(&self) -> String {
        self.to_table().replace('\n', " | ")
    }
}

fn percent_or_na(value: i32) -> String {
    if (0..=100).contains(&value) {
        format!("{}%", value)
    } else {
        "n/a".to_string()
    }
}

/// Result of the probe command
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub gpu_index: u32,
    pub library_present: bool,
    pub ready: bool,
    pub error: Option<String>,
}

impl TableDisplay for ProbeReport {
    fn to_table(&self) -> String {
        let mut output = format!(
            "GPU {}\n  NVML library: {}\n  Provider: {}",
            self.gpu_index,
            if self.library_present { "found" } else { "not found" },
            if self.ready { "ready" } else { "not ready" },
        );
        if let Some(ref e) = self.error {
            output.push_str(&format!("\n  Reason: {}", e));
        }
        output
    }

    fn to_compact(&self) -> String {
        format!(
            "{}:library={},ready={}",
            self.gpu_index, self.library_present, self.ready
        )
    }
}

/// Result of the read command
#[derive(Debug, Clone, Serialize)]
pub struct ReadingOutput {
    pub gpu_index: u32,
    pub gpu_percent: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<u8>,
}

impl TableDisplay for ReadingOutput {
    fn to_table(&self) -> String {
        let mut output = format!(
            "[{}] GPU load: {}",
            self.gpu_index,
            percent_or_na(self.gpu_percent)
        );
        if let Some(mem) = self.memory_percent {
            output.push_str(&format!("\n    Memory bandwidth: {}%", mem));
        }
        output
    }

    fn to_compact(&self) -> String {
        match self.memory_percent {
            Some(mem) => format!("{} {}", self.gpu_percent, mem),
            None => self.gpu_percent.to_string(),
        }
    }
}

impl TableDisplay for UsageSample {
    fn to_table(&self) -> String {
        let phase = match self.phase {
            StabilizerPhase::Uninitialized => "unsupported".to_string(),
            StabilizerPhase::Holding(_) => "holding".to_string(),
            StabilizerPhase::ZeroPending(streak) => format!("zero pending ({})", streak),
            StabilizerPhase::Stable(_) => "stable".to_string(),
        };
        format!(
            "{:>5} (raw {:>4})  {}",
            percent_or_na(self.stable),
            percent_or_na(self.raw),
            phase
        )
    }

    fn to_compact(&self) -> String {
        format!("{} {}", self.stable, self.raw)
    }
}
