//! Indexing progress reporting.
//!
//! Reports one line per written batch during `krca index` so users see how
//! far along a large run is. Progress is emitted on **stderr** so stdout
//! remains parseable for scripts.

use std::io::Write;

use kube_rca_core::index::{IndexProgress, IndexProgressEvent, NoProgress};

/// Human-friendly progress on stderr: "index  batch 2 / 5  chunks 2,000..4,000  upserted 1,998".
pub struct StderrProgress;

impl IndexProgress for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let IndexProgressEvent::Batch {
            batch,
            batches,
            start,
            end,
            upserted,
        } = event;
        let line = format!(
            "index  batch {} / {}  chunks {}..{}  upserted {}\n",
            batch,
            batches,
            format_number(start as u64),
            format_number(end as u64),
            format_number(upserted as u64)
        );
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IndexProgress for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        let IndexProgressEvent::Batch {
            batch,
            batches,
            start,
            end,
            upserted,
        } = event;
        let obj = serde_json::json!({
            "event": "progress",
            "phase": "indexing",
            "batch": batch,
            "batches": batches,
            "start": start,
            "end": end,
            "upserted": upserted,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IndexProgress> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "unknown progress mode '{}' (expected human, json, or off)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(5461), "5,461");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn progress_mode_parses() {
        assert_eq!("json".parse::<ProgressMode>().unwrap(), ProgressMode::Json);
        assert!("loud".parse::<ProgressMode>().is_err());
    }
}
