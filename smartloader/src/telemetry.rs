//! telemetry.rs
//!
//! JSONL telemetry sink for the control loop.
//!
//! One JSON object per line. The episode controller writes a `step` record
//! per decision and an `episode_end` record per episode (see
//! `rl::telemetry`); other producers may log arbitrary serializable values.
//!
//! # Environment variables
//!
//! - `SMARTLOADER_TELEMETRY_MODE`: `"off"` (default) or `"jsonl"`.
//! - `SMARTLOADER_TELEMETRY_PATH`: JSONL file path. Required for `"jsonl"`.
//! - `SMARTLOADER_TELEMETRY_APPEND`: `"1"`/`"true"`/`"yes"` appends instead of
//!   truncating.
//!
//! The sink never fails the caller: a missing path, an unopenable file or a
//! write error switches it off for the rest of the process.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryMode {
    Off,
    Jsonl,
}

impl TelemetryMode {
    pub fn parse(s: &str) -> TelemetryMode {
        match s.trim().to_lowercase().as_str() {
            "jsonl" => TelemetryMode::Jsonl,
            _ => TelemetryMode::Off,
        }
    }

    pub fn from_env() -> Self {
        env::var("SMARTLOADER_TELEMETRY_MODE")
            .map(|s| TelemetryMode::parse(&s))
            .unwrap_or(TelemetryMode::Off)
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub mode: TelemetryMode,
    pub path: Option<PathBuf>,
    pub append: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::off()
    }
}

impl TelemetryConfig {
    pub fn off() -> Self {
        Self {
            mode: TelemetryMode::Off,
            path: None,
            append: false,
        }
    }

    pub fn jsonl(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: TelemetryMode::Jsonl,
            path: Some(path.into()),
            append: false,
        }
    }

    pub fn from_env() -> Self {
        let mode = TelemetryMode::from_env();
        let path = match mode {
            TelemetryMode::Jsonl => env::var("SMARTLOADER_TELEMETRY_PATH").ok().map(PathBuf::from),
            TelemetryMode::Off => None,
        };
        let append = env::var("SMARTLOADER_TELEMETRY_APPEND")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self { mode, path, append }
    }
}

/// Lazily opened JSONL writer. All methods are no-ops when off.
pub struct TelemetrySink {
    mode: TelemetryMode,
    path: Option<PathBuf>,
    append: bool,
    writer: Option<BufWriter<File>>,
    lines: u64,
}

impl TelemetrySink {
    pub fn from_env() -> Self {
        Self::from_config(TelemetryConfig::from_env())
    }

    pub fn from_config(cfg: TelemetryConfig) -> Self {
        Self {
            mode: cfg.mode,
            path: cfg.path,
            append: cfg.append,
            writer: None,
            lines: 0,
        }
    }

    pub fn disabled() -> Self {
        Self::from_config(TelemetryConfig::off())
    }

    pub fn is_enabled(&self) -> bool {
        self.mode == TelemetryMode::Jsonl
    }

    /// Lines written so far.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    fn disable(&mut self, why: &str) {
        warn!(path = ?self.path, "telemetry disabled: {why}");
        self.mode = TelemetryMode::Off;
        self.writer = None;
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if self.mode != TelemetryMode::Jsonl {
            return None;
        }
        if self.writer.is_none() {
            let Some(path) = self.path.clone() else {
                self.disable("no path configured");
                return None;
            };
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let mut options = OpenOptions::new();
            options.create(true).write(true);
            if self.append {
                options.append(true);
            } else {
                options.truncate(true);
            }
            match options.open(&path) {
                Ok(file) => self.writer = Some(BufWriter::new(file)),
                Err(_) => {
                    self.disable("cannot open file");
                    return None;
                }
            }
        }
        self.writer.as_mut()
    }

    /// Serialize `record` as one line.
    pub fn log<T: Serialize>(&mut self, record: &T) {
        if self.mode != TelemetryMode::Jsonl {
            return;
        }
        let Ok(line) = serde_json::to_string(record) else {
            return;
        };
        let Some(writer) = self.ensure_writer() else {
            return;
        };
        if writeln!(writer, "{line}").is_err() {
            self.disable("write failed");
            return;
        }
        self.lines += 1;
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

impl Drop for TelemetrySink {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn off_sink_writes_nothing() {
        let mut sink = TelemetrySink::disabled();
        sink.log(&json!({"step": 1}));
        assert_eq!(sink.lines(), 0);
        assert!(!sink.is_enabled());
    }

    #[test]
    fn jsonl_sink_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t.jsonl");
        {
            let mut sink = TelemetrySink::from_config(TelemetryConfig::jsonl(&path));
            sink.log(&json!({"step": 1}));
            sink.log(&json!({"step": 2}));
            assert_eq!(sink.lines(), 2);
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["step"], 2);
    }

    #[test]
    fn jsonl_without_path_disables_itself() {
        let mut sink = TelemetrySink::from_config(TelemetryConfig {
            mode: TelemetryMode::Jsonl,
            path: None,
            append: false,
        });
        sink.log(&json!({"step": 1}));
        assert!(!sink.is_enabled());
    }

    #[test]
    fn mode_parse_defaults_to_off() {
        assert_eq!(TelemetryMode::parse("JSONL"), TelemetryMode::Jsonl);
        assert_eq!(TelemetryMode::parse("csv"), TelemetryMode::Off);
    }
}
