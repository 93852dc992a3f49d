// ==============================================================================
// reporter.rs - QC Run Event Log
// ==============================================================================
// Description: Reporter capability (info/warn/error/counter) and its event log
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-02-03
// Version: 2.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Sink for user-facing messages and run counters
pub trait Reporter: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn counter(&self, name: &str, delta: i64);
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReportEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: LogSeverity,
    pub message: String,
}

impl ReportEvent {
    pub fn new(severity: LogSeverity, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct EventLogReport<'a, T: Serialize> {
    events: &'a [ReportEvent],
    counters: &'a BTreeMap<String, i64>,
    #[serde(flatten)]
    extra: T,
}

/// Reporter that forwards to tracing and keeps every event for the run report
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<ReportEvent>>,
    counters: Mutex<BTreeMap<String, i64>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, severity: LogSeverity, message: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push(ReportEvent::new(severity, message));
        }
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn counters(&self) -> BTreeMap<String, i64> {
        self.counters.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn counter_value(&self, name: &str) -> i64 {
        self.counters()
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Write events, counters and any extra serializable fields as pretty JSON
    ///
    /// # Arguments
    /// * `path` - Output file
    /// * `extra` - Struct or map flattened into the top-level object
    pub fn write_json<T: Serialize>(&self, path: &Path, extra: T) -> anyhow::Result<()> {
        let events = self.events();
        let counters = self.counters();
        let report = EventLogReport {
            events: &events,
            counters: &counters,
            extra,
        };

        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &report)?;
        info!("Run report written to {:?}", path);
        Ok(())
    }
}

impl Reporter for EventLog {
    fn info(&self, message: &str) {
        info!("{}", message);
        self.record(LogSeverity::Info, message);
    }

    fn warn(&self, message: &str) {
        warn!("{}", message);
        self.record(LogSeverity::Warning, message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
        self.record(LogSeverity::Error, message);
    }

    fn counter(&self, name: &str, delta: i64) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(name.to_string()).or_insert(0) += delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_event_log_records_messages() {
        let log = EventLog::new();
        log.info("Reference Panel Ranges: genome-wide");
        log.warn("Skip allele frequency check.");
        log.error("No chunks passed QC. Imputation cannot be started!");

        let events = log.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].severity, LogSeverity::Warning);
        assert_eq!(events[1].message, "Skip allele frequency check.");
        assert_ne!(events[0].id, events[1].id);
    }

    #[test]
    fn test_counters_accumulate() {
        let log = EventLog::new();
        log.counter("remainingSnps", 10);
        log.counter("remainingSnps", 5);
        log.counter("filtered", -1);

        assert_eq!(log.counter_value("remainingSnps"), 15);
        assert_eq!(log.counter_value("filtered"), -1);
        assert_eq!(log.counter_value("missing"), 0);
    }

    #[test]
    fn test_write_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");

        let log = EventLog::new();
        log.info("done");
        log.counter("overallChunks", 3);
        log.write_json(&path, serde_json::json!({ "accepted": true }))
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(value["accepted"], true);
        assert_eq!(value["counters"]["overallChunks"], 3);
        assert_eq!(value["events"][0]["severity"], "info");
        assert_eq!(value["events"][0]["message"], "done");
    }
}
