//! Timing metrics for a packaging run
//!
//! Records when each main stage finished plus arbitrary detailed phases, and
//! renders them as a report for debugging slow packages.

use std::time::{Duration, Instant};

/// Timing metrics for one packaging run
#[derive(Debug)]
pub struct PackMetrics {
    /// When measurement started
    start: Instant,
    /// Large assets fetched (or read from cache)
    pub assets_fetched: Option<Duration>,
    /// Page rendered
    pub document_rendered: Option<Duration>,
    /// Payload archive assembled
    pub payload_assembled: Option<Duration>,
    /// Runtime layout transformed
    pub layout_transformed: Option<Duration>,
    /// Output serialized
    pub serialized: Option<Duration>,
    /// Whole run completed
    pub total: Option<Duration>,
    /// Individual phase timings for detailed analysis
    phases: Vec<(String, Duration)>,
}

impl Default for PackMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PackMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            assets_fetched: None,
            document_rendered: None,
            payload_assembled: None,
            layout_transformed: None,
            serialized: None,
            total: None,
            phases: Vec::new(),
        }
    }

    pub fn mark_assets_fetched(&mut self) {
        self.assets_fetched = Some(self.start.elapsed());
    }

    pub fn mark_document_rendered(&mut self) {
        self.document_rendered = Some(self.start.elapsed());
    }

    pub fn mark_payload_assembled(&mut self) {
        self.payload_assembled = Some(self.start.elapsed());
    }

    pub fn mark_layout_transformed(&mut self) {
        self.layout_transformed = Some(self.start.elapsed());
    }

    pub fn mark_serialized(&mut self) {
        self.serialized = Some(self.start.elapsed());
    }

    pub fn mark_total(&mut self) {
        self.total = Some(self.start.elapsed());
    }

    /// Add a custom phase timing
    pub fn add_phase(&mut self, name: impl Into<String>, duration: Duration) {
        self.phases.push((name.into(), duration));
    }

    /// Time a closure and record it as a phase
    pub fn time_phase<F, R>(&mut self, name: impl Into<String>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let phase_start = Instant::now();
        let result = f();
        self.phases.push((name.into(), phase_start.elapsed()));
        result
    }

    /// Recorded detailed phases, in order
    pub fn phases(&self) -> &[(String, Duration)] {
        &self.phases
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn format_duration(d: Duration) -> String {
        let ms = d.as_secs_f64() * 1000.0;
        if ms < 1.0 {
            format!("{}µs", d.as_micros())
        } else if ms < 1000.0 {
            format!("{:.2}ms", ms)
        } else {
            format!("{:.2}s", d.as_secs_f64())
        }
    }

    fn format_delta(prev: Option<Duration>, curr: Duration) -> String {
        match prev {
            Some(p) if curr > p => format!("+{}", Self::format_duration(curr - p)),
            Some(_) => String::new(),
            None => format!("+{}", Self::format_duration(curr)),
        }
    }

    /// Generate a formatted report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        lines.push("=== Packaging Performance ===".to_string());
        lines.push(format!(
            "Total elapsed: {}",
            Self::format_duration(self.total.unwrap_or_else(|| self.elapsed()))
        ));
        lines.push(String::new());

        lines.push("--- Main Phases ---".to_string());
        let stages = [
            ("Assets fetched:", self.assets_fetched),
            ("Document rendered:", self.document_rendered),
            ("Payload assembled:", self.payload_assembled),
            ("Layout transformed:", self.layout_transformed),
            ("Serialized:", self.serialized),
        ];
        let mut prev: Option<Duration> = None;
        for (label, mark) in stages {
            if let Some(d) = mark {
                lines.push(format!(
                    "  {:<20} {:>10} ({})",
                    label,
                    Self::format_duration(d),
                    Self::format_delta(prev, d)
                ));
                prev = Some(d);
            }
        }

        if !self.phases.is_empty() {
            lines.push(String::new());
            lines.push("--- Detailed Phases ---".to_string());
            for (name, duration) in &self.phases {
                lines.push(format!(
                    "  {:<20} {:>10}",
                    name,
                    Self::format_duration(*duration)
                ));
            }
        }

        lines.push("=".repeat(40));
        lines.join("\n")
    }

    /// Log the report using tracing
    pub fn log_report(&self) {
        for line in self.report().lines() {
            if line.is_empty() {
                continue;
            }
            tracing::debug!(target: "stagepack::packager", "{}", line);
        }
    }
}
