//! Progress reporting
//!
//! The packager and its stages publish [`ProgressEvent`]s to any number of
//! [`ProgressListener`]s. Fractional values are always in `[0, 1]` and never
//! decrease within one stream; [`MonotonicProgress`] enforces that at every
//! source.
//!
//! [`TerminalProgress`] renders events with indicatif, [`ProgressRecorder`]
//! keeps them in memory.

use crate::packager::PackagerState;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Resolution of the terminal bars (fraction * BAR_SCALE)
const BAR_SCALE: u64 = 1000;

/// Event published while packaging
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Fetch progress of one large asset
    AssetFetch { asset: String, progress: f64 },
    /// Archive serialization progress
    ArchiveProgress { progress: f64 },
    /// Weighted progress of the whole run
    Overall { progress: f64 },
    /// The packager entered a new state
    Stage { state: PackagerState },
}

/// Receiver of progress events
pub trait ProgressListener: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> ProgressListener for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Fan-out to registered listeners
#[derive(Clone, Default)]
pub struct ProgressHub {
    listeners: Vec<Arc<dyn ProgressListener>>,
}

impl std::fmt::Debug for ProgressHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressHub")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn subscribe(&mut self, listener: Arc<dyn ProgressListener>) {
        self.listeners.push(listener);
    }

    /// Deliver an event to every listener
    pub fn emit(&self, event: ProgressEvent) {
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }
}

/// Clamp-and-ratchet filter for a single progress stream
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicProgress {
    last: Option<f64>,
}

impl MonotonicProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value to publish, or `None` when it would go backwards
    /// or repeat the previous value
    pub fn advance(&mut self, value: f64) -> Option<f64> {
        if value.is_nan() {
            return None;
        }
        let value = value.clamp(0.0, 1.0);
        match self.last {
            Some(last) if value <= last => None,
            _ => {
                self.last = Some(value);
                Some(value)
            }
        }
    }

    /// Last published value
    pub fn current(&self) -> f64 {
        self.last.unwrap_or(0.0)
    }
}

/// Listener that keeps every event, mostly for tests and diagnostics
#[derive(Debug, Default)]
pub struct ProgressRecorder {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events so far
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Values published for one asset
    pub fn asset_progress(&self, asset: &str) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::AssetFetch { asset: a, progress } if a == asset => Some(progress),
                _ => None,
            })
            .collect()
    }

    /// Values published for archive serialization
    pub fn archive_progress(&self) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::ArchiveProgress { progress } => Some(progress),
                _ => None,
            })
            .collect()
    }

    /// Values published for the whole run
    pub fn overall_progress(&self) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Overall { progress } => Some(progress),
                _ => None,
            })
            .collect()
    }

    /// States entered, in order
    pub fn stages(&self) -> Vec<PackagerState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Stage { state } => Some(state),
                _ => None,
            })
            .collect()
    }
}

impl ProgressListener for ProgressRecorder {
    fn on_event(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Style presets for the terminal renderer
pub struct ProgressStyles;

impl ProgressStyles {
    /// Style for asset downloads
    pub fn download() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░  ")
    }

    /// Style for archive serialization
    pub fn archive() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.yellow} [{elapsed_precise}] [{bar:40.yellow/white}] {percent:>3}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("▰▰▱")
    }

    /// Style for finished bars
    pub fn success() -> ProgressStyle {
        ProgressStyle::with_template("{prefix:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }
}

/// Listener rendering one bar per asset plus one for the archive
pub struct TerminalProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn update(&self, key: &str, style: fn() -> ProgressStyle, progress: f64) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        let bar = bars.entry(key.to_string()).or_insert_with(|| {
            let pb = self.multi.add(ProgressBar::new(BAR_SCALE));
            pb.set_style(style());
            pb.set_message(key.to_string());
            pb
        });
        bar.set_position((progress * BAR_SCALE as f64).round() as u64);
        if progress >= 1.0 && !bar.is_finished() {
            bar.set_style(ProgressStyles::success());
            bar.set_prefix("✓");
            bar.finish_with_message(key.to_string());
        }
    }
}

impl ProgressListener for TerminalProgress {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::AssetFetch { asset, progress } => {
                self.update(asset, ProgressStyles::download, *progress)
            }
            ProgressEvent::ArchiveProgress { progress } => {
                self.update("archive", ProgressStyles::archive, *progress)
            }
            ProgressEvent::Stage { state } => {
                self.multi.println(format!("  ℹ {}", state.label())).ok();
            }
            ProgressEvent::Overall { .. } => {}
        }
    }
}
