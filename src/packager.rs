//! Packaging orchestration
//!
//! A [`Packager`] runs one packaging job:
//!
//! ```text
//! Idle -> LoadingScaffolding -+-> Embedding ----------------------------------------+-> Done
//!                             +-> AssemblingArchive -> [TransformingLayout] -> Serializing -+
//! ```
//!
//! Every large asset the run needs is fetched up front behind a join
//! barrier. Any error moves the packager to `Failed`; partial output is
//! dropped. A packager cannot be reused.

use crate::archive::{ArchiveTree, Entry, SerializeOptions};
use crate::document::{
    assemble_script, DocumentContext, DocumentRenderer, ProjectDataSource, ScriptSource,
    StandardRenderer, SCRIPT_FILE,
};
use crate::error::{PackError, PackResult};
use crate::fetcher::AssetFetcher;
use crate::icon::{AppIcon, IcnsConverter, IconConverter};
use crate::layout::LayoutTransformer;
use crate::manifest::{DesktopManifest, ENTRY_POINT};
use crate::metrics::PackMetrics;
use crate::options::{PackagingOptions, Target};
use crate::progress::{MonotonicProgress, ProgressEvent, ProgressHub, ProgressListener};
use crate::project::{Project, ProjectKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// Overall progress reached once archive assets are fetched
const ARCHIVE_FETCH_SPAN: f64 = 0.5;

/// Overall progress reached once page assets are fetched
const HTML_FETCH_SPAN: f64 = 0.9;

const SCAFFOLDING_ASSET: &str = "scaffolding";
const ADDONS_ASSET: &str = "addons";

/// Directory receiving split sb3 entries
const ASSETS_DIR: &str = "assets";

/// File name of an unsplit project inside archives
const PROJECT_ZIP: &str = "project.zip";

/// Lifecycle of a [`Packager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackagerState {
    Idle,
    LoadingScaffolding,
    Embedding,
    AssemblingArchive,
    TransformingLayout,
    Serializing,
    Done,
    Failed,
}

impl PackagerState {
    pub fn label(&self) -> &'static str {
        match self {
            PackagerState::Idle => "Idle",
            PackagerState::LoadingScaffolding => "Loading scaffolding",
            PackagerState::Embedding => "Embedding project",
            PackagerState::AssemblingArchive => "Assembling archive",
            PackagerState::TransformingLayout => "Transforming runtime layout",
            PackagerState::Serializing => "Compressing",
            PackagerState::Done => "Done",
            PackagerState::Failed => "Failed",
        }
    }

    /// Whether the run is over
    pub fn is_terminal(&self) -> bool {
        matches!(self, PackagerState::Done | PackagerState::Failed)
    }
}

impl std::fmt::Display for PackagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of a packaging run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOutput {
    pub bytes: Vec<u8>,
    /// `<window title>.html` or `<window title>.zip`
    pub filename: String,
    pub mime: &'static str,
}

impl PackageOutput {
    /// Write the output into `dir` under its file name
    pub fn write_to(&self, dir: &Path) -> PackResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// Folds fetch and archive progress into one overall stream
struct OverallProgress {
    hub: ProgressHub,
    assets: usize,
    fetch_span: f64,
    state: Mutex<OverallState>,
}

#[derive(Default)]
struct OverallState {
    fetched: HashMap<String, f64>,
    tracker: MonotonicProgress,
}

impl OverallProgress {
    fn new(hub: ProgressHub, assets: usize, fetch_span: f64) -> Self {
        Self {
            hub,
            assets: assets.max(1),
            fetch_span,
            state: Mutex::new(OverallState::default()),
        }
    }

    fn publish(&self, update: impl FnOnce(&mut OverallState) -> Option<f64>) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let Some(value) = update(&mut state) else {
            return;
        };
        if let Some(progress) = state.tracker.advance(value) {
            self.hub.emit(ProgressEvent::Overall { progress });
        }
    }

    fn finish(&self) {
        self.publish(|_| Some(1.0));
    }
}

impl ProgressListener for OverallProgress {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::AssetFetch { asset, progress } => self.publish(|state| {
                state.fetched.insert(asset.clone(), *progress);
                let sum: f64 = state.fetched.values().sum();
                Some(sum / self.assets as f64 * self.fetch_span)
            }),
            ProgressEvent::ArchiveProgress { progress } => self.publish(|_| {
                Some(ARCHIVE_FETCH_SPAN + (1.0 - ARCHIVE_FETCH_SPAN) * progress)
            }),
            ProgressEvent::Overall { .. } | ProgressEvent::Stage { .. } => {}
        }
    }
}

/// Packages one project according to one set of options
pub struct Packager {
    options: PackagingOptions,
    fetcher: AssetFetcher,
    renderer: Arc<dyn DocumentRenderer>,
    converter: Arc<dyn IconConverter>,
    serialize_options: SerializeOptions,
    progress: ProgressHub,
    state: PackagerState,
}

impl std::fmt::Debug for Packager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packager")
            .field("target", &self.options.target)
            .field("state", &self.state)
            .finish()
    }
}

impl Packager {
    /// Create a packager
    ///
    /// Fetch progress of `fetcher` is routed through the packager's own
    /// listeners while a run is in progress.
    pub fn new(options: PackagingOptions, fetcher: AssetFetcher) -> Self {
        Self {
            options,
            fetcher,
            renderer: Arc::new(StandardRenderer),
            converter: Arc::new(IcnsConverter),
            serialize_options: SerializeOptions::default(),
            progress: ProgressHub::new(),
            state: PackagerState::Idle,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_icon_converter(mut self, converter: Arc<dyn IconConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_serialize_options(mut self, options: SerializeOptions) -> Self {
        self.serialize_options = options;
        self
    }

    /// Register a progress listener
    pub fn subscribe(&mut self, listener: Arc<dyn ProgressListener>) {
        self.progress.subscribe(listener);
    }

    pub fn state(&self) -> PackagerState {
        self.state
    }

    pub fn options(&self) -> &PackagingOptions {
        &self.options
    }

    /// Run the packaging job
    pub fn package(&mut self, project: &Project) -> PackResult<PackageOutput> {
        if self.state != PackagerState::Idle {
            return Err(PackError::Config(format!(
                "Packager already used (state: {})",
                self.state
            )));
        }

        match self.run(project) {
            Ok(output) => Ok(output),
            Err(e) => {
                error!(
                    target: "stagepack::packager",
                    state = %self.state,
                    error = %e,
                    "Packaging failed"
                );
                let hub = self.progress.clone();
                self.enter(&hub, PackagerState::Failed);
                Err(e)
            }
        }
    }

    fn enter(&mut self, hub: &ProgressHub, state: PackagerState) {
        debug!(
            target: "stagepack::packager",
            from = %self.state,
            to = %state,
            "State transition"
        );
        self.state = state;
        hub.emit(ProgressEvent::Stage { state });
    }

    fn required_assets(&self) -> Vec<&'static str> {
        let mut names = vec![SCAFFOLDING_ASSET];
        if self.options.chunks.gamepad {
            names.push(ADDONS_ASSET);
        }
        if let Some(runtime) = self.options.target.runtime_asset() {
            names.push(runtime);
        }
        names
    }

    fn run(&mut self, project: &Project) -> PackResult<PackageOutput> {
        self.options.validate()?;
        let target = self.options.target;
        let mut metrics = PackMetrics::new();

        info!(
            target: "stagepack::packager",
            target_kind = target.as_str(),
            project_bytes = project.len(),
            package = %self.options.app.package_name,
            "Packaging project"
        );

        // Listeners for this run: the caller's plus the overall aggregator
        let user_hub = self.progress.clone();
        let names = self.required_assets();
        let fetch_span = if target.is_archive() {
            ARCHIVE_FETCH_SPAN
        } else {
            HTML_FETCH_SPAN
        };
        let overall = Arc::new(OverallProgress::new(user_hub.clone(), names.len(), fetch_span));
        let mut hub = user_hub.clone();
        hub.subscribe(overall.clone());

        self.enter(&hub, PackagerState::LoadingScaffolding);
        let fetcher = self.fetcher.clone().with_progress(hub.clone());
        let mut assets = metrics.time_phase("fetch", || fetcher.fetch_all(&names))?;
        metrics.mark_assets_fetched();

        let scaffolding = assets
            .remove(SCAFFOLDING_ASSET)
            .ok_or_else(|| PackError::InvalidAssetRequest(SCAFFOLDING_ASSET.to_string()))?;
        let addons = assets.remove(ADDONS_ASSET);
        let script = assemble_script(&scaffolding, addons.as_deref());

        let user_icon = self
            .options
            .app
            .icon
            .as_deref()
            .map(AppIcon::load)
            .transpose()?;

        let (bytes, mime) = if target.is_archive() {
            let bytes = self.package_archive(
                project,
                &script,
                user_icon,
                &mut assets,
                &hub,
                &mut metrics,
            )?;
            (bytes, "application/zip")
        } else {
            self.enter(&hub, PackagerState::Embedding);
            let context = DocumentContext {
                options: &self.options,
                script: ScriptSource::Inline(&script),
                project: ProjectDataSource::inline(project),
                favicon: user_icon.as_ref(),
            };
            let html = self.renderer.render(&context)?;
            metrics.mark_document_rendered();
            (html.into_bytes(), "text/html")
        };

        self.enter(&hub, PackagerState::Done);
        overall.finish();
        metrics.mark_total();
        metrics.log_report();

        let output = PackageOutput {
            bytes,
            filename: self.options.output_filename(),
            mime,
        };
        info!(
            target: "stagepack::packager",
            filename = %output.filename,
            bytes = output.bytes.len(),
            "Packaging complete"
        );
        Ok(output)
    }

    fn package_archive(
        &mut self,
        project: &Project,
        script: &str,
        user_icon: Option<AppIcon>,
        assets: &mut HashMap<String, Vec<u8>>,
        hub: &ProgressHub,
        metrics: &mut PackMetrics,
    ) -> PackResult<Vec<u8>> {
        let target = self.options.target;
        self.enter(hub, PackagerState::AssemblingArchive);

        let split = project.kind == ProjectKind::Sb3 && target != Target::ZipOneAsset;
        let (mut payload, source) = if split {
            let tree = ArchiveTree::load_from(project.data.clone())?.prefixed(ASSETS_DIR);
            (tree, ProjectDataSource::split_assets())
        } else {
            let mut tree = ArchiveTree::new();
            tree.put(PROJECT_ZIP, Entry::file(project.data.clone()));
            (tree, ProjectDataSource::single_file())
        };

        let context = DocumentContext {
            options: &self.options,
            script: ScriptSource::External,
            project: source,
            favicon: user_icon.as_ref(),
        };
        let html = self.renderer.render(&context)?;
        metrics.mark_document_rendered();
        payload.put(ENTRY_POINT, Entry::file(html));
        payload.put(SCRIPT_FILE, Entry::file(script));
        metrics.mark_payload_assembled();
        debug!(
            target: "stagepack::packager",
            entries = payload.len(),
            split,
            "Payload assembled"
        );

        let tree = match (target.layout(), target.runtime_asset()) {
            (Some(layout), Some(runtime)) => {
                self.enter(hub, PackagerState::TransformingLayout);
                let runtime_bytes = assets
                    .remove(runtime)
                    .ok_or_else(|| PackError::InvalidAssetRequest(runtime.to_string()))?;
                let template = ArchiveTree::load_from(runtime_bytes)?;
                let icon = match user_icon {
                    Some(icon) => icon,
                    None => AppIcon::default_icon()?,
                };
                let app = &self.options.app;
                let manifest = DesktopManifest::new(
                    app.package_name.as_str(),
                    self.options.stage_width,
                    self.options.stage_height,
                    icon.name.as_str(),
                );
                let transformer = LayoutTransformer::new(layout, app.package_name.as_str())
                    .with_converter(self.converter.clone());
                let tree = metrics.time_phase("layout", || {
                    transformer.transform(template, payload, &icon, &manifest)
                })?;
                metrics.mark_layout_transformed();
                tree
            }
            _ => payload,
        };

        self.enter(hub, PackagerState::Serializing);
        let bytes = tree.serialize(&self.serialize_options, |progress| {
            hub.emit(ProgressEvent::ArchiveProgress { progress })
        })?;
        metrics.mark_serialized();
        Ok(bytes)
    }
}
