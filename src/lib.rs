//! Stagepack - package interactive projects for distribution
//!
//! This crate turns a project (an `.sb3` zip or opaque project data) into
//! one of:
//!
//! - a single self-contained HTML page,
//! - a zip with the page, the runtime script and the project files,
//! - an NW.js desktop package for Windows or macOS.
//!
//! # Pipeline
//!
//! 1. **Fetch**: large runtime assets (player scripts, NW.js archives) are
//!    resolved from an [`AssetCatalog`], read from the [`IntegrityStore`]
//!    cache or downloaded, and verified against their SHA-256 digest.
//! 2. **Assemble**: the page, script and project files form a payload
//!    [`ArchiveTree`].
//! 3. **Transform**: for desktop targets the [`LayoutTransformer`] grafts the
//!    payload, icon and `package.json` into the runtime's tree, renaming the
//!    root folder and launcher after the package.
//! 4. **Serialize**: the tree is written as a zip; untouched runtime entries
//!    are copied byte for byte.
//!
//! Progress of every step is published as [`ProgressEvent`]s.
//!
//! # Quick Start
//!
//! ```no_run
//! use stagepack::{
//!     AssetCatalog, AssetFetcher, HttpTransport, IntegrityStore, Packager,
//!     PackagingOptions, Project, Target, TerminalProgress,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> stagepack::PackResult<()> {
//! let catalog = AssetCatalog::builtin("https://example.com/packager");
//! let store = IntegrityStore::on_disk(&catalog);
//! let fetcher = AssetFetcher::new(catalog, store, Arc::new(HttpTransport::new()));
//!
//! let options = PackagingOptions::new(Target::NwjsWin64).with_project_title("My Game.sb3");
//! let mut packager = Packager::new(options, fetcher);
//! packager.subscribe(Arc::new(TerminalProgress::new()));
//!
//! let project = Project::load("My Game.sb3".as_ref())?;
//! let output = packager.package(&project)?;
//! output.write_to(".".as_ref())?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Options and catalogs can be loaded from TOML, see
//! [`PackagingOptions::load`] and [`AssetCatalog::load`]. Setting
//! `STAGEPACK_OFFLINE=1` keeps [`HttpTransport`] off the network so only
//! cached assets are usable.

pub mod archive;
pub mod cache;
pub mod catalog;
pub mod checksum;
pub mod document;
mod error;
pub mod fetcher;
pub mod icon;
pub mod layout;
pub mod manifest;
mod metrics;
pub mod options;
pub mod packager;
pub mod progress;
pub mod project;

pub use archive::{ArchiveCompression, ArchiveTree, Entry, SerializeOptions};
pub use cache::{CacheBackend, DiskCache, IntegrityStore, MemoryCache, NoCache};
pub use catalog::{AssetCatalog, AssetDescriptor, AssetKind, NWJS_VERSION};
pub use document::{DocumentContext, DocumentRenderer, ProjectDataSource, StandardRenderer};
pub use error::{PackError, PackResult};
pub use fetcher::{AssetFetcher, HttpTransport, Transport};
pub use icon::{AppIcon, IcnsConverter, IconConverter, IconFormat};
pub use layout::{Layout, LayoutTransformer, PathRewriter};
pub use manifest::DesktopManifest;
pub use metrics::PackMetrics;
pub use options::{
    default_package_name_from_title, window_title_from_project_title, PackagingOptions, Target,
};
pub use packager::{PackageOutput, Packager, PackagerState};
pub use progress::{
    ProgressEvent, ProgressHub, ProgressListener, ProgressRecorder, TerminalProgress,
};
pub use project::{Project, ProjectKind};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
