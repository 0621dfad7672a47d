//! Desktop runtime layouts
//!
//! Grafts a payload tree (project files, generated page and scripts) into an
//! NW.js runtime archive.
//!
//! NW.js Windows archive:
//! ```text
//! nwjs-v0.49.0-win-x64/
//!   nw.exe                 (launcher)
//!   credits.html
//!   ...
//! ```
//!
//! NW.js macOS archive:
//! ```text
//! nwjs-v0.49.0-osx-x64/
//!   credits.html
//!   nwjs.app/
//!     Contents/
//!       Resources/
//!         app.icns         (icon)
//!         app.nw/          (payload)
//!       MacOS/
//!         nwjs             (launcher)
//! ```
//!
//! The leading folder is discovered from the archive and replaced by the
//! package name; the launcher is renamed after the package. Payload, icon and
//! manifest writes must never land on a rewritten runtime path, with one
//! deliberate exception: the bundle icon replaces the runtime's stock icon.

use crate::archive::{ArchiveTree, Entry};
use crate::error::{PackError, PackResult};
use crate::document::SCRIPT_FILE;
use crate::icon::{AppIcon, IcnsConverter, IconConverter};
use crate::manifest::{DesktopManifest, ENTRY_POINT, MANIFEST_FILE};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Payload names the icon must not take over
const RESERVED_ICON_NAMES: [&str; 3] = [ENTRY_POINT, SCRIPT_FILE, MANIFEST_FILE];

/// Target layout of a desktop package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Flat layout, payload next to the launcher
    WindowsShell,
    /// Application bundle layout
    MacShell,
}

impl Layout {
    /// Launcher path segment inside the runtime archive
    pub fn launcher_token(&self) -> &'static str {
        match self {
            Layout::WindowsShell => "nw.exe",
            Layout::MacShell => "nwjs.app",
        }
    }

    /// Replacement for the launcher segment
    pub fn launcher_name(&self, package_name: &str) -> String {
        match self {
            Layout::WindowsShell => format!("{}.exe", package_name),
            Layout::MacShell => format!("{}.app", package_name),
        }
    }

    /// Folder (with trailing `/`) receiving payload entries
    pub fn mount_point(&self, package_name: &str) -> String {
        match self {
            Layout::WindowsShell => format!("{}/", package_name),
            Layout::MacShell => format!(
                "{pkg}/{pkg}.app/Contents/Resources/app.nw/",
                pkg = package_name
            ),
        }
    }

    /// Path of the converted bundle icon, for bundle layouts
    pub fn bundle_icon_path(&self, package_name: &str) -> Option<String> {
        match self {
            Layout::WindowsShell => None,
            Layout::MacShell => Some(format!(
                "{pkg}/{pkg}.app/Contents/Resources/app.icns",
                pkg = package_name
            )),
        }
    }
}

/// Rewrites runtime paths for a package
#[derive(Debug, Clone)]
pub struct PathRewriter {
    prefix: String,
    package_name: String,
    launcher_token: &'static str,
    launcher_name: String,
}

impl PathRewriter {
    pub fn new(layout: Layout, prefix: impl Into<String>, package_name: impl Into<String>) -> Self {
        let package_name = package_name.into();
        Self {
            prefix: prefix.into(),
            launcher_token: layout.launcher_token(),
            launcher_name: layout.launcher_name(&package_name),
            package_name,
        }
    }

    /// Replace the leading prefix segment and every launcher segment
    ///
    /// Paths containing neither token are returned unchanged.
    pub fn rewrite(&self, path: &str) -> String {
        path.split('/')
            .enumerate()
            .map(|(i, segment)| {
                if i == 0 && segment == self.prefix {
                    self.package_name.as_str()
                } else if segment == self.launcher_token {
                    self.launcher_name.as_str()
                } else {
                    segment
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Combines a runtime template tree with a payload tree
#[derive(Clone)]
pub struct LayoutTransformer {
    layout: Layout,
    package_name: String,
    converter: Arc<dyn IconConverter>,
}

impl std::fmt::Debug for LayoutTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutTransformer")
            .field("layout", &self.layout)
            .field("package_name", &self.package_name)
            .finish()
    }
}

impl LayoutTransformer {
    /// Create a transformer using the builtin ICNS converter
    pub fn new(layout: Layout, package_name: impl Into<String>) -> Self {
        Self {
            layout,
            package_name: package_name.into(),
            converter: Arc::new(IcnsConverter),
        }
    }

    /// Use another icon converter for bundle layouts
    pub fn with_converter(mut self, converter: Arc<dyn IconConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Produce the output tree
    pub fn transform(
        &self,
        template: ArchiveTree,
        payload: ArchiveTree,
        icon: &AppIcon,
        manifest: &DesktopManifest,
    ) -> PackResult<ArchiveTree> {
        if self.package_name.is_empty() || self.package_name.contains('/') {
            return Err(PackError::Config(format!(
                "Invalid package name: {:?}",
                self.package_name
            )));
        }

        if RESERVED_ICON_NAMES.contains(&icon.name.as_str())
            || icon.name.is_empty()
            || icon.name.contains(['/', '\\'])
        {
            return Err(PackError::Icon(format!(
                "Icon cannot be named {:?}",
                icon.name
            )));
        }

        let prefix = template
            .list()
            .next()
            .and_then(|first| first.split('/').next())
            .map(str::to_string)
            .ok_or_else(|| PackError::Config("Runtime archive is empty".to_string()))?;
        let rewriter = PathRewriter::new(self.layout, prefix.clone(), self.package_name.as_str());
        let mount = self.layout.mount_point(&self.package_name);

        info!(
            target: "stagepack::layout",
            layout = ?self.layout,
            prefix = %prefix,
            package = %self.package_name,
            mount = %mount,
            "Transforming runtime layout"
        );

        let mut output = ArchiveTree::new();

        // Runtime files
        for (path, entry) in template.into_entries() {
            let rewritten = rewriter.rewrite(&path);
            if output.contains(&rewritten) {
                return Err(PackError::LayoutCollision { path: rewritten });
            }
            output.put(rewritten, entry);
        }
        let template_paths: HashSet<String> = output.list().map(str::to_string).collect();
        let ensure_free = |path: &str| -> PackResult<()> {
            if template_paths.contains(path) {
                Err(PackError::LayoutCollision {
                    path: path.to_string(),
                })
            } else {
                Ok(())
            }
        };

        // Payload
        let payload_count = payload.len();
        for (path, entry) in payload.into_entries() {
            let target = format!("{}{}", mount, path);
            ensure_free(&target)?;
            output.put(target, entry);
        }

        // Icon, next to the payload and converted for bundles
        let icon_path = format!("{}{}", mount, icon.name);
        ensure_free(&icon_path)?;
        output.put(icon_path, Entry::file(icon.data.clone()));

        if let Some(bundle_icon) = self.layout.bundle_icon_path(&self.package_name) {
            let converted = self.converter.convert(&icon.data)?;
            if output.contains(&bundle_icon) {
                debug!(
                    target: "stagepack::layout",
                    path = %bundle_icon,
                    "Replacing runtime icon"
                );
            }
            output.put(bundle_icon, Entry::file(converted));
        }

        // Manifest
        let manifest_path = format!("{}{}", mount, MANIFEST_FILE);
        ensure_free(&manifest_path)?;
        output.put(manifest_path, Entry::file(manifest.to_json()?));

        info!(
            target: "stagepack::layout",
            runtime_entries = template_paths.len(),
            payload_entries = payload_count,
            total = output.len(),
            "Layout complete"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_windows() {
        let r = PathRewriter::new(Layout::WindowsShell, "nwjs-v1-win-x64", "MyGame");
        assert_eq!(r.rewrite("nwjs-v1-win-x64/nw.exe"), "MyGame/MyGame.exe");
        assert_eq!(r.rewrite("nwjs-v1-win-x64/credits.html"), "MyGame/credits.html");
        assert_eq!(r.rewrite("nwjs-v1-win-x64/"), "MyGame/");
    }

    #[test]
    fn test_rewrite_mac() {
        let r = PathRewriter::new(Layout::MacShell, "nwjs-v1-osx-x64", "MyGame");
        assert_eq!(
            r.rewrite("nwjs-v1-osx-x64/nwjs.app/Contents/MacOS/nwjs"),
            "MyGame/MyGame.app/Contents/MacOS/nwjs"
        );
    }

    #[test]
    fn test_rewrite_leaves_unrelated_paths() {
        let r = PathRewriter::new(Layout::WindowsShell, "nwjs-v1-win-x64", "MyGame");
        for path in ["other/readme.txt", "locales/en.pak", "a/nw.exe.bak", "x/nwjs-v1-win-x64"] {
            assert_eq!(r.rewrite(path), path);
        }
    }

    #[test]
    fn test_mount_points() {
        assert_eq!(Layout::WindowsShell.mount_point("g"), "g/");
        assert_eq!(
            Layout::MacShell.mount_point("g"),
            "g/g.app/Contents/Resources/app.nw/"
        );
        assert_eq!(Layout::WindowsShell.bundle_icon_path("g"), None);
    }

    #[test]
    fn test_empty_template_rejected() {
        let transformer = LayoutTransformer::new(Layout::WindowsShell, "g");
        let icon = AppIcon::new("icon.png", vec![]);
        let manifest = DesktopManifest::new("g", 1, 1, "icon.png");
        assert!(transformer
            .transform(ArchiveTree::new(), ArchiveTree::new(), &icon, &manifest)
            .is_err());
    }
}
