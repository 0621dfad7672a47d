//! Packaging options
//!
//! One immutable [`PackagingOptions`] snapshot drives one packaging run. It
//! can be built in code or parsed from TOML:
//!
//! ```toml
//! target = "nwjs-win64"
//! stage_width = 480
//! stage_height = 360
//!
//! [app]
//! package_name = "my-game"
//! window_title = "My Game"
//! icon = "./icon.png"
//!
//! [chunks]
//! gamepad = true
//! ```

use crate::error::{PackError, PackResult};
use crate::layout::Layout;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Package name used when a title yields nothing usable
pub const DEFAULT_PACKAGE_NAME: &str = "packaged-project";

/// Window title used when a title yields nothing usable
pub const DEFAULT_WINDOW_TITLE: &str = "Packaged Project";

/// Output target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    /// Single self-contained HTML page
    #[default]
    Html,
    /// Zip with page, script and split project assets
    Zip,
    /// Zip with page, script and one `project.zip`
    ZipOneAsset,
    /// NW.js for 32-bit Windows
    NwjsWin32,
    /// NW.js for 64-bit Windows
    NwjsWin64,
    /// NW.js for macOS
    NwjsMac,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Html => "html",
            Target::Zip => "zip",
            Target::ZipOneAsset => "zip-one-asset",
            Target::NwjsWin32 => "nwjs-win32",
            Target::NwjsWin64 => "nwjs-win64",
            Target::NwjsMac => "nwjs-mac",
        }
    }

    /// Whether the output is an archive
    pub fn is_archive(&self) -> bool {
        !matches!(self, Target::Html)
    }

    /// Desktop layout for runtime targets
    pub fn layout(&self) -> Option<Layout> {
        match self {
            Target::NwjsWin32 | Target::NwjsWin64 => Some(Layout::WindowsShell),
            Target::NwjsMac => Some(Layout::MacShell),
            _ => None,
        }
    }

    /// Catalog name of the runtime archive
    pub fn runtime_asset(&self) -> Option<&'static str> {
        match self {
            Target::NwjsWin32 | Target::NwjsWin64 | Target::NwjsMac => Some(self.as_str()),
            _ => None,
        }
    }

    /// Output file extension
    pub fn extension(&self) -> &'static str {
        if self.is_archive() {
            "zip"
        } else {
            "html"
        }
    }
}

impl std::str::FromStr for Target {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(Target::Html),
            "zip" => Ok(Target::Zip),
            "zip-one-asset" => Ok(Target::ZipOneAsset),
            "nwjs-win32" => Ok(Target::NwjsWin32),
            "nwjs-win64" => Ok(Target::NwjsWin64),
            "nwjs-mac" => Ok(Target::NwjsMac),
            other => Err(PackError::Config(format!("Unknown target: {}", other))),
        }
    }
}

/// App identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppOptions {
    /// Icon file (PNG or JPEG); the generated default is used when unset
    #[serde(default)]
    pub icon: Option<PathBuf>,

    /// Package name, used for desktop folders and executables
    #[serde(default = "default_package_name")]
    pub package_name: String,

    /// Window and document title, also the output file stem
    #[serde(default = "default_window_title")]
    pub window_title: String,
}

fn default_package_name() -> String {
    DEFAULT_PACKAGE_NAME.to_string()
}

fn default_window_title() -> String {
    DEFAULT_WINDOW_TITLE.to_string()
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            icon: None,
            package_name: default_package_name(),
            window_title: default_window_title(),
        }
    }
}

/// Optional script chunks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOptions {
    /// Bundle the gamepad add-on script
    #[serde(default)]
    pub gamepad: bool,
}

/// Page colors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appearance {
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default = "default_foreground")]
    pub foreground: String,
    #[serde(default = "default_accent")]
    pub accent: String,
}

fn default_background() -> String {
    "#000000".to_string()
}

fn default_foreground() -> String {
    "#ffffff".to_string()
}

fn default_accent() -> String {
    "#ff4c4c".to_string()
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            background: default_background(),
            foreground: default_foreground(),
            accent: default_accent(),
        }
    }
}

/// Visible control buttons
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    #[serde(default)]
    pub green_flag: bool,
    #[serde(default)]
    pub stop_all: bool,
    #[serde(default)]
    pub fullscreen: bool,
}

/// Compiler settings forwarded to the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub warp_timer: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            warp_timer: false,
        }
    }
}

/// Where cloud variables are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudMode {
    /// Remote websocket server
    #[default]
    Ws,
    /// Browser local storage
    Local,
    /// Per-variable choice between `ws` and `local`
    Custom,
    /// Disabled
    None,
}

/// Cloud variable settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudVariables {
    #[serde(default)]
    pub mode: CloudMode,
    #[serde(default = "default_cloud_host")]
    pub cloud_host: String,
    /// Variable name to provider (`ws` or `local`) for [`CloudMode::Custom`]
    #[serde(default)]
    pub custom: BTreeMap<String, CloudMode>,
}

fn default_cloud_host() -> String {
    "wss://clouddata.turbowarp.org".to_string()
}

impl Default for CloudVariables {
    fn default() -> Self {
        Self {
            mode: CloudMode::default(),
            cloud_host: default_cloud_host(),
            custom: BTreeMap::new(),
        }
    }
}

/// Immutable configuration of one packaging run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagingOptions {
    #[serde(default)]
    pub target: Target,

    #[serde(default = "default_stage_width")]
    pub stage_width: u32,

    #[serde(default = "default_stage_height")]
    pub stage_height: u32,

    #[serde(default)]
    pub app: AppOptions,

    #[serde(default)]
    pub chunks: ChunkOptions,

    #[serde(default)]
    pub turbo: bool,

    #[serde(default)]
    pub interpolation: bool,

    #[serde(default = "default_framerate")]
    pub framerate: u32,

    #[serde(default)]
    pub high_quality_pen: bool,

    #[serde(default = "default_max_clones")]
    pub max_clones: u32,

    #[serde(default = "default_true")]
    pub fencing: bool,

    #[serde(default = "default_true")]
    pub misc_limits: bool,

    #[serde(default)]
    pub autoplay: bool,

    /// `#` characters are replaced by random digits at runtime
    #[serde(default = "default_username")]
    pub username: String,

    /// Text above the loading bar
    #[serde(default)]
    pub loading_text: String,

    /// Script run after the project data is fetched
    #[serde(default)]
    pub custom_js: String,

    #[serde(default)]
    pub appearance: Appearance,

    #[serde(default)]
    pub controls: Controls,

    #[serde(default)]
    pub compiler: CompilerOptions,

    #[serde(default)]
    pub cloud_variables: CloudVariables,

    /// Project identifier for cloud variables
    #[serde(default)]
    pub project_id: String,
}

fn default_true() -> bool {
    true
}

fn default_stage_width() -> u32 {
    480
}

fn default_stage_height() -> u32 {
    360
}

fn default_framerate() -> u32 {
    30
}

fn default_max_clones() -> u32 {
    300
}

fn default_username() -> String {
    "player####".to_string()
}

impl Default for PackagingOptions {
    fn default() -> Self {
        Self {
            target: Target::default(),
            stage_width: default_stage_width(),
            stage_height: default_stage_height(),
            app: AppOptions::default(),
            chunks: ChunkOptions::default(),
            turbo: false,
            interpolation: false,
            framerate: default_framerate(),
            high_quality_pen: false,
            max_clones: default_max_clones(),
            fencing: true,
            misc_limits: true,
            autoplay: false,
            username: default_username(),
            loading_text: String::new(),
            custom_js: String::new(),
            appearance: Appearance::default(),
            controls: Controls::default(),
            compiler: CompilerOptions::default(),
            cloud_variables: CloudVariables::default(),
            project_id: String::new(),
        }
    }
}

impl PackagingOptions {
    /// Default options for a target
    pub fn new(target: Target) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }

    /// Parse options from TOML
    pub fn parse(content: &str) -> PackResult<Self> {
        let options: Self = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file, resolving the icon path against the
    /// file's directory
    pub fn load(path: &Path) -> PackResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut options = Self::parse(&content)?;
        if let (Some(icon), Some(base)) = (options.app.icon.as_ref(), path.parent()) {
            if icon.is_relative() {
                options.app.icon = Some(base.join(icon));
            }
        }
        Ok(options)
    }

    /// Derive package name and window title from a project title
    pub fn with_project_title(mut self, title: &str) -> Self {
        self.app.package_name = default_package_name_from_title(title);
        self.app.window_title = window_title_from_project_title(title);
        self
    }

    pub fn with_package_name(mut self, name: impl Into<String>) -> Self {
        self.app.package_name = name.into();
        self
    }

    pub fn with_window_title(mut self, title: impl Into<String>) -> Self {
        self.app.window_title = title.into();
        self
    }

    pub fn with_stage_size(mut self, width: u32, height: u32) -> Self {
        self.stage_width = width;
        self.stage_height = height;
        self
    }

    pub fn with_icon(mut self, path: impl Into<PathBuf>) -> Self {
        self.app.icon = Some(path.into());
        self
    }

    pub fn with_gamepad(mut self, enabled: bool) -> Self {
        self.chunks.gamepad = enabled;
        self
    }

    /// Check option consistency
    pub fn validate(&self) -> PackResult<()> {
        if self.stage_width == 0 || self.stage_height == 0 {
            return Err(PackError::Config(format!(
                "Stage size must be positive, got {}x{}",
                self.stage_width, self.stage_height
            )));
        }
        if self.framerate == 0 {
            return Err(PackError::Config("Framerate must be positive".to_string()));
        }
        let name = &self.app.package_name;
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(PackError::Config(format!("Invalid package name: {:?}", name)));
        }
        if self.app.window_title.trim().is_empty() {
            return Err(PackError::Config("Window title must not be empty".to_string()));
        }
        Ok(())
    }

    /// `<window title>.<html|zip>`
    ///
    /// Path separators and characters most file systems reject become `_`,
    /// so the name never leaves the directory it is written to.
    pub fn output_filename(&self) -> String {
        let stem: String = self
            .app
            .window_title
            .trim()
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        let stem = match stem.as_str() {
            "" | "." | ".." => DEFAULT_WINDOW_TITLE,
            stem => stem,
        };
        format!("{}.{}", stem, self.target.extension())
    }
}

/// Package name derived from a project title
///
/// Drops the extension, keeps ASCII letters, `-` and spaces, turns spaces
/// into dashes and lowercases.
pub fn default_package_name_from_title(title: &str) -> String {
    let stem = title.split('.').next().unwrap_or("");
    let kept: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || *c == '-' || *c == ' ')
        .collect();
    let name = kept.trim().replace(' ', "-").to_lowercase();
    if name.is_empty() {
        DEFAULT_PACKAGE_NAME.to_string()
    } else {
        name
    }
}

/// Window title derived from a project title (extension dropped)
pub fn window_title_from_project_title(title: &str) -> String {
    let stem = title.trim().split('.').next().unwrap_or("");
    if stem.is_empty() {
        DEFAULT_WINDOW_TITLE.to_string()
    } else {
        stem.to_string()
    }
}
