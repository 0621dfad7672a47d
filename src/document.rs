//! Player document generation
//!
//! The page itself is produced by a [`DocumentRenderer`]. [`StandardRenderer`]
//! is the builtin one: a single HTML document that loads the runtime script,
//! reads its settings from an embedded JSON block and then fetches the
//! project data from wherever the package put it.

use crate::error::{PackError, PackResult};
use crate::icon::{AppIcon, IconFormat};
use crate::options::{CloudMode, PackagingOptions};
use crate::project::Project;
use base64::Engine;
use serde_json::json;

/// Loader progress once the runtime scripts have run
pub const PROGRESS_LOADED_SCRIPTS: f64 = 0.1;

/// Loader progress once `project.json` is in but assets are pending
pub const PROGRESS_LOADED_JSON_BUT_NEED_ASSETS: f64 = 0.2;

/// Loader progress once inline data is decoded but not yet loaded
pub const PROGRESS_FETCHED_INLINE_DATA_BUT_NOT_LOADED: f64 = 0.9;

/// File name of the external script in archive targets
pub const SCRIPT_FILE: &str = "script.js";

/// Header prepended to the bundled runtime script
pub const LICENSE_HEADER: &str = "/*!
* Copyright (C) 2021 Thomas Weber
*
* This program is free software: you can redistribute it and/or modify
* it under the terms of the GNU Lesser General Public License version 3
* as published by the Free Software Foundation.
*
* This program is distributed in the hope that it will be useful,
* but WITHOUT ANY WARRANTY; without even the implied warranty of
* MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
* GNU Lesser General Public License for more details.
*
* You should have received a copy of the GNU Lesser General Public License
* along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
";

/// Join the runtime script chunks
///
/// Closing script tags are split so the result can be inlined in a page.
pub fn assemble_script(scaffolding: &[u8], addons: Option<&[u8]>) -> String {
    let mut parts = vec![
        LICENSE_HEADER.to_string(),
        String::from_utf8_lossy(scaffolding).into_owned(),
    ];
    if let Some(addons) = addons {
        parts.push(String::from_utf8_lossy(addons).into_owned());
    }
    escape_script(&parts.join("\n"))
}

fn escape_script(script: &str) -> String {
    script.replace("</script>", "</scri'+'pt>")
}

/// Escape text for HTML content and attribute values
pub fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            c => out.push(c),
        }
    }
    out
}

/// Where the page finds the project data
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectDataSource {
    /// Embedded as a data URL
    Inline { data_url: String },
    /// A file next to the page
    Sibling {
        src: &'static str,
        /// Share of the loading bar covered while the file downloads
        progress_weight: f64,
    },
}

impl ProjectDataSource {
    pub fn inline(project: &Project) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&project.data);
        Self::Inline {
            data_url: format!("data:application/octet-stream;base64,{}", encoded),
        }
    }

    /// Whole project in `project.zip`
    pub fn single_file() -> Self {
        Self::Sibling {
            src: "./project.zip",
            progress_weight: 1.0 - PROGRESS_LOADED_SCRIPTS,
        }
    }

    /// Split project, `project.json` under `assets/`
    pub fn split_assets() -> Self {
        Self::Sibling {
            src: "./assets/project.json",
            progress_weight: PROGRESS_LOADED_JSON_BUT_NEED_ASSETS - PROGRESS_LOADED_SCRIPTS,
        }
    }

    /// Script defining `getProjectData()`
    fn loader_script(&self) -> PackResult<String> {
        match self {
            Self::Inline { data_url } => Ok(format!(
                "setProgress({progress});
    const getProjectData = () => fetch({url})
      .then((r) => r.arrayBuffer())
      .then((buffer) => {{
        setProgress(1);
        return buffer;
      }});",
                progress = PROGRESS_FETCHED_INLINE_DATA_BUT_NOT_LOADED,
                url = serde_json::to_string(data_url)?,
            )),
            Self::Sibling {
                src,
                progress_weight,
            } => Ok(format!(
                "const getProjectData = () => new Promise((resolve, reject) => {{
      const xhr = new XMLHttpRequest();
      xhr.onload = () => resolve(xhr.response);
      xhr.onerror = () => reject(new Error(\"Request to load project data failed.\"));
      xhr.onprogress = (e) => {{
        if (e.lengthComputable) {{
          setProgress({base} + (e.loaded / e.total) * {weight});
        }}
      }};
      xhr.responseType = \"arraybuffer\";
      xhr.open(\"GET\", {src});
      xhr.send();
    }});",
                base = PROGRESS_LOADED_SCRIPTS,
                weight = progress_weight,
                src = serde_json::to_string(src)?,
            )),
        }
    }
}

/// How the page loads the runtime script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSource<'a> {
    /// Script text placed in the page
    Inline(&'a str),
    /// `script.js` next to the page
    External,
}

/// Everything a renderer needs for one page
#[derive(Debug, Clone)]
pub struct DocumentContext<'a> {
    pub options: &'a PackagingOptions,
    pub script: ScriptSource<'a>,
    pub project: ProjectDataSource,
    /// Icon shown as favicon, when the user supplied one
    pub favicon: Option<&'a AppIcon>,
}

/// Turns a [`DocumentContext`] into an HTML document
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, context: &DocumentContext<'_>) -> PackResult<String>;
}

/// Builtin single-page player document
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardRenderer;

impl DocumentRenderer for StandardRenderer {
    fn render(&self, context: &DocumentContext<'_>) -> PackResult<String> {
        let options = context.options;
        let appearance = &options.appearance;

        let favicon = match context.favicon {
            Some(icon) => {
                let mime = match IconFormat::from_bytes(&icon.data) {
                    Some(IconFormat::Jpeg) => "image/jpeg",
                    _ => "image/png",
                };
                let encoded = base64::engine::general_purpose::STANDARD.encode(&icon.data);
                format!(
                    "<link id=\"favicon\" rel=\"icon\" href=\"data:{};base64,{}\" type=\"{}\" sizes=\"16x16\">",
                    mime, encoded, mime
                )
            }
            None => "<!-- no favicon -->".to_string(),
        };

        let loading_text = if options.loading_text.is_empty() {
            String::new()
        } else {
            format!(
                "<h1 class=\"loading-text\">{}</h1>",
                escape_xml(&options.loading_text)
            )
        };

        let script = match context.script {
            ScriptSource::Inline(text) => format!("<script>{}</script>", text),
            ScriptSource::External => format!("<script src=\"{}\"></script>", SCRIPT_FILE),
        };

        let values = [
            ("title", escape_xml(&options.app.window_title)),
            ("background", escape_xml(&appearance.background)),
            ("foreground", escape_xml(&appearance.foreground)),
            ("accent", escape_xml(&appearance.accent)),
            ("favicon", favicon),
            ("loading_text", loading_text),
            ("script", script),
            ("settings", settings_json(options)?),
            ("project_loader", context.project.loader_script()?),
            ("controls", controls_script(options)),
            ("custom_js", escape_script(&options.custom_js)),
        ];
        fill_template(PAGE_TEMPLATE, &values)
    }
}

/// Runtime settings read by the page bootstrap
fn settings_json(options: &PackagingOptions) -> PackResult<String> {
    let cloud_mode = |mode: CloudMode| match mode {
        CloudMode::Ws => "ws",
        CloudMode::Local => "local",
        CloudMode::Custom => "custom",
        CloudMode::None => "none",
    };
    let custom: serde_json::Map<String, serde_json::Value> = options
        .cloud_variables
        .custom
        .iter()
        .map(|(name, mode)| (name.clone(), json!(cloud_mode(*mode))))
        .collect();

    let settings = json!({
        "width": options.stage_width,
        "height": options.stage_height,
        "username": options.username,
        "autoplay": options.autoplay,
        "turbo": options.turbo,
        "interpolation": options.interpolation,
        "framerate": options.framerate,
        "highQualityPen": options.high_quality_pen,
        "fencing": options.fencing,
        "miscLimits": options.misc_limits,
        "maxClones": options.max_clones,
        "compiler": {
            "enabled": options.compiler.enabled,
            "warpTimer": options.compiler.warp_timer,
        },
        "controls": {
            "greenFlag": options.controls.green_flag,
            "stopAll": options.controls.stop_all,
            "fullscreen": options.controls.fullscreen,
            "fullscreenFill": fullscreen_fill(options),
        },
        "cloud": {
            "mode": cloud_mode(options.cloud_variables.mode),
            "host": options.cloud_variables.cloud_host,
            "projectId": options.project_id,
            "custom": custom,
        },
        "progress": {
            "loadedScripts": PROGRESS_LOADED_SCRIPTS,
            "loadedJson": PROGRESS_LOADED_JSON_BUT_NEED_ASSETS,
        },
    });
    // Keep the JSON block from closing its script element
    Ok(serde_json::to_string(&settings)?.replace("</", "<\\/"))
}

/// Control bar buttons, only the enabled ones are emitted
fn controls_script(options: &PackagingOptions) -> String {
    let controls = &options.controls;
    let mut blocks = Vec::new();
    if controls.green_flag {
        blocks.push(GREEN_FLAG_BUTTON);
    }
    if controls.stop_all {
        blocks.push(STOP_ALL_BUTTON);
    }
    if controls.fullscreen {
        blocks.push(FULLSCREEN_BUTTON);
    }
    if blocks.is_empty() {
        "/* no controls */".to_string()
    } else {
        blocks.join("\n")
    }
}

/// The fullscreen button sits in the control bar when other buttons exist,
/// otherwise it floats over the stage in the foreground color
fn has_control_bar(options: &PackagingOptions) -> bool {
    options.controls.green_flag || options.controls.stop_all
}

fn fullscreen_fill(options: &PackagingOptions) -> &str {
    if has_control_bar(options) {
        "#575E75"
    } else {
        &options.appearance.foreground
    }
}

const GREEN_FLAG_BUTTON: &str = r##"if (settings.controls.greenFlag) {
      const greenFlagButton = document.createElement("img");
      greenFlagButton.src = "data:image/svg+xml," + encodeURIComponent('<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 16.63 17.5"><path d="M.75 2a6.44 6.44 0 017.69 0h0a6.44 6.44 0 007.69 0v10.4a6.44 6.44 0 01-7.69 0h0a6.44 6.44 0 00-7.69 0" fill="#4cbf56" stroke="#45993d" stroke-linecap="round" stroke-linejoin="round"/><path stroke-width="1.5" fill="#4cbf56" stroke="#45993d" stroke-linecap="round" stroke-linejoin="round" d="M.75 16.75v-16"/></svg>');
      greenFlagButton.className = "control-button green-flag-button";
      greenFlagButton.addEventListener("click", () => scaffolding.greenFlag());
      scaffolding.addEventListener("PROJECT_RUN_START", () => greenFlagButton.classList.add("active"));
      scaffolding.addEventListener("PROJECT_RUN_STOP", () => greenFlagButton.classList.remove("active"));
      scaffolding.addControlButton({element: greenFlagButton, where: "top-left"});
    }"##;

const STOP_ALL_BUTTON: &str = r##"if (settings.controls.stopAll) {
      const stopAllButton = document.createElement("img");
      stopAllButton.src = "data:image/svg+xml," + encodeURIComponent('<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 14 14"><path fill="#ec5959" stroke="#b84848" stroke-linecap="round" stroke-linejoin="round" stroke-miterlimit="10" d="M4.3.5h5.4l3.8 3.8v5.4l-3.8 3.8H4.3L.5 9.7V4.3z"/></svg>');
      stopAllButton.className = "control-button stop-all-button";
      stopAllButton.addEventListener("click", () => scaffolding.stopAll());
      scaffolding.addControlButton({element: stopAllButton, where: "top-left"});
    }"##;

const FULLSCREEN_BUTTON: &str = r#"if (settings.controls.fullscreen && (document.fullscreenEnabled || document.webkitFullscreenEnabled)) {
      const isFullScreen = () => !!(document.fullscreenElement || document.webkitFullscreenElement);
      const fullscreenButton = document.createElement("img");
      fullscreenButton.addEventListener("click", () => {
        if (isFullScreen()) {
          if (document.exitFullscreen) document.exitFullscreen();
          else if (document.webkitExitFullscreen) document.webkitExitFullscreen();
        } else {
          if (document.body.requestFullscreen) document.body.requestFullscreen();
          else if (document.body.webkitRequestFullscreen) document.body.webkitRequestFullscreen();
        }
      });
      const fill = settings.controls.fullscreenFill;
      const exitIcon = '<path d="M12.662 3.65l.89.891 3.133-2.374a.815.815 0 011.15.165.819.819 0 010 .986L15.467 6.46l.867.871c.25.25.072.664-.269.664L12.388 8A.397.397 0 0112 7.611V3.92c0-.341.418-.514.662-.27M7.338 16.35l-.89-.89-3.133 2.374a.817.817 0 01-1.15-.166.819.819 0 010-.985l2.37-3.143-.87-.871a.387.387 0 01.27-.664L7.612 12a.397.397 0 01.388.389v3.692a.387.387 0 01-.662.27M7.338 3.65l-.89.891-3.133-2.374a.815.815 0 00-1.15.165.819.819 0 000 .986l2.37 3.142-.87.871a.387.387 0 00.27.664L7.612 8A.397.397 0 008 7.611V3.92a.387.387 0 00-.662-.27M12.662 16.35l.89-.89 3.133 2.374a.817.817 0 001.15-.166.819.819 0 000-.985l-2.368-3.143.867-.871a.387.387 0 00-.269-.664L12.388 12a.397.397 0 00-.388.389v3.692c0 .342.418.514.662.27"/>';
      const enterIcon = '<path d="M16.338 7.35l-.89-.891-3.133 2.374a.815.815 0 01-1.15-.165.819.819 0 010-.986l2.368-3.142-.867-.871a.387.387 0 01.269-.664L16.612 3a.397.397 0 01.388.389V7.08a.387.387 0 01-.662.27M3.662 12.65l.89.89 3.133-2.374a.817.817 0 011.15.166.819.819 0 010 .985l-2.37 3.143.87.871c.248.25.071.664-.27.664L3.388 17A.397.397 0 013 16.611V12.92c0-.342.418-.514.662-.27M3.662 7.35l.89-.891 3.133 2.374a.815.815 0 001.15-.165.819.819 0 000-.986L6.465 4.54l.87-.871a.387.387 0 00-.27-.664L3.388 3A.397.397 0 003 3.389V7.08c0 .341.418.514.662.27M16.338 12.65l-.89.89-3.133-2.374a.817.817 0 00-1.15.166.819.819 0 000 .985l2.368 3.143-.867.871a.387.387 0 00.269.664l3.677.005a.397.397 0 00.388-.389V12.92a.387.387 0 00-.662-.27"/>';
      const updateFullScreen = () => {
        const icon = isFullScreen() ? exitIcon : enterIcon;
        fullscreenButton.src = "data:image/svg+xml," + encodeURIComponent('<svg width="20" height="20" xmlns="http://www.w3.org/2000/svg"><g fill="' + fill + '" fill-rule="evenodd">' + icon + '</g></svg>');
      };
      updateFullScreen();
      document.addEventListener("fullscreenchange", updateFullScreen);
      document.addEventListener("webkitfullscreenchange", updateFullScreen);
      if (settings.controls.greenFlag || settings.controls.stopAll) {
        fullscreenButton.className = "control-button fullscreen-button";
        scaffolding.addControlButton({element: fullscreenButton, where: "top-right"});
      } else {
        fullscreenButton.className = "standalone-fullscreen-button";
        document.body.appendChild(fullscreenButton);
      }
    }"#;

/// Single-pass `{{name}}` substitution
///
/// Substituted values are never rescanned.
fn fill_template(template: &str, values: &[(&str, String)]) -> PackResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| PackError::Config("Unterminated template placeholder".to_string()))?;
        let key = &after[..end];
        let value = values
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.as_str())
            .ok_or_else(|| PackError::Config(format!("Unknown template placeholder: {}", key)))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

const PAGE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0, maximum-scale=1.0, user-scalable=no">
  <meta http-equiv="Content-Security-Policy" content="default-src * 'self' 'unsafe-inline' 'unsafe-eval' data: blob:">
  <title>{{title}}</title>
  <style>
    body {
      background-color: {{background}};
      color: {{foreground}};
      font-family: sans-serif;
      overflow: hidden;
    }
    [hidden] {
      display: none !important;
    }
    h1 {
      font-weight: normal;
    }
    #app, #loading, #error, #launch {
      position: absolute;
      top: 0;
      left: 0;
      width: 100%;
      height: 100%;
    }
    .screen {
      display: flex;
      flex-direction: column;
      align-items: center;
      justify-content: center;
      text-align: center;
      cursor: default;
      user-select: none;
      background-color: {{background}};
    }
    #launch {
      background-color: rgba(0, 0, 0, 0.7);
      cursor: pointer;
    }
    .progress-bar-outer {
      border: 1px solid currentColor;
      height: 10px;
      width: 200px;
      max-width: 200px;
    }
    .progress-bar-inner {
      height: 100%;
      width: 0;
      background-color: currentColor;
    }
    .loading-text {
      font-size: 36px;
      margin: 0 0 16px;
    }
    .green-flag {
      width: 80px;
      height: 80px;
      padding: 16px;
      border-radius: 100%;
      background: rgba(255, 255, 255, 0.75);
      border: 3px solid hsla(0, 100%, 100%, 1);
      display: flex;
      justify-content: center;
      align-items: center;
      box-sizing: border-box;
    }
    .control-button {
      width: 2rem;
      height: 2rem;
      padding: 0.375rem;
      margin-top: 0.5rem;
      margin-bottom: 0.5rem;
      user-select: none;
      cursor: pointer;
      border: 0;
      border-radius: 4px;
    }
    .control-button:hover {
      background: {{accent}}26;
    }
    .control-button.active {
      background: {{accent}}59;
    }
    .fullscreen-button {
      background: white !important;
    }
    .standalone-fullscreen-button {
      position: absolute;
      top: 0;
      right: 0;
      background-color: rgba(0, 0, 0, 0.5);
      border-radius: 0 0 0 4px;
      padding: 4px;
      cursor: pointer;
    }
  </style>
  <meta name="theme-color" content="{{background}}">
  {{favicon}}
</head>
<body>
  <noscript>Enable JavaScript</noscript>

  <div id="app"></div>

  <div id="launch" class="screen" hidden title="Click to start" tabindex="0">
    <div class="green-flag">
      <svg viewBox="0 0 16.63 17.5" width="42" height="44">
        <path fill="#4cbf56" stroke="#45993d" stroke-linecap="round" stroke-linejoin="round" d="M.75,2A6.44,6.44,0,0,1,8.44,2h0a6.44,6.44,0,0,0,7.69,0V12.4a6.44,6.44,0,0,1-7.69,0h0a6.44,6.44,0,0,0-7.69,0"/>
        <line fill="#4cbf56" stroke="#45993d" stroke-width="1.5" stroke-linecap="round" stroke-linejoin="round" x1="0.75" y1="16.75" x2="0.75" y2="0.75"/>
      </svg>
    </div>
  </div>

  <div id="loading" class="screen">
    {{loading_text}}
    <div class="progress-bar-outer"><div class="progress-bar-inner" id="loading-inner"></div></div>
  </div>

  <div id="error" class="screen" hidden>
    <h1>Error</h1>
    <p>See console for more information</p>
  </div>

  <script type="application/json" id="settings">{{settings}}</script>
  {{script}}
  <script>
    const settings = JSON.parse(document.getElementById('settings').textContent);
    const appElement = document.getElementById('app');
    const launchScreen = document.getElementById('launch');
    const loadingScreen = document.getElementById('loading');
    const loadingInner = document.getElementById('loading-inner');
    const errorScreen = document.getElementById('error');

    const scaffolding = new Scaffolding.Scaffolding();
    scaffolding.width = settings.width;
    scaffolding.height = settings.height;
    scaffolding.setup();
    scaffolding.appendTo(appElement);

    if (typeof ScaffoldingAddons !== "undefined") ScaffoldingAddons.run(scaffolding);

    const {storage, vm} = scaffolding;
    storage.addWebStore(
      [storage.AssetType.ImageVector, storage.AssetType.ImageBitmap, storage.AssetType.Sound],
      (asset) => new URL("./assets/" + asset.assetId + "." + asset.dataFormat, location).href
    );
    const setProgress = (progress) => {
      loadingInner.style.width = progress * 100 + "%";
    };
    storage.onprogress = (total, loaded) => {
      const base = settings.progress.loadedJson;
      setProgress(base + (loaded / total) * (1 - base));
    };
    setProgress(settings.progress.loadedScripts);

    scaffolding.setUsername(settings.username.replace(/#/g, () => Math.floor(Math.random() * 10)));

    const cloud = settings.cloud;
    const makeProvider = (kind) => kind === "ws"
      ? new Scaffolding.Cloud.WebSocketProvider(cloud.host, cloud.projectId)
      : kind === "local" ? new Scaffolding.Cloud.LocalStorageProvider() : null;
    if (cloud.mode === "custom") {
      const providers = {};
      for (const kind of new Set(Object.values(cloud.custom))) {
        const provider = makeProvider(kind);
        if (provider) {
          providers[kind] = provider;
          scaffolding.addCloudProvider(provider);
        }
      }
      for (const [name, kind] of Object.entries(cloud.custom)) {
        scaffolding.addCloudProviderOverride(name, providers[kind] || null);
      }
    } else {
      const provider = makeProvider(cloud.mode);
      if (provider) scaffolding.addCloudProvider(provider);
    }

    {{controls}}

    vm.setTurboMode(settings.turbo);
    vm.setInterpolation(settings.interpolation);
    vm.setFramerate(settings.framerate);
    vm.renderer.setUseHighQualityRender(settings.highQualityPen);
    vm.setRuntimeOptions({
      fencing: settings.fencing,
      miscLimits: settings.miscLimits,
      maxClones: settings.maxClones,
    });
    vm.setCompilerOptions(settings.compiler);
  </script>
  <script>
    {{project_loader}}

    const run = async () => {
      const projectData = await getProjectData();
      {{custom_js}}
      await scaffolding.loadProject(projectData);
      setProgress(1);
      loadingScreen.hidden = true;
      if (settings.autoplay) {
        scaffolding.start();
      } else {
        launchScreen.hidden = false;
        launchScreen.addEventListener('click', () => {
          launchScreen.hidden = true;
          scaffolding.start();
        });
        launchScreen.focus();
      }
    };

    run().catch((error) => {
      console.error(error);
      errorScreen.hidden = false;
    });
  </script>
</body>
</html>
"##;
