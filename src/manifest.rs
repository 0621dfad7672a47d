//! NW.js application manifest (`package.json`)
//!
//! ```json
//! {
//!     "name": "my-game",
//!     "main": "index.html",
//!     "window": {
//!         "width": 480,
//!         "height": 360,
//!         "icon": "icon.png"
//!     }
//! }
//! ```

use crate::error::PackResult;
use serde::{Deserialize, Serialize};

/// File name of the manifest inside the payload
pub const MANIFEST_FILE: &str = "package.json";

/// Entry document of packaged apps
pub const ENTRY_POINT: &str = "index.html";

/// Window section of the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestWindow {
    pub width: u32,
    pub height: u32,
    /// Icon file name, relative to the manifest
    pub icon: String,
}

/// Desktop runtime manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesktopManifest {
    /// Package name
    pub name: String,
    /// Entry document
    pub main: String,
    pub window: ManifestWindow,
}

impl DesktopManifest {
    pub fn new(name: impl Into<String>, width: u32, height: u32, icon: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            main: ENTRY_POINT.to_string(),
            window: ManifestWindow {
                width,
                height,
                icon: icon.into(),
            },
        }
    }

    /// Serialize with 4-space indentation
    pub fn to_json(&self) -> PackResult<String> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer)?;
        // serde_json only emits valid UTF-8
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Parse a manifest
    pub fn parse(content: &str) -> PackResult<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_json() {
        let manifest = DesktopManifest::new("my-game", 480, 360, "icon.png");
        let json = manifest.to_json().unwrap();
        assert!(json.contains("\n    \"name\": \"my-game\""));
        assert!(json.contains("\"main\": \"index.html\""));
        assert!(json.contains("\n        \"icon\": \"icon.png\""));
        assert_eq!(DesktopManifest::parse(&json).unwrap(), manifest);
    }
}
