//! Static catalog of large assets
//!
//! A catalog maps logical asset names (`scaffolding`, `nwjs-win64`, ...) to
//! descriptors telling the fetcher where the bytes live, roughly how big they
//! are, whether the URL must be cache-busted and which SHA-256 digest the
//! bytes must hash to.
//!
//! ```toml
//! version = "2"
//!
//! [[assets]]
//! name = "scaffolding"
//! src = "https://example.com/scaffolding.js"
//! type = "binary"
//! estimated_size = 2500000
//! cache_buster = true
//! ```

use crate::error::{PackError, PackResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// NW.js release used by the builtin desktop runtime entries
pub const NWJS_VERSION: &str = "0.49.0";

/// How the fetched bytes are consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Raw bytes (runtime archives)
    #[default]
    Binary,
    /// Opaque blob, typically script text
    Blob,
}

/// Descriptor of a fetchable large asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Logical name, used as lookup and cache key
    pub name: String,

    /// Source URL
    pub src: String,

    /// Asset kind
    #[serde(default, rename = "type")]
    pub kind: AssetKind,

    /// Size estimate used as progress denominator when the server
    /// does not report a content length
    #[serde(default)]
    pub estimated_size: u64,

    /// Append the cache-buster token to the URL
    #[serde(default)]
    pub cache_buster: bool,

    /// Expected SHA-256 digest (hex)
    #[serde(default)]
    pub sha256: Option<String>,
}

impl AssetDescriptor {
    /// Create a descriptor with no hash and no cache-buster
    pub fn new(name: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            src: src.into(),
            kind: AssetKind::Binary,
            estimated_size: 0,
            cache_buster: false,
            sha256: None,
        }
    }

    /// Set the asset kind
    pub fn with_kind(mut self, kind: AssetKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the estimated size
    pub fn with_estimated_size(mut self, size: u64) -> Self {
        self.estimated_size = size;
        self
    }

    /// Enable or disable cache-busting
    pub fn with_cache_buster(mut self, enabled: bool) -> Self {
        self.cache_buster = enabled;
        self
    }

    /// Set the expected SHA-256 digest
    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }
}

/// Versioned collection of asset descriptors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCatalog {
    /// Catalog version, feeds the cache-buster token
    #[serde(default = "default_version")]
    pub version: String,

    /// Descriptors in declaration order
    #[serde(default)]
    pub assets: Vec<AssetDescriptor>,
}

fn default_version() -> String {
    "1".to_string()
}

impl Default for AssetCatalog {
    fn default() -> Self {
        Self {
            version: default_version(),
            assets: Vec::new(),
        }
    }
}

impl AssetCatalog {
    /// Create an empty catalog with a version
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            assets: Vec::new(),
        }
    }

    /// Builtin catalog: scripts are served from `base_url`, NW.js runtimes
    /// from the official NW.js mirror.
    pub fn builtin(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let nwjs = |name: &str, platform: &str, size: u64| {
            AssetDescriptor::new(
                name,
                format!(
                    "https://dl.nwjs.io/v{v}/nwjs-v{v}-{platform}.zip",
                    v = NWJS_VERSION
                ),
            )
            .with_estimated_size(size)
        };

        Self {
            version: format!("nwjs-{}+scaffolding-1", NWJS_VERSION),
            assets: vec![
                AssetDescriptor::new("scaffolding", format!("{}/scaffolding.js", base))
                    .with_kind(AssetKind::Blob)
                    .with_estimated_size(2_700_000)
                    .with_cache_buster(true),
                AssetDescriptor::new("addons", format!("{}/addons.js", base))
                    .with_kind(AssetKind::Blob)
                    .with_estimated_size(30_000)
                    .with_cache_buster(true),
                nwjs("nwjs-win32", "win-ia32", 80_000_000),
                nwjs("nwjs-win64", "win-x64", 90_000_000),
                nwjs("nwjs-mac", "osx-x64", 110_000_000),
            ],
        }
    }

    /// Parse a catalog from TOML
    pub fn parse(content: &str) -> PackResult<Self> {
        let catalog: Self = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a TOML file
    pub fn load(path: &Path) -> PackResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Add or replace a descriptor
    pub fn insert(&mut self, descriptor: AssetDescriptor) {
        match self.assets.iter_mut().find(|a| a.name == descriptor.name) {
            Some(existing) => *existing = descriptor,
            None => self.assets.push(descriptor),
        }
    }

    /// Builder-style [`AssetCatalog::insert`]
    pub fn with_asset(mut self, descriptor: AssetDescriptor) -> Self {
        self.insert(descriptor);
        self
    }

    /// Look up a descriptor by logical name
    pub fn get(&self, name: &str) -> Option<&AssetDescriptor> {
        self.assets.iter().find(|a| a.name == name)
    }

    /// Look up a descriptor, failing with `InvalidAssetRequest`
    pub fn resolve(&self, name: &str) -> PackResult<&AssetDescriptor> {
        self.get(name)
            .ok_or_else(|| PackError::InvalidAssetRequest(name.to_string()))
    }

    /// Logical names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.assets.iter().map(|a| a.name.as_str())
    }

    /// Short token identifying this catalog revision
    ///
    /// Changes whenever the version or any descriptor's identity
    /// (name, source, expected digest) changes.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.version.as_bytes());
        hasher.update(&[0]);
        for asset in &self.assets {
            hasher.update(asset.name.as_bytes());
            hasher.update(&[0]);
            hasher.update(asset.src.as_bytes());
            hasher.update(&[0]);
            hasher.update(asset.sha256.as_deref().unwrap_or("").as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize().to_hex()[..16].to_string()
    }

    fn validate(&self) -> PackResult<()> {
        let mut seen = HashSet::new();
        for asset in &self.assets {
            if asset.name.is_empty() {
                return Err(PackError::Config("Asset with empty name".to_string()));
            }
            if !seen.insert(asset.name.as_str()) {
                return Err(PackError::Config(format!(
                    "Duplicate asset name in catalog: {}",
                    asset.name
                )));
            }
            if let Some(ref digest) = asset.sha256 {
                if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(PackError::Config(format!(
                        "Invalid sha256 for {}: expected 64 hex characters",
                        asset.name
                    )));
                }
            }
        }
        Ok(())
    }
}
