//! Plugin discovery: scanning installed packages for the manifest marker.
//!
//! A plugin package advertises itself by shipping a `devpanel.plugin.json`
//! at its root:
//!
//! ```json
//! {
//!   "name": "profiler",
//!   "version": "1.2.0",
//!   "description": "Frame timing inspector",
//!   "panels": [{"name": "Timings", "source": "panel/index.html"}]
//! }
//! ```
//!
//! [`list_installed_plugins`] walks the direct children of the installed
//! packages directory (plus one level of `@scope/` namespacing, the layout
//! package managers produce) and returns one [`PluginRecord`] per valid
//! manifest. Malformed or partially-installed packages are excluded
//! silently — a broken plugin must never take the whole panel down.
//!
//! The result is sorted by name and stable for the duration of a run; the
//! dev-mode hot-reload path simply calls this again and replaces the whole
//! set.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// File name that marks a package as a DevPanel plugin.
pub const PLUGIN_MANIFEST: &str = "devpanel.plugin.json";

/// One discovered plugin: its advertised name and the base path its assets
/// are served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRecord {
    /// Plugin identifier, taken from the manifest.
    pub name: String,
    /// Base path of the package on disk; assets and panel documents live
    /// under it.
    pub path: String,
}

/// One embeddable panel advertised by a plugin manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelDescriptor {
    /// Display name of the panel.
    pub name: String,
    /// Path of the embeddable document, relative to the package base path.
    pub source: String,
}

/// Parsed `devpanel.plugin.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub panels: Vec<PanelDescriptor>,
}

/// Overrides for one discovery scan.
///
/// `include`, when non-empty, restricts the scan to exactly those package
/// directory names. `exclude` always removes the named packages. Scoped
/// packages are matched by their full `@scope/name` directory path.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Errors surfaced by a discovery scan.
///
/// Per-package problems (missing or malformed manifests) are not errors;
/// only an unreadable scan root is.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to read plugin directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Scans `root` for installed plugin packages.
///
/// # Errors
///
/// Returns [`DiscoveryError::ReadDir`] if `root` cannot be listed.
pub fn list_installed_plugins(
    root: &Path,
    options: &DiscoveryOptions,
) -> Result<Vec<PluginRecord>, DiscoveryError> {
    let mut records = Vec::new();

    for (package_name, package_path) in candidate_packages(root)? {
        if !options.include.is_empty() && !options.include.contains(&package_name) {
            continue;
        }
        if options.exclude.contains(&package_name) {
            continue;
        }
        if let Some(record) = read_plugin_record(&package_name, &package_path) {
            records.push(record);
        }
    }

    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(records)
}

/// Reads a single package's manifest, if present, into a plugin record.
///
/// Loads `PLUGIN_MANIFEST` from `path` and resolves it against the manifest
/// shape. Every failure mode (no manifest, unreadable file, invalid JSON,
/// empty name) excludes the package silently, logged at debug level only.
pub fn read_plugin_record(package_name: &str, path: &Path) -> Option<PluginRecord> {
    let manifest_path = path.join(PLUGIN_MANIFEST);
    let raw = match fs::read_to_string(&manifest_path) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(package = package_name, error = %e, "no readable plugin manifest; skipping");
            return None;
        }
    };
    let manifest: PluginManifest = match serde_json::from_str(&raw) {
        Ok(manifest) => manifest,
        Err(e) => {
            debug!(package = package_name, error = %e, "malformed plugin manifest; skipping");
            return None;
        }
    };
    if manifest.name.is_empty() {
        debug!(package = package_name, "plugin manifest has an empty name; skipping");
        return None;
    }

    Some(PluginRecord {
        name: manifest.name,
        path: path.to_string_lossy().into_owned(),
    })
}

/// Lists candidate package directories under `root`: direct children, plus
/// the children of `@scope` directories.
fn candidate_packages(root: &Path) -> Result<Vec<(String, PathBuf)>, DiscoveryError> {
    let mut candidates = Vec::new();

    for entry in read_dir_sorted(root)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        if !path.is_dir() || name.starts_with('.') {
            continue;
        }
        if name.starts_with('@') {
            for scoped in read_dir_sorted(&path)? {
                let scoped_path = scoped.path();
                if scoped_path.is_dir() {
                    let scoped_name =
                        format!("{name}/{}", scoped.file_name().to_string_lossy());
                    candidates.push((scoped_name, scoped_path));
                }
            }
        } else {
            candidates.push((name, path));
        }
    }

    Ok(candidates)
}

fn read_dir_sorted(path: &Path) -> Result<Vec<fs::DirEntry>, DiscoveryError> {
    let entries = fs::read_dir(path)
        .map_err(|source| DiscoveryError::ReadDir {
            path: path.to_path_buf(),
            source,
        })?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| DiscoveryError::ReadDir {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(entries)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
