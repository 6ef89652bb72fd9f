//! Adaptation registry - finds every adaptation the librarian can use
//!
//! Two sources, loaded in this order:
//! - the built-in adaptations compiled into the binary
//! - every `.yaml` / `.yml` file in the adaptation directory (file stem =
//!   module name)
//!
//! A file whose module name matches a built-in overrides the built-in. Files
//! that fail to load are logged and skipped; the built-ins are always there.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once, RwLock};

use patchbay_core::capability::{DiscoverableDevice, Synth};
use patchbay_core::config::{default_adaptation_path, load_librarian_config, LibrarianConfig};

use crate::adaptation::GenericAdaptation;
use crate::builtin::BUILTIN_ADAPTATIONS;
use crate::module::{AdaptationModule, ModuleOrigin};
use crate::runtime::{self, Runtime};

/// File extensions of adaptation module files
pub const ADAPTATION_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Configured adaptation directory (None = default path)
static ADAPTATION_DIRECTORY: RwLock<Option<PathBuf>> = RwLock::new(None);

static RUNTIME_UNAVAILABLE: Once = Once::new();

/// Directory scanned for adaptation files
pub fn adaptation_directory() -> PathBuf {
    ADAPTATION_DIRECTORY
        .read()
        .ok()
        .and_then(|dir| dir.clone())
        .unwrap_or_else(default_adaptation_path)
}

pub fn set_adaptation_directory(dir: impl Into<PathBuf>) {
    let dir = dir.into();
    log::info!("Adaptation: Using adaptation directory {}", dir.display());

    match ADAPTATION_DIRECTORY.write() {
        Ok(mut slot) => *slot = Some(dir),
        Err(e) => log::warn!("Adaptation: Failed to store adaptation directory: {}", e),
    }
}

/// Push configuration into the registry
pub fn apply_config(config: &LibrarianConfig) {
    set_adaptation_directory(config.adaptation_directory());
}

/// Read the settings file and apply it
///
/// A missing adaptation directory is logged but still used: built-ins keep
/// working and files show up once the directory is created.
pub fn configure_from_file(path: &Path) -> LibrarianConfig {
    let config = load_librarian_config(path);
    let dir = config.adaptation_directory();
    if !dir.is_dir() {
        log::warn!(
            "Adaptation: Configured directory {} does not exist, only built-ins are available",
            dir.display()
        );
    }
    apply_config(&config);
    config
}

fn is_adaptation_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| {
                ADAPTATION_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
}

/// Adaptation files in a directory, sorted by path
pub fn discover_adaptation_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        log::info!("Adaptation: Directory does not exist: {}", dir.display());
        return Vec::new();
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Adaptation: Failed to read directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_adaptation_file(path))
        .collect();
    files.sort();
    files
}

/// All adaptations from the configured directory plus the built-ins
///
/// Empty (and logged once) when the adaptation runtime is unavailable.
pub fn all_adaptations() -> Vec<Arc<dyn DiscoverableDevice>> {
    load_adaptations()
        .into_iter()
        .map(|adaptation| adaptation as Arc<dyn DiscoverableDevice>)
        .collect()
}

/// Like [`all_adaptations`], keeping the concrete type
pub fn load_adaptations() -> Vec<Arc<GenericAdaptation>> {
    match runtime::global() {
        Ok(runtime) => load_adaptations_into(runtime, &adaptation_directory()),
        Err(e) => {
            warn_unavailable(&e);
            Vec::new()
        }
    }
}

fn warn_unavailable(reason: &dyn std::fmt::Display) {
    RUNTIME_UNAVAILABLE.call_once(|| {
        log::error!("Adaptation: {}, no adaptations will be loaded", reason);
    });
}

/// Load built-ins and the files of `dir` into a runtime
///
/// Overrides are settled before anything is installed, so a re-scan never
/// puts a built-in back in place of its file override. Device names are
/// storage keys: of two modules declaring the same device name only the
/// first (by module name) is kept, and a module whose device name changed
/// since it was installed is skipped. Sorted by device name.
pub fn load_adaptations_into(runtime: &'static Runtime, dir: &Path) -> Vec<Arc<GenericAdaptation>> {
    if !runtime.is_available() {
        warn_unavailable(&"Adaptation runtime is not available");
        return Vec::new();
    }

    let mut by_module: BTreeMap<String, AdaptationModule> = BTreeMap::new();

    for (module_name, source) in BUILTIN_ADAPTATIONS {
        match AdaptationModule::parse(module_name, ModuleOrigin::Embedded, source) {
            Ok(module) => {
                by_module.insert(module_name.to_string(), module);
            }
            Err(e) => log::error!("Adaptation: Built-in '{}' failed to load: {}", module_name, e),
        }
    }

    for path in discover_adaptation_files(dir) {
        match AdaptationModule::load_file(&path) {
            Ok(module) => {
                let module_name = module.module_name().to_string();
                if let Some(previous) = by_module.insert(module_name.clone(), module) {
                    log::info!(
                        "Adaptation: {} overrides '{}' from {}",
                        path.display(),
                        module_name,
                        previous.origin()
                    );
                }
            }
            Err(e) => log::warn!("Adaptation: Skipping {}: {}", path.display(), e),
        }
    }

    let mut taken = HashSet::new();
    let mut adaptations = Vec::with_capacity(by_module.len());

    for (module_name, module) in by_module {
        let device_name = module.name().to_string();
        if taken.contains(&device_name) {
            log::warn!(
                "Adaptation: Skipping module '{}', device name '{}' is already taken",
                module_name,
                device_name
            );
            continue;
        }

        match GenericAdaptation::install(runtime, module) {
            Ok(adaptation) => {
                taken.insert(device_name);
                adaptations.push(adaptation);
            }
            Err(e) => log::warn!("Adaptation: Skipping module '{}': {}", module_name, e),
        }
    }
    adaptations.sort_by_key(|adaptation| adaptation.name());

    log::info!(
        "Adaptation: {} adaptations loaded from {} and built-ins",
        adaptations.len(),
        dir.display()
    );

    adaptations
}
