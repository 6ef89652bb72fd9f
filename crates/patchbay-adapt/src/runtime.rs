//! Adaptation runtime - the single execution context for all adaptations
//!
//! All loaded modules live in one [`Runtime`] behind one lock. Every call into
//! any adaptation, from any thread, takes that lock for the duration of the
//! call, so adaptation code never runs concurrently with itself.
//!
//! # Important: Single Runtime
//!
//! The process owns exactly one global runtime, started by
//! [`startup_generic_adaptation`]. A runtime whose lock was poisoned by a
//! panicking call is treated as unavailable from then on; hosts see empty
//! adaptation lists and neutral results instead of errors.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::error::{AdaptationError, AdaptationResult};
use crate::module::{AdaptationModule, EntryPoint, ModuleOrigin};

/// The process-wide runtime (lazily started)
static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// State guarded by the runtime lock
#[derive(Default)]
struct ExecutionContext {
    /// Loaded modules by module name
    modules: HashMap<String, AdaptationModule>,

    /// Calls made into each module
    calls: HashMap<String, u64>,
}

/// Execution context shared by all adaptations
#[derive(Default)]
pub struct Runtime {
    context: Mutex<ExecutionContext>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    /// False once a call panicked while holding the lock
    pub fn is_available(&self) -> bool {
        !self.context.is_poisoned()
    }

    fn lock(&self) -> AdaptationResult<MutexGuard<'_, ExecutionContext>> {
        self.context
            .lock()
            .map_err(|_| AdaptationError::RuntimeUnavailable)
    }

    /// Load a module, replacing any module with the same module name
    ///
    /// Handles to the loaded module stay bound to it, so a replacement must
    /// declare the same device name. Installing an unchanged module is a no-op.
    pub fn install(&self, module: AdaptationModule) -> AdaptationResult<()> {
        let mut ctx = self.lock()?;
        let module_name = module.module_name().to_string();

        match ctx.modules.get(&module_name) {
            Some(previous) if previous.is_same_as(&module) => {
                log::debug!("Adaptation: Module '{}' is unchanged", module_name);
                return Ok(());
            }
            Some(previous) => {
                check_same_device(previous, &module)?;
                log::info!(
                    "Adaptation: Module '{}' from {} replaces the one from {}",
                    module_name,
                    module.origin(),
                    previous.origin()
                );
            }
            None => {
                log::debug!("Adaptation: Loaded module '{}' from {}", module_name, module.origin());
            }
        }

        ctx.modules.insert(module_name, module);
        Ok(())
    }

    pub fn is_loaded(&self, module_name: &str) -> bool {
        self.lock()
            .map(|ctx| ctx.modules.contains_key(module_name))
            .unwrap_or(false)
    }

    /// Names of all loaded modules, sorted
    pub fn loaded_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .map(|ctx| ctx.modules.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Number of calls made into a module so far
    pub fn call_count(&self, module_name: &str) -> u64 {
        self.lock()
            .ok()
            .and_then(|ctx| ctx.calls.get(module_name).copied())
            .unwrap_or(0)
    }

    /// Run `f` against a loaded module while holding the runtime lock
    pub fn with_module<T>(
        &self,
        module_name: &str,
        f: impl FnOnce(&AdaptationModule) -> AdaptationResult<T>,
    ) -> AdaptationResult<T> {
        let mut ctx = self.lock()?;

        // Plain read-modify-write, only safe because the lock is held
        let count = ctx.calls.get(module_name).copied().unwrap_or(0);
        ctx.calls.insert(module_name.to_string(), count + 1);

        let module = ctx
            .modules
            .get(module_name)
            .ok_or_else(|| AdaptationError::ModuleNotLoaded(module_name.to_string()))?;
        f(module)
    }

    /// Call one entry point, failing if the module does not define it
    pub fn call<T>(
        &self,
        module_name: &str,
        entry: EntryPoint,
        f: impl FnOnce(&AdaptationModule) -> AdaptationResult<T>,
    ) -> AdaptationResult<T> {
        self.with_module(module_name, |module| {
            if !module.has_entry(entry) {
                return Err(AdaptationError::MissingEntryPoint {
                    module: module_name.to_string(),
                    entry,
                });
            }
            f(module)
        })
    }

    pub fn has_entry(&self, module_name: &str, entry: EntryPoint) -> AdaptationResult<bool> {
        self.with_module(module_name, |module| Ok(module.has_entry(entry)))
    }

    /// Re-read a file module from disk
    ///
    /// The device name is the storage key of the module's patches, so a
    /// reload that changes it is rejected and the loaded module is kept.
    pub fn reload(&self, module_name: &str) -> AdaptationResult<()> {
        let path = {
            let ctx = self.lock()?;
            let module = ctx
                .modules
                .get(module_name)
                .ok_or_else(|| AdaptationError::ModuleNotLoaded(module_name.to_string()))?;
            match module.origin() {
                ModuleOrigin::File(path) => path.clone(),
                ModuleOrigin::Embedded => {
                    return Err(AdaptationError::NotReloadable(module_name.to_string()))
                }
            }
        };

        // Parse outside the lock, other adaptations keep running meanwhile
        let fresh = AdaptationModule::load_file(&path)?;

        let mut ctx = self.lock()?;
        if let Some(current) = ctx.modules.get(module_name) {
            check_same_device(current, &fresh)?;
        }

        log::info!("Adaptation: Reloaded module '{}' from {}", module_name, path.display());
        ctx.modules.insert(module_name.to_string(), fresh);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn poison(&'static self) {
        let _ = std::thread::spawn(move || {
            let _guard = self.context.lock();
            panic!("poisoning adaptation runtime");
        })
        .join();
    }
}

/// The device name is the storage key of a module's patches
fn check_same_device(current: &AdaptationModule, fresh: &AdaptationModule) -> AdaptationResult<()> {
    if current.name() == fresh.name() {
        return Ok(());
    }
    Err(AdaptationError::InvalidModule {
        module: current.module_name().to_string(),
        reason: format!(
            "device name changed from '{}' to '{}'",
            current.name(),
            fresh.name()
        ),
    })
}

/// Start the global runtime
///
/// Idempotent: later calls find the running runtime. Returns whether the
/// runtime is usable.
pub fn startup_generic_adaptation() -> bool {
    RUNTIME.get_or_init(|| {
        log::info!("Adaptation: Runtime started");
        Runtime::new()
    });
    has_runtime()
}

/// Whether the global runtime is started and healthy
pub fn has_runtime() -> bool {
    RUNTIME.get().map_or(false, Runtime::is_available)
}

/// The global runtime, if started and healthy
pub fn global() -> AdaptationResult<&'static Runtime> {
    RUNTIME
        .get()
        .filter(|runtime| runtime.is_available())
        .ok_or(AdaptationError::RuntimeUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn module(module_name: &str, source: &str) -> AdaptationModule {
        AdaptationModule::parse(module_name, ModuleOrigin::Embedded, source).unwrap()
    }

    #[test]
    fn test_startup_is_idempotent() {
        assert!(startup_generic_adaptation());
        let first = global().unwrap() as *const Runtime;
        assert!(startup_generic_adaptation());
        let second = global().unwrap() as *const Runtime;

        assert_eq!(first, second);
        assert!(has_runtime());
    }

    #[test]
    fn test_call_counts_and_missing_entries() {
        let runtime = Runtime::new();
        runtime
            .install(module("counted", "name: Counted\nbanks: { count: 4 }"))
            .unwrap();

        assert_eq!(runtime.call_count("counted"), 0);
        let banks = runtime
            .call("counted", EntryPoint::NumberOfBanks, |m| m.number_of_banks())
            .unwrap();
        assert_eq!(banks, 4);

        let missing = runtime.call("counted", EntryPoint::NumberOfPatchesPerBank, |m| {
            m.number_of_patches_per_bank()
        });
        assert!(missing.unwrap_err().is_missing_entry());

        assert!(!runtime.has_entry("counted", EntryPoint::FriendlyBankName).unwrap());
        assert_eq!(runtime.call_count("counted"), 3);
    }

    #[test]
    fn test_module_not_loaded() {
        let runtime = Runtime::new();
        let result = runtime.with_module("ghost", |m| Ok(m.name().to_string()));
        assert!(matches!(result, Err(AdaptationError::ModuleNotLoaded(_))));
        assert!(!runtime.is_loaded("ghost"));
    }

    #[test]
    fn test_install_replaces_same_module_name() {
        let runtime = Runtime::new();
        runtime.install(module("dup", "name: Dup\nbanks: { count: 1 }")).unwrap();
        runtime.install(module("dup", "name: Dup\nbanks: { count: 5 }")).unwrap();

        assert_eq!(runtime.loaded_modules(), vec!["dup".to_string()]);
        let banks = runtime
            .call("dup", EntryPoint::NumberOfBanks, |m| m.number_of_banks())
            .unwrap();
        assert_eq!(banks, 5);
    }

    #[test]
    fn test_install_refuses_other_device_name() {
        let runtime = Runtime::new();
        runtime.install(module("dup", "name: First")).unwrap();

        let result = runtime.install(module("dup", "name: Second"));
        assert!(matches!(result, Err(AdaptationError::InvalidModule { .. })));
        let name = runtime.with_module("dup", |m| Ok(m.name().to_string())).unwrap();
        assert_eq!(name, "First");
    }

    #[test]
    fn test_install_unchanged_module_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("steady.yaml");
        fs::write(&path, "name: Steady\nbanks: { count: 2 }").unwrap();

        let runtime = Runtime::new();
        runtime.install(AdaptationModule::load_file(&path).unwrap()).unwrap();
        runtime.install(AdaptationModule::load_file(&path).unwrap()).unwrap();

        // Same source from another origin still counts as a replacement
        let embedded = module("steady", "name: Steady\nbanks: { count: 2 }");
        runtime.install(embedded).unwrap();
        let origin = runtime
            .with_module("steady", |m| Ok(m.origin().clone()))
            .unwrap();
        assert_eq!(origin, ModuleOrigin::Embedded);
    }

    #[test]
    fn test_poisoned_runtime_is_unavailable() {
        let runtime: &'static Runtime = Box::leak(Box::new(Runtime::new()));
        runtime.install(module("doomed", "name: Doomed")).unwrap();
        assert!(runtime.is_available());

        runtime.poison();

        assert!(!runtime.is_available());
        assert!(matches!(
            runtime.with_module("doomed", |m| Ok(m.name().to_string())),
            Err(AdaptationError::RuntimeUnavailable)
        ));
        assert!(!runtime.is_loaded("doomed"));
        assert!(runtime.loaded_modules().is_empty());
    }

    #[test]
    fn test_reload_file_module() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reloadable.yaml");
        fs::write(&path, "name: Reloadable\nbanks: { count: 1 }").unwrap();

        let runtime = Runtime::new();
        runtime.install(AdaptationModule::load_file(&path).unwrap()).unwrap();

        fs::write(&path, "name: Reloadable\nbanks: { count: 3 }").unwrap();
        runtime.reload("reloadable").unwrap();
        let banks = runtime
            .call("reloadable", EntryPoint::NumberOfBanks, |m| m.number_of_banks())
            .unwrap();
        assert_eq!(banks, 3);

        fs::write(&path, "name: Renamed\nbanks: { count: 3 }").unwrap();
        assert!(runtime.reload("reloadable").is_err());
        let name = runtime
            .with_module("reloadable", |m| Ok(m.name().to_string()))
            .unwrap();
        assert_eq!(name, "Reloadable");
    }

    #[test]
    fn test_embedded_module_not_reloadable() {
        let runtime = Runtime::new();
        runtime.install(module("fixed", "name: Fixed")).unwrap();
        assert!(matches!(
            runtime.reload("fixed"),
            Err(AdaptationError::NotReloadable(_))
        ));
    }
}
