//! Patchbay Adapt - loadable synthesizer adaptations
//!
//! This crate provides:
//! - A declarative module format describing one device per YAML file
//! - The process-wide runtime every adaptation call goes through
//! - [`GenericAdaptation`], which turns a loaded module into a device
//! - The registry combining built-in modules with the adaptation directory
//!
//! # Architecture
//!
//! ```text
//! built-ins ─┐
//!            ├──▶ registry ──▶ GenericAdaptation ──▶ Runtime (one lock) ──▶ module
//! *.yaml ────┘                    │
//!                                 └──▶ capability adapters (on demand)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use patchbay_adapt::{all_adaptations, configure_from_file, startup_generic_adaptation};
//! use patchbay_core::config::default_config_path;
//!
//! configure_from_file(&default_config_path());
//! startup_generic_adaptation();
//! for device in all_adaptations() {
//!     println!("{}", device.name());
//! }
//! ```

pub mod adaptation;
pub mod builtin;
pub mod capability;
pub mod error;
pub mod module;
pub mod registry;
pub mod runtime;

pub use adaptation::GenericAdaptation;
pub use error::{AdaptationError, AdaptationResult};
pub use module::{AdaptationModule, EntryPoint, ModuleOrigin};
pub use registry::{
    adaptation_directory, all_adaptations, apply_config, configure_from_file, load_adaptations,
    set_adaptation_directory,
};
pub use runtime::{has_runtime, startup_generic_adaptation, Runtime};
