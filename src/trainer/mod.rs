//! Trainer-side device configuration.
//!
//! - [`args`]: the `accelerator` / `devices` / `gpus` / `auto_select_gpus` flags
//! - [`deprecation`]: notices for legacy flags
//! - [`resolve`]: turns the flags into [`ResolvedDevices`]

pub mod args;
pub mod deprecation;
pub mod resolve;

pub use args::{Accelerator, DeviceSpec, TrainerDeviceArgs};
pub use deprecation::{check_deprecations, Deprecation};
pub use resolve::{resolve_devices, ResolvedDevices};
