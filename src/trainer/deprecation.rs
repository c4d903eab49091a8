//! Deprecation notices for legacy device flags.
//!
//! Runs as its own pass over [`TrainerDeviceArgs`], before any device is
//! resolved.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::trainer::args::TrainerDeviceArgs;

/// Version in which the legacy flags were deprecated.
pub const DEPRECATED_IN: &str = "v1.7";

/// Version in which the legacy flags go away.
pub const REMOVED_IN: &str = "v2.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deprecation {
    /// Name of the deprecated flag.
    pub flag: String,
    pub message: String,
}

/// Collect (and log) a notice for every deprecated flag that is set.
pub fn check_deprecations(args: &TrainerDeviceArgs) -> Vec<Deprecation> {
    let mut notices = Vec::new();

    if let Some(gpus) = &args.gpus {
        notices.push(Deprecation {
            flag: "gpus".to_string(),
            message: format!(
                "Setting `gpus={gpus}` is deprecated in {DEPRECATED_IN} and will be removed in \
                 {REMOVED_IN}. Please use `accelerator=\"gpu\"` and `devices={gpus}` instead."
            ),
        });
    }

    for notice in &notices {
        warn!(flag = %notice.flag, "{}", notice.message);
    }
    notices
}
