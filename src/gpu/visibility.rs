//! `CUDA_VISIBLE_DEVICES`-style visibility restriction.
//!
//! The library never reads the environment itself: the binary calls
//! [`VisibleDevices::from_env`] once and injects the value into whichever
//! inventory provider it builds.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable the CUDA driver consults.
pub const CUDA_VISIBLE_DEVICES: &str = "CUDA_VISIBLE_DEVICES";

/// Which physical devices the process may enumerate, and in which order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleDevices {
    /// Raw restriction string; `None` means unrestricted.
    restriction: Option<String>,
}

impl VisibleDevices {
    /// Every physical device is visible.
    pub fn unrestricted() -> Self {
        Self { restriction: None }
    }

    /// Restrict visibility to the comma-separated list in `spec`.
    pub fn restricted(spec: impl Into<String>) -> Self {
        Self {
            restriction: Some(spec.into()),
        }
    }

    /// Read the restriction from `CUDA_VISIBLE_DEVICES`.
    pub fn from_env() -> Self {
        match std::env::var(CUDA_VISIBLE_DEVICES) {
            Ok(spec) => {
                debug!(spec = %spec, "Visibility restricted by {CUDA_VISIBLE_DEVICES}");
                Self::restricted(spec)
            }
            Err(_) => Self::unrestricted(),
        }
    }

    pub fn is_restricted(&self) -> bool {
        self.restriction.is_some()
    }

    /// Parsed physical ids in listed order, or `None` when unrestricted.
    ///
    /// Parsing stops at the first token that is not a non-negative integer
    /// or that repeats an earlier one; everything after it is hidden, as
    /// the CUDA driver does.
    pub fn listed(&self) -> Option<Vec<usize>> {
        let spec = self.restriction.as_deref()?;
        let mut ids = Vec::new();

        for token in spec.split(',').map(str::trim) {
            match token.parse::<usize>() {
                Ok(id) if !ids.contains(&id) => ids.push(id),
                _ => break,
            }
        }

        Some(ids)
    }

    /// Resolve against the host's physical ids, returning the visible
    /// physical ids in logical order. A listed id with no matching device
    /// ends the list.
    pub fn resolve(&self, physical: &[usize]) -> Vec<usize> {
        match self.listed() {
            None => physical.to_vec(),
            Some(listed) => listed
                .into_iter()
                .take_while(|id| physical.contains(id))
                .collect(),
        }
    }
}
