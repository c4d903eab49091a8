//! Turn a requested GPU count into concrete logical device indices.

use thiserror::Error;
use tracing::debug;

use crate::error::Error;
use crate::gpu::device::DeviceInventory;
use crate::gpu::provider::{InventoryError, InventoryProvider};
use crate::select::ranking::{RankingStrategy, ReportedOrder};

/// Invalid device configuration; raised once at configuration time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error(
        "auto_select_gpus=true, gpus={requested} is not a valid configuration. \
         Please select a valid number of GPU resources when using auto_select_gpus."
    )]
    InvalidCount { requested: i64 },

    #[error(
        "gpus={requested} is not a valid configuration: only {available} GPU(s) are visible. \
         Please select a valid number of GPU resources."
    )]
    InsufficientDevices { requested: i64, available: usize },

    #[error(
        "GPU {id} is not a valid configuration: visible devices are {available:?}. \
         Please select GPU ids that are visible to this process."
    )]
    UnknownDevice { id: usize, available: Vec<usize> },

    #[error("GPU {id} is listed more than once. Please select each GPU at most once.")]
    DuplicateDevice { id: usize },

    #[error("{0:?} is not a valid device specification. Use a count, -1, \"auto\", or ids like \"0,1\".")]
    InvalidSpec(String),
}

/// A requested device count: `-1` for all visible devices, otherwise a
/// positive count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestedCount(i64);

impl RequestedCount {
    pub const ALL: RequestedCount = RequestedCount(-1);

    pub fn new(count: i64) -> Self {
        Self(count)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// Number of devices this request needs from `available`.
    fn resolve(self, available: usize) -> Result<usize, ConfigurationError> {
        match self.0 {
            -1 => Ok(available),
            k if k < 1 => Err(ConfigurationError::InvalidCount { requested: k }),
            k => match usize::try_from(k) {
                Ok(n) if n <= available => Ok(n),
                _ => Err(ConfigurationError::InsufficientDevices {
                    requested: k,
                    available,
                }),
            },
        }
    }
}

/// Pick devices in reported order: `-1` takes everything, `k` takes the
/// first `k`.
pub fn select(
    requested: i64,
    inventory: &DeviceInventory,
) -> Result<Vec<usize>, ConfigurationError> {
    pick_devices(requested, inventory, &ReportedOrder)
}

/// Pick devices using `ranking` to decide which `k` are preferred.
///
/// The result is always a subsequence of `inventory.indices()`: ranking
/// chooses the set, output order is inventory order.
pub fn pick_devices(
    requested: i64,
    inventory: &DeviceInventory,
    ranking: &dyn RankingStrategy,
) -> Result<Vec<usize>, ConfigurationError> {
    let requested = RequestedCount::new(requested);
    let n = requested.resolve(inventory.len())?;

    // Drop repeated or out-of-range entries a misbehaving strategy may emit.
    let mut seen = vec![false; inventory.len()];
    let mut chosen: Vec<usize> = ranking
        .rank(inventory)
        .into_iter()
        .filter(|&i| i < seen.len() && !std::mem::replace(&mut seen[i], true))
        .take(n)
        .collect();

    if chosen.len() < n {
        return Err(ConfigurationError::InsufficientDevices {
            requested: requested.get(),
            available: chosen.len(),
        });
    }
    chosen.sort_unstable();

    debug!(
        requested = requested.get(),
        available = inventory.len(),
        chosen = ?chosen,
        "Picked GPUs"
    );
    Ok(chosen)
}

/// Selects devices from a freshly queried inventory.
pub struct DeviceSelector<P> {
    provider: P,
    ranking: Box<dyn RankingStrategy + Send + Sync>,
}

impl<P: InventoryProvider> DeviceSelector<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            ranking: Box::new(ReportedOrder),
        }
    }

    pub fn with_ranking(mut self, ranking: Box<dyn RankingStrategy + Send + Sync>) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Query the current inventory.
    pub fn inventory(&self) -> Result<DeviceInventory, InventoryError> {
        self.provider.inventory()
    }

    /// Select from an inventory the caller already holds.
    pub fn select_from(
        &self,
        requested: i64,
        inventory: &DeviceInventory,
    ) -> Result<Vec<usize>, ConfigurationError> {
        pick_devices(requested, inventory, self.ranking.as_ref())
    }

    /// Query the inventory and select from it.
    pub fn select(&self, requested: i64) -> Result<Vec<usize>, Error> {
        let inventory = self.inventory()?;
        Ok(self.select_from(requested, &inventory)?)
    }
}
