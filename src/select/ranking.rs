//! Ranking strategies: which visible devices are preferred when picking `k`.
//!
//! A strategy only orders preference. The selector keeps the top `k` and
//! emits them in inventory order.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::gpu::device::DeviceInventory;

pub trait RankingStrategy {
    /// Logical indices of `inventory`, most preferred first. Must be a
    /// permutation of `inventory.indices()`.
    fn rank(&self, inventory: &DeviceInventory) -> Vec<usize>;
}

/// Prefer devices in the order the runtime reports them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportedOrder;

impl RankingStrategy for ReportedOrder {
    fn rank(&self, inventory: &DeviceInventory) -> Vec<usize> {
        inventory.indices()
    }
}

/// Prefer devices with the most free VRAM. Devices without memory info
/// rank last; ties keep reported order.
#[derive(Debug, Clone, Copy, Default)]
pub struct MostFreeMemory;

impl RankingStrategy for MostFreeMemory {
    fn rank(&self, inventory: &DeviceInventory) -> Vec<usize> {
        let mut ranked: Vec<(usize, Option<usize>)> = inventory
            .iter()
            .map(|d| (d.index, d.info.free_vram))
            .collect();
        // Stable sort; `None < Some(_)` so unknown memory sorts last.
        ranked.sort_by_key(|&(_, free)| Reverse(free));
        ranked.into_iter().map(|(index, _)| index).collect()
    }
}

/// Named strategies, for config files and the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Ranking {
    #[default]
    ReportedOrder,
    MostFreeMemory,
}

impl Ranking {
    pub fn strategy(self) -> Box<dyn RankingStrategy + Send + Sync> {
        match self {
            Ranking::ReportedOrder => Box::new(ReportedOrder),
            Ranking::MostFreeMemory => Box::new(MostFreeMemory),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::device::{stub_devices_wintermute, GpuDeviceInfo};

    #[test]
    fn test_reported_order() {
        let inv = DeviceInventory::new(stub_devices_wintermute());
        assert_eq!(ReportedOrder.rank(&inv), vec![0, 1]);
    }

    #[test]
    fn test_most_free_memory() {
        let mut devices = stub_devices_wintermute();
        devices.push(GpuDeviceInfo::bare(2, "unknown"));
        devices.push(GpuDeviceInfo {
            free_vram: Some(22 * 1024 * 1024 * 1024),
            ..GpuDeviceInfo::bare(3, "tied with 0")
        });
        let inv = DeviceInventory::new(devices);

        assert_eq!(MostFreeMemory.rank(&inv), vec![0, 3, 1, 2]);
    }
}
