//! GPU device information and the visible-device inventory.
//!
//! A [`DeviceInventory`] is the ordered list of GPUs the process can see.
//! Each entry has a logical index (its position in that list) and the
//! physical id reported by the driver / `nvidia-smi`.

use serde::{Deserialize, Serialize};

use crate::gpu::visibility::VisibleDevices;

/// Information about a single physical GPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuDeviceInfo {
    /// Physical device index.
    pub id: usize,

    /// Device name (e.g., "NVIDIA GeForce GTX 1070").
    pub name: String,

    /// Total VRAM in bytes, if known.
    pub total_vram: Option<usize>,

    /// Free VRAM in bytes at query time, if known.
    pub free_vram: Option<usize>,
}

impl GpuDeviceInfo {
    /// A device with only an id and name; memory unknown.
    pub fn bare(id: usize, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            total_vram: None,
            free_vram: None,
        }
    }
}

/// A device as seen by this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleDevice {
    /// Logical index: position in the visible list.
    pub index: usize,

    /// The underlying physical device.
    pub info: GpuDeviceInfo,
}

impl VisibleDevice {
    pub fn physical_id(&self) -> usize {
        self.info.id
    }
}

/// Snapshot of the devices visible to the process, in reported order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInventory {
    devices: Vec<VisibleDevice>,
}

impl DeviceInventory {
    /// Build an inventory from already-visible devices. Logical indices
    /// are assigned by position.
    pub fn new(visible: Vec<GpuDeviceInfo>) -> Self {
        let devices = visible
            .into_iter()
            .enumerate()
            .map(|(index, info)| VisibleDevice { index, info })
            .collect();
        Self { devices }
    }

    /// Build an inventory from every physical device on the host, keeping
    /// only those the visibility restriction exposes, in its order.
    pub fn from_physical(physical: Vec<GpuDeviceInfo>, visible: &VisibleDevices) -> Self {
        let ids: Vec<usize> = physical.iter().map(|d| d.id).collect();
        let order = visible.resolve(&ids);

        let mut pool: Vec<Option<GpuDeviceInfo>> = physical.into_iter().map(Some).collect();
        let devices = order
            .into_iter()
            .filter_map(|id| {
                let slot = ids.iter().position(|&p| p == id)?;
                pool[slot].take()
            })
            .collect();

        Self::new(devices)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Logical indices, `0..len()`.
    pub fn indices(&self) -> Vec<usize> {
        self.devices.iter().map(|d| d.index).collect()
    }

    pub fn get(&self, index: usize) -> Option<&VisibleDevice> {
        self.devices.get(index)
    }

    /// Map a logical index to the physical device id.
    pub fn physical_id(&self, index: usize) -> Option<usize> {
        self.get(index).map(VisibleDevice::physical_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VisibleDevice> {
        self.devices.iter()
    }

    /// Comma-separated physical ids for the given logical indices, suitable
    /// for a child process's `CUDA_VISIBLE_DEVICES`.
    pub fn cuda_visible_devices(&self, indices: &[usize]) -> String {
        indices
            .iter()
            .filter_map(|&i| self.physical_id(i))
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

const GIB: usize = 1024 * 1024 * 1024;

/// `count` identical fake GPUs, ids `0..count`, for running without hardware.
pub fn fake_devices(count: usize) -> Vec<GpuDeviceInfo> {
    (0..count)
        .map(|id| GpuDeviceInfo {
            id,
            name: format!("Fake GPU {id}"),
            total_vram: Some(8 * GIB),
            free_vram: Some(8 * GIB),
        })
        .collect()
}

/// Stub hardware profile: 2x GTX 1070 (8 GB each).
pub fn stub_devices_molly() -> Vec<GpuDeviceInfo> {
    vec![
        GpuDeviceInfo {
            id: 0,
            name: "NVIDIA GeForce GTX 1070".to_string(),
            total_vram: Some(8 * GIB),
            free_vram: Some(7 * GIB),
        },
        GpuDeviceInfo {
            id: 1,
            name: "NVIDIA GeForce GTX 1070".to_string(),
            total_vram: Some(8 * GIB),
            free_vram: Some(7 * GIB),
        },
    ]
}

/// Stub hardware profile: 2x Quadro M6000 (24 GB each), second one busy.
pub fn stub_devices_wintermute() -> Vec<GpuDeviceInfo> {
    vec![
        GpuDeviceInfo {
            id: 0,
            name: "NVIDIA Quadro M6000".to_string(),
            total_vram: Some(24 * GIB),
            free_vram: Some(22 * GIB),
        },
        GpuDeviceInfo {
            id: 1,
            name: "NVIDIA Quadro M6000".to_string(),
            total_vram: Some(24 * GIB),
            free_vram: Some(3 * GIB),
        },
    ]
}
