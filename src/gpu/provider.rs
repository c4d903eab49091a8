//! Inventory providers: where the list of visible GPUs comes from.
//!
//! Every provider is queried fresh on each selection call and applies the
//! injected [`VisibleDevices`] restriction itself.

use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gpu::device::{DeviceInventory, GpuDeviceInfo};
use crate::gpu::visibility::VisibleDevices;

/// Failure to obtain the device inventory.
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Failed to run {command}: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Unparseable device row {line:?}: {reason}")]
    Parse { line: String, reason: String },

    #[error("CUDA driver error: {0}")]
    Driver(String),
}

/// Source of the visible-device inventory.
pub trait InventoryProvider {
    fn inventory(&self) -> Result<DeviceInventory, InventoryError>;
}

impl<P: InventoryProvider + ?Sized> InventoryProvider for Box<P> {
    fn inventory(&self) -> Result<DeviceInventory, InventoryError> {
        (**self).inventory()
    }
}

impl<P: InventoryProvider + ?Sized> InventoryProvider for &P {
    fn inventory(&self) -> Result<DeviceInventory, InventoryError> {
        (**self).inventory()
    }
}

/// A fixed set of physical devices. Used for tests and `--fake-gpus`.
#[derive(Debug, Clone)]
pub struct StaticInventory {
    physical: Vec<GpuDeviceInfo>,
    visible: VisibleDevices,
}

impl StaticInventory {
    pub fn new(physical: Vec<GpuDeviceInfo>) -> Self {
        Self {
            physical,
            visible: VisibleDevices::unrestricted(),
        }
    }

    pub fn with_visibility(mut self, visible: VisibleDevices) -> Self {
        self.visible = visible;
        self
    }
}

impl InventoryProvider for StaticInventory {
    fn inventory(&self) -> Result<DeviceInventory, InventoryError> {
        Ok(DeviceInventory::from_physical(
            self.physical.clone(),
            &self.visible,
        ))
    }
}

const MIB: usize = 1024 * 1024;

/// Queries `nvidia-smi`, which always reports physical indices.
#[derive(Debug, Clone)]
pub struct NvidiaSmiInventory {
    binary: PathBuf,
    visible: VisibleDevices,
}

impl NvidiaSmiInventory {
    pub fn new(visible: VisibleDevices) -> Self {
        Self {
            binary: PathBuf::from("nvidia-smi"),
            visible,
        }
    }

    /// Use a specific `nvidia-smi` binary.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    fn query(&self) -> Result<String, InventoryError> {
        let command = self.binary.display().to_string();
        let output = Command::new(&self.binary)
            .args([
                "--query-gpu=index,name,memory.total,memory.free",
                "--format=csv,noheader,nounits",
            ])
            .output()
            .map_err(|e| InventoryError::CommandFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(stderr = %stderr, "nvidia-smi exited with {}", output.status);
            return Err(InventoryError::CommandFailed {
                command,
                reason: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl InventoryProvider for NvidiaSmiInventory {
    fn inventory(&self) -> Result<DeviceInventory, InventoryError> {
        let physical = parse_query_output(&self.query()?)?;
        let inventory = DeviceInventory::from_physical(physical, &self.visible);

        info!(
            gpu_count = inventory.len(),
            restricted = self.visible.is_restricted(),
            "Detected visible GPUs"
        );
        Ok(inventory)
    }
}

/// Parse `index, name, memory.total, memory.free` rows (MiB, no units).
pub fn parse_query_output(stdout: &str) -> Result<Vec<GpuDeviceInfo>, InventoryError> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_query_row)
        .collect()
}

fn parse_query_row(line: &str) -> Result<GpuDeviceInfo, InventoryError> {
    let parse_err = |reason: &str| InventoryError::Parse {
        line: line.to_string(),
        reason: reason.to_string(),
    };

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [index, name, total, free] = fields.as_slice() else {
        return Err(parse_err("expected 4 fields"));
    };

    let id = index
        .parse::<usize>()
        .map_err(|_| parse_err("index is not an integer"))?;

    Ok(GpuDeviceInfo {
        id,
        name: name.to_string(),
        total_vram: parse_mib(total),
        free_vram: parse_mib(free),
    })
}

/// `[N/A]` and friends become `None`.
fn parse_mib(field: &str) -> Option<usize> {
    field.parse::<usize>().ok().map(|mib| mib * MIB)
}

/// Enumerates through the CUDA driver. The driver has already applied
/// `CUDA_VISIBLE_DEVICES`, so the restriction is only used to recover
/// physical ids.
#[cfg(feature = "cuda")]
#[derive(Debug, Clone)]
pub struct CudaInventory {
    visible: VisibleDevices,
}

#[cfg(feature = "cuda")]
impl CudaInventory {
    pub fn new(visible: VisibleDevices) -> Self {
        Self { visible }
    }
}

#[cfg(feature = "cuda")]
impl InventoryProvider for CudaInventory {
    fn inventory(&self) -> Result<DeviceInventory, InventoryError> {
        use cudarc::driver::result;

        let driver = |e: result::DriverError| InventoryError::Driver(e.to_string());

        result::init().map_err(driver)?;
        let count = result::device::get_count().map_err(driver)? as usize;
        let listed = self.visible.listed();

        let mut devices = Vec::with_capacity(count);
        for ordinal in 0..count {
            let dev = result::device::get(ordinal as i32).map_err(driver)?;
            let name = result::device::get_name(dev).map_err(driver)?;
            let id = listed
                .as_ref()
                .and_then(|ids| ids.get(ordinal).copied())
                .unwrap_or(ordinal);
            devices.push(GpuDeviceInfo::bare(id, name));
        }

        debug!(gpu_count = devices.len(), "CUDA driver enumeration");
        Ok(DeviceInventory::new(devices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::device::stub_devices_molly;

    #[test]
    fn test_parse_query_output() {
        let out = "0, NVIDIA GeForce GTX 1070, 8192, 7000\n\
                   1, NVIDIA GeForce GTX 1070, 8192, [N/A]\n";
        let devices = parse_query_output(out).unwrap();

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, 0);
        assert_eq!(devices[0].name, "NVIDIA GeForce GTX 1070");
        assert_eq!(devices[0].total_vram, Some(8192 * MIB));
        assert_eq!(devices[0].free_vram, Some(7000 * MIB));
        assert_eq!(devices[1].free_vram, None);
    }

    #[test]
    fn test_parse_rejects_malformed_rows() {
        assert!(parse_query_output("0, only-two-fields").is_err());
        assert!(parse_query_output("x, GPU, 1, 1").is_err());
        assert!(parse_query_output("\n  \n").unwrap().is_empty());
    }

    #[test]
    fn test_static_inventory_applies_visibility() {
        let provider = StaticInventory::new(stub_devices_molly())
            .with_visibility(VisibleDevices::restricted("1"));
        let inv = provider.inventory().unwrap();

        assert_eq!(inv.indices(), vec![0]);
        assert_eq!(inv.physical_id(0), Some(1));
    }

    #[test]
    fn test_missing_binary_is_an_error() {
        let provider = NvidiaSmiInventory::new(VisibleDevices::unrestricted())
            .with_binary("/nonexistent/nvidia-smi");
        let err = provider.inventory().unwrap_err();
        assert!(matches!(err, InventoryError::CommandFailed { .. }));
    }
}
