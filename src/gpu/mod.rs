//! GPU discovery.
//!
//! - [`device`]: device info and the visible-device inventory
//! - [`visibility`]: `CUDA_VISIBLE_DEVICES` parsing
//! - [`provider`]: inventory sources (static, `nvidia-smi`, CUDA driver)

pub mod device;
pub mod provider;
pub mod visibility;

pub use device::{DeviceInventory, GpuDeviceInfo, VisibleDevice};
pub use provider::{InventoryError, InventoryProvider, NvidiaSmiInventory, StaticInventory};
pub use visibility::VisibleDevices;

#[cfg(feature = "cuda")]
pub use provider::CudaInventory;
