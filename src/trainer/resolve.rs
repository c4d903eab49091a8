//! Resolve trainer device flags into concrete devices.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::gpu::device::DeviceInventory;
use crate::gpu::provider::InventoryProvider;
use crate::select::selector::{select, ConfigurationError, DeviceSelector};
use crate::trainer::args::{Accelerator, DeviceSpec, TrainerDeviceArgs};
use crate::trainer::deprecation::{check_deprecations, Deprecation};

/// Outcome of device resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDevices {
    /// `Cpu` or `Gpu`; never `Auto`.
    pub accelerator: Accelerator,

    /// Chosen devices as logical indices into the visible inventory.
    pub logical_indices: Vec<usize>,

    /// Physical ids of the chosen devices, same order.
    pub device_ids: Vec<usize>,

    /// Notices raised for deprecated flags.
    pub deprecations: Vec<Deprecation>,
}

impl ResolvedDevices {
    fn cpu(deprecations: Vec<Deprecation>) -> Self {
        Self {
            accelerator: Accelerator::Cpu,
            logical_indices: Vec::new(),
            device_ids: Vec::new(),
            deprecations,
        }
    }

    pub fn num_devices(&self) -> usize {
        self.logical_indices.len()
    }

    /// Physical ids joined for a child process's `CUDA_VISIBLE_DEVICES`.
    pub fn cuda_visible_devices(&self) -> String {
        self.device_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Resolve `args` against the selector's inventory.
///
/// Deprecation notices are collected first; the inventory is only queried
/// when GPUs may actually be used.
pub fn resolve_devices<P: InventoryProvider>(
    args: &TrainerDeviceArgs,
    selector: &DeviceSelector<P>,
) -> Result<ResolvedDevices> {
    let deprecations = check_deprecations(args);
    let (accelerator, spec) = effective_flags(args);

    if accelerator == Accelerator::Cpu {
        if args.auto_select_gpus {
            warn!("auto_select_gpus has no effect with accelerator=cpu");
        }
        return Ok(ResolvedDevices::cpu(deprecations));
    }

    let spec = spec.unwrap_or(DeviceSpec::ALL);
    // Rejected for any inventory, so checked before querying one.
    if let DeviceSpec::Count(n) = &spec {
        let n = *n;
        if args.auto_select_gpus && (n == 0 || n < -1) {
            return Err(ConfigurationError::InvalidCount { requested: n }.into());
        }
    }
    if spec == DeviceSpec::Count(0) && !args.auto_select_gpus {
        debug!("Zero GPUs requested, using CPU");
        return Ok(ResolvedDevices::cpu(deprecations));
    }

    let inventory = match selector.inventory() {
        Ok(inventory) => inventory,
        Err(e) if accelerator == Accelerator::Auto => {
            warn!(error = %e, "GPU inventory unavailable, using CPU");
            return Ok(ResolvedDevices::cpu(deprecations));
        }
        Err(e) => return Err(e.into()),
    };

    let logical_indices = match &spec {
        DeviceSpec::Count(n) if args.auto_select_gpus => selector.select_from(*n, &inventory)?,
        DeviceSpec::Count(n) if *n < -1 => {
            return Err(ConfigurationError::InvalidSpec(n.to_string()).into());
        }
        DeviceSpec::Count(n) => select(*n, &inventory)?,
        DeviceSpec::Ids(ids) => {
            if args.auto_select_gpus {
                debug!(ids = ?ids, "Explicit GPU ids given, skipping auto-selection");
            }
            validate_ids(ids, &inventory)?
        }
    };

    if logical_indices.is_empty() {
        if accelerator == Accelerator::Auto {
            debug!("No GPUs visible, using CPU");
            return Ok(ResolvedDevices::cpu(deprecations));
        }
        return Err(ConfigurationError::InsufficientDevices {
            requested: -1,
            available: 0,
        }
        .into());
    }

    let device_ids: Vec<usize> = logical_indices
        .iter()
        .filter_map(|&i| inventory.physical_id(i))
        .collect();

    info!(
        num_devices = logical_indices.len(),
        logical = ?logical_indices,
        physical = ?device_ids,
        auto_select = args.auto_select_gpus,
        "Resolved GPUs"
    );

    Ok(ResolvedDevices {
        accelerator: Accelerator::Gpu,
        logical_indices,
        device_ids,
        deprecations,
    })
}

/// `gpus` wins over `devices` and implies a GPU accelerator.
fn effective_flags(args: &TrainerDeviceArgs) -> (Accelerator, Option<DeviceSpec>) {
    match (&args.gpus, &args.devices) {
        (Some(gpus), devices) => {
            if let Some(devices) = devices {
                warn!(%gpus, %devices, "Both `gpus` and `devices` are set; `devices` is ignored");
            }
            (Accelerator::Gpu, Some(gpus.clone()))
        }
        (None, devices) => (args.accelerator, devices.clone()),
    }
}

/// Explicit ids must be visible and distinct. Order is kept as given.
fn validate_ids(
    ids: &[usize],
    inventory: &DeviceInventory,
) -> std::result::Result<Vec<usize>, ConfigurationError> {
    let mut seen = Vec::with_capacity(ids.len());
    for &id in ids {
        if inventory.get(id).is_none() {
            return Err(ConfigurationError::UnknownDevice {
                id,
                available: inventory.indices(),
            });
        }
        if seen.contains(&id) {
            return Err(ConfigurationError::DuplicateDevice { id });
        }
        seen.push(id);
    }
    Ok(seen)
}
