//! Integration tests for device selection against various inventories.

use gpu_autoselect::gpu::device::{fake_devices, stub_devices_molly, DeviceInventory};
use gpu_autoselect::gpu::provider::{InventoryProvider, StaticInventory};
use gpu_autoselect::gpu::visibility::VisibleDevices;
use gpu_autoselect::select::{pick_devices, select, ConfigurationError, DeviceSelector, MostFreeMemory};

fn inventories() -> Vec<DeviceInventory> {
    let mut out: Vec<DeviceInventory> = (0..=5)
        .map(|n| DeviceInventory::new(fake_devices(n)))
        .collect();
    // Restricted and reordered views of an 8-GPU host.
    for spec in ["3", "7,2,5", "1,0,6,4"] {
        out.push(DeviceInventory::from_physical(
            fake_devices(8),
            &VisibleDevices::restricted(spec),
        ));
    }
    out
}

fn is_subsequence(picked: &[usize], of: &[usize]) -> bool {
    let mut it = of.iter();
    picked.iter().all(|p| it.any(|x| x == p))
}

#[test]
fn test_first_k_for_every_valid_k() {
    for inv in inventories() {
        let all = inv.indices();
        for k in 1..=inv.len() {
            let picked = select(k as i64, &inv).unwrap();
            assert_eq!(picked, all[..k].to_vec());
        }
    }
}

#[test]
fn test_minus_one_returns_everything() {
    for inv in inventories() {
        assert_eq!(select(-1, &inv).unwrap(), inv.indices());
    }
}

#[test]
fn test_zero_always_rejected() {
    for inv in inventories() {
        let err = select(0, &inv).unwrap_err();
        assert!(err.to_string().contains("is not a valid configuration"));
    }
}

#[test]
fn test_more_than_available_rejected() {
    for inv in inventories() {
        for extra in 1..3 {
            let k = (inv.len() + extra) as i64;
            assert_eq!(
                select(k, &inv).unwrap_err(),
                ConfigurationError::InsufficientDevices {
                    requested: k,
                    available: inv.len()
                }
            );
        }
    }
}

#[test]
fn test_ranked_selection_is_ordered_subsequence() {
    for inv in inventories() {
        for k in 1..=inv.len() {
            let picked = pick_devices(k as i64, &inv, &MostFreeMemory).unwrap();
            assert_eq!(picked.len(), k);
            assert!(is_subsequence(&picked, &inv.indices()));
        }
    }
}

#[test]
fn test_scenario_two_gpus() {
    let inv = DeviceInventory::new(stub_devices_molly());

    let err = select(0, &inv).unwrap_err();
    assert_eq!(
        err.to_string(),
        "auto_select_gpus=true, gpus=0 is not a valid configuration. \
         Please select a valid number of GPU resources when using auto_select_gpus."
    );
    assert_eq!(select(-1, &inv).unwrap(), vec![0, 1]);
    assert_eq!(select(1, &inv).unwrap(), vec![0]);
}

#[test]
fn test_scenario_visibility_restricted_to_device_one() {
    let provider = StaticInventory::new(stub_devices_molly())
        .with_visibility(VisibleDevices::restricted("1"));
    let selector = DeviceSelector::new(provider);

    let picked = selector.select(1).unwrap();
    assert_eq!(picked, vec![0]);

    let inv = selector.provider().inventory().unwrap();
    assert_eq!(inv.physical_id(picked[0]), Some(1));
    assert_eq!(inv.cuda_visible_devices(&picked), "1");
}

#[test]
fn test_inventory_is_queried_fresh() {
    use std::cell::Cell;

    struct Growing(Cell<usize>);

    impl InventoryProvider for Growing {
        fn inventory(
            &self,
        ) -> Result<DeviceInventory, gpu_autoselect::gpu::provider::InventoryError> {
            let n = self.0.get();
            self.0.set(n + 1);
            Ok(DeviceInventory::new(fake_devices(n)))
        }
    }

    let selector = DeviceSelector::new(Growing(Cell::new(1)));
    assert!(selector.select(2).is_err()); // sees 1 GPU
    assert_eq!(selector.select(2).unwrap(), vec![0, 1]); // sees 2 GPUs
}
