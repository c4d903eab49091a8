//! Runtime configuration for gpu-autoselect.
//!
//! Configuration is loaded from a JSON file and then overridden by
//! command-line flags. The trainer device flags and the inventory source
//! both live here.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::gpu::device::fake_devices;
use crate::gpu::provider::{InventoryProvider, NvidiaSmiInventory, StaticInventory};
use crate::gpu::visibility::VisibleDevices;
use crate::select::ranking::Ranking;
use crate::select::selector::DeviceSelector;
use crate::trainer::args::{Accelerator, DeviceSpec, TrainerDeviceArgs};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "gpu-autoselect", about = "Pick GPUs for a training job")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "gpu-autoselect.json")]
    pub config: PathBuf,

    /// Accelerator family.
    #[arg(long, value_enum)]
    pub accelerator: Option<Accelerator>,

    /// Devices to use: a count, -1 / "auto" for all, or ids like "0,1".
    #[arg(long, allow_hyphen_values = true)]
    pub devices: Option<DeviceSpec>,

    /// Legacy GPU flag (deprecated; use --accelerator gpu --devices).
    #[arg(long, allow_hyphen_values = true)]
    pub gpus: Option<DeviceSpec>,

    /// Pick GPUs automatically from a count. `--auto-select-gpus false`
    /// overrides a config file that enables it.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub auto_select_gpus: Option<bool>,

    /// Where the device inventory comes from.
    #[arg(long, value_enum)]
    pub source: Option<InventorySource>,

    /// Number of fake GPUs for `--source fake`.
    #[arg(long)]
    pub fake_gpus: Option<usize>,

    /// Preference order when auto-selecting.
    #[arg(long, value_enum)]
    pub ranking: Option<Ranking>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The resolved devices as JSON.
    Json,
    /// A `CUDA_VISIBLE_DEVICES=...` line.
    Env,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InventorySource {
    #[default]
    NvidiaSmi,
    Cuda,
    Fake,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Trainer device flags.
    pub trainer: TrainerDeviceArgs,

    /// Inventory settings.
    pub inventory: InventoryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub source: InventorySource,

    /// `nvidia-smi` binary to run.
    pub nvidia_smi: PathBuf,

    /// Number of GPUs reported by the fake source.
    pub fake_gpus: usize,

    pub ranking: Ranking,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            source: InventorySource::NvidiaSmi,
            nvidia_smi: PathBuf::from("nvidia-smi"),
            fake_gpus: 2,
            ranking: Ranking::ReportedOrder,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply command-line overrides.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(accelerator) = cli.accelerator {
            self.trainer.accelerator = accelerator;
        }
        if let Some(devices) = &cli.devices {
            self.trainer.devices = Some(devices.clone());
        }
        if let Some(gpus) = &cli.gpus {
            self.trainer.gpus = Some(gpus.clone());
        }
        if let Some(auto_select_gpus) = cli.auto_select_gpus {
            self.trainer.auto_select_gpus = auto_select_gpus;
        }
        if let Some(source) = cli.source {
            self.inventory.source = source;
        }
        if let Some(n) = cli.fake_gpus {
            self.inventory.source = InventorySource::Fake;
            self.inventory.fake_gpus = n;
        }
        if let Some(ranking) = cli.ranking {
            self.inventory.ranking = ranking;
        }
    }

    /// Build the selector for the configured source, restricted by `visible`.
    pub fn selector(
        &self,
        visible: VisibleDevices,
    ) -> anyhow::Result<DeviceSelector<Box<dyn InventoryProvider>>> {
        let provider: Box<dyn InventoryProvider> = match self.inventory.source {
            InventorySource::NvidiaSmi => Box::new(
                NvidiaSmiInventory::new(visible).with_binary(&self.inventory.nvidia_smi),
            ),
            InventorySource::Fake => Box::new(
                StaticInventory::new(fake_devices(self.inventory.fake_gpus))
                    .with_visibility(visible),
            ),
            #[cfg(feature = "cuda")]
            InventorySource::Cuda => Box::new(crate::gpu::provider::CudaInventory::new(visible)),
            #[cfg(not(feature = "cuda"))]
            InventorySource::Cuda => {
                anyhow::bail!("inventory source `cuda` requires building with --features cuda")
            }
        };

        Ok(DeviceSelector::new(provider).with_ranking(self.inventory.ranking.strategy()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.inventory.source, InventorySource::NvidiaSmi);
        assert_eq!(cfg.inventory.ranking, Ranking::ReportedOrder);
        assert!(!cfg.trainer.auto_select_gpus);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"trainer": {"gpus": 1, "auto_select_gpus": true},
                "inventory": {"source": "fake", "ranking": "most-free-memory"}}"#,
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.trainer.gpus, Some(DeviceSpec::Count(1)));
        assert!(cfg.trainer.auto_select_gpus);
        assert_eq!(cfg.inventory.source, InventorySource::Fake);
        assert_eq!(cfg.inventory.ranking, Ranking::MostFreeMemory);
        assert_eq!(cfg.inventory.fake_gpus, 2);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/gpu-autoselect.json")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "gpu-autoselect",
            "--accelerator",
            "gpu",
            "--devices",
            "-1",
            "--auto-select-gpus",
            "--fake-gpus",
            "4",
        ]);
        let mut cfg = Config::default();
        cfg.apply_cli(&cli);

        assert_eq!(cfg.trainer.accelerator, Accelerator::Gpu);
        assert_eq!(cfg.trainer.devices, Some(DeviceSpec::ALL));
        assert!(cfg.trainer.auto_select_gpus);
        assert_eq!(cfg.inventory.source, InventorySource::Fake);
        assert_eq!(cfg.inventory.fake_gpus, 4);
    }

    #[test]
    fn test_cli_can_disable_auto_select() {
        let mut cfg = Config::default();
        cfg.trainer.auto_select_gpus = true;

        let cli = Cli::parse_from(["gpu-autoselect", "--auto-select-gpus", "false"]);
        cfg.apply_cli(&cli);
        assert!(!cfg.trainer.auto_select_gpus);

        let cli = Cli::parse_from(["gpu-autoselect"]);
        cfg.trainer.auto_select_gpus = true;
        cfg.apply_cli(&cli);
        assert!(cfg.trainer.auto_select_gpus);
    }

    #[test]
    fn test_fake_selector() {
        let mut cfg = Config::default();
        cfg.inventory.source = InventorySource::Fake;
        cfg.inventory.fake_gpus = 3;

        let selector = cfg.selector(VisibleDevices::restricted("2,1")).unwrap();
        assert_eq!(selector.select(-1).unwrap(), vec![0, 1]);
    }
}
