//! Trainer device flags: `accelerator`, `devices`, legacy `gpus`, and
//! `auto_select_gpus`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::select::selector::ConfigurationError;

/// Requested accelerator family.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    Cpu,
    Gpu,
    /// GPU when any is visible, CPU otherwise.
    #[default]
    Auto,
}

/// A device flag value: a count or an explicit id list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DeviceSpec {
    /// `-1` for all visible devices, `0` for none, `k` for `k` devices.
    Count(i64),
    /// Logical device ids.
    Ids(Vec<usize>),
}

impl DeviceSpec {
    pub const ALL: DeviceSpec = DeviceSpec::Count(-1);
}

impl From<i64> for DeviceSpec {
    fn from(n: i64) -> Self {
        DeviceSpec::Count(n)
    }
}

impl From<Vec<usize>> for DeviceSpec {
    fn from(ids: Vec<usize>) -> Self {
        DeviceSpec::Ids(ids)
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSpec::Count(n) => write!(f, "{n}"),
            DeviceSpec::Ids(ids) => write!(f, "{ids:?}"),
        }
    }
}

/// Accepts `"auto"`, a count (`"-1"`, `"2"`), or a comma-separated id list
/// (`"0,1"`, or `"1,"` for the single id 1).
impl FromStr for DeviceSpec {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ConfigurationError::InvalidSpec(s.to_string());

        if s.eq_ignore_ascii_case("auto") {
            return Ok(DeviceSpec::ALL);
        }

        if s.contains(',') {
            let ids = s
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| t.parse::<usize>().map_err(|_| invalid()))
                .collect::<Result<Vec<_>, _>>()?;
            if ids.is_empty() {
                return Err(invalid());
            }
            return Ok(DeviceSpec::Ids(ids));
        }

        s.parse::<i64>().map(DeviceSpec::Count).map_err(|_| invalid())
    }
}

impl<'de> Deserialize<'de> for DeviceSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(i64),
            Ids(Vec<usize>),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(DeviceSpec::Count(n)),
            Raw::Ids(ids) if ids.is_empty() => Err(serde::de::Error::custom(
                ConfigurationError::InvalidSpec("[]".to_string()),
            )),
            Raw::Ids(ids) => Ok(DeviceSpec::Ids(ids)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Device-related trainer arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerDeviceArgs {
    pub accelerator: Accelerator,

    /// Devices to use with `accelerator`.
    pub devices: Option<DeviceSpec>,

    /// Legacy GPU flag; deprecated in favor of `accelerator="gpu"` + `devices`.
    pub gpus: Option<DeviceSpec>,

    /// Pick GPUs automatically from a count instead of fixed ids.
    pub auto_select_gpus: bool,
}

impl TrainerDeviceArgs {
    pub fn with_gpus(gpus: DeviceSpec, auto_select_gpus: bool) -> Self {
        Self {
            gpus: Some(gpus),
            auto_select_gpus,
            ..Default::default()
        }
    }

    pub fn with_devices(
        accelerator: Accelerator,
        devices: DeviceSpec,
        auto_select_gpus: bool,
    ) -> Self {
        Self {
            accelerator,
            devices: Some(devices),
            auto_select_gpus,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_spec() {
        assert_eq!("auto".parse::<DeviceSpec>().unwrap(), DeviceSpec::ALL);
        assert_eq!("-1".parse::<DeviceSpec>().unwrap(), DeviceSpec::Count(-1));
        assert_eq!(" 2 ".parse::<DeviceSpec>().unwrap(), DeviceSpec::Count(2));
        assert_eq!("0,1".parse::<DeviceSpec>().unwrap(), DeviceSpec::Ids(vec![0, 1]));
        assert_eq!("1,".parse::<DeviceSpec>().unwrap(), DeviceSpec::Ids(vec![1]));
    }

    #[test]
    fn test_parse_device_spec_errors() {
        for bad in ["", "gpu", ",", "0,x", "1.5"] {
            let err = bad.parse::<DeviceSpec>().unwrap_err();
            assert!(matches!(err, ConfigurationError::InvalidSpec(_)), "{bad}");
        }
    }

    #[test]
    fn test_args_from_json() {
        let args: TrainerDeviceArgs = serde_json::from_str(
            r#"{"accelerator": "gpu", "devices": "0,1", "auto_select_gpus": true}"#,
        )
        .unwrap();
        assert_eq!(args.accelerator, Accelerator::Gpu);
        assert_eq!(args.devices, Some(DeviceSpec::Ids(vec![0, 1])));
        assert!(args.auto_select_gpus);
        assert_eq!(args.gpus, None);

        let args: TrainerDeviceArgs = serde_json::from_str(r#"{"gpus": -1}"#).unwrap();
        assert_eq!(args.gpus, Some(DeviceSpec::ALL));
        assert_eq!(args.accelerator, Accelerator::Auto);

        let args: TrainerDeviceArgs = serde_json::from_str(r#"{"devices": [2]}"#).unwrap();
        assert_eq!(args.devices, Some(DeviceSpec::Ids(vec![2])));

        assert!(serde_json::from_str::<TrainerDeviceArgs>(r#"{"devices": "many"}"#).is_err());
    }

    #[test]
    fn test_empty_id_list_rejected() {
        let err = serde_json::from_str::<TrainerDeviceArgs>(r#"{"accelerator": "gpu", "devices": []}"#)
            .unwrap_err();
        assert!(err.to_string().contains("is not a valid device specification"));
    }

    #[test]
    fn test_spec_serializes_untagged() {
        assert_eq!(serde_json::to_string(&DeviceSpec::Count(2)).unwrap(), "2");
        assert_eq!(serde_json::to_string(&DeviceSpec::Ids(vec![0, 3])).unwrap(), "[0,3]");
    }
}
