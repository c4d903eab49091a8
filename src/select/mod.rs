//! Device selection.
//!
//! - [`selector`]: count validation and the [`DeviceSelector`]
//! - [`ranking`]: pluggable preference order for picking `k` devices

pub mod ranking;
pub mod selector;

pub use ranking::{MostFreeMemory, Ranking, RankingStrategy, ReportedOrder};
pub use selector::{pick_devices, select, ConfigurationError, DeviceSelector, RequestedCount};
