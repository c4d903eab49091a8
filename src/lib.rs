//! gpu-autoselect: pick GPUs for a training job.
//!
//! Translates a requested GPU count (or an explicit id list) into a
//! validated list of visible devices:
//!   inventory (nvidia-smi / CUDA driver, filtered by `CUDA_VISIBLE_DEVICES`)
//!   → selection (`-1` = all, `k` = best `k`) → physical device ids.

pub mod config;
pub mod error;
pub mod gpu;
pub mod select;
pub mod trainer;

pub use error::{Error, Result};
