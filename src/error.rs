//! Crate-level error type.

use thiserror::Error;

use crate::gpu::provider::InventoryError;
use crate::select::selector::ConfigurationError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

pub type Result<T> = std::result::Result<T, Error>;
