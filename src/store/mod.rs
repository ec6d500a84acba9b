//! Persistent session store: the device identity and contact push names.

mod container;
mod device;

pub use container::Container;
pub use device::Device;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt store data: {0}")]
    Corrupt(String),
    #[error("device has no JID; pair it before saving")]
    NoDeviceId,
}

pub type StoreResult<T> = Result<T, StoreError>;
