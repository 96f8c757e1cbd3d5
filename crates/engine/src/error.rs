//! Engine-level errors.
//!
//! Only store and registry failures abort a cycle. Everything that goes
//! wrong with a single job or connection is absorbed into that cycle's
//! stats so one bad row cannot stall the whole fleet.

use wareflow_jobs::JobStoreError;

use crate::registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] JobStoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
