//! Workload registry access: wire model, HTTP transport, error taxonomy, and
//! the retrying list query used by claim recovery.

pub mod client;
pub mod error;
pub mod model;
pub mod options;
pub mod query;
pub(crate) mod retry;

pub use client::{HttpWorkloadApi, WorkloadApi};
pub use error::{RegistryError, RegistryErrorKind};
pub use options::RegistryClientOptions;
pub use query::{classify_registry_error, QueryError, RetryingRegistryClient};
