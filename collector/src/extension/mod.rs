//! Built-in service extension factories.
//!
//! Extensions provide service-level features outside the data path; the
//! collector core only manages their start/stop lifecycle.

pub mod health_check;
pub mod pprof;
pub mod zpages;

pub use health_check::HealthCheckExtensionFactory;
pub use pprof::PprofExtensionFactory;
pub use zpages::ZpagesExtensionFactory;
