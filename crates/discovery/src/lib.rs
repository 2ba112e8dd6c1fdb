//! Prometheus service discovery for systems managed by Uyuni / SUSE Manager.
//!
//! Each refresh cycle logs in to the Uyuni XML-RPC API, lists the managed
//! systems, resolves their details, network names and exporter formulas, and
//! turns the result into a single labeled [`TargetGroup`].
//!
//! # Components
//!
//! - [`session`]: login/logout around one cycle
//! - [`inventory`]: system list, details and FQDNs
//! - [`formula`]: exporter formula lookups
//! - [`builder`]: target group assembly
//! - [`refresh`]: the per-cycle orchestrator
//! - [`runner`]: fixed-interval polling loop publishing changed results

pub mod builder;
pub mod config;
pub mod error;
pub mod formula;
pub mod inventory;
pub mod refresh;
pub mod runner;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export primary types.
pub use config::SdConfig;
pub use error::DiscoveryError;
pub use refresh::{CycleState, Discovery};
pub use runner::Runner;
pub use session::Session;
pub use types::{
    Exporter, FileSdEntry, FormulaConfig, LABEL_ENTITLEMENTS, LABEL_EXPORTER, LABEL_PREFIX,
    ResolvedSystem, SystemDetail, SystemRef, Target, TargetGroup,
};
