//! ASM diskgroup and cell grid disk lifecycle.
//!
//! Leaves first: [`planner`] sizes the tiers, [`validator`] approves the sizes,
//! [`griddisk`] and [`gateway`] apply them, [`monitor`] waits for the
//! rebalance, [`rollback`] unwinds on failure, and [`lifecycle`] sequences it all.

pub mod error;
pub mod gateway;
pub mod griddisk;
pub mod input;
pub mod lifecycle;
pub mod monitor;
pub mod planner;
pub mod reporter;
pub mod rollback;
pub mod types;
pub mod validator;

pub use error::{DgResult, DiskgroupError, ErrorKind};
pub use lifecycle::{DiskgroupManager, OperationResult, ResultStatus};
pub use reporter::ProgressReporter;
pub use types::{DiskgroupRecord, OperationConfig, Redundancy, Tier};
