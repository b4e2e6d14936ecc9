//! padtrace-intercept: import-table interception for the padtrace proxy layer.
//!
//! Three concerns live here, all below the agent's notice:
//!
//! - `module`: loading the real implementation DLL and resolving its exports
//! - `iat`: locating the call-resolution slot a loaded module consults when
//!   it calls an imported symbol
//! - `patch`: swapping such a slot under a scoped protection change, keeping
//!   the original value for direct-call forwarding and later restoration

pub mod iat;
pub mod module;
pub mod patch;
pub mod types;

// Re-exports for convenience (flattened imports)
pub use patch::{PatchSite, ProtectGuard};
pub use types::PatchError;
