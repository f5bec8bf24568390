//! Control-flow graph construction for elaborated method bodies.
//!
//! See [`cfg`] for an overview of the three translation phases.
pub mod cfg;
mod error;
mod settings;

pub use cfg::{build_cfg, build_cfg_for_method, ControlFlowGraph};
pub use error::{CfgError, CfgResult, InvariantViolation};
pub use settings::CfgSettings;
