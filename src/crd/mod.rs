//! Custom Resource Definitions for the clique operator
//!
//! Group → ScalingGroup → Clique, linked by labels and owner references.

mod clique;
mod group;
mod scaling_group;
pub mod types;


pub use clique::{Clique, CliqueSpec, CliqueStatus};
pub use group::{
    scaling_group_name, scaling_group_names, Group, GroupSpec, GroupTemplate, ScalingGroupConfig,
};
pub use scaling_group::{ScalingGroup, ScalingGroupSpec, ScalingGroupStatus};
pub use types::*;
