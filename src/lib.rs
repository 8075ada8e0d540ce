// Re-export modules for testing and external use
pub mod engine {
    pub mod document;
    pub mod output;
    pub mod resource;

    pub use document::TerraformDocument;
    pub use output::Output;
    pub use resource::{Engine, Resource, ResourceRef, ResourceType};
}

pub mod resources {
    pub mod iam_role;
    pub mod instance;
    pub mod security_group;

    pub use iam_role::{AssumeRoleService, IamRole, IamRoleBundle};
    pub use instance::{Instance, InstanceOutput};
    pub use security_group::{RuleType, SecurityGroup, SecurityGroupOutput, SecurityGroupRule};
}

pub mod shared {
    pub mod logging;
    pub mod naming;
    pub mod security;
}

pub mod terraform {
    pub mod model;
    pub mod output;
    pub mod service;
}

pub mod core {
    pub mod provisioner;
    pub mod stack;
}

pub mod config;
pub mod error;

pub use config::StackConfig;
pub use core::provisioner::{Provisioner, RunOptions};
pub use core::stack::{declare_stack, StackOutputs};
pub use error::ProvisionError;
pub use shared::naming::{encode_user_data, StackContext};
pub use terraform::service::{TerraformExecutor, TerraformService};
