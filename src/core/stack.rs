//! Stack declaration: security group, then IAM role, then instance.
//!
//! Each step consumes identifiers produced by the previous one, so the order
//! here is fixed. The engine turns the references into its own dependency
//! graph.

use crate::config::{is_set, StackConfig};
use crate::engine::resource::Engine;
use crate::error::Result;
use crate::resources::iam_role::{AssumeRoleService, IamRole, IamRoleBundle};
use crate::resources::instance::{Instance, InstanceOutput};
use crate::resources::security_group::{SecurityGroup, SecurityGroupOutput};
use crate::shared::naming::{encode_user_data, StackContext};
use serde::Serialize;

/// Everything the three builders handed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackOutputs {
    pub security_group: SecurityGroupOutput,
    pub iam_role: IamRoleBundle,
    pub instance: InstanceOutput,
}

pub fn declare_stack(
    ctx: &StackContext,
    config: &StackConfig,
    engine: &mut dyn Engine,
) -> Result<StackOutputs> {
    config.validate()?;

    let security_group = SecurityGroup::new(ctx, config.security_group.clone()).create(engine)?;

    let mut iam_role = IamRole::new(ctx, config.iam_role.clone());
    let trust_policy = IamRole::generate_assume_role_policy(AssumeRoleService::Ec2);
    iam_role.set_assume_role_policy(&trust_policy)?;
    let role = iam_role.create_role(engine)?;

    let mut instance = Instance::new(ctx, config.ec_instance.clone());
    instance.set_vpc_security_group_ids(vec![security_group.sg_id.clone()]);
    let configured_user_data =
        is_set(&config.ec_instance.user_data) || is_set(&config.ec_instance.user_data_base64);
    if configured_user_data {
        tracing::debug!(instance = %instance.name, "using user data from configuration");
    } else {
        let template = ctx.load_user_data()?;
        instance.set_user_data_base64(encode_user_data(Some(&template)));
    }
    // a role without a profile leaves any configured profile in place
    if !role.instance_profile_name.is_empty() {
        instance.set_iam_instance_profile(role.instance_profile_name.clone());
    }
    let instance = instance.create(engine)?;

    Ok(StackOutputs {
        security_group,
        iam_role: role,
        instance,
    })
}
