//! IAM role, policy attachments and instance profile declaration.

use crate::config::{IamRoleConfig, Tags};
use crate::engine::output::{escaped, Output};
use crate::engine::resource::{validate_label, Engine, Resource, ResourceRef, ResourceType};
use crate::error::{ProvisionError, Result};
use crate::shared::naming::StackContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const POLICY_VERSION: &str = "2012-10-17";
pub const DEFAULT_MAX_SESSION_DURATION: u32 = 3600;

/// Services allowed to assume a role declared here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssumeRoleService {
    Ec2,
    Lambda,
    EcsTasks,
    Ssm,
}

impl AssumeRoleService {
    pub fn principal(&self) -> &'static str {
        match self {
            AssumeRoleService::Ec2 => "ec2.amazonaws.com",
            AssumeRoleService::Lambda => "lambda.amazonaws.com",
            AssumeRoleService::EcsTasks => "ecs-tasks.amazonaws.com",
            AssumeRoleService::Ssm => "ssm.amazonaws.com",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Statement")]
    pub statement: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    #[serde(rename = "Effect")]
    pub effect: String,
    #[serde(rename = "Principal")]
    pub principal: Principal,
    #[serde(rename = "Action")]
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(rename = "Service")]
    pub service: String,
}

/// Identifiers produced by [`IamRole::create_role`]. Profile fields are empty
/// when no instance profile was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IamRoleBundle {
    pub role_name: Output,
    pub role_arn: Output,
    pub instance_profile_name: Output,
    pub instance_profile_arn: Output,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceProfileOutput {
    pub name: Output,
    pub arn: Output,
}

#[derive(Serialize)]
struct RoleArgs<'a> {
    name: &'a str,
    assume_role_policy: Output,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<Output>,
    max_session_duration: u32,
    #[serde(serialize_with = "escaped")]
    tags: &'a Tags,
}

#[derive(Serialize)]
struct PolicyAttachmentArgs<'a> {
    role: Output,
    #[serde(serialize_with = "escaped")]
    policy_arn: &'a str,
}

#[derive(Serialize)]
struct RolePolicyArgs<'a> {
    #[serde(serialize_with = "escaped")]
    name: &'a str,
    role: Output,
    policy: Output,
}

#[derive(Serialize)]
struct InstanceProfileArgs<'a> {
    name: &'a str,
    role: Output,
}

#[derive(Debug, Clone)]
pub struct IamRole {
    pub name: String,
    pub assume_role_policy: Option<serde_json::Value>,
    pub description: Option<String>,
    pub max_session_duration: u32,
    pub tags: Tags,
    pub managed_policy_arns: Vec<String>,
    pub inline_policies: BTreeMap<String, serde_json::Value>,
    pub enable_instance_profile: bool,
    role: Option<ResourceRef>,
}

impl IamRole {
    pub fn new(ctx: &StackContext, config: IamRoleConfig) -> Self {
        let tags = config
            .tags
            .unwrap_or_else(|| Tags::from([("Name".to_string(), config.name.clone())]));
        Self {
            name: ctx.derive_name(&config.name, Some("role")),
            assume_role_policy: config.assume_role_policy,
            description: config.description,
            max_session_duration: config
                .max_session_duration
                .unwrap_or(DEFAULT_MAX_SESSION_DURATION),
            tags,
            managed_policy_arns: config.managed_policy_arns.unwrap_or_default(),
            inline_policies: config.inline_policies.unwrap_or_default(),
            enable_instance_profile: config.instance_profile.unwrap_or(true),
            role: None,
        }
    }

    /// Trust policy letting `service` assume the role.
    pub fn generate_assume_role_policy(service: AssumeRoleService) -> PolicyDocument {
        PolicyDocument {
            version: POLICY_VERSION.to_string(),
            statement: vec![PolicyStatement {
                effect: "Allow".to_string(),
                principal: Principal {
                    service: service.principal().to_string(),
                },
                action: "sts:AssumeRole".to_string(),
            }],
        }
    }

    pub fn set_assume_role_policy(&mut self, document: &PolicyDocument) -> Result<()> {
        self.assume_role_policy = Some(serde_json::to_value(document)?);
        Ok(())
    }

    /// The declared role, once [`create_role`](Self::create_role) has run.
    pub fn role(&self) -> Option<&ResourceRef> {
        self.role.as_ref()
    }

    fn managed_policy_label(&self, index: usize) -> String {
        format!("{}-managed-policy-{}", self.name, index)
    }

    fn inline_policy_label(&self, policy_name: &str) -> String {
        format!("{}-{}", self.name, policy_name)
    }

    pub fn instance_profile_name(&self) -> String {
        format!("{}-instance-profile", self.name)
    }

    pub fn create_role(&mut self, engine: &mut dyn Engine) -> Result<IamRoleBundle> {
        let trust_policy = match &self.assume_role_policy {
            Some(policy) => policy_text(policy)?,
            None => {
                return Err(ProvisionError::Precondition(format!(
                    "role {} has no assume_role_policy",
                    self.name
                )))
            }
        };
        for policy_name in self.inline_policies.keys() {
            validate_label(&self.inline_policy_label(policy_name))?;
        }

        tracing::info!(
            name = %self.name,
            managed_policies = self.managed_policy_arns.len(),
            inline_policies = self.inline_policies.len(),
            instance_profile = self.enable_instance_profile,
            "declaring IAM role"
        );
        let args = RoleArgs {
            name: &self.name,
            assume_role_policy: Output::literal(&trust_policy),
            description: self.description.as_deref().map(Output::literal),
            max_session_duration: self.max_session_duration,
            tags: &self.tags,
        };
        let role = engine.declare(Resource::new(ResourceType::IamRole, &self.name, &args)?)?;
        let role_name = role.attribute("name");
        let role_arn = role.attribute("arn");
        self.role = Some(role);

        for (idx, policy_arn) in self.managed_policy_arns.iter().enumerate() {
            let args = PolicyAttachmentArgs {
                role: role_name.clone(),
                policy_arn,
            };
            engine.declare(Resource::new(
                ResourceType::IamRolePolicyAttachment,
                &self.managed_policy_label(idx + 1),
                &args,
            )?)?;
        }

        for (policy_name, document) in &self.inline_policies {
            let args = RolePolicyArgs {
                name: policy_name,
                role: role_name.clone(),
                policy: Output::literal(&policy_text(document)?),
            };
            engine.declare(Resource::new(
                ResourceType::IamRolePolicy,
                &self.inline_policy_label(policy_name),
                &args,
            )?)?;
        }

        engine.export(&format!("{}_role_name", self.name), role_name.clone())?;
        engine.export(&format!("{}_role_arn", self.name), role_arn.clone())?;

        let (instance_profile_name, instance_profile_arn) = if self.enable_instance_profile {
            let profile = self.create_instance_profile(engine)?;
            (profile.name, profile.arn)
        } else {
            (Output::empty(), Output::empty())
        };

        Ok(IamRoleBundle {
            role_name,
            role_arn,
            instance_profile_name,
            instance_profile_arn,
        })
    }

    pub fn create_instance_profile(&self, engine: &mut dyn Engine) -> Result<InstanceProfileOutput> {
        let role = self.role.as_ref().ok_or_else(|| {
            ProvisionError::Precondition(
                "Role must be created before creating an instance profile".to_string(),
            )
        })?;

        let profile_name = self.instance_profile_name();
        let args = InstanceProfileArgs {
            name: &profile_name,
            role: role.attribute("name"),
        };
        let profile = engine.declare(Resource::new(
            ResourceType::IamInstanceProfile,
            &profile_name,
            &args,
        )?)?;

        let output = InstanceProfileOutput {
            name: profile.attribute("name"),
            arn: profile.attribute("arn"),
        };
        engine.export(
            &format!("{}_instance_profile_name", self.name),
            output.name.clone(),
        )?;
        engine.export(
            &format!("{}_instance_profile_arn", self.name),
            output.arn.clone(),
        )?;
        Ok(output)
    }
}

/// Policy documents are passed to AWS as JSON text.
fn policy_text(document: &serde_json::Value) -> Result<String> {
    match document {
        serde_json::Value::String(text) => Ok(text.clone()),
        other => Ok(serde_json::to_string(other)?),
    }
}
