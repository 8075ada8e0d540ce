//! Security group declaration.

use crate::config::{RuleDescriptor, SecurityGroupConfig, Tags};
use crate::engine::output::{escaped, Output};
use crate::engine::resource::{Engine, Resource, ResourceType};
use crate::error::{ProvisionError, Result};
use crate::shared::naming::StackContext;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    Ingress,
    Egress,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Ingress => "ingress",
            RuleType::Egress => "egress",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleType::Ingress => write!(f, "INGRESS"),
            RuleType::Egress => write!(f, "EGRESS"),
        }
    }
}

impl std::str::FromStr for RuleType {
    type Err = ProvisionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ingress" => Ok(RuleType::Ingress),
            "egress" => Ok(RuleType::Egress),
            _ => Err(ProvisionError::InvalidRuleType(s.to_string())),
        }
    }
}

/// Fully populated rule as the `aws_security_group` inline blocks need it.
/// Every list key is always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityGroupRule {
    #[serde(skip)]
    pub rule_type: RuleType,
    pub from_port: i32,
    pub to_port: i32,
    pub protocol: String,
    pub cidr_blocks: Vec<String>,
    pub ipv6_cidr_blocks: Vec<String>,
    pub prefix_list_ids: Vec<String>,
    pub security_groups: Vec<String>,
    #[serde(rename = "self")]
    pub self_referencing: bool,
    pub description: String,
}

#[derive(Debug, Serialize)]
struct SecurityGroupArgs<'a> {
    name: &'a str,
    #[serde(serialize_with = "escaped")]
    description: &'a str,
    #[serde(serialize_with = "escaped")]
    vpc_id: &'a str,
    #[serde(serialize_with = "escaped")]
    ingress: Vec<SecurityGroupRule>,
    #[serde(serialize_with = "escaped")]
    egress: Vec<SecurityGroupRule>,
    #[serde(serialize_with = "escaped")]
    tags: &'a Tags,
}

/// Identifier of the created group, `{sg_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityGroupOutput {
    pub sg_id: Output,
}

#[derive(Debug, Clone)]
pub struct SecurityGroup {
    pub name: String,
    pub vpc_id: String,
    pub description: String,
    pub ingress: Vec<RuleDescriptor>,
    pub egress: Vec<RuleDescriptor>,
    pub tags: Tags,
}

impl SecurityGroup {
    pub fn new(ctx: &StackContext, config: SecurityGroupConfig) -> Self {
        let name = ctx.derive_name(&config.name, Some("sg"));
        let egress = match config.egress {
            Some(rules) if !rules.is_empty() => rules,
            _ => Self::default_egress(),
        };
        let tags = config.tags.unwrap_or_else(|| {
            Tags::from([
                ("Name".to_string(), name.clone()),
                ("Environment".to_string(), ctx.environment().to_string()),
            ])
        });
        Self {
            description: format!("Security Group for {}", name),
            name,
            vpc_id: config.vpc_id,
            ingress: config.ingress,
            egress,
            tags,
        }
    }

    /// Allow all protocols on all ports to anywhere. `0-0` with protocol `-1`
    /// is the AWS spelling of "any port".
    pub fn default_egress() -> Vec<RuleDescriptor> {
        vec![RuleDescriptor {
            rule_type: RuleType::Egress.as_str().to_string(),
            from_port: 0,
            to_port: 0,
            protocol: "-1".to_string(),
            cidr_blocks: Some(vec!["0.0.0.0/0".to_string()]),
            ipv6_cidr_blocks: None,
            prefix_list_ids: None,
            security_groups: None,
            self_referencing: false,
        }]
    }

    pub fn build_rule(descriptor: &RuleDescriptor) -> Result<SecurityGroupRule> {
        let rule_type: RuleType = descriptor.rule_type.parse()?;
        Ok(SecurityGroupRule {
            rule_type,
            from_port: descriptor.from_port,
            to_port: descriptor.to_port,
            protocol: descriptor.protocol.clone(),
            cidr_blocks: descriptor.cidr_blocks.clone().unwrap_or_default(),
            ipv6_cidr_blocks: descriptor.ipv6_cidr_blocks.clone().unwrap_or_default(),
            prefix_list_ids: descriptor.prefix_list_ids.clone().unwrap_or_default(),
            security_groups: descriptor.security_groups.clone().unwrap_or_default(),
            self_referencing: descriptor.self_referencing,
            description: format!(
                "{} Security Group rule allowing {} traffic on ports {}-{}",
                rule_type, descriptor.protocol, descriptor.from_port, descriptor.to_port
            ),
        })
    }

    pub fn create(&self, engine: &mut dyn Engine) -> Result<SecurityGroupOutput> {
        let ingress = self
            .ingress
            .iter()
            .map(Self::build_rule)
            .collect::<Result<Vec<_>>>()?;
        let egress = self
            .egress
            .iter()
            .map(Self::build_rule)
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            name = %self.name,
            ingress = ingress.len(),
            egress = egress.len(),
            "declaring security group"
        );
        let args = SecurityGroupArgs {
            name: &self.name,
            description: &self.description,
            vpc_id: &self.vpc_id,
            ingress,
            egress,
            tags: &self.tags,
        };
        let sg = engine.declare(Resource::new(ResourceType::SecurityGroup, &self.name, &args)?)?;

        engine.export(&format!("{}_sg_id", self.name), sg.id())?;
        Ok(SecurityGroupOutput { sg_id: sg.id() })
    }
}
