//! Typed stack configuration.
//!
//! The configuration is one JSON object with exactly three sections, each the
//! constructor arguments of one builder. Unknown keys anywhere are rejected so
//! typos fail at load time instead of silently falling back to defaults.

use crate::error::{ProvisionError, Result};
use crate::resources::security_group::RuleType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Inline JSON configuration
pub const CONFIG_ENV: &str = "TFPROVISION_CONFIG";
/// Path to a JSON configuration file
pub const CONFIG_FILE_ENV: &str = "TFPROVISION_CONFIG_FILE";

pub const MIN_SESSION_DURATION: u32 = 3600;
pub const MAX_SESSION_DURATION: u32 = 43200;

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    pub security_group: SecurityGroupConfig,
    pub iam_role: IamRoleConfig,
    pub ec_instance: InstanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SecurityGroupConfig {
    pub name: String,
    pub vpc_id: String,
    pub ingress: Vec<RuleDescriptor>,
    /// Omitted or empty means a single allow-all egress rule.
    #[serde(default)]
    pub egress: Option<Vec<RuleDescriptor>>,
    /// Replaces the default `Name`/`Environment` tags when present.
    #[serde(default)]
    pub tags: Option<Tags>,
}

/// Abstract ingress/egress rule as written in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RuleDescriptor {
    /// `ingress` or `egress`, any case.
    pub rule_type: String,
    pub from_port: i32,
    pub to_port: i32,
    pub protocol: String,
    #[serde(default)]
    pub cidr_blocks: Option<Vec<String>>,
    #[serde(default)]
    pub ipv6_cidr_blocks: Option<Vec<String>>,
    #[serde(default)]
    pub prefix_list_ids: Option<Vec<String>>,
    #[serde(default)]
    pub security_groups: Option<Vec<String>>,
    #[serde(rename = "self", default)]
    pub self_referencing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct IamRoleConfig {
    pub name: String,
    /// Trust policy document. The orchestration replaces it with an EC2 trust policy.
    #[serde(default)]
    pub assume_role_policy: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub max_session_duration: Option<u32>,
    #[serde(default)]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub managed_policy_arns: Option<Vec<String>>,
    /// Policy name to policy document (JSON object or JSON-encoded string).
    #[serde(default)]
    pub inline_policies: Option<BTreeMap<String, serde_json::Value>>,
    /// Create an instance profile bound to the role. Defaults to true.
    #[serde(default)]
    pub instance_profile: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    pub name: String,
    pub instance_type: String,
    pub ami_id: String,
    #[serde(default)]
    pub vpc_security_group_ids: Option<Vec<String>>,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default)]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub additional_volumes: Option<Vec<VolumeAttachmentConfig>>,
    /// Plaintext user data. Mutually exclusive with `user_data_base64`.
    #[serde(default)]
    pub user_data: Option<String>,
    /// Already base64-encoded user data.
    #[serde(default)]
    pub user_data_base64: Option<String>,
    #[serde(default)]
    pub launch_template: Option<LaunchTemplateConfig>,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub iam_instance_profile: Option<String>,
    #[serde(default)]
    pub associate_public_ip_address: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct VolumeAttachmentConfig {
    pub volume_id: String,
    pub device_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LaunchTemplateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Where the stack configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Inline(String),
}

impl ConfigSource {
    /// CLI path first, then `TFPROVISION_CONFIG`, then `TFPROVISION_CONFIG_FILE`.
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            return Ok(ConfigSource::File(path.to_path_buf()));
        }
        if let Ok(inline) = std::env::var(CONFIG_ENV) {
            if !inline.trim().is_empty() {
                return Ok(ConfigSource::Inline(inline));
            }
        }
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            if !path.trim().is_empty() {
                return Ok(ConfigSource::File(PathBuf::from(path)));
            }
        }
        Err(ProvisionError::InvalidConfig(format!(
            "no stack configuration given: pass --config or set {} / {}",
            CONFIG_ENV, CONFIG_FILE_ENV
        )))
    }

    pub fn load(&self) -> Result<StackConfig> {
        match self {
            ConfigSource::File(path) => StackConfig::from_path(path),
            ConfigSource::Inline(json) => StackConfig::from_json(json),
        }
    }
}

impl StackConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: StackConfig = serde_json::from_str(json)
            .map_err(|e| ProvisionError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Checks everything that can be checked before any resource is declared.
    pub fn validate(&self) -> Result<()> {
        let sg = &self.security_group;
        require_non_empty("security_group.name", &sg.name)?;
        require_non_empty("security_group.vpc_id", &sg.vpc_id)?;
        for rule in sg.ingress.iter().chain(sg.egress.iter().flatten()) {
            rule.validate()?;
        }

        let role = &self.iam_role;
        require_non_empty("iam_role.name", &role.name)?;
        if let Some(duration) = role.max_session_duration {
            if !(MIN_SESSION_DURATION..=MAX_SESSION_DURATION).contains(&duration) {
                return Err(ProvisionError::InvalidConfig(format!(
                    "iam_role.max_session_duration must be between {} and {} seconds, got {}",
                    MIN_SESSION_DURATION, MAX_SESSION_DURATION, duration
                )));
            }
        }
        for (policy_name, document) in role.inline_policies.iter().flatten() {
            require_non_empty("iam_role.inline_policies key", policy_name)?;
            if !(document.is_string() || document.is_object()) {
                return Err(ProvisionError::InvalidConfig(format!(
                    "inline policy '{}' must be a JSON object or a JSON string",
                    policy_name
                )));
            }
        }

        let instance = &self.ec_instance;
        require_non_empty("ec_instance.name", &instance.name)?;
        require_non_empty("ec_instance.instance_type", &instance.instance_type)?;
        require_non_empty("ec_instance.ami_id", &instance.ami_id)?;
        if is_set(&instance.user_data) && is_set(&instance.user_data_base64) {
            return Err(ProvisionError::ConflictingUserData(instance.name.clone()));
        }
        for volume in instance.additional_volumes.iter().flatten() {
            require_non_empty("additional_volumes.volume_id", &volume.volume_id)?;
            require_non_empty("additional_volumes.device_name", &volume.device_name)?;
        }
        Ok(())
    }
}

impl RuleDescriptor {
    pub fn validate(&self) -> Result<()> {
        self.rule_type.parse::<RuleType>()?;
        require_non_empty("rule protocol", &self.protocol)?;
        for port in [self.from_port, self.to_port] {
            if !(-1..=65535).contains(&port) {
                return Err(ProvisionError::InvalidConfig(format!(
                    "port {} out of range in {} rule",
                    port, self.rule_type
                )));
            }
        }
        let ordered_protocol = matches!(self.protocol.as_str(), "tcp" | "udp" | "6" | "17");
        if ordered_protocol && self.from_port > self.to_port {
            return Err(ProvisionError::InvalidConfig(format!(
                "from_port {} is greater than to_port {} in {} rule",
                self.from_port, self.to_port, self.rule_type
            )));
        }
        Ok(())
    }
}

pub(crate) fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(ProvisionError::InvalidConfig(format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}

/// JSON Schema of [`StackConfig`].
pub fn schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(StackConfig)).unwrap_or_default()
}
