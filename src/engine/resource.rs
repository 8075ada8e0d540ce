//! Resource declarations and the engine seam builders declare into.

use crate::engine::output::Output;
use crate::error::{ProvisionError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

// Terraform block labels: identifier start, then letters, digits, '_' or '-'
static LABEL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("Invalid label regex"));

/// AWS resource types this crate declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    SecurityGroup,
    IamRole,
    IamRolePolicyAttachment,
    IamRolePolicy,
    IamInstanceProfile,
    Instance,
    VolumeAttachment,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::SecurityGroup => "aws_security_group",
            ResourceType::IamRole => "aws_iam_role",
            ResourceType::IamRolePolicyAttachment => "aws_iam_role_policy_attachment",
            ResourceType::IamRolePolicy => "aws_iam_role_policy",
            ResourceType::IamInstanceProfile => "aws_iam_instance_profile",
            ResourceType::Instance => "aws_instance",
            ResourceType::VolumeAttachment => "aws_volume_attachment",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One desired resource: type, logical name and its argument object.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub resource_type: ResourceType,
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl Resource {
    pub fn new<A: Serialize>(resource_type: ResourceType, name: &str, arguments: &A) -> Result<Self> {
        validate_label(name)?;
        let arguments = match serde_json::to_value(arguments)? {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(ProvisionError::InvalidConfig(format!(
                    "arguments for {}.{} must serialize to an object, got {}",
                    resource_type, name, other
                )))
            }
        };
        Ok(Self {
            resource_type,
            name: name.to_string(),
            arguments,
        })
    }

    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }

    pub fn argument(&self, key: &str) -> Option<&serde_json::Value> {
        self.arguments.get(key)
    }
}

/// Handle to a declared resource. Attribute reads yield eventual values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub resource_type: ResourceType,
    pub name: String,
}

impl ResourceRef {
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }

    pub fn attribute(&self, attribute: &str) -> Output {
        Output::attribute(&self.address(), attribute)
    }

    pub fn id(&self) -> Output {
        self.attribute("id")
    }
}

/// "Declare desired resource, get back eventual identifier."
///
/// The engine owns dependency ordering: anything a resource consumes from
/// another arrives as an [`Output`] reference, never as a resolved value.
pub trait Engine {
    fn declare(&mut self, resource: Resource) -> Result<ResourceRef>;

    /// Make a value visible outside the stack under `name`.
    fn export(&mut self, name: &str, value: Output) -> Result<()>;
}

pub fn validate_label(name: &str) -> Result<()> {
    if LABEL_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(ProvisionError::InvalidResourceName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_label() {
        assert!(validate_label("web-dev-sg").is_ok());
        assert!(validate_label("_internal").is_ok());
        assert!(validate_label("app-dev-role-managed-policy-1").is_ok());
        assert!(validate_label("1web").is_err());
        assert!(validate_label("web dev").is_err());
        assert!(validate_label("web.dev").is_err());
        assert!(validate_label("").is_err());
    }

    #[test]
    fn test_resource_requires_object_arguments() {
        let err = Resource::new(ResourceType::Instance, "srv-dev", &json!("not-an-object"));
        assert!(matches!(err, Err(ProvisionError::InvalidConfig(_))));
    }

    #[test]
    fn test_resource_ref_attributes() {
        let r = ResourceRef {
            resource_type: ResourceType::IamInstanceProfile,
            name: "app-dev-role-instance-profile".to_string(),
        };
        assert_eq!(
            r.address(),
            "aws_iam_instance_profile.app-dev-role-instance-profile"
        );
        assert_eq!(
            r.attribute("arn").expression(),
            "${aws_iam_instance_profile.app-dev-role-instance-profile.arn}"
        );
    }
}
