//! EC2 instance and volume attachment declaration.

use crate::config::{is_set, InstanceConfig, LaunchTemplateConfig, Tags, VolumeAttachmentConfig};
use crate::engine::output::{escaped, Output};
use crate::engine::resource::{Engine, Resource, ResourceType};
use crate::error::{ProvisionError, Result};
use crate::shared::naming::StackContext;
use serde::Serialize;

#[derive(Serialize)]
struct InstanceArgs<'a> {
    #[serde(serialize_with = "escaped")]
    ami: &'a str,
    #[serde(serialize_with = "escaped")]
    instance_type: &'a str,
    vpc_security_group_ids: &'a [Output],
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "escaped")]
    subnet_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "escaped")]
    key_name: Option<&'a str>,
    #[serde(serialize_with = "escaped")]
    tags: &'a Tags,
    associate_public_ip_address: bool,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "escaped")]
    launch_template: Option<&'a LaunchTemplateConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<Output>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data_base64: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "escaped")]
    private_ip: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "escaped")]
    availability_zone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iam_instance_profile: Option<&'a Output>,
}

#[derive(Serialize)]
struct VolumeAttachmentArgs<'a> {
    #[serde(serialize_with = "escaped")]
    device_name: &'a str,
    #[serde(serialize_with = "escaped")]
    volume_id: &'a str,
    instance_id: Output,
}

/// What the instance exports once declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceOutput {
    pub instance_id: Output,
    pub public_ip: Output,
    pub details: Output,
}

#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub instance_type: String,
    pub ami_id: String,
    pub vpc_security_group_ids: Vec<Output>,
    pub subnet_id: Option<String>,
    pub key_name: Option<String>,
    pub tags: Tags,
    pub additional_volumes: Vec<VolumeAttachmentConfig>,
    pub user_data: Option<String>,
    user_data_base64: Option<String>,
    pub launch_template: Option<LaunchTemplateConfig>,
    pub private_ip: Option<String>,
    pub availability_zone: Option<String>,
    iam_instance_profile: Option<Output>,
    pub associate_public_ip_address: bool,
}

impl Instance {
    pub fn new(ctx: &StackContext, config: InstanceConfig) -> Self {
        let name = ctx.derive_name(&config.name, None);
        let tags = config.tags.unwrap_or_else(|| ctx.default_tags(&name));
        let mut instance = Self {
            name,
            instance_type: config.instance_type,
            ami_id: config.ami_id,
            vpc_security_group_ids: config
                .vpc_security_group_ids
                .unwrap_or_default()
                .iter()
                .map(|id| Output::literal(id))
                .collect(),
            subnet_id: config.subnet_id,
            key_name: config.key_name,
            tags,
            additional_volumes: config.additional_volumes.unwrap_or_default(),
            user_data: config.user_data,
            user_data_base64: None,
            launch_template: config.launch_template,
            private_ip: config.private_ip,
            availability_zone: config.availability_zone,
            iam_instance_profile: None,
            associate_public_ip_address: config.associate_public_ip_address.unwrap_or(true),
        };
        instance.set_user_data_base64(config.user_data_base64);
        if let Some(profile) = config.iam_instance_profile {
            instance.set_iam_instance_profile(Output::literal(&profile));
        }
        instance
    }

    pub fn set_vpc_security_group_ids(&mut self, ids: Vec<Output>) {
        self.vpc_security_group_ids = ids;
    }

    /// Store already-encoded user data; see
    /// [`encode_user_data`](crate::shared::naming::encode_user_data).
    pub fn set_user_data_base64(&mut self, encoded: Option<String>) {
        self.user_data_base64 = encoded.filter(|value| !value.is_empty());
    }

    pub fn user_data_base64(&self) -> Option<&str> {
        self.user_data_base64.as_deref()
    }

    /// An empty value (a role declared without a profile) leaves it unset.
    pub fn set_iam_instance_profile(&mut self, profile: Output) {
        self.iam_instance_profile = if profile.is_empty() {
            None
        } else {
            Some(profile)
        };
    }

    pub fn iam_instance_profile(&self) -> Option<&Output> {
        self.iam_instance_profile.as_ref()
    }

    pub fn create(&self, engine: &mut dyn Engine) -> Result<InstanceOutput> {
        if is_set(&self.user_data) && self.user_data_base64.is_some() {
            return Err(ProvisionError::ConflictingUserData(self.name.clone()));
        }

        tracing::info!(
            name = %self.name,
            instance_type = %self.instance_type,
            ami = %self.ami_id,
            volumes = self.additional_volumes.len(),
            "declaring EC2 instance"
        );
        let args = InstanceArgs {
            ami: &self.ami_id,
            instance_type: &self.instance_type,
            vpc_security_group_ids: &self.vpc_security_group_ids,
            subnet_id: self.subnet_id.as_deref(),
            key_name: self.key_name.as_deref(),
            tags: &self.tags,
            associate_public_ip_address: self.associate_public_ip_address,
            launch_template: self.launch_template.as_ref(),
            user_data: self
                .user_data
                .as_deref()
                .filter(|data| !data.is_empty())
                .map(Output::literal),
            user_data_base64: self.user_data_base64.as_deref(),
            private_ip: self.private_ip.as_deref(),
            availability_zone: self.availability_zone.as_deref(),
            iam_instance_profile: self.iam_instance_profile.as_ref(),
        };
        let instance = engine.declare(Resource::new(ResourceType::Instance, &self.name, &args)?)?;
        let instance_id = instance.id();

        for (idx, volume) in self.additional_volumes.iter().enumerate() {
            let args = VolumeAttachmentArgs {
                device_name: &volume.device_name,
                volume_id: &volume.volume_id,
                instance_id: instance_id.clone(),
            };
            engine.declare(Resource::new(
                ResourceType::VolumeAttachment,
                &format!("{}-vol-{}", self.name, idx + 1),
                &args,
            )?)?;
        }

        let output = InstanceOutput {
            public_ip: instance.attribute("public_ip"),
            details: Output::literal(&format!("Instance {} created with ID: ", self.name))
                .concat(&instance_id),
            instance_id,
        };
        engine.export(&format!("{}_instance_id", self.name), output.instance_id.clone())?;
        engine.export(&format!("{}_details", self.name), output.details.clone())?;
        engine.export(&format!("{}_public_ip", self.name), output.public_ip.clone())?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::document::TerraformDocument;
    use crate::shared::naming::encode_user_data;

    fn config() -> InstanceConfig {
        InstanceConfig {
            name: "srv".to_string(),
            instance_type: "t3.micro".to_string(),
            ami_id: "ami-1".to_string(),
            vpc_security_group_ids: None,
            subnet_id: None,
            key_name: None,
            tags: None,
            additional_volumes: None,
            user_data: None,
            user_data_base64: None,
            launch_template: None,
            private_ip: None,
            availability_zone: None,
            iam_instance_profile: None,
            associate_public_ip_address: None,
        }
    }

    fn instance(config: InstanceConfig) -> Instance {
        Instance::new(&StackContext::new("dev", ".").unwrap(), config)
    }

    #[test]
    fn test_defaults() {
        let inst = instance(config());
        assert_eq!(inst.name, "srv-dev");
        assert!(inst.associate_public_ip_address);
        assert!(inst.vpc_security_group_ids.is_empty());
        assert!(inst.additional_volumes.is_empty());
        assert_eq!(inst.tags["Name"], "srv-dev");
        assert_eq!(inst.tags["Environment"], "dev");
        assert_eq!(inst.tags["ManagedBy"], "Terraform");
        assert!(inst.user_data_base64().is_none());
    }

    #[test]
    fn test_caller_tags_replace_defaults() {
        let mut cfg = config();
        cfg.tags = Some(Tags::from([("Team".to_string(), "web".to_string())]));
        let inst = instance(cfg);
        assert_eq!(inst.tags.len(), 1);
        assert!(!inst.tags.contains_key("Name"));
    }

    #[test]
    fn test_user_data_base64_setter() {
        let mut inst = instance(config());
        inst.set_user_data_base64(encode_user_data(Some("hello")));
        assert_eq!(inst.user_data_base64(), Some("aGVsbG8="));

        inst.set_user_data_base64(encode_user_data(Some("")));
        assert_eq!(inst.user_data_base64(), None);

        inst.set_user_data_base64(Some(String::new()));
        assert_eq!(inst.user_data_base64(), None);
    }

    #[test]
    fn test_empty_instance_profile_is_unset() {
        let mut inst = instance(config());
        inst.set_iam_instance_profile(Output::empty());
        assert!(inst.iam_instance_profile().is_none());
    }

    #[test]
    fn test_create_declares_instance_and_exports() {
        let mut inst = instance(config());
        inst.set_vpc_security_group_ids(vec![Output::attribute(
            "aws_security_group.web-dev-sg",
            "id",
        )]);
        inst.set_iam_instance_profile(Output::attribute(
            "aws_iam_instance_profile.app-dev-role-instance-profile",
            "name",
        ));
        inst.set_user_data_base64(encode_user_data(Some("#!/bin/bash\n")));

        let mut doc = TerraformDocument::new(None);
        let out = inst.create(&mut doc).unwrap();
        assert_eq!(out.instance_id.expression(), "${aws_instance.srv-dev.id}");
        assert_eq!(out.public_ip.expression(), "${aws_instance.srv-dev.public_ip}");
        assert_eq!(
            out.details.expression(),
            "Instance srv-dev created with ID: ${aws_instance.srv-dev.id}"
        );

        let declared = doc.resource(ResourceType::Instance, "srv-dev").unwrap();
        assert_eq!(declared.argument("ami").unwrap(), "ami-1");
        assert_eq!(
            declared.argument("vpc_security_group_ids").unwrap(),
            &serde_json::json!(["${aws_security_group.web-dev-sg.id}"])
        );
        assert_eq!(
            declared.argument("iam_instance_profile").unwrap(),
            "${aws_iam_instance_profile.app-dev-role-instance-profile.name}"
        );
        assert_eq!(declared.argument("user_data_base64").unwrap(), "IyEvYmluL2Jhc2gK");
        assert_eq!(declared.argument("associate_public_ip_address").unwrap(), true);
        assert!(declared.argument("user_data").is_none());
        assert!(declared.argument("subnet_id").is_none());

        for name in ["srv-dev_instance_id", "srv-dev_details", "srv-dev_public_ip"] {
            assert!(doc.output(name).is_some(), "missing output {}", name);
        }
    }

    #[test]
    fn test_volume_attachments_in_order() {
        let mut cfg = config();
        cfg.additional_volumes = Some(vec![
            VolumeAttachmentConfig {
                volume_id: "vol-a".to_string(),
                device_name: "/dev/sdf".to_string(),
            },
            VolumeAttachmentConfig {
                volume_id: "vol-b".to_string(),
                device_name: "/dev/sdg".to_string(),
            },
        ]);
        let inst = instance(cfg);
        let mut doc = TerraformDocument::new(None);
        inst.create(&mut doc).unwrap();

        let attachments: Vec<_> = doc.resources_of(ResourceType::VolumeAttachment).collect();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].name, "srv-dev-vol-1");
        assert_eq!(attachments[0].argument("volume_id").unwrap(), "vol-a");
        assert_eq!(attachments[1].name, "srv-dev-vol-2");
        assert_eq!(attachments[1].argument("device_name").unwrap(), "/dev/sdg");
        assert_eq!(
            attachments[1].argument("instance_id").unwrap(),
            "${aws_instance.srv-dev.id}"
        );
    }

    #[test]
    fn test_plaintext_user_data_is_escaped() {
        let mut cfg = config();
        cfg.user_data = Some("echo ${HOME}".to_string());
        let inst = instance(cfg);
        let mut doc = TerraformDocument::new(None);
        inst.create(&mut doc).unwrap();
        let declared = doc.resource(ResourceType::Instance, "srv-dev").unwrap();
        assert_eq!(declared.argument("user_data").unwrap(), "echo $${HOME}");
    }

    #[test]
    fn test_conflicting_user_data() {
        let mut cfg = config();
        cfg.user_data = Some("echo hi".to_string());
        let mut inst = instance(cfg);
        inst.set_user_data_base64(encode_user_data(Some("echo hi")));
        let mut doc = TerraformDocument::new(None);
        assert!(matches!(
            inst.create(&mut doc),
            Err(ProvisionError::ConflictingUserData(_))
        ));
        assert!(doc.resources().is_empty());
    }

    #[test]
    fn test_launch_template_passthrough() {
        let mut cfg = config();
        cfg.launch_template = Some(LaunchTemplateConfig {
            id: None,
            name: Some("base".to_string()),
            version: Some("$Latest".to_string()),
        });
        let inst = instance(cfg);
        let mut doc = TerraformDocument::new(None);
        inst.create(&mut doc).unwrap();
        let declared = doc.resource(ResourceType::Instance, "srv-dev").unwrap();
        assert_eq!(
            declared.argument("launch_template").unwrap(),
            &serde_json::json!({"name": "base", "version": "$Latest"})
        );
    }

    #[test]
    fn test_config_strings_render_as_literals() {
        let mut cfg = config();
        cfg.ami_id = "ami-${suffix}".to_string();
        cfg.subnet_id = Some("subnet-%{x}".to_string());
        cfg.tags = Some(Tags::from([("Owner".to_string(), "${team}".to_string())]));
        cfg.additional_volumes = Some(vec![VolumeAttachmentConfig {
            volume_id: "vol-${id}".to_string(),
            device_name: "/dev/sdf".to_string(),
        }]);
        let inst = instance(cfg);
        let mut doc = TerraformDocument::new(None);
        inst.create(&mut doc).unwrap();

        let declared = doc.resource(ResourceType::Instance, "srv-dev").unwrap();
        assert_eq!(declared.argument("ami").unwrap(), "ami-$${suffix}");
        assert_eq!(declared.argument("subnet_id").unwrap(), "subnet-%%{x}");
        assert_eq!(declared.argument("tags").unwrap()["Owner"], "$${team}");
        let attachment = doc
            .resource(ResourceType::VolumeAttachment, "srv-dev-vol-1")
            .unwrap();
        assert_eq!(attachment.argument("volume_id").unwrap(), "vol-$${id}");
        assert_eq!(
            attachment.argument("instance_id").unwrap(),
            "${aws_instance.srv-dev.id}"
        );
    }
}

