//! Terraform JSON configuration assembled from resource declarations.

use crate::engine::output::Output;
use crate::engine::resource::{validate_label, Engine, Resource, ResourceRef, ResourceType};
use crate::error::{ProvisionError, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DOCUMENT_FILE_NAME: &str = "main.tf.json";
pub const AWS_PROVIDER_SOURCE: &str = "hashicorp/aws";
pub const AWS_PROVIDER_VERSION: &str = "~> 5.0";

/// In-memory `main.tf.json`. Declarations keep their order; rendering groups
/// them by resource type the way Terraform expects.
#[derive(Debug, Default)]
pub struct TerraformDocument {
    region: Option<String>,
    resources: Vec<Resource>,
    outputs: Vec<(String, Output)>,
}

impl TerraformDocument {
    pub fn new(region: Option<String>) -> Self {
        Self {
            region,
            resources: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resources_of(&self, resource_type: ResourceType) -> impl Iterator<Item = &Resource> {
        self.resources
            .iter()
            .filter(move |r| r.resource_type == resource_type)
    }

    pub fn resource(&self, resource_type: ResourceType, name: &str) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    pub fn outputs(&self) -> &[(String, Output)] {
        &self.outputs
    }

    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn to_json(&self) -> Value {
        let mut resource_blocks: BTreeMap<&str, Map<String, Value>> = BTreeMap::new();
        for resource in &self.resources {
            resource_blocks
                .entry(resource.resource_type.as_str())
                .or_default()
                .insert(
                    resource.name.clone(),
                    Value::Object(resource.arguments.clone()),
                );
        }

        let mut output_blocks = Map::new();
        for (name, value) in &self.outputs {
            output_blocks.insert(name.clone(), json!({ "value": value }));
        }

        let mut provider = Map::new();
        if let Some(region) = &self.region {
            provider.insert("region".to_string(), json!(region));
        }

        let mut document = Map::new();
        document.insert(
            "terraform".to_string(),
            json!({
                "required_providers": {
                    "aws": {
                        "source": AWS_PROVIDER_SOURCE,
                        "version": AWS_PROVIDER_VERSION,
                    }
                }
            }),
        );
        document.insert("provider".to_string(), json!({ "aws": provider }));
        if !resource_blocks.is_empty() {
            document.insert("resource".to_string(), json!(resource_blocks));
        }
        if !output_blocks.is_empty() {
            document.insert("output".to_string(), Value::Object(output_blocks));
        }
        Value::Object(document)
    }

    pub fn to_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }

    /// Write `main.tf.json` into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(DOCUMENT_FILE_NAME);
        std::fs::write(&path, self.to_string_pretty()?)?;
        tracing::debug!(path = %path.display(), resources = self.resources.len(), "wrote terraform document");
        Ok(path)
    }
}

impl Engine for TerraformDocument {
    fn declare(&mut self, resource: Resource) -> Result<ResourceRef> {
        if self
            .resource(resource.resource_type, &resource.name)
            .is_some()
        {
            return Err(ProvisionError::DuplicateResource(resource.address()));
        }
        tracing::debug!(address = %resource.address(), "declared resource");
        let handle = ResourceRef {
            resource_type: resource.resource_type,
            name: resource.name.clone(),
        };
        self.resources.push(resource);
        Ok(handle)
    }

    fn export(&mut self, name: &str, value: Output) -> Result<()> {
        validate_label(name)?;
        if self.output(name).is_some() {
            return Err(ProvisionError::DuplicateOutput(name.to_string()));
        }
        self.outputs.push((name.to_string(), value));
        Ok(())
    }
}
