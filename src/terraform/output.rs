//! Parsing of `terraform output -json`.

use serde::{Deserialize, Serialize};

/// A single output value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputValue {
    pub name: String,
    pub value: serde_json::Value,
    pub value_type: String,
    pub sensitive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputResult {
    pub outputs: Vec<OutputValue>,
    pub message: String,
}

impl OutputResult {
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.outputs
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.value)
    }
}

/// Parse the map of output name to `{value, type, sensitive}` objects.
pub fn parse_outputs(stdout: &str) -> anyhow::Result<OutputResult> {
    let trimmed = stdout.trim();
    let outputs = if trimmed.is_empty() || trimmed == "{}" {
        vec![]
    } else {
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Object(map)) => map
                .into_iter()
                .map(|(name, output_obj)| {
                    let value = output_obj
                        .get("value")
                        .cloned()
                        .unwrap_or(serde_json::Value::Null);
                    let sensitive = output_obj
                        .get("sensitive")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    let value_type = output_obj
                        .get("type")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| value_type(&value));
                    OutputValue {
                        name,
                        value,
                        value_type,
                        sensitive,
                    }
                })
                .collect(),
            Ok(_) => return Err(anyhow::anyhow!("Unexpected output format")),
            Err(e) => return Err(anyhow::anyhow!("Failed to parse outputs JSON: {}", e)),
        }
    };

    let message = if outputs.is_empty() {
        "No outputs found".to_string()
    } else {
        format!("Found {} outputs", outputs.len())
    };
    Ok(OutputResult { outputs, message })
}

fn value_type(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(_) => "bool".to_string(),
        serde_json::Value::Number(_) => "number".to_string(),
        serde_json::Value::String(_) => "string".to_string(),
        serde_json::Value::Array(arr) => match arr.first() {
            Some(first) => format!("list({})", value_type(first)),
            None => "list".to_string(),
        },
        serde_json::Value::Object(_) => "object".to_string(),
    }
}
