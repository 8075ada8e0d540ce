//! Eventual values.
//!
//! An [`Output`] is what a resource declaration hands back: either a literal
//! known at declaration time or a Terraform interpolation that only resolves
//! once the engine has created the referenced resource. Both render to a JSON
//! string inside `main.tf.json`.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Output(String);

impl Output {
    /// A value known now. Interpolation markers are escaped so Terraform
    /// passes the text through untouched.
    pub fn literal(value: &str) -> Self {
        Self(escape_template(value))
    }

    /// The empty string, used for bundle fields that were not created.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Reference to `attribute` of a declared resource, e.g.
    /// `${aws_security_group.web-dev-sg.id}`.
    pub fn attribute(address: &str, attribute: &str) -> Self {
        Self(format!("${{{}.{}}}", address, attribute))
    }

    /// Concatenate two eventual values into one template string.
    pub fn concat(&self, other: &Output) -> Self {
        Self(format!("{}{}", self.0, other.0))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The rendered Terraform expression.
    pub fn expression(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escape `${` and `%{` sequences in a literal string.
pub fn escape_template(value: &str) -> String {
    value.replace("${", "$${").replace("%{", "%%{")
}

/// `serialize_with` helper for configuration values: every string in the
/// value, map keys included, renders as a literal.
pub fn escaped<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    let value = serde_json::to_value(value).map_err(serde::ser::Error::custom)?;
    escape_value(value).serialize(serializer)
}

fn escape_value(value: Value) -> Value {
    match value {
        Value::String(text) => Value::String(escape_template(&text)),
        Value::Array(items) => Value::Array(items.into_iter().map(escape_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (escape_template(&key), escape_value(value)))
                .collect(),
        ),
        other => other,
    }
}
