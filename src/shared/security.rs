use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Stack operations the CLI can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Render,
    Validate,
    Plan,
    Apply,
    Destroy,
    Output,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Render => "render",
            Operation::Validate => "validate",
            Operation::Plan => "plan",
            Operation::Apply => "apply",
            Operation::Destroy => "destroy",
            Operation::Output => "output",
        }
    }

    /// Operations that change real infrastructure.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Operation::Apply | Operation::Destroy)
    }
}

/// Which operations may run, loaded from `TFPROVISION_*` variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationPolicy {
    pub allow_apply: bool,
    /// Destroy stays off unless `TFPROVISION_DELETE_ENABLED=true`.
    pub allow_destroy: bool,
    pub allow_auto_approve: bool,
    pub max_resource_limit: Option<usize>,
    pub audit_logging: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub enabled: bool,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub operation: Operation,
    pub environment: String,
    pub directory: String,
    pub success: bool,
    pub error: Option<String>,
    pub resource_count: Option<usize>,
}

pub struct SecurityManager {
    pub policy: OperationPolicy,
    pub audit_log: Option<PathBuf>,
}

impl Default for OperationPolicy {
    fn default() -> Self {
        Self {
            allow_apply: true,
            allow_destroy: false,
            allow_auto_approve: false,
            max_resource_limit: Some(50),
            audit_logging: AuditConfig {
                enabled: true,
                log_file: None,
            },
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name).ok().map(|val| val.to_lowercase() == "true")
}

impl SecurityManager {
    pub fn new() -> Result<Self> {
        let policy = Self::load_policy();
        Ok(Self::with_policy(policy))
    }

    pub fn with_policy(policy: OperationPolicy) -> Self {
        let audit_log = if policy.audit_logging.enabled {
            policy
                .audit_logging
                .log_file
                .clone()
                .or_else(|| dirs::home_dir().map(|d| d.join(".tfprovision").join("audit.log")))
        } else {
            None
        };
        Self { policy, audit_log }
    }

    fn load_policy() -> OperationPolicy {
        let mut policy = OperationPolicy::default();
        if let Some(allow) = env_flag("TFPROVISION_ALLOW_APPLY") {
            policy.allow_apply = allow;
        }
        if let Some(allow) = env_flag("TFPROVISION_DELETE_ENABLED") {
            policy.allow_destroy = allow;
        }
        if let Some(allow) = env_flag("TFPROVISION_ALLOW_AUTO_APPROVE") {
            policy.allow_auto_approve = allow;
        }
        if let Ok(val) = env::var("TFPROVISION_MAX_RESOURCES") {
            if let Ok(limit) = val.parse::<usize>() {
                policy.max_resource_limit = Some(limit);
            }
        }
        if let Some(enabled) = env_flag("TFPROVISION_AUDIT_ENABLED") {
            policy.audit_logging.enabled = enabled;
        }
        if let Ok(path) = env::var("TFPROVISION_AUDIT_LOG_FILE") {
            policy.audit_logging.log_file = Some(PathBuf::from(path));
        }
        policy
    }

    pub fn check_operation(&self, operation: Operation, auto_approve: bool) -> Result<()> {
        match operation {
            Operation::Apply if !self.policy.allow_apply => {
                return Err(anyhow::anyhow!(
                    "Apply is disabled. Set TFPROVISION_ALLOW_APPLY=true to enable it."
                ))
            }
            Operation::Destroy if !self.policy.allow_destroy => {
                return Err(anyhow::anyhow!(
                    "Delete functionality is disabled. Set TFPROVISION_DELETE_ENABLED=true to enable it."
                ))
            }
            _ => {}
        }
        if auto_approve && operation.is_mutating() && !self.policy.allow_auto_approve {
            return Err(anyhow::anyhow!(
                "Auto-approve is disabled. Set TFPROVISION_ALLOW_AUTO_APPROVE=true to enable it."
            ));
        }
        Ok(())
    }

    pub fn check_resource_limit(&self, resource_count: usize) -> Result<()> {
        if let Some(limit) = self.policy.max_resource_limit {
            if resource_count > limit {
                return Err(anyhow::anyhow!(
                    "Operation blocked: Resource count ({}) exceeds security limit ({})",
                    resource_count,
                    limit
                ));
            }
        }
        Ok(())
    }

    /// Append one JSON line to the audit log, if enabled.
    pub fn log_audit_entry(&self, entry: &AuditLogEntry) -> Result<()> {
        if !self.policy.audit_logging.enabled {
            return Ok(());
        }
        if let Some(log_file) = &self.audit_log {
            if let Some(parent) = log_file.parent() {
                fs::create_dir_all(parent)?;
            }
            let log_line = serde_json::to_string(entry)?;
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)?;
            writeln!(file, "{}", log_line)?;
        }
        Ok(())
    }

    pub fn create_audit_entry(
        &self,
        operation: Operation,
        environment: &str,
        directory: &str,
        outcome: &Result<String>,
        resource_count: Option<usize>,
    ) -> AuditLogEntry {
        AuditLogEntry {
            timestamp: Utc::now(),
            user: env::var("USER")
                .or_else(|_| env::var("USERNAME"))
                .unwrap_or_else(|_| "unknown".to_string()),
            operation,
            environment: environment.to_string(),
            directory: directory.to_string(),
            success: outcome.is_ok(),
            error: outcome.as_ref().err().map(|e| e.to_string()),
            resource_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(policy: OperationPolicy) -> SecurityManager {
        SecurityManager {
            policy,
            audit_log: None,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = OperationPolicy::default();
        assert!(policy.allow_apply);
        assert!(!policy.allow_destroy);
        assert!(!policy.allow_auto_approve);
    }

    #[test]
    fn test_destroy_blocked_by_default() {
        let manager = manager(OperationPolicy::default());
        assert!(manager.check_operation(Operation::Plan, false).is_ok());
        assert!(manager.check_operation(Operation::Apply, false).is_ok());
        assert!(manager.check_operation(Operation::Destroy, false).is_err());
    }

    #[test]
    fn test_auto_approve_gating() {
        let blocked = manager(OperationPolicy::default());
        assert!(blocked.check_operation(Operation::Apply, true).is_err());
        // auto-approve means nothing for read-only operations
        assert!(blocked.check_operation(Operation::Plan, true).is_ok());

        let allowed = manager(OperationPolicy {
            allow_auto_approve: true,
            allow_destroy: true,
            ..OperationPolicy::default()
        });
        assert!(allowed.check_operation(Operation::Apply, true).is_ok());
        assert!(allowed.check_operation(Operation::Destroy, true).is_ok());
    }

    #[test]
    fn test_resource_limit() {
        let manager = manager(OperationPolicy {
            max_resource_limit: Some(4),
            ..OperationPolicy::default()
        });
        assert!(manager.check_resource_limit(4).is_ok());
        assert!(manager.check_resource_limit(5).is_err());
    }

    #[test]
    fn test_audit_entry_written_as_json_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("audit").join("audit.log");
        let manager = SecurityManager::with_policy(OperationPolicy {
            audit_logging: AuditConfig {
                enabled: true,
                log_file: Some(log.clone()),
            },
            ..OperationPolicy::default()
        });

        let failed: Result<String> = Err(anyhow::anyhow!("boom"));
        let entry = manager.create_audit_entry(Operation::Apply, "dev", "/stack", &failed, Some(4));
        assert!(!entry.success);
        assert_eq!(entry.error.as_deref(), Some("boom"));
        manager.log_audit_entry(&entry).unwrap();

        let content = std::fs::read_to_string(&log).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["operation"], "apply");
        assert_eq!(parsed["environment"], "dev");
        assert_eq!(parsed["resource_count"], 4);
    }

    #[test]
    fn test_audit_disabled_has_no_log() {
        let manager = SecurityManager::with_policy(OperationPolicy {
            audit_logging: AuditConfig {
                enabled: false,
                log_file: None,
            },
            ..OperationPolicy::default()
        });
        assert!(manager.audit_log.is_none());
    }
}
