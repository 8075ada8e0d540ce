use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tfprovision::shared::security::{AuditConfig, OperationPolicy, SecurityManager};
use tfprovision::terraform::model::TerraformValidateOutput;
use tfprovision::terraform::output::{parse_outputs, OutputResult};
use tfprovision::{Provisioner, StackConfig, StackContext, TerraformExecutor};

/// Executor that records the commands it was asked to run
struct FakeExecutor {
    directory: PathBuf,
    calls: Mutex<Vec<String>>,
    fail_apply: bool,
}

impl FakeExecutor {
    fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            calls: Mutex::new(Vec::new()),
            fail_apply: false,
        }
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl TerraformExecutor for FakeExecutor {
    fn project_directory(&self) -> &Path {
        &self.directory
    }

    async fn init(&self) -> anyhow::Result<String> {
        self.record("init");
        Ok(String::new())
    }

    async fn validate(&self) -> anyhow::Result<TerraformValidateOutput> {
        self.record("validate");
        Ok(TerraformValidateOutput {
            valid: true,
            error_count: 0,
            warning_count: 0,
            diagnostics: vec![],
        })
    }

    async fn plan(&self) -> anyhow::Result<String> {
        self.record("plan");
        Ok("Plan: 4 to add, 0 to change, 0 to destroy.".to_string())
    }

    async fn apply(&self, auto_approve: bool) -> anyhow::Result<String> {
        self.record(&format!("apply auto_approve={}", auto_approve));
        if self.fail_apply {
            return Err(anyhow::anyhow!("UnauthorizedOperation"));
        }
        Ok("Apply complete!".to_string())
    }

    async fn destroy(&self, auto_approve: bool) -> anyhow::Result<String> {
        self.record(&format!("destroy auto_approve={}", auto_approve));
        Ok("Destroy complete!".to_string())
    }

    async fn outputs(&self) -> anyhow::Result<OutputResult> {
        self.record("output");
        parse_outputs(r#"{"web-dev-sg_sg_id": {"sensitive": false, "type": "string", "value": "sg-0abc"}}"#)
    }
}

const CONFIG: &str = r#"{
    "security_group": {"name": "web", "vpc_id": "vpc-1", "ingress": []},
    "iam_role": {"name": "app", "managed_policy_arns": ["arn:aws:iam::aws:policy/ReadOnlyAccess"]},
    "ec_instance": {"name": "srv", "instance_type": "t3.micro", "ami_id": "ami-1"}
}"#;

struct Fixture {
    _root: tempfile::TempDir,
    audit_log: PathBuf,
    provisioner: Provisioner<FakeExecutor>,
}

fn fixture(policy: OperationPolicy, fail_apply: bool) -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let env_dir = root.path().join("env").join("dev");
    std::fs::create_dir_all(&env_dir).unwrap();
    std::fs::write(env_dir.join("user_data_template.sh"), "#!/bin/sh\n").unwrap();

    let audit_log = root.path().join("audit.log");
    let policy = OperationPolicy {
        audit_logging: AuditConfig {
            enabled: true,
            log_file: Some(audit_log.clone()),
        },
        ..policy
    };
    let mut executor = FakeExecutor::new(root.path().join(".tfprovision").join("dev"));
    executor.fail_apply = fail_apply;

    let provisioner = Provisioner::new(
        StackContext::new("dev", root.path()).unwrap(),
        StackConfig::from_json(CONFIG).unwrap(),
        Some("eu-central-1".to_string()),
        executor,
        SecurityManager::with_policy(policy),
    );
    Fixture {
        _root: root,
        audit_log,
        provisioner,
    }
}

fn calls(fixture: &Fixture) -> Vec<String> {
    fixture.provisioner.executor().calls.lock().unwrap().clone()
}

#[test]
fn test_write_renders_document() {
    let fixture = fixture(OperationPolicy::default(), false);
    let (path, count) = fixture.provisioner.write().unwrap();
    assert_eq!(count, 5);
    assert!(path.ends_with(".tfprovision/dev/main.tf.json"));

    let rendered: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(rendered["provider"]["aws"]["region"], "eu-central-1");
    assert!(rendered["resource"]["aws_iam_role_policy_attachment"]
        ["app-dev-role-managed-policy-1"]
        .is_object());
}

#[tokio::test]
async fn test_plan_runs_init_first() {
    let fixture = fixture(OperationPolicy::default(), false);
    let plan = fixture.provisioner.plan().await.unwrap();
    assert!(plan.contains("4 to add"));
    assert_eq!(calls(&fixture), vec!["init", "plan"]);
}

#[tokio::test]
async fn test_validate() {
    let fixture = fixture(OperationPolicy::default(), false);
    let result = fixture.provisioner.validate().await.unwrap();
    assert!(result.valid);
    assert_eq!(calls(&fixture), vec!["init", "validate"]);
}

#[tokio::test]
async fn test_apply_writes_audit_entry() {
    let fixture = fixture(OperationPolicy::default(), false);
    fixture.provisioner.apply(false).await.unwrap();
    assert_eq!(calls(&fixture), vec!["init", "apply auto_approve=false"]);

    let content = std::fs::read_to_string(&fixture.audit_log).unwrap();
    let entry: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(entry["operation"], "apply");
    assert_eq!(entry["success"], true);
    assert_eq!(entry["resource_count"], 5);
}

#[tokio::test]
async fn test_failed_apply_is_audited_and_surfaced() {
    let fixture = fixture(OperationPolicy::default(), true);
    let err = fixture.provisioner.apply(false).await.unwrap_err();
    assert!(err.to_string().contains("UnauthorizedOperation"));

    let content = std::fs::read_to_string(&fixture.audit_log).unwrap();
    let entry: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(entry["success"], false);
    assert_eq!(entry["error"], "UnauthorizedOperation");
}

#[tokio::test]
async fn test_auto_approve_requires_policy() {
    let fixture = fixture(OperationPolicy::default(), false);
    assert!(fixture.provisioner.apply(true).await.is_err());
    assert!(calls(&fixture).is_empty());
}

#[tokio::test]
async fn test_destroy_requires_policy() {
    let blocked = fixture(OperationPolicy::default(), false);
    assert!(blocked.provisioner.destroy(false).await.is_err());
    assert!(calls(&blocked).is_empty());

    let allowed = fixture(
        OperationPolicy {
            allow_destroy: true,
            allow_auto_approve: true,
            ..OperationPolicy::default()
        },
        false,
    );
    allowed.provisioner.destroy(true).await.unwrap();
    assert_eq!(calls(&allowed), vec!["init", "destroy auto_approve=true"]);
}

#[tokio::test]
async fn test_resource_limit_blocks_apply() {
    let fixture = fixture(
        OperationPolicy {
            max_resource_limit: Some(3),
            ..OperationPolicy::default()
        },
        false,
    );
    let err = fixture.provisioner.apply(false).await.unwrap_err();
    assert!(err.to_string().contains("exceeds security limit"));
    assert!(calls(&fixture).is_empty());
}

#[tokio::test]
async fn test_outputs() {
    let fixture = fixture(OperationPolicy::default(), false);
    let result = fixture.provisioner.outputs().await.unwrap();
    assert_eq!(result.get("web-dev-sg_sg_id").unwrap(), "sg-0abc");
}
