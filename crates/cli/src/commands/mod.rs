pub mod config;
pub mod doctor;
pub mod migrate;
pub mod seed;
pub mod workflow;

use claimflow_core::config::{AppConfig, LoadOptions};
use claimflow_core::WorkflowError;
use claimflow_db::{connect_with_config, migrations, DbPool};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_workflow_error(command: &str, error: &WorkflowError, correlation_id: &str) -> Self {
        let interface = error.clone().into_interface(correlation_id);
        Self::failure(
            command,
            error.class(),
            format!("{} ({error}; correlation id {correlation_id})", interface.user_message()),
            workflow_exit_code(error),
        )
    }
}

/// Error class, message and exit code of a failed step.
pub(crate) type Failure = (&'static str, String, u8);

pub(crate) fn workflow_exit_code(error: &WorkflowError) -> u8 {
    match error {
        WorkflowError::Validation(_) => 10,
        WorkflowError::NotFound { .. } => 11,
        WorkflowError::Authorization(_) => 12,
        WorkflowError::Conflict { .. } => 13,
        WorkflowError::Persistence(_) => 14,
    }
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

/// Connects and brings the schema up to date.
pub(crate) async fn open_database(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;
    Ok(pool)
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use claimflow_core::{ExpenseId, ValidationError, WorkflowError};
    use rust_decimal::Decimal;
    use serde_json::Value;

    use super::CommandResult;

    #[test]
    fn workflow_errors_map_to_distinct_exit_codes() {
        let errors = [
            WorkflowError::Validation(ValidationError::NonPositiveAmount { amount: Decimal::ZERO }),
            WorkflowError::not_found("expense", "exp-1"),
            WorkflowError::Authorization("not yours".to_string()),
            WorkflowError::Conflict { expense_id: ExpenseId("exp-1".to_string()) },
            WorkflowError::Persistence("disk full".to_string()),
        ];
        let codes: Vec<u8> = errors
            .iter()
            .map(|error| CommandResult::from_workflow_error("decide", error, "req-1").exit_code)
            .collect();
        assert_eq!(codes, vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn workflow_failure_carries_user_message_and_correlation_id() {
        let error = WorkflowError::Authorization("no open gate".to_string());
        let result = CommandResult::from_workflow_error("decide", &error, "req-7");
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(payload["error_class"], "authorization");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("You are not allowed to act on this expense right now."));
        assert!(message.contains("correlation id req-7"));
    }

    #[test]
    fn success_payload_omits_absent_data() {
        let result = CommandResult::success("migrate", "done");
        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(payload["status"], "ok");
        assert!(payload.get("data").is_none());
        assert!(payload["error_class"].is_null());
    }
}
