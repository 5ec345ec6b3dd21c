use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::{NaiveDate, Utc};
use clap::Args;
use claimflow_core::{
    AuditContext, CompanyId, DecisionAction, ExpenseDraft, ExpenseId, TracingAuditSink, UserId,
    WorkflowError, WorkflowService,
};
use claimflow_db::SqlWorkflowStore;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::commands::{load_config, open_database, runtime, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct SubmitArgs {
    #[arg(long, help = "Submitting employee id")]
    pub employee: String,
    #[arg(long, help = "Positive decimal amount, e.g. 120.50")]
    pub amount: String,
    #[arg(long, help = "Three-letter currency code")]
    pub currency: String,
    #[arg(long)]
    pub category: String,
    #[arg(long)]
    pub description: String,
    #[arg(long, help = "Expense date as YYYY-MM-DD (defaults to today)")]
    pub date: Option<String>,
    #[arg(long, help = "Reference to an uploaded receipt")]
    pub receipt: Option<String>,
}

impl SubmitArgs {
    fn to_draft(&self) -> anyhow::Result<ExpenseDraft> {
        let amount = Decimal::from_str(self.amount.trim())
            .with_context(|| format!("amount `{}` is not a decimal number", self.amount))?;
        let date = match &self.date {
            Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .with_context(|| format!("date `{raw}` is not in YYYY-MM-DD form"))?,
            None => Utc::now().date_naive(),
        };
        Ok(ExpenseDraft {
            amount,
            currency: self.currency.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
            date,
            receipt_ref: self.receipt.clone(),
        })
    }
}

#[derive(Debug, Clone, Args)]
pub struct DecideArgs {
    #[arg(long)]
    pub expense: String,
    #[arg(long, help = "Deciding approver id")]
    pub approver: String,
    #[arg(long, help = "approve or reject")]
    pub action: String,
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
pub struct ListArgs {
    #[arg(long, help = "List the expenses submitted by this employee")]
    pub employee: Option<String>,
    #[arg(long, help = "List every expense of this company")]
    pub company: Option<String>,
}

pub fn submit(args: SubmitArgs) -> CommandResult {
    let draft = match args.to_draft() {
        Ok(draft) => draft,
        Err(error) => return invalid_arguments("submit", &error),
    };
    let employee_id = UserId(args.employee);

    execute("submit", employee_id.0.clone(), |service, context| async move {
        let expense = service.submit(draft, &employee_id, &context).await?;
        Ok(CommandResult::success_with_data(
            "submit",
            format!("expense `{}` submitted with status {}", expense.id.0, expense.status.as_str()),
            to_data(&expense),
        ))
    })
}

pub fn decide(args: DecideArgs) -> CommandResult {
    let Some(action) = DecisionAction::parse(&args.action) else {
        return invalid_arguments(
            "decide",
            &anyhow!("action `{}` must be `approve` or `reject`", args.action),
        );
    };
    let expense_id = ExpenseId(args.expense);
    let approver_id = UserId(args.approver);
    let comment = args.comment;

    execute("decide", approver_id.0.clone(), |service, context| async move {
        let receipt = service
            .decide(&expense_id, &approver_id, action, comment.as_deref(), &context)
            .await?;
        Ok(CommandResult::success_with_data(
            "decide",
            format!(
                "step {} {}; expense `{}` is now {}",
                receipt.outcome.step.sequence,
                receipt.outcome.step.status.as_str(),
                receipt.expense.id.0,
                receipt.expense.status.as_str()
            ),
            to_data(&receipt),
        ))
    })
}

pub fn chain(expense: String) -> CommandResult {
    let expense_id = ExpenseId(expense);

    execute("chain", "cli".to_string(), |service, _context| async move {
        let expense = service.find_expense(&expense_id).await?;
        let chain = service.get_chain(&expense_id).await?;
        let message = if chain.is_empty() {
            format!("expense `{}` has no approval chain ({})", expense.id.0, expense.status.as_str())
        } else {
            format!(
                "expense `{}` is {} with {} approval steps",
                expense.id.0,
                expense.status.as_str(),
                chain.len()
            )
        };
        Ok(CommandResult::success_with_data("chain", message, to_data(&chain)))
    })
}

pub fn inbox(approver: String) -> CommandResult {
    let approver_id = UserId(approver);

    execute("inbox", approver_id.0.clone(), |service, _context| async move {
        let waiting = service.inbox(&approver_id).await?;
        Ok(CommandResult::success_with_data(
            "inbox",
            format!("{} expenses waiting on `{}`", waiting.len(), approver_id.0),
            to_data(&waiting),
        ))
    })
}

pub fn expenses(args: ListArgs) -> CommandResult {
    execute("expenses", "cli".to_string(), |service, _context| async move {
        let (scope, listed) = match (args.employee, args.company) {
            (Some(employee), _) => {
                let listed = service.list_by_employee(&UserId(employee.clone())).await?;
                (format!("employee `{employee}`"), listed)
            }
            (None, Some(company)) => {
                let listed = service.list_by_company(&CompanyId(company.clone())).await?;
                (format!("company `{company}`"), listed)
            }
            (None, None) => (String::from("nobody"), Vec::new()),
        };
        Ok(CommandResult::success_with_data(
            "expenses",
            format!("{} expenses for {scope}", listed.len()),
            to_data(&listed),
        ))
    })
}

/// Opens the configured store, builds the service and runs `action` once.
fn execute<F, Fut>(command: &str, actor: String, action: F) -> CommandResult
where
    F: FnOnce(WorkflowService, AuditContext) -> Fut,
    Fut: Future<Output = Result<CommandResult, WorkflowError>>,
{
    let config = match load_config(command) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime(command) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let pool = match open_database(&config).await {
            Ok(pool) => pool,
            Err((error_class, message, exit_code)) => {
                return CommandResult::failure(command, error_class, message, exit_code);
            }
        };

        let service = WorkflowService::new(
            Arc::new(SqlWorkflowStore::new(pool.clone())),
            Arc::new(TracingAuditSink),
            config.workflow_settings(),
        );
        let correlation_id = Uuid::new_v4().to_string();
        let context = AuditContext::new(correlation_id.clone(), actor);

        let result = action(service, context).await;
        pool.close().await;
        result.unwrap_or_else(|error| {
            CommandResult::from_workflow_error(command, &error, &correlation_id)
        })
    })
}

fn invalid_arguments(command: &str, error: &anyhow::Error) -> CommandResult {
    CommandResult::failure(command, "invalid_arguments", format!("{error:#}"), 9)
}

fn to_data<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}

#[cfg(test)]
mod tests {
    use super::SubmitArgs;

    fn args(amount: &str, date: Option<&str>) -> SubmitArgs {
        SubmitArgs {
            employee: "usr-demo-employee".to_string(),
            amount: amount.to_string(),
            currency: "usd".to_string(),
            category: "meals".to_string(),
            description: "Team lunch with the client".to_string(),
            date: date.map(str::to_string),
            receipt: None,
        }
    }

    #[test]
    fn drafts_parse_amount_and_date() {
        let draft = args(" 42.10 ", Some("2026-02-28")).to_draft().expect("draft");
        assert_eq!(draft.amount.to_string(), "42.10");
        assert_eq!(draft.date.to_string(), "2026-02-28");
    }

    #[test]
    fn malformed_arguments_are_described() {
        let amount = args("forty", None).to_draft().expect_err("bad amount");
        assert!(format!("{amount:#}").contains("amount `forty`"));

        let date = args("10", Some("28/02/2026")).to_draft().expect_err("bad date");
        assert!(format!("{date:#}").contains("YYYY-MM-DD"));
    }
}
