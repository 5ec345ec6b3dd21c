use claimflow_db::{DemoSeedDataset, RuleSeedInfo};

use crate::commands::{load_config, open_database, runtime, CommandResult, Failure};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let seed_result = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<Vec<RuleSeedInfo>, Failure> = if verification.all_present {
            Ok(seed_result.rules_seeded)
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(rules) => {
            let rule_lines: Vec<String> = rules
                .iter()
                .map(|rule| format!("  - {}: {}", rule.rule_id, rule.description))
                .collect();
            CommandResult::success(
                "seed",
                format!(
                    "demo company `{}` seeded with {} approval rules:\n{}",
                    DemoSeedDataset::COMPANY_ID,
                    rules.len(),
                    rule_lines.join("\n")
                ),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_message_names_failed_checks() {
        assert_eq!(
            verification_message(&["usr-demo-cfo", "rule-demo-large"]),
            "seed verification failed for: usr-demo-cfo, rule-demo-large"
        );
    }

    #[test]
    fn verification_message_falls_back_when_nothing_is_named() {
        assert_eq!(verification_message(&[]), "some seed data failed to load");
    }
}
