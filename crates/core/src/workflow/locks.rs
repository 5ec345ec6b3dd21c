use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::expense::ExpenseId;

/// Serialises decisions per expense inside one process. Decisions on
/// different expenses never wait on each other.
#[derive(Clone, Default)]
pub struct ExpenseLocks {
    slots: Arc<Mutex<HashMap<ExpenseId, Arc<AsyncMutex<()>>>>>,
}

impl ExpenseLocks {
    pub async fn acquire(&self, expense_id: &ExpenseId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = match self.slots.lock() {
                Ok(slots) => slots,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Drop slots nobody holds or waits on.
            slots.retain(|id, slot| id == expense_id || Arc::strong_count(slot) > 1);
            slots.entry(expense_id.clone()).or_default().clone()
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        match self.slots.lock() {
            Ok(slots) => slots.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ExpenseLocks;
    use crate::domain::expense::ExpenseId;

    #[tokio::test]
    async fn same_expense_waits_for_holder() {
        let locks = ExpenseLocks::default();
        let expense = ExpenseId("exp-1".to_string());

        let guard = locks.acquire(&expense).await;
        let contender = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&expense)).await;
        assert!(contender.is_err(), "second acquire must block while the first is held");

        drop(guard);
        let reacquired =
            tokio::time::timeout(Duration::from_millis(50), locks.acquire(&expense)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn different_expenses_do_not_contend() {
        let locks = ExpenseLocks::default();
        let _first = locks.acquire(&ExpenseId("exp-1".to_string())).await;

        let other = tokio::time::timeout(
            Duration::from_millis(50),
            locks.acquire(&ExpenseId("exp-2".to_string())),
        )
        .await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn released_slots_are_pruned() {
        let locks = ExpenseLocks::default();
        for index in 0..5 {
            let _guard = locks.acquire(&ExpenseId(format!("exp-{index}"))).await;
        }

        assert_eq!(locks.tracked(), 1);
    }
}
