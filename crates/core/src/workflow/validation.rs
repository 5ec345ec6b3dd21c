use rust_decimal::Decimal;

use crate::domain::expense::ExpenseDraft;
use crate::errors::ValidationError;

pub const DEFAULT_MIN_DESCRIPTION_LEN: usize = 10;

/// Money is kept to cents; rule bounds are written at the same precision.
pub const MAX_AMOUNT_SCALE: u32 = 2;

/// Rejects amounts finer than cents. Trailing zeros do not count.
pub fn check_amount_scale(amount: Decimal) -> Result<(), ValidationError> {
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(ValidationError::ExcessAmountPrecision { amount, max_scale: MAX_AMOUNT_SCALE });
    }
    Ok(())
}

/// Checks a draft before any store access. Reports the first failure.
pub fn validate_draft(draft: &ExpenseDraft, min_description_len: usize) -> Result<(), ValidationError> {
    if draft.amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount { amount: draft.amount });
    }
    check_amount_scale(draft.amount)?;

    let currency = draft.currency.trim();
    if currency.is_empty() {
        return Err(ValidationError::MissingField { field: "currency" });
    }
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidCurrency { currency: draft.currency.clone() });
    }

    if draft.category.trim().is_empty() {
        return Err(ValidationError::MissingField { field: "category" });
    }

    let description_len = draft.description.trim().chars().count();
    if description_len < min_description_len {
        return Err(ValidationError::DescriptionTooShort {
            min_len: min_description_len,
            actual_len: description_len,
        });
    }

    Ok(())
}
