// src/validate.rs

use crate::schema::{ExpenseRecord, MAX_TOTAL_EUR, ValidationRules, is_storable_total, round_money};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::{debug, warn};

/// Turn a raw model answer into a canonical record.
///
/// Total function: every field has a fallback, nothing here can fail.
pub fn validate(raw: &Map<String, Value>, rules: &ValidationRules<'_>) -> ExpenseRecord {
    ExpenseRecord {
        date: text_field(raw.get("date")),
        total_eur: amount_field(raw.get("total_eur").or_else(|| raw.get("total_amount"))),
        category: category_field(raw.get("category"), rules),
        payment_method: payment_field(raw.get("payment_method"), rules.payment_methods),
        notes: text_field(raw.get("notes")),
        tax_id: raw
            .get("tax_id")
            .or_else(|| raw.get("bulstat"))
            .and_then(scalar_text)
            .and_then(|s| normalize_tax_id(&s)),
        card_last4: raw
            .get("card_last4")
            .and_then(scalar_text)
            .and_then(|s| normalize_card_last4(&s)),
    }
}

/// Keep only digits; `None` if nothing is left.
pub fn normalize_tax_id(raw: &str) -> Option<String> {
    let digits = digits_only(raw);
    (!digits.is_empty()).then_some(digits)
}

/// Keep only digits; `None` unless exactly four remain.
pub fn normalize_card_last4(raw: &str) -> Option<String> {
    let digits = digits_only(raw);
    (digits.len() == 4).then_some(digits)
}

fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Strings as-is, numbers and booleans as their JSON text, anything else dropped.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_field(value: Option<&Value>) -> String {
    value.and_then(scalar_text).unwrap_or_default()
}

fn amount_field(value: Option<&Value>) -> Decimal {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Decimal::ZERO;
    };
    let parsed = match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => parse_amount(s),
        _ => None,
    };
    match parsed {
        Some(amount) if is_storable_total(amount) => round_money(amount),
        Some(amount) if amount < Decimal::ZERO => {
            warn!(%amount, "Negative total in model output, using 0");
            Decimal::ZERO
        }
        Some(amount) => {
            warn!(%amount, max = %MAX_TOTAL_EUR, "Implausibly large total in model output, using 0");
            Decimal::ZERO
        }
        None => {
            warn!(raw = %value, "Unparseable total in model output, using 0");
            Decimal::ZERO
        }
    }
}

/// Numeric strings as models write them: "23.45", "23,45", " 23.45 ".
fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned = raw.trim().replace(',', ".");
    Decimal::from_str(&cleaned).ok()
}

fn category_field(value: Option<&Value>, rules: &ValidationRules<'_>) -> String {
    let candidate = value.and_then(Value::as_str).filter(|s| !s.is_empty());
    match (candidate, rules.categories) {
        (Some(cat), Some(allowed)) if !allowed.is_empty() => {
            if allowed.iter().any(|a| a == cat) {
                cat.to_string()
            } else {
                debug!(category = cat, "Category not in vocabulary, using default");
                rules.default_category.to_string()
            }
        }
        (Some(cat), _) => cat.to_string(),
        (None, _) => rules.default_category.to_string(),
    }
}

fn payment_field(value: Option<&Value>, allowed: Option<&[String]>) -> Option<String> {
    let method = value.and_then(Value::as_str).filter(|s| !s.trim().is_empty())?;
    match allowed {
        Some(allowed) if !allowed.is_empty() => {
            allowed.iter().any(|a| a == method).then(|| method.to_string())
        }
        _ => Some(method.to_string()),
    }
}
