// src/schema.rs

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Bulgarian lev per euro (currency board fixed rate).
pub const BGN_PER_EUR: Decimal = dec!(1.95583);

/// Largest total a single receipt may carry, in euro.
pub const MAX_TOTAL_EUR: Decimal = dec!(10_000_000);

/// Ledger column order. A record always renders to exactly these cells.
pub const SHEET_COLUMNS: [&str; 10] = [
    "Дата",
    "Категория",
    "Цена лв",
    "Цена €",
    "GGBG лв",
    "Плащане",
    "Допълн. такса",
    "Payback",
    "Пояснения",
    "БУЛСТАТ",
];

pub const CATEGORY_COLUMN: &str = "Категория";
pub const TAX_ID_COLUMN: &str = "БУЛСТАТ";

/// 1-based index of a ledger column, as spreadsheets count them.
pub fn column_index(name: &str) -> Option<usize> {
    SHEET_COLUMNS.iter().position(|c| *c == name).map(|i| i + 1)
}

/// Round to cents, midpoint away from zero. The only rounding used for money.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Money cell as the ledger locale expects it: two places, comma separator.
pub fn format_money(value: Decimal) -> String {
    format!("{:.2}", round_money(value)).replace('.', ",")
}

/// Whether `amount` can be stored as a receipt total: non-negative and
/// within `MAX_TOTAL_EUR`.
pub fn is_storable_total(amount: Decimal) -> bool {
    amount >= Decimal::ZERO && amount <= MAX_TOTAL_EUR
}

/// The allowed vocabulary for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    pub categories: Vec<String>,
    pub payment_methods: Vec<String>,
    pub default_category: String,
}

impl Vocabulary {
    pub fn rules(&self) -> ValidationRules<'_> {
        ValidationRules {
            categories: Some(&self.categories),
            payment_methods: Some(&self.payment_methods),
            default_category: &self.default_category,
        }
    }
}

/// What the validator checks raw model output against.
///
/// `None` (or an empty list) disables filtering for that field.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRules<'a> {
    pub categories: Option<&'a [String]>,
    pub payment_methods: Option<&'a [String]>,
    pub default_category: &'a str,
}

/// A single expense, as extracted from a receipt or entered by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub date: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_eur: Decimal,
    pub category: String,
    pub payment_method: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub card_last4: Option<String>,
}

impl ExpenseRecord {
    /// Total converted to leva, rounded to cents. Zero if the conversion
    /// does not fit in a `Decimal`.
    pub fn total_bgn(&self) -> Decimal {
        match self.total_eur.checked_mul(BGN_PER_EUR) {
            Some(bgn) => round_money(bgn),
            None => {
                warn!(total_eur = %self.total_eur, "Total too large to convert to leva");
                Decimal::ZERO
            }
        }
    }

    /// Render as a ledger row matching `SHEET_COLUMNS`.
    pub fn to_sheet_row(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.category.clone(),
            format_money(self.total_bgn()),
            format_money(self.total_eur),
            String::new(), // GGBG лв, filled manually
            self.payment_method.clone().unwrap_or_default(),
            String::new(), // Допълн. такса
            String::new(), // Payback
            self.notes.clone(),
            self.tax_id.clone().unwrap_or_default(),
        ]
    }
}

/// Response shape for a stored record, with the derived lev total.
#[derive(Debug, Serialize)]
pub struct RecordView {
    #[serde(flatten)]
    pub record: ExpenseRecord,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_bgn: Decimal,
}

impl From<ExpenseRecord> for RecordView {
    fn from(record: ExpenseRecord) -> Self {
        Self {
            total_bgn: record.total_bgn(),
            record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExpenseRecord {
        ExpenseRecord {
            date: "15.02.2026".to_string(),
            total_eur: dec!(23.45),
            category: "Храна".to_string(),
            payment_method: Some("Revolut".to_string()),
            notes: "хляб, мляко, сирене".to_string(),
            tax_id: None,
            card_last4: None,
        }
    }

    #[test]
    fn bgn_of_one_euro() {
        let mut rec = sample();
        rec.total_eur = dec!(1.00);
        assert_eq!(rec.total_bgn(), dec!(1.96));
    }

    #[test]
    fn bgn_of_sample_and_zero() {
        let mut rec = sample();
        assert_eq!(rec.total_bgn(), dec!(45.86));
        rec.total_eur = Decimal::ZERO;
        assert_eq!(rec.total_bgn(), Decimal::ZERO);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_money(dec!(0.125)), dec!(0.13));
        assert_eq!(round_money(dec!(2.675)), dec!(2.68));
    }

    #[test]
    fn sheet_row_layout() {
        let row = sample().to_sheet_row();
        assert_eq!(row.len(), SHEET_COLUMNS.len());
        assert_eq!(row[0], "15.02.2026");
        assert_eq!(row[1], "Храна");
        assert_eq!(row[2], "45,86");
        assert_eq!(row[3], "23,45");
        assert_eq!(row[4], "");
        assert_eq!(row[5], "Revolut");
        assert_eq!(row[6], "");
        assert_eq!(row[7], "");
        assert_eq!(row[8], "хляб, мляко, сирене");
        assert_eq!(row[9], "");
    }

    #[test]
    fn sheet_row_recovers_fixed_columns() {
        let rec = sample();
        let row = rec.to_sheet_row();
        let at = |name: &str| row[column_index(name).unwrap() - 1].clone();
        assert_eq!(at("Дата"), rec.date);
        assert_eq!(at("Категория"), rec.category);
        assert_eq!(Some(at("Плащане")), rec.payment_method);
        assert_eq!(at("Пояснения"), rec.notes);
    }

    #[test]
    fn missing_payment_renders_empty() {
        let mut rec = sample();
        rec.payment_method = None;
        rec.tax_id = Some("123456789".to_string());
        let row = rec.to_sheet_row();
        assert_eq!(row[5], "");
        assert_eq!(row[9], "123456789");
    }

    #[test]
    fn whole_amount_keeps_two_places() {
        assert_eq!(format_money(dec!(10)), "10,00");
    }

    #[test]
    fn view_serializes_numbers() {
        let json = serde_json::to_value(RecordView::from(sample())).unwrap();
        assert_eq!(json["total_eur"], serde_json::json!(23.45));
        assert_eq!(json["total_bgn"], serde_json::json!(45.86));
        assert_eq!(json["category"], "Храна");
    }

    #[test]
    fn oversized_total_does_not_panic() {
        let mut rec = sample();
        rec.total_eur = Decimal::MAX;
        assert_eq!(rec.total_bgn(), Decimal::ZERO);
        let row = rec.to_sheet_row();
        assert_eq!(row[2], "0,00");
    }

    #[test]
    fn storable_totals() {
        assert!(is_storable_total(Decimal::ZERO));
        assert!(is_storable_total(dec!(23.45)));
        assert!(is_storable_total(MAX_TOTAL_EUR));
        assert!(!is_storable_total(dec!(-0.01)));
        assert!(!is_storable_total(MAX_TOTAL_EUR + dec!(0.01)));
        assert!(!is_storable_total(Decimal::MAX));
    }
}
