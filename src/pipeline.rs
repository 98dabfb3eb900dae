// src/pipeline.rs

use crate::ledger::{Ledger, lookup_category};
use crate::prompt::build_prompt;
use crate::providers::{ProviderInvocationFailed, ProviderRegistry, VisionRequest};
use crate::qr::QrPayload;
use crate::response::{ExtractError, extract_json};
use crate::schema::{ExpenseRecord, Vocabulary};
use crate::validate::validate;
use tracing::{info, warn};

/// Provider used when neither the request nor the config names one.
pub const FALLBACK_PROVIDER: &str = "claude";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown provider '{name}'. Choose from: {}", .choices.join(", "))]
    UnknownProvider { name: String, choices: Vec<String> },
    #[error(transparent)]
    Provider(#[from] ProviderInvocationFailed),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Receipt image in, validated record out.
#[derive(Clone)]
pub struct ReceiptParser {
    providers: ProviderRegistry,
    default_provider: String,
}

impl ReceiptParser {
    pub fn new(providers: ProviderRegistry, default_provider: impl Into<String>) -> Self {
        let default_provider = Some(default_provider.into())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| FALLBACK_PROVIDER.to_string());
        Self {
            providers,
            default_provider,
        }
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.names()
    }

    /// Run one provider over the image and validate its answer.
    ///
    /// The first failure is returned as-is; no retry, no second provider.
    pub async fn parse_receipt(
        &self,
        image: &[u8],
        mime_type: &str,
        provider: Option<&str>,
        vocabulary: &Vocabulary,
    ) -> Result<ExpenseRecord, ParseError> {
        let name = provider
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.default_provider);
        let adapter = self
            .providers
            .get(name)
            .ok_or_else(|| ParseError::UnknownProvider {
                name: name.to_string(),
                choices: self.providers.names(),
            })?;

        let prompt = build_prompt(&vocabulary.categories, &vocabulary.payment_methods);
        let request = VisionRequest {
            image,
            mime_type,
            prompt: &prompt,
            categories: &vocabulary.categories,
        };
        let text = adapter.invoke(&request).await?;
        let raw = extract_json(&text)?;
        let record = validate(&raw, &vocabulary.rules());

        info!(
            provider = name,
            date = %record.date,
            total_eur = %record.total_eur,
            category = %record.category,
            "Receipt parsed"
        );
        Ok(record)
    }
}

/// Pick the payment method whose name ends with the card's last four digits.
///
/// Only fills an empty field, and only when exactly one method matches.
pub fn match_card_to_payment(record: &mut ExpenseRecord, payment_methods: &[String]) {
    if record.payment_method.is_some() {
        return;
    }
    let Some(last4) = record.card_last4.as_deref() else {
        return;
    };
    let mut matches = payment_methods.iter().filter(|m| m.ends_with(last4));
    match (matches.next(), matches.next()) {
        (Some(method), None) => {
            info!(card = last4, method = %method, "Payment method matched from card digits");
            record.payment_method = Some(method.clone());
        }
        (Some(_), Some(_)) => warn!(card = last4, "Card digits match several payment methods"),
        _ => {}
    }
}

/// Compare the parsed total with the QR amount. The parsed total stays
/// authoritative; a mismatch is only logged.
pub fn cross_check(record: &ExpenseRecord, qr: Option<&QrPayload>) {
    let Some(qr) = qr else {
        return;
    };
    if let Some(diff) = qr.amount_discrepancy(record.total_eur) {
        warn!(
            qr_amount = ?qr.amount,
            total_eur = %record.total_eur,
            diff = %diff,
            "QR amount differs from parsed total"
        );
    }
}

/// Replace the default category with the one this merchant usually gets.
///
/// Lookup failures are logged and leave the record untouched.
pub async fn autofill_category(record: &mut ExpenseRecord, ledger: &dyn Ledger, default_category: &str) {
    if record.category != default_category {
        return;
    }
    let Some(tax_id) = record.tax_id.as_deref() else {
        return;
    };
    match lookup_category(ledger, tax_id).await {
        Ok(Some(category)) => {
            info!(tax_id, category = %category, "Category filled from merchant history");
            record.category = category;
        }
        Ok(None) => {}
        Err(e) => warn!(tax_id, error = %e, "Category history lookup failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SqliteLedger;
    use crate::providers::mock::MockProvider;
    use rust_decimal_macros::dec;

    fn vocabulary() -> Vocabulary {
        Vocabulary {
            categories: vec!["Храна".into(), "Козметика".into(), "Разни".into()],
            payment_methods: vec!["Cash".into(), "Revolut".into(), "FIB 0889".into(), "Bulbank 4416".into()],
            default_category: "Разни".into(),
        }
    }

    const ANSWER: &str = r#"```json
{"date": "15.02.2026", "total_eur": 23.45, "category": "Храна", "payment_method": "Revolut", "notes": "хляб, мляко, сирене"}
```"#;

    #[tokio::test]
    async fn each_provider_is_reachable_by_name() {
        for name in ["claude", "gemini", "grok"] {
            let mock = MockProvider::answering(name, ANSWER);
            let seen = mock.seen.clone();
            let parser = ReceiptParser::new(ProviderRegistry::new().with(mock), "claude");
            let rec = parser
                .parse_receipt(b"jpeg", "image/jpeg", Some(name), &vocabulary())
                .await
                .unwrap();
            assert_eq!(rec.category, "Храна");
            assert_eq!(rec.total_eur, dec!(23.45));
            let calls = seen.lock().unwrap();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0], (b"jpeg".to_vec(), "image/jpeg".to_string(), 3));
        }
    }

    #[tokio::test]
    async fn unknown_category_becomes_default() {
        let mock = MockProvider::answering(
            "claude",
            r#"{"date": "01.01.2026", "total_eur": 23.45, "category": "NonExistent"}"#,
        );
        let parser = ReceiptParser::new(ProviderRegistry::new().with(mock), "claude");
        let rec = parser
            .parse_receipt(b"x", "image/png", None, &vocabulary())
            .await
            .unwrap();
        assert_eq!(rec.category, "Разни");
        assert_eq!(rec.total_eur, dec!(23.45));
    }

    #[tokio::test]
    async fn default_provider_is_used_without_argument() {
        let grok = MockProvider::answering("grok", ANSWER);
        let seen = grok.seen.clone();
        let parser = ReceiptParser::new(
            ProviderRegistry::new()
                .with(MockProvider::answering("claude", "no json"))
                .with(grok),
            "grok",
        );
        parser
            .parse_receipt(b"x", "image/jpeg", None, &vocabulary())
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn empty_default_falls_back() {
        let parser = ReceiptParser::new(ProviderRegistry::new(), "");
        assert_eq!(parser.default_provider(), FALLBACK_PROVIDER);
    }

    #[tokio::test]
    async fn unknown_provider_lists_choices() {
        let parser = ReceiptParser::new(
            ProviderRegistry::new()
                .with(MockProvider::answering("claude", ANSWER))
                .with(MockProvider::answering("gemini", ANSWER))
                .with(MockProvider::answering("grok", ANSWER)),
            "claude",
        );
        let err = parser
            .parse_receipt(b"x", "image/jpeg", Some("unknown"), &vocabulary())
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::UnknownProvider { .. }));
        assert_eq!(
            err.to_string(),
            "Unknown provider 'unknown'. Choose from: claude, gemini, grok"
        );
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let mock = MockProvider::failing("claude", "API error");
        let parser = ReceiptParser::new(ProviderRegistry::new().with(mock), "claude");
        let err = parser
            .parse_receipt(b"x", "image/jpeg", None, &vocabulary())
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::Provider(_)));
        assert!(err.to_string().contains("API error"));
    }

    #[tokio::test]
    async fn prose_answer_is_no_json() {
        let parser = ReceiptParser::new(
            ProviderRegistry::new().with(MockProvider::answering("claude", "I cannot read this receipt.")),
            "claude",
        );
        let err = parser
            .parse_receipt(b"x", "image/jpeg", None, &vocabulary())
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::Extract(ExtractError::NoJsonFound(_))));
    }

    fn record(payment: Option<&str>, card: Option<&str>) -> ExpenseRecord {
        ExpenseRecord {
            date: "15.02.2026".into(),
            total_eur: dec!(5),
            category: "Храна".into(),
            payment_method: payment.map(String::from),
            notes: String::new(),
            tax_id: None,
            card_last4: card.map(String::from),
        }
    }

    #[test]
    fn card_digits_select_payment_method() {
        let vocab = vocabulary();
        let mut rec = record(None, Some("0889"));
        match_card_to_payment(&mut rec, &vocab.payment_methods);
        assert_eq!(rec.payment_method.as_deref(), Some("FIB 0889"));

        let mut rec = record(Some("Cash"), Some("0889"));
        match_card_to_payment(&mut rec, &vocab.payment_methods);
        assert_eq!(rec.payment_method.as_deref(), Some("Cash"));

        let mut rec = record(None, Some("1234"));
        match_card_to_payment(&mut rec, &vocab.payment_methods);
        assert_eq!(rec.payment_method, None);
    }

    #[test]
    fn ambiguous_card_digits_leave_field_empty() {
        let methods = vec!["FIB 0889".to_string(), "Old 0889".to_string()];
        let mut rec = record(None, Some("0889"));
        match_card_to_payment(&mut rec, &methods);
        assert_eq!(rec.payment_method, None);
    }

    #[tokio::test]
    async fn default_category_is_replaced_from_history() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let mut past = record(Some("Cash"), None);
        past.category = "Козметика".into();
        past.tax_id = Some("123456789".into());
        ledger.append(&past).await.unwrap();

        let mut rec = record(None, None);
        rec.category = "Разни".into();
        rec.tax_id = Some("123456789".into());
        autofill_category(&mut rec, &ledger, "Разни").await;
        assert_eq!(rec.category, "Козметика");
    }

    #[tokio::test]
    async fn explicit_category_is_not_overridden() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let mut past = record(None, None);
        past.category = "Козметика".into();
        past.tax_id = Some("123456789".into());
        ledger.append(&past).await.unwrap();

        let mut rec = record(None, None);
        rec.tax_id = Some("123456789".into());
        autofill_category(&mut rec, &ledger, "Разни").await;
        assert_eq!(rec.category, "Храна");

        let mut unknown = record(None, None);
        unknown.category = "Разни".into();
        unknown.tax_id = Some("555555555".into());
        autofill_category(&mut unknown, &ledger, "Разни").await;
        assert_eq!(unknown.category, "Разни");
    }
}
