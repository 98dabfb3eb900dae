// src/prompt.rs

/// The instruction sent with every receipt image. `{categories}` and
/// `{payment_methods}` are replaced with the comma-joined vocabulary.
const RECEIPT_PROMPT: &str = r#"You are a receipt parser for Bulgarian household expenses.
Given a photo of a receipt, extract the following information and return ONLY valid JSON (no markdown, no code fences):

{
  "date": "DD.MM.YYYY",
  "total_eur": 12.34,
  "category": "one of the allowed categories",
  "payment_method": "one of the allowed payment methods or null",
  "notes": "brief description of main items in Bulgarian, 3-5 words",
  "tax_id": "seller БУЛСТАТ/ЕИК number or null",
  "card_last4": "last 4 digits of the payment card or null"
}

Allowed categories: {categories}

Allowed payment methods: {payment_methods}

Rules:
- Date format must be DD.MM.YYYY
- total_eur must be the final total as a number (EUR amount)
- category MUST be exactly one from the allowed list, pick the best match
- payment_method: pick from allowed list if visible on receipt, otherwise null
- notes: short Bulgarian summary of what was purchased
- tax_id: the seller's БУЛСТАТ or ЕИК number (usually 9-13 digits, often near the top of the receipt). Return null if not visible.
- card_last4: the last 4 digits of a masked card number (e.g. ************0889). Return null for cash payments.
- If the receipt is unclear, make your best guess
"#;

/// Render the receipt prompt for the given vocabulary, keeping list order.
pub fn build_prompt(categories: &[String], payment_methods: &[String]) -> String {
    RECEIPT_PROMPT
        .replace("{categories}", &categories.join(", "))
        .replace("{payment_methods}", &payment_methods.join(", "))
}
