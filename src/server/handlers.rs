// src/server/handlers.rs

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{Instrument, error, info, info_span, warn};

use super::SharedState;
use super::error::ApiError;
use crate::ledger::Ledger;
use crate::pipeline::{autofill_category, cross_check, match_card_to_payment};
use crate::qr::{self, QrPayload};
use crate::schema::{ExpenseRecord, MAX_TOTAL_EUR, RecordView, Vocabulary, is_storable_total, round_money};

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub version: &'static str,
    pub categories: Vec<String>,
    pub payment_methods: Vec<String>,
    pub providers: Vec<String>,
    pub default_provider: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub row: u32,
    pub data: RecordView,
    pub qr: Option<QrPayload>,
}

#[derive(Debug, Deserialize)]
pub struct ManualEntry {
    pub date: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_eur: Decimal,
    pub category: String,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Serialize)]
pub struct ManualResponse {
    pub row: u32,
    pub data: RecordView,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub column: String,
    pub value: String,
}

fn ok() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// Short content hash, enough to correlate log lines for one image.
fn fingerprint(image: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(image));
    digest[..12].to_string()
}

/// Current allowed lists: named ranges from the ledger when configured and
/// readable, the static configuration otherwise.
pub async fn current_vocabulary(state: &SharedState) -> Vocabulary {
    let mut vocabulary = state.vocabulary.to_vocabulary();
    if let Some(range) = &state.vocabulary.categories_range {
        refresh_list(state.ledger.as_ref(), range, &mut vocabulary.categories).await;
    }
    if let Some(range) = &state.vocabulary.payment_methods_range {
        refresh_list(state.ledger.as_ref(), range, &mut vocabulary.payment_methods).await;
    }
    vocabulary
}

async fn refresh_list(ledger: &dyn Ledger, range: &str, list: &mut Vec<String>) {
    match ledger.read_range(range).await {
        Ok(values) if !values.is_empty() => *list = values,
        Ok(_) => warn!(range, "Named range is empty, keeping configured list"),
        Err(e) => warn!(range, error = %e, "Named range unreadable, keeping configured list"),
    }
}

pub async fn get_config(State(state): State<SharedState>) -> Json<ConfigResponse> {
    let vocabulary = current_vocabulary(&state).await;
    Json(ConfigResponse {
        version: env!("CARGO_PKG_VERSION"),
        categories: vocabulary.categories,
        payment_methods: vocabulary.payment_methods,
        providers: state.parser.provider_names(),
        default_provider: state.parser.default_provider().to_string(),
    })
}

/// Pull the `file` part out of the form. Anything but an image is rejected.
async fn read_image(multipart: &mut Multipart) -> Result<(Bytes, String), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let mime_type = field.content_type().unwrap_or_default().to_string();
        if !mime_type.starts_with("image/") {
            return Err(ApiError::BadRequest("File must be an image".into()));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        return Ok((bytes, mime_type));
    }
    Err(ApiError::BadRequest("Missing file field".into()))
}

pub async fn upload_receipt(
    State(state): State<SharedState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let (image, mime_type) = read_image(&mut multipart).await?;
    let provider = query
        .provider
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| state.parser.default_provider().to_string());
    let span = info_span!("upload", receipt = %fingerprint(&image), provider = %provider);

    async move {
        info!(bytes = image.len(), mime_type = %mime_type, "Receipt received");
        let vocabulary = current_vocabulary(&state).await;

        let qr_task = tokio::task::spawn_blocking({
            let image = image.clone();
            move || qr::decode(&image)
        });
        let parsed = state
            .parser
            .parse_receipt(&image, &mime_type, Some(provider.as_str()), &vocabulary)
            .await;
        let mut record = parsed.map_err(|e| {
            error!(error = %e, "Receipt parsing failed");
            ApiError::from(e)
        })?;
        let qr = qr_task.await.unwrap_or_else(|e| {
            warn!(error = %e, "QR decoding task failed");
            None
        });

        cross_check(&record, qr.as_ref());
        autofill_category(&mut record, state.ledger.as_ref(), &vocabulary.default_category).await;
        match_card_to_payment(&mut record, &vocabulary.payment_methods);

        let row = state.ledger.append(&record).await?;
        state.undo.push(row);
        Ok::<_, ApiError>(Json(UploadResponse {
            row,
            data: RecordView::from(record),
            qr,
        }))
    }
    .instrument(span)
    .await
}

pub async fn manual_entry(
    State(state): State<SharedState>,
    Json(entry): Json<ManualEntry>,
) -> Result<Json<ManualResponse>, ApiError> {
    if !is_storable_total(entry.total_eur) {
        return Err(ApiError::BadRequest(format!(
            "total_eur must be between 0 and {MAX_TOTAL_EUR}"
        )));
    }
    let record = ExpenseRecord {
        date: entry.date,
        total_eur: round_money(entry.total_eur),
        category: entry.category,
        payment_method: entry.payment_method.filter(|p| !p.trim().is_empty()),
        notes: entry.notes,
        tax_id: None,
        card_last4: None,
    };
    let row = state.ledger.append(&record).await?;
    state.undo.push(row);
    info!(row, "Manual entry stored");
    Ok(Json(ManualResponse {
        row,
        data: RecordView::from(record),
    }))
}

pub async fn update_entry(
    State(state): State<SharedState>,
    Path(row): Path<u32>,
    Json(update): Json<UpdateRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .ledger
        .update_field(row, &update.column, &update.value)
        .await?;
    Ok(ok())
}

pub async fn delete_entry(
    State(state): State<SharedState>,
    Path(row): Path<u32>,
) -> Result<Json<Value>, ApiError> {
    state.ledger.delete(row).await?;
    state.undo.forget_row(row);
    Ok(ok())
}

pub async fn undo_last(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let row = state
        .undo
        .pop()
        .ok_or_else(|| ApiError::NotFound("Nothing to undo".into()))?;
    if let Err(e) = state.ledger.delete(row).await {
        state.undo.push(row);
        return Err(e.into());
    }
    state.undo.forget_row(row);
    info!(row, "Last entry undone");
    Ok(ok())
}
