// src/qr.rs

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::str::FromStr;
use tracing::{info, warn};

/// Amounts closer than this are considered equal.
pub const AMOUNT_TOLERANCE: Decimal = dec!(0.01);

/// Fields of a fiscal-receipt QR code: `device*receipt*date*time*amount`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrPayload {
    pub device_id: String,
    pub receipt_number: String,
    pub date: String,
    pub time: Option<String>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
}

impl QrPayload {
    /// Absolute difference to `total` when it exceeds the tolerance.
    pub fn amount_discrepancy(&self, total: Decimal) -> Option<Decimal> {
        let diff = (self.amount? - total).abs();
        (diff > AMOUNT_TOLERANCE).then_some(diff)
    }
}

/// Split a decoded QR text into its fiscal fields.
///
/// Fewer than four `*`-separated segments, or an amount that is not a number,
/// means this is not a fiscal receipt code.
pub fn parse_payload(text: &str) -> Option<QrPayload> {
    let parts: Vec<&str> = text.trim().split('*').collect();
    if parts.len() < 4 {
        return None;
    }
    let amount = match parts.get(4).map(|s| s.trim()) {
        None | Some("") => None,
        Some(raw) => Some(Decimal::from_str(raw).ok()?),
    };
    Some(QrPayload {
        device_id: parts[0].to_string(),
        receipt_number: parts[1].to_string(),
        date: parts[2].to_string(),
        time: Some(parts[3].to_string()).filter(|t| !t.is_empty()),
        amount,
    })
}

/// Find the first fiscal QR code in an image.
///
/// Never fails: unreadable images and undecodable codes yield `None`.
#[cfg(feature = "qr")]
pub fn decode(image_bytes: &[u8]) -> Option<QrPayload> {
    let image = match image::load_from_memory(image_bytes) {
        Ok(img) => img.to_luma8(),
        Err(e) => {
            warn!(error = %e, "Failed to load image for QR decode");
            return None;
        }
    };
    let (width, height) = image.dimensions();
    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
            image.get_pixel(x as u32, y as u32).0[0]
        });

    let grids = prepared.detect_grids();
    info!(candidates = grids.len(), "QR grids detected");

    for grid in grids {
        let text = match grid.decode() {
            Ok((_meta, text)) => text,
            Err(e) => {
                warn!(error = %e, "Skipping undecodable QR candidate");
                continue;
            }
        };
        match parse_payload(&text) {
            Some(payload) => return Some(payload),
            None => warn!(data = %text, "QR code is not a fiscal receipt payload"),
        }
    }
    None
}

#[cfg(not(feature = "qr"))]
pub fn decode(_image_bytes: &[u8]) -> Option<QrPayload> {
    warn!("Built without QR support, skipping QR decode");
    None
}
