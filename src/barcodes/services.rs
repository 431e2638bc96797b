use std::sync::Arc;

use anyhow::Context;
use barcoders::generators::image::{Color, Image, Rotation};
use barcoders::sym::code128::Code128;
use bytes::Bytes;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::storage::StorageClient;

/// Storage key prefix for rendered barcodes.
pub const BARCODE_PREFIX: &str = "barcodes";

// Code set B covers printable ASCII, which is what asset identifiers use.
const CODE_SET_B: char = '\u{0181}';
const MODULE_WIDTH_PX: u32 = 3;
const BAR_HEIGHT_PX: u32 = 85;

/// Renders Code128 barcodes and stores them as PNGs.
#[derive(Clone)]
pub struct BarcodeIssuer {
    storage: Arc<dyn StorageClient>,
}

impl BarcodeIssuer {
    pub fn new(storage: Arc<dyn StorageClient>) -> Self {
        Self { storage }
    }

    /// Encodes `payload`, writes the image and returns its reference (a filename
    /// relative to the barcode prefix).
    #[instrument(skip(self))]
    pub async fn issue(&self, payload: &str) -> Result<String, AppError> {
        let png = render_png(payload)?;
        let reference = reference_for(payload);
        let key = format!("{}/{}", BARCODE_PREFIX, reference);
        self.storage
            .put_object(&key, Bytes::from(png), "image/png")
            .await
            .with_context(|| format!("put_object {}", key))
            .map_err(AppError::Io)?;
        debug!(%key, "barcode stored");
        Ok(reference)
    }
}

pub fn render_png(payload: &str) -> Result<Vec<u8>, AppError> {
    if payload.is_empty() {
        return Err(AppError::invalid("barcode payload is empty"));
    }
    let symbol = Code128::new(format!("{}{}", CODE_SET_B, payload))
        .map_err(|e| AppError::invalid(format!("cannot encode {payload:?} as Code128: {e}")))?;
    let png = Image::PNG {
        height: BAR_HEIGHT_PX,
        xdim: MODULE_WIDTH_PX,
        rotation: Rotation::Zero,
        foreground: Color::new([0, 0, 0, 255]),
        background: Color::new([255, 255, 255, 255]),
    };
    png.generate(&symbol.encode()[..])
        .map_err(|e| AppError::Internal(anyhow::anyhow!("render barcode: {e}")))
}

/// `<sanitized>-<tag>.png`. The tag is derived from the raw payload so identifiers
/// that sanitize to the same text still get distinct files.
pub fn reference_for(payload: &str) -> String {
    let sanitized: String = payload
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let tag = Uuid::new_v5(&Uuid::NAMESPACE_OID, payload.as_bytes()).simple().to_string();
    format!("{}-{}.png", sanitized, &tag[..8])
}
