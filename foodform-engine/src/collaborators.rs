//! Asynchronous collaborator interfaces
//!
//! Label recognition, barcode decoding and crop rendering happen outside the
//! engine. The session actor runs them as independent tasks and applies their
//! results on its own task.

use crate::scan::{BoundingBox, ScanOutput};
use std::sync::Arc;
use thiserror::Error;

/// Raw encoded image bytes, shared between the session and worker tasks
pub type ImageData = Arc<[u8]>;

/// Rendered sub-image shown next to a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CroppedImage {
    pub data: ImageData,
    pub width: u32,
    pub height: u32,
}

/// Label scan / barcode decode failure
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),
}

/// Crop render failure
#[derive(Debug, Error)]
pub enum CropError {
    #[error("Crop render failed: {0}")]
    Render(String),

    #[error("Region outside image bounds")]
    OutOfBounds,
}

/// OCR + barcode collaborator
#[async_trait::async_trait]
pub trait LabelScanner: Send + Sync {
    /// Scanner name for logging
    fn name(&self) -> &'static str;

    /// Recognize label text regions and decode barcodes on one image
    async fn scan(&self, image: ImageData) -> Result<ScanOutput, ScanError>;
}

/// Crop-render collaborator
#[async_trait::async_trait]
pub trait CropRenderer: Send + Sync {
    /// Render the union of `regions`; an empty slice means the whole image
    async fn crop(
        &self,
        image: ImageData,
        regions: Vec<BoundingBox>,
    ) -> Result<CroppedImage, CropError>;
}
