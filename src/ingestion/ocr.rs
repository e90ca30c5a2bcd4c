//! OCR for raster images via the tesseract binary
//!
//! Every image is recognized twice: once verbatim, once after a
//! grayscale + 2x upscale preprocessing pass. Scans of bank statements and
//! licenses often come in low-resolution photos where the preprocessed pass
//! wins; clean screenshots usually do better verbatim. The pass with more
//! extracted characters is kept.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Text recognition over raster image bytes
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text in an image; empty string when nothing is readable
    async fn recognize(&self, image: &[u8]) -> Result<String>;

    /// Whether the underlying engine is usable on this host
    async fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}

/// Tesseract-backed OCR engine (chi_sim + eng)
pub struct TesseractOcr {
    languages: String,
}

impl TesseractOcr {
    pub fn new() -> Self {
        Self {
            languages: "chi_sim+eng".to_string(),
        }
    }

    pub fn with_languages(languages: impl Into<String>) -> Self {
        Self {
            languages: languages.into(),
        }
    }

    /// Run tesseract over an image file, returning recognized text
    async fn run_tesseract(&self, image_path: &Path) -> Result<String> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.languages])
            .output()
            .await
            .map_err(|e| Error::extraction("image", format!("tesseract failed to start: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::extraction(
                "image",
                format!("tesseract exited with error: {}", stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Grayscale + 2x upscale; returns PNG bytes
    fn preprocess(image: &[u8]) -> Result<Vec<u8>> {
        use image::GenericImageView;

        let img = image::load_from_memory(image)
            .map_err(|e| Error::extraction("image", format!("unreadable image data: {}", e)))?;

        let gray = img.grayscale();
        let upscaled = gray.resize(
            gray.width() * 2,
            gray.height() * 2,
            image::imageops::FilterType::Lanczos3,
        );

        let mut out = Vec::new();
        upscaled
            .write_to(
                &mut std::io::Cursor::new(&mut out),
                image::ImageFormat::Png,
            )
            .map_err(|e| Error::extraction("image", format!("failed to encode image: {}", e)))?;
        Ok(out)
    }

    async fn recognize_bytes(&self, image: &[u8]) -> Result<String> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("input.png");
        tokio::fs::write(&path, image).await?;
        self.run_tesseract(&path).await
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &[u8]) -> Result<String> {
        let verbatim = self.recognize_bytes(image).await?;

        // Second pass on the preprocessed variant; failures here fall back to
        // the verbatim result
        let preprocessed = match Self::preprocess(image) {
            Ok(bytes) => self.recognize_bytes(&bytes).await.unwrap_or_default(),
            Err(e) => {
                tracing::debug!("image preprocessing skipped: {}", e);
                String::new()
            }
        };

        if preprocessed.chars().count() > verbatim.chars().count() {
            tracing::debug!(
                verbatim_chars = verbatim.chars().count(),
                preprocessed_chars = preprocessed.chars().count(),
                "preprocessed OCR pass won"
            );
            Ok(preprocessed)
        } else {
            Ok(verbatim)
        }
    }

    async fn is_available(&self) -> bool {
        Command::new("tesseract")
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}
