//! Tesseract-backed text recognizer
//!
//! Pipes a PNG into `tesseract stdin stdout` using the LSTM engine, the most
//! accurate mode available, with dictionary correction for the configured
//! languages.

use crate::error::{ImportError, ImportResult};
use crate::services::text_recognizer::TextRecognizer;
use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat};
use std::io::Cursor;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// LSTM neural net engine only
const OCR_ENGINE_MODE: &str = "1";

/// Fully automatic page segmentation
const PAGE_SEGMENTATION_MODE: &str = "3";

/// Text recognizer running the tesseract command-line tool
pub struct TesseractRecognizer {
    binary: String,
    languages: String,
}

impl TesseractRecognizer {
    /// Recognizer for the given BCP 47 language tags (e.g. `en-US`)
    ///
    /// An empty list falls back to English.
    pub fn new(languages: &[String]) -> Self {
        let mut codes: Vec<String> = Vec::new();
        for tag in languages {
            let code = tesseract_language(tag);
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        if codes.is_empty() {
            codes.push("eng".to_string());
        }

        Self {
            binary: "tesseract".to_string(),
            languages: codes.join("+"),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Tesseract `-l` argument
    pub fn languages(&self) -> &str {
        &self.languages
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &DynamicImage) -> ImportResult<Vec<String>> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
            .map_err(|e| ImportError::InvalidImage(format!("PNG encode failed: {}", e)))?;

        let mut child = Command::new(&self.binary)
            .args([
                "stdin",
                "stdout",
                "-l",
                &self.languages,
                "--oem",
                OCR_ENGINE_MODE,
                "--psm",
                PAGE_SEGMENTATION_MODE,
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ImportError::RecognitionFailed(format!("failed to start {}: {}", self.binary, e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ImportError::RecognitionFailed("tesseract stdin unavailable".into()))?;
        let writer = tokio::spawn(async move {
            stdin.write_all(&png).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ImportError::RecognitionFailed(e.to_string()))?;

        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ImportError::RecognitionFailed(format!("stdin write: {}", e))),
            Err(e) => return Err(ImportError::RecognitionFailed(format!("stdin task: {}", e))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ImportError::RecognitionFailed(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let lines = split_output(&String::from_utf8_lossy(&output.stdout));
        debug!(lines = lines.len(), languages = %self.languages, "Tesseract finished");
        Ok(lines)
    }
}

/// Map a BCP 47 tag to a tesseract traineddata name
fn tesseract_language(tag: &str) -> String {
    let primary = tag
        .split(['-', '_'])
        .next()
        .unwrap_or(tag)
        .to_ascii_lowercase();

    match primary.as_str() {
        "en" => "eng",
        "es" => "spa",
        "fr" => "fra",
        "de" => "deu",
        "it" => "ita",
        "pt" => "por",
        "nl" => "nld",
        "ja" => "jpn",
        "ko" => "kor",
        "zh" => "chi_sim",
        other => return other.to_string(),
    }
    .to_string()
}

/// Non-blank output lines; the form feed tesseract appends is dropped
fn split_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.trim_end_matches('\u{c}').trim_end())
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}
