use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use vendex_core::error::AppError;
use vendex_core::traits::{OcrEngine, OcrMode};

/// OCR through the `tesseract` command-line tool.
///
/// The image goes in on stdin and the text comes back on stdout, so no
/// temporary files are written. `recognize` blocks until the process exits;
/// a captcha is a single short line, so this is one brief stall per login.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: PathBuf,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl TesseractOcr {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(mode: OcrMode) -> Vec<&'static str> {
        match mode {
            // a single text line of the site's captcha alphabet
            OcrMode::DigitsAlnum => vec!["stdin", "stdout", "-l", "snum", "--psm", "7"],
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &[u8], mode: OcrMode) -> Result<String, AppError> {
        let mut child = Command::new(&self.binary)
            .args(Self::args(mode))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                AppError::OcrError(format!("Failed to start {}: {e}", self.binary.display()))
            })?;

        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(image)
        {
            // the process may still be running; reap it before giving up
            let _ = child.kill();
            let _ = child.wait();
            return Err(AppError::OcrError(format!("Failed to send image: {e}")));
        }

        let output = child
            .wait_with_output()
            .map_err(|e| AppError::OcrError(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::OcrError(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(?mode, text = %text.trim(), "OCR result");
        Ok(text)
    }
}
