use std::future::Future;

use chrono::{Local, NaiveDateTime};

use crate::error::AppError;
use crate::models::Page;

/// Fetches pages and posts forms for the surrounding orchestration.
///
/// Extraction never calls this; it only consumes the resulting [`Page`]s.
pub trait PageFetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Page, AppError>> + Send;

    /// POST a url-encoded form and return the resulting page.
    fn submit_form(
        &self,
        url: &str,
        pairs: &[(String, String)],
    ) -> impl Future<Output = Result<Page, AppError>> + Send;
}

/// Downloads raw bytes (captcha images).
pub trait ImageFetcher: Send + Sync + Clone {
    fn fetch_bytes(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, AppError>> + Send;
}

/// Recognition profile handed to the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrMode {
    /// Short codes of digits and simple latin letters.
    DigitsAlnum,
}

/// Turns a captcha image into text.
///
/// Synchronous: implementations may block briefly, and are called from
/// inside async challenge resolution.
pub trait OcrEngine: Send + Sync + Clone {
    fn recognize(&self, image: &[u8], mode: OcrMode) -> Result<String, AppError>;
}

/// Source of "now" for timestamps that could not be read from a page.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in the local timezone, matching how the site prints dates.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
