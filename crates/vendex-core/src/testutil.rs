//! Test utilities: mock implementations of the collaborator traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;

use crate::error::AppError;
use crate::models::Page;
use crate::traits::{Clock, ImageFetcher, OcrEngine, OcrMode, PageFetcher};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher serving queued pages and image bytes.
#[derive(Clone, Default)]
pub struct MockFetcher {
    /// Queue of page responses. Each call pops the first element.
    pages: Arc<Mutex<Vec<Result<Page, AppError>>>>,
    /// Queue of image responses.
    images: Arc<Mutex<Vec<Result<Vec<u8>, AppError>>>>,
    /// Every URL requested, in order.
    pub requested: Arc<Mutex<Vec<String>>>,
    /// Every form posted, in order.
    pub submitted: Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>,
}

impl MockFetcher {
    pub fn with_pages(pages: Vec<Result<Page, AppError>>) -> Self {
        Self {
            pages: Arc::new(Mutex::new(pages)),
            ..Self::default()
        }
    }

    pub fn with_image(bytes: &[u8]) -> Self {
        Self {
            images: Arc::new(Mutex::new(vec![Ok(bytes.to_vec())])),
            ..Self::default()
        }
    }

    pub fn with_image_error(error: AppError) -> Self {
        Self {
            images: Arc::new(Mutex::new(vec![Err(error)])),
            ..Self::default()
        }
    }

    fn next_page(&self, url: &str) -> Result<Page, AppError> {
        let mut pages = self.pages.lock().unwrap();
        if pages.is_empty() {
            Err(AppError::HttpError(format!("no page queued for {url}")))
        } else {
            pages.remove(0)
        }
    }
}

impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Page, AppError> {
        self.requested.lock().unwrap().push(url.to_string());
        self.next_page(url)
    }

    async fn submit_form(&self, url: &str, pairs: &[(String, String)]) -> Result<Page, AppError> {
        self.submitted
            .lock()
            .unwrap()
            .push((url.to_string(), pairs.to_vec()));
        self.next_page(url)
    }
}

impl ImageFetcher for MockFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, AppError> {
        self.requested.lock().unwrap().push(url.to_string());
        let mut images = self.images.lock().unwrap();
        if images.is_empty() {
            Err(AppError::HttpError(format!("no image queued for {url}")))
        } else {
            images.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockOcr
// ---------------------------------------------------------------------------

/// Mock OCR engine returning a fixed answer or error.
#[derive(Clone)]
pub struct MockOcr {
    result: Arc<Mutex<Result<String, String>>>,
    /// Images it was asked to read.
    pub seen: Arc<Mutex<Vec<(Vec<u8>, OcrMode)>>>,
}

impl MockOcr {
    pub fn new(text: &str) -> Self {
        Self {
            result: Arc::new(Mutex::new(Ok(text.to_string()))),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Arc::new(Mutex::new(Err(message.to_string()))),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl OcrEngine for MockOcr {
    fn recognize(&self, image: &[u8], mode: OcrMode) -> Result<String, AppError> {
        self.seen.lock().unwrap().push((image.to_vec(), mode));
        self.result
            .lock()
            .unwrap()
            .clone()
            .map_err(AppError::OcrError)
    }
}

// ---------------------------------------------------------------------------
// FixedClock
// ---------------------------------------------------------------------------

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
