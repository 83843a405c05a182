pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::{AreaFilter, CellRef, DetailLayout, ExtractorConfig, ListingLayout, ProfileLayout};
pub use error::AppError;
pub use models::{
    CaptchaChallenge, CaptchaPrompt, CaptchaSolution, Challenge, ChallengeResponse, Extracted,
    ListingDetail, ListingSummary, LoginForm, Page, ProfileStats, QaChallenge, RowMetrics,
    Session, TypeCategory, VendorProfile,
};
pub use traits::{Clock, ImageFetcher, OcrEngine, OcrMode, PageFetcher, SystemClock};
