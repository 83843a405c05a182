use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;

/// Format used for every timestamp a record carries.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Captcha code returned when a solve attempt fails.
pub const FALLBACK_CAPTCHA_CODE: &str = "TRBGR";

/// Confirm id returned alongside [`FALLBACK_CAPTCHA_CODE`].
pub const FALLBACK_CONFIRM_ID: &str = "7c3601cd570d2650a89fd33b3b5238d1";

/// Submit-button value the login form posts.
pub const LOGIN_BUTTON_VALUE: &str = "登录";

/// Serde adapter writing `NaiveDateTime` as [`TIMESTAMP_FORMAT`].
pub mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&ts.format(super::TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, super::TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// A fetched response: final URL after redirects, body text, status code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub body: String,
    pub status: u16,
}

impl Page {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
            status: 200,
        }
    }

    /// Resolve `href` against this page's final URL.
    ///
    /// Absolute, relative and protocol-relative references all go through
    /// standard URL-join semantics.
    pub fn join(&self, href: &str) -> Result<String, AppError> {
        let base = Url::parse(&self.url)
            .map_err(|e| AppError::parse_failure("page url", format!("{}: {e}", self.url)))?;
        base.join(href)
            .map(|u| u.to_string())
            .map_err(|e| AppError::parse_failure("href", format!("{href}: {e}")))
    }
}

/// Credentials negotiated by the login handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub sid: String,
    pub form_token: String,
    pub creation_time: String,
    /// Hidden `redirect` inputs of the login form, in document order.
    pub redirect_targets: Vec<String>,
}

impl Session {
    /// Replace the sid after a page re-issued it inline.
    pub fn refresh_sid(&mut self, sid: impl Into<String>) {
        self.sid = sid.into();
    }

    /// Replace the anti-forgery pair after it rotated on a new page.
    pub fn rotate_token(&mut self, form_token: impl Into<String>, creation_time: impl Into<String>) {
        self.form_token = form_token.into();
        self.creation_time = creation_time.into();
    }

    /// Login payload with blank credentials for the caller to fill in.
    pub fn login_form(&self) -> LoginForm {
        LoginForm {
            username: String::new(),
            password: String::new(),
            login: LOGIN_BUTTON_VALUE.to_string(),
            sid: self.sid.clone(),
            form_token: self.form_token.clone(),
            creation_time: self.creation_time.clone(),
            redirect: self.redirect_targets.clone(),
        }
    }
}

/// The login form as the site expects it to be posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub login: String,
    pub sid: String,
    pub form_token: String,
    pub creation_time: String,
    pub redirect: Vec<String>,
}

impl LoginForm {
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Form-encodable pairs; `redirect` repeats once per target.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("creation_time".to_string(), self.creation_time.clone()),
            ("form_token".to_string(), self.form_token.clone()),
            ("login".to_string(), self.login.clone()),
            ("password".to_string(), self.password.clone()),
        ];
        pairs.extend(
            self.redirect
                .iter()
                .map(|target| ("redirect".to_string(), target.clone())),
        );
        pairs.push(("sid".to_string(), self.sid.clone()));
        pairs.push(("username".to_string(), self.username.clone()));
        pairs
    }
}

/// A captcha found on a page, before its image has been fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptchaPrompt {
    pub confirm_id: String,
    pub image_url: String,
}

/// Captcha image bytes ready for one OCR attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChallenge {
    pub confirm_id: String,
    pub image: Vec<u8>,
}

/// Result of one captcha solve attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptchaSolution {
    pub code: String,
    pub confirm_id: String,
}

impl CaptchaSolution {
    /// The known-bad pair returned when solving failed.
    pub fn fallback() -> Self {
        Self {
            code: FALLBACK_CAPTCHA_CODE.to_string(),
            confirm_id: FALLBACK_CONFIRM_ID.to_string(),
        }
    }

    /// True when this is the failure sentinel rather than a real answer.
    pub fn is_fallback(&self) -> bool {
        self.code == FALLBACK_CAPTCHA_CODE && self.confirm_id == FALLBACK_CONFIRM_ID
    }
}

/// Question/answer challenge: the page states the answer to type back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QaChallenge {
    pub question_answer: String,
    pub confirm_id: String,
}

/// The challenge a login page presents, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Challenge {
    Captcha(CaptchaPrompt),
    QuestionAnswer(QaChallenge),
    None,
}

/// What the caller posts back for a [`Challenge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChallengeResponse {
    Captcha(CaptchaSolution),
    QuestionAnswer(QaChallenge),
    None,
}

impl ChallengeResponse {
    /// True when a captcha was present but could not be solved.
    pub fn needs_retry(&self) -> bool {
        matches!(self, ChallengeResponse::Captcha(solution) if solution.is_fallback())
    }
}

/// Upstream row values merged into a listing detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowMetrics {
    pub age_days: u64,
    pub hotness: u64,
}

/// One row of a listing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSummary {
    pub area: String,
    pub title: String,
    pub age_days: u64,
    pub hotness: u64,
    /// Row index cell, `*` when the row has none.
    pub index_or_wildcard: String,
}

impl ListingSummary {
    pub fn metrics(&self) -> RowMetrics {
        RowMetrics {
            age_days: self.age_days,
            hotness: self.hotness,
        }
    }
}

/// Fields read from an item's detail page.
///
/// Invariant: `price_usdt >= price_btc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDetail {
    pub price_usdt: f64,
    pub price_btc: f64,
    #[serde(with = "timestamp_format")]
    pub last_update: NaiveDateTime,
    #[serde(with = "timestamp_format")]
    pub up_since: NaiveDateTime,
    pub status: String,
    pub type_label: String,
    pub oversell_cap: u64,
    pub sold_count: u64,
    pub age_days: u64,
    pub hotness: u64,
}

/// Sales figures shown on a vendor profile.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileStats {
    pub sales_count: u64,
    pub total_sales: f64,
    pub total_buys: f64,
}

/// A vendor's identity and aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorProfile {
    pub uid: u64,
    pub sid: u64,
    pub username: String,
    pub sales_count: u64,
    pub total_sales: f64,
    pub total_buys: f64,
    pub registered_on: NaiveDate,
}

/// A listing area linked from the index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCategory {
    pub code: String,
    pub label: String,
}

/// A best-effort value plus whether it is a fallback for a failed read.
///
/// Lets callers tell a genuine zero from a masked failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Extracted<T> {
    pub value: T,
    pub degraded: bool,
}

impl<T> Extracted<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            degraded: false,
        }
    }

    pub fn degraded(value: T) -> Self {
        Self {
            value,
            degraded: true,
        }
    }
}
