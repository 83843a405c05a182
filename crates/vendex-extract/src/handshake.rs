//! Login handshake: session fields, rotating tokens, and the captcha/QA challenge.
//!
//! Structural failures (proxy page, missing login page, missing form fields)
//! propagate because nothing downstream can work without them. Challenge
//! solving never fails: an unsolved captcha comes back as
//! [`CaptchaSolution::fallback`] so the caller can retry the handshake.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use vendex_core::{
    AppError, CaptchaChallenge, CaptchaPrompt, CaptchaSolution, Challenge, ChallengeResponse,
    ImageFetcher, OcrEngine, OcrMode, Page, QaChallenge, Session,
};

use crate::html;

/// Body marker of the local proxy's failure page.
pub const PROXY_ERROR_MARKER: &str = "500 Internal Privoxy Error";

/// Title marker of the control-panel login page.
pub const LOGIN_PAGE_MARKER: &str = "用户控制面板 - 登录";

static SID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"sid=(.*?)""#).expect("valid sid pattern"));

static QA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"请在右边框中输入： (.*?)：</label>").expect("valid qa pattern")
});

static CONFIRM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"confirm_id=(.*?)&").expect("valid confirm_id pattern"));

/// Result of [`negotiate_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub session: Session,
    /// Absolute URL the login form posts to.
    pub login_url: String,
    /// Absolute URL of the registration page.
    pub register_url: String,
}

/// Read the session fields and form URLs from the control-panel login page.
///
/// The proxy check runs before the login-page check.
pub fn negotiate_session(page: &Page) -> Result<Handshake, AppError> {
    negotiate(page).inspect_err(|e| {
        tracing::error!(url = %page.url, error = %e, "Session negotiation failed");
    })
}

fn negotiate(page: &Page) -> Result<Handshake, AppError> {
    if page.body.contains(PROXY_ERROR_MARKER) {
        return Err(AppError::ProxyError);
    }
    if !page.body.contains(LOGIN_PAGE_MARKER) {
        return Err(AppError::MainPageError);
    }
    tracing::info!(url = %page.url, "Reached login page");

    let doc = Html::parse_document(&page.body);
    let session = Session {
        sid: required_input(&doc, "sid")?,
        form_token: required_input(&doc, "form_token")?,
        creation_time: required_input(&doc, "creation_time")?,
        redirect_targets: input_values(&doc, "redirect")?,
    };

    let action = html::attr(&doc, "#login", "action")?
        .ok_or_else(|| AppError::FieldMissing("#login[action]".into()))?;
    let login_url = page.join(&action)?;

    let href = html::attr(&doc, "a.button2", "href")?
        .ok_or_else(|| AppError::FieldMissing("a.button2[href]".into()))?;
    let register_url = page.join(&href)?;

    tracing::debug!(
        sid = %session.sid,
        redirects = session.redirect_targets.len(),
        %login_url,
        %register_url,
        "Session negotiated"
    );

    Ok(Handshake {
        session,
        login_url,
        register_url,
    })
}

fn input_selector(name: &str) -> String {
    format!(r#"input[name="{name}"]"#)
}

fn required_input(doc: &Html, name: &str) -> Result<String, AppError> {
    html::attr(doc, &input_selector(name), "value")?
        .ok_or_else(|| AppError::FieldMissing(format!("input[name={name}]")))
}

fn input_values(doc: &Html, name: &str) -> Result<Vec<String>, AppError> {
    let sel = html::selector(&input_selector(name))?;
    Ok(doc
        .select(&sel)
        .filter_map(|el| el.value().attr("value"))
        .map(String::from)
        .collect())
}

/// Find a sid re-issued inline in any page body, or return `default`.
pub fn extract_sid(page: &Page, default: &str) -> String {
    match SID_RE.captures(&page.body).and_then(|c| c.get(1)) {
        Some(m) => {
            let sid = m.as_str().split('&').next().unwrap_or_default();
            tracing::info!(sid, "Found sid in page");
            sid.to_string()
        }
        None => default.to_string(),
    }
}

/// Re-read the rotating anti-forgery pair `(form_token, creation_time)`.
pub fn extract_token_and_creation_time(page: &Page) -> Option<(String, String)> {
    let read = || -> Result<(String, String), AppError> {
        let doc = Html::parse_document(&page.body);
        Ok((
            required_input(&doc, "form_token")?,
            required_input(&doc, "creation_time")?,
        ))
    };
    match read() {
        Ok((token, creation_time)) => {
            tracing::info!(token, creation_time, "Token pair extracted");
            Some((token, creation_time))
        }
        Err(e) => {
            tracing::warn!(url = %page.url, error = %e, "No token pair on page");
            None
        }
    }
}

fn find_qa(page: &Page) -> Result<QaChallenge, AppError> {
    let question_answer = QA_RE
        .captures(&page.body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| AppError::FieldMissing("qa question".into()))?;
    let doc = Html::parse_document(&page.body);
    let confirm_id = html::attr(&doc, "#qa_confirm_id", "value")?
        .ok_or_else(|| AppError::FieldMissing("#qa_confirm_id".into()))?;
    Ok(QaChallenge {
        question_answer,
        confirm_id,
    })
}

/// Read a question/answer challenge; `None` when either part is absent.
pub fn resolve_qa_challenge(page: &Page) -> Option<QaChallenge> {
    match find_qa(page) {
        Ok(qa) => {
            tracing::info!(answer = %qa.question_answer, confirm_id = %qa.confirm_id, "QA challenge found");
            Some(qa)
        }
        Err(e) => {
            tracing::warn!(url = %page.url, error = %e, "No QA challenge on page");
            None
        }
    }
}

/// Locate the captcha image and its confirm id without fetching anything.
pub fn find_captcha(page: &Page) -> Result<CaptchaPrompt, AppError> {
    let doc = Html::parse_document(&page.body);
    let src = html::attr(&doc, ".captcha > img", "src")?
        .ok_or_else(|| AppError::FieldMissing(".captcha > img[src]".into()))?;
    let confirm_id = CONFIRM_ID_RE
        .captures(&src)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| AppError::parse_failure("confirm_id", src.clone()))?;
    let image_url = page.join(&src)?;
    Ok(CaptchaPrompt {
        confirm_id,
        image_url,
    })
}

async fn solve_prompt<F, O>(fetcher: &F, ocr: &O, prompt: CaptchaPrompt) -> Result<CaptchaSolution, AppError>
where
    F: ImageFetcher,
    O: OcrEngine,
{
    let challenge = CaptchaChallenge {
        image: fetcher.fetch_bytes(&prompt.image_url).await?,
        confirm_id: prompt.confirm_id,
    };
    let code: String = ocr
        .recognize(&challenge.image, OcrMode::DigitsAlnum)?
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if code.is_empty() {
        return Err(AppError::OcrError("recognized no characters".into()));
    }
    tracing::info!(code, confirm_id = %challenge.confirm_id, "Captcha solved");
    Ok(CaptchaSolution {
        code,
        confirm_id: challenge.confirm_id,
    })
}

fn or_fallback(result: Result<CaptchaSolution, AppError>, page: &Page) -> CaptchaSolution {
    result.unwrap_or_else(|e| {
        tracing::error!(url = %page.url, error = %e, "Captcha solve failed, using fallback");
        CaptchaSolution::fallback()
    })
}

/// Fetch the captcha image and OCR it. Any failure yields the fallback pair.
pub async fn resolve_captcha<F, O>(fetcher: &F, ocr: &O, page: &Page) -> CaptchaSolution
where
    F: ImageFetcher,
    O: OcrEngine,
{
    let result = match find_captcha(page) {
        Ok(prompt) => solve_prompt(fetcher, ocr, prompt).await,
        Err(e) => Err(e),
    };
    or_fallback(result, page)
}

/// Which challenge a login page carries. A captcha image wins over a QA prompt.
pub fn detect_challenge(page: &Page) -> Challenge {
    if let Ok(prompt) = find_captcha(page) {
        return Challenge::Captcha(prompt);
    }
    match find_qa(page) {
        Ok(qa) => Challenge::QuestionAnswer(qa),
        Err(_) => {
            tracing::debug!(url = %page.url, "No challenge on page");
            Challenge::None
        }
    }
}

/// Detect and answer the page's challenge in one step.
pub async fn resolve_challenge<F, O>(fetcher: &F, ocr: &O, page: &Page) -> ChallengeResponse
where
    F: ImageFetcher,
    O: OcrEngine,
{
    match detect_challenge(page) {
        Challenge::Captcha(prompt) => {
            let result = solve_prompt(fetcher, ocr, prompt).await;
            ChallengeResponse::Captcha(or_fallback(result, page))
        }
        Challenge::QuestionAnswer(qa) => ChallengeResponse::QuestionAnswer(qa),
        Challenge::None => ChallengeResponse::None,
    }
}
