use vendex_core::testutil::{MockFetcher, MockOcr};
use vendex_core::{AppError, ChallengeResponse, Page, PageFetcher};
use vendex_extract::{
    extract_sid, extract_token_and_creation_time, negotiate_session, resolve_challenge,
    resolve_meta_refresh,
};

use crate::common::*;

/// Follow meta refreshes until a non-bounce page comes back.
async fn follow<F: PageFetcher>(fetcher: &F, url: &str) -> Result<Page, AppError> {
    let mut page = fetcher.fetch(url).await?;
    while let Some(next) = resolve_meta_refresh(&page) {
        let next_url = page.join(&next)?;
        page = fetcher.fetch(&next_url).await?;
    }
    Ok(page)
}

#[tokio::test]
async fn bounce_then_login_then_captcha() {
    let fetcher = MockFetcher::with_pages(vec![
        Ok(bounce_page()),
        Ok(Page::new(LOGIN_URL, LOGIN)),
    ]);
    let page = follow(&fetcher, ENTRY_URL).await.unwrap();

    assert_eq!(
        fetcher.requested.lock().unwrap().clone(),
        vec![ENTRY_URL.to_string(), LOGIN_URL.to_string()]
    );

    let handshake = negotiate_session(&page).unwrap();
    let images = MockFetcher::with_image(b"png");
    let response = resolve_challenge(&images, &MockOcr::new("7 3 9 1"), &page).await;
    let ChallengeResponse::Captcha(solution) = &response else {
        panic!("expected a captcha, got {response:?}");
    };
    assert_eq!(solution.code, "7391");
    assert_eq!(solution.confirm_id, "9f8e7d6c5b4a");

    let mut pairs = handshake
        .session
        .login_form()
        .with_credentials("alice", "secret")
        .to_pairs();
    pairs.push(("confirm_code".into(), solution.code.clone()));
    pairs.push(("confirm_id".into(), solution.confirm_id.clone()));

    let after_login = MockFetcher::with_pages(vec![Ok(Page::new(
        "http://market.example/pay/index.php?sid=new77",
        r#"<a href="./index.php?sid=new77">首页</a>"#,
    ))]);
    let landed = after_login
        .submit_form(&handshake.login_url, &pairs)
        .await
        .unwrap();

    let submitted = after_login.submitted.lock().unwrap();
    assert_eq!(submitted[0].0, handshake.login_url);
    assert!(submitted[0].1.contains(&("form_token".into(), "a1b2c3d4e5".into())));

    // the site re-issues the sid after login
    let mut session = handshake.session.clone();
    session.refresh_sid(extract_sid(&landed, &session.sid));
    assert_eq!(session.sid, "new77");
    assert_eq!(session.form_token, "a1b2c3d4e5");
}

#[tokio::test]
async fn failed_ocr_signals_retry() {
    let page = Page::new(LOGIN_URL, LOGIN);
    let images = MockFetcher::with_image(b"png");
    let response = resolve_challenge(&images, &MockOcr::failing("blurred"), &page).await;
    assert!(response.needs_retry());
}

#[tokio::test]
async fn qa_login_page() {
    let page = Page::new(LOGIN_URL, LOGIN_QA);
    let handshake = negotiate_session(&page).unwrap();
    assert_eq!(handshake.session.sid, "0c0c0c");
    assert!(handshake.session.redirect_targets.is_empty());
    assert_eq!(
        handshake.register_url,
        "http://market.example/pay/ucp.php?mode=register"
    );

    let response = resolve_challenge(&MockFetcher::default(), &MockOcr::new("x"), &page).await;
    let ChallengeResponse::QuestionAnswer(qa) = &response else {
        panic!("expected a QA challenge, got {response:?}");
    };
    assert_eq!(qa.question_answer, "暗号7731");
}

#[test]
fn proxy_error_is_retryable_and_structural() {
    let err = negotiate_session(&Page::new(ENTRY_URL, "500 Internal Privoxy Error")).unwrap_err();
    assert!(err.is_retryable());
    assert!(err.is_structural());
}

#[test]
fn already_logged_in_is_main_page_error() {
    let err = negotiate_session(&Page::new(ENTRY_URL, LISTING)).unwrap_err();
    assert!(matches!(err, AppError::MainPageError));
}

#[test]
fn token_rotation_across_pages() {
    let mut session = negotiate_session(&Page::new(LOGIN_URL, LOGIN)).unwrap().session;
    let (token, created) = extract_token_and_creation_time(&Page::new(LOGIN_URL, LOGIN_QA)).unwrap();
    session.rotate_token(token, created);
    assert_eq!(session.form_token, "ffeedd");
    assert_eq!(session.creation_time, "1760781999");
    assert_eq!(session.sid, "5f2a9c0d1e");
}
