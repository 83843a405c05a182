use std::sync::LazyLock;

use regex::Regex;
use vendex_core::Page;

static META_REFRESH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta http-equiv="refresh".*?content=".{0,3};(.*?)">"#)
        .expect("valid meta refresh pattern")
});

/// Old names the site still bounces through for the control panel.
const LEGACY_PANEL_PATHS: [&str; 2] = ["bcp.php", "ycp.php"];

const CANONICAL_PANEL_PATH: &str = "ucp.php";

/// Target of a `<meta http-equiv="refresh">` bounce, rewritten to the
/// canonical control-panel path. `None` if the page is not a bounce page.
///
/// The target is returned as written (usually relative); resolve it with
/// [`Page::join`].
pub fn resolve_meta_refresh(page: &Page) -> Option<String> {
    let raw = META_REFRESH_RE.captures(&page.body)?.get(1)?.as_str().trim();
    let mut next = raw.to_string();
    for legacy in LEGACY_PANEL_PATHS {
        next = next.replace(legacy, CANONICAL_PANEL_PATH);
    }
    let next = next.strip_prefix("url=").map(String::from).unwrap_or(next);
    tracing::info!(from = %page.url, next = %next, "Meta refresh");
    Some(next)
}

pub fn is_bounce_page(page: &Page) -> bool {
    META_REFRESH_RE.is_match(&page.body)
}
