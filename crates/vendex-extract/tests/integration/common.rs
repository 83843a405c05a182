use chrono::{NaiveDate, NaiveDateTime};
use vendex_core::Page;

pub const ENTRY_URL: &str = "http://market.example/pay/bcp.php";
pub const LOGIN_URL: &str = "http://market.example/pay/ucp.php?mode=login";
pub const LISTING_URL: &str = "http://market.example/pay/user_area.php?q_ea_id=3";

pub const LOGIN: &str = include_str!("../fixtures/login.html");
pub const LOGIN_QA: &str = include_str!("../fixtures/login_qa.html");
pub const LISTING: &str = include_str!("../fixtures/listing.html");
pub const DETAIL: &str = include_str!("../fixtures/detail.html");
pub const PROFILE: &str = include_str!("../fixtures/profile.html");
pub const INDEX: &str = include_str!("../fixtures/index.html");

/// The page the entry point answers with before the login page.
pub fn bounce_page() -> Page {
    Page::new(
        ENTRY_URL,
        r#"<html><head><meta http-equiv="refresh" content="0;url=bcp.php?mode=login"></head></html>"#,
    )
}

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap()
}
