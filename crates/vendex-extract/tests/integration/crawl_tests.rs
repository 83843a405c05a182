use chrono::NaiveDate;
use scraper::Html;
use vendex_core::testutil::FixedClock;
use vendex_core::{AreaFilter, ExtractorConfig, Page};
use vendex_extract::{ListingExtractor, ProfileExtractor, extract_type_categories, max_page_count};

use crate::common::*;

#[test]
fn listing_rows_to_details() {
    let config = ExtractorConfig::default();
    let extractor = ListingExtractor::from_config(&config);
    let clock = FixedClock(at(2026, 10, 18, 12, 0));
    let page = Page::new(LISTING_URL, LISTING);

    let mut details = Vec::new();
    for row in extractor.type_rows(&page) {
        let summary = extractor.extract_row_summary(&row.markup).unwrap();
        // every row points at the same fixture detail page here
        let doc = Html::parse_document(DETAIL);
        let up_since = extractor.resolve_up_since(&doc, 2026, &clock);
        assert!(!up_since.degraded);
        let detail = extractor
            .extract_detail_fields(&doc, 2026, up_since.value, summary.value.metrics())
            .unwrap()
            .value;
        details.push((summary, detail));
    }

    assert_eq!(details.len(), 2);
    assert_eq!(details[0].1.age_days, 12);
    assert_eq!(details[1].1.age_days, 1234);
    // blank hotness cell: zero, but flagged
    assert_eq!(details[1].1.hotness, 0);
    assert!(details[1].0.degraded);
    assert!(!details[0].0.degraded);
    assert!(details.iter().all(|(_, d)| d.price_usdt >= d.price_btc));
    assert_eq!(details[0].1.up_since, at(2024, 3, 5, 12, 34));
}

#[test]
fn detail_record_serializes_with_plain_timestamps() {
    let extractor = ListingExtractor::default();
    let doc = Html::parse_document(DETAIL);
    let detail = extractor
        .extract_detail_fields(&doc, 2026, at(2024, 3, 5, 12, 34), Default::default())
        .unwrap()
        .value;
    let json = serde_json::to_value(&detail).unwrap();
    assert_eq!(json["last_update"], "2026-10-16 09:30:00");
    assert_eq!(json["up_since"], "2024-03-05 12:34:00");
    let back: vendex_core::ListingDetail = serde_json::from_value(json).unwrap();
    assert_eq!(back, detail);
}

#[test]
fn filtered_categories_from_config() {
    let config = ExtractorConfig::from_lookup(|key| {
        (key == vendex_core::config::FILTER_AREA_VAR).then(|| "账号".to_string())
    })
    .unwrap();
    let page = Page::new("http://market.example/pay/index.php", INDEX);
    let kept = extract_type_categories(&page, &config.filter_area);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].code, "7");

    assert_eq!(extract_type_categories(&page, &AreaFilter::Any).len(), 3);
}

#[test]
fn profile_page() {
    let extractor = ProfileExtractor::default();
    let default_date = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
    let profile = extractor.extract_profile(&Html::parse_document(PROFILE), default_date);
    assert!(!profile.degraded);
    assert_eq!(profile.value.uid, 31337);
    assert_eq!(profile.value.sid, 8801);
    assert_eq!(profile.value.username, "vendor_x");
}

#[test]
fn page_budget() {
    assert_eq!(max_page_count(false), 30);
    assert_eq!(max_page_count(true), 1);
}
