//! Listing pages: table rows, item detail pages, and the area index.
//!
//! Row and profile-style reads degrade field by field. Detail reads are
//! all-or-nothing: a half-read price pair or timestamp is worse than no
//! record, so [`ListingExtractor::extract_detail_fields`] returns an error.

use chrono::NaiveDateTime;
use scraper::{Html, Selector};
use vendex_core::normalize::{
    self, DEFAULT_CEILING, NO_CEILING, parse_float, parse_int, parse_timestamp,
    parse_timestamp_in_year,
};
use vendex_core::{
    AppError, AreaFilter, CellRef, Clock, DetailLayout, ExtractorConfig, Extracted, ListingDetail,
    ListingLayout, ListingSummary, Page, RowMetrics, TypeCategory,
};

use crate::html;

/// Pages walked by a full crawl.
pub const FULL_CRAWL_PAGES: u32 = 30;

/// Pages walked by an incremental refresh.
pub const INCREMENTAL_PAGES: u32 = 1;

/// Href prefix of the area links on the index page.
const AREA_LINK_PREFIX: &str = "/pay/user_area.php?q_ea_id=";

/// Link-text suffix ("see more") stripped from area labels.
const MORE_LABEL: &str = "查看更多";

/// Placeholder for a row without an index cell.
const INDEX_WILDCARD: &str = "*";

/// Page budget for a crawl. A policy constant, not read from the page.
pub fn max_page_count(incremental: bool) -> u32 {
    let pages = if incremental {
        INCREMENTAL_PAGES
    } else {
        FULL_CRAWL_PAGES
    };
    tracing::info!(pages, incremental, "Max page count");
    pages
}

/// A listing row that links to a detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRow {
    /// Outer HTML of the `<tr>`.
    pub markup: String,
    /// Absolute detail-page URL.
    pub detail_url: String,
}

/// Rows of one listing page, in document order.
#[derive(Debug, Clone)]
pub struct TypeRows {
    inner: std::vec::IntoIter<TypeRow>,
}

impl Iterator for TypeRows {
    type Item = TypeRow;

    fn next(&mut self) -> Option<TypeRow> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for TypeRows {}

/// Reads listing tables and detail pages using configurable cell positions.
#[derive(Debug, Clone, Default)]
pub struct ListingExtractor {
    listing: ListingLayout,
    detail: DetailLayout,
}

impl ListingExtractor {
    pub fn new(listing: ListingLayout, detail: DetailLayout) -> Self {
        Self { listing, detail }
    }

    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(config.listing.clone(), config.detail.clone())
    }

    /// Rows of the listing table that carry a detail link.
    ///
    /// The rows are collected up front; the iterator only hands them out.
    /// `page` is parsed afresh on every call, so calling twice yields the
    /// same rows. Rows without a link are skipped.
    pub fn type_rows(&self, page: &Page) -> TypeRows {
        let rows = self.collect_rows(page).unwrap_or_else(|e| {
            tracing::error!(url = %page.url, error = %e, "Failed to list rows");
            Vec::new()
        });
        tracing::debug!(url = %page.url, rows = rows.len(), "Listing rows");
        TypeRows {
            inner: rows.into_iter(),
        }
    }

    fn collect_rows(&self, page: &Page) -> Result<Vec<TypeRow>, AppError> {
        let doc = Html::parse_document(&page.body);
        let rows = html::selector(&format!("{} tr", self.listing.table))?;
        let link = html::selector(&self.listing.detail_link)?;

        let mut out = Vec::new();
        for row in doc.select(&rows) {
            let Some(href) = row
                .select(&link)
                .next()
                .and_then(|a| a.value().attr("href"))
            else {
                continue;
            };
            match page.join(href) {
                Ok(detail_url) => out.push(TypeRow {
                    markup: row.html(),
                    detail_url,
                }),
                Err(e) => tracing::warn!(href, error = %e, "Skipping row with bad link"),
            }
        }
        Ok(out)
    }

    /// Summary fields of one row, read from fixed columns.
    ///
    /// A missing column fails this row only. A present but unreadable age or
    /// hotness reads as zero and marks the summary degraded.
    pub fn extract_row_summary(&self, markup: &str) -> Result<Extracted<ListingSummary>, AppError> {
        self.read_row(markup).inspect_err(|e| {
            tracing::error!(error = %e, "Failed to read listing row");
        })
    }

    fn read_row(&self, markup: &str) -> Result<Extracted<ListingSummary>, AppError> {
        let doc = html::parse_row(markup);
        let tr = html::selector("tr")?;
        let row = doc
            .select(&tr)
            .next()
            .ok_or_else(|| AppError::FieldMissing("listing row".into()))?;
        let cells = html::row_cells(row);
        let cell = |col: usize, name: &str| {
            html::nth_cell(&cells, col)
                .ok_or_else(|| AppError::FieldMissing(format!("listing {name} (column {col})")))
        };

        let layout = &self.listing;
        let age_days = count_field(
            &cell(layout.age_days, "age_days")?.replace('天', ""),
            "age_days",
            NO_CEILING,
        );
        let hotness = count_field(&cell(layout.hotness, "hotness")?, "hotness", NO_CEILING);
        let summary = ListingSummary {
            age_days: age_days.value,
            hotness: hotness.value,
            title: cell(layout.title, "title")?,
            area: cell(layout.area, "area")?,
            index_or_wildcard: html::nth_cell(&cells, layout.index)
                .unwrap_or_else(|| INDEX_WILDCARD.to_string()),
        };
        tracing::debug!(?summary, "Row summary");
        Ok(Extracted {
            value: summary,
            degraded: age_days.degraded || hotness.degraded,
        })
    }

    fn detail_tables(&self) -> Result<Selector, AppError> {
        html::selector(&self.detail.table)
    }

    fn detail_cell(&self, doc: &Html, tables: &Selector, cell: CellRef, name: &str) -> Result<String, AppError> {
        html::find_cell(doc, tables, cell)
            .map(html::element_text)
            .ok_or_else(|| {
                AppError::FieldMissing(format!("detail {name} at ({}, {})", cell.row, cell.col))
            })
    }

    /// When the item has been up: the author line's posting date if it
    /// parses, else the last-seen column in `current_year`, else "now".
    pub fn resolve_up_since(&self, doc: &Html, current_year: i32, clock: &impl Clock) -> Extracted<NaiveDateTime> {
        let last_seen = self.detail_tables().ok().and_then(|tables| {
            html::find_cell(doc, &tables, self.detail.last_seen)
                .and_then(|c| parse_timestamp_in_year(&html::element_text(c), current_year))
        });

        let posted = html::selector(&self.detail.author)
            .ok()
            .and_then(|sel| doc.select(&sel).next())
            .map(|el| html::text_excluding(el, &["a", "span"]))
            .and_then(|text| parse_timestamp(&normalize::strip_date_markers(&text)));

        match posted.or(last_seen) {
            Some(ts) => {
                tracing::debug!(up_since = %ts, from_author = posted.is_some(), "Resolved up-since");
                Extracted::ok(ts)
            }
            None => {
                let now = clock.now();
                tracing::warn!(fallback = %now, "No readable up-since date, using now");
                Extracted::degraded(now)
            }
        }
    }

    /// Read an item detail page.
    ///
    /// `current_year` completes the bare `MM-DD HH:MM` dates the site prints;
    /// `up_since` comes from [`resolve_up_since`](Self::resolve_up_since) and
    /// `metrics` from the item's listing row. Prices are swapped when the BTC
    /// figure is the larger one, so `price_usdt >= price_btc` always holds.
    ///
    /// Prices, timestamps and labels are required. An unreadable oversell
    /// cap or sold count reads as zero and marks the detail degraded.
    pub fn extract_detail_fields(
        &self,
        doc: &Html,
        current_year: i32,
        up_since: NaiveDateTime,
        metrics: RowMetrics,
    ) -> Result<Extracted<ListingDetail>, AppError> {
        self.read_detail(doc, current_year, up_since, metrics)
            .inspect_err(|e| tracing::error!(error = %e, "Failed to read detail page"))
    }

    fn read_detail(
        &self,
        doc: &Html,
        current_year: i32,
        up_since: NaiveDateTime,
        metrics: RowMetrics,
    ) -> Result<Extracted<ListingDetail>, AppError> {
        let d = &self.detail;
        let tables = self.detail_tables()?;
        let cell = |at: CellRef, name: &str| self.detail_cell(doc, &tables, at, name);

        let mut price_usdt = required_price(&cell(d.price_usdt, "price_usdt")?, "price_usdt")?;
        let mut price_btc = required_price(&cell(d.price_btc, "price_btc")?, "price_btc")?;
        if price_btc > price_usdt {
            tracing::debug!(price_usdt, price_btc, "Prices swapped in markup, repairing");
            std::mem::swap(&mut price_usdt, &mut price_btc);
        }

        let raw_update = cell(d.last_update, "last_update")?;
        let last_update = parse_timestamp_in_year(&raw_update, current_year)
            .ok_or_else(|| AppError::parse_failure("last_update", raw_update))?;

        let oversell = count_field(&cell(d.oversell, "oversell")?, "oversell", DEFAULT_CEILING);
        let sold = count_field(&cell(d.sold, "sold")?, "sold", DEFAULT_CEILING);
        let detail = ListingDetail {
            price_usdt,
            price_btc,
            last_update,
            up_since,
            type_label: cell(d.type_label, "type_label")?,
            status: cell(d.status, "status")?,
            oversell_cap: oversell.value,
            sold_count: sold.value,
            age_days: metrics.age_days,
            hotness: metrics.hotness,
        };
        tracing::debug!(?detail, "Detail fields");
        Ok(Extracted {
            value: detail,
            degraded: oversell.degraded || sold.degraded,
        })
    }

    /// Post body text with whitespace collapsed; degraded empty when missing.
    pub fn extract_detail_content(&self, doc: &Html) -> Extracted<String> {
        let content = html::selector(&self.detail.content)
            .ok()
            .and_then(|sel| doc.select(&sel).next().map(html::element_text));
        match content {
            Some(text) => Extracted::ok(text),
            None => {
                tracing::warn!(selector = %self.detail.content, "No post content");
                Extracted::degraded(String::new())
            }
        }
    }

    /// `src` of every image in the post body, as written.
    pub fn extract_image_urls(&self, doc: &Html) -> Vec<String> {
        match html::selector(&self.detail.images) {
            Ok(sel) => doc
                .select(&sel)
                .filter_map(|img| img.value().attr("src"))
                .map(String::from)
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read image urls");
                Vec::new()
            }
        }
    }
}

fn count_field(text: &str, field: &str, ceiling: u64) -> Extracted<u64> {
    let count = parse_int(text, ceiling);
    if count.degraded {
        tracing::warn!(field, raw = text, "Unreadable count, using 0");
    }
    count
}

fn required_price(text: &str, field: &str) -> Result<f64, AppError> {
    let price = parse_float(text);
    if price.degraded {
        return Err(AppError::parse_failure(field, text));
    }
    Ok(price.value)
}

/// Area categories linked from the index page, kept if `filter` allows their label.
///
/// Codes are unique; a later link with the same code replaces the label.
/// Failure yields an empty list.
pub fn extract_type_categories(page: &Page, filter: &AreaFilter) -> Vec<TypeCategory> {
    let all = match collect_categories(page) {
        Ok(all) => all,
        Err(e) => {
            tracing::error!(url = %page.url, error = %e, "Failed to read area categories");
            return Vec::new();
        }
    };
    tracing::info!(count = all.len(), "Area categories found");
    let kept: Vec<TypeCategory> = all.into_iter().filter(|c| filter.allows(&c.label)).collect();
    tracing::info!(count = kept.len(), "Area categories after filter");
    kept
}

fn collect_categories(page: &Page) -> Result<Vec<TypeCategory>, AppError> {
    let doc = Html::parse_document(&page.body);
    let links = html::selector(".text_index_top")?;
    let mut out: Vec<TypeCategory> = Vec::new();

    for a in doc.select(&links) {
        let Some(query) = a
            .value()
            .attr("href")
            .and_then(|href| href.strip_prefix(AREA_LINK_PREFIX))
        else {
            continue;
        };
        let code = query.split('&').next().unwrap_or_default().to_string();
        let text = a.text().collect::<String>();
        let Some(first_word) = text.split_whitespace().next() else {
            tracing::warn!(code, "Area link without a label");
            continue;
        };
        let label = first_word.replace(MORE_LABEL, "");

        match out.iter_mut().find(|c| c.code == code) {
            Some(existing) => existing.label = label,
            None => out.push(TypeCategory { code, label }),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use vendex_core::testutil::FixedClock;

    use super::*;

    const LISTING: &str = include_str!("../tests/fixtures/listing.html");
    const DETAIL: &str = include_str!("../tests/fixtures/detail.html");
    const INDEX: &str = include_str!("../tests/fixtures/index.html");
    const BASE: &str = "http://market.example/pay/user_area.php?q_ea_id=3";

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn clock() -> FixedClock {
        FixedClock(ts(2026, 10, 18, 12, 0))
    }

    fn metrics() -> RowMetrics {
        RowMetrics {
            age_days: 12,
            hotness: 340,
        }
    }

    #[test]
    fn test_max_page_count() {
        assert_eq!(max_page_count(false), 30);
        assert_eq!(max_page_count(true), 1);
    }

    #[test]
    fn test_type_rows_skip_rows_without_link() {
        let ex = ListingExtractor::default();
        let rows: Vec<_> = ex.type_rows(&Page::new(BASE, LISTING)).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].detail_url,
            "http://market.example/pay/user_area_detail.php?id=1001"
        );
        assert_eq!(
            rows[1].detail_url,
            "http://market.example/pay/user_area_detail.php?id=1002"
        );
    }

    #[test]
    fn test_type_rows_restartable() {
        let ex = ListingExtractor::default();
        let page = Page::new(BASE, LISTING);
        let first: Vec<_> = ex.type_rows(&page).collect();
        let second: Vec<_> = ex.type_rows(&page).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_type_rows_on_other_page_is_empty() {
        let ex = ListingExtractor::default();
        assert_eq!(ex.type_rows(&Page::new(BASE, "<p>none</p>")).len(), 0);
    }

    #[test]
    fn test_row_summary() {
        let ex = ListingExtractor::default();
        let rows: Vec<_> = ex.type_rows(&Page::new(BASE, LISTING)).collect();
        let summary = ex.extract_row_summary(&rows[0].markup).unwrap();
        assert!(!summary.degraded);
        assert_eq!(
            summary.value,
            ListingSummary {
                area: "数据".into(),
                title: "全新 测试 数据包".into(),
                age_days: 12,
                hotness: 340,
                index_or_wildcard: "1".into(),
            }
        );
        // second row has a blank hotness cell
        let summary = ex.extract_row_summary(&rows[1].markup).unwrap();
        assert!(summary.degraded);
        assert_eq!(summary.value.age_days, 1234);
        assert_eq!(summary.value.hotness, 0);
    }

    #[test]
    fn test_row_summary_blank_counts_differ_from_real_zero() {
        let ex = ListingExtractor::default();
        let row = |age: &str, hot: &str| {
            format!(
                "<tr><td>1</td><td>v</td><td>数据</td><td>x</td><td>t</td><td>-</td><td>{age}</td><td>{hot}</td></tr>"
            )
        };
        let blank = ex.extract_row_summary(&row("暂无", "")).unwrap();
        let zero = ex.extract_row_summary(&row("0天", "0")).unwrap();
        assert_eq!(blank.value, zero.value);
        assert!(blank.degraded);
        assert!(!zero.degraded);
    }

    #[test]
    fn test_row_summary_short_row_fails_alone() {
        let ex = ListingExtractor::default();
        let err = ex
            .extract_row_summary("<tr><td>1</td><td>x</td><td>area</td></tr>")
            .unwrap_err();
        assert!(matches!(err, AppError::FieldMissing(_)));
    }

    #[test]
    fn test_detail_fields() {
        let ex = ListingExtractor::default();
        let doc = Html::parse_document(DETAIL);
        let up = ts(2024, 3, 5, 12, 34);
        let detail = ex.extract_detail_fields(&doc, 2026, up, metrics()).unwrap();
        assert!(!detail.degraded);
        let detail = detail.value;
        assert_eq!(detail.price_usdt, 12.5);
        assert_eq!(detail.price_btc, 0.00021);
        assert_eq!(detail.last_update, ts(2026, 10, 16, 9, 30));
        assert_eq!(detail.up_since, up);
        assert_eq!(detail.type_label, "虚拟物品");
        assert_eq!(detail.status, "在售");
        assert_eq!(detail.oversell_cap, 99_999);
        assert_eq!(detail.sold_count, 57);
        assert_eq!(detail.age_days, 12);
        assert_eq!(detail.hotness, 340);
    }

    #[test]
    fn test_detail_prices_swap_symmetric() {
        let ex = ListingExtractor::default();
        let swapped = DETAIL
            .replace("<span>12.50</span> USDT", "<span>0.00021</span> USDT")
            .replace("0.00021 BTC", "12.50 BTC");
        let up = ts(2024, 3, 5, 12, 34);
        let a = ex
            .extract_detail_fields(&Html::parse_document(DETAIL), 2026, up, metrics())
            .unwrap();
        let b = ex
            .extract_detail_fields(&Html::parse_document(&swapped), 2026, up, metrics())
            .unwrap();
        assert_eq!(a, b);
        assert!(b.value.price_usdt >= b.value.price_btc);
    }

    #[test]
    fn test_detail_missing_price_fails_whole_record() {
        let ex = ListingExtractor::default();
        let broken = DETAIL.replace("0.00021 BTC", "暂无");
        let err = ex
            .extract_detail_fields(&Html::parse_document(&broken), 2026, ts(2026, 1, 1, 0, 0), metrics())
            .unwrap_err();
        assert!(matches!(err, AppError::ParseFailure { ref field, .. } if field == "price_btc"));
    }

    #[test]
    fn test_detail_unreadable_sold_count_degrades() {
        let ex = ListingExtractor::default();
        let body = DETAIL.replace(">57<", ">保密<");
        let detail = ex
            .extract_detail_fields(&Html::parse_document(&body), 2026, ts(2026, 1, 1, 0, 0), metrics())
            .unwrap();
        assert!(detail.degraded);
        assert_eq!(detail.value.sold_count, 0);
        assert_eq!(detail.value.price_usdt, 12.5);
    }

    #[test]
    fn test_detail_time_only_last_update_fails() {
        let ex = ListingExtractor::default();
        let broken = DETAIL.replace("10-16 09:30", "今天 09:30");
        let err = ex
            .extract_detail_fields(&Html::parse_document(&broken), 2026, ts(2026, 1, 1, 0, 0), metrics())
            .unwrap_err();
        assert!(matches!(err, AppError::ParseFailure { ref field, .. } if field == "last_update"));
    }

    #[test]
    fn test_up_since_ignores_time_only_last_seen() {
        let ex = ListingExtractor::default();
        let body = DETAIL
            .replace("2024年03月05日 12:34", "昨天")
            .replace("10-18 14:23", "09:30");
        let up = ex.resolve_up_since(&Html::parse_document(&body), 2026, &clock());
        assert_eq!(up, Extracted::degraded(ts(2026, 10, 18, 12, 0)));
    }

    #[test]
    fn test_detail_bad_last_update_fails() {
        let ex = ListingExtractor::default();
        let broken = DETAIL.replace("10-16 09:30", "很久以前");
        let err = ex
            .extract_detail_fields(&Html::parse_document(&broken), 2026, ts(2026, 1, 1, 0, 0), metrics())
            .unwrap_err();
        assert!(matches!(err, AppError::ParseFailure { ref field, .. } if field == "last_update"));
    }

    #[test]
    fn test_detail_on_empty_page_is_field_missing() {
        let ex = ListingExtractor::default();
        let err = ex
            .extract_detail_fields(&Html::parse_document("<p/>"), 2026, ts(2026, 1, 1, 0, 0), metrics())
            .unwrap_err();
        assert!(matches!(err, AppError::FieldMissing(_)));
    }

    #[test]
    fn test_up_since_prefers_author_line() {
        let ex = ListingExtractor::default();
        let up = ex.resolve_up_since(&Html::parse_document(DETAIL), 2026, &clock());
        assert_eq!(up, Extracted::ok(ts(2024, 3, 5, 12, 34)));
    }

    #[test]
    fn test_up_since_falls_back_to_last_seen() {
        let ex = ListingExtractor::default();
        let no_author = DETAIL.replace("2024年03月05日 12:34", "昨天");
        let up = ex.resolve_up_since(&Html::parse_document(&no_author), 2026, &clock());
        assert_eq!(up, Extracted::ok(ts(2026, 10, 18, 14, 23)));
    }

    #[test]
    fn test_up_since_falls_back_to_now() {
        let ex = ListingExtractor::default();
        let up = ex.resolve_up_since(&Html::parse_document("<p>empty</p>"), 2026, &clock());
        assert_eq!(up, Extracted::degraded(ts(2026, 10, 18, 12, 0)));
    }

    #[test]
    fn test_detail_timestamps_round_trip() {
        let ex = ListingExtractor::default();
        let doc = Html::parse_document(DETAIL);
        let up = ex.resolve_up_since(&doc, 2026, &clock()).value;
        let detail = ex.extract_detail_fields(&doc, 2026, up, metrics()).unwrap().value;
        for t in [detail.last_update, detail.up_since] {
            let text = t.format(vendex_core::models::TIMESTAMP_FORMAT).to_string();
            let back = NaiveDateTime::parse_from_str(&text, vendex_core::models::TIMESTAMP_FORMAT).unwrap();
            assert_eq!(back, t);
        }
    }

    #[test]
    fn test_detail_content_and_images() {
        let ex = ListingExtractor::default();
        let doc = Html::parse_document(DETAIL);
        assert_eq!(
            ex.extract_detail_content(&doc),
            Extracted::ok("本店 出售 测试数据，支持 担保交易。".to_string())
        );
        assert_eq!(
            ex.extract_image_urls(&doc),
            vec!["./files/a1.png", "http://img.example/b2.jpg"]
        );
        let empty = Html::parse_document("<p/>");
        assert!(ex.extract_detail_content(&empty).degraded);
        assert!(ex.extract_image_urls(&empty).is_empty());
    }

    #[test]
    fn test_custom_layout_moves_columns() {
        let layout = ListingLayout {
            title: 4,
            ..ListingLayout::default()
        };
        let ex = ListingExtractor::new(layout, DetailLayout::default());
        let rows: Vec<_> = ex.type_rows(&Page::new(BASE, LISTING)).collect();
        let summary = ex.extract_row_summary(&rows[0].markup).unwrap();
        assert_eq!(summary.value.title, "vendor_x");
    }

    #[test]
    fn test_type_categories_filtered() {
        let page = Page::new("http://market.example/pay/index.php", INDEX);
        let all = extract_type_categories(&page, &AreaFilter::Any);
        assert_eq!(
            all,
            vec![
                TypeCategory { code: "3".into(), label: "数据".into() },
                TypeCategory { code: "7".into(), label: "账号".into() },
                TypeCategory { code: "9".into(), label: "工具".into() },
            ]
        );
        let kept = extract_type_categories(&page, &AreaFilter::only(["数据", "工具"]));
        let codes: Vec<_> = kept.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["3", "9"]);
    }
}
