use chrono::NaiveDate;
use scraper::Html;
use vendex_core::normalize::{NO_CEILING, parse_date, parse_float, parse_int};
use vendex_core::{
    AppError, CellRef, ExtractorConfig, Extracted, ProfileLayout, ProfileStats, VendorProfile,
};

use crate::html;

/// Reads a vendor profile page. Every read degrades to zeroed defaults.
#[derive(Debug, Clone, Default)]
pub struct ProfileExtractor {
    layout: ProfileLayout,
}

impl ProfileExtractor {
    pub fn new(layout: ProfileLayout) -> Self {
        Self { layout }
    }

    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(config.profile.clone())
    }

    fn cell(&self, doc: &Html, table: &str, at: CellRef, name: &str) -> Result<String, AppError> {
        let tables = html::selector(table)?;
        html::find_cell(doc, &tables, at)
            .map(html::element_text)
            .ok_or_else(|| {
                AppError::FieldMissing(format!("profile {name} at ({}, {})", at.row, at.col))
            })
    }

    fn profile_cell(&self, doc: &Html, at: CellRef, name: &str) -> Result<String, AppError> {
        self.cell(doc, &self.layout.table, at, name)
    }

    /// `(uid, sid)`; both zero when either cell is missing.
    pub fn extract_identifiers(&self, doc: &Html) -> Extracted<(u64, u64)> {
        let read = || -> Result<Extracted<(u64, u64)>, AppError> {
            let uid = parse_int(&self.profile_cell(doc, self.layout.uid, "uid")?, NO_CEILING);
            let sid = parse_int(
                &self.cell(doc, &self.layout.sid_table, self.layout.sid, "sid")?,
                NO_CEILING,
            );
            tracing::debug!(uid = uid.value, sid = sid.value, "Profile identifiers");
            Ok(Extracted {
                value: (uid.value, sid.value),
                degraded: uid.degraded || sid.degraded,
            })
        };
        read().unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to read profile identifiers");
            Extracted::degraded((0, 0))
        })
    }

    /// Sales statistics and username; zeros and an empty name when a cell is missing.
    pub fn extract_stats(&self, doc: &Html) -> Extracted<(ProfileStats, String)> {
        let read = || -> Result<Extracted<(ProfileStats, String)>, AppError> {
            let l = &self.layout;
            let sales_count = parse_int(&self.profile_cell(doc, l.sales_count, "sales_count")?, NO_CEILING);
            let total_sales = parse_float(&self.profile_cell(doc, l.total_sales, "total_sales")?);
            let total_buys = parse_float(&self.profile_cell(doc, l.total_buys, "total_buys")?);
            let username = self.profile_cell(doc, l.username, "username")?;

            let stats = ProfileStats {
                sales_count: sales_count.value,
                total_sales: total_sales.value,
                total_buys: total_buys.value,
            };
            tracing::debug!(?stats, username, "Profile stats");
            Ok(Extracted {
                value: (stats, username),
                degraded: sales_count.degraded || total_sales.degraded || total_buys.degraded,
            })
        };
        read().unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to read profile stats");
            Extracted::degraded((ProfileStats::default(), String::new()))
        })
    }

    /// Registration date, or `default` when it cannot be read.
    pub fn extract_registration_date(&self, doc: &Html, default: NaiveDate) -> Extracted<NaiveDate> {
        let raw = match self.profile_cell(doc, self.layout.registered_on, "registered_on") {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read registration date");
                return Extracted::degraded(default);
            }
        };
        match parse_date(&raw) {
            Some(date) => Extracted::ok(date),
            None => {
                tracing::error!(raw, "Unparseable registration date");
                Extracted::degraded(default)
            }
        }
    }

    /// The whole profile; degraded if any part was.
    pub fn extract_profile(&self, doc: &Html, default_date: NaiveDate) -> Extracted<VendorProfile> {
        let ids = self.extract_identifiers(doc);
        let stats = self.extract_stats(doc);
        let registered = self.extract_registration_date(doc, default_date);
        let degraded = ids.degraded || stats.degraded || registered.degraded;

        let (uid, sid) = ids.value;
        let (stats_value, username) = stats.value;
        Extracted {
            value: VendorProfile {
                uid,
                sid,
                username,
                sales_count: stats_value.sales_count,
                total_sales: stats_value.total_sales,
                total_buys: stats_value.total_buys,
                registered_on: registered.value,
            },
            degraded,
        }
    }
}
