use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Comma-separated list of area labels to keep.
pub const FILTER_AREA_VAR: &str = "VENDEX_FILTER_AREA";

/// Path of a JSON file overriding the page layouts.
pub const LAYOUT_FILE_VAR: &str = "VENDEX_LAYOUT_FILE";

/// Allow-list applied to the type categories of the index page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<Vec<String>>", into = "Option<Vec<String>>")]
pub enum AreaFilter {
    /// Keep every category.
    #[default]
    Any,
    /// Keep only categories whose label is listed.
    Only(BTreeSet<String>),
}

impl AreaFilter {
    pub fn only<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AreaFilter::Only(labels.into_iter().map(Into::into).collect())
    }

    /// Parse a comma list (ASCII or full-width commas). A blank list keeps everything.
    pub fn parse_list(raw: &str) -> Self {
        let labels: BTreeSet<String> = raw
            .split([',', '，'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if labels.is_empty() {
            AreaFilter::Any
        } else {
            AreaFilter::Only(labels)
        }
    }

    pub fn allows(&self, label: &str) -> bool {
        match self {
            AreaFilter::Any => true,
            AreaFilter::Only(labels) => labels.contains(label),
        }
    }
}

impl From<Option<Vec<String>>> for AreaFilter {
    fn from(labels: Option<Vec<String>>) -> Self {
        match labels {
            Some(labels) => AreaFilter::only(labels),
            None => AreaFilter::Any,
        }
    }
}

impl From<AreaFilter> for Option<Vec<String>> {
    fn from(filter: AreaFilter) -> Self {
        match filter {
            AreaFilter::Any => None,
            AreaFilter::Only(labels) => Some(labels.into_iter().collect()),
        }
    }
}

/// A table cell by 1-based row and column, counted like CSS `nth-child`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    fn validate(&self, name: &str) -> Result<(), AppError> {
        if self.row == 0 || self.col == 0 {
            return Err(AppError::ConfigError(format!(
                "{name}: cell positions are 1-based, got ({}, {})",
                self.row, self.col
            )));
        }
        Ok(())
    }
}

/// Column positions of a listing table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingLayout {
    /// Selector for the rows' table.
    pub table: String,
    /// Selector for the detail link inside a row.
    pub detail_link: String,
    pub index: usize,
    pub area: usize,
    pub title: usize,
    pub age_days: usize,
    pub hotness: usize,
}

impl Default for ListingLayout {
    fn default() -> Self {
        Self {
            table: "table.m_area_a".to_string(),
            detail_link: "div.length_400 > a.text_p_link".to_string(),
            index: 1,
            area: 3,
            title: 5,
            age_days: 7,
            hotness: 8,
        }
    }
}

/// Cell positions of an item detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailLayout {
    /// Selector for candidate tables; the first one holding a cell wins.
    pub table: String,
    pub price_usdt: CellRef,
    pub price_btc: CellRef,
    pub last_update: CellRef,
    pub last_seen: CellRef,
    pub type_label: CellRef,
    pub status: CellRef,
    pub oversell: CellRef,
    pub sold: CellRef,
    /// Free-text author line carrying the posting date.
    pub author: String,
    pub content: String,
    pub images: String,
}

impl Default for DetailLayout {
    fn default() -> Self {
        Self {
            table: "table".to_string(),
            price_usdt: CellRef::new(3, 4),
            price_btc: CellRef::new(5, 4),
            last_update: CellRef::new(7, 6),
            last_seen: CellRef::new(3, 6),
            type_label: CellRef::new(5, 2),
            status: CellRef::new(7, 2),
            oversell: CellRef::new(9, 2),
            sold: CellRef::new(7, 4),
            author: ".author".to_string(),
            content: ".postbody .content".to_string(),
            images: ".postbody img".to_string(),
        }
    }
}

/// Cell positions of a vendor profile page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileLayout {
    pub table: String,
    /// Table holding the sid cell.
    pub sid_table: String,
    pub uid: CellRef,
    pub sid: CellRef,
    pub username: CellRef,
    pub sales_count: CellRef,
    pub total_sales: CellRef,
    pub total_buys: CellRef,
    pub registered_on: CellRef,
}

impl Default for ProfileLayout {
    fn default() -> Self {
        Self {
            table: ".v_table_2".to_string(),
            sid_table: "table".to_string(),
            uid: CellRef::new(5, 2),
            sid: CellRef::new(3, 2),
            username: CellRef::new(3, 2),
            sales_count: CellRef::new(3, 4),
            total_sales: CellRef::new(5, 4),
            total_buys: CellRef::new(7, 4),
            registered_on: CellRef::new(7, 2),
        }
    }
}

/// Everything the extractors read from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub filter_area: AreaFilter,
    pub listing: ListingLayout,
    pub detail: DetailLayout,
    pub profile: ProfileLayout,
}

impl ExtractorConfig {
    /// Read configuration from environment variables.
    ///
    /// - `VENDEX_LAYOUT_FILE` (optional): JSON file with layout overrides
    /// - `VENDEX_FILTER_AREA` (optional): comma list of area labels, overrides the file
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = match lookup(LAYOUT_FILE_VAR) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(raw) = lookup(FILTER_AREA_VAR) {
            config.filter_area = AreaFilter::parse_list(&raw);
        }
        tracing::debug!(filter = ?config.filter_area, "Extractor config loaded");
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            AppError::ConfigError(format!("Invalid layout file {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let listing = &self.listing;
        for (name, col) in [
            ("listing.index", listing.index),
            ("listing.area", listing.area),
            ("listing.title", listing.title),
            ("listing.age_days", listing.age_days),
            ("listing.hotness", listing.hotness),
        ] {
            if col == 0 {
                return Err(AppError::ConfigError(format!(
                    "{name}: columns are 1-based, got 0"
                )));
            }
        }

        let d = &self.detail;
        for (name, cell) in [
            ("detail.price_usdt", d.price_usdt),
            ("detail.price_btc", d.price_btc),
            ("detail.last_update", d.last_update),
            ("detail.last_seen", d.last_seen),
            ("detail.type_label", d.type_label),
            ("detail.status", d.status),
            ("detail.oversell", d.oversell),
            ("detail.sold", d.sold),
        ] {
            cell.validate(name)?;
        }

        let p = &self.profile;
        for (name, cell) in [
            ("profile.uid", p.uid),
            ("profile.sid", p.sid),
            ("profile.username", p.username),
            ("profile.sales_count", p.sales_count),
            ("profile.total_sales", p.total_sales),
            ("profile.total_buys", p.total_buys),
            ("profile.registered_on", p.registered_on),
        ] {
            cell.validate(name)?;
        }
        Ok(())
    }
}
