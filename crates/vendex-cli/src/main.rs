use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use scraper::Html;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use vendex_client::fetcher::FetcherOptions;
use vendex_client::{ReqwestFetcher, TesseractOcr};
use vendex_core::traits::{Clock, PageFetcher, SystemClock};
use vendex_core::{ExtractorConfig, Page, RowMetrics};
use vendex_extract::{
    ListingExtractor, ProfileExtractor, extract_type_categories, max_page_count,
    negotiate_session, resolve_challenge, resolve_meta_refresh,
};

/// Meta refresh hops followed before giving up on reaching the login page.
const MAX_REFRESH_HOPS: usize = 5;

#[derive(Parser)]
#[command(name = "vendex", version, about = "Marketplace session handshake and listing extractor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reach the login page and negotiate a session
    Handshake {
        /// Entry URL of the control panel
        #[arg(short, long, env = "VENDEX_ENTRY_URL")]
        url: String,

        /// Proxy for every request, e.g. socks5h://127.0.0.1:9050
        #[arg(long, env = "VENDEX_PROXY")]
        proxy: Option<String>,

        /// Request timeout in seconds
        #[arg(long, env = "VENDEX_TIMEOUT_SECS", default_value_t = 60)]
        timeout: u64,

        /// Path to the tesseract binary
        #[arg(long, env = "VENDEX_TESSERACT", default_value = "tesseract")]
        tesseract: PathBuf,
    },

    /// Print row summaries and detail links of a saved listing page
    Listing {
        #[arg(short, long)]
        file: PathBuf,

        /// URL the page was fetched from, for resolving links
        #[arg(short, long)]
        base_url: String,

        /// Report the page budget of an incremental crawl
        #[arg(long, default_value_t = false)]
        incremental: bool,
    },

    /// Print the fields of a saved item detail page
    Detail {
        #[arg(short, long)]
        file: PathBuf,

        /// Year for dates printed without one (defaults to the current year)
        #[arg(short, long)]
        year: Option<i32>,

        /// Age in days from the item's listing row
        #[arg(long, default_value_t = 0)]
        age_days: u64,

        /// Hotness from the item's listing row
        #[arg(long, default_value_t = 0)]
        hotness: u64,
    },

    /// Print a vendor profile from a saved profile page
    Profile {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print the area categories of a saved index page, after the area filter
    Types {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        base_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vendex=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ExtractorConfig::from_env().context("Invalid extractor configuration")?;

    let output = match cli.command {
        Commands::Handshake {
            url,
            proxy,
            timeout,
            tesseract,
        } => {
            let fetcher = ReqwestFetcher::with_options(FetcherOptions {
                timeout: Duration::from_secs(timeout),
                proxy,
                ..Default::default()
            })
            .context("Failed to create HTTP client")?;
            cmd_handshake(&fetcher, &TesseractOcr::new(tesseract), &url).await?
        }
        Commands::Listing {
            file,
            base_url,
            incremental,
        } => cmd_listing(&config, &read_page(&file, &base_url)?, incremental),
        Commands::Detail {
            file,
            year,
            age_days,
            hotness,
        } => {
            let year = year.unwrap_or_else(|| SystemClock.now().year());
            let metrics = RowMetrics { age_days, hotness };
            cmd_detail(&config, &read_html(&file)?, year, metrics)?
        }
        Commands::Profile { file } => cmd_profile(&config, &read_html(&file)?),
        Commands::Types { file, base_url } => {
            let page = read_page(&file, &base_url)?;
            json!(extract_type_categories(&page, &config.filter_area))
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn read_html(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_page(path: &Path, base_url: &str) -> Result<Page> {
    Ok(Page::new(base_url, read_html(path)?))
}

async fn cmd_handshake(
    fetcher: &ReqwestFetcher,
    ocr: &TesseractOcr,
    url: &str,
) -> Result<serde_json::Value> {
    tracing::info!("Fetching {}", url);
    let mut page = fetcher.fetch(url).await.map_err(|e| anyhow::anyhow!(e))?;

    let mut hops = 0;
    while let Some(next) = resolve_meta_refresh(&page) {
        hops += 1;
        if hops > MAX_REFRESH_HOPS {
            bail!("Gave up after {MAX_REFRESH_HOPS} meta refresh hops");
        }
        let next_url = page.join(&next).map_err(|e| anyhow::anyhow!(e))?;
        page = fetcher
            .fetch(&next_url)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
    }

    let handshake = negotiate_session(&page).map_err(|e| {
        if e.is_retryable() {
            anyhow::anyhow!(e).context("Proxy failure, retry later")
        } else {
            anyhow::anyhow!(e)
        }
    })?;
    let challenge = resolve_challenge(fetcher, ocr, &page).await;
    if challenge.needs_retry() {
        tracing::warn!("Captcha unreadable, submitting the fallback code");
    }

    Ok(json!({
        "session": handshake.session,
        "login_url": handshake.login_url,
        "register_url": handshake.register_url,
        "challenge": challenge,
    }))
}

fn cmd_listing(config: &ExtractorConfig, page: &Page, incremental: bool) -> serde_json::Value {
    let extractor = ListingExtractor::from_config(config);
    let rows: Vec<serde_json::Value> = extractor
        .type_rows(page)
        .map(|row| match extractor.extract_row_summary(&row.markup) {
            Ok(summary) => json!({
                "detail_url": row.detail_url,
                "summary": summary.value,
                "degraded": summary.degraded,
            }),
            Err(e) => json!({ "detail_url": row.detail_url, "error": e.to_string() }),
        })
        .collect();

    tracing::info!(rows = rows.len(), "Listing extracted");
    json!({
        "page_budget": max_page_count(incremental),
        "rows": rows,
    })
}

fn cmd_detail(
    config: &ExtractorConfig,
    body: &str,
    year: i32,
    metrics: RowMetrics,
) -> Result<serde_json::Value> {
    let extractor = ListingExtractor::from_config(config);
    let doc = Html::parse_document(body);

    let up_since = extractor.resolve_up_since(&doc, year, &SystemClock);
    let detail = extractor
        .extract_detail_fields(&doc, year, up_since.value, metrics)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Detail page is missing required fields")?;
    let content = extractor.extract_detail_content(&doc);

    Ok(json!({
        "detail": detail.value,
        "degraded": detail.degraded,
        "up_since_degraded": up_since.degraded,
        "content": content.value,
        "images": extractor.extract_image_urls(&doc),
    }))
}

fn cmd_profile(config: &ExtractorConfig, body: &str) -> serde_json::Value {
    let extractor = ProfileExtractor::from_config(config);
    let default_date = NaiveDate::default();
    let profile = extractor.extract_profile(&Html::parse_document(body), default_date);
    if profile.degraded {
        tracing::warn!("Profile page only partly readable");
    }
    json!({
        "profile": profile.value,
        "degraded": profile.degraded,
    })
}
