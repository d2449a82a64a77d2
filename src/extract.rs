use anyhow::{Context, Result};
use log::{info, warn};
use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::config::Config;

// ============================================================================
// VEHICLE RECORD
// ============================================================================

/// One candidate listing pulled off the inventory page.
///
/// Every field is optional: the page is free to omit any of them, and a
/// missing or unparseable value stays absent rather than being defaulted.
/// Records without a VIN are carried through here and dropped by the
/// reconciler, which owns that filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub vin: Option<String>,
    pub title: Option<String>,
    pub price: Option<i64>,
    pub mileage: Option<i64>,
    pub year: Option<i32>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub listing_url: Option<String>,
    pub website_url: Option<String>,
}

/// Anything that can produce a snapshot of currently-listed vehicles.
///
/// The reconciler only depends on this output shape, never on how the
/// snapshot was obtained, so tests feed it hand-built records.
pub trait Extract {
    fn extract(&self) -> Result<Vec<VehicleRecord>>;
}

// ============================================================================
// PAGE EXTRACTOR
// ============================================================================

const TILE_SELECTOR: &str = ".listing-tile-wrapper";
const TITLE_SELECTOR: &str = ".car-name";
const PRICE_SELECTOR: &str = ".price";
const META_SELECTOR: &str = ".car-meta";
const MILEAGE_SELECTOR: &str = ".listing-tile-km p";
const TRANSMISSION_SELECTOR: &str = ".listing-tile-transmission p";
const FUEL_SELECTOR: &str = ".listing-tile-fuel p";

/// Scrapes the dealership's used-inventory page over plain HTTP.
pub struct PageExtractor {
    client: Client,
    inventory_url: String,
    website_url: String,
}

impl PageExtractor {
    pub fn new(config: &Config) -> Result<PageExtractor> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build scraping client")?;

        Ok(PageExtractor {
            client,
            inventory_url: config.inventory_url.clone(),
            website_url: config.website_url.clone(),
        })
    }

    fn fetch_page(&self) -> Result<String> {
        let res = self
            .client
            .get(&self.inventory_url)
            .send()
            .with_context(|| format!("failed to fetch {}", self.inventory_url))?
            .error_for_status()?;
        res.text().map_err(Into::into)
    }
}

impl Extract for PageExtractor {
    /// Fetch the inventory page and parse every listing tile.
    ///
    /// A page that cannot be fetched is logged and reported as an empty
    /// snapshot, not a process failure - downstream, an empty snapshot never
    /// marks anything as removed, so a transient outage cannot wipe the data.
    fn extract(&self) -> Result<Vec<VehicleRecord>> {
        info!("Fetching inventory page: {}", self.inventory_url);

        let html = match self.fetch_page() {
            Ok(html) => html,
            Err(e) => {
                warn!("Inventory page unreachable, treating as zero items: {e:#}");
                return Ok(Vec::new());
            }
        };

        let records = parse_inventory_page(&html, &self.website_url);

        if records.is_empty() {
            if page_confirms_empty(&html) {
                info!("Confirmed: inventory is currently empty.");
            } else {
                warn!("No listing tiles found on the page.");
            }
        } else {
            info!("Found {} listing tiles.", records.len());
        }

        Ok(records)
    }
}

// ============================================================================
// PARSING
// ============================================================================

fn sel(selector: &str) -> Selector {
    // All selectors are compile-time constants
    Selector::parse(selector).unwrap()
}

fn select_text(element: &ElementRef, selector: &str) -> Option<String> {
    element.select(&sel(selector)).next().map(|el| {
        el.text().collect::<String>().trim().to_string()
    })
}

/// Strip every non-digit character, then parse. "45 000 km" -> 45000,
/// "$12,500" -> 12500. Absent when nothing digit-like remains.
fn parse_digits(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Pull a model year out of free text: a standalone 4-digit 19xx/20xx token.
fn year_from_text(text: &str) -> Option<i32> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|tok| tok.len() == 4 && (tok.starts_with("19") || tok.starts_with("20")))
        .and_then(|tok| tok.parse().ok())
}

/// The VIN lives in one of the `.car-meta` spans, prefixed with "VIN".
fn vin_from_metas(tile: &ElementRef) -> Option<String> {
    tile.select(&sel(META_SELECTOR))
        .map(|el| el.text().collect::<String>())
        .find(|text| text.contains("VIN"))
        .map(|text| text.replace("VIN", "").trim().to_uppercase())
        .filter(|vin| !vin.is_empty())
}

fn parse_listing_tile(tile: &ElementRef, website_url: &str) -> VehicleRecord {
    let title = select_text(tile, TITLE_SELECTOR);
    let year = title.as_deref().and_then(year_from_text);

    // Listing URL is reconstructed from the tile's element id
    let listing_url = tile
        .attr("id")
        .filter(|id| !id.is_empty())
        .map(|id| format!("{}/en/used-inventory/vehicle-id{}", website_url, id));

    VehicleRecord {
        vin: vin_from_metas(tile),
        title,
        price: select_text(tile, PRICE_SELECTOR).as_deref().and_then(parse_digits),
        mileage: select_text(tile, MILEAGE_SELECTOR).as_deref().and_then(parse_digits),
        year,
        fuel_type: select_text(tile, FUEL_SELECTOR).filter(|s| !s.is_empty()),
        transmission: select_text(tile, TRANSMISSION_SELECTOR).filter(|s| !s.is_empty()),
        listing_url,
        website_url: Some(website_url.to_string()),
    }
}

/// Parse every listing tile out of an inventory page.
pub fn parse_inventory_page(html: &str, website_url: &str) -> Vec<VehicleRecord> {
    let document = Html::parse_document(html);

    document
        .select(&sel(TILE_SELECTOR))
        .map(|tile| parse_listing_tile(&tile, website_url))
        .collect()
}

/// Best-effort heuristic: does the page itself say the lot is empty?
/// Distinguishes a genuinely empty inventory from a page that failed to
/// render its listings.
pub fn page_confirms_empty(html: &str) -> bool {
    let document = Html::parse_document(html);
    let body_text: String = document.root_element().text().collect();
    body_text.contains("0 Vehicles") || body_text.contains("filtering criteria do not match")
}
