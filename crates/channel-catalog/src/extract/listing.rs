use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::catalog::ScrapedEntry;

static ITEM_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.grid-item > a").unwrap());
static NAME_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("strong").unwrap());

/// `/stream/stream-51.php` → `51`
static HREF_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\d]+(\d+)\.php").unwrap());

/// Parse the provider's channel listing page into scraped entries, in page order.
///
/// Items without an href, a numeric id or a name are skipped.
pub fn parse_channel_listing(html: &str) -> Vec<ScrapedEntry> {
    let document = Html::parse_document(html);
    let mut entries = Vec::new();

    for item in document.select(&ITEM_SELECTOR) {
        let Some(href) = item.value().attr("href") else {
            warn!("Channel listing item without href, extraction procedure may need updating");
            continue;
        };
        let Some(id) = HREF_ID_REGEX
            .captures(href)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_owned())
        else {
            debug!(href, "Channel listing item without a channel id");
            continue;
        };
        let Some(name) = item
            .select(&NAME_SELECTOR)
            .next()
            .map(|strong| normalize_name(&strong.text().collect::<String>()))
            .filter(|name| !name.is_empty())
        else {
            warn!(href, "Channel listing item without a name, extraction procedure may need updating");
            continue;
        };

        entries.push(ScrapedEntry {
            id,
            name,
            href: href.to_owned(),
        });
    }

    entries
}

/// Collapse whitespace and drop a leading "The " so names line up with the taxonomy.
fn normalize_name(raw: &str) -> String {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match name.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("the ") => name[4..].to_owned(),
        _ => name,
    }
}
