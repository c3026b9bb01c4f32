//! Pattern extraction over raw page bytes.
//!
//! A miss is never an error: it means the channel cannot be resolved right now.

mod listing;

pub use listing::parse_channel_listing;

use std::sync::LazyLock;

use regex::bytes::Regex;

/// Embedded player frame on a channel's reference page.
pub static EMBED_FRAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"iframe src="(.*?)" width"#).unwrap());

/// Manifest URL inside the player's inline script.
pub static MANIFEST_SOURCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"source:'(.*?)'").unwrap());

/// First capture group of `pattern` in `bytes`, decoded as UTF-8.
///
/// Returns `None` when nothing matches or the capture is not valid UTF-8.
pub fn extract_first(bytes: &[u8], pattern: &Regex) -> Option<String> {
    let capture = pattern.captures(bytes)?.get(1)?;
    std::str::from_utf8(capture.as_bytes())
        .ok()
        .map(ToOwned::to_owned)
}
