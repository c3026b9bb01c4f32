use m3u8_rs::MasterPlaylist;
use serde::Serialize;
use url::Url;

/// Lines of vertical resolution from which a stream counts as HD.
pub const HD_MIN_HEIGHT: u64 = 720;

/// One variant of a master playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantStream {
    pub resolution_width: Option<u64>,
    pub resolution_height: Option<u64>,
    pub bandwidth: u64,
    /// Absolute URI of the variant's media playlist.
    pub uri: String,
}

impl VariantStream {
    fn resolution(&self) -> Option<(u64, u64)> {
        self.resolution_width.zip(self.resolution_height)
    }

    /// Height first, then width, then bandwidth.
    fn beats(&self, current: &VariantStream) -> bool {
        match (self.resolution(), current.resolution()) {
            (Some((width, height)), Some((best_width, best_height))) => {
                height > best_height
                    || (height == best_height && width > best_width)
                    || (height == best_height
                        && width == best_width
                        && self.bandwidth > current.bandwidth)
            }
            _ => false,
        }
    }

    /// `None` when the variant does not advertise a resolution.
    pub fn is_hd(&self) -> Option<bool> {
        self.resolution_height.map(|height| height >= HD_MIN_HEIGHT)
    }
}

/// Highest-quality variant that advertises a resolution; ties keep the earlier one.
pub fn select_best_variant(variants: &[VariantStream]) -> Option<&VariantStream> {
    variants
        .iter()
        .filter(|variant| variant.resolution().is_some())
        .fold(None, |best, candidate| match best {
            Some(current) if !candidate.beats(current) => Some(current),
            _ => Some(candidate),
        })
}

/// Playable variants of `playlist`, with URIs made absolute against `base_url`.
pub(crate) fn collect_variants(
    playlist: &MasterPlaylist,
    base_url: Option<&Url>,
) -> Vec<VariantStream> {
    playlist
        .variants
        .iter()
        .filter(|variant| !variant.is_i_frame)
        .map(|variant| {
            let uri = base_url
                .and_then(|base| base.join(&variant.uri).ok())
                .map(String::from)
                .unwrap_or_else(|| variant.uri.clone());
            VariantStream {
                resolution_width: variant.resolution.as_ref().map(|r| r.width),
                resolution_height: variant.resolution.as_ref().map(|r| r.height),
                bandwidth: variant.bandwidth,
                uri,
            }
        })
        .collect()
}
