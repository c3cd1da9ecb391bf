//! # Manifest Parsing
//!
//! Turns an HLS playlist into the fragment list and the section metadata the
//! engine needs.
//!
//! Sections travel as `EXT-X-DATERANGE` tags with client attributes:
//!
//! ```text
//! #EXT-X-DATERANGE:ID="s-12",START-DATE="2024-01-01T00:00:00Z",DURATION=10.0,X-SECTION-ID="12",X-PLAYBACK-ORDER="0"
//! ```
//!
//! Segment structure is parsed with `hls_m3u8`; the date ranges are read
//! straight from the tag lines so client attributes survive verbatim.

use crate::error::LoadError;
use crate::timeline::SectionRange;
use hls_m3u8::tags::VariantStream;
use hls_m3u8::{MasterPlaylist, MediaPlaylist};
use tracing::{debug, warn};
use url::Url;

const DATERANGE_TAG: &str = "#EXT-X-DATERANGE:";
const SECTION_ID_ATTR: &str = "X-SECTION-ID";
const PLAYBACK_ORDER_ATTR: &str = "X-PLAYBACK-ORDER";

/// One media fragment with its absolute URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub url: String,
    pub duration: f64,
}

/// A parsed media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub url: String,
    pub fragments: Vec<Fragment>,
    pub sections: Vec<SectionRange>,
}

impl Manifest {
    pub fn total_duration(&self) -> f64 {
        self.fragments.iter().map(|fragment| fragment.duration).sum()
    }

    pub fn fragment_urls(&self) -> Vec<String> {
        self.fragments
            .iter()
            .map(|fragment| fragment.url.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Playlist {
    /// Variant playlist URLs, resolved against the master's URL.
    Master(Vec<String>),
    Media(Manifest),
}

fn invalid(url: &Url, message: impl Into<String>) -> LoadError {
    LoadError::InvalidResponse {
        url: url.to_string(),
        message: message.into(),
    }
}

fn resolve(base: &Url, uri: &str) -> Result<String, LoadError> {
    base.join(uri)
        .map(|url| url.to_string())
        .map_err(|e| invalid(base, format!("bad URI '{uri}': {e}")))
}

/// Parse a playlist body fetched from `url`.
pub fn parse_playlist(url: &Url, body: &str) -> Result<Playlist, LoadError> {
    if body.contains("#EXT-X-STREAM-INF") {
        return parse_master(url, body).map(Playlist::Master);
    }
    parse_media(url, body).map(Playlist::Media)
}

fn parse_master(url: &Url, body: &str) -> Result<Vec<String>, LoadError> {
    let master = MasterPlaylist::try_from(body).map_err(|e| invalid(url, e.to_string()))?;

    let variants = master
        .variant_streams
        .iter()
        .filter_map(|variant| match variant {
            VariantStream::ExtXStreamInf { uri, .. } => Some(uri.to_string()),
            VariantStream::ExtXIFrame { .. } => None,
        })
        .map(|uri| resolve(url, &uri))
        .collect::<Result<Vec<_>, _>>()?;

    if variants.is_empty() {
        return Err(invalid(url, "master playlist has no variants"));
    }
    Ok(variants)
}

fn parse_media(url: &Url, body: &str) -> Result<Manifest, LoadError> {
    let playlist = MediaPlaylist::try_from(body).map_err(|e| invalid(url, e.to_string()))?;

    let fragments = playlist
        .segments
        .iter()
        .map(|(_, segment)| {
            Ok(Fragment {
                url: resolve(url, segment.uri())?,
                duration: segment.duration.duration().as_secs_f64(),
            })
        })
        .collect::<Result<Vec<_>, LoadError>>()?;

    let sections = parse_section_ranges(body);
    debug!(
        url = %url,
        fragments = fragments.len(),
        sections = sections.len(),
        "Parsed media playlist"
    );

    Ok(Manifest {
        url: url.to_string(),
        fragments,
        sections,
    })
}

/// Collect the section metadata ranges of a media playlist.
///
/// Ranges without a usable `X-SECTION-ID` are skipped. A missing
/// `X-PLAYBACK-ORDER` falls back to the order of appearance.
pub fn parse_section_ranges(body: &str) -> Vec<SectionRange> {
    body.lines()
        .filter_map(|line| line.trim().strip_prefix(DATERANGE_TAG))
        .enumerate()
        .filter_map(|(position, attributes)| {
            let attributes = parse_attribute_list(attributes);
            let lookup = |name: &str| {
                attributes
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.as_str())
            };

            let Some(section_id) = lookup(SECTION_ID_ATTR).and_then(|v| v.parse::<i64>().ok())
            else {
                warn!(attributes = ?attributes, "Date range without a section id");
                return None;
            };
            let duration = lookup("DURATION")
                .or_else(|| lookup("PLANNED-DURATION"))
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or_else(|| {
                    warn!(section_id, "Date range without a duration");
                    0.0
                });
            let playback_order = lookup(PLAYBACK_ORDER_ATTR)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(position as i64);

            Some(SectionRange {
                section_id,
                duration,
                playback_order,
            })
        })
        .collect()
}

/// Split an HLS attribute list (`KEY=value,KEY="quoted, value"`) into
/// pairs, with quotes removed.
fn parse_attribute_list(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut in_quotes = false;

    let mut push = |key: &mut String, value: &mut String| {
        let k = key.trim();
        if !k.is_empty() {
            pairs.push((k.to_string(), value.trim().to_string()));
        }
        key.clear();
        value.clear();
    };

    for c in input.chars() {
        match c {
            '"' if in_value => in_quotes = !in_quotes,
            '=' if !in_value => in_value = true,
            ',' if !in_quotes => {
                push(&mut key, &mut value);
                in_value = false;
            }
            _ if in_value => value.push(c),
            _ => key.push(c),
        }
    }
    push(&mut key, &mut value);
    pairs
}
