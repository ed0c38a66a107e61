//! Wire format for the sentinel markers helpers emit into rendered text.
//!
//! Helpers cannot return structured data through a string template engine, so
//! `role`, `history`, `section` and `media` write markers that the message
//! assembler decodes afterwards:
//!
//! ```text
//! <<<dotprompt:role:system>>>
//! <<<dotprompt:history>>>
//! <<<dotprompt:section examples>>>
//! <<<dotprompt:media:https://example.com/cat.png|image/png>>>
//! ```
//!
//! Text that merely looks like a marker but does not decode stays literal.

use crate::message::Role;
use lazy_static::lazy_static;
use regex::Regex;

const MARKER_PREFIX: &str = "<<<dotprompt:";
const MARKER_SUFFIX: &str = ">>>";

lazy_static! {
    /// Markers that change message flow: role switches and the history slot
    static ref FLOW_MARKER: Regex = Regex::new(r"<<<dotprompt:(?:role:([a-z]+)|(history))>>>")
        .expect("Failed to compile flow marker pattern");

    /// Markers that become non-text parts inside a message
    static ref PART_MARKER: Regex = Regex::new(r"<<<dotprompt:(media:|section )(.*?)>>>")
        .expect("Failed to compile part marker pattern");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Role(Role),
    History,
    Section(String),
    Media {
        url: String,
        content_type: Option<String>,
    },
}

impl Marker {
    pub fn encode(&self) -> String {
        match self {
            Self::Role(role) => role_marker(role.as_str()),
            Self::History => format!("{MARKER_PREFIX}history{MARKER_SUFFIX}"),
            Self::Section(name) => format!("{MARKER_PREFIX}section {name}{MARKER_SUFFIX}"),
            Self::Media {
                url,
                content_type: Some(content_type),
            } => format!("{MARKER_PREFIX}media:{url}|{content_type}{MARKER_SUFFIX}"),
            Self::Media {
                url,
                content_type: None,
            } => format!("{MARKER_PREFIX}media:{url}{MARKER_SUFFIX}"),
        }
    }

    fn decode_media(payload: &str) -> Option<Self> {
        let (url, content_type) = match payload.rsplit_once('|') {
            Some((url, content_type)) if content_type.contains('/') => {
                (url, Some(content_type.to_string()))
            }
            Some((url, "")) => (url, None),
            _ => (payload, None),
        };
        if url.is_empty() {
            return None;
        }
        Some(Self::Media {
            url: url.to_string(),
            content_type,
        })
    }
}

/// Role marker for an arbitrary name; names that are not a `Role` decode as text
pub fn role_marker(name: &str) -> String {
    format!("{MARKER_PREFIX}role:{name}{MARKER_SUFFIX}")
}

/// A slice of rendered text, either literal or a decoded marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Marker(Marker),
}

/// Split `text` around role and history markers
pub fn decode_flow_markers(text: &str) -> Vec<Segment<'_>> {
    split_segments(text, &FLOW_MARKER, |caps| {
        if caps.get(2).is_some() {
            return Some(Marker::History);
        }
        caps.get(1)
            .and_then(|role| role.as_str().parse::<Role>().ok())
            .map(Marker::Role)
    })
}

/// Split `text` around media and section markers
pub fn decode_part_markers(text: &str) -> Vec<Segment<'_>> {
    split_segments(text, &PART_MARKER, |caps| {
        let payload = caps.get(2).map_or("", |m| m.as_str());
        match caps.get(1).map(|m| m.as_str()) {
            Some("media:") => Marker::decode_media(payload),
            Some(_) => {
                let name = payload.trim();
                (!name.is_empty()).then(|| Marker::Section(name.to_string()))
            }
            None => None,
        }
    })
}

fn split_segments<'a>(
    text: &'a str,
    pattern: &Regex,
    decode: impl Fn(&regex::Captures<'_>) -> Option<Marker>,
) -> Vec<Segment<'a>> {
    let mut segments = Vec::new();
    let mut literal_start = 0;

    for caps in pattern.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let Some(marker) = decode(&caps) else {
            continue;
        };
        if whole.start() > literal_start {
            segments.push(Segment::Text(&text[literal_start..whole.start()]));
        }
        segments.push(Segment::Marker(marker));
        literal_start = whole.end();
    }

    if literal_start < text.len() {
        segments.push(Segment::Text(&text[literal_start..]));
    }
    segments
}

/// Guess a media type from a `data:` URL header or the URL's file extension
pub fn infer_content_type(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("data:") {
        let end = rest.find([';', ',']).unwrap_or(rest.len());
        let declared = &rest[..end];
        return (!declared.is_empty()).then(|| declared.to_string());
    }

    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let (_, extension) = file_name.rsplit_once('.')?;

    let content_type = match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "avif" => "image/avif",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        _ => return None,
    };
    Some(content_type.to_string())
}
