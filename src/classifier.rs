//! Best-effort classification of book source URLs.
//!
//! Derives a file name, extension, suggested title and validity from a URL.
//! None of these fail: malformed but harmless input yields empty or fallback
//! values, and the download controller decides what is an error.

use tracing::debug;
use url::Url;

use crate::download::is_supported_extension;

/// Book-oriented accessors on [`Url`].
pub trait BookUrlExt {
    /// Last non-empty path segment, percent-decoded (raw segment if decoding
    /// fails). A trailing slash is ignored.
    fn file_name(&self) -> String;

    /// Extension of [`file_name`](Self::file_name), lowercased; empty if none.
    fn file_extension(&self) -> String;

    /// True if the extension is one of the supported book formats.
    fn is_downloadable_file(&self) -> bool;

    /// Suggested title: file stem with `_`/`-` turned into spaces, or the host
    /// when the stem is too short or purely numeric.
    fn guess_book_title(&self) -> String;

    /// True if the URL has a non-empty scheme and a non-empty host.
    fn is_valid(&self) -> bool;
}

impl BookUrlExt for Url {
    fn file_name(&self) -> String {
        let Some(last) = self
            .path_segments()
            .and_then(|s| s.filter(|segment| !segment.is_empty()).next_back())
        else {
            return String::new();
        };
        match urlencoding::decode(last) {
            Ok(decoded) => decoded.into_owned(),
            Err(e) => {
                debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
                last.to_string()
            }
        }
    }

    fn file_extension(&self) -> String {
        extension_of(&self.file_name()).to_lowercase()
    }

    fn is_downloadable_file(&self) -> bool {
        is_supported_extension(&self.file_extension())
    }

    fn guess_book_title(&self) -> String {
        let name = self.file_name();
        let extension = extension_of(&name);
        let stem = if extension.is_empty() {
            name.as_str()
        } else {
            &name[..name.len() - extension.len() - 1]
        };

        let cleaned = stem.replace(['_', '-'], " ").trim().to_string();

        let too_short = cleaned.chars().count() < 3;
        let only_digits = cleaned.chars().all(char::is_numeric);
        if too_short || only_digits {
            if let Some(host) = self.host_str().filter(|h| !h.is_empty()) {
                return host.strip_prefix("www.").unwrap_or(host).to_string();
            }
        }

        cleaned
    }

    fn is_valid(&self) -> bool {
        !self.scheme().is_empty() && self.host_str().is_some_and(|h| !h.is_empty())
    }
}

/// Parses a user-supplied source string into a URL.
///
/// Returns `None` when the string is not a URL at all; validity beyond that
/// is checked with [`BookUrlExt::is_valid`].
#[must_use]
pub fn parse_source_url(input: &str) -> Option<Url> {
    Url::parse(input.trim()).ok()
}

/// True if `input` parses into a URL with a scheme and a host.
#[must_use]
pub fn is_valid_url(input: &str) -> bool {
    parse_source_url(input).is_some_and(|url| url.is_valid())
}

/// Extension of a file name without the dot, preserving case.
///
/// A name that starts or ends with its only dot has no extension.
fn extension_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => &name[pos + 1..],
        _ => "",
    }
}
