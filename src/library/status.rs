//! Download/reading status of a library entry and its stored encoding.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current version of the stored status envelope.
pub const STATUS_FORMAT_VERSION: u32 = 1;

/// Status of one book.
///
/// `Reading` is only entered from `Downloaded`, by the library when reading
/// progress is recorded; the download controller never sets it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BookStatus {
    /// No known state (fresh entry, or a stored value that could not be read).
    #[default]
    Unknown,
    /// Transfer in flight.
    Downloading {
        /// Fraction complete in `[0, 1]`.
        progress: f64,
    },
    /// File stored locally.
    Downloaded,
    /// The fetch failed.
    Failed {
        /// Human-readable failure description.
        message: String,
    },
    /// The user has started reading.
    Reading,
}

impl BookStatus {
    /// `Downloading` with `progress` clamped to `[0, 1]` (NaN becomes 0).
    #[must_use]
    pub fn downloading(progress: f64) -> Self {
        Self::Downloading {
            progress: clamp_unit(progress),
        }
    }

    /// `Failed` with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// True only for `Downloading`, whatever its progress.
    #[must_use]
    pub fn is_downloading(&self) -> bool {
        matches!(self, Self::Downloading { .. })
    }

    /// True only for `Downloaded`.
    #[must_use]
    pub fn is_downloaded(&self) -> bool {
        matches!(self, Self::Downloaded)
    }

    /// Stable lowercase label for logs and listings.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Downloading { .. } => "downloading",
            Self::Downloaded => "downloaded",
            Self::Failed { .. } => "failed",
            Self::Reading => "reading",
        }
    }

    /// Label shown next to a book, e.g. `Downloading... 75%`.
    #[must_use]
    pub fn display_text(&self) -> String {
        match self {
            Self::Unknown => String::new(),
            Self::Downloading { progress } => format!("Downloading... {}%", percent(*progress)),
            Self::Downloaded => "Downloaded".to_string(),
            Self::Failed { message } => format!("Failed: {message}"),
            Self::Reading => "Reading".to_string(),
        }
    }

    /// Encodes into the versioned byte form stored with the entry.
    ///
    /// # Errors
    ///
    /// Returns [`StatusCodecError::Json`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, StatusCodecError> {
        let envelope = EnvelopeRef {
            version: STATUS_FORMAT_VERSION,
            status: self,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Decodes the versioned byte form.
    ///
    /// # Errors
    ///
    /// Returns [`StatusCodecError::UnsupportedVersion`] for envelopes written
    /// by a newer format, and [`StatusCodecError::Json`] for malformed bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, StatusCodecError> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        if envelope.version != STATUS_FORMAT_VERSION {
            return Err(StatusCodecError::UnsupportedVersion(envelope.version));
        }
        Ok(serde_json::from_value(envelope.status)?)
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Downloading { progress } => write!(f, "downloading ({}%)", percent(*progress)),
            Self::Failed { message } => write!(f, "failed ({message})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Errors decoding or encoding a stored status.
#[derive(Debug, Error)]
pub enum StatusCodecError {
    /// Bytes were not a valid status envelope.
    #[error("malformed status encoding: {0}")]
    Json(#[from] serde_json::Error),

    /// Envelope version this build does not understand.
    #[error("unsupported status format version {0} (expected {STATUS_FORMAT_VERSION})")]
    UnsupportedVersion(u32),
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    status: &'a BookStatus,
}

// Status stays untyped until the version is checked.
#[derive(Deserialize)]
struct Envelope {
    version: u32,
    status: serde_json::Value,
}

/// Clamps to `[0, 1]`; NaN maps to 0.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent(progress: f64) -> u8 {
    (clamp_unit(progress) * 100.0) as u8
}
