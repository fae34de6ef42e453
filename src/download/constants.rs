//! Constants for the download module (timeouts, supported formats).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default per-request timeout: the longest the transfer may sit idle (5 minutes).
pub const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Default total transfer timeout (10 minutes).
pub const RESOURCE_TIMEOUT_SECS: u64 = 600;

/// File extensions the library accepts, lowercase without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["epub", "pdf", "txt", "mobi", "azw3", "fb2"];

/// Returns true if `extension` (lowercase, no dot) is a supported book format.
#[must_use]
pub fn is_supported_extension(extension: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension)
}
