//! utilities used across booru-sync
use {
    crate::error::Result,
    md5::Md5,
    sha1::{Digest, Sha1},
    std::path::Path,
    tracing::Level,
};

/// compute the md5 and sha1 digests of a file as lowercase hex
///
/// # Arguments
///
/// * `path` - the file to hash
///
/// # Errors
///
/// returns an error if the file cannot be read
pub fn file_digests(path: &Path) -> Result<(String, String)> {
    let bytes = std::fs::read(path)?;
    let md5 = hex::encode(Md5::digest(&bytes));
    let sha1 = hex::encode(Sha1::digest(&bytes));
    Ok((md5, sha1))
}

/// the file extension of a path, lowercased and without the dot
pub fn file_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// convert a string to a log level
///
/// # Arguments
///
/// * `lvl` - the string rep of the log level
pub fn string_to_log_level(lvl: &str) -> tracing::Level {
    match lvl.to_lowercase().as_str() {
        "d" | "debug" | "dbg" => Level::DEBUG,
        "t" | "trace" | "trc" => Level::TRACE,
        "e" | "error" | "err" => Level::ERROR,
        "i" | "info" | "inf" => Level::INFO,
        "w" | "warn" | "wrn" => Level::WARN,
        _ => Level::INFO,
    }
}

/// the hostname of a url, if it parses
pub fn url_host(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
}

/// parse an iso-8601 timestamp into utc
pub fn parse_iso8601(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}
