//! every recognized configuration option and its type is listed in this file
//!
//! the core never reads configuration from disk on its own; it consumes a
//! resolved [`SyncConfig`] value threaded through constructors. the thin
//! driver binary resolves one from a `booru-sync` config file plus the
//! `BOORU_SYNC_*` environment.
use {
    crate::{error::Result, resources::Safety},
    config::Config,
    serde::Deserialize,
    smart_default::SmartDefault,
    std::path::PathBuf,
};

/// a single entry of a tag filter list
///
/// a bare string matches when the post carries that tag; a nested list is an
/// AND-group that matches only when every member is present at once
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TagFilter {
    /// a single tag name
    One(String),
    /// an AND-group of tag names
    All(Vec<String>),
}

impl TagFilter {
    /// whether the filter matches the given set of tag names
    pub fn matches(&self, names: &hashbrown::HashSet<String>) -> bool {
        match self {
            Self::One(name) => names.contains(name),
            Self::All(group) => !group.is_empty() && group.iter().all(|name| names.contains(name)),
        }
    }
}

/// how log lines are rendered
#[derive(Debug, Clone, Copy, Deserialize, SmartDefault)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFormat {
    /// multi-line output with spans
    Pretty,
    /// single-line output
    #[default]
    Compact,
}

/// Configuration options for logging
#[derive(Debug, Clone, Deserialize, SmartDefault)]
#[serde(default)]
pub struct LoggingOptions {
    /// Enable logging
    #[default(true)]
    pub enable: bool,

    /// Minimum level to log
    #[default("info".to_owned())]
    pub level: String,

    /// Output format
    pub format: LoggingFormat,

    /// Enable ANSI colour in output
    #[default(false)]
    pub ansi: bool,
}

/// Configuration options for the szurubooru destination
#[derive(Debug, Clone, Deserialize, SmartDefault)]
#[serde(default)]
pub struct SzurubooruOptions {
    /// Base URL of the destination instance, without a trailing slash
    pub url_base: String,

    /// Account used for pushes
    pub username: String,

    /// The account's password or API token
    pub password: String,

    /// Perceptual distance below which a reverse-search hit counts as an
    /// effective exact duplicate
    #[default(0.15)]
    pub image_distance_threshold: f64,

    /// Requests allowed against the destination host per 60 second window
    #[default(120)]
    pub rate_limit_per_minute: u32,

    /// Also check `source:` queries before deciding a post is new
    /// (default is md5-only)
    #[default(false)]
    pub source_url_check: bool,

    /// Ceiling on names sent in a single tag update
    #[default(189)]
    pub max_tag_names: usize,
}

/// Configuration for one synchronization run
#[derive(Debug, Clone, Deserialize, SmartDefault)]
#[serde(default)]
pub struct SyncConfig {
    /// The destination plugin to push to
    #[default("szurubooru".to_owned())]
    pub destination: String,

    /// Source URLs to import from
    pub urls: Vec<String>,

    /// Posts carrying any of these are dropped before the existence check
    pub blacklisted_tags: Vec<TagFilter>,

    /// Posts must satisfy every one of these
    pub required_tags: Vec<TagFilter>,

    /// Allowed safety ratings; empty means all
    pub allowed_safety: Vec<Safety>,

    /// Floor on the post score; 0 disables the check
    #[default(0)]
    pub minimum_score: i64,

    /// Consecutive pages without new items tolerated before a URL is
    /// considered exhausted; 0 stops at the first blank page
    #[default(1)]
    pub allowed_blank_pages: u32,

    /// Posts requested from the downloader per page
    #[default(100)]
    pub download_page_size: u64,

    /// Connection cap per host on the shared http session
    #[default(8)]
    pub limit_per_host: usize,

    /// Cookies in Netscape (`.txt`) or flat JSON (`.json`) format
    pub cookies_file: Option<PathBuf>,

    /// Media file extensions that are never fetched
    pub ignored_extensions: Vec<String>,

    /// Scratch folder root; each page job owns a timestamped folder below it
    #[default(PathBuf::from("./tmp"))]
    pub temp_folder: PathBuf,

    /// Installation root, used to locate bundled thumbnails
    #[default(PathBuf::from("."))]
    pub root_folder: PathBuf,

    /// Logging options
    pub logging: LoggingOptions,

    /// Destination options
    pub szurubooru: SzurubooruOptions,
}

impl SyncConfig {
    /// resolve a config from the `booru-sync` file and environment
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(config::File::with_name("booru-sync").required(false))
            .add_source(config::Environment::with_prefix("BOORU_SYNC").separator("__"))
            .build()?;

        Ok(settings.try_deserialize::<SyncConfig>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> hashbrown::HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_filter_matches_membership() {
        let filter = TagFilter::One("cat".into());
        assert!(filter.matches(&names(&["cat", "dog"])));
        assert!(!filter.matches(&names(&["dog"])));
    }

    #[test]
    fn and_group_requires_every_member() {
        let filter = TagFilter::All(vec!["cat".into(), "dog".into()]);
        assert!(filter.matches(&names(&["cat", "dog", "bird"])));
        assert!(!filter.matches(&names(&["cat"])));
        assert!(!TagFilter::All(vec![]).matches(&names(&["cat"])));
    }

    #[test]
    fn filters_deserialize_from_mixed_lists() {
        let parsed: Vec<TagFilter> =
            serde_json::from_str(r#"["banned", ["cat", "dog"]]"#).expect("parse");
        assert_eq!(
            parsed,
            vec![
                TagFilter::One("banned".into()),
                TagFilter::All(vec!["cat".into(), "dog".into()])
            ]
        );
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.destination, "szurubooru");
        assert_eq!(cfg.allowed_blank_pages, 1);
        assert_eq!(cfg.download_page_size, 100);
        assert_eq!(cfg.szurubooru.max_tag_names, 189);
        assert!(!cfg.szurubooru.source_url_check);
    }
}
