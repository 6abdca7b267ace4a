//! contracts implemented by every source site
use {
    crate::{
        error::Result,
        resources::{Post, Safety, Sidecar},
    },
    regex::Regex,
};

/// what a source url points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// a single post
    Post,
    /// an author / user page
    Author,
    /// a pool or gallery
    Pool,
    /// the site root
    Global,
    /// anything unrecognized
    Unknown,
}

/// the immutable attribute record of a site
#[derive(Debug, Clone, Copy)]
pub struct SiteInfo {
    /// unique plugin identifier
    pub name: &'static str,
    /// hostname fragments this site answers to
    pub domains: &'static [&'static str],
    /// site-family strings, as the downloader tags them
    pub categories: &'static [&'static str],
    /// canonical url base, without a trailing slash
    pub url_base: &'static str,
    /// safety assumed when a rating string is unknown
    pub default_safety: Safety,
}

/// a site-specific metadata parser: turns a sidecar into a normalized post
pub trait SourceAdapter: Send + Sync {
    /// the site's attribute record
    fn info(&self) -> &SiteInfo;

    /// parse a sidecar into a normalized post
    ///
    /// fields the site cannot supply are left at their type defaults
    fn parse(&self, sidecar: &Sidecar) -> Result<Post>;
}

/// a site-specific url classifier
pub trait UrlValidator: Send + Sync {
    /// unique plugin identifier
    fn name(&self) -> &'static str;

    /// hostname fragments this validator answers to
    fn domains(&self) -> &'static [&'static str];

    /// classify a url against the site's canonical shapes
    fn classify(&self, url: &str) -> SourceKind;
}

/// compiled url shapes shared by the validators
#[derive(Debug, Default)]
pub struct UrlPatterns {
    /// matches a single post page
    pub post: Option<Regex>,
    /// matches an author page
    pub author: Option<Regex>,
    /// matches a pool page
    pub pool: Option<Regex>,
    /// matches the site root
    pub global: Option<Regex>,
}

impl UrlPatterns {
    /// classify a url, first shape wins
    pub fn classify(&self, url: &str) -> SourceKind {
        if self.post.as_ref().is_some_and(|p| p.is_match(url)) {
            return SourceKind::Post;
        }
        if self.author.as_ref().is_some_and(|p| p.is_match(url)) {
            return SourceKind::Author;
        }
        if self.pool.as_ref().is_some_and(|p| p.is_match(url)) {
            return SourceKind::Pool;
        }
        if self.global.as_ref().is_some_and(|p| p.is_match(url)) {
            return SourceKind::Global;
        }
        SourceKind::Unknown
    }
}

/// fold a site rating string through a mapping table
///
/// # Arguments
///
/// * `raw` - the site's rating string
/// * `table` - pairs of raw rating and normalized safety
/// * `default` - the safety assumed when nothing matches
pub fn map_safety(raw: &str, table: &[(&str, Safety)], default: Safety) -> Safety {
    let lowered = raw.to_lowercase();
    table
        .iter()
        .find(|(rating, _)| *rating == lowered)
        .map(|(_, safety)| *safety)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_shape_wins() {
        let patterns = UrlPatterns {
            post: Some(Regex::new(r"^https://[a-zA-Z0-9.-]+/posts/.+").expect("pattern")),
            global: Some(Regex::new(r"^https://[a-zA-Z0-9.-]+/?$").expect("pattern")),
            ..UrlPatterns::default()
        };

        assert_eq!(
            patterns.classify("https://e621.net/posts/123"),
            SourceKind::Post
        );
        assert_eq!(patterns.classify("https://e621.net/"), SourceKind::Global);
        assert_eq!(
            patterns.classify("https://e621.net/pools/9"),
            SourceKind::Unknown
        );
    }

    #[test]
    fn safety_mapping_falls_back_to_the_site_default() {
        let table = [("s", Safety::Safe), ("e", Safety::Unsafe)];
        assert_eq!(map_safety("S", &table, Safety::Sketchy), Safety::Safe);
        assert_eq!(map_safety("weird", &table, Safety::Sketchy), Safety::Sketchy);
    }
}
