//! the moebooru family source adapter (yande.re, konachan)
use {
    crate::{
        error::Result,
        plugins::source::{
            SiteInfo, SourceAdapter, SourceKind, UrlPatterns, UrlValidator, map_safety,
        },
        resources::{Post, Safety, Sidecar, Tag, TagCategory},
    },
    chrono::DateTime,
    once_cell::sync::Lazy,
    regex::Regex,
};

static INFO: SiteInfo = SiteInfo {
    name: "moebooru",
    domains: &["yande.re", "konachan.com", "konachan.net"],
    categories: &["moebooru", "yandere", "konachan"],
    url_base: "https://yande.re",
    default_safety: Safety::Sketchy,
};

static SAFETY_TABLE: &[(&str, Safety)] = &[
    ("safe", Safety::Safe),
    ("s", Safety::Safe),
    ("questionable", Safety::Sketchy),
    ("q", Safety::Sketchy),
    ("explicit", Safety::Unsafe),
    ("e", Safety::Unsafe),
];

static POST_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://[a-zA-Z0-9.-]+/post/show/\d+").expect("post url pattern"));
static POOL_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://[a-zA-Z0-9.-]+/pool/show/\d+").expect("pool url pattern"));
static GLOBAL_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://[a-zA-Z0-9.-]+/?$").expect("global url pattern"));

/// pick the url base from the downloader's category tag, since the family
/// shares one adapter across sites
fn url_base_for(category: &str) -> &'static str {
    match category {
        "konachan" => "https://konachan.com",
        _ => INFO.url_base,
    }
}

/// the moebooru metadata parser
pub struct Moebooru;

impl Moebooru {
    /// make the adapter
    pub fn new() -> Self {
        Self
    }
}

impl Default for Moebooru {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for Moebooru {
    fn info(&self) -> &SiteInfo {
        &INFO
    }

    fn parse(&self, sidecar: &Sidecar) -> Result<Post> {
        let id = sidecar.i64_field("id").unwrap_or_default();

        let tags: Vec<Tag> = sidecar
            .str_field("tags")
            .unwrap_or_default()
            .split_whitespace()
            .map(|name| Tag::new(name, TagCategory::General))
            .collect();

        let post_url = format!("{}/post/show/{id}", url_base_for(sidecar.category()));
        let mut sources = Vec::new();
        if let Some(source) = sidecar.str_field("source")
            && !source.is_empty()
        {
            sources.push(source.to_owned());
        }
        sources.push(post_url.clone());

        // moebooru timestamps are unix seconds
        let created_at = sidecar
            .i64_field("created_at")
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        let category = if sidecar.category().is_empty() {
            INFO.name.to_owned()
        } else {
            sidecar.category().to_owned()
        };

        Ok(Post {
            id,
            category,
            score: sidecar.i64_field("score").unwrap_or_default(),
            tags,
            sources: sources.into(),
            created_at,
            safety: map_safety(
                sidecar.str_field("rating").unwrap_or_default(),
                SAFETY_TABLE,
                INFO.default_safety,
            ),
            md5: sidecar.str_field("md5").unwrap_or_default().to_lowercase(),
            post_url,
            deleted: sidecar
                .str_field("status")
                .is_some_and(|status| status == "deleted"),
            ..Post::default()
        })
    }
}

/// the moebooru url classifier
pub struct MoebooruValidator {
    patterns: UrlPatterns,
}

impl MoebooruValidator {
    /// make the validator
    pub fn new() -> Self {
        Self {
            patterns: UrlPatterns {
                post: Some(POST_URL.clone()),
                pool: Some(POOL_URL.clone()),
                global: Some(GLOBAL_URL.clone()),
                ..UrlPatterns::default()
            },
        }
    }
}

impl Default for MoebooruValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator for MoebooruValidator {
    fn name(&self) -> &'static str {
        INFO.name
    }

    fn domains(&self) -> &'static [&'static str] {
        INFO.domains
    }

    fn classify(&self, url: &str) -> SourceKind {
        self.patterns.classify(url)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json, std::path::PathBuf};

    #[test]
    fn konachan_posts_get_their_own_url_base() {
        let sidecar = Sidecar::from_value(
            json!({
                "category": "konachan",
                "id": 77,
                "rating": "s",
                "tags": "sky scenery",
                "created_at": 1709372400,
                "md5": "00000000000000000000000000000000",
                "status": "active"
            }),
            PathBuf::new(),
        )
        .expect("sidecar");

        let post = Moebooru.parse(&sidecar).expect("parse");
        assert_eq!(post.post_url, "https://konachan.com/post/show/77");
        assert_eq!(post.safety, Safety::Safe);
        assert!(post.created_at.is_some());
        assert!(!post.deleted);
    }

    #[test]
    fn classifies_canonical_urls() {
        let validator = MoebooruValidator::new();
        assert_eq!(
            validator.classify("https://yande.re/post/show/77"),
            SourceKind::Post
        );
        assert_eq!(
            validator.classify("https://yande.re/pool/show/5"),
            SourceKind::Pool
        );
        assert_eq!(validator.classify("https://yande.re/"), SourceKind::Global);
    }
}
