//! the gelbooru source adapter
use {
    crate::{
        error::Result,
        plugins::source::{
            SiteInfo, SourceAdapter, SourceKind, UrlPatterns, UrlValidator, map_safety,
        },
        resources::{Post, Safety, Sidecar, Tag, TagCategory},
    },
    chrono::{DateTime, Utc},
    once_cell::sync::Lazy,
    regex::Regex,
};

static INFO: SiteInfo = SiteInfo {
    name: "gelbooru",
    domains: &["gelbooru.com"],
    categories: &["gelbooru"],
    url_base: "https://gelbooru.com",
    default_safety: Safety::Sketchy,
};

static SAFETY_TABLE: &[(&str, Safety)] = &[
    ("general", Safety::Safe),
    ("g", Safety::Safe),
    ("sensitive", Safety::Sketchy),
    ("s", Safety::Sketchy),
    ("questionable", Safety::Sketchy),
    ("q", Safety::Sketchy),
    ("explicit", Safety::Unsafe),
    ("e", Safety::Unsafe),
];

/// gelbooru timestamps look like `Sat Mar 02 10:11:12 +0000 2024`
const DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

static POST_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://[a-zA-Z0-9.-]+/index\.php\?page=post&s=view&id=\d+")
        .expect("post url pattern")
});
static GLOBAL_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://[a-zA-Z0-9.-]+/?$").expect("global url pattern"));

/// undo the handful of html entities gelbooru leaves in tag strings
fn unescape(tag: &str) -> String {
    tag.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
}

/// the gelbooru metadata parser
pub struct Gelbooru;

impl Gelbooru {
    /// make the adapter
    pub fn new() -> Self {
        Self
    }
}

impl Default for Gelbooru {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for Gelbooru {
    fn info(&self) -> &SiteInfo {
        &INFO
    }

    fn parse(&self, sidecar: &Sidecar) -> Result<Post> {
        let id = sidecar.i64_field("id").unwrap_or_default();

        // one flat space-joined tag string, no category information
        let tags: Vec<Tag> = sidecar
            .str_field("tags")
            .unwrap_or_default()
            .split_whitespace()
            .map(|name| Tag::new(unescape(name), TagCategory::General))
            .collect();

        let post_url = format!("{}/index.php?page=post&s=view&id={id}", INFO.url_base);
        let mut sources: Vec<String> = sidecar
            .str_field("source")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        sources.push(post_url.clone());

        let created_at = sidecar.str_field("created_at").and_then(|raw| {
            DateTime::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        });

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
            ..Post::default()
        })
    }
}

/// the gelbooru url classifier
pub struct GelbooruValidator {
    patterns: UrlPatterns,
}

impl GelbooruValidator {
    /// make the validator
    pub fn new() -> Self {
        Self {
            patterns: UrlPatterns {
                post: Some(POST_URL.clone()),
                global: Some(GLOBAL_URL.clone()),
                ..UrlPatterns::default()
            },
        }
    }
}

impl Default for GelbooruValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator for GelbooruValidator {
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
    fn parses_flat_tag_strings() {
        let sidecar = Sidecar::from_value(
            json!({
                "category": "gelbooru",
                "id": 9,
                "rating": "general",
                "tags": "cat night_sky &gt;_&lt;",
                "source": "https://example.com/a https://example.com/b",
                "created_at": "Sat Mar 02 10:11:12 +0000 2024",
                "md5": "abcdefabcdefabcdefabcdefabcdefab"
            }),
            PathBuf::new(),
        )
        .expect("sidecar");

        let post = Gelbooru.parse(&sidecar).expect("parse");
        assert_eq!(post.safety, Safety::Safe);
        assert_eq!(post.tags.len(), 3);
        assert!(post.tags.iter().any(|t| t.primary_name() == ">_<"));
        assert_eq!(post.sources.len(), 3);
        assert!(post.created_at.is_some());
    }

    #[test]
    fn classifies_canonical_urls() {
        let validator = GelbooruValidator::new();
        assert_eq!(
            validator.classify("https://gelbooru.com/index.php?page=post&s=view&id=9"),
            SourceKind::Post
        );
        assert_eq!(
            validator.classify("https://gelbooru.com/"),
            SourceKind::Global
        );
    }
}
