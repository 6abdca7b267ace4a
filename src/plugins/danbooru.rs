//! the danbooru source adapter
use {
    crate::{
        error::Result,
        plugins::source::{
            SiteInfo, SourceAdapter, SourceKind, UrlPatterns, UrlValidator, map_safety,
        },
        resources::{Post, Safety, Sidecar, Tag, TagCategory},
        utils::parse_iso8601,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    tracing::debug,
};

static INFO: SiteInfo = SiteInfo {
    name: "danbooru",
    domains: &["danbooru.donmai.us", "donmai.us"],
    categories: &["danbooru"],
    url_base: "https://danbooru.donmai.us",
    default_safety: Safety::Sketchy,
};

static SAFETY_TABLE: &[(&str, Safety)] = &[
    ("safe", Safety::Safe),
    ("s", Safety::Safe),
    ("general", Safety::Safe),
    ("g", Safety::Safe),
    ("questionable", Safety::Sketchy),
    ("q", Safety::Sketchy),
    ("explicit", Safety::Unsafe),
    ("e", Safety::Unsafe),
];

static POST_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(https://[a-zA-Z0-9.-]+/posts/.+)|^(https://[a-zA-Z0-9.-]+/sample/.+)|^(https://[a-zA-Z0-9.-]+/original/.+)",
    )
    .expect("post url pattern")
});
static GLOBAL_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://[a-zA-Z0-9.-]+/?$").expect("global url pattern"));

/// the danbooru metadata parser
pub struct Danbooru;

impl Danbooru {
    /// make the adapter
    pub fn new() -> Self {
        Self
    }
}

impl Default for Danbooru {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for Danbooru {
    fn info(&self) -> &SiteInfo {
        &INFO
    }

    fn parse(&self, sidecar: &Sidecar) -> Result<Post> {
        let id = sidecar.i64_field("id").unwrap_or_default();

        // the downloader splits danbooru's tag strings into per-category
        // `tags_<category>` lists
        let mut tags = Vec::new();
        for (key, value) in &sidecar.data {
            let Some(category) = key.strip_prefix("tags_") else {
                continue;
            };
            let category = TagCategory::parse(category);
            for name in value.as_array().into_iter().flatten() {
                if let Some(name) = name.as_str() {
                    tags.push(Tag::new(name, category));
                }
            }
        }
        debug!(id, count = tags.len(), "found tags");

        let mut sources = Vec::new();
        if let Some(source) = sidecar.str_field("source")
            && !source.is_empty()
        {
            sources.push(source.to_owned());
        }
        let post_url = format!("{}/posts/{id}", INFO.url_base);
        sources.push(post_url.clone());

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
            created_at: sidecar.str_field("created_at").and_then(parse_iso8601),
            updated_at: sidecar.str_field("updated_at").and_then(parse_iso8601),
            safety: map_safety(
                sidecar.str_field("rating").unwrap_or_default(),
                SAFETY_TABLE,
                INFO.default_safety,
            ),
            md5: sidecar.str_field("md5").unwrap_or_default().to_lowercase(),
            post_url,
            deleted: sidecar.bool_field("is_deleted").unwrap_or_default(),
            ..Post::default()
        })
    }
}

/// the danbooru url classifier
pub struct DanbooruValidator {
    patterns: UrlPatterns,
}

impl DanbooruValidator {
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

impl Default for DanbooruValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator for DanbooruValidator {
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
    fn parses_per_category_tag_lists() {
        let sidecar = Sidecar::from_value(
            json!({
                "category": "danbooru",
                "id": 42,
                "rating": "q",
                "score": 3,
                "source": "https://twitter.com/a/status/1",
                "md5": "ffffffffffffffffffffffffffffffff",
                "tags_general": ["1girl"],
                "tags_character": ["someone_(series)"],
                "tags_artist": []
            }),
            PathBuf::new(),
        )
        .expect("sidecar");

        let post = Danbooru.parse(&sidecar).expect("parse");
        assert_eq!(post.id, 42);
        assert_eq!(post.safety, Safety::Sketchy);
        assert_eq!(post.tags.len(), 2);
        assert_eq!(post.post_url, "https://danbooru.donmai.us/posts/42");
        assert_eq!(post.sources.len(), 2);
        assert!(
            post.tags
                .iter()
                .any(|t| t.category == TagCategory::Character)
        );
    }

    #[test]
    fn classifies_canonical_urls() {
        let validator = DanbooruValidator::new();
        assert_eq!(
            validator.classify("https://danbooru.donmai.us/posts/42"),
            SourceKind::Post
        );
        assert_eq!(
            validator.classify("https://danbooru.donmai.us/"),
            SourceKind::Global
        );
    }
}
