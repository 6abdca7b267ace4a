//! the e621 family source adapter (e621, e926, e6ai)
use {
    crate::{
        error::Result,
        plugins::source::{
            SiteInfo, SourceAdapter, SourceKind, UrlPatterns, UrlValidator, map_safety,
        },
        resources::{Pool, Post, Relationship, Safety, Sidecar, Tag, TagCategory},
        utils::parse_iso8601,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    serde_json::Value,
    tracing::debug,
};

static INFO: SiteInfo = SiteInfo {
    name: "e621",
    domains: &["e621.net", "e926.net", "e6ai.net"],
    categories: &["e621", "e926", "e6ai"],
    url_base: "https://e621.net",
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

static POST_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https://[a-zA-Z0-9.-]+/posts/.+)|^(https://[a-zA-Z0-9.-]+/data/sample/.+)")
        .expect("post url pattern")
});
static POOL_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://[a-zA-Z0-9.-]+/pools/\d+").expect("pool url pattern"));
static GLOBAL_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://[a-zA-Z0-9.-]+/?$").expect("global url pattern"));

/// the e621 metadata parser
pub struct E621;

impl E621 {
    /// make the adapter
    pub fn new() -> Self {
        Self
    }
}

impl Default for E621 {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for E621 {
    fn info(&self) -> &SiteInfo {
        &INFO
    }

    fn parse(&self, sidecar: &Sidecar) -> Result<Post> {
        let id = sidecar.i64_field("id").unwrap_or_default();

        let mut tags = Vec::new();
        if let Some(Value::Object(by_category)) = sidecar.field("tags") {
            for (category, names) in by_category {
                let category = TagCategory::parse(category);
                for name in names.as_array().into_iter().flatten() {
                    if let Some(name) = name.as_str() {
                        tags.push(Tag::new(name, category));
                    }
                }
            }
        }
        debug!(id, count = tags.len(), "found tags");

        let score = sidecar
            .field("score")
            .and_then(|score| score.get("total"))
            .and_then(Value::as_i64)
            .unwrap_or_default();

        let mut sources: Vec<String> = sidecar
            .field("sources")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        let post_url = format!("{}/posts/{id}", INFO.url_base);
        sources.push(post_url.clone());

        let relations = sidecar
            .field("relationships")
            .map(|rel| Relationship {
                parent_id: rel.get("parent_id").and_then(Value::as_i64),
                children: rel
                    .get("children")
                    .and_then(Value::as_array)
                    .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
                    .unwrap_or_default(),
            })
            .unwrap_or_default();

        let pools = sidecar
            .field("pools")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_i64)
                    .map(|id| Pool {
                        id,
                        ..Pool::default()
                    })
                    .collect()
            })
            .unwrap_or_default();

        let md5 = sidecar
            .field("file")
            .and_then(|file| file.get("md5"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();

        let deleted = sidecar
            .field("flags")
            .and_then(|flags| flags.get("deleted"))
            .and_then(Value::as_bool)
            .unwrap_or_default();

        let category = if sidecar.category().is_empty() {
            INFO.name.to_owned()
        } else {
            sidecar.category().to_owned()
        };

        Ok(Post {
            id,
            category,
            description: sidecar.str_field("description").unwrap_or_default().to_owned(),
            score,
            tags,
            sources: sources.into(),
            created_at: sidecar.str_field("created_at").and_then(parse_iso8601),
            updated_at: sidecar.str_field("updated_at").and_then(parse_iso8601),
            relations,
            safety: map_safety(
                sidecar.str_field("rating").unwrap_or_default(),
                SAFETY_TABLE,
                INFO.default_safety,
            ),
            md5,
            post_url,
            pools,
            deleted,
            ..Post::default()
        })
    }
}

/// the e621 url classifier
pub struct E621Validator {
    patterns: UrlPatterns,
}

impl E621Validator {
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

impl Default for E621Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator for E621Validator {
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

    fn sample_sidecar() -> Sidecar {
        Sidecar::from_value(
            json!({
                "category": "e621",
                "id": 123,
                "created_at": "2024-03-01T10:00:00+00:00",
                "updated_at": "2024-03-02T11:30:00+00:00",
                "rating": "s",
                "description": "a cat",
                "score": {"up": 10, "down": -2, "total": 8},
                "tags": {
                    "general": ["cat", "sitting"],
                    "artist": ["someone"],
                    "species": ["felid"]
                },
                "sources": ["https://example.com/art/1"],
                "pools": [55],
                "relationships": {"parent_id": 100, "children": [124, 125]},
                "file": {"md5": "0123456789ABCDEF0123456789abcdef", "ext": "png"},
                "flags": {"deleted": false}
            }),
            PathBuf::from("/tmp/x/123.png.json"),
        )
        .expect("sidecar")
    }

    #[test]
    fn parses_the_full_field_set() {
        let post = E621.parse(&sample_sidecar()).expect("parse");

        assert_eq!(post.id, 123);
        assert_eq!(post.category, "e621");
        assert_eq!(post.score, 8);
        assert_eq!(post.safety, Safety::Safe);
        assert_eq!(post.md5, "0123456789abcdef0123456789abcdef");
        assert_eq!(post.post_url, "https://e621.net/posts/123");
        assert!(post.sources.contains(&post.post_url));
        assert_eq!(post.pools[0].id, 55);
        assert_eq!(post.relations.related_post_ids(), vec![124, 125, 100]);
        assert!(!post.deleted);
        assert!(post.created_at.is_some());

        let species: Vec<_> = post
            .tags
            .iter()
            .filter(|t| t.category == TagCategory::Species)
            .collect();
        assert_eq!(species.len(), 1);
        assert_eq!(species[0].primary_name(), "felid");
    }

    #[test]
    fn unknown_ratings_default_to_sketchy() {
        let sidecar = Sidecar::from_value(
            json!({"id": 1, "rating": "mystery"}),
            PathBuf::new(),
        )
        .expect("sidecar");
        let post = E621.parse(&sidecar).expect("parse");
        assert_eq!(post.safety, Safety::Sketchy);
    }

    #[test]
    fn classifies_canonical_urls() {
        let validator = E621Validator::new();
        assert_eq!(
            validator.classify("https://e621.net/posts/123"),
            SourceKind::Post
        );
        assert_eq!(
            validator.classify("https://e621.net/data/sample/aa/bb/x.png"),
            SourceKind::Post
        );
        assert_eq!(
            validator.classify("https://e621.net/pools/99"),
            SourceKind::Pool
        );
        assert_eq!(validator.classify("https://e621.net/"), SourceKind::Global);
        assert_eq!(
            validator.classify("https://e621.net/help/faq"),
            SourceKind::Unknown
        );
    }
}
