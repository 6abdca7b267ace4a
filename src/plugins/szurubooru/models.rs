//! wire types for the szurubooru json api
use {
    crate::{
        plugins::szurubooru::NAME,
        resources::{Pool, Post, Safety, Tag, TagCategory},
        utils::parse_iso8601,
    },
    serde::{Deserialize, Serialize},
    serde_json::json,
};

/// a tag as it appears nested inside other resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MicroTag {
    pub names: Vec<String>,
    pub category: String,
    pub usages: i64,
}

/// a post as it appears nested inside other resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MicroPost {
    pub id: i64,
    pub thumbnail_url: String,
}

/// a pool as it appears nested inside other resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MicroPool {
    pub id: i64,
    pub names: Vec<String>,
    pub category: String,
    pub description: String,
    pub post_count: i64,
}

/// a full tag resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WireTag {
    pub version: i64,
    pub names: Vec<String>,
    pub category: String,
    pub usages: i64,
    pub implications: Vec<MicroTag>,
    pub suggestions: Vec<MicroTag>,
    pub creation_time: String,
    pub last_edit_time: String,
    pub description: String,
}

impl WireTag {
    /// the name updates are addressed by
    pub fn primary_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or_default()
    }

    /// convert to the site-agnostic representation
    pub fn to_resource(&self) -> Tag {
        let mut tag = Tag::with_names(self.names.clone(), TagCategory::parse(&self.category));
        tag.implications = self
            .implications
            .iter()
            .map(|implication| {
                Tag::with_names(
                    implication.names.clone(),
                    TagCategory::parse(&implication.category),
                )
            })
            .collect();
        tag
    }
}

/// a full post resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WirePost {
    pub id: i64,
    pub version: i64,
    pub creation_time: String,
    pub last_edit_time: String,
    pub safety: String,
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    /// sha1 of the content
    pub checksum: String,
    #[serde(rename = "checksumMD5")]
    pub checksum_md5: String,
    pub content_url: String,
    pub thumbnail_url: String,
    pub tags: Vec<MicroTag>,
    pub relations: Vec<MicroPost>,
    pub pools: Vec<MicroPool>,
    pub score: i64,
    pub tag_count: i64,
}

impl WirePost {
    /// the source field is newline-joined on the wire
    pub fn sources(&self) -> Vec<String> {
        self.source
            .as_deref()
            .unwrap_or_default()
            .split('\n')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// convert to the site-agnostic representation, carrying the version in
    /// the adapter's extra bag
    pub fn to_resource(&self) -> Post {
        let mut post = Post {
            id: self.id,
            category: NAME.to_owned(),
            tags: self
                .tags
                .iter()
                .map(|tag| Tag::with_names(tag.names.clone(), TagCategory::parse(&tag.category)))
                .collect(),
            sources: self.sources().into(),
            created_at: parse_iso8601(&self.creation_time),
            updated_at: parse_iso8601(&self.last_edit_time),
            safety: Safety::matching(&self.safety).unwrap_or_default(),
            sha1: self.checksum.to_lowercase(),
            md5: self.checksum_md5.to_lowercase(),
            pools: self
                .pools
                .iter()
                .map(|pool| Pool {
                    id: pool.id,
                    names: pool.names.clone().into(),
                    category: pool.category.clone(),
                    description: pool.description.clone(),
                    ..Pool::default()
                })
                .collect(),
            ..Post::default()
        };
        post.set_extra(NAME, "version", json!(self.version));
        post
    }
}

/// a full pool resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WirePool {
    pub id: i64,
    pub version: i64,
    pub names: Vec<String>,
    pub category: String,
    pub description: String,
    pub posts: Vec<MicroPost>,
    pub creation_time: String,
    pub last_edit_time: String,
    pub post_count: i64,
}

impl WirePool {
    /// convert to the site-agnostic representation, carrying the version in
    /// the adapter's extra bag
    pub fn to_resource(&self) -> Pool {
        let mut pool = Pool {
            id: self.id,
            names: self.names.clone().into(),
            category: self.category.clone(),
            description: self.description.clone(),
            posts: self.posts.iter().map(|post| post.id).collect(),
            created_at: parse_iso8601(&self.creation_time),
            updated_at: parse_iso8601(&self.last_edit_time),
            ..Pool::default()
        };
        pool.extra.insert(NAME.to_owned(), json!({ "version": self.version }));
        pool
    }
}

/// a paged search response
#[derive(Debug, Clone, Deserialize)]
pub struct PagedSearch<T> {
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub query: String,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// one reverse-search hit with its perceptual distance
#[derive(Debug, Clone, Deserialize)]
pub struct SimilarPost {
    pub post: WirePost,
    pub distance: f64,
}

/// the reverse-search response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageSearchResult {
    #[serde(alias = "exact_post")]
    pub exact_post: Option<WirePost>,
    #[serde(alias = "similar_posts")]
    pub similar_posts: Vec<SimilarPost>,
}

/// the temporary upload response
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub token: String,
}

/// the server's error envelope
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ErrorEnvelope {
    pub name: String,
    pub title: String,
    pub description: String,
}

/// body of a tag update
#[derive(Debug, Clone, Serialize)]
pub struct TagUpdate {
    pub version: i64,
    pub names: Vec<String>,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implications: Option<Vec<String>>,
}

/// body of a post creation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreate {
    pub tags: Vec<String>,
    pub safety: String,
    pub source: String,
    pub content_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_token: Option<String>,
}

/// body of a post update
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUpdate {
    pub version: i64,
    pub tags: Vec<String>,
    pub safety: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_posts_convert_with_version_in_the_extra_bag() {
        let wire: WirePost = serde_json::from_value(serde_json::json!({
            "id": 50,
            "version": 7,
            "safety": "sketchy",
            "source": "https://a/1\nhttps://b/2\n",
            "checksum": "ABCDEF",
            "checksumMD5": "AA" ,
            "tags": [{"names": ["cat"], "category": "general", "usages": 3}],
            "creationTime": "2024-01-01T00:00:00+00:00"
        }))
        .expect("parse");

        let post = wire.to_resource();
        assert_eq!(post.id, 50);
        assert_eq!(post.category, "szurubooru");
        assert_eq!(post.safety, Safety::Sketchy);
        assert_eq!(post.sources.as_slice(), &["https://a/1", "https://b/2"]);
        assert_eq!(post.sha1, "abcdef");
        assert_eq!(
            post.extra_value(NAME, "version"),
            Some(&serde_json::json!(7))
        );
    }

    #[test]
    fn reverse_search_accepts_both_key_spellings() {
        let camel: ImageSearchResult = serde_json::from_str(
            r#"{"exactPost": null, "similarPosts": [{"post": {"id": 1}, "distance": 0.04}]}"#,
        )
        .expect("camel");
        assert_eq!(camel.similar_posts.len(), 1);

        let snake: ImageSearchResult = serde_json::from_str(
            r#"{"exact_post": {"id": 2}, "similar_posts": []}"#,
        )
        .expect("snake");
        assert_eq!(snake.exact_post.map(|p| p.id), Some(2));
    }

    #[test]
    fn optional_body_fields_are_omitted() {
        let body = PostUpdate {
            version: 7,
            tags: vec!["cat".into()],
            safety: "safe".into(),
            source: String::new(),
            content_token: None,
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert!(value.get("contentToken").is_none());
        assert_eq!(value["version"], 7);
    }
}
