//! the normalized post, the central entity of the pipeline
use {
    crate::{
        error::{Result, SyncError},
        plugins::{
            destination::DestinationAdapter,
            source::{SourceAdapter, SourceKind, UrlValidator},
        },
        resources::{pool::Pool, tag::Tag, unique::UniqueVec},
        utils::{file_digests, url_host},
    },
    chrono::{DateTime, Utc},
    hashbrown::{HashMap, HashSet},
    serde::{Deserialize, Serialize},
    serde_json::Value,
    std::{collections::BTreeMap, fmt, path::PathBuf, sync::Arc},
    tracing::warn,
};

/// the closed safety rating set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Safety {
    /// work safe
    #[default]
    Safe,
    /// borderline
    Sketchy,
    /// adult only
    Unsafe,
}

impl Safety {
    /// fold a raw rating string into the closed set, if it matches
    pub fn matching(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "safe" => Some(Self::Safe),
            "sketchy" => Some(Self::Sketchy),
            "unsafe" => Some(Self::Unsafe),
            _ => None,
        }
    }

    /// the wire form of the rating
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Sketchy => "sketchy",
            Self::Unsafe => "unsafe",
        }
    }
}

impl fmt::Display for Safety {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// parent/child links of a post
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// the parent post id, if any
    #[serde(default)]
    pub parent_id: Option<i64>,
    /// child post ids
    #[serde(default)]
    pub children: Vec<i64>,
}

impl Relationship {
    /// every related post id (children plus the parent)
    pub fn related_post_ids(&self) -> Vec<i64> {
        let mut ids = self.children.clone();
        if let Some(parent) = self.parent_id {
            ids.push(parent);
        }
        ids
    }
}

/// the adapters a post travels with: its source adapter, the destination it
/// is headed for, and every url validator used to classify source links
#[derive(Clone, Default)]
pub struct PluginBundle {
    /// the adapter that parsed this post
    pub source: Option<Arc<dyn SourceAdapter>>,
    /// the destination the post will be pushed to
    pub destination: Option<Arc<dyn DestinationAdapter>>,
    /// every registered url validator
    pub validators: Vec<Arc<dyn UrlValidator>>,
}

impl PluginBundle {
    /// the first validator whose declared domain fragments match the domain
    pub fn find_matching_validator(&self, domain: &str) -> Option<&Arc<dyn UrlValidator>> {
        self.validators
            .iter()
            .find(|validator| validator.domains().iter().any(|fragment| domain.contains(fragment)))
    }
}

impl fmt::Debug for PluginBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginBundle")
            .field("source", &self.source.as_ref().map(|p| p.info().name))
            .field("destination", &self.destination.as_ref().map(|p| p.name()))
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// knobs for [`Post::merge_from`]
#[derive(Debug, Clone, Copy)]
pub struct MergeOptions<'a> {
    /// take the other side's value even when it is a type default
    pub allow_blank: bool,
    /// union sequences instead of replacing them
    pub merge_sequences: bool,
    /// additional fields to leave untouched
    pub ignore: &'a [&'static str],
}

impl Default for MergeOptions<'_> {
    fn default() -> Self {
        Self {
            allow_blank: false,
            merge_sequences: true,
            ignore: &[],
        }
    }
}

/// fields that merge and diff never touch: they are administrative, not
/// user-intended state
const ADMIN_FIELDS: &[&str] = &["plugins", "metadata", "extra", "category", "deleted"];

/// enrichment fields ignored by diff unless a caller asks for them
const DIFF_DEFAULT_IGNORED: &[&str] = &["md5", "sha1", "score", "local_file", "relations"];

/// a normalized post
#[derive(Debug, Clone, Default, Serialize)]
pub struct Post {
    /// the post id on its origin site
    pub id: i64,
    /// origin category tag (which site family produced this post)
    pub category: String,
    /// the post description
    pub description: String,
    /// total vote score on the origin site
    pub score: i64,
    /// tags attached to the post
    pub tags: Vec<Tag>,
    /// source urls, first-seen order, no duplicates
    pub sources: UniqueVec<String>,
    /// creation instant, when known
    pub created_at: Option<DateTime<Utc>>,
    /// last edit instant, when known
    pub updated_at: Option<DateTime<Utc>>,
    /// parent/child links
    pub relations: Relationship,
    /// normalized safety rating
    pub safety: Safety,
    /// lowercase hex md5 of the media, possibly empty
    pub md5: String,
    /// lowercase hex sha1 of the media, possibly empty
    pub sha1: String,
    /// canonical url of the post on its origin site
    pub post_url: String,
    /// pools this post belongs to
    pub pools: Vec<Pool>,
    /// the downloaded media file, once fetched
    pub local_file: Option<PathBuf>,
    /// whether the origin site marks the post deleted
    pub deleted: bool,
    /// adapter-private scratch (content tokens, versions, distances),
    /// keyed by adapter name
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
    /// the adapters this post travels with
    #[serde(skip)]
    pub plugins: PluginBundle,
}

/// posts are the same entity iff id and origin category match
impl PartialEq for Post {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.category == other.category
    }
}

impl Post {
    /// every tag name on the post
    pub fn tag_names(&self) -> HashSet<String> {
        self.tags
            .iter()
            .flat_map(|tag| tag.names.iter().cloned())
            .collect()
    }

    /// the sources whose matching validator classifies them as `kind`
    pub fn sources_of_type(&self, kind: SourceKind) -> Vec<String> {
        self.sources
            .iter()
            .filter(|source| {
                let Some(domain) = url_host(source) else {
                    return false;
                };
                let Some(validator) = self.plugins.find_matching_validator(&domain) else {
                    return false;
                };
                validator.classify(source) == kind
            })
            .cloned()
            .collect()
    }

    /// guarantee `post_url` is part of `sources`
    pub fn ensure_post_url_in_sources(&mut self) {
        if !self.post_url.is_empty() {
            self.sources.push(self.post_url.clone());
        }
    }

    /// recompute hashes from the local file
    ///
    /// pre-filled values that disagree with the file get a warning and are
    /// replaced by the computed digests
    pub fn fill_digests(&mut self) -> Result<()> {
        let Some(path) = self.local_file.clone() else {
            return Ok(());
        };
        if !path.is_file() {
            return Err(SyncError::MissingFile(path));
        }

        let (md5, sha1) = file_digests(&path)?;
        if !self.md5.is_empty() && self.md5 != md5 {
            warn!(id = self.id, expected = %self.md5, computed = %md5, "md5 mismatch, using computed value");
        }
        if !self.sha1.is_empty() && self.sha1 != sha1 {
            warn!(id = self.id, expected = %self.sha1, computed = %sha1, "sha1 mismatch, using computed value");
        }
        self.md5 = md5;
        self.sha1 = sha1;
        Ok(())
    }

    /// adapter-private scratch value
    pub fn extra_value(&self, plugin: &str, key: &str) -> Option<&Value> {
        self.extra.get(plugin).and_then(|bag| bag.get(key))
    }

    /// store an adapter-private scratch value
    pub fn set_extra(&mut self, plugin: &str, key: &str, value: Value) {
        let bag = self
            .extra
            .entry(plugin.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(map) = bag {
            map.insert(key.to_string(), value);
        }
    }

    /// fold the other post's attributes into this one
    ///
    /// scalar fields keep this side's value when the other side holds a type
    /// default (unless `allow_blank`); sequences union in first-seen order
    /// when `merge_sequences`, otherwise replace; administrative fields are
    /// never touched
    pub fn merge_from(&mut self, other: &Post, opts: &MergeOptions) {
        let ignored =
            |field: &str| ADMIN_FIELDS.contains(&field) || opts.ignore.contains(&field);
        let take = |is_default: bool| !is_default || opts.allow_blank;

        if !ignored("id") && take(other.id == 0) {
            self.id = other.id;
        }
        if !ignored("description") && take(other.description.is_empty()) {
            self.description = other.description.clone();
        }
        if !ignored("score") && take(other.score == 0) {
            self.score = other.score;
        }
        if !ignored("created_at") && take(other.created_at.is_none()) {
            self.created_at = other.created_at;
        }
        if !ignored("updated_at") && take(other.updated_at.is_none()) {
            self.updated_at = other.updated_at;
        }
        if !ignored("relations") && take(other.relations == Relationship::default()) {
            self.relations = other.relations.clone();
        }
        if !ignored("safety") && take(other.safety == Safety::default()) {
            self.safety = other.safety;
        }
        if !ignored("md5") && take(other.md5.is_empty()) {
            self.md5 = other.md5.clone();
        }
        if !ignored("sha1") && take(other.sha1.is_empty()) {
            self.sha1 = other.sha1.clone();
        }
        if !ignored("post_url") && take(other.post_url.is_empty()) {
            self.post_url = other.post_url.clone();
        }
        if !ignored("local_file") && take(other.local_file.is_none()) {
            self.local_file = other.local_file.clone();
        }

        if !ignored("tags") {
            if opts.merge_sequences {
                for tag in &other.tags {
                    if !self.tags.contains(tag) {
                        self.tags.push(tag.clone());
                    }
                }
            } else if take(other.tags.is_empty()) {
                self.tags = other.tags.clone();
            }
        }
        if !ignored("sources") {
            if opts.merge_sequences {
                self.sources.extend(other.sources.iter().cloned());
            } else if take(other.sources.is_empty()) {
                self.sources = other.sources.clone();
            }
        }
        if !ignored("pools") {
            if opts.merge_sequences {
                for pool in &other.pools {
                    if !self.pools.contains(pool) {
                        self.pools.push(pool.clone());
                    }
                }
            } else if take(other.pools.is_empty()) {
                self.pools = other.pools.clone();
            }
        }
    }

    /// a deep copy of this post with the other's attributes folded in
    pub fn merged_copy(&self, other: &Post, opts: &MergeOptions) -> Post {
        let mut copy = self.clone();
        copy.merge_from(other, opts);
        copy
    }

    /// field-wise difference against another post
    ///
    /// sequences contribute their set difference, scalars their value on this
    /// side; empty differences are omitted; `fields_to_ignore` is unioned
    /// with the per-type defaults
    pub fn diff(&self, other: &Post, fields_to_ignore: &[&str]) -> BTreeMap<&'static str, Value> {
        let ignored = |field: &str| {
            ADMIN_FIELDS.contains(&field)
                || DIFF_DEFAULT_IGNORED.contains(&field)
                || fields_to_ignore.contains(&field)
        };
        let mut diff = BTreeMap::new();

        macro_rules! scalar {
            ($name:literal, $field:ident) => {
                if !ignored($name) && self.$field != other.$field {
                    diff.insert($name, to_value(&self.$field));
                }
            };
        }

        scalar!("id", id);
        scalar!("description", description);
        scalar!("score", score);
        scalar!("created_at", created_at);
        scalar!("updated_at", updated_at);
        scalar!("relations", relations);
        scalar!("safety", safety);
        scalar!("md5", md5);
        scalar!("sha1", sha1);
        scalar!("post_url", post_url);
        scalar!("local_file", local_file);

        if !ignored("tags") {
            let missing: Vec<&Tag> = self
                .tags
                .iter()
                .filter(|tag| !other.tags.contains(tag))
                .collect();
            if !missing.is_empty() {
                diff.insert("tags", to_value(&missing));
            }
        }
        if !ignored("sources") {
            let missing: Vec<&String> = self
                .sources
                .iter()
                .filter(|source| !other.sources.contains(source))
                .collect();
            if !missing.is_empty() {
                diff.insert("sources", to_value(&missing));
            }
        }
        if !ignored("pools") {
            let missing: Vec<&Pool> = self
                .pools
                .iter()
                .filter(|pool| !other.pools.contains(pool))
                .collect();
            if !missing.is_empty() {
                diff.insert("pools", to_value(&missing));
            }
        }

        diff
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
