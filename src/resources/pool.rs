//! pool resources
use {
    crate::resources::unique::UniqueVec,
    chrono::{DateTime, Utc},
    hashbrown::HashMap,
    serde::{Deserialize, Serialize},
};

/// an ordered collection of posts (comic pages, themed sets)
///
/// cross references are id-valued: a pool owns post ids, not full posts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pool {
    /// the pool id on its origin site
    pub id: i64,
    /// names for this pool, primary first
    #[serde(default)]
    pub names: UniqueVec<String>,
    /// origin category tag
    #[serde(default)]
    pub category: String,
    /// the pool description
    #[serde(default)]
    pub description: String,
    /// ordered member post ids
    #[serde(default)]
    pub posts: Vec<i64>,
    /// creation instant, when known
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// last edit instant, when known
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// adapter-private scratch, keyed by adapter name
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

/// pools are the same entity iff id and origin category match
impl PartialEq for Pool {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.category == other.category
    }
}

impl Pool {
    /// the primary name, empty when unnamed
    pub fn primary_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or_default()
    }
}
