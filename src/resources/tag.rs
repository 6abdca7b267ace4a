//! tag resources and their closed category set
use {
    crate::resources::unique::UniqueVec,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// the closed set of tag categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCategory {
    /// general descriptive tags
    #[default]
    General,
    /// creators of the content
    Artist,
    /// users who uploaded or edited the post
    Contributor,
    /// franchises, series, or original works
    Copyright,
    /// names of characters depicted
    Character,
    /// the species of characters
    Species,
    /// deprecated tags that need correction
    Invalid,
    /// tags about the post itself
    Meta,
    /// background information and worldbuilding
    Lore,
}

impl TagCategory {
    /// fold a raw category string into the closed set; unknown values
    /// become [`TagCategory::General`]
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "artist" => Self::Artist,
            "contributor" => Self::Contributor,
            "copyright" => Self::Copyright,
            "character" => Self::Character,
            "species" => Self::Species,
            "invalid" => Self::Invalid,
            "meta" | "metadata" => Self::Meta,
            "lore" => Self::Lore,
            _ => Self::General,
        }
    }

    /// the wire form of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Artist => "artist",
            Self::Contributor => "contributor",
            Self::Copyright => "copyright",
            Self::Character => "character",
            Self::Species => "species",
            Self::Invalid => "invalid",
            Self::Meta => "meta",
            Self::Lore => "lore",
        }
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// a tag: a set of names (aliases with first-name primacy), a category, and
/// the tags it implies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tag {
    /// names for this tag, primary first
    pub names: UniqueVec<String>,
    /// the tag category
    #[serde(default)]
    pub category: TagCategory,
    /// tags implied by this one
    #[serde(default)]
    pub implications: Vec<Tag>,
}

/// two tags are the same entity iff their name sets intersect
impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.names.iter().any(|name| other.names.contains(name))
    }
}

impl Tag {
    /// make a tag with a single name
    pub fn new(name: impl Into<String>, category: TagCategory) -> Self {
        Self {
            names: UniqueVec::from(vec![name.into()]),
            category,
            implications: Vec::new(),
        }
    }

    /// make a tag from a list of aliases
    pub fn with_names(names: Vec<String>, category: TagCategory) -> Self {
        Self {
            names: UniqueVec::from(names),
            category,
            implications: Vec::new(),
        }
    }

    /// the primary name, empty when the tag is nameless
    pub fn primary_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or_default()
    }

    /// whether the given string is one of this tag's names
    pub fn matches_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// every name of this tag plus the names of its implications
    pub fn all_names(&self) -> Vec<String> {
        let mut names = UniqueVec::new();
        names.extend(self.names.iter().cloned());
        for implication in &self.implications {
            names.extend(implication.names.iter().cloned());
        }
        names.into_iter().collect()
    }

    /// flattened implication names
    pub fn implication_names(&self) -> Vec<String> {
        let mut names = UniqueVec::new();
        for implication in &self.implications {
            names.extend(implication.names.iter().cloned());
        }
        names.into_iter().collect()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.primary_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_sharing_any_name_are_equal() {
        let a = Tag::with_names(vec!["foo".into(), "bar".into()], TagCategory::Character);
        let b = Tag::with_names(vec!["bar".into(), "baz".into()], TagCategory::General);
        let c = Tag::new("qux", TagCategory::Character);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn nameless_tags_never_match() {
        let empty = Tag::default();
        assert_ne!(empty, Tag::default());
        assert_ne!(empty, Tag::new("cat", TagCategory::General));
    }

    #[test]
    fn all_names_flattens_implications() {
        let mut tag = Tag::new("dog", TagCategory::Species);
        tag.implications.push(Tag::new("mammal", TagCategory::Species));
        tag.implications.push(Tag::new("animal", TagCategory::Species));

        assert_eq!(tag.all_names(), vec!["dog", "mammal", "animal"]);
    }

    #[test]
    fn unknown_categories_fold_to_general() {
        assert_eq!(TagCategory::parse("species"), TagCategory::Species);
        assert_eq!(TagCategory::parse("whatever"), TagCategory::General);
    }
}
