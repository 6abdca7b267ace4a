//! pure reconciliation decisions, kept free of transport so they stay testable
use {
    crate::{
        plugins::szurubooru::models::{SimilarPost, WireTag},
        resources::{Tag, TagCategory, UniqueVec},
    },
    std::cmp::Ordering,
};

/// what happens to the destination tags that share names with an incoming tag
#[derive(Debug)]
pub struct ConflictPlan {
    /// the tag elected to survive as the merge target
    pub primary: WireTag,
    /// conflicting tags with zero usages, cheap to delete outright
    pub delete: Vec<WireTag>,
    /// conflicting tags still in use, merged into the primary server-side
    pub merge: Vec<WireTag>,
}

/// elect the first conflicting tag as primary and sort the rest into
/// deletions and merges
pub fn plan_conflicts(mut conflicts: Vec<WireTag>) -> Option<ConflictPlan> {
    if conflicts.is_empty() {
        return None;
    }
    let primary = conflicts.remove(0);
    let (delete, merge) = conflicts.into_iter().partition(|tag| tag.usages == 0);
    Some(ConflictPlan {
        primary,
        delete,
        merge,
    })
}

/// the state the primary tag should reach
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredTag {
    /// names, primary first, truncated to the server's cap
    pub names: Vec<String>,
    /// wire category
    pub category: String,
    /// flattened implication names, minus any that double as names
    pub implications: Vec<String>,
}

/// merge the primary's current state with the incoming tag (or replace it),
/// truncated to `name_cap` names
///
/// high name counts are known to break the server, hence the cap
pub fn desired_tag(primary: &WireTag, incoming: &Tag, replace: bool, name_cap: usize) -> DesiredTag {
    let mut names = UniqueVec::new();
    if replace {
        names.extend(incoming.names.iter().cloned());
    } else {
        names.extend(primary.names.iter().cloned());
        names.extend(incoming.names.iter().cloned());
    }
    let mut names: Vec<String> = names.into_iter().collect();
    names.truncate(name_cap.max(1));

    let category = if replace || incoming.category != TagCategory::default() {
        incoming.category.as_str().to_owned()
    } else if primary.category.is_empty() {
        TagCategory::default().as_str().to_owned()
    } else {
        primary.category.clone()
    };

    let mut implications = UniqueVec::new();
    if !replace {
        for implication in &primary.implications {
            implications.extend(implication.names.first().cloned());
        }
    }
    implications.extend(incoming.implication_names());
    let implications = implications
        .into_iter()
        .filter(|name| !names.contains(name))
        .collect();

    DesiredTag {
        names,
        category,
        implications,
    }
}

/// whether the primary already matches the desired state
///
/// the first name is compared positionally: rewriting it is an explicit
/// corrective action, never a side effect
pub fn tag_needs_update(primary: &WireTag, desired: &DesiredTag) -> bool {
    if primary.names.first() != desired.names.first() {
        return true;
    }
    let name_sets_match = primary.names.len() == desired.names.len()
        && desired.names.iter().all(|name| primary.names.contains(name));
    if !name_sets_match {
        return true;
    }
    if primary.category != desired.category {
        return true;
    }

    let current_implications: Vec<&String> = primary
        .implications
        .iter()
        .filter_map(|implication| implication.names.first())
        .collect();
    current_implications.len() != desired.implications.len()
        || !desired
            .implications
            .iter()
            .all(|name| current_implications.contains(&name))
}

/// keep reverse-search hits below the distance threshold, closest first
///
/// the closest survivor is treated as an effective exact duplicate
pub fn select_similar(hits: Vec<SimilarPost>, threshold: f64) -> Vec<SimilarPost> {
    let mut close: Vec<SimilarPost> = hits
        .into_iter()
        .filter(|hit| hit.distance < threshold)
        .collect();
    close.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
    close
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::plugins::szurubooru::models::{MicroTag, WirePost},
    };

    fn wire_tag(names: &[&str], category: &str, usages: i64, version: i64) -> WireTag {
        WireTag {
            version,
            names: names.iter().map(|s| s.to_string()).collect(),
            category: category.into(),
            usages,
            ..WireTag::default()
        }
    }

    fn hit(id: i64, distance: f64) -> SimilarPost {
        SimilarPost {
            post: WirePost {
                id,
                ..WirePost::default()
            },
            distance,
        }
    }

    #[test]
    fn unused_conflicts_are_deleted_and_used_ones_merged() {
        let a = wire_tag(&["foo", "baz"], "character", 5, 3);
        let b = wire_tag(&["bar"], "general", 0, 1);
        let c = wire_tag(&["quux"], "general", 2, 8);

        let plan = plan_conflicts(vec![a, b, c]).expect("plan");
        assert_eq!(plan.primary.names, vec!["foo", "baz"]);
        assert_eq!(plan.delete.len(), 1);
        assert_eq!(plan.delete[0].names, vec!["bar"]);
        assert_eq!(plan.merge.len(), 1);
        assert_eq!(plan.merge[0].names, vec!["quux"]);
    }

    #[test]
    fn no_conflicts_means_no_plan() {
        assert!(plan_conflicts(vec![]).is_none());
    }

    #[test]
    fn desired_tag_unions_names_behind_the_primary() {
        let primary = wire_tag(&["foo", "baz"], "general", 5, 3);
        let incoming = Tag::with_names(
            vec!["foo".into(), "bar".into()],
            TagCategory::Character,
        );

        let desired = desired_tag(&primary, &incoming, false, 189);
        assert_eq!(desired.names, vec!["foo", "baz", "bar"]);
        assert_eq!(desired.category, "character");
    }

    #[test]
    fn replace_drops_the_primary_names() {
        let primary = wire_tag(&["foo", "baz"], "general", 5, 3);
        let incoming = Tag::with_names(vec!["foo".into(), "bar".into()], TagCategory::General);

        let desired = desired_tag(&primary, &incoming, true, 189);
        assert_eq!(desired.names, vec!["foo", "bar"]);
    }

    #[test]
    fn names_are_truncated_to_the_cap() {
        let primary = wire_tag(&[], "general", 0, 1);
        let incoming = Tag::with_names(
            (0..300).map(|i| format!("name_{i}")).collect(),
            TagCategory::General,
        );

        let desired = desired_tag(&primary, &incoming, false, 189);
        assert_eq!(desired.names.len(), 189);
    }

    #[test]
    fn implications_doubling_as_names_are_pruned() {
        let primary = wire_tag(&["dog"], "species", 5, 1);
        let mut incoming = Tag::new("dog", TagCategory::Species);
        incoming.implications.push(Tag::new("dog", TagCategory::Species));
        incoming.implications.push(Tag::new("mammal", TagCategory::Species));

        let desired = desired_tag(&primary, &incoming, false, 189);
        assert_eq!(desired.implications, vec!["mammal"]);
    }

    #[test]
    fn matching_tags_skip_the_update() {
        let mut primary = wire_tag(&["dog", "doggo"], "species", 5, 1);
        primary.implications = vec![MicroTag {
            names: vec!["mammal".into()],
            category: "species".into(),
            usages: 0,
        }];

        let mut incoming = Tag::with_names(vec!["doggo".into(), "dog".into()], TagCategory::Species);
        incoming.implications.push(Tag::new("mammal", TagCategory::Species));

        let desired = desired_tag(&primary, &incoming, false, 189);
        assert!(!tag_needs_update(&primary, &desired));
    }

    #[test]
    fn a_reordered_first_name_forces_an_update() {
        let primary = wire_tag(&["dog", "doggo"], "species", 5, 1);
        let desired = DesiredTag {
            names: vec!["doggo".into(), "dog".into()],
            category: "species".into(),
            implications: vec![],
        };
        assert!(tag_needs_update(&primary, &desired));
    }

    #[test]
    fn similar_selection_filters_and_sorts_ascending() {
        let hits = vec![hit(1, 0.2), hit(2, 0.04), hit(3, 0.09), hit(4, 0.1)];
        let close = select_similar(hits, 0.10);

        let ids: Vec<i64> = close.iter().map(|h| h.post.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
