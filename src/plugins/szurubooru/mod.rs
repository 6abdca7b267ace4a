//! the canonical destination adapter: szurubooru
use {
    crate::{
        config::SzurubooruOptions,
        error::{Result, SyncError},
        net::Session,
        plugins::{
            destination::DestinationAdapter,
            source::SourceKind,
            szurubooru::{
                api::SzurubooruApi,
                models::{PostCreate, PostUpdate, TagUpdate, WirePost, WireTag},
                reconcile::DesiredTag,
            },
        },
        resources::{Pool, Post, Tag, UniqueVec},
        utils::file_extension,
    },
    async_trait::async_trait,
    serde_json::{Value, json},
    std::{
        path::PathBuf,
        sync::Arc,
        time::Duration,
    },
    tracing::{debug, info, warn},
};

pub mod api;
pub mod models;
pub mod reconcile;

/// the adapter's unique identifier, also the key of its extra bag
pub const NAME: &str = "szurubooru";

/// how long to wait before the single integrity-error retry; the server has
/// no documented settle time, so this stays tunable
const INTEGRITY_RETRY_DELAY: Duration = Duration::from_secs(10);

/// the szurubooru destination
pub struct SzurubooruDest {
    api: SzurubooruApi,
    options: SzurubooruOptions,
    root_folder: PathBuf,
}

impl SzurubooruDest {
    /// bind the adapter to an instance
    pub fn new(options: SzurubooruOptions, root_folder: PathBuf, session: Arc<Session>) -> Self {
        debug!(url_base = %options.url_base, "loaded szurubooru destination");
        Self {
            api: SzurubooruApi::new(&options, session),
            options,
            root_folder,
        }
    }

    /// the content token for the post's local file, uploading at most once
    /// per pipeline pass
    async fn content_token(&self, post: &mut Post) -> Result<String> {
        if let Some(token) = post
            .extra_value(NAME, "content_token")
            .and_then(Value::as_str)
        {
            return Ok(token.to_owned());
        }

        let Some(file) = post.local_file.clone() else {
            return Err(SyncError::MissingFile(PathBuf::from("<unset>")));
        };
        if !file.is_file() {
            return Err(SyncError::MissingFile(file));
        }

        let token = self.api.upload_file(&file).await?;
        post.set_extra(NAME, "content_token", json!(token));
        Ok(token)
    }

    /// the bundled thumbnail for extensions the browser can't preview
    fn default_thumbnail(&self, extension: &str) -> Option<PathBuf> {
        match extension {
            "swf" => Some(self.root_folder.join("images/thumbnails/swf.png")),
            _ => None,
        }
    }

    /// every tag name on a post plus the update target, deduplicated
    fn merged_tag_names(target: Option<&Post>, post: &Post) -> Vec<String> {
        let mut names = UniqueVec::new();
        if let Some(target) = target {
            names.extend(target.tags.iter().flat_map(|tag| tag.names.iter().cloned()));
        }
        names.extend(post.tags.iter().flat_map(|tag| tag.names.iter().cloned()));
        names.into_iter().collect()
    }

    /// the destination-side version of a previously fetched post
    fn version_of(post: &Post) -> Result<i64> {
        post.extra_value(NAME, "version")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                SyncError::Other(format!("destination post {} carries no version", post.id))
            })
    }

    async fn create_from(&self, post: &mut Post) -> Result<WirePost> {
        let content_token = self.content_token(post).await?;

        let mut thumbnail_token = None;
        if let Some(file) = &post.local_file
            && let Some(thumbnail) = self.default_thumbnail(&file_extension(file))
        {
            if thumbnail.is_file() {
                thumbnail_token = Some(self.api.upload_file(&thumbnail).await?);
            } else {
                warn!(path = %thumbnail.display(), "bundled thumbnail missing, creating without one");
            }
        }

        self.api
            .create_post(&PostCreate {
                tags: Self::merged_tag_names(None, post),
                safety: post.safety.as_str().to_owned(),
                source: post.sources.join("\n"),
                content_token,
                thumbnail_token,
            })
            .await
    }

    async fn update_from(&self, target: &Post, post: &Post) -> Result<WirePost> {
        let mut sources = UniqueVec::new();
        sources.extend(target.sources.iter().cloned());
        sources.extend(post.sources.iter().cloned());
        let sources: Vec<String> = sources.into_iter().collect();

        let content_token = post
            .extra_value(NAME, "content_token")
            .and_then(Value::as_str)
            .map(str::to_owned);

        self.api
            .update_post(
                target.id,
                &PostUpdate {
                    version: Self::version_of(target)?,
                    tags: Self::merged_tag_names(Some(target), post),
                    safety: post.safety.as_str().to_owned(),
                    source: sources.join("\n"),
                    content_token,
                },
            )
            .await
    }

    /// collect the distinct destination tags whose name sets intersect the
    /// incoming tag's names
    async fn collect_conflicts(&self, tag: &Tag) -> Result<Vec<WireTag>> {
        let mut conflicts: Vec<WireTag> = Vec::new();
        for name in tag.names.iter() {
            if conflicts.iter().any(|found| found.names.contains(name)) {
                continue;
            }
            if let Some(found) = self.api.get_tag(name).await? {
                let already_known = conflicts
                    .iter()
                    .any(|known| known.primary_name() == found.primary_name());
                if !already_known {
                    conflicts.push(found);
                }
            }
        }
        Ok(conflicts)
    }

    /// PUT the desired state, converting known failure envelopes into their
    /// corrective follow-ups
    async fn update_tag_with_fixups(
        &self,
        primary: WireTag,
        desired: DesiredTag,
    ) -> Result<WireTag> {
        let put_name = primary.primary_name().to_owned();
        let body = TagUpdate {
            version: primary.version,
            names: desired.names.clone(),
            category: desired.category.clone(),
            implications: Some(desired.implications.clone()),
        };

        match self.api.update_tag(&put_name, &body).await {
            Ok(updated) => Ok(updated),
            Err(error) if error.is_not_found() => {
                // the first name was reordered between read and write;
                // relocate the name we fetched by to position 0 and retry
                warn!(tag = %put_name, "first name moved on the server, relocating and retrying");
                let fresh = self
                    .api
                    .get_tag(&put_name)
                    .await?
                    .ok_or_else(|| SyncError::NotFound(format!("tag {put_name}")))?;

                let mut names = UniqueVec::new();
                names.push(put_name.clone());
                names.extend(desired.names.clone());
                let mut names: Vec<String> = names.into_iter().collect();
                names.truncate(self.options.max_tag_names.max(1));
                let body = TagUpdate {
                    version: fresh.version,
                    names,
                    category: desired.category.clone(),
                    implications: Some(desired.implications.clone()),
                };
                self.api.update_tag(&put_name, &body).await
            }
            Err(SyncError::Integrity(reason)) => {
                // an implication collided with an existing name or alias;
                // re-read and retry once with the colliding names pruned
                warn!(tag = %put_name, reason = %reason, "integrity failure, pruning implications and retrying");
                tokio::time::sleep(INTEGRITY_RETRY_DELAY).await;

                let fresh = self
                    .api
                    .get_tag(&put_name)
                    .await?
                    .ok_or_else(|| SyncError::NotFound(format!("tag {put_name}")))?;
                let pruned: Vec<String> = desired
                    .implications
                    .iter()
                    .filter(|name| !fresh.names.contains(name))
                    .cloned()
                    .collect();
                let body = TagUpdate {
                    version: fresh.version,
                    names: desired.names.clone(),
                    category: desired.category.clone(),
                    implications: Some(pruned),
                };
                self.api.update_tag(&put_name, &body).await
            }
            Err(error) if error.is_conflict() => {
                // the rename collided with an existing tag; shrink to the
                // primary name alone, then re-expand in a second update
                warn!(tag = %put_name, "name conflict on update, shrinking then re-expanding");
                let shrink = TagUpdate {
                    version: primary.version,
                    names: vec![put_name.clone()],
                    category: desired.category.clone(),
                    implications: Some(desired.implications.clone()),
                };
                let shrunk = self.api.update_tag(&put_name, &shrink).await?;

                let expand = TagUpdate {
                    version: shrunk.version,
                    names: desired.names.clone(),
                    category: desired.category,
                    implications: Some(desired.implications),
                };
                self.api.update_tag(&put_name, &expand).await
            }
            Err(error) => Err(error),
        }
    }
}

#[async_trait]
impl DestinationAdapter for SzurubooruDest {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn find_exact_post(&self, post: &Post) -> Result<Option<Post>> {
        if !post.md5.is_empty() {
            let search = self
                .api
                .post_search(&format!("md5:{}", post.md5), 1, 0)
                .await?;
            if let Some(hit) = search.results.first() {
                return Ok(Some(hit.to_resource()));
            }
            debug!(id = post.id, "post not found with md5");
        }

        if self.options.source_url_check {
            for source in post.sources_of_type(SourceKind::Post) {
                let search = self
                    .api
                    .post_search(&format!("source:{source}"), 1, 0)
                    .await?;
                if let Some(hit) = search.results.first() {
                    return Ok(Some(hit.to_resource()));
                }
                debug!(id = post.id, source, "post not found with source link");
            }
        }

        Ok(None)
    }

    async fn find_similar_posts(&self, post: &mut Post) -> Result<Vec<Post>> {
        let token = self.content_token(post).await?;
        let result = self.api.reverse_search(&token).await?;

        if let Some(exact) = result.exact_post {
            let mut resource = exact.to_resource();
            resource.set_extra(NAME, "distance", json!(0.0));
            return Ok(vec![resource]);
        }

        let close = reconcile::select_similar(
            result.similar_posts,
            self.options.image_distance_threshold,
        );
        Ok(close
            .into_iter()
            .map(|hit| {
                let mut resource = hit.post.to_resource();
                resource.set_extra(NAME, "distance", json!(hit.distance));
                resource
            })
            .collect())
    }

    async fn push_post(&self, post: &mut Post, force_update: bool) -> Result<Option<Post>> {
        if post.local_file.is_some() {
            let similar = self.find_similar_posts(post).await?;

            if similar.is_empty() {
                let created = self.create_from(post).await?;
                info!(
                    id = post.id,
                    origin = %post.category,
                    destination_id = created.id,
                    "created post"
                );
                return Ok(Some(created.to_resource()));
            }

            let closest = &similar[0];
            let distance = closest
                .extra_value(NAME, "distance")
                .and_then(Value::as_f64)
                .unwrap_or_default();
            let updated = self.update_from(closest, post).await?;
            info!(
                id = post.id,
                origin = %post.category,
                destination_id = updated.id,
                distance,
                "updated near-duplicate post"
            );
            return Ok(Some(updated.to_resource()));
        }

        let Some(exact) = self.find_exact_post(post).await? else {
            return Err(SyncError::Other(format!(
                "post {} has no local file and no destination copy",
                post.id
            )));
        };

        let diff = post.diff(
            &exact,
            &[
                "id",
                "created_at",
                "updated_at",
                "post_url",
                "description",
                "pools",
            ],
        );
        if diff.is_empty() && !force_update {
            debug!(id = post.id, origin = %post.category, destination_id = exact.id, "no changes, skipping");
            return Ok(Some(exact));
        }

        let updated = self.update_from(&exact, post).await?;
        info!(
            id = post.id,
            origin = %post.category,
            destination_id = updated.id,
            changed = ?diff.keys().collect::<Vec<_>>(),
            "updated post"
        );
        Ok(Some(updated.to_resource()))
    }

    async fn push_tag(&self, tag: &Tag, replace: bool, create_empty: bool) -> Result<Option<Tag>> {
        if tag.names.is_empty() {
            return Err(SyncError::BadRequest("tag has no names".into()));
        }

        let conflicts = self.collect_conflicts(tag).await?;
        let Some(plan) = reconcile::plan_conflicts(conflicts) else {
            if !create_empty {
                debug!(tag = %tag, "absent on destination and create_empty is off, skipping");
                return Ok(None);
            }
            let names: Vec<String> = tag.names.iter().cloned().collect();
            let created = self
                .api
                .create_tag(&names, tag.category.as_str(), &tag.implication_names())
                .await?;
            info!(tag = %tag, "created tag");
            return Ok(Some(created.to_resource()));
        };

        let mut primary = plan.primary;
        for dead in plan.delete {
            info!(tag = dead.primary_name(), "deleting unused conflicting tag");
            self.api.delete_tag(dead.primary_name(), dead.version).await?;
        }
        for other in plan.merge {
            info!(
                from = other.primary_name(),
                into = primary.primary_name(),
                "merging conflicting tag"
            );
            primary = self.api.merge_tags(&other, &primary).await?;
        }

        let desired = reconcile::desired_tag(&primary, tag, replace, self.options.max_tag_names);
        if !reconcile::tag_needs_update(&primary, &desired) {
            debug!(tag = %tag, "already matches, skipping update");
            return Ok(Some(primary.to_resource()));
        }

        let updated = self.update_tag_with_fixups(primary, desired).await?;
        info!(tag = %tag, "updated tag");
        Ok(Some(updated.to_resource()))
    }

    async fn push_pool(&self, pool: &Pool, _force_update: bool) -> Result<Pool> {
        let name = pool.primary_name();
        if name.is_empty() {
            return Err(SyncError::BadRequest(format!(
                "pool {} has no name to match on",
                pool.id
            )));
        }

        let query = format!("name:{}", escape_query(name));
        debug!(pool = name, query = %query, "checking for existing pool");
        let search = self.api.pool_search(&query, 100, 0).await?;
        let existing = search
            .results
            .into_iter()
            .find(|candidate| candidate.names.iter().any(|n| pool.names.contains(n)));

        let names: Vec<String> = pool.names.iter().cloned().collect();
        let pushed = match existing {
            Some(found) => {
                info!(pool = name, id = found.id, "updating pool");
                self.api
                    .update_pool(
                        found.id,
                        found.version,
                        &names,
                        &pool.category,
                        &pool.description,
                        &pool.posts,
                    )
                    .await?
            }
            None => {
                info!(pool = name, "creating pool");
                self.api
                    .create_pool(&names, &pool.category, &pool.description, &pool.posts)
                    .await?
            }
        };

        Ok(pushed.to_resource())
    }
}

/// escape the characters the search grammar treats specially
fn escape_query(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '*' | ':' | '-' | '.') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_escaping_covers_the_grammar_characters() {
        assert_eq!(escape_query("a-b.c:d*e\\f"), "a\\-b\\.c\\:d\\*e\\\\f");
        assert_eq!(escape_query("plain"), "plain");
    }
}
