//! the contract a destination booru implements
use {
    crate::{
        error::{Result, SyncError},
        resources::{Pool, Post, Tag},
    },
    async_trait::async_trait,
};

/// operations the destination must provide; all of them may fail transiently
/// and are retried by the transport layer, not by callers
#[async_trait]
pub trait DestinationAdapter: Send + Sync {
    /// unique plugin identifier
    fn name(&self) -> &'static str;

    /// look the post up by content hash (and optionally by source url)
    async fn find_exact_post(&self, post: &Post) -> Result<Option<Post>>;

    /// reverse-image search for a post with a local file, closest first
    ///
    /// the content token obtained for the upload is cached in the post's
    /// extra bag so the same file is never uploaded twice in one pass
    async fn find_similar_posts(&self, post: &mut Post) -> Result<Vec<Post>>;

    /// create the post, or update its nearest duplicate below the distance
    /// threshold; returns the destination-side post, or nothing when the
    /// push was skipped
    async fn push_post(&self, post: &mut Post, force_update: bool) -> Result<Option<Post>>;

    /// create the tag, or resolve name conflicts and update; returns the
    /// destination-side tag, or nothing when creation was skipped
    async fn push_tag(&self, tag: &Tag, replace: bool, create_empty: bool) -> Result<Option<Tag>>;

    /// create or update a pool; optional
    async fn push_pool(&self, pool: &Pool, force_update: bool) -> Result<Pool> {
        let _ = force_update;
        Err(SyncError::Other(format!(
            "{} does not implement pool pushes (pool {})",
            self.name(),
            pool.id
        )))
    }
}
