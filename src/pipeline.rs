//! the ingestion pipeline: paged discovery, normalization, filtering,
//! existence checks, conditional media fetch, and destination upsert
use {
    crate::{
        config::SyncConfig,
        download::{DownloadJob, DownloadManager, GalleryDl},
        error::{Result, SyncError},
        interrupt::InterruptHandler,
        plugins::{Registry, destination::DestinationAdapter},
        resources::{MergeOptions, PluginBundle, Pool, Post, Tag},
    },
    futures::future,
    hashbrown::HashMap,
    std::{path::PathBuf, sync::Arc},
    tracing::{debug, error, info, warn},
};

/// tags pushed concurrently per wave
const TAG_WAVE_SIZE: usize = 500;

/// whether the consecutive blank page count has exhausted the tolerance;
/// a tolerance of 0 stops at the first blank page
fn blank_limit_reached(blank_pages: u32, allowed: u32) -> bool {
    blank_pages >= allowed.max(1)
}

/// drives a set of source urls into the destination
pub struct ImportPipeline {
    cfg: SyncConfig,
    registry: Arc<Registry>,
    destination: Arc<dyn DestinationAdapter>,
    interrupt: InterruptHandler,
    manager: DownloadManager,
    temp_root: PathBuf,
    all_tags: Vec<Tag>,
    pools: Vec<Pool>,
}

impl ImportPipeline {
    /// wire the pipeline up from a resolved configuration
    pub fn new(
        cfg: SyncConfig,
        registry: Arc<Registry>,
        interrupt: InterruptHandler,
    ) -> Result<Self> {
        let destination = registry.find_destination(&cfg.destination)?;
        let temp_root = cfg
            .temp_folder
            .join(format!("run-{}", chrono::Utc::now().timestamp_micros()));
        let manager = DownloadManager::new(
            GalleryDl::new(cfg.cookies_file.clone()),
            temp_root.clone(),
            cfg.download_page_size,
            cfg.ignored_extensions.clone(),
        );

        Ok(Self {
            cfg,
            registry,
            destination,
            interrupt,
            manager,
            temp_root,
            all_tags: Vec::new(),
            pools: Vec::new(),
        })
    }

    /// run the whole synchronization: every url, then the accumulated tag
    /// and pool pushes
    pub async fn run(&mut self, urls: &[String]) -> Result<()> {
        let result = self.run_inner(urls).await;
        self.cleanup();
        result
    }

    async fn run_inner(&mut self, urls: &[String]) -> Result<()> {
        for url in urls {
            if self.interrupt.triggered() {
                return Err(SyncError::Interrupted);
            }
            match self.import_url(url).await {
                Ok(()) => {}
                Err(SyncError::Interrupted) => return Err(SyncError::Interrupted),
                Err(err) => error!(url = %url, %err, "url import failed"),
            }
        }

        self.push_tags().await;
        self.push_pools().await;
        Ok(())
    }

    /// strictly sequential pagination over one url
    async fn import_url(&mut self, url: &str) -> Result<()> {
        self.manager.reset_paging();
        let mut blank_pages = 0u32;

        loop {
            if self.interrupt.triggered() {
                return Err(SyncError::Interrupted);
            }

            let Some(mut job) = self.manager.next_page(url).await? else {
                debug!(url, "downloader reported no further items");
                break;
            };

            let new_items = match self.process_page(&mut job).await {
                Ok(count) => count,
                Err(SyncError::Interrupted) => {
                    let _ = job.cleanup_folders();
                    return Err(SyncError::Interrupted);
                }
                Err(err) => {
                    error!(url, %err, "page failed, continuing with the next one");
                    0
                }
            };

            if let Err(err) = job.cleanup_folders() {
                warn!(folder = %job.folder.display(), %err, "scratch cleanup failed");
            }

            if new_items == 0 {
                blank_pages += 1;
            } else {
                blank_pages = 0;
            }
            if blank_limit_reached(blank_pages, self.cfg.allowed_blank_pages) {
                info!(
                    url,
                    allowed = self.cfg.allowed_blank_pages,
                    "reached the blank page limit, stopping"
                );
                break;
            }
        }

        Ok(())
    }

    /// one page job, steps normalize through upsert; returns how many new
    /// items were fetched (the blank-page currency)
    async fn process_page(&mut self, job: &mut DownloadJob) -> Result<usize> {
        self.normalize(job);
        self.filter(job);

        // existence checks fan out concurrently; the first failure cancels
        // its siblings and surfaces at the page boundary
        let candidates: Vec<Post> = job
            .items
            .iter()
            .filter(|item| item.surviving())
            .filter_map(|item| item.resource.clone())
            .collect();
        let lookups = future::try_join_all(candidates.iter().map(|post| {
            let destination = self.destination.clone();
            async move {
                let found = destination.find_exact_post(post).await?;
                Ok::<_, SyncError>((post.id, found))
            }
        }))
        .await?;
        let existing: HashMap<i64, Post> = lookups
            .into_iter()
            .filter_map(|(id, found)| found.map(|post| (id, post)))
            .collect();

        // merge destination copies in, mark the rest for download
        for item in &mut job.items {
            if !item.surviving() {
                continue;
            }
            let Some(post) = item.resource.as_mut() else {
                continue;
            };
            match existing.get(&post.id) {
                Some(found) => {
                    debug!(id = post.id, destination_id = found.id, "merging destination copy");
                    let mut merged = found.merged_copy(post, &MergeOptions::default());
                    merged.plugins = post.plugins.clone();
                    *post = merged;
                    item.media_download_desired = false;
                }
                None => {
                    info!(url = %post.post_url, "queuing for download");
                    item.media_download_desired = true;
                }
            }
        }

        let fetched = self.manager.download_media(job).await?;

        // enrichment before the push: digests and the post-url invariant
        let mut to_push: Vec<Post> = Vec::new();
        for item in &mut job.items {
            if !item.surviving() {
                continue;
            }
            let Some(post) = item.resource.as_mut() else {
                continue;
            };

            if item.media_download_desired && post.local_file.is_none() {
                warn!(id = post.id, origin = %post.category, "no media file after download, skipping push");
                item.ignore = true;
                continue;
            }

            post.ensure_post_url_in_sources();
            if let Err(err) = post.fill_digests() {
                warn!(id = post.id, origin = %post.category, %err, "skipping push");
                item.ignore = true;
                continue;
            }

            for tag in &post.tags {
                if !self.all_tags.contains(tag) {
                    self.all_tags.push(tag.clone());
                }
            }
            for pool in &post.pools {
                if !pool.names.is_empty() && !self.pools.contains(pool) {
                    self.pools.push(pool.clone());
                }
            }

            to_push.push(post.clone());
        }

        // upserts fan out concurrently under the same task-group semantics;
        // per-item protocol rejections are logged and skipped, everything
        // else cancels the page
        future::try_join_all(to_push.into_iter().map(|mut post| {
            let destination = self.destination.clone();
            async move {
                match destination.push_post(&mut post, false).await {
                    Ok(Some(_)) => Ok(()),
                    Ok(None) => {
                        info!(id = post.id, origin = %post.category, "push skipped");
                        Ok(())
                    }
                    Err(err @ (SyncError::ContentTooLarge(_) | SyncError::BadRequest(_))) => {
                        warn!(id = post.id, origin = %post.category, %err, "destination rejected the item, skipping");
                        Ok(())
                    }
                    Err(SyncError::MissingFile(path)) => {
                        warn!(id = post.id, origin = %post.category, path = %path.display(), "media file vanished, push aborted");
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
        }))
        .await?;

        Ok(fetched)
    }

    /// step 1: select a source adapter per item and parse its sidecar
    fn normalize(&self, job: &mut DownloadJob) {
        for item in &mut job.items {
            let domain = item.sidecar.host().unwrap_or_default();
            let category = item.sidecar.category().to_owned();

            let Some(adapter) = self.registry.find_source(&domain, &category) else {
                warn!(
                    domain = %domain,
                    category = %category,
                    sidecar = %item.sidecar.file.display(),
                    "no source adapter, skipping item"
                );
                item.ignore = true;
                continue;
            };

            match adapter.parse(&item.sidecar) {
                Ok(mut post) => {
                    post.plugins = PluginBundle {
                        source: Some(adapter.clone()),
                        destination: Some(self.destination.clone()),
                        validators: self.registry.validators(),
                    };
                    item.resource = Some(post);
                }
                Err(err) => {
                    warn!(sidecar = %item.sidecar.file.display(), %err, "sidecar parse failed, skipping item");
                    item.ignore = true;
                }
            }
        }
    }

    /// step 2: apply the allowed-post predicate
    fn filter(&self, job: &mut DownloadJob) {
        for item in &mut job.items {
            if item.ignore {
                continue;
            }
            let Some(post) = &item.resource else {
                continue;
            };
            if let Some(reason) = rejection_reason(&self.cfg, post) {
                info!(id = post.id, origin = %post.category, reason, "skipping post");
                item.ignore = true;
            }
        }
    }

    /// push the accumulated tags in concurrent waves
    async fn push_tags(&mut self) {
        if self.all_tags.is_empty() {
            return;
        }
        info!(count = self.all_tags.len(), "updating tags");

        for wave in self.all_tags.chunks(TAG_WAVE_SIZE) {
            let results = future::join_all(wave.iter().map(|tag| {
                let destination = self.destination.clone();
                async move { (tag, destination.push_tag(tag, false, true).await) }
            }))
            .await;

            for (tag, result) in results {
                if let Err(err) = result {
                    warn!(tag = %tag, %err, "tag update failed");
                }
            }
        }
    }

    /// push the accumulated pools; pool order matters, so this is serial
    async fn push_pools(&mut self) {
        for pool in &self.pools {
            if let Err(err) = self.destination.push_pool(pool, false).await {
                warn!(pool = pool.primary_name(), %err, "pool update failed");
            }
        }
    }

    /// remove this run's scratch root
    fn cleanup(&self) {
        if self.temp_root.exists() {
            debug!(root = %self.temp_root.display(), "removing scratch root");
            if let Err(err) = std::fs::remove_dir_all(&self.temp_root) {
                warn!(%err, "scratch root cleanup failed");
            }
        }
    }

    #[cfg(test)]
    fn with_destination(mut self, destination: Arc<dyn DestinationAdapter>) -> Self {
        self.destination = destination;
        self
    }
}

/// the allowed-post predicate, inverted: the first reason to reject, if any
fn rejection_reason(cfg: &SyncConfig, post: &Post) -> Option<&'static str> {
    let names = post.tag_names();

    if cfg.blacklisted_tags.iter().any(|f| f.matches(&names)) {
        return Some("contains blacklisted tags");
    }
    if !cfg.required_tags.iter().all(|f| f.matches(&names)) {
        return Some("missing required tags");
    }
    if !cfg.allowed_safety.is_empty() && !cfg.allowed_safety.contains(&post.safety) {
        return Some("safety not allowed");
    }
    if cfg.minimum_score > 0 && post.score < cfg.minimum_score {
        return Some("score below minimum");
    }
    if post.deleted {
        return Some("deleted on origin");
    }
    None
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            config::TagFilter,
            net::Session,
            plugins::szurubooru,
            resources::{Safety, Sidecar, TagCategory},
        },
        async_trait::async_trait,
        serde_json::json,
        std::sync::Mutex,
    };

    fn post_with(tags: &[&str], safety: Safety, score: i64) -> Post {
        Post {
            id: 1,
            category: "e621".into(),
            score,
            safety,
            tags: tags
                .iter()
                .map(|name| Tag::new(*name, TagCategory::General))
                .collect(),
            ..Post::default()
        }
    }

    #[test]
    fn blacklist_and_groups_reject() {
        let cfg = SyncConfig {
            blacklisted_tags: vec![
                TagFilter::One("banned".into()),
                TagFilter::All(vec!["cat".into(), "dog".into()]),
            ],
            ..SyncConfig::default()
        };

        assert!(rejection_reason(&cfg, &post_with(&["banned"], Safety::Safe, 0)).is_some());
        assert!(rejection_reason(&cfg, &post_with(&["cat", "dog"], Safety::Safe, 0)).is_some());
        assert!(rejection_reason(&cfg, &post_with(&["cat"], Safety::Safe, 0)).is_none());
    }

    #[test]
    fn required_safety_score_and_deleted_reject() {
        let cfg = SyncConfig {
            required_tags: vec![TagFilter::One("cat".into())],
            allowed_safety: vec![Safety::Safe],
            minimum_score: 5,
            ..SyncConfig::default()
        };

        assert_eq!(
            rejection_reason(&cfg, &post_with(&["dog"], Safety::Safe, 10)),
            Some("missing required tags")
        );
        assert_eq!(
            rejection_reason(&cfg, &post_with(&["cat"], Safety::Unsafe, 10)),
            Some("safety not allowed")
        );
        assert_eq!(
            rejection_reason(&cfg, &post_with(&["cat"], Safety::Safe, 3)),
            Some("score below minimum")
        );

        let mut deleted = post_with(&["cat"], Safety::Safe, 10);
        deleted.deleted = true;
        assert_eq!(rejection_reason(&cfg, &deleted), Some("deleted on origin"));

        assert!(rejection_reason(&cfg, &post_with(&["cat"], Safety::Safe, 10)).is_none());
    }

    #[test]
    fn blank_page_tolerance_treats_zero_as_stop_immediately() {
        assert!(blank_limit_reached(1, 0));
        assert!(blank_limit_reached(1, 1));
        assert!(!blank_limit_reached(1, 2));
        assert!(blank_limit_reached(2, 2));
        assert!(!blank_limit_reached(0, 0));
    }

    /// a destination that answers from a fixed set and records pushes
    struct StubDestination {
        known_md5: String,
        pushed: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl DestinationAdapter for StubDestination {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn find_exact_post(&self, post: &Post) -> Result<Option<Post>> {
            if post.md5 == self.known_md5 {
                let mut found = Post {
                    id: 900,
                    category: "szurubooru".into(),
                    md5: self.known_md5.clone(),
                    safety: post.safety,
                    ..Post::default()
                };
                found.set_extra("stub", "version", json!(3));
                return Ok(Some(found));
            }
            Ok(None)
        }

        async fn find_similar_posts(&self, _post: &mut Post) -> Result<Vec<Post>> {
            Ok(Vec::new())
        }

        async fn push_post(&self, post: &mut Post, _force: bool) -> Result<Option<Post>> {
            self.pushed.lock().expect("lock").push(post.id);
            Ok(Some(post.clone()))
        }

        async fn push_tag(&self, tag: &Tag, _replace: bool, _create: bool) -> Result<Option<Tag>> {
            Ok(Some(tag.clone()))
        }
    }

    fn write_sidecar(dir: &std::path::Path, id: i64, md5: &str) -> Sidecar {
        let path = dir.join(format!("{id}.png.json"));
        let value = json!({
            "category": "e621",
            "id": id,
            "rating": "s",
            "tags": {"general": ["cat"]},
            "file": {"md5": md5},
            "file_url": "https://static1.e621.net/data/x.png"
        });
        std::fs::write(&path, value.to_string()).expect("write sidecar");
        Sidecar::load(&path).expect("load sidecar")
    }

    #[tokio::test]
    async fn known_posts_merge_and_push_without_a_media_fetch() {
        let dir = tempfile::tempdir().expect("tmp");
        let known_md5 = "a".repeat(32);

        let cfg = SyncConfig::default();
        let session = Arc::new(Session::new(4, None).expect("session"));
        let registry = Arc::new(Registry::new(&cfg, session));
        let destination = Arc::new(StubDestination {
            known_md5: known_md5.clone(),
            pushed: Mutex::new(Vec::new()),
        });

        let mut pipeline = ImportPipeline::new(cfg, registry, InterruptHandler::new())
            .expect("pipeline")
            .with_destination(destination.clone());

        let mut job = DownloadJob {
            folder: dir.path().to_path_buf(),
            items: vec![crate::download::DownloadItem {
                sidecar: write_sidecar(dir.path(), 123, &known_md5),
                ..Default::default()
            }],
        };

        let fetched = pipeline.process_page(&mut job).await.expect("page");

        // the destination copy existed, so nothing was downloaded and the
        // merged post was pushed
        assert_eq!(fetched, 0);
        assert_eq!(*destination.pushed.lock().expect("lock"), vec![123]);
        assert!(!job.items[0].media_download_desired);
        assert!(!job.items[0].ignore);

        let merged = job.items[0].resource.as_ref().expect("resource");
        assert_eq!(merged.category, "szurubooru");
        assert!(merged.tags.iter().any(|t| t.primary_name() == "cat"));
        assert_eq!(
            merged.extra_value("stub", "version"),
            Some(&json!(3))
        );
    }

    #[tokio::test]
    async fn blacklisted_items_never_reach_the_destination() {
        let dir = tempfile::tempdir().expect("tmp");

        let cfg = SyncConfig {
            blacklisted_tags: vec![TagFilter::One("cat".into())],
            ..SyncConfig::default()
        };
        let session = Arc::new(Session::new(4, None).expect("session"));
        let registry = Arc::new(Registry::new(&cfg, session));
        let destination = Arc::new(StubDestination {
            known_md5: String::new(),
            pushed: Mutex::new(Vec::new()),
        });

        let mut pipeline = ImportPipeline::new(cfg, registry, InterruptHandler::new())
            .expect("pipeline")
            .with_destination(destination.clone());

        let mut job = DownloadJob {
            folder: dir.path().to_path_buf(),
            items: vec![crate::download::DownloadItem {
                sidecar: write_sidecar(dir.path(), 7, &"b".repeat(32)),
                ..Default::default()
            }],
        };

        let fetched = pipeline.process_page(&mut job).await.expect("page");

        assert_eq!(fetched, 0);
        assert!(job.items[0].ignore);
        assert!(destination.pushed.lock().expect("lock").is_empty());
    }

    // keep the canonical adapter honest about its identifier, since the
    // config block and the extra bag are both keyed by it
    #[test]
    fn the_default_destination_name_matches_the_config_default() {
        assert_eq!(szurubooru::NAME, SyncConfig::default().destination);
    }
}
