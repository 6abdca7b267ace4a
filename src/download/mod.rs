//! paged discovery of metadata sidecars and conditional media fetch
use {
    crate::{
        error::Result,
        resources::{Post, Sidecar},
        utils::file_extension,
    },
    hashbrown::HashSet,
    std::path::{Path, PathBuf},
    tracing::{debug, info, warn},
};

pub mod gallery_dl;

pub use gallery_dl::GalleryDl;

/// one discovered post: its sidecar, its media file once fetched, and the
/// pipeline's verdict flags
#[derive(Debug, Default)]
pub struct DownloadItem {
    /// the parsed sidecar
    pub sidecar: Sidecar,
    /// the media file, populated after a media fetch
    pub media_file: Option<PathBuf>,
    /// the pipeline wants this item's media fetched
    pub media_download_desired: bool,
    /// the pipeline rejected this item
    pub ignore: bool,
    /// the normalized post, populated during enrichment
    pub resource: Option<Post>,
}

impl DownloadItem {
    /// whether the item is still in play
    pub fn surviving(&self) -> bool {
        !self.ignore && self.resource.is_some()
    }
}

/// one page of work: a scratch folder owned exclusively by this job plus the
/// items discovered in it
#[derive(Debug, Default)]
pub struct DownloadJob {
    /// the scratch folder, removed on cleanup
    pub folder: PathBuf,
    /// the discovered items
    pub items: Vec<DownloadItem>,
}

impl DownloadJob {
    /// delete the scratch folder
    pub fn cleanup_folders(&self) -> Result<()> {
        if self.folder.exists() {
            debug!(folder = %self.folder.display(), "deleting scratch folder");
            std::fs::remove_dir_all(&self.folder)?;
        }
        Ok(())
    }
}

/// a paged iterator over one source url
///
/// each page invokes the external downloader in info-only mode for a bounded
/// range, wraps every sidecar it produced, and advances the range by the
/// page size
pub struct DownloadManager {
    tool: GalleryDl,
    temp_root: PathBuf,
    page_size: u64,
    offset: u64,
    page: u64,
    ignored_extensions: Vec<String>,
    seen_urls: HashSet<String>,
}

impl DownloadManager {
    /// make a manager rooted at `temp_root`
    pub fn new(tool: GalleryDl, temp_root: PathBuf, page_size: u64, ignored_extensions: Vec<String>) -> Self {
        Self {
            tool,
            temp_root,
            page_size: page_size.max(1),
            offset: 0,
            page: 0,
            ignored_extensions,
            seen_urls: HashSet::new(),
        }
    }

    /// rewind pagination for a fresh url; the session's seen-url set is kept
    pub fn reset_paging(&mut self) {
        self.offset = 0;
        self.page = 0;
    }

    /// fetch the next page of sidecars for the url
    ///
    /// yields nothing when the downloader produced no further sidecars
    pub async fn next_page(&mut self, url: &str) -> Result<Option<DownloadJob>> {
        let range = (self.offset, self.offset + self.page_size);
        self.offset += self.page_size;
        self.page += 1;

        let folder = self
            .temp_root
            .join(format!("{}-{}", chrono::Utc::now().timestamp_micros(), self.page));

        info!(url, min = range.0, max = range.1, "downloading page metadata");
        self.tool.fetch_info(&folder, range, url).await?;

        let items: Vec<DownloadItem> = scan_sidecars(&folder)
            .into_iter()
            .filter_map(|path| match Sidecar::load(&path) {
                Ok(sidecar) => Some(DownloadItem {
                    sidecar,
                    ..DownloadItem::default()
                }),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable sidecar");
                    None
                }
            })
            .collect();

        debug!(count = items.len(), "downloaded sidecars");
        if items.is_empty() {
            let _ = std::fs::remove_dir_all(&folder);
            return Ok(None);
        }

        Ok(Some(DownloadJob { folder, items }))
    }

    /// fetch media for the items the pipeline flagged, recording each
    /// produced file next to its sidecar; returns how many new items were
    /// actually fetched
    pub async fn download_media(&mut self, job: &mut DownloadJob) -> Result<usize> {
        let mut urls = Vec::new();
        let mut picked = Vec::new();

        for (index, item) in job.items.iter().enumerate() {
            if !item.media_download_desired || item.ignore {
                continue;
            }
            let Some(post) = &item.resource else {
                continue;
            };
            if post.post_url.is_empty() {
                warn!(id = post.id, "no post url to fetch media from");
                continue;
            }

            let extension = file_extension(&item.sidecar.media_path());
            if self.ignored_extensions.iter().any(|e| *e == extension) {
                debug!(id = post.id, extension = %extension, "extension is on the ignore list");
                continue;
            }
            if !self.seen_urls.insert(post.post_url.clone()) {
                debug!(id = post.id, url = %post.post_url, "already fetched this session");
                continue;
            }

            urls.push(post.post_url.clone());
            picked.push(index);
        }

        if urls.is_empty() {
            info!("no new posts to download");
            return Ok(0);
        }

        info!(count = urls.len(), "downloading media files");
        self.tool.fetch_media(&job.folder, &urls).await?;

        let mut fetched = 0;
        for index in picked {
            let item = &mut job.items[index];
            let media = item.sidecar.media_path();
            if media.is_file() {
                item.media_file = Some(media.clone());
                if let Some(post) = &mut item.resource {
                    post.local_file = Some(media);
                }
                fetched += 1;
            } else {
                warn!(sidecar = %item.sidecar.file.display(), "downloader produced no media file");
            }
        }

        Ok(fetched)
    }
}

/// every sidecar below the folder, in stable order
fn scan_sidecars(folder: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = jwalk::WalkDir::new(folder)
        .skip_hidden(false)
        .sort(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && file_extension(path) == "json")
        .collect();
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use {super::*, std::fs};

    #[test]
    fn scan_finds_nested_sidecars_in_order() {
        let dir = tempfile::tempdir().expect("tmp");
        fs::create_dir_all(dir.path().join("e621")).expect("mkdir");
        fs::write(dir.path().join("e621/2.png.json"), "{}").expect("write");
        fs::write(dir.path().join("e621/1.png.json"), "{}").expect("write");
        fs::write(dir.path().join("e621/1.png"), "media").expect("write");

        let found = scan_sidecars(dir.path());
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("1.png.json"));
        assert!(found[1].ends_with("2.png.json"));
    }

    #[test]
    fn cleanup_removes_the_scratch_folder() {
        let dir = tempfile::tempdir().expect("tmp");
        let folder = dir.path().join("job");
        fs::create_dir_all(&folder).expect("mkdir");
        fs::write(folder.join("x.json"), "{}").expect("write");

        let job = DownloadJob {
            folder: folder.clone(),
            items: Vec::new(),
        };
        job.cleanup_folders().expect("cleanup");
        assert!(!folder.exists());
    }
}
