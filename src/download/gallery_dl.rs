//! the external downloader, driven as a subprocess
use {
    crate::error::Result,
    std::path::{Path, PathBuf},
    tokio::process::Command,
    tracing::{debug, warn},
};

/// a `gallery-dl` invocation wrapper
///
/// exit codes are not consulted; callers re-scan the scratch folder after
/// every invocation and judge progress by what landed on disk
pub struct GalleryDl {
    program: String,
    cookies: Option<PathBuf>,
}

impl GalleryDl {
    /// make a wrapper around the `gallery-dl` binary on the path
    pub fn new(cookies: Option<PathBuf>) -> Self {
        Self {
            program: "gallery-dl".to_owned(),
            cookies,
        }
    }

    /// argument vector for an info-only page fetch
    pub fn info_args(&self, folder: &Path, range: (u64, u64), url: &str) -> Vec<String> {
        let mut args = vec![
            "--write-metadata".to_owned(),
            "--no-download".to_owned(),
            format!("-D={}", folder.display()),
            format!("--range={}-{}", range.0, range.1),
        ];
        if let Some(cookies) = &self.cookies {
            args.push(format!("--cookies={}", cookies.display()));
        }
        args.push(url.to_owned());
        args
    }

    /// argument vector for fetching media files into an existing folder
    pub fn media_args(&self, folder: &Path, urls: &[String]) -> Vec<String> {
        let mut args = vec![
            "--write-metadata".to_owned(),
            format!("-D={}", folder.display()),
        ];
        if let Some(cookies) = &self.cookies {
            args.push(format!("--cookies={}", cookies.display()));
        }
        args.extend(urls.iter().cloned());
        args
    }

    /// fetch one page of metadata sidecars into a fresh folder
    pub async fn fetch_info(&self, folder: &Path, range: (u64, u64), url: &str) -> Result<()> {
        tokio::fs::create_dir_all(folder).await?;
        self.run(self.info_args(folder, range, url)).await
    }

    /// fetch the media files for the given post urls
    pub async fn fetch_media(&self, folder: &Path, urls: &[String]) -> Result<()> {
        self.run(self.media_args(folder, urls)).await
    }

    async fn run(&self, args: Vec<String>) -> Result<()> {
        debug!(program = %self.program, ?args, "calling downloader");
        let status = Command::new(&self.program).args(&args).status().await?;
        if !status.success() {
            warn!(%status, "downloader exited non-zero, continuing with whatever landed");
        }
        Ok(())
    }
}
