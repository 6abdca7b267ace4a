//! raw calls against the szurubooru http surface
use {
    crate::{
        config::SzurubooruOptions,
        error::{Result, SyncError},
        net::{RateLimiter, Session, retry},
        plugins::szurubooru::models::{
            ErrorEnvelope, ImageSearchResult, PagedSearch, PostCreate, PostUpdate, TagUpdate,
            UploadResponse, WirePool, WirePost, WireTag,
        },
        utils::url_host,
    },
    reqwest::{
        Response,
        header::{ACCEPT, AUTHORIZATION},
        multipart::{Form, Part},
    },
    serde::de::DeserializeOwned,
    serde_json::json,
    std::{path::Path, sync::Arc},
    tracing::debug,
};

/// the authenticated, rate-limited transport to one szurubooru instance
pub struct SzurubooruApi {
    session: Arc<Session>,
    limiter: RateLimiter,
    api_root: String,
    host: String,
    auth: String,
}

impl SzurubooruApi {
    /// bind the transport to an instance
    pub fn new(options: &SzurubooruOptions, session: Arc<Session>) -> Self {
        let url_base = options.url_base.trim_end_matches('/');
        let auth = format!(
            "Token {}",
            Session::encode_auth(&options.username, &options.password)
        );

        Self {
            limiter: RateLimiter::per_minute(options.rate_limit_per_minute),
            api_root: format!("{url_base}/api"),
            host: url_host(url_base).unwrap_or_default(),
            auth,
            session,
        }
    }

    /// paged post search
    pub async fn post_search(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<PagedSearch<WirePost>> {
        let url = format!("{}/posts/", self.api_root);
        self.get_paged(&url, query, limit, offset).await
    }

    /// paged tag search
    pub async fn tag_search(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<PagedSearch<WireTag>> {
        let url = format!("{}/tags/", self.api_root);
        self.get_paged(&url, query, limit, offset).await
    }

    /// paged pool search
    pub async fn pool_search(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<PagedSearch<WirePool>> {
        let url = format!("{}/pools/", self.api_root);
        self.get_paged(&url, query, limit, offset).await
    }

    async fn get_paged<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<PagedSearch<T>> {
        retry::with_backoff("paged search", || async {
            self.limiter.acquire(&self.host).await;
            let response = self
                .session
                .client
                .get(url)
                .query(&[
                    ("offset", offset.to_string()),
                    ("limit", limit.to_string()),
                    ("query", query.to_string()),
                ])
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, self.auth.as_str())
                .send()
                .await?;
            decode(response).await
        })
        .await
    }

    /// fetch a single tag; absent tags come back as none
    pub async fn get_tag(&self, name: &str) -> Result<Option<WireTag>> {
        let url = format!("{}/tag/{}", self.api_root, urlencoding::encode(name));
        let found = retry::with_backoff("tag fetch", || async {
            self.limiter.acquire(&self.host).await;
            let response = self
                .session
                .client
                .get(&url)
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, self.auth.as_str())
                .send()
                .await?;
            decode::<WireTag>(response).await
        })
        .await;

        match found {
            Ok(tag) => Ok(Some(tag)),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// create a tag
    pub async fn create_tag(
        &self,
        names: &[String],
        category: &str,
        implications: &[String],
    ) -> Result<WireTag> {
        let url = format!("{}/tags", self.api_root);
        let body = json!({
            "names": names,
            "category": category,
            "implications": implications,
        });

        retry::with_backoff("tag create", || async {
            self.limiter.acquire(&self.host).await;
            let response = self
                .session
                .client
                .post(&url)
                .json(&body)
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, self.auth.as_str())
                .send()
                .await?;
            decode(response).await
        })
        .await
    }

    /// update a tag addressed by name
    pub async fn update_tag(&self, name: &str, body: &TagUpdate) -> Result<WireTag> {
        let url = format!("{}/tag/{}", self.api_root, urlencoding::encode(name));

        retry::with_backoff("tag update", || async {
            self.limiter.acquire(&self.host).await;
            let response = self
                .session
                .client
                .put(&url)
                .json(body)
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, self.auth.as_str())
                .send()
                .await?;
            decode(response).await
        })
        .await
    }

    /// delete a tag
    pub async fn delete_tag(&self, name: &str, version: i64) -> Result<()> {
        let url = format!("{}/tag/{}", self.api_root, urlencoding::encode(name));
        let body = json!({ "version": version });

        retry::with_backoff("tag delete", || async {
            self.limiter.acquire(&self.host).await;
            let response = self
                .session
                .client
                .delete(&url)
                .json(&body)
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, self.auth.as_str())
                .send()
                .await?;
            decode::<serde_json::Value>(response).await
        })
        .await?;
        Ok(())
    }

    /// merge one tag into another; the server performs the merge atomically
    /// using both versions
    pub async fn merge_tags(&self, remove: &WireTag, merge_to: &WireTag) -> Result<WireTag> {
        let url = format!("{}/tag-merge/", self.api_root);
        let body = json!({
            "removeVersion": remove.version,
            "remove": remove.primary_name(),
            "mergeToVersion": merge_to.version,
            "mergeTo": merge_to.primary_name(),
        });

        retry::with_backoff("tag merge", || async {
            self.limiter.acquire(&self.host).await;
            let response = self
                .session
                .client
                .post(&url)
                .json(&body)
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, self.auth.as_str())
                .send()
                .await?;
            decode(response).await
        })
        .await
    }

    /// create a post from an uploaded content token
    pub async fn create_post(&self, body: &PostCreate) -> Result<WirePost> {
        let url = format!("{}/posts/", self.api_root);

        retry::with_backoff("post create", || async {
            self.limiter.acquire(&self.host).await;
            let response = self
                .session
                .client
                .post(&url)
                .json(body)
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, self.auth.as_str())
                .send()
                .await?;
            decode(response).await
        })
        .await
    }

    /// update a post by id
    pub async fn update_post(&self, id: i64, body: &PostUpdate) -> Result<WirePost> {
        let url = format!("{}/post/{id}", self.api_root);

        retry::with_backoff("post update", || async {
            self.limiter.acquire(&self.host).await;
            let response = self
                .session
                .client
                .put(&url)
                .json(body)
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, self.auth.as_str())
                .send()
                .await?;
            decode(response).await
        })
        .await
    }

    /// create a pool
    pub async fn create_pool(
        &self,
        names: &[String],
        category: &str,
        description: &str,
        posts: &[i64],
    ) -> Result<WirePool> {
        let url = format!("{}/pool", self.api_root);
        let body = json!({
            "names": names,
            "category": category,
            "description": description,
            "posts": posts,
        });

        retry::with_backoff("pool create", || async {
            self.limiter.acquire(&self.host).await;
            let response = self
                .session
                .client
                .post(&url)
                .json(&body)
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, self.auth.as_str())
                .send()
                .await?;
            decode(response).await
        })
        .await
    }

    /// update a pool by id
    pub async fn update_pool(
        &self,
        id: i64,
        version: i64,
        names: &[String],
        category: &str,
        description: &str,
        posts: &[i64],
    ) -> Result<WirePool> {
        let url = format!("{}/pool/{id}", self.api_root);
        let body = json!({
            "version": version,
            "names": names,
            "category": category,
            "description": description,
            "posts": posts,
        });

        retry::with_backoff("pool update", || async {
            self.limiter.acquire(&self.host).await;
            let response = self
                .session
                .client
                .put(&url)
                .json(&body)
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, self.auth.as_str())
                .send()
                .await?;
            decode(response).await
        })
        .await
    }

    /// upload a file to the temporary endpoint, returning its content token
    pub async fn upload_file(&self, file: &Path) -> Result<String> {
        let url = format!("{}/uploads", self.api_root);
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "content".to_owned());

        let response: UploadResponse = retry::with_backoff("temporary upload", || async {
            self.limiter.acquire(&self.host).await;
            let bytes = tokio::fs::read(file).await?;
            let form = Form::new().part("content", Part::bytes(bytes).file_name(file_name.clone()));
            let response = self
                .session
                .client
                .post(&url)
                .multipart(form)
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, self.auth.as_str())
                .send()
                .await?;
            decode(response).await
        })
        .await?;

        debug!(token = %response.token, "uploaded file to temporary endpoint");
        Ok(response.token)
    }

    /// reverse image search against an uploaded content token
    pub async fn reverse_search(&self, content_token: &str) -> Result<ImageSearchResult> {
        debug!("doing reverse image search");
        let url = format!("{}/posts/reverse-search", self.api_root);
        let body = json!({ "contentToken": content_token });

        retry::with_backoff("reverse search", || async {
            self.limiter.acquire(&self.host).await;
            let response = self
                .session
                .client
                .post(&url)
                .json(&body)
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, self.auth.as_str())
                .send()
                .await?;
            decode(response).await
        })
        .await
    }
}

/// map a response to its json payload or a typed error
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body)
        && !envelope.name.is_empty()
    {
        return Err(SyncError::from_envelope(
            status.as_u16(),
            envelope.name,
            envelope.description,
        ));
    }
    Err(SyncError::from_status(status.as_u16(), body))
}
