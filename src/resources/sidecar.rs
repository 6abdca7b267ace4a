//! metadata sidecars written by the external downloader
use {
    crate::error::Result,
    serde_json::{Map, Value},
    std::path::{Path, PathBuf},
};

/// one post's raw metadata: the json the downloader wrote next to the media
/// file, plus the path it was loaded from
///
/// unknown fields are preserved in `data`; adapter parsers pick out what
/// they understand
#[derive(Debug, Clone, Default)]
pub struct Sidecar {
    /// the raw metadata object
    pub data: Map<String, Value>,
    /// the sidecar file this was loaded from
    pub file: PathBuf,
}

impl Sidecar {
    /// load a sidecar from disk
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&raw)?;
        Self::from_value(value, path.to_path_buf())
    }

    /// wrap an already-parsed json value
    pub fn from_value(value: Value, file: PathBuf) -> Result<Self> {
        match value {
            Value::Object(data) => Ok(Self { data, file }),
            other => crate::bail!("sidecar {} is not a json object: {other}", file.display()),
        }
    }

    /// a field of the raw metadata
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// a string field
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// an integer field
    pub fn i64_field(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(Value::as_i64)
    }

    /// a boolean field
    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }

    /// the downloader's site category tag, e.g. `e621` or `gelbooru`
    pub fn category(&self) -> &str {
        self.str_field("category").unwrap_or_default()
    }

    /// the hostname the media was served from, used for adapter selection
    pub fn host(&self) -> Option<String> {
        self.str_field("file_url")
            .or_else(|| {
                self.field("file")
                    .and_then(|file| file.get("url"))
                    .and_then(Value::as_str)
            })
            .and_then(crate::utils::url_host)
    }

    /// where the media file for this sidecar lands: the sidecar path with
    /// its trailing `.json` stripped
    pub fn media_path(&self) -> PathBuf {
        self.file.with_extension("")
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn media_path_strips_the_json_suffix() {
        let sidecar = Sidecar {
            data: Map::new(),
            file: PathBuf::from("/tmp/run/e621/123.png.json"),
        };
        assert_eq!(sidecar.media_path(), PathBuf::from("/tmp/run/e621/123.png"));
    }

    #[test]
    fn host_prefers_file_url() {
        let sidecar = Sidecar::from_value(
            json!({
                "category": "e621",
                "file_url": "https://static1.e621.net/data/aa/bb/aabb.png"
            }),
            PathBuf::new(),
        )
        .expect("sidecar");

        assert_eq!(sidecar.category(), "e621");
        assert_eq!(sidecar.host().as_deref(), Some("static1.e621.net"));
    }

    #[test]
    fn host_falls_back_to_nested_file_object() {
        let sidecar = Sidecar::from_value(
            json!({"file": {"url": "https://static1.e621.net/data/x.png"}}),
            PathBuf::new(),
        )
        .expect("sidecar");

        assert_eq!(sidecar.host().as_deref(), Some("static1.e621.net"));
    }

    #[test]
    fn non_object_sidecars_are_rejected() {
        assert!(Sidecar::from_value(json!([1, 2]), PathBuf::new()).is_err());
    }
}
