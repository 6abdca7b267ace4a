//! the shared http session used by every adapter
use {
    crate::error::Result,
    base64::{Engine, engine::general_purpose},
    reqwest::{
        Client,
        cookie::Jar,
        header::{COOKIE, HeaderMap, HeaderValue},
    },
    std::{path::Path, sync::Arc, time::Duration},
    tracing::{debug, info},
};

/// a shared http session: one pooled client with a cookie jar and a per-host
/// connection cap; the session owns connection pooling, nothing else does
#[derive(Clone, Debug)]
pub struct Session {
    /// the pooled http client
    pub client: Client,
}

impl Session {
    /// build the shared session
    ///
    /// # Arguments
    ///
    /// * `limit_per_host` - connection cap per host
    /// * `cookies_file` - optional cookies in Netscape or flat json format
    pub fn new(limit_per_host: usize, cookies_file: Option<&Path>) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let mut headers = HeaderMap::new();

        if let Some(path) = cookies_file {
            if path.extension().is_some_and(|ext| ext == "json") {
                // a flat mapping carries no domain, so it rides along on
                // every request as a header instead of living in the jar
                if let Some(header) = json_cookie_header(path)? {
                    headers.insert(COOKIE, header);
                }
            } else {
                load_netscape_cookies(&jar, path)?;
            }
        }

        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(15))
            .pool_max_idle_per_host(limit_per_host)
            .default_headers(headers)
            .cookie_provider(jar)
            .build()?;

        info!(limit_per_host, "initialized http session");
        Ok(Self { client })
    }

    /// encode `user:token` credentials the way the destination expects them
    pub fn encode_auth(user: &str, token: &str) -> String {
        general_purpose::STANDARD.encode(format!("{user}:{token}"))
    }
}

/// collapse a flat json `name -> value` mapping into one `Cookie` header
fn json_cookie_header(path: &Path) -> Result<Option<HeaderValue>> {
    let raw = std::fs::read_to_string(path)?;
    let map: hashbrown::HashMap<String, String> = serde_json::from_str(&raw)?;
    if map.is_empty() {
        return Ok(None);
    }

    let pairs: Vec<String> = map
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    let header = HeaderValue::from_str(&pairs.join("; "))?;

    debug!(count = map.len(), file = %path.display(), "loaded json cookies");
    Ok(Some(header))
}

/// load Netscape-format cookie lines into the jar
fn load_netscape_cookies(jar: &Jar, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)?;
    let mut loaded = 0usize;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 7 {
            debug!(line, "skipping malformed cookie line");
            continue;
        }
        let (domain, cookie_path, name, value) = (fields[0], fields[2], fields[5], fields[6]);
        let bare_domain = domain.trim_start_matches('.');
        let cookie = format!("{name}={value}; Domain={bare_domain}; Path={cookie_path}");
        let url = format!("https://{bare_domain}/").parse::<url::Url>()?;
        jar.add_cookie_str(&cookie, &url);
        loaded += 1;
    }

    debug!(count = loaded, file = %path.display(), "loaded cookies");
    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    #[test]
    fn auth_encoding_matches_basic_shape() {
        assert_eq!(Session::encode_auth("user", "pass"), "dXNlcjpwYXNz");
    }

    #[test]
    fn netscape_cookies_load() {
        let mut file = tempfile::Builder::new()
            .suffix(".txt")
            .tempfile()
            .expect("tmp");
        writeln!(file, "# Netscape HTTP Cookie File").expect("write");
        writeln!(file, ".e621.net\tTRUE\t/\tTRUE\t0\tcf_clearance\tabc123").expect("write");
        writeln!(file, "malformed line").expect("write");

        let jar = Jar::default();
        load_netscape_cookies(&jar, file.path()).expect("load");
    }

    #[test]
    fn json_cookies_become_one_header() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("tmp");
        write!(file, r#"{{"session": "xyz"}}"#).expect("write");

        let header = json_cookie_header(file.path()).expect("load").expect("some");
        assert_eq!(header.to_str().expect("ascii"), "session=xyz");
    }
}
