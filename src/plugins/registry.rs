//! discovery and selection of registered plugins
use {
    crate::{
        config::SyncConfig,
        error::{Result, SyncError},
        net::Session,
        plugins::{
            danbooru, destination::DestinationAdapter, e621, gelbooru, moebooru,
            source::{SourceAdapter, UrlValidator},
            szurubooru::SzurubooruDest,
        },
    },
    hashbrown::HashMap,
    std::sync::{Arc, RwLock},
    tracing::debug,
};

/// the compile-time plugin registry
///
/// constructed once at startup and read-only afterwards; adapters are bound
/// to the shared session and their configuration block at construction
pub struct Registry {
    sources: Vec<Arc<dyn SourceAdapter>>,
    validators: Vec<Arc<dyn UrlValidator>>,
    destinations: Vec<Arc<dyn DestinationAdapter>>,
    source_cache: RwLock<HashMap<String, Option<usize>>>,
}

impl Registry {
    /// build the registry with every known plugin
    pub fn new(cfg: &SyncConfig, session: Arc<Session>) -> Self {
        let sources: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(e621::E621::new()),
            Arc::new(danbooru::Danbooru::new()),
            Arc::new(gelbooru::Gelbooru::new()),
            Arc::new(moebooru::Moebooru::new()),
        ];
        let validators: Vec<Arc<dyn UrlValidator>> = vec![
            Arc::new(e621::E621Validator::new()),
            Arc::new(danbooru::DanbooruValidator::new()),
            Arc::new(gelbooru::GelbooruValidator::new()),
            Arc::new(moebooru::MoebooruValidator::new()),
        ];
        let destinations: Vec<Arc<dyn DestinationAdapter>> = vec![Arc::new(SzurubooruDest::new(
            cfg.szurubooru.clone(),
            cfg.root_folder.clone(),
            session,
        ))];

        Self {
            sources,
            validators,
            destinations,
            source_cache: RwLock::new(HashMap::new()),
        }
    }

    /// select a source adapter for a domain/category pair
    ///
    /// the first adapter with a domain-fragment match wins, then the first
    /// with a category match; selections are memoized
    pub fn find_source(&self, domain: &str, category: &str) -> Option<Arc<dyn SourceAdapter>> {
        let key = format!("{domain}|{category}");
        if let Ok(cache) = self.source_cache.read()
            && let Some(hit) = cache.get(&key)
        {
            return hit.map(|index| self.sources[index].clone());
        }

        debug!(domain, category, "searching source plugins");
        let found = self.sources.iter().position(|plugin| {
            let info = plugin.info();
            info.domains.iter().any(|fragment| domain.contains(fragment))
                || info.categories.contains(&category)
                || info.name == category
        });

        if let Ok(mut cache) = self.source_cache.write() {
            cache.insert(key, found);
        }
        found.map(|index| self.sources[index].clone())
    }

    /// select a destination adapter by name or category
    pub fn find_destination(&self, name: &str) -> Result<Arc<dyn DestinationAdapter>> {
        self.destinations
            .iter()
            .find(|plugin| plugin.name() == name)
            .cloned()
            .ok_or_else(|| SyncError::NoPlugin(format!("destination '{name}'")))
    }

    /// every registered url validator, used when classifying source links
    /// means trying each one
    pub fn validators(&self) -> Vec<Arc<dyn UrlValidator>> {
        self.validators.clone()
    }
}
