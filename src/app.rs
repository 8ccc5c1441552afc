//! Application wiring
//!
//! One explicitly constructed instance of each component, shared by
//! reference with whatever needs it.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::auth::{
    HttpTokenExchange, ProfileService, Subscription, TokenEvent, TokenExchange, TokenManager,
    PROFILE_KEY,
};
use crate::cache::ReadThroughCache;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::library::Library;
use crate::storage::{FileStore, KeyValueStore};
use crate::thumbnail::{DatedUploadPath, ThumbnailResolver, UrlHeuristic};

pub struct App {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub tokens: TokenManager,
    pub cache: ReadThroughCache,
    pub profile: ProfileService,
    pub thumbnails: ThumbnailResolver,
    pub library: Library,
    token_watch: Option<Subscription>,
}

impl App {
    /// Open the on-disk store and build every component.
    pub fn init(config: Config) -> Result<Self> {
        let dir = config.data_dir()?;
        let store = FileStore::open(&dir)
            .with_context(|| format!("Failed to open data directory {}", dir.display()))?;
        tracing::debug!("Using data directory {}", store.dir().display());

        let exchange = HttpTokenExchange::new(
            config.identity.token_url.clone(),
            config.identity.client_id.clone(),
        );
        Ok(Self::with_parts(
            config,
            Arc::new(store),
            Arc::new(exchange),
            Arc::new(SystemClock),
        ))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        exchange: Arc<dyn TokenExchange>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tokens = TokenManager::new(
            store.clone(),
            exchange,
            clock.clone(),
            config.refresh_timeout(),
        );
        tokens.init();

        // A dropped session takes the cached profile with it
        let profile_store = store.clone();
        let token_watch = tokens.on_token_change(move |event| {
            if event == TokenEvent::Cleared {
                if let Err(e) = profile_store.remove(PROFILE_KEY) {
                    tracing::warn!("Failed to drop cached profile: {}", e);
                }
            }
        });

        let thumbnails = build_resolver(&config, config.thumbnail_size);

        Self {
            cache: ReadThroughCache::new(store.clone(), clock.clone(), config.cache_ttl()),
            profile: ProfileService::new(
                config.identity.userinfo_url.clone(),
                store.clone(),
                clock.clone(),
                config.profile_ttl(),
            ),
            library: Library::new(store, clock.clone()),
            thumbnails,
            tokens,
            clock,
            config,
            token_watch: Some(token_watch),
        }
    }

    /// Resolver configured like `thumbnails` but for another target size.
    pub fn resolver_for_size(&self, size: u32) -> ThumbnailResolver {
        build_resolver(&self.config, size)
    }

    /// Release observers and in-flight state.
    pub fn dispose(mut self) {
        if let Some(watch) = self.token_watch.take() {
            watch.unsubscribe();
        }
        self.tokens.dispose();
    }
}

fn build_resolver(config: &Config, size: u32) -> ThumbnailResolver {
    let heuristic: Option<Box<dyn UrlHeuristic>> = if config.url_heuristic {
        Some(Box::new(DatedUploadPath))
    } else {
        None
    };
    ThumbnailResolver::new(size, config.placeholder_url.clone()).with_heuristic(heuristic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthTokens, ExchangeError, TokenGrant};
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    const NOW: i64 = 1_700_000_000_000;

    struct Unreachable;

    #[async_trait]
    impl TokenExchange for Unreachable {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, ExchangeError> {
            Err(ExchangeError::Malformed("unreachable".into()))
        }
    }

    fn app(config: Config) -> (App, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let app = App::with_parts(
            config,
            store.clone(),
            Arc::new(Unreachable),
            Arc::new(ManualClock::new(NOW)),
        );
        (app, store)
    }

    #[test]
    fn test_clearing_tokens_drops_cached_profile() {
        let (app, store) = app(Config::default());
        app.tokens
            .set_tokens(AuthTokens::new("A1", None, NOW + 3_600_000));
        store
            .set(PROFILE_KEY, &format!("{{\"sub\":\"1\",\"timestamp\":{}}}", NOW))
            .unwrap();
        assert!(app.profile.cached().is_some());

        app.tokens.clear_tokens();
        assert_eq!(store.get(PROFILE_KEY).unwrap(), None);
        app.dispose();
    }

    #[test]
    fn test_heuristic_follows_config() {
        let record = crate::models::PostRecord {
            url: Some("https://site.example/2024/05/post.html".into()),
            ..Default::default()
        };

        let (with, _) = app(Config::default());
        assert!(with.thumbnails.resolve(&record, &[]).contains("/wp-content/uploads/"));

        let (without, _) = app(Config {
            url_heuristic: false,
            placeholder_url: "https://static.example/none.png".into(),
            ..Config::default()
        });
        assert_eq!(
            without.thumbnails.resolve(&record, &[]),
            "https://static.example/none.png"
        );
    }

    #[test]
    fn test_components_share_one_store() {
        let (app, store) = app(Config::default());
        app.cache.set("posts_page1", &serde_json::json!([{"id": 1}]));
        app.library.add_bookmark("a", "A", None);
        let keys = store.keys().unwrap();
        assert!(keys.contains(&"cache:posts_page1".to_string()));
        assert!(keys.contains(&"bookmarks".to_string()));
    }
}
