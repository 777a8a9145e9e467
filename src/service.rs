use crate::{
    cache::LinkCache,
    error::ServiceError,
    models::{expiry_after, now_epoch, Record},
    shortcode::{next_seed, CodeGenerator},
    store::LinkStore,
};
use std::{sync::Arc, time::Duration};

/// Outcome of a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub code: String,
    /// `false` when the code was already bound to the same target.
    pub created: bool,
}

enum Claim {
    Inserted,
    AlreadyBound,
    Taken,
}

/// Ties the code generator, the in-memory index and the durable store
/// together. The HTTP layer only ever talks to this.
///
/// Writes go to the cache first and the store second. If the store write
/// fails the cache entry is taken back out before the error is returned, but
/// a crash between the two steps still loses the code: it was only ever in
/// memory.
#[derive(Clone)]
pub struct ShortenService {
    store: Arc<dyn LinkStore>,
    cache: LinkCache,
    generator: CodeGenerator,
}

impl ShortenService {
    pub fn new(store: Arc<dyn LinkStore>, cache: LinkCache, generator: CodeGenerator) -> Self {
        Self {
            store,
            cache,
            generator,
        }
    }

    pub fn cache(&self) -> &LinkCache {
        &self.cache
    }

    pub fn store(&self) -> &dyn LinkStore {
        self.store.as_ref()
    }

    /// Bind `target` to `alias`, or to a generated code when no alias is
    /// given. A zero `ttl` never expires.
    pub async fn create(
        &self,
        target: &str,
        ttl: Duration,
        alias: Option<&str>,
    ) -> Result<Shortened, ServiceError> {
        match alias {
            Some(alias) => self.create_alias(target, ttl, alias).await,
            None => self.create_generated(target, ttl).await,
        }
    }

    async fn create_alias(
        &self,
        target: &str,
        ttl: Duration,
        alias: &str,
    ) -> Result<Shortened, ServiceError> {
        match self.claim(alias, target, ttl).await? {
            Claim::Inserted => Ok(Shortened {
                code: alias.to_owned(),
                created: true,
            }),
            Claim::AlreadyBound => Ok(Shortened {
                code: alias.to_owned(),
                created: false,
            }),
            Claim::Taken => Err(ServiceError::AliasTaken(alias.to_owned())),
        }
    }

    /// Try codes derived from `target` until one is free or already ours.
    ///
    /// There is no cap on the number of attempts; each collision extends the
    /// seed and tries again.
    async fn create_generated(&self, target: &str, ttl: Duration) -> Result<Shortened, ServiceError> {
        let mut seed = target.to_owned();
        loop {
            let code = self.generator.generate(&seed);
            match self.claim(&code, target, ttl).await? {
                Claim::Inserted => return Ok(Shortened { code, created: true }),
                Claim::AlreadyBound => return Ok(Shortened { code, created: false }),
                Claim::Taken => {
                    tracing::debug!("Code '{}' is taken, retrying with a new seed", code);
                    seed = next_seed(&seed);
                }
            }
        }
    }

    async fn claim(&self, code: &str, target: &str, ttl: Duration) -> Result<Claim, ServiceError> {
        let now = now_epoch();
        let record = Record::new(code, target, expiry_after(now, ttl));

        match self.cache.get_or_insert(record.clone(), now) {
            None => {
                // The cache and the store get the same expiry.
                if let Err(e) = self.store.put(&record).await {
                    tracing::error!("Failed to persist code '{}': {:?}", code, e);
                    // Only undo our own insert; another creator may have
                    // replaced it since.
                    self.cache.remove_exact(&record);
                    return Err(e.into());
                }
                Ok(Claim::Inserted)
            }
            Some(existing) if existing.target == target => Ok(Claim::AlreadyBound),
            Some(_) => Ok(Claim::Taken),
        }
    }

    /// Target for `code`. An expired entry is dropped from the cache on the
    /// spot; the durable copy is left to the store's own expiry.
    pub fn resolve(&self, code: &str) -> Result<String, ServiceError> {
        let record = self.cache.get(code).ok_or(ServiceError::NotFound)?;

        let now = now_epoch();
        if record.is_expired_at(now) {
            self.cache.evict_expired([code], now);
            return Err(ServiceError::NotFound);
        }

        Ok(record.target)
    }

    /// Every live record in the cache, ordered by code.
    pub fn snapshot(&self) -> Vec<Record> {
        let now = now_epoch();
        let mut records: Vec<Record> = self
            .cache
            .snapshot()
            .into_iter()
            .filter(|r| !r.is_expired_at(now))
            .collect();
        records.sort_by(|a, b| a.code.cmp(&b.code));
        records
    }
}
