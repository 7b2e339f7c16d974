//! # Schema Loader
//!
//! A blocking facade over asynchronous schema bundling.
//!
//! The lint pipeline is synchronous, but bundling may need file and network
//! I/O. [`SchemaLoader`] owns a dedicated `schema-loader` thread running a
//! single-threaded tokio runtime. Each call sends one request over a channel
//! and blocks on one reply. Successful results are cached per reference for
//! the lifetime of the loader; failures are not cached, so a later call
//! retries.
//!
//! ## Timeouts
//!
//! Each load is bounded by [`LoaderConfig::timeout`] inside the worker, so a
//! hung fetch fails that one request and the worker moves on to the next.

use std::collections::HashMap;
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::bundle::Bundler;
use crate::error::LoadError;
use crate::reference::{CacheKey, SchemaReference};

/// Default bound on a single load.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Loader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Bound on one load, including every referenced document. `None`
    /// waits indefinitely.
    pub timeout: Option<Duration>,
    /// Whether `http(s)` documents may be fetched at all.
    pub allow_remote: bool,
    /// `User-Agent` sent with remote requests.
    pub user_agent: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            allow_remote: true,
            user_agent: concat!("fmschema/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl LoaderConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `FMSCHEMA_LOAD_TIMEOUT_SECS` (default: 30; `0` disables the bound)
    /// - `FMSCHEMA_ALLOW_REMOTE` (default: true; accepts `true/false`,
    ///   `1/0`, `yes/no`, `on/off`)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let timeout = match lookup("FMSCHEMA_LOAD_TIMEOUT_SECS")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.timeout,
        };
        let allow_remote = lookup("FMSCHEMA_ALLOW_REMOTE")
            .and_then(|raw| parse_flag(&raw))
            .unwrap_or(defaults.allow_remote);
        Self {
            timeout,
            allow_remote,
            ..defaults
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_allow_remote(mut self, allow_remote: bool) -> Self {
        self.allow_remote = allow_remote;
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Anything that can produce a bundled schema for a reference.
///
/// Implementations report failure as `None` and log the cause.
pub trait SchemaSource {
    fn load(&self, reference: &SchemaReference) -> Option<Arc<Value>>;
}

impl<T: SchemaSource + ?Sized> SchemaSource for &T {
    fn load(&self, reference: &SchemaReference) -> Option<Arc<Value>> {
        (**self).load(reference)
    }
}

impl<T: SchemaSource + ?Sized> SchemaSource for Arc<T> {
    fn load(&self, reference: &SchemaReference) -> Option<Arc<Value>> {
        (**self).load(reference)
    }
}

struct LoadRequest {
    reference: SchemaReference,
    reply: mpsc::Sender<Result<Value, LoadError>>,
}

/// Worker-backed schema loader with a per-reference cache.
pub struct SchemaLoader {
    config: LoaderConfig,
    requests: Option<mpsc::Sender<LoadRequest>>,
    worker: Option<JoinHandle<()>>,
    cache: Mutex<HashMap<CacheKey, Arc<Value>>>,
}

impl std::fmt::Debug for SchemaLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaLoader")
            .field("config", &self.config)
            .field("cached", &self.cached_len())
            .finish()
    }
}

impl SchemaLoader {
    /// Start the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::WorkerUnavailable`] if the HTTP client, the
    /// runtime, or the thread cannot be created.
    pub fn new(config: LoaderConfig) -> Result<Self, LoadError> {
        let unavailable = |reason: String| LoadError::WorkerUnavailable { reason };

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| unavailable(format!("cannot build HTTP client: {e}")))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| unavailable(format!("cannot build runtime: {e}")))?;
        let bundler = Bundler::new(client, config.allow_remote);
        let timeout = config.timeout;

        let (requests, inbox) = mpsc::channel::<LoadRequest>();
        let worker = std::thread::Builder::new()
            .name("schema-loader".to_string())
            .spawn(move || run_worker(runtime, bundler, timeout, inbox))
            .map_err(|e| unavailable(format!("cannot spawn worker thread: {e}")))?;

        Ok(Self {
            config,
            requests: Some(requests),
            worker: Some(worker),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Number of successfully loaded schemas held in the cache.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Load and bundle `reference`, blocking until the worker replies.
    ///
    /// # Errors
    ///
    /// Any [`LoadError`] from bundling, a timeout, or an unavailable worker.
    pub fn try_load(&self, reference: &SchemaReference) -> Result<Arc<Value>, LoadError> {
        let key = reference.cache_key();
        if let Some(schema) = self.cache.lock().get(&key) {
            tracing::trace!(schema = %reference, "schema cache hit");
            return Ok(Arc::clone(schema));
        }

        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| LoadError::WorkerUnavailable {
                reason: "loader is shut down".to_string(),
            })?;
        let (reply, response) = mpsc::channel();
        requests
            .send(LoadRequest {
                reference: reference.clone(),
                reply,
            })
            .map_err(|_| LoadError::WorkerUnavailable {
                reason: "worker thread has exited".to_string(),
            })?;
        let bundled = response.recv().map_err(|_| LoadError::WorkerUnavailable {
            reason: "worker dropped the request".to_string(),
        })??;

        let schema = Arc::new(bundled);
        self.cache.lock().insert(key, Arc::clone(&schema));
        Ok(schema)
    }
}

impl SchemaSource for SchemaLoader {
    fn load(&self, reference: &SchemaReference) -> Option<Arc<Value>> {
        match self.try_load(reference) {
            Ok(schema) => Some(schema),
            Err(e) => {
                tracing::warn!(schema = %reference, error = %e, "failed to load schema");
                None
            }
        }
    }
}

impl Drop for SchemaLoader {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("schema loader worker panicked");
            }
        }
    }
}

fn run_worker(
    runtime: tokio::runtime::Runtime,
    bundler: Bundler,
    timeout: Option<Duration>,
    inbox: mpsc::Receiver<LoadRequest>,
) {
    tracing::debug!(?timeout, "schema loader worker started");
    while let Ok(request) = inbox.recv() {
        let result = runtime.block_on(bundle_within(&bundler, &request.reference, timeout));
        // The caller only goes away if its thread died; nothing to report to.
        let _ = request.reply.send(result);
    }
    tracing::debug!("schema loader worker stopped");
}

async fn bundle_within(
    bundler: &Bundler,
    reference: &SchemaReference,
    timeout: Option<Duration>,
) -> Result<Value, LoadError> {
    let Some(limit) = timeout else {
        return bundler.bundle(reference).await;
    };
    match tokio::time::timeout(limit, bundler.bundle(reference)).await {
        Ok(result) => result,
        Err(_) => Err(LoadError::TimedOut {
            location: reference.display_name(),
            timeout: limit,
        }),
    }
}
