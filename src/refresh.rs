//! Background refresh of cached entries
//!
//! A [`BackgroundRefreshRepository`] keeps selected entries warm with one
//! long-lived tokio task per cache key. Each task loops forever: it asks the
//! source whether the stored entry is stale, primes it if so, then sleeps for
//! the refresh interval. Failures whose type is listed in the task's
//! [`SwallowList`] are logged and the loop carries on; any other failure ends
//! the task and becomes its terminal result.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::key::CacheKey;
use crate::repository::{Repository, RepositoryConfig, Source};

/// Default pause between two refresh iterations of the same key
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Configuration for background refresh
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Sleep between the end of one iteration and the start of the next
    pub refresh_interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl RefreshConfig {
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }
}

type Matcher = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Failures a refresh task survives
///
/// Entries are either callback error types, matched anywhere in the
/// callback error's source chain, or crate [`ErrorKind`]s.
#[derive(Clone, Default)]
pub struct SwallowList {
    entries: Vec<(String, Matcher)>,
}

impl SwallowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swallow callback failures of type `T`
    pub fn error<T>(mut self) -> Self
    where
        T: std::error::Error + 'static,
    {
        let matcher: Matcher = Arc::new(|err: &Error| err.callback_error::<T>().is_some());
        self.entries
            .push((std::any::type_name::<T>().to_string(), matcher));
        self
    }

    /// Swallow every error of `kind`
    pub fn kind(mut self, kind: ErrorKind) -> Self {
        let matcher: Matcher = Arc::new(move |err: &Error| err.kind() == kind);
        self.entries.push((format!("{kind:?}"), matcher));
        self
    }

    pub fn matches(&self, err: &Error) -> bool {
        self.entries.iter().any(|(_, matcher)| matcher(err))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for SwallowList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(label, _)| label))
            .finish()
    }
}

/// Lifecycle of the refresh task for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No task was ever started, or its failure was taken
    NotStarted,
    /// The task is checking, refreshing or sleeping
    Running,
    /// The task stopped on an error that was not swallowed
    Terminated,
}

/// Repository whose entries are kept fresh by per-key background tasks
///
/// Derefs to [`Repository`], so `get`, `prime`, `delete` and friends are all
/// available. Clones share the same task table.
pub struct BackgroundRefreshRepository<S: Source> {
    repository: Repository<S>,
    refresh_interval: Duration,
    tasks: Arc<DashMap<CacheKey, JoinHandle<Error>>>,
}

impl<S: Source> Clone for BackgroundRefreshRepository<S> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            refresh_interval: self.refresh_interval,
            tasks: Arc::clone(&self.tasks),
        }
    }
}

impl<S: Source> fmt::Debug for BackgroundRefreshRepository<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundRefreshRepository")
            .field("repository", &self.repository)
            .field("refresh_interval", &self.refresh_interval)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl<S: Source> Deref for BackgroundRefreshRepository<S> {
    type Target = Repository<S>;

    fn deref(&self) -> &Self::Target {
        &self.repository
    }
}

impl<S: Source> BackgroundRefreshRepository<S> {
    /// Builds the underlying repository and wraps it
    pub fn new(source: S, config: RepositoryConfig, refresh: RefreshConfig) -> Result<Self> {
        Ok(Self::from_repository(Repository::new(source, config)?, refresh))
    }

    pub fn from_repository(repository: Repository<S>, refresh: RefreshConfig) -> Self {
        Self {
            repository,
            refresh_interval: refresh.refresh_interval,
            tasks: Arc::new(DashMap::new()),
        }
    }

    pub fn repository(&self) -> &Repository<S> {
        &self.repository
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Starts the refresh task for `args` unless one is already running
    ///
    /// A key whose previous task terminated gets a new task.
    ///
    /// # Returns
    /// * `Ok(true)` if a task was spawned
    /// * `Ok(false)` if a task for the same key is already running
    /// * `Err(Error::Key)` if the arguments cannot be encoded
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn background_refresh(&self, args: S::Args, swallow: SwallowList) -> Result<bool> {
        let key = self.key(&args)?;
        match self.tasks.entry(key.clone()) {
            Entry::Occupied(entry) if !entry.get().is_finished() => {
                debug!(key = %key, "Background refresh already running");
                return Ok(false);
            }
            Entry::Occupied(mut entry) => {
                entry.insert(self.spawn(key, args, swallow));
            }
            Entry::Vacant(entry) => {
                entry.insert(self.spawn(key, args, swallow));
            }
        }
        Ok(true)
    }

    /// Reports whether the task for `args` is running
    pub fn refresh_state(&self, args: &S::Args) -> Result<RefreshState> {
        let key = self.key(args)?;
        let state = match self.tasks.get(&key) {
            None => RefreshState::NotStarted,
            Some(handle) if handle.is_finished() => RefreshState::Terminated,
            Some(_) => RefreshState::Running,
        };
        Ok(state)
    }

    /// Takes the error that terminated the task for `args`
    ///
    /// Returns `Ok(None)` while the task is running or if none was started.
    /// Once taken, the key reads as [`RefreshState::NotStarted`]. A task that
    /// panicked resumes the panic here.
    pub async fn take_failure(&self, args: &S::Args) -> Result<Option<Error>> {
        let key = self.key(args)?;
        let Some((_, handle)) = self.tasks.remove_if(&key, |_, handle| handle.is_finished()) else {
            return Ok(None);
        };

        match handle.await {
            Ok(err) => Ok(Some(err)),
            Err(join_err) if join_err.is_panic() => std::panic::resume_unwind(join_err.into_panic()),
            Err(_) => Ok(None),
        }
    }

    /// Number of refresh tasks currently running
    pub fn active_tasks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .count()
    }

    fn spawn(&self, key: CacheKey, args: S::Args, swallow: SwallowList) -> JoinHandle<Error> {
        let repository = self.repository.clone();
        let interval = self.refresh_interval;
        tokio::spawn(refresh_loop(repository, key, args, swallow, interval))
    }
}

/// Runs until a failure outside `swallow`, which it returns
async fn refresh_loop<S: Source>(
    repository: Repository<S>,
    key: CacheKey,
    args: S::Args,
    swallow: SwallowList,
    interval: Duration,
) -> Error {
    debug!(
        key = %key,
        interval_ms = interval.as_millis() as u64,
        swallow = ?swallow,
        "Background refresh started"
    );

    loop {
        match refresh_once(&repository, &key, &args).await {
            Ok(true) => debug!(key = %key, "Refreshed stale entry"),
            Ok(false) => debug!(key = %key, "Entry is current"),
            Err(err) if swallow.matches(&err) => {
                warn!(key = %key, error = %err, "Background refresh failed; will retry");
            }
            Err(err) => {
                error!(key = %key, error = %err, "Background refresh terminated");
                return err;
            }
        }
        tokio::time::sleep(interval).await;
    }
}

/// One staleness check, priming the entry if it is stale
async fn refresh_once<S: Source>(
    repository: &Repository<S>,
    key: &CacheKey,
    args: &S::Args,
) -> Result<bool> {
    let cached = repository.lookup(key).await?;
    let stale = repository
        .source()
        .is_stale(args, cached.as_ref())
        .await
        .map_err(|source| Error::Stale {
            key: key.clone(),
            source,
        })?;

    if stale {
        repository.fetch_and_store(key, args).await?;
    }
    Ok(stale)
}
