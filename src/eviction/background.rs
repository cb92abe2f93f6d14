//! Background cleaner lifecycle
//!
//! A [`CacheCleaner`] runs cleaning sessions on tokio's blocking pool, either
//! once (`interval_secs == 0`) or on a recurring timer. The timer is disarmed
//! while a session runs and re-armed when it completes, so sessions for one
//! cleaner never overlap. `stop()` disarms the timer and cancels the running
//! session cooperatively; callers poll [`CacheCleaner::is_running`] or await
//! [`CacheCleaner::wait_idle`] to learn when all work has ceased.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::fs::{CacheFs, LocalFs};
use super::policy::{CachePolicy, PolicyError};
use super::session::CleaningSession;
use super::CleanerStats;
use crate::logging::{operations, status};

#[derive(Debug, Error)]
pub enum CleanerError {
    #[error("Configuration can only change while the cleaner is idle")]
    Busy,

    #[error("Delayed start for cache cleaner already pending, can't start again")]
    DelayedStartPending,

    #[error("No tokio runtime available to schedule the cleaner")]
    NoRuntime,

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Lifecycle state of a [`CacheCleaner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanerState {
    /// No timer armed and no session in flight
    Idle,
    /// A session is running or the recurring timer is armed
    Running,
    /// `stop()` was called; waiting for the in-flight work to wind down
    StopRequested,
}

struct Inner {
    policy: CachePolicy,
    state: CleanerState,
    cancel: Option<CancellationToken>,
    delayed_start: Option<JoinHandle<()>>,
    /// Bumped by every `stop()`; a delayed start only fires in the epoch it
    /// was scheduled in
    stop_epoch: u64,
}

struct Shared {
    fs: Arc<dyn CacheFs>,
    inner: Mutex<Inner>,
    idle: Notify,
    stats: Arc<CleanerStats>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drive one `start()`: a single session, or the timer loop
    async fn drive(&self, policy: CachePolicy, cancel: CancellationToken) {
        let Some(interval) = policy.interval() else {
            self.run_session(&policy, &cancel).await;
            return;
        };

        info!(
            root = %policy.root_path().display(),
            interval_secs = interval.as_secs(),
            "Created directory cleaning timer"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            self.run_session(&policy, &cancel).await;

            if cancel.is_cancelled() {
                break;
            }
            debug!(root = %policy.root_path().display(), "Re-arming cache cleaning timer");
        }

        info!(root = %policy.root_path().display(), "Directory cleaning timer stopped");
    }

    /// Run one session to completion on the blocking pool
    ///
    /// Errors and panics are logged and counted, never propagated.
    async fn run_session(&self, policy: &CachePolicy, cancel: &CancellationToken) {
        let root = policy.root_path().to_path_buf();
        let fs = Arc::clone(&self.fs);
        let mut session = CleaningSession::new(policy);
        let worker_cancel = cancel.clone();
        let start = Instant::now();

        info!(root = %root.display(), "Starting to clean directory");

        let result = tokio::task::spawn_blocking(move || {
            let outcome = session.run(fs.as_ref(), &worker_cancel);
            (session, outcome)
        })
        .await;

        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok((session, Ok(bytes_removed))) => {
                self.stats.record_session(bytes_removed, session.cancelled());
                if session.cancelled() {
                    info!(
                        operation = operations::SESSION,
                        status = status::CANCELLED,
                        root = %root.display(),
                        bytes_removed,
                        duration_ms,
                        "Cache directory cleaning cancelled before completion"
                    );
                } else {
                    info!(
                        operation = operations::SESSION,
                        status = status::SUCCESS,
                        root = %root.display(),
                        bytes_removed,
                        mb_removed = bytes_removed / (1024 * 1024),
                        duration_ms,
                        "Finished cleaning directory"
                    );
                }
            }
            Ok((_, Err(e))) => {
                self.stats.record_failure();
                error!(
                    operation = operations::SESSION,
                    status = status::ERROR,
                    root = %root.display(),
                    error = %e,
                    "Error while cleaning cache"
                );
            }
            Err(e) => {
                self.stats.record_failure();
                error!(
                    operation = operations::SESSION,
                    status = status::ERROR,
                    root = %root.display(),
                    error = %e,
                    "Cache cleaning worker failed"
                );
            }
        }
    }

    fn finish(&self) {
        {
            let mut inner = self.lock();
            inner.state = CleanerState::Idle;
            inner.cancel = None;
        }
        self.idle.notify_waiters();
        debug!("Cache cleaner is idle");
    }
}

/// Returns the cleaner to `Idle` when the driver task ends, however it ends
struct IdleGuard(Arc<Shared>);

impl Drop for IdleGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Keeps a directory below a size ceiling, once or periodically
///
/// Cloning yields another handle to the same cleaner.
#[derive(Clone)]
pub struct CacheCleaner {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for CacheCleaner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("CacheCleaner")
            .field("policy", &inner.policy)
            .field("state", &inner.state)
            .finish()
    }
}

impl CacheCleaner {
    /// Create a cleaner over the local filesystem
    pub fn new(policy: CachePolicy) -> Self {
        Self::with_fs(policy, LocalFs)
    }

    /// Create a cleaner over a custom filesystem
    pub fn with_fs<F: CacheFs>(policy: CachePolicy, fs: F) -> Self {
        info!(
            root = %policy.root_path().display(),
            max_size_bytes = policy.max_size_bytes(),
            buffer_percent = policy.buffer_percent(),
            interval_secs = policy.interval_secs(),
            "Cache cleaner initialized"
        );

        Self {
            shared: Arc::new(Shared {
                fs: Arc::new(fs),
                inner: Mutex::new(Inner {
                    policy,
                    state: CleanerState::Idle,
                    cancel: None,
                    delayed_start: None,
                    stop_epoch: 0,
                }),
                idle: Notify::new(),
                stats: Arc::new(CleanerStats::new()),
            }),
        }
    }

    /// Current policy
    pub fn policy(&self) -> CachePolicy {
        self.shared.lock().policy.clone()
    }

    pub fn state(&self) -> CleanerState {
        self.shared.lock().state
    }

    /// Whether there is outstanding work: an armed timer or a session in
    /// flight, including one that has been asked to stop
    pub fn is_running(&self) -> bool {
        self.state() != CleanerState::Idle
    }

    /// Whether a `start_delayed` is waiting to fire
    pub fn has_pending_start(&self) -> bool {
        self.shared
            .lock()
            .delayed_start
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn stats(&self) -> Arc<CleanerStats> {
        Arc::clone(&self.shared.stats)
    }

    /// Replace the whole policy
    pub fn configure(&self, policy: CachePolicy) -> Result<(), CleanerError> {
        self.update_policy(|current| {
            *current = policy;
            Ok(())
        })
    }

    pub fn set_root_path(&self, root_path: impl Into<PathBuf>) -> Result<(), CleanerError> {
        let root_path = root_path.into();
        debug!(root = %root_path.display(), "Setting the cleaning directory");
        self.update_policy(|p| {
            p.set_root_path(root_path);
            Ok(())
        })
    }

    pub fn set_max_size_bytes(&self, max_size_bytes: u64) -> Result<(), CleanerError> {
        self.update_policy(|p| {
            p.set_max_size_bytes(max_size_bytes);
            Ok(())
        })
    }

    pub fn set_max_size_mb(&self, max_size_mb: u64) -> Result<(), CleanerError> {
        self.update_policy(|p| p.set_max_size_mb(max_size_mb))
    }

    pub fn set_buffer_percent(&self, buffer_percent: u8) -> Result<(), CleanerError> {
        self.update_policy(|p| p.set_buffer_percent(buffer_percent))
    }

    pub fn set_interval_secs(&self, interval_secs: u64) -> Result<(), CleanerError> {
        debug!(interval_secs, "Setting new interval");
        self.update_policy(|p| {
            p.set_interval_secs(interval_secs);
            Ok(())
        })
    }

    fn update_policy(
        &self,
        update: impl FnOnce(&mut CachePolicy) -> Result<(), PolicyError>,
    ) -> Result<(), CleanerError> {
        let mut inner = self.shared.lock();
        if inner.state != CleanerState::Idle {
            return Err(CleanerError::Busy);
        }

        // Validate on a copy so a rejected value leaves the policy untouched
        let mut policy = inner.policy.clone();
        update(&mut policy)?;
        inner.policy = policy;
        Ok(())
    }

    /// Start cleaning
    ///
    /// With an interval of 0 a single session runs in the background;
    /// otherwise a session runs every `interval_secs` until [`Self::stop`].
    /// Returns `false` without changing state when the cleaner is already
    /// running, the directory does not exist, or no tokio runtime is
    /// available.
    pub fn start(&self) -> bool {
        self.start_if(|_| true).unwrap_or(false)
    }

    /// Shared body of `start()` and the delayed start
    ///
    /// The directory check runs without the lock held. Once the lock is
    /// re-taken, `admit` decides whether the start still applies; `None`
    /// means it declined and nothing was attempted.
    fn start_if(&self, mut admit: impl FnMut(&mut Inner) -> bool) -> Option<bool> {
        loop {
            let root = self.shared.lock().policy.root_path().to_path_buf();
            let root_exists = self.shared.fs.is_dir(&root);

            let mut inner = self.shared.lock();
            if inner.policy.root_path() != root {
                // Reconfigured while checking; check the new root instead
                continue;
            }

            if !admit(&mut *inner) {
                return None;
            }

            if inner.state != CleanerState::Idle {
                error!(root = %root.display(), "Cleaner is already running, can't start again");
                return Some(false);
            }

            if !root_exists {
                error!(
                    root = %root.display(),
                    "Can't start cleaning a directory that does not exist"
                );
                return Some(false);
            }

            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                error!(root = %root.display(), "Can't start cleaning outside a tokio runtime");
                return Some(false);
            };

            let cancel = CancellationToken::new();
            inner.state = CleanerState::Running;
            inner.cancel = Some(cancel.clone());
            let policy = inner.policy.clone();
            drop(inner);

            let guard = IdleGuard(Arc::clone(&self.shared));
            runtime.spawn(async move {
                guard.0.drive(policy, cancel).await;
                drop(guard);
            });

            return Some(true);
        }
    }

    /// Start cleaning after `delay`
    ///
    /// Only one delayed start may be pending at a time. A start refused when
    /// the delay elapses is logged. A `stop()` issued any time before the
    /// start takes effect cancels it.
    pub fn start_delayed(&self, delay: Duration) -> Result<(), CleanerError> {
        let mut inner = self.shared.lock();
        if inner
            .delayed_start
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            return Err(CleanerError::DelayedStartPending);
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| CleanerError::NoRuntime)?;

        debug!(delay_ms = delay.as_millis() as u64, "Scheduling delayed cleaner start");

        let epoch = inner.stop_epoch;
        let cleaner = self.clone();
        inner.delayed_start = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let started = cleaner.start_if(|inner| {
                if inner.stop_epoch != epoch {
                    return false;
                }
                inner.delayed_start = None;
                true
            });
            match started {
                Some(true) => {}
                Some(false) => error!("Failed to delay start the cache cleaner"),
                None => debug!("Delayed start was stopped before it fired"),
            }
        }));

        Ok(())
    }

    /// Stop scheduling sessions and cancel the running one
    ///
    /// Returns immediately. The in-flight session stops at its next entry
    /// boundary; [`Self::is_running`] stays true until it has.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        inner.stop_epoch += 1;

        if let Some(handle) = inner.delayed_start.take() {
            handle.abort();
            debug!("Cancelled pending delayed start");
        }

        if let Some(cancel) = &inner.cancel {
            info!(
                root = %inner.policy.root_path().display(),
                "Stopping directory cleaning"
            );
            cancel.cancel();
        }

        if inner.state == CleanerState::Running {
            inner.state = CleanerState::StopRequested;
        }
    }

    /// Wait until the cleaner has no outstanding work
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }

    /// [`Self::wait_idle`] with an upper bound; returns whether it went idle
    pub async fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.wait_idle()).await {
            Ok(()) => true,
            Err(_) => {
                warn!("Cache cleaner did not stop in time");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::{directory_size, DirectoryEntrySnapshot};
    use std::fs;
    use std::io;
    use std::path::Path;
    use tempfile::TempDir;

    fn create_files(dir: &Path, prefix: &str, count: usize, size: usize) {
        for i in 0..count {
            fs::write(dir.join(format!("{} {}.test", prefix, i)), vec![0u8; size]).unwrap();
        }
    }

    fn single_pass(dir: &Path, max_size_bytes: u64) -> CachePolicy {
        CachePolicy::new(dir, max_size_bytes, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_single_pass_returns_to_idle() {
        let temp = TempDir::new().unwrap();
        create_files(temp.path(), "File number", 20, 100);

        let cleaner = CacheCleaner::new(single_pass(temp.path(), 1000));
        assert_eq!(cleaner.state(), CleanerState::Idle);

        assert!(cleaner.start());
        assert!(cleaner.is_running());
        assert!(cleaner.wait_idle_timeout(Duration::from_secs(10)).await);

        assert!(!cleaner.is_running());
        assert!(directory_size(&LocalFs, temp.path()) <= 1000);
        assert_eq!(cleaner.stats().get_sessions_completed(), 1);
        assert_eq!(cleaner.stats().get_last_bytes_removed(), 1000);
    }

    #[tokio::test]
    async fn test_start_while_running_is_refused() {
        let temp = TempDir::new().unwrap();
        create_files(temp.path(), "File number", 10, 100);

        let policy = CachePolicy::new(temp.path(), 100, 0, 60).unwrap();
        let cleaner = CacheCleaner::new(policy);

        assert!(cleaner.start());
        assert!(!cleaner.start());
        assert_eq!(cleaner.state(), CleanerState::Running);

        cleaner.stop();
        assert!(cleaner.wait_idle_timeout(Duration::from_secs(10)).await);
        assert_eq!(cleaner.stats().sessions_total(), 0);
    }

    #[tokio::test]
    async fn test_start_with_missing_directory_is_refused() {
        let temp = TempDir::new().unwrap();
        let cleaner = CacheCleaner::new(CachePolicy::for_dir(temp.path().join("missing")));

        assert!(!cleaner.start());
        assert_eq!(cleaner.state(), CleanerState::Idle);
    }

    #[test]
    fn test_start_outside_runtime_is_refused() {
        let temp = TempDir::new().unwrap();
        let cleaner = CacheCleaner::new(CachePolicy::for_dir(temp.path()));

        assert!(!cleaner.start());
        assert!(!cleaner.is_running());
        assert!(matches!(
            cleaner.start_delayed(Duration::from_secs(1)),
            Err(CleanerError::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn test_configure_only_while_idle() {
        let temp = TempDir::new().unwrap();
        let cleaner = CacheCleaner::new(CachePolicy::new(temp.path(), 100, 0, 60).unwrap());

        assert!(cleaner.set_max_size_bytes(5000).is_ok());
        assert!(matches!(
            cleaner.set_buffer_percent(100),
            Err(CleanerError::Policy(PolicyError::BufferOutOfRange(100)))
        ));
        assert_eq!(cleaner.policy().buffer_percent(), 0);

        assert!(cleaner.start());
        assert!(matches!(
            cleaner.set_interval_secs(5),
            Err(CleanerError::Busy)
        ));
        assert!(matches!(
            cleaner.configure(CachePolicy::default()),
            Err(CleanerError::Busy)
        ));

        cleaner.stop();
        assert!(cleaner.wait_idle_timeout(Duration::from_secs(10)).await);
        assert!(cleaner.set_max_size_mb(2).is_ok());
        assert_eq!(cleaner.policy().max_size_bytes(), 2 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_stop_disarms_timer() {
        let temp = TempDir::new().unwrap();
        create_files(temp.path(), "File number", 10, 100);

        let cleaner = CacheCleaner::new(CachePolicy::new(temp.path(), 100, 0, 3600).unwrap());
        assert!(cleaner.start());

        cleaner.stop();
        assert!(cleaner.wait_idle_timeout(Duration::from_secs(10)).await);

        // Timer never fired, nothing was cleaned
        assert_eq!(directory_size(&LocalFs, temp.path()), 1000);
        assert!(cleaner.start());
        cleaner.stop();
        assert!(cleaner.wait_idle_timeout(Duration::from_secs(10)).await);
    }

    #[tokio::test]
    async fn test_recurring_sessions_re_arm_timer() {
        let temp = TempDir::new().unwrap();
        create_files(temp.path(), "first", 10, 100);

        let cleaner = CacheCleaner::new(CachePolicy::new(temp.path(), 500, 0, 1).unwrap());
        assert!(cleaner.start());

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert!(directory_size(&LocalFs, temp.path()) <= 500);

        create_files(temp.path(), "second", 10, 100);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(directory_size(&LocalFs, temp.path()) <= 500);
        assert!(cleaner.is_running());

        cleaner.stop();
        assert!(cleaner.wait_idle_timeout(Duration::from_secs(10)).await);
        assert!(cleaner.stats().get_sessions_completed() >= 2);
    }

    #[tokio::test]
    async fn test_session_error_does_not_leave_cleaner_stuck() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");
        fs::create_dir(&root).unwrap();

        let cleaner = CacheCleaner::new(CachePolicy::new(&root, 100, 0, 1).unwrap());
        assert!(cleaner.start());

        fs::remove_dir(&root).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(cleaner.stats().get_sessions_failed() >= 1);
        assert!(cleaner.is_running());

        cleaner.stop();
        assert!(cleaner.wait_idle_timeout(Duration::from_secs(10)).await);
    }

    #[tokio::test]
    async fn test_delayed_start() {
        let temp = TempDir::new().unwrap();
        create_files(temp.path(), "File number", 10, 100);

        let cleaner = CacheCleaner::new(single_pass(temp.path(), 500));
        cleaner.start_delayed(Duration::from_millis(100)).unwrap();
        assert!(cleaner.has_pending_start());
        assert!(matches!(
            cleaner.start_delayed(Duration::from_millis(100)),
            Err(CleanerError::DelayedStartPending)
        ));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(cleaner.wait_idle_timeout(Duration::from_secs(10)).await);

        assert!(!cleaner.has_pending_start());
        assert!(directory_size(&LocalFs, temp.path()) <= 500);
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_delayed_start() {
        let temp = TempDir::new().unwrap();
        create_files(temp.path(), "File number", 10, 100);

        let cleaner = CacheCleaner::new(single_pass(temp.path(), 500));
        cleaner.start_delayed(Duration::from_millis(200)).unwrap();
        cleaner.stop();

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(!cleaner.has_pending_start());
        assert!(!cleaner.is_running());
        assert_eq!(directory_size(&LocalFs, temp.path()), 1000);
        assert!(cleaner.start_delayed(Duration::from_secs(60)).is_ok());
        cleaner.stop();
        assert!(!cleaner.has_pending_start());
    }

    type Hook = Box<dyn FnOnce() + Send>;

    /// Local filesystem that runs a one-shot hook inside the first `is_dir`
    struct HookFs {
        hook: Arc<Mutex<Option<Hook>>>,
    }

    impl CacheFs for HookFs {
        fn list_dir(&self, dir: &Path) -> io::Result<Vec<DirectoryEntrySnapshot>> {
            LocalFs.list_dir(dir)
        }

        fn is_dir(&self, path: &Path) -> bool {
            let hook = self.hook.lock().unwrap().take();
            if let Some(hook) = hook {
                hook();
            }
            LocalFs.is_dir(path)
        }

        fn remove_file(&self, path: &Path) -> io::Result<()> {
            LocalFs.remove_file(path)
        }

        fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
            LocalFs.remove_dir_all(path)
        }
    }

    fn cleaner_with_hook(policy: CachePolicy) -> (CacheCleaner, Arc<Mutex<Option<Hook>>>) {
        let hook = Arc::new(Mutex::new(None));
        let cleaner = CacheCleaner::with_fs(
            policy,
            HookFs {
                hook: Arc::clone(&hook),
            },
        );
        (cleaner, hook)
    }

    #[tokio::test]
    async fn test_start_checks_directory_without_holding_the_lock() {
        let temp = TempDir::new().unwrap();
        create_files(temp.path(), "File number", 20, 100);

        let (cleaner, hook) = cleaner_with_hook(single_pass(temp.path(), 1000));
        let observer = cleaner.clone();
        *hook.lock().unwrap() = Some(Box::new(move || {
            assert_eq!(observer.state(), CleanerState::Idle);
        }));

        assert!(cleaner.start());
        assert!(cleaner.wait_idle_timeout(Duration::from_secs(10)).await);
        assert!(hook.lock().unwrap().is_none());
        assert!(directory_size(&LocalFs, temp.path()) <= 1000);
    }

    #[tokio::test]
    async fn test_stop_while_delayed_start_fires_wins() {
        let temp = TempDir::new().unwrap();
        create_files(temp.path(), "File number", 20, 100);

        let (cleaner, hook) = cleaner_with_hook(single_pass(temp.path(), 1000));
        let stopper = cleaner.clone();
        // The stop lands after the delay elapsed, between the timer firing
        // and the cleaner being armed
        *hook.lock().unwrap() = Some(Box::new(move || stopper.stop()));

        cleaner.start_delayed(Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(hook.lock().unwrap().is_none());
        assert!(!cleaner.is_running());
        assert!(!cleaner.has_pending_start());
        assert_eq!(cleaner.stats().sessions_total(), 0);
        assert_eq!(directory_size(&LocalFs, temp.path()), 2000);
    }
}
