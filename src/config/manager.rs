//! Config manager (spec §4.11): static and polling config lifecycle, with an
//! atomically-swapped current snapshot, grounded on
//! `optimizely/config_manager.py`'s `PollingConfigManager`/
//! `AuthenticatedPollingConfigManager` and the teacher's
//! `EventQueueOptions`-with-`Default` option-struct idiom.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use log::{debug, error, warn};

use crate::config::project_config::ProjectConfig;
use crate::errors::{XDecideError, XDecideResult};
use crate::notification::{ConfigUpdateNotification, NotificationHub, NotificationPayload, NotificationType};

const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_DATAFILE_URL_TEMPLATE: &str = "https://cdn.optimizely.com/datafiles/{sdk_key}.json";
const DEFAULT_AUTHENTICATED_URL_TEMPLATE: &str = "https://config.optimizely.com/datafiles/auth/{sdk_key}.json";

#[derive(Debug, Clone)]
pub struct ConfigManagerOptions {
    /// Requested poll period. Values under `DEFAULT_POLLING_INTERVAL` clamp
    /// up to it (spec §4.11: "lower values clamp to the default").
    pub polling_interval: Duration,
    /// How long `get_config` will wait for the first successful fetch.
    pub blocking_timeout: Duration,
    pub datafile_url_template: String,
}

impl Default for ConfigManagerOptions {
    fn default() -> Self {
        ConfigManagerOptions {
            polling_interval: DEFAULT_POLLING_INTERVAL,
            blocking_timeout: Duration::from_secs(10),
            datafile_url_template: DEFAULT_DATAFILE_URL_TEMPLATE.to_string(),
        }
    }
}

fn clamp_polling_interval(requested: Duration) -> Duration {
    if requested < DEFAULT_POLLING_INTERVAL {
        DEFAULT_POLLING_INTERVAL
    } else {
        requested
    }
}

struct Ready {
    flag: Mutex<bool>,
    condvar: Condvar,
}

impl Ready {
    fn new(already_ready: bool) -> Self {
        Ready {
            flag: Mutex::new(already_ready),
            condvar: Condvar::new(),
        }
    }

    fn mark(&self) {
        *self.flag.lock().expect("config manager ready flag lock poisoned") = true;
        self.condvar.notify_all();
    }

    fn wait(&self, timeout: Duration) {
        let guard = self.flag.lock().expect("config manager ready flag lock poisoned");
        let _ = self
            .condvar
            .wait_timeout_while(guard, timeout, |ready| !*ready)
            .expect("config manager ready condvar poisoned");
    }
}

/// Owns the current `ProjectConfig` snapshot and, in polling mode, the
/// background thread that keeps it fresh (spec §4.11, §5). The config itself
/// is published by an atomic pointer swap; `decide` callers take one
/// snapshot per call via `get_config` and never observe a torn read.
pub struct ConfigManager {
    current: Arc<ArcSwapOption<ProjectConfig>>,
    ready: Arc<Ready>,
    blocking_timeout: Duration,
    poller: Mutex<Option<PollerHandle>>,
}

struct PollerHandle {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ConfigManager {
    /// Static mode: parses `raw_datafile` once and holds it for the manager's
    /// lifetime. No background thread.
    pub fn new_static(raw_datafile: &str) -> XDecideResult<Self> {
        let config = ProjectConfig::compile(raw_datafile)?;
        Ok(ConfigManager {
            current: Arc::new(ArcSwapOption::from_pointee(config)),
            ready: Arc::new(Ready::new(true)),
            blocking_timeout: Duration::ZERO,
            poller: Mutex::new(None),
        })
    }

    /// Polling mode: fetches `datafile_url_template` with `{sdk_key}`
    /// substituted, on a dedicated background thread, forever until
    /// `stop()` is called.
    pub fn new_polling(sdk_key: &str, options: ConfigManagerOptions, notifications: NotificationHub) -> XDecideResult<Self> {
        Self::start_polling(sdk_key, options, None, notifications)
    }

    /// Authenticated polling mode: adds `Authorization: Bearer <token>` and
    /// defaults to the authenticated datafile URL template unless the caller
    /// overrode `datafile_url_template`. An empty token is a construction
    /// error (spec §4.11).
    pub fn new_authenticated_polling(
        sdk_key: &str,
        access_token: &str,
        mut options: ConfigManagerOptions,
        notifications: NotificationHub,
    ) -> XDecideResult<Self> {
        if access_token.is_empty() {
            return Err(XDecideError::InvalidInput("access token must not be empty".to_string()));
        }
        if options.datafile_url_template == DEFAULT_DATAFILE_URL_TEMPLATE {
            options.datafile_url_template = DEFAULT_AUTHENTICATED_URL_TEMPLATE.to_string();
        }
        Self::start_polling(sdk_key, options, Some(access_token.to_string()), notifications)
    }

    fn start_polling(sdk_key: &str, options: ConfigManagerOptions, access_token: Option<String>, notifications: NotificationHub) -> XDecideResult<Self> {
        let interval = clamp_polling_interval(options.polling_interval);
        let url = options.datafile_url_template.replace("{sdk_key}", sdk_key);

        let current = Arc::new(ArcSwapOption::<ProjectConfig>::from(None));
        let ready = Arc::new(Ready::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let thread_current = current.clone();
        let thread_ready = ready.clone();
        let thread_stop = stop.clone();
        let handle = std::thread::Builder::new()
            .name("xdecide-config-poller".to_string())
            .spawn(move || poll_loop(url, access_token, interval, thread_current, thread_ready, thread_stop, notifications))
            .map_err(|e| XDecideError::InvalidInput(format!("failed to start config poller: {e}")))?;

        Ok(ConfigManager {
            current,
            ready,
            blocking_timeout: options.blocking_timeout,
            poller: Mutex::new(Some(PollerHandle { stop, handle })),
        })
    }

    /// Blocks up to the configured `blocking_timeout` for the first
    /// successful fetch (a no-op wait in static mode, already ready), then
    /// returns the current snapshot, or `None` if nothing has been fetched
    /// yet (spec §4.11).
    pub fn get_config(&self) -> Option<Arc<ProjectConfig>> {
        self.ready.wait(self.blocking_timeout);
        self.current.load_full()
    }

    /// Stops the polling thread, if any, and joins it.
    pub fn stop(&self) {
        let Some(poller) = self.poller.lock().expect("config manager poller lock poisoned").take() else {
            return;
        };
        poller.stop.store(true, Ordering::SeqCst);
        let _ = poller.handle.join();
    }
}

impl Drop for ConfigManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn poll_loop(
    url: String,
    access_token: Option<String>,
    interval: Duration,
    current: Arc<ArcSwapOption<ProjectConfig>>,
    ready: Arc<Ready>,
    stop: Arc<AtomicBool>,
    notifications: NotificationHub,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("config poller failed to start its runtime: {e}");
            return;
        }
    };
    let client = reqwest::Client::new();
    let mut last_modified: Option<String> = None;

    while !stop.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();
        match fetch_once(&runtime, &client, &url, access_token.as_deref(), last_modified.as_deref()) {
            Ok(Some((body, new_last_modified))) => {
                last_modified = new_last_modified.or(last_modified);
                match ProjectConfig::compile(&body) {
                    Ok(parsed) => {
                        let changed = current
                            .load()
                            .as_deref()
                            .map(|existing| existing.revision != parsed.revision)
                            .unwrap_or(true);
                        if changed {
                            let revision = parsed.revision.clone();
                            current.store(Some(Arc::new(parsed)));
                            ready.mark();
                            notifications.send(
                                NotificationType::ConfigUpdate,
                                NotificationPayload::ConfigUpdate(ConfigUpdateNotification { revision }),
                            );
                        } else {
                            ready.mark();
                        }
                    }
                    Err(e) => warn!("datafile fetched but failed to parse: {e}"),
                }
            }
            Ok(None) => debug!("datafile unchanged (304)"),
            Err(e) => warn!("datafile fetch failed: {e}"),
        }

        let elapsed = cycle_start.elapsed();
        let remaining = interval.saturating_sub(elapsed);
        let slept = sleep_unless_stopped(remaining, &stop);
        if !slept {
            break;
        }
    }
}

/// Sleeps in short slices so `stop()` is noticed promptly rather than after
/// a full polling interval. Returns `false` if a stop was observed.
fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) -> bool {
    const SLICE: Duration = Duration::from_millis(200);
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let nap = remaining.min(SLICE);
        std::thread::sleep(nap);
        remaining -= nap;
    }
    !stop.load(Ordering::SeqCst)
}

/// Fetches the datafile with a conditional GET. `Ok(Some((body,
/// last_modified)))` on 200, `Ok(None)` on 304, `Err` otherwise.
fn fetch_once(
    runtime: &tokio::runtime::Runtime,
    client: &reqwest::Client,
    url: &str,
    access_token: Option<&str>,
    if_modified_since: Option<&str>,
) -> Result<Option<(String, Option<String>)>, String> {
    runtime.block_on(async {
        let mut request = client.get(url);
        if let Some(token) = access_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(since) = if_modified_since {
            request = request.header("If-Modified-Since", since);
        }

        let response = request.send().await.map_err(|e| format!("network error: {e}"))?;
        if response.status().as_u16() == 304 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(format!("http status {}", response.status()));
        }
        let last_modified = response
            .headers()
            .get("Last-Modified")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|e| format!("failed to read body: {e}"))?;
        Ok(Some((body, last_modified)))
    })
}

#[cfg(test)]
mod manager_tests;
