//! Helper utilities.

use std::rc::Rc;
use std::sync::Once;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use log::LevelFilter;
use riven::consts::RegionalRoute;
use riven::{RiotApi, RiotApiConfig};
use secrecy::{ExposeSecret, SecretString};
use web_sys::console;
use web_time::{Duration, SystemTime};
use worker::{console_error, console_log, Cors, Env, Error, Method, Result};

use crate::d1::D1Ledger;
use crate::riot::{parse_region, MatchClient, RiotUpstream};

/// Initialize [`log`] logging into Cloudflare's [`console`] logging system, if not already
/// initialized.
pub fn init_logging(level: LevelFilter) {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        fn hook(info: &std::panic::PanicInfo) {
            console_error!("{}", info);
        }
        std::panic::set_hook(Box::new(hook));
        console_log!("[panic hook set]");

        struct ConsoleLog;
        static LOG: ConsoleLog = ConsoleLog;
        impl log::Log for ConsoleLog {
            fn enabled(&self, metadata: &log::Metadata) -> bool {
                metadata.level() <= log::max_level()
            }

            fn log(&self, record: &log::Record) {
                if !self.enabled(record.metadata()) {
                    return;
                }
                let method = match record.level() {
                    log::Level::Error => console::error_1,
                    log::Level::Warn => console::warn_1,
                    log::Level::Info => console::info_1,
                    log::Level::Debug => console::debug_1,
                    log::Level::Trace => console::trace_1,
                };
                (method)(
                    &format!(
                        "[{} {}] {}",
                        record.level(),
                        record.module_path().unwrap_or("?"),
                        record.args()
                    )
                    .into(),
                );
            }

            fn flush(&self) {}
        }
        match log::set_logger(&LOG) {
            Ok(()) => {
                log::set_max_level(level);
                log::info!("logger set, level: {}", level);
            }
            Err(e) => console_error!("failed to set logger: {}", e),
        }
    });
}

/// Log level from the `LOG_LEVEL` env var, default [`LevelFilter::Info`].
pub fn log_level(env: &Env) -> LevelFilter {
    optional_var(env, "LOG_LEVEL")
        .and_then(|level| level.parse().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Settings from env vars.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Regional route for match-v5 and account-v1 (`RIOT_REGION`).
    pub region: RegionalRoute,
    /// Earliest year to sync for never-synced players (`SYNC_YEAR_FLOOR`). Current year if unset.
    pub year_floor: Option<i32>,
    /// Per-request timeout for Riot API calls (`UPSTREAM_TIMEOUT_SECS`).
    pub request_timeout: Duration,
    /// Allowed cross-origin requester (`CORS_ORIGIN`), `*` for any.
    pub cors_origin: String,
}
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            region: RegionalRoute::AMERICAS,
            year_floor: None,
            request_timeout: Duration::from_secs(10),
            cors_origin: "*".to_owned(),
        }
    }
}
impl AppConfig {
    /// Reads the config, using `lookup` to get (optional) env vars.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(region) = lookup("RIOT_REGION") {
            config.region = parse_region(&region)
                .map_err(|e| Error::RustError(format!("Env var `RIOT_REGION`: {}", e)))?;
        }
        if let Some(year) = lookup("SYNC_YEAR_FLOOR") {
            let year = year.parse().map_err(|e| {
                Error::RustError(format!(
                    "Env var `SYNC_YEAR_FLOOR` should be a year, e.g. `2025`: {}",
                    e
                ))
            })?;
            config.year_floor = Some(year);
        }
        if let Some(secs) = lookup("UPSTREAM_TIMEOUT_SECS") {
            let secs = secs.parse().map_err(|e| {
                Error::RustError(format!(
                    "Env var `UPSTREAM_TIMEOUT_SECS` should be a positive integer string: {}",
                    e
                ))
            })?;
            if 0 == secs {
                return Err(Error::RustError(
                    "Env var `UPSTREAM_TIMEOUT_SECS` must not be zero.".to_owned(),
                ));
            }
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(origin) = lookup("CORS_ORIGIN") {
            config.cors_origin = origin.trim().to_owned();
        }
        Ok(config)
    }

    /// CORS headers for every API response.
    pub fn cors(&self) -> Cors {
        Cors::new()
            .with_origins([self.cors_origin.as_str()])
            .with_methods([Method::Get, Method::Post, Method::Options])
            .with_allowed_headers(["Content-Type"])
            .with_max_age(86_400)
    }

    /// [`Self::year_floor`], or the current UTC year.
    pub fn year_floor(&self) -> i32 {
        self.year_floor
            .unwrap_or_else(|| current_year(SystemTime::now()))
    }
}

/// Everything a request or webjob needs. Built from the [`Env`] once per invocation and passed
/// down explicitly.
pub struct AppState {
    /// Database.
    pub ledger: D1Ledger,
    /// Riot API client, for account lookups. Shared with [`Self::matches`].
    pub riot_api: Rc<RiotApi>,
    /// Match-v5 client.
    pub matches: MatchClient<RiotUpstream>,
    /// Settings.
    pub config: AppConfig,
    /// From [`AppConfig::cors`].
    pub cors: Cors,
}
impl AppState {
    /// Reads bindings, secrets and vars from the env.
    pub fn from_env(env: &Env) -> Result<Self> {
        let config = AppConfig::from_lookup(|name| optional_var(env, name))?;
        let api_key = secret(env, "RGAPI_KEY")?;
        // 429s are retried by `MatchClient`.
        let riot_api = Rc::new(RiotApi::new(
            RiotApiConfig::with_key(api_key.expose_secret()).set_retries(0),
        ));
        let upstream = RiotUpstream::new(Rc::clone(&riot_api), config.request_timeout);
        log::debug!("App state initialized: {:?}", config);
        Ok(Self {
            ledger: D1Ledger::new(env.d1("BINDING_D1_DB")?),
            riot_api,
            matches: MatchClient::new(upstream),
            cors: config.cors(),
            config,
        })
    }
}

/// Get an env var.
pub fn envvar(env: &Env, name: &str) -> Result<String> {
    env.var(name).map(|v| v.to_string())
}
/// Get an env var, `None` if unset or empty.
pub fn optional_var(env: &Env, name: &str) -> Option<String> {
    envvar(env, name).ok().filter(|v| !v.trim().is_empty())
}
/// Get an env secret.
pub fn secret(env: &Env, name: &str) -> Result<SecretString> {
    env.secret(name).map(|v| v.to_string().into())
}

/// January 1st, 00:00 UTC of `year`. Clamped to the unix epoch.
pub fn start_of_year(year: i32) -> SystemTime {
    let secs = NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc().timestamp())
        .unwrap_or(0);
    SystemTime::UNIX_EPOCH + Duration::from_secs(u64::try_from(secs).unwrap_or(0))
}

/// UTC year of `time`.
pub fn current_year(time: SystemTime) -> i32 {
    let secs = i64::try_from(epoch_secs(time)).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|datetime| datetime.year())
        .unwrap_or(1970)
}

/// Whole seconds since the unix epoch, zero for earlier times.
pub fn epoch_secs(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Milliseconds since the unix epoch, zero for earlier times.
pub fn epoch_millis(time: SystemTime) -> i64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
