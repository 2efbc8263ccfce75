//! Configuration loading and validation
//!
//! Settings come from a YAML file with environment overrides
//! (`ALERTBRIDGE__SECTION__KEY`). Everything is validated eagerly; a
//! configuration that loads is safe to serve with.

use crate::logging::{parse_level, LogFormat, LogSettings};
use alerting::{AlertDefaults, AlertError, AppIdentity, Severity, SeverityMap};
use config::{Config, Environment, File, FileFormat};
use delivery::{ClientConfig, UpstreamAuth};
use ingest::AppRegistry;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const ENV_PREFIX: &str = "ALERTBRIDGE";
pub const ENV_SEPARATOR: &str = "__";

pub const DEFAULT_LISTEN_ADDR: &str = ":8080";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_BODY_BYTES: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file path is empty")]
    EmptyPath,

    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("load config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("parse config labels: {0}")]
    Labels(#[from] serde_yaml::Error),

    #[error("{field}: {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: impl Into<String>, reason: impl fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.to_string(),
    }
}

/// Marker used in place of a token in errors and logs
pub fn redact_token(token: &str) -> String {
    format!("token(len={})", token.chars().count())
}

/// Parse a duration made of `<int><unit>` groups, e.g. `1h30m` or `250ms`.
///
/// Units: `ms`, `s`, `m`, `h`. A bare `0` is accepted.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }
    if text.starts_with('-') {
        return Err(format!("duration {text:?} must be >= 0"));
    }
    if text == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("invalid duration {text:?}"));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid duration {text:?}"))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let seconds_per_unit = match unit {
            "ms" => {
                total = total
                    .checked_add(Duration::from_millis(value))
                    .ok_or_else(|| format!("duration {text:?} overflows"))?;
                continue;
            }
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            "" => return Err(format!("missing unit in duration {text:?}")),
            other => return Err(format!("unknown unit {other:?} in duration {text:?}")),
        };
        let step = value
            .checked_mul(seconds_per_unit)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration {text:?} overflows"))?;
        total = total
            .checked_add(step)
            .ok_or_else(|| format!("duration {text:?} overflows"))?;
    }

    Ok(total)
}

// Raw shapes as read from YAML and the environment.

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    server: RawServer,
    logging: RawLogging,
    alertmanager: RawAlertmanager,
    defaults: RawDefaults,
    apps: Vec<RawApp>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawServer {
    listen_addr: Option<String>,
    request_timeout: Option<String>,
    read_timeout: Option<String>,
    write_timeout: Option<String>,
    shutdown_timeout: Option<String>,
    max_body_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLogging {
    format: Option<String>,
    level: Option<String>,
    include_time: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAlertmanager {
    url: String,
    timeout: Option<String>,
    insecure_skip_verify: bool,
    basic_auth: Option<RawBasicAuth>,
    bearer_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBasicAuth {
    username: String,
    password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDefaults {
    alertname: String,
    ttl: Option<String>,
    severity_from_priority: BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawApp {
    token: String,
    app_name: String,
    alertname: String,
    labels: BTreeMap<String, String>,
    severity_from_priority: BTreeMap<String, String>,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub listen_addr: String,
    pub request_timeout: Duration,
    /// Bound on receiving request headers, and separately the body
    pub read_timeout: Duration,
    /// Bound on producing a response
    pub write_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerSettings {
    /// Socket address to bind. A leading `:` means all interfaces.
    pub fn bind_addr(&self) -> String {
        match self.listen_addr.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.listen_addr.clone(),
        }
    }
}

/// Upstream connection settings
#[derive(Debug, Clone)]
pub struct AlertmanagerSettings {
    pub url: String,
    /// Per-attempt timeout and overall delivery bound; zero means the client default
    pub timeout: Duration,
    pub insecure_skip_verify: bool,
    pub auth: UpstreamAuth,
}

impl AlertmanagerSettings {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.url.clone())
            .with_timeout(self.timeout)
            .with_insecure_skip_verify(self.insecure_skip_verify)
            .with_auth(self.auth.clone())
    }
}

/// A configured application and the token that identifies it
#[derive(Clone)]
pub struct AppEntry {
    pub token: String,
    pub identity: AppIdentity,
}

impl fmt::Debug for AppEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppEntry")
            .field("token", &redact_token(&self.token))
            .field("identity", &self.identity)
            .finish()
    }
}

/// Validated process configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LogSettings,
    pub alertmanager: AlertmanagerSettings,
    pub defaults: AlertDefaults,
    pub apps: Vec<AppEntry>,
}

impl Settings {
    /// Load a YAML file, apply environment overrides, and validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`Settings::load`], reading overrides from `env` instead of the
    /// process environment when given.
    pub fn load_with_env(
        path: &Path,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath);
        }

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let raw: RawSettings = Config::builder()
            .add_source(File::from_str(&text, FileFormat::Yaml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        raw.with_written_labels(&text)?.validate()
    }

    /// Parse and validate YAML text, without environment overrides
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let raw: RawSettings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        raw.with_written_labels(text)?.validate()
    }

    /// Token table for request authentication
    pub fn registry(&self) -> AppRegistry {
        self.apps
            .iter()
            .map(|entry| (entry.token.clone(), entry.identity.clone()))
            .collect()
    }
}

/// Label maps exactly as written in the YAML text. The layered loader
/// lowercases map keys, and label names are case-sensitive upstream.
#[derive(Default, Deserialize)]
#[serde(default)]
struct WrittenLabels {
    defaults: WrittenSection,
    apps: Vec<WrittenSection>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct WrittenSection {
    labels: serde_yaml::Mapping,
}

impl WrittenSection {
    fn labels(&self) -> BTreeMap<String, String> {
        self.labels
            .iter()
            .filter_map(|(key, value)| Some((yaml_scalar(key)?, yaml_scalar(value)?)))
            .collect()
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(text) => Some(text.clone()),
        serde_yaml::Value::Number(number) => Some(number.to_string()),
        serde_yaml::Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Put back the written key case on `loaded`.
///
/// Written keys and values are kept as-is. A loaded key that matches exactly
/// one written key case-insensitively carries an override onto that key; one
/// with no written counterpart came from the environment and is added.
fn restore_label_case(
    loaded: BTreeMap<String, String>,
    written: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut labels = written.clone();
    for (key, value) in loaded {
        let mut matches = written.keys().filter(|name| name.to_lowercase() == key.to_lowercase());
        match (matches.next(), matches.next()) {
            (None, _) => {
                labels.insert(key, value);
            }
            (Some(name), None) => {
                labels.insert(name.clone(), value);
            }
            // Keys differing only in case were merged while loading.
            (Some(_), Some(_)) => {}
        }
    }
    labels
}

impl RawSettings {
    fn with_written_labels(mut self, text: &str) -> Result<Self, ConfigError> {
        let written: WrittenLabels = match serde_yaml::from_str::<Option<WrittenLabels>>(text)? {
            Some(written) => written,
            None => return Ok(self),
        };

        self.defaults.labels = restore_label_case(
            std::mem::take(&mut self.defaults.labels),
            written.defaults.labels(),
        );
        for (app, section) in self.apps.iter_mut().zip(&written.apps) {
            app.labels = restore_label_case(std::mem::take(&mut app.labels), section.labels());
        }
        Ok(self)
    }

    fn validate(self) -> Result<Settings, ConfigError> {
        Ok(Settings {
            server: self.server.validate()?,
            logging: self.logging.validate()?,
            alertmanager: self.alertmanager.validate()?,
            defaults: self.defaults.validate()?,
            apps: validate_apps(self.apps)?,
        })
    }
}

fn optional_duration(field: &str, raw: Option<&str>, fallback: Duration) -> Result<Duration, ConfigError> {
    match raw.map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => parse_duration(text).map_err(|reason| invalid(field, reason)),
        None => Ok(fallback),
    }
}

impl RawServer {
    fn validate(self) -> Result<ServerSettings, ConfigError> {
        let listen_addr = match self.listen_addr.as_deref().map(str::trim) {
            Some(addr) if !addr.is_empty() => addr.to_string(),
            _ => DEFAULT_LISTEN_ADDR.to_string(),
        };

        // Zero durations fall back to the defaults.
        let request_timeout = optional_duration(
            "server.request_timeout",
            self.request_timeout.as_deref(),
            DEFAULT_REQUEST_TIMEOUT,
        )?;
        let read_timeout = optional_duration(
            "server.read_timeout",
            self.read_timeout.as_deref(),
            DEFAULT_READ_TIMEOUT,
        )?;
        let write_timeout = optional_duration(
            "server.write_timeout",
            self.write_timeout.as_deref(),
            DEFAULT_WRITE_TIMEOUT,
        )?;
        let shutdown_timeout = optional_duration(
            "server.shutdown_timeout",
            self.shutdown_timeout.as_deref(),
            DEFAULT_SHUTDOWN_TIMEOUT,
        )?;

        Ok(ServerSettings {
            listen_addr,
            request_timeout: non_zero_or(request_timeout, DEFAULT_REQUEST_TIMEOUT),
            read_timeout: non_zero_or(read_timeout, DEFAULT_READ_TIMEOUT),
            write_timeout: non_zero_or(write_timeout, DEFAULT_WRITE_TIMEOUT),
            shutdown_timeout: non_zero_or(shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT),
            max_body_bytes: self
                .max_body_bytes
                .filter(|bytes| *bytes > 0)
                .unwrap_or(DEFAULT_MAX_BODY_BYTES),
        })
    }
}

fn non_zero_or(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

impl RawLogging {
    fn validate(self) -> Result<LogSettings, ConfigError> {
        let mut settings = LogSettings {
            include_time: self.include_time,
            ..LogSettings::default()
        };

        if let Some(format) = self.format.as_deref().filter(|f| !f.trim().is_empty()) {
            settings.format = format
                .parse::<LogFormat>()
                .map_err(|err| invalid("logging.format", err))?;
        }
        if let Some(level) = self.level.as_deref().filter(|l| !l.trim().is_empty()) {
            settings.level = parse_level(level).map_err(|err| invalid("logging.level", err))?;
        }

        Ok(settings)
    }
}

impl RawAlertmanager {
    fn validate(self) -> Result<AlertmanagerSettings, ConfigError> {
        let url = self.url.trim().to_string();
        if url.is_empty() {
            return Err(invalid("alertmanager.url", "is required"));
        }

        let uri: http::Uri = url
            .parse()
            .map_err(|err| invalid("alertmanager.url", format!("parse failed: {err}")))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            other => {
                return Err(invalid(
                    "alertmanager.url",
                    format!("must use http or https scheme, got {:?}", other.unwrap_or_default()),
                ))
            }
        }
        if uri.host().map_or(true, |host| host.trim().is_empty()) {
            return Err(invalid("alertmanager.url", "must include host"));
        }
        if uri.query().is_some() || url.contains('#') {
            return Err(invalid("alertmanager.url", "must not include a query or fragment"));
        }

        let bearer_token = self.bearer_token.unwrap_or_default();
        let auth = match self.basic_auth {
            Some(basic) => {
                if basic.username.trim().is_empty() {
                    return Err(invalid(
                        "alertmanager.basic_auth.username",
                        "is required when basic_auth is set",
                    ));
                }
                if basic.password.trim().is_empty() {
                    return Err(invalid(
                        "alertmanager.basic_auth.password",
                        "is required when basic_auth is set",
                    ));
                }
                if !bearer_token.trim().is_empty() {
                    return Err(invalid(
                        "alertmanager",
                        "basic_auth and bearer_token are mutually exclusive",
                    ));
                }
                UpstreamAuth::basic(&basic.username, &basic.password)
            }
            None => UpstreamAuth::bearer(&bearer_token),
        };

        let timeout = optional_duration("alertmanager.timeout", self.timeout.as_deref(), Duration::ZERO)?;

        Ok(AlertmanagerSettings {
            url,
            timeout,
            insecure_skip_verify: self.insecure_skip_verify,
            auth,
        })
    }
}

impl RawDefaults {
    fn validate(self) -> Result<AlertDefaults, ConfigError> {
        if self.severity_from_priority.is_empty() {
            return Err(invalid(
                "defaults.severity_from_priority",
                "is required and must be non-empty",
            ));
        }
        let severity_map = severity_map("defaults.severity_from_priority", &self.severity_from_priority)?;

        let ttl = match self.ttl.as_deref() {
            Some(text) => parse_duration(text).map_err(|reason| invalid("defaults.ttl", reason))?,
            None => return Err(invalid("defaults.ttl", "is required")),
        };

        AlertDefaults::new(&self.alertname, ttl, severity_map, self.labels).map_err(|err| match err {
            AlertError::NonPositiveTtl => invalid("defaults.ttl", "must be > 0"),
            other => invalid("defaults", other),
        })
    }
}

fn severity_map(field: &str, raw: &BTreeMap<String, String>) -> Result<SeverityMap, ConfigError> {
    raw.iter()
        .map(|(key, value)| {
            let key = key.trim();
            let priority: u32 = key.parse().map_err(|_| {
                let reason = if key.starts_with('-') {
                    "priority must be >= 0"
                } else {
                    "priority must be a non-negative integer"
                };
                invalid(format!("{field}[{key}]"), reason)
            })?;
            let severity: Severity = value.parse().map_err(|_| {
                invalid(
                    format!("{field}[{priority}]"),
                    format!("invalid severity {value:?} (allowed: info, warning, critical)"),
                )
            })?;
            Ok((priority, severity))
        })
        .collect()
}

fn validate_apps(raw: Vec<RawApp>) -> Result<Vec<AppEntry>, ConfigError> {
    let mut seen = HashSet::new();
    let mut apps = Vec::with_capacity(raw.len());

    for (index, app) in raw.into_iter().enumerate() {
        let token = app.token.trim().to_string();
        if token.is_empty() {
            return Err(invalid(format!("apps[{index}].token"), "must not be empty"));
        }
        let field = format!("apps[{index}] ({})", redact_token(&token));

        if !seen.insert(token.clone()) {
            return Err(invalid(field, "duplicate token"));
        }

        let name = app.app_name.trim();
        if name.is_empty() {
            return Err(invalid(field, "app_name is required"));
        }

        let map = severity_map(&format!("{field}.severity_from_priority"), &app.severity_from_priority)?;
        let identity = AppIdentity::new(name)
            .with_alert_name(&app.alertname)
            .with_labels(app.labels)
            .with_severity_map(map);

        apps.push(AppEntry { token, identity });
    }

    Ok(apps)
}
