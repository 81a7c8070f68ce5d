use chrono::FixedOffset;
use config::ConfigError;
use serde::Deserialize;
use std::{env, fmt::Display, net::SocketAddr, str::FromStr, time::Duration};
use validator::Validate;

use crate::utils::clock::offset_from_minutes;

#[derive(Debug, Clone, Deserialize, Validate, Default)]
pub struct Config {
    #[validate(nested)]
    pub database: DatabaseSettings,
    #[validate(nested)]
    pub email: EmailSettings,
    #[validate(nested)]
    pub scheduler: SchedulerSettings,
    pub metrics: MetricsSettings,
    pub ai: AiSettings,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DatabaseSettings {
    #[validate(length(min = 1, message = "MongoDB URI must be set"))]
    pub mongo_uri: String,
    #[validate(length(min = 1, message = "MongoDB database must be set"))]
    pub mongo_database: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "studytrack".to_string(),
        }
    }
}

/// SMTP delivery settings
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EmailSettings {
    #[validate(length(min = 1, message = "SMTP server must be set"))]
    pub server: String,
    #[validate(range(min = 1))]
    pub port: u16,
    pub login: String,
    pub password: String,
    /// Mailbox used as sender, e.g. `StudyTrack <noreply@studytrack.com>`
    pub from_email: String,
    pub use_tls: bool,
    #[validate(range(min = 1, max = 600))]
    pub send_timeout_secs: u64,
    /// Receives the test notification when no active user exists
    #[validate(email(message = "Invalid admin email"))]
    pub admin_email: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            server: "smtp.gmail.com".to_string(),
            port: 587,
            login: String::new(),
            password: String::new(),
            from_email: "StudyTrack <noreply@studytrack.com>".to_string(),
            use_tls: true,
            send_timeout_secs: 30,
            admin_email: "admin@example.com".to_string(),
        }
    }
}

impl EmailSettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SchedulerSettings {
    /// Seconds between two checks of the trigger table
    #[validate(range(min = 1, max = 3600))]
    pub tick_secs: u64,
    /// Registers the fast "send everything" trigger and runs it once at startup
    pub test_mode: bool,
    #[validate(range(min = 1, max = 1440))]
    pub test_interval_minutes: u32,
    /// Local time used for trigger times and greetings, minutes east of UTC
    #[validate(range(min = -1439, max = 1439))]
    pub utc_offset_minutes: i32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            test_mode: false,
            test_interval_minutes: 5,
            utc_offset_minutes: 0,
        }
    }
}

impl SchedulerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn utc_offset(&self) -> Option<FixedOffset> {
        offset_from_minutes(self.utc_offset_minutes)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsSettings {
    /// Serves /health and /metrics when set
    pub listen_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AiSettings {
    /// Consumed by the web application's study coach, not by the scheduler
    pub openai_api_key: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Self::from_settings(&settings)
    }

    /// Resolves every value from `settings`, then the legacy variable names
    /// used by the web application, then the built-in defaults.
    pub fn from_settings(settings: &config::Config) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let database = DatabaseSettings {
            mongo_uri: string_setting(settings, "database.mongo_uri", Some("MONGO_URI"))
                .unwrap_or(defaults.database.mongo_uri),
            mongo_database: string_setting(
                settings,
                "database.mongo_database",
                Some("MONGO_DATABASE"),
            )
            .unwrap_or(defaults.database.mongo_database),
        };

        let email = EmailSettings {
            server: string_setting(settings, "email.server", Some("EMAIL_HOST"))
                .unwrap_or(defaults.email.server),
            port: parsed_setting(settings, "email.port", Some("EMAIL_PORT"))?
                .unwrap_or(defaults.email.port),
            login: string_setting(settings, "email.login", Some("EMAIL_USER")).unwrap_or_default(),
            password: string_setting(settings, "email.password", Some("EMAIL_PASS"))
                .unwrap_or_default(),
            from_email: string_setting(settings, "email.from_email", Some("DEFAULT_FROM_EMAIL"))
                .unwrap_or(defaults.email.from_email),
            use_tls: bool_setting(settings, "email.use_tls", Some("EMAIL_USE_TLS"))?
                .unwrap_or(defaults.email.use_tls),
            send_timeout_secs: parsed_setting(settings, "email.send_timeout_secs", None)?
                .unwrap_or(defaults.email.send_timeout_secs),
            admin_email: string_setting(settings, "email.admin_email", Some("ADMIN_EMAIL"))
                .unwrap_or(defaults.email.admin_email),
        };

        let scheduler = SchedulerSettings {
            tick_secs: parsed_setting(settings, "scheduler.tick_secs", None)?
                .unwrap_or(defaults.scheduler.tick_secs),
            test_mode: bool_setting(settings, "scheduler.test_mode", None)?
                .unwrap_or(defaults.scheduler.test_mode),
            test_interval_minutes: parsed_setting(settings, "scheduler.test_interval_minutes", None)?
                .unwrap_or(defaults.scheduler.test_interval_minutes),
            utc_offset_minutes: parsed_setting(settings, "scheduler.utc_offset_minutes", None)?
                .unwrap_or(defaults.scheduler.utc_offset_minutes),
        };

        let metrics = MetricsSettings {
            listen_addr: parsed_setting(settings, "metrics.listen_addr", Some("METRICS_ADDR"))?,
        };

        let ai = AiSettings {
            openai_api_key: string_setting(settings, "ai.openai_api_key", Some("OPENAI_API_KEY")),
        };

        let config = Config {
            database,
            email,
            scheduler,
            metrics,
            ai,
        };

        config
            .validate()
            .map_err(|e| ConfigError::Message(format!("Invalid configuration: {e}")))?;

        Ok(config)
    }
}

fn string_setting(
    settings: &config::Config,
    key: &str,
    legacy_env: Option<&str>,
) -> Option<String> {
    settings
        .get_string(key)
        .ok()
        .or_else(|| legacy_env.and_then(|name| env::var(name).ok()))
        .filter(|value| !value.trim().is_empty())
}

fn parsed_setting<T>(
    settings: &config::Config,
    key: &str,
    legacy_env: Option<&str>,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    string_setting(settings, key, legacy_env)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::Message(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

fn bool_setting(
    settings: &config::Config,
    key: &str,
    legacy_env: Option<&str>,
) -> Result<Option<bool>, ConfigError> {
    string_setting(settings, key, legacy_env)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::Message(format!(
                "Invalid value for {key}: expected a boolean, got '{other}'"
            ))),
        })
        .transpose()
}
