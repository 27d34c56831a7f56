use std::fmt;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::forum::DEFAULT_API_URL;
use crate::prompt;
use crate::summary::SummaryLimits;
use crate::throttle::MIN_DETAIL_DELAY;

/// Config file read when no path is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "piazza.toml";

/// Environment variable consulted for the Piazza password.
pub const PASSWORD_ENV: &str = "PIAZZA_PASSWORD";

const DEFAULT_WEBHOOK_USERNAME: &str = "Piazza";

/// Largest accepted value for any `*-minutes` setting, a little over 4000 years.
pub const MAX_MINUTES: i64 = 2_147_483_647;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required setting: {0}")]
    Missing(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to read password from the terminal: {0}")]
    Prompt(#[source] std::io::Error),
}

/// Raw file contents. Keys are kebab-case and unknown keys are rejected.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ConfigFile {
    email: String,
    password: Option<String>,
    notify_message: String,
    webhook_url: String,
    course_id: String,
    check_interval_minutes: i64,
    notify_min_age_minutes: i64,
    notify_max_age_minutes: i64,
    webhook_username: Option<String>,
    api_url: Option<String>,
    detail_fetch_delay_secs: Option<u64>,
    list_char_budget: Option<usize>,
    message_char_budget: Option<usize>,
    subject_width: Option<usize>,
}

/// Application configuration, fixed for the life of the process.
#[derive(Clone)]
pub struct Config {
    // Piazza
    pub email: String,
    pub password: String,
    pub course_id: String,
    pub api_url: String,

    // Webhook
    pub webhook_url: String,
    pub webhook_username: String,
    /// Line put above the list when something changed recently.
    pub notify_message: String,

    // Polling
    pub check_interval: Duration,
    pub detail_fetch_delay: Duration,

    // Thresholds
    /// Items younger than this are not reported yet.
    pub min_age: chrono::Duration,
    /// Items modified within this window trigger the attention message.
    pub max_age: chrono::Duration,

    pub limits: SummaryLimits,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("course_id", &self.course_id)
            .field("api_url", &self.api_url)
            .field("webhook_url", &"<redacted>")
            .field("webhook_username", &self.webhook_username)
            .field("notify_message", &self.notify_message)
            .field("check_interval", &self.check_interval)
            .field("detail_fetch_delay", &self.detail_fetch_delay)
            .field("min_age", &self.min_age)
            .field("max_age", &self.max_age)
            .field("limits", &self.limits)
            .finish()
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// The password may be left out of the file and supplied through
    /// `PIAZZA_PASSWORD` instead; the environment wins when both are set.
    /// If neither has one and stdin is a terminal, the password is asked for
    /// without echo.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has missing, unknown or
    /// mistyped keys, or holds out-of-range values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::build(&contents, optional_env(PASSWORD_ENV), ask_password)
    }

    /// Parse configuration from TOML text, with an optional password override.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn from_toml(contents: &str, password_override: Option<String>) -> Result<Self, ConfigError> {
        Self::build(contents, password_override, |_| Ok(None))
    }

    /// `fallback` is asked for the password, given the email, only when
    /// neither the override nor the file has one.
    fn build(
        contents: &str,
        password_override: Option<String>,
        fallback: impl FnOnce(&str) -> Result<Option<String>, ConfigError>,
    ) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(contents)?;

        let password = match password_override.or(file.password) {
            Some(password) => password,
            None => fallback(&file.email)?
                .ok_or_else(|| ConfigError::Missing(format!("password (or {PASSWORD_ENV})")))?,
        };

        let defaults = SummaryLimits::default();

        Ok(Self {
            email: file.email,
            password,
            course_id: file.course_id,
            api_url: file.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),

            webhook_url: file.webhook_url,
            webhook_username: file
                .webhook_username
                .unwrap_or_else(|| DEFAULT_WEBHOOK_USERNAME.to_string()),
            notify_message: file.notify_message,

            check_interval: Duration::from_secs(
                bounded_minutes("check-interval-minutes", file.check_interval_minutes)? * 60,
            ),
            detail_fetch_delay: file
                .detail_fetch_delay_secs
                .map_or(MIN_DETAIL_DELAY, Duration::from_secs),

            min_age: minutes("notify-min-age-minutes", file.notify_min_age_minutes)?,
            max_age: minutes("notify-max-age-minutes", file.notify_max_age_minutes)?,

            limits: SummaryLimits {
                list_char_budget: file.list_char_budget.unwrap_or(defaults.list_char_budget),
                hard_char_budget: file.message_char_budget.unwrap_or(defaults.hard_char_budget),
                subject_width: file.subject_width.unwrap_or(defaults.subject_width),
            },
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("email", &self.email),
            ("password", &self.password),
            ("course-id", &self.course_id),
            ("notify-message", &self.notify_message),
            ("webhook-username", &self.webhook_username),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(name, "cannot be empty"));
            }
        }

        self.webhook_url()?;
        self.api_url()?;

        if self.check_interval.is_zero() {
            return Err(invalid("check-interval-minutes", "must be at least 1"));
        }
        for (name, value) in [
            ("notify-min-age-minutes", self.min_age),
            ("notify-max-age-minutes", self.max_age),
        ] {
            if value < chrono::Duration::zero() {
                return Err(invalid(name, "must not be negative"));
            }
            if value.num_minutes() > MAX_MINUTES {
                return Err(invalid(name, &format!("must be at most {MAX_MINUTES}")));
            }
        }
        if self.detail_fetch_delay < MIN_DETAIL_DELAY {
            return Err(invalid("detail-fetch-delay-secs", "must be at least 1"));
        }
        if self.limits.subject_width < 4 {
            return Err(invalid("subject-width", "must be at least 4"));
        }
        if self.limits.hard_char_budget == 0 {
            return Err(invalid("message-char-budget", "must be at least 1"));
        }
        if self.limits.list_char_budget > self.limits.hard_char_budget {
            return Err(invalid(
                "list-char-budget",
                &format!(
                    "must not exceed message-char-budget ({})",
                    self.limits.hard_char_budget
                ),
            ));
        }
        Ok(())
    }

    /// Parsed webhook URL.
    ///
    /// # Errors
    ///
    /// Returns an error unless the URL is absolute http(s).
    pub fn webhook_url(&self) -> Result<Url, ConfigError> {
        parse_http_url("webhook-url", &self.webhook_url)
    }

    /// Parsed Piazza API URL.
    ///
    /// # Errors
    ///
    /// Returns an error unless the URL is absolute http(s).
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        parse_http_url("api-url", &self.api_url)
    }

    /// A valid configuration for tests. Network settings point nowhere useful.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            email: "ta@example.edu".to_string(),
            password: "hunter2".to_string(),
            course_id: "testcourse".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            webhook_url: "http://127.0.0.1:9/webhook".to_string(),
            webhook_username: DEFAULT_WEBHOOK_USERNAME.to_string(),
            notify_message: "@here".to_string(),
            check_interval: Duration::from_secs(300),
            detail_fetch_delay: MIN_DETAIL_DELAY,
            min_age: chrono::Duration::minutes(30),
            max_age: chrono::Duration::minutes(120),
            limits: SummaryLimits::default(),
        }
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn invalid(name: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn non_negative(name: &str, value: i64) -> Result<u64, ConfigError> {
    u64::try_from(value).map_err(|_| invalid(name, "must not be negative"))
}

fn bounded_minutes(name: &str, value: i64) -> Result<u64, ConfigError> {
    if value > MAX_MINUTES {
        return Err(invalid(name, &format!("must be at most {MAX_MINUTES}")));
    }
    non_negative(name, value)
}

fn minutes(name: &str, value: i64) -> Result<chrono::Duration, ConfigError> {
    bounded_minutes(name, value)?;
    chrono::Duration::try_minutes(value).ok_or_else(|| invalid(name, "is out of range"))
}

fn ask_password(email: &str) -> Result<Option<String>, ConfigError> {
    if !std::io::stdin().is_terminal() {
        return Ok(None);
    }
    prompt::read_password(&format!("Piazza password for {email}: "))
        .map(|password| Some(password).filter(|p| !p.is_empty()))
        .map_err(ConfigError::Prompt)
}

fn parse_http_url(name: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| invalid(name, &e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(name, &format!("unsupported scheme '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    const MINIMAL: &str = r#"
email = "ta@example.edu"
password = "from-file"
notify-message = "<@&1234> new questions"
webhook-url = "https://discord.com/api/webhooks/1/abc"
course-id = "lx2k3abc"
check-interval-minutes = 15
notify-min-age-minutes = 30
notify-max-age-minutes = 240
"#;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config = Config::from_toml(MINIMAL, None).unwrap();
        config.validate().unwrap();

        assert_eq!(config.password, "from-file");
        assert_eq!(config.course_id, "lx2k3abc");
        assert_eq!(config.check_interval, Duration::from_secs(900));
        assert_eq!(config.min_age, chrono::Duration::minutes(30));
        assert_eq!(config.max_age, chrono::Duration::minutes(240));
        assert_eq!(config.detail_fetch_delay, Duration::from_secs(1));
        assert_eq!(config.webhook_username, "Piazza");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.limits, SummaryLimits::default());
    }

    #[test]
    fn test_password_override_wins() {
        let config = Config::from_toml(MINIMAL, Some("from-env".to_string())).unwrap();
        assert_eq!(config.password, "from-env");
    }

    #[test]
    fn test_missing_password() {
        let contents = MINIMAL.replace("password = \"from-file\"\n", "");
        let err = Config::from_toml(&contents, None).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_missing_password_falls_back_to_prompt() {
        let contents = MINIMAL.replace("password = \"from-file\"\n", "");

        let config = Config::build(&contents, None, |email| {
            assert_eq!(email, "ta@example.edu");
            Ok(Some("typed".to_string()))
        })
        .unwrap();
        assert_eq!(config.password, "typed");

        let err = Config::build(&contents, None, |_| Ok(None)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_prompt_skipped_when_password_known() {
        let from_file = Config::build(MINIMAL, None, |_| panic!("prompted")).unwrap();
        assert_eq!(from_file.password, "from-file");

        let contents = MINIMAL.replace("password = \"from-file\"\n", "");
        let from_env =
            Config::build(&contents, Some("from-env".to_string()), |_| panic!("prompted")).unwrap();
        assert_eq!(from_env.password, "from-env");
    }

    #[test]
    fn test_prompt_failure_is_reported() {
        let contents = MINIMAL.replace("password = \"from-file\"\n", "");
        let err = Config::build(&contents, None, |_| {
            Err(ConfigError::Prompt(std::io::ErrorKind::Interrupted.into()))
        })
        .unwrap_err();
        assert!(err.to_string().contains("terminal"));
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let contents = MINIMAL.replace("course-id = \"lx2k3abc\"\n", "");
        let err = Config::from_toml(&contents, None).unwrap_err();
        assert!(err.to_string().contains("course-id"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let contents = format!("{MINIMAL}poll-everything = true\n");
        assert!(matches!(
            Config::from_toml(&contents, None),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let contents = MINIMAL.replace("check-interval-minutes = 15", "check-interval-minutes = \"15\"");
        assert!(matches!(
            Config::from_toml(&contents, None),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_negative_minutes_rejected() {
        let contents = MINIMAL.replace("notify-min-age-minutes = 30", "notify-min-age-minutes = -5");
        let err = Config::from_toml(&contents, None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "notify-min-age-minutes"));
    }

    #[test]
    fn test_overflowing_threshold_rejected() {
        for (line, name) in [
            ("notify-max-age-minutes = 240", "notify-max-age-minutes"),
            ("notify-min-age-minutes = 30", "notify-min-age-minutes"),
            ("check-interval-minutes = 15", "check-interval-minutes"),
        ] {
            let key = line.split(" = ").next().unwrap();
            let contents = MINIMAL.replace(line, &format!("{key} = 150000000000"));
            let err = Config::from_toml(&contents, None).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { name: ref n, .. } if n == name),
                "{line}: {err}"
            );
        }

        let contents = MINIMAL.replace(
            "notify-max-age-minutes = 240",
            &format!("notify-max-age-minutes = {MAX_MINUTES}"),
        );
        let config = Config::from_toml(&contents, None).unwrap();
        config.validate().unwrap();
        assert_eq!(config.max_age, chrono::Duration::minutes(MAX_MINUTES));
    }

    #[test]
    fn test_optional_settings() {
        let contents = format!(
            "{MINIMAL}webhook-username = \"Forum bot\"\napi-url = \"http://127.0.0.1:8080/api\"\n\
             detail-fetch-delay-secs = 3\nlist-char-budget = 900\nmessage-char-budget = 1000\nsubject-width = 40\n"
        );
        let config = Config::from_toml(&contents, None).unwrap();
        config.validate().unwrap();

        assert_eq!(config.webhook_username, "Forum bot");
        assert_eq!(config.api_url().unwrap().port(), Some(8080));
        assert_eq!(config.detail_fetch_delay, Duration::from_secs(3));
        assert_eq!(
            config.limits,
            SummaryLimits {
                list_char_budget: 900,
                hard_char_budget: 1000,
                subject_width: 40,
            }
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::for_testing();
        config.validate().unwrap();

        config.webhook_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::for_testing();
        config.webhook_url = "ftp://example.com/hook".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::for_testing();
        config.check_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::for_testing();
        config.detail_fetch_delay = Duration::from_millis(500);
        assert!(config.validate().is_err());

        let mut config = Config::for_testing();
        config.limits.list_char_budget = 3000;
        assert!(config.validate().is_err());

        let mut config = Config::for_testing();
        config.course_id = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::for_testing();
        config.max_age = chrono::Duration::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::for_testing();
        config.min_age = chrono::Duration::minutes(-1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", Config::for_testing());
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("testcourse"));
    }

    #[test]
    #[serial]
    fn test_load_reads_password_from_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        std::env::set_var(PASSWORD_ENV, "env-secret");
        let config = Config::load(file.path());
        std::env::remove_var(PASSWORD_ENV);

        assert_eq!(config.unwrap().password, "env-secret");
    }

    #[test]
    #[serial]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/piazza.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
