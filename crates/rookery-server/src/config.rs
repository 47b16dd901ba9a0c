use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

use rookery_api::Settings;
use rookery_api::mail::SmtpSettings;

/// Values that ship in example env files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "hard to guess string",
];

#[derive(Clone)]
pub struct Config {
    pub secret_key: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub settings: Settings,
    /// `None` when `ROOKERY_MAIL_SERVER` is unset; mail is then only logged.
    pub smtp: Option<SmtpSettings>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret_key = var("ROOKERY_SECRET_KEY").unwrap_or_default();
        if secret_key.is_empty() || PLACEHOLDER_SECRETS.contains(&secret_key.as_str()) {
            bail!("ROOKERY_SECRET_KEY is unset or still a placeholder; set it in your .env file");
        }

        let defaults = Settings::default();
        let settings = Settings {
            admin_email: var("ROOKERY_ADMIN_EMAIL").filter(|v| !v.is_empty()),
            upload_dir: var("ROOKERY_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_bytes: parse_or(&var, "ROOKERY_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            posts_per_page: parse_or(&var, "ROOKERY_POSTS_PER_PAGE", defaults.posts_per_page)?,
            base_url: var("ROOKERY_BASE_URL").unwrap_or(defaults.base_url),
            mail_subject_prefix: var("ROOKERY_MAIL_SUBJECT_PREFIX")
                .unwrap_or(defaults.mail_subject_prefix),
        };
        if settings.posts_per_page == 0 {
            bail!("ROOKERY_POSTS_PER_PAGE must be at least 1");
        }

        let smtp = match var("ROOKERY_MAIL_SERVER").filter(|v| !v.is_empty()) {
            Some(server) => {
                let username = var("ROOKERY_MAIL_USERNAME");
                let sender = var("ROOKERY_MAIL_SENDER")
                    .or_else(|| username.clone())
                    .context("ROOKERY_MAIL_SENDER is required when ROOKERY_MAIL_SERVER is set")?;
                Some(SmtpSettings {
                    server,
                    port: parse_or(&var, "ROOKERY_MAIL_PORT", 465)?,
                    use_ssl: parse_or(&var, "ROOKERY_MAIL_USE_SSL", true)?,
                    username,
                    password: var("ROOKERY_MAIL_PASSWORD"),
                    sender,
                })
            }
            None => None,
        };

        Ok(Self {
            secret_key,
            db_path: var("ROOKERY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| "rookery.db".into()),
            host: var("ROOKERY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&var, "ROOKERY_PORT", 3000)?,
            settings,
            smtp,
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {raw}")),
        None => Ok(default),
    }
}
