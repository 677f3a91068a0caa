#![forbid(unsafe_code)]

//! Runtime settings for a sync run. Values come from CLI overrides, then the
//! process environment, then a `.env` file, then the built-in defaults.

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_CHANNEL_ID: &str = "UCfCVlxInB4VuaDFLGqEQqaA";
pub const DEFAULT_PUBLISHED_AFTER: &str = "2025-03-10T00:00:00Z";
pub const DEFAULT_SPREADSHEET: &str =
    "https://docs.google.com/spreadsheets/d/1NtDI4dvKmukDH2NQSpDKsXCjIyVCJ-YjOx-wMfejd-c/edit";
pub const DEFAULT_WORKSHEET: &str = "Відео";
pub const DEFAULT_TIMEZONE: &str = "Europe/Kyiv";
pub const DEFAULT_CREDENTIALS_PATH: &str = "google-credentials.json";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// API key lookups, in order of preference.
const API_KEY_VARS: [&str; 2] = ["YOUTUBE_API_KEY", "API_KEY"];

#[derive(Clone)]
pub struct SyncSettings {
    pub api_key: String,
    pub channel_id: String,
    pub published_after: DateTime<Utc>,
    pub spreadsheet_id: String,
    pub worksheet: String,
    pub timezone: Tz,
    pub credentials_path: PathBuf,
    pub http_timeout: Duration,
}

// Hand-written so the API key never ends up in a log line.
impl std::fmt::Debug for SyncSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSettings")
            .field("api_key", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .field("published_after", &self.published_after)
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("worksheet", &self.worksheet)
            .field("timezone", &self.timezone)
            .field("credentials_path", &self.credentials_path)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub channel_id: Option<String>,
    pub published_after: Option<String>,
    pub spreadsheet: Option<String>,
    pub worksheet: Option<String>,
    pub timezone: Option<String>,
    pub credentials_path: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<SyncSettings> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    build_settings(&file_vars, env_var_string, overrides)
}

fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Result<SyncSettings> {
    let api_key = API_KEY_VARS
        .iter()
        .find_map(|key| lookup_value(key, file_vars, &env_lookup))
        .ok_or_else(|| anyhow!("YOUTUBE_API_KEY not set"))?;

    let channel_id = pick(overrides.channel_id, "CHANNEL_ID", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_CHANNEL_ID.to_string());

    let published_raw = pick(
        overrides.published_after,
        "PUBLISHED_AFTER",
        file_vars,
        &env_lookup,
    )
    .unwrap_or_else(|| DEFAULT_PUBLISHED_AFTER.to_string());
    let published_after = parse_published_after(&published_raw)?;

    let spreadsheet = pick(overrides.spreadsheet, "SPREADSHEET", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_SPREADSHEET.to_string());
    let spreadsheet_id = spreadsheet_id_from(&spreadsheet)?;

    let worksheet = pick(overrides.worksheet, "WORKSHEET", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_WORKSHEET.to_string());

    let timezone_raw = pick(overrides.timezone, "LOCAL_TIMEZONE", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let timezone = timezone_raw
        .parse::<Tz>()
        .map_err(|err| anyhow!("unknown time zone {timezone_raw:?}: {err}"))?;

    let credentials_path = overrides
        .credentials_path
        .or_else(|| lookup_value("GOOGLE_CREDENTIALS", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_PATH));

    let http_timeout = lookup_value("HTTP_TIMEOUT_SECS", file_vars, &env_lookup)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);

    Ok(SyncSettings {
        api_key,
        channel_id,
        published_after,
        spreadsheet_id,
        worksheet,
        timezone,
        credentials_path,
        http_timeout: Duration::from_secs(http_timeout),
    })
}

/// CLI override first (ignored when blank), then env/file lookup.
fn pick(
    override_value: Option<String>,
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    override_value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup_value(key, file_vars, env_lookup))
}

/// Accepts a full RFC 3339 timestamp or a bare `YYYY-MM-DD`, which is read as
/// midnight UTC.
pub fn parse_published_after(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(stamp.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("PUBLISHED_AFTER is neither RFC 3339 nor YYYY-MM-DD: {raw}"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid PUBLISHED_AFTER date {raw}"))?;
    Ok(midnight.and_utc())
}

/// Pulls the document id out of a `docs.google.com/spreadsheets/d/<id>/...`
/// URL. Anything without a `/d/` segment is taken as the id itself.
pub fn spreadsheet_id_from(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let id = match trimmed.split_once("/d/") {
        Some((_, rest)) => rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default(),
        None => trimmed,
    };
    if id.is_empty() || id.contains('/') {
        bail!("cannot find a spreadsheet id in {value:?}");
    }
    Ok(id.to_string())
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| {
        file_vars
            .get(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn settings_from(contents: &str) -> Result<SyncSettings> {
        let cfg = make_config(contents);
        let vars = read_env_file(cfg.path())?;
        build_settings(&vars, |_| None, SettingsOverrides::default())
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() -> Result<()> {
        let settings = settings_from("API_KEY=\"secret\"\n")?;
        assert_eq!(settings.api_key, "secret");
        assert_eq!(settings.channel_id, DEFAULT_CHANNEL_ID);
        assert_eq!(settings.worksheet, DEFAULT_WORKSHEET);
        assert_eq!(settings.timezone, chrono_tz::Europe::Kyiv);
        assert_eq!(
            settings.spreadsheet_id,
            "1NtDI4dvKmukDH2NQSpDKsXCjIyVCJ-YjOx-wMfejd-c"
        );
        assert_eq!(
            settings.published_after,
            Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap()
        );
        assert_eq!(
            settings.credentials_path,
            PathBuf::from(DEFAULT_CREDENTIALS_PATH)
        );
        assert_eq!(settings.http_timeout, Duration::from_secs(30));
        Ok(())
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let err = settings_from("CHANNEL_ID=\"abc\"\n").unwrap_err();
        assert!(err.to_string().contains("YOUTUBE_API_KEY"));
    }

    #[test]
    fn youtube_api_key_wins_over_legacy_name() -> Result<()> {
        let settings = settings_from("API_KEY=\"old\"\nYOUTUBE_API_KEY=\"new\"\n")?;
        assert_eq!(settings.api_key, "new");
        Ok(())
    }

    #[test]
    fn env_wins_over_file_and_override_wins_over_env() -> Result<()> {
        let vars = read_env_file(
            make_config("API_KEY=\"k\"\nCHANNEL_ID=\"file\"\nWORKSHEET=\"file-sheet\"\n").path(),
        )?;
        let settings = build_settings(
            &vars,
            |key| match key {
                "CHANNEL_ID" => Some("env".to_string()),
                "WORKSHEET" => Some("env-sheet".to_string()),
                _ => None,
            },
            SettingsOverrides {
                worksheet: Some("cli-sheet".into()),
                ..SettingsOverrides::default()
            },
        )?;
        assert_eq!(settings.channel_id, "env");
        assert_eq!(settings.worksheet, "cli-sheet");
        Ok(())
    }

    #[test]
    fn blank_override_falls_through() -> Result<()> {
        let vars = read_env_file(make_config("API_KEY=\"k\"\nCHANNEL_ID=\"file\"\n").path())?;
        let settings = build_settings(
            &vars,
            |_| None,
            SettingsOverrides {
                channel_id: Some("   ".into()),
                ..SettingsOverrides::default()
            },
        )?;
        assert_eq!(settings.channel_id, "file");
        Ok(())
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let err = settings_from("API_KEY=\"k\"\nLOCAL_TIMEZONE=\"Mars/Olympus\"\n").unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn invalid_timeout_defaults() -> Result<()> {
        let settings = settings_from("API_KEY=\"k\"\nHTTP_TIMEOUT_SECS=\"soon\"\n")?;
        assert_eq!(settings.http_timeout, Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
        Ok(())
    }

    #[test]
    fn published_after_accepts_date_and_rfc3339() -> Result<()> {
        assert_eq!(
            parse_published_after("2024-12-31")?,
            Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_published_after("2025-01-01T03:00:00+02:00")?,
            Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap()
        );
        assert!(parse_published_after("last week").is_err());
        Ok(())
    }

    #[test]
    fn spreadsheet_id_from_url_or_bare_id() -> Result<()> {
        assert_eq!(
            spreadsheet_id_from("https://docs.google.com/spreadsheets/d/abc-123_X/edit#gid=0")?,
            "abc-123_X"
        );
        assert_eq!(
            spreadsheet_id_from("https://docs.google.com/spreadsheets/d/abc?usp=sharing")?,
            "abc"
        );
        assert_eq!(spreadsheet_id_from("  bare-id ")?, "bare-id");
        assert!(spreadsheet_id_from("https://docs.google.com/spreadsheets/d/").is_err());
        Ok(())
    }

    #[test]
    fn debug_output_hides_api_key() -> Result<()> {
        let settings = settings_from("API_KEY=\"super-secret\"\n")?;
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
        Ok(())
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() -> Result<()> {
        let cfg = make_config(
            r#"
            export API_KEY="abc"
            WORKSHEET='Videos'
            CHANNEL_ID =  "UC123"
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path())?;
        assert_eq!(vars.get("API_KEY").unwrap(), "abc");
        assert_eq!(vars.get("WORKSHEET").unwrap(), "Videos");
        assert_eq!(vars.get("CHANNEL_ID").unwrap(), "UC123");
        assert!(!vars.contains_key("INVALID_LINE"));
        Ok(())
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let vars = read_env_file(&dir.path().join("missing.env"))?;
        assert!(vars.is_empty());
        Ok(())
    }
}
