use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const TELEGRAM_API: &str = "TELEGRAM_API";
pub const GPT_TOKEN: &str = "GPT_TOKEN";
pub const PORT: &str = "PORT";
pub const OPENAI_API_BASE: &str = "OPENAI_API_BASE";

/// Settings resolved once at startup and handed to the clients by reference.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram Bot API base, token included (`https://api.telegram.org/bot<token>`)
    pub telegram_api: String,
    pub gpt_token: String,
    pub openai_api_base: String,
    pub port: u16,
}

/// Shape of the local defaults file:
///
/// ```toml
/// [[env]]
/// name = "PORT"
/// value = "8080"
/// ```
#[derive(Debug, Deserialize, Default)]
struct DefaultsFile {
    #[serde(default)]
    env: Vec<Setting>,
}

#[derive(Debug, Deserialize)]
struct Setting {
    name: String,
    value: String,
}

fn default_port() -> u16 {
    8080
}

fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Config {
    /// Load settings from the process environment, falling back to the
    /// defaults file at `path` for any variable that is unset.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_env(path, |name| std::env::var(name).ok())
    }

    /// `load` with the environment supplied by `env`. A variable that is set
    /// but blank counts as unset, so the defaults file still applies.
    fn load_with_env<E>(path: &Path, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let defaults = load_defaults(path)?;
        Self::from_lookup(|name| {
            env(name)
                .filter(|value| !value.trim().is_empty())
                .or_else(|| defaults.get(name).cloned())
        })
    }

    /// Resolve every setting through `lookup`. Environment access is kept
    /// out of here so resolution can be exercised directly.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> Result<String> {
            match lookup(name) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                Some(_) => bail!("{} is set but empty", name),
                None => bail!("{} is not set in the environment or the defaults file", name),
            }
        };

        let telegram_api = required(TELEGRAM_API)?
            .trim_end_matches('/')
            .to_string();
        let gpt_token = required(GPT_TOKEN)?;

        let openai_api_base = lookup(OPENAI_API_BASE)
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(default_openai_api_base);

        let port = match lookup(PORT).filter(|v| !v.trim().is_empty()) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Invalid {}: {:?}", PORT, raw))?,
            None => default_port(),
        };

        Ok(Config {
            telegram_api,
            gpt_token,
            openai_api_base,
            port,
        })
    }
}

/// Read the defaults file. A missing file means "no defaults"; a file that
/// exists but cannot be read or parsed is an error.
fn load_defaults(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        tracing::debug!("No defaults file at {}, using environment only", path.display());
        return Ok(HashMap::new());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read defaults file: {}", path.display()))?;
    parse_defaults(&content)
        .with_context(|| format!("Failed to parse defaults file: {}", path.display()))
}

fn parse_defaults(content: &str) -> Result<HashMap<String, String>> {
    let file: DefaultsFile = toml::from_str(content)?;
    Ok(file
        .env
        .into_iter()
        .map(|setting| (setting.name, setting.value))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_required_settings_with_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            (TELEGRAM_API, "https://api.telegram.org/bot123:abc/"),
            (GPT_TOKEN, "sk-test"),
        ]))
        .unwrap();

        assert_eq!(config.telegram_api, "https://api.telegram.org/bot123:abc");
        assert_eq!(config.gpt_token, "sk-test");
        assert_eq!(config.openai_api_base, "https://api.openai.com/v1");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_explicit_port_and_base() {
        let config = Config::from_lookup(lookup_from(&[
            (TELEGRAM_API, "http://tg"),
            (GPT_TOKEN, "k"),
            (PORT, "9000"),
            (OPENAI_API_BASE, "http://localhost:1234/v1/"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.openai_api_base, "http://localhost:1234/v1");
    }

    #[test]
    fn test_missing_telegram_api_is_error() {
        let err = Config::from_lookup(lookup_from(&[(GPT_TOKEN, "k")])).unwrap_err();
        assert!(err.to_string().contains(TELEGRAM_API));
    }

    #[test]
    fn test_empty_token_is_error() {
        let err = Config::from_lookup(lookup_from(&[(TELEGRAM_API, "http://tg"), (GPT_TOKEN, " ")]))
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_invalid_port_is_error() {
        let result = Config::from_lookup(lookup_from(&[
            (TELEGRAM_API, "http://tg"),
            (GPT_TOKEN, "k"),
            (PORT, "eighty"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_defaults_file() {
        let defaults = parse_defaults(
            r#"
[[env]]
name = "PORT"
value = "3000"

[[env]]
name = "TELEGRAM_API"
value = "https://api.telegram.org/botXYZ"
"#,
        )
        .unwrap();

        assert_eq!(defaults.get("PORT").map(String::as_str), Some("3000"));
        assert_eq!(defaults.len(), 2);
    }

    #[test]
    fn test_parse_defaults_rejects_garbage() {
        assert!(parse_defaults("[[env]]\nname = 1").is_err());
    }

    #[test]
    fn test_missing_defaults_file_is_empty() {
        let defaults = load_defaults(Path::new("/nonexistent/relaybot/local.env.toml")).unwrap();
        assert!(defaults.is_empty());
    }

    fn write_defaults(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_blank_env_falls_back_to_file() {
        let file = write_defaults(
            r#"
[[env]]
name = "PORT"
value = "3000"

[[env]]
name = "TELEGRAM_API"
value = "http://tg-from-file"

[[env]]
name = "GPT_TOKEN"
value = "file-token"
"#,
        );
        let env = lookup_from(&[(PORT, ""), (GPT_TOKEN, "env-token")]);

        let config = Config::load_with_env(file.path(), env).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.telegram_api, "http://tg-from-file");
        assert_eq!(config.gpt_token, "env-token");
    }

    #[test]
    fn test_load_broken_file_is_error() {
        let file = write_defaults("[[env]\nname = ");
        let err = Config::load_with_env(file.path(), lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("Failed to parse defaults file"));
    }

    #[test]
    fn test_lookup_prefers_first_source() {
        // Mirrors `Config::load`: environment wins, file fills the gaps.
        let env = lookup_from(&[(GPT_TOKEN, "from-env")]);
        let file = lookup_from(&[(GPT_TOKEN, "from-file"), (TELEGRAM_API, "http://tg")]);
        let config = Config::from_lookup(|name| env(name).or_else(|| file(name))).unwrap();

        assert_eq!(config.gpt_token, "from-env");
        assert_eq!(config.telegram_api, "http://tg");
    }
}
