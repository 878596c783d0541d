use config::ConfigError;

const ENV_PREFIX: &str = "APP";

/// Upper bound for any token lifetime: ten years
pub const MAX_TOKEN_EXPIRY_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    pub password: PasswordSettings,
    pub storage: StorageSettings,
    pub database: Option<DatabaseSettings>,
    pub gateway: GatewaySettings,
}

/// Auth service listener
#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// Token signing settings.
///
/// Access and refresh tokens are signed with different secrets so a leak of
/// one cannot be used to forge the other.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expiry: i64,   // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64,  // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
}

// Secrets stay out of logs and panic messages.
impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("access_secret", &"[redacted]")
            .field("refresh_secret", &"[redacted]")
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl JwtSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.trim().is_empty() {
            return Err(ConfigError::Message("jwt.access_secret must be set".to_string()));
        }
        if self.refresh_secret.trim().is_empty() {
            return Err(ConfigError::Message("jwt.refresh_secret must be set".to_string()));
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::Message(
                "jwt.access_secret and jwt.refresh_secret must differ".to_string(),
            ));
        }
        for (name, expiry) in [
            ("jwt.access_token_expiry", self.access_token_expiry),
            ("jwt.refresh_token_expiry", self.refresh_token_expiry),
        ] {
            if expiry <= 0 {
                return Err(ConfigError::Message(format!("{} must be positive", name)));
            }
            if expiry > MAX_TOKEN_EXPIRY_SECONDS {
                return Err(ConfigError::Message(format!(
                    "{} must not exceed {} seconds",
                    name, MAX_TOKEN_EXPIRY_SECONDS
                )));
            }
        }
        Ok(())
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct PasswordSettings {
    /// bcrypt cost factor (4..=31)
    pub hash_cost: u32,
}

#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub timeout_millis: u64,
}

impl StorageSettings {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_millis)
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct RateLimitSettings {
    pub window_seconds: u64,
    pub max_requests: u32,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct GatewaySettings {
    pub host: String,
    pub port: u16,
    pub auth_service_url: String,
    pub resource_service_url: Option<String>,
    pub allowed_origins: Vec<String>,
    pub rate_limit: RateLimitSettings,
    pub body_limit_bytes: usize,
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    builder
        .set_default("application.host", "127.0.0.1")?
        .set_default("application.port", 3001)?
        .set_default("jwt.access_token_expiry", 900)?
        .set_default("jwt.refresh_token_expiry", 604_800)?
        .set_default("jwt.issuer", "authgate")?
        .set_default("password.hash_cost", 12)?
        .set_default("storage.backend", "memory")?
        .set_default("storage.timeout_millis", 2_000)?
        .set_default("gateway.host", "127.0.0.1")?
        .set_default("gateway.port", 3000)?
        .set_default("gateway.auth_service_url", "http://127.0.0.1:3001")?
        .set_default("gateway.allowed_origins", Vec::<String>::new())?
        .set_default("gateway.rate_limit.window_seconds", 900)?
        .set_default("gateway.rate_limit.max_requests", 100)?
        .set_default("gateway.body_limit_bytes", 2 * 1024 * 1024)
}

/// Load settings from `configuration.{yaml,toml,json}` (optional) overlaid
/// with `APP_`-prefixed environment variables, e.g. `APP_JWT__ACCESS_SECRET`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = with_defaults(config::Config::builder())?
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("gateway.allowed_origins")
                .try_parsing(true),
        )
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    settings.jwt.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn from_yaml(yaml: &str) -> Result<Settings, ConfigError> {
        with_defaults(config::Config::builder())?
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Settings>()
    }

    #[test]
    fn test_defaults_fill_missing_values() {
        let settings = from_yaml(
            r#"
jwt:
  access_secret: "access-secret-value"
  refresh_secret: "refresh-secret-value"
"#,
        )
        .expect("settings should deserialize");

        assert_eq!(settings.application.port, 3001);
        assert_eq!(settings.jwt.access_token_expiry, 900);
        assert_eq!(settings.jwt.refresh_token_expiry, 604_800);
        assert_eq!(settings.password.hash_cost, 12);
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert_eq!(settings.gateway.rate_limit.max_requests, 100);
        assert!(settings.gateway.allowed_origins.is_empty());
        assert!(settings.gateway.resource_service_url.is_none());
        assert!(settings.database.is_none());
        assert!(settings.jwt.validate().is_ok());
    }

    #[test]
    fn test_secrets_have_no_default() {
        assert!(from_yaml("application:\n  port: 4000\n").is_err());
    }

    #[test]
    fn test_identical_secrets_rejected() {
        let settings = from_yaml(
            r#"
jwt:
  access_secret: "same"
  refresh_secret: "same"
"#,
        )
        .unwrap();

        assert!(settings.jwt.validate().is_err());
    }

    #[test]
    fn test_token_expiry_must_be_in_range() {
        let yaml = |access: &str, refresh: &str| {
            format!(
                "jwt:\n  access_secret: \"a\"\n  refresh_secret: \"b\"\n  access_token_expiry: {}\n  refresh_token_expiry: {}\n",
                access, refresh
            )
        };

        let test_cases = vec![
            ("0", "604800"),
            ("900", "-1"),
            ("9223372036854775807", "604800"),
            ("900", "315360001"),
        ];
        for (access, refresh) in test_cases {
            let settings = from_yaml(&yaml(access, refresh)).unwrap();
            assert!(
                settings.jwt.validate().is_err(),
                "expiry {}/{} was accepted",
                access,
                refresh
            );
        }

        let settings = from_yaml(&yaml("900", "315360000")).unwrap();
        assert!(settings.jwt.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let settings = from_yaml(
            r#"
jwt:
  access_secret: "super-secret-access"
  refresh_secret: "super-secret-refresh"
"#,
        )
        .unwrap();

        let printed = format!("{:?}", settings.jwt);
        assert!(!printed.contains("super-secret"));
    }
}
