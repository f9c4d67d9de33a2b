use crate::models::Role;
use config::{Config, ConfigError, File};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;

fn deserialize_allowed_origins<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }
    match StringOrVec::deserialize(deserializer) {
        Ok(StringOrVec::String(s)) => Ok(s.split(',').map(|x| x.trim().to_string()).filter(|x| !x.is_empty()).collect()),
        Ok(StringOrVec::Vec(v)) => Ok(v),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub users: HashMap<String, UserConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite file; created on first start.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(deserialize_with = "deserialize_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    /// `"*"` anywhere in the list opens CORS to every origin, method and header.
    pub fn is_permissive(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: String,
}

/// One entry of the credential store. Passwords are kept as configured.
#[derive(Clone, Deserialize)]
pub struct UserConfig {
    pub password: String,
    pub role: Role,
}

impl std::fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserConfig")
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Self::builder()?
            .add_source(File::with_name("config.toml").required(false))
            .add_source(config::Environment::with_prefix("CLINREC").separator("__"))
            .build()?;

        Self::finish(config)
    }

    /// Load settings from one file only, without environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::builder()?
            .add_source(File::from(path.as_ref()))
            .build()?;

        Self::finish(config)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.bind_addr", "127.0.0.1:8000")?
            .set_default("database.path", "patients.db")?
            .set_default("cors.allowed_origins", "*")?
            .set_default("logging.level", "info")?
            .set_default("logging.log_dir", "./logs")
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        if settings.users.is_empty() {
            return Err(ConfigError::Message(
                "no users configured; add at least one [users.<name>] entry".to_string(),
            ));
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_users_and_defaults() {
        let file = write_config(
            r#"
            [users.admin]
            password = "clave123"
            role = "admin"

            [users.medico]
            password = "salud2024"
            role = "clinician"
            "#,
        );

        let settings = Settings::from_file(file.path()).unwrap();

        assert_eq!(settings.server.bind_addr, "127.0.0.1:8000");
        assert_eq!(settings.database.path, "patients.db");
        assert!(settings.cors.is_permissive());
        assert_eq!(settings.users.len(), 2);
        assert_eq!(settings.users["admin"].role, Role::Admin);
        assert_eq!(settings.users["medico"].role, Role::Clinician);
    }

    #[test]
    fn test_no_users_is_rejected() {
        let file = write_config(
            r#"
            [server]
            bind_addr = "0.0.0.0:9000"
            "#,
        );

        assert!(Settings::from_file(file.path()).is_err());
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let file = write_config(
            r#"
            [users.root]
            password = "x"
            role = "superuser"
            "#,
        );

        assert!(Settings::from_file(file.path()).is_err());
    }

    #[test]
    fn test_origin_list_from_string() {
        let file = write_config(
            r#"
            [cors]
            allowed_origins = "https://a.example, https://b.example"

            [users.consulta]
            password = "ver123"
            role = "viewer"
            "#,
        );

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(
            settings.cors.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(!settings.cors.is_permissive());
    }

    #[test]
    fn test_debug_redacts_password() {
        let user = UserConfig {
            password: "clave123".to_string(),
            role: Role::Admin,
        };
        assert!(!format!("{:?}", user).contains("clave123"));
    }
}
