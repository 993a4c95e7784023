use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
}

/// Connection parameters for the primary database.
#[derive(Clone)]
pub struct DatabaseSettings {
    pub connection: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub echo: bool,
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("connection", &self.connection)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("echo", &self.echo)
            .finish()
    }
}

impl DatabaseSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup (the process environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        Ok(Self {
            connection: required("DB_CONNECTION")?,
            host: lookup("DB_HOST").unwrap_or_else(|| "localhost".into()),
            port: parse("DB_PORT", &required("DB_PORT")?)?,
            name: required("DB_NAME")?,
            user: required("DB_USER")?,
            password: required("DB_PASSWORD")?,
            max_connections: match lookup("DB_MAX_CONNECTIONS") {
                Some(v) => parse("DB_MAX_CONNECTIONS", &v)?,
                None => 10,
            },
            echo: match lookup("DB_ECHO") {
                Some(v) => parse("DB_ECHO", &v)?,
                None => false,
            },
        })
    }

    pub fn database_url(&self) -> String {
        format!(
            "{}://{}:{}@{}:{}/{}",
            self.connection, self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub app_host: String,
    pub app_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = DatabaseSettings::from_lookup(&lookup)?;
        let app_host = lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let app_port = match lookup("APP_PORT") {
            Some(v) => parse("APP_PORT", &v)?,
            None => 8080,
        };
        Ok(Self {
            database,
            app_host,
            app_port,
        })
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.app_host, self.app_port);
        raw.parse().map_err(|_| ConfigError::Invalid {
            name: "APP_HOST",
            value: raw,
        })
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}
