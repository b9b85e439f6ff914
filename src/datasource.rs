//! Datasource descriptors: providers, connection string parsing and the one-line
//! summary printed after the schema is loaded.

use crate::error_codes::{ConnectTarget, PullError};
use std::fmt;
use url::Url;

/// Database engine kind declared in a datasource block or implied by a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Postgresql,
    Cockroachdb,
    Mysql,
    Sqlite,
    Sqlserver,
    Mongodb,
}

impl Provider {
    /// Parse a `provider = "..."` value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "postgresql" | "postgres" => Some(Provider::Postgresql),
            "cockroachdb" => Some(Provider::Cockroachdb),
            "mysql" => Some(Provider::Mysql),
            "sqlite" => Some(Provider::Sqlite),
            "sqlserver" => Some(Provider::Sqlserver),
            "mongodb" => Some(Provider::Mongodb),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Postgresql => "postgresql",
            Provider::Cockroachdb => "cockroachdb",
            Provider::Mysql => "mysql",
            Provider::Sqlite => "sqlite",
            Provider::Sqlserver => "sqlserver",
            Provider::Mongodb => "mongodb",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Postgresql => "PostgreSQL",
            Provider::Cockroachdb => "CockroachDB",
            Provider::Mysql => "MySQL",
            Provider::Sqlite => "SQLite",
            Provider::Sqlserver => "SQL Server",
            Provider::Mongodb => "MongoDB",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Provider::Postgresql => 5432,
            Provider::Cockroachdb => 26257,
            Provider::Mysql => 3306,
            Provider::Sqlite => 0,
            Provider::Sqlserver => 1433,
            Provider::Mongodb => 27017,
        }
    }

    /// Detect the provider from a connection string's scheme.
    pub fn from_url(url: &str) -> Result<Self, PullError> {
        let url = url.trim();
        if url.starts_with("file:") {
            return Ok(Provider::Sqlite);
        }
        let scheme = url
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| {
                PullError::invalid_database_string(
                    "The scheme is not recognized in database URL. It must start with a protocol such as `postgresql://`, `mysql://`, `sqlserver://`, `mongodb://` or `file:`.",
                )
            })?;

        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(Provider::Postgresql),
            "mysql" => Ok(Provider::Mysql),
            "sqlserver" => Ok(Provider::Sqlserver),
            "mongodb" | "mongodb+srv" => Ok(Provider::Mongodb),
            other => Err(PullError::invalid_database_string(format!(
                "The scheme `{}` is not recognized in database URL.",
                other
            ))),
        }
    }

    /// Whether a URL detected as `url_provider` may be used for a datasource
    /// that declares `self`.
    pub fn accepts(&self, url_provider: Provider) -> bool {
        *self == url_provider
            || (*self == Provider::Cockroachdb && url_provider == Provider::Postgresql)
    }

    /// Providers the introspection driver can actually read.
    pub fn is_introspectable(&self) -> bool {
        matches!(self, Provider::Postgresql | Provider::Cockroachdb)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Components of a connection string.
#[derive(Clone)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    /// Never print this
    pub password: Option<String>,
    /// `?schema=` parameter (PostgreSQL only)
    pub schema: Option<String>,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("schema", &self.schema)
            .finish()
    }
}

impl ConnectionInfo {
    /// Parse a network connection string (everything except SQLite).
    pub fn parse(provider: Provider, url: &str) -> Result<Self, PullError> {
        if provider == Provider::Sqlserver {
            return Self::parse_sqlserver(url);
        }

        let parsed = Url::parse(url.trim()).map_err(PullError::invalid_database_string)?;
        if !parsed.has_host() {
            return Err(PullError::invalid_database_string(
                "The database URL must contain a host.",
            ));
        }

        let mut host = parsed.host_str().unwrap_or("localhost").to_string();
        // IPv6 literals come back bracketed.
        if host.starts_with('[') && host.ends_with(']') {
            host = host[1..host.len() - 1].to_string();
        }
        let port = parsed.port().unwrap_or_else(|| provider.default_port());
        let user = decode(parsed.username());
        let password = parsed.password().map(decode);
        let mut database = decode(parsed.path().trim_start_matches('/'));

        let mut schema = None;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "schema" => schema = Some(value.to_string()),
                // Unix socket directory overrides the URL host.
                "host" if !value.is_empty() => host = value.to_string(),
                "dbname" if database.is_empty() => database = value.to_string(),
                _ => {}
            }
        }

        let user = if user.is_empty() {
            "postgres".to_string()
        } else {
            user
        };
        if database.is_empty() {
            database = match provider {
                Provider::Postgresql | Provider::Cockroachdb => "postgres".to_string(),
                _ => String::new(),
            };
        }

        Ok(Self {
            host,
            port,
            database,
            user,
            password,
            schema,
        })
    }

    /// `sqlserver://host:port;database=x;user=y;password=z`
    fn parse_sqlserver(url: &str) -> Result<Self, PullError> {
        let rest = url
            .trim()
            .strip_prefix("sqlserver://")
            .ok_or_else(|| PullError::invalid_database_string("Expected a `sqlserver://` URL."))?;
        let mut parts = rest.split(';');
        let addr = parts.next().unwrap_or_default();
        let (host, port) = match addr.rsplit_once(':') {
            Some((h, p)) => (
                h.to_string(),
                p.parse::<u16>().map_err(|_| {
                    PullError::invalid_database_string(format!("Invalid port `{}`.", p))
                })?,
            ),
            None => (addr.to_string(), Provider::Sqlserver.default_port()),
        };

        let mut info = Self {
            host: if host.is_empty() {
                "localhost".to_string()
            } else {
                host
            },
            port,
            database: "master".to_string(),
            user: String::new(),
            password: None,
            schema: None,
        };
        for part in parts {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "database" | "initial catalog" => info.database = value.trim().to_string(),
                "user" | "username" | "uid" => info.user = value.trim().to_string(),
                "password" | "pwd" => info.password = Some(value.trim().to_string()),
                "schema" => info.schema = Some(value.trim().to_string()),
                _ => {}
            }
        }
        Ok(info)
    }

    pub fn target(&self) -> ConnectTarget {
        ConnectTarget {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
        }
    }
}

fn decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

/// Database file named by a SQLite `file:` URL.
pub fn sqlite_file(url: &str) -> &str {
    let path = url.trim().trim_start_matches("file:");
    let path = path.trim_start_matches("//");
    path.split('?').next().unwrap_or(path)
}

/// One-line datasource summary, e.g.
/// `Datasource "db": PostgreSQL database "app", schema "public" at "localhost:5432"`.
///
/// `url` may be empty when the referenced environment variable is not set.
pub fn summary(
    name: &str,
    provider: Provider,
    url: &str,
    schemas: &[String],
    missing_env: Option<&str>,
) -> String {
    let prefix = format!("Datasource \"{}\": {} database", name, provider.display_name());

    if let Some(var) = missing_env {
        return format!("{} (environment variable `{}` is not set)", prefix, var);
    }

    if provider == Provider::Sqlite {
        return format!("{} \"{}\" at \"{}\"", prefix, sqlite_file(url), url.trim());
    }

    let Ok(info) = ConnectionInfo::parse(provider, url) else {
        return format!("{} at \"{}\"", prefix, crate::redact::redact_dsn(url));
    };

    let location = format!("at \"{}:{}\"", info.host, info.port);
    match provider {
        Provider::Postgresql | Provider::Cockroachdb => {
            let schemas = effective_schemas(schemas, &info);
            let label = if schemas.len() == 1 { "schema" } else { "schemas" };
            format!(
                "{} \"{}\", {} \"{}\" {}",
                prefix,
                info.database,
                label,
                schemas.join(", "),
                location
            )
        }
        _ => format!("{} \"{}\" {}", prefix, info.database, location),
    }
}

/// Schemas to introspect: the datasource's `schemas` list, else the URL
/// `?schema=` parameter, else `public`.
pub fn effective_schemas(declared: &[String], info: &ConnectionInfo) -> Vec<String> {
    if !declared.is_empty() {
        return declared.to_vec();
    }
    vec![info.schema.clone().unwrap_or_else(|| "public".to_string())]
}
