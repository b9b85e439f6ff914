//! Effective datasource resolution.
//!
//! Picks the connection string to introspect from `--url` or the schema's
//! datasource block:
//! - `--url` wins, but its provider must match a declared provider
//! - `env("VAR")` is substituted from an explicit [`Environment`]
//! - `directUrl` is preferred for connecting when it resolves

use crate::datasource::{summary, Provider};
use crate::env::Environment;
use crate::error_codes::PullError;
use crate::psl::{DatasourceBlock, Value};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("Environment variable not found: {0}.")]
    Undefined(String),
    #[error("Expected a string or an env() call, found {0}.")]
    NotAString(&'static str),
}

/// Substitute a datasource value. Pure: reads only `env`.
pub fn resolve_value(value: &Value, env: &Environment) -> Result<String, EnvError> {
    match value {
        Value::Env(name) => env
            .get(name)
            .map(str::to_string)
            .ok_or_else(|| EnvError::Undefined(name.clone())),
        Value::Str(s) => Ok(s.clone()),
        Value::Raw(_) => Err(EnvError::NotAString("an expression")),
        Value::Bool(_) => Err(EnvError::NotAString("a boolean")),
        Value::Array(_) => Err(EnvError::NotAString("a list")),
    }
}

/// P1012 for a datasource property that cannot be used as a connection string.
pub fn invalid_property(datasource: &str, key: &str, err: &EnvError) -> PullError {
    PullError::schema_validation(format!(
        "Invalid `{}` in datasource `{}`: {}",
        key, datasource, err
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlSource {
    /// `--url`
    Flag,
    /// Datasource block of the schema file
    Schema,
}

/// A fully resolved datasource ready for use
#[derive(Clone)]
pub struct ResolvedDatasource {
    pub name: String,
    pub provider: Provider,
    /// Resolved connection string (never log this!)
    pub url: String,
    /// Resolved `directUrl` (never log this!)
    pub direct_url: Option<String>,
    pub schemas: Vec<String>,
    pub source: UrlSource,
    /// Variable referenced by `url = env(...)` that is not defined.
    pub missing_env: Option<String>,
}

impl fmt::Debug for ResolvedDatasource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedDatasource")
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("url", &crate::redact::redact_dsn(&self.url))
            .field("direct_url", &self.direct_url.as_deref().map(crate::redact::redact_dsn))
            .field("schemas", &self.schemas)
            .field("source", &self.source)
            .field("missing_env", &self.missing_env)
            .finish()
    }
}

impl ResolvedDatasource {
    /// Connection string used to open the session.
    pub fn effective_url(&self) -> &str {
        self.direct_url.as_deref().unwrap_or(&self.url)
    }

    /// `Datasource "db": PostgreSQL database ...` line.
    pub fn summary(&self) -> String {
        summary(
            &self.name,
            self.provider,
            &self.url,
            &self.schemas,
            self.missing_env.as_deref(),
        )
    }
}

/// Resolve the datasource to introspect.
pub fn resolve(
    flag_url: Option<&str>,
    datasource: Option<&DatasourceBlock>,
    env: &Environment,
) -> Result<ResolvedDatasource, PullError> {
    if let Some(url) = flag_url {
        let url_provider = Provider::from_url(url)?;
        if let Some(ds) = datasource {
            if !ds.provider.accepts(url_provider) {
                return Err(PullError::uncoded(format!(
                    "The database provider found in --url ({}) is different from the provider found in the Prisma schema ({}).",
                    url_provider, ds.provider
                )));
            }
        }
        return Ok(ResolvedDatasource {
            name: datasource
                .map(|d| d.name.clone())
                .unwrap_or_else(|| "db".to_string()),
            provider: datasource.map(|d| d.provider).unwrap_or(url_provider),
            url: url.to_string(),
            direct_url: None,
            schemas: datasource.map(|d| d.schemas.clone()).unwrap_or_default(),
            source: UrlSource::Flag,
            missing_env: None,
        });
    }

    let Some(ds) = datasource else {
        return Err(PullError::uncoded(
            "Could not find a datasource in the schema.\n\nAdd a datasource block to the schema file or pass a connection string with --url.",
        ));
    };

    let (url, missing_env) = match resolve_value(&ds.url, env) {
        Ok(url) => (url, None),
        Err(EnvError::Undefined(var)) => (String::new(), Some(var)),
        Err(e) => return Err(invalid_property(&ds.name, "url", &e)),
    };
    if missing_env.is_none() {
        check_protocol(&ds.name, ds.provider, &url)?;
    }

    let direct_url = match &ds.direct_url {
        Some(value) => match resolve_value(value, env) {
            Ok(direct) if !direct.trim().is_empty() => {
                check_protocol(&ds.name, ds.provider, &direct)?;
                Some(direct)
            }
            Ok(_) | Err(EnvError::Undefined(_)) => None,
            Err(e) => return Err(invalid_property(&ds.name, "directUrl", &e)),
        },
        None => None,
    };

    Ok(ResolvedDatasource {
        name: ds.name.clone(),
        provider: ds.provider,
        url,
        direct_url,
        schemas: ds.schemas.clone(),
        source: UrlSource::Schema,
        missing_env,
    })
}

/// A schema URL must use its declared provider's protocol.
fn check_protocol(name: &str, provider: Provider, url: &str) -> Result<(), PullError> {
    let matches = Provider::from_url(url)
        .map(|p| provider.accepts(p))
        .unwrap_or(false);
    if matches {
        return Ok(());
    }
    let expected = match provider {
        Provider::Postgresql | Provider::Cockroachdb => "`postgresql://` or `postgres://`",
        Provider::Mysql => "`mysql://`",
        Provider::Sqlite => "`file:`",
        Provider::Sqlserver => "`sqlserver://`",
        Provider::Mongodb => "`mongodb://` or `mongodb+srv://`",
    };
    Err(PullError::schema_validation(format!(
        "Error validating datasource `{}`: the URL must start with the protocol {}.",
        name, expected
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_codes::ErrorCode;

    fn ds(provider: Provider, url: Value) -> DatasourceBlock {
        DatasourceBlock {
            name: "my_db".to_string(),
            provider,
            url,
            direct_url: None,
            schemas: Vec::new(),
        }
    }

    fn env_url() -> Value {
        Value::Env("DATABASE_URL".to_string())
    }

    #[test]
    fn test_resolve_value_env() {
        let env = Environment::from_vars([("DATABASE_URL", "postgres://h/db")]);
        assert_eq!(resolve_value(&env_url(), &env).unwrap(), "postgres://h/db");
        assert_eq!(
            resolve_value(&Value::Env("NOPE".to_string()), &env),
            Err(EnvError::Undefined("NOPE".to_string()))
        );
        assert_eq!(
            resolve_value(&Value::Str("file:dev.db".to_string()), &env).unwrap(),
            "file:dev.db"
        );
    }

    #[test]
    fn test_non_string_values_are_rejected() {
        let env = Environment::from_vars([("DATABASE_URL", "postgres://h/db")]);
        assert_eq!(
            resolve_value(&Value::Array(vec![env_url()]), &env),
            Err(EnvError::NotAString("a list"))
        );
        assert_eq!(
            resolve_value(&Value::Bool(true), &env),
            Err(EnvError::NotAString("a boolean"))
        );

        let schema_ds = ds(Provider::Postgresql, Value::Array(vec![]));
        let err = resolve(None, Some(&schema_ds), &env).unwrap_err();
        assert_eq!(err.code, Some(ErrorCode::SchemaValidation));
        assert!(err.message.contains("Invalid `url` in datasource `my_db`"), "{}", err.message);
    }

    #[test]
    fn test_flag_provider_mismatch() {
        let schema_ds = ds(Provider::Sqlite, Value::Str("file:dev.db".to_string()));
        let err = resolve(
            Some("postgresql://user:pw@localhost:5432/db"),
            Some(&schema_ds),
            &Environment::default(),
        )
        .unwrap_err();
        assert_eq!(err.code, None);
        assert_eq!(
            err.message,
            "The database provider found in --url (postgresql) is different from the provider found in the Prisma schema (sqlite)."
        );
    }

    #[test]
    fn test_flag_wins_over_schema() {
        let schema_ds = ds(Provider::Postgresql, env_url());
        let env = Environment::from_vars([("DATABASE_URL", "postgres://from-env/db")]);
        let resolved = resolve(Some("postgres://from-flag/db"), Some(&schema_ds), &env).unwrap();
        assert_eq!(resolved.url, "postgres://from-flag/db");
        assert_eq!(resolved.source, UrlSource::Flag);
        assert_eq!(resolved.name, "my_db");
    }

    #[test]
    fn test_flag_without_schema() {
        let resolved = resolve(Some("postgres://h/db"), None, &Environment::default()).unwrap();
        assert_eq!(resolved.name, "db");
        assert_eq!(resolved.provider, Provider::Postgresql);
    }

    #[test]
    fn test_cockroach_schema_accepts_postgres_flag() {
        let schema_ds = ds(Provider::Cockroachdb, env_url());
        let resolved =
            resolve(Some("postgresql://h:26257/db"), Some(&schema_ds), &Environment::default())
                .unwrap();
        assert_eq!(resolved.provider, Provider::Cockroachdb);
    }

    #[test]
    fn test_invalid_flag_scheme() {
        let err = resolve(Some("redis://h"), None, &Environment::default()).unwrap_err();
        assert_eq!(err.code, Some(ErrorCode::InvalidDatabaseString));
    }

    #[test]
    fn test_no_datasource() {
        let err = resolve(None, None, &Environment::default()).unwrap_err();
        assert_eq!(err.code, None);
        assert!(err.message.contains("Could not find a datasource"));
    }

    #[test]
    fn test_undefined_env_is_deferred() {
        let schema_ds = ds(Provider::Postgresql, env_url());
        let resolved = resolve(None, Some(&schema_ds), &Environment::default()).unwrap();
        assert_eq!(resolved.url, "");
        assert_eq!(resolved.missing_env.as_deref(), Some("DATABASE_URL"));
    }

    #[test]
    fn test_direct_url_preferred() {
        let mut schema_ds = ds(Provider::Postgresql, env_url());
        schema_ds.direct_url = Some(Value::Env("DIRECT_URL".to_string()));
        let env = Environment::from_vars([
            ("DATABASE_URL", "postgres://pooler:6543/db"),
            ("DIRECT_URL", "postgres://direct:5432/db"),
        ]);
        let resolved = resolve(None, Some(&schema_ds), &env).unwrap();
        assert_eq!(resolved.effective_url(), "postgres://direct:5432/db");
        // The summary still describes the main url.
        assert!(resolved.summary().contains("pooler:6543"));
    }

    #[test]
    fn test_direct_url_missing_falls_back() {
        let mut schema_ds = ds(Provider::Postgresql, env_url());
        schema_ds.direct_url = Some(Value::Env("DIRECT_URL".to_string()));
        let env = Environment::from_vars([("DATABASE_URL", "postgres://pooler:6543/db")]);
        let resolved = resolve(None, Some(&schema_ds), &env).unwrap();
        assert_eq!(resolved.effective_url(), "postgres://pooler:6543/db");
    }

    #[test]
    fn test_schema_url_protocol_must_match_provider() {
        let schema_ds = ds(Provider::Postgresql, Value::Str("mysql://h/db".to_string()));
        let err = resolve(None, Some(&schema_ds), &Environment::default()).unwrap_err();
        assert_eq!(err.code, Some(ErrorCode::SchemaValidation));
        assert!(err.message.contains("postgresql://"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let resolved = resolve(Some("postgres://u:hunter2@h/db"), None, &Environment::default())
            .unwrap();
        assert!(!format!("{:?}", resolved).contains("hunter2"));
    }
}
