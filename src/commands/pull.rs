//! `db pull`: introspect the datasource and reconcile the schema file.

use crate::connection::{
    invalid_property, resolve, resolve_value, EnvError, ResolvedDatasource, UrlSource,
};
use crate::datasource::{effective_schemas, summary, ConnectionInfo};
use crate::env::Environment;
use crate::error_codes::{ErrorCode, PullError};
use crate::introspect::{introspect, IntrospectionResult};
use crate::output::{JsonSuccess, Output};
use crate::psl::{parse_document, Document};
use crate::reconcile::{merge, write_atomically};
use crate::redact::redact_dsn;
use crate::session::{setup_ctrlc_handler, IntrospectionSession, TimeoutConfig};
use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Default schema locations, relative to the project directory.
const DEFAULT_SCHEMA_PATHS: &[&str] = &["schema.prisma", "prisma/schema.prisma"];

/// Next step after the schema file changed.
const GENERATE_HINT: &str = "Run prisma generate to generate Prisma Client.";

#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    /// Directory relative paths (and `.env`) are resolved against.
    pub base_dir: PathBuf,
    /// `--schema`
    pub schema: Option<PathBuf>,
    /// `[schema] path` from schemapull.toml
    pub config_schema: Option<String>,
    /// `--url`
    pub url: Option<String>,
    pub print: bool,
    pub force: bool,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    Written {
        path: PathBuf,
        model_count: usize,
        enum_count: usize,
        warnings: Vec<String>,
        /// False when the file was left untouched (empty database or no diff).
        changed: bool,
    },
    Printed(String),
}

impl PullOutcome {
    pub fn is_printed(&self) -> bool {
        matches!(self, PullOutcome::Printed(_))
    }

    /// One-line trace for --verbose.
    pub fn describe(&self) -> String {
        match self {
            PullOutcome::Written {
                path,
                model_count,
                enum_count,
                warnings,
                changed,
            } => format!(
                "{} {} ({} models, {} enums, {} warnings)",
                if *changed { "Wrote" } else { "Left unchanged:" },
                path.display(),
                model_count,
                enum_count,
                warnings.len()
            ),
            PullOutcome::Printed(schema) => format!("Printed {} bytes", schema.len()),
        }
    }
}

#[derive(Serialize)]
struct PrintedData<'a> {
    schema: &'a str,
}

#[derive(Serialize)]
struct WrittenData<'a> {
    schema_path: String,
    models: usize,
    enums: usize,
    changed: bool,
    elapsed_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
}

pub async fn db_pull(opts: &PullOptions, env: Environment, output: &Output) -> Result<PullOutcome> {
    // Print mode keeps stdout for the schema alone.
    let silenced;
    let output = if opts.print {
        silenced = output.silenced();
        &silenced
    } else {
        output
    };

    let schema_path = locate_schema(opts)?;
    if schema_path.is_none() {
        match (&opts.url, opts.print) {
            (None, _) => {
                return Err(PullError::uncoded(
                    "Could not find a schema.prisma file that is required for this command.\nYou can either provide it with `--schema`, set `[schema] path` in schemapull.toml, or put it into the default location `./prisma/schema.prisma`.",
                )
                .into())
            }
            (Some(_), false) => {
                return Err(PullError::uncoded(
                    "Could not find a schema file to write the introspected schema into.\nPass `--schema` with an existing file, or use `--print` to print the result instead.",
                )
                .into())
            }
            (Some(_), true) => {}
        }
    }

    let env = load_env_files(env, opts, schema_path.as_deref(), output)?;

    let (doc, origin) = match &schema_path {
        Some(path) => {
            let origin = display_path(&opts.base_dir, path);
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read schema file {}", path.display()))?;
            let doc = parse_document(&text, &origin)?;
            output.info(&format!("Prisma schema loaded from {}", origin));
            (doc, Some(origin))
        }
        None => (Document::default(), None),
    };

    let declared = doc.datasource(origin.as_deref().unwrap_or("schema.prisma"))?;
    if let Some(ds) = &declared {
        let (url, missing) = match resolve_value(&ds.url, &env) {
            Ok(url) => (url, None),
            Err(EnvError::Undefined(var)) => (String::new(), Some(var)),
            Err(e) => return Err(invalid_property(&ds.name, "url", &e).into()),
        };
        output.info(&summary(
            &ds.name,
            ds.provider,
            &url,
            &ds.schemas,
            missing.as_deref(),
        ));
    }

    let resolved = resolve(opts.url.as_deref(), declared.as_ref(), &env)?;
    output.verbose(&format!("Resolved datasource: {:?}", resolved));

    if !resolved.provider.is_introspectable() {
        return Err(PullError::uncoded(format!(
            "Introspecting {} databases is not supported. Only PostgreSQL and CockroachDB datasources can be pulled.",
            resolved.provider.display_name()
        ))
        .into());
    }

    let status = match (resolved.source, &origin) {
        (UrlSource::Schema, Some(origin)) => {
            format!("Introspecting based on datasource defined in {}", origin)
        }
        _ => "Introspecting based on --url".to_string(),
    };
    output.info("");
    output.info(&format!("- {}", status));

    let started = Instant::now();
    let result = match read_database(&resolved, opts.timeouts, output).await {
        Ok(result) => result,
        Err(e) => {
            output.info(&format!("{} {}", "✖".red(), status));
            return Err(e.into());
        }
    };

    let model_count = result.models.len();
    let enum_count = result.enums.len();
    let warnings = result.warnings.clone();
    let empty = result.is_empty();
    let synthesize = (!doc.has_datasource()).then_some(resolved.provider);
    let merged = merge(&doc, result, opts.force, synthesize);

    if opts.print {
        if output.is_json() {
            output.json(&JsonSuccess::new(
                "schemapull.db_pull",
                PrintedData { schema: &merged },
                warnings,
            ))?;
        } else {
            output.data(&merged);
        }
        return Ok(PullOutcome::Printed(merged));
    }

    // Write mode always has a schema file (checked above).
    let path = schema_path.context("No schema file to write")?;
    let origin = display_path(&opts.base_dir, &path);
    let current = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read schema file {}", path.display()))?;

    let note = if empty {
        Some("The introspected database was empty")
    } else if merged == current {
        Some("The schema file is already up to date")
    } else {
        None
    };
    let changed = note.is_none();
    if changed {
        write_atomically(&path, &merged)?;
    }
    let elapsed_ms = started.elapsed().as_millis();

    if output.is_json() {
        output.json(&JsonSuccess::new(
            "schemapull.db_pull",
            WrittenData {
                schema_path: origin.clone(),
                models: model_count,
                enums: enum_count,
                changed,
                elapsed_ms,
                note,
            },
            warnings.clone(),
        ))?;
    } else if empty {
        output.warn(&format!(
            "{} The introspected database was empty: {} was left unchanged.",
            "!".yellow(),
            origin
        ));
    } else {
        output.info("");
        if changed {
            output.info(&format!(
                "{} Introspected {} models and wrote them into {} in {}ms",
                "✔".green(),
                model_count,
                origin,
                elapsed_ms
            ));
        } else {
            output.info(&format!(
                "{} Introspected {} models, {} is already up to date ({}ms)",
                "✔".green(),
                model_count,
                origin,
                elapsed_ms
            ));
        }
        for warning in &warnings {
            output.warn("");
            output.warn(&format!("{} {}", "warning:".yellow(), warning));
        }
        if changed {
            output.info("");
            output.info(GENERATE_HINT);
        }
    }

    Ok(PullOutcome::Written {
        path,
        model_count,
        enum_count,
        warnings,
        changed,
    })
}

/// Connect, read the catalog, and close the session.
async fn read_database(
    resolved: &ResolvedDatasource,
    timeouts: TimeoutConfig,
    output: &Output,
) -> Result<IntrospectionResult, PullError> {
    if let Some(var) = &resolved.missing_env {
        return Err(PullError::new(
            ErrorCode::DatabaseUnreachable,
            EnvError::Undefined(var.clone()).to_string(),
        )
        .with_note(format!(
            "The datasource `{}` reads its connection string from `{}`. Set it in the environment or in a .env file.",
            resolved.name, var
        )));
    }

    let url = resolved.effective_url();
    let info = ConnectionInfo::parse(resolved.provider, url)?;
    let schemas = effective_schemas(&resolved.schemas, &info);
    output.verbose(&format!(
        "Connecting to {} (schemas: {})",
        redact_dsn(url),
        schemas.join(", ")
    ));

    let session = IntrospectionSession::connect(&info, timeouts).await?;
    let ctrlc = setup_ctrlc_handler(session.cancel_token());
    let result = introspect(session.client(), &schemas).await;
    drop(ctrlc);

    let result = result.map_err(|e| PullError::from_query_error(&e, session.target()))?;
    output.verbose(&format!(
        "Read {} models and {} enums",
        result.models.len(),
        result.enums.len()
    ));
    Ok(result)
}

/// `--schema`, then `[schema] path`, then the default locations.
fn locate_schema(opts: &PullOptions) -> Result<Option<PathBuf>, PullError> {
    if let Some(path) = &opts.schema {
        let full = opts.base_dir.join(path);
        if !full.is_file() {
            return Err(PullError::uncoded(format!(
                "Provided --schema at {} doesn't exist.",
                path.display()
            )));
        }
        return Ok(Some(full));
    }
    if let Some(path) = &opts.config_schema {
        let full = opts.base_dir.join(path);
        if !full.is_file() {
            return Err(PullError::uncoded(format!(
                "Schema file {} configured in schemapull.toml doesn't exist.",
                path
            )));
        }
        return Ok(Some(full));
    }
    Ok(DEFAULT_SCHEMA_PATHS
        .iter()
        .map(|p| opts.base_dir.join(p))
        .find(|p| p.is_file()))
}

/// Merge `.env` from the project directory, then from the schema's directory.
fn load_env_files(
    mut env: Environment,
    opts: &PullOptions,
    schema_path: Option<&Path>,
    output: &Output,
) -> Result<Environment> {
    let mut candidates = vec![opts.base_dir.join(".env")];
    if let Some(dir) = schema_path.and_then(Path::parent) {
        candidates.push(dir.join(".env"));
    }
    for candidate in candidates {
        if env.load_file(&candidate)? {
            output.info(&format!(
                "Environment variables loaded from {}",
                display_path(&opts.base_dir, &candidate)
            ));
        }
    }
    Ok(env)
}

/// Path as the user would type it from the project directory.
fn display_path(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
