//! Schema document model.
//!
//! A schema file is kept as an ordered list of top-level blocks, each with the
//! whitespace and comments that precede it. Printing a parsed document gives
//! back the exact input text, so blocks the merge does not replace survive
//! byte-for-byte.

mod parse;
mod render;

pub use parse::parse_document;
pub(crate) use render::escape;
pub use render::{render_datasource, render_enum, render_model};

use crate::datasource::Provider;
use crate::error_codes::PullError;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub items: Vec<Item>,
    /// Trivia after the last block (may be empty: no trailing newline).
    pub trailing: String,
}

/// A block plus the trivia that precedes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub leading: String,
    pub block: Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Datasource,
    Generator,
    Model,
    Enum,
    View,
    Type,
}

impl BlockKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            BlockKind::Datasource => "datasource",
            BlockKind::Generator => "generator",
            BlockKind::Model => "model",
            BlockKind::Enum => "enum",
            BlockKind::View => "view",
            BlockKind::Type => "type",
        }
    }

    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "datasource" => Some(BlockKind::Datasource),
            "generator" => Some(BlockKind::Generator),
            "model" => Some(BlockKind::Model),
            "enum" => Some(BlockKind::Enum),
            "view" => Some(BlockKind::View),
            "type" => Some(BlockKind::Type),
            _ => None,
        }
    }

    /// Blocks that describe configuration rather than data shapes.
    pub fn is_config(&self) -> bool {
        matches!(self, BlockKind::Datasource | BlockKind::Generator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub name: String,
    /// Exact source text from the keyword through the closing brace.
    pub raw: String,
    /// 1-based line of the keyword.
    pub line: usize,
    /// `key = value` pairs (datasource and generator blocks only).
    pub properties: Vec<Property>,
}

impl Block {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| &p.value)
    }

    /// Database name of a model or enum: `@@map("...")` if present, else the
    /// block name.
    pub fn mapped_name(&self) -> String {
        static MAP_RE: OnceLock<Regex> = OnceLock::new();
        let re = MAP_RE.get_or_init(|| {
            Regex::new(r#"(?m)^\s*@@map\(\s*(?:name\s*:\s*)?"((?:[^"\\]|\\.)*)"\s*\)"#)
                .expect("valid regex")
        });
        re.captures(&self.raw)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| self.name.clone())
    }

    /// `@@schema("...")` of a model or enum, if declared.
    pub fn schema_attribute(&self) -> Option<String> {
        static SCHEMA_RE: OnceLock<Regex> = OnceLock::new();
        let re = SCHEMA_RE.get_or_init(|| {
            Regex::new(r#"(?m)^\s*@@schema\(\s*"([^"]*)"\s*\)"#).expect("valid regex")
        });
        re.captures(&self.raw).map(|c| c[1].to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub key: String,
    pub value: Value,
}

/// Right-hand side of a block property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    /// `env("NAME")`
    Env(String),
    Array(Vec<Value>),
    Bool(bool),
    /// Identifiers, numbers and function calls other than `env`, kept verbatim.
    Raw(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// The datasource block of a document, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasourceBlock {
    pub name: String,
    pub provider: Provider,
    pub url: Value,
    pub direct_url: Option<Value>,
    pub schemas: Vec<String>,
}

impl Document {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.items.iter().map(|i| &i.block)
    }

    pub fn has_datasource(&self) -> bool {
        self.blocks().any(|b| b.kind == BlockKind::Datasource)
    }

    /// Extract and validate the datasource block.
    ///
    /// `origin` names the file in error locations.
    pub fn datasource(&self, origin: &str) -> Result<Option<DatasourceBlock>, PullError> {
        let mut found = self.blocks().filter(|b| b.kind == BlockKind::Datasource);
        let Some(block) = found.next() else {
            return Ok(None);
        };
        if let Some(extra) = found.next() {
            return Err(validation_error(
                "You defined more than one datasource. This is not allowed yet because support for multiple databases has not been implemented yet.",
                origin,
                extra.line,
            ));
        }

        let provider = match block.property("provider") {
            Some(Value::Str(p)) => Provider::parse(p).ok_or_else(|| {
                validation_error(
                    &format!(
                        "Datasource provider not known: \"{}\". Expected one of postgresql, cockroachdb, mysql, sqlite, sqlserver, mongodb.",
                        p
                    ),
                    origin,
                    block.line,
                )
            })?,
            Some(_) => {
                return Err(validation_error(
                    "The `provider` argument of a datasource must be a string literal.",
                    origin,
                    block.line,
                ))
            }
            None => {
                return Err(validation_error(
                    &format!(
                        "Argument \"provider\" is missing in data source block \"{}\".",
                        block.name
                    ),
                    origin,
                    block.line,
                ))
            }
        };

        let url = match block.property("url") {
            Some(v @ (Value::Str(_) | Value::Env(_))) => v.clone(),
            Some(_) => {
                return Err(validation_error(
                    "The `url` argument of a datasource must be a string literal or an env() call.",
                    origin,
                    block.line,
                ))
            }
            None => {
                return Err(validation_error(
                    &format!(
                        "Argument \"url\" is missing in data source block \"{}\".",
                        block.name
                    ),
                    origin,
                    block.line,
                ))
            }
        };

        let direct_url = match block.property("directUrl") {
            None => None,
            Some(v @ (Value::Str(_) | Value::Env(_))) => Some(v.clone()),
            Some(_) => {
                return Err(validation_error(
                    "The `directUrl` argument of a datasource must be a string literal or an env() call.",
                    origin,
                    block.line,
                ))
            }
        };

        let schemas = match block.property("schemas") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        validation_error(
                            "The `schemas` argument must be an array of strings.",
                            origin,
                            block.line,
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(validation_error(
                    "The `schemas` argument must be an array of strings.",
                    origin,
                    block.line,
                ))
            }
        };

        Ok(Some(DatasourceBlock {
            name: block.name.clone(),
            provider,
            url,
            direct_url,
            schemas,
        }))
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            f.write_str(&item.leading)?;
            f.write_str(&item.block.raw)?;
        }
        f.write_str(&self.trailing)
    }
}

pub(crate) fn validation_error(message: &str, origin: &str, line: usize) -> PullError {
    PullError::schema_validation(format!(
        "Prisma schema validation error\nerror: {}\n  -->  {}:{}",
        message, origin, line
    ))
}
