//! Merge an introspection result into an existing schema document.
//!
//! Only model and enum blocks are replaced. Everything else (datasource,
//! generator, view and type blocks, comments between blocks, trailing text)
//! is copied from the source document unchanged.

use crate::datasource::Provider;
use crate::introspect::{IntrospectionResult, ModelDescriptor, IGNORED_MODEL_DOC};
use crate::psl::{render_datasource, render_enum, render_model, BlockKind, Document};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

struct Piece {
    leading: String,
    text: String,
    config: bool,
}

/// Produce the reconciled schema text.
///
/// Existing models and enums that still exist in the database keep their
/// position, leading comments and custom (`@@map`) names. With `force` every
/// model and enum is regenerated and appended in alphabetical order.
/// `synthesize` adds a datasource block when the document has none. An empty
/// result leaves existing models and enums as they are.
pub fn merge(
    doc: &Document,
    mut result: IntrospectionResult,
    force: bool,
    synthesize: Option<Provider>,
) -> String {
    if !force {
        adopt_existing_names(doc, &mut result);
    }

    let mut pieces: Vec<Piece> = Vec::new();
    let mut kept_models = vec![false; result.models.len()];
    let mut kept_enums = vec![false; result.enums.len()];
    let mut dropped_first = false;
    let keep_existing = result.is_empty();

    for (i, item) in doc.items.iter().enumerate() {
        let block = &item.block;
        match block.kind {
            BlockKind::Model if !keep_existing => {
                let found = (!force)
                    .then(|| result.models.iter().position(|m| m.name == block.name))
                    .flatten();
                match found {
                    Some(idx) if !kept_models[idx] => {
                        kept_models[idx] = true;
                        let model = &result.models[idx];
                        let leading = strip_stale_docs(&item.leading, model);
                        let with_docs = !model
                            .documentation
                            .iter()
                            .all(|d| leading.contains(&format!("/// {}", d)));
                        pieces.push(Piece {
                            leading,
                            text: render_model(model, with_docs),
                            config: false,
                        });
                    }
                    _ => dropped_first |= i == 0,
                }
            }
            BlockKind::Enum if !keep_existing => {
                let found = (!force)
                    .then(|| result.enums.iter().position(|e| e.name == block.name))
                    .flatten();
                match found {
                    Some(idx) if !kept_enums[idx] => {
                        kept_enums[idx] = true;
                        pieces.push(Piece {
                            leading: item.leading.clone(),
                            text: render_enum(&result.enums[idx]),
                            config: false,
                        });
                    }
                    _ => dropped_first |= i == 0,
                }
            }
            kind => pieces.push(Piece {
                leading: item.leading.clone(),
                text: block.raw.clone(),
                config: kind.is_config(),
            }),
        }
    }

    if dropped_first {
        if let Some(first) = pieces.first_mut() {
            if first.leading.trim().is_empty() {
                first.leading.clear();
            }
        }
    }

    let mut appended = false;

    if let Some(provider) = synthesize.filter(|_| !doc.has_datasource()) {
        let pos = pieces
            .iter()
            .rposition(|p| p.config)
            .map(|i| i + 1)
            .unwrap_or(0);
        let leading = if pos == 0 { String::new() } else { "\n\n".to_string() };
        if pos == 0 {
            if let Some(next) = pieces.first_mut() {
                if !next.leading.contains('\n') {
                    next.leading.insert_str(0, "\n\n");
                }
            }
        }
        appended |= pos == pieces.len();
        pieces.insert(
            pos,
            Piece {
                leading,
                text: render_datasource("db", provider),
                config: true,
            },
        );
    }

    let new_blocks = result
        .models
        .iter()
        .zip(&kept_models)
        .filter(|(_, kept)| !**kept)
        .map(|(m, _)| render_model(m, true))
        .chain(
            result
                .enums
                .iter()
                .zip(&kept_enums)
                .filter(|(_, kept)| !**kept)
                .map(|(e, _)| render_enum(e)),
        );
    for text in new_blocks {
        let leading = if pieces.is_empty() {
            String::new()
        } else {
            "\n\n".to_string()
        };
        pieces.push(Piece {
            leading,
            text,
            config: false,
        });
        appended = true;
    }

    // A comment-only document keeps its comments above the first block.
    if doc.items.is_empty() && !doc.trailing.trim().is_empty() {
        if let Some(first) = pieces.first_mut() {
            let mut leading = doc.trailing.clone();
            if !leading.ends_with('\n') {
                leading.push('\n');
            }
            first.leading = leading;
        }
    }

    let trailing = if !appended {
        doc.trailing.clone()
    } else if doc.items.is_empty() || doc.trailing.trim().is_empty() {
        "\n".to_string()
    } else if doc.trailing.ends_with('\n') {
        doc.trailing.clone()
    } else {
        format!("{}\n", doc.trailing)
    };

    let mut out = String::new();
    for piece in &pieces {
        out.push_str(&piece.leading);
        out.push_str(&piece.text);
    }
    out.push_str(&trailing);
    out
}

/// Rename introspected models and enums to the names existing blocks use for
/// the same table or type.
fn adopt_existing_names(doc: &Document, result: &mut IntrospectionResult) {
    for block in doc.blocks() {
        match block.kind {
            BlockKind::Model => {
                let table = block.mapped_name();
                let schema = block.schema_attribute();
                let found = result
                    .models
                    .iter()
                    .find(|m| {
                        m.table == table
                            && (schema.is_none() || m.schema.is_none() || m.schema == schema)
                    })
                    .map(|m| m.name.clone());
                if let Some(current) = found {
                    if !result.models.iter().any(|m| m.name == block.name) {
                        result.rename_model(&current, &block.name);
                    }
                }
            }
            BlockKind::Enum => {
                let db_name = block.mapped_name();
                let found = result
                    .enums
                    .iter()
                    .find(|e| e.db_name == db_name)
                    .map(|e| e.name.clone());
                if let Some(current) = found {
                    if !result.enums.iter().any(|e| e.name == block.name) {
                        result.rename_enum(&current, &block.name);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Drop the "no unique identifier" doc line once the table has one.
fn strip_stale_docs(leading: &str, model: &ModelDescriptor) -> String {
    let marker = format!("/// {}", IGNORED_MODEL_DOC);
    if model.ignored || !leading.contains(&marker) {
        return leading.to_string();
    }
    leading
        .split_inclusive('\n')
        .filter(|line| line.trim_end() != marker)
        .collect()
}

/// Replace `path` with `content` via a sibling temporary file and a rename,
/// so readers never see a half-written schema.
pub fn write_atomically(path: &Path, content: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "schema.prisma".to_string());
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    fs::write(&tmp, content)
        .with_context(|| format!("Failed to write temporary file {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
    }
    Ok(())
}
