//! Rendering of introspected descriptors as schema blocks.
//!
//! Output has no trailing newline; the merge decides the separators.

use crate::datasource::Provider;
use crate::introspect::{EnumDescriptor, ModelDescriptor};

pub fn render_model(model: &ModelDescriptor, with_docs: bool) -> String {
    let mut out = String::new();
    if with_docs {
        for line in &model.documentation {
            out.push_str("/// ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push_str(&format!("model {} {{\n", model.name));

    let types: Vec<String> = model.fields.iter().map(|f| f.type_with_arity()).collect();
    let name_width = model.fields.iter().map(|f| f.name.len()).max().unwrap_or(0);
    let type_width = types.iter().map(String::len).max().unwrap_or(0);

    for (field, ty) in model.fields.iter().zip(&types) {
        let line = format!(
            "  {:<name_width$} {:<type_width$} {}",
            field.name,
            ty,
            field.attributes.join(" "),
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }

    let mut block_attrs = model.block_attributes.clone();
    if model.name != model.table {
        block_attrs.push(format!("@@map(\"{}\")", escape(&model.table)));
    }
    if model.ignored {
        block_attrs.push("@@ignore".to_string());
    }
    if let Some(schema) = &model.schema {
        block_attrs.push(format!("@@schema(\"{}\")", escape(schema)));
    }
    if !block_attrs.is_empty() {
        if !model.fields.is_empty() {
            out.push('\n');
        }
        for attr in block_attrs {
            out.push_str("  ");
            out.push_str(&attr);
            out.push('\n');
        }
    }

    out.push('}');
    out
}

pub fn render_enum(e: &EnumDescriptor) -> String {
    let mut out = format!("enum {} {{\n", e.name);
    let width = e
        .values
        .iter()
        .filter(|v| v.name != v.db_name)
        .map(|v| v.name.len())
        .max()
        .unwrap_or(0);

    for value in &e.values {
        if value.name == value.db_name {
            out.push_str(&format!("  {}\n", value.name));
        } else {
            out.push_str(&format!(
                "  {:<width$} @map(\"{}\")\n",
                value.name,
                escape(&value.db_name)
            ));
        }
    }

    let mut block_attrs = Vec::new();
    if e.name != e.db_name {
        block_attrs.push(format!("@@map(\"{}\")", escape(&e.db_name)));
    }
    if let Some(schema) = &e.schema {
        block_attrs.push(format!("@@schema(\"{}\")", escape(schema)));
    }
    if !block_attrs.is_empty() {
        out.push('\n');
        for attr in block_attrs {
            out.push_str(&format!("  {}\n", attr));
        }
    }

    out.push('}');
    out
}

/// Datasource block added when the document has none. The URL always refers
/// to an environment variable so credentials never land in the file.
pub fn render_datasource(name: &str, provider: Provider) -> String {
    format!(
        "datasource {} {{\n  provider = \"{}\"\n  url      = env(\"DATABASE_URL\")\n}}",
        name,
        provider.as_str()
    )
}

/// Escape a value for a double-quoted schema string.
pub(crate) fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
