//! Database introspection.
//!
//! `catalog` reads raw catalog metadata over a live session; `convert` turns
//! that metadata into model and enum descriptors ready to render. The
//! conversion is pure so it can be tested without a database.

mod catalog;
mod convert;

pub use catalog::{read_catalog, Catalog, CatalogColumn, CatalogTable, ConstraintKind};
pub use convert::{convert, IGNORED_MODEL_DOC};

use tokio_postgres::Client;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldArity {
    Required,
    Optional,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Enum,
    Relation,
    Unsupported,
}

/// One field of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    /// Type name without arity suffix (`Int`, `User`, `Unsupported("tsvector")`)
    pub field_type: String,
    pub arity: FieldArity,
    /// Rendered field attributes in output order.
    pub attributes: Vec<String>,
}

impl FieldDescriptor {
    pub fn type_with_arity(&self) -> String {
        match self.arity {
            FieldArity::Required => self.field_type.clone(),
            FieldArity::Optional => format!("{}?", self.field_type),
            FieldArity::List => format!("{}[]", self.field_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub name: String,
    /// Table the model reads from; rendered as `@@map` when it differs from `name`.
    pub table: String,
    /// Rendered as `@@schema` when set.
    pub schema: Option<String>,
    pub fields: Vec<FieldDescriptor>,
    /// `@@id`, `@@unique` and `@@index` attributes.
    pub block_attributes: Vec<String>,
    pub ignored: bool,
    pub documentation: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub name: String,
    pub db_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    pub name: String,
    pub db_name: String,
    pub schema: Option<String>,
    pub values: Vec<EnumValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntrospectionResult {
    pub models: Vec<ModelDescriptor>,
    pub enums: Vec<EnumDescriptor>,
    pub warnings: Vec<String>,
}

impl IntrospectionResult {
    pub fn is_empty(&self) -> bool {
        self.models.is_empty() && self.enums.is_empty()
    }

    /// Rename a model, updating relation fields that point at it.
    pub fn rename_model(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        for model in &mut self.models {
            if model.name == from {
                model.name = to.to_string();
            }
            for field in &mut model.fields {
                if field.kind == FieldKind::Relation && field.field_type == from {
                    field.field_type = to.to_string();
                }
            }
        }
    }

    /// Rename an enum, updating fields typed with it.
    pub fn rename_enum(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        for e in &mut self.enums {
            if e.name == from {
                e.name = to.to_string();
            }
        }
        for model in &mut self.models {
            for field in &mut model.fields {
                if field.kind == FieldKind::Enum && field.field_type == from {
                    field.field_type = to.to_string();
                }
            }
        }
    }
}

/// Read the given schemas and convert them into descriptors.
pub async fn introspect(
    client: &Client,
    schemas: &[String],
) -> Result<IntrospectionResult, tokio_postgres::Error> {
    let catalog = read_catalog(client, schemas).await?;
    Ok(convert(&catalog, schemas.len() > 1))
}
