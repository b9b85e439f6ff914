//! Catalog metadata to model and enum descriptors.

use super::{
    Catalog, CatalogColumn, CatalogTable, ConstraintKind, EnumDescriptor, EnumValue, FieldArity,
    FieldDescriptor, FieldKind, IntrospectionResult, ModelDescriptor,
};
use crate::psl::escape;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Names that would shadow built-in scalar types.
const RESERVED_NAMES: &[&str] = &[
    "BigInt",
    "Boolean",
    "Bytes",
    "DateTime",
    "Decimal",
    "Float",
    "Int",
    "Json",
    "String",
    "Unsupported",
    "PrismaClient",
];

pub const IGNORED_MODEL_DOC: &str = "The underlying table does not contain a valid unique identifier and can therefore currently not be handled by Prisma Client.";

type TableKey = (String, String);

/// Per-table facts the relation pass needs after the model is built.
struct TableFacts {
    column_fields: HashMap<String, String>,
    nullable: HashSet<String>,
    unique_sets: Vec<Vec<String>>,
}

/// Convert raw catalog metadata into descriptors.
///
/// With `multi_schema` every model and enum carries its schema.
pub fn convert(catalog: &Catalog, multi_schema: bool) -> IntrospectionResult {
    let enum_names = unique_names(catalog.enums.iter().map(|e| (&e.schema, &e.name)));
    let mut enums: Vec<EnumDescriptor> = catalog
        .enums
        .iter()
        .map(|e| EnumDescriptor {
            name: enum_names[&(e.schema.clone(), e.name.clone())].clone(),
            db_name: e.name.clone(),
            schema: multi_schema.then(|| e.schema.clone()),
            values: e
                .values
                .iter()
                .map(|v| EnumValue {
                    name: if v.is_empty() {
                        "EMPTY_ENUM_VALUE".to_string()
                    } else {
                        sanitize(v)
                    },
                    db_name: v.clone(),
                })
                .collect(),
        })
        .collect();

    let mut enum_lookup: HashMap<&str, usize> = HashMap::new();
    for (i, e) in catalog.enums.iter().enumerate() {
        enum_lookup.entry(e.name.as_str()).or_insert(i);
    }

    let model_names = unique_names(catalog.tables.iter().map(|t| (&t.schema, &t.name)));
    let mut models = Vec::with_capacity(catalog.tables.len());
    let mut facts = Vec::with_capacity(catalog.tables.len());
    let mut model_index: HashMap<TableKey, usize> = HashMap::new();
    let mut unsupported = Vec::new();

    for table in &catalog.tables {
        let key = (table.schema.clone(), table.name.clone());
        let name = model_names[&key].clone();
        let (model, table_facts) = convert_table(
            table,
            name,
            &enums,
            &enum_lookup,
            multi_schema,
            &mut unsupported,
        );
        model_index.insert(key, models.len());
        models.push(model);
        facts.push(table_facts);
    }

    add_relations(catalog, &mut models, &facts, &model_index);

    let mut warnings = Vec::new();
    let ignored: Vec<&str> = models
        .iter()
        .filter(|m| m.ignored)
        .map(|m| m.name.as_str())
        .collect();
    if !ignored.is_empty() {
        warnings.push(format!(
            "The following models were ignored as they do not have a valid unique identifier or id. This is currently not supported by Prisma Client:\n{}",
            ignored
                .iter()
                .map(|m| format!("  - \"{}\"", m))
                .collect::<Vec<_>>()
                .join("\n")
        ));
    }
    if !unsupported.is_empty() {
        warnings.push(format!(
            "These fields are not supported by Prisma Client, because Prisma currently does not support their types:\n{}",
            unsupported.join("\n")
        ));
    }

    models.sort_by(|a, b| a.name.cmp(&b.name));
    enums.sort_by(|a, b| a.name.cmp(&b.name));

    IntrospectionResult {
        models,
        enums,
        warnings,
    }
}

/// Assign model/enum names, prefixing the schema when a name exists in
/// more than one schema.
fn unique_names<'a>(
    items: impl Iterator<Item = (&'a String, &'a String)>,
) -> HashMap<TableKey, String> {
    let items: Vec<(&String, &String)> = items.collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (_, name) in &items {
        *counts.entry(name.as_str()).or_default() += 1;
    }

    let mut out = HashMap::new();
    for (schema, name) in items {
        let base = if counts[name.as_str()] > 1 {
            format!("{}_{}", schema, name)
        } else {
            name.clone()
        };
        let mut sanitized = sanitize(&base);
        if RESERVED_NAMES.contains(&sanitized.as_str()) {
            sanitized = format!("Renamed{}", sanitized);
        }
        out.insert((schema.clone(), name.clone()), sanitized);
    }
    out
}

/// Turn a database identifier into a valid schema identifier.
fn sanitize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = replaced.trim_start_matches(|c: char| !c.is_ascii_alphabetic());
    if trimmed.is_empty() {
        format!("x{}", replaced)
    } else {
        trimmed.to_string()
    }
}

fn unique_field_name(base: String, used: &mut HashSet<String>) -> String {
    let mut name = base.clone();
    let mut n = 1;
    while used.contains(&name) {
        name = format!("{}_{}", base, n);
        n += 1;
    }
    used.insert(name.clone());
    name
}

fn convert_table(
    table: &CatalogTable,
    name: String,
    enums: &[EnumDescriptor],
    enum_lookup: &HashMap<&str, usize>,
    multi_schema: bool,
    unsupported: &mut Vec<String>,
) -> (ModelDescriptor, TableFacts) {
    let pk_cols: Vec<String> = table
        .constraints
        .iter()
        .find(|c| c.kind == ConstraintKind::PrimaryKey)
        .map(|c| c.columns.clone())
        .unwrap_or_default();

    let mut unique_sets: Vec<Vec<String>> = Vec::new();
    for c in &table.constraints {
        if c.kind == ConstraintKind::Unique && !unique_sets.contains(&c.columns) {
            unique_sets.push(c.columns.clone());
        }
    }
    let mut plain_indexes: Vec<Vec<String>> = Vec::new();
    for idx in table.indexes.iter().filter(|i| !i.expression && !i.columns.is_empty()) {
        if idx.unique {
            if !unique_sets.contains(&idx.columns) {
                unique_sets.push(idx.columns.clone());
            }
        } else if !plain_indexes.contains(&idx.columns) {
            plain_indexes.push(idx.columns.clone());
        }
    }

    let mut used = HashSet::new();
    let mut column_fields = HashMap::new();
    for col in &table.columns {
        let field = unique_field_name(sanitize(&col.name), &mut used);
        column_fields.insert(col.name.clone(), field);
    }
    let field_list = |cols: &[String]| -> String {
        cols.iter()
            .map(|c| column_fields.get(c).cloned().unwrap_or_else(|| c.clone()))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut fields = Vec::with_capacity(table.columns.len());
    let mut unsupported_cols = HashSet::new();
    for col in &table.columns {
        let field_name = column_fields[&col.name].clone();
        let enum_desc = if col.is_enum {
            enum_lookup.get(col.type_name.as_str()).map(|&i| &enums[i])
        } else {
            None
        };
        let (kind, field_type, native) = map_type(col, enum_desc);

        let arity = if col.is_array {
            FieldArity::List
        } else if col.not_null {
            FieldArity::Required
        } else {
            FieldArity::Optional
        };

        let mut attributes = Vec::new();
        if pk_cols.len() == 1 && pk_cols[0] == col.name {
            attributes.push("@id".to_string());
        } else if unique_sets
            .iter()
            .any(|set| set.len() == 1 && set[0] == col.name)
        {
            attributes.push("@unique".to_string());
        }
        if let Some(default) = map_default(col, kind, &field_type, enum_desc) {
            attributes.push(format!("@default({})", default));
        }
        if field_name != col.name {
            attributes.push(format!("@map(\"{}\")", escape(&col.name)));
        }
        if let Some(native) = native {
            attributes.push(native);
        }

        if kind == FieldKind::Unsupported {
            unsupported_cols.insert(col.name.clone());
            unsupported.push(format!(
                "  - Model: \"{}\", field: \"{}\", original data type: \"{}\"",
                name,
                field_name,
                col.formatted_type.trim_end_matches("[]")
            ));
        }

        fields.push(FieldDescriptor {
            name: field_name,
            kind,
            field_type,
            arity,
            attributes,
        });
    }

    let mut block_attributes = Vec::new();
    if pk_cols.len() > 1 {
        block_attributes.push(format!("@@id([{}])", field_list(&pk_cols)));
    }
    for set in unique_sets.iter().filter(|s| s.len() > 1) {
        block_attributes.push(format!("@@unique([{}])", field_list(set)));
    }
    for set in &plain_indexes {
        block_attributes.push(format!("@@index([{}])", field_list(set)));
    }

    let nullable: HashSet<String> = table
        .columns
        .iter()
        .filter(|c| !c.not_null)
        .map(|c| c.name.clone())
        .collect();

    let has_identifier = !pk_cols.is_empty()
        || unique_sets.iter().any(|set| {
            set.iter()
                .all(|c| !nullable.contains(c) && !unsupported_cols.contains(c))
        });

    let mut all_unique = unique_sets.clone();
    if !pk_cols.is_empty() {
        all_unique.push(pk_cols.clone());
    }

    let model = ModelDescriptor {
        name,
        table: table.name.clone(),
        schema: multi_schema.then(|| table.schema.clone()),
        fields,
        block_attributes,
        ignored: !has_identifier,
        documentation: if has_identifier {
            Vec::new()
        } else {
            vec![IGNORED_MODEL_DOC.to_string()]
        },
    };

    (
        model,
        TableFacts {
            column_fields,
            nullable,
            unique_sets: all_unique,
        },
    )
}

fn typmod(formatted: &str) -> (Option<u32>, Option<u32>) {
    static TYPMOD_RE: OnceLock<Regex> = OnceLock::new();
    let re = TYPMOD_RE
        .get_or_init(|| Regex::new(r"\((\d+)(?:\s*,\s*(\d+))?\)").expect("valid regex"));
    match re.captures(formatted) {
        Some(c) => (
            c.get(1).and_then(|m| m.as_str().parse().ok()),
            c.get(2).and_then(|m| m.as_str().parse().ok()),
        ),
        None => (None, None),
    }
}

/// Map a column type to `(kind, type, native type attribute)`.
fn map_type(
    col: &CatalogColumn,
    enum_desc: Option<&EnumDescriptor>,
) -> (FieldKind, String, Option<String>) {
    if col.is_enum {
        return match enum_desc {
            Some(e) => (FieldKind::Enum, e.name.clone(), None),
            None => unsupported_type(col),
        };
    }

    let (p1, p2) = typmod(&col.formatted_type);
    let scalar = |ty: &str, native: Option<String>| (FieldKind::Scalar, ty.to_string(), native);
    let native = |s: &str| Some(s.to_string());

    match col.type_name.as_str() {
        "int2" => scalar("Int", native("@db.SmallInt")),
        "int4" => scalar("Int", None),
        "int8" => scalar("BigInt", None),
        "oid" => scalar("Int", native("@db.Oid")),
        "float4" => scalar("Float", native("@db.Real")),
        "float8" => scalar("Float", None),
        "numeric" => scalar(
            "Decimal",
            p1.map(|p| format!("@db.Decimal({}, {})", p, p2.unwrap_or(0))),
        ),
        "money" => scalar("Decimal", native("@db.Money")),
        "bool" => scalar("Boolean", None),
        "text" => scalar("String", None),
        "varchar" => scalar(
            "String",
            Some(match p1 {
                Some(n) => format!("@db.VarChar({})", n),
                None => "@db.VarChar".to_string(),
            }),
        ),
        "bpchar" => scalar("String", Some(format!("@db.Char({})", p1.unwrap_or(1)))),
        "uuid" => scalar("String", native("@db.Uuid")),
        "xml" => scalar("String", native("@db.Xml")),
        "inet" => scalar("String", native("@db.Inet")),
        "citext" => scalar("String", native("@db.Citext")),
        "bit" => scalar("String", Some(format!("@db.Bit({})", p1.unwrap_or(1)))),
        "varbit" => scalar(
            "String",
            Some(match p1 {
                Some(n) => format!("@db.VarBit({})", n),
                None => "@db.VarBit".to_string(),
            }),
        ),
        // Timestamp precision 3 is the default mapping for DateTime.
        "timestamp" => {
            let p = p1.unwrap_or(6);
            scalar(
                "DateTime",
                (p != 3).then(|| format!("@db.Timestamp({})", p)),
            )
        }
        "timestamptz" => scalar(
            "DateTime",
            Some(format!("@db.Timestamptz({})", p1.unwrap_or(6))),
        ),
        "date" => scalar("DateTime", native("@db.Date")),
        "time" => scalar("DateTime", Some(format!("@db.Time({})", p1.unwrap_or(6)))),
        "timetz" => scalar(
            "DateTime",
            Some(format!("@db.Timetz({})", p1.unwrap_or(6))),
        ),
        "json" => scalar("Json", native("@db.Json")),
        "jsonb" => scalar("Json", None),
        "bytea" => scalar("Bytes", None),
        _ => unsupported_type(col),
    }
}

fn unsupported_type(col: &CatalogColumn) -> (FieldKind, String, Option<String>) {
    (
        FieldKind::Unsupported,
        format!(
            "Unsupported(\"{}\")",
            escape(col.formatted_type.trim_end_matches("[]"))
        ),
        None,
    )
}

fn string_literal(expr: &str) -> Option<String> {
    static STRING_RE: OnceLock<Regex> = OnceLock::new();
    let re = STRING_RE.get_or_init(|| {
        Regex::new(r#"^'((?:[^']|'')*)'(?:::[\w\s."-]+(?:\(\d+(?:,\s*\d+)?\))?(?:\[\])?)?$"#)
            .expect("valid regex")
    });
    re.captures(expr).map(|c| c[1].replace("''", "'"))
}

fn number_literal(expr: &str) -> Option<String> {
    static NUMBER_RE: OnceLock<Regex> = OnceLock::new();
    let re = NUMBER_RE.get_or_init(|| {
        Regex::new(r"^\(?(-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)\)?(?:::[\w\s]+)?$")
            .expect("valid regex")
    });
    if let Some(c) = re.captures(expr) {
        return Some(c[1].to_string());
    }
    string_literal(expr).filter(|s| s.parse::<f64>().is_ok())
}

fn is_now(expr: &str) -> bool {
    static NOW_RE: OnceLock<Regex> = OnceLock::new();
    let re = NOW_RE.get_or_init(|| {
        Regex::new(r"(?i)^(now\(\)|current_timestamp(\(\d\))?|localtimestamp(\(\d\))?)$")
            .expect("valid regex")
    });
    re.is_match(expr)
}

fn dbgenerated(expr: &str) -> String {
    format!("dbgenerated(\"{}\")", escape(expr))
}

/// The argument of `@default(...)` for a column, if it has a default.
fn map_default(
    col: &CatalogColumn,
    kind: FieldKind,
    field_type: &str,
    enum_desc: Option<&EnumDescriptor>,
) -> Option<String> {
    if col.identity {
        return Some("autoincrement()".to_string());
    }
    let expr = col.default.as_deref()?.trim();
    if expr.to_ascii_uppercase().starts_with("NULL") {
        return None;
    }
    if expr.starts_with("nextval(") {
        return Some(match field_type {
            "Int" | "BigInt" => "autoincrement()".to_string(),
            _ => dbgenerated(expr),
        });
    }
    if col.is_array {
        return Some(if expr.starts_with("'{}'") || expr.starts_with("ARRAY[]") {
            "[]".to_string()
        } else {
            dbgenerated(expr)
        });
    }

    let mapped = match kind {
        FieldKind::Enum => string_literal(expr).and_then(|lit| {
            enum_desc
                .and_then(|e| e.values.iter().find(|v| v.db_name == lit))
                .map(|v| v.name.clone())
        }),
        FieldKind::Scalar => match field_type {
            "Boolean" => match expr.to_ascii_lowercase().as_str() {
                "true" | "'true'::boolean" => Some("true".to_string()),
                "false" | "'false'::boolean" => Some("false".to_string()),
                _ => None,
            },
            "Int" | "BigInt" | "Float" | "Decimal" => number_literal(expr),
            "String" | "Json" => string_literal(expr).map(|s| format!("\"{}\"", escape(&s))),
            "DateTime" if is_now(expr) => Some("now()".to_string()),
            "DateTime" => string_literal(expr).map(|s| format!("\"{}\"", escape(&s))),
            _ => None,
        },
        FieldKind::Relation | FieldKind::Unsupported => None,
    };

    Some(mapped.unwrap_or_else(|| dbgenerated(expr)))
}

fn referential_action(code: &str) -> &'static str {
    match code {
        "r" => "Restrict",
        "c" => "Cascade",
        "n" => "SetNull",
        "d" => "SetDefault",
        _ => "NoAction",
    }
}

struct Relation {
    from: usize,
    to: usize,
    from_table: String,
    to_table: String,
    columns: Vec<String>,
    ref_columns: Vec<String>,
    on_delete: String,
    on_update: String,
}

/// Add relation fields on both sides of every foreign key whose target was
/// introspected.
fn add_relations(
    catalog: &Catalog,
    models: &mut [ModelDescriptor],
    facts: &[TableFacts],
    model_index: &HashMap<TableKey, usize>,
) {
    let mut relations = Vec::new();
    for table in &catalog.tables {
        let Some(&from) = model_index.get(&(table.schema.clone(), table.name.clone())) else {
            continue;
        };
        for c in &table.constraints {
            let ConstraintKind::ForeignKey {
                schema,
                table: ref_table,
                columns: ref_columns,
                on_delete,
                on_update,
            } = &c.kind
            else {
                continue;
            };
            let Some(&to) = model_index.get(&(schema.clone(), ref_table.clone())) else {
                continue;
            };
            relations.push(Relation {
                from,
                to,
                from_table: table.name.clone(),
                to_table: ref_table.clone(),
                columns: c.columns.clone(),
                ref_columns: ref_columns.clone(),
                on_delete: on_delete.clone(),
                on_update: on_update.clone(),
            });
        }
    }

    let mut pair_counts: HashMap<(usize, usize), usize> = HashMap::new();
    for r in &relations {
        *pair_counts
            .entry((r.from.min(r.to), r.from.max(r.to)))
            .or_default() += 1;
    }

    let mut used: Vec<HashSet<String>> = models
        .iter()
        .map(|m| m.fields.iter().map(|f| f.name.clone()).collect())
        .collect();
    let mut new_fields: Vec<Vec<FieldDescriptor>> = vec![Vec::new(); models.len()];

    for r in &relations {
        let from_name = models[r.from].name.clone();
        let to_name = models[r.to].name.clone();
        let self_relation = r.from == r.to;
        let ambiguous = self_relation || pair_counts[&(r.from.min(r.to), r.from.max(r.to))] > 1;
        let relation_name = format!(
            "{}_{}To{}",
            r.from_table,
            r.columns.join("_"),
            r.to_table
        );

        let map_cols = |facts: &TableFacts, cols: &[String]| -> String {
            cols.iter()
                .map(|c| facts.column_fields.get(c).cloned().unwrap_or_else(|| c.clone()))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let fields = map_cols(&facts[r.from], &r.columns);
        let references = map_cols(&facts[r.to], &r.ref_columns);

        let optional = r.columns.iter().any(|c| facts[r.from].nullable.contains(c));
        let one_to_one = facts[r.from].unique_sets.iter().any(|set| {
            set.len() == r.columns.len() && set.iter().all(|c| r.columns.contains(c))
        });

        let mut args = Vec::new();
        if ambiguous {
            args.push(format!("\"{}\"", relation_name));
        }
        args.push(format!("fields: [{}]", fields));
        args.push(format!("references: [{}]", references));
        let on_delete = referential_action(&r.on_delete);
        let on_update = referential_action(&r.on_update);
        let default_delete = if optional { "SetNull" } else { "Restrict" };
        if on_delete != default_delete {
            args.push(format!("onDelete: {}", on_delete));
        }
        if on_update != "Cascade" {
            args.push(format!("onUpdate: {}", on_update));
        }

        let forward_base = if ambiguous {
            format!("{}_{}", to_name, relation_name)
        } else {
            to_name.clone()
        };
        let forward_name = unique_field_name(forward_base, &mut used[r.from]);
        new_fields[r.from].push(FieldDescriptor {
            name: forward_name,
            kind: FieldKind::Relation,
            field_type: to_name.clone(),
            arity: if optional {
                FieldArity::Optional
            } else {
                FieldArity::Required
            },
            attributes: vec![format!("@relation({})", args.join(", "))],
        });

        let back_base = if self_relation {
            format!("other_{}_{}", from_name, relation_name)
        } else if ambiguous {
            format!("{}_{}", from_name, relation_name)
        } else {
            from_name.clone()
        };
        let back_name = unique_field_name(back_base, &mut used[r.to]);
        new_fields[r.to].push(FieldDescriptor {
            name: back_name,
            kind: FieldKind::Relation,
            field_type: from_name,
            arity: if one_to_one {
                FieldArity::Optional
            } else {
                FieldArity::List
            },
            attributes: if ambiguous {
                vec![format!("@relation(\"{}\")", relation_name)]
            } else {
                Vec::new()
            },
        });
    }

    for (model, mut extra) in models.iter_mut().zip(new_fields) {
        extra.sort_by(|a, b| a.name.cmp(&b.name));
        model.fields.extend(extra);
    }
}
