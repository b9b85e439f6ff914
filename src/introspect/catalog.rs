//! Catalog queries against `pg_catalog`.
//!
//! Every `name` and `"char"` column is cast to `text` so rows decode into
//! `String` regardless of server version.

use std::collections::HashMap;
use tokio_postgres::Client;

/// Raw catalog metadata for the selected schemas.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    pub tables: Vec<CatalogTable>,
    pub enums: Vec<CatalogEnum>,
}

#[derive(Debug, Clone)]
pub struct CatalogTable {
    pub schema: String,
    pub name: String,
    pub columns: Vec<CatalogColumn>,
    pub constraints: Vec<CatalogConstraint>,
    pub indexes: Vec<CatalogIndex>,
}

#[derive(Debug, Clone)]
pub struct CatalogColumn {
    pub name: String,
    /// Type name (`int4`, `varchar`, enum name). Element type for arrays.
    pub type_name: String,
    /// `format_type` output, e.g. `character varying(255)[]`.
    pub formatted_type: String,
    pub is_array: bool,
    pub is_enum: bool,
    pub not_null: bool,
    pub default: Option<String>,
    /// `GENERATED ... AS IDENTITY`
    pub identity: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey {
        schema: String,
        table: String,
        columns: Vec<String>,
        /// `confdeltype` code (`a`, `r`, `c`, `n`, `d`)
        on_delete: String,
        on_update: String,
    },
}

#[derive(Debug, Clone)]
pub struct CatalogConstraint {
    pub name: String,
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
}

/// Index not backing a primary key or unique constraint.
#[derive(Debug, Clone)]
pub struct CatalogIndex {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    /// Has expression columns; cannot be represented.
    pub expression: bool,
}

#[derive(Debug, Clone)]
pub struct CatalogEnum {
    pub schema: String,
    pub name: String,
    pub values: Vec<String>,
}

type TableKey = (String, String);

pub async fn read_catalog(
    client: &Client,
    schemas: &[String],
) -> Result<Catalog, tokio_postgres::Error> {
    let mut tables = get_tables(client, schemas).await?;
    let by_key: HashMap<TableKey, usize> = tables
        .iter()
        .enumerate()
        .map(|(i, t)| ((t.schema.clone(), t.name.clone()), i))
        .collect();

    for (key, column) in get_columns(client, schemas).await? {
        if let Some(&i) = by_key.get(&key) {
            tables[i].columns.push(column);
        }
    }
    for (key, constraint) in get_constraints(client, schemas).await? {
        if let Some(&i) = by_key.get(&key) {
            tables[i].constraints.push(constraint);
        }
    }
    for (key, index) in get_indexes(client, schemas).await? {
        if let Some(&i) = by_key.get(&key) {
            tables[i].indexes.push(index);
        }
    }

    let enums = get_enums(client, schemas).await?;

    Ok(Catalog { tables, enums })
}

async fn get_tables(
    client: &Client,
    schemas: &[String],
) -> Result<Vec<CatalogTable>, tokio_postgres::Error> {
    // Partitions are reached through their parent; the migrations table
    // belongs to the tooling, not the application.
    let rows = client
        .query(
            "SELECT n.nspname::text AS schema,
                    c.relname::text AS name
             FROM pg_class c
             JOIN pg_namespace n ON c.relnamespace = n.oid
             WHERE c.relkind IN ('r', 'p')
               AND NOT c.relispartition
               AND n.nspname::text = ANY($1)
               AND c.relname != '_prisma_migrations'
             ORDER BY n.nspname, c.relname",
            &[&schemas],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| CatalogTable {
            schema: row.get("schema"),
            name: row.get("name"),
            columns: Vec::new(),
            constraints: Vec::new(),
            indexes: Vec::new(),
        })
        .collect())
}

async fn get_columns(
    client: &Client,
    schemas: &[String],
) -> Result<Vec<(TableKey, CatalogColumn)>, tokio_postgres::Error> {
    let rows = client
        .query(
            "SELECT n.nspname::text AS schema,
                    c.relname::text AS table_name,
                    a.attname::text AS name,
                    COALESCE(et.typname, t.typname)::text AS type_name,
                    pg_catalog.format_type(a.atttypid, a.atttypmod) AS formatted_type,
                    (et.oid IS NOT NULL) AS is_array,
                    (COALESCE(et.typtype, t.typtype) = 'e') AS is_enum,
                    a.attnotnull AS not_null,
                    pg_get_expr(d.adbin, d.adrelid) AS default_expr,
                    (a.attidentity IN ('a', 'd')) AS identity
             FROM pg_attribute a
             JOIN pg_class c ON a.attrelid = c.oid
             JOIN pg_namespace n ON c.relnamespace = n.oid
             JOIN pg_type t ON a.atttypid = t.oid
             LEFT JOIN pg_type et ON t.typelem = et.oid AND t.typcategory = 'A'
             LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
             WHERE c.relkind IN ('r', 'p')
               AND NOT c.relispartition
               AND n.nspname::text = ANY($1)
               AND a.attnum > 0
               AND NOT a.attisdropped
             ORDER BY n.nspname, c.relname, a.attnum",
            &[&schemas],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            (
                (row.get("schema"), row.get("table_name")),
                CatalogColumn {
                    name: row.get("name"),
                    type_name: row.get("type_name"),
                    formatted_type: row.get("formatted_type"),
                    is_array: row.get("is_array"),
                    is_enum: row.get("is_enum"),
                    not_null: row.get("not_null"),
                    default: row.get("default_expr"),
                    identity: row.get("identity"),
                },
            )
        })
        .collect())
}

async fn get_constraints(
    client: &Client,
    schemas: &[String],
) -> Result<Vec<(TableKey, CatalogConstraint)>, tokio_postgres::Error> {
    let rows = client
        .query(
            "SELECT n.nspname::text AS schema,
                    c.relname::text AS table_name,
                    con.conname::text AS name,
                    con.contype::text AS kind,
                    ARRAY(SELECT a.attname::text
                          FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                          JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
                          ORDER BY k.ord) AS columns,
                    fn.nspname::text AS ref_schema,
                    fc.relname::text AS ref_table,
                    ARRAY(SELECT a.attname::text
                          FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
                          JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
                          ORDER BY k.ord) AS ref_columns,
                    con.confdeltype::text AS on_delete,
                    con.confupdtype::text AS on_update
             FROM pg_constraint con
             JOIN pg_class c ON con.conrelid = c.oid
             JOIN pg_namespace n ON c.relnamespace = n.oid
             LEFT JOIN pg_class fc ON con.confrelid = fc.oid
             LEFT JOIN pg_namespace fn ON fc.relnamespace = fn.oid
             WHERE con.contype IN ('p', 'u', 'f')
               AND n.nspname::text = ANY($1)
             ORDER BY n.nspname, c.relname, con.conname",
            &[&schemas],
        )
        .await?;

    let mut constraints = Vec::with_capacity(rows.len());
    for row in rows {
        let kind: String = row.get("kind");
        let kind = match kind.as_str() {
            "p" => ConstraintKind::PrimaryKey,
            "u" => ConstraintKind::Unique,
            _ => {
                let ref_schema: Option<String> = row.get("ref_schema");
                let ref_table: Option<String> = row.get("ref_table");
                let (Some(schema), Some(table)) = (ref_schema, ref_table) else {
                    continue;
                };
                ConstraintKind::ForeignKey {
                    schema,
                    table,
                    columns: row.get("ref_columns"),
                    on_delete: row.get("on_delete"),
                    on_update: row.get("on_update"),
                }
            }
        };
        constraints.push((
            (row.get("schema"), row.get("table_name")),
            CatalogConstraint {
                name: row.get("name"),
                kind,
                columns: row.get("columns"),
            },
        ));
    }

    Ok(constraints)
}

async fn get_indexes(
    client: &Client,
    schemas: &[String],
) -> Result<Vec<(TableKey, CatalogIndex)>, tokio_postgres::Error> {
    // Indexes backing primary keys and unique constraints are reported as
    // constraints already.
    let rows = client
        .query(
            "SELECT n.nspname::text AS schema,
                    c.relname::text AS table_name,
                    i.relname::text AS name,
                    ix.indisunique AS is_unique,
                    (ix.indexprs IS NOT NULL) AS is_expression,
                    ARRAY(SELECT a.attname::text
                          FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
                          JOIN pg_attribute a ON a.attrelid = ix.indrelid AND a.attnum = k.attnum
                          WHERE k.ord <= ix.indnkeyatts
                          ORDER BY k.ord) AS columns
             FROM pg_index ix
             JOIN pg_class i ON ix.indexrelid = i.oid
             JOIN pg_class c ON ix.indrelid = c.oid
             JOIN pg_namespace n ON c.relnamespace = n.oid
             WHERE c.relkind IN ('r', 'p')
               AND NOT c.relispartition
               AND n.nspname::text = ANY($1)
               AND NOT ix.indisprimary
               AND NOT EXISTS (
                   SELECT 1 FROM pg_constraint con
                   WHERE con.conindid = ix.indexrelid AND con.contype IN ('p', 'u')
               )
             ORDER BY n.nspname, c.relname, i.relname",
            &[&schemas],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            (
                (row.get("schema"), row.get("table_name")),
                CatalogIndex {
                    name: row.get("name"),
                    columns: row.get("columns"),
                    unique: row.get("is_unique"),
                    expression: row.get("is_expression"),
                },
            )
        })
        .collect())
}

async fn get_enums(
    client: &Client,
    schemas: &[String],
) -> Result<Vec<CatalogEnum>, tokio_postgres::Error> {
    let rows = client
        .query(
            "SELECT n.nspname::text AS schema,
                    t.typname::text AS name,
                    ARRAY(SELECT e.enumlabel::text
                          FROM pg_enum e
                          WHERE e.enumtypid = t.oid
                          ORDER BY e.enumsortorder) AS values
             FROM pg_type t
             JOIN pg_namespace n ON t.typnamespace = n.oid
             WHERE t.typtype = 'e'
               AND n.nspname::text = ANY($1)
             ORDER BY n.nspname, t.typname",
            &[&schemas],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| CatalogEnum {
            schema: row.get("schema"),
            name: row.get("name"),
            values: row.get("values"),
        })
        .collect())
}
