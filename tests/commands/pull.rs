//! Integration tests for `schemapull db pull`.

use crate::common::{
    assert_stderr_empty, parse_json, stderr, stdout, TestDatabase, TestProject,
};

const SETUP_SQL: &str = include_str!("../fixtures/introspection/postgresql/setup.sql");

fn seeded_db() -> TestDatabase {
    let db = TestDatabase::new();
    db.run_sql_ok(SETUP_SQL);
    db
}

fn postgres_project(db: &TestDatabase) -> TestProject {
    TestProject::from_fixture("postgresql").with_env("TEST_POSTGRES_URI", db.url())
}

// ============================================================================
// Against a live database
// ============================================================================

#[test]
fn test_print_mode_outputs_only_the_schema() {
    skip_if_no_db!();
    let db = seeded_db();
    let project = postgres_project(&db);
    let before = project.read_file("prisma/schema.prisma");

    let output = project.run_schemapull_ok(&["db", "pull", "--print"]);

    let out = stdout(&output);
    assert!(out.starts_with("// Keep this comment\ngenerator client {"), "{}", out);
    assert!(out.contains("model users {"), "{}", out);
    assert!(out.contains("model posts {"), "{}", out);
    assert!(out.contains("enum role {"), "{}", out);
    assert!(!out.contains("Prisma schema loaded from"), "{}", out);
    assert!(!out.contains("Introspected"), "{}", out);
    assert_stderr_empty(&output);
    assert_eq!(project.read_file("prisma/schema.prisma"), before);
}

#[test]
fn test_write_mode_matches_print_mode() {
    skip_if_no_db!();
    let db = seeded_db();
    let project = postgres_project(&db);

    let printed = stdout(&project.run_schemapull_ok(&["db", "pull", "--print"]));
    let output = project.run_schemapull_ok(&["db", "pull"]);

    assert_eq!(project.read_file("prisma/schema.prisma"), printed);
    let out = stdout(&output);
    assert!(out.contains("Prisma schema loaded from prisma/schema.prisma"), "{}", out);
    assert!(
        out.contains("- Introspecting based on datasource defined in prisma/schema.prisma"),
        "{}",
        out
    );
    assert!(
        out.contains("Introspected 3 models and wrote them into prisma/schema.prisma in"),
        "{}",
        out
    );
    assert!(
        out.ends_with("\n\nRun prisma generate to generate Prisma Client.\n"),
        "{}",
        out
    );
    assert_stderr_empty(&output);
}

#[test]
fn test_write_mode_preserves_config_blocks_and_converts_tables() {
    skip_if_no_db!();
    let db = seeded_db();
    let project = postgres_project(&db);

    project.run_schemapull_ok(&["db", "pull"]);

    let schema = project.read_file("prisma/schema.prisma");
    assert!(schema.starts_with(
        "// Keep this comment\ngenerator client {\n  provider = \"prisma-client-js\"\n}\n\ndatasource db {\n  provider = \"postgresql\"\n  url      = env(\"TEST_POSTGRES_URI\")\n}\n"
    ));
    assert!(schema.contains("@relation(fields: [author_id], references: [id], onDelete: Cascade)"), "{}", schema);
    assert!(schema.contains("@@index([author_id])"), "{}", schema);
    assert!(schema.contains("@default(autoincrement())"), "{}", schema);
    assert!(schema.contains("@default(USER)"), "{}", schema);
    assert!(schema.contains("@default(now())"), "{}", schema);
    assert!(schema.contains("@db.VarChar(100)"), "{}", schema);
    assert!(schema.contains("@@ignore"), "{}", schema);
}

#[test]
fn test_write_mode_is_idempotent() {
    skip_if_no_db!();
    let db = seeded_db();
    let project = postgres_project(&db);

    project.run_schemapull_ok(&["db", "pull"]);
    let first = project.read_file("prisma/schema.prisma");
    let output = project.run_schemapull_ok(&["db", "pull"]);

    assert_eq!(project.read_file("prisma/schema.prisma"), first);
    let out = stdout(&output);
    assert!(out.contains("is already up to date"), "{}", out);
    assert!(!out.contains("Run prisma generate"), "{}", out);
}

#[test]
fn test_ignored_table_warning_after_success_line() {
    skip_if_no_db!();
    let db = seeded_db();
    let project = postgres_project(&db);

    let out = stdout(&project.run_schemapull_ok(&["db", "pull"]));

    let success = out.find("Introspected 3 models").expect("success line");
    let warning = out.find("- \"audit_log\"").expect("ignored model warning");
    assert!(success < warning, "{}", out);
}

#[test]
fn test_custom_model_name_is_kept() {
    skip_if_no_db!();
    let db = seeded_db();
    let project = postgres_project(&db);
    let mut schema = project.read_file("prisma/schema.prisma");
    schema.push_str("\n/// Application users\nmodel Account {\n  id Int @id\n\n  @@map(\"users\")\n}\n");
    project.write_file("prisma/schema.prisma", &schema);

    project.run_schemapull_ok(&["db", "pull"]);

    let schema = project.read_file("prisma/schema.prisma");
    assert!(schema.contains("/// Application users\nmodel Account {"), "{}", schema);
    assert!(!schema.contains("model users {"), "{}", schema);
    assert!(
        schema
            .lines()
            .any(|l| l.contains(" Account ") && l.contains("@relation(fields: [author_id]")),
        "{}",
        schema
    );
}

#[test]
fn test_force_regenerates_models() {
    skip_if_no_db!();
    let db = seeded_db();
    let project = postgres_project(&db);
    let mut schema = project.read_file("prisma/schema.prisma");
    schema.push_str("\nmodel Account {\n  id Int @id\n\n  @@map(\"users\")\n}\n");
    project.write_file("prisma/schema.prisma", &schema);

    project.run_schemapull_ok(&["db", "pull", "--force"]);

    let schema = project.read_file("prisma/schema.prisma");
    assert!(!schema.contains("model Account {"), "{}", schema);
    assert!(schema.contains("model users {"), "{}", schema);
}

#[test]
fn test_dropped_table_removes_model() {
    skip_if_no_db!();
    let db = seeded_db();
    let project = postgres_project(&db);

    project.run_schemapull_ok(&["db", "pull"]);
    db.run_sql_ok("DROP TABLE audit_log");
    project.run_schemapull_ok(&["db", "pull"]);

    let schema = project.read_file("prisma/schema.prisma");
    assert!(!schema.contains("model audit_log {"), "{}", schema);
    assert!(schema.contains("model users {"), "{}", schema);
}

#[test]
fn test_url_with_empty_schema_synthesizes_datasource() {
    skip_if_no_db!();
    let db = seeded_db();
    let project = TestProject::from_fixture("empty-schema");

    let output = project.run_schemapull_ok(&["db", "pull", "--print", "--url", db.url()]);

    let out = stdout(&output);
    assert!(
        out.starts_with("datasource db {\n  provider = \"postgresql\"\n  url      = env(\"DATABASE_URL\")\n}\n"),
        "{}",
        out
    );
    assert!(out.contains("model users {"), "{}", out);
    assert!(!out.contains(db.url()), "connection string leaked: {}", out);
    assert_stderr_empty(&output);
}

#[test]
fn test_url_with_generator_only_schema_without_trailing_newline() {
    skip_if_no_db!();
    let db = seeded_db();
    let project = TestProject::from_fixture("generator-only");

    let output = project.run_schemapull_ok(&["db", "pull", "--print", "--url", db.url()]);

    let out = stdout(&output);
    assert!(
        out.starts_with("generator client {\n  provider = \"prisma-client-js\"\n}\n\ndatasource db {"),
        "{}",
        out
    );
    assert!(out.contains("model posts {"), "{}", out);
    assert_stderr_empty(&output);
}

#[test]
fn test_url_without_any_schema_file_prints() {
    skip_if_no_db!();
    let db = seeded_db();
    let project = TestProject::empty();

    let output = project.run_schemapull_ok(&["db", "pull", "--print", "--url", db.url()]);

    assert!(stdout(&output).contains("model users {"));
}

#[test]
fn test_direct_url_from_env_is_used() {
    skip_if_no_db!();
    let db = seeded_db();
    let project =
        TestProject::from_fixture("schema-only-data-proxy").with_env("DIRECT_URL", db.url());

    let output = project.run_schemapull_ok(&["db", "pull", "--schema", "with-directUrl-env.prisma"]);

    let out = stdout(&output);
    assert!(out.starts_with("Environment variables loaded from .env\n"), "{}", out);
    assert!(out.contains("Prisma schema loaded from with-directUrl-env.prisma"), "{}", out);
    assert!(
        out.contains("Datasource \"db\": PostgreSQL database \"pooled\", schema \"public\" at \"127.0.0.1:1\""),
        "{}",
        out
    );
    assert!(
        out.contains("Introspected 3 models and wrote them into with-directUrl-env.prisma in"),
        "{}",
        out
    );
    assert!(project
        .read_file("with-directUrl-env.prisma")
        .contains("directUrl = env(\"DIRECT_URL\")"));
}

#[test]
fn test_empty_database_leaves_file_untouched() {
    skip_if_no_db!();
    let db = TestDatabase::new();
    let project = postgres_project(&db);
    let before = project.read_file("prisma/schema.prisma");

    let output = project.run_schemapull_ok(&["db", "pull"]);

    assert!(stdout(&output).contains("The introspected database was empty"));
    assert_eq!(project.read_file("prisma/schema.prisma"), before);
}

#[test]
fn test_empty_database_print_keeps_existing_models() {
    skip_if_no_db!();
    let db = TestDatabase::new();
    let project = postgres_project(&db);
    let mut schema = project.read_file("prisma/schema.prisma");
    schema.push_str("\nmodel User {\n  id Int @id\n}\n");
    project.write_file("prisma/schema.prisma", &schema);

    let output = project.run_schemapull_ok(&["db", "pull", "--print"]);

    assert_eq!(stdout(&output), schema);
    assert_stderr_empty(&output);
}

#[test]
fn test_introspect_alias_with_json() {
    skip_if_no_db!();
    let db = seeded_db();
    let project = postgres_project(&db);

    let output = project.run_schemapull_ok(&["introspect", "--print", "--json"]);

    let json = parse_json(&output);
    assert_eq!(json["ok"], true);
    assert_eq!(json["schema_id"], "schemapull.db_pull");
    assert!(json["data"]["schema"]
        .as_str()
        .unwrap()
        .contains("model users {"));
}

#[test]
fn test_write_mode_json_reports_counts() {
    skip_if_no_db!();
    let db = seeded_db();
    let project = postgres_project(&db);

    let json = parse_json(&project.run_schemapull_ok(&["db", "pull", "--json"]));

    assert_eq!(json["data"]["models"], 3);
    assert_eq!(json["data"]["enums"], 1);
    assert_eq!(json["data"]["changed"], true);
    assert_eq!(json["data"]["schema_path"], "prisma/schema.prisma");
}

// ============================================================================
// No database required
// ============================================================================

#[test]
fn test_dotenv_is_loaded_and_unreachable_host_is_p1001() {
    let project = TestProject::from_fixture("schema-only-postgresql");

    let output = project.run_schemapull_fails(
        &[
            "db",
            "pull",
            "--schema=./prisma/using-dotenv.prisma",
            "--connect-timeout",
            "2s",
        ],
        11,
    );

    let out = stdout(&output);
    assert!(out.starts_with("Environment variables loaded from prisma/.env\n"), "{}", out);
    assert!(
        out.contains("Datasource \"my_db\": PostgreSQL database \"mydb\", schema \"public\" at \"fromdotenvdoesnotexist:5432\""),
        "{}",
        out
    );
    assert!(out.contains("Introspecting based on datasource defined in prisma/using-dotenv.prisma"));
    let err = stderr(&output);
    assert!(err.contains("P1001"), "{}", err);
    assert!(err.contains("fromdotenvdoesnotexist"), "{}", err);
    assert!(!err.contains("password"), "{}", err);
}

#[test]
fn test_dotenv_with_print_keeps_stdout_empty() {
    let project = TestProject::from_fixture("schema-only-postgresql");

    let output = project.run_schemapull_fails(
        &[
            "db",
            "pull",
            "--print",
            "--schema=./prisma/using-dotenv.prisma",
            "--connect-timeout",
            "2s",
        ],
        11,
    );

    assert_eq!(stdout(&output), "");
    assert!(stderr(&output).contains("P1001"));
}

#[test]
fn test_url_provider_mismatch_with_sqlite_schema() {
    let project = TestProject::from_fixture("schema-only-sqlite");
    let before = project.read_file("prisma/schema.prisma");

    let output = project.run_schemapull_fails(
        &["db", "pull", "--url", "postgresql://user:pw@127.0.0.1:1/db"],
        12,
    );

    assert_eq!(
        stdout(&output),
        "Prisma schema loaded from prisma/schema.prisma\nDatasource \"my_db\": SQLite database \"dev.db\" at \"file:dev.db\"\n"
    );
    assert!(stderr(&output).contains(
        "The database provider found in --url (postgresql) is different from the provider found in the Prisma schema (sqlite)."
    ));
    assert_eq!(project.read_file("prisma/schema.prisma"), before);
}

#[test]
fn test_provider_mismatch_json_error_has_no_code() {
    let project = TestProject::from_fixture("schema-only-sqlite");

    let output = project.run_schemapull_fails(
        &["db", "pull", "--json", "--url", "postgresql://user:pw@127.0.0.1:1/db"],
        12,
    );

    let json = parse_json(&output);
    assert_eq!(json["ok"], false);
    assert_eq!(json["schema_id"], "schemapull.error");
    assert!(json["errors"][0]["code"].is_null());
    assert_stderr_empty(&output);
}

#[test]
fn test_undefined_env_var_is_p1001() {
    let project = TestProject::from_fixture("postgresql");

    let output = project.run_schemapull_fails(&["db", "pull"], 11);

    let out = stdout(&output);
    assert!(
        out.contains("(environment variable `TEST_POSTGRES_URI` is not set)"),
        "{}",
        out
    );
    let err = stderr(&output);
    assert!(err.contains("P1001"), "{}", err);
    assert!(err.contains("TEST_POSTGRES_URI"), "{}", err);
}

#[test]
fn test_invalid_url_is_p1013() {
    let project = TestProject::from_fixture("empty-schema");

    let output =
        project.run_schemapull_fails(&["db", "pull", "--print", "--url", "redis://localhost"], 12);

    assert!(stderr(&output).contains("P1013"));
}

#[test]
fn test_missing_schema_file() {
    let project = TestProject::empty();

    let output = project.run_schemapull_fails(&["db", "pull"], 12);

    assert!(stderr(&output).contains("Could not find a schema.prisma file"));
}

#[test]
fn test_malformed_schema_is_p1012() {
    let project = TestProject::empty();
    project.write_file("schema.prisma", "model User {\n  id Int @id\n");

    let output = project.run_schemapull_fails(&["db", "pull"], 12);

    let err = stderr(&output);
    assert!(err.contains("P1012"), "{}", err);
    assert!(err.contains("schema.prisma:1"), "{}", err);
}

#[test]
fn test_config_file_schema_path() {
    let project = TestProject::empty();
    project.write_file(
        "db/custom.prisma",
        "datasource my_db {\n  provider = \"sqlite\"\n  url      = \"file:dev.db\"\n}\n",
    );
    project.write_file("schemapull.toml", "[schema]\npath = \"db/custom.prisma\"\n");

    let output = project.run_schemapull_fails(
        &["db", "pull", "--url", "postgresql://user:pw@127.0.0.1:1/db"],
        12,
    );

    assert!(stdout(&output).contains("Prisma schema loaded from db/custom.prisma"));
}

#[test]
fn test_config_file_rejects_traversal() {
    let project = TestProject::empty();
    project.write_file("schemapull.toml", "[schema]\npath = \"../schema.prisma\"\n");

    let output = project.run_schemapull_fails(&["db", "pull"], 12);

    assert!(stderr(&output).contains("cannot contain '..'"));
}
