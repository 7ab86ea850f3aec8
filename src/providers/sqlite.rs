//! SQLite provider tools
//!
//! Every call opens its own connection to the database file; handlers run on
//! the blocking pool so rusqlite never blocks the async runtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, Row, params};
use serde_json::{Map, Number, Value, json};

use crate::domain::{ParamSpec, ParamType, ToolDescriptor};
use crate::error::Result;

use super::registry::{ToolFault, ToolRegistry, str_arg};

pub const PROVIDER_ID: &str = "sqlite";

/// URI of the recent-insights memo resource
pub const INSIGHTS_URI: &str = "memo://insights";

/// Number of insights the memo shows
const INSIGHTS_LIMIT: usize = 10;

const INSIGHTS_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS insights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    content TEXT NOT NULL
)";

/// Handle on the database file
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Create the file and its parent directory if needed, and ensure the insights table exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.execute(INSIGHTS_SCHEMA, [])?;
        log::info!("Using database at {}", path.display());

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> std::result::Result<Connection, ToolFault> {
        Connection::open(&self.path).map_err(|e| {
            ToolFault::failed(
                "DatabaseError",
                format!("Failed to open database: {}", e),
                json!({"path": self.path.display().to_string()}),
            )
        })
    }

    /// Run a SELECT and return rows as objects keyed by column name
    pub fn read_query(&self, query: &str) -> std::result::Result<Value, ToolFault> {
        if !starts_with_keyword(query, &["SELECT"]) {
            return Err(ToolFault::failed(
                "SecurityError",
                "Only SELECT queries are allowed with the read_query tool.",
                json!({"query": query}),
            ));
        }

        let conn = self.connect()?;
        let rows =
            select_rows(&conn, query, &[]).map_err(|e| database_error("Failed to execute read query", e, query))?;
        log::info!("read_query returned {} rows", rows.len());
        Ok(Value::Array(rows))
    }

    /// Run an INSERT, UPDATE or DELETE
    pub fn write_query(&self, query: &str) -> std::result::Result<Value, ToolFault> {
        if !starts_with_keyword(query, &["INSERT", "UPDATE", "DELETE"]) {
            return Err(ToolFault::failed(
                "SecurityError",
                "Only INSERT, UPDATE, or DELETE queries are allowed with the write_query tool.",
                json!({"query": query}),
            ));
        }

        let conn = self.connect()?;
        let affected = conn
            .execute(query, [])
            .map_err(|e| database_error("Failed to execute write query", e, query))?;
        log::info!("write_query affected {} rows", affected);
        Ok(json!({"status": "success", "affected_rows": affected}))
    }

    pub fn create_table(&self, query: &str) -> std::result::Result<Value, ToolFault> {
        if !starts_with_keyword(query, &["CREATE TABLE"]) {
            return Err(ToolFault::failed(
                "SecurityError",
                "Only CREATE TABLE queries are allowed with the create_table tool.",
                json!({"query": query}),
            ));
        }

        let conn = self.connect()?;
        conn.execute(query, [])
            .map_err(|e| database_error("Failed to create table", e, query))?;
        Ok(json!({"status": "success", "message": "Table created successfully."}))
    }

    pub fn list_tables(&self) -> std::result::Result<Value, ToolFault> {
        let conn = self.connect()?;
        let names = table_names(&conn)
            .map_err(|e| ToolFault::failed("DatabaseError", format!("Failed to list tables: {}", e), json!({})))?;
        Ok(json!(names))
    }

    /// Column information for a table, `NotFoundError` when it does not exist
    pub fn describe_table(&self, table_name: &str) -> std::result::Result<Value, ToolFault> {
        let conn = self.connect()?;
        let pragma = format!("PRAGMA table_info(\"{}\")", table_name.replace('"', "\"\""));
        let columns = select_rows(&conn, &pragma, &[]).map_err(|e| {
            ToolFault::failed(
                "DatabaseError",
                format!("Failed to describe table '{}': {}", table_name, e),
                json!({"table_name": table_name}),
            )
        })?;

        if columns.is_empty() {
            return Err(ToolFault::failed(
                "NotFoundError",
                format!("Table '{}' not found.", table_name),
                json!({"table_name": table_name}),
            ));
        }
        Ok(Value::Array(columns))
    }

    pub fn append_insight(&self, insight: &str) -> std::result::Result<Value, ToolFault> {
        let conn = self.connect()?;
        conn.execute("INSERT INTO insights (content) VALUES (?1)", params![insight])
            .map_err(|e| {
                ToolFault::failed(
                    "DatabaseError",
                    format!("Failed to append insight: {}", e),
                    json!({"insight_preview": preview(insight)}),
                )
            })?;
        let id = conn.last_insert_rowid();
        log::info!("Appended insight {}", id);
        Ok(json!({"status": "success", "message": "Insight appended successfully.", "id": id}))
    }

    /// Latest insights, newest first, as a bulleted list
    pub fn insights_memo(&self) -> std::result::Result<Value, ToolFault> {
        let conn = self.connect()?;
        let lines = recent_insights(&conn).map_err(|e| {
            ToolFault::failed("DatabaseError", format!("Failed to retrieve insights: {}", e), json!({}))
        })?;

        if lines.is_empty() {
            Ok(json!("No insights recorded yet."))
        } else {
            Ok(json!(lines.join("\n")))
        }
    }
}

fn starts_with_keyword(query: &str, keywords: &[&str]) -> bool {
    let upper = query.trim_start().to_uppercase();
    keywords.iter().any(|k| upper.starts_with(k))
}

fn database_error(context: &str, err: rusqlite::Error, query: &str) -> ToolFault {
    ToolFault::failed("DatabaseError", format!("{}: {}", context, err), json!({"query": query}))
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(50) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn table_names(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
    names.collect()
}

fn recent_insights(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT timestamp, content FROM insights ORDER BY timestamp DESC, id DESC LIMIT ?1")?;
    let rows = stmt.query_map(params![INSIGHTS_LIMIT as i64], |row| {
        let timestamp: String = row.get(0)?;
        let content: String = row.get(1)?;
        Ok(format!("- {}: {}", timestamp, content))
    })?;
    rows.collect()
}

fn select_rows(conn: &Connection, query: &str, params: &[&dyn rusqlite::ToSql]) -> rusqlite::Result<Vec<Value>> {
    let mut stmt = conn.prepare(query)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt.query_map(params, |row| row_to_json(row, &columns))?;
    rows.collect()
}

fn row_to_json(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<Value> {
    let mut object = Map::new();
    for (i, name) in columns.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => json!(n),
            ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
            ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
        };
        object.insert(name.clone(), value);
    }
    Ok(Value::Object(object))
}

fn query_param(description: &str) -> ParamSpec {
    ParamSpec::required("query", ParamType::String, description)
}

/// Registry with the SQLite tools and the insights memo resource
pub fn registry(store: Arc<SqliteStore>) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new(PROVIDER_ID);

    let s = Arc::clone(&store);
    registry.register(
        ToolDescriptor::new(
            "read_query",
            "Executes a read-only (SELECT) SQL query against the database and returns the results.",
        )
        .with_param(query_param("The SELECT query to execute.")),
        move |args| s.read_query(str_arg(args, "query")?),
    )?;

    let s = Arc::clone(&store);
    registry.register(
        ToolDescriptor::new(
            "write_query",
            "Executes a write (INSERT, UPDATE, DELETE) SQL query against the database \
             and returns the number of affected rows.",
        )
        .with_param(query_param("The INSERT, UPDATE or DELETE query to execute.")),
        move |args| s.write_query(str_arg(args, "query")?),
    )?;

    let s = Arc::clone(&store);
    registry.register(
        ToolDescriptor::new("create_table", "Executes a CREATE TABLE SQL query.")
            .with_param(query_param("The CREATE TABLE statement to execute.")),
        move |args| s.create_table(str_arg(args, "query")?),
    )?;

    let s = Arc::clone(&store);
    registry.register(
        ToolDescriptor::new("list_tables", "Lists all tables in the database."),
        move |_| s.list_tables(),
    )?;

    let s = Arc::clone(&store);
    registry.register(
        ToolDescriptor::new(
            "describe_table",
            "Describes the schema (columns and types) of a specific table.",
        )
        .with_param(ParamSpec::required(
            "table_name",
            ParamType::String,
            "The name of the target table.",
        )),
        move |args| s.describe_table(str_arg(args, "table_name")?),
    )?;

    let s = Arc::clone(&store);
    registry.register(
        ToolDescriptor::new("append_insight", "Appends a new text insight to the 'insights' table.")
            .with_param(ParamSpec::required("insight", ParamType::String, "The text insight to append.")),
        move |args| s.append_insight(str_arg(args, "insight")?),
    )?;

    registry.register_resource(INSIGHTS_URI, move || store.insights_memo());

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("data").join("test.db")).unwrap();
        store
            .create_table("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, score REAL, avatar BLOB)")
            .unwrap();
        (dir, store)
    }

    fn fault_kind(fault: &ToolFault) -> &str {
        match fault {
            ToolFault::Failed { kind, .. } => kind.as_str(),
            _ => "",
        }
    }

    #[test]
    fn test_open_creates_parent_and_insights() {
        let (_dir, store) = setup();
        assert!(store.path().exists());
        let tables = store.list_tables().unwrap();
        assert!(tables.as_array().unwrap().contains(&json!("insights")));
        assert!(tables.as_array().unwrap().contains(&json!("users")));
    }

    #[test]
    fn test_write_then_read() {
        let (_dir, store) = setup();
        let written = store
            .write_query("INSERT INTO users (name, score, avatar) VALUES ('alice', 9.5, x'CAFE'), ('bob', NULL, NULL)")
            .unwrap();
        assert_eq!(written, json!({"status": "success", "affected_rows": 2}));

        let rows = store.read_query("SELECT name, score, avatar FROM users ORDER BY id").unwrap();
        assert_eq!(
            rows,
            json!([
                {"name": "alice", "score": 9.5, "avatar": "cafe"},
                {"name": "bob", "score": null, "avatar": null}
            ])
        );

        let count = store.read_query("  select count(*) AS count from users").unwrap();
        assert_eq!(count, json!([{"count": 2}]));
    }

    #[test]
    fn test_read_query_rejects_writes() {
        let (_dir, store) = setup();
        let err = store.read_query("DELETE FROM users").unwrap_err();
        assert_eq!(fault_kind(&err), "SecurityError");
    }

    #[test]
    fn test_write_query_rejects_select() {
        let (_dir, store) = setup();
        let err = store.write_query("SELECT * FROM users").unwrap_err();
        assert_eq!(fault_kind(&err), "SecurityError");
    }

    #[test]
    fn test_create_table_rejects_other_statements() {
        let (_dir, store) = setup();
        let err = store.create_table("DROP TABLE users").unwrap_err();
        assert_eq!(fault_kind(&err), "SecurityError");
    }

    #[test]
    fn test_bad_sql_is_database_error_with_query() {
        let (_dir, store) = setup();
        let err = store.read_query("SELECT * FROM non_existent").unwrap_err();
        assert_eq!(fault_kind(&err), "DatabaseError");
        let ToolFault::Failed { message, details, .. } = err else { unreachable!() };
        assert!(message.starts_with("Failed to execute read query"));
        assert_eq!(details["query"], "SELECT * FROM non_existent");
    }

    #[test]
    fn test_describe_table() {
        let (_dir, store) = setup();
        let columns = store.describe_table("users").unwrap();
        let names: Vec<_> = columns
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["id", "name", "score", "avatar"]);
        assert_eq!(columns[0]["pk"], 1);
    }

    #[test]
    fn test_describe_missing_table() {
        let (_dir, store) = setup();
        let err = store.describe_table("ghosts\"; DROP TABLE users; --").unwrap_err();
        assert_eq!(fault_kind(&err), "NotFoundError");
        assert!(store.describe_table("users").is_ok());
    }

    #[test]
    fn test_insights_memo() {
        let (_dir, store) = setup();
        assert_eq!(store.insights_memo().unwrap(), json!("No insights recorded yet."));

        let first = store.append_insight("Sales peak on Fridays").unwrap();
        assert_eq!(first["status"], "success");
        assert_eq!(first["id"], 1);
        store.append_insight("Churn is flat").unwrap();

        let memo = store.insights_memo().unwrap();
        let lines: Vec<_> = memo.as_str().unwrap().lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": Churn is flat"));
        assert!(lines[1].ends_with(": Sales peak on Fridays"));
    }

    #[test]
    fn test_insights_memo_limit() {
        let (_dir, store) = setup();
        for i in 0..12 {
            store.append_insight(&format!("insight {}", i)).unwrap();
        }
        let memo = store.insights_memo().unwrap();
        assert_eq!(memo.as_str().unwrap().lines().count(), INSIGHTS_LIMIT);
    }

    #[test]
    fn test_registry_exposes_tools_and_resource() {
        let (_dir, store) = setup();
        let registry = registry(Arc::new(store)).unwrap();
        let names: Vec<_> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec!["read_query", "write_query", "create_table", "list_tables", "describe_table", "append_insight"]
        );
        assert_eq!(registry.resource_uris(), vec![INSIGHTS_URI]);

        let tables = registry.invoke("list_tables", &Map::new()).unwrap();
        assert!(tables.as_array().unwrap().contains(&json!("users")));
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short"), "short");
        assert!(preview(&"x".repeat(80)).ends_with("..."));
    }
}
