//! In-memory `Database` implementation for engine tests.
//!
//! Holds a simulated schema (tables, columns, indexes, routines, the
//! name/value config table) and interprets the narrow set of DDL shapes the
//! engine emits, so driver/ledger/consistency semantics are testable
//! without a server. Backfill queries are scripted per test.

use async_trait::async_trait;
use gs_core::{Config, ConsistencyConfig, DatabaseConfig, TriggerConfig};
use gs_db::{Database, DbError, DbResult, Param, RoutineKind, Row, TableCollation};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub(crate) struct SimTable {
    /// (name, type as written in the DDL)
    pub columns: Vec<(String, String)>,
    pub indexes: BTreeSet<String>,
    pub collation: String,
    pub engine: String,
}

impl Default for SimTable {
    fn default() -> Self {
        SimTable {
            columns: Vec::new(),
            indexes: BTreeSet::new(),
            collation: "utf8mb4_general_ci".to_string(),
            engine: "InnoDB".to_string(),
        }
    }
}

impl SimTable {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|(n, _)| n == name)
    }

    /// Catalog-style base type: `DATETIME NOT NULL` reports as `datetime`.
    fn column_base_type(&self, name: &str) -> Option<String> {
        let (_, type_str) = self.columns.iter().find(|(n, _)| n == name)?;
        let base: String = type_str
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        Some(base.to_ascii_lowercase())
    }
}

#[derive(Debug, Default)]
pub(crate) struct SimState {
    pub tables: BTreeMap<String, SimTable>,
    pub procedures: BTreeSet<String>,
    pub functions: BTreeSet<String>,
    /// Value reported by `schema_trigger_version()`
    pub trigger_version: i64,
    pub db_charset: String,
    /// Rows of the name/value config table
    pub config_values: BTreeMap<String, String>,
    /// Every statement passed to execute / execute_with, in order
    pub executed: Vec<String>,
    /// (sql substring, rows) pairs answering query_rows
    pub scripted_rows: Vec<(String, Vec<Row>)>,
    /// Substring that makes the next matching statement fail
    pub fail_on: Option<String>,
}

pub(crate) struct FakeDb {
    state: Mutex<SimState>,
}

impl FakeDb {
    pub fn empty() -> Self {
        FakeDb {
            state: Mutex::new(SimState {
                db_charset: "utf8mb4".to_string(),
                ..SimState::default()
            }),
        }
    }

    /// A production-like schema at the version floor: baseline marker and
    /// trigger layer present, trigger watermark far ahead so no unit spawns
    /// the external installer, ledger row absent.
    pub fn baseline() -> Self {
        let db = Self::empty();
        db.mutate(|state| {
            for proc_name in ["sp_touch_listing", "sp_rebuild_stat_summaries"] {
                state.procedures.insert(proc_name.to_string());
            }
            state.functions.insert("schema_trigger_version".to_string());
            state.trigger_version = 9999;

            insert_table(state, "app_config", &[("name", "VARCHAR(60)"), ("value", "MEDIUMTEXT")]);
            insert_table(state, "cache_attributes", &[("id", "INT(10)"), ("gc_id", "INT(10)")]);
            insert_table(
                state,
                "caches",
                &[
                    ("cache_id", "INT(10)"),
                    ("user_id", "INT(10)"),
                    ("status", "TINYINT(2)"),
                    ("wp_ext", "VARCHAR(6)"),
                    ("listing_last_modified", "DATETIME"),
                    ("last_modified", "DATETIME"),
                ],
            );
            for table in ["cache_logs", "cache_logs_archived"] {
                insert_table(
                    state,
                    table,
                    &[
                        ("id", "INT(10)"),
                        ("cache_id", "INT(10)"),
                        ("user_id", "INT(10)"),
                        ("type", "TINYINT(3)"),
                        ("date", "DATE"),
                        ("date_created", "DATETIME"),
                        ("last_modified", "DATETIME"),
                        ("text", "MEDIUMTEXT"),
                    ],
                );
            }
            state
                .tables
                .get_mut("cache_logs")
                .unwrap()
                .indexes
                .insert("date".to_string());

            insert_table(state, "cache_status", &[("id", "TINYINT(2)"), ("allow_user_view", "TINYINT(1)")]);
            insert_table(
                state,
                "cache_reports",
                &[("report_id", "INT(10)"), ("cache_id", "INT(10)"), ("user_id", "INT(10)")],
            );
            insert_table(
                state,
                "cache_watches",
                &[("cache_id", "INT(10)"), ("user_id", "INT(10)"), ("last_poll", "DATETIME")],
            );
            for table in ["stat_caches", "stat_cache_logs", "stat_users"] {
                insert_table(
                    state,
                    table,
                    &[
                        ("user_id", "INT(10)"),
                        ("found", "SMALLINT(5)"),
                        ("hidden", "SMALLINT(5)"),
                        ("will_attend", "SMALLINT(5)"),
                    ],
                );
            }
            insert_table(
                state,
                "users",
                &[
                    ("user_id", "INT(10)"),
                    ("username", "VARCHAR(60)"),
                    ("password", "VARCHAR(60)"),
                    ("email_problems", "INT(10)"),
                    ("notify_radius", "INT(10)"),
                    ("data_license", "TINYINT(1)"),
                ],
            );
            insert_table(
                state,
                "user_options",
                &[("user_id", "INT(10)"), ("option_id", "INT(10)"), ("option_value", "TEXT")],
            );
            insert_table(
                state,
                "pictures",
                &[
                    ("id", "INT(10)"),
                    ("object_type", "TINYINT(2)"),
                    ("object_id", "INT(10)"),
                    ("date_created", "DATETIME"),
                    ("last_modified", "DATETIME"),
                ],
            );
            insert_table(
                state,
                "log_entries",
                &[
                    ("id", "INT(10)"),
                    ("event_id", "INT(10)"),
                    ("module", "VARCHAR(30)"),
                    ("object_id", "INT(10)"),
                    ("date_created", "DATETIME"),
                    ("message", "TEXT"),
                ],
            );
            insert_table(
                state,
                "cache_locations",
                &[
                    ("cache_id", "INT(10)"),
                    ("code1", "CHAR(2)"),
                    ("adm1", "VARCHAR(100)"),
                    ("last_modified", "DATETIME"),
                ],
            );

            for static_table in ["region_codes", "region_layers", "protected_areas"] {
                insert_table(state, static_table, &[("code", "VARCHAR(10)"), ("name", "VARCHAR(100)")]);
                state.tables.get_mut(static_table).unwrap().engine = "MyISAM".to_string();
            }
            for legacy in ["map_result", "map_result_rows"] {
                insert_table(state, legacy, &[("result_id", "INT(10)"), ("cache_id", "INT(10)")]);
                state.tables.get_mut(legacy).unwrap().engine = "MyISAM".to_string();
            }
        });
        db
    }

    pub fn mutate(&self, f: impl FnOnce(&mut SimState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn executed_matching(&self, needle: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .executed
            .iter()
            .filter(|sql| sql.contains(needle))
            .count()
    }

    pub fn table(&self, name: &str) -> Option<SimTable> {
        self.state.lock().unwrap().tables.get(name).cloned()
    }

    pub fn config_value(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().config_values.get(name).cloned()
    }

    fn run_statement(&self, sql: &str) -> DbResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(sql.to_string());
        if let Some(needle) = &state.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(DbError::ExecutionError(format!("scripted failure: {sql}")));
            }
        }
        apply_ddl(&mut state, sql)?;
        Ok(0)
    }
}

fn insert_table(state: &mut SimState, name: &str, columns: &[(&str, &str)]) {
    state.tables.insert(
        name.to_string(),
        SimTable {
            columns: columns
                .iter()
                .map(|(n, t)| (n.to_string(), t.to_string()))
                .collect(),
            ..SimTable::default()
        },
    );
}

/// Test configuration pointing all filesystem paths into `dir`.
pub(crate) fn test_config(dir: &Path) -> Config {
    Config {
        name: "geostash-test".to_string(),
        database: DatabaseConfig {
            url: "mysql://test@localhost/geostash_test".to_string(),
        },
        node_id: 4,
        runtime_dir: dir.join("run"),
        static_sql_dir: dir.join("static-sql"),
        triggers: TriggerConfig {
            installer: dir.join("install"),
            timeout_secs: 5,
        },
        consistency: ConsistencyConfig::default(),
    }
}

#[async_trait]
impl Database for FakeDb {
    async fn execute(&self, sql: &str) -> DbResult<u64> {
        self.run_statement(sql)
    }

    async fn execute_with(&self, sql: &str, params: &[Param]) -> DbResult<u64> {
        if sql.starts_with("INSERT INTO `app_config`") {
            let mut state = self.state.lock().unwrap();
            state.executed.push(sql.to_string());
            if let [Param::Str(name), Param::Str(value), ..] = params {
                state.config_values.insert(name.clone(), value.clone());
            }
            return Ok(1);
        }
        self.run_statement(sql)
    }

    async fn query_string(&self, sql: &str, params: &[Param]) -> DbResult<Option<String>> {
        let state = self.state.lock().unwrap();
        if sql.contains("FROM `app_config`") {
            if let Some(Param::Str(name)) = params.first() {
                return Ok(state.config_values.get(name).cloned());
            }
        }
        Ok(None)
    }

    async fn query_i64(&self, sql: &str, _params: &[Param]) -> DbResult<Option<i64>> {
        let state = self.state.lock().unwrap();
        if sql.contains("schema_trigger_version()") {
            return Ok(Some(state.trigger_version));
        }
        Ok(None)
    }

    async fn query_rows(&self, sql: &str, _params: &[Param]) -> DbResult<Vec<Row>> {
        let state = self.state.lock().unwrap();
        for (needle, rows) in &state.scripted_rows {
            if sql.contains(needle.as_str()) {
                return Ok(rows.clone());
            }
        }
        Ok(Vec::new())
    }

    async fn table_exists(&self, table: &str) -> DbResult<bool> {
        Ok(self.state.lock().unwrap().tables.contains_key(table))
    }

    async fn column_exists(&self, table: &str, column: &str) -> DbResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .get(table)
            .is_some_and(|t| t.column_index(column).is_some()))
    }

    async fn column_type(&self, table: &str, column: &str) -> DbResult<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .get(table)
            .and_then(|t| t.column_base_type(column)))
    }

    async fn index_exists(&self, table: &str, index: &str) -> DbResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .get(table)
            .is_some_and(|t| t.indexes.contains(index)))
    }

    async fn routine_exists(&self, name: &str, kind: RoutineKind) -> DbResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(match kind {
            RoutineKind::Procedure => state.procedures.contains(name),
            RoutineKind::Function => state.functions.contains(name),
        })
    }

    async fn schema_charset(&self) -> DbResult<Option<String>> {
        Ok(Some(self.state.lock().unwrap().db_charset.clone()))
    }

    async fn table_collations(&self) -> DbResult<Vec<TableCollation>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .iter()
            .map(|(name, table)| TableCollation {
                table: name.clone(),
                collation: table.collation.clone(),
            })
            .collect())
    }

    async fn tables_with_engine(&self, engine: &str) -> DbResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .iter()
            .filter(|(_, table)| table.engine == engine)
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn db_type(&self) -> &'static str {
        "fake"
    }
}

// ── Minimal DDL interpretation ─────────────────────────────────────────

fn apply_ddl(state: &mut SimState, sql: &str) -> DbResult<()> {
    let sql = normalize(sql);
    if let Some(rest) = sql.strip_prefix("CREATE TABLE ") {
        return create_table(state, rest);
    }
    if let Some(rest) = sql.strip_prefix("DROP TABLE IF EXISTS ") {
        let name = first_ident(rest)?;
        state.tables.remove(&name);
        return Ok(());
    }
    if let Some(rest) = sql.strip_prefix("DROP TABLE ") {
        let name = first_ident(rest)?;
        if state.tables.remove(&name).is_none() {
            return Err(DbError::ExecutionError(format!("unknown table {name}")));
        }
        return Ok(());
    }
    if sql.starts_with("ALTER DATABASE") {
        if let Some(charset) = quoted_after(&sql, "CHARACTER SET ") {
            state.db_charset = charset;
        }
        return Ok(());
    }
    if let Some(rest) = sql.strip_prefix("ALTER TABLE ") {
        return alter_table(state, rest);
    }
    // DML, CALL, SET and friends leave the simulated schema untouched.
    Ok(())
}

fn create_table(state: &mut SimState, rest: &str) -> DbResult<()> {
    let name = first_ident(rest)?;
    let open = rest
        .find('(')
        .ok_or_else(|| DbError::ExecutionError("CREATE TABLE without body".to_string()))?;
    let close = rest
        .rfind(')')
        .ok_or_else(|| DbError::ExecutionError("CREATE TABLE without body".to_string()))?;
    let body = &rest[open + 1..close];
    let tail = &rest[close + 1..];

    let mut table = SimTable::default();
    for definition in split_top_level(body) {
        let definition = definition.trim();
        if definition.starts_with('`') {
            let column = first_ident(definition)?;
            let type_str = definition[column.len() + 2..].trim().to_string();
            table.columns.push((column, type_str));
        } else if definition.starts_with("PRIMARY KEY") {
            table.indexes.insert("PRIMARY".to_string());
        } else if definition.starts_with("UNIQUE KEY")
            || definition.starts_with("KEY")
            || definition.starts_with("INDEX")
        {
            table.indexes.insert(first_ident(definition)?);
        }
    }
    if let Some(engine) = value_after(tail, "ENGINE=") {
        table.engine = engine;
    }
    state.tables.insert(name, table);
    Ok(())
}

fn alter_table(state: &mut SimState, rest: &str) -> DbResult<()> {
    let name = first_ident(rest)?;
    let table = state
        .tables
        .get_mut(&name)
        .ok_or_else(|| DbError::ExecutionError(format!("unknown table {name}")))?;
    let clauses_str = rest[name.len() + 2..].trim();

    for clause in split_top_level(clauses_str) {
        let clause = clause.trim();
        if let Some(spec) = clause.strip_prefix("ADD COLUMN ") {
            let column = first_ident(spec)?;
            if table.column_index(&column).is_some() {
                return Err(DbError::ExecutionError(format!("duplicate column {column}")));
            }
            let type_str = strip_placement(spec[column.len() + 2..].trim());
            table.columns.push((column, type_str));
        } else if let Some(spec) = clause
            .strip_prefix("ADD UNIQUE INDEX ")
            .or_else(|| clause.strip_prefix("ADD INDEX "))
            .or_else(|| clause.strip_prefix("ADD KEY "))
        {
            let index = first_ident(spec)?;
            if !table.indexes.insert(index.clone()) {
                return Err(DbError::ExecutionError(format!("duplicate index {index}")));
            }
        } else if let Some(spec) = clause.strip_prefix("DROP INDEX ") {
            let index = first_ident(spec)?;
            if !table.indexes.remove(&index) {
                return Err(DbError::ExecutionError(format!("unknown index {index}")));
            }
        } else if let Some(spec) = clause.strip_prefix("DROP COLUMN ") {
            let column = first_ident(spec)?;
            let Some(position) = table.column_index(&column) else {
                return Err(DbError::ExecutionError(format!("unknown column {column}")));
            };
            table.columns.remove(position);
        } else if let Some(spec) = clause.strip_prefix("CHANGE COLUMN ") {
            let old = first_ident(spec)?;
            let spec = spec[old.len() + 2..].trim();
            let new = first_ident(spec)?;
            let type_str = strip_placement(spec[new.len() + 2..].trim());
            let Some(position) = table.column_index(&old) else {
                return Err(DbError::ExecutionError(format!("unknown column {old}")));
            };
            table.columns[position] = (new, type_str);
        } else if let Some(spec) = clause
            .strip_prefix("MODIFY COLUMN ")
            .or_else(|| clause.strip_prefix("MODIFY "))
        {
            let column = first_ident(spec)?;
            let type_str = strip_placement(spec[column.len() + 2..].trim());
            let Some(position) = table.column_index(&column) else {
                return Err(DbError::ExecutionError(format!("unknown column {column}")));
            };
            table.columns[position].1 = type_str;
        } else if clause.starts_with("CONVERT TO CHARACTER SET") {
            if let Some(collation) = quoted_after(clause, "COLLATE ") {
                table.collation = collation;
            }
        } else if let Some(engine) = value_after(clause, "ENGINE=") {
            table.engine = engine;
        }
        // COMMENT and other attribute clauses are irrelevant here.
    }
    Ok(())
}

fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First backtick-quoted identifier in `s`, which must start with one.
fn first_ident(s: &str) -> DbResult<String> {
    let s = s.trim_start();
    let inner = s
        .strip_prefix('`')
        .and_then(|rest| rest.split_once('`'))
        .map(|(ident, _)| ident.to_string());
    match inner {
        Some(ident) if !ident.is_empty() => Ok(ident),
        _ => {
            // Index/key definitions carry the name after the keyword.
            if let Some(pos) = s.find('`') {
                return first_ident(&s[pos..]);
            }
            Err(DbError::ExecutionError(format!("expected identifier in {s:?}")))
        }
    }
}

/// Split on commas outside parentheses and quotes.
fn split_top_level(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;
    for c in s.chars() {
        match c {
            '\'' => {
                in_string = !in_string;
                current.push(c);
            }
            '(' if !in_string => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_string => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if !in_string && depth == 0 => {
                parts.push(current.clone());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

/// Drop a trailing `AFTER `col`` / `FIRST` placement from a column spec.
fn strip_placement(spec: &str) -> String {
    let without_after = match spec.find(" AFTER ") {
        Some(pos) => &spec[..pos],
        None => spec,
    };
    without_after.trim_end_matches(" FIRST").trim().to_string()
}

/// `'quoted'` value following `keyword` in `s`.
fn quoted_after(s: &str, keyword: &str) -> Option<String> {
    let rest = &s[s.find(keyword)? + keyword.len()..];
    let rest = rest.trim_start().strip_prefix('\'')?;
    rest.split_once('\'').map(|(value, _)| value.to_string())
}

/// Unquoted word following `keyword` in `s`.
fn value_after(s: &str, keyword: &str) -> Option<String> {
    let rest = &s[s.find(keyword)? + keyword.len()..];
    let value: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
