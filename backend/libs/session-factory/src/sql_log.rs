//! SQL statement logging

use tracing::info;

use crate::settings::SqlLogSettings;

const BREAK_BEFORE: &[&str] = &[
    "FROM", "WHERE", "VALUES", "SET", "JOIN", "ORDER", "RETURNING",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlLogger {
    settings: SqlLogSettings,
}

impl SqlLogger {
    pub fn new(settings: SqlLogSettings) -> Self {
        Self { settings }
    }

    /// Statement text to execute: prefixed with `/* op Entity */` when comments are on
    pub fn prepare(&self, operation: &str, entity: &str, sql: &str) -> String {
        if self.settings.comments {
            format!("/* {operation} {entity} */ {sql}")
        } else {
            sql.to_string()
        }
    }

    /// Log a statement that is about to run
    pub fn log(&self, sql: &str) {
        if !self.settings.show {
            return;
        }
        if self.settings.format {
            info!(target: "session_factory::sql", "{}", format_sql(sql));
        } else {
            info!(target: "session_factory::sql", "{}", sql);
        }
    }
}

/// Break a single-line statement before its major clauses
pub fn format_sql(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 16);
    for (i, token) in sql.split_whitespace().enumerate() {
        if i == 0 || BREAK_BEFORE.contains(&token) {
            out.push_str("\n    ");
        } else {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}
