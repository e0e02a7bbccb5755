//! Parameterized SELECT builder for filtered listings.
//!
//! Clauses and bound values are collected separately; values are only ever
//! referenced through numbered placeholders (`?1`, `?2`, ...), so fragments
//! may be added in any order regardless of where they end up in the SQL
//! text.

use rusqlite::types::Value;

/// Restricts a revision alias `r` to the newest revision of its entity.
pub const LATEST_REVISION: &str =
    "r.revision_id = (SELECT MAX(revision_id) FROM entity_revisions WHERE eid = r.eid)";

/// Incrementally assembled SELECT statement.
#[derive(Debug, Clone, Default)]
pub struct SelectBuilder {
    columns: Vec<String>,
    from: String,
    joins: Vec<String>,
    clauses: Vec<String>,
    order_by: Vec<String>,
    params: Vec<Value>,
}

impl SelectBuilder {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            ..Default::default()
        }
    }

    /// Registers a bound value and returns its placeholder.
    pub fn bind(&mut self, value: impl Into<Value>) -> String {
        self.params.push(value.into());
        format!("?{}", self.params.len())
    }

    pub fn column(&mut self, expr: impl Into<String>) -> &mut Self {
        self.columns.push(expr.into());
        self
    }

    pub fn columns(&mut self, exprs: &[&str]) -> &mut Self {
        self.columns.extend(exprs.iter().map(|e| e.to_string()));
        self
    }

    pub fn join(&mut self, join: impl Into<String>) -> &mut Self {
        self.joins.push(join.into());
        self
    }

    /// Adds a WHERE clause; all clauses are AND-ed.
    pub fn filter(&mut self, clause: impl Into<String>) -> &mut Self {
        self.clauses.push(clause.into());
        self
    }

    /// Adds `column IN (...)` over `values`. An empty set adds nothing, so
    /// an empty filter means "no restriction".
    pub fn filter_in<I, V>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let placeholders: Vec<String> = values.into_iter().map(|v| self.bind(v)).collect();
        if !placeholders.is_empty() {
            self.clauses
                .push(format!("{column} IN ({})", placeholders.join(", ")));
        }
        self
    }

    pub fn order_by(&mut self, expr: impl Into<String>) -> &mut Self {
        self.order_by.push(expr.into());
        self
    }

    /// Renders the statement and returns it with its parameters in
    /// placeholder order.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT {}\nFROM {}", self.columns.join(", "), self.from);
        for join in &self.joins {
            sql.push('\n');
            sql.push_str(join);
        }
        if !self.clauses.is_empty() {
            sql.push_str("\nWHERE ");
            sql.push_str(&self.clauses.join(" AND "));
        }
        if !self.order_by.is_empty() {
            sql.push_str("\nORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        (sql, self.params.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_in_filter_adds_no_clause() {
        let mut q = SelectBuilder::new("entity_revisions AS r");
        q.column("r.eid").filter_in("r.state", Vec::<String>::new());
        let (sql, params) = q.build();
        assert_eq!(sql, "SELECT r.eid\nFROM entity_revisions AS r");
        assert!(params.is_empty());
    }

    #[test]
    fn placeholders_follow_bind_order_not_text_order() {
        let mut q = SelectBuilder::new("entity_revisions AS r");
        q.column("r.eid");
        let active = q.bind(true);
        q.filter(format!("r.active = {active}"));
        q.filter_in("r.state", ["accepted", "pending"].map(String::from));
        let name = q.bind("name:en".to_string());
        q.join(format!(
            "LEFT JOIN metadata AS m ON m.entity_revision_id = r.id AND m.name = {name}"
        ));
        q.order_by("r.eid ASC");

        let (sql, params) = q.build();
        assert_eq!(
            sql,
            "SELECT r.eid\nFROM entity_revisions AS r\n\
             LEFT JOIN metadata AS m ON m.entity_revision_id = r.id AND m.name = ?4\n\
             WHERE r.active = ?1 AND r.state IN (?2, ?3)\n\
             ORDER BY r.eid ASC"
        );
        assert_eq!(
            params,
            vec![
                Value::Integer(1),
                Value::Text("accepted".to_string()),
                Value::Text("pending".to_string()),
                Value::Text("name:en".to_string()),
            ]
        );
    }
}
