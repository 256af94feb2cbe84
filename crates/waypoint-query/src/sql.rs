//! Parameterised SQL produced by the analysis compilers

use waypoint_core::UtcDateTime;

use crate::error::{DataError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Text(String),
    Timestamp(UtcDateTime),
    Int(i64),
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        QueryParam::Text(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        QueryParam::Text(value)
    }
}

impl From<UtcDateTime> for QueryParam {
    fn from(value: UtcDateTime) -> Self {
        QueryParam::Timestamp(value)
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        QueryParam::Int(value)
    }
}

impl From<QueryParam> for sea_orm::Value {
    fn from(param: QueryParam) -> Self {
        match param {
            QueryParam::Text(s) => s.into(),
            QueryParam::Timestamp(ts) => ts.into(),
            QueryParam::Int(i) => i.into(),
        }
    }
}

impl QueryParam {
    /// SQL literal form, used for the human-readable copy of a query
    pub fn to_literal(&self) -> String {
        match self {
            QueryParam::Text(s) => format!("'{}'", s.replace('\'', "''")),
            QueryParam::Timestamp(ts) => format!("TIMESTAMPTZ '{}'", ts.to_rfc3339()),
            QueryParam::Int(i) => i.to_string(),
        }
    }
}

/// SQL text with `$n` placeholders and the values bound to them
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl CompiledQuery {
    /// The query with every `$n` placeholder replaced by its literal.
    ///
    /// Only for display; never execute the result.
    pub fn render_inline(&self) -> String {
        let mut out = String::with_capacity(self.sql.len());
        let mut chars = self.sql.char_indices().peekable();

        while let Some((_, c)) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }

            let mut digits = String::new();
            while let Some((_, d)) = chars.peek().copied().filter(|(_, d)| d.is_ascii_digit()) {
                digits.push(d);
                chars.next();
            }

            let param = digits
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| self.params.get(idx));

            match param {
                Some(param) => out.push_str(&param.to_literal()),
                None => {
                    out.push('$');
                    out.push_str(&digits);
                }
            }
        }

        out
    }
}

/// Collects bound values and hands out their placeholders
#[derive(Debug, Default)]
pub struct QueryBuilder {
    params: Vec<QueryParam>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a value and returns its `$n` placeholder
    pub fn bind(&mut self, value: impl Into<QueryParam>) -> String {
        self.params.push(value.into());
        format!("${}", self.params.len())
    }

    pub fn finish(self, sql: String) -> CompiledQuery {
        CompiledQuery {
            sql,
            params: self.params,
        }
    }
}

/// Accepts `name` or `schema.name` made of ASCII letters, digits and `_`,
/// not starting with a digit.
pub fn validate_table_name(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name.split('.').count() <= 2
        && name.split('.').all(|part| {
            part.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(name)
    } else {
        Err(DataError::invalid_configuration(format!(
            "'{name}' is not a valid table name"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_builder_numbers_placeholders() {
        let mut builder = QueryBuilder::new();
        let a = builder.bind("site-1");
        let b = builder.bind(42i64);
        let query = builder.finish(format!("SELECT * FROM hits WHERE website_id = {a} LIMIT {b}"));

        assert_eq!(query.sql, "SELECT * FROM hits WHERE website_id = $1 LIMIT $2");
        assert_eq!(query.params.len(), 2);
    }

    #[test]
    fn test_render_inline_handles_double_digit_placeholders() {
        let mut builder = QueryBuilder::new();
        let mut placeholders = Vec::new();
        for i in 0..12 {
            placeholders.push(builder.bind(format!("v{i}")));
        }
        let query = builder.finish(format!("SELECT {}, {}", placeholders[0], placeholders[11]));

        assert_eq!(query.render_inline(), "SELECT 'v0', 'v11'");
    }

    #[test]
    fn test_render_inline_escapes_quotes_and_formats_timestamps() {
        let mut builder = QueryBuilder::new();
        let name = builder.bind("o'clock");
        let ts = builder.bind(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
        let query = builder.finish(format!("WHERE event_name = {name} AND occurred_at >= {ts}"));

        assert_eq!(
            query.render_inline(),
            "WHERE event_name = 'o''clock' AND occurred_at >= TIMESTAMPTZ '2024-01-15T00:00:00+00:00'"
        );
    }

    #[test]
    fn test_render_inline_keeps_unbound_dollars() {
        let query = CompiledQuery {
            sql: "SELECT '$' || $3".to_string(),
            params: vec![],
        };
        assert_eq!(query.render_inline(), "SELECT '$' || $3");
    }

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("hits").is_ok());
        assert!(validate_table_name("analytics.hits_v2").is_ok());
        assert!(validate_table_name("hits; DROP TABLE x").is_err());
        assert!(validate_table_name("1hits").is_err());
        assert!(validate_table_name("a.b.c").is_err());
        assert!(validate_table_name("").is_err());
    }
}
