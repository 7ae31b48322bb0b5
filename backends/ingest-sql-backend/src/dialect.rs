/*!
The two SQL dialects this backend speaks, and the placeholder syntax
each needs. `sqlx::AnyPool` dispatches execution to whichever driver is
actually connected, but it does not normalize placeholder syntax or
schema support, so callers still need to know which dialect they're
building a query string for.
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which SQL dialect a connected pool speaks.
pub enum Dialect {
    /// A real warehouse: supports schemas and `$N` placeholders.
    Postgres,
    /// The file-local embedded case: no schemas, `?` placeholders.
    Sqlite,
}

impl Dialect {
    /// Detect the dialect from a connection URL's scheme.
    pub fn from_url(url: &str) -> Option<Dialect> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Dialect::Postgres)
        } else if url.starts_with("sqlite:") {
            Some(Dialect::Sqlite)
        } else {
            None
        }
    }

    /// The `N`th (1-based) bind placeholder for this dialect.
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            Dialect::Postgres => format!("${position}"),
            Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Comma-joined placeholder list for `count` binds, `$1, $2, $3` or
    /// `?, ?, ?`.
    pub fn placeholder_list(&self, count: usize) -> String {
        (1..=count)
            .map(|i| self.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_placeholders_are_numbered() {
        assert_eq!(Dialect::Postgres.placeholder(1), "$1");
        assert_eq!(Dialect::Postgres.placeholder_list(3), "$1, $2, $3");
    }

    #[test]
    fn sqlite_placeholders_are_bare_question_marks() {
        assert_eq!(Dialect::Sqlite.placeholder(1), "?");
        assert_eq!(Dialect::Sqlite.placeholder_list(3), "?, ?, ?");
    }

    #[test]
    fn from_url_detects_scheme() {
        assert_eq!(Dialect::from_url("postgres://localhost/db"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_url("postgresql://localhost/db"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_url("sqlite://data.db"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_url("sqlite::memory:"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_url("mysql://localhost/db"), None);
    }
}
