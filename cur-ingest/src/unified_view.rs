/*!
The Unified View Builder: after loads, (re)create a per-export view that
column-unions all month tables, so downstream queries see one relation
tolerant of schema drift between months.
*/

/// One table this export's unified view should cover.
#[derive(Debug, Clone)]
pub struct MonthTable {
    /// The table name, e.g. `acme_2024_01`
    pub name: String,
    /// The table's columns, in order
    pub columns: Vec<String>,
}

/// Name of the unified view for a sanitized export name.
pub fn view_name(export_sanitized: &str) -> String {
    format!("{export_sanitized}_unified")
}

/// True if `table` belongs to this export's family of month tables and
/// isn't itself a unified view: matches `<sanitized_export>_%` excluding
/// names ending `_unified`.
pub fn is_month_table(table: &str, export_sanitized: &str) -> bool {
    table.starts_with(&format!("{export_sanitized}_")) && !table.ends_with("_unified")
}

/// Build `CREATE OR REPLACE VIEW <export>_unified AS ...` using
/// `UNION BY NAME`, for dialects that support name-based union.
pub fn build_union_by_name(dataset: &str, export_sanitized: &str, tables: &[MonthTable]) -> String {
    let view = view_name(export_sanitized);
    let selects: Vec<String> = tables
        .iter()
        .map(|t| format!("SELECT * FROM {dataset}.{}", t.name))
        .collect();
    format!(
        "CREATE OR REPLACE VIEW {dataset}.{view} AS {}",
        selects.join(" UNION BY NAME ")
    )
}

/// Build an explicit column-aligned union for dialects lacking
/// `UNION BY NAME`: compute the union of all tables' columns, in
/// first-seen order, and fill absent columns with `NULL` in each branch.
pub fn build_explicit_union(dataset: &str, export_sanitized: &str, tables: &[MonthTable]) -> String {
    let view = view_name(export_sanitized);

    let mut all_columns: Vec<String> = Vec::new();
    for table in tables {
        for column in &table.columns {
            if !all_columns.contains(column) {
                all_columns.push(column.clone());
            }
        }
    }

    let selects: Vec<String> = tables
        .iter()
        .map(|table| {
            let projected: Vec<String> = all_columns
                .iter()
                .map(|col| {
                    if table.columns.contains(col) {
                        col.clone()
                    } else {
                        format!("NULL AS {col}")
                    }
                })
                .collect();
            format!("SELECT {} FROM {dataset}.{}", projected.join(", "), table.name)
        })
        .collect();

    format!(
        "CREATE OR REPLACE VIEW {dataset}.{view} AS {}",
        selects.join(" UNION ALL ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_month_table_excludes_unified_suffix() {
        assert!(is_month_table("acme_2024_01", "acme"));
        assert!(!is_month_table("acme_unified", "acme"));
        assert!(!is_month_table("other_2024_01", "acme"));
    }

    #[test]
    fn explicit_union_fills_absent_columns_with_null() {
        let tables = vec![
            MonthTable {
                name: "acme_2024_01".into(),
                columns: vec!["a".into(), "b".into(), "c".into()],
            },
            MonthTable {
                name: "acme_2024_02".into(),
                columns: vec!["a".into(), "b".into(), "d".into()],
            },
        ];
        let sql = build_explicit_union("aws_billing", "acme", &tables);
        assert!(sql.contains("NULL AS d"));
        assert!(sql.contains("NULL AS c"));
        assert!(sql.contains("acme_unified"));
    }

    #[test]
    fn union_by_name_joins_all_tables() {
        let tables = vec![
            MonthTable { name: "acme_2024_01".into(), columns: vec![] },
            MonthTable { name: "acme_2024_02".into(), columns: vec![] },
        ];
        let sql = build_union_by_name("aws_billing", "acme", &tables);
        assert_eq!(sql.matches("UNION BY NAME").count(), 1);
        assert!(sql.contains("acme_2024_01"));
        assert!(sql.contains("acme_2024_02"));
    }
}
