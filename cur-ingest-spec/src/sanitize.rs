/*!
Export-name sanitization and data-table naming.
*/

use std::sync::OnceLock;

use regex::Regex;

use crate::{billing_period::BillingPeriod, export_name::ExportName};

fn separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s\-/\\]+").expect("static pattern"))
}

fn invalid_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9_]").expect("static pattern"))
}

fn repeated_underscores() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_+").expect("static pattern"))
}

/// Sanitize an arbitrary string into a safe table-name fragment.
///
/// Idempotent: `sanitize(sanitize(x)) == sanitize(x)`. The result always
/// matches `^[a-z][a-z0-9_]{0,49}$`, or is exactly `"export"`, or starts
/// with `"export_"`.
pub fn sanitize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let seps_collapsed = separators().replace_all(&lowered, "_");
    let stripped = invalid_chars().replace_all(&seps_collapsed, "");

    let prefixed = if stripped.is_empty() || !stripped.chars().next().unwrap().is_alphabetic() {
        format!("export_{stripped}")
    } else {
        stripped.into_owned()
    };

    let collapsed = repeated_underscores().replace_all(&prefixed, "_");
    let trimmed = collapsed.trim_matches('_');

    let truncated = if trimmed.len() > 50 {
        &trimmed[..50]
    } else {
        trimmed
    };

    truncated.to_owned()
}

/// Sanitize an already-validated [`ExportName`].
pub fn sanitize_export(export: &ExportName) -> String {
    sanitize(export.as_str())
}

/// Build the data table name for (export, billing_period):
/// `<sanitized_export>_<YYYY>_<MM>`.
pub fn table_name(export: &ExportName, period: &BillingPeriod) -> String {
    format!("{}_{}", sanitize_export(export), period.table_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_is_idempotent() {
        for raw in [
            "Acme Corp/Prod",
            "---",
            "",
            "123-numbers",
            "already_clean",
            "Mixed--CASE__name",
        ] {
            let once = sanitize(raw);
            let twice = sanitize(&once);
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn sanitize_handles_separators_and_case() {
        assert_eq!(sanitize("Acme Corp/Prod"), "acme_corp_prod");
        assert_eq!(sanitize("my-export-name"), "my_export_name");
    }

    #[test]
    fn sanitize_prefixes_non_letter_start() {
        assert_eq!(sanitize("123-numbers"), "export_123_numbers");
    }

    #[test]
    fn sanitize_of_empty_is_export() {
        assert_eq!(sanitize(""), "export");
        assert_eq!(sanitize("---"), "export");
    }

    #[test]
    fn sanitize_truncates_to_50() {
        let long = "a".repeat(80);
        assert_eq!(sanitize(&long).len(), 50);
    }

    #[test]
    fn table_name_is_idempotent_given_same_inputs() {
        let export = ExportName::parse("acme").unwrap();
        let period = BillingPeriod::new(2024, 1).unwrap();
        assert_eq!(table_name(&export, &period), table_name(&export, &period));
        assert_eq!(table_name(&export, &period), "acme_2024_01");
    }
}
