//! Statement classification by leading keyword.

use crate::models::QueryCategory;

/// Classifies a statement after skipping leading whitespace, `--` line
/// comments and `/* */` block comments.
///
/// `CREATE`, `ALTER`, `DROP`, `TRUNCATE`, `RENAME` and any unrecognized
/// statement are reported as DDL.
pub fn classify(query: &str) -> QueryCategory {
    let head = strip_leading_comments(query).to_ascii_uppercase();
    let starts = |kw: &str| head.starts_with(kw);

    if starts("SELECT") || starts("WITH") {
        QueryCategory::Select
    } else if starts("INSERT") {
        QueryCategory::Insert
    } else if starts("UPDATE") {
        QueryCategory::Update
    } else if starts("DELETE") {
        QueryCategory::Delete
    } else {
        QueryCategory::Ddl
    }
}

fn strip_leading_comments(query: &str) -> &str {
    let mut rest = query.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            match after.find('\n') {
                Some(end) => rest = after[end + 1..].trim_start(),
                None => return "",
            }
        } else if let Some(after) = rest.strip_prefix("/*") {
            match after.find("*/") {
                Some(end) => rest = after[end + 2..].trim_start(),
                None => return "",
            }
        } else {
            return rest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_forms() {
        for query in [
            "-- c\nSELECT 1",
            "select 1",
            "WITH x AS (SELECT 1) SELECT * FROM x",
            "  /* hint */ -- note\n  Select now()",
        ] {
            assert_eq!(classify(query), QueryCategory::Select, "{query}");
        }
    }

    #[test]
    fn test_modifications() {
        assert_eq!(classify("INSERT INTO t VALUES (1)"), QueryCategory::Insert);
        assert_eq!(classify("update t set a = 1"), QueryCategory::Update);
        assert_eq!(classify("DELETE FROM t"), QueryCategory::Delete);
    }

    #[test]
    fn test_ddl_and_fallback() {
        assert_eq!(classify("CREATE TABLE t(id INT)"), QueryCategory::Ddl);
        assert_eq!(classify("truncate t"), QueryCategory::Ddl);
        assert_eq!(classify("SHOW TABLES"), QueryCategory::Ddl);
        assert_eq!(classify("-- only a comment"), QueryCategory::Ddl);
        assert_eq!(classify(""), QueryCategory::Ddl);
    }
}
