//! 查询结果格式化

use common::errors::{AppError, AppResult};
use common::models::{QueryResult, SqlValue};

/// 列之间的最小间隔
const CELL_PADDING: usize = 2;
const SEPARATOR: &str = "----------";

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

impl OutputFormat {
    /// 解析格式名，未指定时为 `json`
    pub fn parse(name: Option<&str>) -> AppResult<Self> {
        match name.unwrap_or("json") {
            "json" => Ok(OutputFormat::Json),
            "table" => Ok(OutputFormat::Table),
            other => Err(AppError::Format(format!(
                "unsupported format: {other}. Supported formats: json, table"
            ))),
        }
    }
}

/// 按指定格式渲染查询结果
pub fn render(result: &QueryResult, format: OutputFormat) -> AppResult<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(result)
            .map_err(|e| AppError::Format(format!("failed to marshal result to JSON: {e}"))),
        OutputFormat::Table => Ok(render_table(result)),
    }
}

fn render_table(result: &QueryResult) -> String {
    let (columns, rows) = match (&result.columns, &result.rows) {
        (Some(columns), Some(rows)) if result.category.is_select() && !rows.is_empty() => {
            (columns, rows)
        }
        _ if result.message.is_empty() => {
            return format!(
                "Query executed successfully ({}). No rows to display.",
                result.category
            )
        }
        _ => return result.message.clone(),
    };

    let mut lines: Vec<Vec<String>> = Vec::with_capacity(rows.len() + 2);
    lines.push(columns.clone());
    lines.push(vec![SEPARATOR.to_string(); columns.len()]);
    for row in rows {
        lines.push(
            columns
                .iter()
                .map(|col| row.get(col).unwrap_or(&SqlValue::Null).to_string())
                .collect(),
        );
    }

    // 最后一列不补齐
    let widths: Vec<usize> = (0..columns.len())
        .map(|i| {
            lines
                .iter()
                .map(|cells| cells[i].chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut output = String::new();
    for cells in &lines {
        let last = cells.len().saturating_sub(1);
        for (i, cell) in cells.iter().enumerate() {
            output.push_str(cell);
            if i < last {
                let pad = widths[i] + CELL_PADDING - cell.chars().count();
                output.extend(std::iter::repeat(' ').take(pad));
            }
        }
        output.push('\n');
    }
    output.push_str(&format!("\n{} rows returned.\n", result.row_count));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::{QueryCategory, Record};

    fn select_result() -> QueryResult {
        let mut first = Record::new();
        first.insert("id".into(), SqlValue::Int(1));
        first.insert("name".into(), SqlValue::Text("alice".into()));
        let mut second = Record::new();
        second.insert("id".into(), SqlValue::Int(2));
        second.insert("name".into(), SqlValue::Null);

        QueryResult {
            category: QueryCategory::Select,
            columns: Some(vec!["id".into(), "name".into()]),
            rows: Some(vec![first, second]),
            row_count: 2,
            rows_affected: None,
            last_insert_id: None,
            execution_time: "1.00ms".into(),
            message: "Query executed successfully. 2 rows returned.".into(),
        }
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::parse(None).unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::parse(Some("table")).unwrap(), OutputFormat::Table);

        let err = OutputFormat::parse(Some("xml")).unwrap_err();
        assert!(matches!(err, AppError::Format(_)));
        assert_eq!(
            err.to_string(),
            "unsupported format: xml. Supported formats: json, table"
        );
    }

    #[test]
    fn test_json_is_pretty() {
        let out = render(&select_result(), OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["type"], "select");
        assert_eq!(parsed["row_count"], 2);
        assert_eq!(parsed["rows"][1]["name"], serde_json::Value::Null);
        assert!(out.contains("\n  \"type\""));
    }

    #[test]
    fn test_table_layout() {
        let out = render(&select_result(), OutputFormat::Table).unwrap();
        let expected = "\
id          name
----------  ----------
1           alice
2           <NULL>

2 rows returned.
";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_table_without_rows_shows_message() {
        let mut result = select_result();
        result.category = QueryCategory::Update;
        result.columns = None;
        result.rows = None;
        result.message = "UPDATE executed successfully. 3 rows affected.".into();
        assert_eq!(
            render(&result, OutputFormat::Table).unwrap(),
            "UPDATE executed successfully. 3 rows affected."
        );

        result.message.clear();
        assert_eq!(
            render(&result, OutputFormat::Table).unwrap(),
            "Query executed successfully (update). No rows to display."
        );
    }
}
