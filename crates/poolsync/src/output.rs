//! Output formatting: table, JSON, YAML, plain.
//!
//! Table uses `tabled`, structured formats use serde, plain emits one
//! name per line.

use std::io::{self, IsTerminal, Write};

use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of rows in the chosen format.
///
/// Rows double as the serialized form, so `json` and `table` show the
/// same fields. `plain` emits `id_fn` of each row.
pub fn render_list<R>(format: &OutputFormat, rows: &[R], id_fn: impl Fn(&R) -> String) -> Result<String, CliError>
where
    R: Serialize + Tabled,
{
    match format {
        OutputFormat::Table => Ok(render_table(rows)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(rows)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(rows)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(rows)?),
        OutputFormat::Plain => Ok(rows.iter().map(id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single item; `table` uses the pre-formatted `detail_fn`.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

pub fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// `name: value` lines with the values aligned.
pub fn detail_lines(pairs: &[(&str, String)]) -> String {
    let width = pairs.iter().map(|(k, _)| k.len()).max().unwrap_or(0) + 1;
    pairs
        .iter()
        .map(|(k, v)| format!("{:<width$} {v}", format!("{k}:")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Tabled)]
    struct Row {
        name: String,
        count: usize,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { name: "mot1".into(), count: 1 },
            Row { name: "mot2".into(), count: 2 },
        ]
    }

    #[test]
    fn plain_and_json_lists() {
        let plain = render_list(&OutputFormat::Plain, &rows(), |r| r.name.clone()).ok();
        assert_eq!(plain.as_deref(), Some("mot1\nmot2"));

        let json = render_list(&OutputFormat::JsonCompact, &rows(), |r| r.name.clone()).ok();
        assert_eq!(json.as_deref(), Some(r#"[{"name":"mot1","count":1},{"name":"mot2","count":2}]"#));
    }

    #[test]
    fn detail_lines_align_values() {
        let text = detail_lines(&[("Name", "mot1".into()), ("Controller", "ctrl1".into())]);
        assert_eq!(text, "Name:       mot1\nController: ctrl1");
    }
}
