use crate::cli::OutputFormat;
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_value<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let value = serde_json::to_value(value)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&value)?),
        OutputFormat::Table => print_as_table(&value),
    }
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Two-column table of dotted field paths and their values.
fn print_as_table(value: &Value) {
    let mut rows = Vec::new();
    flatten("", value, &mut rows);
    if rows.is_empty() {
        println!("(empty)");
        return;
    }

    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (field, value) in rows {
        builder.push_record([field, value]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

fn flatten(prefix: &str, value: &Value, rows: &mut Vec<(String, String)>) {
    let path = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten(&path(key), nested, rows);
            }
        }
        Value::Array(items) => {
            for (i, nested) in items.iter().enumerate() {
                flatten(&path(&i.to_string()), nested, rows);
            }
        }
        Value::Null => rows.push((prefix.to_string(), "-".to_string())),
        Value::String(s) => rows.push((prefix.to_string(), s.clone())),
        Value::Number(n) => rows.push((prefix.to_string(), format_number(n))),
        Value::Bool(b) => rows.push((prefix.to_string(), b.to_string())),
    }
}

fn format_number(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() => format!("{f:.2}"),
        _ => n.to_string(),
    }
}
