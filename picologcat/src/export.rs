//! CSV 导出
//!
//! 每个值名一个 CSV 文件，布局展平成列（`pos.x`、`dummy[0]`）。
//! 数组站点每个元素一行，多一列元素下标。

use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use picolog::constants::THREAD_NAME_MSG_ID;
use picolog::serialize::nano_to_seconds;
use picolog_builder::meta::SiteKind;
use picolog_builder::types::{PrimCode, ResolvedType};

use crate::decode::{DecodeError, RawRecord, SiteIndex};
use crate::value::{unpack_array, unpack_exact, Value};

/// 导出汇总: (文件名, 行数)
#[derive(Debug, Default)]
pub struct ExportSummary {
    pub files: Vec<(String, u64)>,
}

pub fn export_csv(
    records: &[RawRecord],
    index: &SiteIndex,
    out_dir: &Path,
) -> Result<ExportSummary, DecodeError> {
    create_dir_all(out_dir)?;

    let mut writers: HashMap<String, (BufWriter<File>, u64)> = HashMap::new();

    for record in records {
        if record.id == THREAD_NAME_MSG_ID {
            continue;
        }
        let Some(site) = index.get(record.id) else {
            continue;
        };
        let (Some(name), Some(layout)) = (&site.entry.value_name, &site.layout) else {
            continue;
        };
        if !matches!(site.entry.kind, SiteKind::Value | SiteKind::Array) {
            continue;
        }

        let is_array = site.entry.kind == SiteKind::Array;
        let key = sanitize(name);

        if !writers.contains_key(&key) {
            let path = out_dir.join(format!("{}.csv", key));
            let file = File::create(&path)?;
            let mut writer = BufWriter::new(file);

            let mut header = vec!["timestamp".to_string(), "thread_id".to_string()];
            if is_array {
                header.push("index".to_string());
            }
            header.extend(flatten_columns("", layout));
            writeln!(writer, "{}", header.join(","))?;
            writers.insert(key.clone(), (writer, 0));
        }
        let (writer, rows) = writers.get_mut(&key).unwrap();

        let timestamp = format!("{:.6}", nano_to_seconds(record.timestamp_ns));
        if is_array {
            let value = unpack_array(layout, &record.payload, index.byte_order, record.id)?;
            let Value::List(items) = value else {
                unreachable!("unpack_array returns a list");
            };
            for (i, item) in items.iter().enumerate() {
                let mut row = vec![timestamp.clone(), record.thread_id.to_string(), i.to_string()];
                flatten_values(item, &mut row);
                writeln!(writer, "{}", row.join(","))?;
                *rows += 1;
            }
        } else {
            let value = unpack_exact(layout, &record.payload, index.byte_order, record.id)?;
            let mut row = vec![timestamp, record.thread_id.to_string()];
            flatten_values(&value, &mut row);
            writeln!(writer, "{}", row.join(","))?;
            *rows += 1;
        }
    }

    let mut summary = ExportSummary::default();
    for (name, (mut writer, rows)) in writers {
        writer.flush()?;
        summary.files.push((format!("{}.csv", name), rows));
    }
    summary.files.sort();

    for (file, rows) in &summary.files {
        info!("picologcat export: {} rows -> {}", rows, file);
    }

    Ok(summary)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// 布局展平成列名。填充不占列。
fn flatten_columns(prefix: &str, ty: &ResolvedType) -> Vec<String> {
    let mut out = Vec::new();
    match ty {
        ResolvedType::Scalar { count, code } => match code {
            PrimCode::Pad => {}
            PrimCode::Bytes => out.push(prefix.to_string()),
            _ if *count == 1 => out.push(prefix.to_string()),
            _ => {
                for i in 0..*count {
                    out.push(format!("{}[{}]", prefix, i));
                }
            }
        },
        ResolvedType::Struct(fields) => {
            for field in fields {
                let nested = if prefix.is_empty() {
                    field.name.clone()
                } else {
                    format!("{}.{}", prefix, field.name)
                };
                out.extend(flatten_columns(&nested, &field.ty));
            }
        }
    }
    // 顶层单标量列名退化成 value
    if out.len() == 1 && out[0].is_empty() {
        out[0] = "value".to_string();
    }
    out
}

/// 值展平成 CSV 单元格，与 flatten_columns 的列一一对应
fn flatten_values(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::List(items) => {
            for item in items {
                flatten_values(item, out);
            }
        }
        Value::Struct(fields) => {
            for (_, item) in fields {
                flatten_values(item, out);
            }
        }
        other => out.push(csv_cell(&other.render_top())),
    }
}

fn csv_cell(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
