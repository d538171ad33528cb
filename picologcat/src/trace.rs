//! 跟踪导出
//!
//! 解码记录流到 Chrome trace event JSON（Perfetto UI 可直接加载）：
//! PLAIN/VALUE 带模板的记录是瞬时事件，ENTER/EXIT 是 B/E 切片，
//! 线程名记录变成 thread_name 元数据事件。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};

use picolog::constants::THREAD_NAME_MSG_ID;
use picolog::level::severity_string;

use crate::decode::{DecodeError, RawRecord, SiteIndex};
use crate::render::Rendered;

use picolog_builder::meta::SiteKind;

const TRACE_PID: u64 = 1;

#[derive(Debug, Serialize)]
struct TraceEvent {
    name: String,
    cat: String,
    ph: String,
    /// 微秒
    ts: f64,
    pid: u64,
    tid: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    s: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    args: Map<String, JsonValue>,
}

/// 跟踪事件收集器
#[derive(Debug, Default)]
pub struct TraceBuilder {
    events: Vec<TraceEvent>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 观察一条记录。`rendered` 是渲染器对带模板站点的输出。
    pub fn observe(&mut self, record: &RawRecord, index: &SiteIndex, rendered: Option<&Rendered>) {
        if record.id == THREAD_NAME_MSG_ID {
            let name = String::from_utf8_lossy(&record.payload).to_string();
            self.events.push(TraceEvent {
                name: "thread_name".to_string(),
                cat: "__metadata".to_string(),
                ph: "M".to_string(),
                ts: 0.0,
                pid: TRACE_PID,
                tid: record.thread_id as u64,
                s: None,
                args: match json!({ "name": name }) {
                    JsonValue::Object(m) => m,
                    _ => unreachable!(),
                },
            });
            return;
        }

        let Some(site) = index.get(record.id) else {
            return;
        };
        let ts = record.timestamp_ns as f64 / 1000.0;
        let loc = site.entry.location();

        match site.entry.kind {
            SiteKind::Enter | SiteKind::Exit => {
                let ph = if site.entry.kind == SiteKind::Enter {
                    "B"
                } else {
                    "E"
                };
                self.events.push(TraceEvent {
                    name: site
                        .entry
                        .value_name
                        .clone()
                        .unwrap_or_else(|| loc.clone()),
                    cat: "span".to_string(),
                    ph: ph.to_string(),
                    ts,
                    pid: TRACE_PID,
                    tid: record.thread_id as u64,
                    s: None,
                    args: match json!({ "loc": loc }) {
                        JsonValue::Object(m) => m,
                        _ => unreachable!(),
                    },
                });
            }
            _ => {
                let Some(rendered) = rendered else {
                    return;
                };
                self.events.push(TraceEvent {
                    name: "log".to_string(),
                    cat: "log".to_string(),
                    ph: "i".to_string(),
                    ts,
                    pid: TRACE_PID,
                    tid: record.thread_id as u64,
                    s: Some("t".to_string()),
                    args: match json!({
                        "message": rendered.msg,
                        "level": severity_string(site.entry.level),
                        "loc": loc,
                    }) {
                        JsonValue::Object(m) => m,
                        _ => unreachable!(),
                    },
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn write_to(&self, path: &Path) -> Result<(), DecodeError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let doc = json!({
            "traceEvents": self.events,
            "displayTimeUnit": "ms",
        });
        serde_json::to_writer_pretty(&mut writer, &doc)
            .map_err(|e| DecodeError::Io(std::io::Error::other(e)))?;
        writer.flush()?;
        Ok(())
    }
}
