//! 记录渲染
//!
//! 解码记录流到可读文本。每个线程维护一张按值名滚动的最近值表，
//! PLAIN 记录的模板里的 `${NAME}` 用本线程最近一次该名字的值替换；
//! 线程名记录更新每流一张的线程名表。

use std::collections::HashMap;

use picolog::constants::THREAD_NAME_MSG_ID;
use picolog::level::severity_string;
use picolog::serialize::nano_to_seconds;

use crate::decode::{DecodeError, RawRecord, SiteIndex};
use crate::value::{unpack_array, unpack_exact, Value};

use picolog_builder::meta::SiteKind;

/// 渲染出的一条记录：完整行和替换后的消息体
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub line: String,
    pub msg: String,
}

#[derive(Default)]
struct ThreadState {
    name: Option<String>,
    last_values: HashMap<String, Value>,
}

/// 解码记录流的渲染器（每条流一个实例）
pub struct Renderer<'a> {
    index: &'a SiteIndex,
    threads: HashMap<u8, ThreadState>,
}

impl<'a> Renderer<'a> {
    pub fn new(index: &'a SiteIndex) -> Self {
        Self {
            index,
            threads: HashMap::new(),
        }
    }

    /// 处理一条记录。带模板的站点返回渲染行，其余返回 None。
    pub fn handle(&mut self, record: &RawRecord) -> Result<Option<Rendered>, DecodeError> {
        if record.id == THREAD_NAME_MSG_ID {
            let name = String::from_utf8_lossy(&record.payload).to_string();
            self.threads.entry(record.thread_id).or_default().name = Some(name);
            return Ok(None);
        }

        let Some(site) = self.index.get(record.id) else {
            // 未知 ID（文本流里可能出现），跳过
            return Ok(None);
        };

        // VALUE/ARRAY 记录先解包并更新本线程的最近值
        if let (Some(name), Some(layout)) = (&site.entry.value_name, &site.layout) {
            let value = match site.entry.kind {
                SiteKind::Array => {
                    unpack_array(layout, &record.payload, self.index.byte_order, record.id)?
                }
                _ => unpack_exact(layout, &record.payload, self.index.byte_order, record.id)?,
            };
            self.threads
                .entry(record.thread_id)
                .or_default()
                .last_values
                .insert(name.clone(), value);
        }

        let Some(template) = &site.entry.msg else {
            return Ok(None);
        };

        let state = self.threads.entry(record.thread_id).or_default();
        let msg = substitute(template, &state.last_values);
        let thread_label = state
            .name
            .clone()
            .unwrap_or_else(|| format!("thread_id_{}", record.thread_id));

        let line = format!(
            "{:.6} {} {}:{} {}] {}",
            nano_to_seconds(record.timestamp_ns),
            severity_string(site.entry.level),
            site.entry.source_file,
            site.entry.source_line,
            thread_label,
            msg
        );

        Ok(Some(Rendered { line, msg }))
    }

    /// 当前已知的线程名
    pub fn thread_name(&self, thread_id: u8) -> Option<&str> {
        self.threads.get(&thread_id)?.name.as_deref()
    }
}

/// 替换模板里的 `${NAME}`；没见过的名字保留原样
fn substitute(template: &str, values: &HashMap<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match values.get(key) {
                    Some(value) => out.push_str(&value.render_top()),
                    None => {
                        out.push_str("${");
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}
