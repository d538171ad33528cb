//! 元数据工件
//!
//! 构建期输出、解码期输入的 JSON 文档：
//! ```text
//! {
//!   "byte_order": "little",
//!   "entries": [ {id, source_file, source_line, level, msg, ...} ],  按 id 排序
//!   "type_defs": { "Point": {"x": "f", ...}, ... }                   打包码语法
//! }
//! ```
//! 同一 id 出现多次时要求所有字段一致，不一致是致命错误。

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use picolog::constants::THREAD_NAME_MSG_ID;

use crate::error::ScanError;
use crate::types::{self, TypeTable};

/// 工件记录的目标字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// 站点类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SiteKind {
    Plain,
    Value,
    Array,
    Enter,
    Exit,
}

/// 单个日志站点的权威元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteEntry {
    pub id: u32,
    pub source_file: String,
    pub source_line: u32,
    pub level: i32,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub value_name: Option<String>,
    #[serde(default)]
    pub value_type: Option<String>,
    #[serde(default)]
    pub is_array: bool,
    pub kind: SiteKind,
}

impl SiteEntry {
    pub fn location(&self) -> String {
        format!("{}:{}", self.source_file, self.source_line)
    }
}

/// 元数据工件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub byte_order: ByteOrder,
    pub entries: Vec<SiteEntry>,
    #[serde(default)]
    pub type_defs: Map<String, Value>,
}

impl Artifact {
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ScanError::io(path.display().to_string(), e))?;
        serde_json::from_str(&text).map_err(|e| ScanError::Json {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ScanError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| ScanError::Json {
            path: path.display().to_string(),
            source: e,
        })?;
        fs::write(path, text).map_err(|e| ScanError::io(path.display().to_string(), e))
    }

    pub fn index(&self) -> HashMap<u32, &SiteEntry> {
        self.entries.iter().map(|e| (e.id, e)).collect()
    }
}

/// 把扫描到的站点合并成工件：去重、保留字检查、类型规范化、裁剪类型表
pub fn build_artifact(
    entries: Vec<SiteEntry>,
    type_defs: Map<String, Value>,
    byte_order: ByteOrder,
) -> Result<Artifact, ScanError> {
    let table = TypeTable::from_json(&type_defs)?;

    let mut merged: HashMap<u32, SiteEntry> = HashMap::new();
    let mut referenced: Vec<String> = Vec::new();

    for mut entry in entries {
        if entry.id == THREAD_NAME_MSG_ID {
            return Err(ScanError::ReservedId {
                file: entry.source_file,
                line: entry.source_line as usize,
                id: THREAD_NAME_MSG_ID,
            });
        }

        if let Some(raw_type) = entry.value_type.take() {
            entry.value_type = Some(canonical_type_ref(&raw_type, &table, &entry)?);
        }
        if let Some(name) = &entry.value_type {
            if table.contains(name) {
                types::collect_referenced(name, &type_defs, &mut referenced);
            }
        }

        match merged.get(&entry.id) {
            None => {
                merged.insert(entry.id, entry);
            }
            Some(existing) if *existing == entry => {
                // 同一路径:行号被扫到两次，元数据一致，允许
            }
            Some(existing) => {
                return Err(ScanError::IdCollision {
                    id: entry.id,
                    first: existing.location(),
                    second: entry.location(),
                });
            }
        }
    }

    let mut entries: Vec<SiteEntry> = merged.into_values().collect();
    entries.sort_by_key(|e| e.id);

    let type_defs: Map<String, Value> = type_defs
        .into_iter()
        .filter(|(name, _)| referenced.iter().any(|r| r == name))
        .collect();

    Ok(Artifact {
        byte_order,
        entries,
        type_defs,
    })
}

/// 站点类型引用规范化：类型表里的名字原样保留，
/// 已知 C 类型/短标签映射成打包码，内联格式串原样保留
fn canonical_type_ref(
    token: &str,
    table: &TypeTable,
    entry: &SiteEntry,
) -> Result<String, ScanError> {
    if table.contains(token) {
        return Ok(token.to_string());
    }
    if let Some(code) = types::c_type_code(token) {
        return Ok(code.code().to_string());
    }
    if types::parse_format(token).is_some() {
        return Ok(token.to_string());
    }
    if types::is_arch_dependent(token) {
        return Err(ScanError::ArchDependentType {
            file: entry.source_file.clone(),
            line: entry.source_line as usize,
            token: token.to_string(),
        });
    }
    Err(ScanError::UnresolvedType {
        referrer: entry.location(),
        name: token.to_string(),
    })
}
