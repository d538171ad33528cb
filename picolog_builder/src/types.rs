//! 类型表
//!
//! 站点负载布局的描述语法沿用标准二进制打包字符集：
//! `b B h H i I q Q f d s x c ?`，前面可带重复次数。
//! 类型定义文档是 JSON：值要么是格式串（`"2f"`、`"10x"`、`"10s"`），
//! 要么是字段名到字段描述的有序映射，字段描述递归使用同一套语法，
//! 也可以引用别的类型名。布局严格紧凑，无隐式对齐。

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::ScanError;

/// 打包字符集中的原始类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimCode {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Bool,
    Char,
    /// `s`: 字节串，计数即字节数
    Bytes,
    /// `x`: 填充块，解码时跳过
    Pad,
}

impl PrimCode {
    pub fn from_code(c: char) -> Option<Self> {
        Some(match c {
            'b' => PrimCode::I8,
            'B' => PrimCode::U8,
            'h' => PrimCode::I16,
            'H' => PrimCode::U16,
            'i' => PrimCode::I32,
            'I' => PrimCode::U32,
            'q' => PrimCode::I64,
            'Q' => PrimCode::U64,
            'f' => PrimCode::F32,
            'd' => PrimCode::F64,
            '?' => PrimCode::Bool,
            'c' => PrimCode::Char,
            's' => PrimCode::Bytes,
            'x' => PrimCode::Pad,
            _ => return None,
        })
    }

    pub fn code(self) -> char {
        match self {
            PrimCode::I8 => 'b',
            PrimCode::U8 => 'B',
            PrimCode::I16 => 'h',
            PrimCode::U16 => 'H',
            PrimCode::I32 => 'i',
            PrimCode::U32 => 'I',
            PrimCode::I64 => 'q',
            PrimCode::U64 => 'Q',
            PrimCode::F32 => 'f',
            PrimCode::F64 => 'd',
            PrimCode::Bool => '?',
            PrimCode::Char => 'c',
            PrimCode::Bytes => 's',
            PrimCode::Pad => 'x',
        }
    }

    pub fn size(self) -> usize {
        match self {
            PrimCode::I8
            | PrimCode::U8
            | PrimCode::Bool
            | PrimCode::Char
            | PrimCode::Bytes
            | PrimCode::Pad => 1,
            PrimCode::I16 | PrimCode::U16 => 2,
            PrimCode::I32 | PrimCode::U32 | PrimCode::F32 => 4,
            PrimCode::I64 | PrimCode::U64 | PrimCode::F64 => 8,
        }
    }
}

/// 解析后的布局
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedType {
    Scalar { count: u32, code: PrimCode },
    Struct(Vec<ResolvedField>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub name: String,
    pub ty: ResolvedType,
}

impl ResolvedType {
    pub fn byte_size(&self) -> usize {
        match self {
            ResolvedType::Scalar { count, code } => *count as usize * code.size(),
            ResolvedType::Struct(fields) => fields.iter().map(|f| f.ty.byte_size()).sum(),
        }
    }
}

/// 解析格式串：可选十进制计数 + 单个类型码。`"Q"` -> (1, U64)，`"10x"` -> (10, Pad)
pub fn parse_format(s: &str) -> Option<(u32, PrimCode)> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let split = s.len() - s.chars().last()?.len_utf8();
    let (digits, code) = s.split_at(split);
    let code = PrimCode::from_code(code.chars().next()?)?;
    let count = if digits.is_empty() {
        1
    } else {
        digits.parse::<u32>().ok()?
    };
    Some((count, code))
}

/// stdint.h 和固定宽度 C 类型到打包码的映射，外加 Rust 风格短标签
pub fn c_type_code(token: &str) -> Option<PrimCode> {
    Some(match token {
        // stdint 固定宽度
        "int8_t" | "int_least8_t" => PrimCode::I8,
        "int16_t" | "int_least16_t" => PrimCode::I16,
        "int32_t" | "int_least32_t" => PrimCode::I32,
        "int64_t" | "int_least64_t" | "intmax_t" => PrimCode::I64,
        "uint8_t" | "uint_least8_t" => PrimCode::U8,
        "uint16_t" | "uint_least16_t" => PrimCode::U16,
        "uint32_t" | "uint_least32_t" => PrimCode::U32,
        "uint64_t" | "uint_least64_t" | "uintmax_t" => PrimCode::U64,
        // 尺寸与平台无关的传统 C 类型
        "char" | "signed char" => PrimCode::I8,
        "unsigned char" => PrimCode::U8,
        "short" | "short int" => PrimCode::I16,
        "unsigned short" | "unsigned short int" => PrimCode::U16,
        "long long" | "long long int" => PrimCode::I64,
        "unsigned long long" | "unsigned long long int" => PrimCode::U64,
        "float" => PrimCode::F32,
        "double" | "long double" => PrimCode::F64,
        "bool" | "_Bool" => PrimCode::Bool,
        // 短标签
        "i8" => PrimCode::I8,
        "u8" => PrimCode::U8,
        "i16" => PrimCode::I16,
        "u16" => PrimCode::U16,
        "i32" => PrimCode::I32,
        "u32" => PrimCode::U32,
        "i64" => PrimCode::I64,
        "u64" => PrimCode::U64,
        "f32" => PrimCode::F32,
        "f64" => PrimCode::F64,
        _ => return None,
    })
}

/// 大小依赖架构的 C 类型，除非类型定义文档里给出布局，否则拒绝
pub fn is_arch_dependent(token: &str) -> bool {
    matches!(
        token,
        "int"
            | "long"
            | "long int"
            | "unsigned"
            | "unsigned int"
            | "unsigned long"
            | "unsigned long int"
            | "size_t"
            | "ssize_t"
            | "ptrdiff_t"
            | "intptr_t"
            | "uintptr_t"
    )
}

/// 解析好的类型表。构造时就把所有定义解析一遍，环和未知码当场报错。
#[derive(Debug, Default)]
pub struct TypeTable {
    resolved: HashMap<String, ResolvedType>,
}

impl TypeTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(defs: &Map<String, Value>) -> Result<Self, ScanError> {
        let mut table = Self::default();
        for name in defs.keys() {
            let mut stack = Vec::new();
            let ty = resolve_name(name, defs, &mut stack, &mut table.resolved)?;
            table.resolved.insert(name.clone(), ty);
        }
        Ok(table)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolved.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedType> {
        self.resolved.get(name)
    }

    /// 解析工件里的类型引用：类型名或内联格式串
    pub fn resolve_ref(&self, value_type: &str) -> Option<ResolvedType> {
        if let Some(ty) = self.resolved.get(value_type) {
            return Some(ty.clone());
        }
        parse_format(value_type).map(|(count, code)| ResolvedType::Scalar { count, code })
    }
}

fn resolve_name(
    name: &str,
    defs: &Map<String, Value>,
    stack: &mut Vec<String>,
    cache: &mut HashMap<String, ResolvedType>,
) -> Result<ResolvedType, ScanError> {
    if let Some(ty) = cache.get(name) {
        return Ok(ty.clone());
    }
    if stack.iter().any(|n| n == name) {
        return Err(ScanError::CyclicType {
            name: name.to_string(),
        });
    }

    let raw = defs.get(name).ok_or_else(|| ScanError::UnresolvedType {
        referrer: stack.last().cloned().unwrap_or_else(|| "type table".to_string()),
        name: name.to_string(),
    })?;

    stack.push(name.to_string());
    let ty = resolve_value(name, raw, defs, stack, cache)?;
    stack.pop();

    cache.insert(name.to_string(), ty.clone());
    Ok(ty)
}

fn resolve_value(
    context: &str,
    value: &Value,
    defs: &Map<String, Value>,
    stack: &mut Vec<String>,
    cache: &mut HashMap<String, ResolvedType>,
) -> Result<ResolvedType, ScanError> {
    match value {
        Value::String(s) => {
            if let Some((count, code)) = parse_format(s) {
                return Ok(ResolvedType::Scalar { count, code });
            }
            if defs.contains_key(s.as_str()) {
                return resolve_name(s, defs, stack, cache);
            }
            // 单字符或数字+单字符的样子按未知码报，其余按未解析类型名报
            if s.trim().len() <= 1 || s.trim().chars().rev().skip(1).all(|c| c.is_ascii_digit()) {
                Err(ScanError::UnknownFormat {
                    name: context.to_string(),
                    spec: s.clone(),
                })
            } else {
                Err(ScanError::UnresolvedType {
                    referrer: format!("type `{}`", context),
                    name: s.clone(),
                })
            }
        }
        Value::Object(fields) => {
            let mut resolved = Vec::with_capacity(fields.len());
            for (field_name, field_value) in fields {
                let ty = resolve_value(context, field_value, defs, stack, cache)?;
                resolved.push(ResolvedField {
                    name: field_name.clone(),
                    ty,
                });
            }
            Ok(ResolvedType::Struct(resolved))
        }
        other => Err(ScanError::BadTypeDef {
            name: context.to_string(),
            detail: format!("expected string or object, got {}", other),
        }),
    }
}

/// 收集一个定义引用到的类型名（含自身），用于把工件的 type_defs
/// 裁剪到站点实际用到的闭包
pub fn collect_referenced(name: &str, defs: &Map<String, Value>, out: &mut Vec<String>) {
    if out.iter().any(|n| n == name) {
        return;
    }
    let Some(raw) = defs.get(name) else {
        return;
    };
    out.push(name.to_string());
    collect_value_refs(raw, defs, out);
}

fn collect_value_refs(value: &Value, defs: &Map<String, Value>, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            if parse_format(s).is_none() && defs.contains_key(s.as_str()) {
                collect_referenced(s, defs, out);
            }
        }
        Value::Object(fields) => {
            for field_value in fields.values() {
                collect_value_refs(field_value, defs, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defs(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("Q"), Some((1, PrimCode::U64)));
        assert_eq!(parse_format("2f"), Some((2, PrimCode::F32)));
        assert_eq!(parse_format("10x"), Some((10, PrimCode::Pad)));
        assert_eq!(parse_format("10s"), Some((10, PrimCode::Bytes)));
        assert_eq!(parse_format("Point"), None);
        assert_eq!(parse_format("2z"), None);
        assert_eq!(parse_format(""), None);
        assert_eq!(parse_format("12"), None);
    }

    #[test]
    fn test_resolve_nested_struct() {
        let defs = defs(json!({
            "Point": {"x": "f", "y": "f", "dummy": "2i"},
            "Rect": {"pos": "Point", "size": "Point", "padding": "10x", "str": "10s", "bytes": "10s"}
        }));
        let table = TypeTable::from_json(&defs).unwrap();

        let point = table.get("Point").unwrap();
        assert_eq!(point.byte_size(), 4 + 4 + 8);

        let rect = table.get("Rect").unwrap();
        assert_eq!(rect.byte_size(), 16 + 16 + 10 + 10 + 10);

        match rect {
            ResolvedType::Struct(fields) => {
                assert_eq!(fields.len(), 5);
                assert_eq!(fields[0].name, "pos");
                assert_eq!(fields[0].ty.byte_size(), 16);
                assert_eq!(
                    fields[2].ty,
                    ResolvedType::Scalar {
                        count: 10,
                        code: PrimCode::Pad
                    }
                );
            }
            _ => panic!("Rect should be a struct"),
        }
    }

    #[test]
    fn test_cycle_is_fatal() {
        let defs = defs(json!({
            "A": {"b": "B"},
            "B": {"a": "A"}
        }));
        match TypeTable::from_json(&defs) {
            Err(ScanError::CyclicType { .. }) => {}
            other => panic!("expected cycle error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_self_cycle_is_fatal() {
        let defs = defs(json!({"A": {"a": "A"}}));
        assert!(matches!(
            TypeTable::from_json(&defs),
            Err(ScanError::CyclicType { .. })
        ));
    }

    #[test]
    fn test_unknown_code_is_fatal() {
        let defs = defs(json!({"T": "3z"}));
        assert!(matches!(
            TypeTable::from_json(&defs),
            Err(ScanError::UnknownFormat { .. })
        ));
    }

    #[test]
    fn test_unresolved_reference_is_fatal() {
        let defs = defs(json!({"T": {"f": "Missing"}}));
        assert!(matches!(
            TypeTable::from_json(&defs),
            Err(ScanError::UnresolvedType { .. })
        ));
    }

    #[test]
    fn test_c_type_mapping() {
        assert_eq!(c_type_code("uint64_t"), Some(PrimCode::U64));
        assert_eq!(c_type_code("u64"), Some(PrimCode::U64));
        assert_eq!(c_type_code("float"), Some(PrimCode::F32));
        assert_eq!(c_type_code("unsigned long long"), Some(PrimCode::U64));
        assert_eq!(c_type_code("int"), None);
        assert!(is_arch_dependent("int"));
        assert!(is_arch_dependent("size_t"));
        assert!(!is_arch_dependent("int32_t"));
    }

    #[test]
    fn test_collect_referenced_closure() {
        let defs = defs(json!({
            "Point": {"x": "f", "y": "f"},
            "Rect": {"pos": "Point", "size": "Point"},
            "Unused": {"z": "d"}
        }));
        let mut out = Vec::new();
        collect_referenced("Rect", &defs, &mut out);
        assert!(out.contains(&"Rect".to_string()));
        assert!(out.contains(&"Point".to_string()));
        assert!(!out.contains(&"Unused".to_string()));
    }
}
