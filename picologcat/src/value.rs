//! 解码值
//!
//! 负载按站点布局递归解包：数值小端（或工件声明的字节序）、
//! 定长数组展开成列表、`s` 字节串、`x` 填充跳过。
//! 渲染沿用原解码器的 Python 风格字面量（字典、列表、b'...'），
//! 这是模板替换的兼容面。

use std::fmt;

use picolog_builder::meta::ByteOrder;
use picolog_builder::types::{PrimCode, ResolvedType};

use crate::decode::DecodeError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    UInt(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Char(char),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Struct(Vec<(String, Value)>),
}

/// 按布局解包，负载长度必须与布局大小一致
pub fn unpack_exact(
    ty: &ResolvedType,
    payload: &[u8],
    order: ByteOrder,
    site_id: u32,
) -> Result<Value, DecodeError> {
    let want = ty.byte_size();
    if payload.len() != want {
        return Err(DecodeError::PayloadSize {
            id: site_id,
            got: payload.len(),
            want,
        });
    }
    Ok(unpack(ty, payload, order).unwrap_or(Value::Bytes(Vec::new())))
}

/// 数组站点：负载是若干个元素布局的连续编码
pub fn unpack_array(
    elem: &ResolvedType,
    payload: &[u8],
    order: ByteOrder,
    site_id: u32,
) -> Result<Value, DecodeError> {
    let elem_size = elem.byte_size();
    if elem_size == 0 || payload.len() % elem_size != 0 {
        return Err(DecodeError::PayloadSize {
            id: site_id,
            got: payload.len(),
            want: elem_size,
        });
    }
    let mut items = Vec::with_capacity(payload.len() / elem_size);
    for chunk in payload.chunks(elem_size) {
        items.push(unpack(elem, chunk, order).unwrap_or(Value::Bytes(Vec::new())));
    }
    Ok(Value::List(items))
}

/// 填充布局解包出 None
fn unpack(ty: &ResolvedType, bytes: &[u8], order: ByteOrder) -> Option<Value> {
    match ty {
        ResolvedType::Scalar { count, code } => unpack_scalar(*count, *code, bytes, order),
        ResolvedType::Struct(fields) => {
            let mut out = Vec::with_capacity(fields.len());
            let mut offset = 0;
            for field in fields {
                let size = field.ty.byte_size();
                let value = unpack(&field.ty, &bytes[offset..offset + size], order);
                offset += size;
                if let Some(value) = value {
                    out.push((field.name.clone(), value));
                }
            }
            Some(Value::Struct(out))
        }
    }
}

fn unpack_scalar(count: u32, code: PrimCode, bytes: &[u8], order: ByteOrder) -> Option<Value> {
    match code {
        PrimCode::Pad => return None,
        PrimCode::Bytes => return Some(Value::Bytes(bytes.to_vec())),
        _ => {}
    }

    let size = code.size();
    let mut items = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        items.push(prim_value(code, &bytes[i * size..(i + 1) * size], order));
    }
    if count == 1 {
        items.pop()
    } else {
        Some(Value::List(items))
    }
}

fn prim_value(code: PrimCode, b: &[u8], order: ByteOrder) -> Value {
    macro_rules! read {
        ($ty:ty, $n:expr) => {{
            let arr: [u8; $n] = b[..$n].try_into().unwrap();
            match order {
                ByteOrder::Little => <$ty>::from_le_bytes(arr),
                ByteOrder::Big => <$ty>::from_be_bytes(arr),
            }
        }};
    }

    match code {
        PrimCode::I8 => Value::Int(b[0] as i8 as i64),
        PrimCode::U8 => Value::UInt(b[0] as u64),
        PrimCode::I16 => Value::Int(read!(i16, 2) as i64),
        PrimCode::U16 => Value::UInt(read!(u16, 2) as u64),
        PrimCode::I32 => Value::Int(read!(i32, 4) as i64),
        PrimCode::U32 => Value::UInt(read!(u32, 4) as u64),
        PrimCode::I64 => Value::Int(read!(i64, 8)),
        PrimCode::U64 => Value::UInt(read!(u64, 8)),
        PrimCode::F32 => Value::F32(read!(f32, 4)),
        PrimCode::F64 => Value::F64(read!(f64, 8)),
        PrimCode::Bool => Value::Bool(b[0] != 0),
        PrimCode::Char => Value::Char(b[0] as char),
        PrimCode::Bytes | PrimCode::Pad => unreachable!(),
    }
}

impl Value {
    /// str() 语义：字符串不带引号，嵌套结构按 repr 渲染
    pub fn render_top(&self) -> String {
        match self {
            Value::Bytes(raw) => match printable_prefix(raw) {
                Some(s) => s.to_string(),
                None => {
                    let mut out = String::new();
                    bytes_repr(raw, &mut out);
                    out
                }
            },
            Value::Char(c) => c.to_string(),
            other => {
                let mut out = String::new();
                other.render_repr(&mut out);
                out
            }
        }
    }

    /// repr() 语义
    fn render_repr(&self, out: &mut String) {
        match self {
            Value::Int(v) => out.push_str(&v.to_string()),
            Value::UInt(v) => out.push_str(&v.to_string()),
            Value::F32(v) => out.push_str(&format!("{:?}", v)),
            Value::F64(v) => out.push_str(&format!("{:?}", v)),
            Value::Bool(v) => out.push_str(if *v { "True" } else { "False" }),
            Value::Char(c) => {
                out.push('\'');
                out.push(*c);
                out.push('\'');
            }
            Value::Bytes(raw) => match printable_prefix(raw) {
                Some(s) => {
                    out.push('\'');
                    for c in s.chars() {
                        match c {
                            '\'' => out.push_str("\\'"),
                            '\\' => out.push_str("\\\\"),
                            c => out.push(c),
                        }
                    }
                    out.push('\'');
                }
                None => bytes_repr(raw, out),
            },
            Value::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.render_repr(out);
                }
                out.push(']');
            }
            Value::Struct(fields) => {
                out.push('{');
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push('\'');
                    out.push_str(name);
                    out.push_str("': ");
                    value.render_repr(out);
                }
                out.push('}');
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_top())
    }
}

/// `s` 字段到第一个 NUL 截断；可打印的 UTF-8 按字符串渲染，
/// 否则整个字段按 Python bytes 字面量渲染
fn printable_prefix(raw: &[u8]) -> Option<&str> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let s = std::str::from_utf8(&raw[..end]).ok()?;
    if s.chars().all(|c| !c.is_control()) {
        Some(s)
    } else {
        None
    }
}

fn bytes_repr(raw: &[u8], out: &mut String) {
    out.push_str("b'");
    for &b in raw {
        match b {
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\'' => out.push_str("\\'"),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out.push('\'');
}
