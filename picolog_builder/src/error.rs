//! 扫描错误
//!
//! 所有扫描/构建错误都是致命的，诊断信息带上出错的文件和行号。
//! 扫描器从不猜测。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{file}:{line}: level `{token}` is not a canonical level name or decimal integer")]
    BadLevel {
        file: String,
        line: usize,
        token: String,
    },

    #[error("{file}:{line}: `{token}` is not a string literal")]
    NotStringLiteral {
        file: String,
        line: usize,
        token: String,
    },

    #[error("{file}:{line}: explicit id `{token}` is not an integer literal")]
    BadExplicitId {
        file: String,
        line: usize,
        token: String,
    },

    #[error("{file}:{line}: macro `{name}` expects {expected} arguments, found {found}")]
    BadArity {
        file: String,
        line: usize,
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("{file}:{line}: unterminated macro invocation")]
    UnterminatedMacro { file: String, line: usize },

    #[error("{file}:{line}: id 0x{id:08X} is reserved for thread-name announcements")]
    ReservedId {
        file: String,
        line: usize,
        id: u32,
    },

    #[error("id 0x{id:08X} collides between {first} and {second} with different metadata")]
    IdCollision {
        id: u32,
        first: String,
        second: String,
    },

    #[error("{file}:{line}: architecture-dependent C type `{token}` must be defined in the type definitions")]
    ArchDependentType {
        file: String,
        line: usize,
        token: String,
    },

    #[error("{referrer}: unresolved type `{name}`")]
    UnresolvedType { referrer: String, name: String },

    #[error("type `{name}`: unknown packing format `{spec}`")]
    UnknownFormat { name: String, spec: String },

    #[error("type `{name}` is part of a definition cycle")]
    CyclicType { name: String },

    #[error("type `{name}`: {detail}")]
    BadTypeDef { name: String, detail: String },

    #[error("{path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

impl ScanError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        ScanError::Io {
            path: path.into(),
            source,
        }
    }
}
