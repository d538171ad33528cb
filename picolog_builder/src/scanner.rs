//! 站点扫描器
//!
//! 遍历源码树识别封闭的宏家族，容忍任意空白、跨行参数和反斜杠续行。
//! 同一套语法覆盖 C/C++ 的 `LOG(...)` 和 Rust 的 `LOG!(...)`。
//! 消息必须是字符串字面量（相邻字面量会拼接），等级必须包含规范
//! 等级名或是十进制整数，任何不合格的参数都是致命错误。

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use walkdir::WalkDir;

use picolog::crc32;
use picolog::level::LEVEL_NAMES;

use crate::error::ScanError;
use crate::meta::{SiteEntry, SiteKind};

/// 默认扫描的扩展名
pub const DEFAULT_EXTENSIONS: &[&str] = &[".c", ".cc", ".cpp", ".h", ".hpp", ".rs"];

/// 宏家族。长名在前，保证正则交替不会截断匹配。
fn macro_head() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(RECORD_AND_LOG_VALUE_ARRAY|RECORD_AND_LOG_VALUE|RECORD_VALUE_ARRAY|RECORD_VALUE_ID|RECORD_VALUE|LOG_ID|LOG|ENTER|EXIT)\s*!?\s*\(",
        )
        .unwrap()
    })
}

/// 扫描多个源码目录（或单个文件），返回未合并的站点列表
pub fn scan_tree(
    src_paths: &[PathBuf],
    roots: &[PathBuf],
    extensions: &[String],
) -> Result<Vec<SiteEntry>, ScanError> {
    let mut entries = Vec::new();
    for src in src_paths {
        if src.is_file() {
            entries.extend(scan_file(src, roots)?);
            continue;
        }
        for item in WalkDir::new(src).sort_by_file_name() {
            let item = item.map_err(|e| {
                ScanError::io(
                    src.display().to_string(),
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("walk error")),
                )
            })?;
            if !item.file_type().is_file() {
                continue;
            }
            let name = item.file_name().to_string_lossy();
            if extensions.iter().any(|ext| name.ends_with(ext.as_str())) {
                entries.extend(scan_file(item.path(), roots)?);
            }
        }
    }
    Ok(entries)
}

/// 扫描单个文件
pub fn scan_file(path: &Path, roots: &[PathBuf]) -> Result<Vec<SiteEntry>, ScanError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ScanError::io(path.display().to_string(), e))?;
    let rel = relative_path(path, roots);
    scan_source(&content, &rel)
}

/// 路径规范化：依次剥掉能匹配的根前缀，分隔符统一成正斜杠
fn relative_path(path: &Path, roots: &[PathBuf]) -> String {
    let mut p = path;
    for root in roots {
        if let Ok(stripped) = p.strip_prefix(root) {
            p = stripped;
        }
    }
    p.to_string_lossy().replace('\\', "/")
}

/// 扫描一段源码文本。`rel_path` 参与站点 ID 计算。
pub fn scan_source(content: &str, rel_path: &str) -> Result<Vec<SiteEntry>, ScanError> {
    let mut entries = Vec::new();

    for caps in macro_head().captures_iter(content) {
        let whole = caps.get(0).unwrap();
        let name = caps.get(1).unwrap().as_str();
        let line = content[..whole.start()].matches('\n').count() + 1;
        let args = extract_args(content, whole.end(), rel_path, line)?;
        entries.push(build_entry(name, &args, rel_path, line)?);
    }

    Ok(entries)
}

/// 从 `(` 之后按括号配平抽取参数，顶层逗号分割。
/// 字符串/字符字面量内部的逗号和括号不参与配平；
/// 反斜杠续行当作空白处理。
fn extract_args(
    content: &str,
    start: usize,
    file: &str,
    line: usize,
) -> Result<Vec<String>, ScanError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut paren_depth = 1usize;
    let mut bracket_depth = 0usize;

    let mut chars = content[start..].chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                // 续行：吃掉换行，其余反斜杠原样保留
                if matches!(chars.peek(), Some('\n' | '\r')) {
                    while matches!(chars.peek(), Some('\n' | '\r')) {
                        chars.next();
                    }
                    current.push(' ');
                } else {
                    current.push('\\');
                }
            }
            '"' | '\'' => {
                current.push(c);
                let quote = c;
                while let Some(sc) = chars.next() {
                    current.push(sc);
                    if sc == '\\' {
                        if let Some(esc) = chars.next() {
                            current.push(esc);
                        }
                    } else if sc == quote {
                        break;
                    }
                }
            }
            '(' => {
                paren_depth += 1;
                current.push(c);
            }
            ')' => {
                paren_depth -= 1;
                if paren_depth == 0 {
                    args.push(current.trim().to_string());
                    return Ok(args);
                }
                current.push(c);
            }
            '[' | '{' => {
                bracket_depth += 1;
                current.push(c);
            }
            ']' | '}' => {
                bracket_depth = bracket_depth.saturating_sub(1);
                current.push(c);
            }
            ',' if paren_depth == 1 && bracket_depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    Err(ScanError::UnterminatedMacro {
        file: file.to_string(),
        line,
    })
}

fn build_entry(
    name: &str,
    args: &[String],
    file: &str,
    line: usize,
) -> Result<SiteEntry, ScanError> {
    let arity = |expected: usize| -> Result<(), ScanError> {
        if args.len() != expected {
            Err(ScanError::BadArity {
                file: file.to_string(),
                line,
                name: name.to_string(),
                expected,
                found: args.len(),
            })
        } else {
            Ok(())
        }
    };

    let site_id = || crc32(format!("{}:{}", file, line).as_bytes());

    let mut entry = SiteEntry {
        id: 0,
        source_file: file.to_string(),
        source_line: line as u32,
        level: 0,
        msg: None,
        value_name: None,
        value_type: None,
        is_array: false,
        kind: SiteKind::Plain,
    };

    match name {
        "LOG" => {
            arity(2)?;
            entry.id = site_id();
            entry.level = parse_level(&args[0], file, line)?;
            entry.msg = Some(parse_string_literal(&args[1], file, line)?);
            entry.kind = SiteKind::Plain;
        }
        "LOG_ID" => {
            arity(3)?;
            entry.id = parse_int_literal(&args[0], file, line)?;
            entry.level = parse_level(&args[1], file, line)?;
            entry.msg = Some(parse_string_literal(&args[2], file, line)?);
            entry.kind = SiteKind::Plain;
        }
        "RECORD_VALUE" => {
            arity(4)?;
            entry.id = site_id();
            entry.level = parse_level(&args[0], file, line)?;
            entry.value_name = Some(parse_string_literal(&args[1], file, line)?);
            entry.value_type = Some(normalize_type(&args[2]));
            entry.kind = SiteKind::Value;
        }
        "RECORD_VALUE_ID" => {
            arity(5)?;
            entry.id = parse_int_literal(&args[0], file, line)?;
            entry.level = parse_level(&args[1], file, line)?;
            entry.value_name = Some(parse_string_literal(&args[2], file, line)?);
            entry.value_type = Some(normalize_type(&args[3]));
            entry.kind = SiteKind::Value;
        }
        "RECORD_AND_LOG_VALUE" => {
            arity(5)?;
            entry.id = site_id();
            entry.level = parse_level(&args[0], file, line)?;
            entry.value_name = Some(parse_string_literal(&args[1], file, line)?);
            entry.value_type = Some(normalize_type(&args[2]));
            entry.msg = Some(parse_string_literal(&args[4], file, line)?);
            entry.kind = SiteKind::Value;
        }
        "RECORD_VALUE_ARRAY" => {
            arity(5)?;
            entry.id = site_id();
            entry.level = parse_level(&args[0], file, line)?;
            entry.value_name = Some(parse_string_literal(&args[1], file, line)?);
            entry.value_type = Some(normalize_type(&args[2]));
            entry.is_array = true;
            entry.kind = SiteKind::Array;
        }
        "RECORD_AND_LOG_VALUE_ARRAY" => {
            arity(6)?;
            entry.id = site_id();
            entry.level = parse_level(&args[0], file, line)?;
            entry.value_name = Some(parse_string_literal(&args[1], file, line)?);
            entry.value_type = Some(normalize_type(&args[2]));
            entry.msg = Some(parse_string_literal(&args[5], file, line)?);
            entry.is_array = true;
            entry.kind = SiteKind::Array;
        }
        "ENTER" => {
            arity(2)?;
            entry.id = site_id();
            entry.level = parse_level(&args[0], file, line)?;
            entry.value_name = Some(parse_string_literal(&args[1], file, line)?);
            entry.kind = SiteKind::Enter;
        }
        "EXIT" => {
            arity(2)?;
            entry.id = site_id();
            entry.level = parse_level(&args[0], file, line)?;
            entry.value_name = Some(parse_string_literal(&args[1], file, line)?);
            entry.kind = SiteKind::Exit;
        }
        _ => unreachable!("macro head regex and dispatch out of sync: {}", name),
    }

    Ok(entry)
}

/// 等级：包含规范等级名的任意记号（`MIN_LOG_INFO`、`picolog::level::INFO`），
/// 或十进制整数
fn parse_level(token: &str, file: &str, line: usize) -> Result<i32, ScanError> {
    let t = token.trim();
    for (name, value) in LEVEL_NAMES {
        if t.contains(name) {
            return Ok(value);
        }
    }
    t.parse::<i32>().map_err(|_| ScanError::BadLevel {
        file: file.to_string(),
        line,
        token: t.to_string(),
    })
}

/// 一个或多个相邻字符串字面量，拼接并处理常见转义
fn parse_string_literal(token: &str, file: &str, line: usize) -> Result<String, ScanError> {
    let err = || ScanError::NotStringLiteral {
        file: file.to_string(),
        line,
        token: token.trim().to_string(),
    };

    let mut out = String::new();
    let mut chars = token.trim().chars().peekable();
    let mut seen_literal = false;

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some('"') => {
                seen_literal = true;
                loop {
                    match chars.next() {
                        None => return Err(err()),
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => out.push('\n'),
                            Some('t') => out.push('\t'),
                            Some('r') => out.push('\r'),
                            Some('0') => out.push('\0'),
                            Some('\\') => out.push('\\'),
                            Some('"') => out.push('"'),
                            Some('\'') => out.push('\''),
                            // 字符串内的续行
                            Some('\n') => {}
                            Some(other) => {
                                out.push('\\');
                                out.push(other);
                            }
                            None => return Err(err()),
                        },
                        Some(c) => out.push(c),
                    }
                }
            }
            Some(_) => return Err(err()),
        }
    }

    if seen_literal {
        Ok(out)
    } else {
        Err(err())
    }
}

/// 显式站点 ID：十进制或 0x 十六进制整数字面量，允许 C 的整型后缀
fn parse_int_literal(token: &str, file: &str, line: usize) -> Result<u32, ScanError> {
    let t = token.trim().trim_end_matches(['u', 'U', 'l', 'L']);
    let parsed = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        t.parse::<u32>()
    };
    parsed.map_err(|_| ScanError::BadExplicitId {
        file: file.to_string(),
        line,
        token: token.trim().to_string(),
    })
}

/// 类型记号：内部空白压成单个空格（`unsigned   long` -> `unsigned long`）
fn normalize_type(token: &str) -> String {
    token.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_log_site() {
        let src = "\nLOG(INFO, \"hello world binary\");\n";
        let entries = scan_source(src, "examples/hello_cpp/hello.cpp").unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.id, crc32(b"examples/hello_cpp/hello.cpp:2"));
        assert_eq!(e.level, 20);
        assert_eq!(e.msg.as_deref(), Some("hello world binary"));
        assert_eq!(e.kind, SiteKind::Plain);
    }

    #[test]
    fn test_prefixed_level_and_rust_spelling() {
        let src = "LOG(MIN_LOG_ERROR, \"boom\");\nLOG!(picolog::level::WARN, \"warned\");\n";
        let entries = scan_source(src, "a.rs").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, 40);
        assert_eq!(entries[1].level, 30);
    }

    #[test]
    fn test_numeric_level() {
        let entries = scan_source("LOG(25, \"custom\");", "a.c").unwrap();
        assert_eq!(entries[0].level, 25);
    }

    #[test]
    fn test_bad_level_is_fatal() {
        assert!(matches!(
            scan_source("LOG(verbosity, \"x\");", "a.c"),
            Err(ScanError::BadLevel { line: 1, .. })
        ));
    }

    #[test]
    fn test_msg_must_be_string_literal() {
        assert!(matches!(
            scan_source("LOG(INFO, some_variable);", "a.c"),
            Err(ScanError::NotStringLiteral { .. })
        ));
    }

    #[test]
    fn test_adjacent_literals_concatenate() {
        let src = "LOG(INFO, \"part one, \" \"part two\");";
        let entries = scan_source(src, "a.c").unwrap();
        assert_eq!(entries[0].msg.as_deref(), Some("part one, part two"));
    }

    #[test]
    fn test_backslash_continuation() {
        let src = "LOG(INFO, \\\n    \"split over\" \\\n    \" lines\");\nLOG(INFO, \"next\");\n";
        let entries = scan_source(src, "a.c").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].msg.as_deref(), Some("split over lines"));
        assert_eq!(entries[0].source_line, 1);
        // 后续站点的行号不受续行影响
        assert_eq!(entries[1].source_line, 4);
    }

    #[test]
    fn test_multiline_arguments() {
        let src = "RECORD_AND_LOG_VALUE(INFO,\n    \"test_rect\",\n    Rect,\n    r,\n    \"rectangle: ${test_rect}\");";
        let entries = scan_source(src, "custom_type.cpp").unwrap();
        let e = &entries[0];
        assert_eq!(e.kind, SiteKind::Value);
        assert_eq!(e.value_name.as_deref(), Some("test_rect"));
        assert_eq!(e.value_type.as_deref(), Some("Rect"));
        assert_eq!(e.msg.as_deref(), Some("rectangle: ${test_rect}"));
        assert_eq!(e.source_line, 1);
    }

    #[test]
    fn test_explicit_id_variants() {
        let src = "LOG_ID(0xDEADBEEF, INFO, \"explicit\");\nRECORD_VALUE_ID(1234, INFO, \"v\", uint32_t, x);\n";
        let entries = scan_source(src, "a.c").unwrap();
        assert_eq!(entries[0].id, 0xDEADBEEF);
        assert_eq!(entries[1].id, 1234);
        assert_eq!(entries[1].value_type.as_deref(), Some("uint32_t"));
    }

    #[test]
    fn test_bad_explicit_id_is_fatal() {
        assert!(matches!(
            scan_source("LOG_ID(not_a_number, INFO, \"x\");", "a.c"),
            Err(ScanError::BadExplicitId { .. })
        ));
    }

    #[test]
    fn test_array_sites() {
        let src = "RECORD_VALUE_ARRAY(INFO, \"samples\", float, buf, 16);\nRECORD_AND_LOG_VALUE_ARRAY(INFO, \"rects\", Rect, rects, 2, \"rects: ${rects}\");\n";
        let entries = scan_source(src, "a.c").unwrap();
        assert!(entries[0].is_array);
        assert_eq!(entries[0].kind, SiteKind::Array);
        assert_eq!(entries[0].value_type.as_deref(), Some("float"));
        assert!(entries[1].is_array);
        assert_eq!(entries[1].msg.as_deref(), Some("rects: ${rects}"));
    }

    #[test]
    fn test_enter_exit_sites() {
        let src = "ENTER(DEBUG, \"TASK_LOOP\");\nEXIT(DEBUG, \"TASK_LOOP\");\n";
        let entries = scan_source(src, "a.c").unwrap();
        assert_eq!(entries[0].kind, SiteKind::Enter);
        assert_eq!(entries[1].kind, SiteKind::Exit);
        assert_eq!(entries[0].value_name.as_deref(), Some("TASK_LOOP"));
    }

    #[test]
    fn test_longer_identifiers_do_not_match() {
        // 其他标识符的后缀不是站点
        let src = "MY_CUSTOM_LOG(INFO, \"not ours\");\nCATALOG(1, 2);\n";
        let entries = scan_source(src, "a.c").unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_value_with_call_in_args() {
        // 参数里的嵌套括号和字符串内的逗号不拆分参数
        let src = "RECORD_VALUE(INFO, \"len, bytes\", uint64_t, compute(a, b));";
        let entries = scan_source(src, "a.c").unwrap();
        assert_eq!(entries[0].value_name.as_deref(), Some("len, bytes"));
    }

    #[test]
    fn test_arity_mismatch_is_fatal() {
        assert!(matches!(
            scan_source("LOG(INFO);", "a.c"),
            Err(ScanError::BadArity { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn test_unterminated_macro_is_fatal() {
        assert!(matches!(
            scan_source("LOG(INFO, \"x\"", "a.c"),
            Err(ScanError::UnterminatedMacro { .. })
        ));
    }

    #[test]
    fn test_multiword_type_normalization() {
        let src = "RECORD_VALUE(INFO, \"v\", unsigned   long long, x);";
        let entries = scan_source(src, "a.c").unwrap();
        assert_eq!(entries[0].value_type.as_deref(), Some("unsigned long long"));
    }
}
