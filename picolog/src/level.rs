//! 日志等级
//!
//! 等级是整数，比较按数值进行。宏的等级参数直接引用这些常量。

pub const DEBUG: i32 = 10;
pub const INFO: i32 = 20;
pub const WARN: i32 = 30;
pub const ERROR: i32 = 40;
pub const CRITICAL: i32 = 50;

/// 规范等级名（扫描器和解码器共享这张表）
pub const LEVEL_NAMES: [(&str, i32); 5] = [
    ("DEBUG", DEBUG),
    ("INFO", INFO),
    ("WARN", WARN),
    ("ERROR", ERROR),
    ("CRITICAL", CRITICAL),
];

/// 等级到名字：阈值语义，非精确匹配
pub const fn severity_string(level: i32) -> &'static str {
    if level <= DEBUG {
        "DEBUG"
    } else if level <= INFO {
        "INFO"
    } else if level <= WARN {
        "WARN"
    } else if level <= ERROR {
        "ERROR"
    } else {
        "CRITICAL"
    }
}
