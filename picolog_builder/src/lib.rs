//! picolog_builder - 源码扫描器与元数据构建器
//!
//! 遍历源码树识别封闭的站点宏家族，抽取元数据并计算站点 ID
//! （与运行时共用同一个 CRC 实现，两条工具链逐位一致），
//! 连同解析过的类型表一起写成按 ID 排序的 JSON 工件。
//! 解码器从另一端消费同一份模式。

pub mod error;
pub mod meta;
pub mod scanner;
pub mod types;

pub use error::ScanError;
pub use meta::{build_artifact, Artifact, ByteOrder, SiteEntry, SiteKind};
