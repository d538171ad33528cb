//! picologcat - 二进制日志流解码器
//!
//! 消费构建器产出的元数据工件和发射端的字节流（完整二进制 /
//! 微型二进制 / 文本三种帧），还原出带类型的记录并做模板替换渲染。
//! CSV 和 Chrome trace 导出是解码记录流上的适配器。

pub mod decode;
pub mod export;
pub mod render;
pub mod trace;
pub mod value;

pub use decode::{
    read_full_stream, read_micro_stream, read_text_stream, DecodeError, RawRecord, SiteIndex,
    TextItem,
};
pub use render::Renderer;
pub use value::Value;
