//! 流解码
//!
//! 帧格式由配置给定，不做推断：
//! - 完整二进制：按同步字节重同步，校验负载长度和 ID 后取整帧；
//!   校验失败丢弃一个字节重新扫描
//! - 微型二进制：没有同步字节，靠每个站点负载长度的确定性顺序解析；
//!   16 位截断 ID 的歧义优先选本线程出现过的站点，否则按严格/宽松
//!   模式报错或跳过
//! - 文本：`$` 开头的行是记录，其余行原样透传

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Read};

use thiserror::Error;

use picolog::constants::{FRAME_HEADER_SIZE, MAX_FRAME_PAYLOAD, THREAD_NAME_MSG_ID};
use picolog::serialize::{micro_delta_ns, unpack_micro_header};
use picolog_builder::error::ScanError;
use picolog_builder::meta::{Artifact, ByteOrder, SiteEntry, SiteKind};
use picolog_builder::types::{ResolvedType, TypeTable};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Meta(#[from] ScanError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("site 0x{id:08X}: payload of {got} bytes does not match layout size {want}")]
    PayloadSize { id: u32, got: usize, want: usize },

    #[error("site 0x{id:08X} references type `{name}` missing from the artifact")]
    UnknownType { id: u32, name: String },

    #[error("micro stream offset {offset}: truncated id 0x{trunc:04X} is ambiguous")]
    AmbiguousId { offset: usize, trunc: u16 },

    #[error("micro stream offset {offset}: truncated id 0x{trunc:04X} is unknown")]
    UnknownTruncatedId { offset: usize, trunc: u16 },

    #[error(
        "micro stream offset {offset}: ambiguous id 0x{trunc:04X} candidates disagree on payload size, cannot skip"
    )]
    UnskippableAmbiguity { offset: usize, trunc: u16 },

    #[error("unexpected end of stream at offset {offset}")]
    Truncated { offset: usize },
}

/// 一条还原出来的记录（负载尚未解包）
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub timestamp_ns: u64,
    pub id: u32,
    pub thread_id: u8,
    pub payload: Vec<u8>,
}

/// 站点元数据加上解析好的布局
#[derive(Debug)]
pub struct SiteInfo {
    pub entry: SiteEntry,
    pub layout: Option<ResolvedType>,
}

impl SiteInfo {
    /// 非数组站点的确定负载大小；数组站点是变长的
    pub fn fixed_payload_size(&self) -> Option<usize> {
        match self.entry.kind {
            SiteKind::Array => None,
            SiteKind::Value => Some(self.layout.as_ref().map_or(0, |l| l.byte_size())),
            SiteKind::Plain | SiteKind::Enter | SiteKind::Exit => Some(0),
        }
    }
}

/// 工件索引：按完整 ID 和截断 ID 两个维度查站点
pub struct SiteIndex {
    pub byte_order: ByteOrder,
    sites: HashMap<u32, SiteInfo>,
    by_trunc: HashMap<u16, Vec<u32>>,
}

impl SiteIndex {
    pub fn from_artifact(artifact: &Artifact) -> Result<Self, DecodeError> {
        let table = TypeTable::from_json(&artifact.type_defs)?;

        let mut sites = HashMap::new();
        let mut by_trunc: HashMap<u16, Vec<u32>> = HashMap::new();
        for entry in &artifact.entries {
            let layout = match &entry.value_type {
                Some(vt) => Some(table.resolve_ref(vt).ok_or_else(|| {
                    DecodeError::UnknownType {
                        id: entry.id,
                        name: vt.clone(),
                    }
                })?),
                None => None,
            };
            by_trunc.entry(entry.id as u16).or_default().push(entry.id);
            sites.insert(
                entry.id,
                SiteInfo {
                    entry: entry.clone(),
                    layout,
                },
            );
        }

        Ok(Self {
            byte_order: artifact.byte_order,
            sites,
            by_trunc,
        })
    }

    pub fn get(&self, id: u32) -> Option<&SiteInfo> {
        self.sites.get(&id)
    }

    pub fn sites(&self) -> impl Iterator<Item = &SiteInfo> {
        self.sites.values()
    }

    fn candidates(&self, trunc: u16) -> &[u32] {
        self.by_trunc.get(&trunc).map_or(&[], |v| v.as_slice())
    }
}

/// 完整格式解码统计
#[derive(Debug, Default)]
pub struct FullStats {
    /// 重同步丢弃的字节数
    pub desync_bytes: u64,
    /// 头部形状合法但元数据里没有的 ID
    pub unknown_ids: HashSet<u32>,
}

const SYNC_BYTES: [u8; 2] = [0xAF, 0xFA];
const CHUNK_SIZE: usize = 4096;

/// 解码完整二进制流
pub fn read_full_stream(
    mut input: impl Read,
    index: &SiteIndex,
) -> Result<(Vec<RawRecord>, FullStats), DecodeError> {
    let mut records = Vec::new();
    let mut stats = FullStats::default();
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut eof = false;

    while !eof {
        let n = input.read(&mut chunk)?;
        if n == 0 {
            eof = true;
        } else {
            buffer.extend_from_slice(&chunk[..n]);
        }

        loop {
            let Some(idx) = find_sync(&buffer) else {
                // 同步字节可能跨块，保留最后一个字节
                let keep = buffer.len().min(SYNC_BYTES.len() - 1);
                let dropped = buffer.len() - keep;
                stats.desync_bytes += dropped as u64;
                buffer.drain(..dropped);
                break;
            };
            stats.desync_bytes += idx as u64;
            buffer.drain(..idx);

            if buffer.len() < FRAME_HEADER_SIZE {
                break; // 等更多数据
            }

            let payload_len = buffer[2] as usize;
            let thread_id = buffer[3];
            let id = u32::from_le_bytes(buffer[4..8].try_into().unwrap());
            let timestamp_ns = u64::from_le_bytes(buffer[8..16].try_into().unwrap());

            let id_known = id == THREAD_NAME_MSG_ID || index.get(id).is_some();
            if payload_len > MAX_FRAME_PAYLOAD || !id_known {
                if payload_len <= MAX_FRAME_PAYLOAD {
                    stats.unknown_ids.insert(id);
                }
                // 头部校验失败：丢一个字节重新扫描
                buffer.drain(..1);
                stats.desync_bytes += 1;
                continue;
            }

            let frame_end = FRAME_HEADER_SIZE + payload_len;
            if buffer.len() < frame_end {
                break; // 负载还没到齐
            }

            records.push(RawRecord {
                timestamp_ns,
                id,
                thread_id,
                payload: buffer[FRAME_HEADER_SIZE..frame_end].to_vec(),
            });
            buffer.drain(..frame_end);
        }
    }

    Ok((records, stats))
}

fn find_sync(buffer: &[u8]) -> Option<usize> {
    buffer.windows(SYNC_BYTES.len()).position(|w| w == SYNC_BYTES)
}

/// 微型格式解码统计
#[derive(Debug, Default)]
pub struct MicroStats {
    /// 宽松模式下跳过的歧义帧数
    pub skipped_ambiguous: u64,
}

/// 解码微型二进制流。时间戳是增量累加，进程首帧从 0 起。
/// `strict` 控制截断 ID 歧义：true 报错，false 尝试跳过。
pub fn read_micro_stream(
    mut input: impl Read,
    index: &SiteIndex,
    strict: bool,
) -> Result<(Vec<RawRecord>, MicroStats), DecodeError> {
    let mut data = Vec::new();
    input.read_to_end(&mut data)?;

    let mut records = Vec::new();
    let mut stats = MicroStats::default();
    let mut observed: HashMap<u8, HashSet<u32>> = HashMap::new();
    let mut now_ns: u64 = 0;
    let mut pos = 0usize;

    let reserved_trunc = THREAD_NAME_MSG_ID as u16;

    while pos < data.len() {
        if data.len() - pos < 4 {
            return Err(DecodeError::Truncated { offset: pos });
        }
        let header = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap());
        let (trunc, thread_id, scale, value) = unpack_micro_header(header);
        pos += 4;
        now_ns += micro_delta_ns(scale, value);

        // 候选：匹配截断 ID 的用户站点，外加保留的线程名 ID
        let user_candidates = index.candidates(trunc);
        let reserved_matches = trunc == reserved_trunc;
        let total = user_candidates.len() + reserved_matches as usize;

        let resolved: u32 = if total == 0 {
            return Err(DecodeError::UnknownTruncatedId {
                offset: pos - 4,
                trunc,
            });
        } else if total == 1 {
            if reserved_matches {
                THREAD_NAME_MSG_ID
            } else {
                user_candidates[0]
            }
        } else {
            // 歧义：优先本线程出现过的站点
            let seen = observed.entry(thread_id).or_default();
            let mut hits = user_candidates.iter().filter(|id| seen.contains(*id));
            match (hits.next(), hits.next()) {
                (Some(&id), None) => id,
                _ if strict => {
                    return Err(DecodeError::AmbiguousId {
                        offset: pos - 4,
                        trunc,
                    });
                }
                _ => {
                    // 宽松模式：候选负载大小一致才能跳过
                    pos = skip_ambiguous(
                        &data,
                        pos,
                        index,
                        user_candidates,
                        reserved_matches,
                        trunc,
                    )?;
                    stats.skipped_ambiguous += 1;
                    continue;
                }
            }
        };

        let payload = if resolved == THREAD_NAME_MSG_ID {
            read_var_payload(&data, &mut pos)?
        } else {
            let site = index.get(resolved).expect("candidate came from the index");
            match site.fixed_payload_size() {
                Some(size) => {
                    if data.len() - pos < size {
                        return Err(DecodeError::Truncated { offset: pos });
                    }
                    let payload = data[pos..pos + size].to_vec();
                    pos += size;
                    payload
                }
                // 数组站点带一个长度字节
                None => read_var_payload(&data, &mut pos)?,
            }
        };

        observed.entry(thread_id).or_default().insert(resolved);
        records.push(RawRecord {
            timestamp_ns: now_ns,
            id: resolved,
            thread_id,
            payload,
        });
    }

    Ok((records, stats))
}

fn read_var_payload(data: &[u8], pos: &mut usize) -> Result<Vec<u8>, DecodeError> {
    if data.len() - *pos < 1 {
        return Err(DecodeError::Truncated { offset: *pos });
    }
    let len = data[*pos] as usize;
    *pos += 1;
    if data.len() - *pos < len {
        return Err(DecodeError::Truncated { offset: *pos });
    }
    let payload = data[*pos..*pos + len].to_vec();
    *pos += len;
    Ok(payload)
}

/// 跳过一个无法归属的微型帧。所有候选的负载尺寸必须一致：
/// 全变长时按长度字节跳，全定长且等长时按该长度跳，否则流不可恢复。
fn skip_ambiguous(
    data: &[u8],
    mut pos: usize,
    index: &SiteIndex,
    user_candidates: &[u32],
    reserved_matches: bool,
    trunc: u16,
) -> Result<usize, DecodeError> {
    let mut sizes: Vec<Option<usize>> = user_candidates
        .iter()
        .map(|id| index.get(*id).unwrap().fixed_payload_size())
        .collect();
    if reserved_matches {
        sizes.push(None);
    }

    let all_variable = sizes.iter().all(|s| s.is_none());
    let first_fixed = sizes[0];
    let all_same_fixed = first_fixed.is_some() && sizes.iter().all(|s| *s == first_fixed);

    if all_variable {
        read_var_payload(data, &mut pos)?;
        Ok(pos)
    } else if all_same_fixed {
        let size = first_fixed.unwrap();
        if data.len() - pos < size {
            return Err(DecodeError::Truncated { offset: pos });
        }
        Ok(pos + size)
    } else {
        Err(DecodeError::UnskippableAmbiguity {
            offset: pos - 4,
            trunc,
        })
    }
}

/// 文本流的一项：记录或透传行
#[derive(Debug, Clone, PartialEq)]
pub enum TextItem {
    Record(RawRecord),
    Raw(String),
}

/// 解码文本流。解析不了的 `$` 行按透传处理。
pub fn read_text_stream(input: impl BufRead) -> Result<Vec<TextItem>, DecodeError> {
    let mut items = Vec::new();
    for line in input.lines() {
        let line = line?;
        match parse_text_line(&line) {
            Some(record) => items.push(TextItem::Record(record)),
            None => items.push(TextItem::Raw(line)),
        }
    }
    Ok(items)
}

fn parse_text_line(line: &str) -> Option<RawRecord> {
    let rest = line.strip_prefix('$')?;
    let mut parts = rest.split(',');
    let secs: f64 = parts.next()?.parse().ok()?;
    let id = u32::from_str_radix(parts.next()?, 16).ok()?;
    let thread_id: u8 = parts.next()?.parse().ok()?;
    let payload = match parts.next() {
        Some(hex) => decode_hex(hex)?,
        None => Vec::new(),
    };
    if parts.next().is_some() {
        return None;
    }
    Some(RawRecord {
        timestamp_ns: (secs * 1e9).round() as u64,
        id,
        thread_id,
        payload,
    })
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    for i in (0..s.len()).step_by(2) {
        out.push(u8::from_str_radix(s.get(i..i + 2)?, 16).ok()?);
    }
    Some(out)
}
