//! picologcat - 日志流解码 CLI
//!
//! 用法：
//!   picologcat cat -m meta.json -f full log.bin          # 渲染可读文本
//!   picologcat cat -m meta.json -f micro --strict -     # 从 stdin 读微型流
//!   picologcat export -m meta.json -f full log.bin -o out/ --trace trace.json
//!   picologcat stats -m meta.json -f full log.bin       # 按站点统计

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use picolog::constants::THREAD_NAME_MSG_ID;
use picolog::level::severity_string;
use picologcat::decode::{
    read_full_stream, read_micro_stream, read_text_stream, RawRecord, SiteIndex, TextItem,
};
use picologcat::export;
use picologcat::render::Renderer;
use picologcat::trace::TraceBuilder;
use picolog_builder::Artifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Full,
    Micro,
    Text,
}

#[derive(Parser)]
#[command(name = "picologcat")]
#[command(about = "Decode picolog binary streams back into readable logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 渲染可读文本行
    Cat {
        /// 元数据工件路径
        #[arg(short, long)]
        meta: PathBuf,

        /// 帧格式
        #[arg(short, long, value_enum)]
        format: LogFormat,

        /// 日志文件（缺省读 stdin）
        log_file: Option<PathBuf>,

        /// 微型格式截断 ID 歧义按致命错误处理
        #[arg(long)]
        strict: bool,

        /// 同时写 Chrome trace JSON
        #[arg(long)]
        trace: Option<PathBuf>,
    },

    /// 按站点导出 CSV（可选 trace）
    Export {
        /// 元数据工件路径
        #[arg(short, long)]
        meta: PathBuf,

        /// 帧格式
        #[arg(short, long, value_enum)]
        format: LogFormat,

        /// 日志文件（缺省读 stdin）
        log_file: Option<PathBuf>,

        /// 输出目录
        #[arg(short, long, default_value = "export")]
        output_dir: PathBuf,

        /// 微型格式截断 ID 歧义按致命错误处理
        #[arg(long)]
        strict: bool,

        /// 同时写 Chrome trace JSON
        #[arg(long)]
        trace: Option<PathBuf>,
    },

    /// 打印按站点/等级的记录统计
    Stats {
        /// 元数据工件路径
        #[arg(short, long)]
        meta: PathBuf,

        /// 帧格式
        #[arg(short, long, value_enum)]
        format: LogFormat,

        /// 日志文件（缺省读 stdin）
        log_file: Option<PathBuf>,

        /// 微型格式截断 ID 歧义按致命错误处理
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting tracing subscriber")?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Cat {
            meta,
            format,
            log_file,
            strict,
            trace,
        } => {
            let index = load_index(&meta)?;
            let items = read_items(format, log_file.as_ref(), &index, strict)?;
            let mut renderer = Renderer::new(&index);
            let mut trace_builder = trace.as_ref().map(|_| TraceBuilder::new());

            for item in &items {
                match item {
                    TextItem::Raw(line) => println!("{}", line),
                    TextItem::Record(record) => {
                        let rendered = renderer.handle(record)?;
                        if let Some(builder) = trace_builder.as_mut() {
                            builder.observe(record, &index, rendered.as_ref());
                        }
                        if let Some(rendered) = rendered {
                            println!("{}", rendered.line);
                        }
                    }
                }
            }

            if let (Some(path), Some(builder)) = (trace, trace_builder) {
                builder
                    .write_to(&path)
                    .with_context(|| format!("write trace {}", path.display()))?;
            }
        }
        Commands::Export {
            meta,
            format,
            log_file,
            output_dir,
            strict,
            trace,
        } => {
            let index = load_index(&meta)?;
            let items = read_items(format, log_file.as_ref(), &index, strict)?;
            let records: Vec<RawRecord> = items
                .into_iter()
                .filter_map(|item| match item {
                    TextItem::Record(r) => Some(r),
                    TextItem::Raw(_) => None,
                })
                .collect();

            export::export_csv(&records, &index, &output_dir)?;

            if let Some(path) = trace {
                let mut renderer = Renderer::new(&index);
                let mut builder = TraceBuilder::new();
                for record in &records {
                    let rendered = renderer.handle(record)?;
                    builder.observe(record, &index, rendered.as_ref());
                }
                builder
                    .write_to(&path)
                    .with_context(|| format!("write trace {}", path.display()))?;
            }
        }
        Commands::Stats {
            meta,
            format,
            log_file,
            strict,
        } => {
            let index = load_index(&meta)?;
            let items = read_items(format, log_file.as_ref(), &index, strict)?;
            print_stats(&items, &index);
        }
    }

    Ok(())
}

fn load_index(meta: &PathBuf) -> Result<SiteIndex> {
    let artifact =
        Artifact::load(meta).with_context(|| format!("load artifact {}", meta.display()))?;
    Ok(SiteIndex::from_artifact(&artifact)?)
}

/// 三种帧统一读成 TextItem 序列（二进制流没有透传行）
fn read_items(
    format: LogFormat,
    log_file: Option<&PathBuf>,
    index: &SiteIndex,
    strict: bool,
) -> Result<Vec<TextItem>> {
    let input: Box<dyn Read> = match log_file {
        Some(path) if path.as_os_str() != "-" => Box::new(
            File::open(path).with_context(|| format!("open log file {}", path.display()))?,
        ),
        _ => Box::new(io::stdin()),
    };

    match format {
        LogFormat::Full => {
            let (records, stats) = read_full_stream(input, index)?;
            if stats.desync_bytes > 0 {
                warn!(
                    "picologcat: discarded {} bytes while resynchronizing",
                    stats.desync_bytes
                );
            }
            for id in &stats.unknown_ids {
                warn!("picologcat: stream contains unknown id 0x{:08X}", id);
            }
            Ok(records.into_iter().map(TextItem::Record).collect())
        }
        LogFormat::Micro => {
            let (records, stats) = read_micro_stream(input, index, strict)?;
            if stats.skipped_ambiguous > 0 {
                warn!(
                    "picologcat: skipped {} ambiguous micro frames",
                    stats.skipped_ambiguous
                );
            }
            Ok(records.into_iter().map(TextItem::Record).collect())
        }
        LogFormat::Text => Ok(read_text_stream(BufReader::new(input))?),
    }
}

fn print_stats(items: &[TextItem], index: &SiteIndex) {
    let mut per_site: HashMap<u32, u64> = HashMap::new();
    let mut per_level: HashMap<&'static str, u64> = HashMap::new();
    let mut thread_names: u64 = 0;
    let mut raw_lines: u64 = 0;

    for item in items {
        match item {
            TextItem::Raw(_) => raw_lines += 1,
            TextItem::Record(record) => {
                if record.id == THREAD_NAME_MSG_ID {
                    thread_names += 1;
                    continue;
                }
                *per_site.entry(record.id).or_insert(0) += 1;
                if let Some(site) = index.get(record.id) {
                    *per_level
                        .entry(severity_string(site.entry.level))
                        .or_insert(0) += 1;
                }
            }
        }
    }

    println!("Record statistics:");
    let mut sites: Vec<_> = per_site.iter().collect();
    sites.sort_by_key(|(id, _)| **id);
    for (id, count) in sites {
        match index.get(*id) {
            Some(site) => println!(
                "  0x{:08X} {:>8}  {}",
                id,
                count,
                site.entry.location()
            ),
            None => println!("  0x{:08X} {:>8}  <unknown>", id, count),
        }
    }

    if !per_level.is_empty() {
        println!("\nBy level:");
        let mut levels: Vec<_> = per_level.into_iter().collect();
        levels.sort();
        for (level, count) in levels {
            println!("  {:8} {}", level, count);
        }
    }

    if thread_names > 0 {
        println!("\nThread-name records: {}", thread_names);
    }
    if raw_lines > 0 {
        println!("Pass-through lines: {}", raw_lines);
    }
}
