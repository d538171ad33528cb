//! picolog-builder - 站点扫描与元数据构建 CLI
//!
//! 用法：
//!   picolog-builder scan -s src/ -s lib/ --root . -o meta.json --type-defs types.json
//!   picolog-builder check -s src/                # 只扫描并打印摘要，不写工件

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use picolog_builder::meta::{build_artifact, ByteOrder, SiteKind};
use picolog_builder::scanner::{self, DEFAULT_EXTENSIONS};

#[derive(Parser)]
#[command(name = "picolog-builder")]
#[command(about = "Build picolog metadata artifacts from source trees", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 扫描源码树并写出元数据工件
    Scan {
        /// 源码目录或文件（可重复）
        #[arg(short, long = "src-dir", required = true)]
        src_dirs: Vec<PathBuf>,

        /// 路径规范化根：站点相对路径去掉的前缀（可重复）
        #[arg(short, long = "root")]
        roots: Vec<PathBuf>,

        /// 工件输出路径
        #[arg(short, long)]
        output: PathBuf,

        /// 类型定义 JSON 文档
        #[arg(short, long = "type-defs")]
        type_defs: Option<PathBuf>,

        /// 扫描的扩展名，逗号分隔
        #[arg(long, default_value = ".c,.cc,.cpp,.h,.hpp,.rs")]
        extensions: String,

        /// 目标字节序: little / big
        #[arg(long, default_value = "little")]
        byte_order: String,
    },

    /// 只扫描并打印摘要
    Check {
        /// 源码目录或文件（可重复）
        #[arg(short, long = "src-dir", required = true)]
        src_dirs: Vec<PathBuf>,

        /// 路径规范化根（可重复）
        #[arg(short, long = "root")]
        roots: Vec<PathBuf>,

        /// 类型定义 JSON 文档
        #[arg(short, long = "type-defs")]
        type_defs: Option<PathBuf>,

        /// 扫描的扩展名，逗号分隔
        #[arg(long, default_value = ".c,.cc,.cpp,.h,.hpp,.rs")]
        extensions: String,
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
        Commands::Scan {
            src_dirs,
            roots,
            output,
            type_defs,
            extensions,
            byte_order,
        } => {
            let byte_order = parse_byte_order(&byte_order)?;
            let artifact = scan(&src_dirs, &roots, type_defs.as_deref(), &extensions, byte_order)?;
            artifact
                .save(&output)
                .with_context(|| format!("write artifact {}", output.display()))?;
            info!(
                "picolog-builder: {} sites, {} types -> {}",
                artifact.entries.len(),
                artifact.type_defs.len(),
                output.display()
            );
        }
        Commands::Check {
            src_dirs,
            roots,
            type_defs,
            extensions,
        } => {
            let artifact = scan(
                &src_dirs,
                &roots,
                type_defs.as_deref(),
                &extensions,
                ByteOrder::Little,
            )?;
            let mut by_kind: HashMap<&'static str, usize> = HashMap::new();
            for entry in &artifact.entries {
                let kind = match entry.kind {
                    SiteKind::Plain => "PLAIN",
                    SiteKind::Value => "VALUE",
                    SiteKind::Array => "ARRAY",
                    SiteKind::Enter => "ENTER",
                    SiteKind::Exit => "EXIT",
                };
                *by_kind.entry(kind).or_insert(0) += 1;
            }
            println!("Sites: {}", artifact.entries.len());
            let mut kinds: Vec<_> = by_kind.into_iter().collect();
            kinds.sort();
            for (kind, count) in kinds {
                println!("  {:6} {}", kind, count);
            }
            println!("Types referenced: {}", artifact.type_defs.len());
        }
    }

    Ok(())
}

fn parse_byte_order(s: &str) -> Result<ByteOrder> {
    match s {
        "little" => Ok(ByteOrder::Little),
        "big" => Ok(ByteOrder::Big),
        other => bail!("unknown byte order `{}` (expected little or big)", other),
    }
}

fn scan(
    src_dirs: &[PathBuf],
    roots: &[PathBuf],
    type_defs: Option<&std::path::Path>,
    extensions: &str,
    byte_order: ByteOrder,
) -> Result<picolog_builder::Artifact> {
    let extensions: Vec<String> = if extensions.is_empty() {
        DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
    } else {
        extensions.split(',').map(|s| s.trim().to_string()).collect()
    };

    let defs = match type_defs {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read type definitions {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parse type definitions {}", path.display()))?
        }
        None => serde_json::Map::new(),
    };

    let entries = scanner::scan_tree(src_dirs, roots, &extensions)?;
    info!("picolog-builder: scanned {} raw sites", entries.len());

    Ok(build_artifact(entries, defs, byte_order)?)
}
