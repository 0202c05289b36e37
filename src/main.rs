//! session-export 命令行入口
//!
//! 用法：
//!   session-export export [-i <数据目录>] [-p <口令>] -o <输出目录>
//!   session-export export --skip-attachments -o <输出目录>
//!
//! 日志写到 stderr，级别由 `RUST_LOG` 控制，默认 `info`。
//! 致命错误打印诊断信息并以非零状态退出；
//! 单个附件失败只记录日志，不影响退出状态。

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use session_export::store::default_data_dir;
use session_export::{ExportOptions, ProgressEvent, run_export};

#[derive(Parser, Debug)]
#[command(author, version, about = "Export a Session messenger data directory", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decrypt the database and all media files into the output directory
    Export {
        /// Path to the Session data directory (detected automatically when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
        /// Password to the app, if one is set
        #[arg(short, long, conflicts_with = "ask_password")]
        password: Option<String>,
        /// Prompt for the app password instead of passing it on the command line
        #[arg(long)]
        ask_password: bool,
        /// Only decrypt the database
        #[arg(long)]
        skip_attachments: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Export {
            input,
            output,
            password,
            ask_password,
            skip_attachments,
        } => {
            let input_given = input.is_some();
            let input = match input.or_else(default_data_dir) {
                Some(path) => path,
                None => return Err(anyhow!(locate_hint())),
            };

            let password = if ask_password {
                let entered = rpassword::prompt_password("App password: ")
                    .context("could not read password")?;
                Some(Zeroizing::new(entered))
            } else {
                password.map(Zeroizing::new)
            };

            let options = ExportOptions {
                input,
                output,
                password,
                skip_attachments,
            };

            let report = run_export(&options, render_progress).map_err(|e| match e {
                session_export::ExportError::InputLayout { .. } if !input_given => {
                    anyhow!("{e}\n{}", locate_hint())
                }
                other => anyhow::Error::new(other),
            })?;

            println!("{}", report.database_path.display());
            if let Some(attachments) = report.attachments {
                if attachments.failed > 0 || attachments.remap_failed > 0 {
                    warn!(
                        failed = attachments.failed,
                        remap_failed = attachments.remap_failed,
                        "some attachments could not be exported, see the log above"
                    );
                }
                println!("{}", attachments.map_path.display());
            }
        }
    }
    Ok(())
}

fn render_progress(event: ProgressEvent) {
    match event {
        ProgressEvent::DatabaseDecrypted { .. } => {}
        ProgressEvent::AttachmentsFound { total } => info!("decrypting {total} media files"),
        ProgressEvent::AttachmentsProgress {
            done,
            total,
            percent,
        } => info!("{done}/{total} {percent}%"),
        ProgressEvent::AttachmentsDecrypted { decrypted, .. } => {
            info!("successfully exported {decrypted} files")
        }
        ProgressEvent::RemapStarted { .. } => info!("remapping media filenames"),
        ProgressEvent::RemapFinished { remapped, .. } => {
            info!("successfully remapped {remapped} files to their original names")
        }
    }
}

fn locate_hint() -> &'static str {
    "could not locate the Session data directory automatically, please run with -i /path/to/session/directory"
}
