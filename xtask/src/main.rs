use clap::{Parser, Subcommand};
use std::process::Command;

/// XDP 프로그램 크레이트 경로 (workspace 루트 기준)
const XDP_CRATE_DIR: &str = "crates/xdp-engine/xdp";

/// BPF 타겟
const BPF_TARGET: &str = "bpfel-unknown-none";

/// Ironfence 빌드 태스크
#[derive(Parser)]
#[command(name = "xtask")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// XDP 커널 프로그램 빌드
    BuildEbpf {
        /// 릴리스 모드로 빌드
        #[arg(long)]
        release: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::BuildEbpf { release } => build_ebpf(release),
    }
}

fn build_ebpf(release: bool) {
    let mut cmd = Command::new("cargo");
    cmd.current_dir(XDP_CRATE_DIR);
    cmd.args([
        "+nightly",
        "build",
        &format!("--target={BPF_TARGET}"),
        "-Z",
        "build-std=core",
    ]);
    if release {
        cmd.arg("--release");
    }

    let status = match cmd.status() {
        Ok(status) => status,
        Err(e) => {
            eprintln!("failed to run cargo: {e}");
            std::process::exit(1);
        }
    };
    if !status.success() {
        eprintln!("XDP build failed");
        std::process::exit(status.code().unwrap_or(1));
    }

    let profile = if release { "release" } else { "debug" };
    println!("XDP build succeeded: {XDP_CRATE_DIR}/target/{BPF_TARGET}/{profile}/ironfence-xdp");
}
