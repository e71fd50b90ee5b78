//! 워크포워드 최적화 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 730일 in-sample, 30일 out-of-sample 워크포워드
//! wfo run --strategy Thor --strategy-path strategies/Thor --config strategies/Thor/config.json \
//!     --wf-start 20200101 --wf-finish 20230910 --in-sample 730 --out-sample-days 30
//!
//! # 중단된 실행 재개
//! wfo run ... --resume walk_forward/20240102_093000_SharpeHyperOptLoss_in_730_out_30
//!
//! # 계획 파일의 여러 실행을 순차 수행
//! wfo sweep --plan sweep.toml
//!
//! # 오늘 기준 재최적화
//! wfo re-optimise --strategy Thor --strategy-path strategies/Thor --config strategies/Thor/config.json
//!
//! # 단계 목록 / 워커 할당 / 결과 요약 확인
//! wfo stages --wf-start 20200101 --wf-finish 20200401 --in-sample 60 --out-sample-days 30
//! wfo allocate --days 400 --end 20190601 --in-sample anchored
//! wfo summary --run-dir walk_forward/20240102_093000_SharpeHyperOptLoss_in_730_out_30
//! ```

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{
    inspect::{print_allocation, print_stages, print_summary, AllocateArgs, StagesArgs},
    run::{run_re_optimise, run_sweep, run_walk_forward, ReOptimiseArgs, RunArgs},
};

#[derive(Parser)]
#[command(name = "wfo")]
#[command(about = "Walk-forward optimisation orchestrator (freqtrade)", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// 워크포워드 실행
    Run(RunArgs),

    /// 계획 파일(TOML)의 실행들을 순차 수행
    Sweep {
        /// 계획 파일 경로
        #[arg(long)]
        plan: std::path::PathBuf,
    },

    /// 오늘 기준 단일 윈도우 재최적화 (데이터 다운로드 포함)
    ReOptimise(ReOptimiseArgs),

    /// 단계 윈도우와 워커 할당 미리보기
    Stages(StagesArgs),

    /// 윈도우에 대한 워커/epoch 할당 계산
    Allocate(AllocateArgs),

    /// 실행 디렉토리의 잔고 시계열 요약
    Summary {
        /// 실행 디렉토리
        #[arg(long)]
        run_dir: std::path::PathBuf,

        /// 시작 지갑 잔고
        #[arg(long, default_value_t = wfo_core::config::DEFAULT_WALLET)]
        wallet: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 실행 전/실행 간 로그용 전역 구독자 (실행 중에는 실행별 싱크가 우선)
    let default_filter = format!("wfo_core={},wfo={}", cli.log_level, cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let run_filter = std::env::var("RUST_LOG").unwrap_or(default_filter);

    match cli.command {
        Commands::Run(args) => run_walk_forward(args, &run_filter).await?,
        Commands::Sweep { plan } => run_sweep(&plan, &run_filter).await?,
        Commands::ReOptimise(args) => run_re_optimise(args, &run_filter).await?,
        Commands::Stages(args) => print_stages(&args)?,
        Commands::Allocate(args) => print_allocation(&args),
        Commands::Summary { run_dir, wallet } => print_summary(&run_dir, wallet)?,
    }

    Ok(())
}
