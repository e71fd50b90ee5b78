//! 워크포워드 실행 명령 (run, sweep, re-optimise).

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::Args;
use tracing::{error, info};
use wfo_core::{
    config::{DEFAULT_DOWNLOAD_DAYS, DEFAULT_FEE, DEFAULT_MIN_TRADES, DEFAULT_WALLET},
    ConnectivityGuard, FreqtradeCli, HttpProbe, InSampleWindow, RunConfig, RuntimeConfig,
    SweepPlan, WalkForwardController, WorkerCount,
};

use super::{date_arg, window_arg};

/// 전략/설정 파일 인자
#[derive(Args, Debug, Clone)]
pub struct StrategyArgs {
    /// 전략 이름 (`{strategy_path}/{strategy}.py`)
    #[arg(long)]
    pub strategy: String,

    /// 전략 파일 디렉토리
    #[arg(long)]
    pub strategy_path: PathBuf,

    /// freqtrade 설정 파일
    #[arg(long = "config")]
    pub config_path: PathBuf,

    /// 실행 디렉토리 루트
    #[arg(long, default_value = "walk_forward")]
    pub output_root: PathBuf,

    /// 최적화 최소 거래 수
    #[arg(long, default_value_t = DEFAULT_MIN_TRADES)]
    pub min_trades: u32,

    /// 시작 지갑 잔고
    #[arg(long, default_value_t = DEFAULT_WALLET)]
    pub wallet: f64,

    /// 거래 수수료율
    #[arg(long, default_value_t = DEFAULT_FEE)]
    pub fee: f64,

    /// 재최적화 전 다운로드 타임프레임
    #[arg(long, value_delimiter = ',', default_value = "5m,1h,1d")]
    pub download_timeframes: Vec<String>,

    /// 재최적화 전 다운로드 기간 (일)
    #[arg(long, default_value_t = DEFAULT_DOWNLOAD_DAYS)]
    pub download_days: u32,
}

/// `wfo run` 인자
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub strategy: StrategyArgs,

    /// 첫 out-of-sample 시작일 (YYYYMMDD)
    #[arg(long, value_parser = date_arg)]
    pub wf_start: NaiveDate,

    /// 워크포워드 종료일 (YYYYMMDD)
    #[arg(long, value_parser = date_arg)]
    pub wf_finish: NaiveDate,

    /// anchored 모드 in-sample 시작일 (YYYYMMDD)
    #[arg(long, value_parser = date_arg)]
    pub anchored_start: Option<NaiveDate>,

    /// in-sample 일수 또는 "anchored"
    #[arg(long, value_parser = window_arg, default_value = "730")]
    pub in_sample: InSampleWindow,

    /// out-of-sample 일수
    #[arg(long, default_value_t = 30)]
    pub out_sample_days: u32,

    /// 손실 함수
    #[arg(long, default_value = "SharpeHyperOptLoss")]
    pub loss_function: String,

    /// 기본 epoch 수
    #[arg(long, default_value_t = 100)]
    pub epochs: u32,

    /// 기본 워커 수 (음수: 전체 코어 - N)
    #[arg(long, default_value_t = -15, allow_negative_numbers = true)]
    pub workers: i32,

    /// 마지막 in-sample 윈도우로 배포 후보 파라미터 최적화
    #[arg(long)]
    pub pre_live: bool,

    /// 실행 종료 후 오늘 기준 재최적화
    #[arg(long)]
    pub re_optimise: bool,

    /// 기존 실행 디렉토리에서 재개
    #[arg(long)]
    pub resume: Option<PathBuf>,
}

impl RunArgs {
    pub fn to_config(&self) -> RunConfig {
        let s = &self.strategy;
        RunConfig {
            strategy: s.strategy.clone(),
            strategy_path: s.strategy_path.clone(),
            config_path: s.config_path.clone(),
            output_root: s.output_root.clone(),
            wf_start: self.wf_start,
            wf_finish: self.wf_finish,
            anchored_start: self.anchored_start,
            in_sample: self.in_sample,
            out_sample_days: self.out_sample_days,
            min_trades: s.min_trades,
            loss_function: self.loss_function.clone(),
            epochs: self.epochs,
            workers: WorkerCount(self.workers),
            wallet: s.wallet,
            fee: s.fee,
            pre_live: self.pre_live,
            re_optimise: self.re_optimise,
            download_timeframes: s.download_timeframes.clone(),
            download_days: s.download_days,
        }
    }
}

/// `wfo re-optimise` 인자
#[derive(Args, Debug)]
pub struct ReOptimiseArgs {
    #[command(flatten)]
    pub strategy: StrategyArgs,

    /// in-sample 일수 또는 "anchored"
    #[arg(long, value_parser = window_arg, default_value = "730")]
    pub in_sample: InSampleWindow,

    /// anchored 모드 in-sample 시작일 (YYYYMMDD)
    #[arg(long, value_parser = date_arg)]
    pub anchored_start: Option<NaiveDate>,

    /// 손실 함수
    #[arg(long, default_value = "SortinoHyperOptLoss")]
    pub loss_function: String,

    /// epoch 수
    #[arg(long, default_value_t = 200)]
    pub epochs: u32,

    /// 워커 수
    #[arg(long, default_value_t = -19, allow_negative_numbers = true)]
    pub workers: i32,
}

impl ReOptimiseArgs {
    pub fn to_config(&self, today: NaiveDate) -> RunConfig {
        let s = &self.strategy;
        RunConfig {
            strategy: s.strategy.clone(),
            strategy_path: s.strategy_path.clone(),
            config_path: s.config_path.clone(),
            output_root: s.output_root.clone(),
            wf_start: today,
            wf_finish: today,
            anchored_start: self.anchored_start,
            in_sample: self.in_sample,
            out_sample_days: 1,
            min_trades: s.min_trades,
            loss_function: self.loss_function.clone(),
            epochs: self.epochs,
            workers: WorkerCount(self.workers),
            wallet: s.wallet,
            fee: s.fee,
            pre_live: false,
            re_optimise: true,
            download_timeframes: s.download_timeframes.clone(),
            download_days: s.download_days,
        }
    }
}

fn build_controller(
    config: RunConfig,
    runtime: &RuntimeConfig,
    log_filter: &str,
) -> anyhow::Result<WalkForwardController> {
    let probe = HttpProbe::from_runtime(runtime).context("연결 확인 클라이언트 생성 실패")?;
    let guard = ConnectivityGuard::new(Arc::new(probe), runtime.retry_interval());
    let tool = Arc::new(FreqtradeCli::from_runtime(runtime));

    Ok(
        WalkForwardController::new(config, runtime.clone(), tool, guard)
            .with_log_filter(log_filter),
    )
}

/// `wfo run`
pub async fn run_walk_forward(args: RunArgs, log_filter: &str) -> anyhow::Result<()> {
    let runtime = RuntimeConfig::from_env();
    let mut controller = build_controller(args.to_config(), &runtime, log_filter)?;
    if let Some(resume) = &args.resume {
        controller = controller.resume_from(resume);
    }

    let report = controller.run().await.context("워크포워드 실행 실패")?;
    info!(run_dir = %report.run_dir.display(), "워크포워드 실행 종료");
    Ok(())
}

/// `wfo sweep`: 계획의 각 실행을 순차 수행 (첫 실패에서 중단)
pub async fn run_sweep(plan_path: &Path, log_filter: &str) -> anyhow::Result<()> {
    let plan = SweepPlan::load(plan_path)
        .with_context(|| format!("계획 파일 로드 실패: {}", plan_path.display()))?;
    let configs = plan.run_configs()?;
    let runtime = RuntimeConfig::from_env();
    info!(runs = configs.len(), plan = %plan_path.display(), "계획 실행 시작");

    for (idx, config) in configs.into_iter().enumerate() {
        let tag = config.run_tag();
        info!(run = idx + 1, tag = %tag, "계획 항목 실행");
        let controller = build_controller(config, &runtime, log_filter)?;
        match controller.run().await {
            Ok(report) => info!(
                run = idx + 1,
                run_dir = %report.run_dir.display(),
                final_balance = format!("{:.2}", report.equity.final_balance()),
                "계획 항목 완료"
            ),
            Err(e) => {
                error!(run = idx + 1, tag = %tag, error = %e, "계획 항목 실패");
                return Err(e).context(format!("계획 항목 {} ({}) 실패", idx + 1, tag));
            }
        }
    }
    Ok(())
}

/// `wfo re-optimise`
pub async fn run_re_optimise(args: ReOptimiseArgs, log_filter: &str) -> anyhow::Result<()> {
    let runtime = RuntimeConfig::from_env();
    let today = Local::now().date_naive();
    let controller = build_controller(args.to_config(today), &runtime, log_filter)?;

    let report = controller.re_optimise().await.context("재최적화 실패")?;
    if let Some(outcome) = &report.re_optimise {
        info!(
            window = %outcome.window,
            params = %outcome.params_file.display(),
            "재최적화 파라미터 생성"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn test_run_args_to_config() {
        let cli = TestCli::try_parse_from([
            "wfo",
            "--strategy",
            "Thor",
            "--strategy-path",
            "strategies/Thor",
            "--config",
            "strategies/Thor/config.json",
            "--wf-start",
            "20200101",
            "--wf-finish",
            "20230910",
            "--in-sample",
            "anchored",
            "--anchored-start",
            "20190101",
            "--workers",
            "-12",
            "--download-timeframes",
            "5m,1h",
        ])
        .unwrap();

        let config = cli.run.to_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.in_sample, InSampleWindow::Anchored);
        assert_eq!(config.workers, WorkerCount(-12));
        assert_eq!(config.out_sample_days, 30);
        assert_eq!(config.wallet, DEFAULT_WALLET);
        assert_eq!(config.download_timeframes, vec!["5m", "1h"]);
        assert_eq!(config.run_tag(), "SharpeHyperOptLoss_in_anchored_out_30");
    }

    #[test]
    fn test_re_optimise_config_is_anchored_at_today() {
        #[derive(Parser)]
        struct ReCli {
            #[command(flatten)]
            args: ReOptimiseArgs,
        }

        let cli = ReCli::try_parse_from([
            "wfo",
            "--strategy",
            "Thor",
            "--strategy-path",
            "s",
            "--config",
            "s/config.json",
        ])
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let config = cli.args.to_config(today);

        assert!(config.validate().is_ok());
        assert_eq!(config.wf_start, today);
        assert_eq!(config.wf_finish, today);
        assert_eq!(config.workers, WorkerCount(-19));
        assert_eq!(config.re_optimise_tag(), "SortinoHyperOptLoss_re-optimise_730");
    }
}
