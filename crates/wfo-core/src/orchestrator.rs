//! 단계 실행 오케스트레이터.
//!
//! 한 단계에서 다음을 순서대로 수행합니다 (외부 호출 직전마다 연결 확인):
//!
//! 1. in-sample 구간 최적화 → 최적 파라미터 복사/로깅, 결과 목록 CSV 내보내기
//! 2. in-sample 검증 백테스트 (`op_bt`)
//! 3. out-of-sample 백테스트 (`wf_bt`), 시작 잔고는 복리 잔고가 아닌 고정 지갑
//! 4. 결과 파일 파싱, 페어별 결과 CSV 저장
//!
//! 외부 도구 실패는 재시도 없이 그대로 전파됩니다.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::time::Instant;
use tracing::info;

use crate::{
    allocator::{OptimisationKind, ResourceAllocator, WorkerCount},
    artifact::{
        copy_best_params, log_best_params, read_best_params, write_pair_results, BacktestPhase,
        ResultArtifact,
    },
    config::RunConfig,
    connectivity::ConnectivityGuard,
    error::Result,
    external::{BacktestParams, DownloadParams, ExternalTool, HyperoptParams},
    rundir::RunDirectory,
    stage::{DateRange, Stage},
    stats::{format_duration, RunStats},
};

/// 한 단계의 백테스트 결과.
#[derive(Debug, Clone)]
pub struct StageResults {
    pub op: ResultArtifact,
    pub wf: ResultArtifact,
    /// 단계 디렉토리에 복사된 최적 파라미터 파일
    pub params_file: PathBuf,
}

/// 단일 윈도우(pre-live, 재최적화) 실행 결과.
#[derive(Debug, Clone)]
pub struct WindowOutcome {
    pub window: DateRange,
    pub stage_dir: PathBuf,
    pub params_file: PathBuf,
    pub result: ResultArtifact,
}

/// 단계 실행기.
pub struct RunOrchestrator {
    config: RunConfig,
    run_dir: RunDirectory,
    tool: Arc<dyn ExternalTool>,
    guard: ConnectivityGuard,
    allocator: ResourceAllocator,
    spaces: Vec<String>,
}

impl RunOrchestrator {
    pub fn new(
        config: RunConfig,
        run_dir: RunDirectory,
        tool: Arc<dyn ExternalTool>,
        guard: ConnectivityGuard,
    ) -> Self {
        let allocator = ResourceAllocator::new(config.workers, config.epochs);
        Self {
            config,
            run_dir,
            tool,
            guard,
            allocator,
            spaces: vec!["buy".to_string()],
        }
    }

    /// 최적화 파라미터 공간 지정
    pub fn with_spaces(mut self, spaces: Vec<String>) -> Self {
        if !spaces.is_empty() {
            self.spaces = spaces;
        }
        self
    }

    pub fn allocator(&self) -> &ResourceAllocator {
        &self.allocator
    }

    pub fn run_dir(&self) -> &RunDirectory {
        &self.run_dir
    }

    /// 연결 확인 후 대기 시간 누적
    async fn gate(&self, stats: &mut RunStats) {
        stats.offline_time += self.guard.await_connectivity().await;
    }

    /// in-sample 구간 최적화 후 최적 파라미터를 단계 디렉토리로 복사.
    async fn optimise(
        &self,
        window: &DateRange,
        stage_dir: &Path,
        workers: WorkerCount,
        epochs: u32,
        stats: &mut RunStats,
    ) -> Result<PathBuf> {
        info!(timerange = %window, workers = %workers, epochs = epochs, "최적화 시작");

        self.gate(stats).await;
        let started = Instant::now();
        let params = HyperoptParams {
            strategy: self.config.strategy.clone(),
            strategy_path: self.run_dir.path().to_path_buf(),
            config: self.run_dir.config_file().to_path_buf(),
            workers,
            epochs,
            loss_function: self.config.loss_function.clone(),
            fee: self.config.fee,
            timerange: *window,
            wallet: self.config.wallet,
            min_trades: self.config.min_trades,
            spaces: self.spaces.clone(),
            logfile: stage_dir.join("op_log"),
        };
        self.tool.hyperopt(&params).await?;

        self.gate(stats).await;
        self.tool
            .export_hyperopt_list(&stage_dir.join("op.csv"))
            .await?;

        let params_file = copy_best_params(self.run_dir.path(), &self.config.strategy, stage_dir)?;
        let elapsed = started.elapsed();
        stats.optimise_time += elapsed;
        info!(duration = %format_duration(elapsed), "최적화 완료");

        log_best_params(&read_best_params(&params_file)?);
        Ok(params_file)
    }

    /// 백테스트 실행 후 결과 파일 파싱.
    async fn backtest(
        &self,
        window: &DateRange,
        phase: BacktestPhase,
        stage_dir: &Path,
        sample_days: i64,
        stats: &mut RunStats,
    ) -> Result<ResultArtifact> {
        info!(phase = %phase, timerange = %window, days = sample_days, "백테스트 시작");

        self.gate(stats).await;
        let started = Instant::now();
        let params = BacktestParams {
            strategy: self.config.strategy.clone(),
            strategy_path: self.run_dir.path().to_path_buf(),
            config: self.run_dir.config_file().to_path_buf(),
            timerange: *window,
            wallet: self.config.wallet,
            fee: self.config.fee,
            logfile: stage_dir.join(format!("{}_log.txt", phase)),
            export_filename: stage_dir.join(format!("{}.json", phase.result_prefix())),
        };
        self.tool.backtest(&params).await?;

        let result = ResultArtifact::load(stage_dir, phase, &self.config.strategy)?;
        let elapsed = started.elapsed();
        stats.backtest_time += elapsed;
        info!(
            phase = %phase,
            artifact = %result.file_name(),
            duration = %format_duration(elapsed),
            "백테스트 완료"
        );

        result
            .summary
            .log_result(phase, self.config.wallet, sample_days);
        write_pair_results(
            &result.pairs,
            &stage_dir.join(format!("{}_bt_results.csv", phase)),
        )?;
        Ok(result)
    }

    /// 워크포워드 한 단계 실행 (최적화 → in-sample 검증 → out-of-sample 검증).
    pub async fn run_stage(
        &self,
        stage: &Stage,
        stage_dir: &Path,
        stats: &mut RunStats,
    ) -> Result<StageResults> {
        let workers = self
            .allocator
            .allocate_for(&stage.in_sample, self.config.in_sample);
        let epochs = self.allocator.epochs(OptimisationKind::Stage);

        let params_file = self
            .optimise(&stage.in_sample, stage_dir, workers, epochs, stats)
            .await?;

        let op = self
            .backtest(
                &stage.in_sample,
                BacktestPhase::OpBt,
                stage_dir,
                stage.in_sample.days(),
                stats,
            )
            .await?;

        let wf = self
            .backtest(
                &stage.out_sample,
                BacktestPhase::WfBt,
                stage_dir,
                self.config.out_sample_days as i64,
                stats,
            )
            .await?;

        Ok(StageResults {
            op,
            wf,
            params_file,
        })
    }

    /// 단일 윈도우 최적화 + 검증 (`stage_{label}_{window}` 디렉토리).
    ///
    /// 누적 테이블에는 기록하지 않습니다. 워커 수는 기본값을 사용합니다.
    pub async fn run_single_window(
        &self,
        window: &DateRange,
        phase: BacktestPhase,
        kind: OptimisationKind,
        stats: &mut RunStats,
    ) -> Result<WindowOutcome> {
        let stage_dir = self.run_dir.stage_dir(phase.as_str(), window)?;
        let workers = self.allocator.base_workers();
        let epochs = self.allocator.epochs(kind);

        let params_file = self
            .optimise(window, &stage_dir, workers, epochs, stats)
            .await?;
        let result = self
            .backtest(window, phase, &stage_dir, window.days(), stats)
            .await?;

        Ok(WindowOutcome {
            window: *window,
            stage_dir,
            params_file,
            result,
        })
    }

    /// 재최적화 전 시장 데이터 다운로드
    pub async fn download_data(&self, params: &DownloadParams, stats: &mut RunStats) -> Result<()> {
        self.gate(stats).await;
        info!(timeframes = ?params.timeframes, exchange = %params.exchange, "데이터 다운로드 시작");
        self.tool.download_data(params).await?;
        info!("데이터 다운로드 완료");
        Ok(())
    }
}
