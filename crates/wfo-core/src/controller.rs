//! 워크포워드 실행 컨트롤러.
//!
//! 상태 흐름:
//!
//! ```text
//! INIT → STAGING → (단계별: OPTIMIZING → VALIDATING → AGGREGATING) → [PRE_LIVE] → [RE_OPTIMISE] → DONE
//! ```
//!
//! - INIT: 실행 디렉토리 생성(또는 재개 시 재사용), 전략/설정 고정 복사, 실행 로그 생성
//! - STAGING: 단계 목록 생성
//! - 단계 루프: 순차 실행, 결과를 누적 테이블에 추가하고 비교 데이터 갱신
//! - PRE_LIVE: 마지막 in-sample 윈도우를 2배 epoch로 재최적화 (테이블 미기록)
//! - RE_OPTIMISE: 데이터 다운로드 후 오늘 기준 단일 윈도우 최적화 + 검증

use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{Local, NaiveDate, NaiveDateTime};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::{
    allocator::OptimisationKind,
    artifact::BacktestPhase,
    config::{RunConfig, RuntimeConfig},
    connectivity::ConnectivityGuard,
    error::Result,
    external::{DownloadParams, ExternalTool},
    orchestrator::{RunOrchestrator, WindowOutcome},
    rundir::RunDirectory,
    runlog::RunLog,
    stage::{format_date, Stage, StageGenerator},
    stats::{format_duration, RunStats},
    table::{combine_phases, CombineOutcome, EquitySeries, StageTable},
};

/// 컨트롤러 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Staging,
    Optimizing(usize),
    Validating(usize),
    Aggregating(usize),
    PreLive,
    ReOptimise,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Staging => write!(f, "STAGING"),
            Self::Optimizing(k) => write!(f, "OPTIMIZING({})", k),
            Self::Validating(k) => write!(f, "VALIDATING({})", k),
            Self::Aggregating(k) => write!(f, "AGGREGATING({})", k),
            Self::PreLive => write!(f, "PRE_LIVE"),
            Self::ReOptimise => write!(f, "RE_OPTIMISE"),
            Self::Done => write!(f, "DONE"),
        }
    }
}

/// 실행 결과 보고서.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_dir: PathBuf,
    pub stages: Vec<Stage>,
    pub equity: EquitySeries,
    pub pre_live: Option<WindowOutcome>,
    pub re_optimise: Option<WindowOutcome>,
    pub stats: RunStats,
}

/// 워크포워드 실행 컨트롤러.
pub struct WalkForwardController {
    config: RunConfig,
    runtime: RuntimeConfig,
    tool: Arc<dyn ExternalTool>,
    guard: ConnectivityGuard,
    log_filter: String,
    console: bool,
    resume: Option<PathBuf>,
    started_at: Option<NaiveDateTime>,
    today: Option<NaiveDate>,
}

impl WalkForwardController {
    pub fn new(
        config: RunConfig,
        runtime: RuntimeConfig,
        tool: Arc<dyn ExternalTool>,
        guard: ConnectivityGuard,
    ) -> Self {
        Self {
            config,
            runtime,
            tool,
            guard,
            log_filter: "info".to_string(),
            console: true,
            resume: None,
            started_at: None,
            today: None,
        }
    }

    /// 실행 로그 필터 (`EnvFilter` 형식)
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// 실행 로그의 콘솔 출력 여부
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    /// 기존 실행 디렉토리에서 재개
    pub fn resume_from(mut self, run_dir: impl Into<PathBuf>) -> Self {
        self.resume = Some(run_dir.into());
        self
    }

    /// 실행 디렉토리 타임스탬프 고정
    pub fn with_start_time(mut self, started_at: NaiveDateTime) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// 재최적화 기준일 고정
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    fn started_at(&self) -> NaiveDateTime {
        self.started_at
            .unwrap_or_else(|| Local::now().naive_local())
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    fn transition(state: RunState) {
        info!(state = %state, "상태 전환");
    }

    /// INIT: 실행 디렉토리와 실행 로그 준비.
    fn init(&self, tag: &str) -> Result<(RunDirectory, RunLog)> {
        Self::transition(RunState::Init);
        self.config.validate()?;

        let run_dir = match &self.resume {
            Some(path) => RunDirectory::open(path, &self.config)?,
            None => RunDirectory::create(&self.config, tag, self.started_at())?,
        };
        let log = RunLog::create(&run_dir.log_file(), &self.log_filter, self.console)?;
        Ok((run_dir, log))
    }

    fn orchestrator(&self, run_dir: RunDirectory) -> RunOrchestrator {
        RunOrchestrator::new(
            self.config.clone(),
            run_dir,
            self.tool.clone(),
            self.guard.clone(),
        )
        .with_spaces(self.runtime.hyperopt_spaces.clone())
    }

    /// 전체 워크포워드 실행.
    ///
    /// 치명적 오류는 실행 로그(파일 + 콘솔)에 기록된 뒤 반환됩니다.
    pub async fn run(&self) -> Result<RunReport> {
        let (run_dir, log) = match self.init(&self.config.run_tag()) {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(error = %e, "실행 초기화 실패");
                return Err(e);
            }
        };

        log.scope(async {
            let result = self.execute(run_dir).await;
            if let Err(e) = &result {
                error!(error = %e, "워크포워드 실행 중단");
            }
            result
        })
        .await
    }

    /// 단독 재최적화 실행 (오늘 기준 단일 윈도우).
    pub async fn re_optimise(&self) -> Result<RunReport> {
        let (run_dir, log) = match self.init(&self.config.re_optimise_tag()) {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(error = %e, "실행 초기화 실패");
                return Err(e);
            }
        };

        log.scope(async {
            let started = Instant::now();
            self.log_banner();
            let orchestrator = self.orchestrator(run_dir);
            let mut stats = RunStats::new();

            let result = self.re_optimise_window(&orchestrator, &mut stats).await;
            match result {
                Ok(outcome) => {
                    stats.elapsed = started.elapsed();
                    Self::transition(RunState::Done);
                    stats.log_summary("re-optimise");
                    Ok(RunReport {
                        run_dir: orchestrator.run_dir().path().to_path_buf(),
                        stages: Vec::new(),
                        equity: EquitySeries::from_records(&[], self.config.wallet),
                        pre_live: None,
                        re_optimise: Some(outcome),
                        stats,
                    })
                }
                Err(e) => {
                    error!(error = %e, "재최적화 실행 중단");
                    Err(e)
                }
            }
        })
        .await
    }

    fn log_banner(&self) {
        let config = &self.config;
        let is_start = config
            .in_sample_start()
            .map(format_date)
            .unwrap_or_else(|_| "?".to_string());
        let span_days = config
            .in_sample_start()
            .map(|start| (config.wf_finish - start).num_days())
            .unwrap_or_default();

        info!("워크포워드 실행 시작");
        info!(
            strategy = %config.strategy_path.join(&config.strategy).display(),
            config = %config.config_path.display(),
            loss_function = %config.loss_function,
            "전략 설정"
        );
        info!(
            time_frame = format!("{}-{}", is_start, format_date(config.wf_finish)),
            days = span_days,
            is_days = %config.in_sample,
            oos_days = config.out_sample_days,
            "기간 설정"
        );
        info!(
            workers = %config.workers,
            epochs = config.epochs,
            wallet = config.wallet,
            fee = config.fee,
            min_trades = config.min_trades,
            "자원 설정"
        );
    }

    async fn execute(&self, run_dir: RunDirectory) -> Result<RunReport> {
        let started = Instant::now();
        self.log_banner();

        Self::transition(RunState::Staging);
        let stages = StageGenerator::from_config(&self.config).generate()?;
        info!(stages = stages.len(), "워크포워드 단계 생성");

        let op_table = StageTable::open(run_dir.path(), BacktestPhase::OpBt, self.config.wallet);
        let wf_table = StageTable::open(run_dir.path(), BacktestPhase::WfBt, self.config.wallet);
        let op_done: HashSet<usize> = op_table.stage_ordinals()?.into_iter().collect();
        let wf_done: HashSet<usize> = wf_table.stage_ordinals()?.into_iter().collect();

        let combined_path = run_dir.combined_file();
        let orchestrator = self.orchestrator(run_dir);
        let mut stats = RunStats {
            stages_total: stages.len(),
            ..RunStats::default()
        };

        for stage in &stages {
            let ordinal = stage.ordinal;
            if op_done.contains(&ordinal) && wf_done.contains(&ordinal) {
                info!(stage = ordinal, "이미 완료된 단계, 건너뜀");
                stats.stages_skipped += 1;
                continue;
            }

            let stage_started = Instant::now();
            info!("{}", "-".repeat(79));
            info!(
                stage = ordinal,
                total = stages.len(),
                in_sample = %stage.in_sample,
                out_sample = %stage.out_sample,
                "워크포워드 단계 시작"
            );

            let stage_dir = orchestrator
                .run_dir()
                .stage_dir(&ordinal.to_string(), &stage.full_period())?;

            Self::transition(RunState::Optimizing(ordinal));
            let results = orchestrator.run_stage(stage, &stage_dir, &mut stats).await?;
            Self::transition(RunState::Validating(ordinal));
            info!(params = %results.params_file.display(), "단계 검증 완료");

            Self::transition(RunState::Aggregating(ordinal));
            if !op_done.contains(&ordinal) {
                op_table.append(
                    &results.op.summary,
                    ordinal,
                    &stage.in_sample,
                    stage.in_sample.days(),
                )?;
            }
            if !wf_done.contains(&ordinal) {
                let row = wf_table.append(
                    &results.wf.summary,
                    ordinal,
                    &stage.out_sample,
                    self.config.out_sample_days as i64,
                )?;
                info!(
                    stage = ordinal,
                    acc_start = format!("{:.2}", row.acc_start),
                    acc_finish = format!("{:.2}", row.acc_finish),
                    "누적 잔고 갱신"
                );
            }

            match self.combine(&op_table, &wf_table, &combined_path) {
                Ok(outcome) if outcome.is_complete(ordinal as i64) => {}
                Ok(_) => {
                    warn!(stage = ordinal, "비교 데이터 일부 생략 (패배 0회 또는 빈 기간)");
                    stats.aggregation_failures += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(stage = ordinal, error = %e, "비교 데이터 생성 생략");
                    stats.aggregation_failures += 1;
                }
            }

            stats.stages_completed += 1;
            info!(
                stage = ordinal,
                duration = %format_duration(stage_started.elapsed()),
                "워크포워드 단계 완료"
            );
        }

        let pre_live = if self.config.pre_live {
            Self::transition(RunState::PreLive);
            let window = self.config.trailing_window(self.config.wf_finish)?;
            info!(window = %window, "배포 후보 파라미터 최적화");
            Some(
                orchestrator
                    .run_single_window(
                        &window,
                        BacktestPhase::PreLive,
                        OptimisationKind::PreLive,
                        &mut stats,
                    )
                    .await?,
            )
        } else {
            None
        };

        let re_optimise = if self.config.re_optimise {
            Some(self.re_optimise_window(&orchestrator, &mut stats).await?)
        } else {
            None
        };

        Self::transition(RunState::Done);
        let equity = EquitySeries::from_records(&wf_table.load()?, self.config.wallet);
        equity.log_summary();
        stats.elapsed = started.elapsed();
        stats.log_summary("walk-forward");

        Ok(RunReport {
            run_dir: orchestrator.run_dir().path().to_path_buf(),
            stages,
            equity,
            pre_live,
            re_optimise,
            stats,
        })
    }

    fn combine(
        &self,
        op_table: &StageTable,
        wf_table: &StageTable,
        path: &Path,
    ) -> Result<CombineOutcome> {
        combine_phases(
            &op_table.load()?,
            &wf_table.load()?,
            self.config.out_sample_days,
            path,
        )
    }

    /// RE_OPTIMISE: 데이터 다운로드 후 오늘 기준 윈도우 최적화
    async fn re_optimise_window(
        &self,
        orchestrator: &RunOrchestrator,
        stats: &mut RunStats,
    ) -> Result<WindowOutcome> {
        Self::transition(RunState::ReOptimise);
        let download = DownloadParams {
            timeframes: self.config.download_timeframes.clone(),
            exchange: self.runtime.exchange.clone(),
            pairs: self.runtime.download_pairs.clone(),
            new_pairs_days: self.config.download_days,
        };
        orchestrator.download_data(&download, stats).await?;

        let window = self.config.trailing_window(self.today())?;
        info!(window = %window, "재최적화");
        orchestrator
            .run_single_window(
                &window,
                BacktestPhase::ReOptimise,
                OptimisationKind::ReOptimise,
                stats,
            )
            .await
    }
}
