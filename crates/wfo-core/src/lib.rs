//! 워크포워드 최적화 오케스트레이터.
//!
//! 과거 기간을 in-sample/out-of-sample 윈도우로 나누고, 각 윈도우마다 외부
//! 최적화기와 백테스터(freqtrade)를 실행한 뒤, 결과를 복리 잔고 테이블로 누적합니다.
//!
//! # 구성 요소
//!
//! - [`connectivity`]: 외부 호출 전 연결 확인 가드
//! - [`allocator`]: 윈도우 길이/시점 기반 워커·epoch 할당
//! - [`stage`]: 단계 윈도우 생성
//! - [`orchestrator`]: 단계별 최적화/검증 실행
//! - [`table`]: 결과 누적 테이블, 잔고 시계열, 단계 간 비교 데이터
//! - [`controller`]: 전체 실행 상태 머신 (pre-live, 재최적화, 재개 포함)

pub mod allocator;
pub mod artifact;
pub mod config;
pub mod connectivity;
pub mod controller;
pub mod error;
pub mod external;
pub mod orchestrator;
pub mod rundir;
pub mod runlog;
pub mod stage;
pub mod stats;
pub mod table;

pub use allocator::{OptimisationKind, ResourceAllocator, ThresholdTable, WorkerCount};
pub use artifact::{BacktestPhase, BacktestSummary, PairResult, ResultArtifact};
pub use config::{InSampleWindow, RunConfig, RuntimeConfig, SweepPlan};
pub use connectivity::{ConnectivityGuard, HttpProbe, ReachabilityProbe};
pub use controller::{RunReport, RunState, WalkForwardController};
pub use error::{Result, WalkForwardError};
pub use external::{BacktestParams, DownloadParams, ExternalTool, FreqtradeCli, HyperoptParams};
pub use orchestrator::{RunOrchestrator, StageResults, WindowOutcome};
pub use rundir::RunDirectory;
pub use runlog::RunLog;
pub use stage::{DateRange, Stage, StageGenerator};
pub use stats::RunStats;
pub use table::{combine_phases, CombineOutcome, EquitySeries, StageRecord, StageTable};
