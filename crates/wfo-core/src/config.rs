//! 실행 설정 모듈.
//!
//! - [`RunConfig`]: 한 번의 워크포워드 실행 파라미터 (실행 시작 시 1회 생성, 이후 불변)
//! - [`RuntimeConfig`]: 환경변수 기반 실행 환경 설정 (외부 도구 경로, 연결 확인 대상 등)
//! - [`SweepPlan`]: 여러 실행을 순차 수행하는 TOML 계획 파일

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    allocator::WorkerCount,
    error::{Result, WalkForwardError},
    stage::{compact_date, sub_days, DateRange},
};

/// 기본 시작 지갑 잔고
pub const DEFAULT_WALLET: f64 = 2500.0;
/// 기본 거래 수수료율
pub const DEFAULT_FEE: f64 = 0.002;
/// 기본 최소 거래 수
pub const DEFAULT_MIN_TRADES: u32 = 100;
/// 재최적화 전 다운로드 기간 (일)
pub const DEFAULT_DOWNLOAD_DAYS: u32 = 4000;
/// in-sample / out-of-sample 윈도우 최대 길이 (일)
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// In-sample 윈도우 길이.
///
/// 고정 일수(rolling) 또는 고정 시작점에서 늘어나는 anchored 모드.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "InSampleRepr", into = "String")]
pub enum InSampleWindow {
    /// 고정 길이 (일)
    Days(u32),
    /// 고정 시작점 (윈도우가 단계마다 늘어남)
    Anchored,
}

impl InSampleWindow {
    pub fn is_anchored(&self) -> bool {
        matches!(self, Self::Anchored)
    }
}

impl fmt::Display for InSampleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Days(days) => write!(f, "{}", days),
            Self::Anchored => write!(f, "anchored"),
        }
    }
}

impl FromStr for InSampleWindow {
    type Err = WalkForwardError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("anchored") {
            return Ok(Self::Anchored);
        }
        match s.parse::<u32>() {
            Ok(days) if days > 0 => Ok(Self::Days(days)),
            _ => Err(WalkForwardError::Config(format!(
                "in-sample 값은 양의 정수 또는 \"anchored\"여야 합니다: {}",
                s
            ))),
        }
    }
}

impl From<InSampleWindow> for String {
    fn from(window: InSampleWindow) -> Self {
        window.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InSampleRepr {
    Days(u32),
    Text(String),
}

impl TryFrom<InSampleRepr> for InSampleWindow {
    type Error = WalkForwardError;

    fn try_from(repr: InSampleRepr) -> Result<Self> {
        match repr {
            InSampleRepr::Days(0) => Err(WalkForwardError::Config(
                "in-sample 일수는 0보다 커야 합니다".to_string(),
            )),
            InSampleRepr::Days(days) => Ok(Self::Days(days)),
            InSampleRepr::Text(text) => text.parse(),
        }
    }
}

/// 워크포워드 실행 파라미터.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// 전략 이름 (`{strategy_path}/{strategy}.py`)
    pub strategy: String,
    /// 전략 파일이 위치한 디렉토리
    pub strategy_path: PathBuf,
    /// 외부 도구 설정 파일 (JSON)
    pub config_path: PathBuf,
    /// 실행 디렉토리들이 생성될 루트
    pub output_root: PathBuf,
    /// 첫 out-of-sample 구간 시작일
    #[serde(with = "compact_date")]
    pub wf_start: NaiveDate,
    /// 워크포워드 종료일
    #[serde(with = "compact_date")]
    pub wf_finish: NaiveDate,
    /// anchored 모드의 in-sample 고정 시작일
    #[serde(
        default,
        with = "compact_date::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub anchored_start: Option<NaiveDate>,
    /// in-sample 윈도우 길이
    pub in_sample: InSampleWindow,
    /// out-of-sample 윈도우 길이 (일)
    pub out_sample_days: u32,
    /// 최적화 최소 거래 수
    #[serde(default = "default_min_trades")]
    pub min_trades: u32,
    /// 손실 함수 식별자 (예: SharpeHyperOptLoss)
    pub loss_function: String,
    /// 기본 epoch 수
    pub epochs: u32,
    /// 기본 워커 수 (음수: 전체 코어 - N)
    pub workers: WorkerCount,
    /// 시작 지갑 잔고
    #[serde(default = "default_wallet")]
    pub wallet: f64,
    /// 거래 수수료율
    #[serde(default = "default_fee")]
    pub fee: f64,
    /// 마지막 in-sample 구간 추가 최적화 (배포 후보 파라미터)
    #[serde(default)]
    pub pre_live: bool,
    /// 실행 종료 후 단일 윈도우 재최적화
    #[serde(default)]
    pub re_optimise: bool,
    /// 재최적화 전 다운로드할 타임프레임
    #[serde(default = "default_download_timeframes")]
    pub download_timeframes: Vec<String>,
    /// 재최적화 전 다운로드 기간 (일)
    #[serde(default = "default_download_days")]
    pub download_days: u32,
}

fn default_min_trades() -> u32 {
    DEFAULT_MIN_TRADES
}

fn default_wallet() -> f64 {
    DEFAULT_WALLET
}

fn default_fee() -> f64 {
    DEFAULT_FEE
}

fn default_download_timeframes() -> Vec<String> {
    vec!["5m".to_string(), "1h".to_string(), "1d".to_string()]
}

fn default_download_days() -> u32 {
    DEFAULT_DOWNLOAD_DAYS
}

impl RunConfig {
    /// 파라미터 검증.
    pub fn validate(&self) -> Result<()> {
        if self.strategy.trim().is_empty() {
            return Err(WalkForwardError::Config("전략 이름이 비어 있습니다".to_string()));
        }
        if self.out_sample_days == 0 {
            return Err(WalkForwardError::Config(
                "out-of-sample 일수는 0보다 커야 합니다".to_string(),
            ));
        }
        if self.out_sample_days > MAX_WINDOW_DAYS {
            return Err(WalkForwardError::Config(format!(
                "out-of-sample 일수가 최대값({})을 넘습니다: {}",
                MAX_WINDOW_DAYS, self.out_sample_days
            )));
        }
        if let InSampleWindow::Days(days) = self.in_sample {
            if days > MAX_WINDOW_DAYS {
                return Err(WalkForwardError::Config(format!(
                    "in-sample 일수가 최대값({})을 넘습니다: {}",
                    MAX_WINDOW_DAYS, days
                )));
            }
        }
        if self.epochs == 0 {
            return Err(WalkForwardError::Config("epoch 수는 0보다 커야 합니다".to_string()));
        }
        if self.wf_finish < self.wf_start {
            return Err(WalkForwardError::Config(format!(
                "종료일({})이 시작일({})보다 앞섭니다",
                self.wf_finish, self.wf_start
            )));
        }
        if !(self.wallet.is_finite() && self.wallet > 0.0) {
            return Err(WalkForwardError::Config(format!(
                "시작 잔고가 올바르지 않습니다: {}",
                self.wallet
            )));
        }
        if self.in_sample.is_anchored() {
            match self.anchored_start {
                Some(anchor) if anchor < self.wf_start => {}
                Some(anchor) => {
                    return Err(WalkForwardError::Config(format!(
                        "anchored 시작일({})은 워크포워드 시작일({})보다 앞서야 합니다",
                        anchor, self.wf_start
                    )))
                }
                None => {
                    return Err(WalkForwardError::Config(
                        "anchored 모드에는 anchored_start가 필요합니다".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// 첫 단계의 in-sample 시작일.
    pub fn in_sample_start(&self) -> Result<NaiveDate> {
        match self.in_sample {
            InSampleWindow::Days(days) => sub_days(self.wf_start, days),
            InSampleWindow::Anchored => self.anchored_start.ok_or_else(|| {
                WalkForwardError::Config("anchored 모드에는 anchored_start가 필요합니다".to_string())
            }),
        }
    }

    /// `end`에서 끝나는 단일 in-sample 윈도우 (pre-live, 재최적화용).
    pub fn trailing_window(&self, end: NaiveDate) -> Result<DateRange> {
        let start = match self.in_sample {
            InSampleWindow::Days(days) => sub_days(end, days)?,
            InSampleWindow::Anchored => self.in_sample_start()?,
        };
        DateRange::new(start, end)
    }

    /// 재개 시 고정된 설정과 달라지면 안 되는 항목 중 다른 항목 이름.
    ///
    /// 단계 구성, 백테스트 결과, 복리 체인에 영향을 주는 값만 비교합니다.
    pub fn resume_conflicts(&self, frozen: &RunConfig) -> Vec<&'static str> {
        let checks = [
            ("strategy", self.strategy == frozen.strategy),
            ("wf_start", self.wf_start == frozen.wf_start),
            ("wf_finish", self.wf_finish == frozen.wf_finish),
            ("anchored_start", self.anchored_start == frozen.anchored_start),
            ("in_sample", self.in_sample == frozen.in_sample),
            ("out_sample_days", self.out_sample_days == frozen.out_sample_days),
            ("min_trades", self.min_trades == frozen.min_trades),
            ("loss_function", self.loss_function == frozen.loss_function),
            ("wallet", self.wallet == frozen.wallet),
            ("fee", self.fee == frozen.fee),
        ];
        checks
            .into_iter()
            .filter(|(_, same)| !same)
            .map(|(name, _)| name)
            .collect()
    }

    /// 워크포워드 실행 디렉토리 이름의 태그 부분.
    pub fn run_tag(&self) -> String {
        format!(
            "{}_in_{}_out_{}",
            self.loss_function, self.in_sample, self.out_sample_days
        )
    }

    /// 단독 재최적화 실행 디렉토리 이름의 태그 부분.
    pub fn re_optimise_tag(&self) -> String {
        format!("{}_re-optimise_{}", self.loss_function, self.in_sample)
    }
}

/// 환경변수 기반 실행 환경 설정.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// 외부 최적화기/백테스터 실행 파일
    pub freqtrade_bin: String,
    /// 연결 확인 대상 URL
    pub probe_url: String,
    /// 연결 확인 타임아웃 (밀리초)
    pub probe_timeout_ms: u64,
    /// 연결 실패 시 재확인 간격 (초)
    pub retry_interval_secs: u64,
    /// 데이터 다운로드 거래소
    pub exchange: String,
    /// 데이터 다운로드 페어 정규식
    pub download_pairs: String,
    /// 최적화 파라미터 공간
    pub hyperopt_spaces: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            freqtrade_bin: "freqtrade".to_string(),
            probe_url: "https://www.google.com".to_string(),
            probe_timeout_ms: 1000,
            retry_interval_secs: 2,
            exchange: "binance".to_string(),
            download_pairs: ".*/USDT".to_string(),
            hyperopt_spaces: vec!["buy".to_string()],
        }
    }
}

impl RuntimeConfig {
    /// 환경변수에서 설정 로드 (`.env` 파일 포함)
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            freqtrade_bin: std::env::var("FREQTRADE_BIN").unwrap_or(defaults.freqtrade_bin),
            probe_url: std::env::var("WFO_PROBE_URL").unwrap_or(defaults.probe_url),
            probe_timeout_ms: env_var_parse("WFO_PROBE_TIMEOUT_MS", defaults.probe_timeout_ms),
            retry_interval_secs: env_var_parse(
                "WFO_RETRY_INTERVAL_SECS",
                defaults.retry_interval_secs,
            ),
            exchange: std::env::var("WFO_EXCHANGE").unwrap_or(defaults.exchange),
            download_pairs: std::env::var("WFO_DOWNLOAD_PAIRS").unwrap_or(defaults.download_pairs),
            hyperopt_spaces: env_var_list_or_default("WFO_HYPEROPT_SPACES", defaults.hyperopt_spaces),
        }
    }

    /// 연결 확인 타임아웃을 Duration으로 반환
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// 재확인 간격을 Duration으로 반환
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

/// 여러 워크포워드 실행 계획.
///
/// `[defaults]` 테이블의 값이 각 `[[runs]]` 항목에 먼저 적용되고,
/// 항목에 지정된 값이 우선합니다.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepPlan {
    #[serde(default)]
    pub defaults: toml::Table,
    #[serde(default)]
    pub runs: Vec<toml::Table>,
}

impl SweepPlan {
    /// TOML 문자열 파싱
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| WalkForwardError::Config(format!("계획 파일 파싱 실패: {}", e)))
    }

    /// 계획 파일 로드
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// 각 실행의 설정 생성 (검증 포함)
    pub fn run_configs(&self) -> Result<Vec<RunConfig>> {
        self.runs
            .iter()
            .enumerate()
            .map(|(idx, overrides)| {
                let mut merged = self.defaults.clone();
                merged.extend(overrides.clone());
                let config: RunConfig = toml::Value::Table(merged).try_into().map_err(|e| {
                    WalkForwardError::Config(format!("runs[{}] 설정 오류: {}", idx, e))
                })?;
                config.validate()?;
                Ok(config)
            })
            .collect()
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 공백/쉼표로 구분된 리스트 파싱 (기본값 지원)
fn env_var_list_or_default(key: &str, default: Vec<String>) -> Vec<String> {
    std::env::var(key)
        .map(|v| {
            v.split([',', ' '])
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or(default)
}
