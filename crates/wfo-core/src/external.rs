//! 외부 최적화기/백테스터 실행.
//!
//! 외부 도구는 설정 파일과 기간을 입력받아 결과 파일을 쓰는 불투명한 프로세스로 취급합니다.
//! [`ExternalTool`] trait이 호출 계약을 정의하고, [`FreqtradeCli`]가
//! `tokio::process`로 freqtrade CLI를 실행하는 구현체입니다.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
};
use tracing::{debug, info};

use crate::{
    allocator::WorkerCount,
    config::RuntimeConfig,
    error::{Result, WalkForwardError},
    stage::DateRange,
};

/// 외부 최적화기(hyperopt) 실행 파라미터.
#[derive(Debug, Clone)]
pub struct HyperoptParams {
    pub strategy: String,
    /// 고정 복사된 전략 파일이 위치한 디렉토리 (실행 디렉토리)
    pub strategy_path: PathBuf,
    pub config: PathBuf,
    pub workers: WorkerCount,
    pub epochs: u32,
    pub loss_function: String,
    pub fee: f64,
    pub timerange: DateRange,
    pub wallet: f64,
    pub min_trades: u32,
    pub spaces: Vec<String>,
    pub logfile: PathBuf,
}

impl HyperoptParams {
    /// CLI 인자 목록
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "hyperopt".to_string(),
            "--min-trades".to_string(),
            self.min_trades.to_string(),
            "-j".to_string(),
            self.workers.to_string(),
            "-e".to_string(),
            self.epochs.to_string(),
            "--spaces".to_string(),
        ];
        args.extend(self.spaces.iter().cloned());
        args.extend([
            "--fee".to_string(),
            self.fee.to_string(),
            "--logfile".to_string(),
            path_arg(&self.logfile),
            "--timerange".to_string(),
            self.timerange.to_string(),
            "--hyperopt-loss".to_string(),
            self.loss_function.clone(),
            "--strategy".to_string(),
            self.strategy.clone(),
            "--strategy-path".to_string(),
            path_arg(&self.strategy_path),
            "--config".to_string(),
            path_arg(&self.config),
            "--dry-run-wallet".to_string(),
            self.wallet.to_string(),
        ]);
        args
    }
}

/// 외부 백테스터 실행 파라미터.
#[derive(Debug, Clone)]
pub struct BacktestParams {
    pub strategy: String,
    pub strategy_path: PathBuf,
    pub config: PathBuf,
    pub timerange: DateRange,
    pub wallet: f64,
    pub fee: f64,
    pub logfile: PathBuf,
    /// 결과 아티팩트 경로 (백테스터가 타임스탬프 접미사를 붙일 수 있음)
    pub export_filename: PathBuf,
}

impl BacktestParams {
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "backtesting".to_string(),
            "--export".to_string(),
            "trades".to_string(),
            "--fee".to_string(),
            self.fee.to_string(),
            "--logfile".to_string(),
            path_arg(&self.logfile),
            "--timerange".to_string(),
            self.timerange.to_string(),
            "--strategy".to_string(),
            self.strategy.clone(),
            "--strategy-path".to_string(),
            path_arg(&self.strategy_path),
            "--config".to_string(),
            path_arg(&self.config),
            "--dry-run-wallet".to_string(),
            self.wallet.to_string(),
            "--export-filename".to_string(),
            path_arg(&self.export_filename),
        ]
    }
}

/// 시장 데이터 다운로드 파라미터.
#[derive(Debug, Clone)]
pub struct DownloadParams {
    pub timeframes: Vec<String>,
    pub exchange: String,
    pub pairs: String,
    pub new_pairs_days: u32,
}

impl DownloadParams {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["download-data".to_string(), "-t".to_string()];
        args.extend(self.timeframes.iter().cloned());
        args.extend([
            "--exchange".to_string(),
            self.exchange.clone(),
            "--pairs".to_string(),
            self.pairs.clone(),
            "--new-pairs-days".to_string(),
            self.new_pairs_days.to_string(),
            "--include-inactive-pairs".to_string(),
        ]);
        args
    }
}

/// 외부 도구 호출 계약.
///
/// 모든 메서드는 도구가 정상 종료하면 `Ok(())`를 반환하며,
/// 실행 불가 또는 비정상 종료는 [`WalkForwardError::ExternalTool`]로 보고합니다.
#[async_trait]
pub trait ExternalTool: Send + Sync {
    /// 최적화 실행. 최적 파라미터는 `{strategy_path}/{strategy}.json`에 기록됩니다.
    async fn hyperopt(&self, params: &HyperoptParams) -> Result<()>;

    /// 최근 최적화 결과 목록을 CSV로 내보내기
    async fn export_hyperopt_list(&self, csv_path: &Path) -> Result<()>;

    /// 백테스트 실행
    async fn backtest(&self, params: &BacktestParams) -> Result<()>;

    /// 시장 데이터 다운로드
    async fn download_data(&self, params: &DownloadParams) -> Result<()>;
}

/// 실패 시 오류에 포함할 stderr 마지막 줄 수
const STDERR_TAIL: usize = 5;

/// freqtrade CLI 프로세스 실행기.
///
/// stdout은 줄 단위로 `info` 로그에, stderr는 `debug` 로그에 전달합니다.
#[derive(Debug, Clone)]
pub struct FreqtradeCli {
    bin: String,
}

impl FreqtradeCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    pub fn from_runtime(runtime: &RuntimeConfig) -> Self {
        Self::new(runtime.freqtrade_bin.clone())
    }

    async fn run(&self, tool: &str, args: Vec<String>) -> Result<()> {
        debug!(tool = tool, bin = %self.bin, args = ?args, "외부 도구 실행");

        let mut child = Command::new(&self.bin)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                WalkForwardError::tool(tool, format!("{} 실행 실패: {}", self.bin, e))
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let forward = async {
            if let Some(stdout) = stdout {
                for_each_line(stdout, |line| info!(tool = tool, "{}", line)).await;
            }
        };
        let collect = async {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL);
            if let Some(stderr) = stderr {
                for_each_line(stderr, |line| {
                    debug!(tool = tool, "{}", line);
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                })
                .await;
            }
            tail
        };
        let ((), tail) = tokio::join!(forward, collect);

        let status = child
            .wait()
            .await
            .map_err(|e| WalkForwardError::tool(tool, format!("프로세스 대기 실패: {}", e)))?;
        if status.success() {
            info!(tool = tool, "외부 도구 완료");
            return Ok(());
        }

        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let tail: Vec<String> = tail.into_iter().collect();

        Err(WalkForwardError::tool(
            tool,
            format!("exit code {}: {}", code, tail.join(" | ")),
        ))
    }
}

/// 파이프를 끝까지 읽으며 비어 있지 않은 줄마다 `on_line` 호출 (UTF-8 손실 허용).
async fn for_each_line<R: AsyncRead + Unpin>(reader: R, mut on_line: impl FnMut(String)) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                if !line.is_empty() {
                    on_line(line.to_string());
                }
            }
        }
    }
}

#[async_trait]
impl ExternalTool for FreqtradeCli {
    async fn hyperopt(&self, params: &HyperoptParams) -> Result<()> {
        self.run("hyperopt", params.to_args()).await
    }

    async fn export_hyperopt_list(&self, csv_path: &Path) -> Result<()> {
        let args = vec![
            "hyperopt-list".to_string(),
            "--no-details".to_string(),
            "--export-csv".to_string(),
            path_arg(csv_path),
        ];
        self.run("hyperopt-list", args).await
    }

    async fn backtest(&self, params: &BacktestParams) -> Result<()> {
        self.run("backtesting", params.to_args()).await
    }

    async fn download_data(&self, params: &DownloadParams) -> Result<()> {
        self.run("download-data", params.to_args()).await
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
