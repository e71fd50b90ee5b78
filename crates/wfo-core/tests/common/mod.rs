//! 통합 테스트 공용 헬퍼.
//!
//! 실제 freqtrade 대신 같은 형식의 결과 파일을 쓰는 가짜 외부 도구를 제공합니다.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use wfo_core::{
    BacktestParams, ConnectivityGuard, DownloadParams, ExternalTool, HyperoptParams,
    InSampleWindow, ReachabilityProbe, Result, RunConfig, WalkForwardError, WorkerCount,
};

// ============================================================================
// 가짜 외부 도구
// ============================================================================

/// 기록된 외부 도구 호출
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Hyperopt {
        timerange: String,
        workers: i32,
        epochs: u32,
    },
    HyperoptList(PathBuf),
    Backtest {
        timerange: String,
        wallet: f64,
    },
    Download(Vec<String>),
}

/// freqtrade 형식의 아티팩트를 쓰는 가짜 도구.
#[derive(Default)]
pub struct FakeFreqtrade {
    /// timerange → profit_total_pct (없으면 1.0%)
    profits: HashMap<String, f64>,
    /// timerange → 패배 거래 수 (없으면 30)
    losses: HashMap<String, i64>,
    /// 이 timerange의 백테스트는 실패
    fail_backtest: Option<String>,
    pub calls: Mutex<Vec<Call>>,
}

impl FakeFreqtrade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profit(mut self, timerange: &str, pct: f64) -> Self {
        self.profits.insert(timerange.to_string(), pct);
        self
    }

    pub fn with_losses(mut self, timerange: &str, losses: i64) -> Self {
        self.losses.insert(timerange.to_string(), losses);
        self
    }

    pub fn failing_backtest(mut self, timerange: &str) -> Self {
        self.fail_backtest = Some(timerange.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn hyperopt_calls(&self) -> Vec<(String, i32, u32)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Hyperopt {
                    timerange,
                    workers,
                    epochs,
                } => Some((timerange, workers, epochs)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ExternalTool for FakeFreqtrade {
    async fn hyperopt(&self, params: &HyperoptParams) -> Result<()> {
        self.record(Call::Hyperopt {
            timerange: params.timerange.to_string(),
            workers: params.workers.0,
            epochs: params.epochs,
        });
        let best = json!({
            "strategy_name": params.strategy,
            "params": {
                "buy": {"rsi_buy": 30, "ema_fast": 12},
                "roi": {"0": 0.1}
            }
        });
        std::fs::write(
            params.strategy_path.join(format!("{}.json", params.strategy)),
            best.to_string(),
        )?;
        Ok(())
    }

    async fn export_hyperopt_list(&self, csv_path: &Path) -> Result<()> {
        self.record(Call::HyperoptList(csv_path.to_path_buf()));
        std::fs::write(csv_path, "Best,Epoch,Trades\n*,1/100,120\n")?;
        Ok(())
    }

    async fn backtest(&self, params: &BacktestParams) -> Result<()> {
        let timerange = params.timerange.to_string();
        self.record(Call::Backtest {
            timerange: timerange.clone(),
            wallet: params.wallet,
        });
        if self.fail_backtest.as_deref() == Some(timerange.as_str()) {
            return Err(WalkForwardError::tool("backtesting", "exit code 2"));
        }

        let pct = self.profits.get(&timerange).copied().unwrap_or(1.0);
        let losses = self.losses.get(&timerange).copied().unwrap_or(30);
        let strategy = params.strategy.clone();
        let result = json!({
            "strategy": {
                (strategy.clone()): {
                    "results_per_pair": [
                        {"key": "BTC/USDT", "trades": 120, "profit_mean": 0.01, "profit_mean_pct": 1.0,
                         "profit_sum": 1.2, "profit_sum_pct": 120.0,
                         "profit_total_abs": params.wallet * pct / 100.0,
                         "profit_total": pct / 100.0, "profit_total_pct": pct,
                         "duration_avg": "2:00:00", "wins": 80, "draws": 10, "losses": losses}
                    ]
                }
            },
            "strategy_comparison": [{
                "key": strategy,
                "trades": 120,
                "profit_mean": 0.01,
                "profit_mean_pct": 1.0,
                "profit_sum": 1.2,
                "profit_sum_pct": 120.0,
                "profit_total_abs": params.wallet * pct / 100.0,
                "profit_total": pct / 100.0,
                "profit_total_pct": pct,
                "wins": 80,
                "draws": 10,
                "losses": losses,
                "max_drawdown_abs": 50.0,
                "max_drawdown_account": 0.02
            }]
        });

        // 실제 백테스터처럼 타임스탬프 접미사를 붙이고 meta 파일도 함께 씀
        let stem = params
            .export_filename
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = params
            .export_filename
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        std::fs::write(
            dir.join(format!("{}-2024-01-01_00-00-00.json", stem)),
            result.to_string(),
        )?;
        std::fs::write(
            dir.join(format!("{}-2024-01-01_00-00-00.meta.json", stem)),
            "{}",
        )?;
        Ok(())
    }

    async fn download_data(&self, params: &DownloadParams) -> Result<()> {
        self.record(Call::Download(params.timeframes.clone()));
        Ok(())
    }
}

// ============================================================================
// 연결 확인
// ============================================================================

/// 항상 연결된 probe
pub struct Online;

#[async_trait]
impl ReachabilityProbe for Online {
    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

/// 처음 N번 실패하는 probe
pub struct OfflineFor {
    remaining: AtomicU32,
}

impl OfflineFor {
    pub fn new(failures: u32) -> Self {
        Self {
            remaining: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl ReachabilityProbe for OfflineFor {
    async fn probe(&self) -> Result<()> {
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            return Ok(());
        }
        self.remaining.store(left - 1, Ordering::SeqCst);
        Err(WalkForwardError::Connectivity("offline".to_string()))
    }
}

pub fn online_guard() -> ConnectivityGuard {
    ConnectivityGuard::new(Arc::new(Online), Duration::from_secs(2))
}

// ============================================================================
// 설정 픽스처
// ============================================================================

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 임시 디렉토리에 전략/설정 파일을 만들고 실행 설정 반환
pub fn fixture_config(root: &Path) -> RunConfig {
    let strategies = root.join("strategies");
    std::fs::create_dir_all(&strategies).unwrap();
    std::fs::write(strategies.join("SampleStrategy.py"), "class SampleStrategy: pass\n").unwrap();
    std::fs::write(strategies.join("config_wf.json"), "{\"stake_currency\": \"USDT\"}").unwrap();

    RunConfig {
        strategy: "SampleStrategy".to_string(),
        strategy_path: strategies.clone(),
        config_path: strategies.join("config_wf.json"),
        output_root: root.join("walk_forward"),
        wf_start: date(2020, 1, 1),
        wf_finish: date(2020, 4, 1),
        anchored_start: None,
        in_sample: InSampleWindow::Days(60),
        out_sample_days: 30,
        min_trades: 100,
        loss_function: "SharpeHyperOptLoss".to_string(),
        epochs: 100,
        workers: WorkerCount(-15),
        wallet: 2500.0,
        fee: 0.002,
        pre_live: false,
        re_optimise: false,
        download_timeframes: vec!["5m".to_string(), "1h".to_string(), "1d".to_string()],
        download_days: 4000,
    }
}
