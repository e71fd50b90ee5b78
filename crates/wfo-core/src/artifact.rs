//! 외부 도구 결과 아티팩트 처리.
//!
//! - 백테스트 결과 파일 탐색/파싱 (`strategy_comparison`, `results_per_pair`)
//! - 최적 파라미터 파일 복사 및 로깅
//! - 페어별 결과 CSV 저장

use std::{
    fmt,
    fs::File,
    path::{Path, PathBuf},
};

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, WalkForwardError};

/// 백테스트 실행 단계.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BacktestPhase {
    /// in-sample 검증 백테스트
    OpBt,
    /// out-of-sample 워크포워드 백테스트
    WfBt,
    /// 배포 후보 파라미터 검증
    PreLive,
    /// 단독 재최적화 검증
    ReOptimise,
}

impl BacktestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpBt => "op_bt",
            Self::WfBt => "wf_bt",
            Self::PreLive => "pre_live",
            Self::ReOptimise => "re_optimise",
        }
    }

    /// 결과 파일 접두사 (`{phase}_result`)
    pub fn result_prefix(&self) -> String {
        format!("{}_result", self.as_str())
    }
}

impl fmt::Display for BacktestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 백테스트 결과 요약 (`strategy_comparison` 항목).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    #[serde(default)]
    pub key: String,
    pub profit_mean: f64,
    pub profit_mean_pct: f64,
    #[serde(default)]
    pub profit_sum: f64,
    #[serde(default)]
    pub profit_sum_pct: f64,
    pub profit_total_abs: f64,
    pub profit_total_pct: f64,
    /// 비율 단위 총 수익 (0.1 = 10%)
    #[serde(default)]
    pub profit_total: f64,
    pub wins: u64,
    pub draws: u64,
    pub losses: u64,
    pub trades: u64,
    #[serde(default)]
    pub max_drawdown_abs: f64,
    /// 계좌 대비 최대 낙폭 (비율)
    #[serde(default)]
    pub max_drawdown_account: f64,
}

impl BacktestSummary {
    /// 결과 로그 출력 (잔고 변화, 연환산 수익률, 거래 통계, 최대 낙폭)
    pub fn log_result(&self, phase: BacktestPhase, wallet: f64, sample_days: i64) {
        let finish = wallet + self.profit_total_abs;
        let profit_pa = if sample_days > 0 {
            self.profit_total_pct / sample_days as f64 * 365.0
        } else {
            0.0
        };

        info!(
            phase = %phase,
            start = format!("{:.2}", wallet),
            finish = format!("{:.2}", finish),
            profit_pct = format!("{:.1}%", self.profit_total_pct),
            profit_pa = format!("{:.2}%", profit_pa),
            "백테스트 결과 - 잔고"
        );
        info!(
            phase = %phase,
            wins = self.wins,
            draws = self.draws,
            losses = self.losses,
            trades = self.trades,
            "백테스트 결과 - 거래"
        );
        info!(
            phase = %phase,
            mean_profit = format!("{:.2}", self.profit_mean),
            mean_profit_pct = format!("{:.2}%", self.profit_mean_pct),
            max_dd_pct = format!("{:.2}%", self.max_drawdown_account * 100.0),
            max_dd_abs = format!("{:.2}", self.max_drawdown_abs),
            "백테스트 결과 - 평균 수익/최대 낙폭"
        );
    }
}

/// 페어별 백테스트 결과 (`results_per_pair` 항목).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairResult {
    pub key: String,
    #[serde(default)]
    pub trades: u64,
    #[serde(default)]
    pub profit_mean: f64,
    #[serde(default)]
    pub profit_mean_pct: f64,
    #[serde(default)]
    pub profit_sum: f64,
    #[serde(default)]
    pub profit_sum_pct: f64,
    #[serde(default)]
    pub profit_total_abs: f64,
    #[serde(default)]
    pub profit_total: f64,
    #[serde(default)]
    pub profit_total_pct: f64,
    #[serde(default)]
    pub duration_avg: String,
    #[serde(default)]
    pub wins: u64,
    #[serde(default)]
    pub draws: u64,
    #[serde(default)]
    pub losses: u64,
}

/// 파싱된 백테스트 결과 파일.
#[derive(Debug, Clone)]
pub struct ResultArtifact {
    pub path: PathBuf,
    pub summary: BacktestSummary,
    pub pairs: Vec<PairResult>,
}

impl ResultArtifact {
    /// 단계 디렉토리에서 결과 파일을 찾아 파싱
    pub fn load(stage_dir: &Path, phase: BacktestPhase, strategy: &str) -> Result<Self> {
        let path = locate_result_artifact(stage_dir, phase)?;
        parse_result_artifact(&path, strategy)
    }

    /// 결과 파일 이름
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// 단계 디렉토리에서 `{phase}_result*.json` 결과 파일 탐색.
///
/// 백테스터가 파일명에 타임스탬프를 붙이는 경우가 있으므로 접두사로 찾으며,
/// `*.meta.json`은 제외합니다. 여러 개면 이름순 마지막 파일(가장 최근)을 사용합니다.
pub fn locate_result_artifact(stage_dir: &Path, phase: BacktestPhase) -> Result<PathBuf> {
    let prefix = phase.result_prefix();
    let mut candidates = Vec::new();

    for entry in std::fs::read_dir(stage_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) && name.ends_with(".json") && !name.ends_with(".meta.json") {
            candidates.push(entry.path());
        }
    }

    candidates.sort();
    candidates.pop().ok_or_else(|| {
        WalkForwardError::artifact(
            stage_dir,
            format!("{}*.json 결과 파일을 찾을 수 없습니다", prefix),
        )
    })
}

/// 백테스트 결과 파일 파싱.
///
/// 요약은 `strategy_comparison`의 첫 항목, 페어별 결과는
/// `strategy.{strategy}.results_per_pair`에서 읽습니다 (페어별 결과는 없어도 허용).
pub fn parse_result_artifact(path: &Path, strategy: &str) -> Result<ResultArtifact> {
    let content = std::fs::read_to_string(path)?;
    let data: Value = serde_json::from_str(&content)
        .map_err(|e| WalkForwardError::artifact(path, format!("JSON 파싱 실패: {}", e)))?;

    let first = data
        .get("strategy_comparison")
        .and_then(Value::as_array)
        .and_then(|entries| entries.first())
        .cloned()
        .ok_or_else(|| WalkForwardError::artifact(path, "strategy_comparison 항목이 없습니다"))?;
    let summary: BacktestSummary = serde_json::from_value(first)
        .map_err(|e| WalkForwardError::artifact(path, format!("요약 형식 오류: {}", e)))?;

    let pairs = match data
        .get("strategy")
        .and_then(|s| s.get(strategy))
        .and_then(|s| s.get("results_per_pair"))
    {
        Some(per_pair) => serde_json::from_value(per_pair.clone())
            .map_err(|e| WalkForwardError::artifact(path, format!("페어별 결과 형식 오류: {}", e)))?,
        None => {
            debug!(path = %path.display(), strategy = strategy, "페어별 결과 없음");
            Vec::new()
        }
    };

    Ok(ResultArtifact {
        path: path.to_path_buf(),
        summary,
        pairs,
    })
}

/// 페어별 결과를 CSV로 저장 (`{stage_dir}/{phase}_bt_results.csv`).
pub fn write_pair_results(pairs: &[PairResult], path: &Path) -> Result<()> {
    let mut df = df!(
        "key" => pairs.iter().map(|p| p.key.as_str()).collect::<Vec<_>>(),
        "trades" => pairs.iter().map(|p| p.trades).collect::<Vec<_>>(),
        "profit_mean" => pairs.iter().map(|p| p.profit_mean).collect::<Vec<_>>(),
        "profit_mean_pct" => pairs.iter().map(|p| p.profit_mean_pct).collect::<Vec<_>>(),
        "profit_sum" => pairs.iter().map(|p| p.profit_sum).collect::<Vec<_>>(),
        "profit_sum_pct" => pairs.iter().map(|p| p.profit_sum_pct).collect::<Vec<_>>(),
        "profit_total_abs" => pairs.iter().map(|p| p.profit_total_abs).collect::<Vec<_>>(),
        "profit_total" => pairs.iter().map(|p| p.profit_total).collect::<Vec<_>>(),
        "profit_total_pct" => pairs.iter().map(|p| p.profit_total_pct).collect::<Vec<_>>(),
        "duration_avg" => pairs.iter().map(|p| p.duration_avg.as_str()).collect::<Vec<_>>(),
        "wins" => pairs.iter().map(|p| p.wins).collect::<Vec<_>>(),
        "draws" => pairs.iter().map(|p| p.draws).collect::<Vec<_>>(),
        "losses" => pairs.iter().map(|p| p.losses).collect::<Vec<_>>()
    )?;

    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    Ok(())
}

/// 최적 파라미터 파일 경로 (`{run_dir}/{strategy}.json`)
pub fn best_params_path(run_dir: &Path, strategy: &str) -> PathBuf {
    run_dir.join(format!("{}.json", strategy))
}

/// 최적 파라미터 파일을 단계 디렉토리로 복사 (`op_result.json`).
pub fn copy_best_params(run_dir: &Path, strategy: &str, stage_dir: &Path) -> Result<PathBuf> {
    let src = best_params_path(run_dir, strategy);
    let dst = stage_dir.join("op_result.json");
    std::fs::copy(&src, &dst).map_err(|e| {
        WalkForwardError::artifact(&src, format!("최적 파라미터 파일 복사 실패: {}", e))
    })?;
    Ok(dst)
}

/// 최적 파라미터 읽기.
///
/// 반환값은 (파라미터 공간, 이름, 값) 목록이며 `buy` 공간이 먼저 옵니다.
pub fn read_best_params(path: &Path) -> Result<Vec<(String, String, Value)>> {
    let content = std::fs::read_to_string(path)?;
    let data: Value = serde_json::from_str(&content)
        .map_err(|e| WalkForwardError::artifact(path, format!("JSON 파싱 실패: {}", e)))?;
    let spaces = data
        .get("params")
        .and_then(Value::as_object)
        .ok_or_else(|| WalkForwardError::artifact(path, "params 항목이 없습니다"))?;

    let mut ordered: Vec<(&String, &Value)> = spaces.iter().collect();
    ordered.sort_by_key(|(space, _)| *space != "buy");

    let mut params = Vec::new();
    for (space, values) in ordered {
        if let Some(values) = values.as_object() {
            for (name, value) in values {
                params.push((space.clone(), name.clone(), value.clone()));
            }
        }
    }
    Ok(params)
}

/// 최적 파라미터 로그 출력
pub fn log_best_params(params: &[(String, String, Value)]) {
    for (space, name, value) in params {
        info!(space = %space, "최적화 결과: {}: {}", name, value);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;

    /// 백테스터 결과 파일 형식의 JSON 생성
    pub(crate) fn result_json(strategy: &str, profit_total_pct: f64, wallet: f64) -> Value {
        json!({
            "strategy": {
                (strategy): {
                    "results_per_pair": [
                        {"key": "BTC/USDT", "trades": 60, "profit_mean": 0.01, "profit_mean_pct": 1.0,
                         "profit_sum": 0.6, "profit_sum_pct": 60.0, "profit_total_abs": 12.5,
                         "profit_total": 0.005, "profit_total_pct": 0.5, "duration_avg": "1:00:00",
                         "wins": 40, "draws": 5, "losses": 15},
                        {"key": "TOTAL", "trades": 120, "profit_mean": 0.01, "profit_mean_pct": 1.0,
                         "profit_sum": 1.2, "profit_sum_pct": 120.0, "profit_total_abs": 25.0,
                         "profit_total": 0.01, "profit_total_pct": 1.0, "duration_avg": "1:00:00",
                         "wins": 80, "draws": 10, "losses": 30}
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
                "profit_total_abs": wallet * profit_total_pct / 100.0,
                "profit_total": profit_total_pct / 100.0,
                "profit_total_pct": profit_total_pct,
                "wins": 80,
                "draws": 10,
                "losses": 30,
                "max_drawdown_abs": 125.0,
                "max_drawdown_account": 0.05
            }]
        })
    }

    #[test]
    fn test_locate_skips_meta_and_picks_latest() {
        let dir = tempfile::tempdir().unwrap();
        let stage = dir.path();
        std::fs::write(stage.join("op_bt_result-2024-01-01_10-00-00.json"), "{}").unwrap();
        std::fs::write(stage.join("op_bt_result-2024-01-02_10-00-00.json"), "{}").unwrap();
        std::fs::write(stage.join("op_bt_result-2024-01-03_10-00-00.meta.json"), "{}").unwrap();
        std::fs::write(stage.join("wf_bt_result.json"), "{}").unwrap();

        let found = locate_result_artifact(stage, BacktestPhase::OpBt).unwrap();
        assert!(found.ends_with("op_bt_result-2024-01-02_10-00-00.json"));

        let found = locate_result_artifact(stage, BacktestPhase::WfBt).unwrap();
        assert!(found.ends_with("wf_bt_result.json"));

        let err = locate_result_artifact(stage, BacktestPhase::PreLive).unwrap_err();
        assert!(matches!(err, WalkForwardError::Artifact { .. }));
    }

    #[test]
    fn test_parse_result_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf_bt_result.json");
        std::fs::write(&path, result_json("SampleStrategy", 10.0, 2500.0).to_string()).unwrap();

        let artifact = parse_result_artifact(&path, "SampleStrategy").unwrap();
        assert_eq!(artifact.summary.profit_total_pct, 10.0);
        assert_eq!(artifact.summary.profit_total_abs, 250.0);
        assert_eq!(artifact.summary.trades, 120);
        assert_eq!(artifact.pairs.len(), 2);
        assert_eq!(artifact.pairs[0].key, "BTC/USDT");
        assert_eq!(artifact.file_name(), "wf_bt_result.json");

        // 다른 전략 이름이면 페어별 결과만 비어 있음
        let artifact = parse_result_artifact(&path, "Other").unwrap();
        assert!(artifact.pairs.is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_comparison() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("op_bt_result.json");
        std::fs::write(&path, r#"{"strategy_comparison": []}"#).unwrap();

        let err = parse_result_artifact(&path, "SampleStrategy").unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, WalkForwardError::Artifact { .. }));
    }

    #[test]
    fn test_write_pair_results_csv() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("op_bt_result.json");
        std::fs::write(&json_path, result_json("S", 5.0, 1000.0).to_string()).unwrap();
        let artifact = parse_result_artifact(&json_path, "S").unwrap();

        let csv_path = dir.path().join("op_bt_bt_results.csv");
        write_pair_results(&artifact.pairs, &csv_path).unwrap();

        let content = std::fs::read_to_string(&csv_path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("key,trades,profit_mean"));
        assert!(lines.next().unwrap().starts_with("BTC/USDT,60,"));
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_best_params_copy_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path();
        let stage_dir = run_dir.join("stage_1");
        std::fs::create_dir_all(&stage_dir).unwrap();
        std::fs::write(
            best_params_path(run_dir, "S"),
            json!({
                "strategy_name": "S",
                "params": {
                    "roi": {"0": 0.1},
                    "buy": {"rsi_buy": 30, "ema_fast": 12}
                }
            })
            .to_string(),
        )
        .unwrap();

        let copied = copy_best_params(run_dir, "S", &stage_dir).unwrap();
        assert!(copied.ends_with("op_result.json"));

        let params = read_best_params(&copied).unwrap();
        assert_eq!(params.len(), 3);
        assert!(params[..2].iter().all(|(space, _, _)| space == "buy"));
        assert_eq!(params[2].0, "roi");
    }

    #[test]
    fn test_copy_best_params_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = copy_best_params(dir.path(), "Missing", dir.path()).unwrap_err();
        assert!(matches!(err, WalkForwardError::Artifact { .. }));
    }
}
