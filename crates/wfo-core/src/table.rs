//! 단계 결과 누적 테이블.
//!
//! 단계(`op_bt`, `wf_bt`)마다 하나의 테이블을 실행 디렉토리에 유지합니다.
//!
//! - `{phase}.parquet`: 영속 테이블 (읽기-추가-쓰기 단위로 교체)
//! - `{phase}.csv`: 매 갱신 후 내보내는 스냅샷
//!
//! 복리 계산은 [`StageRecord::compound`] 한 곳에서만 수행되며, `acc-start`는 항상
//! 디스크에서 다시 읽은 직전 행의 `acc-finish`에서 가져옵니다.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    artifact::{BacktestPhase, BacktestSummary},
    error::{Result, WalkForwardError},
    stage::DateRange,
};

/// 누적 테이블의 한 행.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub profit_mean: f64,
    pub profit_mean_pct: f64,
    pub profit_sum: f64,
    pub profit_sum_pct: f64,
    pub profit_total_abs: f64,
    pub profit_total_pct: f64,
    pub profit_total: f64,
    pub wins: i64,
    pub draws: i64,
    pub losses: i64,
    pub trades: i64,
    pub max_drawdown_abs: f64,
    pub max_drawdown_account: f64,
    /// 단계 순번 (`wf-stage`)
    pub wf_stage: i64,
    /// 백테스트 기간 (`YYYYMMDD-YYYYMMDD`)
    pub bt_time_period: String,
    /// 고정 시작 잔고
    pub start_balance: f64,
    pub final_balance: f64,
    /// 연환산 수익률 (`%_profit_pa`)
    pub profit_pa_pct: f64,
    pub acc_start: f64,
    pub acc_finish: f64,
}

impl StageRecord {
    /// 백테스트 요약에서 행 생성 (복리 계산).
    ///
    /// - `%_profit_pa = profit_total_pct / sample_days * 365`
    /// - `acc-start` = 직전 행의 `acc-finish` (없으면 `wallet`)
    /// - `acc-finish = acc-start * (1 + profit_total_pct / 100)`
    pub fn compound(
        summary: &BacktestSummary,
        wf_stage: usize,
        period: &DateRange,
        sample_days: i64,
        wallet: f64,
        previous: Option<&StageRecord>,
    ) -> Result<Self> {
        if sample_days <= 0 {
            return Err(WalkForwardError::Config(format!(
                "표본 기간은 0일보다 길어야 합니다: {} ({}일)",
                period, sample_days
            )));
        }
        let acc_start = previous.map(|row| row.acc_finish).unwrap_or(wallet);

        Ok(Self {
            profit_mean: summary.profit_mean,
            profit_mean_pct: summary.profit_mean_pct,
            profit_sum: summary.profit_sum,
            profit_sum_pct: summary.profit_sum_pct,
            profit_total_abs: summary.profit_total_abs,
            profit_total_pct: summary.profit_total_pct,
            profit_total: summary.profit_total,
            wins: summary.wins as i64,
            draws: summary.draws as i64,
            losses: summary.losses as i64,
            trades: summary.trades as i64,
            max_drawdown_abs: summary.max_drawdown_abs,
            max_drawdown_account: summary.max_drawdown_account,
            wf_stage: wf_stage as i64,
            bt_time_period: period.to_string(),
            start_balance: wallet,
            final_balance: wallet + summary.profit_total_abs,
            profit_pa_pct: summary.profit_total_pct / sample_days as f64 * 365.0,
            acc_start,
            acc_finish: acc_start * (1.0 + summary.profit_total_pct / 100.0),
        })
    }

    /// 백테스트 기간 (일)
    pub fn period_days(&self) -> Result<i64> {
        let period: DateRange = self
            .bt_time_period
            .parse()
            .map_err(|e| WalkForwardError::Aggregation(format!("기간 형식 오류: {}", e)))?;
        Ok(period.days())
    }
}

/// 컬럼 이름 (저장 순서)
pub const COLUMNS: [&str; 20] = [
    "profit_mean",
    "profit_mean_pct",
    "profit_sum",
    "profit_sum_pct",
    "profit_total_abs",
    "profit_total_pct",
    "profit_total",
    "wins",
    "draws",
    "losses",
    "trades",
    "max_drawdown_abs",
    "max_drawdown_account",
    "wf-stage",
    "bt_time_period",
    "start-balance",
    "final-balance",
    "%_profit_pa",
    "acc-start",
    "acc-finish",
];

fn records_to_frame(rows: &[StageRecord]) -> Result<DataFrame> {
    macro_rules! col {
        ($field:ident) => {
            rows.iter().map(|r| r.$field).collect::<Vec<_>>()
        };
    }

    let df = df!(
        "profit_mean" => col!(profit_mean),
        "profit_mean_pct" => col!(profit_mean_pct),
        "profit_sum" => col!(profit_sum),
        "profit_sum_pct" => col!(profit_sum_pct),
        "profit_total_abs" => col!(profit_total_abs),
        "profit_total_pct" => col!(profit_total_pct),
        "profit_total" => col!(profit_total),
        "wins" => col!(wins),
        "draws" => col!(draws),
        "losses" => col!(losses),
        "trades" => col!(trades),
        "max_drawdown_abs" => col!(max_drawdown_abs),
        "max_drawdown_account" => col!(max_drawdown_account),
        "wf-stage" => col!(wf_stage),
        "bt_time_period" => rows.iter().map(|r| r.bt_time_period.as_str()).collect::<Vec<_>>(),
        "start-balance" => col!(start_balance),
        "final-balance" => col!(final_balance),
        "%_profit_pa" => col!(profit_pa_pct),
        "acc-start" => col!(acc_start),
        "acc-finish" => col!(acc_finish)
    )?;
    Ok(df)
}

fn frame_to_records(df: &DataFrame, path: &Path) -> Result<Vec<StageRecord>> {
    let missing = |column: &str, row: usize| {
        WalkForwardError::artifact(path, format!("{} 컬럼 {}행 값 누락", column, row))
    };
    let float = |column: &str, row: usize| -> Result<f64> {
        df.column(column)?.f64()?.get(row).ok_or_else(|| missing(column, row))
    };
    let int = |column: &str, row: usize| -> Result<i64> {
        df.column(column)?.i64()?.get(row).ok_or_else(|| missing(column, row))
    };

    let periods = df.column("bt_time_period")?.str()?;
    let mut rows = Vec::with_capacity(df.height());

    for i in 0..df.height() {
        rows.push(StageRecord {
            profit_mean: float("profit_mean", i)?,
            profit_mean_pct: float("profit_mean_pct", i)?,
            profit_sum: float("profit_sum", i)?,
            profit_sum_pct: float("profit_sum_pct", i)?,
            profit_total_abs: float("profit_total_abs", i)?,
            profit_total_pct: float("profit_total_pct", i)?,
            profit_total: float("profit_total", i)?,
            wins: int("wins", i)?,
            draws: int("draws", i)?,
            losses: int("losses", i)?,
            trades: int("trades", i)?,
            max_drawdown_abs: float("max_drawdown_abs", i)?,
            max_drawdown_account: float("max_drawdown_account", i)?,
            wf_stage: int("wf-stage", i)?,
            bt_time_period: periods
                .get(i)
                .map(str::to_string)
                .ok_or_else(|| missing("bt_time_period", i))?,
            start_balance: float("start-balance", i)?,
            final_balance: float("final-balance", i)?,
            profit_pa_pct: float("%_profit_pa", i)?,
            acc_start: float("acc-start", i)?,
            acc_finish: float("acc-finish", i)?,
        });
    }
    Ok(rows)
}

/// 단계별 영속 결과 테이블.
#[derive(Debug, Clone)]
pub struct StageTable {
    phase: BacktestPhase,
    parquet_path: PathBuf,
    csv_path: PathBuf,
    wallet: f64,
}

impl StageTable {
    /// `{run_dir}/{phase}.parquet` 테이블 열기 (파일이 없으면 첫 추가 시 생성)
    pub fn open(run_dir: &Path, phase: BacktestPhase, wallet: f64) -> Self {
        Self {
            phase,
            parquet_path: run_dir.join(format!("{}.parquet", phase)),
            csv_path: run_dir.join(format!("{}.csv", phase)),
            wallet,
        }
    }

    pub fn phase(&self) -> BacktestPhase {
        self.phase
    }

    pub fn parquet_path(&self) -> &Path {
        &self.parquet_path
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// 영속 테이블 전체 읽기
    pub fn load(&self) -> Result<Vec<StageRecord>> {
        if !self.parquet_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.parquet_path)?;
        let df = ParquetReader::new(file).finish()?;
        frame_to_records(&df, &self.parquet_path)
    }

    /// 기록된 단계 순번 목록
    pub fn stage_ordinals(&self) -> Result<Vec<usize>> {
        Ok(self
            .load()?
            .iter()
            .map(|row| row.wf_stage as usize)
            .collect())
    }

    /// 결과 한 행 추가.
    ///
    /// 디스크의 테이블을 읽어 직전 `acc-finish`를 가져오고, 새 행을 붙여
    /// 영속 테이블과 CSV 스냅샷을 다시 쓴 뒤, 디스크에서 다시 읽은 행을 반환합니다.
    pub fn append(
        &self,
        summary: &BacktestSummary,
        wf_stage: usize,
        period: &DateRange,
        sample_days: i64,
    ) -> Result<StageRecord> {
        let mut rows = self.load()?;
        let record =
            StageRecord::compound(summary, wf_stage, period, sample_days, self.wallet, rows.last())?;
        debug!(
            phase = %self.phase,
            wf_stage = wf_stage,
            acc_start = record.acc_start,
            acc_finish = record.acc_finish,
            "테이블 행 추가"
        );
        rows.push(record);
        self.write(&rows)?;

        self.load()?.pop().ok_or_else(|| {
            WalkForwardError::artifact(&self.parquet_path, "추가한 행을 다시 읽을 수 없습니다")
        })
    }

    fn write(&self, rows: &[StageRecord]) -> Result<()> {
        let mut df = records_to_frame(rows)?;

        // 임시 파일에 쓴 뒤 교체하여 중단 시에도 이전 테이블이 유지됨
        let tmp_path = self.parquet_path.with_extension("parquet.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            ParquetWriter::new(&mut file).finish(&mut df)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.parquet_path)?;

        let mut csv = File::create(&self.csv_path)?;
        CsvWriter::new(&mut csv).include_header(true).finish(&mut df)?;
        Ok(())
    }
}

/// 잔고 시계열 (테이블의 `acc-finish`에서 파생, 별도 저장하지 않음).
#[derive(Debug, Clone, PartialEq)]
pub struct EquitySeries {
    /// 첫 행의 `acc-start`
    pub initial: f64,
    /// (단계 순번, `acc-finish`)
    pub points: Vec<(usize, f64)>,
}

impl EquitySeries {
    pub fn from_records(rows: &[StageRecord], wallet: f64) -> Self {
        Self {
            initial: rows.first().map(|row| row.acc_start).unwrap_or(wallet),
            points: rows
                .iter()
                .map(|row| (row.wf_stage as usize, row.acc_finish))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn final_balance(&self) -> f64 {
        self.points.last().map(|(_, v)| *v).unwrap_or(self.initial)
    }

    /// 전체 성장률 (%)
    pub fn growth_pct(&self) -> f64 {
        if self.initial == 0.0 {
            return 0.0;
        }
        (self.final_balance() / self.initial - 1.0) * 100.0
    }

    /// 최대 낙폭 (%, 양수). 시작 잔고를 최초 고점으로 사용
    pub fn max_drawdown_pct(&self) -> f64 {
        let mut peak = self.initial;
        let mut max_dd = 0.0_f64;
        for &(_, value) in &self.points {
            peak = peak.max(value);
            if peak > 0.0 {
                max_dd = max_dd.max((peak - value) / peak * 100.0);
            }
        }
        max_dd
    }

    pub fn log_summary(&self) {
        info!(
            stages = self.len(),
            initial = format!("{:.2}", self.initial),
            final_balance = format!("{:.2}", self.final_balance()),
            growth = format!("{:.2}%", self.growth_pct()),
            max_drawdown = format!("{:.2}%", self.max_drawdown_pct()),
            "워크포워드 잔고 요약"
        );
    }
}

/// 비교 데이터 생성 결과.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombineOutcome {
    /// 기록된 단계 수
    pub rows: usize,
    /// 계산할 수 없는 값이 비어 있는 단계 (패배 0회, 빈 in-sample 기간)
    pub incomplete: Vec<i64>,
}

impl CombineOutcome {
    pub fn is_complete(&self, stage: i64) -> bool {
        !self.incomplete.contains(&stage)
    }
}

/// 단계 간 비교 데이터 (`combined.csv`) 생성.
///
/// in-sample(op)과 out-of-sample(wf)의 평균 거래 수익, 승/패 비율, 일평균 거래 수,
/// 연환산 수익을 나란히 기록합니다. 두 테이블에 모두 있는 단계만 포함하며,
/// 계산할 수 없는 값(패배 0회 등)은 해당 칸만 비워 두고 단계 번호를
/// [`CombineOutcome::incomplete`]에 남깁니다.
pub fn combine_phases(
    op_rows: &[StageRecord],
    wf_rows: &[StageRecord],
    out_sample_days: u32,
    path: &Path,
) -> Result<CombineOutcome> {
    if out_sample_days == 0 {
        return Err(WalkForwardError::Aggregation(
            "out-of-sample 일수가 0입니다".to_string(),
        ));
    }

    let ratio = |wins: i64, losses: i64| (losses != 0).then(|| wins as f64 / losses as f64);

    let days_out = out_sample_days as f64;
    let mut outcome = CombineOutcome::default();
    let mut stage = Vec::new();
    let mut op_profit_av = Vec::new();
    let mut wf_profit_av = Vec::new();
    let mut op_wl = Vec::new();
    let mut wf_wl = Vec::new();
    let mut op_tpd = Vec::new();
    let mut wf_tpd = Vec::new();
    let mut op_ppa = Vec::new();
    let mut wf_ppa = Vec::new();
    let mut op_pct_ppa = Vec::new();
    let mut wf_pct_ppa = Vec::new();

    for op in op_rows {
        let Some(wf) = wf_rows.iter().find(|wf| wf.wf_stage == op.wf_stage) else {
            continue;
        };
        let days_in = op.period_days()?;
        let days_in = (days_in > 0).then_some(days_in as f64);
        let op_ratio = ratio(op.wins, op.losses);
        let wf_ratio = ratio(wf.wins, wf.losses);
        if days_in.is_none() || op_ratio.is_none() || wf_ratio.is_none() {
            outcome.incomplete.push(op.wf_stage);
        }

        stage.push(op.wf_stage);
        op_profit_av.push(op.profit_mean_pct);
        wf_profit_av.push(wf.profit_mean_pct);
        op_wl.push(op_ratio);
        wf_wl.push(wf_ratio);
        op_tpd.push(days_in.map(|days| op.trades as f64 / days));
        wf_tpd.push(wf.trades as f64 / days_out);
        op_ppa.push(days_in.map(|days| op.profit_total / days * 365.0));
        wf_ppa.push(wf.profit_total / days_out * 365.0);
        op_pct_ppa.push(op.profit_pa_pct);
        wf_pct_ppa.push(wf.profit_pa_pct);
    }
    outcome.rows = stage.len();

    let mut df = df!(
        "wf-stage" => stage,
        "op_profit_av" => op_profit_av,
        "wf_profit_av" => wf_profit_av,
        "op_wl%" => op_wl,
        "wf_wl%" => wf_wl,
        "op_trades_per_day" => op_tpd,
        "wf_trades_per_day" => wf_tpd,
        "op_ppa" => op_ppa,
        "wf_ppa" => wf_ppa,
        "op_%ppa" => op_pct_ppa,
        "wf_%ppa" => wf_pct_ppa
    )?;

    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(profit_total_pct: f64, wallet: f64) -> BacktestSummary {
        BacktestSummary {
            key: "SampleStrategy".to_string(),
            profit_mean: 0.01,
            profit_mean_pct: 1.0,
            profit_sum: 1.2,
            profit_sum_pct: 120.0,
            profit_total_abs: wallet * profit_total_pct / 100.0,
            profit_total_pct,
            profit_total: profit_total_pct / 100.0,
            wins: 80,
            draws: 10,
            losses: 30,
            trades: 120,
            max_drawdown_abs: 125.0,
            max_drawdown_account: 0.05,
        }
    }

    fn period(s: &str) -> DateRange {
        s.parse().unwrap()
    }

    #[test]
    fn test_compounding_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let table = StageTable::open(dir.path(), BacktestPhase::WfBt, 2500.0);

        let first = table
            .append(&summary(10.0, 2500.0), 1, &period("20200101-20200131"), 30)
            .unwrap();
        assert_eq!(first.acc_start, 2500.0);
        assert!((first.acc_finish - 2750.0).abs() < 1e-9);
        assert_eq!(first.start_balance, 2500.0);
        assert!((first.final_balance - 2750.0).abs() < 1e-9);

        let second = table
            .append(&summary(-20.0, 2500.0), 2, &period("20200131-20200301"), 30)
            .unwrap();
        assert_eq!(second.acc_start, first.acc_finish);
        assert!((second.acc_finish - 2200.0).abs() < 1e-9);
        // 백테스트 시작 잔고는 복리 잔고가 아닌 고정 지갑
        assert_eq!(second.start_balance, 2500.0);
        assert!((second.final_balance - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_profit_per_annum() {
        let record = StageRecord::compound(
            &summary(10.0, 2500.0),
            1,
            &period("20191102-20200101"),
            60,
            2500.0,
            None,
        )
        .unwrap();
        assert!((record.profit_pa_pct - 10.0 / 60.0 * 365.0).abs() < 1e-9);

        let err = StageRecord::compound(
            &summary(10.0, 2500.0),
            1,
            &period("20200101-20200101"),
            0,
            2500.0,
            None,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_persisted_values_round_trip_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let table = StageTable::open(dir.path(), BacktestPhase::OpBt, 2500.0);

        let mut awkward = summary(3.141_592_653_589_793, 2500.0);
        awkward.profit_mean = 0.1 + 0.2;
        awkward.max_drawdown_account = 1.0 / 3.0;

        let written = table
            .append(&awkward, 1, &period("20191102-20200101"), 60)
            .unwrap();
        let reread = table.load().unwrap();

        assert_eq!(reread.len(), 1);
        assert_eq!(reread[0], written);
        assert_eq!(reread[0].profit_mean.to_bits(), (0.1_f64 + 0.2).to_bits());
        assert_eq!(reread[0].max_drawdown_account.to_bits(), (1.0_f64 / 3.0).to_bits());
        assert!(table.csv_path().exists());
    }

    #[test]
    fn test_reopened_table_continues_chain() {
        let dir = tempfile::tempdir().unwrap();
        {
            let table = StageTable::open(dir.path(), BacktestPhase::WfBt, 2500.0);
            table
                .append(&summary(10.0, 2500.0), 1, &period("20200101-20200131"), 30)
                .unwrap();
        }

        let reopened = StageTable::open(dir.path(), BacktestPhase::WfBt, 2500.0);
        assert_eq!(reopened.stage_ordinals().unwrap(), vec![1]);
        let next = reopened
            .append(&summary(10.0, 2500.0), 2, &period("20200131-20200301"), 30)
            .unwrap();
        assert!((next.acc_start - 2750.0).abs() < 1e-9);
        assert!((next.acc_finish - 3025.0).abs() < 1e-9);
    }

    #[test]
    fn test_csv_snapshot_header() {
        let dir = tempfile::tempdir().unwrap();
        let table = StageTable::open(dir.path(), BacktestPhase::WfBt, 2500.0);
        table
            .append(&summary(1.0, 2500.0), 1, &period("20200101-20200131"), 30)
            .unwrap();

        let content = std::fs::read_to_string(table.csv_path()).unwrap();
        let header = content.lines().next().unwrap();
        assert_eq!(header, COLUMNS.join(","));
        assert!(content.contains("20200101-20200131"));
    }

    #[test]
    fn test_equity_series() {
        let wallet = 1000.0;
        let mut rows = Vec::new();
        for (i, pct) in [10.0, -20.0, 50.0].iter().enumerate() {
            let record = StageRecord::compound(
                &summary(*pct, wallet),
                i + 1,
                &period("20200101-20200131"),
                30,
                wallet,
                rows.last(),
            )
            .unwrap();
            rows.push(record);
        }

        let series = EquitySeries::from_records(&rows, wallet);
        assert_eq!(series.len(), 3);
        assert!((series.final_balance() - 1320.0).abs() < 1e-9);
        assert!((series.growth_pct() - 32.0).abs() < 1e-9);
        assert!((series.max_drawdown_pct() - 20.0).abs() < 1e-9);

        let empty = EquitySeries::from_records(&[], wallet);
        assert!(empty.is_empty());
        assert_eq!(empty.final_balance(), wallet);
        assert_eq!(empty.max_drawdown_pct(), 0.0);
    }

    #[test]
    fn test_combine_phases() {
        let dir = tempfile::tempdir().unwrap();
        let op = vec![StageRecord::compound(
            &summary(10.0, 2500.0),
            1,
            &period("20191102-20200101"),
            60,
            2500.0,
            None,
        )
        .unwrap()];
        let wf = vec![StageRecord::compound(
            &summary(5.0, 2500.0),
            1,
            &period("20200101-20200131"),
            30,
            2500.0,
            None,
        )
        .unwrap()];

        let path = dir.path().join("combined.csv");
        let outcome = combine_phases(&op, &wf, 30, &path).unwrap();
        assert_eq!(outcome, CombineOutcome { rows: 1, incomplete: vec![] });

        let content = std::fs::read_to_string(&path).unwrap();
        let header = content.lines().next().unwrap();
        assert!(header.starts_with("wf-stage,op_profit_av,wf_profit_av,op_wl%"));
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_combine_phases_blanks_only_the_stage_without_losses() {
        let dir = tempfile::tempdir().unwrap();
        let mut no_losses = summary(10.0, 2500.0);
        no_losses.losses = 0;
        let healthy = summary(5.0, 2500.0);

        let op1 =
            StageRecord::compound(&healthy, 1, &period("20191102-20200101"), 60, 2500.0, None)
                .unwrap();
        let op2 = StageRecord::compound(
            &healthy,
            2,
            &period("20191202-20200131"),
            60,
            2500.0,
            Some(&op1),
        )
        .unwrap();
        let wf1 =
            StageRecord::compound(&no_losses, 1, &period("20200101-20200131"), 30, 2500.0, None)
                .unwrap();
        let wf2 = StageRecord::compound(
            &healthy,
            2,
            &period("20200131-20200301"),
            30,
            2500.0,
            Some(&wf1),
        )
        .unwrap();

        let path = dir.path().join("combined.csv");
        let outcome = combine_phases(&[op1, op2], &[wf1, wf2], 30, &path).unwrap();
        assert_eq!(outcome.rows, 2);
        assert_eq!(outcome.incomplete, vec![1]);
        assert!(!outcome.is_complete(1));
        assert!(outcome.is_complete(2));

        // wf_wl% 칸만 비어 있음
        let content = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<Vec<&str>> = content.lines().skip(1).map(|l| l.split(',').collect()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][4], "");
        assert!(!rows[0][3].is_empty());
        assert!(!rows[1][4].is_empty());
    }

    #[test]
    fn test_combine_phases_skips_stage_missing_from_one_table() {
        let dir = tempfile::tempdir().unwrap();
        let op = vec![StageRecord::compound(
            &summary(10.0, 2500.0),
            1,
            &period("20191102-20200101"),
            60,
            2500.0,
            None,
        )
        .unwrap()];

        let path = dir.path().join("combined.csv");
        let outcome = combine_phases(&op, &[], 30, &path).unwrap();
        assert_eq!(outcome.rows, 0);

        let err = combine_phases(&op, &op, 0, &path).unwrap_err();
        assert!(matches!(err, WalkForwardError::Aggregation(_)));
        assert!(!err.is_fatal());
    }
}
