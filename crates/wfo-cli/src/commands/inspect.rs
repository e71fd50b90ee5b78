//! 조회 명령 (stages, allocate, summary).

use std::path::Path;

use chrono::NaiveDate;
use clap::Args;
use wfo_core::{
    BacktestPhase, EquitySeries, InSampleWindow, OptimisationKind, ResourceAllocator,
    StageGenerator, StageTable, WorkerCount,
};

use super::{date_arg, window_arg};

/// `wfo stages` 인자
#[derive(Args, Debug)]
pub struct StagesArgs {
    /// 첫 out-of-sample 시작일 (YYYYMMDD)
    #[arg(long, value_parser = date_arg)]
    pub wf_start: NaiveDate,

    /// 워크포워드 종료일 (YYYYMMDD)
    #[arg(long, value_parser = date_arg)]
    pub wf_finish: NaiveDate,

    /// in-sample 일수 또는 "anchored"
    #[arg(long, value_parser = window_arg)]
    pub in_sample: InSampleWindow,

    /// out-of-sample 일수
    #[arg(long)]
    pub out_sample_days: u32,

    /// anchored 모드 in-sample 시작일 (YYYYMMDD)
    #[arg(long, value_parser = date_arg)]
    pub anchored_start: Option<NaiveDate>,

    /// 기본 워커 수
    #[arg(long, default_value_t = -15, allow_negative_numbers = true)]
    pub workers: i32,
}

/// `wfo allocate` 인자
#[derive(Args, Debug)]
pub struct AllocateArgs {
    /// in-sample 윈도우 길이 (일)
    #[arg(long)]
    pub days: i64,

    /// in-sample 윈도우 종료일 (YYYYMMDD)
    #[arg(long, value_parser = date_arg)]
    pub end: NaiveDate,

    /// in-sample 일수 또는 "anchored"
    #[arg(long, value_parser = window_arg, default_value = "730")]
    pub in_sample: InSampleWindow,

    /// 기본 워커 수
    #[arg(long, default_value_t = -15, allow_negative_numbers = true)]
    pub workers: i32,

    /// 기본 epoch 수
    #[arg(long, default_value_t = 100)]
    pub epochs: u32,
}

/// 단계 목록 출력
pub fn print_stages(args: &StagesArgs) -> anyhow::Result<()> {
    let stages = StageGenerator::new(
        args.wf_start,
        args.wf_finish,
        args.in_sample,
        args.out_sample_days,
        args.anchored_start,
    )
    .generate()?;
    let allocator = ResourceAllocator::new(WorkerCount(args.workers), 0);

    println!("\n📅 워크포워드 단계 ({}개)", stages.len());
    println!("{}", "=".repeat(72));
    println!(
        "{:>5}  {:<19} {:>5}  {:<19} {:>7}",
        "stage", "in-sample", "days", "out-of-sample", "workers"
    );
    println!("{}", "-".repeat(72));
    for stage in &stages {
        let workers = allocator.allocate_for(&stage.in_sample, args.in_sample);
        println!(
            "{:>5}  {:<19} {:>5}  {:<19} {:>7}",
            stage.ordinal,
            stage.in_sample.to_string(),
            stage.in_sample.days(),
            stage.out_sample.to_string(),
            workers.to_string()
        );
    }
    if let Some(last) = stages.last() {
        if last.out_sample.end > args.wf_finish {
            println!("\n※ 마지막 단계는 종료일 이후까지 포함합니다 ({})", last.out_sample.end);
        }
    }
    Ok(())
}

/// 워커/epoch 할당 출력
pub fn print_allocation(args: &AllocateArgs) {
    let allocator = ResourceAllocator::new(WorkerCount(args.workers), args.epochs);
    let workers = allocator.allocate(args.days, args.end, args.in_sample);

    println!("\n⚙️  자원 할당 ({} 모드)", args.in_sample);
    println!("{}", "=".repeat(40));
    println!("  윈도우:   {}일, 종료 {}", args.days, args.end);
    println!("  워커:     {} (기본 {})", workers, args.workers);
    for (label, kind) in [
        ("stage", OptimisationKind::Stage),
        ("pre-live", OptimisationKind::PreLive),
        ("re-optimise", OptimisationKind::ReOptimise),
    ] {
        println!("  epochs:   {:<12} {}", label, allocator.epochs(kind));
    }
}

/// 실행 디렉토리 잔고 요약 출력
pub fn print_summary(run_dir: &Path, wallet: f64) -> anyhow::Result<()> {
    let rows = StageTable::open(run_dir, BacktestPhase::WfBt, wallet).load()?;
    if rows.is_empty() {
        println!("기록된 단계가 없습니다: {}", run_dir.display());
        return Ok(());
    }
    let series = EquitySeries::from_records(&rows, wallet);

    println!("\n📈 워크포워드 결과: {}", run_dir.display());
    println!("{}", "=".repeat(72));
    println!(
        "{:>5}  {:<19} {:>10} {:>12} {:>12}",
        "stage", "period", "profit %", "acc-start", "acc-finish"
    );
    println!("{}", "-".repeat(72));
    for row in &rows {
        println!(
            "{:>5}  {:<19} {:>10.2} {:>12.2} {:>12.2}",
            row.wf_stage, row.bt_time_period, row.profit_total_pct, row.acc_start, row.acc_finish
        );
    }
    println!("{}", "-".repeat(72));
    println!("  시작 잔고:  {:.2}", series.initial);
    println!("  최종 잔고:  {:.2}", series.final_balance());
    println!("  성장률:     {:.2}%", series.growth_pct());
    println!("  최대 낙폭:  {:.2}%", series.max_drawdown_pct());
    Ok(())
}
