//! 실행 통계 구조체.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 소요 시간을 `H:MM:SS` 형식으로 변환
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// 워크포워드 실행 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// 생성된 총 단계 수
    pub stages_total: usize,
    /// 이번 실행에서 완료한 단계 수
    pub stages_completed: usize,
    /// 재개 시 건너뛴 단계 수 (이미 테이블에 존재)
    pub stages_skipped: usize,
    /// 생략된 비교 데이터 집계 횟수
    pub aggregation_failures: usize,
    /// 최적화기 누적 실행 시간
    #[serde(skip)]
    pub optimise_time: Duration,
    /// 백테스터 누적 실행 시간
    #[serde(skip)]
    pub backtest_time: Duration,
    /// 연결 대기 누적 시간
    #[serde(skip)]
    pub offline_time: Duration,
    /// 전체 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            stages_total = self.stages_total,
            stages_completed = self.stages_completed,
            stages_skipped = self.stages_skipped,
            aggregation_failures = self.aggregation_failures,
            optimise_time = %format_duration(self.optimise_time),
            backtest_time = %format_duration(self.backtest_time),
            offline_time = %format_duration(self.offline_time),
            elapsed = %format_duration(self.elapsed),
            "워크포워드 실행 완료"
        );
    }
}
