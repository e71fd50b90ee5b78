//! 최적화 자원 할당 (워커 수, epoch 수).
//!
//! 외부 최적화기는 `-j` 인자로 병렬 워커 수를 받습니다. 음수 값은
//! "전체 코어 - (N-1)" 규칙을 따르므로 절댓값이 클수록 할당 크기가 큽니다.
//!
//! 두 가지 정책은 모두 입력값만으로 결정되는 순수 함수이며, 임계값 테이블로 표현됩니다.
//!
//! - **Anchored**: in-sample 윈도우 길이(일)에 따라 단계적으로 증가
//! - **Rolling**: 윈도우 종료일이 과거일수록 기본 워커 수에 단계가 추가됨

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{config::InSampleWindow, stage::DateRange};

/// 외부 최적화기 워커 수.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerCount(pub i32);

impl WorkerCount {
    /// 할당 크기 (절댓값)
    pub fn magnitude(&self) -> u32 {
        self.0.unsigned_abs()
    }

    /// 0에서 멀어지는 방향으로 `steps`만큼 확장.
    pub fn scaled(self, steps: u32) -> Self {
        let steps = steps as i32;
        if self.0 < 0 {
            Self(self.0.saturating_sub(steps))
        } else {
            Self(self.0.saturating_add(steps))
        }
    }
}

impl fmt::Display for WorkerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 정렬된 임계값 테이블.
///
/// `lookup(key)`는 `threshold <= key`를 만족하는 마지막 항목의 값을,
/// 해당 항목이 없으면 `floor`를 반환합니다.
#[derive(Debug, Clone)]
pub struct ThresholdTable<K, V> {
    floor: V,
    entries: Vec<(K, V)>,
}

impl<K: Ord + Copy, V: Copy> ThresholdTable<K, V> {
    pub fn new(floor: V, mut entries: Vec<(K, V)>) -> Self {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self { floor, entries }
    }

    /// 이진 탐색으로 값 조회
    pub fn lookup(&self, key: K) -> V {
        let idx = self.entries.partition_point(|(threshold, _)| *threshold <= key);
        if idx == 0 {
            self.floor
        } else {
            self.entries[idx - 1].1
        }
    }

    /// 테이블 하한값 + 임계값 순서대로의 값 목록
    pub fn values(&self) -> impl Iterator<Item = V> + '_ {
        std::iter::once(self.floor).chain(self.entries.iter().map(|(_, v)| *v))
    }
}

/// Anchored 모드 워커 테이블 (윈도우 길이 일수 → 워커 수).
pub fn anchored_worker_table() -> ThresholdTable<i64, i32> {
    ThresholdTable::new(
        -1,
        vec![
            (51, -2),
            (101, -4),
            (151, -6),
            (201, -8),
            (251, -10),
            (301, -11),
            (351, -12),
            (401, -13),
            (451, -14),
            (551, -16),
            (651, -17),
            (801, -18),
            (951, -19),
            (1101, -20),
        ],
    )
}

/// Rolling 모드 추가 단계 테이블 (윈도우 종료일 → 기본 워커 대비 추가 단계).
///
/// 종료일이 기준일과 같으면 더 최근 구간으로 취급합니다.
pub fn rolling_step_table() -> ThresholdTable<NaiveDate, u32> {
    let cutoff = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN);
    ThresholdTable::new(
        5,
        vec![
            (cutoff(2018, 1, 1), 4),
            (cutoff(2019, 1, 1), 3),
            (cutoff(2020, 1, 1), 2),
            (cutoff(2021, 1, 1), 1),
            (cutoff(2022, 6, 1), 0),
        ],
    )
}

/// 최적화 실행 종류 (epoch 정책 결정용)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimisationKind {
    /// 워크포워드 단계
    Stage,
    /// 배포 후보 파라미터 생성 (마지막 in-sample 구간)
    PreLive,
    /// 현재 시점 기준 단독 재최적화
    ReOptimise,
}

/// 워커/epoch 할당기.
#[derive(Debug, Clone)]
pub struct ResourceAllocator {
    base_workers: WorkerCount,
    base_epochs: u32,
    anchored: ThresholdTable<i64, i32>,
    rolling: ThresholdTable<NaiveDate, u32>,
}

impl ResourceAllocator {
    pub fn new(base_workers: WorkerCount, base_epochs: u32) -> Self {
        Self {
            base_workers,
            base_epochs,
            anchored: anchored_worker_table(),
            rolling: rolling_step_table(),
        }
    }

    pub fn base_workers(&self) -> WorkerCount {
        self.base_workers
    }

    /// 윈도우에 대한 워커 수 계산.
    pub fn allocate(
        &self,
        window_days: i64,
        window_end: NaiveDate,
        mode: InSampleWindow,
    ) -> WorkerCount {
        match mode {
            InSampleWindow::Anchored => WorkerCount(self.anchored.lookup(window_days)),
            InSampleWindow::Days(_) => self.base_workers.scaled(self.rolling.lookup(window_end)),
        }
    }

    /// 구간 기준 워커 수 계산
    pub fn allocate_for(&self, window: &DateRange, mode: InSampleWindow) -> WorkerCount {
        self.allocate(window.days(), window.end, mode)
    }

    /// 실행 종류별 epoch 수.
    ///
    /// pre-live 검증은 기본값의 2배, 그 외는 기본값 그대로.
    pub fn epochs(&self, kind: OptimisationKind) -> u32 {
        match kind {
            OptimisationKind::PreLive => self.base_epochs.saturating_mul(2),
            OptimisationKind::Stage | OptimisationKind::ReOptimise => self.base_epochs,
        }
    }
}
