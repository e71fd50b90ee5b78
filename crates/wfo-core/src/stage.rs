//! 워크포워드 단계 윈도우 생성.
//!
//! 전체 기간 `[wf_start, wf_finish]`를 (in-sample, out-of-sample) 구간 쌍으로 분할합니다.
//!
//! - **Rolling**: in-sample 길이 고정, 매 단계 in/out 시작일이 함께 이동
//! - **Anchored**: in-sample 시작일 고정, 단계마다 in-sample 길이가 증가
//!
//! 첫 단계는 항상 생성되며, 이후 단계는 out-of-sample 종료일이 `wf_finish` 이내일 때만
//! 추가됩니다. 첫 단계의 out-of-sample 종료일은 `wf_finish`를 넘을 수 있으며 잘라내지 않습니다.

use std::{fmt, str::FromStr};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    config::{InSampleWindow, RunConfig},
    error::{Result, WalkForwardError},
};

/// 날짜 문자열 형식 (외부 도구 timerange 형식)
pub const DATE_FORMAT: &str = "%Y%m%d";

/// `YYYYMMDD` 형식 날짜 파싱.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| WalkForwardError::Config(format!("날짜 형식 오류 ({}): {}", s, e)))
}

/// `YYYYMMDD` 형식 날짜 포맷.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// `date + days` (범위 초과 시 설정 오류).
pub fn add_days(date: NaiveDate, days: u32) -> Result<NaiveDate> {
    date.checked_add_days(Days::new(days as u64)).ok_or_else(|| {
        WalkForwardError::Config(format!("날짜 범위 초과: {} + {}일", date, days))
    })
}

/// `date - days` (범위 초과 시 설정 오류).
pub fn sub_days(date: NaiveDate, days: u32) -> Result<NaiveDate> {
    date.checked_sub_days(Days::new(days as u64)).ok_or_else(|| {
        WalkForwardError::Config(format!("날짜 범위 초과: {} - {}일", date, days))
    })
}

/// 일 단위 날짜 구간 `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(with = "compact_date")]
    pub start: NaiveDate,
    #[serde(with = "compact_date")]
    pub end: NaiveDate,
}

impl DateRange {
    /// 새 구간 생성 (`start <= end` 필수)
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(WalkForwardError::Config(format!(
                "구간 종료일({})이 시작일({})보다 앞섭니다",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// 구간 길이 (일)
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// `YYYYMMDD-YYYYMMDD` 형식 (외부 도구 `--timerange` 인자)
impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_date(self.start), format_date(self.end))
    }
}

impl FromStr for DateRange {
    type Err = WalkForwardError;

    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = s.split_once('-').ok_or_else(|| {
            WalkForwardError::Config(format!("timerange 형식 오류 (YYYYMMDD-YYYYMMDD): {}", s))
        })?;
        Self::new(parse_date(start)?, parse_date(end)?)
    }
}

/// 하나의 워크포워드 단계.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// 실행 내 순번 (1부터 시작)
    pub ordinal: usize,
    /// 최적화 구간
    pub in_sample: DateRange,
    /// 검증 구간 (`in_sample.end`에서 시작)
    pub out_sample: DateRange,
}

impl Stage {
    /// 단계 전체 기간 (in-sample 시작 ~ out-of-sample 종료)
    pub fn full_period(&self) -> DateRange {
        DateRange {
            start: self.in_sample.start,
            end: self.out_sample.end,
        }
    }
}

/// 단계 생성기.
#[derive(Debug, Clone)]
pub struct StageGenerator {
    wf_start: NaiveDate,
    wf_finish: NaiveDate,
    in_sample: InSampleWindow,
    out_sample_days: u32,
    anchored_start: Option<NaiveDate>,
}

impl StageGenerator {
    pub fn new(
        wf_start: NaiveDate,
        wf_finish: NaiveDate,
        in_sample: InSampleWindow,
        out_sample_days: u32,
        anchored_start: Option<NaiveDate>,
    ) -> Self {
        Self {
            wf_start,
            wf_finish,
            in_sample,
            out_sample_days,
            anchored_start,
        }
    }

    /// 실행 설정에서 생성기 구성
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            config.wf_start,
            config.wf_finish,
            config.in_sample,
            config.out_sample_days,
            config.anchored_start,
        )
    }

    /// 순서대로 정렬된 단계 목록 생성.
    pub fn generate(&self) -> Result<Vec<Stage>> {
        if self.out_sample_days == 0 {
            return Err(WalkForwardError::Config(
                "out-of-sample 일수는 0보다 커야 합니다".to_string(),
            ));
        }
        if self.wf_finish < self.wf_start {
            return Err(WalkForwardError::Config(format!(
                "종료일({})이 시작일({})보다 앞섭니다",
                self.wf_finish, self.wf_start
            )));
        }

        let step = self.out_sample_days;
        let mut is_start = match self.in_sample {
            InSampleWindow::Days(days) => sub_days(self.wf_start, days)?,
            InSampleWindow::Anchored => self.anchored_start.ok_or_else(|| {
                WalkForwardError::Config("anchored 모드에는 anchored_start가 필요합니다".to_string())
            })?,
        };
        if is_start > self.wf_start {
            return Err(WalkForwardError::Config(format!(
                "in-sample 시작일({})이 워크포워드 시작일({}) 이후입니다",
                is_start, self.wf_start
            )));
        }

        let mut oos_start = self.wf_start;
        let mut stages = Vec::new();

        loop {
            let oos_end = add_days(oos_start, step)?;
            stages.push(Stage {
                ordinal: stages.len() + 1,
                in_sample: DateRange {
                    start: is_start,
                    end: oos_start,
                },
                out_sample: DateRange {
                    start: oos_start,
                    end: oos_end,
                },
            });

            // 다음 단계가 종료일을 넘으면 중단
            match oos_end.checked_add_days(Days::new(step as u64)) {
                Some(next_end) if next_end <= self.wf_finish => {}
                _ => break,
            }

            oos_start = oos_end;
            if !self.in_sample.is_anchored() {
                is_start = add_days(is_start, step)?;
            }
        }

        Ok(stages)
    }
}

/// `YYYYMMDD` 문자열 직렬화 (serde `with` 모듈).
pub mod compact_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::DATE_FORMAT;

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(serde::de::Error::custom)
    }

    /// `Option<NaiveDate>` 버전
    pub mod option {
        use chrono::NaiveDate;
        use serde::{Deserialize, Deserializer, Serializer};

        use super::super::DATE_FORMAT;

        pub fn serialize<S: Serializer>(
            date: &Option<NaiveDate>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match date {
                Some(d) => serializer.serialize_str(&d.format(DATE_FORMAT).to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDate>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_rolling_stage_generation() {
        let generator = StageGenerator::new(
            date(2020, 1, 1),
            date(2020, 4, 1),
            InSampleWindow::Days(60),
            30,
            None,
        );
        let stages = generator.generate().unwrap();

        let rendered: Vec<(String, String)> = stages
            .iter()
            .map(|s| (s.in_sample.to_string(), s.out_sample.to_string()))
            .collect();
        assert_eq!(
            rendered,
            vec![
                ("20191102-20200101".to_string(), "20200101-20200131".to_string()),
                ("20191202-20200131".to_string(), "20200131-20200301".to_string()),
                ("20200101-20200301".to_string(), "20200301-20200331".to_string()),
            ]
        );
        // 20200331 + 30일은 wf_finish를 넘으므로 4번째 단계 없음
        assert!(stages.iter().all(|s| s.out_sample.end <= date(2020, 4, 1)));
        assert_eq!(stages[2].ordinal, 3);
    }

    #[test]
    fn test_anchored_stage_generation() {
        let anchor = date(2019, 6, 1);
        let generator = StageGenerator::new(
            date(2020, 1, 1),
            date(2020, 3, 1),
            InSampleWindow::Anchored,
            30,
            Some(anchor),
        );
        let stages = generator.generate().unwrap();

        assert_eq!(stages.len(), 2);
        assert_eq!(stages[1].out_sample.end, date(2020, 3, 1));
        assert!(stages.iter().all(|s| s.in_sample.start == anchor));
        assert!(stages[1].in_sample.days() > stages[0].in_sample.days());
    }

    #[test]
    fn test_single_stage_when_period_shorter_than_window() {
        let generator = StageGenerator::new(
            date(2020, 1, 1),
            date(2020, 1, 10),
            InSampleWindow::Days(30),
            30,
            None,
        );
        let stages = generator.generate().unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].out_sample.end, date(2020, 1, 31));
    }

    #[test]
    fn test_out_of_range_window_is_config_error() {
        let generator = StageGenerator::new(
            date(2020, 1, 1),
            date(2020, 3, 1),
            InSampleWindow::Days(u32::MAX),
            30,
            None,
        );
        assert!(matches!(generator.generate(), Err(WalkForwardError::Config(_))));

        let generator = StageGenerator::new(
            date(2020, 1, 1),
            date(2020, 3, 1),
            InSampleWindow::Days(60),
            u32::MAX,
            None,
        );
        assert!(matches!(generator.generate(), Err(WalkForwardError::Config(_))));
    }

    #[test]
    fn test_anchored_requires_anchor() {
        let generator = StageGenerator::new(
            date(2020, 1, 1),
            date(2020, 3, 1),
            InSampleWindow::Anchored,
            30,
            None,
        );
        assert!(generator.generate().is_err());
    }

    #[test]
    fn test_date_range_parse_and_format() {
        let range: DateRange = "20200101-20200131".parse().unwrap();
        assert_eq!(range.days(), 30);
        assert_eq!(range.to_string(), "20200101-20200131");
        assert!("20200131-20200101".parse::<DateRange>().is_err());
        assert!("2020-01-01".parse::<DateRange>().is_err());
    }

    #[test]
    fn test_full_period() {
        let generator = StageGenerator::new(
            date(2020, 1, 1),
            date(2020, 1, 20),
            InSampleWindow::Days(10),
            30,
            None,
        );
        let stage = generator.generate().unwrap()[0];
        assert_eq!(stage.full_period().to_string(), "20191222-20200131");
    }
}
