//! CLI 서브커맨드 구현.

pub mod inspect;
pub mod run;

use chrono::NaiveDate;
use wfo_core::{stage::parse_date, InSampleWindow};

/// clap 값 파서: `YYYYMMDD` 날짜
pub fn date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_date(s).map_err(|e| e.to_string())
}

/// clap 값 파서: in-sample 일수 또는 `anchored`
pub fn window_arg(s: &str) -> Result<InSampleWindow, String> {
    s.parse::<InSampleWindow>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_parsers() {
        assert_eq!(
            date_arg("20200101").unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
        );
        assert!(date_arg("2020-01-01").is_err());
        assert_eq!(window_arg("anchored").unwrap(), InSampleWindow::Anchored);
        assert_eq!(window_arg("730").unwrap(), InSampleWindow::Days(730));
        assert!(window_arg("zero").is_err());
    }
}
