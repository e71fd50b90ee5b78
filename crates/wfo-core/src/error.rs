//! 에러 타입 정의.

use std::path::PathBuf;

use thiserror::Error;

/// 워크포워드 실행 에러.
#[derive(Debug, Error)]
pub enum WalkForwardError {
    /// 네트워크 연결 확인 실패 (일시적, 가드에서 무한 재시도)
    #[error("연결 확인 실패: {0}")]
    Connectivity(String),

    /// 외부 최적화기/백테스터 실행 실패 (프로세스 실행 불가 또는 비정상 종료)
    #[error("외부 도구 실패 [{tool}]: {reason}")]
    ExternalTool { tool: String, reason: String },

    /// 결과 아티팩트 누락 또는 형식 오류
    #[error("아티팩트 오류 ({path}): {reason}")]
    Artifact { path: PathBuf, reason: String },

    /// 단계 간 비교 데이터 계산 실패
    #[error("집계 오류: {0}")]
    Aggregation(String),

    /// 전략/설정 파일 고정 복사 실패
    #[error("입력 파일 복사 실패 ({path}): {source}")]
    ConfigCopy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 실행 파라미터 오류
    #[error("설정 오류: {0}")]
    Config(String),

    /// 파일 I/O 에러
    #[error("I/O 오류: {0}")]
    Io(#[from] std::io::Error),

    /// 결과 테이블 에러
    #[error("테이블 오류: {0}")]
    Table(#[from] polars::prelude::PolarsError),

    /// JSON 파싱 에러
    #[error("JSON 오류: {0}")]
    Json(#[from] serde_json::Error),
}

impl WalkForwardError {
    /// 외부 도구 실패 생성 헬퍼.
    pub fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// 아티팩트 오류 생성 헬퍼.
    pub fn artifact(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Artifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// 재시도 가능한 에러인지 확인.
    ///
    /// 연결 문제만 자동 재시도 대상입니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }

    /// 실행 전체를 중단해야 하는 에러인지 확인.
    ///
    /// 집계 에러는 해당 산출물만 생략하고 실행을 계속합니다.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Connectivity(_) | Self::Aggregation(_))
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, WalkForwardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let conn = WalkForwardError::Connectivity("timeout".to_string());
        assert!(conn.is_retryable());
        assert!(!conn.is_fatal());

        let agg = WalkForwardError::Aggregation("losses = 0".to_string());
        assert!(!agg.is_retryable());
        assert!(!agg.is_fatal());

        let tool = WalkForwardError::tool("hyperopt", "exit code 2");
        assert!(!tool.is_retryable());
        assert!(tool.is_fatal());
        assert_eq!(tool.to_string(), "외부 도구 실패 [hyperopt]: exit code 2");
    }
}
