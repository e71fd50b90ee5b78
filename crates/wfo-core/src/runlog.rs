//! 실행별 로그 싱크.
//!
//! 실행 디렉토리의 `wf.log`와 콘솔에 동시에 기록하는 `Dispatch`를 만들고,
//! 실행 전체 future를 해당 dispatcher로 감싸 전역 구독자를 건드리지 않습니다.

use std::{
    fs::OpenOptions,
    future::Future,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{instrument::WithSubscriber, Dispatch};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

use crate::error::{Result, WalkForwardError};

/// 실행별 로그 컨텍스트.
#[derive(Clone)]
pub struct RunLog {
    dispatch: Dispatch,
    path: PathBuf,
}

impl RunLog {
    /// 로그 파일(추가 모드)과 선택적 콘솔 출력을 가진 싱크 생성.
    ///
    /// `filter`는 `EnvFilter` 지시자 문자열입니다 (예: `"info"`, `"wfo_core=debug"`).
    pub fn create(path: &Path, filter: &str, console: bool) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let filter = EnvFilter::try_new(filter)
            .map_err(|e| WalkForwardError::Config(format!("로그 필터 오류: {}", e)))?;

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file));
        let console_layer = console.then(|| fmt::layer().with_target(false));

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer);

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// future 실행 동안 이 싱크로 로그를 보냄
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        fut.with_subscriber(self.dispatch.clone()).await
    }
}
