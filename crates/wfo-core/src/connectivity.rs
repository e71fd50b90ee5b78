//! 네트워크 연결 확인 가드.
//!
//! 외부 최적화기/백테스터/다운로드 실행 직전에 호출되어 연결이 확인될 때까지
//! 현재 실행 흐름만 대기시킵니다 (`tokio::time::sleep` 기반, 런타임은 차단하지 않음).
//!
//! # 예시
//!
//! ```rust,ignore
//! use wfo_core::connectivity::{ConnectivityGuard, HttpProbe};
//!
//! let guard = ConnectivityGuard::new(Arc::new(HttpProbe::new(url, timeout)?), interval);
//! let offline = guard.await_connectivity().await;
//! ```

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    config::RuntimeConfig,
    error::{Result, WalkForwardError},
    stats::format_duration,
};

/// 연결 확인 방식 추상화.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// 외부 엔드포인트 도달 가능 여부 확인
    async fn probe(&self) -> Result<()>;
}

/// HTTP GET 기반 연결 확인.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalkForwardError::Config(format!("HTTP 클라이언트 생성 실패: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// 환경 설정에서 생성
    pub fn from_runtime(runtime: &RuntimeConfig) -> Result<Self> {
        Self::new(runtime.probe_url.clone(), runtime.probe_timeout())
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self) -> Result<()> {
        self.client
            .get(&self.url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map(|_| ())
            .map_err(|e| WalkForwardError::Connectivity(e.to_string()))
    }
}

/// 연결 확인 가드.
#[derive(Clone)]
pub struct ConnectivityGuard {
    probe: Arc<dyn ReachabilityProbe>,
    retry_interval: Duration,
}

impl ConnectivityGuard {
    pub fn new(probe: Arc<dyn ReachabilityProbe>, retry_interval: Duration) -> Self {
        Self {
            probe,
            retry_interval,
        }
    }

    /// 연결이 확인될 때까지 대기.
    ///
    /// 실패 시 `retry_interval`마다 재확인하며 포기하지 않습니다.
    /// 반환값은 오프라인 상태로 대기한 시간입니다 (즉시 연결되면 0).
    pub async fn await_connectivity(&self) -> Duration {
        let started = Instant::now();
        let mut offline = false;

        loop {
            match self.probe.probe().await {
                Ok(()) => {
                    if !offline {
                        return Duration::ZERO;
                    }
                    let offline_time = started.elapsed();
                    warn!(
                        offline = %format_duration(offline_time),
                        "연결 복구, 오프라인 시간: {}",
                        format_duration(offline_time)
                    );
                    return offline_time;
                }
                Err(e) => {
                    if !offline {
                        warn!(error = %e, "인터넷 연결 없음, 재확인 대기 중");
                        offline = true;
                    } else {
                        debug!(error = %e, "연결 재확인 실패");
                    }
                    tokio::time::sleep(self.retry_interval).await;
                }
            }
        }
    }
}
