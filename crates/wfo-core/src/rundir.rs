//! 실행 디렉토리 관리.
//!
//! ```text
//! {output_root}/{YYYYMMDD_HHMMSS}_{tag}/
//! ├── {strategy}.py              # 실행 시작 시 고정된 전략 사본
//! ├── {config}.json              # 실행 시작 시 고정된 설정 사본
//! ├── run_config.json            # 실행 파라미터 (재개 시 비교)
//! ├── wf.log
//! ├── op_bt.parquet / op_bt.csv
//! ├── wf_bt.parquet / wf_bt.csv
//! ├── combined.csv
//! └── stage_{k}_{period}/
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::{
    config::RunConfig,
    error::{Result, WalkForwardError},
    stage::DateRange,
};

/// 실행 디렉토리 이름의 타임스탬프 형식
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
/// 고정된 실행 파라미터 파일 이름
pub const RUN_CONFIG_FILE: &str = "run_config.json";

/// 하나의 실행에 대한 디스크 상의 디렉토리.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    path: PathBuf,
    strategy: String,
    config_file: PathBuf,
}

impl RunDirectory {
    /// 새 실행 디렉토리 생성 후 전략/설정 파일과 실행 파라미터를 고정.
    ///
    /// 고정에 실패하면 새로 만든 디렉토리를 지웁니다.
    pub fn create(config: &RunConfig, tag: &str, started_at: NaiveDateTime) -> Result<Self> {
        let name = format!("{}_{}", started_at.format(RUN_TIMESTAMP_FORMAT), tag);
        let path = config.output_root.join(name);
        let run_dir = Self::layout(path, config)?;
        let existed = run_dir.path.exists();
        std::fs::create_dir_all(&run_dir.path)?;

        if let Err(e) = run_dir.freeze(config) {
            if !existed {
                if let Err(cleanup) = std::fs::remove_dir_all(&run_dir.path) {
                    warn!(path = %run_dir.path.display(), error = %cleanup, "실행 디렉토리 정리 실패");
                }
            }
            return Err(e);
        }
        info!(path = %run_dir.path.display(), "실행 디렉토리 생성");
        Ok(run_dir)
    }

    /// 기존 실행 디렉토리 열기 (재개용).
    ///
    /// 고정된 전략/설정 사본과 실행 파라미터가 모두 있어야 하며, 단계 구성이나
    /// 복리 체인에 영향을 주는 파라미터가 고정된 값과 다르면 거부합니다.
    pub fn open(path: &Path, config: &RunConfig) -> Result<Self> {
        if !path.is_dir() {
            return Err(WalkForwardError::Config(format!(
                "실행 디렉토리가 없습니다: {}",
                path.display()
            )));
        }
        let run_dir = Self::layout(path.to_path_buf(), config)?;
        for frozen in [
            run_dir.strategy_file(),
            run_dir.config_file.clone(),
            run_dir.run_config_file(),
        ] {
            if !frozen.is_file() {
                return Err(WalkForwardError::Config(format!(
                    "고정된 입력 파일이 없습니다: {}",
                    frozen.display()
                )));
            }
        }

        let frozen: RunConfig =
            serde_json::from_str(&std::fs::read_to_string(run_dir.run_config_file())?)?;
        let conflicts = config.resume_conflicts(&frozen);
        if !conflicts.is_empty() {
            return Err(WalkForwardError::Config(format!(
                "재개 파라미터가 고정된 실행과 다릅니다: {}",
                conflicts.join(", ")
            )));
        }
        info!(path = %run_dir.path.display(), "기존 실행 디렉토리 재사용");
        Ok(run_dir)
    }

    fn layout(path: PathBuf, config: &RunConfig) -> Result<Self> {
        let file_name = config.config_path.file_name().ok_or_else(|| {
            WalkForwardError::Config(format!(
                "설정 파일 경로가 올바르지 않습니다: {}",
                config.config_path.display()
            ))
        })?;
        Ok(Self {
            config_file: path.join(file_name),
            strategy: config.strategy.clone(),
            path,
        })
    }

    fn freeze(&self, config: &RunConfig) -> Result<()> {
        let strategy_src = config.strategy_path.join(format!("{}.py", config.strategy));
        copy_frozen(&strategy_src, &self.strategy_file())?;
        copy_frozen(&config.config_path, &self.config_file)?;
        std::fs::write(self.run_config_file(), serde_json::to_string_pretty(config)?)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 고정된 전략 사본 (`{run_dir}/{strategy}.py`)
    pub fn strategy_file(&self) -> PathBuf {
        self.path.join(format!("{}.py", self.strategy))
    }

    /// 고정된 설정 사본
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// 고정된 실행 파라미터
    pub fn run_config_file(&self) -> PathBuf {
        self.path.join(RUN_CONFIG_FILE)
    }

    /// 실행 로그 파일
    pub fn log_file(&self) -> PathBuf {
        self.path.join("wf.log")
    }

    /// 단계 간 비교 데이터 파일
    pub fn combined_file(&self) -> PathBuf {
        self.path.join("combined.csv")
    }

    /// 단계 디렉토리 생성 (`stage_{label}_{period}`), 이미 있으면 재사용
    pub fn stage_dir(&self, label: &str, period: &DateRange) -> Result<PathBuf> {
        let dir = self.path.join(format!("stage_{}_{}", label, period));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

fn copy_frozen(src: &Path, dst: &Path) -> Result<()> {
    std::fs::copy(src, dst).map_err(|source| WalkForwardError::ConfigCopy {
        path: src.to_path_buf(),
        source,
    })?;
    Ok(())
}
