//! Ironfence 공통 크레이트
//!
//! 데몬, CLI, XDP 엔진이 공유하는 에러 타입, 설정, 파이프라인 trait,
//! 메트릭 이름을 정의합니다.
//!
//! # 모듈 구성
//! - [`error`]: 도메인별 에러 (`IronfenceError`)
//! - [`config`]: `ironfence.toml` 파싱 + 환경변수 오버라이드
//! - [`pipeline`]: 모듈 생명주기 trait (`Pipeline`, `HealthStatus`)
//! - [`metrics`]: Prometheus 메트릭 이름 및 설명

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, EngineError, IronfenceError, PipelineError};

// 설정
pub use config::IronfenceConfig;

// 파이프라인 trait
pub use pipeline::{HealthStatus, Pipeline};
