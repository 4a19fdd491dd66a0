//! Ironfence XDP 필터 엔진 (유저스페이스)
//!
//! 룰 파일을 커널 맵 엔트리로 컴파일하고, XDP 판정 프로그램을 로드/어태치하며,
//! 카운터와 판정 통계를 폴링하여 메트릭으로 노출합니다.
//!
//! # 모듈 구성
//! - [`config`]: 판정 모드, 룰 파일 파싱 및 컴파일
//! - [`engine`]: FilterEngine — XDP 프로그램 로드/관리, Pipeline trait 구현
//! - [`stats`]: 판정 통계 (PerCpuArray 기반) 및 레이트 리밋 카운터 추적
//!
//! # 공유 타입
//! 커널/유저스페이스 공유 타입과 판정 로직은 [`ironfence_xdp_common`] 크레이트에 정의되어 있습니다.

pub mod config;
pub mod engine;
pub mod stats;

// --- 주요 타입 re-export ---

// 엔진
pub use engine::{CompiledRules, FilterEngine, FilterEngineBuilder};

// 설정
pub use config::{
    AclEntry, AclTable, EngineConfig, FilterMode, RateLimitEntry, RateLimitTable, RuleAction,
    RuleFile,
};

// 통계
pub use stats::{CounterTracker, VerdictMetrics, VerdictSnapshot};

// 공유 타입 (커널/유저스페이스 공통)
pub use ironfence_xdp_common;
