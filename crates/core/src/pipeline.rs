//! 파이프라인 trait — 모듈 생명주기 정의

use std::future::Future;

use serde::Serialize;

use crate::error::IronfenceError;

/// 모듈 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 일부 기능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 시작/정지/상태 확인을 지원하는 장기 실행 모듈
///
/// # 생명주기
/// ```text
/// build() → start() → Running → stop() → Stopped
/// ```
pub trait Pipeline: Send {
    /// 모듈을 시작합니다. 이미 실행 중이면 `PipelineError::AlreadyRunning`입니다.
    fn start(&mut self) -> impl Future<Output = Result<(), IronfenceError>> + Send;

    /// 모듈을 정지합니다. 실행 중이 아니면 `PipelineError::NotRunning`입니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), IronfenceError>> + Send;

    /// 현재 건강 상태를 반환합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_predicates() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(!HealthStatus::Degraded("poller".to_owned()).is_healthy());
        assert!(!HealthStatus::Degraded("poller".to_owned()).is_unhealthy());
        assert!(HealthStatus::Unhealthy("not running".to_owned()).is_unhealthy());
    }
}
