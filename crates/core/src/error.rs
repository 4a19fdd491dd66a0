//! 에러 타입 — 도메인별 에러 정의

/// Ironfence 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum IronfenceError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// XDP 엔진 에러
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline is not running")]
    NotRunning,
}

/// XDP 엔진 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// XDP 오브젝트/프로그램 로드 실패
    #[error("program load failed: {0}")]
    ProgramLoad(String),

    /// 인터페이스 어태치/디태치 실패
    #[error("attach failed: {0}")]
    Attach(String),

    /// BPF 맵 접근 실패
    #[error("map error: {0}")]
    Map(String),

    /// 룰 파일/엔트리 에러
    #[error("rule error: {0}")]
    Rule(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_into_top_level() {
        let err: IronfenceError = ConfigError::InvalidValue {
            field: "xdp.mode".to_owned(),
            reason: "must be one of: acl, ratelimit".to_owned(),
        }
        .into();
        assert!(matches!(err, IronfenceError::Config(_)));
        assert_eq!(
            err.to_string(),
            "config error: invalid config value for 'xdp.mode': must be one of: acl, ratelimit"
        );
    }

    #[test]
    fn engine_error_display_is_prefixed() {
        let err: IronfenceError = EngineError::Rule("acl[3].ipv4: prefix /0".to_owned()).into();
        assert_eq!(err.to_string(), "engine error: rule error: acl[3].ipv4: prefix /0");
    }

    #[test]
    fn pipeline_state_errors_have_fixed_messages() {
        assert_eq!(
            PipelineError::AlreadyRunning.to_string(),
            "pipeline is already running"
        );
        assert_eq!(PipelineError::NotRunning.to_string(), "pipeline is not running");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: IronfenceError = io.into();
        assert!(matches!(err, IronfenceError::Io(_)));
    }
}
