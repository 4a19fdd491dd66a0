//! 설정 관리 — ironfence.toml 파싱 및 런타임 설정
//!
//! [`IronfenceConfig`]는 데몬과 CLI가 공유하는 최상위 설정 구조체입니다.
//! 필터링 룰 자체는 별도 룰 파일(`xdp.rules_path`)에 있습니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`IRONFENCE_XDP_INTERFACE=eth0` 형식)
//! 3. 설정 파일 (`ironfence.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), ironfence_core::error::IronfenceError> {
//! use ironfence_core::config::IronfenceConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = IronfenceConfig::load("ironfence.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = IronfenceConfig::parse("[xdp]\nmode = \"ratelimit\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, IronfenceError};

/// 허용되는 로그 레벨
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
/// 허용되는 로그 형식
pub const LOG_FORMATS: [&str; 2] = ["json", "pretty"];
/// 허용되는 XDP 어태치 모드
pub const XDP_MODES: [&str; 3] = ["native", "skb", "hw"];
/// 허용되는 판정 엔진
pub const FILTER_MODES: [&str; 2] = ["acl", "ratelimit"];

/// Ironfence 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IronfenceConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// XDP 필터 설정
    #[serde(default)]
    pub xdp: XdpConfig,
    /// 메트릭 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl IronfenceConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IronfenceError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IronfenceError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IronfenceError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                IronfenceError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, IronfenceError> {
        toml::from_str(toml_str).map_err(|e| {
            IronfenceError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `IRONFENCE_{SECTION}_{FIELD}`
    /// 예: `IRONFENCE_XDP_INTERFACE=eth0`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "IRONFENCE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IRONFENCE_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "IRONFENCE_GENERAL_PID_FILE");

        // XDP
        override_bool(&mut self.xdp.enabled, "IRONFENCE_XDP_ENABLED");
        override_string(&mut self.xdp.interface, "IRONFENCE_XDP_INTERFACE");
        override_string(&mut self.xdp.xdp_mode, "IRONFENCE_XDP_XDP_MODE");
        override_string(&mut self.xdp.program_path, "IRONFENCE_XDP_PROGRAM_PATH");
        override_string(&mut self.xdp.mode, "IRONFENCE_XDP_MODE");
        override_string(&mut self.xdp.rules_path, "IRONFENCE_XDP_RULES_PATH");
        override_u64(
            &mut self.xdp.counter_poll_interval_ms,
            "IRONFENCE_XDP_COUNTER_POLL_INTERVAL_MS",
        );
        override_u64(
            &mut self.xdp.stats_poll_interval_secs,
            "IRONFENCE_XDP_STATS_POLL_INTERVAL_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "IRONFENCE_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "IRONFENCE_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "IRONFENCE_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "IRONFENCE_METRICS_ENDPOINT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IronfenceError> {
        one_of("general.log_level", &self.general.log_level, &LOG_LEVELS)?;
        one_of("general.log_format", &self.general.log_format, &LOG_FORMATS)?;

        // 판정 엔진은 CLI 오프라인 검사에서도 쓰이므로 항상 검증
        one_of("xdp.mode", &self.xdp.mode, &FILTER_MODES)?;

        if self.xdp.enabled {
            one_of("xdp.xdp_mode", &self.xdp.xdp_mode, &XDP_MODES)?;

            if self.xdp.interface.is_empty() {
                return Err(invalid(
                    "xdp.interface",
                    "interface must not be empty when xdp is enabled",
                ));
            }
            if self.xdp.program_path.is_empty() {
                return Err(invalid(
                    "xdp.program_path",
                    "program_path must not be empty when xdp is enabled",
                ));
            }
            if self.xdp.counter_poll_interval_ms == 0 {
                return Err(invalid("xdp.counter_poll_interval_ms", "must be greater than 0"));
            }
            if self.xdp.stats_poll_interval_secs == 0 {
                return Err(invalid("xdp.stats_poll_interval_secs", "must be greater than 0"));
            }
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(invalid("metrics.port", "must be greater than 0"));
            }
            if !self.metrics.endpoint.starts_with('/') {
                return Err(invalid("metrics.endpoint", "must start with '/'"));
            }
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 사용 안 함)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: "/var/run/ironfence.pid".to_owned(),
        }
    }
}

/// XDP 필터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XdpConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 어태치할 네트워크 인터페이스
    pub interface: String,
    /// XDP 어태치 모드 (native, skb, hw)
    pub xdp_mode: String,
    /// 컴파일된 XDP 오브젝트 경로
    pub program_path: String,
    /// 판정 엔진 (acl, ratelimit)
    pub mode: String,
    /// 룰 파일 경로
    pub rules_path: String,
    /// 레이트 리밋 카운터 폴링 주기 (밀리초)
    pub counter_poll_interval_ms: u64,
    /// 판정 통계 폴링 주기 (초)
    pub stats_poll_interval_secs: u64,
}

impl Default for XdpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interface: "eth0".to_owned(),
            xdp_mode: "skb".to_owned(),
            program_path: "/usr/lib/ironfence/ironfence-xdp".to_owned(),
            mode: "acl".to_owned(),
            rules_path: "/etc/ironfence/rules.toml".to_owned(),
            counter_poll_interval_ms: 100,
            stats_poll_interval_secs: 1,
        }
    }
}

/// 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 검증 헬퍼 ---

fn one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), IronfenceError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, &format!("must be one of: {}", allowed.join(", "))))
    }
}

fn invalid(field: &str, reason: &str) -> IronfenceError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
    .into()
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}
