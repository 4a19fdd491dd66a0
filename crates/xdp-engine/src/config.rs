//! 엔진 설정 — 판정 모드 및 룰 파일 컴파일
//!
//! [`EngineConfig`]는 core의 [`XdpConfig`]를 확장하여 판정 모드를 타입으로 가집니다.
//! [`RuleFile`]은 TOML 룰 파일을 파싱하고 커널 맵 엔트리로 컴파일합니다.
//!
//! # 룰 파일 예시 (TOML)
//! ```toml
//! [[acl]]
//! action = "allow"
//! ipv4 = "192.168.0.0/16"
//!
//! [[acl]]
//! action = "block"          # ipv4/ipv6 모두 없음: 기본 엔트리
//!
//! [[rate_limit]]
//! limit = 3
//! ipv4 = "10.0.0.0/8"
//! ipv6 = "fd00::/8"
//! ```
//!
//! # 컴파일 규칙
//! - `/0` 프리픽스는 거부합니다. 마스크 0은 커널에서 "해당 패밀리 룰 없음"을 뜻합니다.
//! - 호스트 비트가 설정된 네트워크(`10.1.2.3/8`)는 경고 후 마스킹합니다.
//! - 테이블 용량을 넘는 룰은 에러입니다.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ipnetwork::{Ipv4Network, Ipv6Network};
use serde::{Deserialize, Serialize};
use tracing::warn;

use ironfence_core::config::XdpConfig;
use ironfence_core::error::{ConfigError, EngineError, IronfenceError};
use ironfence_xdp_common::rule::{v4_prefix_mask, v6_prefix_mask, v6_words};
use ironfence_xdp_common::{
    ACL_MAX_ENTRIES, ACTION_ALLOW, ACTION_BLOCK, AclRule, PROG_ACL, PROG_RATE_LIMIT,
    RATE_LIMIT_MAX_ENTRIES, RateLimitRule, SlotTable,
};

/// 유저스페이스 ACL 테이블 (커널 `ACL_RULES`와 같은 용량)
pub type AclTable = SlotTable<AclRule, { ACL_MAX_ENTRIES as usize }>;

/// 유저스페이스 레이트 리밋 테이블 (커널 `RATE_LIMITS`와 같은 용량)
pub type RateLimitTable = SlotTable<RateLimitRule, { RATE_LIMIT_MAX_ENTRIES as usize }>;

// =============================================================================
// 판정 모드
// =============================================================================

/// 인터페이스에 어태치할 판정 엔진
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// 순서 기반 서브넷 ACL
    Acl,
    /// 서브넷별 고정 윈도우 레이트 리미터
    #[serde(rename = "ratelimit")]
    RateLimit,
}

impl FilterMode {
    /// 설정 파일 표기를 반환합니다.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acl => "acl",
            Self::RateLimit => "ratelimit",
        }
    }

    /// 오브젝트 파일 안의 XDP 프로그램 이름을 반환합니다.
    pub fn program_name(self) -> &'static str {
        match self {
            Self::Acl => PROG_ACL,
            Self::RateLimit => PROG_RATE_LIMIT,
        }
    }
}

impl FromStr for FilterMode {
    type Err = IronfenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "acl" => Ok(Self::Acl),
            "ratelimit" => Ok(Self::RateLimit),
            other => Err(ConfigError::InvalidValue {
                field: "xdp.mode".to_owned(),
                reason: format!("unknown filter mode '{other}' (expected acl or ratelimit)"),
            }
            .into()),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// 엔진 설정
// =============================================================================

/// XDP 엔진 설정
///
/// core의 [`XdpConfig`]를 그대로 보관하고, 문자열 모드를 [`FilterMode`]로 파싱해 둡니다.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// core에서 가져온 기본 설정
    pub base: XdpConfig,
    /// 판정 모드
    pub mode: FilterMode,
}

impl EngineConfig {
    /// core XdpConfig에서 엔진 설정을 생성합니다.
    pub fn from_core(config: &XdpConfig) -> Result<Self, IronfenceError> {
        Ok(Self {
            base: config.clone(),
            mode: config.mode.parse()?,
        })
    }
}

// =============================================================================
// 룰 파일
// =============================================================================

/// ACL 엔트리 액션
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// 통과 (XDP_PASS)
    Allow,
    /// 폐기 (XDP_DROP)
    Block,
}

impl RuleAction {
    /// 커널 맵의 액션 코드를 반환합니다.
    pub fn code(self) -> u32 {
        match self {
            Self::Allow => ACTION_ALLOW,
            Self::Block => ACTION_BLOCK,
        }
    }
}

/// ACL 룰 한 줄
///
/// `ipv4`와 `ipv6`가 모두 없으면 모든 주소에 매칭되는 기본 엔트리입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AclEntry {
    /// 매칭 시 액션
    pub action: RuleAction,
    /// IPv4 서브넷
    #[serde(default)]
    pub ipv4: Option<Ipv4Network>,
    /// IPv6 서브넷
    #[serde(default)]
    pub ipv6: Option<Ipv6Network>,
}

/// 레이트 리밋 룰 한 줄
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitEntry {
    /// 1초 윈도우당 허용 패킷 수
    pub limit: u32,
    /// IPv4 서브넷
    #[serde(default)]
    pub ipv4: Option<Ipv4Network>,
    /// IPv6 서브넷
    #[serde(default)]
    pub ipv6: Option<Ipv6Network>,
}

/// TOML 룰 파일의 최상위 구조
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleFile {
    /// 우선순위 순 ACL 룰
    #[serde(default)]
    pub acl: Vec<AclEntry>,
    /// 레이트 리밋 룰
    #[serde(default)]
    pub rate_limit: Vec<RateLimitEntry>,
}

impl RuleFile {
    /// TOML 파일에서 룰을 로드합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IronfenceError> {
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

    /// TOML 문자열에서 룰을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, IronfenceError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Rule(e.to_string()).into())
    }

    /// ACL 룰을 커널 엔트리로 컴파일합니다. 반환 순서가 곧 우선순위입니다.
    pub fn compile_acl(&self) -> Result<Vec<AclRule>, IronfenceError> {
        check_capacity("acl", self.acl.len(), ACL_MAX_ENTRIES)?;

        let mut compiled = Vec::with_capacity(self.acl.len());
        for (index, entry) in self.acl.iter().enumerate() {
            let field = |name: &str| format!("acl[{index}].{name}");
            let mut rule = AclRule::default_rule(entry.action.code());

            if let Some(net) = entry.ipv4 {
                let (addr, mask) = compile_v4(&field("ipv4"), net)?;
                rule.ipv4_net = addr;
                rule.ipv4_mask = mask;
            }
            if let Some(net) = entry.ipv6 {
                let (addr, mask) = compile_v6(&field("ipv6"), net)?;
                rule.ipv6_net = addr;
                rule.ipv6_mask = mask;
            }

            if rule.is_default() && index + 1 < self.acl.len() {
                warn!(
                    rule = index,
                    shadowed = self.acl.len() - index - 1,
                    "default acl entry is not last; later entries are unreachable"
                );
            }
            compiled.push(rule);
        }
        Ok(compiled)
    }

    /// 레이트 리밋 룰을 커널 엔트리로 컴파일합니다. 카운터는 0으로 시작합니다.
    pub fn compile_rate_limits(&self) -> Result<Vec<RateLimitRule>, IronfenceError> {
        check_capacity("rate_limit", self.rate_limit.len(), RATE_LIMIT_MAX_ENTRIES)?;

        let mut compiled = Vec::with_capacity(self.rate_limit.len());
        for (index, entry) in self.rate_limit.iter().enumerate() {
            let field = |name: &str| format!("rate_limit[{index}].{name}");
            if entry.ipv4.is_none() && entry.ipv6.is_none() {
                return Err(EngineError::Rule(format!(
                    "{}: at least one of ipv4 or ipv6 is required",
                    field("ipv4")
                ))
                .into());
            }

            let mut rule = RateLimitRule::zeroed();
            rule.limit = entry.limit;
            if let Some(net) = entry.ipv4 {
                let (addr, mask) = compile_v4(&field("ipv4"), net)?;
                rule.ipv4_net = addr;
                rule.ipv4_mask = mask;
            }
            if let Some(net) = entry.ipv6 {
                let (addr, mask) = compile_v6(&field("ipv6"), net)?;
                rule.ipv6_net = addr;
                rule.ipv6_mask = mask;
            }
            compiled.push(rule);
        }
        Ok(compiled)
    }

    /// 컴파일된 ACL 룰로 유저스페이스 테이블을 채웁니다.
    pub fn acl_table(&self) -> Result<AclTable, IronfenceError> {
        fill_table(self.compile_acl()?)
    }

    /// 컴파일된 레이트 리밋 룰로 유저스페이스 테이블을 채웁니다.
    pub fn rate_limit_table(&self) -> Result<RateLimitTable, IronfenceError> {
        fill_table(self.compile_rate_limits()?)
    }
}

// --- 컴파일 헬퍼 ---

fn check_capacity(table: &str, len: usize, capacity: u32) -> Result<(), IronfenceError> {
    if len > capacity as usize {
        return Err(EngineError::Rule(format!(
            "{table}: {len} rules exceed table capacity of {capacity}"
        ))
        .into());
    }
    Ok(())
}

fn compile_v4(field: &str, net: Ipv4Network) -> Result<(u32, u32), IronfenceError> {
    let prefix = net.prefix();
    if prefix == 0 {
        return Err(zero_prefix(field));
    }
    let network = net.network();
    if network != net.ip() {
        warn!(field, given = %net, masked = %network, "host bits set in network; masking");
    }
    let mask = v4_prefix_mask(prefix);
    Ok((u32::from(network) & mask, mask))
}

fn compile_v6(field: &str, net: Ipv6Network) -> Result<([u32; 4], [u32; 4]), IronfenceError> {
    let prefix = net.prefix();
    if prefix == 0 {
        return Err(zero_prefix(field));
    }
    let network = net.network();
    if network != net.ip() {
        warn!(field, given = %net, masked = %network, "host bits set in network; masking");
    }
    let mask = v6_prefix_mask(prefix);
    let words = v6_words(network.octets());
    Ok((
        [
            words[0] & mask[0],
            words[1] & mask[1],
            words[2] & mask[2],
            words[3] & mask[3],
        ],
        mask,
    ))
}

fn zero_prefix(field: &str) -> IronfenceError {
    EngineError::Rule(format!(
        "{field}: /0 prefix is not allowed; omit both ipv4 and ipv6 for a default entry"
    ))
    .into()
}

fn fill_table<T, const N: usize>(rules: Vec<T>) -> Result<SlotTable<T, N>, IronfenceError> {
    let mut table = SlotTable::new();
    for (index, rule) in rules.into_iter().enumerate() {
        let index = u32::try_from(index)
            .map_err(|_| EngineError::Rule(format!("rule index {index} out of range")))?;
        table
            .insert(index, rule)
            .map_err(|e| EngineError::Rule(format!("rule index {} exceeds table capacity", e.0)))?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironfence_xdp_common::{ACTION_NONE, MASK_TOP_BIT};

    fn rule_err(err: IronfenceError) -> String {
        match err {
            IronfenceError::Engine(EngineError::Rule(msg)) => msg,
            other => panic!("expected rule error, got {other:?}"),
        }
    }

    // =============================================================================
    // FilterMode / EngineConfig
    // =============================================================================

    #[test]
    fn filter_mode_parses_config_strings() {
        assert_eq!("acl".parse::<FilterMode>().unwrap(), FilterMode::Acl);
        assert_eq!(
            "ratelimit".parse::<FilterMode>().unwrap(),
            FilterMode::RateLimit
        );
        assert!("firewall".parse::<FilterMode>().is_err());
    }

    #[test]
    fn filter_mode_selects_program() {
        assert_eq!(FilterMode::Acl.program_name(), PROG_ACL);
        assert_eq!(FilterMode::RateLimit.program_name(), PROG_RATE_LIMIT);
        assert_eq!(FilterMode::RateLimit.to_string(), "ratelimit");
    }

    #[test]
    fn engine_config_from_core_parses_mode() {
        let core = XdpConfig {
            mode: "ratelimit".to_owned(),
            ..XdpConfig::default()
        };
        let config = EngineConfig::from_core(&core).unwrap();
        assert_eq!(config.mode, FilterMode::RateLimit);
        assert_eq!(config.base.interface, core.interface);
    }

    #[test]
    fn engine_config_rejects_unknown_mode() {
        let core = XdpConfig {
            mode: "both".to_owned(),
            ..XdpConfig::default()
        };
        let err = EngineConfig::from_core(&core).unwrap_err();
        assert!(matches!(
            err,
            IronfenceError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    // =============================================================================
    // 파싱
    // =============================================================================

    #[test]
    fn parse_empty_file() {
        let rules = RuleFile::parse("").unwrap();
        assert!(rules.acl.is_empty());
        assert!(rules.rate_limit.is_empty());
    }

    #[test]
    fn parse_rejects_unknown_action() {
        let err = RuleFile::parse("[[acl]]\naction = \"monitor\"\n").unwrap_err();
        assert!(matches!(err, IronfenceError::Engine(EngineError::Rule(_))));
    }

    #[test]
    fn parse_rejects_unknown_field() {
        let err = RuleFile::parse("[[acl]]\naction = \"allow\"\nsrc = \"10.0.0.0/8\"\n").unwrap_err();
        assert!(matches!(err, IronfenceError::Engine(EngineError::Rule(_))));
    }

    #[test]
    fn parse_rejects_bad_cidr() {
        let err = RuleFile::parse("[[acl]]\naction = \"allow\"\nipv4 = \"10.0.0.0/33\"\n").unwrap_err();
        assert!(matches!(err, IronfenceError::Engine(EngineError::Rule(_))));
    }

    // =============================================================================
    // ACL 컴파일
    // =============================================================================

    #[test]
    fn compile_acl_keeps_order_and_masks() {
        let rules = RuleFile::parse(
            r#"
[[acl]]
action = "allow"
ipv4 = "192.168.0.0/16"

[[acl]]
action = "block"
ipv6 = "fd00::/8"

[[acl]]
action = "block"
"#,
        )
        .unwrap();

        let compiled = rules.compile_acl().unwrap();
        assert_eq!(compiled.len(), 3);

        assert_eq!(compiled[0].action, ACTION_ALLOW);
        assert_eq!(compiled[0].ipv4_net, 0xC0A8_0000);
        assert_eq!(compiled[0].ipv4_mask, 0xFFFF_0000);
        assert!(!compiled[0].has_ipv6_rule());

        assert_eq!(compiled[1].action, ACTION_BLOCK);
        assert_eq!(compiled[1].ipv6_net, [0xFD00_0000, 0, 0, 0]);
        assert_eq!(compiled[1].ipv6_mask, [0xFF00_0000, 0, 0, 0]);
        assert_eq!(compiled[1].ipv4_mask, 0);

        assert!(compiled[2].is_default());
        assert!(!compiled[2].is_sentinel());
    }

    #[test]
    fn compile_acl_masks_host_bits() {
        let rules = RuleFile::parse("[[acl]]\naction = \"block\"\nipv4 = \"10.1.2.3/8\"\n").unwrap();
        let compiled = rules.compile_acl().unwrap();
        assert_eq!(compiled[0].ipv4_net, 0x0A00_0000);
        assert_eq!(compiled[0].ipv4_mask, 0xFF00_0000);
    }

    #[test]
    fn compile_acl_rejects_zero_prefix() {
        let rules = RuleFile::parse(
            "[[acl]]\naction = \"allow\"\nipv4 = \"10.0.0.0/8\"\n\n[[acl]]\naction = \"block\"\nipv6 = \"::/0\"\n",
        )
        .unwrap();
        let msg = rule_err(rules.compile_acl().err().expect("compile should fail"));
        assert!(msg.starts_with("acl[1].ipv6"), "unexpected message: {msg}");
    }

    #[test]
    fn compile_acl_rejects_overflow() {
        let rules = RuleFile {
            acl: (0..=ACL_MAX_ENTRIES)
                .map(|_| AclEntry {
                    action: RuleAction::Allow,
                    ipv4: None,
                    ipv6: None,
                })
                .collect(),
            rate_limit: Vec::new(),
        };
        let msg = rule_err(rules.compile_acl().err().expect("compile should fail"));
        assert!(msg.contains("capacity"));
    }

    #[test]
    fn compile_acl_accepts_full_table() {
        let rules = RuleFile {
            acl: (0..ACL_MAX_ENTRIES)
                .map(|_| AclEntry {
                    action: RuleAction::Block,
                    ipv4: Some("10.0.0.0/8".parse().unwrap()),
                    ipv6: None,
                })
                .collect(),
            rate_limit: Vec::new(),
        };
        assert_eq!(rules.compile_acl().unwrap().len(), ACL_MAX_ENTRIES as usize);
    }

    #[test]
    fn compiled_acl_never_contains_sentinel() {
        let rules = RuleFile::parse("[[acl]]\naction = \"allow\"\n").unwrap();
        let compiled = rules.compile_acl().unwrap();
        assert_ne!(compiled[0].action, ACTION_NONE);
    }

    #[test]
    fn acl_table_fills_slots_in_order() {
        let rules = RuleFile::parse(
            "[[acl]]\naction = \"block\"\nipv4 = \"10.0.0.0/8\"\n\n[[acl]]\naction = \"allow\"\n",
        )
        .unwrap();
        let mut table = rules.acl_table().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.snapshot(0).map(|r| r.action), Some(ACTION_BLOCK));
        assert_eq!(table.snapshot(1).map(|r| r.action), Some(ACTION_ALLOW));
        assert!(table.snapshot(2).is_none());
    }

    // =============================================================================
    // 레이트 리밋 컴파일
    // =============================================================================

    #[test]
    fn compile_rate_limits_dual_stack() {
        let rules = RuleFile::parse(
            "[[rate_limit]]\nlimit = 3\nipv4 = \"10.0.0.0/8\"\nipv6 = \"fd00::/8\"\n",
        )
        .unwrap();
        let compiled = rules.compile_rate_limits().unwrap();
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].limit, 3);
        assert_eq!(compiled[0].ipv4_net, 0x0A00_0000);
        assert_eq!(compiled[0].ipv6_mask[0] & MASK_TOP_BIT, MASK_TOP_BIT);
        assert_eq!(compiled[0].packet_count, 0);
        assert_eq!(compiled[0].next_interval_start, 0);
    }

    #[test]
    fn compile_rate_limits_requires_a_network() {
        let rules = RuleFile::parse("[[rate_limit]]\nlimit = 10\n").unwrap();
        let msg = rule_err(rules.compile_rate_limits().err().expect("compile should fail"));
        assert!(msg.starts_with("rate_limit[0]"));
    }

    #[test]
    fn compile_rate_limits_rejects_overflow() {
        let rules = RuleFile {
            acl: Vec::new(),
            rate_limit: (0..=RATE_LIMIT_MAX_ENTRIES)
                .map(|_| RateLimitEntry {
                    limit: 1,
                    ipv4: Some("10.0.0.0/8".parse().unwrap()),
                    ipv6: None,
                })
                .collect(),
        };
        assert!(rules.compile_rate_limits().is_err());
    }

    #[test]
    fn compile_v6_masks_host_bits_across_words() {
        let (net, mask) = compile_v6("x", "2001:db8::1/33".parse().unwrap()).unwrap();
        assert_eq!(mask, [u32::MAX, 0x8000_0000, 0, 0]);
        assert_eq!(net, [0x2001_0DB8, 0, 0, 0]);
    }

    #[tokio::test]
    async fn load_missing_file_is_file_not_found() {
        let err = RuleFile::load("/nonexistent/ironfence/rules.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IronfenceError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
