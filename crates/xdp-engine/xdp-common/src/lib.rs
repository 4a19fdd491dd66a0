//! XDP 커널/유저스페이스 공유 타입 및 판정 로직
//!
//! 이 크레이트는 `#![no_std]` 환경에서 사용 가능한 공통 타입과,
//! 패킷당 한 번 호출되는 판정 로직을 정의합니다.
//! XDP 커널 프로그램과 유저스페이스(오프라인 검사, 테스트)가 동일한
//! 코드 경로를 사용하도록 보장합니다.
//!
//! # 모듈 구성
//! - [`rule`]: 맵 값 레이아웃 (`AclRule`, `RateLimitRule`) + 마스크 헬퍼
//! - [`table`]: 룰 테이블 추상화 (`RuleTable`, `SlotTable`)
//! - [`acl`]: 순서 기반 서브넷 ACL 매칭
//! - [`ratelimit`]: 서브넷별 고정 윈도우 레이트 리미터
//! - [`dispatch`]: 헤더 파싱 → 판정 엔진 호출
//!
//! # 맵 타입 선택 근거
//! - **Array** (`ACL_RULES`): 인덱스 = 우선순위. O(1) 조회, 빈 슬롯은 0으로 채워져 센티널 역할
//! - **HashMap** (`RATE_LIMITS`): 키 = 룰 인덱스. 엔트리마다 카운터/윈도우 상태를 제자리 갱신
//! - **PerCpuArray** (`VERDICT_STATS`): 판정 통계 — CPU별 독립 카운터, 락 프리

#![no_std]

pub mod acl;
pub mod dispatch;
pub mod ratelimit;
pub mod rule;
pub mod table;

use core::net::IpAddr;

pub use rule::{AclRule, RateLimitRule, VerdictStats};
pub use table::{RuleTable, SlotTable};

// =============================================================================
// 맵 이름 상수
// =============================================================================

/// ACL 룰 Array 맵 이름
pub const MAP_ACL_RULES: &str = "ACL_RULES";
/// 레이트 리밋 룰 HashMap 맵 이름
pub const MAP_RATE_LIMITS: &str = "RATE_LIMITS";
/// 판정 통계 PerCpuArray 맵 이름
pub const MAP_VERDICT_STATS: &str = "VERDICT_STATS";

/// ACL XDP 프로그램 이름
pub const PROG_ACL: &str = "ironfence_acl";
/// 레이트 리밋 XDP 프로그램 이름
pub const PROG_RATE_LIMIT: &str = "ironfence_ratelimit";

// =============================================================================
// 테이블 용량
// =============================================================================

/// ACL 테이블 최대 엔트리 수 (스캔 상한)
pub const ACL_MAX_ENTRIES: u32 = 128;
/// 레이트 리밋 테이블 최대 엔트리 수 (스캔 상한)
pub const RATE_LIMIT_MAX_ENTRIES: u32 = 16;

// =============================================================================
// ACL 액션 코드
// =============================================================================

/// 센티널 — 이 위치부터 룰 목록의 끝
pub const ACTION_NONE: u32 = 0;
/// 패킷 차단
pub const ACTION_BLOCK: u32 = 1;
/// 패킷 허용
pub const ACTION_ALLOW: u32 = 2;

// =============================================================================
// 기타 상수
// =============================================================================

/// 레이트 리밋 윈도우 길이 (나노초, 1초)
pub const WINDOW_NS: u64 = 1_000_000_000;

/// 유효한 마스크의 최상위 비트
///
/// 연속 프리픽스 마스크는 비어 있지 않으면 항상 이 비트가 설정됩니다.
pub const MASK_TOP_BIT: u32 = 0x8000_0000;

/// IPv4 EtherType
pub const ETH_P_IP: u16 = 0x0800;
/// IPv6 EtherType
pub const ETH_P_IPV6: u16 = 0x86DD;
/// 802.1Q VLAN 태그
pub const ETH_P_8021Q: u16 = 0x8100;
/// 802.1ad (QinQ) VLAN 태그
pub const ETH_P_8021AD: u16 = 0x88A8;

/// `xdp_action::XDP_DROP`
pub const XDP_DROP: u32 = 1;
/// `xdp_action::XDP_PASS`
pub const XDP_PASS: u32 = 2;

// =============================================================================
// 판정 / 주소 타입
// =============================================================================

/// 패킷 파이프라인에 반환하는 2값 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// 패킷 통과
    Pass,
    /// 패킷 폐기
    Drop,
}

impl Verdict {
    /// 대응하는 XDP 액션 코드를 반환합니다.
    pub const fn xdp_action(self) -> u32 {
        match self {
            Self::Pass => XDP_PASS,
            Self::Drop => XDP_DROP,
        }
    }

    /// 소문자 이름 (`"pass"`, `"drop"`)
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Drop => "drop",
        }
    }
}

/// 헤더에서 추출한 출발지 주소 (호스트 바이트 오더)
///
/// IPv6 주소는 상위 워드부터 4개의 `u32`로 저장됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceAddr {
    /// IPv4 출발지
    V4(u32),
    /// IPv6 출발지
    V6([u32; 4]),
}

impl SourceAddr {
    /// 네트워크 바이트 오더 옥텟에서 IPv4 주소를 생성합니다.
    pub const fn from_v4_octets(octets: [u8; 4]) -> Self {
        Self::V4(u32::from_be_bytes(octets))
    }

    /// 네트워크 바이트 오더 옥텟에서 IPv6 주소를 생성합니다.
    pub const fn from_v6_octets(octets: [u8; 16]) -> Self {
        Self::V6(rule::v6_words(octets))
    }
}

impl From<IpAddr> for SourceAddr {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => Self::from_v4_octets(v4.octets()),
            IpAddr::V6(v6) => Self::from_v6_octets(v6.octets()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn verdict_maps_to_xdp_action() {
        assert_eq!(Verdict::Pass.xdp_action(), XDP_PASS);
        assert_eq!(Verdict::Drop.xdp_action(), XDP_DROP);
    }

    #[test]
    fn source_addr_from_ipv4_is_host_order() {
        let src = SourceAddr::from(IpAddr::V4(Ipv4Addr::new(192, 168, 5, 5)));
        assert_eq!(src, SourceAddr::V4(0xC0A8_0505));
    }

    #[test]
    fn source_addr_from_ipv6_splits_words_most_significant_first() {
        let addr: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let src = SourceAddr::from(IpAddr::V6(addr));
        assert_eq!(src, SourceAddr::V6([0x2001_0db8, 0, 0, 1]));
    }
}
