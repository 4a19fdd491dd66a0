//! 패킷 디스패치 — 헤더 파싱 → 판정 엔진 호출
//!
//! 어떤 파싱 실패도 PASS로 끝납니다 (fail-open).
//! 커널은 `xdp_md` 경계 검사 접근자로, 유저스페이스는 바이트 슬라이스로
//! [`PacketBytes`]를 구현하여 같은 파싱 경로를 사용합니다.

use crate::acl::AclMatcher;
use crate::ratelimit::{Clock, RateLimiter};
use crate::rule::{AclRule, RateLimitRule};
use crate::table::RuleTable;
use crate::{ETH_P_8021AD, ETH_P_8021Q, ETH_P_IP, ETH_P_IPV6, SourceAddr, Verdict};

/// 이더넷 헤더 길이
pub const ETH_HDR_LEN: usize = 14;
/// VLAN 태그 길이
pub const VLAN_HDR_LEN: usize = 4;
/// 최대 VLAN 태그 깊이 (802.1ad + 802.1Q)
pub const VLAN_MAX_DEPTH: usize = 2;
/// 옵션 없는 IPv4 헤더 길이
pub const IPV4_MIN_HDR_LEN: usize = 20;
/// IPv6 고정 헤더 길이
pub const IPV6_HDR_LEN: usize = 40;

const IPV4_SRC_OFFSET: usize = 12;
const IPV6_SRC_OFFSET: usize = 8;

/// 경계 검사가 포함된 패킷 바이트 접근자
pub trait PacketBytes {
    /// `offset`부터 `N` 바이트를 읽습니다. 범위를 벗어나면 `None`입니다.
    fn read<const N: usize>(&self, offset: usize) -> Option<[u8; N]>;
}

impl PacketBytes for [u8] {
    #[inline]
    fn read<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let end = offset.checked_add(N)?;
        self.get(offset..end)?.try_into().ok()
    }
}

/// 출발지 주소에 대한 판정 엔진
///
/// 배포마다 ACL 또는 레이트 리밋 중 하나가 선택됩니다.
pub trait DecisionEngine {
    /// 출발지 주소에 대한 판정을 반환합니다.
    fn evaluate(&self, src: &SourceAddr) -> Verdict;
}

impl<T: RuleTable<AclRule>> DecisionEngine for AclMatcher<T> {
    #[inline(always)]
    fn evaluate(&self, src: &SourceAddr) -> Verdict {
        self.classify(src)
    }
}

impl<T: RuleTable<RateLimitRule>, C: Clock> DecisionEngine for RateLimiter<T, C> {
    #[inline(always)]
    fn evaluate(&self, src: &SourceAddr) -> Verdict {
        self.admit(src)
    }
}

/// 패킷을 파싱하고 판정 엔진의 결과를 그대로 반환합니다.
#[inline(always)]
pub fn decide<P, E>(packet: &P, engine: &E) -> Verdict
where
    P: PacketBytes + ?Sized,
    E: DecisionEngine,
{
    match parse_source(packet) {
        Some(src) => engine.evaluate(&src),
        None => Verdict::Pass,
    }
}

/// 링크 계층과 IP 헤더를 파싱하여 출발지 주소를 추출합니다.
///
/// IPv4/IPv6 이외의 EtherType, 잘린 헤더는 `None`입니다.
#[inline(always)]
pub fn parse_source<P: PacketBytes + ?Sized>(packet: &P) -> Option<SourceAddr> {
    let (ether_type, offset) = parse_link_layer(packet)?;
    match ether_type {
        ETH_P_IP => parse_ipv4(packet, offset).map(SourceAddr::from_v4_octets),
        ETH_P_IPV6 => parse_ipv6(packet, offset).map(SourceAddr::from_v6_octets),
        _ => None,
    }
}

/// 이더넷 헤더와 최대 두 개의 VLAN 태그를 건너뜁니다.
///
/// 내부 EtherType과 L3 헤더 오프셋을 반환합니다.
#[inline(always)]
pub fn parse_link_layer<P: PacketBytes + ?Sized>(packet: &P) -> Option<(u16, usize)> {
    let mut ether_type = u16::from_be_bytes(packet.read::<2>(ETH_HDR_LEN - 2)?);
    let mut offset = ETH_HDR_LEN;

    for _ in 0..VLAN_MAX_DEPTH {
        if ether_type != ETH_P_8021Q && ether_type != ETH_P_8021AD {
            break;
        }
        // TCI(2) 다음 2바이트가 캡슐화된 EtherType
        ether_type = u16::from_be_bytes(packet.read::<2>(offset + 2)?);
        offset += VLAN_HDR_LEN;
    }

    Some((ether_type, offset))
}

/// IPv4 헤더를 검증하고 출발지 주소 옥텟을 반환합니다.
///
/// IHL이 5 미만이거나 헤더 전체가 프레임 안에 없으면 실패합니다.
#[inline(always)]
pub fn parse_ipv4<P: PacketBytes + ?Sized>(packet: &P, offset: usize) -> Option<[u8; 4]> {
    let [version_ihl] = packet.read::<1>(offset)?;
    let hdr_len = usize::from(version_ihl & 0x0F) * 4;
    if hdr_len < IPV4_MIN_HDR_LEN {
        return None;
    }
    // 옵션 포함 헤더 끝 바이트까지 존재해야 함
    packet.read::<1>(offset + hdr_len - 1)?;
    packet.read::<4>(offset + IPV4_SRC_OFFSET)
}

/// IPv6 고정 헤더를 검증하고 출발지 주소 옥텟을 반환합니다.
#[inline(always)]
pub fn parse_ipv6<P: PacketBytes + ?Sized>(packet: &P, offset: usize) -> Option<[u8; 16]> {
    packet.read::<1>(offset + IPV6_HDR_LEN - 1)?;
    packet.read::<16>(offset + IPV6_SRC_OFFSET)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::rule::{v4_prefix_mask, v6_prefix_mask, v6_words};
    use crate::table::SlotTable;
    use crate::{ACTION_ALLOW, ACTION_BLOCK};
    use std::vec::Vec;

    fn eth(ether_type: u16) -> Vec<u8> {
        let mut frame = std::vec![0u8; 12];
        frame.extend_from_slice(&ether_type.to_be_bytes());
        frame
    }

    fn ipv4_frame(src: [u8; 4]) -> Vec<u8> {
        let mut frame = eth(ETH_P_IP);
        let mut hdr = [0u8; 20];
        hdr[0] = 0x45;
        hdr[9] = 17;
        hdr[12..16].copy_from_slice(&src);
        hdr[16..20].copy_from_slice(&[192, 0, 2, 1]);
        frame.extend_from_slice(&hdr);
        frame
    }

    fn ipv6_frame(src: [u8; 16]) -> Vec<u8> {
        let mut frame = eth(ETH_P_IPV6);
        let mut hdr = [0u8; 40];
        hdr[0] = 0x60;
        hdr[8..24].copy_from_slice(&src);
        frame.extend_from_slice(&hdr);
        frame
    }

    fn v6_octets(text: &str) -> [u8; 16] {
        text.parse::<core::net::Ipv6Addr>().unwrap().octets()
    }

    fn block_ten() -> AclMatcher<SlotTable<AclRule, 128>> {
        let mut table = SlotTable::new();
        table
            .insert(0, AclRule::v4(ACTION_BLOCK, 0x0A00_0000, v4_prefix_mask(8)))
            .unwrap();
        table
            .insert(
                1,
                AclRule::v6(ACTION_BLOCK, v6_words(v6_octets("fd00::")), v6_prefix_mask(8)),
            )
            .unwrap();
        table.insert(2, AclRule::default_rule(ACTION_ALLOW)).unwrap();
        AclMatcher::new(table)
    }

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_ns(&self) -> u64 {
            self.0
        }
    }

    // =============================================================================
    // 헤더 파싱
    // =============================================================================

    #[test]
    fn parses_ipv4_source() {
        let frame = ipv4_frame([10, 1, 2, 3]);
        assert_eq!(
            parse_source(frame.as_slice()),
            Some(SourceAddr::V4(0x0A01_0203))
        );
    }

    #[test]
    fn parses_ipv6_source() {
        let frame = ipv6_frame(v6_octets("2001:db8::1"));
        assert_eq!(
            parse_source(frame.as_slice()),
            Some(SourceAddr::V6([0x2001_0DB8, 0, 0, 1]))
        );
    }

    #[test]
    fn skips_vlan_tags() {
        let mut frame = eth(ETH_P_8021AD);
        frame.extend_from_slice(&[0x00, 0x64]);
        frame.extend_from_slice(&ETH_P_8021Q.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x0A]);
        frame.extend_from_slice(&ETH_P_IP.to_be_bytes());
        let ip = ipv4_frame([10, 0, 0, 9]);
        frame.extend_from_slice(&ip[ETH_HDR_LEN..]);

        assert_eq!(
            parse_link_layer(frame.as_slice()),
            Some((ETH_P_IP, ETH_HDR_LEN + 2 * VLAN_HDR_LEN))
        );
        assert_eq!(
            parse_source(frame.as_slice()),
            Some(SourceAddr::V4(0x0A00_0009))
        );
    }

    #[test]
    fn ipv4_options_are_accepted_when_present() {
        let mut frame = ipv4_frame([10, 0, 0, 1]);
        frame[ETH_HDR_LEN] = 0x46;
        assert_eq!(parse_source(frame.as_slice()), None);
        frame.extend_from_slice(&[1, 1, 1, 0]);
        assert_eq!(
            parse_source(frame.as_slice()),
            Some(SourceAddr::V4(0x0A00_0001))
        );
    }

    #[test]
    fn malformed_headers_fail_to_parse() {
        assert_eq!(parse_source([0u8; 13].as_slice()), None);

        let frame = ipv4_frame([10, 0, 0, 1]);
        assert_eq!(parse_source(&frame[..frame.len() - 1]), None);

        let mut short_ihl = ipv4_frame([10, 0, 0, 1]);
        short_ihl[ETH_HDR_LEN] = 0x44;
        assert_eq!(parse_source(short_ihl.as_slice()), None);

        let frame = ipv6_frame([0; 16]);
        assert_eq!(parse_source(&frame[..frame.len() - 1]), None);

        let arp = eth(0x0806);
        assert_eq!(parse_source(arp.as_slice()), None);
    }

    // =============================================================================
    // 디스패치
    // =============================================================================

    #[test]
    fn decide_returns_engine_verdict() {
        let acl = block_ten();
        assert_eq!(decide(ipv4_frame([10, 9, 9, 9]).as_slice(), &acl), Verdict::Drop);
        assert_eq!(decide(ipv4_frame([11, 0, 0, 1]).as_slice(), &acl), Verdict::Pass);
        assert_eq!(
            decide(ipv6_frame(v6_octets("fd00::5")).as_slice(), &acl),
            Verdict::Drop
        );
        assert_eq!(
            decide(ipv6_frame(v6_octets("2001:db8::5")).as_slice(), &acl),
            Verdict::Pass
        );
    }

    #[test]
    fn decide_fails_open_on_unparseable_packets() {
        let mut table = SlotTable::<AclRule, 128>::new();
        table.insert(0, AclRule::default_rule(ACTION_BLOCK)).unwrap();
        let drop_all = AclMatcher::new(table);

        assert_eq!(decide(ipv4_frame([1, 1, 1, 1]).as_slice(), &drop_all), Verdict::Drop);
        assert_eq!(decide([0u8; 4].as_slice(), &drop_all), Verdict::Pass);
        assert_eq!(decide(eth(0x0806).as_slice(), &drop_all), Verdict::Pass);
        let truncated = ipv4_frame([1, 1, 1, 1]);
        assert_eq!(decide(&truncated[..20], &drop_all), Verdict::Pass);
    }

    #[test]
    fn decide_drives_rate_limiter() {
        let mut table = SlotTable::<RateLimitRule, 16>::new();
        table
            .insert(0, RateLimitRule::v4(2, 0x0A00_0000, v4_prefix_mask(8)))
            .unwrap();
        let limiter = RateLimiter::new(table, FixedClock(1_000));
        let frame = ipv4_frame([10, 0, 0, 1]);

        assert_eq!(decide(frame.as_slice(), &limiter), Verdict::Pass);
        assert_eq!(decide(frame.as_slice(), &limiter), Verdict::Pass);
        assert_eq!(decide(frame.as_slice(), &limiter), Verdict::Drop);
        assert_eq!(
            decide(ipv4_frame([192, 0, 2, 1]).as_slice(), &limiter),
            Verdict::Pass
        );
    }
}
