//! 맵 값 레이아웃 — ACL / 레이트 리밋 룰 엔트리
//!
//! 모든 주소·마스크·액션·리밋 워드는 호스트 바이트 오더로 저장됩니다.
//! 패킷의 주소는 헤더에서 추출할 때 한 번만 변환되고,
//! 컨트롤 플레인도 같은 규약으로 엔트리를 작성합니다.

use crate::{ACTION_ALLOW, ACTION_BLOCK, ACTION_NONE, MASK_TOP_BIT, Verdict};

/// ACL 룰 엔트리
///
/// `Array<AclRule>` 맵에서 사용됩니다. 인덱스가 곧 우선순위입니다.
///
/// # 메모리 레이아웃 (44 바이트, 4바이트 정렬)
/// ```text
/// offset  field       size
/// 0       action      4
/// 4       ipv4_net    4
/// 8       ipv4_mask   4
/// 12      ipv6_net    16
/// 28      ipv6_mask   16
/// ```
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(Debug))]
pub struct AclRule {
    /// 액션 (ACTION_NONE, ACTION_BLOCK, ACTION_ALLOW)
    pub action: u32,
    /// IPv4 네트워크
    pub ipv4_net: u32,
    /// IPv4 마스크 (0이면 IPv4 룰 없음)
    pub ipv4_mask: u32,
    /// IPv6 네트워크 (상위 워드 먼저)
    pub ipv6_net: [u32; 4],
    /// IPv6 마스크 (첫 워드 최상위 비트가 0이면 IPv6 룰 없음)
    pub ipv6_mask: [u32; 4],
}

// SAFETY: AclRule은 #[repr(C)]이며 모든 필드가 u32 기반 Plain Old Data입니다.
// 패딩이 없습니다.
#[cfg(feature = "user")]
unsafe impl aya::Pod for AclRule {}

impl AclRule {
    /// 제로 초기화된 엔트리 (= 센티널)를 생성합니다.
    pub const fn zeroed() -> Self {
        Self {
            action: ACTION_NONE,
            ipv4_net: 0,
            ipv4_mask: 0,
            ipv6_net: [0; 4],
            ipv6_mask: [0; 4],
        }
    }

    /// 두 주소 패밀리 모두에 매칭되는 기본 엔트리를 생성합니다.
    pub const fn default_rule(action: u32) -> Self {
        Self {
            action,
            ..Self::zeroed()
        }
    }

    /// IPv4 전용 엔트리를 생성합니다.
    pub const fn v4(action: u32, net: u32, mask: u32) -> Self {
        Self {
            action,
            ipv4_net: net,
            ipv4_mask: mask,
            ..Self::zeroed()
        }
    }

    /// IPv6 전용 엔트리를 생성합니다.
    pub const fn v6(action: u32, net: [u32; 4], mask: [u32; 4]) -> Self {
        Self {
            action,
            ipv6_net: net,
            ipv6_mask: mask,
            ..Self::zeroed()
        }
    }

    /// 센티널 엔트리인지 확인합니다.
    pub const fn is_sentinel(&self) -> bool {
        self.action == ACTION_NONE
    }

    /// 의미 있는 IPv6 마스크를 가졌는지 확인합니다.
    pub const fn has_ipv6_rule(&self) -> bool {
        has_v6_mask(&self.ipv6_mask)
    }

    /// 기본 엔트리(두 패밀리의 마스크가 모두 비어 있음)인지 확인합니다.
    pub const fn is_default(&self) -> bool {
        self.ipv4_mask == 0 && !self.has_ipv6_rule()
    }
}

/// 레이트 리밋 룰 엔트리
///
/// `HashMap<u32, RateLimitRule>` 맵에서 사용됩니다. 키는 룰 인덱스입니다.
/// `packet_count`와 `next_interval_start`는 커널이 매칭 패킷마다 제자리 갱신합니다.
///
/// # 메모리 레이아웃 (64 바이트, 8바이트 정렬)
/// ```text
/// offset  field                size
/// 0       limit                4
/// 4       ipv4_net             4
/// 8       ipv4_mask            4
/// 12      ipv6_net             16
/// 28      ipv6_mask            16
/// 44      _pad                 4
/// 48      packet_count         8
/// 56      next_interval_start  8
/// ```
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(Debug))]
pub struct RateLimitRule {
    /// 윈도우당 허용 패킷 수
    pub limit: u32,
    /// IPv4 네트워크
    pub ipv4_net: u32,
    /// IPv4 마스크 (0이면 IPv4 룰 없음)
    pub ipv4_mask: u32,
    /// IPv6 네트워크 (상위 워드 먼저)
    pub ipv6_net: [u32; 4],
    /// IPv6 마스크
    pub ipv6_mask: [u32; 4],
    /// 8바이트 정렬을 위한 패딩
    pub _pad: u32,
    /// 현재 윈도우의 패킷 수
    pub packet_count: u64,
    /// 다음 윈도우 시작 시각 (단조 시계, 나노초). 0이면 아직 윈도우가 없음
    pub next_interval_start: u64,
}

// SAFETY: RateLimitRule은 #[repr(C)]이며 모든 필드가 Plain Old Data입니다.
// 정렬 패딩은 `_pad`로 명시되어 있습니다.
#[cfg(feature = "user")]
unsafe impl aya::Pod for RateLimitRule {}

impl RateLimitRule {
    /// 제로 초기화된 엔트리를 생성합니다.
    pub const fn zeroed() -> Self {
        Self {
            limit: 0,
            ipv4_net: 0,
            ipv4_mask: 0,
            ipv6_net: [0; 4],
            ipv6_mask: [0; 4],
            _pad: 0,
            packet_count: 0,
            next_interval_start: 0,
        }
    }

    /// IPv4 서브넷 엔트리를 생성합니다.
    pub const fn v4(limit: u32, net: u32, mask: u32) -> Self {
        Self {
            limit,
            ipv4_net: net,
            ipv4_mask: mask,
            ..Self::zeroed()
        }
    }

    /// IPv6 서브넷 엔트리를 생성합니다.
    pub const fn v6(limit: u32, net: [u32; 4], mask: [u32; 4]) -> Self {
        Self {
            limit,
            ipv6_net: net,
            ipv6_mask: mask,
            ..Self::zeroed()
        }
    }

    /// 의미 있는 IPv6 마스크를 가졌는지 확인합니다.
    pub const fn has_ipv6_rule(&self) -> bool {
        has_v6_mask(&self.ipv6_mask)
    }
}

/// CPU별 판정 통계
///
/// `PerCpuArray<VerdictStats>` 맵의 0번 인덱스에서 사용됩니다.
#[repr(C)]
#[derive(Clone, Copy, Default)]
#[cfg_attr(feature = "user", derive(Debug))]
pub struct VerdictStats {
    /// 통과된 패킷 수
    pub passed: u64,
    /// 폐기된 패킷 수
    pub dropped: u64,
}

// SAFETY: VerdictStats는 #[repr(C)]이며 모든 필드가 Plain Old Data입니다.
#[cfg(feature = "user")]
unsafe impl aya::Pod for VerdictStats {}

/// ACL 액션 코드를 판정으로 변환합니다.
///
/// ALLOW → PASS, BLOCK → DROP, 그 외 값은 PASS (fail-open).
pub const fn action_verdict(action: u32) -> Verdict {
    match action {
        ACTION_BLOCK => Verdict::Drop,
        ACTION_ALLOW => Verdict::Pass,
        _ => Verdict::Pass,
    }
}

/// IPv6 마스크의 첫 워드 최상위 비트가 설정되어 있는지 확인합니다.
#[inline(always)]
pub const fn has_v6_mask(mask: &[u32; 4]) -> bool {
    mask[0] & MASK_TOP_BIT != 0
}

/// IPv4 주소가 서브넷에 속하는지 확인합니다.
#[inline(always)]
pub const fn v4_in_subnet(addr: u32, net: u32, mask: u32) -> bool {
    addr & mask == net
}

/// IPv6 주소가 서브넷에 속하는지 워드 단위로 확인합니다.
#[inline(always)]
pub fn v6_in_subnet(addr: &[u32; 4], net: &[u32; 4], mask: &[u32; 4]) -> bool {
    for word in 0..4 {
        if addr[word] & mask[word] != net[word] {
            return false;
        }
    }
    true
}

/// 프리픽스 길이(0–32)에서 IPv4 마스크를 계산합니다. 32를 넘으면 32로 취급합니다.
pub const fn v4_prefix_mask(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p if p >= 32 => u32::MAX,
        p => u32::MAX << (32 - p as u32),
    }
}

/// 프리픽스 길이(0–128)에서 IPv6 마스크를 계산합니다.
pub const fn v6_prefix_mask(prefix: u8) -> [u32; 4] {
    let mut mask = [0u32; 4];
    let mut word = 0;
    while word < 4 {
        let covered = prefix as i32 - (word as i32) * 32;
        mask[word] = if covered <= 0 {
            0
        } else {
            v4_prefix_mask(covered as u8)
        };
        word += 1;
    }
    mask
}

/// 네트워크 바이트 오더 16옥텟을 상위 워드 먼저의 호스트 오더 워드로 변환합니다.
pub const fn v6_words(octets: [u8; 16]) -> [u32; 4] {
    let mut words = [0u32; 4];
    let mut i = 0;
    while i < 4 {
        words[i] = u32::from_be_bytes([
            octets[i * 4],
            octets[i * 4 + 1],
            octets[i * 4 + 2],
            octets[i * 4 + 3],
        ]);
        i += 1;
    }
    words
}
