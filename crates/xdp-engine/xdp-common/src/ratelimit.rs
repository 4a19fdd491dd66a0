//! 서브넷별 고정 윈도우 레이트 리미터
//!
//! 엔트리마다 `packet_count` / `next_interval_start` 쌍을 유지하며,
//! 백그라운드 타이머 없이 패킷 도착 시점에 윈도우를 지연 리셋합니다.
//!
//! # 동시성
//! - 카운터 증가는 락 없는 원자적 덧셈입니다.
//! - 윈도우 리셋(비교 후 두 필드 쓰기)은 하나의 원자 단위가 아닙니다.
//!   경계 시점에 경합한 패킷들이 모두 리셋을 수행할 수 있으며,
//!   이때 카운트가 최대 한 패킷만큼 적게 집계됩니다. 허용된 근사입니다.

use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::rule::{RateLimitRule, has_v6_mask, v4_in_subnet, v6_in_subnet};
use crate::table::RuleTable;
use crate::{RATE_LIMIT_MAX_ENTRIES, SourceAddr, Verdict, WINDOW_NS};

/// 단조 시계 (나노초)
pub trait Clock {
    /// 현재 시각을 반환합니다.
    fn now_ns(&self) -> u64;
}

/// 레이트 리밋 테이블과 시계에 바인딩된 판정 엔진
pub struct RateLimiter<T, C> {
    table: T,
    clock: C,
}

impl<T: RuleTable<RateLimitRule>, C: Clock> RateLimiter<T, C> {
    /// 테이블과 시계로 리미터를 생성합니다.
    pub const fn new(table: T, clock: C) -> Self {
        Self { table, clock }
    }

    /// 내부 테이블을 반환합니다.
    pub fn table(&self) -> &T {
        &self.table
    }

    /// 현재 시각 기준으로 패킷을 허용할지 결정합니다.
    #[inline(always)]
    pub fn admit(&self, src: &SourceAddr) -> Verdict {
        admit(&self.table, src, self.clock.now_ns())
    }
}

/// 주소를 포함하는 첫 번째 엔트리의 포인터를 찾습니다.
///
/// 질의 패밀리의 마스크가 비어 있는 엔트리는 건너뜁니다.
/// 빈 슬롯을 만나면 스캔을 끝냅니다.
#[inline(always)]
pub fn find_rule<T: RuleTable<RateLimitRule>>(
    table: &T,
    src: &SourceAddr,
) -> Option<*mut RateLimitRule> {
    for index in 0..RATE_LIMIT_MAX_ENTRIES {
        let entry = table.get_ptr_mut(index)?;
        // SAFETY: 포인터는 테이블이 소유한 유효한 엔트리를 가리킵니다.
        // 매칭 필드는 판정 경로에서 쓰이지 않으므로 필드 단위로 읽습니다.
        let matched = unsafe {
            match src {
                SourceAddr::V4(addr) => {
                    let mask = (*entry).ipv4_mask;
                    mask != 0 && v4_in_subnet(*addr, (*entry).ipv4_net, mask)
                }
                SourceAddr::V6(addr) => {
                    let mask = (*entry).ipv6_mask;
                    has_v6_mask(&mask) && v6_in_subnet(addr, &(*entry).ipv6_net, &mask)
                }
            }
        };
        if matched {
            return Some(entry);
        }
    }
    None
}

/// 매칭 엔트리의 윈도우 상태를 갱신하고 판정을 반환합니다.
///
/// 매칭 엔트리가 없으면 PASS입니다.
#[inline(always)]
pub fn admit<T: RuleTable<RateLimitRule>>(table: &T, src: &SourceAddr, now_ns: u64) -> Verdict {
    let Some(entry) = find_rule(table, src) else {
        return Verdict::Pass;
    };

    // SAFETY: `packet_count`와 `next_interval_start`는 8바이트 정렬 필드이며
    // (#[repr(C)] 레이아웃, 오프셋 48/56), 모든 동시 접근은 원자적으로 이루어집니다.
    let (count, deadline, limit) = unsafe {
        (
            AtomicU64::from_ptr(addr_of_mut!((*entry).packet_count)),
            AtomicU64::from_ptr(addr_of_mut!((*entry).next_interval_start)),
            u64::from((*entry).limit),
        )
    };

    if window_elapsed(deadline.load(Ordering::Relaxed), now_ns) {
        deadline.store(now_ns.saturating_add(WINDOW_NS), Ordering::Relaxed);
        count.store(1, Ordering::Relaxed);
        return Verdict::Pass;
    }

    let seen = count.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
    if seen > limit {
        Verdict::Drop
    } else {
        Verdict::Pass
    }
}

/// 레이트 리밋 엔트리의 윈도우 상태 복사본
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(Debug))]
pub struct WindowSnapshot {
    /// 윈도우당 허용 패킷 수
    pub limit: u32,
    /// 현재 윈도우에서 센 패킷 수
    pub packet_count: u64,
    /// 현재 윈도우 마감 시각 (ns, 0 = 아직 열리지 않음)
    pub next_interval_start: u64,
}

/// `index` 엔트리의 윈도우 상태를 읽습니다.
///
/// 카운터 필드는 원자적으로 읽으므로 진행 중인 [`admit`]과 동시에 호출해도 됩니다.
/// 두 필드는 따로 읽히므로 리셋 경계에서는 서로 다른 윈도우의 값일 수 있습니다.
pub fn window_snapshot<T: RuleTable<RateLimitRule>>(
    table: &T,
    index: u32,
) -> Option<WindowSnapshot> {
    let entry = table.get_ptr_mut(index)?;
    // SAFETY: 포인터는 테이블이 소유한 유효한 엔트리를 가리키며, 카운터 필드는
    // admit과 같은 방식으로 원자적으로만 접근합니다. `limit`은 판정 경로에서 쓰이지 않습니다.
    unsafe {
        Some(WindowSnapshot {
            limit: (*entry).limit,
            packet_count: AtomicU64::from_ptr(addr_of_mut!((*entry).packet_count))
                .load(Ordering::Relaxed),
            next_interval_start: AtomicU64::from_ptr(addr_of_mut!((*entry).next_interval_start))
                .load(Ordering::Relaxed),
        })
    }
}

/// 윈도우가 만료되었는지 확인합니다. 한 번도 열리지 않은 윈도우(0)도 만료로 봅니다.
#[inline(always)]
pub const fn window_elapsed(next_interval_start: u64, now_ns: u64) -> bool {
    next_interval_start == 0 || now_ns > next_interval_start
}
