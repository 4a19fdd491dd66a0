#![no_std]
#![no_main]

use aya_ebpf::{
    helpers::bpf_ktime_get_ns,
    macros::{map, xdp},
    maps::{Array, HashMap, PerCpuArray},
    programs::XdpContext,
};
use aya_log_ebpf::debug;
use ironfence_xdp_common::{
    ACL_MAX_ENTRIES, AclRule, RATE_LIMIT_MAX_ENTRIES, RateLimitRule, RuleTable, SourceAddr,
    Verdict, VerdictStats,
    acl::AclMatcher,
    dispatch::{DecisionEngine, PacketBytes, decide},
    ratelimit::{Clock, RateLimiter},
};

// =============================================================================
// BPF 맵
// =============================================================================

/// ACL 룰 테이블. 인덱스 = 우선순위, 비어 있는 슬롯은 0(센티널)
#[map]
static ACL_RULES: Array<AclRule> = Array::with_max_entries(ACL_MAX_ENTRIES, 0);

/// 레이트 리밋 룰 테이블. 키 = 룰 인덱스
#[map]
static RATE_LIMITS: HashMap<u32, RateLimitRule> =
    HashMap::with_max_entries(RATE_LIMIT_MAX_ENTRIES, 0);

/// CPU별 판정 통계 (인덱스 0만 사용)
#[map]
static VERDICT_STATS: PerCpuArray<VerdictStats> = PerCpuArray::with_max_entries(1, 0);

// =============================================================================
// 맵 어댑터
// =============================================================================

struct AclMap;

impl RuleTable<AclRule> for AclMap {
    #[inline(always)]
    unsafe fn get(&self, index: u32) -> Option<&AclRule> {
        ACL_RULES.get(index)
    }

    #[inline(always)]
    fn get_ptr_mut(&self, index: u32) -> Option<*mut AclRule> {
        ACL_RULES.get_ptr_mut(index)
    }
}

struct RateLimitMap;

impl RuleTable<RateLimitRule> for RateLimitMap {
    #[inline(always)]
    unsafe fn get(&self, index: u32) -> Option<&RateLimitRule> {
        // SAFETY: 호출자가 참조 수명 동안 카운터 갱신이 없음을 보장합니다.
        unsafe { RATE_LIMITS.get(&index) }
    }

    #[inline(always)]
    fn get_ptr_mut(&self, index: u32) -> Option<*mut RateLimitRule> {
        RATE_LIMITS.get_ptr_mut(&index)
    }
}

struct KtimeClock;

impl Clock for KtimeClock {
    #[inline(always)]
    fn now_ns(&self) -> u64 {
        // SAFETY: 인자 없는 BPF 헬퍼
        unsafe { bpf_ktime_get_ns() }
    }
}

/// `xdp_md` 경계 검사를 거치는 패킷 바이트 접근자
struct XdpPacket<'a>(&'a XdpContext);

impl PacketBytes for XdpPacket<'_> {
    #[inline(always)]
    fn read<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let ptr = ptr_at::<[u8; N]>(self.0, offset)?;
        // SAFETY: ptr_at이 [offset, offset + N)이 패킷 안에 있음을 검증했습니다.
        Some(unsafe { *ptr })
    }
}

#[inline(always)]
fn ptr_at<T>(ctx: &XdpContext, offset: usize) -> Option<*const T> {
    let start = ctx.data();
    let end = ctx.data_end();
    let len = core::mem::size_of::<T>();

    if start + offset + len > end {
        return None;
    }
    Some((start + offset) as *const T)
}

static ACL: AclMatcher<AclMap> = AclMatcher::new(AclMap);
static LIMITER: RateLimiter<RateLimitMap, KtimeClock> = RateLimiter::new(RateLimitMap, KtimeClock);

// =============================================================================
// XDP 프로그램
// =============================================================================

/// 서브넷 ACL 필터
///
/// 출발지 주소를 `ACL_RULES`에 대해 순서대로 매칭합니다.
#[xdp]
pub fn ironfence_acl(ctx: XdpContext) -> u32 {
    filter(&ctx, &ACL)
}

/// 서브넷별 레이트 리미터
///
/// 출발지 주소가 속한 `RATE_LIMITS` 엔트리의 1초 윈도우 카운터를 갱신합니다.
#[xdp]
pub fn ironfence_ratelimit(ctx: XdpContext) -> u32 {
    filter(&ctx, &LIMITER)
}

#[inline(always)]
fn filter<E: DecisionEngine>(ctx: &XdpContext, engine: &E) -> u32 {
    let verdict = decide(&XdpPacket(ctx), &LogDrops { ctx, engine });
    record(verdict);
    verdict.xdp_action()
}

/// DROP 판정을 aya-log로 남기는 판정 엔진 래퍼
struct LogDrops<'a, E> {
    ctx: &'a XdpContext,
    engine: &'a E,
}

impl<E: DecisionEngine> DecisionEngine for LogDrops<'_, E> {
    #[inline(always)]
    fn evaluate(&self, src: &SourceAddr) -> Verdict {
        let verdict = self.engine.evaluate(src);
        if verdict == Verdict::Drop {
            log_drop(self.ctx, src);
        }
        verdict
    }
}

#[inline(always)]
fn log_drop(ctx: &XdpContext, src: &SourceAddr) {
    match src {
        SourceAddr::V4(addr) => debug!(ctx, "drop src={:i}", *addr),
        SourceAddr::V6(words) => debug!(ctx, "drop src6 prefix={:x}:{:x}", words[0], words[1]),
    }
}

#[inline(always)]
fn record(verdict: Verdict) {
    let Some(stats) = VERDICT_STATS.get_ptr_mut(0) else {
        return;
    };
    // SAFETY: PerCpuArray 엔트리는 현재 CPU 전용이므로 경합이 없습니다.
    unsafe {
        match verdict {
            Verdict::Pass => (*stats).passed += 1,
            Verdict::Drop => (*stats).dropped += 1,
        }
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
