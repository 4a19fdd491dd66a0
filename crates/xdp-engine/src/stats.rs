//! 통계 수집 — 판정 통계 및 레이트 리밋 카운터 추적
//!
//! - [`VerdictMetrics`]: `VERDICT_STATS` PerCpuArray를 합산한 누적값과 초당 패킷 수
//! - [`CounterTracker`]: `RATE_LIMITS` 엔트리의 윈도우 카운터 변화 추적
//!
//! # 데이터 흐름
//! ```text
//! PerCpuArray (kernel) ──poll──▶ VerdictSnapshot ──update──▶ VerdictMetrics
//!                                (CPU별 값 합산)              (rate 계산)
//!
//! HashMap (kernel) ──poll──▶ RateLimitRule ──observe──▶ CounterTracker
//!                                                      (변경 시에만 gauge 갱신)
//! ```

use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use ironfence_core::metrics as m;
use ironfence_xdp_common::{RateLimitRule, VerdictStats};

/// CPU별 값을 합산한 판정 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerdictSnapshot {
    /// 통과된 패킷 수 (누적)
    pub passed: u64,
    /// 폐기된 패킷 수 (누적)
    pub dropped: u64,
}

impl VerdictSnapshot {
    /// CPU별 값을 합산합니다.
    pub fn sum<'a>(per_cpu: impl IntoIterator<Item = &'a VerdictStats>) -> Self {
        per_cpu
            .into_iter()
            .fold(Self::default(), |acc, stats| Self {
                passed: acc.passed.wrapping_add(stats.passed),
                dropped: acc.dropped.wrapping_add(stats.dropped),
            })
    }

    /// 판정된 전체 패킷 수
    pub fn total(&self) -> u64 {
        self.passed.saturating_add(self.dropped)
    }
}

/// 판정 통계 (누적 + 비율)
///
/// `update()`를 호출할 때마다 이전 스냅샷과의 차이를 경과 시간으로 나누어
/// 초당 패킷 수를 계산합니다. 첫 호출에서는 rate가 0입니다.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerdictMetrics {
    /// 통과된 패킷 수 (누적)
    pub passed: u64,
    /// 폐기된 패킷 수 (누적)
    pub dropped: u64,
    /// 초당 판정 패킷 수
    pub pps: f64,
    #[serde(skip)]
    last_poll: Option<Instant>,
    #[serde(skip)]
    prev: Option<VerdictSnapshot>,
}

impl VerdictMetrics {
    /// 제로 초기화된 통계를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 시각 기준으로 스냅샷을 반영합니다.
    pub fn update(&mut self, raw: VerdictSnapshot) {
        self.update_at(raw, Instant::now());
    }

    /// 주어진 시각 기준으로 스냅샷을 반영하고 Prometheus 메트릭을 갱신합니다.
    pub fn update_at(&mut self, raw: VerdictSnapshot, now: Instant) {
        self.pps = match (self.prev, self.last_poll) {
            (Some(prev), Some(last)) => {
                let elapsed = now.saturating_duration_since(last).as_secs_f64();
                if elapsed > 0.0 {
                    // delta는 폴링 주기 동안의 패킷 수라 f64 정밀도로 충분
                    #[allow(clippy::cast_precision_loss)]
                    let delta = raw.total().saturating_sub(prev.total()) as f64;
                    delta / elapsed
                } else {
                    self.pps
                }
            }
            _ => 0.0,
        };

        self.passed = raw.passed;
        self.dropped = raw.dropped;
        self.prev = Some(raw);
        self.last_poll = Some(now);

        metrics::counter!(m::XDP_PACKETS_PASSED_TOTAL).absolute(self.passed);
        metrics::counter!(m::XDP_PACKETS_DROPPED_TOTAL).absolute(self.dropped);
        metrics::gauge!(m::XDP_PACKETS_PER_SECOND).set(self.pps);
    }

    /// 통계를 초기화합니다.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// 레이트 리밋 엔트리 한 개의 관측 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindowState {
    packet_count: u64,
    next_interval_start: u64,
}

/// 레이트 리밋 카운터 변화 추적기
///
/// 폴링마다 모든 엔트리를 [`observe`](Self::observe)에 넘기면,
/// 값이 바뀐 엔트리만 gauge를 갱신하고 debug 로그를 남깁니다.
#[derive(Debug, Default)]
pub struct CounterTracker {
    last: Vec<Option<WindowState>>,
}

impl CounterTracker {
    /// 빈 추적기를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 엔트리 상태를 관측합니다. 이전 관측과 달라졌으면 `true`를 반환합니다.
    pub fn observe(&mut self, index: u32, rule: &RateLimitRule) -> bool {
        let state = WindowState {
            packet_count: rule.packet_count,
            next_interval_start: rule.next_interval_start,
        };

        let slot = index as usize;
        if self.last.len() <= slot {
            self.last.resize(slot + 1, None);
        }
        if self.last[slot] == Some(state) {
            return false;
        }
        self.last[slot] = Some(state);

        let throttled = state.packet_count > u64::from(rule.limit);
        debug!(
            rule = index,
            limit = rule.limit,
            packet_count = state.packet_count,
            next_interval_start = state.next_interval_start,
            throttled,
            "rate limit counter changed"
        );

        let label = index.to_string();
        #[allow(clippy::cast_precision_loss)]
        let count = state.packet_count as f64;
        metrics::gauge!(m::RATELIMIT_WINDOW_PACKETS, m::LABEL_RULE => label.clone()).set(count);
        metrics::gauge!(m::RATELIMIT_THROTTLED, m::LABEL_RULE => label)
            .set(if throttled { 1.0 } else { 0.0 });
        true
    }

    /// `len` 이상 인덱스의 관측 상태를 버립니다 (룰 재적용 후 호출).
    pub fn truncate(&mut self, len: usize) {
        self.last.truncate(len);
    }
}
