//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ironfence_`
//! - 영역: `xdp_`, `ratelimit_`, `rules_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 레이트 리밋 룰 인덱스 레이블 키
pub const LABEL_RULE: &str = "rule";

/// 룰 테이블 레이블 키 (acl, ratelimit)
pub const LABEL_TABLE: &str = "table";

/// 어태치된 네트워크 인터페이스 레이블 키 (모든 시리즈에 전역 적용)
pub const LABEL_INTERFACE: &str = "interface";

// ─── XDP 판정 메트릭 ────────────────────────────────────────────────

/// XDP: 통과된 패킷 수 (counter)
pub const XDP_PACKETS_PASSED_TOTAL: &str = "ironfence_xdp_packets_passed_total";

/// XDP: 폐기된 패킷 수 (counter)
pub const XDP_PACKETS_DROPPED_TOTAL: &str = "ironfence_xdp_packets_dropped_total";

/// XDP: 초당 판정 패킷 수 (gauge)
pub const XDP_PACKETS_PER_SECOND: &str = "ironfence_xdp_packets_per_second";

// ─── 레이트 리밋 메트릭 ─────────────────────────────────────────────

/// 레이트 리밋: 현재 윈도우의 패킷 수 (gauge, label: rule)
pub const RATELIMIT_WINDOW_PACKETS: &str = "ironfence_ratelimit_window_packets";

/// 레이트 리밋: 현재 윈도우가 리밋을 넘었는지 (gauge 0/1, label: rule)
pub const RATELIMIT_THROTTLED: &str = "ironfence_ratelimit_throttled";

// ─── 룰 메트릭 ──────────────────────────────────────────────────────

/// 로드된 룰 수 (gauge, label: table)
pub const RULES_LOADED: &str = "ironfence_rules_loaded";

/// 전체 메트릭 이름 목록
pub const ALL_METRIC_NAMES: [&str; 6] = [
    XDP_PACKETS_PASSED_TOTAL,
    XDP_PACKETS_DROPPED_TOTAL,
    XDP_PACKETS_PER_SECOND,
    RATELIMIT_WINDOW_PACKETS,
    RATELIMIT_THROTTLED,
    RULES_LOADED,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        XDP_PACKETS_PASSED_TOTAL,
        "Total number of packets passed (XDP_PASS) by the filter"
    );
    describe_counter!(
        XDP_PACKETS_DROPPED_TOTAL,
        "Total number of packets dropped (XDP_DROP) by the filter"
    );
    describe_gauge!(
        XDP_PACKETS_PER_SECOND,
        "Current packet decision rate (packets/sec)"
    );
    describe_gauge!(
        RATELIMIT_WINDOW_PACKETS,
        "Packets counted in the current one-second window per rate-limit rule"
    );
    describe_gauge!(
        RATELIMIT_THROTTLED,
        "1 when the current window of a rate-limit rule exceeded its limit"
    );
    describe_gauge!(RULES_LOADED, "Number of rules written to each kernel table");
}
