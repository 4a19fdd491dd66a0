//! 서브넷 ACL 매칭 — 인덱스 순서 first-match-wins
//!
//! 룰 우선순위는 삽입 순서로만 결정됩니다. 기본 엔트리는 별도 메커니즘이 아니라
//! 두 패밀리의 마스크가 모두 비어 있는 퇴화된 룰이며, 관례상 마지막에 둡니다.
//!
//! # 스캔 종료 조건
//! - 빈 슬롯 (`None`) → ALLOW
//! - 센티널 (`action == ACTION_NONE`) → ALLOW
//! - 첫 매칭 → 해당 엔트리의 액션
//! - 테이블 끝 → ALLOW

use crate::rule::{AclRule, action_verdict, v4_in_subnet, v6_in_subnet};
use crate::table::RuleTable;
use crate::{ACL_MAX_ENTRIES, ACTION_ALLOW, SourceAddr, Verdict};

/// ACL 테이블에 바인딩된 판정 엔진
pub struct AclMatcher<T> {
    table: T,
}

impl<T: RuleTable<AclRule>> AclMatcher<T> {
    /// 테이블을 감싸는 매처를 생성합니다.
    pub const fn new(table: T) -> Self {
        Self { table }
    }

    /// 출발지 주소를 분류합니다.
    #[inline(always)]
    pub fn classify(&self, src: &SourceAddr) -> Verdict {
        classify(&self.table, src)
    }
}

/// 출발지 주소를 분류하여 판정을 반환합니다.
#[inline(always)]
pub fn classify<T: RuleTable<AclRule>>(table: &T, src: &SourceAddr) -> Verdict {
    action_verdict(matched_action(table, src))
}

/// 출발지 주소에 처음 매칭되는 엔트리의 액션 코드를 반환합니다.
///
/// 매칭이 없으면 `ACTION_ALLOW`를 반환합니다.
#[inline(always)]
pub fn matched_action<T: RuleTable<AclRule>>(table: &T, src: &SourceAddr) -> u32 {
    for index in 0..ACL_MAX_ENTRIES {
        // SAFETY: ACL 엔트리는 판정 경로에서 쓰이지 않습니다. 갱신은 유저스페이스가
        // 슬롯 단위로 교체하며, 참조는 이 반복 안에서만 사용됩니다.
        let Some(rule) = (unsafe { table.get(index) }) else {
            break;
        };
        if rule.is_sentinel() {
            break;
        }
        if rule_matches(rule, src) {
            return rule.action;
        }
    }
    ACTION_ALLOW
}

/// 단일 엔트리가 주소에 매칭되는지 확인합니다.
///
/// 질의 패밀리의 마스크가 비어 있으면, 다른 패밀리에 의미 있는 마스크가
/// 있을 때만 건너뛰고 그렇지 않으면 기본 엔트리로 매칭합니다.
#[inline(always)]
pub fn rule_matches(rule: &AclRule, src: &SourceAddr) -> bool {
    match src {
        SourceAddr::V4(addr) => {
            if rule.ipv4_mask == 0 {
                !rule.has_ipv6_rule()
            } else {
                v4_in_subnet(*addr, rule.ipv4_net, rule.ipv4_mask)
            }
        }
        SourceAddr::V6(addr) => {
            if !rule.has_ipv6_rule() {
                rule.ipv4_mask == 0
            } else {
                v6_in_subnet(addr, &rule.ipv6_net, &rule.ipv6_mask)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{v4_prefix_mask, v6_prefix_mask};
    use crate::table::SlotTable;
    use crate::{ACTION_BLOCK, ACTION_NONE};

    type AclTable = SlotTable<AclRule, 128>;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> SourceAddr {
        SourceAddr::from_v4_octets([a, b, c, d])
    }

    fn v6(text: &str) -> SourceAddr {
        let addr: core::net::Ipv6Addr = text.parse().unwrap();
        SourceAddr::from_v6_octets(addr.octets())
    }

    fn table(rules: &[AclRule]) -> AclTable {
        let mut table = AclTable::new();
        for (index, rule) in rules.iter().enumerate() {
            table.insert(index as u32, *rule).unwrap();
        }
        table
    }

    fn v4_rule(action: u32, net: [u8; 4], prefix: u8) -> AclRule {
        AclRule::v4(action, u32::from_be_bytes(net), v4_prefix_mask(prefix))
    }

    fn v6_rule(action: u32, net: &str, prefix: u8) -> AclRule {
        let SourceAddr::V6(words) = v6(net) else {
            unreachable!()
        };
        AclRule::v6(action, words, v6_prefix_mask(prefix))
    }

    // =============================================================================
    // 기본 동작
    // =============================================================================

    #[test]
    fn empty_table_allows() {
        let table = AclTable::new();
        assert_eq!(classify(&table, &v4(1, 2, 3, 4)), Verdict::Pass);
        assert_eq!(classify(&table, &v6("2001:db8::1")), Verdict::Pass);
    }

    #[test]
    fn no_match_without_default_allows() {
        let table = table(&[
            v4_rule(ACTION_BLOCK, [10, 0, 0, 0], 8),
            v6_rule(ACTION_BLOCK, "fd00::", 8),
        ]);
        assert_eq!(matched_action(&table, &v4(172, 16, 0, 1)), ACTION_ALLOW);
        assert_eq!(classify(&table, &v6("2001:db8::1")), Verdict::Pass);
    }

    #[test]
    fn scenario_allow_subnet_then_block_default() {
        let table = table(&[
            v4_rule(ACTION_ALLOW, [192, 168, 0, 0], 16),
            AclRule::default_rule(ACTION_BLOCK),
        ]);
        assert_eq!(matched_action(&table, &v4(192, 168, 5, 5)), ACTION_ALLOW);
        assert_eq!(classify(&table, &v4(192, 168, 5, 5)), Verdict::Pass);
        assert_eq!(matched_action(&table, &v4(8, 8, 8, 8)), ACTION_BLOCK);
        assert_eq!(classify(&table, &v4(8, 8, 8, 8)), Verdict::Drop);
    }

    // =============================================================================
    // 우선순위 / 센티널
    // =============================================================================

    #[test]
    fn lower_index_wins_over_more_specific_rule() {
        let table = table(&[
            v4_rule(ACTION_ALLOW, [10, 0, 0, 0], 8),
            v4_rule(ACTION_BLOCK, [10, 1, 2, 3], 32),
        ]);
        assert_eq!(classify(&table, &v4(10, 1, 2, 3)), Verdict::Pass);

        let table = table_reversed();
        assert_eq!(classify(&table, &v4(10, 1, 2, 3)), Verdict::Drop);
    }

    fn table_reversed() -> AclTable {
        table(&[
            v4_rule(ACTION_BLOCK, [10, 1, 2, 3], 32),
            v4_rule(ACTION_ALLOW, [10, 0, 0, 0], 8),
        ])
    }

    #[test]
    fn sentinel_hides_later_entries() {
        let table = table(&[
            v4_rule(ACTION_ALLOW, [192, 168, 0, 0], 16),
            AclRule::zeroed(),
            v4_rule(ACTION_BLOCK, [8, 8, 8, 0], 24),
            AclRule::default_rule(ACTION_BLOCK),
        ]);
        assert_eq!(classify(&table, &v4(8, 8, 8, 8)), Verdict::Pass);
        assert_eq!(classify(&table, &v6("2001:db8::1")), Verdict::Pass);
    }

    #[test]
    fn sentinel_with_populated_masks_still_terminates() {
        let sentinel = v4_rule(ACTION_NONE, [8, 8, 8, 0], 24);
        let table = table(&[sentinel, AclRule::default_rule(ACTION_BLOCK)]);
        assert_eq!(classify(&table, &v4(8, 8, 8, 8)), Verdict::Pass);
    }

    #[test]
    fn empty_slot_terminates_scan() {
        let mut table = AclTable::new();
        table.insert(0, v4_rule(ACTION_ALLOW, [10, 0, 0, 0], 8)).unwrap();
        table.insert(2, AclRule::default_rule(ACTION_BLOCK)).unwrap();
        assert_eq!(classify(&table, &v4(8, 8, 8, 8)), Verdict::Pass);
    }

    // =============================================================================
    // 기본 엔트리 / 패밀리 격리
    // =============================================================================

    #[test]
    fn default_rule_matches_both_families() {
        let table = table(&[AclRule::default_rule(ACTION_BLOCK)]);
        assert_eq!(classify(&table, &v4(1, 1, 1, 1)), Verdict::Drop);
        assert_eq!(classify(&table, &v6("::1")), Verdict::Drop);
    }

    #[test]
    fn earlier_match_beats_default() {
        let table = table(&[
            v6_rule(ACTION_ALLOW, "2001:db8::", 32),
            AclRule::default_rule(ACTION_BLOCK),
        ]);
        assert_eq!(classify(&table, &v6("2001:db8:1::5")), Verdict::Pass);
        assert_eq!(classify(&table, &v6("2001:db9::5")), Verdict::Drop);
    }

    #[test]
    fn ipv4_rule_never_matches_ipv6_query() {
        let table = table(&[v4_rule(ACTION_BLOCK, [0, 0, 0, 0], 1)]);
        // 0.0.0.0/1 은 ::1 의 첫 워드와도 비트 상으로 일치하지만 패밀리가 다름
        assert_eq!(classify(&table, &v6("::1")), Verdict::Pass);
        assert_eq!(classify(&table, &v4(1, 2, 3, 4)), Verdict::Drop);
    }

    #[test]
    fn ipv6_rule_never_matches_ipv4_query() {
        let table = table(&[v6_rule(ACTION_BLOCK, "::", 1)]);
        assert_eq!(classify(&table, &v4(1, 2, 3, 4)), Verdict::Pass);
        assert_eq!(classify(&table, &v6("::1")), Verdict::Drop);
    }

    #[test]
    fn dual_stack_rule_matches_each_family_by_its_own_subnet() {
        let mut rule = v4_rule(ACTION_BLOCK, [10, 0, 0, 0], 8);
        let ipv6 = v6_rule(ACTION_BLOCK, "fd00::", 8);
        rule.ipv6_net = ipv6.ipv6_net;
        rule.ipv6_mask = ipv6.ipv6_mask;
        let table = table(&[rule]);

        assert_eq!(classify(&table, &v4(10, 9, 9, 9)), Verdict::Drop);
        assert_eq!(classify(&table, &v4(11, 0, 0, 1)), Verdict::Pass);
        assert_eq!(classify(&table, &v6("fd12::1")), Verdict::Drop);
        assert_eq!(classify(&table, &v6("fe80::1")), Verdict::Pass);
    }

    #[test]
    fn ipv6_match_requires_all_words() {
        let table = table(&[v6_rule(ACTION_BLOCK, "2001:db8::1", 128)]);
        assert_eq!(classify(&table, &v6("2001:db8::1")), Verdict::Drop);
        assert_eq!(classify(&table, &v6("2001:db8::2")), Verdict::Pass);
        assert_eq!(classify(&table, &v6("2001:db8:0:1::1")), Verdict::Pass);
    }

    // =============================================================================
    // 액션 값 / 결정성
    // =============================================================================

    #[test]
    fn unknown_action_value_passes() {
        let mut rule = AclRule::default_rule(ACTION_BLOCK);
        rule.action = 9;
        let table = table(&[rule]);
        assert_eq!(matched_action(&table, &v4(1, 2, 3, 4)), 9);
        assert_eq!(classify(&table, &v4(1, 2, 3, 4)), Verdict::Pass);
    }

    #[test]
    fn classify_is_deterministic() {
        let table = table(&[
            v4_rule(ACTION_BLOCK, [10, 0, 0, 0], 8),
            v6_rule(ACTION_ALLOW, "2001:db8::", 32),
            AclRule::default_rule(ACTION_BLOCK),
        ]);
        for addr in [v4(10, 0, 0, 1), v4(9, 9, 9, 9), v6("2001:db8::1"), v6("::1")] {
            let first = classify(&table, &addr);
            for _ in 0..16 {
                assert_eq!(classify(&table, &addr), first);
            }
        }
    }

    #[test]
    fn full_table_without_match_allows() {
        let mut table = AclTable::new();
        for index in 0..ACL_MAX_ENTRIES {
            table
                .insert(index, v4_rule(ACTION_BLOCK, [10, index as u8, 0, 0], 16))
                .unwrap();
        }
        assert_eq!(classify(&table, &v4(192, 0, 2, 1)), Verdict::Pass);
        assert_eq!(classify(&table, &v4(10, 127, 3, 3)), Verdict::Drop);
    }
}
