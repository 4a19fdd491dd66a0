#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use ironfence_xdp_common::acl::{AclMatcher, rule_matches};
use ironfence_xdp_common::rule::{v4_prefix_mask, v6_prefix_mask};
use ironfence_xdp_common::{
    ACL_MAX_ENTRIES, ACTION_ALLOW, AclRule, SlotTable, SourceAddr, Verdict, rule::action_verdict,
};

/// 퍼저용 룰 입력
#[derive(Arbitrary, Debug)]
struct FuzzRule {
    /// 0: 센티널, 1: block, 2: allow, 그 외: 알 수 없는 액션
    action: u8,
    ipv4: Option<(u32, u8)>,
    ipv6: Option<([u32; 4], u8)>,
}

#[derive(Arbitrary, Debug)]
enum FuzzAddr {
    V4(u32),
    V6([u32; 4]),
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    rules: Vec<FuzzRule>,
    addr: FuzzAddr,
}

impl FuzzRule {
    fn compile(&self) -> AclRule {
        let mut rule = AclRule::default_rule(u32::from(self.action));
        if let Some((net, prefix)) = self.ipv4 {
            // prefix 0 은 "룰 없음"과 같으므로 1..=32 로 제한
            let mask = v4_prefix_mask(prefix % 32 + 1);
            rule.ipv4_net = net & mask;
            rule.ipv4_mask = mask;
        }
        if let Some((net, prefix)) = self.ipv6 {
            let mask = v6_prefix_mask(prefix % 128 + 1);
            rule.ipv6_net = [
                net[0] & mask[0],
                net[1] & mask[1],
                net[2] & mask[2],
                net[3] & mask[3],
            ];
            rule.ipv6_mask = mask;
        }
        rule
    }
}

/// 첫 매칭 참조 모델
fn reference(rules: &[AclRule], src: &SourceAddr) -> Verdict {
    for rule in rules {
        if rule.is_sentinel() {
            break;
        }
        if rule_matches(rule, src) {
            return action_verdict(rule.action);
        }
    }
    action_verdict(ACTION_ALLOW)
}

fuzz_target!(|input: FuzzInput| {
    let rules: Vec<AclRule> = input
        .rules
        .iter()
        .take(ACL_MAX_ENTRIES as usize)
        .map(FuzzRule::compile)
        .collect();

    let mut table = SlotTable::<AclRule, { ACL_MAX_ENTRIES as usize }>::new();
    for (index, rule) in (0u32..).zip(rules.iter().copied()) {
        table
            .insert(index, rule)
            .expect("index below capacity");
    }

    let src = match input.addr {
        FuzzAddr::V4(addr) => SourceAddr::V4(addr),
        FuzzAddr::V6(words) => SourceAddr::V6(words),
    };

    let matcher = AclMatcher::new(table);
    let verdict = matcher.classify(&src);
    assert_eq!(verdict, reference(&rules, &src));
    assert_eq!(verdict, matcher.classify(&src), "classification must be deterministic");
});
