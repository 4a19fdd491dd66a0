#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use ironfence_xdp_common::ratelimit::{admit, find_rule};
use ironfence_xdp_common::rule::v4_prefix_mask;
use ironfence_xdp_common::{
    RATE_LIMIT_MAX_ENTRIES, RateLimitRule, RuleTable, SlotTable, SourceAddr, Verdict, WINDOW_NS,
};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    rules: Vec<(u32, u32, u8)>,
    /// (출발지, 이전 패킷 이후 경과 시간)
    packets: Vec<(u32, u32)>,
}

type Table = SlotTable<RateLimitRule, { RATE_LIMIT_MAX_ENTRIES as usize }>;

// 단일 스레드에서는 윈도우당 통과 패킷 수가 리밋을 넘지 않아야 함
fuzz_target!(|input: FuzzInput| {
    let mut table = Table::new();
    let mut limits = Vec::new();
    for (index, &(limit, net, prefix)) in (0u32..).zip(input.rules.iter()) {
        if index >= RATE_LIMIT_MAX_ENTRIES {
            break;
        }
        let mask = v4_prefix_mask(prefix % 32 + 1);
        table
            .insert(index, RateLimitRule::v4(limit, net & mask, mask))
            .expect("index below capacity");
        limits.push(limit);
    }

    // 엔트리별 (윈도우 끝, 통과 수)
    let mut windows = vec![(0u64, 0u64); limits.len()];
    let mut now: u64 = 1;

    for &(addr, delta) in &input.packets {
        now = now.saturating_add(u64::from(delta));
        let src = SourceAddr::V4(addr);

        let matched = find_rule(&table, &src).and_then(|entry| {
            (0..RATE_LIMIT_MAX_ENTRIES)
                .map_while(|index| table.get_ptr_mut(index))
                .position(|ptr| ptr == entry)
        });
        let verdict = admit(&table, &src, now);

        let Some(index) = matched else {
            assert_eq!(verdict, Verdict::Pass, "unmatched source dropped");
            continue;
        };

        let (end, passed) = &mut windows[index];
        if *end == 0 || now > *end {
            *end = now + WINDOW_NS;
            *passed = 0;
        }
        if verdict == Verdict::Pass {
            *passed += 1;
            // 윈도우를 여는 첫 패킷은 리밋 0 에서도 통과
            assert!(*passed <= u64::from(limits[index]).max(1), "limit exceeded");
        }
    }
});
