#![no_main]

use libfuzzer_sys::fuzz_target;

use ironfence_xdp_common::acl::AclMatcher;
use ironfence_xdp_common::dispatch::{ETH_HDR_LEN, decide, parse_source};
use ironfence_xdp_common::{AclRule, SlotTable, Verdict};

// 임의의 프레임: 파싱은 패닉 없이 끝나야 하고, 빈 테이블은 항상 통과
fuzz_target!(|data: &[u8]| {
    let src = parse_source(data);
    if data.len() < ETH_HDR_LEN {
        assert!(src.is_none(), "truncated ethernet header parsed");
    }

    let matcher = AclMatcher::new(SlotTable::<AclRule, 4>::new());
    assert_eq!(decide(data, &matcher), Verdict::Pass);
});
