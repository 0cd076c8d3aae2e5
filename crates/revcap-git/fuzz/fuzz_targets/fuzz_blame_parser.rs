#![no_main]

use libfuzzer_sys::fuzz_target;
use revcap_git::blame::parse_blame;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let revisions = parse_blame(text);
        assert!(revisions.windows(2).all(|w| w[0].date >= w[1].date));
    }
});
