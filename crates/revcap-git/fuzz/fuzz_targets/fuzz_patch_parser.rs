#![no_main]

use libfuzzer_sys::fuzz_target;
use revcap_git::patch::{apply_patch, parse_patch};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Split the input into a base text and a patch so application is fuzzed too.
    let (base, patch) = text.split_once("\n===\n").unwrap_or(("", text));
    for diff in parse_patch(patch) {
        let _ = apply_patch(base, Some(&diff));
    }
});
