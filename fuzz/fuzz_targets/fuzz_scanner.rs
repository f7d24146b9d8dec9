#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        // The scanner must reject or accept without panicking.
        let _ = mani_compiler::scanner::scan(source);
    }
});
