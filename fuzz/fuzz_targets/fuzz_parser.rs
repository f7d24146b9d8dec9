#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        if let Ok((tokens, mut strings)) = mani_compiler::scanner::scan(source) {
            let _ = mani_compiler::parser::parse(&tokens, &mut strings);
        }
    }
});
