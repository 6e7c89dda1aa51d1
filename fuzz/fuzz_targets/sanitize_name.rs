#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let name = gosym_recover::pclntab::sanitize_name(data);
    assert!(name.bytes().all(|b| b.is_ascii_graphic()));
});
