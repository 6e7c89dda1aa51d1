#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let view = gosym_recover::analysis::SliceMemoryView::new(0x1000, data);
    let sources = gosym_recover::config::SourceFilterConfig::default();
    let _ = gosym_recover::pclntab::probe_symtab(&view, 0x1000, &sources);
});
