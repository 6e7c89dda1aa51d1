#![no_main]
use libfuzzer_sys::fuzz_target;

use gosym_recover::analysis::ProgramImage;
use gosym_recover::core::segment::{Perms, Segment};

fuzz_target!(|data: &[u8]| {
    let mut image = ProgramImage::new(8);
    image.add_segment(Segment::new(".text", 0x1000, vec![0xc3; 0x100], Perms::READ | Perms::EXECUTE));
    image.add_segment(Segment::new(".gopclntab", 0x10000, data.to_vec(), Perms::READ));
    let _ = gosym_recover::recover(&mut image, &gosym_recover::RecoverConfig::default());
});
