//! Function-pointer label correlation.
//!
//! Read-only data holds tables of function pointers (method tables, entry
//! points handed to goroutine creation). Once functions carry their real
//! names, pointer slots the host labelled generically are renamed after the
//! function they point to.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use tracing::{debug, error, info};

use crate::analysis::database::ProgramDatabase;
use crate::config::PointerLabelConfig;
use crate::error::{RecoverError, Result};

static DEFAULT_AUTO_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^off_[0-9A-Fa-f]+$").expect("valid auto label regex"));

fn auto_label_pattern(config: &PointerLabelConfig) -> Result<Cow<'static, Regex>> {
    if config.auto_label_pattern == DEFAULT_AUTO_LABEL.as_str() {
        return Ok(Cow::Borrowed(&*DEFAULT_AUTO_LABEL));
    }
    Regex::new(&config.auto_label_pattern)
        .map(Cow::Owned)
        .map_err(|e| RecoverError::Config(format!("auto label pattern: {e}")))
}

/// Rename generic pointer labels in read-only data after their targets.
///
/// Returns the number of labels renamed. Failed renames are logged.
pub fn correlate_function_pointers<D: ProgramDatabase + ?Sized>(
    db: &mut D,
    config: &PointerLabelConfig,
) -> Result<usize> {
    let pattern = auto_label_pattern(config)?;
    let mut renamed = 0usize;

    for function in db.functions() {
        let Some(name) = db.name_at(function) else {
            continue;
        };
        for slot in db.data_refs_to(function) {
            let in_readonly = db.segment_name_at(slot).is_some_and(|seg| {
                config
                    .readonly_segment_markers
                    .iter()
                    .any(|m| seg.contains(m.as_str()))
            });
            if !in_readonly {
                continue;
            }
            let Some(label) = db.name_at(slot) else {
                continue;
            };
            if !pattern.is_match(&label) {
                continue;
            }
            let new_name = format!("{}{}", name, config.suffix);
            match db.set_name(slot, &new_name) {
                Ok(()) => {
                    db.wait_for_analysis();
                    debug!(
                        slot = format_args!("{:#x}", slot),
                        from = %label,
                        to = %new_name,
                        "renamed function pointer"
                    );
                    renamed += 1;
                }
                Err(e) => error!(
                    slot = format_args!("{:#x}", slot),
                    function = %name,
                    error = %e,
                    "failed to name pointer"
                ),
            }
        }
    }

    info!(renamed, "renamed function pointers");
    Ok(renamed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::image::ProgramImage;
    use crate::analysis::memory::ItemSize;
    use crate::core::segment::{Perms, Segment};

    fn image() -> ProgramImage {
        let mut img = ProgramImage::new(8);
        img.add_segment(Segment::new(
            ".text",
            0x1000,
            vec![0xc3; 0x100],
            Perms::READ | Perms::EXECUTE,
        ));
        let mut rodata = vec![0u8; 0x40];
        for (i, target) in [0x1000u64, 0x1000, 0x1040, 0x1080].iter().enumerate() {
            rodata[i * 8..i * 8 + 8].copy_from_slice(&target.to_le_bytes());
        }
        img.add_segment(Segment::new(".rodata", 0x2000, rodata, Perms::READ));
        let mut data = vec![0u8; 0x10];
        data[..8].copy_from_slice(&0x1000u64.to_le_bytes());
        img.add_segment(Segment::new(".data", 0x3000, data, Perms::READ | Perms::WRITE));
        img.add_function(0x1000, None)
            .add_function(0x1040, None)
            .add_function(0x1080, None)
            .add_name(0x1000, "main_worker")
            .add_name(0x1040, "main_handler");
        for slot in [0x2000, 0x2008, 0x2010, 0x2018, 0x3000] {
            img.add_data_item(slot, ItemSize::Qword);
        }
        img
    }

    #[test]
    fn renames_generic_readonly_pointers() {
        let mut img = image();
        img.add_name(0x2008, "main_table");
        let renamed = correlate_function_pointers(&mut img, &PointerLabelConfig::default()).unwrap();
        // 0x2000 and 0x2010 by name, 0x2018 after the host's own sub_ label.
        assert_eq!(renamed, 3);
        assert_eq!(img.name_at(0x2000).as_deref(), Some("main_worker_ptr"));
        assert_eq!(img.name_at(0x2008).as_deref(), Some("main_table"));
        assert_eq!(img.name_at(0x2010).as_deref(), Some("main_handler_ptr"));
        assert_eq!(img.name_at(0x2018).as_deref(), Some("sub_1080_ptr"));
        // Writable data is left alone.
        assert_eq!(img.name_at(0x3000).as_deref(), Some("off_3000"));
        assert_eq!(img.pending_mutations(), 0);
    }

    #[test]
    fn repeated_targets_get_unique_labels() {
        let mut img = image();
        let renamed = correlate_function_pointers(&mut img, &PointerLabelConfig::default()).unwrap();
        assert_eq!(renamed, 4);
        assert_eq!(img.name_at(0x2000).as_deref(), Some("main_worker_ptr"));
        assert_eq!(img.name_at(0x2008).as_deref(), Some("main_worker_ptr_0"));
    }

    #[test]
    fn retyped_slots_are_not_renamed() {
        let mut img = image();
        img.create_string_literal(0x2018, 8).unwrap();
        img.wait_for_analysis();
        let renamed = correlate_function_pointers(&mut img, &PointerLabelConfig::default()).unwrap();
        assert_eq!(renamed, 3);
        assert_eq!(img.name_at(0x2018).as_deref(), Some("str_2018"));
        assert!(img.data_refs_to(0x1080).is_empty());
    }

    #[test]
    fn custom_pattern_and_bad_pattern() {
        let mut img = image();
        let config = PointerLabelConfig {
            auto_label_pattern: "^never$".into(),
            ..PointerLabelConfig::default()
        };
        assert_eq!(correlate_function_pointers(&mut img, &config).unwrap(), 0);
        let bad = PointerLabelConfig {
            auto_label_pattern: "(".into(),
            ..PointerLabelConfig::default()
        };
        assert!(matches!(
            correlate_function_pointers(&mut img, &bad),
            Err(RecoverError::Config(_))
        ));
    }
}
