//! Recovery driven by JSON configuration overrides.

mod common;

use common::{layout, GoFunction, GoImage, RODATA, TEXT};
use gosym_recover::analysis::ProgramDatabase;
use gosym_recover::{recover, RecoverConfig, RecoverError};

fn fixture() -> GoImage {
    let mut image = GoImage::new(8)
        .function(GoFunction::new(TEXT, "main.main"))
        .file("/home/u/app/main.go")
        .file("/root/go/pkg/mod/example.com/lib/lib.go")
        .install_root("/opt/go")
        .version("go1.4.2")
        .pointer_to(TEXT);
    image.pclntab_segment = ".go.symtab";
    image
}

#[test]
fn test_overrides_change_every_phase() {
    let config = RecoverConfig::from_json_str(
        r#"{
            "locate": {"segment_names": [".go.symtab"]},
            "runtime": {"version_prefix": "go1."},
            "sources": {"excluded_markers": []},
            "pointers": {"suffix": "_fn"}
        }"#,
    )
    .unwrap();
    let mut image = fixture().build();
    let (symtab, report) = recover(&mut image, &config).unwrap();

    assert_eq!(symtab.install_root, "/opt/go");
    assert_eq!(symtab.version, "4.2");
    assert_eq!(
        symtab.source_files,
        vec!["/home/u/app/main.go", "/root/go/pkg/mod/example.com/lib/lib.go"]
    );
    assert_eq!(report.pointer_labels, 1);
    assert_eq!(
        image.name_at(RODATA + layout::POINTER_TABLE).as_deref(),
        Some("main_main_fn")
    );
}

#[test]
fn test_defaults_miss_unknown_segment() {
    let mut image = fixture().build();
    let err = recover(&mut image, &RecoverConfig::default()).unwrap_err();
    assert!(matches!(err, RecoverError::SymtabNotFound { ref segments, .. } if segments.len() == 2));
}

#[test]
fn test_unmatched_runtime_names_leave_fields_empty() {
    let config = RecoverConfig::from_json_str(
        r#"{
            "locate": {"segment_names": [".go.symtab"]},
            "runtime": {
                "install_root_function": "runtime_defaultGOROOT",
                "version_length_immediate": 8
            }
        }"#,
    )
    .unwrap();
    let mut image = fixture().build();
    let (symtab, _) = recover(&mut image, &config).unwrap();
    assert_eq!(symtab.install_root, "");
    assert_eq!(symtab.version, "");
    assert_eq!(symtab.function_count, 3);
}

#[test]
fn test_invalid_config_is_rejected_before_any_mutation() {
    let mut image = fixture().build();
    let mut config = RecoverConfig::default();
    config.locate.segment_names = vec![".go.symtab".into()];
    config.pointers.auto_label_pattern = "off_[".into();
    assert!(matches!(
        recover(&mut image, &config),
        Err(RecoverError::Config(_))
    ));
    assert!(image.functions().is_empty());
    assert_eq!(image.barrier_count(), 0);
}
