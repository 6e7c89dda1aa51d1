//! Human-readable and JSON summaries of a recovery run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::pclntab::symtab::SymbolTable;

/// Summary of one recovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub function_count: u64,
    pub install_root: String,
    pub version: String,
    pub source_files: Vec<String>,
    pub pointer_labels: usize,
}

impl RecoveryReport {
    pub fn new(symtab: &SymbolTable, pointer_labels: usize) -> Self {
        Self {
            function_count: symtab.function_count,
            install_root: symtab.install_root.clone(),
            version: symtab.version.clone(),
            source_files: symtab.source_files.clone(),
            pointer_labels,
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "(not found)"
    } else {
        value
    }
}

impl fmt::Display for RecoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total functions number: {}", self.function_count)?;
        writeln!(f, "Go ROOT Path: {}", or_unknown(&self.install_root))?;
        writeln!(f, "Go version: {}", or_unknown(&self.version))?;
        writeln!(f, "Source file paths ({} user-defined):", self.source_files.len())?;
        for path in &self.source_files {
            writeln!(f, "  {}", path)?;
        }
        write!(f, "Renamed {} function pointers.", self.pointer_labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecoveryReport {
        RecoveryReport {
            function_count: 2,
            install_root: "/usr/local/go".into(),
            version: String::new(),
            source_files: vec!["/home/u/main.go".into()],
            pointer_labels: 1,
        }
    }

    #[test]
    fn display_lists_everything() {
        let text = sample().to_string();
        assert!(text.contains("Total functions number: 2"));
        assert!(text.contains("Go ROOT Path: /usr/local/go"));
        assert!(text.contains("Go version: (not found)"));
        assert!(text.contains("  /home/u/main.go\n"));
        assert!(text.ends_with("Renamed 1 function pointers."));
    }

    #[test]
    fn json_round_trip() {
        let report = sample();
        let json = report.to_json_string().unwrap();
        assert!(json.contains("\"pointer_labels\": 1"));
        let back: RecoveryReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
