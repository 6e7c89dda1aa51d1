//! Configuration for the recovery pipeline.
//!
//! Every constant the heuristics depend on lives here so that a binary built
//! by a slightly different toolchain can be handled by a JSON override rather
//! than a code change.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{RecoverError, Result};

/// Master configuration for a recovery run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverConfig {
    /// Where to find the symbol table.
    pub locate: LocateConfig,
    /// Runtime-string heuristics.
    pub runtime: RuntimeConfig,
    /// Source path classification.
    pub sources: SourceFilterConfig,
    /// Function-pointer label correlation.
    pub pointers: PointerLabelConfig,
}

/// Symbol table location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocateConfig {
    /// Segment names tried in order (ELF/PE first, then Mach-O).
    pub segment_names: Vec<String>,
    /// Symbol used when no segment matches (newer PE images).
    pub fallback_symbol: String,
}

impl Default for LocateConfig {
    fn default() -> Self {
        Self {
            segment_names: vec![".gopclntab".into(), "__gopclntab".into()],
            fallback_symbol: "runtime.pclntab".into(),
        }
    }
}

/// Install-root and version extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Sanitized name of the function returning the install root.
    pub install_root_function: String,
    /// Sanitized name of the scheduler initialization function.
    pub version_function: String,
    /// Immediate stored into the version length slot.
    pub version_length_immediate: u64,
    /// Smallest accepted version length.
    pub min_version_length: u64,
    /// Accepted version lengths are strictly below this.
    pub max_version_length: u64,
    /// Tag prefixed to the version string.
    pub version_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            install_root_function: "runtime_GOROOT".into(),
            version_function: "runtime_schedinit".into(),
            version_length_immediate: 7,
            min_version_length: 5,
            max_version_length: 10,
            version_prefix: "go".into(),
        }
    }
}

/// Source path classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFilterConfig {
    /// Substrings marking standard-library, cgo or vendored paths.
    pub excluded_markers: Vec<String>,
    /// Paths equal to one of these are compiler generated.
    pub generated_paths: Vec<String>,
}

impl Default for SourceFilterConfig {
    fn default() -> Self {
        Self {
            excluded_markers: vec!["/pkg/".into(), "_cgo_".into(), "go/src/git".into()],
            generated_paths: vec!["<autogenerated>".into()],
        }
    }
}

/// Function-pointer label correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerLabelConfig {
    /// Segment-name substrings identifying read-only data.
    pub readonly_segment_markers: Vec<String>,
    /// Pattern matched by labels the host generated on its own.
    pub auto_label_pattern: String,
    /// Appended to the function name to form the new label.
    pub suffix: String,
}

impl Default for PointerLabelConfig {
    fn default() -> Self {
        Self {
            readonly_segment_markers: vec!["rodata".into()],
            auto_label_pattern: "^off_[0-9A-Fa-f]+$".into(),
            suffix: "_ptr".into(),
        }
    }
}

impl RecoverConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RecoverConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values that would make a phase silently match nothing.
    pub fn validate(&self) -> Result<()> {
        if self.locate.segment_names.is_empty() && self.locate.fallback_symbol.is_empty() {
            return Err(RecoverError::Config(
                "no segment name or fallback symbol to locate the table".into(),
            ));
        }
        if self.runtime.install_root_function.is_empty() || self.runtime.version_function.is_empty()
        {
            return Err(RecoverError::Config("runtime function names must be set".into()));
        }
        if self.runtime.min_version_length >= self.runtime.max_version_length {
            return Err(RecoverError::Config(format!(
                "empty version length range [{}, {})",
                self.runtime.min_version_length, self.runtime.max_version_length
            )));
        }
        if self.pointers.suffix.is_empty() {
            return Err(RecoverError::Config("pointer label suffix must be set".into()));
        }
        regex::Regex::new(&self.pointers.auto_label_pattern).map_err(|e| {
            RecoverError::Config(format!("auto label pattern: {e}"))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = RecoverConfig::default();
        config.validate().unwrap();
        assert_eq!(config.runtime.version_length_immediate, 7);
        assert_eq!(config.locate.segment_names[0], ".gopclntab");
        assert_eq!(config.pointers.suffix, "_ptr");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            RecoverConfig::from_json_str(r#"{"runtime": {"version_prefix": "devel"}}"#).unwrap();
        assert_eq!(config.runtime.version_prefix, "devel");
        assert_eq!(config.runtime.install_root_function, "runtime_GOROOT");
        assert_eq!(config.sources.generated_paths, vec!["<autogenerated>"]);
    }

    #[test]
    fn rejects_empty_length_range() {
        let err = RecoverConfig::from_json_str(
            r#"{"runtime": {"min_version_length": 10, "max_version_length": 10}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, RecoverError::Config(_)));
    }

    #[test]
    fn rejects_bad_pattern() {
        let err =
            RecoverConfig::from_json_str(r#"{"pointers": {"auto_label_pattern": "off_("}}"#)
                .unwrap_err();
        assert!(err.to_string().contains("auto label pattern"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = RecoverConfig::default().to_json_string().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        let config = RecoverConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.pointers.auto_label_pattern, "^off_[0-9A-Fa-f]+$");
    }
}
