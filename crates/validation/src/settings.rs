//! Local Windows platform version metadata.
//!
//! The image pipeline publishes a JSON reference file mapping Windows
//! version keys to base image versions; the Windows version validator
//! compares its entries against what the VM's registry reports.

use std::path::Path;

use serde_json::Value;

use crate::compare::{json_field, json_value_text};
use crate::error::{Result, ValidationError};

/// Parsed Windows settings reference file.
#[derive(Debug, Clone)]
pub struct WindowsSettings {
    document: Value,
}

impl WindowsSettings {
    /// Load and parse the reference file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            ValidationError::Setup(format!(
                "could not read Windows settings file {}: {err}",
                path.display()
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parse settings from a JSON string.
    pub fn from_json(content: &str) -> Result<Self> {
        let document = serde_json::from_str(content).map_err(|err| {
            ValidationError::Setup(format!("Windows settings file is not valid JSON: {err}"))
        })?;
        Ok(Self { document })
    }

    /// Base image version recorded for a Windows version key, e.g.
    /// `2022-containerd` -> `20348.2700.240911`.
    pub fn base_image_version(&self, windows_version: &str) -> Result<String> {
        let path = format!("WindowsBaseVersions.{windows_version}.base_image_version");
        json_field(&self.document, &path)
            .map(json_value_text)
            .ok_or_else(|| {
                ValidationError::Setup(format!(
                    "no base_image_version entry for Windows version {windows_version:?}"
                ))
            })
    }

    /// OS major build number for a Windows version key (the leading dotted
    /// component of the base image version).
    pub fn os_major_version(&self, windows_version: &str) -> Result<String> {
        let version = self.base_image_version(windows_version)?;
        version
            .split('.')
            .next()
            .filter(|major| !major.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| {
                ValidationError::Setup(format!(
                    "base_image_version {version:?} for {windows_version:?} has no major component"
                ))
            })
    }
}
