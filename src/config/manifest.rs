//! Package manifest parsing.
//!
//! A manifest is a flat list of directives, one per line:
//!
//! ```text
//! ideviceinstaller
//! libimobiledevice:--HEAD --with-foo
//! -python@2
//! ```
//!
//! A bare name installs, a `:` suffix carries extra install flags and a
//! leading `-` removes. Blank lines are skipped.

use thiserror::Error;

/// Manifest syntax errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ManifestError {
    /// A line could not be turned into a directive
    #[error("line {line}: {reason}")]
    InvalidDirective {
        /// 1-based line number
        line: usize,
        /// Reason for the error
        reason: String,
    },
}

/// One install or remove instruction for a package manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageDirective {
    /// Install `name`, passing `flags` before the package name
    Install { name: String, flags: Vec<String> },
    /// Force-remove `name`
    Remove { name: String },
}

impl PackageDirective {
    /// Package the directive applies to
    pub fn name(&self) -> &str {
        match self {
            Self::Install { name, .. } | Self::Remove { name } => name,
        }
    }

    fn parse(line: &str, line_no: usize) -> Result<Self, ManifestError> {
        let invalid = |reason: &str| ManifestError::InvalidDirective {
            line: line_no,
            reason: reason.to_string(),
        };

        if let Some(name) = line.strip_prefix('-') {
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid("removal without a package name"));
            }
            if name.contains(':') {
                return Err(invalid("removal directives cannot carry install flags"));
            }
            return Ok(Self::Remove {
                name: name.to_string(),
            });
        }

        let (name, flags) = match line.split_once(':') {
            Some((name, flags)) => (
                name.trim(),
                flags.split_whitespace().map(str::to_string).collect(),
            ),
            None => (line, Vec::new()),
        };
        if name.is_empty() {
            return Err(invalid("install without a package name"));
        }

        Ok(Self::Install {
            name: name.to_string(),
            flags,
        })
    }
}

/// Ordered package directives read from a manifest file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
    directives: Vec<PackageDirective>,
}

impl PackageManifest {
    /// Parse manifest text, keeping directives in file order
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let directives = text
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty())
            .map(|(line_no, line)| PackageDirective::parse(line, line_no))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { directives })
    }

    /// All directives in file order
    pub fn directives(&self) -> &[PackageDirective] {
        &self.directives
    }

    /// Install directives in file order
    pub fn installs(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.directives.iter().filter_map(|d| match d {
            PackageDirective::Install { name, flags } => Some((name.as_str(), flags.as_slice())),
            PackageDirective::Remove { .. } => None,
        })
    }

    /// Removal directives in file order
    pub fn removals(&self) -> impl Iterator<Item = &str> {
        self.directives.iter().filter_map(|d| match d {
            PackageDirective::Remove { name } => Some(name.as_str()),
            PackageDirective::Install { .. } => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}
