//! Packages

use once_cell::sync::OnceCell;
use serde::Deserialize;

use super::LoaderId;

/// Descriptive attributes of a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PackageInfo {
    /// Specification title
    pub spec_title: Option<String>,
    /// Specification version
    pub spec_version: Option<String>,
    /// Implementation title
    pub impl_title: Option<String>,
    /// Implementation version
    pub impl_version: Option<String>,
    /// Whether every type of the package must come from one code source
    pub sealed: bool,
}

/// A package defined by a loader
#[derive(Debug, Clone)]
pub struct Package {
    name: String,
    loader: LoaderId,
    info: PackageInfo,
    /// Bound by the first type defined into a sealed package
    code_source: OnceCell<Option<String>>,
}

impl Package {
    pub(crate) fn new(name: &str, loader: LoaderId, info: PackageInfo) -> Self {
        Self {
            name: name.to_string(),
            loader,
            info,
            code_source: OnceCell::new(),
        }
    }

    /// Package name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Defining loader
    pub fn loader(&self) -> LoaderId {
        self.loader
    }

    /// Package attributes
    pub fn info(&self) -> &PackageInfo {
        &self.info
    }

    /// Whether the package is sealed
    pub fn is_sealed(&self) -> bool {
        self.info.sealed
    }

    /// Code source a sealed package is bound to
    pub fn code_source(&self) -> Option<&str> {
        self.code_source.get().and_then(|source| source.as_deref())
    }

    /// Whether a type from `code_source` may join this package
    pub(crate) fn admits(&self, code_source: Option<&str>) -> bool {
        if !self.info.sealed {
            return true;
        }
        let bound = self
            .code_source
            .get_or_init(|| code_source.map(str::to_string));
        bound.as_deref() == code_source
    }
}
