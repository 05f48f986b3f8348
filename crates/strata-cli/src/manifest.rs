//! World manifest parsing (`world.toml`)
//!
//! A world manifest declares a loader graph and the types each loader can
//! materialize:
//!
//! ```toml
//! [runtime]
//! verify_checksums = true
//!
//! [[loader]]
//! name = "boot"
//!
//! [[loader]]
//! name = "app"
//! parent = "boot"
//! parallel = false
//!
//! [[type]]
//! name = "app.Main"
//! loader = "app"
//! extends = "lib.Base"
//! libraries = ["gfx"]
//!
//! [[type.members]]
//! kind = "method"
//! name = "run"
//! type = "void"
//! params = ["int"]
//!
//! [[type.annotations]]
//! kind = "Entity"
//! inherited = true
//! elements = { table = "main" }
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use strata_engine::{
    Annotation, AnnotationValue, EncodeError, Member, MemberKind, Modifiers, RuntimeConfig, TypeImage,
};
use thiserror::Error;

/// Errors that can occur during manifest parsing
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to read manifest file
    #[error("Failed to read manifest file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid manifest: {0}")]
    ValidationError(String),

    /// A declared type does not fit the type image format
    #[error("Failed to encode type image: {0}")]
    EncodeError(#[from] EncodeError),
}

/// World manifest
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorldManifest {
    /// Runtime configuration
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Loaders, parents before children
    #[serde(default, rename = "loader")]
    pub loaders: Vec<LoaderDecl>,

    /// Type declarations
    #[serde(default, rename = "type")]
    pub types: Vec<TypeDecl>,
}

/// A loader in the graph
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderDecl {
    /// Unique loader name
    pub name: String,

    /// Parent loader, declared earlier
    pub parent: Option<String>,

    /// Register the loader's type as parallel-capable
    #[serde(default = "default_true")]
    pub parallel: bool,
}

/// Whether a declared type is a class or an interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// Class
    #[default]
    Class,
    /// Interface
    Interface,
}

/// A type the named loader can materialize
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDecl {
    /// Fully qualified name
    pub name: String,

    /// Loader whose source provides the type
    pub loader: String,

    /// Class or interface
    #[serde(default)]
    pub kind: TypeKind,

    /// Modifier keywords
    #[serde(default)]
    pub modifiers: Vec<String>,

    /// Superclass name
    pub extends: Option<String>,

    /// Interface names
    #[serde(default)]
    pub implements: Vec<String>,

    /// Enclosing type name
    pub enclosing: Option<String>,

    /// Native libraries loaded when the type is linked
    #[serde(default)]
    pub libraries: Vec<String>,

    /// Declared members
    #[serde(default)]
    pub members: Vec<MemberDecl>,

    /// Declared annotations
    #[serde(default)]
    pub annotations: Vec<AnnotationDecl>,
}

/// Kind of a declared member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberDeclKind {
    /// Field
    Field,
    /// Method
    Method,
    /// Constructor
    Constructor,
}

/// A declared member
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemberDecl {
    /// Member kind
    pub kind: MemberDeclKind,

    /// Member name (ignored for constructors)
    #[serde(default)]
    pub name: String,

    /// Field type or return type
    #[serde(default = "default_void", rename = "type")]
    pub type_name: String,

    /// Parameter types
    #[serde(default)]
    pub params: Vec<String>,

    /// Modifier keywords (default `["public"]`)
    #[serde(default = "default_member_modifiers")]
    pub modifiers: Vec<String>,
}

/// A declared annotation
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnnotationDecl {
    /// Annotation kind
    pub kind: String,

    /// Inherited by subclasses
    #[serde(default)]
    pub inherited: bool,

    /// Element values
    #[serde(default)]
    pub elements: BTreeMap<String, AnnotationValue>,
}

fn default_true() -> bool {
    true
}

fn default_void() -> String {
    "void".to_string()
}

fn default_member_modifiers() -> Vec<String> {
    vec!["public".to_string()]
}

impl WorldManifest {
    /// Parse a manifest from a file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a manifest from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ManifestError> {
        let manifest: WorldManifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest
    pub fn validate(&self) -> Result<(), ManifestError> {
        self.runtime
            .validate()
            .map_err(|e| ManifestError::ValidationError(e.to_string()))?;

        let mut loaders = HashSet::new();
        for loader in &self.loaders {
            if loader.name.is_empty() {
                return Err(ManifestError::ValidationError(
                    "Loader name cannot be empty".to_string(),
                ));
            }
            if let Some(parent) = &loader.parent {
                if !loaders.contains(parent.as_str()) {
                    return Err(ManifestError::ValidationError(format!(
                        "Loader {} names unknown parent {}. Parents must be declared first",
                        loader.name, parent
                    )));
                }
            }
            if !loaders.insert(loader.name.as_str()) {
                return Err(ManifestError::ValidationError(format!(
                    "Duplicate loader: {}",
                    loader.name
                )));
            }
        }

        let mut types = HashSet::new();
        for decl in &self.types {
            if !loaders.contains(decl.loader.as_str()) {
                return Err(ManifestError::ValidationError(format!(
                    "Type {} names unknown loader {}",
                    decl.name, decl.loader
                )));
            }
            if !types.insert((decl.loader.as_str(), decl.name.as_str())) {
                return Err(ManifestError::ValidationError(format!(
                    "Type {} declared twice for loader {}",
                    decl.name, decl.loader
                )));
            }
            decl.to_image()?.encode()?;
        }

        Ok(())
    }

    /// Types declared for `loader`
    pub fn types_for<'a>(&'a self, loader: &'a str) -> impl Iterator<Item = &'a TypeDecl> + 'a {
        self.types.iter().filter(move |t| t.loader == loader)
    }
}

impl TypeDecl {
    /// Build the type image this declaration describes
    pub fn to_image(&self) -> Result<TypeImage, ManifestError> {
        let mut builder = match self.kind {
            TypeKind::Class => TypeImage::class(&self.name),
            TypeKind::Interface => TypeImage::interface(&self.name),
        };

        if !self.modifiers.is_empty() {
            let mut modifiers = match self.kind {
                TypeKind::Class => Modifiers::public(),
                TypeKind::Interface => Modifiers::interface(),
            };
            apply_keywords(&mut modifiers, &self.modifiers, &self.name)?;
            builder = builder.modifiers(modifiers);
        }
        if let Some(superclass) = &self.extends {
            builder = builder.extends(superclass);
        }
        for iface in &self.implements {
            builder = builder.implements(iface);
        }
        if let Some(enclosing) = &self.enclosing {
            builder = builder.enclosed_by(enclosing);
        }
        for library in &self.libraries {
            builder = builder.requires_library(library);
        }
        for member in &self.members {
            builder = builder.member(member.to_member(&self.name)?);
        }
        for annotation in &self.annotations {
            builder = builder.annotation(Annotation {
                kind: annotation.kind.clone(),
                inherited: annotation.inherited,
                elements: annotation.elements.clone(),
            });
        }
        Ok(builder.build()?)
    }
}

impl MemberDecl {
    fn to_member(&self, owner: &str) -> Result<Member, ManifestError> {
        let params: Vec<&str> = self.params.iter().map(String::as_str).collect();
        let member = match self.kind {
            MemberDeclKind::Field => Member::field(&self.name, &self.type_name),
            MemberDeclKind::Method => Member::method(&self.name, &self.type_name, &params),
            MemberDeclKind::Constructor => Member::constructor(&params),
        };
        if member.kind != MemberKind::Constructor && member.name.is_empty() {
            return Err(ManifestError::ValidationError(format!(
                "Member of {} has no name",
                owner
            )));
        }

        let mut modifiers = Modifiers::default();
        apply_keywords(&mut modifiers, &self.modifiers, owner)?;
        Ok(member.with_modifiers(modifiers))
    }
}

fn apply_keywords(
    modifiers: &mut Modifiers,
    keywords: &[String],
    owner: &str,
) -> Result<(), ManifestError> {
    for keyword in keywords {
        if !modifiers.apply_keyword(keyword) {
            return Err(ManifestError::ValidationError(format!(
                "Unknown modifier {} on {}",
                keyword, owner
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORLD: &str = r#"
[[loader]]
name = "boot"

[[loader]]
name = "app"
parent = "boot"
parallel = false

[[type]]
name = "lib.Shape"
loader = "boot"
kind = "interface"

[[type.members]]
kind = "method"
name = "area"
type = "double"
modifiers = ["public", "abstract"]

[[type]]
name = "app.Circle"
loader = "app"
implements = ["lib.Shape"]
libraries = ["gfx"]

[[type.members]]
kind = "constructor"
params = ["double"]

[[type.annotations]]
kind = "Entity"
inherited = true
elements = { table = "circles", version = 2 }
"#;

    #[test]
    fn test_parse_world() {
        let manifest = WorldManifest::from_str(WORLD).unwrap();
        assert_eq!(manifest.loaders.len(), 2);
        assert!(manifest.loaders[0].parallel);
        assert!(!manifest.loaders[1].parallel);
        assert_eq!(manifest.types_for("app").count(), 1);
        assert!(manifest.runtime.verify_checksums);
    }

    #[test]
    fn test_type_to_image() {
        let manifest = WorldManifest::from_str(WORLD).unwrap();
        let shape = manifest.types[0].to_image().unwrap();
        assert!(shape.modifiers.is_interface);

        let circle = manifest.types[1].to_image().unwrap();
        assert_eq!(circle.interfaces, vec!["lib.Shape"]);
        assert_eq!(circle.native_libraries, vec!["gfx"]);
        let annotations = strata_engine::metadata::decode_annotations(&circle.annotations).unwrap();
        assert_eq!(annotations[0].get("version"), Some(&AnnotationValue::Int(2)));
    }

    #[test]
    fn test_oversized_parameter_list_is_rejected() {
        let params: Vec<String> = (0..300).map(|i| format!("\"int{i}\"")).collect();
        let toml = format!(
            r#"
[[loader]]
name = "app"

[[type]]
name = "app.Wide"
loader = "app"

[[type.members]]
kind = "method"
name = "call"
params = [{}]
"#,
            params.join(", ")
        );
        let err = WorldManifest::from_str(&toml).unwrap_err();
        assert!(matches!(err, ManifestError::EncodeError(EncodeError::TooLong { .. })));
    }

    #[test]
    fn test_unknown_parent() {
        let err = WorldManifest::from_str(
            r#"
[[loader]]
name = "app"
parent = "boot"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::ValidationError(_)));
    }

    #[test]
    fn test_unknown_modifier() {
        let err = WorldManifest::from_str(
            r#"
[[loader]]
name = "boot"

[[type]]
name = "lib.A"
loader = "boot"
modifiers = ["volatile"]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("volatile"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            WorldManifest::from_str("[[loader]]\nname = \"boot\"\ncolour = 1\n"),
            Err(ManifestError::ParseError(_))
        ));
    }
}
