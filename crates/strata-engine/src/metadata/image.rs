//! Type image format
//!
//! A type image is what a host hands to [`crate::ImageDefiner`]: the type's
//! name, modifiers, supertype names, enclosing type, requested native
//! libraries and its raw member and annotation blobs.

use super::annotation::{encode_annotations, Annotation};
use super::codec::{DecodeError, EncodeError, MetadataReader, MetadataWriter};
use super::member::{encode_members, Member, Modifiers};

/// Magic number for type images: "STRT"
pub const IMAGE_MAGIC: [u8; 4] = *b"STRT";

/// Current type image version
pub const IMAGE_VERSION: u32 = 1;

/// Decoded type image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeImage {
    /// Fully qualified type name
    pub name: String,
    /// Type modifiers
    pub modifiers: Modifiers,
    /// Superclass name (`None` for roots and interfaces)
    pub superclass: Option<String>,
    /// Direct interface names, in declaration order
    pub interfaces: Vec<String>,
    /// Enclosing type name for nested types
    pub enclosing: Option<String>,
    /// Native libraries the type's initialization requests
    pub native_libraries: Vec<String>,
    /// Raw member blob
    pub members: Vec<u8>,
    /// Raw annotation blob
    pub annotations: Vec<u8>,
}

impl TypeImage {
    /// Start building a public class
    pub fn class(name: &str) -> TypeImageBuilder {
        TypeImageBuilder::new(name, Modifiers::public())
    }

    /// Start building a public interface
    pub fn interface(name: &str) -> TypeImageBuilder {
        TypeImageBuilder::new(name, Modifiers::interface())
    }

    /// Encode to bytes
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut payload = MetadataWriter::with_capacity(
            64 + self.members.len() + self.annotations.len(),
        );
        payload.emit_str(&self.name)?;
        payload.emit_u16(self.modifiers.bits());
        payload.emit_opt_str(self.superclass.as_deref())?;
        payload.emit_len_u16(self.interfaces.len(), "interface list")?;
        for iface in &self.interfaces {
            payload.emit_str(iface)?;
        }
        payload.emit_opt_str(self.enclosing.as_deref())?;
        payload.emit_len_u16(self.native_libraries.len(), "native library list")?;
        for lib in &self.native_libraries {
            payload.emit_str(lib)?;
        }
        payload.emit_blob(&self.members)?;
        payload.emit_blob(&self.annotations)?;
        let payload = payload.into_bytes();

        let mut writer = MetadataWriter::with_capacity(payload.len() + 12);
        writer.emit_raw(&IMAGE_MAGIC);
        writer.emit_u32(IMAGE_VERSION);
        writer.emit_u32(crc32fast::hash(&payload));
        writer.emit_raw(&payload);
        Ok(writer.into_bytes())
    }

    /// Decode from bytes
    pub fn decode(bytes: &[u8], verify_checksum: bool) -> Result<Self, DecodeError> {
        let mut reader = MetadataReader::new(bytes);

        let mut magic = [0u8; 4];
        magic.copy_from_slice(reader.read_bytes(4)?);
        if magic != IMAGE_MAGIC {
            return Err(DecodeError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != IMAGE_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let expected = reader.read_u32()?;
        if verify_checksum {
            let actual = crc32fast::hash(&bytes[reader.position()..]);
            if actual != expected {
                return Err(DecodeError::ChecksumMismatch { expected, actual });
            }
        }

        let name = reader.read_str()?;
        let modifiers = Modifiers::from_bits(reader.read_u16()?);
        let superclass = reader.read_opt_str()?;
        let iface_count = reader.read_u16()? as usize;
        let mut interfaces = Vec::with_capacity(iface_count);
        for _ in 0..iface_count {
            interfaces.push(reader.read_str()?);
        }
        let enclosing = reader.read_opt_str()?;
        let lib_count = reader.read_u16()? as usize;
        let mut native_libraries = Vec::with_capacity(lib_count);
        for _ in 0..lib_count {
            native_libraries.push(reader.read_str()?);
        }
        let members = reader.read_blob()?;
        let annotations = reader.read_blob()?;
        reader.expect_end()?;

        Ok(Self {
            name,
            modifiers,
            superclass,
            interfaces,
            enclosing,
            native_libraries,
            members,
            annotations,
        })
    }
}

/// Builder for [`TypeImage`]
#[derive(Debug, Clone)]
pub struct TypeImageBuilder {
    name: String,
    modifiers: Modifiers,
    superclass: Option<String>,
    interfaces: Vec<String>,
    enclosing: Option<String>,
    native_libraries: Vec<String>,
    members: Vec<Member>,
    annotations: Vec<Annotation>,
}

impl TypeImageBuilder {
    fn new(name: &str, modifiers: Modifiers) -> Self {
        Self {
            name: name.to_string(),
            modifiers,
            superclass: None,
            interfaces: Vec::new(),
            enclosing: None,
            native_libraries: Vec::new(),
            members: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// Replace the type modifiers
    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Set the superclass
    pub fn extends(mut self, superclass: &str) -> Self {
        self.superclass = Some(superclass.to_string());
        self
    }

    /// Add a direct interface
    pub fn implements(mut self, iface: &str) -> Self {
        self.interfaces.push(iface.to_string());
        self
    }

    /// Set the enclosing type
    pub fn enclosed_by(mut self, enclosing: &str) -> Self {
        self.enclosing = Some(enclosing.to_string());
        self
    }

    /// Request a native library at initialization
    pub fn requires_library(mut self, library: &str) -> Self {
        self.native_libraries.push(library.to_string());
        self
    }

    /// Declare a member
    pub fn member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    /// Declare an annotation
    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Encode the blobs and produce the image
    pub fn build(self) -> Result<TypeImage, EncodeError> {
        Ok(TypeImage {
            members: encode_members(&self.members)?,
            annotations: encode_annotations(&self.annotations)?,
            name: self.name,
            modifiers: self.modifiers,
            superclass: self.superclass,
            interfaces: self.interfaces,
            enclosing: self.enclosing,
            native_libraries: self.native_libraries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TypeImage {
        TypeImage::class("pkg.Widget")
            .extends("pkg.Base")
            .implements("pkg.Drawable")
            .requires_library("widgets")
            .member(Member::method("draw", "void", &[]))
            .annotation(Annotation::new("meta.Component"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_image_round_trip() {
        let image = sample();
        let decoded = TypeImage::decode(&image.encode().unwrap(), true).unwrap();
        assert_eq!(decoded, image);
        assert_eq!(decoded.superclass.as_deref(), Some("pkg.Base"));
        assert_eq!(decoded.native_libraries, vec!["widgets".to_string()]);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample().encode().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            TypeImage::decode(&bytes, true),
            Err(DecodeError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_checksum_verification() {
        let mut bytes = sample().encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        assert!(matches!(
            TypeImage::decode(&bytes, true),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = sample().encode().unwrap();
        bytes[4] = 9;
        assert_eq!(
            TypeImage::decode(&bytes, false),
            Err(DecodeError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn test_oversized_image_is_rejected() {
        let mut image = sample();
        image.interfaces = vec!["pkg.Drawable".to_string(); u16::MAX as usize + 1];
        assert!(matches!(
            image.encode(),
            Err(EncodeError::TooLong { what: "interface list", .. })
        ));

        let long_name = format!("pkg.{}", "W".repeat(u16::MAX as usize));
        assert!(matches!(
            TypeImage::class(&long_name).build().unwrap().encode(),
            Err(EncodeError::TooLong { what: "string", .. })
        ));

        let params = vec!["int"; 256];
        assert!(matches!(
            TypeImage::class("pkg.Wide")
                .member(Member::method("call", "void", &params))
                .build(),
            Err(EncodeError::TooLong { what: "parameter list", .. })
        ));
    }

    #[test]
    fn test_interface_builder() {
        let image = TypeImage::interface("pkg.Drawable").build().unwrap();
        assert!(image.modifiers.is_interface);
        assert!(image.modifiers.is_abstract);
        assert_eq!(image.superclass, None);
    }
}
