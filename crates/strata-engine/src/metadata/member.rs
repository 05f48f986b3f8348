//! Member declarations and the member blob format

use serde::Serialize;

use super::codec::{DecodeError, EncodeError, MetadataReader, MetadataWriter};

/// Name under which constructors are recorded
pub const CONSTRUCTOR_NAME: &str = "<init>";

const ACC_PUBLIC: u16 = 0x0001;
const ACC_PRIVATE: u16 = 0x0002;
const ACC_PROTECTED: u16 = 0x0004;
const ACC_STATIC: u16 = 0x0008;
const ACC_FINAL: u16 = 0x0010;
const ACC_INTERFACE: u16 = 0x0200;
const ACC_ABSTRACT: u16 = 0x0400;
const ACC_DEFAULT: u16 = 0x0800;
const ACC_ANNOTATION: u16 = 0x2000;

/// Modifier flags for types and members
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Modifiers {
    /// Public visibility
    pub is_public: bool,
    /// Private visibility
    pub is_private: bool,
    /// Protected visibility
    pub is_protected: bool,
    /// Static member
    pub is_static: bool,
    /// Final member or type
    pub is_final: bool,
    /// Abstract member or type
    pub is_abstract: bool,
    /// Interface type
    pub is_interface: bool,
    /// Default (bodied) interface method
    pub is_default: bool,
    /// Annotation type
    pub is_annotation: bool,
}

impl Modifiers {
    /// Public, nothing else
    pub fn public() -> Self {
        Self {
            is_public: true,
            ..Self::default()
        }
    }

    /// Modifiers of a public interface type
    pub fn interface() -> Self {
        Self {
            is_public: true,
            is_interface: true,
            is_abstract: true,
            ..Self::default()
        }
    }

    /// Decode from packed flag bits
    pub fn from_bits(bits: u16) -> Self {
        Self {
            is_public: bits & ACC_PUBLIC != 0,
            is_private: bits & ACC_PRIVATE != 0,
            is_protected: bits & ACC_PROTECTED != 0,
            is_static: bits & ACC_STATIC != 0,
            is_final: bits & ACC_FINAL != 0,
            is_abstract: bits & ACC_ABSTRACT != 0,
            is_interface: bits & ACC_INTERFACE != 0,
            is_default: bits & ACC_DEFAULT != 0,
            is_annotation: bits & ACC_ANNOTATION != 0,
        }
    }

    /// Pack into flag bits
    pub fn bits(&self) -> u16 {
        let mut bits = 0;
        for (set, flag) in [
            (self.is_public, ACC_PUBLIC),
            (self.is_private, ACC_PRIVATE),
            (self.is_protected, ACC_PROTECTED),
            (self.is_static, ACC_STATIC),
            (self.is_final, ACC_FINAL),
            (self.is_abstract, ACC_ABSTRACT),
            (self.is_interface, ACC_INTERFACE),
            (self.is_default, ACC_DEFAULT),
            (self.is_annotation, ACC_ANNOTATION),
        ] {
            if set {
                bits |= flag;
            }
        }
        bits
    }

    /// Set the flag named by a source keyword. Returns false for unknown keywords.
    pub fn apply_keyword(&mut self, keyword: &str) -> bool {
        match keyword {
            "public" => self.is_public = true,
            "private" => self.is_private = true,
            "protected" => self.is_protected = true,
            "static" => self.is_static = true,
            "final" => self.is_final = true,
            "abstract" => self.is_abstract = true,
            "interface" => self.is_interface = true,
            "default" => self.is_default = true,
            "annotation" => self.is_annotation = true,
            _ => return false,
        }
        true
    }
}

/// Kind of member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MemberKind {
    /// Field
    Field,
    /// Method
    Method,
    /// Constructor
    Constructor,
}

impl MemberKind {
    fn to_u8(self) -> u8 {
        match self {
            MemberKind::Field => 0,
            MemberKind::Method => 1,
            MemberKind::Constructor => 2,
        }
    }

    fn from_u8(tag: u8, offset: usize) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(MemberKind::Field),
            1 => Ok(MemberKind::Method),
            2 => Ok(MemberKind::Constructor),
            _ => Err(DecodeError::InvalidTag { tag, offset }),
        }
    }
}

/// A declared field, method or constructor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Member {
    /// Member kind
    pub kind: MemberKind,
    /// Member name (`<init>` for constructors)
    pub name: String,
    /// Modifier flags
    pub modifiers: Modifiers,
    /// Field type, or return type for methods (`void` for constructors)
    pub type_name: String,
    /// Parameter type names
    pub parameters: Vec<String>,
    /// Name of the type that declares this member
    pub declaring_type: String,
}

impl Member {
    /// A public field
    pub fn field(name: &str, type_name: &str) -> Self {
        Self {
            kind: MemberKind::Field,
            name: name.to_string(),
            modifiers: Modifiers::public(),
            type_name: type_name.to_string(),
            parameters: Vec::new(),
            declaring_type: String::new(),
        }
    }

    /// A public method
    pub fn method(name: &str, return_type: &str, parameters: &[&str]) -> Self {
        Self {
            kind: MemberKind::Method,
            name: name.to_string(),
            modifiers: Modifiers::public(),
            type_name: return_type.to_string(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            declaring_type: String::new(),
        }
    }

    /// A public constructor
    pub fn constructor(parameters: &[&str]) -> Self {
        Self {
            kind: MemberKind::Constructor,
            name: CONSTRUCTOR_NAME.to_string(),
            modifiers: Modifiers::public(),
            type_name: "void".to_string(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            declaring_type: String::new(),
        }
    }

    /// Replace the modifier flags
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Mark abstract
    pub fn abstract_(mut self) -> Self {
        self.modifiers.is_abstract = true;
        self
    }

    /// Mark static
    pub fn static_(mut self) -> Self {
        self.modifiers.is_static = true;
        self
    }

    /// Mark as a default interface method
    pub fn default_(mut self) -> Self {
        self.modifiers.is_default = true;
        self
    }

    /// Drop public visibility and mark private
    pub fn private(mut self) -> Self {
        self.modifiers.is_public = false;
        self.modifiers.is_private = true;
        self
    }

    /// Public visibility
    pub fn is_public(&self) -> bool {
        self.modifiers.is_public
    }

    /// Static member
    pub fn is_static(&self) -> bool {
        self.modifiers.is_static
    }

    /// Has an implementation in a class (neither abstract nor an interface default)
    pub fn is_concrete(&self) -> bool {
        !self.modifiers.is_abstract && !self.modifiers.is_default
    }

    /// Same name and parameter types
    pub fn same_parameters(&self, other: &Member) -> bool {
        self.name == other.name && self.parameters == other.parameters
    }

    /// Same name, parameter types and return type
    pub fn same_signature(&self, other: &Member) -> bool {
        self.same_parameters(other) && self.type_name == other.type_name
    }

    /// Same signature declared by the same type
    pub fn same_declaration(&self, other: &Member) -> bool {
        self.declaring_type == other.declaring_type && self.same_signature(other)
    }

    /// Printable signature, e.g. `resize(int,int)void`
    pub fn descriptor(&self) -> String {
        match self.kind {
            MemberKind::Field => format!("{}:{}", self.name, self.type_name),
            _ => format!(
                "{}({}){}",
                self.name,
                self.parameters.join(","),
                self.type_name
            ),
        }
    }
}

/// Encode member declarations into a member blob.
///
/// `declaring_type` is not encoded; it is supplied again when decoding.
pub fn encode_members(members: &[Member]) -> Result<Vec<u8>, EncodeError> {
    let mut writer = MetadataWriter::with_capacity(members.len() * 32 + 2);
    writer.emit_len_u16(members.len(), "member list")?;
    for member in members {
        writer.emit_u8(member.kind.to_u8());
        writer.emit_u16(member.modifiers.bits());
        writer.emit_str(&member.name)?;
        writer.emit_str(&member.type_name)?;
        writer.emit_len_u8(member.parameters.len(), "parameter list")?;
        for param in &member.parameters {
            writer.emit_str(param)?;
        }
    }
    Ok(writer.into_bytes())
}

/// Decode a member blob, stamping every member with `declaring_type`
pub fn decode_members(bytes: &[u8], declaring_type: &str) -> Result<Vec<Member>, DecodeError> {
    let mut reader = MetadataReader::new(bytes);
    let count = reader.read_u16()? as usize;
    let mut members = Vec::with_capacity(count);

    for _ in 0..count {
        let offset = reader.position();
        let kind = MemberKind::from_u8(reader.read_u8()?, offset)?;
        let modifiers = Modifiers::from_bits(reader.read_u16()?);
        let name = reader.read_str()?;
        let type_name = reader.read_str()?;
        let param_count = reader.read_u8()? as usize;
        let mut parameters = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            parameters.push(reader.read_str()?);
        }

        members.push(Member {
            kind,
            name,
            modifiers,
            type_name,
            parameters,
            declaring_type: declaring_type.to_string(),
        });
    }

    reader.expect_end()?;
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_bits() {
        let mods = Modifiers {
            is_public: true,
            is_static: true,
            is_abstract: true,
            ..Modifiers::default()
        };
        assert_eq!(mods.bits(), 0x0409);
        assert_eq!(Modifiers::from_bits(0x0409), mods);
        assert!(Modifiers::interface().is_interface);
    }

    #[test]
    fn test_apply_keyword() {
        let mut mods = Modifiers::default();
        assert!(mods.apply_keyword("public"));
        assert!(mods.apply_keyword("default"));
        assert!(!mods.apply_keyword("volatile"));
        assert!(mods.is_public && mods.is_default);
    }

    #[test]
    fn test_members_decode_with_declaring_type() {
        let blob = encode_members(&[
            Member::field("width", "int"),
            Member::method("resize", "void", &["int", "int"]).abstract_(),
            Member::constructor(&[]),
        ])
        .unwrap();

        let members = decode_members(&blob, "pkg.Widget").unwrap();
        assert_eq!(members.len(), 3);
        assert!(members.iter().all(|m| m.declaring_type == "pkg.Widget"));
        assert_eq!(members[1].descriptor(), "resize(int,int)void");
        assert!(members[1].modifiers.is_abstract);
        assert_eq!(members[2].kind, MemberKind::Constructor);
        assert_eq!(members[2].name, CONSTRUCTOR_NAME);
    }

    #[test]
    fn test_oversized_member_blob_is_rejected() {
        let params: Vec<String> = (0..256).map(|i| format!("p{i}")).collect();
        let params: Vec<&str> = params.iter().map(String::as_str).collect();
        assert!(matches!(
            encode_members(&[Member::method("wide", "void", &params)]),
            Err(EncodeError::TooLong { what: "parameter list", len: 256, .. })
        ));
        assert!(encode_members(&[Member::method("wide", "void", &params[..255])]).is_ok());

        let many = vec![Member::field("f", "int"); u16::MAX as usize + 1];
        assert!(matches!(
            encode_members(&many),
            Err(EncodeError::TooLong { what: "member list", .. })
        ));

        let long_name = "n".repeat(u16::MAX as usize + 1);
        assert!(matches!(
            encode_members(&[Member::field(&long_name, "int")]),
            Err(EncodeError::TooLong { what: "string", .. })
        ));
    }

    #[test]
    fn test_bad_member_kind() {
        // count = 1, kind = 9
        let blob = [0x01, 0x00, 0x09];
        assert_eq!(
            decode_members(&blob, "pkg.Widget"),
            Err(DecodeError::InvalidTag { tag: 9, offset: 2 })
        );
    }

    #[test]
    fn test_signature_comparisons() {
        let a = Member::method("get", "Object", &[]);
        let b = Member::method("get", "String", &[]);
        assert!(a.same_parameters(&b));
        assert!(!a.same_signature(&b));
        assert!(a.is_concrete());
        assert!(!a.clone().default_().is_concrete());
    }
}
