//! Binary metadata formats
//!
//! Hosts hand the engine uninterpreted byte blobs; this module owns all of
//! their parsing. Three formats exist:
//!
//! - **Member blob**: the fields, methods and constructors a type declares
//! - **Annotation blob**: the annotations a type declares
//! - **Type image**: everything needed to define a type (name, supertypes,
//!   enclosing type, requested native libraries and the two blobs above),
//!   wrapped in a magic number, version and CRC-32 checksum
//!
//! All integers are little-endian and strings are `u16` length-prefixed UTF-8.

mod annotation;
mod codec;
mod image;
mod member;

pub use annotation::{decode_annotations, encode_annotations, Annotation, AnnotationValue};
pub use codec::{DecodeError, EncodeError, MetadataReader, MetadataWriter};
pub use image::{TypeImage, TypeImageBuilder, IMAGE_MAGIC, IMAGE_VERSION};
pub use member::{decode_members, encode_members, Member, MemberKind, Modifiers, CONSTRUCTOR_NAME};
