//! Annotation declarations and the annotation blob format

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::codec::{DecodeError, EncodeError, MetadataReader, MetadataWriter};

const FLAG_INHERITED: u8 = 0x01;

const TAG_BOOL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_STR: u8 = 2;
const TAG_LIST: u8 = 3;
const TAG_TYPE: u8 = 4;

const MAX_VALUE_DEPTH: usize = 16;

/// Annotation element value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    /// Boolean constant
    Bool(bool),
    /// Integer constant
    Int(i64),
    /// String constant
    Str(String),
    /// Array of values
    List(Vec<AnnotationValue>),
    /// Type literal (by name)
    Type(String),
}

/// A declared annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    /// Annotation kind (the annotation type's name)
    pub kind: String,
    /// Whether the annotation kind is declared inheritable
    pub inherited: bool,
    /// Element values by name
    pub elements: BTreeMap<String, AnnotationValue>,
}

impl Annotation {
    /// An annotation with no elements
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            inherited: false,
            elements: BTreeMap::new(),
        }
    }

    /// Mark the kind as inheritable
    pub fn inherited(mut self) -> Self {
        self.inherited = true;
        self
    }

    /// Add an element value
    pub fn with(mut self, name: &str, value: AnnotationValue) -> Self {
        self.elements.insert(name.to_string(), value);
        self
    }

    /// Look up an element value
    pub fn get(&self, name: &str) -> Option<&AnnotationValue> {
        self.elements.get(name)
    }
}

/// Encode annotations into an annotation blob
pub fn encode_annotations(annotations: &[Annotation]) -> Result<Vec<u8>, EncodeError> {
    let mut writer = MetadataWriter::new();
    writer.emit_len_u16(annotations.len(), "annotation list")?;
    for annotation in annotations {
        writer.emit_str(&annotation.kind)?;
        writer.emit_u8(if annotation.inherited { FLAG_INHERITED } else { 0 });
        writer.emit_len_u16(annotation.elements.len(), "annotation elements")?;
        for (name, value) in &annotation.elements {
            writer.emit_str(name)?;
            encode_value(&mut writer, value)?;
        }
    }
    Ok(writer.into_bytes())
}

fn encode_value(writer: &mut MetadataWriter, value: &AnnotationValue) -> Result<(), EncodeError> {
    match value {
        AnnotationValue::Bool(b) => {
            writer.emit_u8(TAG_BOOL);
            writer.emit_u8(*b as u8);
        }
        AnnotationValue::Int(i) => {
            writer.emit_u8(TAG_INT);
            writer.emit_i64(*i);
        }
        AnnotationValue::Str(s) => {
            writer.emit_u8(TAG_STR);
            writer.emit_str(s)?;
        }
        AnnotationValue::List(items) => {
            writer.emit_u8(TAG_LIST);
            writer.emit_len_u16(items.len(), "annotation list value")?;
            for item in items {
                encode_value(writer, item)?;
            }
        }
        AnnotationValue::Type(name) => {
            writer.emit_u8(TAG_TYPE);
            writer.emit_str(name)?;
        }
    }
    Ok(())
}

/// Decode an annotation blob, preserving declaration order
pub fn decode_annotations(bytes: &[u8]) -> Result<Vec<Annotation>, DecodeError> {
    let mut reader = MetadataReader::new(bytes);
    let count = reader.read_u16()? as usize;
    let mut annotations = Vec::with_capacity(count);

    for _ in 0..count {
        let kind = reader.read_str()?;
        let flags = reader.read_u8()?;
        let element_count = reader.read_u16()? as usize;
        let mut elements = BTreeMap::new();
        for _ in 0..element_count {
            let name = reader.read_str()?;
            let value = decode_value(&mut reader, 0)?;
            elements.insert(name, value);
        }
        annotations.push(Annotation {
            kind,
            inherited: flags & FLAG_INHERITED != 0,
            elements,
        });
    }

    reader.expect_end()?;
    Ok(annotations)
}

fn decode_value(reader: &mut MetadataReader<'_>, depth: usize) -> Result<AnnotationValue, DecodeError> {
    let offset = reader.position();
    if depth > MAX_VALUE_DEPTH {
        return Err(DecodeError::NestingTooDeep(offset));
    }

    match reader.read_u8()? {
        TAG_BOOL => Ok(AnnotationValue::Bool(reader.read_u8()? != 0)),
        TAG_INT => Ok(AnnotationValue::Int(reader.read_i64()?)),
        TAG_STR => Ok(AnnotationValue::Str(reader.read_str()?)),
        TAG_LIST => {
            let len = reader.read_u16()? as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(decode_value(reader, depth + 1)?);
            }
            Ok(AnnotationValue::List(items))
        }
        TAG_TYPE => Ok(AnnotationValue::Type(reader.read_str()?)),
        tag => Err(DecodeError::InvalidTag { tag, offset }),
    }
}
