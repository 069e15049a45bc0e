use std::slice;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{nt_string_byte_size, Result};

/// The property type strings recognized by the codec. Parsed with
/// `str::parse` and written back with `to_string`, both of which use the
/// full on-disk `*Property` spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub enum PropertyType {
  #[strum(serialize = "StructProperty")]
  Struct,
  #[strum(serialize = "ArrayProperty")]
  Array,
  #[strum(serialize = "MapProperty")]
  Map,
  #[strum(serialize = "SetProperty")]
  Set,
  #[strum(serialize = "BoolProperty")]
  Bool,
  #[strum(serialize = "IntProperty")]
  Int,
  #[strum(serialize = "UInt32Property")]
  UInt32,
  #[strum(serialize = "FloatProperty")]
  Float,
  #[strum(serialize = "DoubleProperty")]
  Double,
  #[strum(serialize = "Int64Property")]
  Int64,
  #[strum(serialize = "UInt64Property")]
  UInt64,
  #[strum(serialize = "Int16Property")]
  Int16,
  #[strum(serialize = "UInt16Property")]
  UInt16,
  #[strum(serialize = "ByteProperty")]
  Byte,
  #[strum(serialize = "StrProperty")]
  Str,
  #[strum(serialize = "NameProperty")]
  Name,
  #[strum(serialize = "ObjectProperty")]
  Object,
  #[strum(serialize = "SoftObjectProperty")]
  SoftObject,
}

/// An ordered collection of named property entries. A name appearing more
/// than once is an indexed property; every entry is kept in on-disk order,
/// so this is a multimap backed by an insertion-ordered list rather than a
/// unique-key map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertySet {
  entries: Vec<(String, PropertyEntry)>,
}

impl PropertySet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, name: impl Into<String>, entry: PropertyEntry) {
    self.entries.push((name.into(), entry));
  }

  /// Returns the first entry stored under `name`, if any.
  pub fn get(&self, name: &str) -> Option<&PropertyEntry> {
    self.entries.iter().find(|(n, _)| n == name).map(|(_, e)| e)
  }

  pub fn get_mut(&mut self, name: &str) -> Option<&mut PropertyEntry> {
    self.entries.iter_mut().find(|(n, _)| n == name).map(|(_, e)| e)
  }

  /// Returns every entry stored under `name`, in on-disk order.
  pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PropertyEntry> {
    self.entries.iter().filter(move |(n, _)| n == name).map(|(_, e)| e)
  }

  pub fn iter(&self) -> slice::Iter<'_, (String, PropertyEntry)> {
    self.entries.iter()
  }

  pub fn iter_mut(&mut self) -> slice::IterMut<'_, (String, PropertyEntry)> {
    self.entries.iter_mut()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Updates every declared size and length field to match the bytes the
  /// serializer will emit. Runs automatically before a save; the write path
  /// never trusts stale size fields.
  pub fn recalculate_sizes(&mut self) -> Result<()> {
    for (_, entry) in self.iter_mut() {
      entry.recalculate_sizes()?;
    }
    Ok(())
  }
}

/// A single tagged property. The variant selects the on-disk shape.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyEntry {
  Struct(StructProperty),
  Array(ArrayProperty),
  Map(MapProperty),
  Set(SetProperty),
  Bool(BoolProperty),
  Simple(SimpleProperty),
}

impl PropertyEntry {
  /// The on-disk type string for this entry.
  pub fn type_name(&self) -> String {
    match self {
      PropertyEntry::Struct(_) => "StructProperty".to_string(),
      PropertyEntry::Array(_) => "ArrayProperty".to_string(),
      PropertyEntry::Map(_) => "MapProperty".to_string(),
      PropertyEntry::Set(_) => "SetProperty".to_string(),
      PropertyEntry::Bool(_) => "BoolProperty".to_string(),
      PropertyEntry::Simple(p) => p.prop_type.to_string(),
    }
  }

  pub fn recalculate_sizes(&mut self) -> Result<()> {
    match self {
      PropertyEntry::Struct(p) => {
        p.data.recalculate_sizes()?;
        p.size = crate::struct_inner_bytes(p)?.len() as i32;
      }
      PropertyEntry::Array(p) => {
        if let ArrayElements::Structs(sets) = &mut p.elements {
          for set in sets {
            set.recalculate_sizes()?;
          }
        }
        if let Some(count) = p.elements.count() {
          p.length = count as i32;
        }
        let computed = 4 + crate::array_element_bytes(p)?.len() as i32;
        p.size = if p.size > 0 { p.size.max(computed) } else { computed };
      }
      PropertyEntry::Map(p) => {
        p.size = p.raw.len() as i32;
      }
      PropertyEntry::Set(p) => {
        p.size = match &p.content {
          SetContent::Names(names) => crate::set_body_bytes(names)?.len() as i32,
          SetContent::Raw(raw) => raw.len() as i32,
        };
      }
      // The value lives in the tag byte slot; size stays 0.
      PropertyEntry::Bool(_) => {}
      PropertyEntry::Simple(p) => {
        p.size = p.value_byte_size();
      }
    }
    Ok(())
  }
}

/// A `StructProperty`: a nested property set, or a raw byte payload when the
/// body holds no tagged properties (Vector, Rotator, Quat, LinearColor, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructProperty {
  pub struct_name: String,
  pub package: String,
  pub index: i32,
  pub size: i32,
  pub tag: u8,
  pub data: PropertySet,
  pub raw: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayProperty {
  pub child_type: String,
  pub struct_name: Option<String>,
  pub package: Option<String>,
  pub index: i32,
  pub size: i32,
  pub tag: u8,
  /// Whether 4-byte zero separators sit between struct elements. Latched
  /// from the first gap on parse and reused on every write.
  pub has_separator: bool,
  pub length: i32,
  pub elements: ArrayElements,
}

/// Array element payload, shaped by the array's child type.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayElements {
  Structs(Vec<PropertySet>),
  Int16(Vec<i16>),
  UInt16(Vec<u16>),
  Int(Vec<i32>),
  UInt32(Vec<u32>),
  Int64(Vec<i64>),
  UInt64(Vec<u64>),
  Float(Vec<f32>),
  Double(Vec<f64>),
  Byte(Vec<u8>),
  Bool(Vec<u8>),
  Strings(Vec<String>),
  Objects(Vec<String>),
  SoftObjects(Vec<SoftObjectPath>),
  /// Unparsed payload, preserved byte-exact. The array's `length` field is
  /// kept from parse because it cannot be derived from the byte count.
  Raw(Vec<u8>),
}

impl ArrayElements {
  /// Element count, or `None` for raw payloads whose element boundaries are
  /// unknown.
  pub fn count(&self) -> Option<usize> {
    match self {
      ArrayElements::Structs(v) => Some(v.len()),
      ArrayElements::Int16(v) => Some(v.len()),
      ArrayElements::UInt16(v) => Some(v.len()),
      ArrayElements::Int(v) => Some(v.len()),
      ArrayElements::UInt32(v) => Some(v.len()),
      ArrayElements::Int64(v) => Some(v.len()),
      ArrayElements::UInt64(v) => Some(v.len()),
      ArrayElements::Float(v) => Some(v.len()),
      ArrayElements::Double(v) => Some(v.len()),
      ArrayElements::Byte(v) => Some(v.len()),
      ArrayElements::Bool(v) => Some(v.len()),
      ArrayElements::Strings(v) => Some(v.len()),
      ArrayElements::Objects(v) => Some(v.len()),
      ArrayElements::SoftObjects(v) => Some(v.len()),
      ArrayElements::Raw(_) => None,
    }
  }

  /// The empty element container matching `child_type`, for zero-length
  /// arrays and document reconstruction.
  pub fn empty_for(child_type: &str) -> ArrayElements {
    match child_type.parse::<PropertyType>() {
      Ok(PropertyType::Struct) => ArrayElements::Structs(Vec::new()),
      Ok(PropertyType::Int16) => ArrayElements::Int16(Vec::new()),
      Ok(PropertyType::UInt16) => ArrayElements::UInt16(Vec::new()),
      Ok(PropertyType::Int) => ArrayElements::Int(Vec::new()),
      Ok(PropertyType::UInt32) => ArrayElements::UInt32(Vec::new()),
      Ok(PropertyType::Int64) => ArrayElements::Int64(Vec::new()),
      Ok(PropertyType::UInt64) => ArrayElements::UInt64(Vec::new()),
      Ok(PropertyType::Float) => ArrayElements::Float(Vec::new()),
      Ok(PropertyType::Double) => ArrayElements::Double(Vec::new()),
      Ok(PropertyType::Byte) => ArrayElements::Byte(Vec::new()),
      Ok(PropertyType::Bool) => ArrayElements::Bool(Vec::new()),
      Ok(PropertyType::Str) | Ok(PropertyType::Name) => ArrayElements::Strings(Vec::new()),
      Ok(PropertyType::Object) => ArrayElements::Objects(Vec::new()),
      Ok(PropertyType::SoftObject) => ArrayElements::SoftObjects(Vec::new()),
      _ => ArrayElements::Raw(Vec::new()),
    }
  }
}

/// A `MapProperty`. The internal pair layout is not decoded; the payload is
/// preserved verbatim so the file round-trips byte-exact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapProperty {
  pub key_type: String,
  pub val_type: String,
  pub index: i32,
  pub size: i32,
  pub tag: u8,
  pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetProperty {
  pub elem_type: String,
  pub index: i32,
  pub size: i32,
  pub tag: u8,
  pub content: SetContent,
}

/// A set of names is editable; anything else is an opaque byte range.
#[derive(Debug, Clone, PartialEq)]
pub enum SetContent {
  Names(Vec<String>),
  Raw(Vec<u8>),
}

/// A `BoolProperty` carries its value in the tag byte slot and always has a
/// declared size of 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolProperty {
  pub index: i32,
  pub value: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleProperty {
  pub prop_type: PropertyType,
  pub index: i32,
  pub size: i32,
  pub tag: u8,
  /// Extra array index present when the tag byte is non-zero.
  pub extra: Option<i32>,
  pub value: PropertyValue,
}

impl SimpleProperty {
  /// The number of bytes the value occupies on disk. An empty string keeps
  /// its recorded size, which distinguishes "no body" (0) from an empty
  /// NT-string (4).
  pub fn value_byte_size(&self) -> i32 {
    match &self.value {
      PropertyValue::Int16(_) | PropertyValue::UInt16(_) => 2,
      PropertyValue::Int(_) | PropertyValue::UInt32(_) | PropertyValue::Float(_) => 4,
      PropertyValue::Int64(_) | PropertyValue::UInt64(_) | PropertyValue::Double(_) => 8,
      PropertyValue::String(s) => {
        if s.is_empty() {
          self.size
        } else {
          nt_string_byte_size(s)
        }
      }
      PropertyValue::Byte(_) => 1,
      PropertyValue::Bytes(b) => b.len() as i32,
      PropertyValue::Object(o) => o.byte_size(),
      PropertyValue::SoftObject(p) => {
        nt_string_byte_size(&p.package)
          + nt_string_byte_size(&p.asset)
          + nt_string_byte_size(&p.sub_path)
      }
    }
  }
}

/// The value of a simple (non-container) property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
  Int16(i16),
  UInt16(u16),
  Int(i32),
  UInt32(u32),
  Int64(i64),
  UInt64(u64),
  Float(f32),
  Double(f64),
  String(String),
  Byte(u8),
  Bytes(Vec<u8>),
  Object(ObjectRef),
  SoftObject(SoftObjectPath),
}

/// An `ObjectProperty` value. The game uses two null-reference encodings of
/// different widths, which must round-trip to their original form.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectRef {
  /// 4 bytes `FF FF FF FF`.
  Null,
  /// 8 bytes `00 00 00 00 FF FF FF FF`.
  IndexedNull,
  /// A plain 4-byte object index.
  Index(i32),
  /// `i32 1` followed by an NT-string blueprint path spanning the value.
  Path(String),
  /// Anything whose shape could not be classified, preserved verbatim.
  Opaque(Vec<u8>),
}

impl ObjectRef {
  /// Classifies a raw `ObjectProperty` value by its declared size and shape.
  pub fn classify(raw: Vec<u8>) -> ObjectRef {
    if raw == [0xff, 0xff, 0xff, 0xff] {
      return ObjectRef::Null;
    }
    if raw == [0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff] {
      return ObjectRef::IndexedNull;
    }
    if raw.len() == 4 {
      return ObjectRef::Index(LittleEndian::read_i32(&raw));
    }
    if raw.len() >= 8 {
      let flag = LittleEndian::read_i32(&raw[0..4]);
      let slen = LittleEndian::read_i32(&raw[4..8]);
      // Only an exact-fit NT-string re-serializes byte-identically; looser
      // shapes stay opaque.
      if flag == 1 && slen > 0 && 8 + slen as usize == raw.len() && raw[raw.len() - 1] == 0 {
        if let Ok(path) = std::str::from_utf8(&raw[8..raw.len() - 1]) {
          return ObjectRef::Path(path.to_string());
        }
      }
    }
    ObjectRef::Opaque(raw)
  }

  /// The on-disk width of this reference.
  pub fn byte_size(&self) -> i32 {
    match self {
      ObjectRef::Null => 4,
      ObjectRef::IndexedNull => 8,
      ObjectRef::Index(_) => 4,
      ObjectRef::Path(p) => 4 + 4 + p.len() as i32 + 1,
      ObjectRef::Opaque(b) => b.len() as i32,
    }
  }
}

/// UE5 `FSoftObjectPath`: three NT-strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftObjectPath {
  pub package: String,
  pub asset: String,
  #[serde(default)]
  pub sub_path: String,
}
