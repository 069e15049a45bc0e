//! Bidirectional codec for *Ark: Survival Ascended* `PlayerLocalData.arkprofile`
//! files, a UE5 tagged-property serialization. Parses a file into a property
//! tree, maps the tree to and from a JSON-shaped document, and re-serializes
//! it byte-exact for anything it does not understand.

use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use std::result;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, warn};

pub mod document;
pub mod errors;
pub mod profile;
pub mod property;
pub mod verify;

use crate::errors::ProfileError;
use crate::property::*;
pub use crate::profile::PlayerProfile;

pub type Result<T> = result::Result<T, ProfileError>;

/// The only supported envelope version. Anything else is rejected rather
/// than guessed at.
pub const SUPPORTED_VERSION: i32 = 1;

/// NT-string encoding of `"None"`, the property-set terminator.
pub(crate) const NONE_BYTES: &[u8] = b"\x05\x00\x00\x00None\x00";

/// Reads the file at `path` into a [`PlayerProfile`].
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<PlayerProfile> {
  PlayerProfile::load(path)
}

/// Recalculates sizes and writes `profile` to the file at `path`.
pub fn write_file<P: AsRef<Path>>(profile: &mut PlayerProfile, path: P) -> Result<()> {
  profile.save(path)
}

/// The number of bytes an NT-string occupies on disk.
pub fn nt_string_byte_size(s: &str) -> i32 {
  if s.is_empty() {
    4
  } else {
    4 + s.len() as i32 + 1
  }
}

/// ASCII decode with U+FFFD replacement for out-of-range bytes.
pub(crate) fn decode_ascii_lossy(bytes: &[u8]) -> String {
  bytes
    .iter()
    .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
    .collect()
}

/// Extends `byteorder`'s `ReadBytesExt` and `io::Seek` with the primitives
/// and the recursive property parser the profile format needs
pub trait ReadProfileBytes: ReadBytesExt + Seek {
  /// Bytes left between the current position and the end of the stream
  fn remaining_bytes(&mut self) -> Result<u64> {
    let pos = self.stream_position()?;
    let end = self.seek(SeekFrom::End(0))?;
    self.seek(SeekFrom::Start(pos))?;
    Ok(end.saturating_sub(pos))
  }

  /// Reads exactly `n` bytes, refusing up front when the stream is shorter
  fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
    let remaining = self.remaining_bytes()?;
    if n as u64 > remaining {
      return Err(ProfileError::ByteOverflow(n, remaining));
    }
    let mut buf = vec![0u8; n];
    self.read_exact(&mut buf)?;
    Ok(buf)
  }

  fn read_guid(&mut self) -> Result<[u8; 16]> {
    let mut guid = [0u8; 16];
    self.read_exact(&mut guid)?;
    Ok(guid)
  }

  /// Reads a length-prefixed null-terminated string. A zero length prefix
  /// is the empty string; otherwise the prefix counts the body plus its
  /// terminator. Non-ASCII body bytes are replaced rather than rejected.
  fn read_nt_string<E: ByteOrder>(&mut self) -> Result<String> {
    let len = self.read_u32::<E>()?;
    if len == 0 {
      return Ok(String::new());
    }
    let remaining = self.remaining_bytes()?;
    if len as u64 > remaining {
      return Err(ProfileError::StringOverflow(len, remaining));
    }
    let mut body = vec![0u8; len as usize - 1];
    self.read_exact(&mut body)?;
    self.read_u8()?; // null terminator
    Ok(decode_ascii_lossy(&body))
  }

  /// Parses a property set from the current position until a `"None"`
  /// terminator, or until `end_offset` when the set is bounded. Recoverable
  /// failures truncate the set and leave the stream at `end_offset`; a
  /// partial property is never kept.
  fn read_property_set<E: ByteOrder>(&mut self, end_offset: Option<u64>) -> Result<PropertySet> {
    let mut set = PropertySet::new();
    loop {
      if let Some(end) = end_offset {
        if self.stream_position()? >= end {
          break;
        }
      }
      let name = match self.read_nt_string::<E>() {
        Ok(name) => name,
        Err(_) => {
          self.recover_to(end_offset)?;
          break;
        }
      };
      if name == "None" {
        break;
      }
      let type_name = match self.read_nt_string::<E>() {
        Ok(type_name) => type_name,
        Err(_) => {
          self.recover_to(end_offset)?;
          break;
        }
      };
      debug!("Reading property '{name}' ({type_name})");
      match self.read_property_entry::<E>(&type_name) {
        Ok(Some(entry)) => set.push(name, entry),
        // Unknown type: body consumed, nothing kept
        Ok(None) => {}
        Err(e) => {
          warn!("Dropping property '{name}' ({type_name}): {e}");
          self.recover_to(end_offset)?;
          break;
        }
      }
    }
    Ok(set)
  }

  /// Seeks to the enclosing boundary after a recoverable parse failure.
  fn recover_to(&mut self, end_offset: Option<u64>) -> Result<()> {
    if let Some(end) = end_offset {
      self.seek(SeekFrom::Start(end))?;
    }
    Ok(())
  }

  /// Reads one property entry, dispatching on the type string. Returns
  /// `None` for an unknown type whose simple-shaped body could be consumed.
  fn read_property_entry<E: ByteOrder>(&mut self, type_name: &str) -> Result<Option<PropertyEntry>> {
    let prop_type = match type_name.parse::<PropertyType>() {
      Ok(prop_type) => prop_type,
      Err(_) => {
        // An unrecognized type can still be skipped when its sub-header has
        // the simple shape and carries a usable size.
        warn!("Skipping property of unknown type '{type_name}'");
        let _index = self.read_i32::<E>()?;
        let size = self.read_i32::<E>()?;
        let tag = self.read_u8()?;
        if tag != 0 {
          let _extra = self.read_i32::<E>()?;
        }
        if size < 0 {
          return Err(ProfileError::NegativeSize(size));
        }
        self.read_bytes(size as usize)?;
        return Ok(None);
      }
    };
    let entry = match prop_type {
      PropertyType::Struct => PropertyEntry::Struct(self.read_struct_property::<E>()?),
      PropertyType::Array => PropertyEntry::Array(self.read_array_property::<E>()?),
      PropertyType::Map => PropertyEntry::Map(self.read_map_property::<E>()?),
      PropertyType::Set => PropertyEntry::Set(self.read_set_property::<E>()?),
      PropertyType::Bool => PropertyEntry::Bool(self.read_bool_property::<E>()?),
      _ => PropertyEntry::Simple(self.read_simple_property::<E>(prop_type)?),
    };
    Ok(Some(entry))
  }

  /// Reads a struct property: sub-header, then a bounded nested property
  /// set. A body that yields no properties is captured verbatim instead
  /// (Vector, Rotator, Quat and friends store raw floats).
  fn read_struct_property<E: ByteOrder>(&mut self) -> Result<StructProperty> {
    let flag = self.read_i32::<E>()?;
    if flag != 1 {
      debug!("Struct sub-header flag is {flag}, expected 1");
    }
    let struct_name = self.read_nt_string::<E>()?;
    let flag = self.read_i32::<E>()?;
    if flag != 1 {
      debug!("Struct package flag is {flag}, expected 1");
    }
    let package = self.read_nt_string::<E>()?;
    let index = self.read_i32::<E>()?;
    let size = self.read_i32::<E>()?;
    let tag = self.read_u8()?;
    if size < 0 {
      return Err(ProfileError::NegativeSize(size));
    }

    let body_start = self.stream_position()?;
    let body_end = body_start + size as u64;
    let data = self.read_property_set::<E>(Some(body_end))?;

    let mut raw = None;
    if data.is_empty() && size > 0 {
      self.seek(SeekFrom::Start(body_start))?;
      raw = Some(self.read_bytes(size as usize)?);
    }

    // Land exactly on the declared end whatever the body contained
    self.seek(SeekFrom::Start(body_end))?;

    Ok(StructProperty {
      struct_name,
      package,
      index,
      size,
      tag,
      data,
      raw,
    })
  }

  /// Reads an array property and its element payload.
  fn read_array_property<E: ByteOrder>(&mut self) -> Result<ArrayProperty> {
    let _flag = self.read_i32::<E>()?;
    let child_type = self.read_nt_string::<E>()?;
    let (struct_name, package) = if child_type == "StructProperty" {
      let _flag = self.read_i32::<E>()?;
      let struct_name = self.read_nt_string::<E>()?;
      let _flag = self.read_i32::<E>()?;
      let package = self.read_nt_string::<E>()?;
      (Some(struct_name), Some(package))
    } else {
      (None, None)
    };
    let index = self.read_i32::<E>()?;
    let size = self.read_i32::<E>()?;
    let tag = self.read_u8()?;
    let length = self.read_i32::<E>()?;
    if size < 4 {
      return Err(ProfileError::PropertyBoundary(format!(
        "array size {size} cannot hold its length field"
      )));
    }
    if length < 0 {
      return Err(ProfileError::NegativeSize(length));
    }

    let payload_start = self.stream_position()?;
    let payload_end = payload_start + (size - 4) as u64;
    let (elements, has_separator) =
      self.read_array_elements::<E>(&child_type, payload_end, length)?;

    // Tolerate under- or over-read of individual elements
    self.seek(SeekFrom::Start(payload_end))?;

    Ok(ArrayProperty {
      child_type,
      struct_name,
      package,
      index,
      size,
      tag,
      has_separator,
      length,
      elements,
    })
  }

  /// Reads `length` array elements of `child_type`, bounded by
  /// `payload_end`. For struct elements the 4-byte zero separator is probed
  /// at the first gap and the decision applied to every later gap.
  fn read_array_elements<E: ByteOrder>(
    &mut self,
    child_type: &str,
    payload_end: u64,
    length: i32,
  ) -> Result<(ArrayElements, bool)> {
    if length == 0 {
      return Ok((ArrayElements::empty_for(child_type), false));
    }

    let parsed = match child_type.parse::<PropertyType>() {
      Ok(t) => t,
      Err(_) => {
        let remaining = payload_end.saturating_sub(self.stream_position()?);
        return Ok((ArrayElements::Raw(self.read_bytes(remaining as usize)?), false));
      }
    };

    macro_rules! fixed {
      ($variant:ident, $read:ident) => {{
        let mut values = Vec::with_capacity(length as usize);
        for _ in 0..length {
          values.push(self.$read::<E>()?);
        }
        (ArrayElements::$variant(values), false)
      }};
    }

    let result = match parsed {
      PropertyType::Struct => {
        let mut elements = Vec::new();
        let mut has_separator: Option<bool> = None;
        for i in 0..length {
          if i > 0 {
            let gap_pos = self.stream_position()?;
            let probe = self.read_i32::<E>()?;
            match has_separator {
              None => {
                if probe == 0 {
                  has_separator = Some(true);
                } else {
                  has_separator = Some(false);
                  self.seek(SeekFrom::Start(gap_pos))?;
                }
              }
              // Once latched, every gap is a separator
              Some(true) => {}
              Some(false) => {
                self.seek(SeekFrom::Start(gap_pos))?;
              }
            }
          }
          match self.read_property_set::<E>(Some(payload_end)) {
            Ok(set) => elements.push(set),
            Err(_) => {
              self.seek(SeekFrom::Start(payload_end))?;
              break;
            }
          }
        }
        return Ok((ArrayElements::Structs(elements), has_separator.unwrap_or(false)));
      }
      PropertyType::Int16 => fixed!(Int16, read_i16),
      PropertyType::UInt16 => fixed!(UInt16, read_u16),
      PropertyType::Int => fixed!(Int, read_i32),
      PropertyType::UInt32 => fixed!(UInt32, read_u32),
      PropertyType::Int64 => fixed!(Int64, read_i64),
      PropertyType::UInt64 => fixed!(UInt64, read_u64),
      PropertyType::Float => fixed!(Float, read_f32),
      PropertyType::Double => fixed!(Double, read_f64),
      PropertyType::Byte => {
        let mut values = Vec::with_capacity(length as usize);
        for _ in 0..length {
          values.push(self.read_u8()?);
        }
        (ArrayElements::Byte(values), false)
      }
      PropertyType::Bool => {
        let mut values = Vec::with_capacity(length as usize);
        for _ in 0..length {
          values.push(self.read_u8()?);
        }
        (ArrayElements::Bool(values), false)
      }
      PropertyType::Str | PropertyType::Name => {
        let mut values = Vec::with_capacity(length as usize);
        for _ in 0..length {
          values.push(self.read_nt_string::<E>()?);
        }
        (ArrayElements::Strings(values), false)
      }
      PropertyType::Object => {
        let mut values = Vec::with_capacity(length as usize);
        for _ in 0..length {
          let _prefix = self.read_i32::<E>()?; // always 1
          values.push(self.read_nt_string::<E>()?);
        }
        (ArrayElements::Objects(values), false)
      }
      PropertyType::SoftObject => {
        let mut values = Vec::with_capacity(length as usize);
        for _ in 0..length {
          match self.read_soft_object_path::<E>() {
            Ok(path) => values.push(path),
            Err(_) => {
              // Partially understood payload: keep what parsed, skip the rest
              self.seek(SeekFrom::Start(payload_end))?;
              break;
            }
          }
        }
        (ArrayElements::SoftObjects(values), false)
      }
      _ => {
        let remaining = payload_end.saturating_sub(self.stream_position()?);
        (ArrayElements::Raw(self.read_bytes(remaining as usize)?), false)
      }
    };
    Ok(result)
  }

  /// Reads a map property. The pair payload stays raw.
  fn read_map_property<E: ByteOrder>(&mut self) -> Result<MapProperty> {
    let _flag = self.read_i32::<E>()?;
    let key_type = self.read_nt_string::<E>()?;
    let _flag = self.read_i32::<E>()?;
    let val_type = self.read_nt_string::<E>()?;
    let index = self.read_i32::<E>()?;
    let size = self.read_i32::<E>()?;
    let tag = self.read_u8()?;
    if size < 0 {
      return Err(ProfileError::NegativeSize(size));
    }
    let raw = self.read_bytes(size as usize)?;
    Ok(MapProperty {
      key_type,
      val_type,
      index,
      size,
      tag,
      raw,
    })
  }

  /// Reads a set property. A set of `NameProperty` elements is decoded when
  /// its body parses cleanly and spans exactly the declared size; everything
  /// else stays raw.
  fn read_set_property<E: ByteOrder>(&mut self) -> Result<SetProperty> {
    let _flag = self.read_i32::<E>()?;
    let elem_type = self.read_nt_string::<E>()?;
    let index = self.read_i32::<E>()?;
    let size = self.read_i32::<E>()?;
    let tag = self.read_u8()?;
    if size < 0 {
      return Err(ProfileError::NegativeSize(size));
    }

    let body_start = self.stream_position()?;
    let content = if elem_type == "NameProperty" {
      match self.try_read_name_list::<E>(size) {
        Ok(names) if self.stream_position()? == body_start + size as u64 => {
          SetContent::Names(names)
        }
        _ => {
          self.seek(SeekFrom::Start(body_start))?;
          SetContent::Raw(self.read_bytes(size as usize)?)
        }
      }
    } else {
      SetContent::Raw(self.read_bytes(size as usize)?)
    };

    Ok(SetProperty {
      elem_type,
      index,
      size,
      tag,
      content,
    })
  }

  /// The name-list set body: `i32 0`, `i32 count`, `count` NT-strings.
  fn try_read_name_list<E: ByteOrder>(&mut self, size: i32) -> Result<Vec<String>> {
    let zero = self.read_i32::<E>()?;
    let count = self.read_i32::<E>()?;
    if zero != 0 || count < 0 {
      return Err(ProfileError::ValueDecode(format!(
        "set header {zero}/{count} is not a name list"
      )));
    }
    // Each name needs at least its length prefix
    if 8 + count as i64 * 4 > size as i64 {
      return Err(ProfileError::ValueDecode(format!(
        "{count} names cannot fit in {size} bytes"
      )));
    }
    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
      names.push(self.read_nt_string::<E>()?);
    }
    Ok(names)
  }

  /// Reads a bool property. The value sits in the tag byte slot.
  fn read_bool_property<E: ByteOrder>(&mut self) -> Result<BoolProperty> {
    let index = self.read_i32::<E>()?;
    let size = self.read_i32::<E>()?;
    if size != 0 {
      debug!("BoolProperty declared size is {size}, expected 0");
    }
    let value = self.read_u8()?;
    Ok(BoolProperty { index, value })
  }

  /// Reads a simple property: index, size, tag (plus the extra index when
  /// the tag is non-zero), then the value.
  fn read_simple_property<E: ByteOrder>(&mut self, prop_type: PropertyType) -> Result<SimpleProperty> {
    let index = self.read_i32::<E>()?;
    let size = self.read_i32::<E>()?;
    let tag = self.read_u8()?;
    let extra = if tag != 0 {
      Some(self.read_i32::<E>()?)
    } else {
      None
    };
    if size < 0 {
      return Err(ProfileError::NegativeSize(size));
    }
    let value = self.read_simple_value::<E>(prop_type, size)?;
    Ok(SimpleProperty {
      prop_type,
      index,
      size,
      tag,
      extra,
      value,
    })
  }

  fn read_simple_value<E: ByteOrder>(&mut self, prop_type: PropertyType, size: i32) -> Result<PropertyValue> {
    let value = match prop_type {
      PropertyType::Int16 => PropertyValue::Int16(self.read_i16::<E>()?),
      PropertyType::UInt16 => PropertyValue::UInt16(self.read_u16::<E>()?),
      PropertyType::Int => PropertyValue::Int(self.read_i32::<E>()?),
      PropertyType::UInt32 => PropertyValue::UInt32(self.read_u32::<E>()?),
      PropertyType::Int64 => PropertyValue::Int64(self.read_i64::<E>()?),
      PropertyType::UInt64 => PropertyValue::UInt64(self.read_u64::<E>()?),
      PropertyType::Float => PropertyValue::Float(self.read_f32::<E>()?),
      PropertyType::Double => PropertyValue::Double(self.read_f64::<E>()?),
      PropertyType::Str | PropertyType::Name => {
        if size > 0 {
          PropertyValue::String(self.read_nt_string::<E>()?)
        } else {
          PropertyValue::String(String::new())
        }
      }
      PropertyType::Byte => {
        if size == 1 {
          PropertyValue::Byte(self.read_u8()?)
        } else {
          PropertyValue::Bytes(self.read_bytes(size as usize)?)
        }
      }
      PropertyType::Object => PropertyValue::Object(ObjectRef::classify(self.read_bytes(size as usize)?)),
      PropertyType::SoftObject => PropertyValue::SoftObject(self.read_soft_object_path::<E>()?),
      other => {
        return Err(ProfileError::UnknownPropertyType(other.to_string()));
      }
    };
    Ok(value)
  }

  fn read_soft_object_path<E: ByteOrder>(&mut self) -> Result<SoftObjectPath> {
    Ok(SoftObjectPath {
      package: self.read_nt_string::<E>()?,
      asset: self.read_nt_string::<E>()?,
      sub_path: self.read_nt_string::<E>()?,
    })
  }
}

impl<R: io::Read + io::Seek> ReadProfileBytes for R {}

/// Symmetric writer extension over `byteorder`'s `WriteBytesExt`. Purely
/// sequential; inner buffers are built first wherever a size prefix is
/// needed.
pub trait WriteProfileBytes: WriteBytesExt {
  /// Writes a length-prefixed null-terminated ASCII string. Writing a
  /// non-ASCII string is a hard error rather than a silent mangle.
  fn write_nt_string<E: ByteOrder>(&mut self, s: &str) -> Result<()> {
    if s.is_empty() {
      self.write_u32::<E>(0)?;
      return Ok(());
    }
    if !s.is_ascii() {
      return Err(ProfileError::NonAsciiString(s.to_string()));
    }
    self.write_u32::<E>(s.len() as u32 + 1)?;
    self.write_all(s.as_bytes())?;
    self.write_u8(0)?;
    Ok(())
  }

  /// Writes every entry in order, then the `"None"` terminator when
  /// `emit_none` is set.
  fn write_property_set<E: ByteOrder>(&mut self, set: &PropertySet, emit_none: bool) -> Result<()> {
    for (name, entry) in set.iter() {
      self.write_property::<E>(name, entry)?;
    }
    if emit_none {
      self.write_nt_string::<E>("None")?;
    }
    Ok(())
  }

  fn write_property<E: ByteOrder>(&mut self, name: &str, entry: &PropertyEntry) -> Result<()> {
    match entry {
      PropertyEntry::Struct(p) => self.write_struct_property::<E>(name, p),
      PropertyEntry::Array(p) => self.write_array_property::<E>(name, p),
      PropertyEntry::Map(p) => self.write_map_property::<E>(name, p),
      PropertyEntry::Set(p) => self.write_set_property::<E>(name, p),
      PropertyEntry::Bool(p) => self.write_bool_property::<E>(name, p),
      PropertyEntry::Simple(p) => self.write_simple_property::<E>(name, p),
    }
  }

  fn write_struct_property<E: ByteOrder>(&mut self, name: &str, p: &StructProperty) -> Result<()> {
    let inner = struct_inner_bytes(p)?;
    self.write_nt_string::<E>(name)?;
    self.write_nt_string::<E>("StructProperty")?;
    self.write_i32::<E>(1)?;
    self.write_nt_string::<E>(&p.struct_name)?;
    self.write_i32::<E>(1)?;
    self.write_nt_string::<E>(&p.package)?;
    self.write_i32::<E>(p.index)?;
    self.write_i32::<E>(inner.len() as i32)?;
    self.write_u8(p.tag)?;
    self.write_all(&inner)?;
    Ok(())
  }

  fn write_array_property<E: ByteOrder>(&mut self, name: &str, p: &ArrayProperty) -> Result<()> {
    let elem_bytes = array_element_bytes(p)?;
    let computed = 4 + elem_bytes.len() as i32;
    // An unmodified array keeps its original size so trailing padding
    // survives; a grown array takes the computed size
    let data_size = if p.size > 0 { p.size.max(computed) } else { computed };
    let length = p.elements.count().map(|n| n as i32).unwrap_or(p.length);

    self.write_nt_string::<E>(name)?;
    self.write_nt_string::<E>("ArrayProperty")?;
    self.write_i32::<E>(1)?;
    self.write_nt_string::<E>(&p.child_type)?;
    if p.child_type == "StructProperty" {
      self.write_i32::<E>(1)?;
      self.write_nt_string::<E>(p.struct_name.as_deref().unwrap_or(""))?;
      self.write_i32::<E>(1)?;
      self.write_nt_string::<E>(p.package.as_deref().unwrap_or(""))?;
    }
    self.write_i32::<E>(p.index)?;
    self.write_i32::<E>(data_size)?;
    self.write_u8(p.tag)?;
    self.write_i32::<E>(length)?;
    self.write_all(&elem_bytes)?;
    let pad = (data_size - 4) as usize - elem_bytes.len();
    if pad > 0 {
      self.write_all(&vec![0u8; pad])?;
    }
    Ok(())
  }

  fn write_map_property<E: ByteOrder>(&mut self, name: &str, p: &MapProperty) -> Result<()> {
    self.write_nt_string::<E>(name)?;
    self.write_nt_string::<E>("MapProperty")?;
    self.write_i32::<E>(1)?;
    self.write_nt_string::<E>(&p.key_type)?;
    self.write_i32::<E>(1)?;
    self.write_nt_string::<E>(&p.val_type)?;
    self.write_i32::<E>(p.index)?;
    self.write_i32::<E>(p.raw.len() as i32)?;
    self.write_u8(p.tag)?;
    self.write_all(&p.raw)?;
    Ok(())
  }

  fn write_set_property<E: ByteOrder>(&mut self, name: &str, p: &SetProperty) -> Result<()> {
    let body = match &p.content {
      SetContent::Names(names) => set_body_bytes(names)?,
      SetContent::Raw(raw) => raw.clone(),
    };
    self.write_nt_string::<E>(name)?;
    self.write_nt_string::<E>("SetProperty")?;
    self.write_i32::<E>(1)?;
    self.write_nt_string::<E>(&p.elem_type)?;
    self.write_i32::<E>(p.index)?;
    self.write_i32::<E>(body.len() as i32)?;
    self.write_u8(p.tag)?;
    self.write_all(&body)?;
    Ok(())
  }

  fn write_bool_property<E: ByteOrder>(&mut self, name: &str, p: &BoolProperty) -> Result<()> {
    self.write_nt_string::<E>(name)?;
    self.write_nt_string::<E>("BoolProperty")?;
    self.write_i32::<E>(p.index)?;
    self.write_i32::<E>(0)?;
    self.write_u8(p.value)?;
    Ok(())
  }

  fn write_simple_property<E: ByteOrder>(&mut self, name: &str, p: &SimpleProperty) -> Result<()> {
    let size = p.value_byte_size();
    self.write_nt_string::<E>(name)?;
    self.write_nt_string::<E>(&p.prop_type.to_string())?;
    self.write_i32::<E>(p.index)?;
    self.write_i32::<E>(size)?;
    self.write_u8(p.tag)?;
    if p.tag != 0 {
      self.write_i32::<E>(p.extra.unwrap_or(0))?;
    }
    self.write_simple_value::<E>(p, size)
  }

  fn write_simple_value<E: ByteOrder>(&mut self, p: &SimpleProperty, size: i32) -> Result<()> {
    match &p.value {
      PropertyValue::Int16(v) => self.write_i16::<E>(*v)?,
      PropertyValue::UInt16(v) => self.write_u16::<E>(*v)?,
      PropertyValue::Int(v) => self.write_i32::<E>(*v)?,
      PropertyValue::UInt32(v) => self.write_u32::<E>(*v)?,
      PropertyValue::Int64(v) => self.write_i64::<E>(*v)?,
      PropertyValue::UInt64(v) => self.write_u64::<E>(*v)?,
      PropertyValue::Float(v) => self.write_f32::<E>(*v)?,
      PropertyValue::Double(v) => self.write_f64::<E>(*v)?,
      PropertyValue::String(s) => {
        // A declared size of 0 means the property has no body at all
        if size > 0 {
          self.write_nt_string::<E>(s)?;
        }
      }
      PropertyValue::Byte(b) => self.write_u8(*b)?,
      PropertyValue::Bytes(b) => self.write_all(b)?,
      PropertyValue::Object(o) => self.write_object_ref::<E>(o)?,
      PropertyValue::SoftObject(p) => {
        self.write_nt_string::<E>(&p.package)?;
        self.write_nt_string::<E>(&p.asset)?;
        self.write_nt_string::<E>(&p.sub_path)?;
      }
    }
    Ok(())
  }

  fn write_object_ref<E: ByteOrder>(&mut self, obj: &ObjectRef) -> Result<()> {
    match obj {
      ObjectRef::Null => self.write_all(&[0xff, 0xff, 0xff, 0xff])?,
      ObjectRef::IndexedNull => self.write_all(&[0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff])?,
      ObjectRef::Index(v) => self.write_i32::<E>(*v)?,
      ObjectRef::Path(path) => {
        self.write_i32::<E>(1)?;
        self.write_nt_string::<E>(path)?;
      }
      ObjectRef::Opaque(bytes) => self.write_all(bytes)?,
    }
    Ok(())
  }
}

impl<W: io::Write> WriteProfileBytes for W {}

/// Serializes a property set into a fresh buffer.
pub fn serialize_property_set(set: &PropertySet, emit_none: bool) -> Result<Vec<u8>> {
  let mut buf: Vec<u8> = Vec::new();
  buf.write_property_set::<LittleEndian>(set, emit_none)?;
  Ok(buf)
}

/// The exact bytes a struct body will occupy on disk. Shared by the
/// serializer and the size recalculator so the declared size always matches
/// the emitted bytes.
///
/// A body whose original size cannot hold the child properties plus the
/// 9-byte `"None"` terminator is zero-padded without a terminator; otherwise
/// the terminator is written and any remaining original size zero-filled.
pub(crate) fn struct_inner_bytes(p: &StructProperty) -> Result<Vec<u8>> {
  if let Some(raw) = &p.raw {
    if p.data.is_empty() {
      return Ok(raw.clone());
    }
  }
  let mut body = serialize_property_set(&p.data, false)?;
  let orig = p.size as usize;
  if p.size > 0 && body.len() + NONE_BYTES.len() > orig {
    if body.len() < orig {
      body.resize(orig, 0);
    }
  } else if p.size > 0 {
    body.extend_from_slice(NONE_BYTES);
    if body.len() < orig {
      body.resize(orig, 0);
    }
  } else {
    body.extend_from_slice(NONE_BYTES);
  }
  Ok(body)
}

/// The exact element-payload bytes of an array (everything after the length
/// field, before trailing padding).
pub(crate) fn array_element_bytes(p: &ArrayProperty) -> Result<Vec<u8>> {
  let mut buf: Vec<u8> = Vec::new();
  match &p.elements {
    ArrayElements::Structs(sets) => {
      for (i, set) in sets.iter().enumerate() {
        if i > 0 && p.has_separator {
          buf.write_i32::<LittleEndian>(0)?;
        }
        buf.write_property_set::<LittleEndian>(set, true)?;
      }
    }
    ArrayElements::Int16(v) => {
      for x in v {
        buf.write_i16::<LittleEndian>(*x)?;
      }
    }
    ArrayElements::UInt16(v) => {
      for x in v {
        buf.write_u16::<LittleEndian>(*x)?;
      }
    }
    ArrayElements::Int(v) => {
      for x in v {
        buf.write_i32::<LittleEndian>(*x)?;
      }
    }
    ArrayElements::UInt32(v) => {
      for x in v {
        buf.write_u32::<LittleEndian>(*x)?;
      }
    }
    ArrayElements::Int64(v) => {
      for x in v {
        buf.write_i64::<LittleEndian>(*x)?;
      }
    }
    ArrayElements::UInt64(v) => {
      for x in v {
        buf.write_u64::<LittleEndian>(*x)?;
      }
    }
    ArrayElements::Float(v) => {
      for x in v {
        buf.write_f32::<LittleEndian>(*x)?;
      }
    }
    ArrayElements::Double(v) => {
      for x in v {
        buf.write_f64::<LittleEndian>(*x)?;
      }
    }
    ArrayElements::Byte(v) | ArrayElements::Bool(v) => {
      buf.write_all(v)?;
    }
    ArrayElements::Strings(v) => {
      for s in v {
        buf.write_nt_string::<LittleEndian>(s)?;
      }
    }
    ArrayElements::Objects(v) => {
      for s in v {
        buf.write_i32::<LittleEndian>(1)?;
        buf.write_nt_string::<LittleEndian>(s)?;
      }
    }
    ArrayElements::SoftObjects(v) => {
      for path in v {
        buf.write_nt_string::<LittleEndian>(&path.package)?;
        buf.write_nt_string::<LittleEndian>(&path.asset)?;
        buf.write_nt_string::<LittleEndian>(&path.sub_path)?;
      }
    }
    ArrayElements::Raw(bytes) => {
      buf.write_all(bytes)?;
    }
  }
  Ok(buf)
}

/// The body of a name-list set: `i32 0`, `i32 count`, the names.
pub(crate) fn set_body_bytes(names: &[String]) -> Result<Vec<u8>> {
  let mut buf: Vec<u8> = Vec::new();
  buf.write_i32::<LittleEndian>(0)?;
  buf.write_i32::<LittleEndian>(names.len() as i32)?;
  for name in names {
    buf.write_nt_string::<LittleEndian>(name)?;
  }
  Ok(buf)
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::*;

  fn nt(s: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_nt_string::<LittleEndian>(s).unwrap();
    out
  }

  fn i32le(v: i32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
  }

  fn parse(bytes: &[u8]) -> PropertySet {
    let mut cursor = Cursor::new(bytes);
    cursor.read_property_set::<LittleEndian>(None).unwrap()
  }

  fn round_trip(bytes: &[u8]) -> Vec<u8> {
    let mut set = parse(bytes);
    set.recalculate_sizes().unwrap();
    serialize_property_set(&set, true).unwrap()
  }

  #[test]
  fn nt_string_round_trip() {
    for s in ["", "None", "PlayerLocalData"] {
      let mut buf = Vec::new();
      buf.write_nt_string::<LittleEndian>(s).unwrap();
      assert_eq!(buf.len() as i32, nt_string_byte_size(s));
      let mut cursor = Cursor::new(buf);
      assert_eq!(cursor.read_nt_string::<LittleEndian>().unwrap(), s);
    }
  }

  #[test]
  fn nt_string_rejects_non_ascii_on_write() {
    let mut buf = Vec::new();
    assert!(matches!(
      buf.write_nt_string::<LittleEndian>("héllo"),
      Err(ProfileError::NonAsciiString(_))
    ));
  }

  #[test]
  fn nt_string_overflow_is_detected() {
    // Claims 100 bytes, provides 2
    let mut cursor = Cursor::new(vec![100, 0, 0, 0, b'a', b'b']);
    assert!(matches!(
      cursor.read_nt_string::<LittleEndian>(),
      Err(ProfileError::StringOverflow(100, 2))
    ));
  }

  #[test]
  fn int_property_round_trip() {
    let bytes = [
      nt("Score"),
      nt("IntProperty"),
      i32le(0),
      i32le(4),
      vec![0],
      i32le(42),
      nt("None"),
    ]
    .concat();
    let set = parse(&bytes);
    assert_eq!(set.len(), 1);
    match set.get("Score") {
      Some(PropertyEntry::Simple(p)) => {
        assert_eq!(p.prop_type, PropertyType::Int);
        assert_eq!(p.index, 0);
        assert_eq!(p.size, 4);
        assert_eq!(p.value, PropertyValue::Int(42));
      }
      other => panic!("unexpected entry: {other:?}"),
    }
    assert_eq!(round_trip(&bytes), bytes);
  }

  #[test]
  fn empty_struct_array_round_trip() {
    let bytes = [
      nt("ArkItems"),
      nt("ArrayProperty"),
      i32le(1),
      nt("StructProperty"),
      i32le(1),
      nt("ItemNetInfo"),
      i32le(1),
      nt("/Script/ShooterGame"),
      i32le(0),
      i32le(4),
      vec![0],
      i32le(0),
      nt("None"),
    ]
    .concat();
    let set = parse(&bytes);
    match set.get("ArkItems") {
      Some(PropertyEntry::Array(p)) => {
        assert_eq!(p.length, 0);
        assert_eq!(p.size, 4);
        assert_eq!(p.elements, ArrayElements::Structs(Vec::new()));
        assert_eq!(p.struct_name.as_deref(), Some("ItemNetInfo"));
      }
      other => panic!("unexpected entry: {other:?}"),
    }
    assert_eq!(round_trip(&bytes), bytes);
  }

  #[test]
  fn struct_without_terminator_room_is_zero_padded() {
    // Inner int property plus 3 trailing zero bytes: no room for the 9-byte
    // "None" terminator, so the body must be reproduced as inner + padding.
    let inner = [nt("Count"), nt("IntProperty"), i32le(0), i32le(4), vec![0], i32le(7)].concat();
    let body = [inner.clone(), vec![0, 0, 0]].concat();
    let bytes = [
      nt("Wrap"),
      nt("StructProperty"),
      i32le(1),
      nt("MyStruct"),
      i32le(1),
      nt("/Script/ShooterGame"),
      i32le(0),
      i32le(body.len() as i32),
      vec![0],
      body,
      nt("None"),
    ]
    .concat();
    let set = parse(&bytes);
    match set.get("Wrap") {
      Some(PropertyEntry::Struct(p)) => {
        assert_eq!(p.data.len(), 1);
        assert!(p.raw.is_none());
      }
      other => panic!("unexpected entry: {other:?}"),
    }
    assert_eq!(round_trip(&bytes), bytes);
  }

  #[test]
  fn struct_with_terminator_and_raw_struct_round_trip() {
    // A struct body holding one property plus the terminator.
    let inner = [
      nt("Count"),
      nt("IntProperty"),
      i32le(0),
      i32le(4),
      vec![0],
      i32le(7),
      nt("None"),
    ]
    .concat();
    let with_term = [
      nt("Wrap"),
      nt("StructProperty"),
      i32le(1),
      nt("MyStruct"),
      i32le(1),
      nt("/Script/ShooterGame"),
      i32le(0),
      i32le(inner.len() as i32),
      vec![0],
      inner,
      nt("None"),
    ]
    .concat();
    assert_eq!(round_trip(&with_term), with_term);

    // A Vector-like struct body with no tagged properties stays raw.
    let floats = [1.0f32, 2.0, 3.0].iter().flat_map(|f| f.to_le_bytes()).collect::<Vec<u8>>();
    let raw_struct = [
      nt("Pos"),
      nt("StructProperty"),
      i32le(1),
      nt("Vector"),
      i32le(1),
      nt("/Script/CoreUObject"),
      i32le(0),
      i32le(12),
      vec![0],
      floats.clone(),
      nt("None"),
    ]
    .concat();
    let set = parse(&raw_struct);
    match set.get("Pos") {
      Some(PropertyEntry::Struct(p)) => {
        assert!(p.data.is_empty());
        assert_eq!(p.raw.as_deref(), Some(&floats[..]));
      }
      other => panic!("unexpected entry: {other:?}"),
    }
    assert_eq!(round_trip(&raw_struct), raw_struct);
  }

  fn struct_array_bytes(with_separator: bool) -> Vec<u8> {
    let elem = |v: i32| {
      [nt("Val"), nt("IntProperty"), i32le(0), i32le(4), vec![0], i32le(v), nt("None")].concat()
    };
    let mut payload = elem(1);
    if with_separator {
      payload.extend_from_slice(&i32le(0));
    }
    payload.extend_from_slice(&elem(2));
    [
      nt("Pair"),
      nt("ArrayProperty"),
      i32le(1),
      nt("StructProperty"),
      i32le(1),
      nt("IntWrapper"),
      i32le(1),
      nt("/Script/ShooterGame"),
      i32le(0),
      i32le(4 + payload.len() as i32),
      vec![0],
      i32le(2),
      payload,
      nt("None"),
    ]
    .concat()
  }

  #[test]
  fn struct_array_separator_is_latched() {
    for with_separator in [true, false] {
      let bytes = struct_array_bytes(with_separator);
      let set = parse(&bytes);
      match set.get("Pair") {
        Some(PropertyEntry::Array(p)) => {
          assert_eq!(p.has_separator, with_separator);
          assert!(matches!(&p.elements, ArrayElements::Structs(v) if v.len() == 2));
        }
        other => panic!("unexpected entry: {other:?}"),
      }
      assert_eq!(round_trip(&bytes), bytes);
    }
  }

  #[test]
  fn separator_survives_element_edits() {
    let bytes = struct_array_bytes(true);
    let mut set = parse(&bytes);
    if let Some(PropertyEntry::Array(p)) = set.get_mut("Pair") {
      if let ArrayElements::Structs(sets) = &mut p.elements {
        if let Some(PropertyEntry::Simple(s)) = sets[1].get_mut("Val") {
          s.value = PropertyValue::Int(99);
        }
      }
      assert!(p.has_separator);
    }
    set.recalculate_sizes().unwrap();
    let out = serialize_property_set(&set, true).unwrap();
    assert_eq!(out.len(), bytes.len());
    let reparsed = parse(&out);
    match reparsed.get("Pair") {
      Some(PropertyEntry::Array(p)) => assert!(p.has_separator),
      other => panic!("unexpected entry: {other:?}"),
    }
  }

  #[test]
  fn primitive_and_string_arrays_round_trip() {
    let floats = [
      nt("Weights"),
      nt("ArrayProperty"),
      i32le(1),
      nt("FloatProperty"),
      i32le(0),
      i32le(4 + 8),
      vec![0],
      i32le(2),
      1.5f32.to_le_bytes().to_vec(),
      (-2.5f32).to_le_bytes().to_vec(),
      nt("None"),
    ]
    .concat();
    assert_eq!(round_trip(&floats), floats);

    let names = [
      nt("Tags"),
      nt("ArrayProperty"),
      i32le(1),
      nt("NameProperty"),
      i32le(0),
      i32le(4 + nt_string_byte_size("Alpha") + nt_string_byte_size("Beta")),
      vec![0],
      i32le(2),
      nt("Alpha"),
      nt("Beta"),
      nt("None"),
    ]
    .concat();
    assert_eq!(round_trip(&names), names);

    let objects = [
      nt("Refs"),
      nt("ArrayProperty"),
      i32le(1),
      nt("ObjectProperty"),
      i32le(0),
      i32le(4 + 4 + nt_string_byte_size("/Game/Mods/Thing.Thing")),
      vec![0],
      i32le(1),
      i32le(1),
      nt("/Game/Mods/Thing.Thing"),
      nt("None"),
    ]
    .concat();
    assert_eq!(round_trip(&objects), objects);

    let soft = [
      nt("SoftRefs"),
      nt("ArrayProperty"),
      i32le(1),
      nt("SoftObjectProperty"),
      i32le(0),
      i32le(4 + nt_string_byte_size("/Game/Maps/TheIsland") + nt_string_byte_size("TheIsland") + 4),
      vec![0],
      i32le(1),
      nt("/Game/Maps/TheIsland"),
      nt("TheIsland"),
      nt(""),
      nt("None"),
    ]
    .concat();
    assert_eq!(round_trip(&soft), soft);
  }

  #[test]
  fn unknown_array_child_type_is_preserved_raw() {
    let payload = vec![0xde, 0xad, 0xbe, 0xef, 0x01];
    let bytes = [
      nt("Weird"),
      nt("ArrayProperty"),
      i32le(1),
      nt("TextProperty"),
      i32le(0),
      i32le(4 + payload.len() as i32),
      vec![0],
      i32le(3),
      payload.clone(),
      nt("None"),
    ]
    .concat();
    let set = parse(&bytes);
    match set.get("Weird") {
      Some(PropertyEntry::Array(p)) => {
        assert_eq!(p.length, 3);
        assert_eq!(p.elements, ArrayElements::Raw(payload.clone()));
      }
      other => panic!("unexpected entry: {other:?}"),
    }
    // length cannot be derived from the raw payload and must be preserved
    assert_eq!(round_trip(&bytes), bytes);
  }

  #[test]
  fn object_property_null_forms_round_trip() {
    let null4 = [
      nt("Ref"),
      nt("ObjectProperty"),
      i32le(0),
      i32le(4),
      vec![0],
      vec![0xff, 0xff, 0xff, 0xff],
      nt("None"),
    ]
    .concat();
    let set = parse(&null4);
    match set.get("Ref") {
      Some(PropertyEntry::Simple(p)) => {
        assert_eq!(p.value, PropertyValue::Object(ObjectRef::Null));
        assert_eq!(p.size, 4);
      }
      other => panic!("unexpected entry: {other:?}"),
    }
    assert_eq!(round_trip(&null4), null4);

    let null8 = [
      nt("Ref"),
      nt("ObjectProperty"),
      i32le(0),
      i32le(8),
      vec![0],
      vec![0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff],
      nt("None"),
    ]
    .concat();
    let set = parse(&null8);
    match set.get("Ref") {
      Some(PropertyEntry::Simple(p)) => {
        assert_eq!(p.value, PropertyValue::Object(ObjectRef::IndexedNull));
        assert_eq!(p.size, 8);
      }
      other => panic!("unexpected entry: {other:?}"),
    }
    assert_eq!(round_trip(&null8), null8);
  }

  #[test]
  fn name_set_parses_and_rewrites() {
    let body = [i32le(0), i32le(2), nt("Alpha"), nt("Beta")].concat();
    let bytes = [
      nt("Unlocks"),
      nt("SetProperty"),
      i32le(1),
      nt("NameProperty"),
      i32le(0),
      i32le(body.len() as i32),
      vec![0],
      body,
      nt("None"),
    ]
    .concat();
    let mut set = parse(&bytes);
    match set.get("Unlocks") {
      Some(PropertyEntry::Set(p)) => {
        assert_eq!(
          p.content,
          SetContent::Names(vec!["Alpha".to_string(), "Beta".to_string()])
        );
      }
      other => panic!("unexpected entry: {other:?}"),
    }
    assert_eq!(round_trip(&bytes), bytes);

    // Replace the list and check the declared size follows the content.
    if let Some(PropertyEntry::Set(p)) = set.get_mut("Unlocks") {
      p.content = SetContent::Names(vec!["Gamma".to_string()]);
    }
    set.recalculate_sizes().unwrap();
    let out = serialize_property_set(&set, true).unwrap();
    let expected = [
      nt("Unlocks"),
      nt("SetProperty"),
      i32le(1),
      nt("NameProperty"),
      i32le(0),
      i32le(18),
      vec![0],
      i32le(0),
      i32le(1),
      nt("Gamma"),
      nt("None"),
    ]
    .concat();
    assert_eq!(out, expected);
  }

  #[test]
  fn non_name_set_stays_raw() {
    let body = vec![1, 2, 3, 4, 5, 6];
    let bytes = [
      nt("Things"),
      nt("SetProperty"),
      i32le(1),
      nt("StructProperty"),
      i32le(0),
      i32le(body.len() as i32),
      vec![0],
      body.clone(),
      nt("None"),
    ]
    .concat();
    let set = parse(&bytes);
    match set.get("Things") {
      Some(PropertyEntry::Set(p)) => assert_eq!(p.content, SetContent::Raw(body.clone())),
      other => panic!("unexpected entry: {other:?}"),
    }
    assert_eq!(round_trip(&bytes), bytes);
  }

  #[test]
  fn map_property_stays_raw() {
    let body = vec![9u8; 17];
    let bytes = [
      nt("Lookup"),
      nt("MapProperty"),
      i32le(1),
      nt("NameProperty"),
      i32le(1),
      nt("IntProperty"),
      i32le(0),
      i32le(body.len() as i32),
      vec![0],
      body.clone(),
      nt("None"),
    ]
    .concat();
    let set = parse(&bytes);
    match set.get("Lookup") {
      Some(PropertyEntry::Map(p)) => {
        assert_eq!(p.key_type, "NameProperty");
        assert_eq!(p.val_type, "IntProperty");
        assert_eq!(p.raw, body);
      }
      other => panic!("unexpected entry: {other:?}"),
    }
    assert_eq!(round_trip(&bytes), bytes);
  }

  #[test]
  fn bool_and_tagged_simple_round_trip() {
    let bytes = [
      nt("IsHidden"),
      nt("BoolProperty"),
      i32le(3),
      i32le(0),
      vec![1],
      nt("EngramPoints"),
      nt("IntProperty"),
      i32le(0),
      i32le(4),
      vec![1], // non-zero tag: four extra index bytes follow
      i32le(5),
      i32le(77),
      nt("None"),
    ]
    .concat();
    let set = parse(&bytes);
    match set.get("IsHidden") {
      Some(PropertyEntry::Bool(p)) => {
        assert_eq!(p.index, 3);
        assert_eq!(p.value, 1);
      }
      other => panic!("unexpected entry: {other:?}"),
    }
    match set.get("EngramPoints") {
      Some(PropertyEntry::Simple(p)) => {
        assert_eq!(p.tag, 1);
        assert_eq!(p.extra, Some(5));
        assert_eq!(p.value, PropertyValue::Int(77));
      }
      other => panic!("unexpected entry: {other:?}"),
    }
    assert_eq!(round_trip(&bytes), bytes);
  }

  #[test]
  fn unknown_property_type_is_skipped() {
    let bytes = [
      nt("Mystery"),
      nt("TextProperty"),
      i32le(0),
      i32le(4),
      vec![0],
      vec![1, 2, 3, 4],
      nt("After"),
      nt("IntProperty"),
      i32le(0),
      i32le(4),
      vec![0],
      i32le(11),
      nt("None"),
    ]
    .concat();
    let set = parse(&bytes);
    assert_eq!(set.len(), 1);
    assert!(set.get("Mystery").is_none());
    match set.get("After") {
      Some(PropertyEntry::Simple(p)) => assert_eq!(p.value, PropertyValue::Int(11)),
      other => panic!("unexpected entry: {other:?}"),
    }
  }

  #[test]
  fn duplicate_names_preserve_order_and_bytes() {
    let entry = |idx: i32, val: i32| {
      [nt("Stat"), nt("IntProperty"), i32le(idx), i32le(4), vec![0], i32le(val)].concat()
    };
    let bytes = [entry(0, 10), entry(1, 20), nt("None")].concat();
    let set = parse(&bytes);
    assert_eq!(set.len(), 2);
    let values: Vec<i32> = set
      .get_all("Stat")
      .map(|e| match e {
        PropertyEntry::Simple(p) => match p.value {
          PropertyValue::Int(v) => v,
          _ => panic!("not an int"),
        },
        _ => panic!("not simple"),
      })
      .collect();
    assert_eq!(values, vec![10, 20]);
    assert_eq!(round_trip(&bytes), bytes);
  }

  #[test]
  fn str_property_empty_and_non_empty() {
    // Empty string with a 4-byte body (u32 0) keeps its recorded size.
    let bytes = [
      nt("Nick"),
      nt("StrProperty"),
      i32le(0),
      i32le(4),
      vec![0],
      i32le(0),
      nt("Title"),
      nt("StrProperty"),
      i32le(0),
      i32le(nt_string_byte_size("Alpha")),
      vec![0],
      nt("Alpha"),
      nt("None"),
    ]
    .concat();
    assert_eq!(round_trip(&bytes), bytes);
  }

  #[test]
  fn truncated_declared_size_drops_property() {
    // Declared 64-byte body with only a few bytes behind it.
    let bytes = [
      nt("Broken"),
      nt("MapProperty"),
      i32le(1),
      nt("NameProperty"),
      i32le(1),
      nt("IntProperty"),
      i32le(0),
      i32le(64),
      vec![0],
      vec![1, 2, 3],
    ]
    .concat();
    let set = parse(&bytes);
    assert!(set.is_empty());
  }
}
