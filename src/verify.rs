//! Structural verifier: an independent, offset-walking re-implementation of
//! the property parser. It never builds a tree and never mutates bytes; it
//! replays the declared sizes and reports every inconsistency it finds with
//! the byte offset where it found it.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

/// The type strings the walker accepts. Kept local so the verifier does not
/// share dispatch tables with the codec it is checking.
const VALID_TYPES: [&str; 18] = [
  "StructProperty",
  "ArrayProperty",
  "MapProperty",
  "SetProperty",
  "BoolProperty",
  "IntProperty",
  "UInt32Property",
  "FloatProperty",
  "DoubleProperty",
  "Int64Property",
  "UInt64Property",
  "Int16Property",
  "UInt16Property",
  "ByteProperty",
  "StrProperty",
  "NameProperty",
  "ObjectProperty",
  "SoftObjectProperty",
];

/// The smallest byte count a well-formed envelope can occupy.
const MIN_FILE_LEN: usize = 50;

/// A single finding, anchored to the byte offset it was detected at.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
  pub offset: usize,
  pub message: String,
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "offset {}: {}", self.offset, self.message)
  }
}

/// The outcome of one verification walk.
#[derive(Debug, Default)]
pub struct VerifyReport {
  /// Player name recovered from the envelope, when readable.
  pub player_name: Option<String>,
  /// Offset where the property section begins.
  pub prop_start: usize,
  /// Offset where the walk stopped.
  pub end_offset: usize,
  /// Length of the region after the property section.
  pub trailing_len: usize,
  pub props_checked: usize,
  pub diagnostics: Vec<Diagnostic>,
  /// Walk lines, collected only when verbose.
  pub trace: Vec<String>,
}

impl VerifyReport {
  pub fn is_ok(&self) -> bool {
    self.diagnostics.is_empty()
  }
}

/// Verifies `data` as a complete `.arkprofile` image.
pub fn verify_bytes(data: &[u8], verbose: bool) -> VerifyReport {
  let mut verifier = Verifier {
    data,
    verbose,
    report: VerifyReport::default(),
  };
  verifier.run();
  verifier.report
}

struct Verifier<'a> {
  data: &'a [u8],
  verbose: bool,
  report: VerifyReport,
}

impl<'a> Verifier<'a> {
  fn run(&mut self) {
    if self.data.len() < MIN_FILE_LEN {
      self.error(0, "file too short for header".to_string());
      return;
    }

    let version = LittleEndian::read_i32(&self.data[12..16]);
    if version != 1 {
      self.error(12, format!("unsupported version {version} (expected 1)"));
    }

    let Some((prop_start, name)) = self.find_property_start() else {
      self.error(0, "header truncated before the property section".to_string());
      return;
    };
    self.report.player_name = Some(name);
    self.report.prop_start = prop_start;

    let end = self.walk_properties(prop_start, self.data.len(), 0);
    self.report.end_offset = end;

    let remaining = self.data.len().saturating_sub(end);
    self.report.trailing_len = remaining;
    match remaining {
      0 => {}
      20 => {
        let count = LittleEndian::read_i32(&self.data[end..end + 4]);
        let guid = &self.data[end + 4..end + 20];
        let hex: String = guid.iter().map(|b| format!("{b:02x}")).collect();
        self.trace(0, format!("Trailer: int={count}, guid={hex}"));
      }
      n => self.error(end, format!("unexpected trailing data: {n} bytes")),
    }
  }

  /// Replays the envelope reads to locate the property section.
  fn find_property_start(&self) -> Option<(usize, String)> {
    let mut pos = 12; // header_v1..v3
    pos += 4; // version
    pos += 16; // guid
    let (_, next) = self.nt_at(pos)?; // file_type
    pos = next + 8; // constants 0 and 5
    let (name, next) = self.nt_at(pos)?;
    pos = next;
    for _ in 0..4 {
      let (_, next) = self.nt_at(pos)?; // controller, game_mode, map_name, map_path
      pos = next;
    }
    pos += 12; // zero padding
    pos += 4; // header_size
    pos += 4; // always 0
    pos += 1; // separator byte
    if pos > self.data.len() {
      return None;
    }
    Some((pos, name))
  }

  // -- raw readers ----------------------------------------------------------

  fn i32_at(&self, pos: usize) -> Option<i32> {
    let slice = self.data.get(pos..pos + 4)?;
    Some(LittleEndian::read_i32(slice))
  }

  fn u8_at(&self, pos: usize) -> Option<u8> {
    self.data.get(pos).copied()
  }

  /// Length-prefixed null-terminated string at `pos`. Returns the decoded
  /// string and the offset just past it.
  fn nt_at(&self, pos: usize) -> Option<(String, usize)> {
    let len = self.i32_at(pos)?;
    if len < 0 {
      return None;
    }
    let len = len as usize;
    let pos = pos + 4;
    if len == 0 {
      return Some((String::new(), pos));
    }
    let body = self.data.get(pos..pos + len - 1)?;
    self.data.get(pos + len - 1)?; // terminator must exist
    let text = body
      .iter()
      .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
      .collect();
    Some((text, pos + len))
  }

  /// Reads a (name, type) pair. `None` means the walk cannot continue from
  /// `pos`; the resync heuristic rejects implausible names (over 200 bytes
  /// or non-printable) and unknown type strings.
  fn read_pair(&self, pos: usize, end: usize) -> Option<(String, String, usize)> {
    if pos + 4 > end {
      return None;
    }
    let (name, next) = self.nt_at(pos)?;
    if name == "None" {
      return Some((name, String::new(), next));
    }
    if name.len() > 200 || !name.chars().all(|c| (' '..='~').contains(&c)) {
      return None;
    }
    if next + 4 > end {
      return None;
    }
    let (ptype, next) = self.nt_at(next)?;
    if !VALID_TYPES.contains(&ptype.as_str()) {
      return None;
    }
    Some((name, ptype, next))
  }

  // -- reporting ------------------------------------------------------------

  fn trace(&mut self, depth: usize, msg: String) {
    if self.verbose {
      self.report.trace.push(format!("{}{}", "  ".repeat(depth), msg));
    }
  }

  fn error(&mut self, offset: usize, message: String) {
    self.report.diagnostics.push(Diagnostic { offset, message });
  }

  // -- property walkers -----------------------------------------------------

  /// Walks properties in `[start, end)`, returning the offset the walk
  /// stopped at.
  fn walk_properties(&mut self, start: usize, end: usize, depth: usize) -> usize {
    let mut pos = start;
    while pos < end {
      let Some((name, ptype, next)) = self.read_pair(pos, end) else {
        return pos;
      };
      pos = next;
      if name == "None" {
        break;
      }
      self.report.props_checked += 1;
      let header_pos = pos;
      let stepped = match ptype.as_str() {
        "StructProperty" => self.check_struct(&name, pos, depth),
        "ArrayProperty" => self.check_array(&name, pos, depth),
        "MapProperty" => self.check_map(&name, pos, depth),
        "SetProperty" => self.check_set(&name, pos, depth),
        "BoolProperty" => self.check_bool(&name, pos, depth),
        _ => self.check_simple(&name, &ptype, pos, depth),
      };
      pos = match stepped {
        Some(p) => p,
        None => {
          self.error(header_pos, format!("{name} ({ptype}): truncated sub-header"));
          return end;
        }
      };
    }
    pos
  }

  fn check_struct(&mut self, name: &str, pos: usize, depth: usize) -> Option<usize> {
    let mut p = pos;
    let _flag = self.i32_at(p)?;
    p += 4;
    let (struct_name, next) = self.nt_at(p)?;
    p = next;
    let _flag = self.i32_at(p)?;
    p += 4;
    let (_package, next) = self.nt_at(p)?;
    p = next;
    let _index = self.i32_at(p)?;
    p += 4;
    let size = self.i32_at(p)?;
    p += 4;
    let _tag = self.u8_at(p)?;
    p += 1;
    if size < 0 {
      self.error(p, format!("{name} ({struct_name}): negative size {size}"));
      return Some(p);
    }
    let expected_end = p + size as usize;
    self.trace(
      depth,
      format!("Struct {name} ({struct_name}) declared_size={size} [{p}..{expected_end})"),
    );
    if expected_end > self.data.len() {
      self.error(p, format!("{name} ({struct_name}): size {size} overflows file"));
      return Some(self.data.len());
    }
    self.walk_properties(p, expected_end, depth + 1);
    Some(expected_end)
  }

  fn check_array(&mut self, name: &str, pos: usize, depth: usize) -> Option<usize> {
    let mut p = pos;
    let _flag = self.i32_at(p)?;
    p += 4;
    let (child_type, next) = self.nt_at(p)?;
    p = next;
    if child_type == "StructProperty" {
      let _flag = self.i32_at(p)?;
      p += 4;
      let (_struct_name, next) = self.nt_at(p)?;
      p = next;
      let _flag = self.i32_at(p)?;
      p += 4;
      let (_package, next) = self.nt_at(p)?;
      p = next;
    }
    let _index = self.i32_at(p)?;
    p += 4;
    let size = self.i32_at(p)?;
    p += 4;
    let _tag = self.u8_at(p)?;
    p += 1;
    let length = self.i32_at(p)?;
    p += 4;

    self.trace(depth, format!("Array {name} [{child_type}] declared_size={size} length={length}"));
    if size < 4 {
      self.error(p, format!("{name}: size {size} < 4"));
      return Some(p);
    }
    let elem_size = (size - 4) as usize;
    let expected_end = p + elem_size;
    if expected_end > self.data.len() {
      self.error(p, format!("{name}: size {size} overflows file"));
      return Some(self.data.len());
    }

    if child_type == "StructProperty" && length > 0 {
      let mut elem_pos = p;
      for i in 0..length {
        if i > 0 && elem_pos + 4 <= expected_end {
          if let Some(0) = self.i32_at(elem_pos) {
            elem_pos += 4; // inter-element separator
          }
        }
        elem_pos = self.walk_properties(elem_pos, expected_end, depth + 1);
        if elem_pos > expected_end {
          self.error(elem_pos, format!("{name}[{i}]: overran array boundary"));
          break;
        }
      }
    } else if length > 0 {
      let widths: &[(&str, usize)] = &[
        ("IntProperty", 4),
        ("UInt32Property", 4),
        ("FloatProperty", 4),
        ("DoubleProperty", 8),
        ("Int64Property", 8),
        ("UInt64Property", 8),
        ("Int16Property", 2),
        ("UInt16Property", 2),
        ("ByteProperty", 1),
        ("BoolProperty", 1),
      ];
      if let Some((_, width)) = widths.iter().find(|(t, _)| *t == child_type) {
        let expected_bytes = length as usize * width;
        if expected_bytes != elem_size {
          self.error(
            p,
            format!("{name}: {length} x {child_type} = {expected_bytes} bytes, declared {elem_size}"),
          );
        }
      }
    }
    Some(expected_end)
  }

  fn check_map(&mut self, name: &str, pos: usize, depth: usize) -> Option<usize> {
    let mut p = pos;
    let _flag = self.i32_at(p)?;
    p += 4;
    let (key_type, next) = self.nt_at(p)?;
    p = next;
    let _flag = self.i32_at(p)?;
    p += 4;
    let (val_type, next) = self.nt_at(p)?;
    p = next;
    let _index = self.i32_at(p)?;
    p += 4;
    let size = self.i32_at(p)?;
    p += 4;
    let _tag = self.u8_at(p)?;
    p += 1;
    if size < 0 {
      self.error(p, format!("{name}: negative size {size}"));
      return Some(p);
    }
    let expected_end = p + size as usize;
    self.trace(depth, format!("Map {name} [{key_type}->{val_type}] size={size}"));
    if expected_end > self.data.len() {
      self.error(p, format!("{name}: size {size} overflows file"));
      return Some(self.data.len());
    }
    Some(expected_end)
  }

  fn check_set(&mut self, name: &str, pos: usize, depth: usize) -> Option<usize> {
    let mut p = pos;
    let _flag = self.i32_at(p)?;
    p += 4;
    let (elem_type, next) = self.nt_at(p)?;
    p = next;
    let _index = self.i32_at(p)?;
    p += 4;
    let size = self.i32_at(p)?;
    p += 4;
    let _tag = self.u8_at(p)?;
    p += 1;
    if size < 0 {
      self.error(p, format!("{name}: negative size {size}"));
      return Some(p);
    }
    let expected_end = p + size as usize;
    self.trace(depth, format!("Set {name} [{elem_type}] size={size}"));
    if expected_end > self.data.len() {
      self.error(p, format!("{name}: size {size} overflows file"));
      return Some(self.data.len());
    }
    Some(expected_end)
  }

  fn check_bool(&mut self, name: &str, pos: usize, depth: usize) -> Option<usize> {
    let mut p = pos;
    let _index = self.i32_at(p)?;
    p += 4;
    let size = self.i32_at(p)?;
    p += 4;
    let value = self.u8_at(p)?;
    p += 1;
    if size != 0 {
      self.error(p, format!("BoolProperty {name}: size should be 0, got {size}"));
    }
    self.trace(depth, format!("Bool {name} = {value}"));
    Some(p)
  }

  fn check_simple(&mut self, name: &str, ptype: &str, pos: usize, depth: usize) -> Option<usize> {
    let mut p = pos;
    let _index = self.i32_at(p)?;
    p += 4;
    let size = self.i32_at(p)?;
    p += 4;
    let tag = self.u8_at(p)?;
    p += 1;
    if tag != 0 {
      let _extra = self.i32_at(p)?;
      p += 4;
    }
    self.trace(depth, format!("{ptype} {name} size={size}"));
    if size < 0 {
      self.error(p, format!("{name} ({ptype}): negative size {size}"));
      return Some(p);
    }
    let expected_end = p + size as usize;
    if expected_end > self.data.len() {
      self.error(p, format!("{name} ({ptype}): size {size} overflows file"));
      return Some(self.data.len());
    }
    let expected_widths: &[(&str, i32)] = &[
      ("IntProperty", 4),
      ("UInt32Property", 4),
      ("FloatProperty", 4),
      ("DoubleProperty", 8),
      ("Int64Property", 8),
      ("UInt64Property", 8),
      ("Int16Property", 2),
      ("UInt16Property", 2),
    ];
    if let Some((_, width)) = expected_widths.iter().find(|(t, _)| *t == ptype) {
      if size != *width {
        self.error(p, format!("{name} ({ptype}): expected size {width}, got {size}"));
      }
    }
    Some(expected_end)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::profile::PlayerProfile;
  use crate::property::*;

  fn sample_profile() -> PlayerProfile {
    let mut inner = PropertySet::new();
    inner.push(
      "Val",
      PropertyEntry::Simple(SimpleProperty {
        prop_type: PropertyType::Int,
        index: 0,
        size: 4,
        tag: 0,
        extra: None,
        value: PropertyValue::Int(7),
      }),
    );
    let mut data = PropertySet::new();
    data.push(
      "Score",
      PropertyEntry::Simple(SimpleProperty {
        prop_type: PropertyType::Int,
        index: 0,
        size: 4,
        tag: 0,
        extra: None,
        value: PropertyValue::Int(42),
      }),
    );
    data.push(
      "Items",
      PropertyEntry::Array(ArrayProperty {
        child_type: "StructProperty".to_string(),
        struct_name: Some("IntWrapper".to_string()),
        package: Some("/Script/ShooterGame".to_string()),
        index: 0,
        size: 0,
        tag: 0,
        has_separator: true,
        length: 0,
        elements: ArrayElements::Structs(vec![inner.clone(), inner]),
      }),
    );
    data.push(
      "Flags",
      PropertyEntry::Array(ArrayProperty {
        child_type: "IntProperty".to_string(),
        struct_name: None,
        package: None,
        index: 0,
        size: 0,
        tag: 0,
        has_separator: false,
        length: 0,
        elements: ArrayElements::Int(vec![1, 2, 3]),
      }),
    );
    data.push(
      "Hidden",
      PropertyEntry::Bool(BoolProperty { index: 0, value: 1 }),
    );
    let mut profile = PlayerProfile {
      name: "Survivor".to_string(),
      map_name: "TheIsland_WP".to_string(),
      ..PlayerProfile::default()
    };
    profile.data = data;
    profile.trailing = vec![0u8; 20];
    profile
  }

  #[test]
  fn serializer_output_verifies_clean() {
    let mut profile = sample_profile();
    let bytes = profile.to_bytes().unwrap();
    let report = verify_bytes(&bytes, true);
    assert!(report.is_ok(), "diagnostics: {:?}", report.diagnostics);
    assert_eq!(report.player_name.as_deref(), Some("Survivor"));
    assert_eq!(report.props_checked, 6); // 4 top-level + 2 array struct elements
    assert_eq!(report.trailing_len, 20);
    assert!(!report.trace.is_empty());
  }

  #[test]
  fn short_file_is_flagged() {
    let report = verify_bytes(&[0u8; 16], false);
    assert!(!report.is_ok());
  }

  #[test]
  fn wrong_version_is_flagged() {
    let mut profile = sample_profile();
    let mut bytes = profile.to_bytes().unwrap();
    bytes[12..16].copy_from_slice(&9i32.to_le_bytes());
    let report = verify_bytes(&bytes, false);
    assert!(report
      .diagnostics
      .iter()
      .any(|d| d.message.contains("unsupported version")));
  }

  #[test]
  fn fixed_width_size_mismatch_is_flagged() {
    let mut profile = sample_profile();
    let bytes = profile.to_bytes().unwrap();
    // Corrupt the declared size of the IntProperty "Score" from 4 to 6:
    // the size field sits after name, type and index.
    let needle = b"IntProperty\0";
    let type_pos = bytes
      .windows(needle.len())
      .position(|w| w == needle)
      .unwrap();
    let size_pos = type_pos + needle.len() + 4;
    let mut corrupt = bytes.clone();
    corrupt[size_pos..size_pos + 4].copy_from_slice(&6i32.to_le_bytes());
    let report = verify_bytes(&corrupt, false);
    assert!(report
      .diagnostics
      .iter()
      .any(|d| d.message.contains("expected size 4, got 6")));
  }

  #[test]
  fn bool_with_nonzero_size_is_flagged() {
    let mut profile = sample_profile();
    let bytes = profile.to_bytes().unwrap();
    let needle = b"Hidden\0";
    let name_pos = bytes
      .windows(needle.len())
      .position(|w| w == needle)
      .unwrap();
    // name, "BoolProperty" NT-string, index, then size
    let size_pos = name_pos + needle.len() + 4 + 13 + 4;
    let mut corrupt = bytes.clone();
    corrupt[size_pos..size_pos + 4].copy_from_slice(&1i32.to_le_bytes());
    let report = verify_bytes(&corrupt, false);
    assert!(report
      .diagnostics
      .iter()
      .any(|d| d.message.contains("size should be 0")));
  }

  #[test]
  fn odd_trailing_length_is_flagged() {
    let mut profile = sample_profile();
    profile.trailing = vec![0u8; 7];
    let bytes = profile.to_bytes().unwrap();
    let report = verify_bytes(&bytes, false);
    assert!(report
      .diagnostics
      .iter()
      .any(|d| d.message.contains("unexpected trailing data: 7 bytes")));
  }

  #[test]
  fn overflowing_declared_size_is_flagged() {
    let mut profile = sample_profile();
    let bytes = profile.to_bytes().unwrap();
    let needle = b"IntProperty\0";
    let type_pos = bytes
      .windows(needle.len())
      .position(|w| w == needle)
      .unwrap();
    let size_pos = type_pos + needle.len() + 4;
    let mut corrupt = bytes.clone();
    corrupt[size_pos..size_pos + 4].copy_from_slice(&100_000i32.to_le_bytes());
    let report = verify_bytes(&corrupt, false);
    assert!(report
      .diagnostics
      .iter()
      .any(|d| d.message.contains("overflows file")));
  }
}
