use std::fs;
use std::io::{self, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::errors::ProfileError;
use crate::property::PropertySet;
use crate::{ReadProfileBytes, Result, WriteProfileBytes, SUPPORTED_VERSION};

/// The smallest byte count a well-formed envelope can occupy.
const MIN_FILE_LEN: usize = 50;

/// An in-memory `PlayerLocalData.arkprofile` file: the fixed header, the
/// parsed property tree, and the opaque trailing region.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerProfile {
  pub header_v1: i32,
  pub header_v2: i32,
  pub header_v3: i32,
  pub version: i32,
  pub guid: [u8; 16],
  pub file_type: String,
  pub name: String,
  pub controller: String,
  pub game_mode: String,
  pub map_name: String,
  pub map_path: String,
  pub header_size: i32,
  pub data: PropertySet,
  /// Bytes after the property section, preserved verbatim (commonly an i32
  /// plus a 16-byte GUID).
  pub trailing: Vec<u8>,
}

impl Default for PlayerProfile {
  fn default() -> Self {
    PlayerProfile {
      header_v1: 0,
      header_v2: 0,
      header_v3: 0,
      version: SUPPORTED_VERSION,
      guid: [0u8; 16],
      file_type: String::new(),
      name: String::new(),
      controller: String::new(),
      game_mode: "PersistentLevel".to_string(),
      map_name: String::new(),
      map_path: String::new(),
      header_size: 0,
      data: PropertySet::new(),
      trailing: Vec::new(),
    }
  }
}

impl PlayerProfile {
  /// Reads and parses the file at `path`.
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
    let bytes = fs::read(path)?;
    Self::from_bytes(&bytes)
  }

  /// Parses a complete profile from `bytes`.
  pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
    if bytes.len() < MIN_FILE_LEN {
      return Err(ProfileError::TruncatedHeader);
    }
    let mut cursor = io::Cursor::new(bytes);

    let header_v1 = cursor.read_i32::<LittleEndian>()?;
    let header_v2 = cursor.read_i32::<LittleEndian>()?;
    let header_v3 = cursor.read_i32::<LittleEndian>()?;
    let version = cursor.read_i32::<LittleEndian>()?;
    if version != SUPPORTED_VERSION {
      return Err(ProfileError::UnsupportedVersion(version, SUPPORTED_VERSION));
    }

    let guid = cursor.read_guid()?;
    let file_type = cursor.read_nt_string::<LittleEndian>()?;
    let _zero = cursor.read_i32::<LittleEndian>()?;
    let _five = cursor.read_i32::<LittleEndian>()?;
    let name = cursor.read_nt_string::<LittleEndian>()?;
    let controller = cursor.read_nt_string::<LittleEndian>()?;
    let game_mode = cursor.read_nt_string::<LittleEndian>()?;
    let map_name = cursor.read_nt_string::<LittleEndian>()?;
    let map_path = cursor.read_nt_string::<LittleEndian>()?;
    let _pad = cursor.read_bytes(12)?;
    let header_size = cursor.read_i32::<LittleEndian>()?;
    let _zero = cursor.read_i32::<LittleEndian>()?;
    let _separator = cursor.read_u8()?;

    debug!("Reading properties for '{name}' (map '{map_name}')");
    let data = cursor.read_property_set::<LittleEndian>(None)?;

    let pos = cursor.position() as usize;
    let trailing = if pos < bytes.len() {
      bytes[pos..].to_vec()
    } else {
      Vec::new()
    };
    debug!("Captured {} trailing bytes", trailing.len());

    Ok(PlayerProfile {
      header_v1,
      header_v2,
      header_v3,
      version,
      guid,
      file_type,
      name,
      controller,
      game_mode,
      map_name,
      map_path,
      header_size,
      data,
      trailing,
    })
  }

  /// Serializes the profile. Every declared size and length is recalculated
  /// from the current tree first; stale fields are never trusted.
  pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
    self.data.recalculate_sizes()?;

    let mut buf: Vec<u8> = Vec::new();
    buf.write_i32::<LittleEndian>(self.header_v1)?;
    buf.write_i32::<LittleEndian>(self.header_v2)?;
    buf.write_i32::<LittleEndian>(self.header_v3)?;
    buf.write_i32::<LittleEndian>(self.version)?;
    buf.write_all(&self.guid)?;
    buf.write_nt_string::<LittleEndian>(&self.file_type)?;
    buf.write_i32::<LittleEndian>(0)?;
    buf.write_i32::<LittleEndian>(5)?;
    buf.write_nt_string::<LittleEndian>(&self.name)?;
    buf.write_nt_string::<LittleEndian>(&self.controller)?;
    buf.write_nt_string::<LittleEndian>(&self.game_mode)?;
    buf.write_nt_string::<LittleEndian>(&self.map_name)?;
    buf.write_nt_string::<LittleEndian>(&self.map_path)?;
    buf.write_all(&[0u8; 12])?;
    buf.write_i32::<LittleEndian>(self.header_size)?;
    buf.write_i32::<LittleEndian>(0)?;
    buf.write_u8(0)?; // separator before the property section

    buf.write_property_set::<LittleEndian>(&self.data, true)?;
    buf.write_all(&self.trailing)?;
    Ok(buf)
  }

  /// Recalculates sizes and writes the profile to `path`.
  pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
    let bytes = self.to_bytes()?;
    fs::write(path, bytes)?;
    Ok(())
  }
}
