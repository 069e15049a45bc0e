use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
  #[error("Read error: {0}")]
  Read(#[from] io::Error),

  #[error("Unsupported profile version: {0} (expected {1})")]
  UnsupportedVersion(i32, i32),

  #[error("File too short for profile header")]
  TruncatedHeader,

  #[error("String length {0} exceeds remaining {1} bytes")]
  StringOverflow(u32, u64),

  #[error("Requested {0} bytes with only {1} remaining")]
  ByteOverflow(usize, u64),

  #[error("String is not ASCII-encodable: {0:?}")]
  NonAsciiString(String),

  #[error("Negative declared size: {0}")]
  NegativeSize(i32),

  #[error("Property boundary error: {0}")]
  PropertyBoundary(String),

  #[error("Unknown property type: {0}")]
  UnknownPropertyType(String),

  #[error("Value decode error: {0}")]
  ValueDecode(String),

  #[error("Malformed document: {0}")]
  Document(String),
}
