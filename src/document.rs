//! Maps the property tree to and from a JSON-shaped document. Byte ranges
//! become lowercase hex strings, non-finite floats are tagged with their
//! IEEE-754 bits, and duplicate (indexed) property names become JSON arrays.
//! Entries keep their meta fields so an unmodified document rebuilds the
//! original file byte-exact.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::errors::ProfileError;
use crate::profile::PlayerProfile;
use crate::property::*;
use crate::Result;

const SPECIAL_FLOAT_KEY: &str = "__special_float__";

fn doc_err(msg: impl Into<String>) -> ProfileError {
  ProfileError::Document(msg.into())
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
  let mut out = String::with_capacity(bytes.len() * 2);
  for b in bytes {
    out.push_str(&format!("{b:02x}"));
  }
  out
}

pub(crate) fn from_hex(s: &str) -> Result<Vec<u8>> {
  if s.len() % 2 != 0 {
    return Err(doc_err(format!("odd-length hex string: {s:?}")));
  }
  let mut out = Vec::with_capacity(s.len() / 2);
  for i in (0..s.len()).step_by(2) {
    let pair = s
      .get(i..i + 2)
      .ok_or_else(|| doc_err(format!("invalid hex string: {s:?}")))?;
    let byte =
      u8::from_str_radix(pair, 16).map_err(|_| doc_err(format!("invalid hex string: {s:?}")))?;
    out.push(byte);
  }
  Ok(out)
}

/// Converts a profile into its document form.
pub fn to_document(profile: &PlayerProfile) -> Value {
  json!({
    "header": {
      "file_type": profile.file_type,
      "name": profile.name,
      "controller": profile.controller,
      "game_mode": profile.game_mode,
      "map_name": profile.map_name,
      "map_path": profile.map_path,
      "version": profile.version,
      "guid": to_hex(&profile.guid),
      "header_v1": profile.header_v1,
      "header_v2": profile.header_v2,
      "header_v3": profile.header_v3,
      "header_size": profile.header_size,
      "trailing_data": to_hex(&profile.trailing),
    },
    "data": set_to_value(&profile.data),
  })
}

/// Rebuilds a profile from its document form. Malformed documents are a
/// fatal error; nothing is guessed.
pub fn from_document(doc: &Value) -> Result<PlayerProfile> {
  let root = doc
    .as_object()
    .ok_or_else(|| doc_err("document root must be an object"))?;

  let header_value = root.get("header").cloned().unwrap_or_else(|| json!({}));
  let header: DocumentHeader = serde_json::from_value(header_value)
    .map_err(|e| doc_err(format!("bad header: {e}")))?;

  let mut guid = [0u8; 16];
  if !header.guid.is_empty() {
    let bytes = from_hex(&header.guid)?;
    if bytes.len() != 16 {
      return Err(doc_err(format!("guid must be 16 bytes, got {}", bytes.len())));
    }
    guid.copy_from_slice(&bytes);
  }

  let trailing = if header.trailing_data.is_empty() {
    // Default trailer: i32(0) followed by the GUID
    let mut t = vec![0u8; 4];
    t.extend_from_slice(&guid);
    t
  } else {
    from_hex(&header.trailing_data)?
  };

  let data = match root.get("data") {
    Some(v) => value_to_set(v)?,
    None => PropertySet::new(),
  };

  Ok(PlayerProfile {
    header_v1: header.header_v1,
    header_v2: header.header_v2,
    header_v3: header.header_v3,
    version: header.version,
    guid,
    file_type: header.file_type,
    name: header.name,
    controller: header.controller,
    game_mode: header.game_mode,
    map_name: header.map_name,
    map_path: header.map_path,
    header_size: header.header_size,
    data,
    trailing,
  })
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DocumentHeader {
  file_type: String,
  name: String,
  controller: String,
  game_mode: String,
  map_name: String,
  map_path: String,
  version: i32,
  guid: String,
  header_v1: i32,
  header_v2: i32,
  header_v3: i32,
  header_size: i32,
  trailing_data: String,
}

impl Default for DocumentHeader {
  fn default() -> Self {
    DocumentHeader {
      file_type: String::new(),
      name: String::new(),
      controller: String::new(),
      game_mode: "PersistentLevel".to_string(),
      map_name: String::new(),
      map_path: String::new(),
      version: 1,
      guid: String::new(),
      header_v1: 0,
      header_v2: 0,
      header_v3: 0,
      header_size: 0,
      trailing_data: String::new(),
    }
  }
}

// ---------------------------------------------------------------------------
// tree -> document
// ---------------------------------------------------------------------------

fn set_to_value(set: &PropertySet) -> Value {
  let mut map = Map::new();
  for (name, entry) in set.iter() {
    let value = entry_to_value(entry);
    match map.get_mut(name) {
      None => {
        map.insert(name.clone(), value);
      }
      // A repeated name is an indexed property: entries collect into an
      // array in on-disk order
      Some(Value::Array(list)) => list.push(value),
      Some(existing) => {
        let first = existing.take();
        *existing = Value::Array(vec![first, value]);
      }
    }
  }
  Value::Object(map)
}

fn f64_value(v: f64) -> Value {
  if v.is_finite() {
    json!(v)
  } else {
    let mut obj = Map::new();
    obj.insert(
      SPECIAL_FLOAT_KEY.to_string(),
      Value::String(to_hex(&v.to_le_bytes())),
    );
    Value::Object(obj)
  }
}

fn f32_value(v: f32) -> Value {
  f64_value(v as f64)
}

fn entry_to_value(entry: &PropertyEntry) -> Value {
  match entry {
    PropertyEntry::Struct(p) => {
      let mut obj = Map::new();
      obj.insert("_type".into(), json!("StructProperty"));
      obj.insert("_struct".into(), json!(p.struct_name));
      obj.insert("_package".into(), json!(p.package));
      obj.insert("_index".into(), json!(p.index));
      obj.insert("_size".into(), json!(p.size));
      obj.insert("_tag".into(), json!(p.tag));
      obj.insert("data".into(), set_to_value(&p.data));
      if let Some(raw) = &p.raw {
        obj.insert("raw".into(), json!(to_hex(raw)));
      }
      Value::Object(obj)
    }
    PropertyEntry::Array(p) => json!({
      "_type": "ArrayProperty",
      "_child_type": p.child_type,
      "_struct": p.struct_name,
      "_package": p.package,
      "_index": p.index,
      "_size": p.size,
      "_tag": p.tag,
      "_has_sep": p.has_separator,
      "length": p.length,
      "value": elements_to_value(&p.elements),
    }),
    PropertyEntry::Map(p) => json!({
      "_type": "MapProperty",
      "_key_type": p.key_type,
      "_val_type": p.val_type,
      "_index": p.index,
      "_size": p.size,
      "_tag": p.tag,
      "raw": to_hex(&p.raw),
    }),
    PropertyEntry::Set(p) => match &p.content {
      SetContent::Names(names) => json!({
        "_type": "SetProperty",
        "_elem_type": p.elem_type,
        "_index": p.index,
        "_size": p.size,
        "_tag": p.tag,
        "value": names,
      }),
      SetContent::Raw(raw) => json!({
        "_type": "SetProperty",
        "_elem_type": p.elem_type,
        "_index": p.index,
        "_size": p.size,
        "_tag": p.tag,
        "raw": to_hex(raw),
      }),
    },
    PropertyEntry::Bool(p) => json!({
      "_type": "BoolProperty",
      "_index": p.index,
      "_size": 0,
      "value": p.value,
    }),
    PropertyEntry::Simple(p) => json!({
      "_type": p.prop_type.to_string(),
      "_index": p.index,
      "_size": p.size,
      "_tag": p.tag,
      "_extra": p.extra,
      "value": simple_value_to_value(&p.value),
    }),
  }
}

fn elements_to_value(elements: &ArrayElements) -> Value {
  match elements {
    ArrayElements::Structs(sets) => Value::Array(sets.iter().map(set_to_value).collect()),
    ArrayElements::Int16(v) => json!(v),
    ArrayElements::UInt16(v) => json!(v),
    ArrayElements::Int(v) => json!(v),
    ArrayElements::UInt32(v) => json!(v),
    ArrayElements::Int64(v) => json!(v),
    ArrayElements::UInt64(v) => json!(v),
    ArrayElements::Float(v) => Value::Array(v.iter().map(|x| f32_value(*x)).collect()),
    ArrayElements::Double(v) => Value::Array(v.iter().map(|x| f64_value(*x)).collect()),
    ArrayElements::Byte(v) => json!(v),
    ArrayElements::Bool(v) => json!(v),
    ArrayElements::Strings(v) => json!(v),
    ArrayElements::Objects(v) => json!(v),
    ArrayElements::SoftObjects(v) => Value::Array(
      v.iter()
        .map(|p| json!({ "package": p.package, "asset": p.asset, "sub_path": p.sub_path }))
        .collect(),
    ),
    // Opaque payload: a single hex string, not a list
    ArrayElements::Raw(bytes) => json!(to_hex(bytes)),
  }
}

fn simple_value_to_value(value: &PropertyValue) -> Value {
  match value {
    PropertyValue::Int16(v) => json!(v),
    PropertyValue::UInt16(v) => json!(v),
    PropertyValue::Int(v) => json!(v),
    PropertyValue::UInt32(v) => json!(v),
    PropertyValue::Int64(v) => json!(v),
    PropertyValue::UInt64(v) => json!(v),
    PropertyValue::Float(v) => f32_value(*v),
    PropertyValue::Double(v) => f64_value(*v),
    PropertyValue::String(s) => json!(s),
    PropertyValue::Byte(b) => json!(b),
    PropertyValue::Bytes(b) => json!(to_hex(b)),
    PropertyValue::Object(o) => match o {
      ObjectRef::Null | ObjectRef::IndexedNull => Value::Null,
      ObjectRef::Index(v) => json!(v),
      ObjectRef::Path(p) => json!(p),
      ObjectRef::Opaque(b) => json!(to_hex(b)),
    },
    PropertyValue::SoftObject(p) => {
      json!({ "package": p.package, "asset": p.asset, "sub_path": p.sub_path })
    }
  }
}

// ---------------------------------------------------------------------------
// document -> tree
// ---------------------------------------------------------------------------

fn value_to_set(v: &Value) -> Result<PropertySet> {
  let obj = v
    .as_object()
    .ok_or_else(|| doc_err("property set must be an object"))?;
  let mut set = PropertySet::new();
  for (name, value) in obj {
    match value {
      // An array under a name is the indexed-duplicate form
      Value::Array(list) => {
        for item in list {
          set.push(name.clone(), value_to_entry(item)?);
        }
      }
      _ => set.push(name.clone(), value_to_entry(value)?),
    }
  }
  Ok(set)
}

fn get_i32(obj: &Map<String, Value>, key: &str) -> i32 {
  obj.get(key).and_then(Value::as_i64).unwrap_or(0) as i32
}

fn get_u8(obj: &Map<String, Value>, key: &str) -> u8 {
  obj.get(key).and_then(Value::as_u64).unwrap_or(0) as u8
}

fn get_string(obj: &Map<String, Value>, key: &str) -> String {
  obj
    .get(key)
    .and_then(Value::as_str)
    .unwrap_or_default()
    .to_string()
}

fn get_opt_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
  obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn value_to_f64(v: &Value) -> Result<f64> {
  if let Some(obj) = v.as_object() {
    if let Some(Value::String(hex)) = obj.get(SPECIAL_FLOAT_KEY) {
      let bytes = from_hex(hex)?;
      let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| doc_err("special float must be 8 bytes"))?;
      return Ok(f64::from_le_bytes(arr));
    }
  }
  v.as_f64()
    .ok_or_else(|| doc_err(format!("expected a number, got {v}")))
}

fn value_to_entry(v: &Value) -> Result<PropertyEntry> {
  let obj = v
    .as_object()
    .ok_or_else(|| doc_err(format!("property entry must be an object, got {v}")))?;
  let type_name = obj
    .get("_type")
    .and_then(Value::as_str)
    .ok_or_else(|| doc_err("property entry is missing _type"))?;

  let entry = match type_name {
    "StructProperty" => {
      let raw = match obj.get("raw") {
        Some(Value::String(hex)) => Some(from_hex(hex)?),
        _ => None,
      };
      let data = match obj.get("data") {
        Some(d) => value_to_set(d)?,
        None => PropertySet::new(),
      };
      PropertyEntry::Struct(StructProperty {
        struct_name: get_string(obj, "_struct"),
        package: get_string(obj, "_package"),
        index: get_i32(obj, "_index"),
        size: get_i32(obj, "_size"),
        tag: get_u8(obj, "_tag"),
        data,
        raw,
      })
    }
    "ArrayProperty" => {
      let child_type = get_string(obj, "_child_type");
      let length = get_i32(obj, "length");
      let elements = match obj.get("value") {
        Some(value) => elements_from_value(&child_type, value)?,
        None => ArrayElements::empty_for(&child_type),
      };
      PropertyEntry::Array(ArrayProperty {
        struct_name: get_opt_string(obj, "_struct"),
        package: get_opt_string(obj, "_package"),
        index: get_i32(obj, "_index"),
        size: get_i32(obj, "_size"),
        tag: get_u8(obj, "_tag"),
        has_separator: obj.get("_has_sep").and_then(Value::as_bool).unwrap_or(true),
        length,
        elements,
        child_type,
      })
    }
    "MapProperty" => PropertyEntry::Map(MapProperty {
      key_type: get_string(obj, "_key_type"),
      val_type: get_string(obj, "_val_type"),
      index: get_i32(obj, "_index"),
      size: get_i32(obj, "_size"),
      tag: get_u8(obj, "_tag"),
      raw: match obj.get("raw") {
        Some(Value::String(hex)) => from_hex(hex)?,
        _ => Vec::new(),
      },
    }),
    "SetProperty" => {
      let content = if let Some(Value::Array(list)) = obj.get("value") {
        let names = list
          .iter()
          .map(|n| {
            n.as_str()
              .map(str::to_string)
              .ok_or_else(|| doc_err("set names must be strings"))
          })
          .collect::<Result<Vec<String>>>()?;
        SetContent::Names(names)
      } else if let Some(Value::String(hex)) = obj.get("raw") {
        SetContent::Raw(from_hex(hex)?)
      } else {
        SetContent::Raw(Vec::new())
      };
      PropertyEntry::Set(SetProperty {
        elem_type: get_string(obj, "_elem_type"),
        index: get_i32(obj, "_index"),
        size: get_i32(obj, "_size"),
        tag: get_u8(obj, "_tag"),
        content,
      })
    }
    "BoolProperty" => PropertyEntry::Bool(BoolProperty {
      index: get_i32(obj, "_index"),
      value: get_u8(obj, "value"),
    }),
    other => {
      let prop_type: PropertyType = other
        .parse()
        .map_err(|_| doc_err(format!("unknown property type {other:?}")))?;
      let size = get_i32(obj, "_size");
      let value = simple_value_from_value(
        prop_type,
        size,
        obj.get("value").unwrap_or(&Value::Null),
      )?;
      PropertyEntry::Simple(SimpleProperty {
        prop_type,
        index: get_i32(obj, "_index"),
        size,
        tag: get_u8(obj, "_tag"),
        extra: obj.get("_extra").and_then(Value::as_i64).map(|v| v as i32),
        value,
      })
    }
  };
  Ok(entry)
}

fn elements_from_value(child_type: &str, v: &Value) -> Result<ArrayElements> {
  // Opaque payloads serialize as a single hex string
  if let Value::String(hex) = v {
    return Ok(ArrayElements::Raw(from_hex(hex)?));
  }
  let list = v
    .as_array()
    .ok_or_else(|| doc_err(format!("array value must be a list or hex string, got {v}")))?;

  macro_rules! numbers {
    ($variant:ident, $convert:expr) => {{
      let values = list
        .iter()
        .map($convert)
        .collect::<Result<Vec<_>>>()?;
      Ok(ArrayElements::$variant(values))
    }};
  }

  let int = |v: &Value| {
    v.as_i64()
      .ok_or_else(|| doc_err(format!("expected an integer, got {v}")))
  };

  match child_type.parse::<PropertyType>() {
    Ok(PropertyType::Struct) => {
      let sets = list.iter().map(value_to_set).collect::<Result<Vec<_>>>()?;
      Ok(ArrayElements::Structs(sets))
    }
    Ok(PropertyType::Int16) => numbers!(Int16, |x| int(x).map(|v| v as i16)),
    Ok(PropertyType::UInt16) => numbers!(UInt16, |x| int(x).map(|v| v as u16)),
    Ok(PropertyType::Int) => numbers!(Int, |x| int(x).map(|v| v as i32)),
    Ok(PropertyType::UInt32) => numbers!(UInt32, |x| int(x).map(|v| v as u32)),
    Ok(PropertyType::Int64) => numbers!(Int64, int),
    Ok(PropertyType::UInt64) => numbers!(UInt64, |x: &Value| {
      x.as_u64()
        .ok_or_else(|| doc_err(format!("expected an unsigned integer, got {x}")))
    }),
    Ok(PropertyType::Float) => numbers!(Float, |x: &Value| value_to_f64(x).map(|v| v as f32)),
    Ok(PropertyType::Double) => numbers!(Double, value_to_f64),
    Ok(PropertyType::Byte) => numbers!(Byte, |x| int(x).map(|v| v as u8)),
    Ok(PropertyType::Bool) => numbers!(Bool, |x| int(x).map(|v| v as u8)),
    Ok(PropertyType::Str) | Ok(PropertyType::Name) => {
      let values = list
        .iter()
        .map(|x| {
          x.as_str()
            .map(str::to_string)
            .ok_or_else(|| doc_err("array strings must be strings"))
        })
        .collect::<Result<Vec<_>>>()?;
      Ok(ArrayElements::Strings(values))
    }
    Ok(PropertyType::Object) => {
      let values = list
        .iter()
        .map(|x| {
          x.as_str()
            .map(str::to_string)
            .ok_or_else(|| doc_err("object references must be strings"))
        })
        .collect::<Result<Vec<_>>>()?;
      Ok(ArrayElements::Objects(values))
    }
    Ok(PropertyType::SoftObject) => {
      let values = list
        .iter()
        .map(|x| {
          serde_json::from_value::<SoftObjectPath>(x.clone())
            .map_err(|e| doc_err(format!("bad soft object path: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;
      Ok(ArrayElements::SoftObjects(values))
    }
    _ => Err(doc_err(format!(
      "array of {child_type:?} must carry a hex payload"
    ))),
  }
}

fn simple_value_from_value(prop_type: PropertyType, size: i32, v: &Value) -> Result<PropertyValue> {
  let int = |v: &Value| {
    v.as_i64()
      .ok_or_else(|| doc_err(format!("expected an integer, got {v}")))
  };
  let value = match prop_type {
    PropertyType::Int16 => PropertyValue::Int16(int(v)? as i16),
    PropertyType::UInt16 => PropertyValue::UInt16(int(v)? as u16),
    PropertyType::Int => PropertyValue::Int(int(v)? as i32),
    PropertyType::UInt32 => PropertyValue::UInt32(int(v)? as u32),
    PropertyType::Int64 => PropertyValue::Int64(int(v)?),
    PropertyType::UInt64 => PropertyValue::UInt64(
      v.as_u64()
        .ok_or_else(|| doc_err(format!("expected an unsigned integer, got {v}")))?,
    ),
    PropertyType::Float => PropertyValue::Float(value_to_f64(v)? as f32),
    PropertyType::Double => PropertyValue::Double(value_to_f64(v)?),
    PropertyType::Str | PropertyType::Name => PropertyValue::String(
      v.as_str()
        .ok_or_else(|| doc_err(format!("expected a string, got {v}")))?
        .to_string(),
    ),
    PropertyType::Byte => match v {
      Value::Number(_) => PropertyValue::Byte(int(v)? as u8),
      Value::String(hex) => PropertyValue::Bytes(from_hex(hex)?),
      _ => return Err(doc_err(format!("byte value must be an integer or hex, got {v}"))),
    },
    PropertyType::Object => PropertyValue::Object(object_ref_from_value(size, v)?),
    PropertyType::SoftObject => PropertyValue::SoftObject(
      serde_json::from_value(v.clone())
        .map_err(|e| doc_err(format!("bad soft object path: {e}")))?,
    ),
    other => return Err(doc_err(format!("{other} is not a simple property type"))),
  };
  Ok(value)
}

/// Rebuilds an object reference from its document form. The two null
/// encodings both serialize as JSON null, so the recorded size picks the
/// wide one back out; a string is a blueprint path unless its hex decoding
/// matches the recorded size exactly.
fn object_ref_from_value(size: i32, v: &Value) -> Result<ObjectRef> {
  let obj = match v {
    Value::Null => {
      if size == 8 {
        ObjectRef::IndexedNull
      } else {
        ObjectRef::Null
      }
    }
    Value::Number(n) => ObjectRef::Index(
      n.as_i64()
        .ok_or_else(|| doc_err(format!("bad object index {n}")))? as i32,
    ),
    Value::String(s) => {
      let path_size = 4 + 4 + s.len() as i32 + 1;
      if path_size == size {
        ObjectRef::Path(s.clone())
      } else if s.len() as i32 == size * 2 {
        match from_hex(s) {
          Ok(bytes) => ObjectRef::Opaque(bytes),
          Err(_) => ObjectRef::Path(s.clone()),
        }
      } else {
        ObjectRef::Path(s.clone())
      }
    }
    other => return Err(doc_err(format!("bad object reference {other}"))),
  };
  Ok(obj)
}
