//! Self-describing tagged binary encoding shared by the WAL and snapshot
//! formats. Unknown tags decode to a clean durability error, which replay
//! treats as the end of usable data.

use std::collections::BTreeMap;

use crate::error::{Result, StorageError};
use crate::ids::Gid;
use crate::model::PropertyValue;

use super::hashed_file::HashedFileReader;

const TAG_NULL: u8 = 0x00;
const TAG_FALSE: u8 = 0x01;
const TAG_TRUE: u8 = 0x02;
const TAG_INT: u8 = 0x03;
const TAG_DOUBLE: u8 = 0x04;
const TAG_STRING: u8 = 0x05;
const TAG_LIST: u8 = 0x06;
const TAG_MAP: u8 = 0x07;
const TAG_VERTEX: u8 = 0x10;
const TAG_EDGE: u8 = 0x11;

/// Sanity limit on decoded strings and collections; anything larger is
/// treated as corruption.
const MAX_DECODED_LEN: u32 = 1 << 26;

/// Byte stream the decoder pulls from: a hashed file during recovery or a
/// WAL frame slice.
pub trait ByteSource {
    fn read_exact_bytes(&mut self, buf: &mut [u8]) -> Result<()>;
}

impl ByteSource for HashedFileReader {
    fn read_exact_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.read_hashed(buf)
    }
}

pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl ByteSource for SliceSource<'_> {
    fn read_exact_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            return Err(StorageError::Durability("truncated value".into()));
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }
}

pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_string(out: &mut Vec<u8>, value: &str) {
    write_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

pub fn write_gid(out: &mut Vec<u8>, gid: Gid) {
    write_u64(out, gid.as_raw());
}

pub fn read_u8(src: &mut impl ByteSource) -> Result<u8> {
    let mut buf = [0u8; 1];
    src.read_exact_bytes(&mut buf)?;
    Ok(buf[0])
}

pub fn read_u32(src: &mut impl ByteSource) -> Result<u32> {
    let mut buf = [0u8; 4];
    src.read_exact_bytes(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

pub fn read_u64(src: &mut impl ByteSource) -> Result<u64> {
    let mut buf = [0u8; 8];
    src.read_exact_bytes(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

pub fn read_i64(src: &mut impl ByteSource) -> Result<i64> {
    let mut buf = [0u8; 8];
    src.read_exact_bytes(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

pub fn read_string(src: &mut impl ByteSource) -> Result<String> {
    let len = read_u32(src)?;
    if len > MAX_DECODED_LEN {
        return Err(StorageError::Durability("string length out of range".into()));
    }
    let mut buf = vec![0u8; len as usize];
    src.read_exact_bytes(&mut buf)?;
    String::from_utf8(buf).map_err(|_| StorageError::Durability("invalid utf-8".into()))
}

pub fn read_gid(src: &mut impl ByteSource) -> Result<Gid> {
    Ok(Gid::from_raw(read_u64(src)?))
}

pub fn write_value(out: &mut Vec<u8>, value: &PropertyValue) {
    match value {
        PropertyValue::Null => write_u8(out, TAG_NULL),
        PropertyValue::Bool(false) => write_u8(out, TAG_FALSE),
        PropertyValue::Bool(true) => write_u8(out, TAG_TRUE),
        PropertyValue::Int(v) => {
            write_u8(out, TAG_INT);
            write_i64(out, *v);
        }
        PropertyValue::Double(v) => {
            write_u8(out, TAG_DOUBLE);
            write_u64(out, v.to_bits());
        }
        PropertyValue::String(v) => {
            write_u8(out, TAG_STRING);
            write_string(out, v);
        }
        PropertyValue::List(items) => {
            write_u8(out, TAG_LIST);
            write_u32(out, items.len() as u32);
            for item in items {
                write_value(out, item);
            }
        }
        PropertyValue::Map(entries) => {
            write_u8(out, TAG_MAP);
            write_u32(out, entries.len() as u32);
            for (key, item) in entries {
                write_string(out, key);
                write_value(out, item);
            }
        }
    }
}

pub fn read_value(src: &mut impl ByteSource) -> Result<PropertyValue> {
    match read_u8(src)? {
        TAG_NULL => Ok(PropertyValue::Null),
        TAG_FALSE => Ok(PropertyValue::Bool(false)),
        TAG_TRUE => Ok(PropertyValue::Bool(true)),
        TAG_INT => Ok(PropertyValue::Int(read_i64(src)?)),
        TAG_DOUBLE => Ok(PropertyValue::Double(f64::from_bits(read_u64(src)?))),
        TAG_STRING => Ok(PropertyValue::String(read_string(src)?)),
        TAG_LIST => {
            let count = read_u32(src)?;
            if count > MAX_DECODED_LEN {
                return Err(StorageError::Durability("list length out of range".into()));
            }
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(read_value(src)?);
            }
            Ok(PropertyValue::List(items))
        }
        TAG_MAP => {
            let count = read_u32(src)?;
            if count > MAX_DECODED_LEN {
                return Err(StorageError::Durability("map length out of range".into()));
            }
            let mut entries = BTreeMap::new();
            for _ in 0..count {
                let key = read_string(src)?;
                entries.insert(key, read_value(src)?);
            }
            Ok(PropertyValue::Map(entries))
        }
        tag => Err(StorageError::Durability(format!("unknown value tag {tag:#04x}"))),
    }
}

/// Vertex as serialized into snapshots: names instead of process-local ids.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedVertex {
    pub gid: Gid,
    pub labels: Vec<String>,
    pub properties: Vec<(String, PropertyValue)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEdge {
    pub gid: Gid,
    pub from: Gid,
    pub to: Gid,
    pub edge_type: String,
    pub properties: Vec<(String, PropertyValue)>,
}

pub fn write_vertex(out: &mut Vec<u8>, vertex: &DecodedVertex) {
    write_u8(out, TAG_VERTEX);
    write_gid(out, vertex.gid);
    write_u32(out, vertex.labels.len() as u32);
    for label in &vertex.labels {
        write_string(out, label);
    }
    write_u32(out, vertex.properties.len() as u32);
    for (key, value) in &vertex.properties {
        write_string(out, key);
        write_value(out, value);
    }
}

pub fn read_vertex(src: &mut impl ByteSource) -> Result<DecodedVertex> {
    let tag = read_u8(src)?;
    if tag != TAG_VERTEX {
        return Err(StorageError::Durability(format!(
            "expected vertex tag, found {tag:#04x}"
        )));
    }
    let gid = read_gid(src)?;
    let label_count = read_u32(src)?;
    if label_count > MAX_DECODED_LEN {
        return Err(StorageError::Durability("label count out of range".into()));
    }
    let mut labels = Vec::with_capacity(label_count as usize);
    for _ in 0..label_count {
        labels.push(read_string(src)?);
    }
    let properties = read_property_pairs(src)?;
    Ok(DecodedVertex {
        gid,
        labels,
        properties,
    })
}

pub fn write_edge(out: &mut Vec<u8>, edge: &DecodedEdge) {
    write_u8(out, TAG_EDGE);
    write_gid(out, edge.gid);
    write_gid(out, edge.from);
    write_gid(out, edge.to);
    write_string(out, &edge.edge_type);
    write_u32(out, edge.properties.len() as u32);
    for (key, value) in &edge.properties {
        write_string(out, key);
        write_value(out, value);
    }
}

pub fn read_edge(src: &mut impl ByteSource) -> Result<DecodedEdge> {
    let tag = read_u8(src)?;
    if tag != TAG_EDGE {
        return Err(StorageError::Durability(format!(
            "expected edge tag, found {tag:#04x}"
        )));
    }
    let gid = read_gid(src)?;
    let from = read_gid(src)?;
    let to = read_gid(src)?;
    let edge_type = read_string(src)?;
    let properties = read_property_pairs(src)?;
    Ok(DecodedEdge {
        gid,
        from,
        to,
        edge_type,
        properties,
    })
}

fn read_property_pairs(src: &mut impl ByteSource) -> Result<Vec<(String, PropertyValue)>> {
    let count = read_u32(src)?;
    if count > MAX_DECODED_LEN {
        return Err(StorageError::Durability("property count out of range".into()));
    }
    let mut pairs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key = read_string(src)?;
        pairs.push((key, read_value(src)?));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_round_trip() {
        let value = PropertyValue::Map(
            [
                ("flag".to_owned(), PropertyValue::Bool(true)),
                ("n".to_owned(), PropertyValue::Int(-3)),
                ("x".to_owned(), PropertyValue::Double(1.5)),
                (
                    "items".to_owned(),
                    PropertyValue::List(vec![PropertyValue::Null, "s".into()]),
                ),
            ]
            .into_iter()
            .collect(),
        );
        let mut buf = Vec::new();
        write_value(&mut buf, &value);
        let decoded = read_value(&mut SliceSource::new(&buf)).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn unknown_tag_is_a_clean_error() {
        let buf = [0x7f_u8];
        let err = read_value(&mut SliceSource::new(&buf)).unwrap_err();
        assert!(matches!(err, StorageError::Durability(_)));
    }

    #[test]
    fn truncated_value_is_a_clean_error() {
        let mut buf = Vec::new();
        write_value(&mut buf, &PropertyValue::Int(42));
        let err = read_value(&mut SliceSource::new(&buf[..4])).unwrap_err();
        assert!(matches!(err, StorageError::Durability(_)));
    }

    #[test]
    fn vertex_and_edge_round_trip() {
        let vertex = DecodedVertex {
            gid: Gid::new(1, 7),
            labels: vec!["Person".into()],
            properties: vec![("age".into(), PropertyValue::Int(30))],
        };
        let mut buf = Vec::new();
        write_vertex(&mut buf, &vertex);
        assert_eq!(read_vertex(&mut SliceSource::new(&buf)).unwrap(), vertex);

        let edge = DecodedEdge {
            gid: Gid::new(1, 8),
            from: Gid::new(1, 7),
            to: Gid::new(1, 9),
            edge_type: "KNOWS".into(),
            properties: vec![],
        };
        let mut buf = Vec::new();
        write_edge(&mut buf, &edge);
        assert_eq!(read_edge(&mut SliceSource::new(&buf)).unwrap(), edge);
    }
}
