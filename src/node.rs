//! Encoded nodes: the lazily written tree produced by the dispatcher.
//!
//! A [`Node`] knows its exact encoded length before anything is written, which lets
//! callers size buffers up front, and streams itself into any [`Write`] sink. Headers
//! for every length class are produced by one function per kind so that
//! [`Node::encoded_len`] and [`Node::write_to`] can never disagree.

use std::borrow::Cow;
use std::collections::HashSet;
use std::io::Write;

use crate::marker::*;
use crate::{Error, Result};

/// One encoded MessagePack value.
#[derive(Debug)]
pub enum Node<'a> {
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    F32(f32),
    F64(f64),
    Str(Cow<'a, str>),
    Bin(Cow<'a, [u8]>),
    Array(Vec<Node<'a>>),
    Map(Vec<Entry<'a>>),
    Ext(Ext<'a>),
    Record(RecordNode<'a>),
    /// A value that could not be encoded. Both `encoded_len` and `write_to` fail.
    Error(Error),
}

/// One key/value pair of a map.
#[derive(Debug)]
pub struct Entry<'a> {
    pub key: Node<'a>,
    pub value: Node<'a>,
}

impl<'a> Entry<'a> {
    pub fn new(key: Node<'a>, value: Node<'a>) -> Self {
        Entry { key, value }
    }
}

/// Extension value: a type code plus raw payload.
#[derive(Debug)]
pub struct Ext<'a> {
    pub code: u8,
    pub data: Cow<'a, [u8]>,
}

/// Output of the record field pipeline.
#[derive(Debug)]
pub enum RecordNode<'a> {
    Map(Vec<Entry<'a>>),
    /// `structarray` layout: field values only.
    Array(Vec<Node<'a>>),
    /// The same record instance was already encoded earlier in this call.
    /// Encodes to nothing.
    Revisited,
}

/// Fixed-size prefix (marker plus length or scalar payload), at most 9 bytes.
struct Head {
    bytes: [u8; 9],
    used: usize,
}

impl Head {
    fn one(marker: u8) -> Self {
        let mut bytes = [0u8; 9];
        bytes[0] = marker;
        Head { bytes, used: 1 }
    }

    fn with(marker: u8, payload: &[u8]) -> Self {
        let mut head = Head::one(marker);
        head.push(payload);
        head
    }

    fn push(&mut self, payload: &[u8]) {
        self.bytes[self.used..self.used + payload.len()].copy_from_slice(payload);
        self.used += payload.len();
    }

    fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.used]
    }

    fn len(&self) -> usize {
        self.used
    }

    fn write<W: Write + ?Sized>(&self, w: &mut W) -> Result<usize> {
        w.write_all(self.as_slice())?;
        Ok(self.used)
    }
}

fn int_head(v: i64) -> Head {
    if (NEG_FIXINT_MIN..=POS_FIXINT_MAX as i64).contains(&v) {
        Head::one(v as u8)
    } else if let Ok(v) = i8::try_from(v) {
        Head::with(INT8, &v.to_be_bytes())
    } else if let Ok(v) = i16::try_from(v) {
        Head::with(INT16, &v.to_be_bytes())
    } else if let Ok(v) = i32::try_from(v) {
        Head::with(INT32, &v.to_be_bytes())
    } else {
        Head::with(INT64, &v.to_be_bytes())
    }
}

fn uint_head(v: u64) -> Head {
    if v <= POS_FIXINT_MAX as u64 {
        Head::one(v as u8)
    } else if let Ok(v) = u8::try_from(v) {
        Head::with(UINT8, &[v])
    } else if let Ok(v) = u16::try_from(v) {
        Head::with(UINT16, &v.to_be_bytes())
    } else if let Ok(v) = u32::try_from(v) {
        Head::with(UINT32, &v.to_be_bytes())
    } else {
        Head::with(UINT64, &v.to_be_bytes())
    }
}

fn str_head(len: usize) -> Result<Head> {
    Ok(if len <= FIXSTR_MAX {
        Head::one(FIXSTR | len as u8)
    } else if let Ok(n) = u8::try_from(len) {
        Head::with(STR8, &[n])
    } else if let Ok(n) = u16::try_from(len) {
        Head::with(STR16, &n.to_be_bytes())
    } else if let Ok(n) = u32::try_from(len) {
        Head::with(STR32, &n.to_be_bytes())
    } else {
        return Err(Error::ExceededLength { kind: "String", len });
    })
}

fn bin_head(len: usize) -> Result<Head> {
    Ok(if let Ok(n) = u8::try_from(len) {
        Head::with(BIN8, &[n])
    } else if let Ok(n) = u16::try_from(len) {
        Head::with(BIN16, &n.to_be_bytes())
    } else if let Ok(n) = u32::try_from(len) {
        Head::with(BIN32, &n.to_be_bytes())
    } else {
        return Err(Error::ExceededLength { kind: "Binary", len });
    })
}

fn collection_head(
    kind: &'static str,
    len: usize,
    fix: u8,
    marker16: u8,
    marker32: u8,
) -> Result<Head> {
    Ok(if len <= FIXCOLLECTION_MAX {
        Head::one(fix | len as u8)
    } else if let Ok(n) = u16::try_from(len) {
        Head::with(marker16, &n.to_be_bytes())
    } else if let Ok(n) = u32::try_from(len) {
        Head::with(marker32, &n.to_be_bytes())
    } else {
        return Err(Error::ExceededLength { kind, len });
    })
}

fn array_head(len: usize) -> Result<Head> {
    collection_head("Array", len, FIXARRAY, ARRAY16, ARRAY32)
}

fn map_head(len: usize) -> Result<Head> {
    collection_head("Map", len, FIXMAP, MAP16, MAP32)
}

fn ext_head(len: usize, code: u8) -> Result<Head> {
    let mut head = match len {
        1 => Head::one(FIXEXT1),
        2 => Head::one(FIXEXT2),
        4 => Head::one(FIXEXT4),
        8 => Head::one(FIXEXT8),
        16 => Head::one(FIXEXT16),
        _ => {
            if let Ok(n) = u8::try_from(len) {
                Head::with(EXT8, &[n])
            } else if let Ok(n) = u16::try_from(len) {
                Head::with(EXT16, &n.to_be_bytes())
            } else if let Ok(n) = u32::try_from(len) {
                Head::with(EXT32, &n.to_be_bytes())
            } else {
                return Err(Error::ExceededLength {
                    kind: "External",
                    len,
                });
            }
        }
    };
    head.push(&[code]);
    Ok(head)
}

fn items_len(items: &[Node<'_>]) -> Result<usize> {
    let mut total = array_head(items.len())?.len();
    for item in items {
        total += item.encoded_len()?;
    }
    Ok(total)
}

fn entries_len(entries: &[Entry<'_>]) -> Result<usize> {
    let mut total = map_head(entries.len())?.len();
    for entry in entries {
        total += entry.key.encoded_len()? + entry.value.encoded_len()?;
    }
    Ok(total)
}

fn write_items<W: Write + ?Sized>(items: &[Node<'_>], w: &mut W) -> Result<usize> {
    let mut total = array_head(items.len())?.write(w)?;
    for item in items {
        total += item.write_to(w)?;
    }
    Ok(total)
}

fn write_entries<W: Write + ?Sized>(entries: &[Entry<'_>], w: &mut W) -> Result<usize> {
    check_unique_keys(entries)?;
    let mut total = map_head(entries.len())?.write(w)?;
    for entry in entries {
        total += entry.key.write_to(w)?;
        total += entry.value.write_to(w)?;
    }
    Ok(total)
}

/// Canonical form of a primitive key. Integer keys compare by numeric value, so a
/// non-negative signed key folds into the unsigned form even where the two encode
/// differently (`Int(200)` is `d1 00 c8`, `Uint(200)` is `cc c8`).
#[derive(Hash, PartialEq, Eq)]
enum KeyForm<'k> {
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Str(&'k str),
    Bin(&'k [u8]),
}

fn key_form<'k>(node: &'k Node<'_>) -> Option<KeyForm<'k>> {
    Some(match node {
        Node::Nil => KeyForm::Nil,
        Node::Bool(b) => KeyForm::Bool(*b),
        Node::Int(i) if *i >= 0 => KeyForm::Uint(*i as u64),
        Node::Int(i) => KeyForm::Int(*i),
        Node::Uint(u) => KeyForm::Uint(*u),
        Node::Str(s) => KeyForm::Str(s),
        Node::Bin(b) => KeyForm::Bin(b),
        _ => return None,
    })
}

/// Primitive keys are hashed; floats, containers and extensions are compared
/// pairwise, which is quadratic in the number of such keys.
fn check_unique_keys(entries: &[Entry<'_>]) -> Result<()> {
    let mut seen = HashSet::with_capacity(entries.len());
    let mut complex: Vec<&Node<'_>> = Vec::new();
    for entry in entries {
        let duplicated = match key_form(&entry.key) {
            Some(form) => !seen.insert(form),
            None => {
                let found = complex.iter().any(|k| k.structural_eq(&entry.key));
                complex.push(&entry.key);
                found
            }
        };
        if duplicated {
            return Err(Error::DuplicatedKey(format!("{:?}", entry.key)));
        }
    }
    Ok(())
}

impl<'a> Node<'a> {
    /// Error node for a value with no MessagePack representation.
    pub fn unsupported(type_name: &str) -> Self {
        Node::Error(Error::InvalidType(format!(
            "no MessagePack encoding for {type_name}"
        )))
    }

    pub fn str(s: &'a str) -> Self {
        Node::Str(Cow::Borrowed(s))
    }

    pub fn bin(b: &'a [u8]) -> Self {
        Node::Bin(Cow::Borrowed(b))
    }

    /// True for a record instance suppressed by the cycle guard.
    pub fn is_revisited(&self) -> bool {
        matches!(self, Node::Record(RecordNode::Revisited))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Node::Error(_))
    }

    /// Zero value test used by `omitempty` when only the encoded form is known.
    pub fn is_empty_value(&self) -> bool {
        match self {
            Node::Nil => true,
            Node::Bool(b) => !b,
            Node::Int(i) => *i == 0,
            Node::Uint(u) => *u == 0,
            Node::F32(f) => *f == 0.0,
            Node::F64(f) => *f == 0.0,
            Node::Str(s) => s.is_empty(),
            Node::Bin(b) => b.is_empty(),
            Node::Array(items) => items.is_empty(),
            Node::Map(entries) => entries.is_empty(),
            Node::Ext(_) | Node::Record(_) | Node::Error(_) => false,
        }
    }

    /// Exact number of bytes `write_to` produces.
    pub fn encoded_len(&self) -> Result<usize> {
        Ok(match self {
            Node::Nil | Node::Bool(_) => 1,
            Node::Int(i) => int_head(*i).len(),
            Node::Uint(u) => uint_head(*u).len(),
            Node::F32(_) => 5,
            Node::F64(_) => 9,
            Node::Str(s) => str_head(s.len())?.len() + s.len(),
            Node::Bin(b) => bin_head(b.len())?.len() + b.len(),
            Node::Array(items) => items_len(items)?,
            Node::Map(entries) => entries_len(entries)?,
            Node::Ext(ext) => ext_head(ext.data.len(), ext.code)?.len() + ext.data.len(),
            Node::Record(RecordNode::Map(entries)) => entries_len(entries)?,
            Node::Record(RecordNode::Array(items)) => items_len(items)?,
            Node::Record(RecordNode::Revisited) => 0,
            Node::Error(e) => return Err(e.replicate()),
        })
    }

    /// Writes the encoding and returns the number of bytes written. Stops at the
    /// first failing child.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<usize> {
        match self {
            Node::Nil => Head::one(NIL).write(w),
            Node::Bool(b) => Head::one(if *b { TRUE } else { FALSE }).write(w),
            Node::Int(i) => int_head(*i).write(w),
            Node::Uint(u) => uint_head(*u).write(w),
            Node::F32(f) => Head::with(FLOAT32, &f.to_be_bytes()).write(w),
            Node::F64(f) => Head::with(FLOAT64, &f.to_be_bytes()).write(w),
            Node::Str(s) => {
                let n = str_head(s.len())?.write(w)?;
                w.write_all(s.as_bytes())?;
                Ok(n + s.len())
            }
            Node::Bin(b) => {
                let n = bin_head(b.len())?.write(w)?;
                w.write_all(b)?;
                Ok(n + b.len())
            }
            Node::Array(items) => write_items(items, w),
            Node::Map(entries) => write_entries(entries, w),
            Node::Ext(ext) => {
                let n = ext_head(ext.data.len(), ext.code)?.write(w)?;
                w.write_all(&ext.data)?;
                Ok(n + ext.data.len())
            }
            Node::Record(RecordNode::Map(entries)) => write_entries(entries, w),
            Node::Record(RecordNode::Array(items)) => write_items(items, w),
            Node::Record(RecordNode::Revisited) => Ok(0),
            Node::Error(e) => Err(e.replicate()),
        }
    }

    /// Materializes the node into a buffer sized by `encoded_len`.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len().unwrap_or_default());
        let written = self.write_to(&mut buf)?;
        debug_assert_eq!(written, buf.len());
        Ok(buf)
    }

    /// Detaches the node from the value it borrows from.
    pub fn into_owned(self) -> Node<'static> {
        match self {
            Node::Nil => Node::Nil,
            Node::Bool(b) => Node::Bool(b),
            Node::Int(i) => Node::Int(i),
            Node::Uint(u) => Node::Uint(u),
            Node::F32(f) => Node::F32(f),
            Node::F64(f) => Node::F64(f),
            Node::Str(s) => Node::Str(Cow::Owned(s.into_owned())),
            Node::Bin(b) => Node::Bin(Cow::Owned(b.into_owned())),
            Node::Array(items) => Node::Array(owned_items(items)),
            Node::Map(entries) => Node::Map(owned_entries(entries)),
            Node::Ext(ext) => Node::Ext(Ext {
                code: ext.code,
                data: Cow::Owned(ext.data.into_owned()),
            }),
            Node::Record(RecordNode::Map(entries)) => {
                Node::Record(RecordNode::Map(owned_entries(entries)))
            }
            Node::Record(RecordNode::Array(items)) => {
                Node::Record(RecordNode::Array(owned_items(items)))
            }
            Node::Record(RecordNode::Revisited) => Node::Record(RecordNode::Revisited),
            Node::Error(e) => Node::Error(e),
        }
    }

    fn items(&self) -> Option<&[Node<'a>]> {
        match self {
            Node::Array(items) | Node::Record(RecordNode::Array(items)) => Some(items),
            _ => None,
        }
    }

    fn entries(&self) -> Option<&[Entry<'a>]> {
        match self {
            Node::Map(entries) | Node::Record(RecordNode::Map(entries)) => Some(entries),
            _ => None,
        }
    }

    /// Deep equality of the encoded structure. Error nodes are never equal.
    pub fn structural_eq(&self, other: &Node<'_>) -> bool {
        if let (Some(a), Some(b)) = (key_form(self), key_form(other)) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (self.items(), other.items()) {
            return a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.structural_eq(y));
        }
        if let (Some(a), Some(b)) = (self.entries(), other.entries()) {
            return a.len() == b.len()
                && a.iter().zip(b).all(|(x, y)| {
                    x.key.structural_eq(&y.key) && x.value.structural_eq(&y.value)
                });
        }
        match (self, other) {
            (Node::F32(a), Node::F32(b)) => a.to_bits() == b.to_bits(),
            (Node::F64(a), Node::F64(b)) => a.to_bits() == b.to_bits(),
            (Node::Ext(a), Node::Ext(b)) => a.code == b.code && a.data == b.data,
            (Node::Record(RecordNode::Revisited), Node::Record(RecordNode::Revisited)) => true,
            _ => false,
        }
    }
}

fn owned_items(items: Vec<Node<'_>>) -> Vec<Node<'static>> {
    items.into_iter().map(Node::into_owned).collect()
}

fn owned_entries(entries: Vec<Entry<'_>>) -> Vec<Entry<'static>> {
    entries
        .into_iter()
        .map(|e| Entry::new(e.key.into_owned(), e.value.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(node: Node<'_>, expected: &[u8]) {
        let len = node.encoded_len().unwrap();
        let mut buf = Vec::new();
        let written = node.write_to(&mut buf).unwrap();
        assert_eq!(buf, expected, "bytes for {node:?}");
        assert_eq!(written, expected.len());
        assert_eq!(len, expected.len(), "encoded_len for {node:?}");
    }

    #[test]
    fn test_nil_and_bool() {
        check(Node::Nil, &[0xc0]);
        check(Node::Bool(false), &[0xc2]);
        check(Node::Bool(true), &[0xc3]);
    }

    #[test]
    fn test_int_boundaries() {
        check(Node::Int(0), &[0x00]);
        check(Node::Int(127), &[0x7f]);
        check(Node::Int(-1), &[0xff]);
        check(Node::Int(-32), &[0xe0]);
        check(Node::Int(-33), &[0xd0, 0xdf]);
        check(Node::Int(-128), &[0xd0, 0x80]);
        check(Node::Int(128), &[0xd1, 0x00, 0x80]);
        check(Node::Int(-129), &[0xd1, 0xff, 0x7f]);
        check(Node::Int(32767), &[0xd1, 0x7f, 0xff]);
        check(Node::Int(32768), &[0xd2, 0x00, 0x00, 0x80, 0x00]);
        check(Node::Int(-2147483648), &[0xd2, 0x80, 0x00, 0x00, 0x00]);
        check(
            Node::Int(2147483648),
            &[0xd3, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00],
        );
        check(
            Node::Int(i64::MIN),
            &[0xd3, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        );
    }

    #[test]
    fn test_uint_boundaries() {
        check(Node::Uint(127), &[0x7f]);
        check(Node::Uint(128), &[0xcc, 0x80]);
        check(Node::Uint(255), &[0xcc, 0xff]);
        check(Node::Uint(256), &[0xcd, 0x01, 0x00]);
        check(Node::Uint(65535), &[0xcd, 0xff, 0xff]);
        check(Node::Uint(65536), &[0xce, 0x00, 0x01, 0x00, 0x00]);
        check(
            Node::Uint(u64::MAX),
            &[0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
        );
    }

    #[test]
    fn test_floats() {
        check(Node::F32(1.5), &[0xca, 0x3f, 0xc0, 0x00, 0x00]);
        check(
            Node::F64(9.5),
            &[0xcb, 0x40, 0x23, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        );
    }

    #[test]
    fn test_string_classes() {
        check(Node::str(""), &[0xa0]);
        let s31 = "a".repeat(31);
        let mut expected = vec![0xbf];
        expected.extend_from_slice(s31.as_bytes());
        check(Node::str(&s31), &expected);

        let s32 = "a".repeat(32);
        let mut expected = vec![0xd9, 32];
        expected.extend_from_slice(s32.as_bytes());
        check(Node::str(&s32), &expected);

        let s256 = "b".repeat(256);
        let node = Node::str(&s256);
        let bytes = node.to_vec().unwrap();
        assert_eq!(&bytes[..3], &[0xda, 0x01, 0x00]);
        assert_eq!(bytes.len(), 259);

        let s65536 = "c".repeat(65536);
        let bytes = Node::str(&s65536).to_vec().unwrap();
        assert_eq!(&bytes[..5], &[0xdb, 0x00, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_binary_has_no_fixed_form() {
        check(Node::bin(&[]), &[0xc4, 0x00]);
        check(Node::bin(&[1, 2, 3]), &[0xc4, 0x03, 1, 2, 3]);
        let big = vec![7u8; 300];
        let bytes = Node::bin(&big).to_vec().unwrap();
        assert_eq!(&bytes[..3], &[0xc5, 0x01, 0x2c]);
    }

    #[test]
    fn test_array_classes() {
        check(Node::Array(vec![]), &[0x90]);
        check(
            Node::Array(vec![Node::Int(1), Node::Nil]),
            &[0x92, 0x01, 0xc0],
        );
        let fifteen: Vec<Node> = (0..15).map(Node::Int).collect();
        assert_eq!(Node::Array(fifteen).to_vec().unwrap()[0], 0x9f);
        let sixteen: Vec<Node> = (0..16).map(Node::Int).collect();
        let bytes = Node::Array(sixteen).to_vec().unwrap();
        assert_eq!(&bytes[..3], &[0xdc, 0x00, 0x10]);
        assert_eq!(bytes.len(), 3 + 16);
    }

    #[test]
    fn test_map_classes() {
        check(Node::Map(vec![]), &[0x80]);
        check(
            Node::Map(vec![Entry::new(Node::str("a"), Node::Int(1))]),
            &[0x81, 0xa1, b'a', 0x01],
        );
        let entries: Vec<Entry> = (0..16)
            .map(|i| Entry::new(Node::Uint(i), Node::Nil))
            .collect();
        let bytes = Node::Map(entries).to_vec().unwrap();
        assert_eq!(&bytes[..3], &[0xde, 0x00, 0x10]);
    }

    #[test]
    fn test_ext_classes() {
        let ext = |code, data: &'static [u8]| {
            Node::Ext(Ext {
                code,
                data: Cow::Borrowed(data),
            })
        };
        check(ext(5, &[0xaa]), &[0xd4, 5, 0xaa]);
        check(ext(5, &[1, 2]), &[0xd5, 5, 1, 2]);
        check(ext(5, &[1, 2, 3, 4]), &[0xd6, 5, 1, 2, 3, 4]);
        check(ext(5, &[0; 8]), &[0xd7, 5, 0, 0, 0, 0, 0, 0, 0, 0]);
        check(ext(5, &[1, 2, 3]), &[0xc7, 3, 5, 1, 2, 3]);
        let mut sixteen = vec![0xd8, 9];
        sixteen.extend_from_slice(&[0u8; 16]);
        check(ext(9, &[0; 16]), &sixteen);
        check(ext(1, &[]), &[0xc7, 0, 1]);
    }

    #[test]
    fn test_duplicated_map_key_writes_nothing() {
        let node = Node::Map(vec![
            Entry::new(Node::str("k"), Node::Int(1)),
            Entry::new(Node::str("k"), Node::Int(2)),
        ]);
        let mut buf = Vec::new();
        let err = node.write_to(&mut buf).unwrap_err();
        assert!(matches!(err, Error::DuplicatedKey(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_signed_and_unsigned_keys_collide() {
        let node = Node::Map(vec![
            Entry::new(Node::Int(5), Node::Nil),
            Entry::new(Node::Uint(5), Node::Nil),
        ]);
        assert!(matches!(node.to_vec(), Err(Error::DuplicatedKey(_))));
    }

    #[test]
    fn test_integer_keys_compare_numerically() {
        assert_ne!(
            Node::Int(200).to_vec().unwrap(),
            Node::Uint(200).to_vec().unwrap()
        );
        let node = Node::Map(vec![
            Entry::new(Node::Int(200), Node::Nil),
            Entry::new(Node::Uint(200), Node::Nil),
        ]);
        assert!(matches!(node.to_vec(), Err(Error::DuplicatedKey(_))));

        let node = Node::Map(vec![
            Entry::new(Node::Int(-1), Node::Nil),
            Entry::new(Node::Uint(u64::MAX), Node::Nil),
        ]);
        assert!(node.to_vec().is_ok());
    }

    #[test]
    fn test_complex_keys_compared_structurally() {
        let key = || Node::Array(vec![Node::Int(1), Node::F64(2.0)]);
        let dup = Node::Map(vec![
            Entry::new(key(), Node::Nil),
            Entry::new(key(), Node::Nil),
        ]);
        assert!(matches!(dup.to_vec(), Err(Error::DuplicatedKey(_))));

        let distinct = Node::Map(vec![
            Entry::new(key(), Node::Nil),
            Entry::new(Node::Array(vec![Node::Int(1)]), Node::Nil),
            Entry::new(Node::F64(2.0), Node::Nil),
            Entry::new(Node::F32(2.0), Node::Nil),
        ]);
        assert!(distinct.to_vec().is_ok());
    }

    #[test]
    fn test_error_node_fails_len_and_write() {
        let node = Node::unsupported("complex128");
        assert!(matches!(node.encoded_len(), Err(Error::InvalidType(_))));
        let mut buf = Vec::new();
        assert!(node.write_to(&mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_child_error_stops_array() {
        let node = Node::Array(vec![
            Node::Int(1),
            Node::unsupported("chan"),
            Node::Int(2),
        ]);
        assert!(node.encoded_len().is_err());
        let mut buf = Vec::new();
        assert!(node.write_to(&mut buf).is_err());
        // header and the first element only
        assert_eq!(buf, vec![0x93, 0x01]);
    }

    #[test]
    fn test_revisited_record_is_empty() {
        let node = Node::Record(RecordNode::Revisited);
        assert!(node.is_revisited());
        check(node, &[]);
    }

    #[test]
    fn test_len_is_idempotent() {
        let node = Node::Map(vec![Entry::new(
            Node::str("list"),
            Node::Array(vec![Node::F32(1.0), Node::Uint(300)]),
        )]);
        assert_eq!(node.encoded_len().unwrap(), node.encoded_len().unwrap());
        assert_eq!(node.encoded_len().unwrap(), node.to_vec().unwrap().len());
    }

    #[test]
    fn test_into_owned_keeps_encoding() {
        let text = String::from("borrowed");
        let node = Node::Array(vec![Node::str(&text), Node::bin(text.as_bytes())]);
        let before = node.to_vec().unwrap();
        let owned = node.into_owned();
        drop(text);
        assert_eq!(owned.to_vec().unwrap(), before);
    }
}
