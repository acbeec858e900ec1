//! serde bridge: any `Serialize` value as a [`Node`].
//!
//! Struct fields go through the record field pipeline with the serialized field
//! name read as the tag, so `#[serde(rename = "unsigned,omitempty")]` behaves like
//! the tag `unsigned,omitempty` on a hand-written record. A renamed field must carry
//! its wire name in the tag, since serde does not report the declared name.

use std::borrow::Cow;

use serde::Serialize;
use serde::ser;

use crate::encode::{Dispatcher, Encode};
use crate::node::{Entry, Node};
use crate::record::FieldPipeline;
use crate::tag::FieldTag;
use crate::{Error, Result};

/// Encodes the wrapped value through its `Serialize` impl.
///
/// Values reached this way are not checked against the registry and have no
/// cycle guard; serde itself cannot describe cyclic data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Serde<T>(pub T);

impl<T: Serialize + 'static> Encode for Serde<T> {
    fn encode<'a>(&'a self, _enc: &mut Dispatcher<'_>) -> Node<'a> {
        self.0.serialize(NodeSerializer).unwrap_or_else(Node::Error)
    }

    fn is_empty_value(&self) -> bool {
        self.0
            .serialize(NodeSerializer)
            .is_ok_and(|node| node.is_empty_value())
    }
}

/// A `serde::Serializer` producing owned nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeSerializer;

fn variant_map(variant: &'static str, value: Node<'static>) -> Node<'static> {
    Node::Map(vec![Entry::new(Node::str(variant), value)])
}

impl ser::Serializer for NodeSerializer {
    type Ok = Node<'static>;
    type Error = Error;
    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = SeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = StructBuilder;
    type SerializeStructVariant = StructBuilder;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn serialize_bool(self, v: bool) -> Result<Node<'static>> {
        Ok(Node::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Node<'static>> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> Result<Node<'static>> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> Result<Node<'static>> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> Result<Node<'static>> {
        Ok(Node::Int(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Node<'static>> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u16(self, v: u16) -> Result<Node<'static>> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u32(self, v: u32) -> Result<Node<'static>> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u64(self, v: u64) -> Result<Node<'static>> {
        Ok(Node::Uint(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Node<'static>> {
        Ok(Node::F32(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Node<'static>> {
        Ok(Node::F64(v))
    }

    fn serialize_char(self, v: char) -> Result<Node<'static>> {
        Ok(Node::Str(Cow::Owned(v.to_string())))
    }

    fn serialize_str(self, v: &str) -> Result<Node<'static>> {
        Ok(Node::Str(Cow::Owned(v.to_string())))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Node<'static>> {
        Ok(Node::Bin(Cow::Owned(v.to_vec())))
    }

    fn serialize_none(self) -> Result<Node<'static>> {
        Ok(Node::Nil)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Node<'static>> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Node<'static>> {
        Ok(Node::Nil)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Node<'static>> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Node<'static>> {
        Ok(Node::str(variant))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Node<'static>> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Node<'static>> {
        Ok(variant_map(variant, value.serialize(self)?))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
            variant: None,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SeqBuilder> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len),
            variant: Some(variant),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapBuilder> {
        Ok(MapBuilder {
            entries: Vec::with_capacity(len.unwrap_or(0)),
            pending_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<StructBuilder> {
        Ok(StructBuilder {
            fields: FieldPipeline::default(),
            variant: None,
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<StructBuilder> {
        Ok(StructBuilder {
            fields: FieldPipeline::default(),
            variant: Some(variant),
        })
    }
}

pub struct SeqBuilder {
    items: Vec<Node<'static>>,
    variant: Option<&'static str>,
}

impl SeqBuilder {
    fn push<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.items.push(value.serialize(NodeSerializer)?);
        Ok(())
    }

    fn build(self) -> Result<Node<'static>> {
        let array = Node::Array(self.items);
        Ok(match self.variant {
            Some(variant) => variant_map(variant, array),
            None => array,
        })
    }
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Node<'static>;
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Node<'static>> {
        self.build()
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Node<'static>;
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Node<'static>> {
        self.build()
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Node<'static>;
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Node<'static>> {
        self.build()
    }
}

impl ser::SerializeTupleVariant for SeqBuilder {
    type Ok = Node<'static>;
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Node<'static>> {
        self.build()
    }
}

pub struct MapBuilder {
    entries: Vec<Entry<'static>>,
    pending_key: Option<Node<'static>>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Node<'static>;
    type Error = Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        self.pending_key = Some(key.serialize(NodeSerializer)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        let key = self.pending_key.take().ok_or_else(|| {
            Error::Serde("serialize_value called before serialize_key".to_string())
        })?;
        self.entries
            .push(Entry::new(key, value.serialize(NodeSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Node<'static>> {
        Ok(Node::Map(self.entries))
    }
}

pub struct StructBuilder {
    fields: FieldPipeline<'static>,
    variant: Option<&'static str>,
}

impl StructBuilder {
    fn push<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        let tag = FieldTag::parse(key);
        if tag.skip {
            return Ok(());
        }
        let Some(wire_name) = tag.name else {
            return Err(Error::InvalidType(format!(
                "field tag {key:?} needs a name when used as a serde key"
            )));
        };
        let node = value.serialize(NodeSerializer)?;
        if tag.omit_empty && node.is_empty_value() {
            return Ok(());
        }
        self.fields.accept(&tag, wire_name, node);
        Ok(())
    }

    fn build(self) -> Result<Node<'static>> {
        let record = match self.fields.finish() {
            Node::Error(e) => return Err(e),
            record => record,
        };
        Ok(match self.variant {
            Some(variant) => variant_map(variant, record),
            None => record,
        })
    }
}

impl ser::SerializeStruct for StructBuilder {
    type Ok = Node<'static>;
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.push(key, value)
    }

    fn skip_field(&mut self, _key: &'static str) -> Result<()> {
        Ok(())
    }

    fn end(self) -> Result<Node<'static>> {
        self.build()
    }
}

impl ser::SerializeStructVariant for StructBuilder {
    type Ok = Node<'static>;
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.push(key, value)
    }

    fn end(self) -> Result<Node<'static>> {
        self.build()
    }
}
