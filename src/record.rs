//! Record field pipeline.
//!
//! Fields are processed in declaration order. Each field tag is parsed into a
//! [`FieldTag`]; skipped and empty `omitempty` fields are dropped, the `setcustomkeys`
//! field fills the custom key table, `customkey` fields take their key from that table
//! and every other field is keyed by its wire name. The first failure turns the whole
//! record into an error node.

use std::collections::{HashMap, HashSet};

use crate::encode::{Dispatcher, Encode};
use crate::node::{Entry, Node, RecordNode};
use crate::tag::FieldTag;
use crate::{Error, Result};

/// Collects the fields of one record. Created by [`Dispatcher::record`].
pub struct RecordBuilder<'a, 'd, 'r> {
    enc: &'d mut Dispatcher<'r>,
    /// `None` when the cycle guard suppressed this instance.
    fields: Option<FieldPipeline<'a>>,
}

impl<'a, 'd, 'r> RecordBuilder<'a, 'd, 'r> {
    pub(crate) fn new(enc: &'d mut Dispatcher<'r>, first_visit: bool) -> Self {
        RecordBuilder {
            enc,
            fields: first_visit.then(FieldPipeline::default),
        }
    }

    /// Adds a field. `name` is the declared field name, `tag` follows the
    /// `name[,option...]` grammar (`""` keeps the declared name).
    pub fn field<T: Encode + ?Sized>(mut self, name: &'a str, tag: &'a str, value: &'a T) -> Self {
        if let Some(fields) = self.fields.as_mut().filter(|f| f.is_open()) {
            let tag = FieldTag::parse(tag);
            if tag.skip || (tag.omit_empty && value.is_empty_value()) {
                return self;
            }
            let node = self.enc.dispatch(value);
            fields.accept(&tag, tag.wire_name(name), node);
        }
        self
    }

    pub fn finish(self) -> Node<'a> {
        match self.fields {
            Some(fields) => fields.finish(),
            None => Node::Record(RecordNode::Revisited),
        }
    }
}

/// Field state shared by hand-written records and serde structs.
#[derive(Default)]
pub(crate) struct FieldPipeline<'a> {
    entries: Vec<Entry<'a>>,
    used_names: HashSet<&'a str>,
    custom_keys: HashMap<String, Node<'a>>,
    as_array: bool,
    error: Option<Error>,
}

impl<'a> FieldPipeline<'a> {
    pub(crate) fn is_open(&self) -> bool {
        self.error.is_none()
    }

    /// Applies one field whose tag has already been checked for skip/omitempty.
    pub(crate) fn accept(&mut self, tag: &FieldTag<'_>, wire_name: &'a str, value: Node<'a>) {
        if !self.is_open() {
            return;
        }
        if let Err(e) = self.try_accept(tag, wire_name, value) {
            self.error = Some(e);
        }
    }

    fn try_accept(&mut self, tag: &FieldTag<'_>, wire_name: &'a str, value: Node<'a>) -> Result<()> {
        self.as_array |= tag.struct_array;

        if tag.set_custom_keys {
            return self.collect_custom_keys(wire_name, value);
        }

        let key = if tag.custom_key {
            self.custom_keys.remove(wire_name).ok_or_else(|| {
                Error::InvalidType(format!("invalid key {wire_name} using customkey option"))
            })?
        } else {
            if !self.used_names.insert(wire_name) {
                return Err(Error::DuplicatedKey(wire_name.to_string()));
            }
            Node::str(wire_name)
        };
        self.entries.push(Entry::new(key, value));
        Ok(())
    }

    fn collect_custom_keys(&mut self, wire_name: &str, value: Node<'a>) -> Result<()> {
        let entries = match value {
            Node::Map(entries) => entries,
            Node::Error(e) => return Err(e),
            _ => {
                return Err(Error::InvalidType(format!(
                    "setcustomkeys field {wire_name} must be a map with string keys"
                )));
            }
        };
        for entry in entries {
            let Node::Str(name) = entry.key else {
                return Err(Error::InvalidType(format!(
                    "setcustomkeys field {wire_name} has a non-string key"
                )));
            };
            self.custom_keys.insert(name.into_owned(), entry.value);
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> Node<'a> {
        if let Some(e) = self.error {
            return Node::Error(e);
        }
        if self.as_array {
            Node::Record(RecordNode::Array(
                self.entries.into_iter().map(|e| e.value).collect(),
            ))
        } else {
            Node::Record(RecordNode::Map(self.entries))
        }
    }
}
