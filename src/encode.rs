//! Type dispatch: from a Rust value to an encoded [`Node`].

use std::any::{TypeId, type_name};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use crate::ext::{Registry, timestamp_payload};
use crate::marker::TIMESTAMP_EXT;
use crate::node::{Entry, Ext, Node, RecordNode};
use crate::record::RecordBuilder;
use crate::Error;

/// A value with a MessagePack encoding.
///
/// Implementations describe the *structural* encoding of the type. Before calling
/// [`encode`](Encode::encode) the dispatcher checks the session's [`Registry`] for a
/// handler registered for the concrete type, so an external type handler always wins.
///
/// Records implement `encode` with [`Dispatcher::record`]:
///
/// ```
/// use msgpack_record::{Dispatcher, Encode, Node, to_vec};
///
/// struct Point {
///     x: i32,
///     y: i32,
///     label: String,
/// }
///
/// impl Encode for Point {
///     fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
///         enc.record(self)
///             .field("x", "", &self.x)
///             .field("y", "", &self.y)
///             .field("label", "name,omitempty", &self.label)
///             .finish()
///     }
/// }
///
/// let bytes = to_vec(&Point { x: 1, y: -1, label: String::new() }).unwrap();
/// assert_eq!(bytes, [0x82, 0xa1, b'x', 0x01, 0xa1, b'y', 0xff]);
/// ```
pub trait Encode: 'static {
    fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a>;

    /// Zero value test for the `omitempty` field option.
    fn is_empty_value(&self) -> bool {
        false
    }

    /// Encoding of a contiguous run of `Self`. Bytes override this to produce
    /// MessagePack binary instead of an array of integers.
    #[doc(hidden)]
    fn encode_slice<'a>(items: &'a [Self], enc: &mut Dispatcher<'_>) -> Node<'a>
    where
        Self: Sized,
    {
        Node::Array(items.iter().map(|item| enc.dispatch(item)).collect())
    }

    /// Resolves handlers against the concrete type, also when reached through
    /// `dyn Encode`.
    #[doc(hidden)]
    fn route<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
        enc.resolve(self)
    }
}

/// State of one top-level encode: the registry in use and the cycle guard.
pub struct Dispatcher<'r> {
    registry: &'r Registry,
    visited: HashSet<(usize, TypeId)>,
    trail: Vec<(usize, TypeId)>,
}

impl<'r> Dispatcher<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Dispatcher {
            registry,
            visited: HashSet::new(),
            trail: Vec::new(),
        }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Encodes one value: registered handler first, structural rule otherwise.
    pub fn dispatch<'a, T: Encode + ?Sized>(&mut self, value: &'a T) -> Node<'a> {
        value.route(self)
    }

    pub(crate) fn resolve<'a, T: Encode + ?Sized>(&mut self, value: &'a T) -> Node<'a> {
        match self.registry.apply(value) {
            Some(node) => node,
            None => value.encode(self),
        }
    }

    /// Starts encoding a record. If this instance was already encoded during the
    /// current call the builder ignores its fields and yields an empty node.
    pub fn record<'a, 'd, T: ?Sized + 'static>(
        &'d mut self,
        record: &'a T,
    ) -> RecordBuilder<'a, 'd, 'r> {
        let first_visit = std::mem::size_of_val(record) == 0
            || self.mark(record as *const T as *const () as usize, TypeId::of::<T>());
        if !first_visit {
            tracing::trace!(ty = type_name::<T>(), "record already encoded, skipping");
        }
        RecordBuilder::new(self, first_visit)
    }

    fn mark(&mut self, addr: usize, ty: TypeId) -> bool {
        let id = (addr, ty);
        let fresh = self.visited.insert(id);
        if fresh {
            self.trail.push(id);
        }
        fresh
    }

    /// Runs `f` while the cell at `cell` is held. A cell reached again from inside
    /// its own contents is a revisit and is not locked a second time.
    fn hold<'a, T: ?Sized + 'static>(
        &mut self,
        cell: &T,
        f: impl FnOnce(&mut Self) -> Node<'a>,
    ) -> Node<'a> {
        let id = (cell as *const T as *const () as usize, TypeId::of::<T>());
        if !self.visited.insert(id) {
            tracing::trace!(ty = type_name::<T>(), "cell already held, skipping");
            return Node::Record(RecordNode::Revisited);
        }
        let node = f(self);
        self.visited.remove(&id);
        node
    }

    /// Runs `f` with cycle guard marks that are dropped afterwards, for values
    /// that do not outlive the call (drained channel messages).
    fn scoped<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let start = self.trail.len();
        let result = f(self);
        for id in self.trail.drain(start..) {
            self.visited.remove(&id);
        }
        result
    }
}

impl Encode for () {
    fn encode<'a>(&'a self, _enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::Nil
    }

    fn is_empty_value(&self) -> bool {
        true
    }
}

impl Encode for bool {
    fn encode<'a>(&'a self, _enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::Bool(*self)
    }

    fn is_empty_value(&self) -> bool {
        !*self
    }
}

macro_rules! impl_signed {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            fn encode<'a>(&'a self, _enc: &mut Dispatcher<'_>) -> Node<'a> {
                Node::Int(*self as i64)
            }

            fn is_empty_value(&self) -> bool {
                *self == 0
            }
        }
    )*};
}

macro_rules! impl_unsigned {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            fn encode<'a>(&'a self, _enc: &mut Dispatcher<'_>) -> Node<'a> {
                Node::Uint(*self as u64)
            }

            fn is_empty_value(&self) -> bool {
                *self == 0
            }
        }
    )*};
}

impl_signed!(i8, i16, i32, i64, isize);
impl_unsigned!(u16, u32, u64, usize);

impl Encode for u8 {
    fn encode<'a>(&'a self, _enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::Uint(*self as u64)
    }

    fn is_empty_value(&self) -> bool {
        *self == 0
    }

    fn encode_slice<'a>(items: &'a [u8], _enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::bin(items)
    }
}

impl Encode for f32 {
    fn encode<'a>(&'a self, _enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::F32(*self)
    }

    fn is_empty_value(&self) -> bool {
        *self == 0.0
    }
}

impl Encode for f64 {
    fn encode<'a>(&'a self, _enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::F64(*self)
    }

    fn is_empty_value(&self) -> bool {
        *self == 0.0
    }
}

impl Encode for char {
    fn encode<'a>(&'a self, _enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::Str(Cow::Owned(self.to_string()))
    }

    fn is_empty_value(&self) -> bool {
        *self == '\0'
    }
}

impl Encode for str {
    fn encode<'a>(&'a self, _enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::str(self)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl Encode for String {
    fn encode<'a>(&'a self, _enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::str(self)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl Encode for serde_bytes::Bytes {
    fn encode<'a>(&'a self, _enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::bin(self)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl Encode for serde_bytes::ByteBuf {
    fn encode<'a>(&'a self, _enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::bin(self.as_slice())
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Encode> Encode for [T] {
    fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
        T::encode_slice(self, enc)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
        T::encode_slice(self, enc)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
        T::encode_slice(self, enc)
    }

    fn is_empty_value(&self) -> bool {
        N == 0
    }
}

impl<T: Encode> Encode for VecDeque<T> {
    fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::Array(self.iter().map(|item| enc.dispatch(item)).collect())
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
        match self {
            Some(value) => enc.dispatch(value),
            None => Node::Nil,
        }
    }

    fn is_empty_value(&self) -> bool {
        self.is_none()
    }
}

macro_rules! impl_pointer {
    ($($ptr:ident),*) => {$(
        impl<T: Encode + ?Sized> Encode for $ptr<T> {
            fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
                enc.dispatch(&**self)
            }

            fn is_empty_value(&self) -> bool {
                (**self).is_empty_value()
            }
        }
    )*};
}

impl_pointer!(Box, Rc, Arc);

impl<T: Encode + ?Sized> Encode for &'static T {
    fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
        enc.dispatch(*self)
    }

    fn is_empty_value(&self) -> bool {
        (**self).is_empty_value()
    }
}

impl<T: Encode + ?Sized> Encode for RefCell<T> {
    fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
        match self.try_borrow() {
            Ok(inner) => enc.dispatch(&*inner).into_owned(),
            Err(_) => Node::Error(Error::InvalidType(format!(
                "{} is mutably borrowed",
                type_name::<Self>()
            ))),
        }
    }

    fn is_empty_value(&self) -> bool {
        self.try_borrow().is_ok_and(|inner| inner.is_empty_value())
    }
}

impl<T: Encode + ?Sized> Encode for Mutex<T> {
    fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
        enc.hold(self, |enc| match self.lock() {
            Ok(inner) => enc.dispatch(&*inner).into_owned(),
            Err(_) => Node::Error(Error::InvalidType(format!(
                "{} is poisoned",
                type_name::<Self>()
            ))),
        })
    }

    // A lock held further up the call counts as not empty, so the field is
    // encoded and becomes a revisit.
    fn is_empty_value(&self) -> bool {
        self.try_lock().is_ok_and(|inner| inner.is_empty_value())
    }
}

impl<T: Encode + ?Sized> Encode for RwLock<T> {
    fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
        enc.hold(self, |enc| match self.read() {
            Ok(inner) => enc.dispatch(&*inner).into_owned(),
            Err(_) => Node::Error(Error::InvalidType(format!(
                "{} is poisoned",
                type_name::<Self>()
            ))),
        })
    }

    fn is_empty_value(&self) -> bool {
        self.try_read().is_ok_and(|inner| inner.is_empty_value())
    }
}

impl<K: Encode, V: Encode, S: 'static> Encode for HashMap<K, V, S> {
    fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::Map(
            self.iter()
                .map(|(k, v)| Entry::new(enc.dispatch(k), enc.dispatch(v)))
                .collect(),
        )
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::Map(
            self.iter()
                .map(|(k, v)| Entry::new(enc.dispatch(k), enc.dispatch(v)))
                .collect(),
        )
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

/// Drains the messages available right now; an empty or disconnected channel ends
/// the array. Never blocks.
impl<T: Encode> Encode for Receiver<T> {
    fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
        let mut items = Vec::new();
        loop {
            match self.try_recv() {
                Ok(message) => {
                    items.push(enc.scoped(|enc| enc.dispatch(&message).into_owned()));
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        Node::Array(items)
    }
}

/// Only reached when the registry in use has no `SystemTime` handler, which the
/// built-in registries always carry.
impl Encode for SystemTime {
    fn encode<'a>(&'a self, _enc: &mut Dispatcher<'_>) -> Node<'a> {
        Node::Ext(Ext {
            code: TIMESTAMP_EXT,
            data: Cow::Owned(timestamp_payload(self)),
        })
    }
}

macro_rules! impl_tuple {
    ($($name:ident)+) => {
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            #[allow(non_snake_case)]
            fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
                let ($($name,)+) = self;
                Node::Array(vec![$(enc.dispatch($name)),+])
            }
        }
    };
}

impl_tuple!(A);
impl_tuple!(A B);
impl_tuple!(A B C);
impl_tuple!(A B C D);
impl_tuple!(A B C D E);
impl_tuple!(A B C D E F);
