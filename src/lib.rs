//! # msgpack_record
//!
//! A MessagePack encoder for Rust values, with a tag-driven record pipeline.
//!
//! ## Features
//! - Smallest-form encoding for every MessagePack family: fixint/int8..int64,
//!   uint8..uint64, float32/64, fixstr/str8..str32, bin8..bin32,
//!   fixarray/array16/array32, fixmap/map16/map32 and fixext/ext8..ext32
//! - Records described field by field with tag strings
//!   (`name[,omitempty][,structarray][,setcustomkeys][,customkey]`, `-` to skip)
//! - Per-instance cycle guard: a record reached again during the same encode
//!   contributes nothing instead of recursing forever
//! - External types: a per-session [`Registry`] maps concrete types to extension
//!   codes `0..=127`; `std::time::SystemTime` always encodes as the timestamp
//!   extension (`-1`)
//! - Exact sizes up front: every [`Node`] reports its encoded length before writing
//! - Optional serde bridge ([`Serde`]) for any `Serialize` type
//! - A small companion [`Decoder`] producing dynamic [`Value`]s
//!
//! ## Performance
//! Strings and byte slices are borrowed from the encoded value until they are
//! written, and the output buffer is allocated once with the exact encoded length.
//! `Vec<u8>`, `[u8]`, `serde_bytes::Bytes` and `serde_bytes::ByteBuf` encode as
//! MessagePack binary (1 marker byte + 1, 2 or 4 length bytes + data).
//!
//! ## Example
//! ```rust
//! use msgpack_record::{Dispatcher, Encode, Encoder, Node};
//!
//! struct Reading {
//!     sensor: String,
//!     celsius: f64,
//!     note: Option<String>,
//! }
//!
//! impl Encode for Reading {
//!     fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
//!         enc.record(self)
//!             .field("sensor", "s", &self.sensor)
//!             .field("celsius", "c", &self.celsius)
//!             .field("note", ",omitempty", &self.note)
//!             .finish()
//!     }
//! }
//!
//! let mut buf = Vec::new();
//! let mut encoder = Encoder::new(&mut buf);
//! encoder
//!     .encode(&Reading { sensor: "t1".into(), celsius: 21.5, note: None })
//!     .unwrap();
//! assert_eq!(buf[0], 0x82);
//! ```

use std::io::Write;

mod decode;
mod encode;
pub mod error;
mod ext;
mod marker;
mod node;
mod record;
#[cfg(feature = "serde")]
mod ser;
mod tag;
mod value;

pub use decode::Decoder;
pub use encode::{Dispatcher, Encode};
pub use error::{Error, Result};
pub use ext::{BoxError, ExtFn, MarshalMsgpack, Registry, timestamp_payload};
pub use node::{Entry, Ext, Node, RecordNode};
pub use record::RecordBuilder;
#[cfg(feature = "serde")]
pub use ser::{NodeSerializer, Serde};
pub use tag::FieldTag;
pub use value::Value;

/// Encodes `value` with the built-in registry (timestamp handler only).
pub fn to_vec<T: Encode + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Registry::builtin().to_vec(value)
}

/// Encodes `value` and writes it to `writer`. Nothing is written if encoding fails.
pub fn to_writer<W: Write, T: Encode + ?Sized>(mut writer: W, value: &T) -> Result<()> {
    let buf = to_vec(value)?;
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

impl Registry {
    /// Encodes `value` against this registry. A configured registry can be shared
    /// between threads and used concurrently.
    pub fn to_vec<T: Encode + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Dispatcher::new(self).dispatch(value).to_vec()
    }
}

/// Encoder session: a sink plus the external types registered on it.
pub struct Encoder<W: Write> {
    writer: W,
    registry: Registry,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Encoder {
            writer,
            registry: Registry::new(),
        }
    }

    /// Registers `T` as extension type `code`. Fails with [`Error::OutOfBound`] for
    /// codes above 127 and with [`Error::InvalidArgument`] when `encode` is missing.
    pub fn set_external_type<T: ?Sized + 'static>(
        &mut self,
        code: u8,
        encode: Option<ExtFn<T>>,
    ) -> Result<()> {
        self.registry.register(code, encode)
    }

    /// Registers a type that produces its own extension payload.
    pub fn set_external_marshaler<T: MarshalMsgpack + 'static>(&mut self, code: u8) -> Result<()> {
        self.registry.register_marshaler::<T>(code)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Encodes one value. The output is assembled in memory first, so a failed
    /// encode leaves the sink untouched.
    pub fn encode<T: Encode + ?Sized>(&mut self, value: &T) -> Result<()> {
        let buf = match self.registry.to_vec(value) {
            Ok(buf) => buf,
            Err(e) => {
                tracing::debug!(error = %e, "encode failed, nothing written");
                return Err(e);
            }
        };
        self.writer.write_all(&buf)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
