//! External (extension) types.
//!
//! A [`Registry`] maps a concrete Rust type to a handler that turns values of that
//! type into the payload of a MessagePack extension with a fixed type code. The
//! registry always carries the built-in timestamp handler for [`SystemTime`], which
//! uses the reserved extension type `-1`.

use std::any::{Any, TypeId, type_name};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::marker::{TIMESTAMP_EXT, USER_EXT_MAX};
use crate::node::{Ext, Node};
use crate::{Error, Result};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Encode function of an external type handler.
pub type ExtFn<T> = Box<dyn Fn(&T) -> std::result::Result<Vec<u8>, BoxError> + Send + Sync>;

/// Types that know how to produce their own extension payload.
///
/// Register them with [`Registry::register_marshaler`] (or
/// [`Encoder::set_external_marshaler`](crate::Encoder::set_external_marshaler)) without
/// supplying an encode function.
pub trait MarshalMsgpack {
    fn marshal_msgpack(&self) -> std::result::Result<Vec<u8>, BoxError>;
}

struct Handler<T: ?Sized> {
    code: u8,
    encode: ExtFn<T>,
}

/// External type handlers of one encoding session.
///
/// The registry is only mutated through `&mut self`; once configured it can be shared
/// by reference between threads and used for any number of encodes.
pub struct Registry {
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Registry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl Registry {
    /// A registry holding only the built-in timestamp handler.
    pub fn new() -> Self {
        let mut registry = Registry {
            handlers: HashMap::new(),
        };
        registry.insert::<SystemTime>(
            TIMESTAMP_EXT,
            Box::new(|time: &SystemTime| Ok(timestamp_payload(time))),
        );
        registry
    }

    /// Shared registry used by [`to_vec`](crate::to_vec) and friends.
    pub(crate) fn builtin() -> &'static Registry {
        static BUILTIN: OnceLock<Registry> = OnceLock::new();
        BUILTIN.get_or_init(Registry::new)
    }

    /// Associates `T` with extension `code` (0..=127). A later registration for the
    /// same type replaces the earlier one.
    pub fn register<T: ?Sized + 'static>(&mut self, code: u8, encode: Option<ExtFn<T>>) -> Result<()> {
        if code > USER_EXT_MAX {
            return Err(Error::OutOfBound(code));
        }
        let Some(encode) = encode else {
            return Err(Error::InvalidArgument(format!(
                "encode function expected for {}",
                type_name::<T>()
            )));
        };
        tracing::debug!(code, ty = type_name::<T>(), "registered external type");
        self.insert(code, encode);
        Ok(())
    }

    /// Registers a type that produces its own payload.
    pub fn register_marshaler<T: MarshalMsgpack + 'static>(&mut self, code: u8) -> Result<()> {
        self.register::<T>(code, Some(Box::new(|value: &T| value.marshal_msgpack())))
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<T>())
    }

    fn insert<T: ?Sized + 'static>(&mut self, code: u8, encode: ExtFn<T>) {
        self.handlers
            .insert(TypeId::of::<T>(), Box::new(Handler { code, encode }));
    }

    /// Runs the handler registered for exactly `T`, if any.
    pub(crate) fn apply<'a, T: ?Sized + 'static>(&self, value: &T) -> Option<Node<'a>> {
        let handler = self
            .handlers
            .get(&TypeId::of::<T>())?
            .downcast_ref::<Handler<T>>()?;
        Some(match (handler.encode)(value) {
            Ok(data) => Node::Ext(Ext {
                code: handler.code,
                data: Cow::Owned(data),
            }),
            Err(e) => {
                tracing::debug!(code = handler.code, ty = type_name::<T>(), error = %e, "external encoder failed");
                Node::Error(Error::External {
                    code: handler.code,
                    message: e.to_string(),
                })
            }
        })
    }
}

/// Seconds since the epoch (floored) and the nanosecond remainder.
fn unix_parts(time: &SystemTime) -> (i64, u32) {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
        Err(e) => {
            let d = e.duration();
            let secs = -(d.as_secs() as i64);
            match d.subsec_nanos() {
                0 => (secs, 0),
                nanos => (secs - 1, 1_000_000_000 - nanos),
            }
        }
    }
}

/// Timestamp extension payload: 4, 8 or 12 bytes depending on range.
pub fn timestamp_payload(time: &SystemTime) -> Vec<u8> {
    let (secs, nanos) = unix_parts(time);
    let seconds = secs as u64;
    if seconds >> 34 == 0 {
        let data = ((nanos as u64) << 34) | seconds;
        if data & 0xffff_ffff_0000_0000 == 0 {
            // timestamp 32
            return (data as u32).to_be_bytes().to_vec();
        }
        // timestamp 64
        return data.to_be_bytes().to_vec();
    }
    // timestamp 96
    let mut payload = Vec::with_capacity(12);
    payload.extend_from_slice(&nanos.to_be_bytes());
    payload.extend_from_slice(&secs.to_be_bytes());
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug)]
    struct Celsius(f32);

    impl MarshalMsgpack for Celsius {
        fn marshal_msgpack(&self) -> std::result::Result<Vec<u8>, BoxError> {
            Ok(self.0.to_be_bytes().to_vec())
        }
    }

    #[test]
    fn test_timestamp_32() {
        let t = UNIX_EPOCH + Duration::from_secs(1);
        assert_eq!(timestamp_payload(&t), vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_timestamp_64() {
        let t = UNIX_EPOCH + Duration::new(1, 1);
        // nanoseconds in the upper 30 bits, seconds in the lower 34
        assert_eq!(
            timestamp_payload(&t),
            ((1u64 << 34) | 1).to_be_bytes().to_vec()
        );

        // seconds above 32 bits but inside 34
        let t = UNIX_EPOCH + Duration::from_secs(1 << 33);
        assert_eq!(timestamp_payload(&t).len(), 8);
    }

    #[test]
    fn test_timestamp_96_for_large_and_negative() {
        let t = UNIX_EPOCH + Duration::from_secs(1 << 34);
        let payload = timestamp_payload(&t);
        assert_eq!(payload.len(), 12);
        assert_eq!(&payload[..4], &[0, 0, 0, 0]);
        assert_eq!(&payload[4..], &(1i64 << 34).to_be_bytes());

        let before = UNIX_EPOCH - Duration::new(1, 500_000_000);
        let payload = timestamp_payload(&before);
        assert_eq!(payload.len(), 12);
        assert_eq!(&payload[..4], &500_000_000u32.to_be_bytes());
        assert_eq!(&payload[4..], &(-2i64).to_be_bytes());
    }

    #[test]
    fn test_register_rejects_bad_arguments() {
        let mut registry = Registry::new();
        let out_of_bound = registry.register::<Celsius>(128, Some(Box::new(|_: &Celsius| Ok(vec![]))));
        assert!(matches!(out_of_bound, Err(Error::OutOfBound(128))));
        let missing = registry.register::<Celsius>(3, None);
        assert!(matches!(missing, Err(Error::InvalidArgument(_))));
        assert!(!registry.contains::<Celsius>());
    }

    #[test]
    fn test_builtin_timestamp_present() {
        assert!(Registry::new().contains::<SystemTime>());
        assert!(Registry::builtin().contains::<SystemTime>());
    }

    #[test]
    fn test_apply_marshaler() {
        let mut registry = Registry::new();
        registry.register_marshaler::<Celsius>(7).unwrap();
        let node = registry.apply(&Celsius(1.5)).unwrap();
        assert_eq!(node.to_vec().unwrap(), vec![0xd6, 7, 0x3f, 0xc0, 0x00, 0x00]);
        assert!(registry.apply(&1.5f32).is_none());
    }

    #[test]
    fn test_handler_failure_is_error_node() {
        let mut registry = Registry::new();
        registry
            .register::<Celsius>(1, Some(Box::new(|_: &Celsius| Err("sensor offline".into()))))
            .unwrap();
        let node = registry.apply(&Celsius(0.0)).unwrap();
        match node.encoded_len() {
            Err(Error::External { code: 1, message }) => assert_eq!(message, "sensor offline"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
