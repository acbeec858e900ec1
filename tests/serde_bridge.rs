// Copyright 2026 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.

// Serde types encoded through the `Serde` adapter.
//
// Newtype structs are transparent: a newtype wrapping a HashMap encodes as a
// map, not as an array holding a map. Struct field names are read as field tags.

#![cfg(feature = "serde")]

use std::collections::HashMap;

use msgpack_record::{Decoder, Error, Serde, Value, to_vec};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

fn decode(bytes: &[u8]) -> Value {
    Decoder::new(bytes).next_value().expect("decode").expect("one value")
}

/// Back to a typed value through the JSON data model.
fn to_typed<T: serde::de::DeserializeOwned>(value: &Value) -> T {
    serde_json::from_value(serde_json::to_value(value).expect("to json")).expect("from json")
}

#[test]
fn test_newtype_hashmap_should_be_map_not_array() {
    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TimeStamp(pub HashMap<String, ByteBuf>);

    let mut map = HashMap::new();
    map.insert("key1".to_string(), ByteBuf::from(vec![1, 2, 3]));
    map.insert("key2".to_string(), ByteBuf::from(vec![4, 5, 6]));

    let timestamp = Serde(TimeStamp(map));
    let bytes = to_vec(&timestamp).expect("serialize");

    // fixmap with 2 entries
    assert_eq!(bytes[0], 0x82, "newtype wrapping HashMap should encode as a map");

    let value = decode(&bytes);
    assert_eq!(value.get("key1"), Some(&Value::Bin(vec![1, 2, 3])));
    assert_eq!(value.get("key2"), Some(&Value::Bin(vec![4, 5, 6])));

    let typed: TimeStamp = to_typed(&value);
    assert_eq!(timestamp.0, typed);
}

#[test]
fn test_newtype_vec_transparent() {
    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Items(pub Vec<String>);

    let items = Serde(Items(vec!["item1".to_string(), "item2".to_string()]));
    let bytes = to_vec(&items).expect("serialize");

    // 0x92 = array with 2 elements, not 0x91 wrapping another array
    assert_eq!(
        bytes[0], 0x92,
        "Expected 2-element array (0x92), got 0x{:02x}",
        bytes[0]
    );

    let typed: Items = to_typed(&decode(&bytes));
    assert_eq!(items.0, typed);
}

#[test]
fn test_regular_struct_with_hashmap_field() {
    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Container {
        data: HashMap<String, String>,
    }

    let mut map = HashMap::new();
    map.insert("key1".to_string(), "value1".to_string());
    let container = Serde(Container { data: map });

    let bytes = to_vec(&container).expect("serialize");
    assert_eq!(bytes[0], 0x81, "Regular struct should be a map");

    let typed: Container = to_typed(&decode(&bytes));
    assert_eq!(container.0, typed);
}

#[test]
fn test_field_tags_as_serde_names() {
    #[derive(Debug, Serialize, Deserialize, PartialEq, Default)]
    struct Profile {
        #[serde(rename = "name")]
        name: String,
        #[serde(rename = "age,omitempty")]
        age: u8,
        #[serde(rename = "tags,omitempty")]
        tags: Vec<String>,
        #[serde(rename = "-")]
        secret: String,
    }

    let profile = Serde(Profile {
        name: "kim".to_string(),
        age: 0,
        tags: vec![],
        secret: "hunter2".to_string(),
    });
    let bytes = to_vec(&profile).unwrap();
    let mut expected = vec![0x81, 0xa4];
    expected.extend_from_slice(b"name");
    expected.push(0xa3);
    expected.extend_from_slice(b"kim");
    assert_eq!(bytes, expected);
}

#[test]
fn test_duplicate_tag_names() {
    #[derive(Serialize)]
    struct Clash {
        #[serde(rename = "x")]
        a: u8,
        #[serde(rename = "x,omitempty")]
        b: u8,
    }

    assert!(to_vec(&Serde(Clash { a: 1, b: 0 })).is_ok());
    assert!(matches!(
        to_vec(&Serde(Clash { a: 1, b: 2 })),
        Err(Error::DuplicatedKey(key)) if key == "x"
    ));
}

#[test]
fn test_serde_inside_record() {
    use msgpack_record::{Dispatcher, Encode, Node};

    #[derive(Serialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    struct Shape {
        origin: Serde<Point>,
        label: &'static str,
    }

    impl Encode for Shape {
        fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
            enc.record(self)
                .field("Origin", "origin,omitempty", &self.origin)
                .field("Label", "label", &self.label)
                .finish()
        }
    }

    let shape = Shape {
        origin: Serde(Point { x: 1, y: -2 }),
        label: "s",
    };
    let value = decode(&to_vec(&shape).unwrap());
    assert_eq!(
        value.get("origin"),
        Some(&Value::Map(vec![
            (Value::Str("x".into()), Value::UInteger(1)),
            (Value::Str("y".into()), Value::Integer(-2)),
        ]))
    );
    assert_eq!(value.get("label").and_then(Value::as_str), Some("s"));
}
