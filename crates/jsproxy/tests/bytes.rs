//! Tests for binary payloads on the wire.

use jsproxy::{decode, decode_bytes, encode_bytes, encode_wire, HostValue};
use proptest::prelude::*;
use rand::Rng;
use serde_json::json;

fn generate_blob() -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let length = rng.gen_range(0..=100);
    (0..length).map(|_| rng.gen::<u8>()).collect()
}

#[test]
fn random_blobs_travel_as_lowercase_hex() {
    for _ in 0..100 {
        let blob = generate_blob();
        let wire = encode_bytes(&blob);
        let digits = wire[1].as_str().unwrap();
        assert_eq!(digits.len(), blob.len() * 2);
        assert!(digits.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
        assert_eq!(decode_bytes(&wire).unwrap(), blob);
    }
}

#[test]
fn known_values() {
    assert_eq!(encode_bytes(b"\x12\xff"), json!(["bytes", "12ff"]));
    assert_eq!(decode_bytes(&json!(["bytes", "12FF"])).unwrap(), b"\x12\xff");
    assert_eq!(encode_bytes(b""), json!(["bytes", ""]));
}

#[test]
fn malformed_hex_is_rejected() {
    for wire in [json!(["bytes", "abc"]), json!(["bytes", "zz"]), json!(["bytes", "aé"])] {
        let err = decode_bytes(&wire).unwrap_err();
        assert!(err.to_string().contains("Invalid hex payload"), "{}", err);
    }
    assert!(decode_bytes(&json!(["list", 1])).is_err());
}

proptest! {
    #[test]
    fn decode_reverses_encode(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        prop_assert_eq!(decode_bytes(&encode_bytes(&bytes)).unwrap(), bytes.clone());
        let wire = encode_wire(&HostValue::bytes(bytes.clone())).unwrap();
        prop_assert_eq!(decode(&wire).unwrap(), HostValue::Bytes(bytes));
    }
}
