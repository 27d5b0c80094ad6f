use std::collections::BTreeMap;

use crate::resources::decode_resources;
use crate::tests::fixtures::{duplicate_pool_fixture, resource_fixture, write_u16};

const EXPECTED_MAP: &str = r#"{
    "@7F010000": ["Example App", "Beispiel App"],
    "@7F010001": ["Example App"],
    "@7F010002": ["42"]
}"#;

#[test]
fn decodes_resource_table() {
    let fixture = resource_fixture();
    let map = decode_resources(&fixture.data).unwrap();

    let expected: BTreeMap<String, Vec<String>> =
        serde_json::from_str(EXPECTED_MAP).unwrap();
    assert_eq!(map, expected);
}

#[test]
fn references_resolve_against_values_seen_so_far() {
    let fixture = resource_fixture();
    let map = decode_resources(&fixture.data).unwrap();

    // The reference entry lives in the first configuration chunk, so it only
    // picks up the default value, not the localized one added later.
    assert_eq!(map["@7F010001"], vec!["Example App".to_string()]);
    assert_eq!(map["@7F010000"].len(), 2);
}

#[test]
fn decoding_is_idempotent() {
    let fixture = resource_fixture();
    let first = decode_resources(&fixture.data).unwrap();
    let second = decode_resources(&fixture.data).unwrap();
    assert_eq!(first, second);
}

#[test]
fn rejects_wrong_table_type() {
    let mut fixture = resource_fixture();
    fixture.data[0] = 0;

    let err = decode_resources(&fixture.data).unwrap_err();
    assert_eq!(err.to_string(), "No RES_TABLE_TYPE found!");
}

#[test]
fn rejects_unknown_top_level_chunk() {
    let mut fixture = resource_fixture();
    fixture.data[12] = 25;

    let err = decode_resources(&fixture.data).unwrap_err();
    assert_eq!(err.to_string(), "Unsupported Type");
}

#[test]
fn rejects_detached_type_string_pool() {
    let mut fixture = resource_fixture();
    let at = fixture.type_strings_field;
    fixture.data[at..at + 4].copy_from_slice(&0i32.to_le_bytes());

    let err = decode_resources(&fixture.data).unwrap_err();
    assert_eq!(
        err.to_string(),
        "TypeStrings must immediately follow the package structure header."
    );
}

#[test]
fn rejects_inconsistent_entry_layout() {
    let mut fixture = resource_fixture();
    let at = fixture.entry_count_field;
    fixture.data[at..at + 4].copy_from_slice(&0i32.to_le_bytes());

    let err = decode_resources(&fixture.data).unwrap_err();
    assert_eq!(
        err.to_string(),
        "HeaderSize, entryCount and entriesStart are not valid."
    );
}

#[test]
fn rejects_oversized_entry_count() {
    let mut fixture = resource_fixture();
    let at = fixture.entry_count_field;
    fixture.data[at..at + 4].copy_from_slice(&0x1FFF_FFFFi32.to_le_bytes());

    let err = decode_resources(&fixture.data).unwrap_err();
    assert_eq!(
        err.to_string(),
        "HeaderSize, entryCount and entriesStart are not valid."
    );
}

#[test]
fn later_pool_sibling_never_replaces_an_empty_value_pool() {
    let data = duplicate_pool_fixture();

    // The string entry points at index 0 of the (empty) value pool; the
    // populated second pool must not be consulted.
    let err = decode_resources(&data).unwrap_err();
    assert_eq!(err.to_string(), "Invalid string index: 0 is out of range");
}

#[test]
fn rejects_overlong_string_length() {
    let mut fixture = resource_fixture();
    let mut patched = Vec::new();
    write_u16(&mut patched, 32_772);
    let at = fixture.key_pool_first_len;
    fixture.data[at..at + 2].copy_from_slice(&patched);

    let err = decode_resources(&fixture.data).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Length of Utf16 string is supposed to be >32768."
    );
}

#[test]
fn rejects_truncated_string_pool() {
    let mut fixture = resource_fixture();
    fixture.data.truncate(fixture.key_pool_first_len + 1);

    let err = decode_resources(&fixture.data).unwrap_err();
    assert_eq!(err.to_string(), "Failed to read ushort from stream");
}
