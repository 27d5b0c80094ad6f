use crate::manifest::read_manifest;
use crate::tests::fixtures::manifest_fixture;

const EXPECTED_XML: &str = concat!(
    "<root>",
    "<manifest package=\"com.example.app\" versionName=\"1.0\" versionCode=\"@42\">",
    "<application label=\"@7F010000\" icon=\"res/icon.png\"></application>",
    "<uses-permission name=\"android.permission.INTERNET\"></uses-permission>",
    "<uses-permission name=\"android.permission.CAMERA\"></uses-permission>",
    "</manifest>",
    "</root>",
);

#[test]
fn decodes_manifest_tree() {
    let fixture = manifest_fixture();
    let document = read_manifest(&fixture.data).unwrap();

    assert_eq!(document.tag, "root");
    let manifest = document.find_child("manifest").unwrap();
    assert_eq!(manifest.attribute("package"), Some("com.example.app"));
    assert_eq!(manifest.attribute("versionName"), Some("1.0"));
    // Attributes without a string value fall back to the resource id.
    assert_eq!(manifest.attribute("versionCode"), Some("@42"));

    let application = manifest.find_child("application").unwrap();
    assert_eq!(application.attribute("label"), Some("@7F010000"));
    assert_eq!(application.attribute("icon"), Some("res/icon.png"));

    let permissions: Vec<&str> = manifest
        .children
        .iter()
        .filter(|child| child.tag == "uses-permission")
        .filter_map(|child| child.attribute("name"))
        .collect();
    assert_eq!(
        permissions,
        vec![
            "android.permission.INTERNET",
            "android.permission.CAMERA"
        ]
    );
}

#[test]
fn serializes_manifest_as_xml_text() {
    let fixture = manifest_fixture();
    let document = read_manifest(&fixture.data).unwrap();
    assert_eq!(document.to_xml_string().unwrap(), EXPECTED_XML);
}

#[test]
fn decoding_is_idempotent() {
    let fixture = manifest_fixture();
    let first = read_manifest(&fixture.data).unwrap();
    let second = read_manifest(&fixture.data).unwrap();
    assert_eq!(first, second);
}

#[test]
fn rejects_unknown_tag_code() {
    let mut fixture = manifest_fixture();
    let code = 7_012_452i32;
    fixture.data[fixture.end_doc..fixture.end_doc + 4].copy_from_slice(&code.to_le_bytes());

    let err = read_manifest(&fixture.data).unwrap_err();
    assert_eq!(err.to_string(), "Invalid tag code: 7012452");
}

#[test]
fn rejects_negative_string_index() {
    let mut fixture = manifest_fixture();
    let at = fixture.first_attribute_name_index;
    fixture.data[at..at + 4].copy_from_slice(&(-1i32).to_le_bytes());

    let err = read_manifest(&fixture.data).unwrap_err();
    assert_eq!(err.to_string(), "Invalid string index: Must not be negative");
}

#[test]
fn rejects_negative_value_index() {
    let mut fixture = manifest_fixture();
    // The value-index word sits right after the name index.
    let at = fixture.first_attribute_name_index + 4;
    fixture.data[at..at + 4].copy_from_slice(&(-16_777_216i32).to_le_bytes());

    let err = read_manifest(&fixture.data).unwrap_err();
    assert_eq!(err.to_string(), "Invalid string index: Must not be negative");
}

#[test]
fn resource_id_sentinel_still_yields_placeholder() {
    let fixture = manifest_fixture();
    let document = read_manifest(&fixture.data).unwrap();
    let manifest = document.find_child("manifest").unwrap();
    assert_eq!(manifest.attribute("versionCode"), Some("@42"));
}

#[test]
fn rejects_out_of_range_string_index() {
    let mut fixture = manifest_fixture();
    let at = fixture.first_attribute_name_index;
    fixture.data[at..at + 4].copy_from_slice(&900i32.to_le_bytes());

    let err = read_manifest(&fixture.data).unwrap_err();
    assert_eq!(err.to_string(), "Invalid string index: 900 is out of range");
}

#[test]
fn rejects_mismatched_end_tag() {
    let fixture = manifest_fixture();
    let mut data = fixture.data;
    // Retarget the application end tag at the manifest string.
    let application_end = find_end_tag(&data, 1);
    data[application_end + 20..application_end + 24].copy_from_slice(&0i32.to_le_bytes());

    let err = read_manifest(&data).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Malformed XML: expecting application but found manifest"
    );
}

/// Returns the offset of the `n`-th end tag (1-based) in the tag stream.
fn find_end_tag(data: &[u8], n: usize) -> usize {
    let mut seen = 0;
    let mut offset = 0;
    while offset + 4 <= data.len() {
        let word = i32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]);
        if word == crate::manifest::END_TAG {
            seen += 1;
            if seen == n {
                return offset;
            }
        }
        offset += 4;
    }
    panic!("end tag {n} not found");
}
