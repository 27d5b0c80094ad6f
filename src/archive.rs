use std::collections::BTreeMap;
use std::io::{Read, Seek};

use log::debug;
use serde::Serialize;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{ApkError, ApkResult};
use crate::manifest::{read_manifest, XmlElement};
use crate::resources::{decode_resources, ResourceMap};
use crate::xpath::{select_all, select_first};

/// Key of the version code entry in [`ApkMetadata::all_fields`].
pub const MANIFEST_VERSION_CODE_KEY: &str = "VersionCode";
/// Key of the requested permissions entry in [`ApkMetadata::all_fields`].
pub const MANIFEST_PERMISSION_ARRAY_KEY: &str = "Permissions";
/// Key of the launcher icon paths entry in [`ApkMetadata::all_fields`].
pub const MANIFEST_ICON_FILE_NAMES_KEY: &str = "Icons";
/// Separator used for multi-valued entries in [`ApkMetadata::all_fields`].
pub const MANIFEST_ARRAY_SEPARATOR: &str = ",";

const ANDROID_MANIFEST_FILE_NAME: &str = "AndroidManifest.xml";
const ANDROID_RESOURCE_FILE_NAME: &str = "resources.arsc";

/// Package metadata extracted from an APK's manifest and resource table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApkMetadata {
    /// Application id, e.g. `com.example.app`.
    pub package: String,
    /// Human-readable version name.
    pub version: String,
    /// Target architecture; APKs do not declare one, so this stays empty.
    pub architecture: String,
    /// Application label, resolved through the resource table when needed.
    pub description: String,
    /// Secondary fields keyed by the `MANIFEST_*_KEY` constants.
    pub all_fields: BTreeMap<String, String>,
}

/// Reads [`ApkMetadata`] out of APK archives.
pub struct ApkPackageReader;

impl ApkPackageReader {
    /// Extracts the package metadata from an APK archive.
    ///
    /// Both `AndroidManifest.xml` and `resources.arsc` must be present in
    /// the archive.
    pub fn metadata<R: Read + Seek>(reader: R) -> ApkResult<ApkMetadata> {
        let mut archive = ZipArchive::new(reader)?;

        let manifest_data = read_zip_entry(&mut archive, ANDROID_MANIFEST_FILE_NAME)?
            .ok_or_else(|| {
                ApkError::Malformed("The apk doesn't contain a manifest.".to_string())
            })?;
        let resource_data = read_zip_entry(&mut archive, ANDROID_RESOURCE_FILE_NAME)?
            .ok_or_else(|| {
                ApkError::Malformed("The apk doesn't contain a resource file.".to_string())
            })?;

        let manifest = read_manifest(&manifest_data)?;
        let resources = decode_resources(&resource_data)?;
        debug!(
            "decoded manifest ({} bytes) and {} resource entries",
            manifest_data.len(),
            resources.len()
        );

        extract_metadata(&manifest, &resources)
    }
}

fn read_zip_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> ApkResult<Option<Vec<u8>>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data)?;
    if data.len() as u64 != entry.size() {
        return Err(ApkError::Truncated(
            "Could not read all bytes from input stream".to_string(),
        ));
    }
    Ok(Some(data))
}

fn extract_metadata(
    manifest: &XmlElement,
    resources: &ResourceMap,
) -> ApkResult<ApkMetadata> {
    let package = select_first(manifest, "/*/manifest[1]/@package", resources)?;
    let version = select_first(manifest, "/*/manifest[1]/@versionName", resources)?;
    let description =
        select_first(manifest, "/*/manifest[1]/application[1]/@label", resources)?;
    let version_code = select_first(manifest, "/*/manifest[1]/@versionCode", resources)?;

    let permissions = select_all(
        manifest,
        "/*/manifest[1]/uses-permission/@name",
        resources,
        false,
    )?
    .join(MANIFEST_ARRAY_SEPARATOR);

    // Vector drawables can't be served as raw image files.
    let icons = select_all(
        manifest,
        "/*/manifest[1]/application[1]/@icon",
        resources,
        true,
    )?
    .into_iter()
    .filter(|path| !path.to_ascii_lowercase().ends_with(".xml"))
    .collect::<Vec<_>>()
    .join(MANIFEST_ARRAY_SEPARATOR);

    let mut all_fields = BTreeMap::new();
    all_fields.insert(MANIFEST_VERSION_CODE_KEY.to_string(), version_code);
    all_fields.insert(MANIFEST_PERMISSION_ARRAY_KEY.to_string(), permissions);
    all_fields.insert(MANIFEST_ICON_FILE_NAMES_KEY.to_string(), icons);

    Ok(ApkMetadata {
        package,
        version,
        architecture: String::new(),
        description,
        all_fields,
    })
}
