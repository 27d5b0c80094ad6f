//! # apkmeta
//!
//! A library for reading package metadata out of Android APK archives.
//!
//! The crate decodes the binary `AndroidManifest.xml` and `resources.arsc`
//! files that ship inside every APK, resolves resource references between
//! them and surfaces the interesting fields as [`ApkMetadata`].

use std::fs::File;
use std::path::Path;

pub mod archive;
pub mod cursor;
pub mod error;
pub mod manifest;
pub mod resources;
pub mod string_pool;
pub mod xpath;

#[cfg(test)]
mod tests;

pub use archive::{
    ApkMetadata, ApkPackageReader, MANIFEST_ARRAY_SEPARATOR, MANIFEST_ICON_FILE_NAMES_KEY,
    MANIFEST_PERMISSION_ARRAY_KEY, MANIFEST_VERSION_CODE_KEY,
};
pub use error::{ApkError, ApkResult};
pub use manifest::{read_manifest, XmlAttribute, XmlElement};
pub use resources::{decode_resources, ResourceMap};
pub use string_pool::StringPool;
pub use xpath::{select_all, select_first};

/// Opens an APK file from disk and extracts its package metadata.
///
/// # Examples
///
/// ```no_run
/// let metadata = apkmeta::read_apk_metadata("app.apk").unwrap();
/// println!("{} {}", metadata.package, metadata.version);
/// ```
pub fn read_apk_metadata(path: impl AsRef<Path>) -> ApkResult<ApkMetadata> {
    let file = File::open(path)?;
    ApkPackageReader::metadata(file)
}
