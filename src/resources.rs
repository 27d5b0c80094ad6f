use std::collections::BTreeMap;

use bitflags::bitflags;
use log::debug;

use crate::cursor::ByteCursor;
use crate::error::{ApkError, ApkResult};
use crate::string_pool::StringPool;

pub(crate) const RES_STRING_POOL_TYPE: u16 = 0x0001;
pub(crate) const RES_TABLE_TYPE: u16 = 0x0002;
pub(crate) const RES_TABLE_PACKAGE_TYPE: u16 = 0x0200;
pub(crate) const RES_TABLE_TYPE_TYPE: u16 = 0x0201;
pub(crate) const RES_TABLE_TYPE_SPEC_TYPE: u16 = 0x0202;

const TYPE_REFERENCE: u8 = 0x01;
const TYPE_STRING: u8 = 0x03;

bitflags! {
    #[derive(Clone, Copy, Debug)]
    struct EntryFlags: u16 {
        const COMPLEX = 0x0001;
    }
}

/// Resource-id keys (`@7F010000` style, uppercase hex) mapped to the values
/// recorded for every configuration of that resource, in table order.
pub type ResourceMap = BTreeMap<String, Vec<String>>;

/// Common 8-byte prefix shared by all resource table chunks.
#[derive(Clone, Copy, Debug)]
struct ChunkHeader {
    chunk_type: u16,
    header_size: u16,
    size: u32,
    start: usize,
}

impl ChunkHeader {
    fn read(cur: &mut ByteCursor<'_>) -> ApkResult<Self> {
        let start = cur.position();
        cur.require(8)?;
        let chunk_type = cur.read_u16()?;
        let header_size = cur.read_u16()?;
        let size = cur.read_u32()?;
        // A chunk that claims to be smaller than its own header would make
        // the sibling walk loop forever.
        if size < 8 || size < header_size as u32 {
            return Err(ApkError::Malformed(
                "Invalid chunk sizing in resource table".to_string(),
            ));
        }
        Ok(ChunkHeader {
            chunk_type,
            header_size,
            size,
            start,
        })
    }

    fn end(&self) -> usize {
        self.start + self.size as usize
    }
}

/// Decodes the string and reference entries of a `resources.arsc` table into
/// a flat [`ResourceMap`].
///
/// Only the entry values needed to resolve manifest placeholders are kept;
/// configuration qualifiers are ignored, so a resource defined for several
/// locales yields several values under the same key.
pub fn decode_resources(data: &[u8]) -> ApkResult<ResourceMap> {
    let mut decoder = Decoder {
        cur: ByteCursor::new(data),
        value_pool_seen: false,
        value_strings: StringPool::default(),
        type_strings: StringPool::default(),
        key_strings: StringPool::default(),
        package_id: 0,
        map: ResourceMap::new(),
    };
    decoder.run()?;
    Ok(decoder.map)
}

struct Decoder<'a> {
    cur: ByteCursor<'a>,
    value_pool_seen: bool,
    value_strings: StringPool,
    type_strings: StringPool,
    key_strings: StringPool,
    package_id: i32,
    map: ResourceMap,
}

impl Decoder<'_> {
    fn run(&mut self) -> ApkResult<()> {
        self.cur.require(12)?;
        let table_type = self.cur.read_u16()?;
        let _header_size = self.cur.read_u16()?;
        let _size = self.cur.read_u32()?;
        if table_type != RES_TABLE_TYPE {
            return Err(ApkError::Malformed("No RES_TABLE_TYPE found!".to_string()));
        }
        let package_count = self.cur.read_i32()?;

        // The global value string pool precedes the package chunks and
        // counts as one extra sibling.
        for _ in 0..(package_count as i64 + 1) {
            let header = ChunkHeader::read(&mut self.cur)?;
            match header.chunk_type {
                RES_STRING_POOL_TYPE => {
                    // Only the first pool sibling is the value pool, even
                    // when it holds no strings.
                    if !self.value_pool_seen {
                        self.value_pool_seen = true;
                        self.value_strings =
                            StringPool::parse(&mut self.cur, header.start)?;
                    }
                }
                RES_TABLE_PACKAGE_TYPE => self.package(&header)?,
                _ => return Err(ApkError::Malformed("Unsupported Type".to_string())),
            }
            self.cur.skip_to(header.end())?;
        }
        Ok(())
    }

    fn package(&mut self, chunk: &ChunkHeader) -> ApkResult<()> {
        self.cur.require(276)?;
        let id = self.cur.read_i32()?;
        let name = self.cur.read_fixed_utf16_string(128)?;
        let type_strings = self.cur.read_i32()?;
        let _last_public_type = self.cur.read_i32()?;
        let key_strings = self.cur.read_i32()?;
        let _last_public_key = self.cur.read_i32()?;
        debug!("decoding package {name} (id {id:#04x})");
        self.package_id = id;

        if type_strings != chunk.header_size as i32 {
            return Err(ApkError::Malformed(
                "TypeStrings must immediately follow the package structure header."
                    .to_string(),
            ));
        }
        let type_strings = type_strings as usize;
        let key_strings = usize::try_from(key_strings).map_err(|_| {
            ApkError::Malformed("Invalid key string pool offset".to_string())
        })?;

        self.cur.skip_to(chunk.start + type_strings)?;
        let type_pool_header = ChunkHeader::read(&mut self.cur)?;
        self.type_strings = StringPool::parse(&mut self.cur, type_pool_header.start)?;

        self.cur.skip_to(chunk.start + key_strings)?;
        let key_pool_header = ChunkHeader::read(&mut self.cur)?;
        self.key_strings = StringPool::parse(&mut self.cur, key_pool_header.start)?;
        self.cur
            .skip_to(chunk.start + key_strings + key_pool_header.size as usize)?;

        // Type specs and type chunks fill the remainder of the package.
        while self.cur.position() < chunk.end() {
            let header = ChunkHeader::read(&mut self.cur)?;
            match header.chunk_type {
                RES_TABLE_TYPE_SPEC_TYPE => self.type_spec()?,
                RES_TABLE_TYPE_TYPE => self.type_chunk(&header)?,
                _ => {}
            }
            self.cur.seek(header.end())?;
        }
        Ok(())
    }

    fn type_spec(&mut self) -> ApkResult<()> {
        self.cur.require(8)?;
        let id = self.cur.read_u8()?;
        let _res0 = self.cur.read_u8()?;
        let _res1 = self.cur.read_u16()?;
        let entry_count = self.cur.read_u32()?;
        let type_name = self.type_strings.get(id as i32 - 1)?;
        debug!("skipping type spec {type_name} with {entry_count} entries");
        self.cur.skip(entry_count as i64 * 4)?;
        Ok(())
    }

    fn type_chunk(&mut self, chunk: &ChunkHeader) -> ApkResult<()> {
        self.cur.require(16)?;
        let id = self.cur.read_u8()?;
        let _res0 = self.cur.read_u8()?;
        let _res1 = self.cur.read_u16()?;
        let entry_count = self.cur.read_i32()?;
        let entries_start = self.cur.read_i32()?;
        let _config_size = self.cur.read_i32()?;
        // Skip the rest of the header, configuration block included.
        self.cur.skip(chunk.header_size as i64 - 8 - 16)?;

        // Widen before multiplying; entry_count is wire-controlled and the
        // i32 product can overflow.
        if entry_count < 0
            || chunk.header_size as i64 + entry_count as i64 * 4 != entries_start as i64
        {
            return Err(ApkError::Malformed(
                "HeaderSize, entryCount and entriesStart are not valid.".to_string(),
            ));
        }

        let mut offsets = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            offsets.push(self.cur.read_i32()?);
        }

        // References point at entries that may live in a later type chunk of
        // this package; resolving after the chunk keeps in-chunk order.
        let mut pending: BTreeMap<String, i32> = BTreeMap::new();
        for (index, offset) in offsets.iter().enumerate() {
            if *offset == -1 {
                continue;
            }
            let resource_id =
                (self.package_id << 24) | ((id as i32) << 16) | index as i32;
            self.entry(resource_id, &mut pending)?;
        }

        for (id_key, target) in pending {
            let target_key = format!("@{:04X}", target);
            if let Some(values) = self.map.get(&target_key).cloned() {
                for value in values {
                    self.add(&id_key, value);
                }
            }
        }
        Ok(())
    }

    fn entry(
        &mut self,
        resource_id: i32,
        pending: &mut BTreeMap<String, i32>,
    ) -> ApkResult<()> {
        self.cur.require(8)?;
        let _entry_size = self.cur.read_i16()?;
        let flags = EntryFlags::from_bits_retain(self.cur.read_u16()?);
        let key = self.cur.read_i32()?;
        let key_name = self.key_strings.get(key)?.to_string();
        let id_key = format!("{:04X}", resource_id);

        if flags.contains(EntryFlags::COMPLEX) {
            let _parent = self.cur.read_i32()?;
            let count = self.cur.read_i32()?;
            debug!("skipping complex entry {key_name} with {count} items");
            for _ in 0..count {
                let _name = self.cur.read_i32()?;
                let _value_size = self.cur.read_i16()?;
                let _res0 = self.cur.read_u8()?;
                let _data_type = self.cur.read_u8()?;
                let _data = self.cur.read_i32()?;
            }
            return Ok(());
        }

        self.cur.require(8)?;
        let _value_size = self.cur.read_i16()?;
        let _res0 = self.cur.read_u8()?;
        let data_type = self.cur.read_u8()?;
        let data = self.cur.read_i32()?;
        debug!("entry {key_name} ({id_key}) type {data_type:#04x}");

        match data_type {
            TYPE_STRING => {
                let value = self.value_strings.get(data)?.to_string();
                self.add(&id_key, value);
            }
            TYPE_REFERENCE => {
                pending.insert(id_key, data);
            }
            _ => self.add(&id_key, data.to_string()),
        }
        Ok(())
    }

    fn add(&mut self, id_key: &str, value: String) {
        self.map
            .entry(format!("@{id_key}"))
            .or_default()
            .push(value);
    }
}
