use crate::cursor::ByteCursor;
use crate::error::{ApkError, ApkResult};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

pub(crate) const START_TAG: i32 = 0x0010_0102;
pub(crate) const END_TAG: i32 = 0x0010_0103;
pub(crate) const END_DOC_TAG: i32 = 0x0010_0101;

// The header word at this offset holds the base offset of the tag stream.
const TAG_BASE_OFFSET: usize = 12;
// The header word at this offset holds the string table entry count.
const STRING_COUNT_OFFSET: usize = 16;
// The string index table is an array of 32-bit offsets starting here.
const STRING_INDEX_TABLE_OFFSET: usize = 0x24;

/// A single attribute attached to a manifest element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlAttribute {
    pub name: String,
    pub value: String,
}

/// DOM-style element node reconstructed from the binary manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlElement {
    pub tag: String,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlElement>,
    pub text: Option<String>,
}

impl XmlElement {
    pub fn new(tag: impl Into<String>) -> Self {
        XmlElement {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    pub fn with_text(tag: impl Into<String>, text: impl Into<String>) -> Self {
        XmlElement {
            text: Some(text.into()),
            ..XmlElement::new(tag)
        }
    }

    /// Returns the value of the first attribute with the given name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.push(XmlAttribute {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn append_child(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    pub fn find_child(&self, tag: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.tag == tag)
    }

    /// Concatenated text of this element and all its descendants, in
    /// document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Serializes the element (and its subtree) as UTF-8 XML text.
    pub fn to_xml_string(&self) -> ApkResult<String> {
        let mut writer = Writer::new(Vec::new());
        write_element_xml(self, &mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|err| ApkError::Xml(err.to_string()))
    }
}

fn write_element_xml(element: &XmlElement, writer: &mut Writer<Vec<u8>>) -> ApkResult<()> {
    let mut start = BytesStart::new(element.tag.as_str());
    for attr in &element.attributes {
        start.push_attribute((attr.name.as_str(), attr.value.as_str()));
    }
    writer.write_event(Event::Start(start))?;
    if let Some(text) = &element.text {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    for child in &element.children {
        write_element_xml(child, writer)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.tag.as_str())))?;
    Ok(())
}

/// Reconstructs the XML tree from a binary `AndroidManifest.xml` blob.
///
/// The returned element is a synthetic `root` wrapper whose first child is
/// the manifest element. Attribute values backed by a resource id instead of
/// a string are emitted as `@<decimal-id>` placeholders to be resolved
/// against the resource map later.
pub fn read_manifest(data: &[u8]) -> ApkResult<XmlElement> {
    let parser = BinaryXmlParser { data };
    parser.parse()
}

struct BinaryXmlParser<'a> {
    data: &'a [u8],
}

impl BinaryXmlParser<'_> {
    fn parse(&self) -> ApkResult<XmlElement> {
        let mut stack = vec![XmlElement::new("root")];
        let mut offset = self.find_start_of_tags()?;

        while offset + 4 <= self.data.len() {
            let mut cur = ByteCursor::new(self.data);
            cur.seek(offset)?;
            let code = cur.read_i32()?;
            match code {
                START_TAG => {
                    offset += self.read_start_tag(&mut cur, &mut stack)?;
                }
                END_TAG => {
                    offset += self.read_end_tag(&mut cur, &mut stack)?;
                }
                END_DOC_TAG => break,
                other => {
                    return Err(ApkError::Malformed(format!("Invalid tag code: {other}")));
                }
            }
        }

        // Unclosed elements still belong to their parents.
        while stack.len() > 1 {
            let element = match stack.pop() {
                Some(element) => element,
                None => break,
            };
            if let Some(parent) = stack.last_mut() {
                parent.children.push(element);
            }
        }
        stack.pop().ok_or_else(|| {
            ApkError::Malformed("Manifest element stack underflow".to_string())
        })
    }

    /// Scans forward word-by-word from the base offset in the header until
    /// the first start-tag code; falls back to the base offset itself.
    fn find_start_of_tags(&self) -> ApkResult<usize> {
        let mut cur = ByteCursor::new(self.data);
        cur.seek(TAG_BASE_OFFSET)?;
        let base = cur.read_i32()?;
        let base = usize::try_from(base).map_err(|_| {
            ApkError::Malformed("Invalid tag stream base offset".to_string())
        })?;

        let mut offset = base;
        while offset + 4 < self.data.len() {
            cur.seek(offset)?;
            if cur.read_i32()? == START_TAG {
                return Ok(offset);
            }
            offset += 4;
        }
        Ok(base)
    }

    /// Decodes a start tag (9 words plus 5 words per attribute), pushes the
    /// new element and returns the number of consumed bytes.
    fn read_start_tag(
        &self,
        cur: &mut ByteCursor<'_>,
        stack: &mut Vec<XmlElement>,
    ) -> ApkResult<usize> {
        cur.skip(12)?; // flags, line number, comment
        let _namespace_index = cur.read_i32()?;
        let name_index = cur.read_i32()?;
        cur.skip(4)?; // attribute start/size words
        let attribute_count = cur.read_i32()?.max(0);
        cur.skip(4)?; // id/class/style indices

        let mut element = XmlElement::new(self.string_at(name_index)?);
        for _ in 0..attribute_count {
            let _attr_namespace_index = cur.read_i32()?;
            let attr_name_index = cur.read_i32()?;
            let attr_value_index = cur.read_i32()?;
            let _attr_flags = cur.read_i32()?;
            let attr_resource_id = cur.read_i32()?;

            let name = self.string_at(attr_name_index)?;
            // Only the -1 sentinel means "value lives in the resource id";
            // any other negative index is corrupt.
            let value = match attr_value_index {
                -1 => format!("@{attr_resource_id}"),
                _ => self.string_at(attr_value_index)?,
            };
            element.attributes.push(XmlAttribute { name, value });
        }

        stack.push(element);
        Ok(9 * 4 + attribute_count as usize * 5 * 4)
    }

    /// Decodes an end tag (6 words), verifying tag-name symmetry against the
    /// stack top, then pops it into its parent.
    fn read_end_tag(
        &self,
        cur: &mut ByteCursor<'_>,
        stack: &mut Vec<XmlElement>,
    ) -> ApkResult<usize> {
        cur.skip(12)?;
        let _namespace_index = cur.read_i32()?;
        let name_index = cur.read_i32()?;
        let tag_name = self.string_at(name_index)?;

        let element = match stack.pop() {
            Some(element) if stack.is_empty() => {
                // Only the synthetic root is left; put it back.
                stack.push(element);
                return Err(ApkError::Malformed(
                    "End tag without matching start tag".to_string(),
                ));
            }
            Some(element) => element,
            None => {
                return Err(ApkError::Malformed(
                    "End tag without matching start tag".to_string(),
                ));
            }
        };
        if element.tag != tag_name {
            return Err(ApkError::Malformed(format!(
                "Malformed XML: expecting {} but found {}",
                element.tag, tag_name
            )));
        }
        if let Some(parent) = stack.last_mut() {
            parent.children.push(element);
        }
        Ok(6 * 4)
    }

    /// Resolves an index into the string table that follows the string index
    /// table at 0x24. Each entry is a 16-bit UTF-16 unit count followed by
    /// that many units.
    fn string_at(&self, index: i32) -> ApkResult<String> {
        if index < 0 {
            return Err(ApkError::Malformed(
                "Invalid string index: Must not be negative".to_string(),
            ));
        }

        let mut cur = ByteCursor::new(self.data);
        cur.seek(STRING_COUNT_OFFSET)?;
        let string_count = cur.read_i32()?;
        if index >= string_count {
            return Err(ApkError::Malformed(format!(
                "Invalid string index: {index} is out of range"
            )));
        }

        cur.seek(STRING_INDEX_TABLE_OFFSET + index as usize * 4)?;
        let relative = cur.read_i32()?;

        let table_start = STRING_INDEX_TABLE_OFFSET as i64 + string_count as i64 * 4;
        let target = usize::try_from(table_start + relative as i64).map_err(|_| {
            ApkError::Malformed("String offset exceeds document bounds".to_string())
        })?;
        cur.seek(target)?;

        let length = cur.read_i16()?;
        if length < 0 {
            return Err(ApkError::Malformed(
                "String length must not be negative".to_string(),
            ));
        }
        let bytes = cur.read_bytes(length as usize * 2)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }
}
