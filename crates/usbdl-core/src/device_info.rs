//! Device identity record returned by the device-info variable.
//!
//! Offsets live in a versioned [`RecordLayout`] table instead of being
//! scattered through the decoder, so a new firmware revision only needs a new
//! table.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use FieldEncoding::{CStr, U16Le, U32Le};

/// How a field is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEncoding {
    U16Le,
    U32Le,
    /// NUL-terminated string inside a fixed-width slot.
    CStr,
}

/// Location and type of one field in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
    pub encoding: FieldEncoding,
}

impl FieldDescriptor {
    const fn new(name: &'static str, offset: usize, width: usize, encoding: FieldEncoding) -> Self {
        Self {
            name,
            offset,
            width,
            encoding,
        }
    }

    fn end(&self) -> usize {
        self.offset + self.width
    }

    fn decode(&self, buf: &[u8]) -> Option<FieldValue> {
        match self.encoding {
            FieldEncoding::U16Le => {
                let raw = buf.get(self.offset..self.offset + 2)?;
                Some(FieldValue::U16(LittleEndian::read_u16(raw)))
            }
            FieldEncoding::U32Le => {
                let raw = buf.get(self.offset..self.offset + 4)?;
                Some(FieldValue::U32(LittleEndian::read_u32(raw)))
            }
            FieldEncoding::CStr => {
                if buf.len() <= self.offset {
                    return None;
                }
                let slot = &buf[self.offset..self.end().min(buf.len())];
                let text = slot.split(|&b| b == 0).next().unwrap_or_default();
                Some(FieldValue::Text(String::from_utf8_lossy(text).into_owned()))
            }
        }
    }
}

/// A versioned table of field descriptors.
#[derive(Debug, Clone, Copy)]
pub struct RecordLayout {
    pub version: u32,
    pub fields: &'static [FieldDescriptor],
    /// Bytes from here on are kept raw.
    pub trailing_offset: usize,
}

impl RecordLayout {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

pub const FIELD_MESSAGE_SIZE: &str = "message_size";
pub const FIELD_HARDWARE_ID: &str = "hardware_id";
pub const FIELD_HARDWARE_NAME: &str = "hardware_name";
pub const FIELD_BUILD_USER: &str = "build_user";
pub const FIELD_BUILD_DATE: &str = "build_date";
pub const FIELD_BUILD_TIME: &str = "build_time";
pub const FIELD_UNKNOWN: &str = "unknown";
pub const FIELD_HARDWARE_OS_ID: &str = "hardware_os_id";
pub const FIELD_BR_ID: &str = "br_id";

/// Layout observed on current bootloaders.
pub const INFO_LAYOUT_V1: RecordLayout = RecordLayout {
    version: 1,
    fields: &[
        FieldDescriptor::new(FIELD_MESSAGE_SIZE, 0, 2, U16Le),
        FieldDescriptor::new(FIELD_HARDWARE_ID, 16, 4, U32Le),
        FieldDescriptor::new(FIELD_HARDWARE_NAME, 20, 64, CStr),
        FieldDescriptor::new(FIELD_BUILD_USER, 84, 16, CStr),
        FieldDescriptor::new(FIELD_BUILD_DATE, 100, 16, CStr),
        FieldDescriptor::new(FIELD_BUILD_TIME, 116, 16, CStr),
        FieldDescriptor::new(FIELD_UNKNOWN, 132, 4, U32Le),
        FieldDescriptor::new(FIELD_HARDWARE_OS_ID, 188, 4, U32Le),
        FieldDescriptor::new(FIELD_BR_ID, 192, 4, U32Le),
    ],
    trailing_offset: 196,
};

/// Decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    U16(u16),
    U32(u32),
    Text(String),
}

impl FieldValue {
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            FieldValue::U16(v) => Some(u32::from(*v)),
            FieldValue::U32(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::U16(v) => write!(f, "{}", v),
            FieldValue::U32(v) => write!(f, "0x{:X}", v),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Device identity record.
///
/// Fields the buffer is too short for are simply absent.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub layout_version: u32,
    pub fields: Vec<(&'static str, FieldValue)>,
    /// Undecoded bytes after the known fields.
    pub trailing: Vec<u8>,
}

impl DeviceInfo {
    pub fn decode(layout: &RecordLayout, buf: &[u8]) -> Self {
        let fields = layout
            .fields
            .iter()
            .filter_map(|d| d.decode(buf).map(|v| (d.name, v)))
            .collect();
        let trailing = buf.get(layout.trailing_offset..).unwrap_or_default().to_vec();
        Self {
            layout_version: layout.version,
            fields,
            trailing,
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    fn u32_field(&self, name: &str) -> Option<u32> {
        self.get(name).and_then(FieldValue::as_u32)
    }

    fn text_field(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn message_size(&self) -> Option<u16> {
        match self.get(FIELD_MESSAGE_SIZE) {
            Some(FieldValue::U16(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn hardware_id(&self) -> Option<u32> {
        self.u32_field(FIELD_HARDWARE_ID)
    }

    pub fn hardware_name(&self) -> Option<&str> {
        self.text_field(FIELD_HARDWARE_NAME)
    }

    pub fn build_user(&self) -> Option<&str> {
        self.text_field(FIELD_BUILD_USER)
    }

    pub fn build_date(&self) -> Option<&str> {
        self.text_field(FIELD_BUILD_DATE)
    }

    pub fn build_time(&self) -> Option<&str> {
        self.text_field(FIELD_BUILD_TIME)
    }

    pub fn hardware_os_id(&self) -> Option<u32> {
        self.u32_field(FIELD_HARDWARE_OS_ID)
    }

    pub fn br_id(&self) -> Option<u32> {
        self.u32_field(FIELD_BR_ID)
    }

    /// Human-readable report followed by the raw trailing bytes.
    pub fn to_report(&self) -> Vec<u8> {
        const RULE: &str = "===========================================";
        let hex = |v: Option<u32>| v.map_or_else(|| "n/a".to_string(), |v| format!("0x{:X}", v));
        let text = |v: Option<&str>| v.unwrap_or("n/a").to_string();

        let mut out = String::new();
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&format!(
            "Message Size: {}\n",
            self.message_size()
                .map_or_else(|| "n/a".to_string(), |v| v.to_string())
        ));
        out.push_str(&format!(
            "Hardware ID: {} {}\n",
            hex(self.hardware_id()),
            text(self.hardware_name())
        ));
        out.push_str(&format!("Build User: {}\n", text(self.build_user())));
        out.push_str(&format!("Build Date: {}\n", text(self.build_date())));
        out.push_str(&format!("Build Time: {}\n", text(self.build_time())));
        out.push_str(&format!(
            "Unknown value: {}\n",
            hex(self.u32_field(FIELD_UNKNOWN))
        ));
        out.push_str(&format!("Hardware OS ID: {}\n", hex(self.hardware_os_id())));
        out.push_str(&format!("BR ID: {}\n", hex(self.br_id())));
        out.push_str(RULE);
        out.push('\n');

        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.trailing);
        bytes
    }
}
