//! Volume definitions in the libvirt storage-volume XML format.
//!
//! Only the fields bootvol sets are modelled:
//!
//! ```xml
//! <volume>
//!   <name>node1</name>
//!   <capacity unit="B">32</capacity>
//!   <target>
//!     <format type="raw"/>
//!   </target>
//! </volume>
//! ```

use bootvol_shared::errors::{BootvolError, BootvolResult};

pub const CAPACITY_UNIT: &str = "B";
pub const FORMAT_RAW: &str = "raw";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capacity {
    pub unit: String,
    pub value: u64,
}

/// Shape of a volume to be created on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDescriptor {
    pub name: String,
    pub capacity: Capacity,
    pub format: String,
}

impl VolumeDescriptor {
    /// Raw volume of exactly `bytes` bytes.
    pub fn raw(name: impl Into<String>, bytes: u64) -> Self {
        Self {
            name: name.into(),
            capacity: Capacity {
                unit: CAPACITY_UNIT.to_string(),
                value: bytes,
            },
            format: FORMAT_RAW.to_string(),
        }
    }

    /// Declared capacity converted to bytes.
    pub fn capacity_bytes(&self) -> BootvolResult<u64> {
        let scale: u64 = match self.capacity.unit.as_str() {
            "B" | "bytes" => 1,
            "KiB" | "K" | "k" => 1 << 10,
            "MiB" | "M" => 1 << 20,
            "GiB" | "G" => 1 << 30,
            "TiB" | "T" => 1 << 40,
            other => {
                return Err(BootvolError::Config(format!(
                    "unsupported capacity unit '{}'",
                    other
                )));
            }
        };
        self.capacity.value.checked_mul(scale).ok_or_else(|| {
            BootvolError::Config(format!(
                "capacity {}{} overflows",
                self.capacity.value, self.capacity.unit
            ))
        })
    }

    pub fn to_xml(&self) -> String {
        format!(
            "<volume>\n  <name>{}</name>\n  <capacity unit=\"{}\">{}</capacity>\n  <target>\n    <format type=\"{}\"/>\n  </target>\n</volume>\n",
            escape(&self.name),
            escape(&self.capacity.unit),
            self.capacity.value,
            escape(&self.format),
        )
    }

    /// Parse a definition produced by [`to_xml`](Self::to_xml) or written by
    /// hand in the same shape. Unknown elements are ignored.
    pub fn from_xml(xml: &str) -> BootvolResult<Self> {
        let invalid = |what: &str| BootvolError::Config(format!("invalid volume XML: {}", what));

        let (_, name) = element(xml, "name").ok_or_else(|| invalid("missing <name>"))?;
        let name = unescape(name.trim());
        if name.is_empty() {
            return Err(invalid("empty <name>"));
        }

        let (attrs, value) =
            element(xml, "capacity").ok_or_else(|| invalid("missing <capacity>"))?;
        let value = value
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(&format!("bad capacity: {}", e)))?;
        let unit = attribute(attrs, "unit")
            .map(unescape)
            .unwrap_or_else(|| CAPACITY_UNIT.to_string());

        let format = element(xml, "format")
            .and_then(|(attrs, _)| attribute(attrs, "type"))
            .map(unescape)
            .unwrap_or_else(|| FORMAT_RAW.to_string());

        Ok(Self {
            name,
            capacity: Capacity { unit, value },
            format,
        })
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Find the first `<tag ...>text</tag>` or `<tag .../>`, returning the raw
/// attribute string and inner text.
fn element<'a>(xml: &'a str, tag: &str) -> Option<(&'a str, &'a str)> {
    let open = format!("<{}", tag);
    let mut from = 0;
    while let Some(pos) = xml[from..].find(&open) {
        let start = from + pos + open.len();
        let rest = &xml[start..];
        // Skip longer tag names sharing the prefix, e.g. <names>.
        match rest.chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_whitespace() => {}
            _ => {
                from = start;
                continue;
            }
        }
        let end = rest.find('>')?;
        let head = &rest[..end];
        if let Some(attrs) = head.strip_suffix('/') {
            return Some((attrs.trim(), ""));
        }
        let body = &rest[end + 1..];
        let close = format!("</{}>", tag);
        let text_end = body.find(&close)?;
        return Some((head.trim(), &body[..text_end]));
    }
    None
}

fn attribute<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    for quote in ['"', '\''] {
        let needle = format!("{}={}", name, quote);
        if let Some(pos) = attrs.find(&needle) {
            let value = &attrs[pos + needle.len()..];
            let end = value.find(quote)?;
            return Some(&value[..end]);
        }
    }
    None
}
