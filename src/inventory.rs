//! Device inventory: targets and the CSV file they are read from.
//!
//! The inventory is a CSV file with a header row naming at least the columns
//! `device_type`, `IP_Address` and `HostName`. Only rows whose device type is a
//! supported [`TransportKind`] become [`DeviceTarget`]s; other vendors share the file
//! and are skipped without complaint.

use std::fmt;
use std::path::Path;

use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

pub const DEVICE_TYPE_COLUMN: &str = "device_type";
pub const ADDRESS_COLUMN: &str = "IP_Address";
pub const HOSTNAME_COLUMN: &str = "HostName";

/// How the initial management session to a device is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum TransportKind {
    /// Cisco IOS CLI over telnet.
    TelnetCisco,
}

impl TransportKind {
    /// Inventory tag for this transport.
    pub fn tag(&self) -> &'static str {
        match self {
            TransportKind::TelnetCisco => "cisco_ios_telnet",
        }
    }

    /// Looks up a transport by inventory tag. Unknown tags are not supported.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "cisco_ios_telnet" => Some(TransportKind::TelnetCisco),
            _ => None,
        }
    }
}

/// One device to remediate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceTarget {
    pub address: String,
    /// Operator-facing label; falls back to the address.
    pub display_name: String,
    pub transport: TransportKind,
}

impl DeviceTarget {
    pub fn new(address: impl Into<String>, display_name: impl Into<String>) -> Self {
        let address = address.into().trim().to_string();
        let display_name = display_name.into().trim().to_string();
        let display_name = if display_name.is_empty() {
            address.clone()
        } else {
            display_name
        };
        Self {
            address,
            display_name,
            transport: TransportKind::TelnetCisco,
        }
    }

    /// Target for single-device mode, labelled by its address.
    pub fn from_address(address: impl Into<String>) -> Self {
        Self::new(address, "")
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.display_name == self.address {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} ({})", self.display_name, self.address)
        }
    }
}

/// A raw inventory row, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRecord {
    pub device_type: String,
    pub address: String,
    pub hostname: String,
}

impl InventoryRecord {
    /// Converts the row into a target if its device type is supported and it has an address.
    pub fn to_target(&self) -> Option<DeviceTarget> {
        let transport = TransportKind::from_tag(&self.device_type)?;
        if self.address.trim().is_empty() {
            debug!("Skipping inventory row without address: {:?}", self);
            return None;
        }
        let mut target = DeviceTarget::new(self.address.clone(), self.hostname.clone());
        target.transport = transport;
        Some(target)
    }
}

/// Reads and parses an inventory file.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<InventoryRecord>, InventoryError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| InventoryError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse(&text)
}

/// Parses inventory CSV text. Rows too short to carry the address column are dropped.
pub fn parse(text: &str) -> Result<Vec<InventoryRecord>, InventoryError> {
    let mut lines = text
        .trim_start_matches('\u{feff}')
        .lines()
        .filter(|line| !line.trim().is_empty());
    let header = split_csv_line(lines.next().ok_or(InventoryError::Empty)?);
    let column = |name: &'static str| {
        header
            .iter()
            .position(|h| h.trim() == name)
            .ok_or(InventoryError::MissingColumn(name))
    };
    let type_idx = column(DEVICE_TYPE_COLUMN)?;
    let addr_idx = column(ADDRESS_COLUMN)?;
    let host_idx = column(HOSTNAME_COLUMN)?;

    let mut records = Vec::new();
    for (row, line) in lines.enumerate() {
        let fields = split_csv_line(line);
        let (Some(device_type), Some(address)) = (fields.get(type_idx), fields.get(addr_idx))
        else {
            debug!("Skipping malformed inventory row {}: {:?}", row + 2, line);
            continue;
        };
        records.push(InventoryRecord {
            device_type: device_type.trim().to_string(),
            address: address.trim().to_string(),
            hostname: fields
                .get(host_idx)
                .map(|h| h.trim().to_string())
                .unwrap_or_default(),
        });
    }
    Ok(records)
}

/// Keeps only the rows bulk mode can remediate.
pub fn supported_targets(records: &[InventoryRecord]) -> Vec<DeviceTarget> {
    records
        .iter()
        .filter_map(InventoryRecord::to_target)
        .collect()
}

/// Splits one CSV line. Double quotes group a field and `""` inside quotes is a literal quote.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
