//! Serialized log records and the file header/footer.
//!
//! The output is an XML-like text document that must be reproducible byte
//! for byte, so it is assembled by hand rather than through a DOM.

use chrono::{DateTime, NaiveDateTime};

use crate::capability::DeviceInfo;
use crate::position::PositionSnapshot;
use crate::radio::{NeighbourCell, ServingCell};

/// Timestamp layout used in records and file names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Closing tag of every log file
pub const FOOTER: &str = "</logfile>";

// Digits kept after the decimal point. GPS accuracy is ~10 m at best, lat/lng
// keep 9 digits so rounding never adds to that error.
const LAT_LNG_PRECISION: usize = 9;
const ALTITUDE_PRECISION: usize = 1;
const SPEED_PRECISION: usize = 3;
const DOP_PRECISION: usize = 2;
const HEADING_PRECISION: usize = 9;

/// Value used when the modem does not report a device attribute
const UNKNOWN_DEVICE_FIELD: &str = "N/A";

/// Hardware and software identity written in the file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub manufacturer: String,
    pub model: String,
    pub revision: String,
    pub software_id: String,
    pub software_version: String,
}

impl DeviceIdentity {
    /// Build the identity from the modem answer, stripping the quotes some
    /// modems put around model and revision
    pub fn from_device_info(info: &DeviceInfo, software_id: &str, software_version: &str) -> Self {
        let clean = |value: &Option<String>| {
            value
                .as_deref()
                .map(|v| v.trim_matches('"').to_string())
                .unwrap_or_else(|| UNKNOWN_DEVICE_FIELD.to_string())
        };
        Self {
            manufacturer: clean(&info.manufacturer),
            model: clean(&info.model),
            revision: clean(&info.revision),
            software_id: software_id.to_string(),
            software_version: software_version.to_string(),
        }
    }

    /// XML declaration and opening root element
    pub fn header(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <logfile manufacturer=\"{}\" model=\"{}\" revision=\"{}\" swid=\"{}\" swver=\"{}\">\n",
            escape_attribute(&self.manufacturer),
            escape_attribute(&self.model),
            escape_attribute(&self.revision),
            escape_attribute(&self.software_id),
            escape_attribute(&self.software_version),
        )
    }
}

/// One serialized scan. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    jurisdiction: String,
    captured_at: NaiveDateTime,
    text: String,
}

impl LogRecord {
    /// Serialize one admitted sample.
    ///
    /// `captured_at` is the wall-clock capture time, written as the gps
    /// `time` attribute; the scan `time` is the GPS fix time in UTC.
    pub fn new(
        captured_at: NaiveDateTime,
        position: &PositionSnapshot,
        serving: &ServingCell,
        neighbours: &[NeighbourCell],
    ) -> Self {
        let scan_time = DateTime::from_timestamp(position.timestamp, 0)
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default();

        let mut text = format!("<scan time=\"{}\">", scan_time);

        text.push_str(&format!(
            "<gsmserving mcc=\"{}\" mnc=\"{}\" lac=\"{}\" id=\"{}\" ss=\"{}\"",
            escape_attribute(&serving.mcc),
            escape_attribute(&serving.mnc),
            escape_attribute(&serving.lac),
            escape_attribute(&serving.cell_id),
            serving.signal_dbm,
        ));
        if let Some(act) = &serving.access_type {
            text.push_str(&format!(" act=\"{}\"", escape_attribute(act)));
        }
        push_optional(&mut text, "rxlev", serving.rx_level);
        push_optional(&mut text, "tav", serving.timing_advance);
        push_optional(&mut text, "arfcn", serving.arfcn);
        text.push_str("/>");

        for neighbour in neighbours {
            text.push_str(&format!(
                "<gsmneighbour lac=\"{}\" id=\"{}\"",
                escape_attribute(&neighbour.lac),
                escape_attribute(&neighbour.cell_id),
            ));
            push_optional(&mut text, "rxlev", neighbour.rx_level);
            push_optional(&mut text, "arfcn", neighbour.arfcn);
            push_optional(&mut text, "c1", neighbour.c1);
            push_optional(&mut text, "c2", neighbour.c2);
            text.push_str("/>");
        }

        text.push_str(&format!(
            "<gps time=\"{}\" lng=\"{}\" lat=\"{}\" alt=\"{}\" hdg=\"{}\" spe=\"{}\" hdop=\"{}\" vdop=\"{}\" pdop=\"{}\"/>",
            captured_at.format(TIMESTAMP_FORMAT),
            format_trimmed(position.longitude, LAT_LNG_PRECISION),
            format_trimmed(position.latitude, LAT_LNG_PRECISION),
            format_trimmed(position.altitude, ALTITUDE_PRECISION),
            format_trimmed(position.heading, HEADING_PRECISION),
            format_trimmed(position.speed_kmh, SPEED_PRECISION),
            format_trimmed(position.hdop, DOP_PRECISION),
            format_trimmed(position.vdop, DOP_PRECISION),
            format_trimmed(position.pdop, DOP_PRECISION),
        ));
        text.push_str("</scan>\n");

        Self {
            jurisdiction: serving.mcc.clone(),
            captured_at,
            text,
        }
    }

    /// Country code of the serving cell
    pub fn jurisdiction(&self) -> &str {
        &self.jurisdiction
    }

    pub fn captured_at(&self) -> NaiveDateTime {
        self.captured_at
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Serialized size in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

fn push_optional(text: &mut String, name: &str, value: Option<i32>) {
    if let Some(value) = value {
        text.push_str(&format!(" {}=\"{}\"", name, value));
    }
}

/// Fixed-precision decimal with trailing zeros removed, and the decimal
/// point too when nothing remains after it ("35.0" -> "35").
pub fn format_trimmed(value: f64, precision: usize) -> String {
    let formatted = format!("{:.*}", precision, value);
    if !formatted.contains('.') {
        return formatted;
    }
    formatted.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Escape a value for use inside a double-quoted attribute
pub fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
