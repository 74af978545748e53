//! Radio snapshot types and the conversions applied to raw modem values.

use crate::capability::CellInformation;

/// 3GPP TS 07.07 +CSQ: dBm = 2 * quality - 113
const DBM_OFFSET: i32 = -113;

/// Highest +CSQ signal quality value
const MAX_SIGNAL_QUALITY: f64 = 31.0;

/// Serving cell of a valid snapshot. `lac` and `cell_id` are decimal strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingCell {
    pub mcc: String,
    pub mnc: String,
    pub lac: String,
    pub cell_id: String,
    pub signal_dbm: i32,
    pub access_type: Option<String>,
    pub timing_advance: Option<i32>,
    pub rx_level: Option<i32>,
    pub arfcn: Option<i32>,
}

/// Neighbour cell as reported by the modem, sentinel entries removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighbourCell {
    pub lac: String,
    pub cell_id: String,
    pub rx_level: Option<i32>,
    pub arfcn: Option<i32>,
    pub c1: Option<i32>,
    pub c2: Option<i32>,
}

/// Point-in-time view of the radio.
///
/// A snapshot is valid exactly when it carries a serving cell; every field
/// of that cell comes from the same notification (possibly corrected by
/// the serving-cell query made during the read).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioSnapshot {
    pub serving: Option<ServingCell>,
    pub neighbours: Vec<NeighbourCell>,
    pub call_ongoing: bool,
}

impl RadioSnapshot {
    /// Snapshot with no usable cell data
    pub fn invalid(call_ongoing: bool) -> Self {
        Self {
            serving: None,
            neighbours: Vec::new(),
            call_ongoing,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.serving.is_some()
    }

    /// Mobile country code of the serving cell, if valid
    pub fn mcc(&self) -> Option<&str> {
        self.serving.as_ref().map(|cell| cell.mcc.as_str())
    }
}

/// Convert a 0-100 signal percentage to dBm.
///
/// The modem computes the percentage as `round(ln(q) / ln(31) * 100)` from
/// the +CSQ quality `q`, so the inverse is `q = round(exp(p * ln(31) / 100))`.
/// Returns `None` for 0 % (unknown signal) and for values above 100.
pub fn percent_to_dbm(percent: u8) -> Option<i32> {
    if percent == 0 || percent > 100 {
        return None;
    }
    let quality = (f64::from(percent) * MAX_SIGNAL_QUALITY.ln() / 100.0).exp().round();
    Some(quality as i32 * 2 + DBM_OFFSET)
}

/// Parse a hexadecimal modem value ("1A" or "0x1A") to its decimal string
pub fn hex_to_decimal(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 16).ok().map(|v| v.to_string())
}

/// Split an operator code ("20801") into MCC and MNC, leading zeros removed
pub fn split_operator_code(code: &str) -> Option<(String, String)> {
    let mcc = code.get(..3)?;
    let mnc = code.get(3..)?;
    Some((
        mcc.trim_start_matches('0').to_string(),
        mnc.trim_start_matches('0').to_string(),
    ))
}

/// Decimal lac and cell id of a cell entry, or `None` when the entry is a
/// sentinel (lac 0, cell id 0, receive level 0) or unparsable.
pub(crate) fn usable_cell_ids(info: &CellInformation) -> Option<(String, String)> {
    let lac = hex_to_decimal(info.lac.as_deref()?)?;
    let cid = hex_to_decimal(info.cid.as_deref()?)?;
    if lac == "0" || cid == "0" || info.rxlev == Some(0) {
        return None;
    }
    Some((lac, cid))
}

impl NeighbourCell {
    pub(crate) fn from_information(info: &CellInformation) -> Option<Self> {
        let (lac, cell_id) = usable_cell_ids(info)?;
        Some(Self {
            lac,
            cell_id,
            rx_level: info.rxlev,
            arfcn: info.arfcn,
            c1: info.c1,
            c2: info.c2,
        })
    }
}
