//! # Radio State Module
//!
//! Last-known cellular network attributes, updated by asynchronous modem
//! notifications and read by the sampling tick.
//!
//! All radio fields live behind a single lock, so a reader sees either
//! every field of one notification or an invalid snapshot, never a mix.
//! Notifications are delivered through an inbox ([`spawn_radio_inbox`])
//! and applied in arrival order by one consumer task. A failing handler
//! invalidates the snapshot instead of leaving it half updated; the
//! failure is published on the [`EventBus`] and never returned to the
//! notification source.

pub mod snapshot;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capability::{NetworkStatus, RadioCapability};
use crate::error::{CapabilityError, LoggerError};
use crate::events::{EventBus, LoggerEvent};

pub use snapshot::{
    hex_to_decimal, percent_to_dbm, split_operator_code, NeighbourCell, RadioSnapshot,
    ServingCell,
};

/// Call status meaning the call is over
const CALL_STATUS_RELEASE: &str = "release";

/// A notification pushed by the modem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// Full network status (registration, operator, cell, signal)
    NetworkStatus(NetworkStatus),
    /// Signal strength only, 0-100 %
    SignalStrength(u8),
    /// A call changed state; the full call list is re-read
    CallStatus { index: i32, status: String },
}

/// Why a notification could not be applied
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RadioUpdateError {
    #[error("registration status is '{0}', GSM data not available")]
    NotRegistered(String),

    #[error("required GSM field '{0}' is missing")]
    MissingField(&'static str),

    #[error("GSM field '{field}' has unparsable value '{value}'")]
    Malformed { field: &'static str, value: String },

    #[error("GSM strength ({0}) not suitable")]
    UnusableStrength(u8),

    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

/// Cell attributes derived from one network status notification
#[derive(Debug, Clone, PartialEq, Eq)]
struct NotifiedCell {
    mcc: String,
    mnc: String,
    lac: String,
    cid: String,
    signal_dbm: i32,
    access_type: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    cell: Option<NotifiedCell>,
    call_ongoing: bool,
}

/// Owner of the mutable radio state.
pub struct RadioState {
    capability: Arc<dyn RadioCapability>,
    inner: Mutex<Inner>,
    events: EventBus,
}

impl std::fmt::Debug for RadioState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioState")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl RadioState {
    /// Create an empty (invalid) radio state
    pub fn new(capability: Arc<dyn RadioCapability>, events: EventBus) -> Self {
        Self {
            capability,
            inner: Mutex::new(Inner::default()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one notification.
    pub fn apply(&self, event: RadioEvent) {
        match event {
            RadioEvent::NetworkStatus(status) => self.update(&status),
            RadioEvent::SignalStrength(percent) => self.update_signal_strength(percent),
            RadioEvent::CallStatus { index, status } => {
                debug!("Call {} is now '{}'", index, status);
                self.update_call_status();
            }
        }
    }

    /// Apply a full network status notification.
    ///
    /// Anything other than a home or roaming registration with every
    /// required field present clears the whole snapshot.
    pub fn update(&self, status: &NetworkStatus) {
        debug!("Wait for updating GSM data");
        let (cell, failure) = match parse_network_status(status) {
            Ok(cell) => {
                info!(
                    "MCC {} MNC {} LAC {} CID {} strength {} dBm (registration {})",
                    cell.mcc, cell.mnc, cell.lac, cell.cid, cell.signal_dbm, status.registration
                );
                (Some(cell), None)
            }
            Err(e) => {
                warn!("Unable to get GSM data: {}", e);
                (None, Some(e))
            }
        };

        let valid = cell.is_some();
        {
            let mut inner = self.lock();
            debug!("Lock acquired, updating GSM data");
            inner.cell = cell;
        }
        debug!("GSM data updated, lock released");

        if let Some(e) = failure {
            self.events.publish(LoggerEvent::RadioHandlerFailed { reason: e.to_string() });
        }
        self.events.publish(LoggerEvent::RadioUpdated { valid });
    }

    /// Update the signal strength alone; ignored while the snapshot is invalid.
    pub fn update_signal_strength(&self, percent: u8) {
        let outcome = {
            let mut inner = self.lock();
            match percent_to_dbm(percent) {
                _ if inner.cell.is_none() => None,
                Some(dbm) => {
                    if let Some(cell) = inner.cell.as_mut() {
                        cell.signal_dbm = dbm;
                    }
                    Some(Ok(dbm))
                }
                None => {
                    inner.cell = None;
                    Some(Err(RadioUpdateError::UnusableStrength(percent)))
                }
            }
        };

        match outcome {
            None => {
                info!("Signal strength {}% discarded, GSM data currently invalid", percent);
            }
            Some(Ok(dbm)) => {
                debug!("Signal strength updated to {} dBm ({}%)", dbm, percent);
                self.events.publish(LoggerEvent::RadioUpdated { valid: true });
            }
            Some(Err(e)) => {
                warn!("Unable to update signal strength: {}", e);
                self.events.publish(LoggerEvent::RadioHandlerFailed { reason: e.to_string() });
                self.events.publish(LoggerEvent::RadioUpdated { valid: false });
            }
        }
    }

    /// Recompute the call flag from the modem's full call list.
    pub fn update_call_status(&self) {
        match self.capability.list_calls() {
            Ok(calls) => {
                let ongoing = calls.iter().any(|call| call.status != CALL_STATUS_RELEASE);
                self.mark_call_ongoing(ongoing);
            }
            Err(e) => {
                let e = RadioUpdateError::from(e);
                warn!("Unable to list calls, invalidating GSM data: {}", e);
                self.lock().cell = None;
                self.events.publish(LoggerEvent::RadioHandlerFailed { reason: e.to_string() });
                self.events.publish(LoggerEvent::RadioUpdated { valid: false });
            }
        }
    }

    /// Set whether a call is in progress
    pub fn mark_call_ongoing(&self, ongoing: bool) {
        let changed = {
            let mut inner = self.lock();
            std::mem::replace(&mut inner.call_ongoing, ongoing) != ongoing
        };
        if changed {
            info!("Call ongoing: {}", ongoing);
        }
    }

    /// Consistent snapshot of the radio.
    ///
    /// The cached notification data is copied under the lock, then the
    /// serving and neighbour cells are queried. A fresh serving-cell answer
    /// overrides a stale notification lac/cell id. A failing query yields
    /// an invalid snapshot and a `RadioHandlerFailed` event; the cached
    /// state is left untouched.
    pub fn read(&self) -> RadioSnapshot {
        let (cached, call_ongoing) = {
            let inner = self.lock();
            (inner.cell.clone(), inner.call_ongoing)
        };

        let Some(cached) = cached else {
            debug!("GSM data not valid");
            return RadioSnapshot::invalid(call_ongoing);
        };

        let detail = match self.capability.get_serving_cell_information() {
            Ok(detail) => detail,
            Err(e) => return self.read_failed("Serving cell", e, call_ongoing),
        };

        let mut serving = ServingCell {
            mcc: cached.mcc,
            mnc: cached.mnc,
            lac: cached.lac,
            cell_id: cached.cid,
            signal_dbm: cached.signal_dbm,
            access_type: cached.access_type,
            timing_advance: None,
            rx_level: None,
            arfcn: None,
        };

        if let Some((lac, cid)) = snapshot::usable_cell_ids(&detail) {
            if lac != serving.lac || cid != serving.cell_id {
                info!(
                    "Serving cell changed since last notification: lac {} -> {}, cid {} -> {}",
                    serving.lac, lac, serving.cell_id, cid
                );
                serving.lac = lac;
                serving.cell_id = cid;
            }
            serving.timing_advance = detail.tav;
            serving.rx_level = detail.rxlev;
            serving.arfcn = detail.arfcn;
        } else {
            debug!("Serving cell detail unusable: {:?}", detail);
        }

        let neighbours = match self.capability.get_neighbour_cell_information() {
            Ok(cells) => cells
                .iter()
                .filter_map(NeighbourCell::from_information)
                .collect::<Vec<_>>(),
            Err(e) => return self.read_failed("Neighbour cell", e, call_ongoing),
        };

        debug!(
            "valid=true MCC={} MNC={} lac={} cid={} strength={} neighbours={}",
            serving.mcc,
            serving.mnc,
            serving.lac,
            serving.cell_id,
            serving.signal_dbm,
            neighbours.len()
        );

        RadioSnapshot {
            serving: Some(serving),
            neighbours,
            call_ongoing,
        }
    }

    fn read_failed(&self, query: &str, e: CapabilityError, call_ongoing: bool) -> RadioSnapshot {
        let e = LoggerError::TransientRead(e);
        warn!("{} query failed: {}", query, e);
        self.events.publish(LoggerEvent::RadioHandlerFailed { reason: e.to_string() });
        RadioSnapshot::invalid(call_ongoing)
    }
}

fn parse_network_status(status: &NetworkStatus) -> Result<NotifiedCell, RadioUpdateError> {
    match status.registration.as_str() {
        "home" | "roaming" => {}
        other => return Err(RadioUpdateError::NotRegistered(other.to_string())),
    }

    let code = status.code.as_deref().ok_or(RadioUpdateError::MissingField("code"))?;
    let lac = status.lac.as_deref().ok_or(RadioUpdateError::MissingField("lac"))?;
    let cid = status.cid.as_deref().ok_or(RadioUpdateError::MissingField("cid"))?;
    let strength = status.strength.ok_or(RadioUpdateError::MissingField("strength"))?;

    let (mcc, mnc) = split_operator_code(code).ok_or_else(|| RadioUpdateError::Malformed {
        field: "code",
        value: code.to_string(),
    })?;
    let lac = hex_to_decimal(lac).ok_or_else(|| RadioUpdateError::Malformed {
        field: "lac",
        value: lac.to_string(),
    })?;
    let cid = hex_to_decimal(cid).ok_or_else(|| RadioUpdateError::Malformed {
        field: "cid",
        value: cid.to_string(),
    })?;
    let signal_dbm = percent_to_dbm(strength).ok_or(RadioUpdateError::UnusableStrength(strength))?;

    Ok(NotifiedCell {
        mcc,
        mnc,
        lac,
        cid,
        signal_dbm,
        access_type: status.act.clone(),
    })
}

/// Start the single consumer that applies queued notifications in order.
///
/// The task ends once every sender has been dropped.
pub fn spawn_radio_inbox(
    radio: Arc<RadioState>,
) -> (mpsc::UnboundedSender<RadioEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<RadioEvent>();
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            radio.apply(event);
        }
        debug!("Radio inbox closed");
    });
    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CallEntry, CellInformation, MockRadioCapability};

    fn status(registration: &str, code: &str, lac: &str, cid: &str, strength: u8) -> NetworkStatus {
        NetworkStatus {
            registration: registration.to_string(),
            code: Some(code.to_string()),
            lac: Some(lac.to_string()),
            cid: Some(cid.to_string()),
            strength: Some(strength),
            act: Some("GSM".to_string()),
        }
    }

    /// Capability whose cell queries return sentinels, so reads reflect
    /// the notification data only
    fn quiet_capability() -> MockRadioCapability {
        let mut mock = MockRadioCapability::new();
        mock.expect_get_serving_cell_information()
            .returning(|| Ok(CellInformation::default()));
        mock.expect_get_neighbour_cell_information().returning(|| Ok(Vec::new()));
        mock
    }

    fn radio_with(mock: MockRadioCapability) -> RadioState {
        RadioState::new(Arc::new(mock), EventBus::default())
    }

    #[test]
    fn test_home_registration_scenario() {
        let radio = radio_with(quiet_capability());
        radio.update(&status("home", "20801", "0x1A", "0x2B", 50));

        let snap = radio.read();
        let cell = snap.serving.expect("snapshot should be valid");
        assert_eq!(cell.mcc, "208");
        assert_eq!(cell.mnc, "1");
        assert_eq!(cell.lac, "26");
        assert_eq!(cell.cell_id, "43");
        assert_eq!(cell.signal_dbm, -101);
        assert_eq!(cell.access_type.as_deref(), Some("GSM"));
    }

    #[test]
    fn test_denied_registration_invalidates_everything() {
        let radio = radio_with(quiet_capability());
        radio.update(&status("home", "20801", "0x1A", "0x2B", 50));
        assert!(radio.read().is_valid());

        radio.update(&NetworkStatus {
            registration: "denied".to_string(),
            ..Default::default()
        });
        assert_eq!(radio.read(), RadioSnapshot::invalid(false));
    }

    #[test]
    fn test_roaming_is_accepted() {
        let radio = radio_with(quiet_capability());
        radio.update(&status("roaming", "310410", "1", "2", 80));
        assert_eq!(radio.read().mcc(), Some("310"));
    }

    #[test]
    fn test_zero_strength_invalidates() {
        let radio = radio_with(quiet_capability());
        radio.update(&status("home", "20801", "0x1A", "0x2B", 50));
        radio.update(&status("home", "20801", "0x1A", "0x2B", 0));
        assert!(!radio.read().is_valid());
    }

    #[test]
    fn test_missing_field_invalidates() {
        let radio = radio_with(quiet_capability());
        radio.update(&status("home", "20801", "0x1A", "0x2B", 50));

        let mut partial = status("home", "20801", "0x1A", "0x2B", 50);
        partial.cid = None;
        radio.update(&partial);
        assert!(!radio.read().is_valid());
    }

    #[test]
    fn test_malformed_lac_invalidates() {
        let radio = radio_with(quiet_capability());
        radio.update(&status("home", "20801", "xyz", "0x2B", 50));
        assert!(!radio.read().is_valid());
    }

    #[test]
    fn test_handler_failure_is_published() {
        let radio = radio_with(quiet_capability());
        let mut rx = radio.events.subscribe();
        radio.update(&NetworkStatus {
            registration: "searching".to_string(),
            ..Default::default()
        });

        assert!(matches!(
            rx.try_recv().unwrap(),
            LoggerEvent::RadioHandlerFailed { reason } if reason.contains("searching")
        ));
        assert_eq!(rx.try_recv().unwrap(), LoggerEvent::RadioUpdated { valid: false });
    }

    #[test]
    fn test_signal_strength_updates_valid_snapshot_only() {
        let radio = radio_with(quiet_capability());

        radio.update_signal_strength(100);
        assert!(!radio.read().is_valid(), "invalid snapshot must stay invalid");

        radio.update(&status("home", "20801", "0x1A", "0x2B", 50));
        radio.update_signal_strength(100);
        let cell = radio.read().serving.unwrap();
        assert_eq!(cell.signal_dbm, -51);
        assert_eq!(cell.lac, "26");
    }

    #[test]
    fn test_signal_strength_zero_invalidates() {
        let radio = radio_with(quiet_capability());
        radio.update(&status("home", "20801", "0x1A", "0x2B", 50));
        radio.update_signal_strength(0);
        assert!(!radio.read().is_valid());
    }

    #[test]
    fn test_call_status_scans_full_list() {
        let mut mock = quiet_capability();
        let mut calls = vec![
            vec![
                CallEntry { index: 1, status: "release".to_string() },
                CallEntry { index: 2, status: "active".to_string() },
            ],
            vec![CallEntry { index: 1, status: "release".to_string() }],
        ]
        .into_iter();
        mock.expect_list_calls()
            .times(2)
            .returning(move || Ok(calls.next().unwrap_or_default()));
        let radio = radio_with(mock);

        radio.apply(RadioEvent::CallStatus { index: 2, status: "active".to_string() });
        assert!(radio.read().call_ongoing);

        radio.apply(RadioEvent::CallStatus { index: 2, status: "release".to_string() });
        assert!(!radio.read().call_ongoing);
    }

    #[test]
    fn test_call_list_failure_invalidates() {
        let mut mock = quiet_capability();
        mock.expect_list_calls()
            .returning(|| Err(CapabilityError::Unavailable("ogsmd".to_string())));
        let radio = radio_with(mock);
        radio.update(&status("home", "20801", "0x1A", "0x2B", 50));

        radio.update_call_status();
        assert!(!radio.read().is_valid());
    }

    #[test]
    fn test_fresh_serving_cell_overrides_notification() {
        let mut mock = MockRadioCapability::new();
        mock.expect_get_serving_cell_information().returning(|| {
            Ok(CellInformation {
                lac: Some("1B".to_string()),
                cid: Some("2C".to_string()),
                rxlev: Some(30),
                tav: Some(2),
                arfcn: Some(62),
                ..Default::default()
            })
        });
        mock.expect_get_neighbour_cell_information().returning(|| {
            Ok(vec![
                CellInformation {
                    lac: Some("1A".to_string()),
                    cid: Some("10".to_string()),
                    rxlev: Some(12),
                    c1: Some(5),
                    c2: Some(7),
                    ..Default::default()
                },
                CellInformation {
                    lac: Some("1A".to_string()),
                    cid: Some("0".to_string()),
                    rxlev: Some(12),
                    ..Default::default()
                },
                CellInformation {
                    lac: Some("1A".to_string()),
                    cid: Some("11".to_string()),
                    rxlev: Some(0),
                    ..Default::default()
                },
            ])
        });
        let radio = radio_with(mock);
        radio.update(&status("home", "20801", "0x1A", "0x2B", 50));

        let snap = radio.read();
        let cell = snap.serving.unwrap();
        assert_eq!(cell.lac, "27");
        assert_eq!(cell.cell_id, "44");
        assert_eq!(cell.rx_level, Some(30));
        assert_eq!(cell.timing_advance, Some(2));
        assert_eq!(cell.arfcn, Some(62));
        assert_eq!(
            snap.neighbours,
            vec![NeighbourCell {
                lac: "26".to_string(),
                cell_id: "16".to_string(),
                rx_level: Some(12),
                arfcn: None,
                c1: Some(5),
                c2: Some(7),
            }]
        );
    }

    #[test]
    fn test_failed_serving_query_yields_invalid_read_but_keeps_state() {
        let mut mock = MockRadioCapability::new();
        let mut answers = vec![
            Err(CapabilityError::Unavailable("ogsmd".to_string())),
            Ok(CellInformation::default()),
        ]
        .into_iter();
        mock.expect_get_serving_cell_information()
            .times(2)
            .returning(move || answers.next().unwrap());
        mock.expect_get_neighbour_cell_information().returning(|| Ok(Vec::new()));
        let radio = radio_with(mock);
        radio.update(&status("home", "20801", "0x1A", "0x2B", 50));
        let mut rx = radio.events.subscribe();

        assert!(!radio.read().is_valid());
        assert!(matches!(
            rx.try_recv().unwrap(),
            LoggerEvent::RadioHandlerFailed { reason } if reason.starts_with("transient read error")
        ));
        assert!(radio.read().is_valid());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_reads_are_never_torn() {
        let radio = Arc::new(radio_with(quiet_capability()));
        let notifications = [
            ("20801", "0x1", "0x2", 50u8),
            ("26201", "0x3", "0x4", 100u8),
        ];

        let writer = {
            let radio = Arc::clone(&radio);
            std::thread::spawn(move || {
                for i in 0..2000 {
                    let (code, lac, cid, strength) = notifications[i % 2];
                    radio.update(&status("home", code, lac, cid, strength));
                    if i % 7 == 0 {
                        radio.update(&NetworkStatus {
                            registration: "denied".to_string(),
                            ..Default::default()
                        });
                    }
                }
            })
        };

        for _ in 0..2000 {
            if let Some(cell) = radio.read().serving {
                let fields = (cell.mcc.as_str(), cell.lac.as_str(), cell.cell_id.as_str(), cell.signal_dbm);
                assert!(
                    fields == ("208", "1", "2", -101) || fields == ("262", "3", "4", -51),
                    "torn read: {:?}",
                    fields
                );
            }
        }
        writer.join().unwrap();
    }

    #[tokio::test]
    async fn test_inbox_applies_events_in_order() {
        let radio = Arc::new(radio_with(quiet_capability()));
        let (tx, handle) = spawn_radio_inbox(Arc::clone(&radio));

        tx.send(RadioEvent::NetworkStatus(status("home", "20801", "0x1A", "0x2B", 50)))
            .unwrap();
        tx.send(RadioEvent::SignalStrength(100)).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(radio.read().serving.unwrap().signal_dbm, -51);
    }
}
