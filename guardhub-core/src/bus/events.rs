//! Application event catalog.
//!
//! Event names are `domain:entity:action` strings on the wire (log lines,
//! JSON payloads, console input). In Rust they are a closed enum so a typo
//! in an emitter or a subscriber is a compile error.
//!
//! | Variant | Wire name |
//! |---------|-----------|
//! | `BranchChanged` | `"branch:changed"` |
//! | `InvoiceCreated` | `"accounts:invoice:created"` |
//! | `InvoiceUpdated` | `"accounts:invoice:updated"` |
//! | `InvoiceDeleted` | `"accounts:invoice:deleted"` |
//! | `PaymentRecorded` | `"accounts:payment:recorded"` |
//! | `EmployeeCreated` | `"hrm:employee:created"` |
//! | `EmployeeUpdated` | `"hrm:employee:updated"` |
//! | `EmployeeDeleted` | `"hrm:employee:deleted"` |
//! | `RotaUpdated` | `"operations:rota:updated"` |
//! | `AttendanceMarked` | `"operations:attendance:marked"` |
//! | `LeaveRequested` | `"operations:leave:requested"` |
//! | `LeaveApproved` | `"operations:leave:approved"` |
//! | `LeaveRejected` | `"operations:leave:rejected"` |
//! | `LeadCreated` | `"sales:lead:created"` |
//! | `QuotationSent` | `"sales:quotation:sent"` |
//! | `SoundSettingsChanged` | `"settings:sound:changed"` |
//! | `DataRefresh` | `"data:refresh"` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Optional event payload: a flat JSON object.
pub type Payload = serde_json::Map<String, serde_json::Value>;

macro_rules! app_events {
    ($($variant:ident => $wire:literal,)+) => {
        /// Every event that may travel over the [`EventBus`](super::EventBus).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum AppEvent {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl AppEvent {
            /// All events, in catalog order.
            pub const ALL: &'static [AppEvent] = &[$(AppEvent::$variant,)+];

            /// Stable wire name.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(AppEvent::$variant => $wire,)+
                }
            }
        }

        impl FromStr for AppEvent {
            type Err = UnknownEvent;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($wire => Ok(AppEvent::$variant),)+
                    other => Err(UnknownEvent(other.to_string())),
                }
            }
        }
    };
}

app_events! {
    BranchChanged => "branch:changed",
    InvoiceCreated => "accounts:invoice:created",
    InvoiceUpdated => "accounts:invoice:updated",
    InvoiceDeleted => "accounts:invoice:deleted",
    PaymentRecorded => "accounts:payment:recorded",
    EmployeeCreated => "hrm:employee:created",
    EmployeeUpdated => "hrm:employee:updated",
    EmployeeDeleted => "hrm:employee:deleted",
    RotaUpdated => "operations:rota:updated",
    AttendanceMarked => "operations:attendance:marked",
    LeaveRequested => "operations:leave:requested",
    LeaveApproved => "operations:leave:approved",
    LeaveRejected => "operations:leave:rejected",
    LeadCreated => "sales:lead:created",
    QuotationSent => "sales:quotation:sent",
    SoundSettingsChanged => "settings:sound:changed",
    DataRefresh => "data:refresh",
}

impl fmt::Display for AppEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a wire name that is not in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type '{0}'")]
pub struct UnknownEvent(pub String);

/// Build a [`Payload`] from a JSON value; non-objects become `None`.
pub fn payload_from_value(value: serde_json::Value) -> Option<Payload> {
    match value {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}
