use serde::{Deserialize, Serialize};

/// Lifecycle transition reported for an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    /// The application process was started.
    Launch,
    /// The application process exited.
    Exit,
}

/// A decoded lifecycle event waiting to be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub application_id: u64,
    /// Connected controllers at the time the entry was scanned (not at the
    /// time the event happened).
    pub controller_count: i32,
    pub kind: EventKind,
}

// ── Raw play-event log entries ─────────────────────────────────────────────────

/// Which applet an applet entry refers to. Only `Application` entries are
/// reported; system applets are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppletId {
    Application,
    Qlaunch,
    Overlay,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppletEventType {
    Launch,
    Exit,
    InFocus,
    OutOfFocus,
    #[serde(other)]
    Other,
}

/// One entry of the append-only play-event log.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayEvent {
    Applet {
        #[serde(deserialize_with = "hex_id::deserialize")]
        program_id: u64,
        applet_id: AppletId,
        event_type: AppletEventType,
    },
    Account {},
    PowerStateChange {},
    OperationModeChange {},
    Initialize {},
    /// A log line that could not be decoded. It still occupies a log index.
    #[serde(skip)]
    Unrecognized,
}

impl PlayEvent {
    /// Returns the lifecycle kind and program id when this entry is a launch
    /// or exit of a regular application.
    pub fn application_lifecycle(&self) -> Option<(u64, EventKind)> {
        match *self {
            PlayEvent::Applet {
                program_id,
                applet_id: AppletId::Application,
                event_type,
            } => match event_type {
                AppletEventType::Launch => Some((program_id, EventKind::Launch)),
                AppletEventType::Exit => Some((program_id, EventKind::Exit)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Formats an application id the way the webhook payload and title catalog
/// expect it: 16 uppercase hex digits, zero padded.
pub fn format_title_id(id: u64) -> String {
    format!("{id:016X}")
}

mod hex_id {
    use serde::de::{Deserializer, Error, Unexpected};
    use serde::Deserialize;

    /// Accepts either a hex string (`"0100000000010000"`, optional `0x`) or a
    /// plain JSON integer.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Text(String),
        }

        match Raw::deserialize(d)? {
            Raw::Num(n) => Ok(n),
            Raw::Text(s) => {
                let digits = s.trim_start_matches("0x").trim_start_matches("0X");
                u64::from_str_radix(digits, 16)
                    .map_err(|_| D::Error::invalid_value(Unexpected::Str(&s), &"a hex program id"))
            }
        }
    }
}
