//! Wire format of the webhook notification.
//!
//! Every delivered event becomes one JSON object with a fixed set of fields,
//! emitted in declaration order:
//!
//! ```text
//! {"serial":"…","hos_version":"17.0.1","ams_version":"1.6.2","action":"Launch",
//!  "title_id":"0100000000010000","title_version":"1.2.0","title_name":"MyGame",
//!  "controller_count":2}
//! ```
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::event::{format_title_id, EventKind, EventRecord};
use crate::titles::TitleInfo;

/// Placeholder sent for the title name and version when metadata lookup fails.
pub const METADATA_ERROR_SENTINEL: &str = "Error";

/// A `major.minor.micro` version triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SystemVersion {
    pub major: u8,
    pub minor: u8,
    pub micro: u8,
}

impl SystemVersion {
    pub const fn new(major: u8, minor: u8, micro: u8) -> Self {
        Self { major, minor, micro }
    }

    /// Unpacks the platform encoding `major << 16 | minor << 8 | micro`.
    pub const fn from_packed(packed: u32) -> Self {
        Self {
            major: (packed >> 16) as u8,
            minor: (packed >> 8) as u8,
            micro: packed as u8,
        }
    }
}

impl fmt::Display for SystemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid version '{0}': expected <major>.<minor>.<micro>")]
pub struct ParseVersionError(String);

impl FromStr for SystemVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseVersionError(s.to_string());
        let mut parts = s.trim().split('.').map(|p| p.parse::<u8>().map_err(|_| err()));
        let version = Self {
            major: parts.next().ok_or_else(err)??,
            minor: parts.next().ok_or_else(err)??,
            micro: parts.next().ok_or_else(err)??,
        };
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(version)
    }
}

impl Serialize for SystemVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Process-wide context attached to every notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceContext {
    pub serial: String,
    pub hos_version: SystemVersion,
    pub ams_version: SystemVersion,
}

/// The JSON body POSTed for one event.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub serial: &'a str,
    pub hos_version: SystemVersion,
    pub ams_version: SystemVersion,
    pub action: EventKind,
    pub title_id: String,
    pub title_version: &'a str,
    pub title_name: &'a str,
    pub controller_count: i32,
}

impl<'a> WebhookPayload<'a> {
    /// Assembles the payload for `record`. `title` is `None` when the metadata
    /// lookup failed, in which case both title fields carry the sentinel.
    pub fn new(record: &EventRecord, title: Option<&'a TitleInfo>, device: &'a DeviceContext) -> Self {
        let (title_name, title_version) = match title {
            Some(info) => (info.name.as_str(), info.version.as_str()),
            None => (METADATA_ERROR_SENTINEL, METADATA_ERROR_SENTINEL),
        };
        Self {
            serial: &device.serial,
            hos_version: device.hos_version,
            ams_version: device.ams_version,
            action: record.kind,
            title_id: format_title_id(record.application_id),
            title_version,
            title_name,
            controller_count: record.controller_count,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
