//! Serial port selection.
//!
//! USB serial adapters do not keep their port names across reboots, so a
//! port may be configured either literally or by USB identity:
//!
//! ```text
//! COM5
//! /dev/ttyUSB0
//! auto:VID_1A86&PID_7523
//! auto:VID_1A86&PID_7523,index=1,name=Card
//! auto:name=CH340
//! ```
//!
//! `auto:` selectors filter the enumerated ports by VID/PID and by a
//! case-insensitive substring of the product or manufacturer string, sort
//! the matches by port name and pick `index` (default 0).
//!
//! An empty port, or `detect`, leaves the choice to traffic detection at
//! startup.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const AUTO_PREFIX: &str = "auto:";
const DETECT_KEYWORD: &str = "detect";

/// What the system reports about an enumerated serial port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub product: Option<String>,
    pub manufacturer: Option<String>,
}

impl PortDescriptor {
    /// Descriptor for a port with no USB identity.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A configured serial port, literal or resolved at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PortSelector {
    Named(String),

    /// Find the port by listening for traffic. Written as `detect` or
    /// left empty.
    Detect,

    Auto {
        usb_id: Option<(u16, u16)>,
        index: Option<usize>,
        name: Option<String>,
    },
}

impl PortSelector {
    /// Pick a port name from the enumerated ports.
    ///
    /// Literal selectors resolve to themselves without looking at the list.
    /// [`PortSelector::Detect`] never resolves here.
    ///
    /// ```
    /// use libterm_core::{PortDescriptor, PortSelector};
    ///
    /// let ports = vec![
    ///     PortDescriptor { name: "COM7".into(), vid: Some(0x1A86), pid: Some(0x7523), ..Default::default() },
    ///     PortDescriptor::named("COM1"),
    /// ];
    /// let selector: PortSelector = "auto:VID_1A86&PID_7523".parse().unwrap();
    /// assert_eq!(selector.resolve(&ports).as_deref(), Some("COM7"));
    /// ```
    #[must_use]
    pub fn resolve(&self, ports: &[PortDescriptor]) -> Option<String> {
        let (usb_id, index, name) = match self {
            Self::Named(port) => return Some(port.clone()),
            Self::Detect => return None,
            Self::Auto {
                usb_id,
                index,
                name,
            } => (usb_id, index, name),
        };

        let needle = name.as_ref().map(|n| n.to_ascii_lowercase());
        let mut matches: Vec<&PortDescriptor> = ports
            .iter()
            .filter(|p| match usb_id {
                Some((vid, pid)) => p.vid == Some(*vid) && p.pid == Some(*pid),
                None => true,
            })
            .filter(|p| match &needle {
                Some(n) => [&p.product, &p.manufacturer]
                    .into_iter()
                    .flatten()
                    .any(|s| s.to_ascii_lowercase().contains(n)),
                None => true,
            })
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));

        let picked = match index {
            Some(i) if *i < matches.len() => matches[*i],
            _ => *matches.first()?,
        };
        Some(picked.name.clone())
    }

    /// Whether this selector needs port enumeration to resolve.
    #[must_use]
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto { .. })
    }

    #[must_use]
    pub fn is_detect(&self) -> bool {
        matches!(self, Self::Detect)
    }
}

impl FromStr for PortSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case(DETECT_KEYWORD) {
            return Ok(Self::Detect);
        }

        let Some(params) = s
            .get(..AUTO_PREFIX.len())
            .filter(|p| p.eq_ignore_ascii_case(AUTO_PREFIX))
            .map(|_| &s[AUTO_PREFIX.len()..])
        else {
            return Ok(Self::Named(s.to_string()));
        };

        let mut usb_id = None;
        let mut index = None;
        let mut name = None;

        for part in params.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let lower = part.to_ascii_lowercase();
            if lower.starts_with("vid_") {
                usb_id = Some(parse_usb_id(part)?);
            } else if let Some(value) = lower.strip_prefix("index=") {
                index = Some(value.parse().map_err(|_| {
                    Error::InvalidPortSelector(format!("bad index in '{part}'"))
                })?);
            } else if lower.starts_with("name=") {
                name = Some(part["name=".len()..].to_string());
            } else {
                return Err(Error::InvalidPortSelector(format!(
                    "unknown selector part '{part}'"
                )));
            }
        }

        Ok(Self::Auto {
            usb_id,
            index,
            name,
        })
    }
}

/// Parse `VID_1A86&PID_7523`.
fn parse_usb_id(part: &str) -> Result<(u16, u16)> {
    let bad = || Error::InvalidPortSelector(format!("bad USB id '{part}'"));
    let (vid, pid) = part.split_once('&').ok_or_else(bad)?;
    let vid = vid.get(4..).ok_or_else(bad)?;
    let pid = pid
        .get(..4)
        .filter(|p| p.eq_ignore_ascii_case("pid_"))
        .and_then(|_| pid.get(4..))
        .ok_or_else(bad)?;
    Ok((
        u16::from_str_radix(vid, 16).map_err(|_| bad())?,
        u16::from_str_radix(pid, 16).map_err(|_| bad())?,
    ))
}

impl TryFrom<String> for PortSelector {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PortSelector> for String {
    fn from(value: PortSelector) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PortSelector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Detect => f.write_str(DETECT_KEYWORD),
            Self::Auto {
                usb_id,
                index,
                name,
            } => {
                let mut parts = Vec::new();
                if let Some((vid, pid)) = usb_id {
                    parts.push(format!("VID_{vid:04X}&PID_{pid:04X}"));
                }
                if let Some(i) = index {
                    parts.push(format!("index={i}"));
                }
                if let Some(n) = name {
                    parts.push(format!("name={n}"));
                }
                write!(f, "{AUTO_PREFIX}{}", parts.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ports() -> Vec<PortDescriptor> {
        vec![
            PortDescriptor {
                name: "COM9".into(),
                vid: Some(0x1A86),
                pid: Some(0x7523),
                product: Some("USB-SERIAL CH340 Card".into()),
                manufacturer: Some("wch.cn".into()),
            },
            PortDescriptor {
                name: "COM4".into(),
                vid: Some(0x1A86),
                pid: Some(0x7523),
                product: Some("USB-SERIAL CH340 Book".into()),
                manufacturer: Some("wch.cn".into()),
            },
            PortDescriptor {
                name: "COM3".into(),
                vid: Some(0x0403),
                pid: Some(0x6001),
                product: Some("FT232R".into()),
                manufacturer: Some("FTDI".into()),
            },
            PortDescriptor::named("COM1"),
        ]
    }

    #[rstest]
    #[case("COM5", PortSelector::Named("COM5".into()))]
    #[case(" /dev/ttyUSB0 ", PortSelector::Named("/dev/ttyUSB0".into()))]
    #[case(
        "auto:VID_1A86&PID_7523,index=1,name=Card",
        PortSelector::Auto { usb_id: Some((0x1A86, 0x7523)), index: Some(1), name: Some("Card".into()) }
    )]
    #[case(
        "AUTO:vid_0403&pid_6001",
        PortSelector::Auto { usb_id: Some((0x0403, 0x6001)), index: None, name: None }
    )]
    #[case(
        "auto:name=CH340",
        PortSelector::Auto { usb_id: None, index: None, name: Some("CH340".into()) }
    )]
    fn test_parse(#[case] input: &str, #[case] expected: PortSelector) {
        assert_eq!(input.parse::<PortSelector>().unwrap(), expected);
    }

    #[rstest]
    #[case("", PortSelector::Detect)]
    #[case("  ", PortSelector::Detect)]
    #[case("DETECT", PortSelector::Detect)]
    fn test_parse_detect(#[case] input: &str, #[case] expected: PortSelector) {
        let selector = input.parse::<PortSelector>().unwrap();
        assert_eq!(selector, expected);
        assert!(selector.is_detect());
        assert_eq!(selector.resolve(&ports()), None);
        assert_eq!(selector.to_string(), "detect");
    }

    #[rstest]
    #[case("auto:VID_1A86")]
    #[case("auto:VID_ZZZZ&PID_7523")]
    #[case("auto:index=x")]
    #[case("auto:speed=fast")]
    fn test_parse_rejects(#[case] input: &str) {
        assert!(matches!(
            input.parse::<PortSelector>(),
            Err(Error::InvalidPortSelector(_))
        ));
    }

    #[rstest]
    #[case("COM5", Some("COM5"))]
    #[case("auto:VID_1A86&PID_7523", Some("COM4"))]
    #[case("auto:VID_1A86&PID_7523,index=1", Some("COM9"))]
    #[case("auto:VID_1A86&PID_7523,index=7", Some("COM4"))]
    #[case("auto:name=card", Some("COM9"))]
    #[case("auto:name=ftdi", Some("COM3"))]
    #[case("auto:VID_0403&PID_6001,name=CH340", None)]
    #[case("auto:VID_2341&PID_0043", None)]
    fn test_resolve(#[case] selector: &str, #[case] expected: Option<&str>) {
        let selector: PortSelector = selector.parse().unwrap();
        assert_eq!(selector.resolve(&ports()).as_deref(), expected);
    }

    #[test]
    fn test_serde_roundtrip_as_string() {
        let selector: PortSelector =
            serde_json::from_str(r#""auto:VID_1A86&PID_7523,index=1""#).unwrap();
        assert!(selector.is_auto());
        assert_eq!(
            serde_json::to_string(&selector).unwrap(),
            r#""auto:VID_1A86&PID_7523,index=1""#
        );
    }
}
