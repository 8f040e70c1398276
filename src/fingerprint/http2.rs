//! HTTP/2 fingerprint: the connection's first SETTINGS frame, its
//! WINDOW_UPDATE, the priority block on the request HEADERS and the
//! pseudo-header order.
//!
//! All four travel as one Akamai-style string:
//!
//! ```text
//! 1:65536;2:0;4:6291456;6:262144|15663105|0:256:true|m,a,s,p
//! ```
//!
//! An optional `||:method,:authority,:scheme,:path` suffix names the
//! pseudo-headers explicitly and wins over the letter form.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ValidationError;

/// SETTINGS identifiers (RFC 9113 6.5.2, RFC 9218 for 9).
pub mod setting {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
    pub const NO_RFC7540_PRIORITIES: u16 = 0x9;
}

/// Window every peer starts with (RFC 9113 6.9.2).
pub const DEFAULT_WINDOW: u32 = 65_535;
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
const MAX_WINDOW: u32 = 0x7fff_ffff;
const MAX_FRAME_SIZE_LIMIT: u32 = 0x00ff_ffff;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoHeader {
    Method,
    Authority,
    Scheme,
    Path,
}

impl PseudoHeader {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Method => ":method",
            Self::Authority => ":authority",
            Self::Scheme => ":scheme",
            Self::Path => ":path",
        }
    }

    fn letter(&self) -> char {
        match self {
            Self::Method => 'm',
            Self::Authority => 'a',
            Self::Scheme => 's',
            Self::Path => 'p',
        }
    }

    fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "m" => Some(Self::Method),
            "a" => Some(Self::Authority),
            "s" => Some(Self::Scheme),
            "p" => Some(Self::Path),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            ":method" => Some(Self::Method),
            ":authority" => Some(Self::Authority),
            ":scheme" => Some(Self::Scheme),
            ":path" => Some(Self::Path),
            _ => None,
        }
    }
}

/// Order of the four request pseudo-headers in the HEADERS block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PseudoHeaderOrder([PseudoHeader; 4]);

impl PseudoHeaderOrder {
    /// m,a,s,p
    pub const CHROME: Self = Self([
        PseudoHeader::Method,
        PseudoHeader::Authority,
        PseudoHeader::Scheme,
        PseudoHeader::Path,
    ]);
    /// m,p,a,s
    pub const FIREFOX: Self = Self([
        PseudoHeader::Method,
        PseudoHeader::Path,
        PseudoHeader::Authority,
        PseudoHeader::Scheme,
    ]);
    /// m,s,a,p
    pub const SAFARI: Self = Self([
        PseudoHeader::Method,
        PseudoHeader::Scheme,
        PseudoHeader::Authority,
        PseudoHeader::Path,
    ]);

    /// `None` unless all four pseudo-headers appear exactly once.
    pub fn new(order: [PseudoHeader; 4]) -> Option<Self> {
        let distinct = order
            .iter()
            .enumerate()
            .all(|(i, p)| !order[..i].contains(p));
        distinct.then_some(Self(order))
    }

    pub fn iter(&self) -> impl Iterator<Item = PseudoHeader> + '_ {
        self.0.iter().copied()
    }

    /// Letter form, e.g. `m,a,s,p`.
    pub fn akamai_string(&self) -> String {
        self.0
            .iter()
            .map(|p| p.letter().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn from_items<'a>(
        items: impl Iterator<Item = &'a str>,
        lookup: fn(&str) -> Option<PseudoHeader>,
    ) -> Result<Self, ValidationError> {
        let parsed = items
            .map(|item| {
                let item = item.trim();
                lookup(item).ok_or_else(|| {
                    ValidationError::InvalidHttp2Settings(format!("unknown pseudo-header {:?}", item))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let order: [PseudoHeader; 4] = parsed.try_into().map_err(|_| {
            ValidationError::InvalidHttp2Settings("pseudo-header order needs four entries".into())
        })?;
        Self::new(order).ok_or_else(|| {
            ValidationError::InvalidHttp2Settings("pseudo-header order repeats an entry".into())
        })
    }
}

impl Default for PseudoHeaderOrder {
    fn default() -> Self {
        Self::CHROME
    }
}

/// Priority block carried on the request HEADERS frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderPriority {
    pub stream_dependency: u32,
    /// Weight as written in the fingerprint, 1..=256.
    pub weight: u16,
    pub exclusive: bool,
}

impl HeaderPriority {
    /// The weight byte on the wire is one less than the weight.
    pub fn wire_weight(&self) -> u8 {
        (self.weight.clamp(1, 256) - 1) as u8
    }
}

/// HTTP/2 fingerprint applied to every HTTP/2 connection of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http2Settings {
    /// SETTINGS entries in wire order. Unknown identifiers are sent as given.
    pub settings: Vec<(u16, u32)>,
    /// Connection WINDOW_UPDATE increment sent after SETTINGS; 0 sends none.
    pub window_update: u32,
    /// `None` leaves the PRIORITY flag off the HEADERS frame.
    pub priority: Option<HeaderPriority>,
    pub pseudo_order: PseudoHeaderOrder,
    /// Bound on waiting for the server's first frame.
    /// The fetch deadline still bounds the whole exchange.
    pub handshake_timeout: Option<Duration>,
}

impl Default for Http2Settings {
    fn default() -> Self {
        Self::chrome()
    }
}

impl Http2Settings {
    /// `1:65536;2:0;4:6291456;6:262144|15663105|0:256:true|m,a,s,p`
    pub fn chrome() -> Self {
        Self {
            settings: vec![
                (setting::HEADER_TABLE_SIZE, 65_536),
                (setting::ENABLE_PUSH, 0),
                (setting::INITIAL_WINDOW_SIZE, 6_291_456),
                (setting::MAX_HEADER_LIST_SIZE, 262_144),
            ],
            window_update: 15_663_105,
            priority: Some(HeaderPriority {
                stream_dependency: 0,
                weight: 256,
                exclusive: true,
            }),
            pseudo_order: PseudoHeaderOrder::CHROME,
            handshake_timeout: Some(HANDSHAKE_TIMEOUT),
        }
    }

    /// `1:65536;2:0;4:131072;5:16384|12517377|0:42:false|m,p,a,s`
    pub fn firefox() -> Self {
        Self {
            settings: vec![
                (setting::HEADER_TABLE_SIZE, 65_536),
                (setting::ENABLE_PUSH, 0),
                (setting::INITIAL_WINDOW_SIZE, 131_072),
                (setting::MAX_FRAME_SIZE, 16_384),
            ],
            window_update: 12_517_377,
            priority: Some(HeaderPriority {
                stream_dependency: 0,
                weight: 42,
                exclusive: false,
            }),
            pseudo_order: PseudoHeaderOrder::FIREFOX,
            handshake_timeout: Some(HANDSHAKE_TIMEOUT),
        }
    }

    /// `2:0;3:100;4:2097152;9:1|10420225|0:256:false|m,s,a,p`
    pub fn safari() -> Self {
        Self {
            settings: vec![
                (setting::ENABLE_PUSH, 0),
                (setting::MAX_CONCURRENT_STREAMS, 100),
                (setting::INITIAL_WINDOW_SIZE, 2_097_152),
                (setting::NO_RFC7540_PRIORITIES, 1),
            ],
            window_update: 10_420_225,
            priority: Some(HeaderPriority {
                stream_dependency: 0,
                weight: 256,
                exclusive: false,
            }),
            pseudo_order: PseudoHeaderOrder::SAFARI,
            handshake_timeout: Some(HANDSHAKE_TIMEOUT),
        }
    }

    /// Parse an Akamai-style fingerprint string.
    ///
    /// At least the settings and window parts are required. A priority part
    /// holding only a stream dependency implies weight 256 exclusive for
    /// dependency 0 and weight 42 otherwise.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidHttp2Settings(reason);

        let raw = raw.trim();
        // `||` alone also marks an empty priority part, so the key suffix
        // is recognised by its leading colon.
        let (main, explicit_pseudo) = if let Some(main) = raw.strip_suffix("||") {
            (main, None)
        } else if let Some((main, keys)) = raw.split_once("||:") {
            (main, Some(&raw[main.len() + 2..]).filter(|_| !keys.is_empty()))
        } else {
            (raw, None)
        };

        let parts: Vec<&str> = main.split('|').map(str::trim).collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(invalid(format!(
                "expected 2 to 4 '|'-separated parts, got {}",
                parts.len()
            )));
        }

        let settings = parse_settings(parts[0])?;

        let window_update = match parts[1] {
            "" => 0,
            text => text
                .parse::<u32>()
                .ok()
                .filter(|w| *w <= MAX_WINDOW)
                .ok_or_else(|| invalid(format!("invalid window update {:?}", text)))?,
        };

        let priority = match parts.get(2).copied().unwrap_or("") {
            "" => None,
            text => Some(parse_priority(text)?),
        };

        let pseudo_order = match (explicit_pseudo, parts.get(3).copied().unwrap_or("")) {
            (Some(keys), _) => PseudoHeaderOrder::from_items(keys.split(','), PseudoHeader::from_name)?,
            (None, "") => PseudoHeaderOrder::default(),
            (None, letters) => PseudoHeaderOrder::from_items(
                letters.split(',').map(str::trim),
                |l| PseudoHeader::from_letter(&l.to_ascii_lowercase()),
            )?,
        };

        Ok(Self {
            settings,
            window_update,
            priority,
            pseudo_order,
            handshake_timeout: Some(HANDSHAKE_TIMEOUT),
        })
    }

    pub fn get(&self, id: u16) -> Option<u32> {
        self.settings
            .iter()
            .find(|(setting, _)| *setting == id)
            .map(|(_, value)| *value)
    }

    /// Stream window this side advertises.
    pub fn initial_window_size(&self) -> u32 {
        self.get(setting::INITIAL_WINDOW_SIZE)
            .unwrap_or(DEFAULT_WINDOW)
    }

    /// Connection window after the WINDOW_UPDATE.
    pub fn connection_window(&self) -> u32 {
        DEFAULT_WINDOW.saturating_add(self.window_update).min(MAX_WINDOW)
    }

    /// Largest frame this side accepts.
    pub fn max_frame_size(&self) -> u32 {
        self.get(setting::MAX_FRAME_SIZE)
            .unwrap_or(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Back to the Akamai string; priority is always written in full form.
    pub fn akamai_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Http2Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settings = self
            .settings
            .iter()
            .map(|(id, value)| format!("{}:{}", id, value))
            .collect::<Vec<_>>()
            .join(";");
        let priority = self
            .priority
            .map(|p| format!("{}:{}:{}", p.stream_dependency, p.weight, p.exclusive))
            .unwrap_or_default();
        write!(
            f,
            "{}|{}|{}|{}",
            settings,
            self.window_update,
            priority,
            self.pseudo_order.akamai_string()
        )
    }
}

impl FromStr for Http2Settings {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_settings(part: &str) -> Result<Vec<(u16, u32)>, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidHttp2Settings(reason);
    let mut settings: Vec<(u16, u32)> = Vec::new();

    for pair in part.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (id, value) = pair
            .split_once(':')
            .ok_or_else(|| invalid(format!("invalid setting {:?}", pair)))?;
        let id: u16 = id
            .trim()
            .parse()
            .map_err(|_| invalid(format!("invalid setting id {:?}", id)))?;
        let value: u32 = value
            .trim()
            .parse()
            .map_err(|_| invalid(format!("invalid setting value {:?}", value)))?;

        if settings.iter().any(|(seen, _)| *seen == id) {
            return Err(invalid(format!("setting {} appears twice", id)));
        }
        let in_range = match id {
            setting::ENABLE_PUSH => value <= 1,
            setting::INITIAL_WINDOW_SIZE => value <= MAX_WINDOW,
            setting::MAX_FRAME_SIZE => (DEFAULT_MAX_FRAME_SIZE..=MAX_FRAME_SIZE_LIMIT).contains(&value),
            _ => true,
        };
        if !in_range {
            return Err(invalid(format!("setting {} out of range: {}", id, value)));
        }
        settings.push((id, value));
    }
    Ok(settings)
}

fn parse_priority(part: &str) -> Result<HeaderPriority, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidHttp2Settings(reason);
    let fields: Vec<&str> = part.split(':').map(str::trim).collect();

    let stream_dependency = fields[0]
        .parse::<u32>()
        .ok()
        .filter(|dep| *dep <= MAX_WINDOW)
        .ok_or_else(|| invalid(format!("invalid stream dependency {:?}", fields[0])))?;

    match fields.as_slice() {
        [_] => Ok(HeaderPriority {
            stream_dependency,
            weight: if stream_dependency == 0 { 256 } else { 42 },
            exclusive: stream_dependency == 0,
        }),
        [_, weight, exclusive] => {
            let weight = weight
                .parse::<u16>()
                .ok()
                .filter(|w| (1..=256).contains(w))
                .ok_or_else(|| invalid(format!("invalid weight {:?}", weight)))?;
            let exclusive = match exclusive.to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                other => return Err(invalid(format!("invalid exclusive flag {:?}", other))),
            };
            Ok(HeaderPriority {
                stream_dependency,
                weight,
                exclusive,
            })
        }
        _ => Err(invalid(format!(
            "priority must be 'dep' or 'dep:weight:exclusive', got {:?}",
            part
        ))),
    }
}
