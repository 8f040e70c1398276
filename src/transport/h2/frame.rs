//! HTTP/2 frame types and binary serialization (RFC 9113 section 4 and 6).
//!
//! Only what a single-request client needs. Writers emit frames exactly as
//! configured; readers validate padding and lengths.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

pub const FRAME_HEADER_SIZE: usize = 9;

pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(v: u8) -> Self {
        match v {
            0x0 => Self::Data,
            0x1 => Self::Headers,
            0x2 => Self::Priority,
            0x3 => Self::RstStream,
            0x4 => Self::Settings,
            0x5 => Self::PushPromise,
            0x6 => Self::Ping,
            0x7 => Self::GoAway,
            0x8 => Self::WindowUpdate,
            0x9 => Self::Continuation,
            other => Self::Unknown(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        match ft {
            FrameType::Data => 0x0,
            FrameType::Headers => 0x1,
            FrameType::Priority => 0x2,
            FrameType::RstStream => 0x3,
            FrameType::Settings => 0x4,
            FrameType::PushPromise => 0x5,
            FrameType::Ping => 0x6,
            FrameType::GoAway => 0x7,
            FrameType::WindowUpdate => 0x8,
            FrameType::Continuation => 0x9,
            FrameType::Unknown(v) => v,
        }
    }
}

pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    /// Same bit as END_STREAM, on SETTINGS and PING.
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// Error codes carried by RST_STREAM and GOAWAY (RFC 9113 section 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NoError,
    ProtocolError,
    InternalError,
    FlowControlError,
    SettingsTimeout,
    StreamClosed,
    FrameSizeError,
    RefusedStream,
    Cancel,
    CompressionError,
    ConnectError,
    EnhanceYourCalm,
    InadequateSecurity,
    Http11Required,
    Unknown(u32),
}

impl From<u32> for ErrorCode {
    fn from(v: u32) -> Self {
        match v {
            0x0 => Self::NoError,
            0x1 => Self::ProtocolError,
            0x2 => Self::InternalError,
            0x3 => Self::FlowControlError,
            0x4 => Self::SettingsTimeout,
            0x5 => Self::StreamClosed,
            0x6 => Self::FrameSizeError,
            0x7 => Self::RefusedStream,
            0x8 => Self::Cancel,
            0x9 => Self::CompressionError,
            0xa => Self::ConnectError,
            0xb => Self::EnhanceYourCalm,
            0xc => Self::InadequateSecurity,
            0xd => Self::Http11Required,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: FrameType,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    /// `None` until nine bytes are available. The reserved bit is ignored
    /// on receipt (RFC 9113 4.1).
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return None;
        }
        let length = (u32::from(buf[0]) << 16) | (u32::from(buf[1]) << 8) | u32::from(buf[2]);
        let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7fff_ffff;
        Some(Self {
            length,
            frame_type: FrameType::from(buf[3]),
            flags: buf[4],
            stream_id,
        })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u8((self.length >> 16) as u8);
        buf.put_u8((self.length >> 8) as u8);
        buf.put_u8(self.length as u8);
        buf.put_u8(self.frame_type.into());
        buf.put_u8(self.flags);
        buf.put_u32(self.stream_id & 0x7fff_ffff);
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

fn frame(frame_type: FrameType, flags: u8, stream_id: u32, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    FrameHeader {
        length: payload.len() as u32,
        frame_type,
        flags,
        stream_id,
    }
    .serialize(&mut buf);
    buf.extend_from_slice(payload);
    buf
}

/// Strip the pad length byte and trailing padding from a PADDED payload.
fn unpad(mut payload: Bytes, padded: bool) -> Result<Bytes> {
    if !padded {
        return Ok(payload);
    }
    if payload.is_empty() {
        return Err(Error::http_protocol("padded frame without pad length"));
    }
    let pad_len = payload.get_u8() as usize;
    if pad_len > payload.len() {
        return Err(Error::http_protocol("padding exceeds frame payload"));
    }
    payload.truncate(payload.len() - pad_len);
    Ok(payload)
}

/// SETTINGS frame. Entries go out in vector order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsFrame {
    pub settings: Vec<(u16, u32)>,
    pub ack: bool,
}

impl SettingsFrame {
    pub fn new(settings: Vec<(u16, u32)>) -> Self {
        Self {
            settings,
            ack: false,
        }
    }

    pub fn ack() -> Self {
        Self {
            settings: Vec::new(),
            ack: true,
        }
    }

    pub fn serialize(&self) -> BytesMut {
        let mut payload = BytesMut::with_capacity(self.settings.len() * 6);
        if !self.ack {
            for (id, value) in &self.settings {
                payload.put_u16(*id);
                payload.put_u32(*value);
            }
        }
        let flags = if self.ack { flags::ACK } else { 0 };
        frame(FrameType::Settings, flags, 0, &payload)
    }

    pub fn parse(header: &FrameHeader, mut payload: Bytes) -> Result<Self> {
        if header.stream_id != 0 {
            return Err(Error::http_protocol("SETTINGS on a non-zero stream"));
        }
        let ack = header.has_flag(flags::ACK);
        if ack && !payload.is_empty() {
            return Err(Error::http_protocol("SETTINGS ACK with a payload"));
        }
        if payload.len() % 6 != 0 {
            return Err(Error::http_protocol("SETTINGS payload not a multiple of 6"));
        }
        let mut settings = Vec::with_capacity(payload.len() / 6);
        while payload.remaining() >= 6 {
            settings.push((payload.get_u16(), payload.get_u32()));
        }
        Ok(Self { settings, ack })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdateFrame {
    pub stream_id: u32,
    pub increment: u32,
}

impl WindowUpdateFrame {
    pub fn new(stream_id: u32, increment: u32) -> Self {
        Self {
            stream_id,
            increment,
        }
    }

    pub fn serialize(&self) -> BytesMut {
        let increment = (self.increment & 0x7fff_ffff).to_be_bytes();
        frame(FrameType::WindowUpdate, 0, self.stream_id, &increment)
    }

    /// A zero increment is a protocol error (RFC 9113 6.9).
    pub fn parse(header: &FrameHeader, mut payload: Bytes) -> Result<Self> {
        if payload.len() != 4 {
            return Err(Error::http_protocol("WINDOW_UPDATE payload must be 4 bytes"));
        }
        let increment = payload.get_u32() & 0x7fff_ffff;
        if increment == 0 {
            return Err(Error::http_protocol("WINDOW_UPDATE with zero increment"));
        }
        Ok(Self::new(header.stream_id, increment))
    }
}

/// Stream dependency block on HEADERS (RFC 9113 6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityData {
    pub exclusive: bool,
    pub stream_dependency: u32,
    /// Wire weight, one less than the logical weight.
    pub weight: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    pub stream_id: u32,
    pub header_block: Bytes,
    pub end_stream: bool,
    pub end_headers: bool,
    pub priority: Option<PriorityData>,
}

impl HeadersFrame {
    pub fn new(stream_id: u32, header_block: Bytes) -> Self {
        Self {
            stream_id,
            header_block,
            end_stream: false,
            end_headers: true,
            priority: None,
        }
    }

    pub fn end_stream(mut self, end: bool) -> Self {
        self.end_stream = end;
        self
    }

    pub fn end_headers(mut self, end: bool) -> Self {
        self.end_headers = end;
        self
    }

    pub fn with_priority(mut self, priority: Option<PriorityData>) -> Self {
        self.priority = priority;
        self
    }

    pub fn serialize(&self) -> BytesMut {
        let mut flag_bits = 0u8;
        if self.end_stream {
            flag_bits |= flags::END_STREAM;
        }
        if self.end_headers {
            flag_bits |= flags::END_HEADERS;
        }

        let mut payload = BytesMut::with_capacity(5 + self.header_block.len());
        if let Some(priority) = &self.priority {
            flag_bits |= flags::PRIORITY;
            let dependency = if priority.exclusive {
                priority.stream_dependency | 0x8000_0000
            } else {
                priority.stream_dependency & 0x7fff_ffff
            };
            payload.put_u32(dependency);
            payload.put_u8(priority.weight);
        }
        payload.extend_from_slice(&self.header_block);
        frame(FrameType::Headers, flag_bits, self.stream_id, &payload)
    }

    pub fn parse(header: &FrameHeader, payload: Bytes) -> Result<Self> {
        if header.stream_id == 0 {
            return Err(Error::http_protocol("HEADERS on stream 0"));
        }
        let mut payload = unpad(payload, header.has_flag(flags::PADDED))?;
        let priority = if header.has_flag(flags::PRIORITY) {
            if payload.len() < 5 {
                return Err(Error::http_protocol("HEADERS priority block truncated"));
            }
            let dependency = payload.get_u32();
            Some(PriorityData {
                exclusive: dependency & 0x8000_0000 != 0,
                stream_dependency: dependency & 0x7fff_ffff,
                weight: payload.get_u8(),
            })
        } else {
            None
        };
        Ok(Self {
            stream_id: header.stream_id,
            header_block: payload,
            end_stream: header.has_flag(flags::END_STREAM),
            end_headers: header.has_flag(flags::END_HEADERS),
            priority,
        })
    }
}

pub fn continuation(stream_id: u32, fragment: &[u8], end_headers: bool) -> BytesMut {
    let flags = if end_headers { flags::END_HEADERS } else { 0 };
    frame(FrameType::Continuation, flags, stream_id, fragment)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub stream_id: u32,
    pub data: Bytes,
    pub end_stream: bool,
}

impl DataFrame {
    pub fn new(stream_id: u32, data: Bytes) -> Self {
        Self {
            stream_id,
            data,
            end_stream: false,
        }
    }

    pub fn end_stream(mut self, end: bool) -> Self {
        self.end_stream = end;
        self
    }

    pub fn serialize(&self) -> BytesMut {
        let flags = if self.end_stream { flags::END_STREAM } else { 0 };
        frame(FrameType::Data, flags, self.stream_id, &self.data)
    }

    pub fn parse(header: &FrameHeader, payload: Bytes) -> Result<Self> {
        if header.stream_id == 0 {
            return Err(Error::http_protocol("DATA on stream 0"));
        }
        Ok(Self {
            stream_id: header.stream_id,
            data: unpad(payload, header.has_flag(flags::PADDED))?,
            end_stream: header.has_flag(flags::END_STREAM),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFrame {
    pub ack: bool,
    pub data: [u8; 8],
}

impl PingFrame {
    pub fn ack(data: [u8; 8]) -> Self {
        Self { ack: true, data }
    }

    pub fn serialize(&self) -> BytesMut {
        let flags = if self.ack { flags::ACK } else { 0 };
        frame(FrameType::Ping, flags, 0, &self.data)
    }

    pub fn parse(header: &FrameHeader, payload: &[u8]) -> Result<Self> {
        let data: [u8; 8] = payload
            .try_into()
            .map_err(|_| Error::http_protocol("PING payload must be 8 bytes"))?;
        Ok(Self {
            ack: header.has_flag(flags::ACK),
            data,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoAwayFrame {
    pub last_stream_id: u32,
    pub error_code: ErrorCode,
    pub debug_data: Bytes,
}

impl GoAwayFrame {
    pub fn new(last_stream_id: u32, error_code: u32) -> Self {
        Self {
            last_stream_id,
            error_code: ErrorCode::from(error_code),
            debug_data: Bytes::new(),
        }
    }

    pub fn serialize(&self) -> BytesMut {
        let code = match self.error_code {
            ErrorCode::Unknown(v) => v,
            ErrorCode::NoError => 0x0,
            ErrorCode::ProtocolError => 0x1,
            ErrorCode::InternalError => 0x2,
            ErrorCode::FlowControlError => 0x3,
            ErrorCode::SettingsTimeout => 0x4,
            ErrorCode::StreamClosed => 0x5,
            ErrorCode::FrameSizeError => 0x6,
            ErrorCode::RefusedStream => 0x7,
            ErrorCode::Cancel => 0x8,
            ErrorCode::CompressionError => 0x9,
            ErrorCode::ConnectError => 0xa,
            ErrorCode::EnhanceYourCalm => 0xb,
            ErrorCode::InadequateSecurity => 0xc,
            ErrorCode::Http11Required => 0xd,
        };
        let mut payload = BytesMut::with_capacity(8 + self.debug_data.len());
        payload.put_u32(self.last_stream_id & 0x7fff_ffff);
        payload.put_u32(code);
        payload.extend_from_slice(&self.debug_data);
        frame(FrameType::GoAway, 0, 0, &payload)
    }

    pub fn parse(mut payload: Bytes) -> Result<Self> {
        if payload.len() < 8 {
            return Err(Error::http_protocol("GOAWAY payload truncated"));
        }
        let last_stream_id = payload.get_u32() & 0x7fff_ffff;
        let error_code = ErrorCode::from(payload.get_u32());
        Ok(Self {
            last_stream_id,
            error_code,
            debug_data: payload,
        })
    }
}

pub fn parse_rst_stream(mut payload: Bytes) -> Result<ErrorCode> {
    if payload.len() != 4 {
        return Err(Error::http_protocol("RST_STREAM payload must be 4 bytes"));
    }
    Ok(ErrorCode::from(payload.get_u32()))
}
