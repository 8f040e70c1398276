//! HTTP/2 client connection carrying one request.
//!
//! The preface, SETTINGS and WINDOW_UPDATE go out in a single write right
//! after the TLS handshake, and the request HEADERS follow without waiting
//! for the server's SETTINGS, the way browsers open a connection.

use bytes::{Bytes, BytesMut};
use http::Method;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};
use url::{Position, Url};

use crate::error::{Error, Result};
use crate::fingerprint::http2::{setting, DEFAULT_MAX_FRAME_SIZE, DEFAULT_WINDOW};
use crate::fingerprint::Http2Settings;
use crate::response::RawResponse;

use super::frame::*;
use super::hpack::{HpackDecoder, HpackEncoder, RequestTarget};

const READ_CHUNK: usize = 16 * 1024;
const STREAM_ID: u32 = 1;

/// What the server has told us so far.
#[derive(Debug, Clone, Copy)]
struct PeerSettings {
    initial_window_size: u32,
    max_frame_size: u32,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            initial_window_size: DEFAULT_WINDOW,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Response state of the request stream.
#[derive(Debug, Default)]
struct ResponseState {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: BytesMut,
    /// Header block waiting for CONTINUATION, with its END_STREAM flag.
    pending_block: Option<(BytesMut, bool)>,
    send_window: i64,
    /// Bytes received since the stream window was last replenished.
    unacked: u32,
    done: bool,
}

pub struct H2Connection<S> {
    io: S,
    settings: Http2Settings,
    encoder: HpackEncoder,
    decoder: HpackDecoder,
    read_buf: BytesMut,
    peer: PeerSettings,
    peer_settings_seen: bool,
    conn_send_window: i64,
    conn_unacked: u32,
    max_body_size: usize,
}

impl<S> H2Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Send the connection preface with the fingerprinted SETTINGS and
    /// WINDOW_UPDATE. Does not wait for the server.
    pub async fn handshake(mut io: S, settings: &Http2Settings, max_body_size: usize) -> Result<Self> {
        let mut preface = BytesMut::new();
        preface.extend_from_slice(CONNECTION_PREFACE);
        preface.extend_from_slice(&SettingsFrame::new(settings.settings.clone()).serialize());
        if settings.window_update > 0 {
            preface.extend_from_slice(&WindowUpdateFrame::new(0, settings.window_update).serialize());
        }
        io.write_all(&preface)
            .await
            .map_err(|e| Error::http_protocol(format!("Failed to send HTTP/2 preface: {}", e)))?;
        io.flush()
            .await
            .map_err(|e| Error::http_protocol(format!("Failed to flush HTTP/2 preface: {}", e)))?;
        trace!(http2 = %settings, "sent HTTP/2 preface");

        Ok(Self {
            io,
            settings: settings.clone(),
            encoder: HpackEncoder::new(settings.pseudo_order),
            decoder: HpackDecoder::new(),
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            peer: PeerSettings::default(),
            peer_settings_seen: false,
            conn_send_window: i64::from(DEFAULT_WINDOW),
            conn_unacked: 0,
            max_body_size,
        })
    }

    /// Send one request on stream 1 and buffer the whole response.
    pub async fn send_request(
        &mut self,
        method: &Method,
        url: &Url,
        headers: &[(String, String)],
        body: Option<&Bytes>,
    ) -> Result<RawResponse> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::http_protocol("URL has no host"))?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let path = match &url[Position::BeforePath..Position::AfterQuery] {
            "" => "/",
            path => path,
        };
        let target = RequestTarget {
            method: method.as_str(),
            scheme: url.scheme(),
            authority: &authority,
            path,
        };

        let mut state = ResponseState {
            send_window: i64::from(self.peer.initial_window_size),
            ..Default::default()
        };

        let body = body.filter(|b| !b.is_empty());
        self.write_headers(&target, headers, body.is_none()).await?;
        if let Some(body) = body {
            self.write_body(&mut state, body.clone()).await?;
        }

        while !state.done {
            let (header, payload) = self.read_frame().await?;
            self.handle_frame(&mut state, header, payload).await?;
        }

        let status = state
            .status
            .ok_or_else(|| Error::http_protocol("HTTP/2 stream ended without a response"))?;
        debug!(status, body_len = state.body.len(), "HTTP/2 response complete");
        Ok(RawResponse::new(status, state.headers, state.body.freeze(), "HTTP/2"))
    }

    async fn write_headers(
        &mut self,
        target: &RequestTarget<'_>,
        headers: &[(String, String)],
        end_stream: bool,
    ) -> Result<()> {
        let block = self.encoder.encode_request(target, headers);
        let max_frame = self.peer.max_frame_size as usize;
        let priority = self.settings.priority.map(|p| PriorityData {
            exclusive: p.exclusive,
            stream_dependency: p.stream_dependency,
            weight: p.wire_weight(),
        });

        // The priority block shares the first frame with the header block.
        let first_len = block.len().min(max_frame - if priority.is_some() { 5 } else { 0 });
        let (first, mut rest) = (block.slice(..first_len), block.slice(first_len..));

        let mut out = HeadersFrame::new(STREAM_ID, first)
            .end_stream(end_stream)
            .end_headers(rest.is_empty())
            .with_priority(priority)
            .serialize();
        while !rest.is_empty() {
            let chunk = rest.split_to(rest.len().min(max_frame));
            out.extend_from_slice(&continuation(STREAM_ID, &chunk, rest.is_empty()));
        }
        self.write(&out).await
    }

    /// Send the body as DATA frames within the peer's flow-control windows.
    async fn write_body(&mut self, state: &mut ResponseState, mut body: Bytes) -> Result<()> {
        while !body.is_empty() {
            if state.done {
                // The server answered before reading the whole body.
                debug!(unsent = body.len(), "HTTP/2 response arrived before request body was sent");
                return Ok(());
            }
            let window = self.conn_send_window.min(state.send_window);
            if window <= 0 {
                let (header, payload) = self.read_frame().await?;
                self.handle_frame(state, header, payload).await?;
                continue;
            }
            let len = body
                .len()
                .min(self.peer.max_frame_size as usize)
                .min(window as usize);
            let chunk = body.split_to(len);
            let frame = DataFrame::new(STREAM_ID, chunk).end_stream(body.is_empty());
            self.write(&frame.serialize()).await?;
            self.conn_send_window -= len as i64;
            state.send_window -= len as i64;
        }
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.io
            .write_all(bytes)
            .await
            .map_err(|e| Error::http_protocol(format!("HTTP/2 write failed: {}", e)))?;
        self.io
            .flush()
            .await
            .map_err(|e| Error::http_protocol(format!("HTTP/2 flush failed: {}", e)))
    }

    /// Read one frame. Until the server's SETTINGS arrives the wait is
    /// bounded by the handshake timeout.
    async fn read_frame(&mut self) -> Result<(FrameHeader, Bytes)> {
        match self.settings.handshake_timeout.filter(|_| !self.peer_settings_seen) {
            Some(limit) => match tokio::time::timeout(limit, self.read_frame_inner()).await {
                Ok(frame) => frame,
                Err(_) => {
                    let goaway = GoAwayFrame::new(0, 0x4).serialize();
                    let _ = self.write(&goaway).await;
                    Err(Error::http_protocol(format!(
                        "HTTP/2 handshake timed out after {:?}",
                        limit
                    )))
                }
            },
            None => self.read_frame_inner().await,
        }
    }

    async fn read_frame_inner(&mut self) -> Result<(FrameHeader, Bytes)> {
        self.fill(FRAME_HEADER_SIZE).await?;
        let header = FrameHeader::parse(&self.read_buf[..FRAME_HEADER_SIZE])
            .ok_or_else(|| Error::http_protocol("truncated frame header"))?;
        if header.length > self.settings.max_frame_size() {
            return Err(Error::http_protocol(format!(
                "FRAME_SIZE_ERROR: frame of {} bytes exceeds {}",
                header.length,
                self.settings.max_frame_size()
            )));
        }

        let total = FRAME_HEADER_SIZE + header.length as usize;
        self.fill(total).await?;
        let mut frame = self.read_buf.split_to(total);
        let payload = frame.split_off(FRAME_HEADER_SIZE).freeze();

        if !self.peer_settings_seen && header.frame_type != FrameType::Settings {
            return Err(Error::http_protocol(
                "server connection preface must start with SETTINGS",
            ));
        }
        Ok((header, payload))
    }

    async fn fill(&mut self, needed: usize) -> Result<()> {
        while self.read_buf.len() < needed {
            self.read_buf.reserve(READ_CHUNK);
            let n = self
                .io
                .read_buf(&mut self.read_buf)
                .await
                .map_err(|e| Error::http_protocol(format!("HTTP/2 read failed: {}", e)))?;
            if n == 0 {
                return Err(Error::http_protocol(
                    "connection closed before HTTP/2 response completed",
                ));
            }
        }
        Ok(())
    }

    async fn handle_frame(&mut self, state: &mut ResponseState, header: FrameHeader, payload: Bytes) -> Result<()> {
        if state.pending_block.is_some() && header.frame_type != FrameType::Continuation {
            return Err(Error::http_protocol("expected CONTINUATION frame"));
        }

        match header.frame_type {
            FrameType::Settings => {
                let frame = SettingsFrame::parse(&header, payload)?;
                if !frame.ack {
                    self.apply_peer_settings(state, &frame)?;
                    self.peer_settings_seen = true;
                    self.write(&SettingsFrame::ack().serialize()).await?;
                }
            }
            FrameType::WindowUpdate => {
                let update = WindowUpdateFrame::parse(&header, payload)?;
                if update.stream_id == 0 {
                    self.conn_send_window += i64::from(update.increment);
                } else if update.stream_id == STREAM_ID {
                    state.send_window += i64::from(update.increment);
                }
            }
            FrameType::Ping => {
                let ping = PingFrame::parse(&header, &payload)?;
                if !ping.ack {
                    self.write(&PingFrame::ack(ping.data).serialize()).await?;
                }
            }
            FrameType::GoAway => {
                let goaway = GoAwayFrame::parse(payload)?;
                debug!(last_stream_id = goaway.last_stream_id, error = ?goaway.error_code, "received GOAWAY");
                if goaway.last_stream_id < STREAM_ID {
                    return Err(Error::http_protocol(format!(
                        "server sent GOAWAY ({:?}) before processing the request",
                        goaway.error_code
                    )));
                }
            }
            FrameType::RstStream if header.stream_id == STREAM_ID => {
                let code = parse_rst_stream(payload)?;
                return Err(Error::http_protocol(format!("stream reset by server: {:?}", code)));
            }
            FrameType::Headers if header.stream_id == STREAM_ID => {
                let frame = HeadersFrame::parse(&header, payload)?;
                let block = BytesMut::from(&frame.header_block[..]);
                if frame.end_headers {
                    self.finish_header_block(state, &block, frame.end_stream)?;
                } else {
                    state.pending_block = Some((block, frame.end_stream));
                }
            }
            FrameType::Continuation => {
                let Some((mut block, end_stream)) = state.pending_block.take() else {
                    return Err(Error::http_protocol("CONTINUATION without HEADERS"));
                };
                if header.stream_id != STREAM_ID {
                    return Err(Error::http_protocol("CONTINUATION on the wrong stream"));
                }
                block.extend_from_slice(&payload);
                if block.len() > self.max_body_size {
                    return Err(Error::http_protocol("response header block too large"));
                }
                if header.has_flag(flags::END_HEADERS) {
                    self.finish_header_block(state, &block, end_stream)?;
                } else {
                    state.pending_block = Some((block, end_stream));
                }
            }
            FrameType::Data if header.stream_id == STREAM_ID => {
                let flow_len = header.length;
                let frame = DataFrame::parse(&header, payload)?;
                if state.status.is_none() {
                    return Err(Error::http_protocol("DATA before response HEADERS"));
                }
                if state.body.len() + frame.data.len() > self.max_body_size {
                    return Err(Error::BodyTooLarge {
                        limit: self.max_body_size,
                    });
                }
                state.body.extend_from_slice(&frame.data);
                if frame.end_stream {
                    state.done = true;
                } else {
                    self.replenish(state, flow_len).await?;
                }
            }
            FrameType::PushPromise => {
                return Err(Error::http_protocol("PUSH_PROMISE received with push disabled"));
            }
            // Frames for other streams, PRIORITY and unknown types.
            _ => trace!(frame_type = ?header.frame_type, stream_id = header.stream_id, "ignored frame"),
        }
        Ok(())
    }

    fn apply_peer_settings(&mut self, state: &mut ResponseState, frame: &SettingsFrame) -> Result<()> {
        for (id, value) in &frame.settings {
            match *id {
                setting::INITIAL_WINDOW_SIZE => {
                    if *value > 0x7fff_ffff {
                        return Err(Error::http_protocol("peer INITIAL_WINDOW_SIZE too large"));
                    }
                    let delta = i64::from(*value) - i64::from(self.peer.initial_window_size);
                    state.send_window += delta;
                    self.peer.initial_window_size = *value;
                }
                setting::MAX_FRAME_SIZE => {
                    if !(DEFAULT_MAX_FRAME_SIZE..=0x00ff_ffff).contains(value) {
                        return Err(Error::http_protocol("peer MAX_FRAME_SIZE out of range"));
                    }
                    self.peer.max_frame_size = *value;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn finish_header_block(&mut self, state: &mut ResponseState, block: &[u8], end_stream: bool) -> Result<()> {
        let fields = self.decoder.decode(block)?;

        if state.status.is_some() {
            // Trailers: only END_STREAM matters.
            if !end_stream {
                return Err(Error::http_protocol("trailers without END_STREAM"));
            }
            state.done = true;
            return Ok(());
        }

        let mut status = None;
        let mut regular = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            if name == ":status" {
                status = Some(
                    value
                        .parse::<u16>()
                        .map_err(|_| Error::http_protocol(format!("invalid :status {:?}", value)))?,
                );
            } else if name.starts_with(':') {
                return Err(Error::http_protocol(format!("unexpected pseudo-header {}", name)));
            } else {
                regular.push((name, value));
            }
        }
        let status = status.ok_or_else(|| Error::http_protocol("response without :status"))?;

        if (100..200).contains(&status) {
            // Interim response; the final one follows.
            return Ok(());
        }
        state.status = Some(status);
        state.headers = regular;
        state.done = end_stream;
        Ok(())
    }

    /// Return consumed window once half of it is used.
    async fn replenish(&mut self, state: &mut ResponseState, consumed: u32) -> Result<()> {
        self.conn_unacked += consumed;
        state.unacked += consumed;

        let mut out = BytesMut::new();
        if self.conn_unacked >= self.settings.connection_window() / 2 {
            out.extend_from_slice(&WindowUpdateFrame::new(0, self.conn_unacked).serialize());
            self.conn_unacked = 0;
        }
        if state.unacked >= self.settings.initial_window_size() / 2 {
            out.extend_from_slice(&WindowUpdateFrame::new(STREAM_ID, state.unacked).serialize());
            state.unacked = 0;
        }
        if out.is_empty() {
            return Ok(());
        }
        self.write(&out).await
    }
}
