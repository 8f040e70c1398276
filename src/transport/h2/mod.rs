//! HTTP/2 written by hand so the connection preface carries the
//! fingerprint: SETTINGS entries in their configured order, the
//! connection WINDOW_UPDATE, the HEADERS priority block and the
//! pseudo-header order.

mod connection;
pub mod frame;
mod hpack;

pub use connection::H2Connection;
pub use hpack::{HpackDecoder, HpackEncoder, RequestTarget};
