//! Status page - a tiny HTTP/1.0 responder for the device's own address.
//!
//! The firmware owns the TCP socket; this module only turns request bytes
//! into a [`Route`] and a [`StatusReport`] into response bytes, so the
//! whole exchange can be checked on the host.
//!
//! One request per connection: the firmware sends the response and
//! closes.

use core::fmt::{self, Write};

use heapless::{String, Vec};

use crate::bridge::{InterfaceAddressing, LinkState, MacAddress, StatsSnapshot};

/// Longest request head kept while looking for the end of the request
/// line.
pub const REQUEST_LEN: usize = 256;

/// Longest rendered response, headers included.
pub const RESPONSE_LEN: usize = 1024;

const BODY_LEN: usize = 768;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Route {
    /// `GET /`
    Status,
    /// `GET` for any other path.
    NotFound,
    MethodNotAllowed,
    /// Not an HTTP/1.x request line, or too long to find one.
    BadRequest,
}

impl Route {
    fn status_line(self) -> &'static str {
        match self {
            Route::Status => "200 OK",
            Route::NotFound => "404 Not Found",
            Route::MethodNotAllowed => "405 Method Not Allowed",
            Route::BadRequest => "400 Bad Request",
        }
    }
}

/// Classify a complete request line (without the trailing CRLF).
pub fn route(line: &[u8]) -> Route {
    let Ok(line) = core::str::from_utf8(line) else {
        return Route::BadRequest;
    };
    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Route::BadRequest;
    };
    if !version.starts_with("HTTP/1.") || !target.starts_with('/') {
        return Route::BadRequest;
    }

    let path = target.split('?').next().unwrap_or(target);
    match (method, path) {
        ("GET", "/") => Route::Status,
        ("GET", _) => Route::NotFound,
        _ => Route::MethodNotAllowed,
    }
}

/// Collects request bytes from the socket until the request line is
/// complete.
#[derive(Default)]
pub struct RequestBuffer {
    bytes: Vec<u8, REQUEST_LEN>,
}

impl RequestBuffer {
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Append received bytes; returns the route once the request line is
    /// in.  Headers after the request line are ignored.
    pub fn push(&mut self, data: &[u8]) -> Option<Route> {
        for &b in data {
            if self.bytes.push(b).is_err() {
                return Some(Route::BadRequest);
            }
            if self.bytes.ends_with(b"\r\n") {
                let line = &self.bytes[..self.bytes.len() - 2];
                return Some(route(line));
            }
        }
        None
    }
}

/// Everything the status page shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub link: LinkState,
    pub mac: MacAddress,
    pub addressing: InterfaceAddressing,
    pub stats: StatsSnapshot,
}

fn link_name(state: LinkState) -> &'static str {
    match state {
        LinkState::Down => "down",
        LinkState::Configuring => "configuring",
        LinkState::Up => "up",
    }
}

fn write_body(out: &mut impl Write, route: Route, report: &StatusReport) -> fmt::Result {
    if route != Route::Status {
        return writeln!(out, "{}", route.status_line());
    }

    let s = &report.stats;
    writeln!(out, "link: {}", link_name(report.link))?;
    writeln!(out, "mac: {}", report.mac)?;
    writeln!(out, "address: {}", report.addressing)?;
    writeln!(out, "rx_frames: {}", s.rx_frames)?;
    writeln!(out, "rx_congested: {}", s.rx_congested)?;
    writeln!(out, "rx_not_ready: {}", s.rx_not_ready)?;
    writeln!(out, "rx_malformed: {}", s.rx_malformed)?;
    writeln!(out, "rx_oversized: {}", s.rx_oversized)?;
    writeln!(out, "tx_frames: {}", s.tx_frames)?;
    writeln!(out, "tx_congested: {}", s.tx_congested)?;
    writeln!(out, "tx_not_ready: {}", s.tx_not_ready)?;
    writeln!(out, "tx_oversized: {}", s.tx_oversized)?;
    writeln!(out, "tx_busy_retries: {}", s.tx_busy_retries)?;
    writeln!(out, "drained: {}", s.drained)?;
    writeln!(out, "dropped: {}", s.total_dropped())
}

/// Render the full HTTP response for `route` into `out`.
///
/// Fails only if the response does not fit in `out`.
pub fn render(
    route: Route,
    report: &StatusReport,
    out: &mut String<RESPONSE_LEN>,
) -> fmt::Result {
    let mut body: String<BODY_LEN> = String::new();
    write_body(&mut body, route, report)?;

    out.clear();
    write!(
        out,
        "HTTP/1.0 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n",
        route.status_line(),
        body.len()
    )?;
    if route == Route::MethodNotAllowed {
        out.push_str("Allow: GET\r\n").map_err(|_| fmt::Error)?;
    }
    out.push_str("\r\n").map_err(|_| fmt::Error)?;
    out.push_str(&body).map_err(|_| fmt::Error)
}
