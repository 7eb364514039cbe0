//! Bulk ASCII waveform acquisition from an oscilloscope.
//!
//! # Transfer
//!
//! The scope is switched to ASCII transfers on the requested channel with raw
//! point mode, then `:WAV:DATA?` is issued and the reply is accumulated chunk
//! by chunk. The reply carries no usable length prefix, so the end of the
//! transfer is recognised from its content:
//!
//! - a payload is complete once it ends with `\n` and already yields at least
//!   one sample under the parsing rules below;
//! - a payload that ends with `\n` but holds no sample yet (a header line on
//!   its own) waits at most [`TransferOptions::settle_timeout`] for more data,
//!   then ends and fails to parse;
//! - the instrument closing the socket ends the transfer if any bytes arrived.
//!
//! A short read is *not* treated as end-of-transfer: chunk sizes say nothing
//! about where the reply ends, and a reply that fills the buffer exactly would
//! otherwise leave the reader blocked forever.
//!
//! # Parsing
//!
//! Trailing whitespace is trimmed, any text up to the first remaining newline
//! is discarded as header, and a leading IEEE 488.2 block header (`#<n><n
//! digits>`) on the data line is skipped. The rest is split on commas. Tokens
//! that do not parse as a finite `f64` are skipped; if nothing parses, the
//! acquisition fails with a protocol error.

use crate::commands::{self, scope};
use crate::error::{ScpiError, ScpiResult};
use crate::session::InstrumentSession;
use std::io;
use std::time::Duration;

/// Default number of points requested.
pub const DEFAULT_POINTS: u32 = 1000;

/// Default upper bound on a waveform reply.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Default wait for data after a line that holds no sample.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_millis(500);

/// Limits applied while reading a waveform reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Reject replies larger than this.
    pub max_payload_bytes: usize,
    /// How long to wait for more data once a header line has arrived on its own.
    pub settle_timeout: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
        }
    }
}

/// What to acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformRequest {
    /// Source channel.
    pub channel: u8,
    /// Number of points to transfer.
    pub points: u32,
}

impl WaveformRequest {
    /// Request `points` samples from `channel`.
    pub fn new(channel: u8, points: u32) -> Self {
        Self { channel, points }
    }

    /// Setup commands sent before the data request, in order.
    pub fn setup_commands(&self) -> Vec<String> {
        vec![
            commands::WAVEFORM_FORMAT_ASCII.to_string(),
            scope::waveform_source(self.channel),
            commands::WAVEFORM_POINTS_MODE_RAW.to_string(),
            scope::waveform_points(self.points),
        ]
    }
}

impl Default for WaveformRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_POINTS)
    }
}

/// Samples from one acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Source channel.
    pub channel: u8,
    /// Sample values in acquisition order. Never empty.
    pub samples: Vec<f64>,
}

impl Waveform {
    /// Smallest and largest sample.
    pub fn range(&self) -> (f64, f64) {
        sample_range(&self.samples).unwrap_or((0.0, 0.0))
    }
}

/// Smallest and largest value, or `None` for an empty slice.
pub(crate) fn sample_range(samples: &[f64]) -> Option<(f64, f64)> {
    samples.iter().fold(None, |acc, &s| match acc {
        None => Some((s, s)),
        Some((lo, hi)) => Some((lo.min(s), hi.max(s))),
    })
}

/// Acquire one waveform.
///
/// The reply is read in chunks of the session's `read_buffer_size` and is
/// rejected once it grows past `options.max_payload_bytes`.
pub async fn acquire(
    session: &mut InstrumentSession,
    request: &WaveformRequest,
    options: &TransferOptions,
) -> ScpiResult<Waveform> {
    tracing::info!(
        channel = request.channel,
        points = request.points,
        endpoint = %session.endpoint(),
        "Acquiring waveform"
    );

    for command in request.setup_commands() {
        session.send(&command).await?;
    }
    session.send(commands::WAVEFORM_DATA).await?;

    let payload = read_payload(session, options).await?;
    let text = String::from_utf8(payload)
        .map_err(|e| ScpiError::Protocol(format!("waveform payload is not valid text: {}", e)))?;

    let samples = parse_samples(&text)?;
    tracing::info!(channel = request.channel, samples = samples.len(), "Waveform acquired");
    Ok(Waveform {
        channel: request.channel,
        samples,
    })
}

async fn read_payload(
    session: &mut InstrumentSession,
    options: &TransferOptions,
) -> ScpiResult<Vec<u8>> {
    let mut chunk = vec![0u8; session.config().read_buffer_size];
    let mut payload = Vec::new();
    let mut awaiting_body = false;

    loop {
        let n = if awaiting_body {
            match session.read_chunk_within(&mut chunk, options.settle_timeout).await? {
                Some(n) => n,
                None => {
                    tracing::debug!(bytes = payload.len(), "No data after header line, ending transfer");
                    break;
                }
            }
        } else {
            session.read_chunk(&mut chunk).await?
        };

        if n == 0 {
            if payload.is_empty() {
                return Err(ScpiError::Transport {
                    endpoint: session.endpoint().to_string(),
                    source: io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed before any waveform data arrived",
                    ),
                });
            }
            tracing::debug!(bytes = payload.len(), "Instrument closed connection, ending transfer");
            break;
        }

        payload.extend_from_slice(&chunk[..n]);
        tracing::trace!(chunk = n, total = payload.len(), "Waveform chunk");

        if payload.len() > options.max_payload_bytes {
            return Err(ScpiError::Protocol(format!(
                "waveform payload exceeds {} bytes without a terminator",
                options.max_payload_bytes
            )));
        }
        if transfer_complete(&payload) {
            break;
        }
        awaiting_body = payload.ends_with(b"\n");
    }

    Ok(payload)
}

/// True once `payload` is terminated and holds at least one sample.
///
/// Uses the same header and token rules as [`parse_samples`], so a header
/// line on its own is never mistaken for a whole reply.
pub fn transfer_complete(payload: &[u8]) -> bool {
    if !payload.ends_with(b"\n") {
        return false;
    }
    std::str::from_utf8(payload).is_ok_and(|text| parse_samples(text).is_ok())
}

/// Parse a waveform reply into samples.
pub fn parse_samples(payload: &str) -> ScpiResult<Vec<f64>> {
    let trimmed = payload.trim_end();
    let body = match trimmed.split_once('\n') {
        Some((_header, body)) => body,
        None => trimmed,
    };

    let samples: Vec<f64> = strip_block_header(body)
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .collect();

    if samples.is_empty() {
        return Err(ScpiError::Protocol(
            "waveform payload contains no samples".to_string(),
        ));
    }
    Ok(samples)
}

/// Skip a definite-length block header (`#` + digit count + length) at the
/// start of `data`.
fn strip_block_header(data: &str) -> &str {
    let Some(rest) = data.strip_prefix('#') else {
        return data;
    };
    let Some(width) = rest.chars().next().and_then(|c| c.to_digit(10)) else {
        return data;
    };
    let end = 1 + width as usize;
    match rest.get(end..) {
        Some(tail) if width > 0 && rest[1..end].bytes().all(|b| b.is_ascii_digit()) => tail,
        _ => data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_payload_after_header() {
        let samples = parse_samples("#HEADER\n1.0,2.0,3.0,2.0").unwrap();
        assert_eq!(samples, vec![1.0, 2.0, 3.0, 2.0]);
    }

    #[test]
    fn parses_payload_without_header() {
        let samples = parse_samples("-1.5e-3, 2.5E-3 ,0\n").unwrap();
        assert_eq!(samples, vec![-1.5e-3, 2.5e-3, 0.0]);
    }

    #[test]
    fn skips_malformed_tokens() {
        let samples = parse_samples("#9000000011\n1.0,,oops,4.0,").unwrap();
        assert_eq!(samples, vec![1.0, 4.0]);

        let samples = parse_samples("NaN,2.0,inf").unwrap();
        assert_eq!(samples, vec![2.0]);
    }

    #[test]
    fn empty_or_malformed_payload_is_a_protocol_error() {
        for payload in ["\n,,,", "", "\n", "#HDR\nfoo,bar"] {
            let err = parse_samples(payload).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Protocol, "payload {:?}", payload);
        }
    }

    #[test]
    fn completion_requires_terminator() {
        assert!(!transfer_complete(b""));
        assert!(!transfer_complete(b"1.0,2.0"));
        assert!(transfer_complete(b"1.0,2.0\n"));
        assert!(!transfer_complete(b"\n"));
    }

    #[test]
    fn header_line_alone_is_not_complete() {
        assert!(!transfer_complete(b"#HEADER\n"));
        assert!(!transfer_complete(b"HEADER\n"));
        assert!(!transfer_complete(b"#HEADER\n1.0,2."));
        assert!(transfer_complete(b"#HEADER\n1.0,2.0\n"));
        assert!(transfer_complete(b"HEADER\n1.0,2.0\n"));
    }

    #[test]
    fn block_header_on_the_data_line() {
        assert!(transfer_complete(b"#800000011 1.0,2.0,3.0\n"));
        let samples = parse_samples("#800000011 1.0,2.0,3.0\n").unwrap();
        assert_eq!(samples, vec![1.0, 2.0, 3.0]);

        let samples = parse_samples("#9000000015-1.5,0.25,2\n").unwrap();
        assert_eq!(samples, vec![-1.5, 0.25, 2.0]);
    }

    #[test]
    fn setup_sequence() {
        let request = WaveformRequest::new(2, 500);
        assert_eq!(
            request.setup_commands(),
            vec![
                ":WAV:FORM ASCii",
                ":WAV:SOUR CHAN2",
                ":WAV:POIN:MODE RAW",
                ":WAV:POIN 500",
            ]
        );
    }

    #[test]
    fn range_of_samples() {
        let wf = Waveform {
            channel: 1,
            samples: vec![3.0, -1.0, 7.5],
        };
        assert_eq!(wf.range(), (-1.0, 7.5));
        assert_eq!(sample_range(&[]), None);
    }
}
