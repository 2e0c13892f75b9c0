//! Worker records from a benchd log
//!
//! Every benchd worker writes one line per state change: a fixed number of
//! whitespace separated fields beginning with a record tag, the series name and
//! a wall-clock time. Manager lines and anything else sharing the stream have a
//! different shape. Parsing is decode-or-reject: a line either becomes a
//! complete [`WorkerEvent`] or is classified as foreign with `Ok(None)`. Once the
//! field count matches the record is assumed well-formed and any malformed
//! field is an [`Error`].

use std::{fmt, str::FromStr};

use chrono::{NaiveTime, Timelike};

/// Number of whitespace separated fields in a worker line.
pub const FIELD_COUNT: usize = 15;

const TIME_FORMAT: &str = "%H:%M:%S%.f";
const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Errors produced while decoding a worker line
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The time field is not `HH:MM:SS.ffffff`
    #[error("Malformed timestamp {value:?}: {source}")]
    Timestamp {
        /// The offending field
        value: String,
        /// Underlying chrono error
        #[source]
        source: chrono::ParseError,
    },
    /// A designated integer field is not an integer
    #[error("Malformed integer in field {field}: {value:?}")]
    Integer {
        /// Name of the field
        field: &'static str,
        /// The offending field
        value: String,
    },
    /// The status code is outside of the known range
    #[error("Unknown status code {0:?}")]
    UnknownStatus(String),
}

/// The record tag in the first field of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Worker line, tagged `W`
    Worker,
    /// Any other tag with worker arity
    Other,
}

impl Kind {
    fn from_tag(tag: &str) -> Self {
        if tag == "W" { Kind::Worker } else { Kind::Other }
    }
}

/// Outcome reported by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The worker started, code 0
    WorkerStarted,
    /// A trace was sent and acknowledged, code 1
    TraceSent,
    /// Flushing the trace exceeded the send timeout, code 2
    SendTimeout,
    /// Flushing the trace failed, code 3
    SendError,
    /// The trace did not come back before the receive timeout, code 4
    ReceiveTimeout,
    /// The worker was stopped, code 5
    Exited,
}

impl Status {
    /// The numeric code benchd writes for this status.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Status::WorkerStarted => 0,
            Status::TraceSent => 1,
            Status::SendTimeout => 2,
            Status::SendError => 3,
            Status::ReceiveTimeout => 4,
            Status::Exited => 5,
        }
    }

    /// True for the error variants and for worker exit.
    #[must_use]
    pub fn is_failure(self) -> bool {
        !matches!(self, Status::WorkerStarted | Status::TraceSent)
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(Status::WorkerStarted),
            "1" => Ok(Status::TraceSent),
            "2" => Ok(Status::SendTimeout),
            "3" => Ok(Status::SendError),
            "4" => Ok(Status::ReceiveTimeout),
            "5" => Ok(Status::Exited),
            _ => Err(Error::UnknownStatus(s.to_string())),
        }
    }
}

/// Wall-clock time of day with nanosecond resolution.
///
/// benchd logs carry no date, so a run must not span midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Construct from nanoseconds since midnight.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Nanoseconds since midnight.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Seconds since midnight, fractional.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SECOND as f64
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let time = NaiveTime::parse_from_str(s, TIME_FORMAT).map_err(|source| {
            Error::Timestamp {
                value: s.to_string(),
                source,
            }
        })?;
        let secs = u64::from(time.num_seconds_from_midnight());
        Ok(Self(secs * NANOS_PER_SECOND + u64::from(time.nanosecond())))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0 / NANOS_PER_SECOND;
        let micros = (self.0 % NANOS_PER_SECOND) / 1_000;
        write!(
            f,
            "{:02}:{:02}:{:02}.{micros:06}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        )
    }
}

/// Fields carried by a worker line that aggregation does not interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Details<'a> {
    /// Depth of the generated trace
    pub trace_depth: &'a str,
    /// Depth at which the risky attribute was placed
    pub risky_attribute_depth: &'a str,
    /// Number of extra attributes in the trace
    pub extra_attributes: &'a str,
    /// Accumulated span length, milliseconds
    pub span_length: &'a str,
    /// Cooldown after the trace, milliseconds
    pub cool_down: &'a str,
    /// Worker start, unix milliseconds
    pub start: &'a str,
    /// Response received, unix milliseconds
    pub receive: &'a str,
    /// Delta between end of send and receive, milliseconds
    pub send_receive_delta: &'a str,
}

/// A single decoded worker line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerEvent<'a> {
    /// Record tag
    pub kind: Kind,
    /// Name of the benchmark run this event belongs to
    pub series: &'a str,
    /// Time of day the line was written
    pub timestamp: Timestamp,
    /// Worker identifier within its manager
    pub worker_id: &'a str,
    /// Reported outcome
    pub status: Status,
    /// Start of sending the payload
    pub send_timestamp: i64,
    /// End of sending the payload
    pub end_send_timestamp: i64,
    /// Uninterpreted fields
    pub details: Details<'a>,
}

impl WorkerEvent<'_> {
    /// Send latency, `end_send_timestamp - send_timestamp`. Only a
    /// [`Status::TraceSent`] event has one.
    #[must_use]
    pub fn latency(&self) -> Option<i64> {
        (self.status == Status::TraceSent)
            .then(|| self.end_send_timestamp.saturating_sub(self.send_timestamp))
    }
}

fn integer(field: &'static str, value: &str) -> Result<i64, Error> {
    value.parse().map_err(|_| Error::Integer {
        field,
        value: value.to_string(),
    })
}

/// Decode one log line.
///
/// Returns `Ok(None)` when the line does not have exactly [`FIELD_COUNT`]
/// fields.
///
/// # Errors
///
/// Returns an error if the line has worker arity but its time, status or send
/// timestamps are malformed.
pub fn parse(line: &str) -> Result<Option<WorkerEvent<'_>>, Error> {
    let mut fields = [""; FIELD_COUNT];
    let mut parts = line.split_whitespace();
    for slot in &mut fields {
        match parts.next() {
            Some(field) => *slot = field,
            None => return Ok(None),
        }
    }
    if parts.next().is_some() {
        return Ok(None);
    }

    let [
        tag,
        series,
        time,
        worker_id,
        status,
        trace_depth,
        risky_attribute_depth,
        extra_attributes,
        span_length,
        cool_down,
        start,
        send,
        end_send,
        receive,
        send_receive_delta,
    ] = fields;

    let timestamp: Timestamp = time.parse()?;
    let status: Status = status.parse()?;

    Ok(Some(WorkerEvent {
        kind: Kind::from_tag(tag),
        series,
        timestamp,
        worker_id,
        status,
        send_timestamp: integer("send_timestamp", send)?,
        end_send_timestamp: integer("end_send_timestamp", end_send)?,
        details: Details {
            trace_depth,
            risky_attribute_depth,
            extra_attributes,
            span_length,
            cool_down,
            start,
            receive,
            send_receive_delta,
        },
    }))
}
