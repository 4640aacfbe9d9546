use adcproto::error::ParseError;
use std::io;

/// Fatal socket-level failures. Everything in this class drops the
/// connection without emitting a protocol message.
#[derive(Debug, Eq, PartialEq)]
pub enum SocketError {
    /// A line exceeded the 1 KiB cap without a newline.
    Overflow,
    /// The peer closed the connection.
    Closed,
    Io(io::ErrorKind),
}

impl From<io::Error> for SocketError {
    fn from(io_error: io::Error) -> Self {
        SocketError::Io(io_error.kind())
    }
}

pub type SocketResult<T> = ::std::result::Result<T, SocketError>;

/// How handling one inbound line failed. Parse faults are not even valid ADC
/// and disconnect silently; protocol faults get `ISTA 200 <reason>` before
/// the disconnect.
#[derive(Debug, Eq, PartialEq)]
pub enum LineFault {
    Parse(ParseError),
    Protocol(String),
}

impl From<ParseError> for LineFault {
    fn from(err: ParseError) -> Self {
        LineFault::Parse(err)
    }
}

pub type LineResult = ::std::result::Result<(), LineFault>;

/// Shorthand for the protocol-fault arm.
#[inline]
pub fn protocol_fault<T: Into<String>>(msg: T) -> LineFault {
    LineFault::Protocol(msg.into())
}
