//! Framed send and receive over a byte stream.
//!
//! Streams are non-blocking. `WouldBlock` and `Interrupted` are transient:
//! the operation yields the thread and retries from where it stopped, so a
//! frame is always written and read whole. Every other I/O error is fatal.
//! A retry loop checks the [`AbortFlag`] before each yield.

use std::{
    io::{self, Read, Write},
    thread,
};

use bytes::BytesMut;
use lamport_proto::{FrameHeader, Message};

use crate::{abort::AbortFlag, error::ChannelError};

/// Outcome of a non-blocking receive attempt.
#[derive(Debug)]
pub enum Poll {
    /// A complete frame.
    Ready(Message),
    /// No data yet.
    Idle,
    /// Peer closed the stream between frames.
    Closed,
}

/// Write `message` as one frame.
pub fn send(
    stream: &mut impl Write,
    message: &Message,
    abort: &AbortFlag,
) -> Result<(), ChannelError> {
    let mut buf = BytesMut::with_capacity(message.encoded_len());
    message.encode(&mut buf);
    write_all(stream, &buf, abort)
}

/// Write all of `bytes`, retrying partial and would-block writes.
pub fn write_all(
    stream: &mut impl Write,
    mut bytes: &[u8],
    abort: &AbortFlag,
) -> Result<(), ChannelError> {
    while !bytes.is_empty() {
        match stream.write(bytes) {
            Ok(0) => {
                return Err(ChannelError::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "channel accepted no bytes",
                )));
            },
            Ok(n) => bytes = &bytes[n..],
            Err(e) if is_transient(&e) => yield_or_abort(abort)?,
            Err(e) => return Err(ChannelError::Io(e)),
        }
    }
    Ok(())
}

/// Read one frame, waiting for it if necessary. End-of-stream is an error.
pub fn receive(stream: &mut impl Read, abort: &AbortFlag) -> Result<Message, ChannelError> {
    let mut header = [0u8; FrameHeader::SIZE];
    read_exact(stream, &mut header, abort)?;
    read_body(stream, &header, abort)
}

/// Read one frame if its first byte is already available.
///
/// Once a frame has started arriving it is read to the end, retrying like
/// [`receive`]. End-of-stream before the first byte is reported as
/// [`Poll::Closed`]; anywhere later it is an error.
pub fn try_receive(stream: &mut impl Read, abort: &AbortFlag) -> Result<Poll, ChannelError> {
    let mut header = [0u8; FrameHeader::SIZE];
    loop {
        match stream.read(&mut header) {
            Ok(0) => return Ok(Poll::Closed),
            Ok(n) => {
                read_exact(stream, &mut header[n..], abort).map_err(|e| match e {
                    ChannelError::UnexpectedEof { got, .. } => ChannelError::UnexpectedEof {
                        expected: FrameHeader::SIZE,
                        got: n + got,
                    },
                    other => other,
                })?;
                return read_body(stream, &header, abort).map(Poll::Ready);
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Poll::Idle),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
            Err(e) => return Err(ChannelError::Io(e)),
        }
    }
}

/// Yield the thread, or fail if the run is aborting.
pub fn yield_or_abort(abort: &AbortFlag) -> Result<(), ChannelError> {
    if abort.is_raised() {
        return Err(ChannelError::Aborted);
    }
    thread::yield_now();
    Ok(())
}

fn read_body(
    stream: &mut impl Read,
    header: &[u8],
    abort: &AbortFlag,
) -> Result<Message, ChannelError> {
    let header = *FrameHeader::from_bytes(header)?;
    let mut payload = vec![0u8; header.payload_size()];
    read_exact(stream, &mut payload, abort)?;
    Ok(Message::from_parts(header, payload)?)
}

fn read_exact(
    stream: &mut impl Read,
    buf: &mut [u8],
    abort: &AbortFlag,
) -> Result<(), ChannelError> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(ChannelError::UnexpectedEof { expected: buf.len(), got: filled });
            },
            Ok(n) => filled += n,
            Err(e) if is_transient(&e) => yield_or_abort(abort)?,
            Err(e) => return Err(ChannelError::Io(e)),
        }
    }
    Ok(())
}

fn is_transient(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use lamport_proto::{Payload, ProtocolError, TransferOrder};
    use proptest::prelude::*;

    use super::*;

    /// Scripted stream: every read or write consumes one step.
    #[derive(Default)]
    struct ChokedStream {
        reads: VecDeque<Step>,
        written: Vec<u8>,
        write_limit: usize,
        write_blocks: usize,
    }

    enum Step {
        Data(Vec<u8>),
        WouldBlock,
        Interrupted,
        Eof,
    }

    impl Read for ChokedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Step::Data(mut data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.reads.push_front(Step::Data(data.split_off(n)));
                    }
                    Ok(n)
                },
                Some(Step::WouldBlock) => Err(io::ErrorKind::WouldBlock.into()),
                Some(Step::Interrupted) => Err(io::ErrorKind::Interrupted.into()),
                Some(Step::Eof) | None => Ok(0),
            }
        }
    }

    impl Write for ChokedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.write_blocks > 0 {
                self.write_blocks -= 1;
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.write_limit.max(1));
            self.written.extend_from_slice(&buf[..n]);
            self.write_blocks = 1;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn transfer() -> Message {
        Message::new(&Payload::Transfer(TransferOrder { src: 1, dst: 2, amount: 5 }), 7).unwrap()
    }

    fn chunks(bytes: &[u8], size: usize) -> VecDeque<Step> {
        bytes
            .chunks(size)
            .flat_map(|chunk| [Step::Data(chunk.to_vec()), Step::WouldBlock, Step::Interrupted])
            .collect()
    }

    #[test]
    fn send_survives_short_and_blocked_writes() {
        let abort = AbortFlag::new();
        let mut stream = ChokedStream { write_limit: 2, write_blocks: 1, ..Default::default() };

        send(&mut stream, &transfer(), &abort).unwrap();

        assert_eq!(stream.written, transfer().to_bytes().to_vec());
    }

    #[test]
    fn receive_reassembles_fragments() {
        let abort = AbortFlag::new();
        let bytes = transfer().to_bytes();
        let mut stream = ChokedStream { reads: chunks(&bytes, 3), ..Default::default() };

        assert_eq!(receive(&mut stream, &abort).unwrap(), transfer());
    }

    #[test]
    fn receive_treats_eof_as_error() {
        let abort = AbortFlag::new();
        let bytes = transfer().to_bytes();
        let mut reads = VecDeque::new();
        reads.push_back(Step::Data(bytes[..12].to_vec()));
        reads.push_back(Step::Eof);
        let mut stream = ChokedStream { reads, ..Default::default() };

        assert!(matches!(
            receive(&mut stream, &abort),
            Err(ChannelError::UnexpectedEof { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn receive_rejects_bad_magic() {
        let abort = AbortFlag::new();
        let mut bytes = transfer().to_bytes().to_vec();
        bytes[0] ^= 0xFF;
        let mut stream = ChokedStream { reads: chunks(&bytes, 64), ..Default::default() };

        assert!(matches!(
            receive(&mut stream, &abort),
            Err(ChannelError::Protocol(ProtocolError::InvalidMagic { .. }))
        ));
    }

    #[test]
    fn try_receive_reports_idle_and_closed() {
        let abort = AbortFlag::new();
        let mut reads = VecDeque::new();
        reads.push_back(Step::WouldBlock);
        reads.push_back(Step::Eof);
        let mut stream = ChokedStream { reads, ..Default::default() };

        assert!(matches!(try_receive(&mut stream, &abort).unwrap(), Poll::Idle));
        assert!(matches!(try_receive(&mut stream, &abort).unwrap(), Poll::Closed));
    }

    #[test]
    fn try_receive_finishes_a_started_frame() {
        let abort = AbortFlag::new();
        let bytes = transfer().to_bytes();
        let mut stream = ChokedStream { reads: chunks(&bytes, 1), ..Default::default() };

        let Poll::Ready(message) = try_receive(&mut stream, &abort).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(message, transfer());
    }

    #[test]
    fn try_receive_eof_inside_header_is_an_error() {
        let abort = AbortFlag::new();
        let bytes = transfer().to_bytes();
        let mut reads = VecDeque::new();
        reads.push_back(Step::Data(bytes[..4].to_vec()));
        reads.push_back(Step::Eof);
        let mut stream = ChokedStream { reads, ..Default::default() };

        assert!(matches!(
            try_receive(&mut stream, &abort),
            Err(ChannelError::UnexpectedEof { expected: 9, got: 4 })
        ));
    }

    #[test]
    fn abort_stops_spinning() {
        let abort = AbortFlag::new();
        abort.raise();
        let mut reads = VecDeque::new();
        reads.push_back(Step::WouldBlock);
        let mut stream = ChokedStream { reads, ..Default::default() };

        assert!(matches!(receive(&mut stream, &abort), Err(ChannelError::Aborted)));
    }

    #[test]
    fn fatal_io_error_propagates() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let abort = AbortFlag::new();
        assert!(matches!(
            send(&mut Broken, &transfer(), &abort),
            Err(ChannelError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe
        ));
    }

    proptest! {
        #[test]
        fn any_fragmentation_yields_the_same_frames(
            text in "[ -~]{0,64}",
            timestamp in 0i16..i16::MAX,
            size in 1usize..=20,
        ) {
            let abort = AbortFlag::new();
            let first = Message::new(&Payload::Started(text), timestamp).unwrap();
            let mut bytes = first.to_bytes().to_vec();
            bytes.extend_from_slice(&transfer().to_bytes());
            let mut stream = ChokedStream { reads: chunks(&bytes, size), ..Default::default() };

            prop_assert_eq!(receive(&mut stream, &abort).unwrap(), first);
            prop_assert_eq!(receive(&mut stream, &abort).unwrap(), transfer());
        }
    }
}
