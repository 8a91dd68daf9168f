//! Deadline-bounded line stream
//!
//! [`LineStream`] turns a byte reader (normally the SUT's UART) into an
//! iterator of decoded text lines. Once the deadline passes the stream
//! yields nothing more, even if complete lines are already buffered.
//! An unterminated line is held back until the reader has been quiet for
//! the partial-line idle period, so a short stall mid-line does not split
//! it. Dropping the stream drops the reader, which closes the port.

use std::io::{self, ErrorKind, Read};
use std::time::{Duration, Instant};

/// Back-off when a reader reports end of data without a timeout
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Quiet time after which an unterminated line is emitted as-is
pub const DEFAULT_PARTIAL_IDLE: Duration = Duration::from_millis(500);

const CHUNK_SIZE: usize = 256;

pub struct LineStream<R: Read> {
    reader: R,
    label: String,
    started: Instant,
    deadline: Instant,
    pending: Vec<u8>,
    last_data: Instant,
    partial_idle: Duration,
    /// No more reads will be issued (hard read error)
    closed: bool,
    read_error: Option<io::Error>,
    expired: bool,
    lines_read: usize,
}

impl<R: Read> LineStream<R> {
    /// Wrap `reader`, producing lines until `timeout` from now
    pub fn new(reader: R, label: &str, timeout: Duration) -> Self {
        let started = Instant::now();
        Self::with_deadline(reader, label, started + timeout)
    }

    pub fn with_deadline(reader: R, label: &str, deadline: Instant) -> Self {
        let now = Instant::now();
        Self {
            reader,
            label: label.to_string(),
            started: now,
            deadline,
            pending: Vec::new(),
            last_data: now,
            partial_idle: DEFAULT_PARTIAL_IDLE,
            closed: false,
            read_error: None,
            expired: false,
            lines_read: 0,
        }
    }

    /// How long the reader must stay quiet before a partial line is emitted
    pub fn with_partial_idle(mut self, idle: Duration) -> Self {
        self.partial_idle = idle;
        self
    }

    /// Time since the stream was opened
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Number of lines yielded so far
    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    /// The read error that ended the stream, if any
    pub fn take_read_error(&mut self) -> Option<io::Error> {
        self.read_error.take()
    }

    /// Pop the next complete, non-empty line from the buffer
    fn take_line(&mut self) -> Option<String> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(line) = decode(&raw) {
                return Some(line);
            }
        }
        None
    }

    /// Flush the unterminated tail once the reader has gone quiet
    fn take_stalled_partial(&mut self) -> Option<String> {
        if self.last_data.elapsed() < self.partial_idle {
            return None;
        }
        self.take_partial()
    }

    fn take_partial(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        decode(&raw)
    }

    fn yielded(&mut self, line: String) -> Option<String> {
        self.lines_read += 1;
        log::trace!("[{}] {}", self.label, line);
        Some(line)
    }
}

impl<R: Read> Iterator for LineStream<R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if self.expired {
                return None;
            }
            if Instant::now() >= self.deadline {
                self.expired = true;
                log::debug!(
                    "{}: deadline reached after {} lines",
                    self.label,
                    self.lines_read
                );
                return None;
            }

            if let Some(line) = self.take_line() {
                return self.yielded(line);
            }
            if self.closed {
                return match self.take_partial() {
                    Some(line) => self.yielded(line),
                    None => None,
                };
            }

            let mut chunk = [0u8; CHUNK_SIZE];
            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    if let Some(line) = self.take_stalled_partial() {
                        return self.yielded(line);
                    }
                    std::thread::sleep(IDLE_POLL);
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    self.last_data = Instant::now();
                }
                Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    if let Some(line) = self.take_stalled_partial() {
                        return self.yielded(line);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    log::warn!("{}: read error, ending line stream: {}", self.label, e);
                    self.read_error = Some(e);
                    self.closed = true;
                }
            }
        }
    }
}

impl<R: Read> Drop for LineStream<R> {
    fn drop(&mut self) {
        log::debug!(
            "Releasing {} after {:.1}s ({} lines)",
            self.label,
            self.elapsed().as_secs_f64(),
            self.lines_read
        );
    }
}

/// Lossy UTF-8 decode with trailing whitespace (including `\r`) removed
fn decode(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_end();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;

    /// Reader that replays scripted chunks, then times out forever
    pub struct ScriptedReader {
        chunks: VecDeque<io::Result<Vec<u8>>>,
        dropped: Rc<Cell<bool>>,
    }

    impl ScriptedReader {
        pub fn new(chunks: Vec<&[u8]>) -> Self {
            Self {
                chunks: chunks.into_iter().map(|c| Ok(c.to_vec())).collect(),
                dropped: Rc::new(Cell::new(false)),
            }
        }

        pub fn from_text(text: &str) -> Self {
            Self::new(vec![text.as_bytes()])
        }

        pub fn then_error(mut self, kind: ErrorKind) -> Self {
            self.chunks.push_back(Err(io::Error::new(kind, "scripted")));
            self
        }

        pub fn then_chunk(mut self, chunk: &[u8]) -> Self {
            self.chunks.push_back(Ok(chunk.to_vec()));
            self
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.chunks.push_front(Ok(chunk[n..].to_vec()));
                    }
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => {
                    std::thread::sleep(Duration::from_millis(1));
                    Err(io::Error::new(ErrorKind::TimedOut, "no data"))
                }
            }
        }
    }

    impl Drop for ScriptedReader {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    /// Stream over `text` with a short deadline
    pub fn stream(text: &str) -> LineStream<ScriptedReader> {
        scripted(ScriptedReader::from_text(text))
    }

    /// Stream over `reader` with a short deadline and partial-line idle
    pub fn scripted(reader: ScriptedReader) -> LineStream<ScriptedReader> {
        LineStream::new(reader, "test", Duration::from_millis(50)).with_partial_idle(Duration::from_millis(10))
    }

    #[test]
    fn test_lines_across_chunks() {
        let reader = ScriptedReader::new(vec![b"LED tog", b"gled\r\nLED toggled\n", b"\n   \nready  \n"]);
        let lines: Vec<String> = LineStream::new(reader, "test", Duration::from_millis(50)).collect();
        assert_eq!(lines, vec!["LED toggled", "LED toggled", "ready"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let reader = ScriptedReader::new(vec![b"ab\xff\xfecd\n"]);
        let lines: Vec<String> = LineStream::new(reader, "test", Duration::from_millis(50)).collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ab"));
        assert!(lines[0].ends_with("cd"));
        assert!(lines[0].contains('\u{FFFD}'));
    }

    #[test]
    fn test_partial_line_flushed_on_timeout() {
        let lines: Vec<String> = stream("1 Tests 0 Failures 0 Ignored").collect();
        assert_eq!(lines, vec!["1 Tests 0 Failures 0 Ignored"]);
    }

    #[test]
    fn test_no_lines_after_deadline() {
        let reader = ScriptedReader::from_text("LED toggled\nLED toggled\n");
        let mut lines = LineStream::with_deadline(reader, "test", Instant::now());
        assert_eq!(lines.next(), None);
        assert_eq!(lines.next(), None);
        assert_eq!(lines.lines_read(), 0);
    }

    #[test]
    fn test_stream_ends_at_deadline_without_data() {
        let started = Instant::now();
        let lines: Vec<String> = stream("").collect();
        assert!(lines.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_hard_error_ends_stream() {
        let reader = ScriptedReader::new(vec![b"first\nsecond"]).then_error(ErrorKind::BrokenPipe);
        let mut lines = LineStream::new(reader, "test", Duration::from_secs(10));
        assert_eq!(lines.next().as_deref(), Some("first"));
        assert_eq!(lines.next().as_deref(), Some("second"));
        assert_eq!(lines.next(), None);

        let error = lines.take_read_error().unwrap();
        assert_eq!(error.kind(), ErrorKind::BrokenPipe);
        assert!(lines.take_read_error().is_none());
    }

    #[test]
    fn test_short_stall_does_not_split_line() {
        let reader = ScriptedReader::new(vec![b"===EN"])
            .then_error(ErrorKind::TimedOut)
            .then_error(ErrorKind::TimedOut)
            .then_chunk(b"D===\n");
        let mut lines = LineStream::new(reader, "test", Duration::from_secs(10));
        assert_eq!(lines.next().as_deref(), Some("===END==="));
        assert!(lines.take_read_error().is_none());
    }

    #[test]
    fn test_stalled_partial_is_flushed_after_idle() {
        let reader = ScriptedReader::new(vec![b"1 Tests 0 Failures 0 Ignored"]);
        let mut lines = LineStream::new(reader, "test", Duration::from_secs(10))
            .with_partial_idle(Duration::from_millis(20));
        let started = Instant::now();
        assert_eq!(lines.next().as_deref(), Some("1 Tests 0 Failures 0 Ignored"));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_reader_released_on_early_exit() {
        let reader = ScriptedReader::from_text("a\nb\nc\n");
        let dropped = Rc::clone(&reader.dropped);
        {
            let mut lines = LineStream::new(reader, "test", Duration::from_secs(10));
            assert_eq!(lines.next().as_deref(), Some("a"));
            assert!(!dropped.get());
        }
        assert!(dropped.get());
    }

    #[test]
    fn test_reader_released_on_panic() {
        let reader = ScriptedReader::from_text("a\n");
        let dropped = Rc::clone(&reader.dropped);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let mut lines = LineStream::new(reader, "test", Duration::from_secs(10));
            let _ = lines.next();
            panic!("consumer failed mid-read");
        }));
        assert!(result.is_err());
        assert!(dropped.get());
    }
}
