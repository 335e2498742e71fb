//! Routed standard-stream slots.
//!
//! Console sessions bind their connection as the destination for the stdin,
//! stdout, and stderr slots, so output produced on a session's thread lands
//! on its socket while every other thread keeps the process's real streams.
//! Each routed write is flushed immediately so line-oriented clients observe
//! it promptly, and write failures against a torn-down destination are
//! logged, never surfaced to the writer.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use tracing::debug;

use super::{ROUTER_TARGET, RouterSet};

/// The three routable standard-stream slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoSlot {
    /// Standard input.
    Stdin,
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl IoSlot {
    /// The slot's canonical name, used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdin => "stdin",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }

    /// The process's native endpoint for this slot.
    #[must_use]
    pub fn process_default(self) -> IoDestination {
        match self {
            Self::Stdin => Arc::new(ProcessStdin),
            Self::Stdout => Arc::new(ProcessStdout),
            Self::Stderr => Arc::new(ProcessStderr),
        }
    }
}

/// A destination endpoint for a routed stream.
///
/// Endpoints are shared handles; reads and writes take `&self` so a single
/// session connection can back all three slots at once.
pub trait ConsoleStream: Send + Sync {
    /// Writes the whole buffer to the endpoint.
    fn write_all(&self, buf: &[u8]) -> io::Result<()>;

    /// Flushes buffered output to the endpoint.
    fn flush(&self) -> io::Result<()>;

    /// Reads available bytes from the endpoint.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Shared handle to a [`ConsoleStream`] endpoint.
pub type IoDestination = Arc<dyn ConsoleStream>;

struct ProcessStdout;

impl ConsoleStream for ProcessStdout {
    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        io::stdout().lock().write_all(buf)
    }

    fn flush(&self) -> io::Result<()> {
        io::stdout().lock().flush()
    }

    fn read(&self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stdout is not readable",
        ))
    }
}

struct ProcessStderr;

impl ConsoleStream for ProcessStderr {
    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        io::stderr().lock().write_all(buf)
    }

    fn flush(&self) -> io::Result<()> {
        io::stderr().lock().flush()
    }

    fn read(&self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stderr is not readable",
        ))
    }
}

struct ProcessStdin;

impl ConsoleStream for ProcessStdin {
    fn write_all(&self, _buf: &[u8]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stdin is not writable",
        ))
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        io::stdin().lock().read(buf)
    }
}

/// Endpoint backed by a session's TCP connection.
pub(crate) struct SessionStream(Arc<TcpStream>);

impl SessionStream {
    pub(crate) fn new(stream: Arc<TcpStream>) -> Self {
        Self(stream)
    }

    /// The connection as a shared [`IoDestination`].
    pub(crate) fn destination(stream: &Arc<TcpStream>) -> IoDestination {
        Arc::new(Self::new(Arc::clone(stream)))
    }
}

impl ConsoleStream for SessionStream {
    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut socket: &TcpStream = &self.0;
        socket.write_all(buf)
    }

    fn flush(&self) -> io::Result<()> {
        let mut socket: &TcpStream = &self.0;
        socket.flush()
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut socket: &TcpStream = &self.0;
        socket.read(buf)
    }
}

/// How a routed handle finds its router set.
enum Binding {
    /// Resolve through the process-wide installation; fall back to the
    /// slot's native endpoint when the console is detached.
    Installed,
    /// Resolve through an explicit set (sessions hold their own).
    Set(Arc<RouterSet>),
}

impl Binding {
    fn destination(&self, slot: IoSlot) -> IoDestination {
        match self {
            Self::Installed => match super::installed() {
                Some(set) => set.io_slot(slot).resolve(),
                None => slot.process_default(),
            },
            Self::Set(set) => set.io_slot(slot).resolve(),
        }
    }
}

/// Writer that resolves its destination through a routed slot on every write.
///
/// Writes are flushed immediately. A failure writing to a torn-down
/// destination (e.g. a session whose peer already closed the socket) is
/// logged at debug level and swallowed; the caller always sees success.
pub struct RoutedWriter {
    slot: IoSlot,
    binding: Binding,
}

impl RoutedWriter {
    pub(crate) fn for_set(set: &Arc<RouterSet>, slot: IoSlot) -> Self {
        Self {
            slot,
            binding: Binding::Set(Arc::clone(set)),
        }
    }

    fn installed(slot: IoSlot) -> Self {
        Self {
            slot,
            binding: Binding::Installed,
        }
    }
}

impl Write for RoutedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let destination = self.binding.destination(self.slot);
        if let Err(error) = destination
            .write_all(buf)
            .and_then(|()| destination.flush())
        {
            debug!(
                target: ROUTER_TARGET,
                slot = self.slot.as_str(),
                error = %error,
                "dropping write to torn-down destination"
            );
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Every write already flushes.
        Ok(())
    }
}

/// Reader that resolves its destination through a routed slot on every read.
pub struct RoutedReader {
    slot: IoSlot,
    binding: Binding,
}

impl RoutedReader {
    pub(crate) fn for_set(set: &Arc<RouterSet>, slot: IoSlot) -> Self {
        Self {
            slot,
            binding: Binding::Set(Arc::clone(set)),
        }
    }

    fn installed(slot: IoSlot) -> Self {
        Self {
            slot,
            binding: Binding::Installed,
        }
    }

    /// Reads one newline-terminated line into `buf`, returning the number of
    /// bytes consumed. Zero means end of stream.
    ///
    /// Bytes are pulled one at a time so no read-ahead is lost if the slot's
    /// route changes between lines. Non-UTF-8 input is replaced lossily.
    pub fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        let destination = self.binding.destination(self.slot);
        let mut raw = Vec::new();
        let mut byte = [0_u8; 1];
        loop {
            let read = loop {
                match destination.read(&mut byte) {
                    Ok(n) => break n,
                    Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                    Err(error) => return Err(error),
                }
            };
            if read == 0 {
                break;
            }
            raw.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }
        buf.push_str(&String::from_utf8_lossy(&raw));
        Ok(raw.len())
    }
}

/// A session's line-oriented view of its routed stdin and stdout slots.
///
/// Writes are best-effort and never fail (torn-down destinations are logged
/// and dropped inside [`RoutedWriter`]); reads surface their errors so the
/// command loop can treat them as session termination.
pub struct SessionIo {
    reader: RoutedReader,
    out: RoutedWriter,
}

impl SessionIo {
    /// Builds the view over an explicit router set.
    pub(crate) fn for_set(set: &Arc<RouterSet>) -> Self {
        Self {
            reader: RoutedReader::for_set(set, IoSlot::Stdin),
            out: RoutedWriter::for_set(set, IoSlot::Stdout),
        }
    }

    /// Writes `text` as-is.
    pub fn write_str(&mut self, text: &str) {
        // RoutedWriter swallows destination faults, so this cannot fail.
        let _ = self.out.write_all(text.as_bytes());
    }

    /// Writes `text` followed by a newline.
    pub fn write_line(&mut self, text: &str) {
        self.write_str(text);
        self.write_str("\n");
    }

    /// Reads one line; zero bytes means the peer closed the stream.
    pub fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        self.reader.read_line(buf)
    }
}

/// Routed handle to the process's standard output slot.
#[must_use]
pub fn stdout() -> RoutedWriter {
    RoutedWriter::installed(IoSlot::Stdout)
}

/// Routed handle to the process's standard error slot.
#[must_use]
pub fn stderr() -> RoutedWriter {
    RoutedWriter::installed(IoSlot::Stderr)
}

/// Routed handle to the process's standard input slot.
#[must_use]
pub fn stdin() -> RoutedReader {
    RoutedReader::installed(IoSlot::Stdin)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// In-memory endpoint for routing tests.
    #[derive(Default)]
    pub(crate) struct MemoryStream {
        pub(crate) written: Mutex<Vec<u8>>,
        pub(crate) input: Mutex<Vec<u8>>,
    }

    impl MemoryStream {
        pub(crate) fn with_input(input: &[u8]) -> Arc<Self> {
            let stream = Self::default();
            stream
                .input
                .lock()
                .expect("lock test input")
                .extend_from_slice(input);
            Arc::new(stream)
        }

        pub(crate) fn written_string(&self) -> String {
            String::from_utf8_lossy(&self.written.lock().expect("lock test output")).into_owned()
        }
    }

    impl ConsoleStream for MemoryStream {
        fn write_all(&self, buf: &[u8]) -> io::Result<()> {
            self.written
                .lock()
                .expect("lock test output")
                .extend_from_slice(buf);
            Ok(())
        }

        fn flush(&self) -> io::Result<()> {
            Ok(())
        }

        fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
            let mut input = self.input.lock().expect("lock test input");
            let take = input.len().min(buf.len());
            for (slot, byte) in buf.iter_mut().zip(input.drain(..take)) {
                *slot = byte;
            }
            Ok(take)
        }
    }

    /// Endpoint whose writes always fail, for torn-down-session tests.
    pub(crate) struct BrokenStream;

    impl ConsoleStream for BrokenStream {
        fn write_all(&self, _buf: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"))
        }

        fn flush(&self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"))
        }

        fn read(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{BrokenStream, MemoryStream};
    use super::*;

    fn test_set() -> Arc<RouterSet> {
        Arc::new(RouterSet::with_process_defaults())
    }

    #[test]
    fn routed_writes_reach_the_registered_destination() {
        let set = test_set();
        let memory = MemoryStream::with_input(b"");
        set.io_slot(IoSlot::Stdout)
            .register(Arc::clone(&memory) as IoDestination);

        let mut writer = RoutedWriter::for_set(&set, IoSlot::Stdout);
        writer.write_all(b"hello\n").expect("routed write");
        assert_eq!(memory.written_string(), "hello\n");

        set.io_slot(IoSlot::Stdout).unregister();
    }

    #[test]
    fn write_failures_are_swallowed() {
        let set = test_set();
        set.io_slot(IoSlot::Stdout)
            .register(Arc::new(BrokenStream) as IoDestination);

        let mut writer = RoutedWriter::for_set(&set, IoSlot::Stdout);
        // A torn-down destination must be invisible to the writer.
        writer.write_all(b"lost\n").expect("swallowed write");

        set.io_slot(IoSlot::Stdout).unregister();
    }

    #[test]
    fn read_line_stops_at_newline() {
        let set = test_set();
        let memory = MemoryStream::with_input(b"first line\nsecond");
        set.io_slot(IoSlot::Stdin)
            .register(Arc::clone(&memory) as IoDestination);

        let mut reader = RoutedReader::for_set(&set, IoSlot::Stdin);
        let mut line = String::new();
        let read = reader.read_line(&mut line).expect("read first line");
        assert_eq!(read, 11);
        assert_eq!(line, "first line\n");

        line.clear();
        let read = reader.read_line(&mut line).expect("read trailing bytes");
        assert_eq!(read, 6);
        assert_eq!(line, "second");

        line.clear();
        assert_eq!(reader.read_line(&mut line).expect("read at eof"), 0);

        set.io_slot(IoSlot::Stdin).unregister();
    }
}
