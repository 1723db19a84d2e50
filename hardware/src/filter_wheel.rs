//! Client for the filter wheel daemon.
//!
//! The wheel is driven by a small TCP service speaking a line protocol: one
//! ASCII command per connection, one `STATUS[,PAYLOAD]\n` reply, then the
//! connection closes. Commands are `home`, `move <n>`, and `get`; replies
//! start with `OK` or `ERR`.
//!
//! Each call opens a fresh connection, so the client holds no socket state
//! and is cheap to clone.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Port the filter wheel daemon listens on by default.
pub const DEFAULT_PORT: u16 = 5503;

/// Homing takes on the order of ten seconds, so the socket timeout has to be
/// well clear of that.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Filter names and their wheel positions. Position 0 is the home stop and
/// carries no filter.
pub const FILTER_POSITIONS: [(&str, u8); 5] =
    [("Ha", 1), ("B", 2), ("V", 3), ("g", 4), ("r", 5)];

/// Wheel position for a filter name, if the name is known.
pub fn position_for_name(name: &str) -> Option<u8> {
    FILTER_POSITIONS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|&(_, p)| p)
}

/// Filter name mounted at a wheel position. Home (0) has none.
pub fn name_for_position(position: u8) -> Option<&'static str> {
    FILTER_POSITIONS
        .iter()
        .find(|(_, p)| *p == position)
        .map(|&(n, _)| n)
}

#[derive(Error, Debug)]
pub enum FilterWheelError {
    #[error("filter wheel i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not connect to filter wheel at {0}")]
    ConnectionFailed(String),

    #[error("filter wheel did not reply within the timeout")]
    Timeout,

    #[error("filter wheel closed the connection without replying")]
    ConnectionClosed,

    #[error("malformed filter wheel reply: {0:?}")]
    MalformedReply(String),

    /// The daemon replied `ERR` with a diagnostic.
    #[error("filter wheel refused command: {0}")]
    Device(String),

    #[error("filter wheel reported an unparseable position: {0:?}")]
    InvalidPosition(String),
}

pub type FilterWheelResult<T> = Result<T, FilterWheelError>;

/// One-shot command client for the filter wheel daemon.
#[derive(Debug, Clone)]
pub struct FilterWheelClient {
    addr: String,
    timeout: Duration,
}

impl FilterWheelClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    /// Send one command and return the reply payload.
    ///
    /// `OK,<payload>` resolves to the payload (possibly empty); `ERR,<msg>`
    /// becomes [`FilterWheelError::Device`].
    fn send(&self, command: &str) -> FilterWheelResult<String> {
        debug!(addr = %self.addr, command, "filter wheel command");

        let mut stream = TcpStream::connect(&self.addr)
            .map_err(|_| FilterWheelError::ConnectionFailed(self.addr.clone()))?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        stream.write_all(command.as_bytes())?;
        stream.write_all(b"\n")?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        let read = reader.read_line(&mut line).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                FilterWheelError::Timeout
            }
            _ => FilterWheelError::Io(e),
        })?;
        if read == 0 {
            return Err(FilterWheelError::ConnectionClosed);
        }

        Self::parse_reply(&line)
    }

    fn parse_reply(line: &str) -> FilterWheelResult<String> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (status, payload) = match line.split_once(',') {
            Some((status, payload)) => (status, payload),
            None => (line, ""),
        };
        match status {
            "OK" => Ok(payload.to_string()),
            "ERR" => Err(FilterWheelError::Device(payload.to_string())),
            _ => Err(FilterWheelError::MalformedReply(line.to_string())),
        }
    }

    /// Drive the wheel to its home stop (position 0).
    pub fn home(&self) -> FilterWheelResult<()> {
        self.send("home").map(|_| ())
    }

    /// Move the wheel to an absolute position.
    pub fn move_to(&self, position: u8) -> FilterWheelResult<()> {
        self.send(&format!("move {position}")).map(|_| ())
    }

    /// Current wheel position.
    pub fn get_position(&self) -> FilterWheelResult<u8> {
        let payload = self.send("get")?;
        payload
            .trim()
            .parse()
            .map_err(|_| FilterWheelError::InvalidPosition(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    /// One-connection fake daemon: reads a line, replies per `respond`.
    fn serve_once<F>(respond: F) -> String
    where
        F: FnOnce(&str) -> Option<String> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if let Some(reply) = respond(line.trim_end()) {
                let mut stream = stream;
                stream.write_all(reply.as_bytes()).unwrap();
            }
        });
        addr
    }

    #[test]
    fn test_move_ok() {
        let addr = serve_once(|cmd| {
            assert_eq!(cmd, "move 3");
            Some("OK,\n".to_string())
        });
        let client = FilterWheelClient::new(addr);
        client.move_to(3).unwrap();
    }

    #[test]
    fn test_move_out_of_range_is_device_error() {
        let addr = serve_once(|_| Some("ERR,invalid position\n".to_string()));
        let client = FilterWheelClient::new(addr);
        match client.move_to(9) {
            Err(FilterWheelError::Device(msg)) => assert_eq!(msg, "invalid position"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_get_parses_position() {
        let addr = serve_once(|cmd| {
            assert_eq!(cmd, "get");
            Some("OK,4\n".to_string())
        });
        let client = FilterWheelClient::new(addr);
        assert_eq!(client.get_position().unwrap(), 4);
    }

    #[test]
    fn test_dropped_connection() {
        let addr = serve_once(|_| None);
        let client = FilterWheelClient::new(addr);
        assert!(matches!(
            client.get_position(),
            Err(FilterWheelError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_malformed_reply() {
        let addr = serve_once(|_| Some("WAT,5\n".to_string()));
        let client = FilterWheelClient::new(addr);
        assert!(matches!(
            client.get_position(),
            Err(FilterWheelError::MalformedReply(_))
        ));
    }

    #[test]
    fn test_connect_failure_names_address() {
        // Reserved-but-closed port: bind then drop.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let client = FilterWheelClient::new(addr.clone());
        match client.home() {
            Err(FilterWheelError::ConnectionFailed(a)) => assert_eq!(a, addr),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_filter_name_map() {
        assert_eq!(position_for_name("Ha"), Some(1));
        assert_eq!(position_for_name("r"), Some(5));
        assert_eq!(position_for_name("X"), None);
        assert_eq!(name_for_position(3), Some("V"));
        assert_eq!(name_for_position(0), None);
    }
}
