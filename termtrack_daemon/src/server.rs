//! Control socket
//!
//! Line-oriented: `show`/`list` dumps the terminal table, `count` prints the
//! number of tracked terminals, `quit` closes the session. Every other line
//! is a registry command (`clear`, `+MAC`, `-MAC`) and is answered with the
//! number of bytes the registry consumed, whether or not it parsed.
//!
//! Lines are raw bytes and at most `max_command_length` of them are kept;
//! the tail of a longer line is skipped without being buffered.

use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use termtrack_core::{control_write, render_listing, Registry};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::config::DaemonConfig;

/// What a session sends back for one line.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Close,
}

pub struct Server {
    listener: TcpListener,
    registry: Registry,
    max_command_length: usize,
}

impl Server {
    pub async fn bind(config: &DaemonConfig, registry: Registry) -> io::Result<Self> {
        let socket = config.control_socket();
        let listener = TcpListener::bind(&socket).await?;
        info!("Control socket bound to {}", socket);
        Ok(Self {
            listener,
            registry,
            max_command_length: config.max_command_length,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let registry = self.registry.clone();
                    let max_len = self.max_command_length;

                    // Spawn a task per session so accept loop doesn't block
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, addr, registry, max_len).await {
                            warn!("Session {} ended with error: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

/// Answer one request line. The line still carries its newline and need
/// not be UTF-8.
pub fn respond(registry: &Registry, line: &[u8], max_len: usize) -> Reply {
    let verb = std::str::from_utf8(line).map(str::trim).unwrap_or_default();
    match verb {
        "show" | "list" => Reply::Text(render_listing(registry)),
        "count" => Reply::Text(format!("{}\n", registry.len())),
        "quit" => Reply::Close,
        _ => {
            let consumed = control_write(registry, &line[..line.len().min(max_len)]);
            Reply::Text(format!("ok {consumed}\n"))
        }
    }
}

/// Consume input up to and including the next newline.
async fn skip_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<()> {
    loop {
        let (used, done) = {
            let buf = reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(());
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (buf.len(), false),
            }
        };
        reader.consume(used);
        if done {
            return Ok(());
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Registry,
    max_len: usize,
) -> io::Result<()> {
    info!("Session opened: {}", addr);
    let mut reader = BufReader::new(stream);
    let mut line = Vec::with_capacity(max_len + 1);

    loop {
        line.clear();
        let n = (&mut reader)
            .take(max_len as u64 + 1)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            break;
        }
        if line.last() != Some(&b'\n') && n > max_len {
            warn!("{} sent a line over {} bytes, truncating", addr, max_len);
            skip_line(&mut reader).await?;
        }
        debug!("{} -> {:?}", addr, String::from_utf8_lossy(&line).trim_end());

        match respond(&registry, &line, max_len) {
            Reply::Text(text) => {
                reader.get_mut().write_all(text.as_bytes()).await?;
                reader.get_mut().flush().await?;
            }
            Reply::Close => break,
        }
    }
    info!("Session closed: {}", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use termtrack_core::config::TrackerConfig;
    use termtrack_core::types::MacAddr;

    fn mac() -> MacAddr {
        "aa:bb:cc:dd:ee:ff".parse().unwrap()
    }

    #[tokio::test]
    async fn respond_dispatches_queries_and_commands() {
        let reg = Registry::new(TrackerConfig::default()).unwrap();
        reg.insert(mac(), Ipv4Addr::new(10, 0, 0, 5)).unwrap();

        assert_eq!(respond(&reg, b"count\n", 128), Reply::Text("1\n".into()));
        assert_eq!(respond(&reg, b"+aa:bb:cc:dd:ee:ff\n", 128), Reply::Text("ok 19\n".into()));
        assert!(reg.is_authenticated(&mac()));
        assert_eq!(respond(&reg, b"nonsense\n", 128), Reply::Text("ok 9\n".into()));
        assert_eq!(respond(&reg, b"quit\r\n", 128), Reply::Close);
        assert_eq!(respond(&reg, b"\xff\xfe junk\n", 128), Reply::Text("ok 8\n".into()));
        assert_eq!(respond(&reg, &[b'a'; 300], 128), Reply::Text("ok 128\n".into()));

        match respond(&reg, b"show\n", 128) {
            Reply::Text(t) => assert!(t.contains("aa:bb:cc:dd:ee:ff")),
            Reply::Close => panic!("show closed the session"),
        }
    }

    #[tokio::test]
    async fn session_over_tcp() {
        let reg = Registry::new(TrackerConfig::default()).unwrap();
        reg.insert(mac(), Ipv4Addr::new(10, 0, 0, 5)).unwrap();
        let config = DaemonConfig {
            bind_address: "127.0.0.1".into(),
            control_port: 0,
            max_command_length: 128,
            tracker: TrackerConfig::default(),
        };
        let server = Server::bind(&config, reg.clone()).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut client = BufReader::new(stream);
        let mut reply = String::new();

        client.get_mut().write_all(b"+aa:bb:cc:dd:ee:ff\n").await.unwrap();
        client.read_line(&mut reply).await.unwrap();
        assert_eq!(reply, "ok 19\n");
        assert!(reg.is_authenticated(&mac()));

        reply.clear();
        client.get_mut().write_all(b"clear\ncount\n").await.unwrap();
        client.read_line(&mut reply).await.unwrap();
        reply.clear();
        client.read_line(&mut reply).await.unwrap();
        assert_eq!(reply, "0\n");

        client.get_mut().write_all(b"quit\n").await.unwrap();
        reply.clear();
        assert_eq!(client.read_line(&mut reply).await.unwrap(), 0);
    }

    async fn session(reg: &Registry, max_len: usize) -> BufReader<TcpStream> {
        let config = DaemonConfig {
            bind_address: "127.0.0.1".into(),
            control_port: 0,
            max_command_length: max_len,
            tracker: TrackerConfig::default(),
        };
        let server = Server::bind(&config, reg.clone()).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        BufReader::new(TcpStream::connect(addr).await.unwrap())
    }

    #[tokio::test]
    async fn non_utf8_line_is_logged_not_fatal() {
        let reg = Registry::new(TrackerConfig::default()).unwrap();
        reg.insert(mac(), Ipv4Addr::new(10, 0, 0, 5)).unwrap();
        let mut client = session(&reg, 128).await;
        let mut reply = String::new();

        client.get_mut().write_all(b"\xff\xfe junk\ncount\n").await.unwrap();
        client.read_line(&mut reply).await.unwrap();
        assert_eq!(reply, "ok 8\n");
        reply.clear();
        client.read_line(&mut reply).await.unwrap();
        assert_eq!(reply, "1\n");
    }

    #[tokio::test]
    async fn overlong_line_is_cut_and_its_tail_skipped() {
        let reg = Registry::new(TrackerConfig::default()).unwrap();
        let mut client = session(&reg, 16).await;
        let mut reply = String::new();

        let mut long = vec![b'x'; 4096];
        long.extend_from_slice(b"\ncount\n");
        client.get_mut().write_all(&long).await.unwrap();
        client.read_line(&mut reply).await.unwrap();
        assert_eq!(reply, "ok 16\n");
        reply.clear();
        client.read_line(&mut reply).await.unwrap();
        assert_eq!(reply, "0\n");
    }
}
