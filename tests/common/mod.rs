//! TCP instrument double shared by the integration tests.
//!
//! `FakeInstrument` listens on an ephemeral localhost port, records every
//! newline-terminated line it receives and answers through a responder
//! closure. It accepts any number of connections, one handler task each.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// What the fake does after receiving a line.
pub enum Reply {
    /// Nothing.
    Silent,
    /// Write each chunk, pausing briefly between them.
    Chunks(Vec<Vec<u8>>),
    /// Write the chunks, then close the connection.
    ChunksThenClose(Vec<Vec<u8>>),
}

impl Reply {
    /// Single text reply.
    pub fn text(text: &str) -> Self {
        Reply::Chunks(vec![text.as_bytes().to_vec()])
    }
}

type Responder = Arc<dyn Fn(&str) -> Reply + Send + Sync>;

/// Scripted SCPI server on 127.0.0.1.
pub struct FakeInstrument {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl FakeInstrument {
    /// Start serving with `responder`.
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let responder: Responder = Arc::new(responder);

        let (rx, acc, cl) = (received.clone(), accepted.clone(), closed.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                acc.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, responder.clone(), rx.clone(), cl.clone()));
            }
        });

        Self {
            addr,
            received,
            accepted,
            closed,
        }
    }

    /// Fake that answers `*IDN?` with `idn` and ignores everything else.
    pub async fn identifying(idn: &'static str) -> Self {
        Self::start(move |line| {
            if line == "*IDN?" {
                Reply::text(&format!("{}\n", idn))
            } else {
                Reply::Silent
            }
        })
        .await
    }

    /// `host:port` to hand to the console.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Lines received so far, terminators stripped.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` client connections have ended.
    pub async fn wait_for_disconnects(&self, count: usize) -> bool {
        for _ in 0..200 {
            if self.closed.load(Ordering::SeqCst) >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

async fn serve(
    stream: TcpStream,
    responder: Responder,
    received: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
) {
    stream.set_nodelay(true).ok();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end().to_string();
        received.lock().unwrap().push(line.clone());

        let (chunks, close) = match responder(&line) {
            Reply::Silent => continue,
            Reply::Chunks(chunks) => (chunks, false),
            Reply::ChunksThenClose(chunks) => (chunks, true),
        };
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            if write_half.write_all(chunk).await.is_err() {
                break;
            }
            write_half.flush().await.ok();
        }
        if close {
            write_half.shutdown().await.ok();
            break;
        }
    }

    closed.fetch_add(1, Ordering::SeqCst);
}
