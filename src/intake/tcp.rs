// TCP line intake
// Accepts connections from log tailers; each connection streams newline
// separated telemetry lines

use std::io;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{read_lines, RawLine};

/// TCP server that forwards every received line to the pipeline channel
pub struct TcpIntake {
    addr: SocketAddr,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl TcpIntake {
    /// Bind to `addr` and start accepting connections
    pub async fn start(addr: SocketAddr, tx: mpsc::Sender<RawLine>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let actual_addr = listener.local_addr()?;

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                info!("Telemetry source connected: {}", peer_addr);
                                let tx = tx.clone();
                                tokio::spawn(async move {
                                    match read_lines(stream, tx, false).await {
                                        Ok(n) => info!("Telemetry source {} closed after {} lines", peer_addr, n),
                                        Err(e) => error!("Telemetry source {} read error: {}", peer_addr, e),
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("TCP intake shutting down");
                        break;
                    }
                }
            }
        });

        info!("TCP intake listening on {}", actual_addr);

        Ok(TcpIntake {
            addr: actual_addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Get the address the intake is listening on
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting new connections
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_tcp_intake_forwards_lines() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut intake = TcpIntake::start("127.0.0.1:0".parse().unwrap(), tx).await.unwrap();

        let mut stream = TcpStream::connect(intake.addr()).await.unwrap();
        stream.write_all(b"RadioLatency: 44 ms\n").await.unwrap();
        stream.flush().await.unwrap();

        let line = rx.recv().await.unwrap();
        assert_eq!(line.text, "RadioLatency: 44 ms");
        assert!(line.received_at_ms.is_some());

        intake.shutdown().await;
    }
}
