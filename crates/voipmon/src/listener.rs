use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use crate::pipeline::CaptureIngress;

/// Largest datagram a capture agent can send over UDP
const MAX_DATAGRAM: usize = 65_535;

/// UDP listener feeding HEP datagrams into the pipeline
pub struct CaptureListener {
    socket: UdpSocket,
    ingress: CaptureIngress,
}

impl CaptureListener {
    pub async fn bind(addr: SocketAddr, ingress: CaptureIngress) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Capture listener bound to {}", socket.local_addr()?);
        Ok(Self { socket, ingress })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive until cancelled
    ///
    /// Undecodable datagrams are dropped; the decoder counts and logs them.
    pub async fn run(self, cancel: CancellationToken) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, agent)) => {
                        if let Err(e) = self.ingress.ingest_capture(&buf[..len]) {
                            trace!(%agent, "Capture datagram rejected: {}", e);
                        }
                    }
                    Err(e) => error!("Error receiving capture datagram: {}", e),
                },
                _ = cancel.cancelled() => break,
            }
        }
        info!("Capture listener stopped");
    }
}
