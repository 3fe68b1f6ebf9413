//! Minimal MQTT 3.1.1 broker for integration tests.
//!
//! Accepts any CONNECT with a successful CONNACK, counts connections, and
//! can push a QoS 0 PUBLISH to every client or drop every client on demand.
//! Client traffic after CONNECT is read and discarded.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

#[derive(Debug, Clone)]
enum BrokerCommand {
    Publish { topic: String, payload: Vec<u8> },
    DropClients,
}

pub struct MockBroker {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    commands: broadcast::Sender<BrokerCommand>,
    accept_task: tokio::task::JoinHandle<()>,
}

impl MockBroker {
    /// Start on an available local port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let (commands, _) = broadcast::channel(16);

        let accept_connections = connections.clone();
        let accept_commands = commands.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(
                    stream,
                    accept_connections.clone(),
                    accept_commands.subscribe(),
                ));
            }
        });

        Self {
            addr,
            connections,
            commands,
            accept_task,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of CONNECTs answered so far.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Send a QoS 0 PUBLISH to every connected client.
    pub fn publish(&self, topic: &str, payload: &str) {
        let _ = self.commands.send(BrokerCommand::Publish {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        });
    }

    /// Close every client socket without a DISCONNECT.
    pub fn drop_clients(&self) {
        let _ = self.commands.send(BrokerCommand::DropClients);
    }

    pub fn shutdown(self) {
        self.drop_clients();
        self.accept_task.abort();
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    connections: Arc<AtomicUsize>,
    mut commands: broadcast::Receiver<BrokerCommand>,
) {
    let mut buf = [0u8; 4096];

    // CONNECT
    match stream.read(&mut buf).await {
        Ok(n) if n > 0 => {}
        _ => return,
    }
    if stream.write_all(&CONNACK_ACCEPTED).await.is_err() {
        return;
    }
    connections.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            read = stream.read(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
            }
            command = commands.recv() => {
                match command {
                    Ok(BrokerCommand::Publish { topic, payload }) => {
                        let packet = encode_publish(&topic, &payload);
                        if stream.write_all(&packet).await.is_err() {
                            return;
                        }
                    }
                    Ok(BrokerCommand::DropClients) | Err(_) => return,
                }
            }
        }
    }
}

fn encode_publish(topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x30];
    encode_remaining_length(2 + topic.len() + payload.len(), &mut packet);
    packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(payload);
    packet
}

fn encode_remaining_length(mut len: usize, out: &mut Vec<u8>) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_length_encoding() {
        let mut out = Vec::new();
        encode_remaining_length(321, &mut out);
        assert_eq!(out, vec![0xC1, 0x02]);
    }
}
