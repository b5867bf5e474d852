use crate::router::{self, AppState};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use neurolens_core::ipc::{NeurolensRequest, NeurolensResponse};
use std::path::Path;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// 4-byte little-endian length prefix around a MessagePack payload.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder().little_endian().new_codec()
}

pub async fn run_unix_server(
    socket_path: &str,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("IPC Server listening on {}", socket_path);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                let state = state.clone();
                tokio::spawn(serve_connection(stream, state));
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}

async fn serve_connection(stream: UnixStream, state: Arc<AppState>) {
    let (read, write) = stream.into_split();
    let mut framed_read = FramedRead::new(read, frame_codec());
    let mut framed_write = FramedWrite::new(write, frame_codec());

    while let Some(frame) = framed_read.next().await {
        let bytes_mut = match frame {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("Frame error: {}", e);
                break;
            }
        };

        let response = match rmp_serde::from_slice::<NeurolensRequest>(&bytes_mut) {
            Ok(request) => router::handle_request(request, &state).await,
            Err(e) => NeurolensResponse::err(format!("Deserialization error: {}", e)),
        };

        match rmp_serde::to_vec_named(&response) {
            Ok(resp_bytes) => {
                if let Err(e) = framed_write.send(Bytes::from(resp_bytes)).await {
                    tracing::error!("Failed to send response: {}", e);
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Failed to serialize response: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurolens_core::repository::InMemorySubjectRepository;
    use neurolens_core::{Capabilities, NeurolensConfig};
    use std::time::Duration;

    async fn roundtrip(
        write: &mut FramedWrite<tokio::net::unix::OwnedWriteHalf, LengthDelimitedCodec>,
        read: &mut FramedRead<tokio::net::unix::OwnedReadHalf, LengthDelimitedCodec>,
        payload: Vec<u8>,
    ) -> NeurolensResponse {
        write.send(Bytes::from(payload)).await.unwrap();
        let frame = read.next().await.unwrap().unwrap();
        rmp_serde::from_slice(&frame).unwrap()
    }

    // ===== TEST 1: ping and a malformed frame over the socket =====
    #[tokio::test]
    async fn test_unix_server_ping_and_bad_frame() {
        let socket = std::env::temp_dir().join(format!("neurolens-test-{}.sock", std::process::id()));
        let socket_path = socket.to_string_lossy().to_string();
        let state = Arc::new(AppState::new(
            NeurolensConfig::default(),
            Capabilities::default(),
            Arc::new(InMemorySubjectRepository::new()),
        ));
        let (tx, _rx) = broadcast::channel(1);
        let server = tokio::spawn({
            let path = socket_path.clone();
            let shutdown = tx.subscribe();
            async move { run_unix_server(&path, state, shutdown).await }
        });

        let mut stream = None;
        for _ in 0..50 {
            if let Ok(s) = UnixStream::connect(&socket_path).await {
                stream = Some(s);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let (read, write) = stream.expect("server did not bind").into_split();
        let mut framed_read = FramedRead::new(read, frame_codec());
        let mut framed_write = FramedWrite::new(write, frame_codec());

        let ping = rmp_serde::to_vec_named(&NeurolensRequest::Ping).unwrap();
        let resp = roundtrip(&mut framed_write, &mut framed_read, ping).await;
        assert!(resp.is_ok());
        assert_eq!(resp.data.unwrap()["pong"], true);

        let resp = roundtrip(&mut framed_write, &mut framed_read, vec![0xc1, 0x00]).await;
        assert!(!resp.is_ok());
        assert!(resp.error.unwrap().starts_with("Deserialization error"));

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert!(!socket.exists());
    }
}
