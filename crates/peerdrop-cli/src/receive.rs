use std::path::Path;

use anyhow::{anyhow, Context};
use peerdrop_relay::HttpRelayClient;
use peerdrop_session::{ReceiverSession, SessionConfig, SessionEvent, WebRtcTransport};
use peerdrop_shared::RoomId;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::output::save_received;

pub async fn run(
    config: &ClientConfig,
    room: &str,
    output_dir: &Path,
    expect: Option<usize>,
) -> anyhow::Result<()> {
    let room = RoomId::from_link(room)?;
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("cannot create {}", output_dir.display()))?;

    let relay = HttpRelayClient::new(config.relay_url.clone())?;
    let transport = WebRtcTransport::new(&config.webrtc()).await?;
    let session_config = SessionConfig {
        chunk_size: config.chunk_size,
        expected_files: expect,
        ..Default::default()
    };

    let (session, mut handle) = ReceiverSession::new(relay, transport, session_config, room);
    let task = tokio::spawn(session.run());
    println!("Joining room {room}");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(SessionEvent::Connected) => info!(room = %room, "Connected to sender"),
                Some(SessionEvent::FileStarted { index, meta }) => {
                    info!(index, name = %meta.name, size = meta.size, "Receiving");
                }
                Some(SessionEvent::Progress { index, bytes, total }) => {
                    debug!(index, bytes, total, "Progress");
                }
                Some(SessionEvent::FileReceived { file, .. }) => {
                    match save_received(output_dir, &file).await {
                        Ok(path) => println!("Saved {}", path.display()),
                        Err(e) => {
                            handle.cancel();
                            let _ = task.await;
                            return Err(e).context(format!("cannot save '{}'", file.meta.name));
                        }
                    }
                }
                Some(SessionEvent::RoomAllocated(_) | SessionEvent::FileSent { .. }) => {}
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                handle.cancel();
            }
        }
    }

    task.await?.map_err(|e| anyhow!("{}", e.reason()))
}
