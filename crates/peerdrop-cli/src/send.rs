use std::path::PathBuf;

use anyhow::{anyhow, Context};
use peerdrop_relay::HttpRelayClient;
use peerdrop_session::{
    FlowControl, OutgoingFile, SenderSession, SessionConfig, SessionEvent, WebRtcTransport,
};
use tracing::{debug, info};

use crate::config::ClientConfig;

pub async fn run(config: &ClientConfig, paths: &[PathBuf], flow: FlowControl) -> anyhow::Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = OutgoingFile::from_path(path)
            .await
            .with_context(|| format!("cannot send {}", path.display()))?;
        files.push(file);
    }

    let relay = HttpRelayClient::new(config.relay_url.clone())?;
    let transport = WebRtcTransport::new(&config.webrtc()).await?;
    let session_config = SessionConfig {
        chunk_size: config.chunk_size,
        flow_control: flow,
        ..Default::default()
    };

    let (session, mut handle) = SenderSession::new(relay, transport, session_config);
    for file in files {
        handle.queue(file);
    }
    handle.close_queue();
    let task = tokio::spawn(session.run());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(SessionEvent::RoomAllocated(room)) => {
                    println!("Room: {room}");
                    println!("On the other side run: peerdrop receive {room}");
                }
                Some(SessionEvent::Connected) => info!("Receiver connected"),
                Some(SessionEvent::FileStarted { index, meta }) => {
                    info!(index, name = %meta.name, size = meta.size, "Sending");
                }
                Some(SessionEvent::Progress { index, bytes, total }) => {
                    debug!(index, bytes, total, "Progress");
                }
                Some(SessionEvent::FileSent { meta, .. }) => println!("Sent {}", meta.name),
                Some(SessionEvent::FileReceived { .. }) => {}
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
