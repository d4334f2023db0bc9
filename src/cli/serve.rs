use crate::config::Settings;
use crate::error::Result;
use crate::ipc::listener::ToolListener;
use crate::scene::MemoryScene;

/// Serve the scene tool until Ctrl+C.
pub async fn run_serve(settings: &Settings, host: Option<&str>, port: Option<u16>) -> Result<()> {
    let mut config = settings.listener.clone();
    if let Some(host) = host {
        config.host = host.to_string();
    }
    if let Some(port) = port {
        config.port = port;
    }

    let listener = ToolListener::bind(&config.addr(), config.queue_capacity)
        .await?
        .with_max_line_bytes(config.max_line_bytes);
    let handle = listener.shutdown_handle();
    eprintln!("meshchat: scene tool listening on {}", listener.local_addr()?);
    eprintln!("Press Ctrl+C to stop.\n");

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.shutdown();
        }
    });

    listener.serve(MemoryScene::new()).await
}
