//! End-to-end tests for the edit service: translator, relay and listener
//! wired together over a real socket.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::TcpListener;

use meshchat::config::StorageConfig;
use meshchat::error::MeshchatError;
use meshchat::ipc::listener::{ShutdownHandle, ToolListener};
use meshchat::ipc::relay_client::RelayClient;
use meshchat::scene::{MemoryScene, ModelFormat, SceneBackend};
use meshchat::service::{EditService, ErrorBody, TOOL_NAME};
use meshchat::translate::{OfflineModel, Translator};

async fn start_tool() -> (SocketAddr, ShutdownHandle) {
    let listener = ToolListener::bind("127.0.0.1:0", 16).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = listener.shutdown_handle();
    tokio::spawn(async move {
        let _ = listener.serve(MemoryScene::new()).await;
    });
    (addr, handle)
}

fn storage(dir: &Path) -> StorageConfig {
    StorageConfig {
        output_dir: dir.to_path_buf(),
        ..StorageConfig::default()
    }
}

fn service(addr: SocketAddr, storage: StorageConfig) -> EditService {
    let relay = RelayClient::new(addr.to_string())
        .with_timeouts(Duration::from_secs(2), Duration::from_secs(5));
    EditService::new(relay, Translator::new(Arc::new(OfflineModel)), storage)
}

fn write_source(dir: &Path, task_id: &str) {
    std::fs::write(dir.join(format!("{task_id}.glb")), b"glTF\x02\x00\x00\x00").unwrap();
}

/// Uniform scale of the single object in an exported scene.
fn exported_scale(path: &Path) -> f64 {
    let mut scene = MemoryScene::new();
    assert_eq!(scene.import(path, ModelFormat::Glb).unwrap(), 1);
    scene.objects()[0].scale[0]
}

// ---------------------------------------------------------------------------
// Edit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn edit_loads_translates_and_exports() {
    let (addr, shutdown) = start_tool().await;
    let tmp = TempDir::new().unwrap();
    write_source(tmp.path(), "task");
    let svc = service(addr, storage(tmp.path()));

    let outcome = svc.edit("task", "2배로 키워줘").await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.model_url.as_deref(), Some("/static/models/task_edited.glb"));
    assert_eq!(outcome.tools_used.len(), 1);
    assert_eq!(outcome.tools_used[0].tool, TOOL_NAME);
    assert_eq!(outcome.tools_used[0].command, "scale_model");
    assert!(!outcome.message.is_empty());

    let edited = tmp.path().join("task_edited.glb");
    assert!(edited.exists());
    assert_eq!(exported_scale(&edited), 2.0);

    assert!(svc.sessions().is_model_loaded("task"));
    assert_eq!(svc.sessions().transcript("task").len(), 2);
    shutdown.shutdown();
}

#[tokio::test]
async fn missing_source_is_not_found() {
    let (addr, shutdown) = start_tool().await;
    let tmp = TempDir::new().unwrap();
    let svc = service(addr, storage(tmp.path()));

    let err = svc.edit("ghost", "2배로 키워줘").await.unwrap_err();
    assert!(matches!(err, MeshchatError::ModelNotFound { .. }), "{err}");
    assert_eq!(err.status_code(), 404);
    assert!(svc.sessions().is_empty());
    shutdown.shutdown();
}

#[tokio::test]
async fn edits_accumulate_until_reset_reloads_source() {
    let (addr, shutdown) = start_tool().await;
    let tmp = TempDir::new().unwrap();
    write_source(tmp.path(), "task");
    let svc = service(addr, storage(tmp.path()));
    let edited = tmp.path().join("task_edited.glb");

    svc.edit("task", "2배로 키워줘").await.unwrap();
    assert_eq!(exported_scale(&edited), 2.0);

    svc.edit("task", "2배로 키워줘").await.unwrap();
    assert_eq!(exported_scale(&edited), 4.0);
    assert_eq!(svc.sessions().transcript("task").len(), 4);

    let reset = svc.reset("task");
    assert_eq!(reset.task_id, "task");
    assert!(!svc.sessions().is_model_loaded("task"));

    svc.edit("task", "2배로 키워줘").await.unwrap();
    assert_eq!(exported_scale(&edited), 2.0);
    assert_eq!(svc.sessions().transcript("task").len(), 2);
    shutdown.shutdown();
}

#[tokio::test]
async fn switching_tasks_reloads_each_tasks_own_model() {
    let (addr, shutdown) = start_tool().await;
    let tmp = TempDir::new().unwrap();
    write_source(tmp.path(), "alpha");
    write_source(tmp.path(), "beta");
    let svc = service(addr, storage(tmp.path()));

    svc.edit("alpha", "2배로 키워줘").await.unwrap();
    svc.edit("beta", "2배로 키워줘").await.unwrap();
    assert!(svc.sessions().is_model_loaded("beta"));
    assert!(!svc.sessions().is_model_loaded("alpha"));

    svc.edit("alpha", "2배로 키워줘").await.unwrap();
    assert!(svc.sessions().is_model_loaded("alpha"));
    assert!(!svc.sessions().is_model_loaded("beta"));

    let mut scene = MemoryScene::new();
    scene
        .import(&tmp.path().join("alpha_edited.glb"), ModelFormat::Glb)
        .unwrap();
    let names: Vec<&str> = scene.objects().iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, ["alpha"]);
    // Reloaded from source, so only the latest edit applies.
    assert_eq!(scene.objects()[0].scale[0], 2.0);

    // Transcripts survive the scene switch.
    assert_eq!(svc.sessions().transcript("alpha").len(), 4);
    assert_eq!(svc.sessions().transcript("beta").len(), 2);
    shutdown.shutdown();
}

#[tokio::test]
async fn failed_save_still_succeeds_with_warning() {
    let (addr, shutdown) = start_tool().await;
    let tmp = TempDir::new().unwrap();
    write_source(tmp.path(), "task");
    let svc = service(
        addr,
        StorageConfig {
            export_format: "USDZ".into(),
            ..storage(tmp.path())
        },
    );

    let outcome = svc.edit("task", "부드럽게 해줘").await.unwrap();
    assert!(outcome.success);
    assert!(outcome.model_url.is_none());
    assert!(outcome.message.contains("saving the edited model failed"));
    assert!(!tmp.path().join("task_edited.glb").exists());
    shutdown.shutdown();
}

#[tokio::test]
async fn rejected_load_is_load_failed() {
    let (addr, shutdown) = start_tool().await;
    let tmp = TempDir::new().unwrap();
    // Exists, but cannot be read as a file.
    std::fs::create_dir(tmp.path().join("task.glb")).unwrap();
    let svc = service(addr, storage(tmp.path()));

    let err = svc.edit("task", "2배로 키워줘").await.unwrap_err();
    assert!(matches!(err, MeshchatError::LoadFailed { .. }), "{err}");
    assert_eq!(err.status_code(), 500);
    assert!(!svc.sessions().is_model_loaded("task"));
    shutdown.shutdown();
}

#[tokio::test]
async fn unreachable_tool_is_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let tmp = TempDir::new().unwrap();
    write_source(tmp.path(), "task");
    let svc = service(addr, storage(tmp.path()));

    let err = svc.edit("task", "2배로 키워줘").await.unwrap_err();
    assert!(matches!(err, MeshchatError::Connection { .. }), "{err}");

    let body = ErrorBody::from(&err);
    assert!(!body.success);
    assert!(body.detail.contains(&addr.to_string()));
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_before_and_after_edit() {
    let (addr, shutdown) = start_tool().await;
    let tmp = TempDir::new().unwrap();
    write_source(tmp.path(), "task");
    let svc = service(addr, storage(tmp.path()));

    let err = svc.download("task").unwrap_err();
    assert!(matches!(err, MeshchatError::EditedModelNotFound { .. }), "{err}");
    assert_eq!(err.status_code(), 404);

    svc.edit("task", "45도 회전").await.unwrap();
    let path = svc.download("task").unwrap();
    assert_eq!(path, tmp.path().join("task_edited.glb"));
    shutdown.shutdown();
}
