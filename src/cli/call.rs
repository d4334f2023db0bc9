use serde_json::{Map, Value};

use crate::config::Settings;
use crate::error::{MeshchatError, Result};
use crate::ipc::relay_client::RelayClient;

/// Send one raw request to the scene tool and print the response.
pub async fn run_call(settings: &Settings, method: &str, params: Option<&str>) -> Result<()> {
    let params: Map<String, Value> = match params {
        Some(raw) => serde_json::from_str(raw).map_err(|e| MeshchatError::Protocol {
            reason: format!("--params must be a JSON object: {e}"),
        })?,
        None => Map::new(),
    };

    let mut relay = RelayClient::from_config(&settings.relay);
    let response = relay.call(method, params).await;
    relay.disconnect().await;

    println!("{}", serde_json::to_string_pretty(&response?)?);
    Ok(())
}
