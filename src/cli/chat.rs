use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Settings;
use crate::error::Result;
use crate::service::EditService;

/// Interactive edit loop on stdin.
pub async fn run_chat(settings: &Settings, task_id: &str) -> Result<()> {
    let service = EditService::from_settings(settings)?;
    eprintln!(
        "meshchat: editing {} via {}",
        service.source_path(task_id).display(),
        settings.relay.addr()
    );
    eprintln!("Type /reset to start over, /quit to exit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        match message {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                let outcome = service.reset(task_id);
                println!("{}", outcome.message);
                continue;
            }
            _ => {}
        }

        match service.edit(task_id, message).await {
            Ok(outcome) => {
                println!("{}", outcome.message);
                for tool in &outcome.tools_used {
                    println!(
                        "  {} {}",
                        tool.command,
                        serde_json::Value::Object(tool.params.clone())
                    );
                }
                if let Some(url) = &outcome.model_url {
                    println!("  model: {url}");
                }
            }
            Err(e) => eprintln!("error ({}): {e}", e.status_code()),
        }
    }

    Ok(())
}
