use std::sync::Arc;

use crate::config::Settings;
use crate::error::Result;
use crate::translate::{OfflineModel, Translator};

/// Translate a single message and print the command as JSON.
pub async fn run_translate(settings: &Settings, message: &str, offline: bool) -> Result<()> {
    let translator = if offline {
        Translator::new(Arc::new(OfflineModel))
    } else {
        Translator::from_config(&settings.model)?
    };

    let mut transcript = Vec::new();
    let command = translator.translate(message, &mut transcript).await?;
    println!("{}", serde_json::to_string_pretty(&command)?);
    Ok(())
}
