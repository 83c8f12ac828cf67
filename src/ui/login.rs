use crate::api::client::ApiClient;
use crate::api::models::UserId;
use crate::app::AppConfig;
use crate::error::CliError;
use crate::storage::Session;

/// Stores the identity used by the other commands. The server check is
/// informational; credentials are saved even when it is unreachable.
pub async fn login(
    config: &AppConfig,
    user_id: UserId,
    display_name: &str,
    token: Option<String>,
) -> Result<Session, CliError> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(CliError::Usage("display name cannot be empty".into()));
    }

    let client = ApiClient::new(config, token.clone())?;
    let status = match client.ping().await {
        Ok(code) if (200..300).contains(&code) => "Connected".to_string(),
        Ok(code) => format!("Saved (server answered HTTP {code})"),
        Err(e) => {
            log::warn!("server check failed: {e}");
            "Saved (server unreachable)".to_string()
        }
    };
    log::info!("server check for {}: {status}", config.base_url);

    let session = Session {
        user_id,
        display_name: display_name.to_string(),
        token,
    };
    session.save()?;
    println!("{status}. Signed in as {} (#{user_id}).", session.display_name);
    Ok(session)
}

pub fn logout() -> Result<(), CliError> {
    if Session::clear()? {
        println!("Signed out.");
    } else {
        println!("No saved session.");
    }
    Ok(())
}
