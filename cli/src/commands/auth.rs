use anyhow::{Result, bail};

use coach_core::Session;

use crate::config::Config;

pub(crate) fn cmd_login(config: &Config, token: &str) -> Result<()> {
    if token.trim().is_empty() {
        bail!("Token must not be empty");
    }
    config.save_token(token)?;
    println!("Token saved. Requests to {} will be authenticated.", config.api_url);
    Ok(())
}

/// Drop the token and every locally cached entry, including unsynced ones.
pub(crate) fn cmd_logout(config: &Config, session: Session, force: bool) -> Result<()> {
    let unsynced = session.pending_count();
    if unsynced > 0 && !force {
        bail!(
            "{unsynced} entries have not been synced and would be lost. Run `coach sync` first, or pass --force"
        );
    }
    session.sign_out()?;
    let had_token = config.delete_token()?;
    if had_token {
        println!("Signed out. Local data cleared.");
    } else {
        println!("Local data cleared.");
    }
    Ok(())
}
