//! Authentication commands.

use super::Context;
use crate::output;
use anyhow::{bail, Result};
use std::time::Duration;
use tracing::info;
use velour_auth::{ErrorKind, Phase};

/// Restore the session and show it.
pub async fn status(ctx: &Context) -> Result<()> {
    let state = ctx.manager.initialize().await;
    output::print_state(&state, &ctx.format);
    Ok(())
}

/// Sign in interactively unless a session already exists.
pub async fn login(ctx: &Context) -> Result<()> {
    let restored = ctx.manager.initialize().await;
    if restored.is_authenticated() {
        let who = restored
            .user()
            .and_then(|u| u.email.clone())
            .unwrap_or_else(|| "unknown".to_string());
        output::print_success(&format!("Already logged in as {}", who), &ctx.format);
        return Ok(());
    }

    let state = ctx.manager.login().await;
    if state.is_authenticated() {
        output::print_state(&state, &ctx.format);
        return Ok(());
    }

    match state.error() {
        None => {
            output::print_success("Login cancelled", &ctx.format);
            Ok(())
        }
        Some(error) => bail!("Login failed: {}", error),
    }
}

/// Sign out. Local credentials are removed even if the provider is unreachable.
pub async fn logout(ctx: &Context) -> Result<()> {
    let state = ctx.manager.logout().await;
    match state.error() {
        Some(error) if error.kind == ErrorKind::Persistence => {
            bail!("Signed out, but local credentials could not be removed: {}", error)
        }
        Some(error) => output::print_success(
            &format!("Logged out locally (provider sign-out failed: {})", error),
            &ctx.format,
        ),
        None => output::print_success("Logged out successfully", &ctx.format),
    }
    Ok(())
}

/// Print a usable access token.
pub async fn refresh(ctx: &Context, force: bool) -> Result<()> {
    ctx.manager.initialize().await;
    if ctx.manager.phase() != Phase::SignedIn {
        bail!("Not logged in. Run 'velour login' first");
    }

    let token = if force {
        ctx.manager.force_refresh().await
    } else {
        ctx.manager.refresh().await
    };

    match token {
        Some(token) => {
            match ctx.format {
                output::OutputFormat::Text => println!("{}", token),
                output::OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({
                        "access_token": token,
                        "expires_at": ctx.manager.snapshot().expires_at().map(|t| t.to_rfc3339()),
                    })
                ),
            }
            Ok(())
        }
        None => {
            let reason = ctx
                .manager
                .snapshot()
                .error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no token available".to_string());
            bail!("Token refresh failed: {}", reason)
        }
    }
}

/// Keep the token fresh in the background until Ctrl-C.
pub async fn watch(ctx: &Context, interval_secs: u64) -> Result<()> {
    let state = ctx.manager.initialize().await;
    output::print_state(&state, &ctx.format);
    if !state.is_authenticated() {
        bail!("Not logged in. Run 'velour login' first");
    }

    let interval = Duration::from_secs(interval_secs.max(1));
    info!(interval_secs = interval.as_secs(), "Watching session");
    let handle = ctx.manager.spawn_refresh_loop(interval);

    tokio::signal::ctrl_c().await?;
    handle.abort();

    info!("Stopped watching session");
    output::print_state(&ctx.manager.snapshot(), &ctx.format);
    Ok(())
}
