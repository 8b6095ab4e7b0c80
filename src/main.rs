//! Tutor Compass client bootstrap
//!
//! Reads the backend configuration, restores the persisted session and
//! prints where the app would land. An optional argument is treated as a
//! deep link and resolved the same way the app resolves incoming links.

use anyhow::Context;
use app_core::IdentityGateway;
use app_state::SessionContext;
use app_ui::navigation::{Navigator, Route, Router};
use app_ui::{DashboardShell, Destination};
use backend_client::{BackendAgent, BackendConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let config = BackendConfig::from_env().context("backend configuration")?;
    info!(service_url = %config.service_url, session_path = ?config.session_path, "starting");

    let refresh_threshold = config.refresh_threshold;
    let agent = BackendAgent::connect(config).await.context("opening session store")?;
    let context = Arc::new(SessionContext::new());
    let gateway = Arc::new(
        IdentityGateway::new(Arc::new(agent), Arc::clone(&context))
            .with_refresh_threshold(refresh_threshold),
    );
    gateway.subscribe_auth_changes();

    let restored = gateway.restore_session().await;
    if restored.is_some() {
        if let Err(e) = gateway.refresh_if_needed().await {
            tracing::warn!(error = %e, "token refresh at startup failed");
        }
    }
    let start = if restored.is_some() { Route::Dashboard } else { Route::Landing };
    let navigator = Arc::new(Mutex::new(Navigator::new(start)));

    if let Some(link) = std::env::args().nth(1) {
        navigator.lock().open_path(&Router::new(), &link);
    }

    let current = navigator.lock().current().clone();
    if current.requires_auth() {
        let shell = DashboardShell::new(Arc::clone(&gateway), Arc::clone(&navigator));
        match shell.render() {
            Destination::Dashboard(tabs) => {
                info!(role = %tabs.role, tabs = ?tabs.screens(), "dashboard ready");
            }
            Destination::Placeholder => {
                let snapshot = context.snapshot();
                info!(profile_error = ?snapshot.profile_error, "waiting for profile");
            }
            Destination::Redirect(route) => info!(to = %route.to_path(), "redirected"),
        }
    }

    let landed = navigator.lock().current().clone();
    println!("{}", serde_json::to_string_pretty(&landed)?);

    context.shutdown();
    Ok(())
}
