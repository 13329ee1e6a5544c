use std::net::SocketAddr;
use std::time::Duration;

use cbt_backend::{
    config::{get_config, init_config},
    routes::build_router,
    services::mail_service::mailer_from_config,
    AppState,
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config()?;
    init_tracing(config.log_json);

    let app_state = AppState::new(config.clone(), mailer_from_config(config));

    if let Some(path) = &config.seed_tests_file {
        let seeded = app_state.test_service.seed_from_file(path).await?;
        info!(path = %path, count = seeded, "seeded tests");
    }

    {
        let notif = app_state.notification_service.clone();
        tokio::spawn(async move {
            loop {
                match notif.run_once().await {
                    Ok(true) => {}
                    Ok(false) => {
                        tokio::time::sleep(Duration::from_millis(1000)).await;
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "Webhook worker error");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });
    }

    {
        let invitations = app_state.invitation_service.clone();
        tokio::spawn(async move {
            loop {
                invitations.expire_overdue(chrono::Utc::now()).await;
                tokio::time::sleep(EXPIRY_SWEEP_INTERVAL).await;
            }
        });
    }

    let app = build_router(app_state);

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
