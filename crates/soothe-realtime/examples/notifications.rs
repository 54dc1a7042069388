//! End-to-end wiring: session login, realtime channel, notification router.
//!
//! Run with `cargo run --example notifications -- <email> <password>`.

use std::sync::Arc;

use soothe_api::{ApiConfig, CredentialStore, ReqwestTransport, Session};
use soothe_realtime::{
    AppPhase, ConnectionActivator, NotificationKind, NotificationRouter, RealtimeChannel,
    RealtimeConfig, RealtimeMessage, TungsteniteConnector,
};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,soothe_api=debug,soothe_realtime=debug".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let email = args.next().ok_or("usage: notifications <email> <password>")?;
    let password = args.next().ok_or("usage: notifications <email> <password>")?;

    let api_config = ApiConfig::default();
    let credentials = CredentialStore::new();
    let transport = Arc::new(ReqwestTransport::new(&api_config));
    let session = Session::new(transport, credentials.clone(), &api_config);

    session.login(&email, &password).await?;

    let router = Arc::new(NotificationRouter::new());
    router.on(NotificationKind::NewOrder, |message| {
        if let RealtimeMessage::NewOrder(event) = message {
            println!(
                "new order {} ({})",
                event.order_id,
                event.service_name.as_deref().unwrap_or("unspecified service")
            );
        }
    });
    router.on(NotificationKind::SystemMessage, |message| {
        if let RealtimeMessage::SystemMessage(notice) = message {
            println!("system: {}", notice.title);
        }
    });

    let channel = Arc::new(RealtimeChannel::new(
        Arc::new(TungsteniteConnector),
        credentials.clone(),
        RealtimeConfig::default(),
        router,
    ));

    // A real app feeds this from platform lifecycle callbacks.
    let (phase_tx, phase_rx) = watch::channel(AppPhase::Foreground);
    let _activator = ConnectionActivator::spawn(channel.clone(), &credentials, phase_rx);

    println!("listening for notifications, ctrl-c to quit");
    tokio::signal::ctrl_c().await?;

    phase_tx.send(AppPhase::Background)?;
    session.logout().await;
    Ok(())
}
