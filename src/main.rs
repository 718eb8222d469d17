use std::sync::Arc;

use mqtt_alert::alerts::AlertManager;
use mqtt_alert::alerts::store;
use mqtt_alert::config::AlertConfig;
use mqtt_alert::notify::{EmailConfig, EmailSink, NotificationSink};
use mqtt_alert::transport::{MqttConfig, MqttListener};

#[tokio::main]
async fn main() -> mqtt_alert::error::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AlertConfig::from_env();

    let mqtt_config = MqttConfig::from_env().unwrap_or_else(|| {
        eprintln!("Error: MQTT_HOST not set");
        eprintln!("  export MQTT_HOST=broker.local");
        std::process::exit(1);
    });

    eprintln!("📡 mqtt-alert v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Broker: {}:{}", mqtt_config.host, mqtt_config.port);
    eprintln!("   Topics: {}", mqtt_config.topics.join(", "));

    // Conditionally enable the email sink
    let sink: Option<Arc<dyn NotificationSink>> = match EmailConfig::from_env() {
        Some(email_config) => {
            eprintln!(
                "   Email: enabled (SMTP: {}:{}, from: {})",
                email_config.smtp_host, email_config.smtp_port, email_config.from_address
            );
            let sink: Arc<dyn NotificationSink> = Arc::new(EmailSink::new(email_config));
            Some(sink)
        }
        None => {
            eprintln!("   Email: disabled (EMAIL_SMTP_HOST not set) — alerts are logged only");
            None
        }
    };

    let mut manager = AlertManager::new(sink);
    manager.set_dispatch_timeout(config.dispatch_timeout);

    let rules_path = std::path::Path::new(&config.rules_path);
    if rules_path.exists() {
        let ids = store::load_rules(&mut manager, rules_path)?;
        eprintln!("   Rules: {} loaded from {}", ids.len(), config.rules_path);
    } else {
        eprintln!("   Rules: none ({} not found)", config.rules_path);
    }

    let (listener, mut messages) = MqttListener::start(mqtt_config).await?;

    while let Some(message) = messages.recv().await {
        tracing::info!(message = %message, "message received");
        let summary = manager.handle(&message).await;
        if !summary.is_empty() {
            tracing::info!(
                fired = summary.fired.len(),
                suppressed = summary.suppressed.len(),
                errors = summary.errors.len(),
                dispatch_failures = summary.dispatch_failures.len(),
                "evaluation pass complete"
            );
        }
    }

    listener.stop().await;
    Ok(())
}
