use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use mariadb_operator::health::{HealthState, run_health_server};
use mariadb_operator::{Context, OperatorConfig};
use mariadb_operator::{WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, run_webhook_server};
use mariadb_operator::{run_controller_scoped, run_sql_job_controller_scoped};

const LEASE_NAME: &str = "mariadb-operator-leader";
const LEASE_TTL: Duration = Duration::from_secs(15);
const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Time given to in-flight passes after a shutdown signal
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

type BoxError = Box<dyn std::error::Error>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    install_crypto_provider()?;
    init_tracing()?;

    info!("Starting mariadb-operator");
    let config = OperatorConfig::from_env()?;
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let health_state = Arc::new(HealthState::new());

    // Probes and admission are served whether or not this replica leads
    let health_handle = {
        let health_state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("Health server error: {}", e);
            }
        })
    };
    let webhook_handle = spawn_webhook_server();

    let lease = lease_lock(&client, &config);
    acquire_leadership(&lease).await;
    let lease_renewal_handle = tokio::spawn(renew_leadership(lease));

    info!(
        namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        "Watching MariaDB and SqlJob resources"
    );
    let ctx = Arc::new(Context::new(client.clone(), &config, Some(health_state.clone())));
    health_state.set_ready(true).await;

    let mariadb_handle = {
        let client = client.clone();
        let ctx = ctx.clone();
        let namespace = config.watch_namespace.clone();
        tokio::spawn(async move {
            run_controller_scoped(client, ctx, namespace.as_deref()).await;
        })
    };
    let sql_job_handle = {
        let namespace = config.watch_namespace.clone();
        tokio::spawn(async move {
            run_sql_job_controller_scoped(client, ctx, namespace.as_deref()).await;
        })
    };

    let webhook_future = async {
        match webhook_handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!("Webhook server task panicked: {}", e);
                }
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = mariadb_handle => {
            if let Err(e) = result {
                error!("MariaDB controller task panicked: {}", e);
            }
        }
        result = sql_job_handle => {
            if let Err(e) = result {
                error!("SqlJob controller task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        _ = webhook_future => {}
        // Renewal only returns by panicking, losing the lease exits the process
        Err(e) = lease_renewal_handle => {
            error!("Lease renewal task panicked: {}", e);
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");
            health_state.set_ready(false).await;
            info!(
                "Waiting {:?} for in-flight reconciliations to complete...",
                SHUTDOWN_GRACE_PERIOD
            );
            tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
        }
    }

    info!("Operator stopped");
    Ok(())
}

/// Install the rustls crypto provider used by the kube client and webhooks
fn install_crypto_provider() -> Result<(), BoxError> {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        return Err("Failed to install rustls crypto provider and no provider is available".into());
    }
    Ok(())
}

fn init_tracing() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mariadb_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .init();
    Ok(())
}

/// Serve admission webhooks when a TLS key pair is mounted
fn spawn_webhook_server() -> Option<JoinHandle<()>> {
    if !(Path::new(WEBHOOK_CERT_PATH).exists() && Path::new(WEBHOOK_KEY_PATH).exists()) {
        info!(
            "TLS certificates not found at {} and {}, webhook server disabled",
            WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH
        );
        return None;
    }

    info!("TLS certificates found, starting webhook server");
    Some(tokio::spawn(async {
        if let Err(e) = run_webhook_server(WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH).await {
            error!("Webhook server error: {}", e);
        }
    }))
}

fn lease_lock(client: &Client, config: &OperatorConfig) -> LeaseLock {
    info!(
        holder_id = %config.pod_name,
        namespace = %config.pod_namespace,
        lease_name = LEASE_NAME,
        "Initializing leader election"
    );
    LeaseLock::new(
        client.clone(),
        &config.pod_namespace,
        LeaseLockParams {
            holder_id: config.pod_name.clone(),
            lease_name: LEASE_NAME.to_string(),
            lease_ttl: LEASE_TTL,
        },
    )
}

/// Block until this replica holds the lease
async fn acquire_leadership(lease: &LeaseLock) {
    info!("Waiting to acquire leadership...");
    loop {
        match lease.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {
                info!("Acquired leadership");
                return;
            }
            Ok(_) => info!("Another instance is leader, waiting..."),
            Err(e) => warn!("Failed to acquire lease: {}, retrying...", e),
        }
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
    }
}

/// Keep the lease, exiting the process when it is lost so Kubernetes
/// restarts this replica into a fresh election
async fn renew_leadership(lease: LeaseLock) {
    loop {
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
        match lease.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {}
            Ok(_) => {
                error!("Lost leadership! Shutting down...");
                std::process::exit(1);
            }
            Err(e) => {
                error!("Failed to renew lease: {}. Shutting down...", e);
                std::process::exit(1);
            }
        }
    }
}

/// Wait for SIGTERM or SIGINT
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
