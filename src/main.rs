use anyhow::Result;
use serde_json::json;
use std::collections::HashMap;
use tracing::{error, info, Level};

use vigil::{RequestSnapshot, SecurityMonitor};

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    print_banner();

    info!("Starting vigil security monitor...");
    let monitor = initialize_monitor()?;
    monitor.start();

    run_demo_traffic(&monitor).await;
    print_status(&monitor).await;

    info!("Monitor running. Press Ctrl+C to stop.");
    wait_for_shutdown_signal().await;

    info!("Shutting down...");
    monitor.stop();
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .init();
}

fn print_banner() {
    println!("\n{}", "=".repeat(60));
    println!("  VIGIL - Security Monitoring & Threat Detection");
    println!("  Request inspection, suspicion scoring and IP blocking");
    println!("{}\n", "=".repeat(60));
}

fn initialize_monitor() -> Result<SecurityMonitor> {
    SecurityMonitor::from_env().map_err(|e| {
        error!("Failed to initialize security monitor: {}", e);
        e
    })
}

/// Tráfico de muestra para ver el motor en acción al arrancar.
async fn run_demo_traffic(monitor: &SecurityMonitor) {
    info!("Replaying sample traffic through the inspector...");

    let samples = vec![
        (
            "benign search",
            RequestSnapshot {
                method: "GET".to_string(),
                url: "/search?q=running+shoes".to_string(),
                path: "/search".to_string(),
                query: json!({"q": "running shoes"}),
                source_ip: "203.0.113.80".to_string(),
                ..Default::default()
            },
        ),
        (
            "sql injection probe",
            RequestSnapshot {
                method: "GET".to_string(),
                url: "/products?id=1%27%20OR%20%271%27%3D%271".to_string(),
                path: "/products".to_string(),
                source_ip: "203.0.113.81".to_string(),
                ..Default::default()
            },
        ),
        (
            "xss with traversal",
            RequestSnapshot {
                method: "POST".to_string(),
                url: "/comments".to_string(),
                path: "/comments".to_string(),
                body: json!({
                    "text": "<script>document.cookie</script>",
                    "avatar": "../../../etc/passwd",
                }),
                source_ip: "203.0.113.81".to_string(),
                ..Default::default()
            },
        ),
        (
            "scanner user agent",
            RequestSnapshot {
                method: "GET".to_string(),
                url: "/admin".to_string(),
                path: "/admin".to_string(),
                headers: HashMap::from([(
                    "User-Agent".to_string(),
                    "sqlmap/1.7.2#stable (http://sqlmap.org)".to_string(),
                )]),
                source_ip: "203.0.113.82".to_string(),
                ..Default::default()
            },
        ),
    ];

    for (label, snapshot) in samples {
        let findings = monitor.inspect_request(&snapshot).await;
        info!(
            sample = label,
            source_ip = snapshot.source_ip.as_str(),
            findings = findings.len(),
            "Sample inspected"
        );
    }

    // Ráfaga de logins fallidos hasta el bloqueo
    for _ in 0..5 {
        let outcome = monitor
            .track_login_attempt("admin", false, "203.0.113.83")
            .await;
        if !outcome.allowed {
            info!(
                lock_expiry = ?outcome.lock_expiry,
                "Demo account locked out after repeated failures"
            );
        }
    }
}

async fn print_status(monitor: &SecurityMonitor) {
    let metrics = monitor.get_metrics(chrono::Duration::hours(1)).await;
    println!("\n{}", "-".repeat(50));
    println!("  Events recorded:     {}", metrics.total_events);
    println!("  Suspicious IPs:      {}", metrics.suspicious_ip_count);
    println!("  Blocked IPs:         {:?}", metrics.blocked_ips);
    println!("  Locked login pairs:  {}", metrics.locked_login_pairs);
    println!("  Alerts dispatched:   {}", metrics.alerts_dispatched);
    println!("{}\n", "-".repeat(50));
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received"),
        _ = terminate => info!("SIGTERM received"),
    }
}
