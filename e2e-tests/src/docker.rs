use std::{net::TcpListener, process::Command};

use anyhow::Result;
use tokio::time::{sleep, Duration};

pub const POSTGRES_USER: &str = "postgres";
pub const POSTGRES_PASSWORD: &str = "postgres";
pub const POSTGRES_DB: &str = "postgres";

/// Starts a throwaway Postgres on a free local port and returns its container name and port.
pub async fn start_postgres_container() -> Result<(String, u16)> {
    ensure_docker_daemon().await?;

    let port = allocate_free_port()?;
    let name = format!("pgsink_pg_{}_{port}", std::process::id());

    let status = Command::new("docker")
        .args([
            "run",
            "-d",
            "--name",
            &name,
            "-e",
            &format!("POSTGRES_PASSWORD={}", POSTGRES_PASSWORD),
            "-e",
            &format!("POSTGRES_USER={}", POSTGRES_USER),
            "-e",
            &format!("POSTGRES_DB={}", POSTGRES_DB),
            "-p",
            &format!("{}:5432", port),
            "postgres:16",
        ])
        .output();

    let out = match status {
        Ok(o) => o,
        Err(_) => return Err(anyhow::anyhow!("Docker not available")),
    };
    if !out.status.success() {
        return Err(anyhow::anyhow!(
            "Failed to start postgres container: {}",
            String::from_utf8_lossy(&out.stderr)
        ));
    }

    for _ in 0..40 {
        if port_open(port).await {
            return Ok((name, port));
        }
        sleep(Duration::from_millis(250)).await;
    }

    let _ = stop_postgres_container(&name).await;
    Err(anyhow::anyhow!("Postgres did not become ready on port {}", port))
}

/// Waits until the server behind `port` accepts authenticated sessions, not just TCP.
pub async fn wait_for_postgres(port: u16) -> Result<()> {
    let config = format!(
        "host=localhost port={} user={} password={} dbname={}",
        port, POSTGRES_USER, POSTGRES_PASSWORD, POSTGRES_DB
    );
    for _ in 0..40 {
        if tokio_postgres::connect(&config, tokio_postgres::NoTls).await.is_ok() {
            return Ok(());
        }
        sleep(Duration::from_millis(250)).await;
    }
    Err(anyhow::anyhow!("Postgres did not become ready in time"))
}

pub async fn ensure_docker_daemon() -> Result<()> {
    if docker_info_ok() {
        return Ok(());
    }

    #[cfg(target_os = "macos")]
    {
        let _ = Command::new("open").args(["-g", "-a", "Docker"]).output();
    }

    if which("colima") {
        let _ = Command::new("colima").arg("start").output();
    }

    for _ in 0..60 {
        if docker_info_ok() {
            return Ok(());
        }
        sleep(Duration::from_millis(500)).await;
    }
    Err(anyhow::anyhow!("Docker daemon not available after waiting"))
}

fn docker_info_ok() -> bool {
    Command::new("docker").arg("info").output().map(|o| o.status.success()).unwrap_or(false)
}

fn which(bin: &str) -> bool {
    Command::new("which").arg(bin).output().map(|o| o.status.success()).unwrap_or(false)
}

pub async fn stop_postgres_container(name: &str) -> Result<()> {
    let _ = Command::new("docker").args(["rm", "-f", name]).output();
    Ok(())
}

fn allocate_free_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

async fn port_open(port: u16) -> bool {
    tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok()
}
