//! Replacing the config file with one fetched over HTTP

use crate::config::{ClientConfig, ConfigFormat};
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Download `url` as text
pub async fn fetch_config(url: &str) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent(concat!("usb-dm/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?
        .error_for_status()?;
    Ok(response.text().await?)
}

/// Fetch `url` and overwrite `path` with it if it is a usable config
///
/// The body must parse in the format of `path` and carry every required
/// section; otherwise `path` is left untouched.
pub async fn update_config(url: &str, path: &Path) -> Result<()> {
    let body = fetch_config(url).await?;

    let config = ClientConfig::parse(&body, ConfigFormat::from_path(path))
        .with_context(|| format!("Configuration at {} is not valid", url))?;
    let missing = config.missing_sections();
    if !missing.is_empty() {
        bail!(
            "Configuration at {} lacks required sections: {}",
            url,
            missing.join(", ")
        );
    }

    fs::write(path, body)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    info!("Updated {} from {}", path.display(), url);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one HTTP response per connection, returning the base URL
    async fn serve(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });

        format!("http://{}", address)
    }

    const REMOTE: &str = "\
usb-devices:
  flash:
    id: 0781:5567
host-machine:
  hostname: hypervisor
virtual-machines:
  windows:
    monitor: ':4444'
";

    #[tokio::test]
    async fn test_update_replaces_config() {
        let url = serve("200 OK", REMOTE).await;
        let dir = tempdir().unwrap();
        let path = dir.path().join("usb_dm_config.yml");
        fs::write(&path, "usb-devices: {}\n").unwrap();

        update_config(&format!("{}/usb_dm_config.yml", url), &path)
            .await
            .unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert!(config.device("flash").is_some());
        assert_eq!(fs::read_to_string(&path).unwrap(), REMOTE);
    }

    #[tokio::test]
    async fn test_update_rejects_incomplete_config() {
        let url = serve("200 OK", "usb-devices: {}\n").await;
        let dir = tempdir().unwrap();
        let path = dir.path().join("usb_dm_config.yml");
        fs::write(&path, "log-level: info\n").unwrap();

        assert!(update_config(&url, &path).await.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "log-level: info\n");
    }

    #[tokio::test]
    async fn test_update_rejects_http_errors() {
        let url = serve("404 Not Found", "missing").await;
        let dir = tempdir().unwrap();
        let path = dir.path().join("usb_dm_config.yml");
        fs::write(&path, "log-level: info\n").unwrap();

        assert!(update_config(&url, &path).await.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "log-level: info\n");
    }
}
