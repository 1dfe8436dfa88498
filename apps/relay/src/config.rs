//! Relay configuration, read from the environment once at startup

/// Default listen port when `PORT` is unset
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen port (`PORT`)
    pub port: u16,

    /// Root domain for host-based subdomain extraction (`DOMAIN`)
    pub domain: String,

    /// Deployment environment label (`NODE_ENV`), informational only
    pub env: String,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let domain = std::env::var("DOMAIN").unwrap_or_else(|_| "localhost".to_string());
        let env = std::env::var("NODE_ENV").unwrap_or_else(|_| "development".to_string());

        Self { port, domain, env }
    }

    /// Public URL announced in the tunnel-ready frame
    pub fn public_url(&self, subdomain: &str) -> String {
        format!("https://{}.{}", subdomain, self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url_format() {
        let config = RelayConfig {
            port: 8080,
            domain: "tunnel.example.com".to_string(),
            env: "test".to_string(),
        };
        assert_eq!(
            config.public_url("my-app"),
            "https://my-app.tunnel.example.com"
        );
    }
}
