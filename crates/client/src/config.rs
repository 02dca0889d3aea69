/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. In
/// production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base HTTP URL of the simulation API (default `http://localhost:5000`).
    pub api_url: String,
    /// WebSocket URL of the progress endpoint. Defaults to `api_url`
    /// with the scheme rewritten (`http` -> `ws`, `https` -> `wss`).
    pub ws_url: String,
    /// Path of the durable ranking slot (default `.ranking`).
    pub ranking_store_path: String,
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                  |
    /// |----------------------|--------------------------|
    /// | `API_URL`            | `http://localhost:5000`  |
    /// | `WS_URL`             | derived from `API_URL`   |
    /// | `RANKING_STORE_PATH` | `.ranking`               |
    pub fn from_env() -> Self {
        let api_url =
            std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:5000".into());
        let ws_url = std::env::var("WS_URL").unwrap_or_else(|_| derive_ws_url(&api_url));
        let ranking_store_path =
            std::env::var("RANKING_STORE_PATH").unwrap_or_else(|_| ".ranking".into());

        Self {
            api_url,
            ws_url,
            ranking_store_path,
        }
    }
}

/// Rewrite an HTTP base URL into its WebSocket counterpart.
fn derive_ws_url(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_ws_scheme_from_http() {
        assert_eq!(derive_ws_url("http://localhost:5000"), "ws://localhost:5000");
    }

    #[test]
    fn derives_wss_scheme_from_https() {
        assert_eq!(derive_ws_url("https://api.example.com"), "wss://api.example.com");
    }

    #[test]
    fn passes_through_unknown_schemes() {
        assert_eq!(derive_ws_url("ws://already"), "ws://already");
    }
}
