use std::time::Duration;

/// Ringing timeout for both directions.
pub const DEFAULT_RING_TIMEOUT: Duration = Duration::from_secs(60);
/// Time allowed between accept and both sides being in the room.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Configuration for a [`crate::calls::CallCoordinator`].
#[derive(Clone)]
pub struct CallCoordinatorConfig {
    pub app_id: String,
    /// Shared secret used to sign room access tokens.
    pub app_key: Vec<u8>,
    pub local_user_id: String,
    /// Sent as `callerName` in outgoing call requests.
    pub display_name: Option<String>,
    pub token_ttl: Duration,
    pub ring_timeout: Duration,
    pub connect_timeout: Duration,
    pub command_buffer: usize,
    pub event_buffer: usize,
}

impl CallCoordinatorConfig {
    pub fn new(
        app_id: impl Into<String>,
        app_key: impl Into<Vec<u8>>,
        local_user_id: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_key: app_key.into(),
            local_user_id: local_user_id.into(),
            ..Default::default()
        }
    }
}

impl Default for CallCoordinatorConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_key: Vec::new(),
            local_user_id: String::new(),
            display_name: None,
            token_ttl: DEFAULT_TOKEN_TTL,
            ring_timeout: DEFAULT_RING_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_buffer: 32,
            event_buffer: 64,
        }
    }
}

impl std::fmt::Debug for CallCoordinatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallCoordinatorConfig")
            .field("app_id", &self.app_id)
            .field("app_key", &"[REDACTED]")
            .field("local_user_id", &self.local_user_id)
            .field("display_name", &self.display_name)
            .field("token_ttl", &self.token_ttl)
            .field("ring_timeout", &self.ring_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("command_buffer", &self.command_buffer)
            .field("event_buffer", &self.event_buffer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_app_key() {
        let config = CallCoordinatorConfig::new("app", b"super-secret".to_vec(), "u1");
        let printed = format!("{config:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("[REDACTED]"));
        assert_eq!(config.ring_timeout, Duration::from_secs(60));
    }
}
