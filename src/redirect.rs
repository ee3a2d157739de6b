use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::RedirectConfig;
use crate::interfaces::{Navigator, TokenId};
use crate::machine::MintedToken;

/// Schedules one delayed navigation per minted token.
pub struct MintRedirectTrigger {
    navigator: Arc<dyn Navigator>,
    delay: Duration,
    route_prefix: String,
    handled: HashSet<TokenId>,
}

impl MintRedirectTrigger {
    pub fn new(navigator: Arc<dyn Navigator>, config: &RedirectConfig) -> Self {
        Self {
            navigator,
            delay: config.delay(),
            route_prefix: config.route_prefix.trim_end_matches('/').to_string(),
            handled: HashSet::new(),
        }
    }

    pub fn route_for(&self, token_id: TokenId) -> String {
        format!("{}/{}", self.route_prefix, token_id)
    }

    /// Arms the timer for a token not seen before. Must run inside a tokio
    /// runtime. The returned handle is informational; the timer is never
    /// cancelled.
    pub fn observe(&mut self, minted: MintedToken) -> Option<JoinHandle<()>> {
        if !self.handled.insert(minted.token_id) {
            return None;
        }
        let path = self.route_for(minted.token_id);
        let navigator = Arc::clone(&self.navigator);
        let delay = self.delay;
        info!(
            token_id = %minted.token_id,
            delay_ms = delay.as_millis() as u64,
            "token minted, redirecting after delay"
        );
        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            navigator.navigate(&path);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devnet::RecordingNavigator;
    use crate::machine::InvocationId;

    fn minted(token_id: u64) -> MintedToken {
        MintedToken {
            invocation: InvocationId(1),
            token_id: TokenId(token_id),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_token_after_delay() {
        let navigator = Arc::new(RecordingNavigator::default());
        let mut trigger = MintRedirectTrigger::new(navigator.clone(), &RedirectConfig::default());

        let handle = trigger.observe(minted(42)).expect("timer armed");
        assert!(trigger.observe(minted(42)).is_none());
        assert!(trigger.observe(minted(42)).is_none());

        tokio::time::sleep(Duration::from_millis(1_999)).await;
        assert!(navigator.paths().is_empty());

        handle.await.expect("redirect task");
        assert_eq!(navigator.paths(), vec!["/donation/42".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_tokens_each_redirect() {
        let navigator = Arc::new(RecordingNavigator::default());
        let config = RedirectConfig {
            delay_ms: 10,
            route_prefix: "/nft/".to_string(),
        };
        let mut trigger = MintRedirectTrigger::new(navigator.clone(), &config);

        let first = trigger.observe(minted(1)).expect("first");
        let second = trigger.observe(minted(2)).expect("second");
        first.await.expect("first redirect");
        second.await.expect("second redirect");
        assert_eq!(
            navigator.paths(),
            vec!["/nft/1".to_string(), "/nft/2".to_string()]
        );
    }
}
