//! ActionExecutor port - OS input injection.

use async_trait::async_trait;

use crate::domain::{Action, ActionError};

/// Performs one UI action against the live display.
///
/// One call is one attempt; retries belong to `ActionDispatcher`. Unknown
/// action kinds and unresolvable targets (e.g. coordinates outside the
/// screen) must be reported as `ActionError::InvalidAction`, never replaced
/// by a default action. Repeating a physical action is not guaranteed to be
/// harmless: a retried click may submit a form twice.
///
/// # テスト容易性
/// - `FakeActionExecutor` が失敗回数・遅延・キャンセルを再現する
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &Action) -> Result<(), ActionError>;
}
