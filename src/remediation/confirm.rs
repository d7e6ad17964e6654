use async_trait::async_trait;

use crate::models::RemediationAction;

/// Caller-supplied approval for actions planned in interactive mode.
///
/// The engine never prompts on its own; a CLI, UI or policy service decides.
#[async_trait]
pub trait ConfirmAction: Send + Sync {
    async fn confirm(&self, action: &RemediationAction) -> bool;
}

/// Approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

#[async_trait]
impl ConfirmAction for AutoConfirm {
    async fn confirm(&self, _action: &RemediationAction) -> bool {
        true
    }
}

/// Declines everything
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl ConfirmAction for DenyAll {
    async fn confirm(&self, _action: &RemediationAction) -> bool {
        false
    }
}

/// Adapts a synchronous predicate
pub struct ConfirmWith<F>(pub F);

#[async_trait]
impl<F> ConfirmAction for ConfirmWith<F>
where
    F: Fn(&RemediationAction) -> bool + Send + Sync,
{
    async fn confirm(&self, action: &RemediationAction) -> bool {
        (self.0)(action)
    }
}
