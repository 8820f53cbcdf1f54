use async_trait::async_trait;

use crate::ports::{DeliveryError, OverdraftNotice, OverdraftNotifier};

/// Records overdraft notices as structured warnings.
///
/// Used when no mail relay is wired in; a log shipper or alerting rule can
/// pick the events up from there.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl OverdraftNotifier for LogNotifier {
    async fn notify_overdraft(&self, notice: &OverdraftNotice) -> Result<(), DeliveryError> {
        tracing::warn!(
            account_id = %notice.account_id,
            email = %notice.email,
            first_name = %notice.first_name,
            balance = notice.balance,
            "account overdrawn"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::AccountId;

    use super::*;

    #[tokio::test]
    async fn test_log_notifier_always_delivers() {
        let notice = OverdraftNotice {
            account_id: AccountId(1),
            email: "ada@example.com".into(),
            first_name: "Ada".into(),
            balance: -20,
        };
        assert!(LogNotifier.notify_overdraft(&notice).await.is_ok());
    }
}
