use serde_json::Value;
use tracing::{error, info, warn};

use crate::gateway::Gateway;
use crate::gateway::auth::InboundRequest;
use crate::gateway::error::{GatewayError, GatewayResult};
use crate::gateway::ledger::{Charge, UsageLedger};

/// Diagnostic stored when the caller goes away before the delegate finishes.
pub(crate) const CANCELLED_MESSAGE: &str = "request cancelled before completion";

impl Gateway {
    /// Run one metered operation against `endpoint_id`.
    ///
    /// Admission and authentication failures leave no ledger entry. Once the
    /// delegate has been invoked exactly one record is written: charged at the
    /// endpoint price on success, free on failure or cancellation.
    pub async fn call(
        &self,
        request: &InboundRequest,
        endpoint_id: &str,
        payload: Value,
    ) -> GatewayResult<Value> {
        let endpoint = self
            .registry
            .get(endpoint_id)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownEndpoint(endpoint_id.to_string()))?;

        self.admission.allow(&request.admission_identifier())?;
        let caller_id = self.authenticator.authenticate(request).await?;

        let pending = PendingCharge::arm(self.ledger.clone(), &caller_id, &endpoint.id);
        let outcome = endpoint.delegate.execute(&endpoint.id, &caller_id, payload).await;
        pending.disarm();

        match outcome {
            Ok(result) => {
                info!(
                    caller_id = %caller_id,
                    endpoint = %endpoint.id,
                    cost_cents = endpoint.cost_cents,
                    "Delegate succeeded"
                );
                self.settle(Charge::success(&caller_id, &endpoint.id, endpoint.cost_cents))
                    .await;
                Ok(result)
            }
            Err(e) => {
                let diagnostic = e.to_string();
                warn!(
                    caller_id = %caller_id,
                    endpoint = %endpoint.id,
                    error = %diagnostic,
                    "Delegate failed, cost waived"
                );
                self.settle(Charge::failure(&caller_id, &endpoint.id, &diagnostic))
                    .await;
                Err(GatewayError::DelegateFailure(diagnostic))
            }
        }
    }

    // 在独立任务中写账，调用方中途取消也不会打断写入
    async fn settle(&self, charge: Charge) {
        let ledger = self.ledger.clone();
        if let Err(e) = tokio::spawn(async move { ledger.record(charge).await }).await {
            error!(error = %e, "Usage record task failed");
        }
    }
}

/// Records a cancelled operation if dropped before [`PendingCharge::disarm`].
struct PendingCharge {
    ledger: UsageLedger,
    charge: Option<Charge>,
}

impl PendingCharge {
    fn arm(ledger: UsageLedger, caller_id: &str, endpoint: &str) -> Self {
        Self {
            ledger,
            charge: Some(Charge::failure(caller_id, endpoint, CANCELLED_MESSAGE)),
        }
    }

    fn disarm(mut self) {
        self.charge = None;
    }
}

impl Drop for PendingCharge {
    fn drop(&mut self) {
        let Some(charge) = self.charge.take() else {
            return;
        };
        warn!(
            caller_id = %charge.caller_id,
            endpoint = %charge.endpoint,
            "Call dropped before the delegate completed"
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let ledger = self.ledger.clone();
                handle.spawn(async move { ledger.record(charge).await });
            }
            Err(_) => error!(
                caller_id = %charge.caller_id,
                endpoint = %charge.endpoint,
                "No runtime left to record the cancelled call"
            ),
        }
    }
}
