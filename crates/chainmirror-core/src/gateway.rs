//! Contract Gateway: `submit`/`evaluate` against one named contract, with
//! ledger faults normalized into [`GatewayError`].

use std::sync::Arc;

use crate::error::GatewayError;
use crate::ledger::{ChainEventStream, FaultCode, LedgerClient, LedgerFault};

/// Phrases a contract uses when the requested key is absent.
const MISSING_KEY_MARKERS: &[&str] = &["not found", "does not exist", "no such"];

/// Capability-typed handle to a single on-chain contract.
///
/// Stateless per call; cloning shares the underlying ledger client.
#[derive(Clone)]
pub struct ContractGateway {
    client: Arc<dyn LedgerClient>,
    contract: String,
}

impl ContractGateway {
    pub fn new(client: Arc<dyn LedgerClient>, contract: impl Into<String>) -> Self {
        Self {
            client,
            contract: contract.into(),
        }
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Ordered, consensus-committed invocation. Resolves once the transaction
    /// has been committed or has failed.
    pub async fn submit<S: AsRef<str> + Sync>(
        &self,
        function: &str,
        args: &[S],
    ) -> Result<Vec<u8>, GatewayError> {
        let args = owned_args(args);
        tracing::debug!(contract = %self.contract, function, "submit");
        self.client
            .submit(&self.contract, function, &args)
            .await
            .map_err(classify)
    }

    /// Local read reflecting some committed state at or after invocation time.
    pub async fn evaluate<S: AsRef<str> + Sync>(
        &self,
        function: &str,
        args: &[S],
    ) -> Result<Vec<u8>, GatewayError> {
        let args = owned_args(args);
        tracing::trace!(contract = %self.contract, function, "evaluate");
        self.client
            .evaluate(&self.contract, function, &args)
            .await
            .map_err(classify)
    }

    /// Open the contract's event stream at `start_block` (inclusive).
    pub async fn subscribe(&self, start_block: u64) -> Result<ChainEventStream, GatewayError> {
        self.client
            .subscribe(&self.contract, start_block)
            .await
            .map_err(classify)
    }
}

fn owned_args<S: AsRef<str>>(args: &[S]) -> Vec<String> {
    args.iter().map(|a| a.as_ref().to_string()).collect()
}

/// Normalize a raw ledger fault.
pub fn classify(fault: LedgerFault) -> GatewayError {
    match fault.code {
        FaultCode::NotFound => GatewayError::NotFound(fault.message),
        FaultCode::Aborted
        | FaultCode::FailedPrecondition
        | FaultCode::InvalidArgument
        | FaultCode::Internal => {
            let lower = fault.message.to_lowercase();
            if MISSING_KEY_MARKERS.iter().any(|m| lower.contains(m)) {
                GatewayError::NotFound(fault.message)
            } else {
                GatewayError::Chaincode(fault.message)
            }
        }
        FaultCode::Unavailable
        | FaultCode::DeadlineExceeded
        | FaultCode::Cancelled
        | FaultCode::Unknown => GatewayError::Transport(fault.message),
    }
}
