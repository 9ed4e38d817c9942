use chainmirror_core::{DepositoryContract, Projector};

/// Shared handler state. Both halves are cheap to clone.
#[derive(Clone)]
pub struct ApiState {
    /// Ledger side: writes and authoritative reads.
    pub contract: DepositoryContract,
    /// Mirror side: filtered listing and lookup.
    pub projector: Projector,
}

impl ApiState {
    pub fn new(contract: DepositoryContract, projector: Projector) -> Self {
        Self { contract, projector }
    }
}
