use tracing::debug;

use crate::{
    action::{
        container::AssetContainer,
        context::ActionContext,
        errors::{ensure_type, ActionError, ActionResult},
        events::ActionEvent,
    },
    identity::{ComponentInfo, Identifiable, OperationId},
    models::{amount::UFix64, AssetType},
    storage::{DepositCapability, OwnedVault, VaultAccess, WithdrawCapability},
    traits::{FlashCallback, Flasher},
};

/// Flash lender drawing from a reserve vault and charging `fee_rate` on the principal.
#[derive(Debug)]
pub struct VaultFlasher {
    label: String,
    lend: WithdrawCapability,
    repay: DepositCapability,
    fee_rate: UFix64,
    id: Option<OperationId>,
}

impl VaultFlasher {
    pub fn new(reserve: &OwnedVault, fee_rate: UFix64, id: Option<OperationId>) -> Self {
        Self {
            label: format!("VaultFlasher({})", reserve.vault_id()),
            lend: reserve.withdraw_capability(),
            repay: reserve.deposit_capability(),
            fee_rate,
            id,
        }
    }
}

impl Identifiable for VaultFlasher {
    fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Option<OperationId>) {
        self.id = id;
    }

    fn component_info(&self) -> ComponentInfo {
        ComponentInfo::leaf("VaultFlasher", self.id)
    }
}

impl Flasher for VaultFlasher {
    fn borrow_type(&self) -> &AssetType {
        self.lend.asset_type()
    }

    fn fee(&self, amount: UFix64) -> ActionResult<UFix64> {
        amount
            .checked_mul(self.fee_rate)
            .ok_or_else(|| ActionError::overflow(&self.label, "fee"))
    }

    fn flash_loan(
        &self,
        ctx: &mut ActionContext<'_>,
        amount: UFix64,
        callback: FlashCallback<'_>,
    ) -> ActionResult<AssetContainer> {
        let fee = self.fee(amount)?;
        let due = amount
            .checked_add(fee)
            .ok_or_else(|| ActionError::overflow(&self.label, "flash_loan"))?;

        let loan = ctx.withdraw(&self.label, &self.lend, amount)?;
        debug!(component = %self.label, %amount, %fee, "Flash loan issued");
        let mut returned = callback(ctx, loan)?;

        ensure_type(&self.label, self.borrow_type(), returned.asset_type())?;
        if returned.amount() < due {
            return Err(ActionError::IncompleteTransfer {
                component: self.label.clone(),
                asset_type: returned.asset_type().clone(),
                requested: due,
                accepted: returned.amount(),
            });
        }
        let repayment = returned.split(due)?;
        ctx.deposit(&self.label, &self.repay, repayment)?;
        ctx.emit(ActionEvent::Flashed {
            component: self.label.clone(),
            borrow_type: self.borrow_type().clone(),
            amount,
            fee,
            operation_id: self.id,
        });
        Ok(returned)
    }
}
