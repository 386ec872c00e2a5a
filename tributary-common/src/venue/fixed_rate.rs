use tracing::trace;

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
    swap::{Quote, Swapper},
};

/// Converts at a constant `rate` (units of `out_type` per unit of `in_type`) against two reserve
/// vaults.
///
/// Input is deposited into the input reserve and output withdrawn from the output reserve, so the
/// total supply of both assets is preserved. Quotes fail when the paying reserve cannot cover
/// them.
#[derive(Debug)]
pub struct FixedRateSwapper {
    label: String,
    in_type: AssetType,
    out_type: AssetType,
    rate: UFix64,
    in_deposit: DepositCapability,
    in_withdraw: WithdrawCapability,
    out_deposit: DepositCapability,
    out_withdraw: WithdrawCapability,
    id: Option<OperationId>,
}

impl FixedRateSwapper {
    pub fn from_reserves(
        in_reserve: &OwnedVault,
        out_reserve: &OwnedVault,
        rate: UFix64,
        id: Option<OperationId>,
    ) -> ActionResult<Self> {
        if rate.is_zero() {
            return Err(ActionError::InvalidInput("FixedRateSwapper rate must be positive".to_string()));
        }
        if in_reserve.vault_id() == out_reserve.vault_id() {
            return Err(ActionError::InvalidInput(
                "FixedRateSwapper reserves must be distinct vaults".to_string(),
            ));
        }
        let in_type = in_reserve.asset_type().clone();
        let out_type = out_reserve.asset_type().clone();
        Ok(Self {
            label: format!("FixedRateSwapper({in_type}->{out_type})"),
            in_type,
            out_type,
            rate,
            in_deposit: in_reserve.deposit_capability(),
            in_withdraw: in_reserve.withdraw_capability(),
            out_deposit: out_reserve.deposit_capability(),
            out_withdraw: out_reserve.withdraw_capability(),
            id,
        })
    }

    pub fn rate(&self) -> UFix64 {
        self.rate
    }

    /// Output for `amount` of input, in the given direction.
    fn convert(&self, amount: UFix64, reverse: bool) -> ActionResult<UFix64> {
        let converted = if reverse {
            amount.checked_div(self.rate)
        } else {
            amount.checked_mul(self.rate)
        };
        converted.ok_or_else(|| ActionError::overflow(&self.label, "convert"))
    }

    /// Input needed for `desired` output, in the given direction.
    fn required(&self, desired: UFix64, reverse: bool) -> ActionResult<UFix64> {
        let required = if reverse {
            desired.checked_mul(self.rate)
        } else {
            desired.checked_div(self.rate)
        };
        required.ok_or_else(|| ActionError::overflow(&self.label, "required"))
    }

    fn quote(
        &self,
        ctx: &ActionContext<'_>,
        in_amount: UFix64,
        out_amount: UFix64,
        reverse: bool,
    ) -> ActionResult<Quote> {
        let (in_type, out_type, reserve) = if reverse {
            (&self.out_type, &self.in_type, &self.in_withdraw)
        } else {
            (&self.in_type, &self.out_type, &self.out_withdraw)
        };
        let available = ctx.balance(&self.label, reserve)?;
        if out_amount > available {
            return Err(ActionError::InsufficientAvailability {
                component: self.label.clone(),
                asset_type: out_type.clone(),
                requested: out_amount,
                available,
            });
        }
        Ok(Quote::new(in_type.clone(), out_type.clone(), in_amount, out_amount))
    }

    fn execute(
        &self,
        ctx: &mut ActionContext<'_>,
        quote: Option<&Quote>,
        input: AssetContainer,
        reverse: bool,
    ) -> ActionResult<AssetContainer> {
        let (expected, deposit_to, withdraw_from) = if reverse {
            (&self.out_type, &self.out_deposit, &self.in_withdraw)
        } else {
            (&self.in_type, &self.in_deposit, &self.out_withdraw)
        };
        ensure_type(&self.label, expected, input.asset_type())?;

        let in_type = input.asset_type().clone();
        let in_amount = input.amount();
        let out_amount = self.convert(in_amount, reverse)?;
        if let Some(quote) = quote {
            if quote.out_amount != out_amount {
                trace!(
                    component = %self.label,
                    quoted = %quote.out_amount,
                    %out_amount,
                    "Executing at a different amount than quoted"
                );
            }
        }

        ctx.deposit(&self.label, deposit_to, input)?;
        let output = ctx.withdraw(&self.label, withdraw_from, out_amount)?;
        ctx.emit(ActionEvent::Swapped {
            component: self.label.clone(),
            in_type,
            out_type: output.asset_type().clone(),
            in_amount,
            out_amount,
            operation_id: self.id,
        });
        Ok(output)
    }
}

impl Identifiable for FixedRateSwapper {
    fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Option<OperationId>) {
        self.id = id;
    }

    fn component_info(&self) -> ComponentInfo {
        ComponentInfo::leaf(self.label.clone(), self.id)
    }
}

impl Swapper for FixedRateSwapper {
    fn in_type(&self) -> &AssetType {
        &self.in_type
    }

    fn out_type(&self) -> &AssetType {
        &self.out_type
    }

    fn quote_in(
        &self,
        ctx: &ActionContext<'_>,
        desired_out: UFix64,
        reverse: bool,
    ) -> ActionResult<Quote> {
        let in_amount = self.required(desired_out, reverse)?;
        let out_amount = self.convert(in_amount, reverse)?;
        self.quote(ctx, in_amount, out_amount, reverse)
    }

    fn quote_out(
        &self,
        ctx: &ActionContext<'_>,
        provided_in: UFix64,
        reverse: bool,
    ) -> ActionResult<Quote> {
        let out_amount = self.convert(provided_in, reverse)?;
        self.quote(ctx, provided_in, out_amount, reverse)
    }

    fn liquidity(&self, ctx: &ActionContext<'_>, reverse: bool) -> ActionResult<Option<UFix64>> {
        let reserve = if reverse { &self.in_withdraw } else { &self.out_withdraw };
        Ok(Some(ctx.balance(&self.label, reserve)?))
    }

    fn swap(
        &self,
        ctx: &mut ActionContext<'_>,
        quote: Option<&Quote>,
        input: AssetContainer,
    ) -> ActionResult<AssetContainer> {
        self.execute(ctx, quote, input, false)
    }

    fn swap_back(
        &self,
        ctx: &mut ActionContext<'_>,
        quote: Option<&Quote>,
        residual: AssetContainer,
    ) -> ActionResult<AssetContainer> {
        self.execute(ctx, quote, residual, true)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::{action::context::atomically, storage::MemoryValueStore};

    fn amount(value: &str) -> UFix64 {
        value.parse().unwrap()
    }

    fn setup(rate: &str) -> (MemoryValueStore, OwnedVault, OwnedVault, FixedRateSwapper) {
        let mut store = MemoryValueStore::new();
        let flow = store.open_vault(AssetType::from("FLOW"));
        let usdc = store.open_vault(AssetType::from("USDC"));
        store.mint(&flow, amount("1000")).unwrap();
        store.mint(&usdc, amount("1000")).unwrap();
        let swapper = FixedRateSwapper::from_reserves(&flow, &usdc, amount(rate), None).unwrap();
        (store, flow, usdc, swapper)
    }

    #[rstest]
    #[case::forward_out(false, "10", "20")]
    #[case::reverse_out(true, "10", "5")]
    fn test_quote_out(#[case] reverse: bool, #[case] provided: &str, #[case] expected: &str) {
        let (mut store, _, _, swapper) = setup("2");
        let ctx = ActionContext::begin(&mut store);

        let quote = swapper
            .quote_out(&ctx, amount(provided), reverse)
            .unwrap();

        assert_eq!(quote.out_amount, amount(expected));
        assert_eq!(quote.in_amount, amount(provided));
    }

    #[test]
    fn test_quote_in_truncates() {
        let (mut store, _, _, swapper) = setup("3");
        let ctx = ActionContext::begin(&mut store);

        let quote = swapper
            .quote_in(&ctx, amount("10"), false)
            .unwrap();

        assert_eq!(quote.in_amount, amount("3.33333333"));
        assert_eq!(quote.out_amount, amount("9.99999999"));
    }

    #[test]
    fn test_quote_fails_beyond_reserve() {
        let (mut store, _, _, swapper) = setup("2");
        let ctx = ActionContext::begin(&mut store);

        let err = swapper
            .quote_out(&ctx, amount("600"), false)
            .unwrap_err();

        assert!(matches!(err, ActionError::InsufficientAvailability { .. }));
    }

    #[rstest]
    #[case::forward(false, "400")]
    #[case::reverse(true, "1000")]
    fn test_liquidity_is_the_paying_reserve(#[case] reverse: bool, #[case] expected: &str) {
        let mut store = MemoryValueStore::new();
        let flow = store.open_vault(AssetType::from("FLOW"));
        let usdc = store.open_vault(AssetType::from("USDC"));
        store.mint(&flow, amount("1000")).unwrap();
        store.mint(&usdc, amount("400")).unwrap();
        let swapper = FixedRateSwapper::from_reserves(&flow, &usdc, amount("2"), None).unwrap();
        let ctx = ActionContext::begin(&mut store);

        assert_eq!(swapper.liquidity(&ctx, reverse).unwrap(), Some(amount(expected)));
    }

    #[test]
    fn test_swap_and_swap_back_preserve_supply() {
        let (mut store, _, _, swapper) = setup("2");
        let wallet = store.open_vault(AssetType::from("FLOW"));
        store.mint(&wallet, amount("10")).unwrap();

        let (_, receipt) = atomically(&mut store, |ctx| {
            let input = ctx.withdraw("test", &wallet, amount("10"))?;
            let output = swapper.swap(ctx, None, input)?;
            assert_eq!(output.amount(), amount("20"));
            let back = swapper.swap_back(ctx, None, output)?;
            ctx.deposit("test", &wallet, back)
        })
        .unwrap();

        assert_eq!(receipt.events.len(), 2);
        assert_eq!(store.balance(wallet.vault_id()), Some(amount("10")));
        assert_eq!(store.total_supply(&AssetType::from("FLOW")), amount("1010"));
        assert_eq!(store.total_supply(&AssetType::from("USDC")), amount("1000"));
    }

    #[test]
    fn test_swap_rejects_wrong_input() {
        let (mut store, _, usdc, swapper) = setup("2");

        let result = atomically(&mut store, |ctx| {
            let input = ctx.withdraw("test", &usdc, amount("1"))?;
            swapper.swap(ctx, None, input)
        });

        assert!(matches!(result, Err(ActionError::TypeMismatch { .. })));
    }
}
