//! Exclusively-owned asset quantities.

use uuid::Uuid;

use crate::{
    action::errors::{ensure_type, ActionError, ActionResult},
    models::{amount::UFix64, AssetType},
};

/// A typed quantity of a fungible asset in transit between two vaults.
///
/// Containers cannot be cloned and can only be filled by withdrawing from a vault through an
/// [`crate::ActionContext`]. Passing one by value is a move: whoever received it last is the only
/// party able to deposit it. A container that is dropped while still holding value strands that
/// value, which the unit of work detects and refuses to commit.
#[must_use = "an asset container must be deposited, otherwise its value is stranded"]
#[derive(Debug, PartialEq, Eq)]
pub struct AssetContainer {
    asset_type: AssetType,
    amount: UFix64,
    /// Unit of work that minted the value. `None` for empty containers.
    origin: Option<Uuid>,
}

impl AssetContainer {
    /// Creates a container holding nothing.
    pub fn empty(asset_type: AssetType) -> Self {
        Self { asset_type, amount: UFix64::ZERO, origin: None }
    }

    pub(crate) fn issue(asset_type: AssetType, amount: UFix64, origin: Uuid) -> Self {
        let origin = if amount.is_zero() { None } else { Some(origin) };
        Self { asset_type, amount, origin }
    }

    pub fn asset_type(&self) -> &AssetType {
        &self.asset_type
    }

    pub fn amount(&self) -> UFix64 {
        self.amount
    }

    pub fn is_empty(&self) -> bool {
        self.amount.is_zero()
    }

    pub(crate) fn origin(&self) -> Option<&Uuid> {
        self.origin.as_ref()
    }

    /// Moves `amount` out of this container into a new one.
    pub fn split(&mut self, amount: UFix64) -> ActionResult<AssetContainer> {
        let remaining = self
            .amount
            .checked_sub(amount)
            .ok_or_else(|| ActionError::InsufficientAvailability {
                component: "AssetContainer".to_string(),
                asset_type: self.asset_type.clone(),
                requested: amount,
                available: self.amount,
            })?;
        self.amount = remaining;
        let origin = if amount.is_zero() { None } else { self.origin };
        Ok(AssetContainer { asset_type: self.asset_type.clone(), amount, origin })
    }

    /// Moves the whole content of `other` into this container.
    pub fn merge(&mut self, other: AssetContainer) -> ActionResult<()> {
        ensure_type("AssetContainer", &self.asset_type, &other.asset_type)?;
        if other.is_empty() {
            return Ok(());
        }
        if self.origin.is_some() && self.origin != other.origin {
            return Err(ActionError::invalid_handle(
                "AssetContainer",
                "container",
                "containers minted by different units of work cannot be merged",
            ));
        }
        self.amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| ActionError::overflow("AssetContainer", "merge"))?;
        self.origin = other.origin;
        Ok(())
    }

    /// Consumes an empty container. Fails if it still holds value.
    pub fn destroy_empty(self, component: &str) -> ActionResult<()> {
        if !self.is_empty() {
            return Err(ActionError::IncompleteTransfer {
                component: component.to_string(),
                asset_type: self.asset_type,
                requested: self.amount,
                accepted: UFix64::ZERO,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn container(amount: u64) -> AssetContainer {
        AssetContainer::issue(AssetType::from("FLOW"), UFix64::from_integer(amount).unwrap(), Uuid::nil())
    }

    #[test]
    fn test_split_and_merge_preserve_total() {
        let mut original = container(100);

        let part = original
            .split(UFix64::from_integer(30).unwrap())
            .unwrap();

        assert_eq!(original.amount(), UFix64::from_integer(70).unwrap());
        assert_eq!(part.amount(), UFix64::from_integer(30).unwrap());

        original.merge(part).unwrap();
        assert_eq!(original.amount(), UFix64::from_integer(100).unwrap());
    }

    #[test]
    fn test_split_more_than_held() {
        let mut original = container(10);

        let err = original
            .split(UFix64::from_integer(11).unwrap())
            .unwrap_err();

        assert!(matches!(err, ActionError::InsufficientAvailability { .. }));
        assert_eq!(original.amount(), UFix64::from_integer(10).unwrap());
    }

    #[test]
    fn test_merge_rejects_other_asset() {
        let mut flow = container(1);
        let usdc = AssetContainer::empty(AssetType::from("USDC"));

        let err = flow.merge(usdc).unwrap_err();

        assert!(matches!(err, ActionError::TypeMismatch { .. }));
    }

    #[test]
    fn test_merge_into_empty_adopts_origin() {
        let mut empty = AssetContainer::empty(AssetType::from("FLOW"));

        empty.merge(container(5)).unwrap();

        assert_eq!(empty.origin(), Some(&Uuid::nil()));
    }

    #[test]
    fn test_destroy_empty() {
        assert!(AssetContainer::empty(AssetType::from("FLOW"))
            .destroy_empty("test")
            .is_ok());
        assert!(matches!(
            container(1).destroy_empty("test"),
            Err(ActionError::IncompleteTransfer { .. })
        ));
    }
}
