//! Behaviour every connector of a given kind must share, checked against the in-memory store.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use rstest::rstest;
use tributary_common::{
    atomically,
    balancer::{AutoBalancer, AutoBalancerConfig, CounterpartPolicy, RebalanceOutcome, SkipReason},
    connectors::{BoundedSink, BoundedSource, VaultFlasher},
    pipeline::PipelineBuilder,
    storage::{MemoryValueStore, OwnedVault, VaultAccess, VaultRecord},
    swap::{
        connectors::{SwapSink, SwapSource},
        multi_route::MultiRouteSwapper,
        Swapper,
    },
    traits::{FlashCallback, Flasher, PriceOracle, Sink, Source},
    venue::{FixedRateSwapper, StaticPriceOracle},
    ActionContext, ActionError, ActionEvent, AssetContainer, AssetType, OperationId,
    RebalanceDirection, UFix64, VaultId,
};

fn amount(value: &str) -> UFix64 {
    value.parse().unwrap()
}

fn flow() -> AssetType {
    AssetType::from("FLOW")
}

fn usdc() -> AssetType {
    AssetType::from("USDC")
}

/// Wallets, AMM-style reserves and empty destination vaults for both assets.
struct World {
    store: MemoryValueStore,
    wallet: OwnedVault,
    flow_reserve: OwnedVault,
    usdc_reserve: OwnedVault,
    flow_out: OwnedVault,
    usdc_out: OwnedVault,
}

impl World {
    fn new() -> Self {
        Self::with_usdc_reserve("1000")
    }

    fn with_usdc_reserve(reserve: &str) -> Self {
        let mut store = MemoryValueStore::new();
        let wallet = store.open_vault(flow());
        let flow_reserve = store.open_vault(flow());
        let usdc_reserve = store.open_vault(usdc());
        let flow_out = store.open_vault(flow());
        let usdc_out = store.open_vault(usdc());
        store.mint(&wallet, amount("100")).unwrap();
        store.mint(&flow_reserve, amount("1000")).unwrap();
        store.mint(&usdc_reserve, amount(reserve)).unwrap();
        Self { store, wallet, flow_reserve, usdc_reserve, flow_out, usdc_out }
    }

    fn swapper(&self, rate: &str) -> FixedRateSwapper {
        FixedRateSwapper::from_reserves(&self.flow_reserve, &self.usdc_reserve, amount(rate), None)
            .unwrap()
    }

    fn balance(&self, vault: &OwnedVault) -> UFix64 {
        self.store
            .balance(vault.vault_id())
            .unwrap()
    }

    fn supplies(&self) -> (UFix64, UFix64) {
        (self.store.total_supply(&flow()), self.store.total_supply(&usdc()))
    }

    fn snapshot(&self) -> Vec<(VaultId, VaultRecord)> {
        self.store
            .vaults()
            .map(|(id, record)| (*id, record.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum SourceKind {
    Bounded,
    Swap,
}

impl SourceKind {
    fn build(self, world: &World) -> (Box<dyn Source>, &OwnedVault) {
        let wallet = BoundedSource::new(world.wallet.withdraw_capability(), Some(amount("10")), None);
        match self {
            SourceKind::Bounded => (Box::new(wallet) as Box<dyn Source>, &world.flow_out),
            SourceKind::Swap => {
                let source = SwapSource::new(Box::new(world.swapper("2")), Box::new(wallet), None).unwrap();
                (Box::new(source) as Box<dyn Source>, &world.usdc_out)
            }
        }
    }
}

#[rstest]
#[case::bounded(SourceKind::Bounded, "90")]
#[case::swap(SourceKind::Swap, "180")]
fn test_source_withdraw_clamps_to_estimate(#[case] kind: SourceKind, #[case] expected: &str) {
    let mut world = World::new();
    let supplies = world.supplies();
    let (source, destination) = kind.build(&world);
    let destination = destination.deposit_capability();

    let (estimate, _) = atomically(&mut world.store, |ctx| {
        let estimate = source.estimate_available(ctx)?;
        let container = source.withdraw(ctx, amount("100000"))?;
        assert_eq!(container.amount(), estimate);
        assert_eq!(container.asset_type(), source.asset_type());
        ctx.deposit("test", &destination, container)?;
        Ok(estimate)
    })
    .unwrap();

    assert_eq!(estimate, amount(expected));
    assert_eq!(world.balance(&world.wallet), amount("10"));
    assert_eq!(world.supplies(), supplies);
}

#[rstest]
#[case::bounded(SourceKind::Bounded)]
#[case::swap(SourceKind::Swap)]
fn test_source_withdraw_of_zero_is_empty(#[case] kind: SourceKind) {
    let mut world = World::new();
    let (source, _) = kind.build(&world);

    let (empty, receipt) = atomically(&mut world.store, |ctx| {
        let container = source.withdraw(ctx, UFix64::ZERO)?;
        let empty = container.is_empty();
        container.destroy_empty("test")?;
        Ok(empty)
    })
    .unwrap();

    assert!(empty);
    assert!(receipt.events.is_empty());
    assert_eq!(world.balance(&world.wallet), amount("100"));
}

#[test]
fn test_bounded_source_keeps_its_floor() {
    let mut world = World::new();
    let source = BoundedSource::new(world.wallet.withdraw_capability(), Some(amount("10")), None);
    let destination = world.flow_out.deposit_capability();

    let ((available, withdrawn), _) = atomically(&mut world.store, |ctx| {
        let available = source.estimate_available(ctx)?;
        let container = source.withdraw(ctx, amount("200"))?;
        let withdrawn = container.amount();
        ctx.deposit("test", &destination, container)?;
        Ok((available, withdrawn))
    })
    .unwrap();

    assert_eq!(available, amount("90"));
    assert_eq!(withdrawn, amount("90"));
    assert_eq!(world.balance(&world.wallet), amount("10"));
}

#[test]
fn test_swap_source_max_bounds_converted_output() {
    let mut world = World::new();
    let source = SwapSource::new(
        Box::new(world.swapper("2")),
        Box::new(BoundedSource::new(world.wallet.withdraw_capability(), None, None)),
        None,
    )
    .unwrap();
    let destination = world.usdc_out.deposit_capability();

    atomically(&mut world.store, |ctx| {
        let container = source.withdraw(ctx, amount("20"))?;
        assert_eq!(container.amount(), amount("20"));
        ctx.deposit("test", &destination, container)
    })
    .unwrap();

    assert_eq!(world.balance(&world.wallet), amount("90"));
    assert_eq!(world.balance(&world.usdc_out), amount("20"));
}

#[rstest]
#[case::within_liquidity("10", "10", "95")]
#[case::beyond_liquidity("100000", "50", "75")]
fn test_swap_source_clamps_to_venue_liquidity(
    #[case] max: &str,
    #[case] expected: &str,
    #[case] wallet_left: &str,
) {
    let mut world = World::with_usdc_reserve("50");
    let supplies = world.supplies();
    let source = SwapSource::new(
        Box::new(world.swapper("2")),
        Box::new(BoundedSource::new(world.wallet.withdraw_capability(), None, None)),
        None,
    )
    .unwrap();
    let destination = world.usdc_out.deposit_capability();

    let (estimate, _) = atomically(&mut world.store, |ctx| {
        let estimate = source.estimate_available(ctx)?;
        let container = source.withdraw(ctx, amount(max))?;
        assert_eq!(container.amount(), amount(expected));
        ctx.deposit("test", &destination, container)?;
        Ok(estimate)
    })
    .unwrap();

    assert_eq!(estimate, amount("50"));
    assert_eq!(world.balance(&world.wallet), amount(wallet_left));
    assert_eq!(world.balance(&world.usdc_out), amount(expected));
    assert_eq!(world.supplies(), supplies);
}

#[test]
fn test_pipeline_through_shallow_venue_moves_requested_amount() {
    let mut world = World::with_usdc_reserve("50");
    let pipeline = PipelineBuilder::from_source(BoundedSource::new(world.wallet.withdraw_capability(), None, None))
        .swap_through(world.swapper("2"))
        .unwrap()
        .into_sink(BoundedSink::new(world.usdc_out.deposit_capability(), None, None))
        .unwrap();

    let (report, _) = atomically(&mut world.store, |ctx| pipeline.execute(ctx, Some(amount("10")))).unwrap();

    assert_eq!(report.moved, amount("10"));
    assert_eq!(world.balance(&world.usdc_out), amount("10"));
    assert_eq!(world.balance(&world.wallet), amount("95"));
}

#[test]
fn test_swap_sink_capacity_clamps_to_venue_liquidity() {
    let mut world = World::with_usdc_reserve("50");
    let sink = SwapSink::new(
        Box::new(world.swapper("2")),
        Box::new(BoundedSink::new(world.usdc_out.deposit_capability(), Some(amount("1000")), None)),
        None,
    )
    .unwrap();
    let wallet = &world.wallet;

    let (capacity, _) = atomically(&mut world.store, |ctx| {
        let capacity = sink.estimate_capacity(ctx)?;
        let container = ctx.withdraw("test", wallet, amount("25"))?;
        sink.deposit(ctx, container)?;
        Ok(capacity)
    })
    .unwrap();

    assert_eq!(capacity, Some(amount("25")));
    assert_eq!(world.balance(&world.usdc_out), amount("50"));
    assert_eq!(world.balance(&world.usdc_reserve), UFix64::ZERO);
}

#[test]
fn test_composites_reject_mismatched_types_at_construction() {
    let world = World::new();
    let usdc_source = BoundedSource::new(world.usdc_out.withdraw_capability(), None, None);
    let flow_sink = BoundedSink::new(world.flow_out.deposit_capability(), None, None);

    let source = SwapSource::new(Box::new(world.swapper("2")), Box::new(usdc_source), None);
    let sink = SwapSink::new(Box::new(world.swapper("2")), Box::new(flow_sink), None);

    assert!(matches!(source, Err(ActionError::TypeMismatch { .. })));
    assert!(matches!(sink, Err(ActionError::TypeMismatch { .. })));
}

#[derive(Debug, Clone, Copy)]
enum SinkKind {
    Bounded,
    Swap,
}

impl SinkKind {
    /// Sink accepting FLOW whose capacity is 30 FLOW.
    fn build(self, world: &World) -> Box<dyn Sink> {
        match self {
            SinkKind::Bounded => {
                Box::new(BoundedSink::new(world.flow_out.deposit_capability(), Some(amount("30")), None))
            }
            SinkKind::Swap => Box::new(
                SwapSink::new(
                    Box::new(world.swapper("2")),
                    Box::new(BoundedSink::new(world.usdc_out.deposit_capability(), Some(amount("60")), None)),
                    None,
                )
                .unwrap(),
            ),
        }
    }
}

#[rstest]
#[case::bounded(SinkKind::Bounded)]
#[case::swap(SinkKind::Swap)]
fn test_sink_accepts_up_to_capacity(#[case] kind: SinkKind) {
    let mut world = World::new();
    let supplies = world.supplies();
    let sink = kind.build(&world);
    let wallet = &world.wallet;

    let (capacity, _) = atomically(&mut world.store, |ctx| {
        let capacity = sink.estimate_capacity(ctx)?;
        let container = ctx.withdraw("test", wallet, amount("30"))?;
        sink.deposit(ctx, container)?;
        Ok(capacity)
    })
    .unwrap();

    assert_eq!(capacity, Some(amount("30")));
    assert_eq!(world.balance(&world.wallet), amount("70"));
    assert_eq!(world.supplies(), supplies);
}

#[rstest]
#[case::bounded(SinkKind::Bounded)]
#[case::swap(SinkKind::Swap)]
fn test_sink_over_capacity_aborts_unit(#[case] kind: SinkKind) {
    let mut world = World::new();
    let before = world.snapshot();
    let sink = kind.build(&world);
    let wallet = &world.wallet;

    let result = atomically(&mut world.store, |ctx| {
        let container = ctx.withdraw("test", wallet, amount("31"))?;
        sink.deposit(ctx, container)
    });

    assert!(matches!(result, Err(ActionError::IncompleteTransfer { .. })));
    assert_eq!(world.snapshot(), before);
}

#[test]
fn test_route_selection_prefers_best_output_then_list_order() {
    let mut store = MemoryValueStore::new();
    let wallet = store.open_vault(flow());
    let flow_reserves: Vec<OwnedVault> = (0..3).map(|_| store.open_vault(flow())).collect();
    let usdc_reserves: Vec<OwnedVault> = (0..3).map(|_| store.open_vault(usdc())).collect();
    let usdc_out = store.open_vault(usdc());
    store.mint(&wallet, amount("30")).unwrap();
    for reserve in &usdc_reserves {
        store.mint(reserve, amount("1000")).unwrap();
    }
    let routes: Vec<Box<dyn Swapper>> = ["2", "3", "3"]
        .into_iter()
        .zip(flow_reserves.iter().zip(&usdc_reserves))
        .map(|(rate, (flow_reserve, usdc_reserve))| {
            Box::new(FixedRateSwapper::from_reserves(flow_reserve, usdc_reserve, amount(rate), None).unwrap())
                as Box<dyn Swapper>
        })
        .collect();
    let swapper = MultiRouteSwapper::new(flow(), usdc(), routes, None).unwrap();
    let destination = usdc_out.deposit_capability();

    atomically(&mut store, |ctx| {
        let input = ctx.withdraw("test", &wallet, amount("10"))?;
        let output = swapper.swap(ctx, None, input)?;
        ctx.deposit("test", &destination, output)
    })
    .unwrap();

    assert_eq!(store.balance(usdc_out.vault_id()), Some(amount("30")));
    let received: Vec<UFix64> = flow_reserves
        .iter()
        .map(|reserve| store.balance(reserve.vault_id()).unwrap())
        .collect();
    assert_eq!(received, vec![UFix64::ZERO, amount("10"), UFix64::ZERO]);
}

#[test]
fn test_flash_loan_must_be_repaid_with_fee() {
    let mut world = World::new();
    let flasher = VaultFlasher::new(&world.flow_reserve, amount("0.01"), None);
    let before = world.snapshot();

    let result = atomically(&mut world.store, |ctx| {
        let callback: FlashCallback<'_> =
            Box::new(|_: &mut ActionContext<'_>, loan: AssetContainer| -> Result<AssetContainer, ActionError> {
                Ok(loan)
            });
        flasher.flash_loan(ctx, amount("100"), callback)
    });

    assert!(matches!(result, Err(ActionError::IncompleteTransfer { .. })));
    assert_eq!(world.snapshot(), before);
}

#[test]
fn test_stranded_value_fails_commit() {
    let mut world = World::new();
    let before = world.snapshot();
    let mut ctx = ActionContext::begin(&mut world.store);

    let container = ctx
        .withdraw("test", &world.wallet, amount("5"))
        .unwrap();
    drop(container);
    let result = ctx.commit();

    assert!(matches!(result, Err(ActionError::IncompleteTransfer { .. })));
    assert_eq!(world.snapshot(), before);
}

#[test]
fn test_revoked_capability_is_rejected() {
    let mut world = World::new();
    let capability = world.wallet.withdraw_capability();
    world.store.revoke(capability.id());
    let source = BoundedSource::new(capability, None, None);

    let result = atomically(&mut world.store, |ctx| source.estimate_available(ctx));

    assert!(matches!(result, Err(ActionError::InvalidHandle { .. })));
}

#[test]
fn test_pipeline_events_share_operation_id() {
    let mut world = World::new();
    let supplies = world.supplies();
    let id = OperationId::new();
    let pipeline = PipelineBuilder::from_source(BoundedSource::new(world.wallet.withdraw_capability(), None, None))
        .with_id(id)
        .swap_through(world.swapper("2"))
        .unwrap()
        .into_sink(BoundedSink::new(world.usdc_out.deposit_capability(), Some(amount("50")), None))
        .unwrap();

    let (report, receipt) = atomically(&mut world.store, |ctx| pipeline.execute(ctx, None)).unwrap();

    assert_eq!(report.moved, amount("50"));
    assert_eq!(world.balance(&world.wallet), amount("75"));
    assert_eq!(world.supplies(), supplies);
    assert!(!receipt.events.is_empty());
    assert!(receipt
        .events
        .iter()
        .all(|event| event.operation_id() == Some(&id)));
}

struct BalancerWorld {
    world: World,
    oracle: StaticPriceOracle,
    balancer: AutoBalancer,
}

/// Balancer holding 50 FLOW deposited at a price of 2, i.e. `value_of_deposits` of 100.
fn balancer_world(policy: CounterpartPolicy) -> BalancerWorld {
    let mut world = World::new();
    let oracle = StaticPriceOracle::new(usdc(), None).with_price(flow(), amount("2"));
    let shared: Arc<dyn PriceOracle> = Arc::new(oracle.clone());
    let config = AutoBalancerConfig::new(amount("0.9"), amount("1.1"))
        .unwrap()
        .with_policy(policy);
    let wallet = &world.wallet;
    let (balancer, _) = atomically(&mut world.store, |ctx| {
        let balancer = AutoBalancer::create(ctx, flow(), shared, config, None)?;
        let deposit = ctx.withdraw("test", wallet, amount("50"))?;
        balancer.deposit(ctx, deposit)?;
        Ok(balancer)
    })
    .unwrap();
    BalancerWorld { world, oracle, balancer }
}

#[rstest]
#[case::deficit("1.7", true)]
#[case::inside_band("1.9", false)]
#[case::upper_half_of_band("2.1", false)]
#[case::surplus("2.3", true)]
fn test_balancer_threshold_band(#[case] price: &str, #[case] expected: bool) {
    let mut setup = balancer_world(CounterpartPolicy::Skip);
    setup.oracle.set_price(flow(), amount(price));
    let ctx = ActionContext::begin(&mut setup.world.store);

    assert_eq!(setup.balancer.value_of_deposits(&ctx).unwrap(), amount("100"));
    assert_eq!(setup.balancer.check_rebalance(&ctx).unwrap(), expected);
}

#[test]
fn test_balancer_missing_counterpart_is_skipped() {
    let mut setup = balancer_world(CounterpartPolicy::Skip);
    setup.oracle.set_price(flow(), amount("2.4"));

    let (outcome, receipt) =
        atomically(&mut setup.world.store, |ctx| setup.balancer.execute_rebalance(ctx, false)).unwrap();

    assert_eq!(
        outcome,
        RebalanceOutcome::Skipped {
            direction: RebalanceDirection::Surplus,
            reason: SkipReason::MissingCounterpart,
        }
    );
    assert!(receipt.events.is_empty());
}

#[test]
fn test_balancer_missing_counterpart_fails_when_configured() {
    let mut setup = balancer_world(CounterpartPolicy::Fail);
    setup.oracle.set_price(flow(), amount("1.6"));
    let before = setup.world.snapshot();

    let result = atomically(&mut setup.world.store, |ctx| setup.balancer.execute_rebalance(ctx, false));

    assert!(matches!(
        result,
        Err(ActionError::MissingCounterpart { direction: RebalanceDirection::Deficit, .. })
    ));
    assert_eq!(setup.world.snapshot(), before);
}

#[test]
fn test_balancer_surplus_conserves_supply() {
    let mut setup = balancer_world(CounterpartPolicy::Fail);
    let supplies = setup.world.supplies();
    setup
        .balancer
        .set_excess_sink(Some(Box::new(BoundedSink::new(
            setup.world.flow_out.deposit_capability(),
            None,
            None,
        ))))
        .unwrap();
    setup.oracle.set_price(flow(), amount("2.5"));

    let (outcome, receipt) =
        atomically(&mut setup.world.store, |ctx| setup.balancer.execute_rebalance(ctx, false)).unwrap();

    // 50 FLOW worth 125 are pushed down to 110, i.e. 44 FLOW remain.
    assert_eq!(
        outcome,
        RebalanceOutcome::Rebalanced {
            direction: RebalanceDirection::Surplus,
            amount: amount("6"),
            value: amount("15"),
        }
    );
    assert_eq!(setup.world.balance(&setup.world.flow_out), amount("6"));
    assert_eq!(setup.world.supplies(), supplies);
    assert!(matches!(receipt.events.last(), Some(ActionEvent::Rebalanced { .. })));
}
