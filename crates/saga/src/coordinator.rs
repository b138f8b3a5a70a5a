//! Order placement saga coordinator.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use common::{ProductId, SagaId};
use domain::{
    CartLine, Order, PaymentResult, Product, ReservationError, ReservationLine, ReservationPlan,
    plan_reservation,
};
use store::{SagaRecord, Store, StoreError};

use crate::aggregate::SagaInstance;
use crate::error::{ErrorKind, SagaError};
use crate::events::SagaEvent;
use crate::order_placement::{
    self, PlaceOrder, STEP_CAPTURE_PAYMENT, STEP_PERSIST_ORDER, STEP_RESERVE_STOCK,
};
use crate::services::notification::{Attachment, Notifier};
use crate::services::payment::{Charge, ChargeRequest, PaymentGateway};
use crate::state::SagaState;

/// Currency used when none is configured.
pub const DEFAULT_CURRENCY: &str = "usd";

/// A failed step and the error it failed with.
struct StepFailure {
    step: &'static str,
    error: SagaError,
}

impl StepFailure {
    fn new(step: &'static str, error: impl Into<SagaError>) -> Self {
        Self {
            step,
            error: error.into(),
        }
    }
}

/// Places orders.
///
/// The saga plans the cart against one batch load of products, decrements
/// stock line by line with conditional updates, captures card payments,
/// persists the order and sends a confirmation. Every decrement is recorded
/// in the saga log under the request id before anything else happens, so a
/// failure at any later point releases exactly what was taken.
pub struct OrderSaga<S, P, N>
where
    S: Store,
    P: PaymentGateway,
    N: Notifier,
{
    store: S,
    payment: P,
    notifier: N,
    currency: String,
}

impl<S, P, N> OrderSaga<S, P, N>
where
    S: Store,
    P: PaymentGateway,
    N: Notifier,
{
    /// Creates a new order saga.
    pub fn new(store: S, payment: P, notifier: N) -> Self {
        Self {
            store,
            payment,
            notifier,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    /// Sets the currency charges are made in.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into().to_lowercase();
        self
    }

    /// Returns the store the saga works against.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the payment gateway charges go through.
    pub fn payment(&self) -> &P {
        &self.payment
    }

    /// Places an order.
    ///
    /// On failure no order is persisted and every stock decrement made for
    /// the request has been released, or logged as impossible to release.
    /// The error returned is always the one that stopped the saga.
    #[tracing::instrument(
        skip(self, cmd),
        fields(saga_id = %cmd.saga_id, payment_method = %cmd.payment_method, lines = cmd.lines.len())
    )]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<Order, SagaError> {
        let saga_start = Instant::now();
        let result = self.run(&cmd).await;
        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_placed_total", "payment_method" => cmd.payment_method.as_str())
                    .increment(1);
                tracing::info!(order_id = %order.id, total = %order.total_price, "order placed");
            }
            Err(e) => {
                let kind = e.kind();
                metrics::counter!("orders_failed_total", "kind" => kind.as_str()).increment(1);
                match kind {
                    ErrorKind::Internal => tracing::error!(error = %e, "order placement failed"),
                    _ => tracing::warn!(error = %e, "order rejected"),
                }
            }
        }
        result
    }

    async fn run(&self, cmd: &PlaceOrder) -> Result<Order, SagaError> {
        // 1. Checks that need no I/O
        if cmd.lines.is_empty() {
            return Err(ReservationError::EmptyCart.into());
        }
        if cmd.payment_method.requires_capture() && cmd.usable_token().is_none() {
            return Err(SagaError::MissingPaymentToken);
        }

        // 2. Plan against one batch load
        let products = self.load_products(&cmd.lines).await?;
        let plan = plan_reservation(&cmd.lines, &products)?;

        if let Some(declared) = cmd.declared_total
            && declared != plan.total()
        {
            tracing::warn!(
                %declared,
                computed = %plan.total(),
                "declared total differs from computed total, charging computed total"
            );
        }

        // 3. Open the saga log; a second request with the same id stops here
        let saga_id = cmd.saga_id;
        let mut saga = SagaInstance::default();
        let started = SagaEvent::saga_started(
            saga_id,
            order_placement::SAGA_TYPE,
            cmd.payment_method,
            plan.total(),
        );
        self.record(saga_id, &mut saga, started)
            .await
            .map_err(|e| match e {
                SagaError::Store(StoreError::ConcurrencyConflict { .. }) => {
                    SagaError::DuplicateRequest(saga_id)
                }
                other => other,
            })?;

        // 4. Reserve, capture, persist
        let order = match self.execute_steps(cmd, &plan, &mut saga).await {
            Ok(order) => order,
            Err(StepFailure { step, error }) => {
                tracing::info!(step, error = %error, "saga step failed");
                self.record_best_effort(
                    saga_id,
                    &mut saga,
                    SagaEvent::step_failed(step, error.to_string()),
                )
                .await;
                self.release_reservations(saga_id, &mut saga, &error.to_string())
                    .await;
                return Err(error);
            }
        };

        // 5. The order exists; nothing below may fail the request
        self.record_best_effort(saga_id, &mut saga, SagaEvent::saga_completed())
            .await;
        self.notify(&order).await;

        Ok(order)
    }

    async fn execute_steps(
        &self,
        cmd: &PlaceOrder,
        plan: &ReservationPlan,
        saga: &mut SagaInstance,
    ) -> Result<Order, StepFailure> {
        let saga_id = cmd.saga_id;

        for (index, line) in plan.lines().iter().enumerate() {
            self.store
                .decrement_stock(line.product_id, line.variant_id, line.quantity)
                .await
                .map_err(|e| StepFailure::new(STEP_RESERVE_STOCK, reservation_failure(line, e)))?;

            let reserved =
                SagaEvent::stock_reserved(index, line.product_id, line.variant_id, line.quantity);
            self.record(saga_id, saga, reserved)
                .await
                .map_err(|e| StepFailure::new(STEP_RESERVE_STOCK, e))?;
        }

        let payment_result = if cmd.payment_method.requires_capture() {
            let token = cmd
                .usable_token()
                .ok_or_else(|| StepFailure::new(STEP_CAPTURE_PAYMENT, SagaError::MissingPaymentToken))?;
            let charge = self
                .capture(saga_id, plan, token)
                .await
                .map_err(|e| StepFailure::new(STEP_CAPTURE_PAYMENT, e))?;

            self.record_best_effort(
                saga_id,
                saga,
                SagaEvent::payment_captured(&charge.id, &charge.status),
            )
            .await;

            Some(PaymentResult {
                id: charge.id,
                status: charge.status,
                update_time: charge.created_at,
            })
        } else {
            None
        };

        let order = Order::place(
            cmd.owner.clone(),
            plan,
            cmd.shipping_address.clone(),
            cmd.payment_method,
            payment_result,
        );

        if let Err(e) = self.store.insert_order(&order).await {
            if let Some(charge_id) = saga.charge_id() {
                tracing::error!(
                    %saga_id,
                    charge_id,
                    "payment captured but order was not persisted, charge needs a manual refund"
                );
            }
            return Err(StepFailure::new(STEP_PERSIST_ORDER, e));
        }

        self.record_best_effort(saga_id, saga, SagaEvent::order_persisted(order.id))
            .await;

        Ok(order)
    }

    #[tracing::instrument(skip(self, plan, token), fields(amount = %plan.total()))]
    async fn capture(
        &self,
        saga_id: SagaId,
        plan: &ReservationPlan,
        token: &str,
    ) -> Result<Charge, SagaError> {
        let mut metadata = BTreeMap::new();
        metadata.insert("request_id".to_string(), saga_id.to_string());
        metadata.insert("items".to_string(), plan.total_quantity().to_string());

        let request = ChargeRequest {
            amount_minor: plan.total().cents(),
            currency: self.currency.clone(),
            source: token.to_string(),
            description: format!("Order {saga_id}"),
            metadata,
        };

        self.payment
            .create_charge(request)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::Payment => e,
                _ => SagaError::PaymentGateway(e.to_string()),
            })
    }

    /// Releases stock the saga still holds.
    ///
    /// A release is claimed in the log before the stock is given back, so two
    /// compensations of the same saga cannot both release it. Failures are
    /// logged and recorded, never returned. Returns the number of failures.
    async fn release_reservations(
        &self,
        saga_id: SagaId,
        saga: &mut SagaInstance,
        reason: &str,
    ) -> usize {
        if saga.state() != SagaState::Compensating {
            self.record_best_effort(saga_id, saga, SagaEvent::compensation_started(reason))
                .await;
        }

        let mut failures = 0;
        for (index, reservation) in saga.outstanding_reservations().into_iter().rev() {
            let claim = SagaEvent::stock_released(
                index,
                reservation.product_id,
                reservation.variant_id,
                reservation.quantity,
            );
            match self.record(saga_id, saga, claim).await {
                Ok(()) => {}
                Err(SagaError::Store(StoreError::ConcurrencyConflict { .. })) => {
                    tracing::warn!(%saga_id, "saga log moved, another compensation owns this saga");
                    return failures;
                }
                Err(e) => {
                    tracing::warn!(%saga_id, error = %e, "could not record release, releasing anyway");
                }
            }

            match self
                .store
                .increment_stock(
                    reservation.product_id,
                    reservation.variant_id,
                    reservation.quantity,
                )
                .await
            {
                Ok(stock) => {
                    metrics::counter!("stock_rollbacks_total").increment(1);
                    tracing::debug!(
                        product_id = %reservation.product_id,
                        variant_id = %reservation.variant_id,
                        quantity = reservation.quantity,
                        stock,
                        "stock released"
                    );
                }
                Err(e) => {
                    failures += 1;
                    tracing::error!(
                        %saga_id,
                        product_id = %reservation.product_id,
                        variant_id = %reservation.variant_id,
                        quantity = reservation.quantity,
                        error = %e,
                        "stock rollback failed"
                    );
                    self.record_best_effort(
                        saga_id,
                        saga,
                        SagaEvent::release_failed(
                            index,
                            reservation.product_id,
                            reservation.variant_id,
                            reservation.quantity,
                            e.to_string(),
                        ),
                    )
                    .await;
                }
            }
        }

        self.record_best_effort(saga_id, saga, SagaEvent::saga_failed(reason))
            .await;
        failures
    }

    /// Releases whatever a failed or abandoned saga still holds.
    ///
    /// Safe to call repeatedly: reservations already released are skipped,
    /// and a failed saga with nothing outstanding is returned unchanged.
    /// Only call this for sagas whose placing request is no longer running.
    #[tracing::instrument(skip(self))]
    pub async fn compensate(&self, saga_id: SagaId) -> Result<SagaInstance, SagaError> {
        let mut saga = self
            .get_saga(saga_id)
            .await?
            .ok_or(SagaError::SagaNotFound(saga_id))?;

        if !saga.state().can_compensate() {
            return Err(SagaError::InvalidState {
                expected: "Running, Compensating or Failed".to_string(),
                actual: saga.state(),
            });
        }
        if saga.state() == SagaState::Failed && saga.outstanding_reservations().is_empty() {
            tracing::debug!(%saga_id, "nothing left to compensate");
            return Ok(saga);
        }

        let reason = saga
            .failure_reason()
            .unwrap_or("compensation requested")
            .to_string();
        let failures = self.release_reservations(saga_id, &mut saga, &reason).await;
        tracing::info!(%saga_id, failures, "compensation finished");

        Ok(saga)
    }

    /// Loads a saga instance by id from the saga log.
    pub async fn get_saga(&self, saga_id: SagaId) -> Result<Option<SagaInstance>, SagaError> {
        let records = self.store.load_records(saga_id).await?;
        Ok(SagaInstance::from_records(records)?)
    }

    async fn load_products(
        &self,
        lines: &[CartLine],
    ) -> Result<HashMap<ProductId, Product>, SagaError> {
        let mut seen = HashSet::new();
        let ids: Vec<ProductId> = lines
            .iter()
            .map(|l| l.product_id)
            .filter(|id| seen.insert(*id))
            .collect();

        let products = self.store.get_products(&ids).await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn notify(&self, order: &Order) {
        let Some(contact) = order.owner.contact() else {
            tracing::debug!(order_id = %order.id, "no contact on file, confirmation skipped");
            return;
        };

        let receipt = Attachment::receipt(order);
        if let Err(e) = self
            .notifier
            .send_order_confirmation(&contact, order, &receipt)
            .await
        {
            metrics::counter!("notifications_failed_total").increment(1);
            tracing::warn!(order_id = %order.id, error = %e, "order confirmation failed");
        }
    }

    /// Appends a single saga event to the saga log.
    ///
    /// The event is applied to `saga` even when the append fails, so the
    /// in-flight saga still knows about stock it took.
    async fn record(
        &self,
        saga_id: SagaId,
        saga: &mut SagaInstance,
        event: SagaEvent,
    ) -> Result<(), SagaError> {
        let current_version = saga.version();
        let record =
            SagaRecord::from_event(saga_id, current_version.next(), event.event_type(), &event)?;
        saga.apply(event);

        let new_version = self
            .store
            .append_records(vec![record], current_version)
            .await?;
        saga.set_version(new_version);
        Ok(())
    }

    async fn record_best_effort(&self, saga_id: SagaId, saga: &mut SagaInstance, event: SagaEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.record(saga_id, saga, event).await {
            tracing::warn!(%saga_id, event_type, error = %e, "failed to record saga event");
        }
    }
}

/// Maps a rejected decrement onto the reservation error the client sees.
fn reservation_failure(line: &ReservationLine, err: StoreError) -> SagaError {
    match err {
        StoreError::InsufficientStock {
            requested,
            available,
            ..
        } => ReservationError::InsufficientStock {
            product_name: line.product_name.clone(),
            variant_id: line.variant_id,
            requested,
            available,
        }
        .into(),
        StoreError::VariantNotFound {
            product_id,
            variant_id,
        } => ReservationError::VariantNotFound {
            product_id,
            variant_id,
        }
        .into(),
        StoreError::ProductNotFound(product_id) => {
            ReservationError::ProductNotFound(product_id).into()
        }
        other => other.into(),
    }
}
