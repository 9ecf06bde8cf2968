//! The five checkout-session operations. Each mutation body runs as a
//! compute closure under the idempotency guard; the closure owns its inputs
//! because the guard detaches it from the request once the pending lock is
//! taken, and whatever it returns is what a replayed request will see.

use metrics::counter;
use tracing::{info, warn};

use acp_core::{
    CheckoutSession, CompleteCheckoutRequest, CompletedCheckout, CreateCheckoutRequest,
    FulfillmentInput, ItemInput, Order, OrderEvent, OrderStatus, PaymentError, PricingRequest,
    ProtocolError, Quote, SessionStatus, UpdateCheckoutRequest, can_transition, now_rfc3339,
    parse_body,
};
use acp_idempotency::Flight;

use crate::AppState;
use crate::http::RequestMeta;

const REASON_LIMIT: usize = 256;

/// `POST /checkout_sessions`
pub async fn create(
    state: &AppState,
    meta: &RequestMeta,
    body: &[u8],
) -> Result<Flight<CheckoutSession>, ProtocolError> {
    let request: CreateCheckoutRequest = parse_body(body)?;
    request.validate()?;

    let guard = state.guard.clone();
    let state = state.clone();
    guard
        .execute(meta.idempotency_key.as_deref(), move || async move {
            let cart = PricingRequest {
                items: request.items,
                customer: request.customer.clone(),
                fulfillment: request.fulfillment,
            };
            let quote = price_cart(&state, &cart).await?;
            let now = now_rfc3339();
            let mut session = CheckoutSession {
                id: CheckoutSession::new_id(),
                status: initial_status(&quote),
                items: quote.items,
                totals: quote.totals,
                fulfillment: quote.fulfillment,
                customer: request.customer,
                messages: quote.messages,
                links: Vec::new(),
                created_at: now.clone(),
                updated_at: now,
            };
            state
                .sessions
                .put(&mut session)
                .await
                .map_err(ProtocolError::Internal)?;
            info!(session_id = %session.id, status = %session.status, "checkout session created");
            Ok(session)
        })
        .await
}

/// `GET /checkout_sessions/{id}` — no idempotency wrap, no state check;
/// terminal sessions stay readable until the store TTL expires them.
pub async fn get(state: &AppState, id: &str) -> Result<CheckoutSession, ProtocolError> {
    load_session(state, id).await
}

/// `POST /checkout_sessions/{id}`
pub async fn update(
    state: &AppState,
    meta: &RequestMeta,
    id: &str,
    body: &[u8],
) -> Result<Flight<CheckoutSession>, ProtocolError> {
    let request: UpdateCheckoutRequest = parse_body(body)?;
    request.validate()?;

    let guard = state.guard.clone();
    let state = state.clone();
    let id = id.to_string();
    guard
        .execute(meta.idempotency_key.as_deref(), move || async move {
            let mut session = load_session(&state, &id).await?;
            if session.status.is_terminal() {
                return Err(ProtocolError::InvalidState(format!(
                    "checkout session is {} and can no longer be updated",
                    session.status
                )));
            }

            let items: Vec<ItemInput> = match request.items {
                Some(items) => items,
                None => session
                    .items
                    .iter()
                    .map(|item| ItemInput {
                        id: item.id.clone(),
                        quantity: item.quantity,
                    })
                    .collect(),
            };
            let customer = request.customer.or_else(|| session.customer.clone());
            let fulfillment = match request.fulfillment {
                Some(input) => Some(input),
                None => session.fulfillment.as_ref().map(|f| FulfillmentInput {
                    selected_id: f.selected_id.clone(),
                }),
            };

            let cart = PricingRequest {
                items,
                customer: customer.clone(),
                fulfillment,
            };
            let quote = price_cart(&state, &cart).await?;

            session.items = quote.items;
            session.totals = quote.totals;
            session.fulfillment = quote.fulfillment;
            session.customer = customer;
            session.messages = quote.messages;
            session.status = match (quote.ready, session.status) {
                (true, SessionStatus::NotReadyForPayment) => SessionStatus::ReadyForPayment,
                (true, current) => current,
                (false, _) => SessionStatus::NotReadyForPayment,
            };

            state
                .sessions
                .put(&mut session)
                .await
                .map_err(ProtocolError::Internal)?;
            Ok(session)
        })
        .await
}

/// `POST /checkout_sessions/{id}/complete` — authorize, capture, transition,
/// persist, notify. The webhook emission stays inside the closure so a
/// replay carries the same order id.
pub async fn complete(
    state: &AppState,
    meta: &RequestMeta,
    id: &str,
    body: &[u8],
) -> Result<Flight<CompletedCheckout>, ProtocolError> {
    let request: CompleteCheckoutRequest = parse_body(body)?;
    request.validate()?;

    let guard = state.guard.clone();
    let state = state.clone();
    let id = id.to_string();
    guard
        .execute(meta.idempotency_key.as_deref(), move || async move {
            let mut session = load_session(&state, &id).await?;
            can_transition(session.status, SessionStatus::Completed)?;

            let auth = state
                .payments
                .authorize(&session, &request.payment)
                .await
                .map_err(|err| match err {
                    PaymentError::Declined(reason) => {
                        counter!("payment_declines_total").increment(1);
                        ProtocolError::PaymentAuthorizationFailed(truncate_reason(reason))
                    }
                    PaymentError::Transport(err) => ProtocolError::Upstream(err),
                })?;

            state
                .payments
                .capture(&auth.intent_id)
                .await
                .map_err(|err| match err {
                    PaymentError::Declined(reason) => {
                        counter!("payment_declines_total").increment(1);
                        ProtocolError::PaymentCaptureFailed(truncate_reason(reason))
                    }
                    PaymentError::Transport(err) => ProtocolError::Upstream(err),
                })?;

            can_transition(session.status, SessionStatus::Completed)?;
            session.status = SessionStatus::Completed;
            state
                .sessions
                .put(&mut session)
                .await
                .map_err(ProtocolError::Internal)?;

            let order = Order {
                id: auth.intent_id,
                checkout_session_id: session.id.clone(),
                status: OrderStatus::Placed,
                permalink_url: None,
            };
            emit_webhook(&state, OrderEvent::order_created(&session, &order)).await;
            info!(session_id = %session.id, order_id = %order.id, "checkout completed");
            Ok(CompletedCheckout { session, order })
        })
        .await
}

/// `POST /checkout_sessions/{id}/cancel`
pub async fn cancel(
    state: &AppState,
    meta: &RequestMeta,
    id: &str,
) -> Result<Flight<CheckoutSession>, ProtocolError> {
    let guard = state.guard.clone();
    let state = state.clone();
    let id = id.to_string();
    guard
        .execute(meta.idempotency_key.as_deref(), move || async move {
            let mut session = load_session(&state, &id).await?;
            can_transition(session.status, SessionStatus::Canceled)?;
            session.status = SessionStatus::Canceled;
            state
                .sessions
                .put(&mut session)
                .await
                .map_err(ProtocolError::Internal)?;
            emit_webhook(&state, OrderEvent::order_updated(&session)).await;
            info!(session_id = %session.id, "checkout canceled");
            Ok(session)
        })
        .await
}

async fn load_session(state: &AppState, id: &str) -> Result<CheckoutSession, ProtocolError> {
    state
        .sessions
        .get(id)
        .await
        .map_err(ProtocolError::Internal)?
        .ok_or_else(|| ProtocolError::SessionNotFound(id.to_string()))
}

async fn price_cart(state: &AppState, cart: &PricingRequest) -> Result<Quote, ProtocolError> {
    let quote = state
        .catalog
        .price(cart)
        .await
        .map_err(ProtocolError::Upstream)?;
    quote.verify().map_err(|err| {
        ProtocolError::Upstream(err.context("catalog returned an inconsistent quote"))
    })?;
    Ok(quote)
}

fn initial_status(quote: &Quote) -> SessionStatus {
    if quote.ready {
        SessionStatus::ReadyForPayment
    } else {
        SessionStatus::NotReadyForPayment
    }
}

/// Delivery failures are swallowed: the session is committed and the
/// response must still be cached, or a client retry would re-run payment.
async fn emit_webhook(state: &AppState, event: OrderEvent) {
    if let Err(err) = state.webhooks.deliver(&event).await {
        counter!("webhook_delivery_failures_total").increment(1);
        warn!(
            error = %err,
            checkout_session_id = %event.data.checkout_session_id,
            "webhook delivery failed"
        );
    }
}

fn truncate_reason(reason: String) -> String {
    if reason.chars().count() > REASON_LIMIT {
        reason.chars().take(REASON_LIMIT).collect()
    } else {
        reason
    }
}
