use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection};
use shared::*;
use tracing::warn;
use uuid::Uuid;

use crate::assignment;
use crate::billing::{self, SettlePaymentRequest};
use crate::error::EngineError;
use crate::models::*;
use crate::orders::{self, OrderItemsRequest};
use crate::publisher::NotificationPublisher;
use crate::reservations::{self, BookReservationRequest};
use crate::ActorContext;

pub type DbPool = Pool<AsyncPgConnection>;

/// Entry point for the HTTP layer: runs each engine operation on its own
/// pooled connection and, once it has committed, hands the user-facing
/// notification to the publisher.
#[derive(Clone)]
pub struct Workflow {
    pool: DbPool,
    publisher: NotificationPublisher,
}

impl Workflow {
    pub fn new(pool: DbPool, publisher: NotificationPublisher) -> Self {
        Self { pool, publisher }
    }

    pub async fn book_reservation(
        &self,
        request: BookReservationRequest,
        actor: &ActorContext,
    ) -> Result<Reservation, EngineError> {
        let mut conn = self.pool.get().await?;
        let reservation = reservations::book_reservation(&mut conn, request, actor).await?;

        self.publisher.dispatch(
            NotificationJob::new(templates::RESERVATION_CONFIRMATION, &reservation.guest_email)
                .with_var("guest_name", &reservation.guest_name)
                .with_var("party_size", reservation.party_size)
                .with_var("reserved_for", reservation.reserved_for.to_rfc2822())
                .with_var("reservation_id", reservation.id),
        );
        Ok(reservation)
    }

    pub async fn get_reservation(
        &self,
        reservation_id: Uuid,
        actor: &ActorContext,
    ) -> Result<Reservation, EngineError> {
        let mut conn = self.pool.get().await?;
        reservations::get_reservation(&mut conn, reservation_id, actor).await
    }

    pub async fn cancel_reservation(
        &self,
        reservation_id: Uuid,
        actor: &ActorContext,
    ) -> Result<Reservation, EngineError> {
        let mut conn = self.pool.get().await?;
        let reservation = reservations::cancel_reservation(&mut conn, reservation_id, actor).await?;

        self.publisher.dispatch(
            NotificationJob::new(templates::RESERVATION_CANCELLATION, &reservation.guest_email)
                .with_var("guest_name", &reservation.guest_name)
                .with_var("reserved_for", reservation.reserved_for.to_rfc2822())
                .with_var("reservation_id", reservation.id),
        );
        Ok(reservation)
    }

    pub async fn remove_reservation(
        &self,
        reservation_id: Uuid,
        actor: &ActorContext,
    ) -> Result<(), EngineError> {
        let mut conn = self.pool.get().await?;
        reservations::remove_reservation(&mut conn, reservation_id, actor).await
    }

    pub async fn assign_table(
        &self,
        reservation_id: Uuid,
        table_id: Uuid,
        actor: &ActorContext,
    ) -> Result<(Reservation, RestaurantTable), EngineError> {
        let mut conn = self.pool.get().await?;
        let (reservation, table) =
            assignment::assign_table(&mut conn, reservation_id, table_id, actor).await?;

        self.publisher.dispatch(
            NotificationJob::new(templates::TABLE_READY, &reservation.guest_email)
                .with_var("guest_name", &reservation.guest_name)
                .with_var("table_label", &table.label)
                .with_var("party_size", reservation.party_size),
        );
        Ok((reservation, table))
    }

    pub async fn create_order(
        &self,
        reservation_id: Uuid,
        request: OrderItemsRequest,
        actor: &ActorContext,
    ) -> Result<OrderWithItems, EngineError> {
        let mut conn = self.pool.get().await?;
        orders::create_order(&mut conn, reservation_id, request, actor).await
    }

    pub async fn update_order(
        &self,
        order_id: Uuid,
        request: OrderItemsRequest,
        actor: &ActorContext,
    ) -> Result<OrderWithItems, EngineError> {
        let mut conn = self.pool.get().await?;
        orders::update_order(&mut conn, order_id, request, actor).await
    }

    pub async fn finalize_order(
        &self,
        order_id: Uuid,
        actor: &ActorContext,
    ) -> Result<Order, EngineError> {
        let mut conn = self.pool.get().await?;
        orders::finalize_order(&mut conn, order_id, actor).await
    }

    pub async fn get_order(
        &self,
        order_id: Uuid,
        actor: &ActorContext,
    ) -> Result<OrderWithItems, EngineError> {
        let mut conn = self.pool.get().await?;
        orders::get_order(&mut conn, order_id, actor).await
    }

    pub async fn generate_bill(
        &self,
        order_id: Uuid,
        actor: &ActorContext,
    ) -> Result<BillWithItems, EngineError> {
        let mut conn = self.pool.get().await?;
        let generated = billing::generate_bill(&mut conn, order_id, actor).await?;

        // the bill is committed; the guest lookup only feeds the email
        match reservations::get_reservation(&mut conn, generated.bill.reservation_id, actor).await {
            Ok(reservation) => {
                self.publisher.dispatch(
                    NotificationJob::new(templates::BILL_READY, &reservation.guest_email)
                        .with_var("guest_name", &reservation.guest_name)
                        .with_var("bill_id", generated.bill.id)
                        .with_var("total", &generated.bill.total_amount)
                        .with_var("items", bill_summary(&generated.items))
                        .with_var("reference", generated.bill.id)
                        .with_attachment(),
                );
            }
            Err(e) => {
                warn!(bill_id = %generated.bill.id, error = %e, "Skipping bill notification");
            }
        }
        Ok(generated)
    }

    pub async fn get_bill(
        &self,
        bill_id: Uuid,
        actor: &ActorContext,
    ) -> Result<BillWithItems, EngineError> {
        let mut conn = self.pool.get().await?;
        billing::get_bill(&mut conn, bill_id, actor).await
    }

    pub async fn settle_payment(
        &self,
        bill_id: Uuid,
        request: SettlePaymentRequest,
        actor: &ActorContext,
    ) -> Result<Settlement, EngineError> {
        let mut conn = self.pool.get().await?;
        let settlement = billing::settle_payment(&mut conn, bill_id, request, actor).await?;

        let paid_at = settlement
            .payment
            .created_at
            .unwrap_or_else(chrono::Utc::now)
            .to_rfc2822();
        self.publisher.dispatch(
            NotificationJob::new(
                templates::PAYMENT_RECEIPT,
                &settlement.reservation.guest_email,
            )
            .with_var("guest_name", &settlement.reservation.guest_name)
            .with_var("amount", &settlement.payment.amount)
            .with_var("payment_method", &settlement.payment.payment_method)
            .with_var("paid_at", paid_at)
            .with_var("reference", settlement.payment.id)
            .with_attachment(),
        );
        Ok(settlement)
    }
}

/// One `name x quantity = total` line per bill item.
fn bill_summary(items: &[BillItem]) -> String {
    items
        .iter()
        .map(|item| format!("{} x{} = {}", item.item_name, item.quantity, item.line_total))
        .collect::<Vec<_>>()
        .join("\n")
}
