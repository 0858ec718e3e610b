use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use num_traits::Zero;
use serde::Deserialize;
use shared::*;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::*;
use crate::orders::load_order_in_scope;
use crate::reservations::load_in_scope;
use crate::schema::*;
use crate::ActorContext;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlePaymentRequest {
    pub payment_method: String,
}

/// Collapses order items into one bill line per menu item, in order of first
/// appearance. Line totals use the prices snapshotted on the order items, so a
/// bill always adds up to the order it came from; the unit price shown is the
/// line total divided by the summed quantity.
pub fn collapse_lines(
    bill_id: Uuid,
    items: &[OrderItem],
    names: &HashMap<Uuid, String>,
) -> Result<Vec<BillItem>, EngineError> {
    let mut lines: Vec<BillItem> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for item in items {
        let line_total = &item.unit_price * BigDecimal::from(item.quantity);
        match index.get(&item.menu_item_id) {
            Some(&position) => {
                let line = &mut lines[position];
                line.quantity = line.quantity.checked_add(item.quantity).ok_or_else(|| {
                    EngineError::validation(format!(
                        "quantity of menu item {} overflows a bill line",
                        item.menu_item_id
                    ))
                })?;
                line.line_total = &line.line_total + line_total;
            }
            None => {
                let item_name = names
                    .get(&item.menu_item_id)
                    .cloned()
                    .ok_or_else(|| EngineError::not_found("menu item", item.menu_item_id))?;
                index.insert(item.menu_item_id, lines.len());
                lines.push(BillItem {
                    id: Uuid::new_v4(),
                    bill_id,
                    menu_item_id: item.menu_item_id,
                    item_name,
                    unit_price: BigDecimal::zero(),
                    quantity: item.quantity,
                    line_total,
                });
            }
        }
    }

    for line in &mut lines {
        line.unit_price = (&line.line_total / BigDecimal::from(line.quantity)).round(2);
    }
    Ok(lines)
}

pub async fn generate_bill(
    conn: &mut AsyncPgConnection,
    order_id: Uuid,
    actor: &ActorContext,
) -> Result<BillWithItems, EngineError> {
    let restaurant_id = actor.restaurant_id;

    let generated = conn
        .transaction::<_, EngineError, _>(|conn| {
            Box::pin(async move {
                let (order, reservation) = load_order_in_scope(conn, order_id, restaurant_id).await?;
                if order.status != OrderStatus::Finalized {
                    return Err(EngineError::validation(format!(
                        "order {} is {}, bills are generated from finalized orders",
                        order_id, order.status
                    )));
                }

                let existing = bills::table
                    .filter(bills::order_id.eq(order_id))
                    .filter(bills::reservation_id.eq(reservation.id))
                    .select(bills::id)
                    .first::<Uuid>(conn)
                    .await
                    .optional()?;
                if let Some(bill_id) = existing {
                    return Err(EngineError::conflict(format!(
                        "order {} is already billed by {}",
                        order_id, bill_id
                    )));
                }

                let items = order_items::table
                    .filter(order_items::order_id.eq(order_id))
                    .order((order_items::created_at.asc(), order_items::id.asc()))
                    .load::<OrderItem>(conn)
                    .await?;
                if items.is_empty() {
                    return Err(EngineError::validation(format!(
                        "order {} has no items to bill",
                        order_id
                    )));
                }

                let menu_ids: Vec<Uuid> = items.iter().map(|item| item.menu_item_id).collect();
                let names: HashMap<Uuid, String> = menu_items::table
                    .filter(menu_items::id.eq_any(&menu_ids))
                    .select((menu_items::id, menu_items::name))
                    .load::<(Uuid, String)>(conn)
                    .await?
                    .into_iter()
                    .collect();

                let bill_id = Uuid::new_v4();
                let lines = collapse_lines(bill_id, &items, &names)?;
                let total = lines
                    .iter()
                    .fold(BigDecimal::zero(), |sum, line| sum + &line.line_total);

                let bill = diesel::insert_into(bills::table)
                    .values(&NewBill {
                        id: bill_id,
                        order_id,
                        reservation_id: reservation.id,
                        total_amount: total,
                        status: BillStatus::Unpaid,
                    })
                    .get_result::<Bill>(conn)
                    .await?;

                diesel::insert_into(bill_items::table)
                    .values(&lines)
                    .execute(conn)
                    .await?;

                Ok(BillWithItems { bill, items: lines })
            })
        })
        .await?;

    info!(
        bill_id = %generated.bill.id,
        order_id = %order_id,
        lines = generated.items.len(),
        total = %generated.bill.total_amount,
        "Bill generated"
    );
    Ok(generated)
}

/// Settles a bill and cascades the visit to its terminal state.
///
/// One transaction, in dependency order: payment row, bill `Paid`, order
/// `Paid`, reservation `Completed`, table `Available`. Every update is
/// guarded by the status read at the start of the transaction; a mismatch
/// rolls the whole settlement back.
pub async fn settle_payment(
    conn: &mut AsyncPgConnection,
    bill_id: Uuid,
    request: SettlePaymentRequest,
    actor: &ActorContext,
) -> Result<Settlement, EngineError> {
    let restaurant_id = actor.restaurant_id;
    let actor_id = actor.actor_id;

    if request.payment_method.trim().is_empty() {
        return Err(EngineError::validation("payment method is required"));
    }

    let settlement = conn
        .transaction::<_, EngineError, _>(|conn| {
            Box::pin(async move {
                let bill = bills::table
                    .filter(bills::id.eq(bill_id))
                    .first::<Bill>(conn)
                    .await
                    .optional()?
                    .ok_or_else(|| EngineError::not_found("bill", bill_id))?;

                let (order, _) = load_order_in_scope(conn, bill.order_id, restaurant_id)
                    .await
                    .map_err(|err| match err {
                        EngineError::NotFound { .. } => EngineError::not_found("bill", bill_id),
                        other => other,
                    })?;

                if bill.status == BillStatus::Paid {
                    return Err(EngineError::conflict(format!("bill {} is already paid", bill_id)));
                }
                if order.status != OrderStatus::Finalized {
                    return Err(EngineError::validation(format!(
                        "order {} is {}, only finalized orders can be paid",
                        order.id, order.status
                    )));
                }
                let bill_paid = bill.status.transition(BillStatus::Paid)?;
                let order_paid = order.status.transition(OrderStatus::Paid)?;
                let now = Utc::now();

                let payment = diesel::insert_into(payments::table)
                    .values(&NewPayment {
                        id: Uuid::new_v4(),
                        bill_id,
                        amount: bill.total_amount.clone(),
                        payment_method: request.payment_method.trim().to_string(),
                        status: PaymentStatus::Completed,
                        created_by: actor_id,
                    })
                    .get_result::<Payment>(conn)
                    .await?;

                let bill = diesel::update(
                    bills::table
                        .filter(bills::id.eq(bill_id))
                        .filter(bills::status.eq(BillStatus::Unpaid)),
                )
                .set((bills::status.eq(bill_paid), bills::updated_at.eq(now)))
                .get_result::<Bill>(conn)
                .await
                .optional()?
                .ok_or_else(|| EngineError::conflict(format!("bill {} is already paid", bill_id)))?;

                let order = diesel::update(
                    orders::table
                        .filter(orders::id.eq(order.id))
                        .filter(orders::status.eq(OrderStatus::Finalized)),
                )
                .set((orders::status.eq(order_paid), orders::updated_at.eq(now)))
                .get_result::<Order>(conn)
                .await
                .optional()?
                .ok_or_else(|| {
                    EngineError::conflict(format!("order {} changed during settlement", order.id))
                })?;

                let reservation = load_in_scope(conn, order.reservation_id, restaurant_id).await?;
                let completed = reservation.status.transition(ReservationStatus::Completed)?;
                let reservation = diesel::update(
                    reservations::table
                        .filter(reservations::id.eq(reservation.id))
                        .filter(reservations::status.eq(reservation.status)),
                )
                .set((
                    reservations::status.eq(completed),
                    reservations::updated_at.eq(now),
                ))
                .get_result::<Reservation>(conn)
                .await
                .optional()?
                .ok_or_else(|| {
                    EngineError::conflict(format!(
                        "reservation {} changed during settlement",
                        order.reservation_id
                    ))
                })?;

                let table = match reservation.table_id {
                    Some(table_id) => Some(
                        diesel::update(
                            restaurant_tables::table
                                .filter(restaurant_tables::id.eq(table_id))
                                .filter(restaurant_tables::status.eq(TableStatus::Occupied)),
                        )
                        .set((
                            restaurant_tables::status.eq(TableStatus::Available),
                            restaurant_tables::updated_at.eq(now),
                        ))
                        .get_result::<RestaurantTable>(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| {
                            EngineError::conflict(format!(
                                "table {} is no longer occupied",
                                table_id
                            ))
                        })?,
                    ),
                    None => {
                        warn!(reservation_id = %reservation.id, "Settled reservation had no table");
                        None
                    }
                };

                Ok(Settlement {
                    payment,
                    bill,
                    order,
                    reservation,
                    table,
                })
            })
        })
        .await?;

    info!(
        bill_id = %bill_id,
        payment_id = %settlement.payment.id,
        amount = %settlement.payment.amount,
        "Payment settled"
    );
    Ok(settlement)
}

pub async fn get_bill(
    conn: &mut AsyncPgConnection,
    bill_id: Uuid,
    actor: &ActorContext,
) -> Result<BillWithItems, EngineError> {
    let bill = bills::table
        .filter(bills::id.eq(bill_id))
        .first::<Bill>(conn)
        .await
        .optional()?
        .ok_or_else(|| EngineError::not_found("bill", bill_id))?;

    load_in_scope(conn, bill.reservation_id, actor.restaurant_id)
        .await
        .map_err(|err| match err {
            EngineError::NotFound { .. } => EngineError::not_found("bill", bill_id),
            other => other,
        })?;

    let items = bill_items::table
        .filter(bill_items::bill_id.eq(bill_id))
        .load::<BillItem>(conn)
        .await?;
    Ok(BillWithItems { bill, items })
}
