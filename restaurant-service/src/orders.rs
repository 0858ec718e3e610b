use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use num_traits::Zero;
use serde::Deserialize;
use shared::*;
use tracing::info;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::*;
use crate::reservations::load_in_scope;
use crate::schema::*;
use crate::ActorContext;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemRequest {
    pub menu_item_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemsRequest {
    pub items: Vec<LineItemRequest>,
}

/// Largest quantity accepted on a single line item.
pub const MAX_QUANTITY: i32 = 1000;

/// Sum of `unit_price * quantity` over the given lines.
pub fn order_total<'a, I>(lines: I) -> BigDecimal
where
    I: IntoIterator<Item = (&'a BigDecimal, i32)>,
{
    lines
        .into_iter()
        .fold(BigDecimal::zero(), |total, (unit_price, quantity)| {
            total + unit_price * BigDecimal::from(quantity)
        })
}

/// Validates each requested line against the menu and snapshots its current
/// price into a new item row for `order_id`.
async fn snapshot_items(
    conn: &mut AsyncPgConnection,
    restaurant_id: Uuid,
    order_id: Uuid,
    requested: &[LineItemRequest],
) -> Result<Vec<NewOrderItem>, EngineError> {
    if requested.is_empty() {
        return Err(EngineError::validation("an order needs at least one item"));
    }

    let mut items = Vec::with_capacity(requested.len());
    for line in requested {
        if !(1..=MAX_QUANTITY).contains(&line.quantity) {
            return Err(EngineError::validation(format!(
                "quantity for menu item {} must be between 1 and {}",
                line.menu_item_id, MAX_QUANTITY
            )));
        }

        let menu_item = menu_items::table
            .filter(menu_items::id.eq(line.menu_item_id))
            .filter(menu_items::restaurant_id.eq(restaurant_id))
            .first::<MenuItem>(conn)
            .await
            .optional()?
            .ok_or_else(|| EngineError::not_found("menu item", line.menu_item_id))?;

        if menu_item.item_status != MenuItemStatus::Available {
            return Err(EngineError::validation(format!(
                "menu item {} is not available",
                menu_item.name
            )));
        }

        items.push(NewOrderItem {
            id: Uuid::new_v4(),
            order_id,
            menu_item_id: menu_item.id,
            quantity: line.quantity,
            unit_price: menu_item.price,
        });
    }
    Ok(items)
}

async fn load_items(
    conn: &mut AsyncPgConnection,
    order_id: Uuid,
) -> Result<Vec<OrderItem>, EngineError> {
    Ok(order_items::table
        .filter(order_items::order_id.eq(order_id))
        .order((order_items::created_at.asc(), order_items::id.asc()))
        .load::<OrderItem>(conn)
        .await?)
}

/// Loads an order together with its reservation, scoped to the restaurant.
pub(crate) async fn load_order_in_scope(
    conn: &mut AsyncPgConnection,
    order_id: Uuid,
    restaurant_id: Uuid,
) -> Result<(Order, Reservation), EngineError> {
    let order = orders::table
        .filter(orders::id.eq(order_id))
        .first::<Order>(conn)
        .await
        .optional()?
        .ok_or_else(|| EngineError::not_found("order", order_id))?;

    with_reservation(conn, order, restaurant_id).await
}

/// Same as [`load_order_in_scope`] but holds the order row lock until the
/// surrounding transaction ends, so writers touching one order run one at a
/// time and each sees the item rows the previous one committed.
pub(crate) async fn lock_order_in_scope(
    conn: &mut AsyncPgConnection,
    order_id: Uuid,
    restaurant_id: Uuid,
) -> Result<(Order, Reservation), EngineError> {
    let order = orders::table
        .filter(orders::id.eq(order_id))
        .for_update()
        .first::<Order>(conn)
        .await
        .optional()?
        .ok_or_else(|| EngineError::not_found("order", order_id))?;

    with_reservation(conn, order, restaurant_id).await
}

async fn with_reservation(
    conn: &mut AsyncPgConnection,
    order: Order,
    restaurant_id: Uuid,
) -> Result<(Order, Reservation), EngineError> {
    let order_id = order.id;
    let reservation = load_in_scope(conn, order.reservation_id, restaurant_id)
        .await
        .map_err(|err| match err {
            EngineError::NotFound { .. } => EngineError::not_found("order", order_id),
            other => other,
        })?;

    Ok((order, reservation))
}

pub async fn create_order(
    conn: &mut AsyncPgConnection,
    reservation_id: Uuid,
    request: OrderItemsRequest,
    actor: &ActorContext,
) -> Result<OrderWithItems, EngineError> {
    let restaurant_id = actor.restaurant_id;
    let actor_id = actor.actor_id;

    let created = conn
        .transaction::<_, EngineError, _>(|conn| {
            Box::pin(async move {
                let reservation = load_in_scope(conn, reservation_id, restaurant_id).await?;
                if reservation.status != ReservationStatus::Seated {
                    return Err(EngineError::validation(format!(
                        "reservation {} is {}, orders need a seated party",
                        reservation_id, reservation.status
                    )));
                }

                let open_order = orders::table
                    .filter(orders::reservation_id.eq(reservation_id))
                    .filter(orders::status.eq(OrderStatus::Open))
                    .select(orders::id)
                    .first::<Uuid>(conn)
                    .await
                    .optional()?;
                if let Some(open_id) = open_order {
                    return Err(EngineError::conflict(format!(
                        "reservation {} already has open order {}",
                        reservation_id, open_id
                    )));
                }

                let order_id = Uuid::new_v4();
                let items = snapshot_items(conn, restaurant_id, order_id, &request.items).await?;
                let total = order_total(items.iter().map(|item| (&item.unit_price, item.quantity)));

                let order = diesel::insert_into(orders::table)
                    .values(&NewOrder {
                        id: order_id,
                        reservation_id,
                        status: OrderStatus::Open,
                        total_amount: total,
                        created_by: actor_id,
                    })
                    .get_result::<Order>(conn)
                    .await?;

                diesel::insert_into(order_items::table)
                    .values(&items)
                    .execute(conn)
                    .await?;

                let items = load_items(conn, order_id).await?;
                Ok(OrderWithItems { order, items })
            })
        })
        .await?;

    info!(
        order_id = %created.order.id,
        reservation_id = %reservation_id,
        total = %created.order.total_amount,
        "Order created"
    );
    Ok(created)
}

/// Appends items to an open order and recomputes its total from every item
/// row of the order, read back inside the same transaction while the order
/// row is locked.
pub async fn update_order(
    conn: &mut AsyncPgConnection,
    order_id: Uuid,
    request: OrderItemsRequest,
    actor: &ActorContext,
) -> Result<OrderWithItems, EngineError> {
    let restaurant_id = actor.restaurant_id;

    let updated = conn
        .transaction::<_, EngineError, _>(|conn| {
            Box::pin(async move {
                let (order, reservation) = lock_order_in_scope(conn, order_id, restaurant_id).await?;
                if order.status != OrderStatus::Open {
                    return Err(EngineError::validation(format!(
                        "order {} is {}, only open orders accept items",
                        order_id, order.status
                    )));
                }
                if reservation.status != ReservationStatus::Seated {
                    return Err(EngineError::validation(format!(
                        "reservation {} is {}, orders need a seated party",
                        reservation.id, reservation.status
                    )));
                }

                let new_items = snapshot_items(conn, restaurant_id, order_id, &request.items).await?;
                diesel::insert_into(order_items::table)
                    .values(&new_items)
                    .execute(conn)
                    .await?;

                let items = load_items(conn, order_id).await?;
                let total = order_total(items.iter().map(|item| (&item.unit_price, item.quantity)));

                let order = diesel::update(
                    orders::table
                        .filter(orders::id.eq(order_id))
                        .filter(orders::status.eq(OrderStatus::Open)),
                )
                .set((
                    orders::total_amount.eq(total),
                    orders::updated_at.eq(Utc::now()),
                ))
                .get_result::<Order>(conn)
                .await
                .optional()?
                .ok_or_else(|| {
                    EngineError::conflict(format!("order {} was closed concurrently", order_id))
                })?;

                Ok(OrderWithItems { order, items })
            })
        })
        .await?;

    info!(
        order_id = %order_id,
        items = updated.items.len(),
        total = %updated.order.total_amount,
        "Order updated"
    );
    Ok(updated)
}

pub async fn finalize_order(
    conn: &mut AsyncPgConnection,
    order_id: Uuid,
    actor: &ActorContext,
) -> Result<Order, EngineError> {
    let restaurant_id = actor.restaurant_id;

    let order = conn
        .transaction::<_, EngineError, _>(|conn| {
            Box::pin(async move {
                let (order, _) = lock_order_in_scope(conn, order_id, restaurant_id).await?;
                let finalized = order.status.transition(OrderStatus::Finalized)?;

                diesel::update(
                    orders::table
                        .filter(orders::id.eq(order_id))
                        .filter(orders::status.eq(order.status)),
                )
                .set((orders::status.eq(finalized), orders::updated_at.eq(Utc::now())))
                .get_result::<Order>(conn)
                .await
                .optional()?
                .ok_or_else(|| {
                    EngineError::conflict(format!("order {} changed while finalizing", order_id))
                })
            })
        })
        .await?;

    info!(order_id = %order_id, total = %order.total_amount, "Order finalized");
    Ok(order)
}

pub async fn get_order(
    conn: &mut AsyncPgConnection,
    order_id: Uuid,
    actor: &ActorContext,
) -> Result<OrderWithItems, EngineError> {
    let (order, _) = load_order_in_scope(conn, order_id, actor.restaurant_id).await?;
    let items = load_items(conn, order_id).await?;
    Ok(OrderWithItems { order, items })
}
