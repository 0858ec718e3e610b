use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::*;
use tracing::info;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::*;
use crate::reservations::load_in_scope;
use crate::schema::*;
use crate::ActorContext;

/// Seats a reservation at a table.
///
/// Preconditions are checked in a fixed order, each with its own failure:
/// table in the actor's restaurant, reservation without a table, reservation
/// not completed, table available, enough seats. Both rows are then written
/// with status-guarded updates in the same transaction, so a concurrent
/// assignment that committed first turns into a `Conflict` here.
pub async fn assign_table(
    conn: &mut AsyncPgConnection,
    reservation_id: Uuid,
    table_id: Uuid,
    actor: &ActorContext,
) -> Result<(Reservation, RestaurantTable), EngineError> {
    let restaurant_id = actor.restaurant_id;

    let (reservation, table) = conn
        .transaction::<_, EngineError, _>(|conn| {
            Box::pin(async move {
                let table = restaurant_tables::table
                    .filter(restaurant_tables::id.eq(table_id))
                    .filter(restaurant_tables::restaurant_id.eq(restaurant_id))
                    .first::<RestaurantTable>(conn)
                    .await
                    .optional()?
                    .ok_or_else(|| EngineError::not_found("table", table_id))?;

                let reservation = load_in_scope(conn, reservation_id, restaurant_id).await?;

                check_assignment(&reservation, &table)?;
                let seated = reservation.status.transition(ReservationStatus::Seated)?;
                let occupied = table.status.transition(TableStatus::Occupied)?;
                let now = Utc::now();

                let reservation = diesel::update(
                    reservations::table
                        .filter(reservations::id.eq(reservation_id))
                        .filter(reservations::status.eq(reservation.status))
                        .filter(reservations::table_id.is_null()),
                )
                .set((
                    reservations::table_id.eq(Some(table_id)),
                    reservations::status.eq(seated),
                    reservations::updated_at.eq(now),
                ))
                .get_result::<Reservation>(conn)
                .await
                .optional()?
                .ok_or_else(|| {
                    EngineError::conflict(format!(
                        "reservation {} was modified concurrently",
                        reservation_id
                    ))
                })?;

                let table = diesel::update(
                    restaurant_tables::table
                        .filter(restaurant_tables::id.eq(table_id))
                        .filter(restaurant_tables::status.eq(TableStatus::Available)),
                )
                .set((
                    restaurant_tables::status.eq(occupied),
                    restaurant_tables::updated_at.eq(now),
                ))
                .get_result::<RestaurantTable>(conn)
                .await
                .optional()?
                .ok_or_else(|| {
                    EngineError::conflict(format!("table {} was taken concurrently", table_id))
                })?;

                Ok((reservation, table))
            })
        })
        .await?;

    info!(
        reservation_id = %reservation.id,
        table_id = %table.id,
        party_size = reservation.party_size,
        "Table assigned"
    );
    Ok((reservation, table))
}

/// Ordered precondition checks once both rows are known to exist.
fn check_assignment(reservation: &Reservation, table: &RestaurantTable) -> Result<(), EngineError> {
    if let Some(current) = reservation.table_id {
        return Err(EngineError::conflict(format!(
            "reservation {} is already assigned to table {}",
            reservation.id, current
        )));
    }
    if reservation.status == ReservationStatus::Completed {
        return Err(EngineError::validation(format!(
            "reservation {} is already completed",
            reservation.id
        )));
    }
    if table.status != TableStatus::Available {
        return Err(EngineError::conflict(format!(
            "table {} is {}",
            table.label, table.status
        )));
    }
    if table.capacity < reservation.party_size {
        return Err(EngineError::validation(format!(
            "table {} seats {} but the party has {}",
            table.label, table.capacity, reservation.party_size
        )));
    }
    Ok(())
}
