use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use shared::*;
use tracing::info;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::*;
use crate::schema::*;
use crate::ActorContext;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookReservationRequest {
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: Option<String>,
    pub party_size: i32,
    pub reserved_for: DateTime<Utc>,
}

impl BookReservationRequest {
    fn validate(&self) -> Result<(), EngineError> {
        if self.guest_name.trim().is_empty() {
            return Err(EngineError::validation("guest name is required"));
        }
        if !self.guest_email.contains('@') {
            return Err(EngineError::validation(format!(
                "guest email {:?} is not an address",
                self.guest_email
            )));
        }
        if self.party_size < 1 {
            return Err(EngineError::validation("party size must be at least 1"));
        }
        Ok(())
    }
}

/// Loads a reservation, treating rows of other restaurants as missing.
pub(crate) async fn load_in_scope(
    conn: &mut AsyncPgConnection,
    reservation_id: Uuid,
    restaurant_id: Uuid,
) -> Result<Reservation, EngineError> {
    reservations::table
        .filter(reservations::id.eq(reservation_id))
        .filter(reservations::restaurant_id.eq(restaurant_id))
        .first::<Reservation>(conn)
        .await
        .optional()?
        .ok_or_else(|| EngineError::not_found("reservation", reservation_id))
}

pub async fn book_reservation(
    conn: &mut AsyncPgConnection,
    request: BookReservationRequest,
    actor: &ActorContext,
) -> Result<Reservation, EngineError> {
    request.validate()?;

    let new_reservation = NewReservation {
        id: Uuid::new_v4(),
        restaurant_id: actor.restaurant_id,
        guest_name: request.guest_name.trim().to_string(),
        guest_email: request.guest_email.trim().to_string(),
        guest_phone: request.guest_phone,
        party_size: request.party_size,
        reserved_for: request.reserved_for,
        status: ReservationStatus::Booked,
        created_by: actor.actor_id,
    };

    let reservation = diesel::insert_into(reservations::table)
        .values(&new_reservation)
        .get_result::<Reservation>(conn)
        .await?;

    info!(reservation_id = %reservation.id, party_size = reservation.party_size, "Reservation booked");
    Ok(reservation)
}

pub async fn get_reservation(
    conn: &mut AsyncPgConnection,
    reservation_id: Uuid,
    actor: &ActorContext,
) -> Result<Reservation, EngineError> {
    load_in_scope(conn, reservation_id, actor.restaurant_id).await
}

pub async fn cancel_reservation(
    conn: &mut AsyncPgConnection,
    reservation_id: Uuid,
    actor: &ActorContext,
) -> Result<Reservation, EngineError> {
    let restaurant_id = actor.restaurant_id;

    let cancelled = conn
        .transaction::<_, EngineError, _>(|conn| {
            Box::pin(async move {
                let reservation = load_in_scope(conn, reservation_id, restaurant_id).await?;
                let next = reservation.status.transition(ReservationStatus::Cancelled)?;

                diesel::update(
                    reservations::table
                        .filter(reservations::id.eq(reservation_id))
                        .filter(reservations::status.eq(reservation.status)),
                )
                .set((
                    reservations::status.eq(next),
                    reservations::updated_at.eq(Utc::now()),
                ))
                .get_result::<Reservation>(conn)
                .await
                .optional()?
                .ok_or_else(|| {
                    EngineError::conflict(format!(
                        "reservation {} changed while being cancelled",
                        reservation_id
                    ))
                })
            })
        })
        .await?;

    info!(reservation_id = %reservation_id, "Reservation cancelled");
    Ok(cancelled)
}

/// Deletes a reservation that never reached a table or was cancelled.
pub async fn remove_reservation(
    conn: &mut AsyncPgConnection,
    reservation_id: Uuid,
    actor: &ActorContext,
) -> Result<(), EngineError> {
    let restaurant_id = actor.restaurant_id;

    conn.transaction::<_, EngineError, _>(|conn| {
        Box::pin(async move {
            let reservation = load_in_scope(conn, reservation_id, restaurant_id).await?;
            if !matches!(
                reservation.status,
                ReservationStatus::Booked | ReservationStatus::Cancelled
            ) {
                return Err(EngineError::validation(format!(
                    "reservation {} is {} and can no longer be removed",
                    reservation_id, reservation.status
                )));
            }

            let removed = diesel::delete(
                reservations::table
                    .filter(reservations::id.eq(reservation_id))
                    .filter(reservations::status.eq(reservation.status)),
            )
            .execute(conn)
            .await?;

            if removed == 0 {
                return Err(EngineError::conflict(format!(
                    "reservation {} changed while being removed",
                    reservation_id
                )));
            }
            Ok(())
        })
    })
    .await?;

    info!(reservation_id = %reservation_id, "Reservation removed");
    Ok(())
}
