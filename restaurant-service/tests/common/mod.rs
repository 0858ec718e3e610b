//! Shared fixtures for the workflow integration tests.
//!
//! Tests run against the Postgres named by `TEST_DATABASE_URL` and skip when
//! it is not set. Each fixture works inside its own freshly generated
//! restaurant id, so tests never see each other's rows.

#![allow(dead_code)]

use bigdecimal::BigDecimal;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use restaurant_service::assignment::assign_table;
use restaurant_service::models::*;
use restaurant_service::reservations::{book_reservation, BookReservationRequest};
use restaurant_service::schema::*;
use restaurant_service::ActorContext;
use shared::*;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

static MIGRATED: OnceLock<()> = OnceLock::new();

/// Skip test if the database URL is not set
macro_rules! skip_if_no_db {
    () => {
        match common::Fixture::new().await {
            Some(fixture) => fixture,
            None => {
                eprintln!("Skipping test: TEST_DATABASE_URL not set");
                return;
            }
        }
    };
}

pub fn money(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

pub struct Fixture {
    pub conn: AsyncPgConnection,
    pub actor: ActorContext,
    database_url: String,
}

impl Fixture {
    pub async fn new() -> Option<Self> {
        let database_url = std::env::var("TEST_DATABASE_URL").ok()?;
        MIGRATED.get_or_init(|| {
            restaurant_service::run_migrations(&database_url).expect("Failed to run migrations");
        });

        let conn = AsyncPgConnection::establish(&database_url)
            .await
            .expect("Failed to connect to test database");
        Some(Self {
            conn,
            database_url,
            actor: ActorContext {
                actor_id: Uuid::new_v4(),
                restaurant_id: Uuid::new_v4(),
            },
        })
    }

    /// A second session on the test database, for racing the fixture's own.
    pub async fn connect(&self) -> AsyncPgConnection {
        AsyncPgConnection::establish(&self.database_url)
            .await
            .expect("Failed to connect to test database")
    }

    /// Makes every UPDATE of row `id` in `table` raise until
    /// [`Fixture::clear_fault`] is called with the returned name.
    pub async fn fail_updates_on(&mut self, table: &str, id: Uuid) -> String {
        let name = format!("fail_update_{}", id.simple());
        diesel::sql_query(format!(
            "CREATE FUNCTION {name}() RETURNS trigger AS $$ \
             BEGIN RAISE EXCEPTION 'injected failure on {table}'; END; $$ LANGUAGE plpgsql"
        ))
        .execute(&mut self.conn)
        .await
        .expect("Failed to create fault function");
        diesel::sql_query(format!(
            "CREATE TRIGGER {name} BEFORE UPDATE ON {table} \
             FOR EACH ROW WHEN (NEW.id = '{id}') EXECUTE FUNCTION {name}()"
        ))
        .execute(&mut self.conn)
        .await
        .expect("Failed to create fault trigger");
        name
    }

    pub async fn clear_fault(&mut self, table: &str, name: &str) {
        diesel::sql_query(format!("DROP TRIGGER {name} ON {table}"))
            .execute(&mut self.conn)
            .await
            .expect("Failed to drop fault trigger");
        diesel::sql_query(format!("DROP FUNCTION {name}()"))
            .execute(&mut self.conn)
            .await
            .expect("Failed to drop fault function");
    }

    /// Same restaurant, different staff member.
    pub fn colleague(&self) -> ActorContext {
        ActorContext {
            actor_id: Uuid::new_v4(),
            restaurant_id: self.actor.restaurant_id,
        }
    }

    pub fn outsider(&self) -> ActorContext {
        ActorContext {
            actor_id: Uuid::new_v4(),
            restaurant_id: Uuid::new_v4(),
        }
    }

    pub async fn table(&mut self, capacity: i32) -> RestaurantTable {
        diesel::insert_into(restaurant_tables::table)
            .values(&NewRestaurantTable {
                id: Uuid::new_v4(),
                restaurant_id: self.actor.restaurant_id,
                label: format!("T{}", capacity),
                capacity,
                status: TableStatus::Available,
            })
            .get_result::<RestaurantTable>(&mut self.conn)
            .await
            .expect("Failed to create table")
    }

    pub async fn menu_item(&mut self, name: &str, price: &str) -> MenuItem {
        diesel::insert_into(menu_items::table)
            .values(&NewMenuItem {
                id: Uuid::new_v4(),
                restaurant_id: self.actor.restaurant_id,
                name: name.to_string(),
                price: money(price),
                item_status: MenuItemStatus::Available,
            })
            .get_result::<MenuItem>(&mut self.conn)
            .await
            .expect("Failed to create menu item")
    }

    pub async fn set_price(&mut self, menu_item_id: Uuid, price: &str) {
        diesel::update(menu_items::table.find(menu_item_id))
            .set(menu_items::price.eq(money(price)))
            .execute(&mut self.conn)
            .await
            .expect("Failed to change price");
    }

    pub async fn booking(&mut self, party_size: i32) -> Reservation {
        let request = BookReservationRequest {
            guest_name: "Ada Lovelace".to_string(),
            guest_email: "ada@example.com".to_string(),
            guest_phone: None,
            party_size,
            reserved_for: chrono::Utc::now(),
        };
        let actor = self.actor;
        book_reservation(&mut self.conn, request, &actor)
            .await
            .expect("Failed to book reservation")
    }

    /// A booked party seated at a fresh table of the same size.
    pub async fn seated(&mut self, party_size: i32) -> (Reservation, RestaurantTable) {
        let reservation = self.booking(party_size).await;
        let table = self.table(party_size).await;
        let actor = self.actor;
        assign_table(&mut self.conn, reservation.id, table.id, &actor)
            .await
            .expect("Failed to seat reservation")
    }

    pub async fn reload_reservation(&mut self, id: Uuid) -> Reservation {
        reservations::table
            .find(id)
            .first::<Reservation>(&mut self.conn)
            .await
            .expect("reservation row")
    }

    pub async fn reload_table(&mut self, id: Uuid) -> RestaurantTable {
        restaurant_tables::table
            .find(id)
            .first::<RestaurantTable>(&mut self.conn)
            .await
            .expect("table row")
    }

    pub async fn reload_order(&mut self, id: Uuid) -> Order {
        orders::table
            .find(id)
            .first::<Order>(&mut self.conn)
            .await
            .expect("order row")
    }

    pub async fn reload_bill(&mut self, id: Uuid) -> Bill {
        bills::table
            .find(id)
            .first::<Bill>(&mut self.conn)
            .await
            .expect("bill row")
    }

    pub async fn item_rows(&mut self, order_id: Uuid) -> Vec<OrderItem> {
        order_items::table
            .filter(order_items::order_id.eq(order_id))
            .load::<OrderItem>(&mut self.conn)
            .await
            .expect("order item rows")
    }

    pub async fn payment_count(&mut self, bill_id: Uuid) -> i64 {
        payments::table
            .filter(payments::bill_id.eq(bill_id))
            .count()
            .get_result::<i64>(&mut self.conn)
            .await
            .expect("payment count")
    }

    pub async fn order_count(&mut self, reservation_id: Uuid) -> i64 {
        orders::table
            .filter(orders::reservation_id.eq(reservation_id))
            .count()
            .get_result::<i64>(&mut self.conn)
            .await
            .expect("order count")
    }
}
