use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use shared::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::reservations)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: Option<String>,
    pub party_size: i32,
    pub reserved_for: DateTime<Utc>,
    pub status: ReservationStatus,
    pub table_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct NewReservation {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: Option<String>,
    pub party_size: i32,
    pub reserved_for: DateTime<Utc>,
    pub status: ReservationStatus,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::restaurant_tables)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantTable {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub label: String,
    pub capacity: i32,
    pub status: TableStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Tables are provisioned by restaurant administration; the engine only
/// flips their status.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::restaurant_tables)]
pub struct NewRestaurantTable {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub label: String,
    pub capacity: i32,
    pub status: TableStatus,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::menu_items)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    pub price: BigDecimal,
    pub item_status: MenuItemStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::menu_items)]
pub struct NewMenuItem {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    pub price: BigDecimal,
    pub item_status: MenuItemStatus,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::orders)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: BigDecimal,
    pub created_by: Uuid,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: BigDecimal,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::order_items)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::order_items)]
pub struct NewOrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::bills)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: Uuid,
    pub order_id: Uuid,
    pub reservation_id: Uuid,
    pub total_amount: BigDecimal,
    pub status: BillStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::bills)]
pub struct NewBill {
    pub id: Uuid,
    pub order_id: Uuid,
    pub reservation_id: Uuid,
    pub total_amount: BigDecimal,
    pub status: BillStatus,
}

#[derive(Debug, Clone, PartialEq, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::bill_items)]
#[serde(rename_all = "camelCase")]
pub struct BillItem {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub menu_item_id: Uuid,
    pub item_name: String,
    pub unit_price: BigDecimal,
    pub quantity: i32,
    pub line_total: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::payments)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub amount: BigDecimal,
    pub payment_method: String,
    pub status: PaymentStatus,
    pub created_by: Uuid,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::payments)]
pub struct NewPayment {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub amount: BigDecimal,
    pub payment_method: String,
    pub status: PaymentStatus,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillWithItems {
    #[serde(flatten)]
    pub bill: Bill,
    pub items: Vec<BillItem>,
}

/// Everything a settlement touched, as committed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub payment: Payment,
    pub bill: Bill,
    pub order: Order,
    pub reservation: Reservation,
    pub table: Option<RestaurantTable>,
}
