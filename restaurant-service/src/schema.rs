diesel::table! {
    bill_items (id) {
        id -> Uuid,
        bill_id -> Uuid,
        menu_item_id -> Uuid,
        item_name -> Varchar,
        unit_price -> Numeric,
        quantity -> Int4,
        line_total -> Numeric,
    }
}

diesel::table! {
    bills (id) {
        id -> Uuid,
        order_id -> Uuid,
        reservation_id -> Uuid,
        total_amount -> Numeric,
        status -> Varchar,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    menu_items (id) {
        id -> Uuid,
        restaurant_id -> Uuid,
        name -> Varchar,
        price -> Numeric,
        item_status -> Varchar,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    order_items (id) {
        id -> Uuid,
        order_id -> Uuid,
        menu_item_id -> Uuid,
        quantity -> Int4,
        unit_price -> Numeric,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    orders (id) {
        id -> Uuid,
        reservation_id -> Uuid,
        status -> Varchar,
        total_amount -> Numeric,
        created_by -> Uuid,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    payments (id) {
        id -> Uuid,
        bill_id -> Uuid,
        amount -> Numeric,
        payment_method -> Varchar,
        status -> Varchar,
        created_by -> Uuid,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    reservations (id) {
        id -> Uuid,
        restaurant_id -> Uuid,
        guest_name -> Varchar,
        guest_email -> Varchar,
        guest_phone -> Nullable<Varchar>,
        party_size -> Int4,
        reserved_for -> Timestamptz,
        status -> Varchar,
        table_id -> Nullable<Uuid>,
        created_by -> Uuid,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    restaurant_tables (id) {
        id -> Uuid,
        restaurant_id -> Uuid,
        label -> Varchar,
        capacity -> Int4,
        status -> Varchar,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(bill_items -> bills (bill_id));
diesel::joinable!(bills -> orders (order_id));
diesel::joinable!(order_items -> orders (order_id));
diesel::joinable!(orders -> reservations (reservation_id));
diesel::joinable!(payments -> bills (bill_id));

diesel::allow_tables_to_appear_in_same_query!(
    bill_items,
    bills,
    menu_items,
    order_items,
    orders,
    payments,
    reservations,
    restaurant_tables,
);
