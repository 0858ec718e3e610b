diesel::table! {
    notifications (id) {
        id -> Uuid,
        template -> Varchar,
        medium -> Varchar,
        recipients -> Array<Text>,
        status -> Varchar,
        attempts -> Int4,
        last_error -> Nullable<Text>,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}
