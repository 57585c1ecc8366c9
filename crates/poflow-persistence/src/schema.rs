//! Diesel schema (hand-written, as the teacher's own `schema.rs` is —
//! replaceable with `diesel print-schema` once real migrations run).
//!
//! `stages` on `workflows`, and `variants`/`images` on `product_drafts`, are
//! stored as `Jsonb` sub-documents rather than normalized out into their own
//! tables — the same shape `chem_persistence::schema`'s `payload: Jsonb`
//! columns use for `event_log`/`workflow_step_artifacts`. Each is a small,
//! always-whole-row-owned collection with no independent query pattern of
//! its own, so a join buys nothing a normalized row set wouldn't cost twice.

diesel::table! {
    workflows (id) {
        id -> Text,
        upload_id -> Text,
        merchant_id -> Text,
        status -> Text,
        current_stage -> Nullable<Text>,
        progress_percent -> SmallInt,
        stages -> Jsonb,
        purchase_order_id -> Nullable<Text>,
        error_message -> Nullable<Text>,
        failed_stage -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    suppliers (id) {
        id -> Text,
        merchant_id -> Text,
        name -> Text,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        website -> Nullable<Text>,
    }
}

diesel::table! {
    purchase_orders (id) {
        id -> Text,
        merchant_id -> Text,
        number -> Text,
        supplier_id -> Nullable<Text>,
        status -> Text,
        confidence -> Double,
        total_amount -> Double,
        currency -> Text,
        processing_notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        job_completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    line_items (id) {
        id -> Text,
        purchase_order_id -> Text,
        description -> Text,
        sku -> Nullable<Text>,
        quantity -> BigInt,
        unit_price -> Double,
        total_price -> Double,
        confidence -> Double,
    }
}

diesel::table! {
    sessions (id) {
        id -> Text,
        merchant_id -> Text,
        external_reference -> Nullable<Text>,
        created_at -> Timestamptz,
        expires_at -> Timestamptz,
    }
}

diesel::table! {
    product_drafts (id) {
        id -> Text,
        line_item_id -> Text,
        merchant_id -> Text,
        purchase_order_id -> Text,
        session_id -> Text,
        original_title -> Text,
        refined_title -> Nullable<Text>,
        original_price -> Double,
        price_refined -> Nullable<Double>,
        estimated_margin -> Nullable<Double>,
        status -> Text,
        variants -> Jsonb,
        images -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    workflows,
    suppliers,
    purchase_orders,
    line_items,
    sessions,
    product_drafts,
);

diesel::joinable!(purchase_orders -> suppliers (supplier_id));
diesel::joinable!(line_items -> purchase_orders (purchase_order_id));
