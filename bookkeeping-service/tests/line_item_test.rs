//! Line item amount and invoice recalculation integration tests.

mod common;

use common::{dec_of, id_of, TestApp};
use reqwest::StatusCode;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

async fn eur_invoice(app: &TestApp) -> Uuid {
    let body = app
        .post_json(
            "/api/invoices",
            json!({ "title": "Berlin trip", "currency": "eur" }),
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(body["currency"], "EUR");
    id_of(&body, "invoice_id")
}

async fn add_item(app: &TestApp, invoice_id: Uuid, body: Value) -> Value {
    app.post_json(
        &format!("/api/invoices/{}/items", invoice_id),
        body,
        StatusCode::CREATED,
    )
    .await
}

async fn update_item(app: &TestApp, invoice_id: Uuid, item_id: Uuid, body: Value) -> Value {
    let response = app
        .put(
            &format!("/api/invoices/{}/items/{}", invoice_id, item_id),
            body,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.expect("Failed to parse JSON")
}

#[tokio::test]
async fn foreign_currency_item_is_normalized_at_market_rate() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };

    let invoice_id = eur_invoice(&app).await;
    let item = add_item(
        &app,
        invoice_id,
        json!({ "description": "Hotel", "quantity": "2", "unit_price": "15" }),
    )
    .await;

    assert_eq!(dec_of(&item, "amount"), dec!(30));
    assert_eq!(item["target_currency"], "USD");
    assert_eq!(dec_of(&item, "target_amount"), dec!(33));
    assert_eq!(dec_of(&item, "fx_rate_used"), dec!(1.1));
    assert_eq!(item["target_amount_overridden"], false);

    let invoice = app
        .get_json(&format!("/api/invoices/{}", invoice_id))
        .await;
    assert_eq!(dec_of(&invoice, "amount"), dec!(30));
    assert_eq!(dec_of(&invoice, "target_total"), dec!(33));
    assert_eq!(invoice["items"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn same_currency_item_uses_identity_rate() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };

    let body = app
        .post_json(
            "/api/invoices",
            json!({ "title": "Office supplies" }),
            StatusCode::CREATED,
        )
        .await;
    let invoice_id = id_of(&body, "invoice_id");

    let item = add_item(
        &app,
        invoice_id,
        json!({ "description": "Paper", "unit_price": "42.10" }),
    )
    .await;

    assert_eq!(dec_of(&item, "target_amount"), dec!(42.10));
    assert_eq!(dec_of(&item, "fx_rate_used"), dec!(1));
}

#[tokio::test]
async fn manual_override_survives_unrelated_edits_until_recalculated() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };

    let invoice_id = eur_invoice(&app).await;
    let item = add_item(
        &app,
        invoice_id,
        json!({ "description": "Dinner", "unit_price": "30" }),
    )
    .await;
    let item_id = id_of(&item, "item_id");

    let overridden = update_item(&app, invoice_id, item_id, json!({ "target_amount": "40" })).await;
    assert_eq!(dec_of(&overridden, "target_amount"), dec!(40));
    assert_eq!(overridden["target_amount_overridden"], true);
    assert_eq!(dec_of(&overridden, "amount"), dec!(30));

    let renamed = update_item(
        &app,
        invoice_id,
        item_id,
        json!({ "description": "Team dinner" }),
    )
    .await;
    assert_eq!(renamed["description"], "Team dinner");
    assert_eq!(dec_of(&renamed, "target_amount"), dec!(40));
    assert_eq!(renamed["target_amount_overridden"], true);

    let response = app
        .post(
            &format!("/api/invoices/{}/recalculate", invoice_id),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let recalculated: Value = response.json().await.expect("Failed to parse JSON");

    assert_eq!(dec_of(&recalculated, "target_total"), dec!(33));
    let items = recalculated["items"].as_array().expect("Missing items");
    assert_eq!(items.len(), 1);
    assert_eq!(dec_of(&items[0], "target_amount"), dec!(33));
    assert_eq!(items[0]["target_amount_overridden"], false);
}

#[tokio::test]
async fn quantity_change_drops_a_stale_override() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };

    let invoice_id = eur_invoice(&app).await;
    let item = add_item(
        &app,
        invoice_id,
        json!({ "description": "Taxi", "unit_price": "10", "target_amount": "12" }),
    )
    .await;
    assert_eq!(item["target_amount_overridden"], true);
    let item_id = id_of(&item, "item_id");

    let updated = update_item(&app, invoice_id, item_id, json!({ "quantity": "3" })).await;
    assert_eq!(dec_of(&updated, "amount"), dec!(30));
    assert_eq!(dec_of(&updated, "target_amount"), dec!(33));
    assert_eq!(updated["target_amount_overridden"], false);
}

#[tokio::test]
async fn auto_calculate_wins_over_a_supplied_target_amount() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };

    let invoice_id = eur_invoice(&app).await;
    let item = add_item(
        &app,
        invoice_id,
        json!({
            "description": "Train",
            "unit_price": "20",
            "target_amount": "99",
            "auto_calculate_target_currency": true
        }),
    )
    .await;

    assert_eq!(dec_of(&item, "target_amount"), dec!(22));
    assert_eq!(item["target_amount_overridden"], false);
}

#[tokio::test]
async fn invalid_item_input_is_rejected() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };

    let invoice_id = eur_invoice(&app).await;

    let response = app
        .post(
            &format!("/api/invoices/{}/items", invoice_id),
            json!({ "description": "Refund", "unit_price": "10", "target_amount": "-5" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post(
            &format!("/api/invoices/{}/items", invoice_id),
            json!({ "description": "Fees", "unit_price": "10", "target_currency": "DOLLARS" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post(
            &format!("/api/invoices/{}/items", Uuid::new_v4()),
            json!({ "description": "Ghost", "unit_price": "1" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_change_moves_invoice_between_buckets() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };

    let invoice_id = app.create_invoice_with_amount(json!({}), "70").await;

    let response = app
        .patch(
            &format!("/api/invoices/{}/status", invoice_id),
            json!({ "status": "paid" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let invoice: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(invoice["status"], "paid");

    let summary = app.get_json("/api/analytics/summary").await;
    assert_eq!(dec_of(&summary, "paid_amount"), dec!(70));
    assert_eq!(dec_of(&summary, "unpaid_amount"), dec!(0));
}
