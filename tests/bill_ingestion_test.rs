mod common;

use std::{str::FromStr, time::Duration};

use axum::http::{Method, StatusCode};
use profitpilot_api::auth::HandoffTokenIssuer;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, ResponseTemplate,
};

use common::{body_json, sales_invoice, TestApp, PDF_BYTES, USER_EMAIL, USER_ID, WEBHOOK_PATH};

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected a decimal, got {other}"),
    }
}

#[tokio::test]
async fn sales_upload_is_stored_extracted_and_persisted() {
    let app = TestApp::new().await;
    app.mock_extraction(sales_invoice()).await;

    let response = app
        .upload(
            Some(common::USER_TOKEN),
            Some(("april-invoice.pdf", "application/pdf", PDF_BYTES)),
            Some("sales"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["message"], "Bill processed successfully");
    assert_eq!(body["data"]["invoiceNumber"], "INV/2025/0042");
    assert_eq!(body["data"]["invoiceDate"], "2025-04-15");
    assert_eq!(decimal(&body["data"]["totalAmount"]), dec!(1180));
    assert_eq!(decimal(&body["data"]["gstAmount"]), dec!(180));
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(2));
    let bill_id = body["billId"].as_str().expect("bill id").to_string();

    assert_eq!(app.storage.uploads(), 1);

    let response = app
        .request_authenticated(Method::GET, &format!("/api/bills/{bill_id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let stored = body_json(response).await;
    let bill = &stored["data"];
    assert_eq!(bill["user_id"], USER_ID);
    assert_eq!(bill["transaction_type"], "sales");
    assert_eq!(bill["status"], "processed");
    assert_eq!(bill["seller_name"], "Asha Traders");
    assert_eq!(bill["buyer_gstin"], "29PQRSX6789K1Z2");
    assert_eq!(bill["category"], "groceries");
    assert_eq!(decimal(&bill["total_amount"]), dec!(1180));
    assert_eq!(decimal(&bill["gst_amount"]), dec!(180));
    assert_eq!(bill["raw_data"], sales_invoice());

    let items = bill["items"].as_array().expect("items embedded");
    let mut amounts: Vec<Decimal> = items.iter().map(|i| decimal(&i["amount"])).collect();
    amounts.sort();
    assert_eq!(amounts, vec![dec!(180), dec!(1000)]);
}

#[tokio::test]
async fn item_amounts_are_recomputed_from_quantity_and_price() {
    let app = TestApp::new().await;
    app.mock_extraction(sales_invoice()).await;

    let body = body_json(
        app.upload(
            Some(common::USER_TOKEN),
            Some(("bill.pdf", "application/pdf", PDF_BYTES)),
            None,
        )
        .await,
    )
    .await;

    let rice = body["data"]["items"]
        .as_array()
        .and_then(|items| items.iter().find(|i| i["description"] == "Basmati rice 25kg"))
        .expect("rice line")
        .clone();
    // extraction reported 999
    assert_eq!(decimal(&rice["amount"]), dec!(1000));

    let freight = body["data"]["items"]
        .as_array()
        .and_then(|items| items.iter().find(|i| i["description"] == "Freight"))
        .expect("freight line")
        .clone();
    assert_eq!(decimal(&freight["amount"]), dec!(180));
    assert_eq!(freight["category"], "uncategorized");
    assert_eq!(decimal(&freight["gstRate"]), Decimal::ZERO);
}

#[tokio::test]
async fn bill_type_defaults_to_purchase() {
    let app = TestApp::new().await;
    app.mock_extraction(sales_invoice()).await;

    let body = body_json(
        app.upload(
            Some(common::USER_TOKEN),
            Some(("bill.png", "image/png", b"\x89PNG\r\n\x1a\nfake")),
            None,
        )
        .await,
    )
    .await;
    let bill_id = body["billId"].as_str().expect("bill id");

    let stored = body_json(
        app.request_authenticated(Method::GET, &format!("/api/bills/{bill_id}"), None)
            .await,
    )
    .await;
    assert_eq!(stored["data"]["transaction_type"], "purchase");
    assert_eq!(stored["data"]["content_type"], "image/png");
}

#[tokio::test]
async fn wrapped_extraction_response_is_accepted() {
    let app = TestApp::new().await;
    app.mock_extraction(json!({ "output": sales_invoice() })).await;

    let response = app
        .upload(
            Some(common::USER_TOKEN),
            Some(("bill.pdf", "application/pdf", PDF_BYTES)),
            Some("purchase"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["seller"]["name"], "Asha Traders");
    assert_eq!(decimal(&body["data"]["totalAmount"]), dec!(1180));
}

#[tokio::test]
async fn missing_fields_fall_back_to_defaults() {
    let app = TestApp::new().await;
    app.mock_extraction(json!({ "totalAmount": "590.50" })).await;

    let response = app
        .upload(
            Some(common::USER_TOKEN),
            Some(("sparse.pdf", "application/pdf", PDF_BYTES)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let data = &body["data"];
    assert_eq!(data["invoiceNumber"], "");
    assert_eq!(data["seller"]["name"], "");
    assert_eq!(data["buyer"]["gstin"], "");
    assert_eq!(data["category"], "uncategorized");
    assert_eq!(decimal(&data["totalAmount"]), dec!(590.50));
    assert_eq!(decimal(&data["gstAmount"]), Decimal::ZERO);
    assert_eq!(data["items"], json!([]));
    assert_eq!(
        data["invoiceDate"],
        chrono::Utc::now().date_naive().to_string()
    );
}

#[tokio::test]
async fn non_object_extraction_response_fails_without_persisting() {
    let app = TestApp::new().await;
    app.mock_extraction(json!(["not", "a", "bill"])).await;

    let response = app
        .upload(
            Some(common::USER_TOKEN),
            Some(("bill.pdf", "application/pdf", PDF_BYTES)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let list = body_json(app.request_authenticated(Method::GET, "/api/bills", None).await).await;
    assert_eq!(list["data"], json!([]));
}

#[tokio::test]
async fn overflowing_item_amount_fails_without_persisting() {
    let app = TestApp::new().await;
    app.mock_extraction(json!({
        "totalAmount": 100,
        "items": [{ "quantity": "10000000000000000", "unitPrice": "10000000000000000" }]
    }))
    .await;

    let response = app
        .upload(
            Some(common::USER_TOKEN),
            Some(("bill.pdf", "application/pdf", PDF_BYTES)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Internal server error");

    let list = body_json(app.request_authenticated(Method::GET, "/api/bills", None).await).await;
    assert_eq!(list["data"], json!([]));
}

#[tokio::test]
async fn oversized_upload_is_rejected_before_storage_and_extraction() {
    let app = TestApp::new().await;
    Mock::given(method("POST"))
        .and(path(WEBHOOK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(sales_invoice()))
        .expect(0)
        .mount(&app.n8n)
        .await;

    let limit = app.state.config.max_upload_bytes;
    // just over the file ceiling, then past the request body limit as well
    for size in [limit + 1, app.state.config.upload_body_limit() + 1] {
        let mut bytes = PDF_BYTES.to_vec();
        bytes.resize(size, b'0');

        let response = app
            .upload(
                Some(common::USER_TOKEN),
                Some(("scan.pdf", "application/pdf", &bytes)),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "size={size}");
    }

    assert_eq!(app.storage.uploads(), 0);
    assert_eq!(app.storage.object_count().await, 0);
}

#[tokio::test]
async fn unsupported_file_type_is_rejected_before_storage_and_extraction() {
    let app = TestApp::new().await;
    Mock::given(method("POST"))
        .and(path(WEBHOOK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(sales_invoice()))
        .expect(0)
        .mount(&app.n8n)
        .await;

    let response = app
        .upload(
            Some(common::USER_TOKEN),
            Some(("notes.txt", "text/plain", b"just some notes")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap_or_default()
        .contains("text/plain"));

    assert_eq!(app.storage.uploads(), 0);
    assert_eq!(app.storage.object_count().await, 0);
}

#[tokio::test]
async fn upload_without_file_is_a_bad_request() {
    let app = TestApp::new().await;

    let response = app
        .upload(Some(common::USER_TOKEN), None, Some("sales"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap_or_default()
        .contains("No file uploaded"));
    assert_eq!(app.storage.uploads(), 0);
}

#[tokio::test]
async fn empty_file_is_a_bad_request() {
    let app = TestApp::new().await;

    let response = app
        .upload(
            Some(common::USER_TOKEN),
            Some(("empty.pdf", "application/pdf", b"")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.storage.uploads(), 0);
}

#[tokio::test]
async fn unknown_bill_type_is_a_bad_request() {
    let app = TestApp::new().await;

    let response = app
        .upload(
            Some(common::USER_TOKEN),
            Some(("bill.pdf", "application/pdf", PDF_BYTES)),
            Some("refund"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.storage.uploads(), 0);
}

#[tokio::test]
async fn extraction_timeout_fails_once_and_persists_nothing() {
    let app = TestApp::with_extraction_timeout(Duration::from_millis(200)).await;
    Mock::given(method("POST"))
        .and(path(WEBHOOK_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(sales_invoice())
                .set_delay(Duration::from_secs(3)),
        )
        .expect(1)
        .mount(&app.n8n)
        .await;

    let response = app
        .upload(
            Some(common::USER_TOKEN),
            Some(("slow.pdf", "application/pdf", PDF_BYTES)),
            Some("sales"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Internal server error");

    let list = body_json(app.request_authenticated(Method::GET, "/api/bills", None).await).await;
    assert_eq!(list["data"], json!([]));
    // the file stays in storage
    assert_eq!(app.storage.object_count().await, 1);
}

#[tokio::test]
async fn workflow_rejection_is_an_internal_error() {
    let app = TestApp::new().await;
    Mock::given(method("POST"))
        .and(path(WEBHOOK_PATH))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&app.n8n)
        .await;

    let response = app
        .upload(
            Some(common::USER_TOKEN),
            Some(("bill.pdf", "application/pdf", PDF_BYTES)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn workflow_receives_file_reference_and_handoff_token() {
    let app = TestApp::new().await;
    app.mock_extraction(sales_invoice()).await;

    let response = app
        .upload(
            Some(common::USER_TOKEN),
            Some(("handoff check.pdf", "application/pdf", PDF_BYTES)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let requests = app.n8n.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let payload: Value = serde_json::from_slice(&request.body).expect("json payload");
    let object_key = payload["fileName"].as_str().expect("file name");
    assert!(object_key.starts_with(&format!("{USER_ID}/")));
    assert!(object_key.ends_with("_handoff_check.pdf"));
    assert_eq!(payload["fileType"], "application/pdf");
    assert_eq!(payload["userId"], USER_ID);
    assert_eq!(payload["userEmail"], USER_EMAIL);
    let file_url = payload["fileUrl"].as_str().expect("file url");
    assert!(file_url.starts_with("memory://"));
    assert!(file_url.ends_with("handoff_check.pdf"));

    let token = request
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .expect("bearer token")
        .to_string();
    let issuer = HandoffTokenIssuer::from_config(&app.state.config).expect("issuer");
    let claims = issuer.verify(&token).expect("token verifies");
    assert_eq!(claims.sub, USER_ID);
    assert_eq!(claims.file_name, object_key);
    assert_eq!(claims.file_url, file_url);
}

#[tokio::test]
async fn repeated_uploads_create_distinct_bills() {
    let app = TestApp::new().await;
    app.mock_extraction(sales_invoice()).await;

    for _ in 0..2 {
        let response = app
            .upload(
                Some(common::USER_TOKEN),
                Some(("same.pdf", "application/pdf", PDF_BYTES)),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let list = body_json(app.request_authenticated(Method::GET, "/api/bills", None).await).await;
    assert_eq!(list["data"].as_array().map(Vec::len), Some(2));
    assert_eq!(app.storage.object_count().await, 2);
}
