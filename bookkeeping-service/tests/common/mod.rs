//! Common test utilities for bookkeeping-service integration tests.
//!
//! Tests need a Postgres database in `TEST_DATABASE_URL`; without it every
//! integration test returns early. Each test acts as a fresh random user, so
//! tests share one database without stepping on each other.

use bookkeeping_service::config::{BookkeepingConfig, DatabaseConfig, FxConfig};
use bookkeeping_service::middleware::user_id::USER_ID_HEADER;
use bookkeeping_service::startup::Application;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use service_core::config::Config as CommonConfig;
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Once;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,bookkeeping_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config(database_url: String, fx_url: String) -> BookkeepingConfig {
    BookkeepingConfig {
        common: CommonConfig {
            port: 0,
            ..CommonConfig::default()
        },
        service_name: "bookkeeping-service-test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url,
            max_connections: 4,
            min_connections: 1,
        },
        fx: FxConfig {
            api_url: fx_url,
            timeout: Duration::from_secs(2),
            cache_ttl: Duration::from_secs(3600),
            reporting_currency: "USD".to_string(),
        },
    }
}

/// Serve fixed rates for the pairs the tests use.
async fn mount_rates(server: &MockServer) {
    for (base, symbol, rate) in [("EUR", "USD", 1.1), ("GBP", "USD", 1.25)] {
        let mut rates = serde_json::Map::new();
        rates.insert(symbol.to_string(), json!(rate));

        Mock::given(method("GET"))
            .and(path("/latest"))
            .and(query_param("base", base))
            .and(query_param("symbols", symbol))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "amount": 1.0,
                "base": base,
                "date": "2025-04-30",
                "rates": rates
            })))
            .mount(server)
            .await;
    }
}

/// Test application wrapper.
#[allow(dead_code)]
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub user_id: Uuid,
    pub pool: PgPool,
    pub client: Client,
    pub fx_server: MockServer,
}

#[allow(dead_code)]
impl TestApp {
    /// Spawn the service against `TEST_DATABASE_URL` and a mock rates API.
    /// Returns `None` when no test database is configured.
    pub async fn spawn() -> Option<Self> {
        let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set, skipping integration test");
            return None;
        };

        init_tracing();

        let fx_server = MockServer::start().await;
        mount_rates(&fx_server).await;

        let app = Application::build(test_config(database_url, fx_server.uri()))
            .await
            .expect("Failed to build application");

        let port = app.port();
        let pool = app.db().pool().clone();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = Client::new();
        let mut attempts = 0;
        loop {
            match client.get(format!("{}/health", address)).send().await {
                Ok(response) if response.status().is_success() => break,
                _ if attempts < 20 => {
                    attempts += 1;
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                _ => panic!("Service did not become healthy after 20 attempts"),
            }
        }

        Some(Self {
            address,
            port,
            user_id: Uuid::new_v4(),
            pool,
            client,
            fx_server,
        })
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .header(USER_ID_HEADER, self.user_id.to_string())
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, body: Value) -> Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .header(USER_ID_HEADER, self.user_id.to_string())
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put(&self, path: &str, body: Value) -> Response {
        self.client
            .put(format!("{}{}", self.address, path))
            .header(USER_ID_HEADER, self.user_id.to_string())
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn patch(&self, path: &str, body: Value) -> Response {
        self.client
            .patch(format!("{}{}", self.address, path))
            .header(USER_ID_HEADER, self.user_id.to_string())
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.client
            .delete(format!("{}{}", self.address, path))
            .header(USER_ID_HEADER, self.user_id.to_string())
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// POST and return the JSON body, asserting the expected status.
    pub async fn post_json(&self, path: &str, body: Value, expected: StatusCode) -> Value {
        let response = self.post(path, body).await;
        assert_eq!(response.status(), expected, "POST {}", path);
        response.json().await.expect("Failed to parse JSON")
    }

    pub async fn get_json(&self, path: &str) -> Value {
        let response = self.get(path).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {}", path);
        response.json().await.expect("Failed to parse JSON")
    }

    pub async fn create_receiver(&self, name: &str) -> Uuid {
        let body = self
            .post_json(
                "/api/receivers",
                json!({ "name": name }),
                StatusCode::CREATED,
            )
            .await;
        id_of(&body, "receiver_id")
    }

    pub async fn create_label(&self, kind: &str, name: &str) -> Uuid {
        let body = self
            .post_json(
                &format!("/api/{}", kind),
                json!({ "name": name }),
                StatusCode::CREATED,
            )
            .await;
        let key = match kind {
            "categories" => "category_id",
            "companies" => "company_id",
            _ => "tag_id",
        };
        id_of(&body, key)
    }

    /// Create an invoice from a JSON body and give it one item worth `amount`
    /// in the invoice currency.
    pub async fn create_invoice_with_amount(&self, mut invoice: Value, amount: &str) -> Uuid {
        if invoice.get("title").is_none() {
            invoice["title"] = json!("Test invoice");
        }
        let body = self
            .post_json("/api/invoices", invoice, StatusCode::CREATED)
            .await;
        let invoice_id = id_of(&body, "invoice_id");

        self.post_json(
            &format!("/api/invoices/{}/items", invoice_id),
            json!({ "description": "Line", "unit_price": amount }),
            StatusCode::CREATED,
        )
        .await;

        invoice_id
    }
}

#[allow(dead_code)]
pub fn id_of(body: &Value, key: &str) -> Uuid {
    body[key]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(|| panic!("Missing {} in {}", key, body))
}

/// Read a decimal field that may be serialized as a string or a number.
#[allow(dead_code)]
pub fn dec_of(body: &Value, key: &str) -> Decimal {
    match &body[key] {
        Value::String(s) => Decimal::from_str(s).expect("Invalid decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("Invalid decimal number"),
        other => panic!("Field {} is not a decimal: {}", key, other),
    }
}
