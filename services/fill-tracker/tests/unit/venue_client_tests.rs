//! Venue clients exercised against a local mock HTTP server

use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fill_tracker::cache::FillSource;
use fill_tracker::config::{OkxConfig, SnowtraceConfig};
use fill_tracker::venues::InternalTransferSource;
use fill_tracker::venues::okx::{OkxClient, OkxFillRecord};
use fill_tracker::venues::snowtrace::{SnowtraceClient, TokenTransfer};

fn okx_client(server: &MockServer) -> OkxClient {
    OkxClient::new(
        OkxConfig {
            api_key: "test-key".to_string(),
            secret: "test-secret".to_string(),
            passphrase: "test-passphrase".to_string(),
            api_url: server.uri(),
        },
        "AVAX/USDT",
    )
}

fn snowtrace_client(server: &MockServer) -> SnowtraceClient {
    SnowtraceClient::new(SnowtraceConfig {
        api_key: "test-key".to_string(),
        api_url: format!("{}/api", server.uri()),
        usdt_contract: "0x9702230a8ea53601f5cd2dc00fdbc13d4df4a8c7".to_string(),
        wallet_address: "0x1111111111111111111111111111111111111111".to_string(),
    })
}

#[tokio::test]
async fn test_okx_closed_orders_are_signed_and_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v5/trade/orders-history"))
        .and(query_param("instType", "SPOT"))
        .and(query_param("instId", "AVAX-USDT"))
        .and(query_param("begin", "1700000000000"))
        .and(header_exists("OK-ACCESS-KEY"))
        .and(header_exists("OK-ACCESS-SIGN"))
        .and(header_exists("OK-ACCESS-TIMESTAMP"))
        .and(header_exists("OK-ACCESS-PASSPHRASE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "0",
            "msg": "",
            "data": [{
                "ordId": "A1",
                "state": "filled",
                "avgPx": "10.12345",
                "accFillSz": "2000",
                "fee": "-0.5",
                "feeCcy": "USDT",
                "fillTime": "1700000000500"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = okx_client(&server);
    let records = client.fetch_closed_orders(1_700_000_000_000).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].order_id, "A1");
    assert_eq!(records[0].average_fill_price, Some(dec!(10.12345)));
    assert_eq!(records[0].fee.amount, dec!(0.5));
    assert_eq!(records[0].fill_time, 1_700_000_000_500);
}

#[tokio::test]
async fn test_okx_error_code_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v5/trade/orders-history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "50111",
            "msg": "Invalid OK-ACCESS-KEY",
            "data": []
        })))
        .mount(&server)
        .await;

    let client = okx_client(&server);
    let error = client.fetch_closed_orders(0).await.unwrap_err();
    assert!(error.to_string().contains("50111"));
}

#[tokio::test]
async fn test_okx_page_advances_cursor_past_latest_fill() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v5/trade/orders-history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "0",
            "msg": "",
            "data": [
                {
                    "ordId": "A1",
                    "state": "filled",
                    "avgPx": "10",
                    "accFillSz": "1",
                    "fee": "-0.1",
                    "feeCcy": "USDT",
                    "fillTime": "1700000000100"
                },
                {
                    "ordId": "A2",
                    "state": "filled",
                    "avgPx": "11",
                    "accFillSz": "1",
                    "fee": "-0.1",
                    "feeCcy": "USDT",
                    "fillTime": "1700000000700"
                }
            ]
        })))
        .mount(&server)
        .await;

    let client = okx_client(&server);
    let page = FillSource::<OkxFillRecord>::fetch_page(&client, 1_700_000_000_000)
        .await
        .unwrap();

    assert_eq!(page.records.len(), 2);
    assert_eq!(page.records[0].0, "A1");
    assert_eq!(page.next_cursor, 1_700_000_000_701);
}

#[tokio::test]
async fn test_snowtrace_token_transfers_are_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("module", "account"))
        .and(query_param("action", "tokentx"))
        .and(query_param("startblock", "12345"))
        .and(query_param("endblock", "99999999"))
        .and(query_param("sort", "asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "1",
            "message": "OK",
            "result": [{
                "hash": "0xABCD",
                "blockNumber": "12350",
                "timeStamp": "1699999999",
                "from": "0xFEED",
                "to": "0x1111111111111111111111111111111111111111",
                "value": "2000000000",
                "tokenSymbol": "USDT",
                "tokenDecimal": "6",
                "gas": "21000",
                "gasPrice": "25",
                "gasUsed": "21000",
                "cumulativeGasUsed": "21000"
            }]
        })))
        .mount(&server)
        .await;

    let client = snowtrace_client(&server);
    let transfers = client.token_transfers(12_345).await.unwrap();

    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].hash, "0xabcd");
    assert_eq!(transfers[0].block_number, 12_350);
    assert_eq!(transfers[0].value, dec!(2000000000));
}

#[tokio::test]
async fn test_snowtrace_empty_feed_is_an_empty_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "0",
            "message": "No transactions found",
            "result": []
        })))
        .mount(&server)
        .await;

    let client = snowtrace_client(&server);
    let page = FillSource::<TokenTransfer>::fetch_page(&client, 777).await.unwrap();

    assert!(page.records.is_empty());
    // An empty page leaves the cursor where it was.
    assert_eq!(page.next_cursor, 777);
}

#[tokio::test]
async fn test_snowtrace_internal_transfers_are_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("action", "txlistinternal"))
        .and(query_param("txhash", "0xcd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "1",
            "message": "OK",
            "result": [
                {"from": "0xAAAA", "to": "0xBBBB", "value": "1"},
                {"from": "0xAAAA", "to": "0x1111111111111111111111111111111111111111",
                 "value": "100000000000000000000"}
            ]
        })))
        .mount(&server)
        .await;

    let client = snowtrace_client(&server);
    let transfers = client.internal_transfers("0xcd").await.unwrap();

    assert_eq!(transfers.len(), 2);
    assert_eq!(
        transfers[1].to,
        "0x1111111111111111111111111111111111111111"
    );
    assert_eq!(transfers[1].value, dec!(100000000000000000000));
}
