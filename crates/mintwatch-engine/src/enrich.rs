//! Token enrichment: name, symbol and market data for a mint.
//!
//! [`RpcEnricher`] asks the JSON-RPC node for the mint account
//! (`getAccountInfo`, jsonParsed) and then the price API for market data.
//! Metadata failures are errors; a failed price lookup only logs and keeps
//! what the metadata call produced.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

use mintwatch_core::{EnrichmentError, JsonRpcRequest, JsonRpcResponse, Socials, TokenInfo};

use crate::config::EnrichConfig;

/// Looks up display data for a freshly minted token.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, mint: &str) -> Result<TokenInfo, EnrichmentError>;
}

/// Always answers with [`TokenInfo::unknown`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    async fn enrich(&self, mint: &str) -> Result<TokenInfo, EnrichmentError> {
        Ok(TokenInfo::unknown(mint))
    }
}

/// JSON-RPC metadata lookup plus price API.
pub struct RpcEnricher {
    config: EnrichConfig,
    http: reqwest::Client,
}

impl RpcEnricher {
    pub fn new(config: EnrichConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .expect("failed to build reqwest client");
        Self { config, http }
    }

    async fn fetch_metadata(&self, mint: &str) -> Result<TokenInfo, EnrichmentError> {
        let req = JsonRpcRequest::new(
            1,
            "getAccountInfo",
            vec![Value::String(mint.to_string()), json!({ "encoding": "jsonParsed" })],
        );
        let resp = post_rpc(&self.http, &self.config.http_url, &req).await?;
        let result = resp.into_result().map_err(EnrichmentError::Rpc)?;
        parse_account_metadata(mint, &result)
    }

    async fn fetch_price(&self, key: &str, info: &mut TokenInfo) -> Result<(), EnrichmentError> {
        let url = format!("{}/public/price", self.config.price_api_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .query(&[("address", info.mint.as_str())])
            .header("X-API-KEY", key)
            .send()
            .await
            .map_err(|e| EnrichmentError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(EnrichmentError::Http(format!("HTTP {status}: {body}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| EnrichmentError::Http(e.to_string()))?;
        apply_price(info, &body);
        Ok(())
    }
}

#[async_trait]
impl Enricher for RpcEnricher {
    async fn enrich(&self, mint: &str) -> Result<TokenInfo, EnrichmentError> {
        let mut info = self.fetch_metadata(mint).await?;

        match self.config.price_api_key.as_deref() {
            Some(key) => {
                if let Err(e) = self.fetch_price(key, &mut info).await {
                    tracing::warn!(mint, error = %e, "price lookup failed, keeping metadata");
                }
            }
            None => tracing::debug!(mint, "no price API key, skipping price lookup"),
        }

        Ok(info)
    }
}

/// Result of a `getSlot` round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcHealth {
    pub slot: u64,
    pub latency: Duration,
}

/// Call `getSlot` on `url` to prove the endpoint is reachable.
pub async fn check_rpc(url: &str, timeout: Duration) -> Result<RpcHealth, EnrichmentError> {
    let http = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EnrichmentError::Http(e.to_string()))?;

    let started = Instant::now();
    let resp = post_rpc(&http, url, &JsonRpcRequest::new(1, "getSlot", vec![])).await?;
    let latency = started.elapsed();

    let result = resp.into_result().map_err(EnrichmentError::Rpc)?;
    let slot = result
        .as_u64()
        .ok_or_else(|| EnrichmentError::Http(format!("getSlot returned {result}")))?;
    Ok(RpcHealth { slot, latency })
}

async fn post_rpc(
    http: &reqwest::Client,
    url: &str,
    req: &JsonRpcRequest,
) -> Result<JsonRpcResponse, EnrichmentError> {
    let resp = http
        .post(url)
        .json(req)
        .send()
        .await
        .map_err(|e| EnrichmentError::Http(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(EnrichmentError::Http(format!("HTTP {status}: {body}")));
    }

    let text = resp
        .text()
        .await
        .map_err(|e| EnrichmentError::Http(e.to_string()))?;
    Ok(serde_json::from_str(&text)?)
}

/// Read name, symbol and socials from a jsonParsed `getAccountInfo` result.
///
/// A null `value` means the account does not exist (yet). Missing metadata
/// fields fall back to the [`TokenInfo::unknown`] defaults.
pub fn parse_account_metadata(mint: &str, result: &Value) -> Result<TokenInfo, EnrichmentError> {
    let value = result.get("value").unwrap_or(&Value::Null);
    if value.is_null() {
        return Err(EnrichmentError::NotFound { mint: mint.to_string() });
    }

    let mut info = TokenInfo::unknown(mint);
    let Some(metadata) = value.pointer("/data/parsed/info/metadata") else {
        return Ok(info);
    };

    let text = |key: &str| {
        metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    if let Some(name) = text("name") {
        info.name = name;
    }
    if let Some(symbol) = text("symbol") {
        info.symbol = symbol;
    }
    info.socials = Socials {
        twitter: text("twitter"),
        telegram: text("telegram"),
        website: text("website"),
    };
    Ok(info)
}

/// Copy `data.value`, `data.liquidity` and `data.marketCap` onto `info`.
/// Absent or non-numeric fields leave the current values alone.
pub fn apply_price(info: &mut TokenInfo, body: &Value) {
    let field = |key: &str| body.pointer(&format!("/data/{key}")).and_then(Value::as_f64);
    if let Some(price) = field("value") {
        info.price = price;
    }
    if let Some(liquidity) = field("liquidity") {
        info.liquidity = liquidity;
    }
    if let Some(market_cap) = field("marketCap") {
        info.market_cap = market_cap;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn account_result(metadata: Value) -> Value {
        json!({
            "context": { "slot": 1 },
            "value": {
                "data": { "parsed": { "info": { "metadata": metadata } }, "program": "spl-token-2022" },
                "owner": "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb"
            }
        })
    }

    #[test]
    fn metadata_name_and_symbol() {
        let result = account_result(json!({ "name": "Dog Coin", "symbol": "DOG", "twitter": "https://x.com/dog" }));
        let info = parse_account_metadata("MintAddrXYZ", &result).unwrap();
        assert_eq!(info.name, "Dog Coin");
        assert_eq!(info.symbol, "DOG");
        assert_eq!(info.socials.twitter.as_deref(), Some("https://x.com/dog"));
        assert_eq!(info.socials.website, None);
        assert_eq!(info.price, 0.0);
    }

    #[test]
    fn blank_metadata_keeps_defaults() {
        let result = account_result(json!({ "name": "  ", "symbol": null }));
        let info = parse_account_metadata("MintAddrXYZ", &result).unwrap();
        assert_eq!(info.name, "Unknown");
        assert_eq!(info.symbol, "?");
    }

    #[test]
    fn account_without_metadata_is_unknown() {
        let result = json!({ "value": { "data": ["", "base64"] } });
        let info = parse_account_metadata("MintAddrXYZ", &result).unwrap();
        assert_eq!(info, TokenInfo::unknown("MintAddrXYZ"));
    }

    #[test]
    fn null_account_is_not_found() {
        let err = parse_account_metadata("MintAddrXYZ", &json!({ "value": null })).unwrap_err();
        assert!(matches!(err, EnrichmentError::NotFound { mint } if mint == "MintAddrXYZ"));
    }

    #[test]
    fn price_fields_applied_when_present() {
        let mut info = TokenInfo::unknown("MintAddrXYZ");
        apply_price(
            &mut info,
            &json!({ "success": true, "data": { "value": 0.000042, "liquidity": 1234.5 } }),
        );
        assert_eq!(info.price, 0.000042);
        assert_eq!(info.liquidity, 1234.5);
        assert_eq!(info.market_cap, 0.0);
    }

    #[tokio::test]
    async fn noop_enricher_returns_defaults() {
        let info = NoopEnricher.enrich("MintAddrXYZ").await.unwrap();
        assert_eq!(info, TokenInfo::unknown("MintAddrXYZ"));
    }

    fn account_body(name: &str, symbol: &str) -> String {
        json!({ "jsonrpc": "2.0", "id": 1, "result": account_result(json!({ "name": name, "symbol": symbol })) })
            .to_string()
    }

    #[tokio::test]
    async fn rpc_enricher_reads_metadata_over_http() {
        let mut server = Server::new_async().await;
        let rpc = server
            .mock("POST", "/")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""method":"getAccountInfo""#.into()),
                Matcher::Regex("MintAddrXYZ".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(account_body("Dog Coin", "DOG"))
            .create_async()
            .await;

        let enricher = RpcEnricher::new(EnrichConfig::for_url(server.url()));
        let info = enricher.enrich("MintAddrXYZ").await.unwrap();

        assert_eq!(info.symbol, "DOG");
        assert_eq!(info.price, 0.0);
        rpc.assert_async().await;
    }

    #[tokio::test]
    async fn price_lookup_sends_api_key() {
        let mut server = Server::new_async().await;
        let _rpc = server
            .mock("POST", "/")
            .with_body(account_body("Dog Coin", "DOG"))
            .create_async()
            .await;
        let price = server
            .mock("GET", "/public/price")
            .match_query(Matcher::UrlEncoded("address".into(), "MintAddrXYZ".into()))
            .match_header("x-api-key", "secret")
            .with_body(json!({ "success": true, "data": { "value": 0.5, "liquidity": 10.0 } }).to_string())
            .create_async()
            .await;

        let mut config = EnrichConfig::for_url(server.url());
        config.price_api_url = server.url();
        config.price_api_key = Some("secret".into());
        let info = RpcEnricher::new(config).enrich("MintAddrXYZ").await.unwrap();

        assert_eq!(info.price, 0.5);
        assert_eq!(info.liquidity, 10.0);
        price.assert_async().await;
    }

    #[tokio::test]
    async fn failed_price_lookup_keeps_metadata() {
        let mut server = Server::new_async().await;
        let _rpc = server
            .mock("POST", "/")
            .with_body(account_body("Dog Coin", "DOG"))
            .create_async()
            .await;
        let _price = server
            .mock("GET", "/public/price")
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let mut config = EnrichConfig::for_url(server.url());
        config.price_api_url = server.url();
        config.price_api_key = Some("secret".into());
        let info = RpcEnricher::new(config).enrich("MintAddrXYZ").await.unwrap();

        assert_eq!(info.name, "Dog Coin");
        assert_eq!(info.price, 0.0);
    }

    #[tokio::test]
    async fn rpc_error_surfaces_as_enrichment_error() {
        let mut server = Server::new_async().await;
        let _rpc = server
            .mock("POST", "/")
            .with_body(
                json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32602, "message": "Invalid param" } })
                    .to_string(),
            )
            .create_async()
            .await;

        let err = RpcEnricher::new(EnrichConfig::for_url(server.url()))
            .enrich("MintAddrXYZ")
            .await
            .unwrap_err();

        assert!(matches!(err, EnrichmentError::Rpc(e) if e.code == -32602));
    }

    #[tokio::test]
    async fn check_rpc_reports_slot() {
        let mut server = Server::new_async().await;
        let rpc = server
            .mock("POST", "/")
            .match_body(Matcher::Regex(r#""method":"getSlot""#.into()))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":289411234}"#)
            .create_async()
            .await;

        let health = check_rpc(&server.url(), Duration::from_secs(5)).await.unwrap();

        assert_eq!(health.slot, 289_411_234);
        rpc.assert_async().await;
    }

    #[tokio::test]
    async fn check_rpc_fails_on_server_error() {
        let mut server = Server::new_async().await;
        let _rpc = server
            .mock("POST", "/")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let err = check_rpc(&server.url(), Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::Http(msg) if msg.contains("503")));
    }
}
