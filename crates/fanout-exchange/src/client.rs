//! OKX v5 REST client.
//!
//! Every private call is signed immediately before it is sent with the
//! credentials of the account it acts for. Responses use the v5 envelope
//! `{"code": "0", "msg": "", "data": [...]}`.

use std::time::Duration;

use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use fanout_core::{
    Credentials, InstrumentInfo, InstrumentKind, MarginMode, MaxSize, Order, Position,
    PositionSide, Size,
};

use crate::api::{BoxFuture, ExchangeApi, LeverageRequest, MaxSizeQuery, OrderAck};
use crate::error::{ExchangeError, ExchangeResult};
use crate::rate_limiter::Endpoint;
use crate::signer::AuthHeaders;

/// Default OKX REST base URL.
pub const DEFAULT_BASE_URL: &str = "https://www.okx.com";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Header switching requests to the demo-trading environment.
const SIMULATED_TRADING_HEADER: &str = "x-simulated-trading";

/// Top-level batch codes meaning "submitted, check each order".
const BATCH_ACCEPTED_CODES: [&str; 3] = ["0", "1", "2"];

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for [`OkxRestClient`].
#[derive(Debug, Clone)]
pub struct OkxClientConfig {
    pub base_url: String,
    pub simulated: bool,
    pub timeout: Duration,
}

impl Default for OkxClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            simulated: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl OkxClientConfig {
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_simulated(mut self, simulated: bool) -> Self {
        self.simulated = simulated;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInstrument {
    inst_id: String,
    lot_sz: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMaxAvailSize {
    #[serde(default)]
    avail_buy: Option<String>,
    #[serde(default)]
    avail_sell: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMaxSize {
    #[serde(default)]
    max_buy: Option<String>,
    #[serde(default)]
    max_sell: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPosition {
    inst_id: String,
    #[serde(default)]
    pos: String,
    #[serde(default)]
    pos_side: String,
    #[serde(default)]
    mgn_mode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrderAck {
    #[serde(default)]
    ord_id: String,
    #[serde(default)]
    cl_ord_id: String,
    #[serde(default)]
    s_code: String,
    #[serde(default)]
    s_msg: String,
}

/// Parse a required decimal bound. Absent and empty are both errors.
fn parse_bound(value: Option<&str>, field: &str, inst_id: &str) -> ExchangeResult<Size> {
    let raw = value.map(str::trim).filter(|v| !v.is_empty()).ok_or_else(|| {
        ExchangeError::MalformedResponse(format!("{field} missing for {inst_id}"))
    })?;
    raw.parse::<Size>().map_err(|e| {
        ExchangeError::MalformedResponse(format!("{field} for {inst_id} is not a decimal: {e}"))
    })
}

impl RawPosition {
    fn into_position(self) -> ExchangeResult<Position> {
        let size = if self.pos.trim().is_empty() {
            Size::ZERO
        } else {
            self.pos.parse::<Size>().map_err(|e| {
                ExchangeError::MalformedResponse(format!("pos for {}: {e}", self.inst_id))
            })?
        };
        let position_side = match self.pos_side.as_str() {
            "long" => PositionSide::Long,
            "short" => PositionSide::Short,
            _ => PositionSide::Net,
        };
        let margin_mode = match self.mgn_mode.as_str() {
            "cross" => Some(MarginMode::Cross),
            "isolated" => Some(MarginMode::Isolated),
            _ => None,
        };
        Ok(Position {
            inst_id: self.inst_id,
            size,
            position_side,
            margin_mode,
        })
    }
}

// =============================================================================
// Client
// =============================================================================

/// Signed REST client for OKX v5.
pub struct OkxRestClient {
    client: Client,
    base_url: Url,
    simulated: bool,
}

impl OkxRestClient {
    pub fn new(config: OkxClientConfig) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExchangeError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ExchangeError::HttpClient(format!("Invalid base URL {}: {e}", config.base_url))
        })?;

        info!(
            base_url = %base_url,
            simulated = config.simulated,
            "OKX REST client created"
        );

        Ok(Self {
            client,
            base_url,
            simulated: config.simulated,
        })
    }

    /// Absolute URL plus the path-and-query string that gets signed.
    fn endpoint_url(&self, endpoint: Endpoint, query: &[(&str, &str)]) -> ExchangeResult<(Url, String)> {
        let mut url = self
            .base_url
            .join(endpoint.path())
            .map_err(|e| ExchangeError::HttpClient(format!("Invalid request URL: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().copied());
        }
        let request_path = match url.query() {
            Some(q) => format!("{}?{q}", url.path()),
            None => url.path().to_string(),
        };
        Ok((url, request_path))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: Endpoint,
        query: &[(&str, &str)],
        body: Option<String>,
        creds: Option<&Credentials>,
    ) -> ExchangeResult<Envelope<T>> {
        let (url, request_path) = self.endpoint_url(endpoint, query)?;
        let body_str = body.unwrap_or_default();

        let mut request = self.client.request(method.clone(), url);
        if let Some(creds) = creds {
            let headers =
                AuthHeaders::build(creds, method.as_str(), &request_path, &body_str, Utc::now())?;
            request = headers.apply(request);
        }
        if self.simulated {
            request = request.header(SIMULATED_TRADING_HEADER, "1");
        }
        if !body_str.is_empty() {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body_str);
        }

        debug!(method = %method, path = %request_path, "Sending request");

        let response = request
            .send()
            .await
            .map_err(|e| ExchangeError::HttpClient(format!("HTTP request failed: {e}")))?;
        Self::parse_envelope(response).await
    }

    async fn parse_envelope<T: DeserializeOwned>(response: Response) -> ExchangeResult<Envelope<T>> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExchangeError::HttpClient(format!("Failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(ExchangeError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Require code `"0"` and return the data rows.
    fn into_data<T>(envelope: Envelope<T>) -> ExchangeResult<Vec<T>> {
        if envelope.code != "0" {
            return Err(ExchangeError::Api {
                code: envelope.code,
                msg: envelope.msg,
            });
        }
        Ok(envelope.data)
    }

    pub async fn fetch_instrument(
        &self,
        kind: InstrumentKind,
        inst_id: &str,
    ) -> ExchangeResult<InstrumentInfo> {
        let envelope: Envelope<RawInstrument> = self
            .send(
                Method::GET,
                Endpoint::Instruments,
                &[("instType", kind.inst_type()), ("instId", inst_id)],
                None,
                None,
            )
            .await?;
        let raw = Self::into_data(envelope)?
            .into_iter()
            .find(|row| row.inst_id == inst_id)
            .ok_or_else(|| ExchangeError::UnknownInstrument(inst_id.to_string()))?;
        let lot_size = parse_bound(Some(&raw.lot_sz), "lotSz", inst_id)?;
        if !lot_size.is_positive() {
            return Err(ExchangeError::MalformedResponse(format!(
                "lotSz for {inst_id} must be positive, got {lot_size}"
            )));
        }
        Ok(InstrumentInfo {
            inst_id: raw.inst_id,
            lot_size,
        })
    }

    pub async fn fetch_max_size(
        &self,
        creds: &Credentials,
        query: &MaxSizeQuery,
    ) -> ExchangeResult<MaxSize> {
        let td_mode = query.td_mode.as_str();
        if query.kind.is_derivative() {
            let mut params = vec![("instId", query.inst_id.as_str()), ("tdMode", td_mode)];
            if let Some(pos_side) = query.pos_side {
                params.push(("posSide", pos_side.as_str()));
            }
            let envelope: Envelope<RawMaxSize> = self
                .send(Method::GET, Endpoint::MaxSize, &params, None, Some(creds))
                .await?;
            let row = Self::into_data(envelope)?.into_iter().next().ok_or_else(|| {
                ExchangeError::MalformedResponse(format!("no max size for {}", query.inst_id))
            })?;
            Ok(MaxSize {
                max_buy: parse_bound(row.max_buy.as_deref(), "maxBuy", &query.inst_id)?,
                max_sell: parse_bound(row.max_sell.as_deref(), "maxSell", &query.inst_id)?,
            })
        } else {
            let params = [("instId", query.inst_id.as_str()), ("tdMode", td_mode)];
            let envelope: Envelope<RawMaxAvailSize> = self
                .send(Method::GET, Endpoint::MaxAvailSize, &params, None, Some(creds))
                .await?;
            let row = Self::into_data(envelope)?.into_iter().next().ok_or_else(|| {
                ExchangeError::MalformedResponse(format!(
                    "no available size for {}",
                    query.inst_id
                ))
            })?;
            Ok(MaxSize {
                max_buy: parse_bound(row.avail_buy.as_deref(), "availBuy", &query.inst_id)?,
                max_sell: parse_bound(row.avail_sell.as_deref(), "availSell", &query.inst_id)?,
            })
        }
    }

    pub async fn fetch_positions(
        &self,
        creds: &Credentials,
        inst_id: &str,
    ) -> ExchangeResult<Vec<Position>> {
        let envelope: Envelope<RawPosition> = self
            .send(
                Method::GET,
                Endpoint::Positions,
                &[("instId", inst_id)],
                None,
                Some(creds),
            )
            .await?;
        Self::into_data(envelope)?
            .into_iter()
            .filter(|row| row.inst_id == inst_id)
            .map(RawPosition::into_position)
            .collect()
    }

    pub async fn post_leverage(
        &self,
        creds: &Credentials,
        request: &LeverageRequest,
    ) -> ExchangeResult<()> {
        let body = serde_json::to_string(request)?;
        let envelope: Envelope<serde_json::Value> = self
            .send(Method::POST, Endpoint::SetLeverage, &[], Some(body), Some(creds))
            .await?;
        Self::into_data(envelope).map(|_| ())
    }

    pub async fn post_batch_orders(
        &self,
        creds: &Credentials,
        orders: &[Order],
    ) -> ExchangeResult<Vec<OrderAck>> {
        let body = serde_json::to_string(orders)?;
        let envelope: Envelope<RawOrderAck> = self
            .send(Method::POST, Endpoint::BatchOrders, &[], Some(body), Some(creds))
            .await?;
        if !BATCH_ACCEPTED_CODES.contains(&envelope.code.as_str()) {
            return Err(ExchangeError::Api {
                code: envelope.code,
                msg: envelope.msg,
            });
        }
        Ok(envelope
            .data
            .into_iter()
            .map(|raw| OrderAck {
                order_id: raw.ord_id,
                client_order_id: raw.cl_ord_id,
                code: raw.s_code,
                message: raw.s_msg,
            })
            .collect())
    }
}

impl ExchangeApi for OkxRestClient {
    fn instrument<'a>(
        &'a self,
        kind: InstrumentKind,
        inst_id: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<InstrumentInfo>> {
        Box::pin(self.fetch_instrument(kind, inst_id))
    }

    fn max_size<'a>(
        &'a self,
        creds: &'a Credentials,
        query: &'a MaxSizeQuery,
    ) -> BoxFuture<'a, ExchangeResult<MaxSize>> {
        Box::pin(self.fetch_max_size(creds, query))
    }

    fn positions<'a>(
        &'a self,
        creds: &'a Credentials,
        inst_id: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<Vec<Position>>> {
        Box::pin(self.fetch_positions(creds, inst_id))
    }

    fn set_leverage<'a>(
        &'a self,
        creds: &'a Credentials,
        request: &'a LeverageRequest,
    ) -> BoxFuture<'a, ExchangeResult<()>> {
        Box::pin(self.post_leverage(creds, request))
    }

    fn place_batch<'a>(
        &'a self,
        creds: &'a Credentials,
        orders: &'a [Order],
    ) -> BoxFuture<'a, ExchangeResult<Vec<OrderAck>>> {
        Box::pin(self.post_batch_orders(creds, orders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_core::{ClientOrderId, OrderSide, OrderType, TradeMode};
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn creds() -> Credentials {
        Credentials::new("ak-123456789", "secret", "pass").unwrap()
    }

    fn client(server: &MockServer) -> OkxRestClient {
        OkxRestClient::new(OkxClientConfig::default().with_base_url(server.uri())).unwrap()
    }

    fn order(cl_ord_id: &str) -> Order {
        Order {
            inst_id: "BTC-USDT-SWAP".to_string(),
            td_mode: TradeMode::Cross,
            side: OrderSide::Buy,
            ord_type: OrderType::Market,
            size: Size::new(dec!(3)),
            pos_side: Some(PositionSide::Long),
            client_order_id: ClientOrderId::from_string(cl_ord_id.to_string()),
            tgt_ccy: None,
            reduce_only: false,
        }
    }

    #[tokio::test]
    async fn test_fetch_instrument_lot_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/public/instruments"))
            .and(query_param("instType", "SWAP"))
            .and(query_param("instId", "BTC-USDT-SWAP"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "0",
                "msg": "",
                "data": [{"instId": "BTC-USDT-SWAP", "lotSz": "0.01"}]
            })))
            .mount(&server)
            .await;

        let info = client(&server)
            .fetch_instrument(InstrumentKind::LinearPerp, "BTC-USDT-SWAP")
            .await
            .unwrap();
        assert_eq!(info.lot_size.inner(), dec!(0.01));
    }

    #[tokio::test]
    async fn test_unknown_instrument() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/public/instruments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "0", "msg": "", "data": []
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_instrument(InstrumentKind::Spot, "NOPE-USDT")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::UnknownInstrument(_)));
    }

    #[tokio::test]
    async fn test_spot_max_avail_size_is_signed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/account/max-avail-size"))
            .and(query_param("instId", "BTC-USDT"))
            .and(query_param("tdMode", "cash"))
            .and(header("ACCESS-KEY", "ak-123456789"))
            .and(header("ACCESS-PASSPHRASE", "pass"))
            .and(header_exists("ACCESS-SIGN"))
            .and(header_exists("ACCESS-TIMESTAMP"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "0", "msg": "",
                "data": [{"instId": "BTC-USDT", "availBuy": "1.5", "availSell": "0.25"}]
            })))
            .mount(&server)
            .await;

        let max = client(&server)
            .fetch_max_size(&creds(), &MaxSizeQuery::spot("BTC-USDT"))
            .await
            .unwrap();
        assert_eq!(max.max_buy.inner(), dec!(1.5));
        assert_eq!(max.max_sell.inner(), dec!(0.25));
    }

    #[tokio::test]
    async fn test_isolated_max_size_sends_pos_side() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/account/max-size"))
            .and(query_param("tdMode", "isolated"))
            .and(query_param("posSide", "short"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "0", "msg": "",
                "data": [{"instId": "BTC-USDT-SWAP", "maxBuy": "10", "maxSell": "12"}]
            })))
            .mount(&server)
            .await;

        let query = MaxSizeQuery::derivative(
            "BTC-USDT-SWAP",
            InstrumentKind::LinearPerp,
            MarginMode::Isolated,
            PositionSide::Short,
        );
        let max = client(&server).fetch_max_size(&creds(), &query).await.unwrap();
        assert_eq!(max.max_sell.inner(), dec!(12));
    }

    #[tokio::test]
    async fn test_missing_bound_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/account/max-size"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "0", "msg": "",
                "data": [{"instId": "BTC-USDT-SWAP", "maxBuy": "10", "maxSell": ""}]
            })))
            .mount(&server)
            .await;

        let query = MaxSizeQuery::derivative(
            "BTC-USDT-SWAP",
            InstrumentKind::LinearPerp,
            MarginMode::Cross,
            PositionSide::Long,
        );
        let err = client(&server)
            .fetch_max_size(&creds(), &query)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::MalformedResponse(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_positions_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/account/positions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "0", "msg": "",
                "data": [
                    {"instId": "BTC-USDT-SWAP", "pos": "-2.5", "posSide": "short", "mgnMode": "isolated"},
                    {"instId": "ETH-USDT-SWAP", "pos": "1", "posSide": "net", "mgnMode": "cross"}
                ]
            })))
            .mount(&server)
            .await;

        let positions = client(&server)
            .fetch_positions(&creds(), "BTC-USDT-SWAP")
            .await
            .unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].size.inner(), dec!(-2.5));
        assert_eq!(positions[0].position_side, PositionSide::Short);
        assert_eq!(positions[0].margin_mode, Some(MarginMode::Isolated));
    }

    #[tokio::test]
    async fn test_set_leverage_body_and_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v5/account/set-leverage"))
            .and(body_json(serde_json::json!({
                "instId": "BTC-USDT-SWAP", "lever": "5", "mgnMode": "isolated", "posSide": "long"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "51000", "msg": "Parameter lever error", "data": []
            })))
            .mount(&server)
            .await;

        let request = LeverageRequest::new(
            "BTC-USDT-SWAP",
            5,
            MarginMode::Isolated,
            PositionSide::Long,
        );
        let err = client(&server)
            .post_leverage(&creds(), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Api { ref code, .. } if code == "51000"));
    }

    #[tokio::test]
    async fn test_batch_partial_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v5/trade/batch-orders"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "2", "msg": "",
                "data": [
                    {"ordId": "1", "clOrdId": "a1", "sCode": "0", "sMsg": ""},
                    {"ordId": "", "clOrdId": "a2", "sCode": "51008", "sMsg": "Insufficient balance"}
                ]
            })))
            .mount(&server)
            .await;

        let acks = client(&server)
            .post_batch_orders(&creds(), &[order("a1"), order("a2")])
            .await
            .unwrap();
        assert!(acks[0].is_success());
        assert!(!acks[1].is_success());
        assert_eq!(acks[1].code, "51008");
    }

    #[tokio::test]
    async fn test_batch_rejected_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v5/trade/batch-orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "50113", "msg": "Invalid sign", "data": []
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .post_batch_orders(&creds(), &[order("a1")])
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Api { .. }));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v5/trade/batch-orders"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = client(&server)
            .post_batch_orders(&creds(), &[order("a1")])
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_simulated_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/public/instruments"))
            .and(header("x-simulated-trading", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "0", "msg": "",
                "data": [{"instId": "BTC-USDT", "lotSz": "0.00000001"}]
            })))
            .mount(&server)
            .await;

        let client = OkxRestClient::new(
            OkxClientConfig::default()
                .with_base_url(server.uri())
                .with_simulated(true),
        )
        .unwrap();
        let info = client
            .fetch_instrument(InstrumentKind::Spot, "BTC-USDT")
            .await
            .unwrap();
        assert_eq!(info.lot_size.inner(), dec!(0.00000001));
    }
}
