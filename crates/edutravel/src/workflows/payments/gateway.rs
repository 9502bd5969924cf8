use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{OrderId, OrderKind};
use crate::config::PaymentConfig;

/// Gateway view of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayVerification {
    pub success: bool,
    pub status: String,
    pub amount_minor_units: i64,
    pub currency: Option<String>,
    /// Order the transaction was opened for, echoed from the checkout metadata.
    pub order_id: Option<OrderId>,
}

impl GatewayVerification {
    /// Both the envelope flag and the transaction status must report success.
    pub fn is_successful(&self) -> bool {
        self.success && self.status == "success"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionMetadata {
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    #[serde(rename = "orderType")]
    pub order_type: OrderKind,
}

/// Request body for opening a hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitializeTransaction {
    pub email: String,
    #[serde(rename = "amount")]
    pub amount_minor_units: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub metadata: TransactionMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAuthorization {
    pub authorization_url: String,
    pub reference: String,
}

/// Outbound payment gateway port.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn verify_transaction(&self, reference: &str)
        -> Result<GatewayVerification, GatewayError>;

    async fn initialize_transaction(
        &self,
        request: InitializeTransaction,
    ) -> Result<GatewayAuthorization, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request timed out")]
    Timeout,
    #[error("gateway transport failure: {0}")]
    Transport(String),
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
    #[error("gateway response could not be decoded: {0}")]
    Decode(String),
    #[error("gateway secret key is not configured")]
    NotConfigured,
}

/// Paystack REST client.
pub struct PaystackGateway {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl PaystackGateway {
    pub fn new(config: &PaymentConfig) -> Result<Self, GatewayError> {
        let secret_key = config
            .secret_key
            .clone()
            .ok_or(GatewayError::NotConfigured)?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("edutravel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            secret_key,
        })
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<GatewayVerification, GatewayError> {
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);
        debug!(reference, "verifying transaction with gateway");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(rejection(status, &body));
        }

        parse_verification(&body)
    }

    async fn initialize_transaction(
        &self,
        request: InitializeTransaction,
    ) -> Result<GatewayAuthorization, GatewayError> {
        let url = format!("{}/transaction/initialize", self.base_url);
        debug!(order_id = %request.metadata.order_id, "initializing gateway transaction");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(rejection(status, &body));
        }

        parse_authorization(&body)
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(err.to_string())
    }
}

fn rejection(status: StatusCode, body: &[u8]) -> GatewayError {
    let message = serde_json::from_slice::<Envelope<serde_json::Value>>(body)
        .ok()
        .map(|envelope| envelope.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| status.to_string());
    GatewayError::Rejected(message)
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct VerificationData {
    status: String,
    amount: i64,
    #[serde(default)]
    currency: Option<String>,
    /// Object when the checkout carried metadata; the gateway sends `""` otherwise.
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AuthorizationData {
    authorization_url: String,
    reference: String,
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<Envelope<T>, GatewayError> {
    serde_json::from_slice(body).map_err(|err| GatewayError::Decode(err.to_string()))
}

pub(crate) fn parse_verification(body: &[u8]) -> Result<GatewayVerification, GatewayError> {
    let envelope: Envelope<VerificationData> = decode(body)?;
    match envelope.data {
        Some(data) => Ok(GatewayVerification {
            success: envelope.status,
            status: data.status,
            amount_minor_units: data.amount,
            currency: data.currency,
            order_id: data
                .metadata
                .as_ref()
                .and_then(|metadata| metadata.get("orderId"))
                .and_then(serde_json::Value::as_str)
                .map(OrderId::new),
        }),
        None if !envelope.status => Err(GatewayError::Rejected(envelope.message)),
        None => Err(GatewayError::Decode("missing transaction data".to_string())),
    }
}

pub(crate) fn parse_authorization(body: &[u8]) -> Result<GatewayAuthorization, GatewayError> {
    let envelope: Envelope<AuthorizationData> = decode(body)?;
    if !envelope.status {
        return Err(GatewayError::Rejected(envelope.message));
    }

    let data = envelope
        .data
        .ok_or_else(|| GatewayError::Decode("missing authorization data".to_string()))?;
    Ok(GatewayAuthorization {
        authorization_url: data.authorization_url,
        reference: data.reference,
    })
}
