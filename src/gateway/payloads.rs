//! Request bodies sent to the gateway and typed reads of its responses.

use bigdecimal::BigDecimal;
use serde_json::{json, Map, Value};

use crate::domain::{CardMetadata, GatewayCard, TransactionKind, ValueExt};
use crate::ports::HostAccount;

pub fn payment_path() -> String {
    "/payment".to_string()
}

pub fn payment_resource_path(gateway_transaction_id: &str) -> String {
    format!("/payment/{}", gateway_transaction_id)
}

/// Capture, void and refund act on an existing payment.
pub fn follow_up_path(gateway_transaction_id: &str, kind: TransactionKind) -> String {
    let action = match kind {
        TransactionKind::Capture => "capture",
        TransactionKind::Void => "void",
        _ => "refund",
    };
    format!("/payment/{}/{}", gateway_transaction_id, action)
}

pub fn payer_cards_path(payer_id: &str) -> String {
    format!("/payer/{}/card", payer_id)
}

pub fn payer_card_path(payer_id: &str, card_id: &str) -> String {
    format!("/payer/{}/card/{}", payer_id, card_id)
}

pub fn payer_path(payer_id: &str) -> String {
    format!("/payer/{}", payer_id)
}

pub const CLIENT_TOKEN_PATH: &str = "/client_token";

/// How the card is presented to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum FundingInstrument {
    /// One-time value from the hosted form.
    Nonce(String),
    /// A card the gateway already holds for the payer.
    StoredCard { card_id: String, payer_id: String },
}

#[derive(Debug, Clone)]
pub struct PaymentRequest<'a> {
    pub kind: TransactionKind,
    pub amount: &'a BigDecimal,
    pub currency: &'a str,
    pub instrument: FundingInstrument,
    pub payer: Option<&'a HostAccount>,
    pub invoice_number: String,
    pub description: Option<String>,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
    pub force_3ds: bool,
}

/// Amount without exponent notation, as the gateway expects.
pub fn plain_amount(amount: &BigDecimal) -> String {
    let (_, scale) = amount.as_bigint_and_exponent();
    if scale < 0 {
        amount.with_scale(0).to_string()
    } else {
        amount.to_string()
    }
}

pub fn payment_body(request: &PaymentRequest<'_>) -> Value {
    let funding_instrument = match &request.instrument {
        FundingInstrument::Nonce(nonce) => json!({ "credit_card": { "nonce": nonce } }),
        FundingInstrument::StoredCard { card_id, payer_id } => json!({
            "credit_card_token": { "credit_card_id": card_id, "payer_id": payer_id }
        }),
    };

    let mut payer = Map::new();
    payer.insert("payment_type".to_string(), json!("CC"));
    payer.insert("funding_instrument".to_string(), funding_instrument);
    if let Some(info) = request.payer.map(payer_info).filter(|v| !v.is_empty()) {
        payer.insert("payer_info".to_string(), Value::Object(info));
    }

    let mut transaction = Map::new();
    transaction.insert(
        "amount".to_string(),
        json!({ "currency": request.currency, "total": plain_amount(request.amount) }),
    );
    transaction.insert("invoice_number".to_string(), json!(request.invoice_number));
    if let Some(description) = &request.description {
        transaction.insert("description".to_string(), json!(description));
    }

    let intent = match request.kind {
        TransactionKind::Authorize => "auth",
        _ => "sale",
    };

    let mut body = Map::new();
    body.insert("intent".to_string(), json!(intent));
    body.insert("payer".to_string(), Value::Object(payer));
    body.insert("transaction".to_string(), Value::Object(transaction));
    if let Some(url) = &request.return_url {
        body.insert("return_url".to_string(), json!(url));
    }
    if let Some(url) = &request.cancel_url {
        body.insert("cancel_url".to_string(), json!(url));
    }
    if request.kind == TransactionKind::Authorize {
        let mode = if request.force_3ds { "force" } else { "auto" };
        body.insert("three_ds".to_string(), json!({ "mode": mode }));
    }
    Value::Object(body)
}

fn payer_info(account: &HostAccount) -> Map<String, Value> {
    fn put(target: &mut Map<String, Value>, key: &str, value: &Option<String>) {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            target.insert(key.to_string(), json!(v));
        }
    }

    let mut info = Map::new();
    put(&mut info, "email", &account.email);
    put(&mut info, "first_name", &account.first_name);
    put(&mut info, "last_name", &account.last_name);
    put(&mut info, "phone", &account.phone);

    let mut address = Map::new();
    put(&mut address, "line1", &account.address1);
    put(&mut address, "line2", &account.address2);
    put(&mut address, "city", &account.city);
    put(&mut address, "state", &account.state);
    put(&mut address, "postal_code", &account.postal_code);
    put(&mut address, "country_code", &account.country);
    if !address.is_empty() {
        info.insert("billing_address".to_string(), Value::Object(address));
    }
    info
}

/// Body for capture and refund.
pub fn amount_body(amount: &BigDecimal, invoice_number: &str) -> Value {
    json!({ "amount": plain_amount(amount), "invoice_number": invoice_number })
}

pub fn void_body(invoice_number: &str) -> Value {
    json!({ "invoice_number": invoice_number })
}

pub fn client_token_body() -> Value {
    json!({ "grant_type": "client_credentials" })
}

pub fn default_card_body(card_id: &str) -> Value {
    json!({ "default_card": card_id })
}

/// Fields of a payment resource the orchestrator acts on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentSnapshot {
    pub id: Option<String>,
    pub state: Option<String>,
    pub reference_id: Option<String>,
    pub payer_id: Option<String>,
    pub card_id: Option<String>,
    pub card: CardMetadata,
    pub result_code: Option<String>,
    pub result_description: Option<String>,
}

impl PaymentSnapshot {
    pub fn read(value: &Value) -> Self {
        let credit_card = value
            .get_path(&["payer", "funding_instrument", "credit_card"])
            .and_then(Value::as_object);
        let result = value.get_nested("result");

        PaymentSnapshot {
            id: value.get_string("id"),
            state: value.get_string("state"),
            reference_id: value.get_string("reference_id"),
            payer_id: value
                .get_nested("payer")
                .and_then(|p| p.get_string("id"))
                .or_else(|| value.get_string("payer_id")),
            card_id: credit_card
                .and_then(|c| c.get_string("id"))
                .or_else(|| value.get_string("card_id")),
            card: credit_card
                .map(CardMetadata::from_gateway_card)
                .unwrap_or_default(),
            result_code: result.and_then(|r| r.get_string("code")),
            result_description: result
                .and_then(|r| r.get_string("description").or_else(|| r.get_string("message"))),
        }
    }
}

/// Cards in a payer listing; a missing list means the payer has none.
pub fn read_card_list(value: &Value) -> Vec<GatewayCard> {
    value
        .get("credit_cards")
        .and_then(Value::as_array)
        .map(|cards| {
            cards
                .iter()
                .filter_map(Value::as_object)
                .filter_map(GatewayCard::from_value)
                .collect()
        })
        .unwrap_or_default()
}

pub fn read_access_token(value: &Value) -> Option<String> {
    value
        .get_string("accessToken")
        .or_else(|| value.get_string("access_token"))
}
