use serde::Deserialize;
use serde_json::{json, Value};
use crate::error::Result;
use crate::price_infra::connectors::{Frame, StreamProtocol};
use crate::price_infra::RawQuote;
use crate::types::symbol::Symbol;

/// JSON push protocol:
///
/// outbound `{"action":"auth","key":..}`, `{"action":"subscribe","symbols":[..]}`,
/// `{"action":"unsubscribe","symbols":[..]}`;
/// inbound messages carry a `type` of `auth`, `quote` or `heartbeat`.
#[derive(Clone, Debug, Default)]
pub struct JsonStreamProtocol;

#[derive(Deserialize)]
struct AuthReply {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

impl JsonStreamProtocol {
    fn symbols_frame(action: &str, symbols: &[Symbol]) -> String {
        let symbols: Vec<&str> = symbols.iter().map(Symbol::as_str).collect();
        json!({ "action": action, "symbols": symbols }).to_string()
    }
}

impl StreamProtocol for JsonStreamProtocol {
    fn auth_frame(&self, api_key: &str) -> String {
        json!({ "action": "auth", "key": api_key }).to_string()
    }

    fn subscribe_frame(&self, symbols: &[Symbol]) -> String {
        Self::symbols_frame("subscribe", symbols)
    }

    fn unsubscribe_frame(&self, symbols: &[Symbol]) -> String {
        Self::symbols_frame("unsubscribe", symbols)
    }

    fn parse(&self, raw: &str) -> Result<Frame> {
        let value: Value = serde_json::from_str(raw)?;
        let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
            return Ok(Frame::Other);
        };

        match kind.as_str() {
            "quote" => {
                let quote: RawQuote = serde_json::from_value(value)?;
                Ok(Frame::Quote(quote))
            }
            "auth" => {
                let reply: AuthReply = serde_json::from_value(value)?;
                if reply.status.eq_ignore_ascii_case("ok") {
                    Ok(Frame::AuthOk)
                } else {
                    Ok(Frame::AuthRejected(
                        reply.message.unwrap_or(reply.status),
                    ))
                }
            }
            "heartbeat" => Ok(Frame::Heartbeat),
            _ => Ok(Frame::Other),
        }
    }
}
