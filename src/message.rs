use crate::error::{Error, ErrorKind};
use crate::event::RawEvent;
use crate::filter::Filter;
use serde_json::Value;

/// Messages we send to relays
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Req(String, Vec<Filter>),
    Event(Box<RawEvent>),
    Close(String),
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, Error> {
        let value = match self {
            ClientMessage::Req(sub, filters) => {
                let mut array = vec![Value::from("REQ"), Value::from(sub.as_str())];
                for filter in filters {
                    array.push(serde_json::to_value(filter)?);
                }
                Value::Array(array)
            }
            ClientMessage::Event(event) => {
                Value::Array(vec![Value::from("EVENT"), serde_json::to_value(event)?])
            }
            ClientMessage::Close(sub) => {
                Value::Array(vec![Value::from("CLOSE"), Value::from(sub.as_str())])
            }
        };
        Ok(serde_json::to_string(&value)?)
    }
}

/// Messages relays send to us
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event(String, Box<RawEvent>),
    Eose(String),
    Ok(String, bool, String),
    Notice(String),
    Closed(String, String),
    Auth(String),
}

impl RelayMessage {
    /// Parse a relay frame.
    ///
    /// A frame that is not a recognizable relay message is `MalformedMessage`.
    /// An `EVENT` frame whose event body does not parse is `MalformedEvent`.
    pub fn from_json(json: &str) -> Result<RelayMessage, Error> {
        let mut array: Vec<Value> = match serde_json::from_str(json) {
            Ok(a) => a,
            Err(e) => return Err(ErrorKind::MalformedMessage(format!("{e}")).into()),
        };
        if array.is_empty() {
            return Err(ErrorKind::MalformedMessage("empty array".to_owned()).into());
        }

        let label = match array.remove(0) {
            Value::String(s) => s,
            other => {
                return Err(ErrorKind::MalformedMessage(format!("bad label {other}")).into())
            }
        };

        let string_at = |array: &[Value], i: usize| -> Result<String, Error> {
            match array.get(i) {
                Some(Value::String(s)) => Ok(s.clone()),
                _ => Err(ErrorKind::MalformedMessage(format!(
                    "{label} missing string at position {}",
                    i + 1
                ))
                .into()),
            }
        };

        match label.as_str() {
            "EVENT" => {
                let sub = string_at(&array, 0)?;
                let body = match array.get_mut(1) {
                    Some(v) => v.take(),
                    None => {
                        return Err(ErrorKind::MalformedMessage(
                            "EVENT missing event body".to_owned(),
                        )
                        .into())
                    }
                };
                let event: RawEvent = match serde_json::from_value(body) {
                    Ok(e) => e,
                    Err(e) => return Err(ErrorKind::MalformedEvent(format!("{e}")).into()),
                };
                Ok(RelayMessage::Event(sub, Box::new(event)))
            }
            "EOSE" => Ok(RelayMessage::Eose(string_at(&array, 0)?)),
            "OK" => {
                let id = string_at(&array, 0)?;
                let ok = match array.get(1) {
                    Some(Value::Bool(b)) => *b,
                    _ => {
                        return Err(
                            ErrorKind::MalformedMessage("OK missing boolean".to_owned()).into()
                        )
                    }
                };
                // Some relays omit the reason
                let reason = string_at(&array, 2).unwrap_or_default();
                Ok(RelayMessage::Ok(id, ok, reason))
            }
            "NOTICE" => Ok(RelayMessage::Notice(string_at(&array, 0)?)),
            "CLOSED" => {
                let sub = string_at(&array, 0)?;
                let reason = string_at(&array, 1).unwrap_or_default();
                Ok(RelayMessage::Closed(sub, reason))
            }
            "AUTH" => Ok(RelayMessage::Auth(string_at(&array, 0)?)),
            other => Err(ErrorKind::MalformedMessage(format!("unknown label {other}")).into()),
        }
    }

    /// Encode as a relay would. Only used to script relays in tests.
    #[cfg(test)]
    pub fn to_json(&self) -> String {
        let value = match self {
            RelayMessage::Event(sub, event) => serde_json::json!(["EVENT", sub, event]),
            RelayMessage::Eose(sub) => serde_json::json!(["EOSE", sub]),
            RelayMessage::Ok(id, ok, reason) => serde_json::json!(["OK", id, ok, reason]),
            RelayMessage::Notice(s) => serde_json::json!(["NOTICE", s]),
            RelayMessage::Closed(sub, reason) => serde_json::json!(["CLOSED", sub, reason]),
            RelayMessage::Auth(challenge) => serde_json::json!(["AUTH", challenge]),
        };
        value.to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn test_client_message_json() {
        let req = ClientMessage::Req(
            "sub1".to_owned(),
            vec![Filter::new().kind(EventKind::MuteList).limit(1)],
        );
        assert_eq!(
            req.to_json().unwrap(),
            r#"["REQ","sub1",{"kinds":[10000],"limit":1}]"#
        );
        assert_eq!(
            ClientMessage::Close("sub1".to_owned()).to_json().unwrap(),
            r#"["CLOSE","sub1"]"#
        );
    }

    #[test]
    fn test_relay_message_parse() {
        assert_eq!(
            RelayMessage::from_json(r#"["EOSE","s"]"#).unwrap(),
            RelayMessage::Eose("s".to_owned())
        );
        assert_eq!(
            RelayMessage::from_json(r#"["OK","abc",false,"blocked: spam"]"#).unwrap(),
            RelayMessage::Ok("abc".to_owned(), false, "blocked: spam".to_owned())
        );
        assert_eq!(
            RelayMessage::from_json(r#"["OK","abc",true]"#).unwrap(),
            RelayMessage::Ok("abc".to_owned(), true, "".to_owned())
        );
        assert_eq!(
            RelayMessage::from_json(r#"["CLOSED","s","auth-required: no"]"#).unwrap(),
            RelayMessage::Closed("s".to_owned(), "auth-required: no".to_owned())
        );

        let event = r#"["EVENT","s",{"id":"aa","pubkey":"bb","created_at":1,"kind":0,"tags":[],"content":"","sig":"cc"}]"#;
        match RelayMessage::from_json(event).unwrap() {
            RelayMessage::Event(sub, e) => {
                assert_eq!(sub, "s");
                assert_eq!(e.pubkey, "bb");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_relay_message_errors() {
        let err = RelayMessage::from_json("not json").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MalformedMessage(_)));

        let err = RelayMessage::from_json(r#"["WHAT","s"]"#).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MalformedMessage(_)));

        let err = RelayMessage::from_json(r#"["EVENT","s",{"id":5}]"#).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MalformedEvent(_)));
    }
}
