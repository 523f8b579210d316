// SOAP 1.1 envelope codec
//
// Requests use the document/literal wrapped style: one element named after
// the operation, in the service namespace, with one child per parameter.
// Responses are reduced to a nested JSON value keyed by element local names.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::TransportError;
use crate::xml::{Declaration, Element, XmlDocument, XmlError, parse_document};

pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// Build the request envelope for `operation`.
pub fn build_request(
    namespace: &str,
    operation: &str,
    params: &IndexMap<String, String>,
) -> Result<String, XmlError> {
    let mut call = Element::new(operation).with_attr("xmlns", namespace);
    for (name, value) in params {
        call.push_child(Element::new(name.as_str()).with_text(value.as_str()));
    }

    let envelope = Element::new("soap:Envelope")
        .with_attr("xmlns:soap", SOAP_ENV_NS)
        .with_attr("xmlns:xsi", XSI_NS)
        .with_attr("xmlns:xsd", XSD_NS)
        .with_child(Element::new("soap:Body").with_child(call));

    let mut doc = XmlDocument::new(envelope);
    doc.declaration = Some(Declaration {
        version: "1.0".into(),
        encoding: Some("utf-8".into()),
        standalone: None,
    });
    doc.to_xml()
}

/// SOAPAction header value (unquoted) for `operation`.
pub fn soap_action(namespace: &str, operation: &str) -> String {
    if namespace.ends_with('/') {
        format!("{namespace}{operation}")
    } else {
        format!("{namespace}/{operation}")
    }
}

/// Parse a response envelope into its body value.
///
/// A `soap:Fault` in the body becomes [`TransportError::Fault`]. Otherwise
/// the first body element is returned as `{ localName: value }`.
pub fn parse_response(text: &str) -> Result<Value, TransportError> {
    let doc = parse_document(text)?;
    let root = &doc.root;
    if root.local_name() != "Envelope" {
        return Err(TransportError::Malformed(format!(
            "expected SOAP Envelope, found <{}>",
            root.name()
        )));
    }
    let body = root
        .child("Body")
        .ok_or_else(|| TransportError::Malformed("SOAP Envelope has no Body".into()))?;

    if let Some(fault) = body.child("Fault") {
        return Err(fault_from(fault));
    }

    let mut out = Map::new();
    if let Some(first) = body.child_elements().next() {
        out.insert(first.local_name().to_owned(), element_to_value(first));
    }
    Ok(Value::Object(out))
}

fn fault_from(fault: &Element) -> TransportError {
    let text_of = |name: &str| {
        fault
            .child(name)
            .map(|e| e.text().trim().to_owned())
            .unwrap_or_default()
    };
    let detail = fault
        .child("detail")
        .map(|d| d.text().trim().to_owned())
        .filter(|d| !d.is_empty());
    TransportError::Fault {
        code: text_of("faultcode"),
        message: text_of("faultstring"),
        detail,
    }
}

/// Element -> JSON.
///
/// Elements with element children become objects; a repeated child name
/// collects into an array. Leaves become strings, or null when empty or
/// marked `xsi:nil`.
pub fn element_to_value(element: &Element) -> Value {
    if element.attr_local("nil") == Some("true") {
        return Value::Null;
    }
    if !element.has_element_children() {
        let text = element.text();
        return if text.is_empty() {
            Value::Null
        } else {
            Value::String(text)
        };
    }

    let mut map = Map::new();
    for child in element.child_elements() {
        let key = child.local_name().to_owned();
        let value = element_to_value(child);
        match map.get_mut(&key) {
            None => {
                map.insert(key, value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    Value::Object(map)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn request_wraps_parameters_in_operation_element() {
        let mut params = IndexMap::new();
        params.insert("userId".to_owned(), "odo".to_owned());
        params.insert("password".to_owned(), "a<b".to_owned());
        let text = build_request("http://cherwellsoftware.com", "Login", &params).unwrap();

        let doc = parse_document(&text).unwrap();
        assert_eq!(doc.root.name(), "soap:Envelope");
        let call = doc.root.child("Body").unwrap().child("Login").unwrap();
        assert_eq!(call.attr("xmlns"), Some("http://cherwellsoftware.com"));
        let names: Vec<&str> = call.child_elements().map(Element::name).collect();
        assert_eq!(names, ["userId", "password"]);
        assert_eq!(call.child("password").unwrap().text(), "a<b");
    }

    #[test]
    fn soap_action_joins_namespace_and_operation() {
        assert_eq!(
            soap_action("http://cherwellsoftware.com", "Login"),
            "http://cherwellsoftware.com/Login"
        );
        assert_eq!(
            soap_action("http://tempuri.org/", "Login"),
            "http://tempuri.org/Login"
        );
    }

    #[test]
    fn response_body_becomes_nested_value() {
        let text = r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <LoginResponse xmlns="http://cherwellsoftware.com">
      <LoginResult>true</LoginResult>
    </LoginResponse>
  </soap:Body>
</soap:Envelope>"#;
        let value = parse_response(text).unwrap();
        assert_eq!(value, json!({"LoginResponse": {"LoginResult": "true"}}));
    }

    #[test]
    fn nil_and_empty_leaves_are_null_and_repeats_are_arrays() {
        let text = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <soap:Body>
    <ListResponse>
      <ListResult><Item>a</Item><Item>b</Item><Item>c</Item></ListResult>
      <Empty/>
      <Nil xsi:nil="true"/>
    </ListResponse>
  </soap:Body>
</soap:Envelope>"#;
        let value = parse_response(text).unwrap();
        assert_eq!(
            value,
            json!({"ListResponse": {
                "ListResult": {"Item": ["a", "b", "c"]},
                "Empty": null,
                "Nil": null,
            }})
        );
    }

    #[test]
    fn fault_is_reported_with_detail() {
        let text = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <soap:Fault>
      <faultcode>soap:Server</faultcode>
      <faultstring>Server was unable to process request.</faultstring>
      <detail>Object reference not set</detail>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#;
        let err = parse_response(text).unwrap_err();
        match err {
            TransportError::Fault {
                code,
                message,
                detail,
            } => {
                assert_eq!(code, "soap:Server");
                assert_eq!(message, "Server was unable to process request.");
                assert_eq!(detail.as_deref(), Some("Object reference not set"));
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn non_envelope_is_malformed() {
        let err = parse_response("<html/>").unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
    }
}
