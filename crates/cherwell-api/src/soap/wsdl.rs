// WSDL discovery
//
// Reads just enough of a WSDL 1.1 document to drive dispatch: the target
// namespace, the SOAP endpoint address, and for every operation the ordered
// child element names of its request wrapper in the embedded schema.

use std::collections::{HashMap, HashSet};

use crate::catalog::OperationDescriptor;
use crate::error::TransportError;
use crate::xml::{Element, parse_document};

/// What the service says about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescription {
    pub target_namespace: String,
    /// `soap:address/@location`, when the description carries one.
    pub endpoint: Option<String>,
    pub operations: Vec<OperationDescriptor>,
}

/// Parse WSDL text into a [`ServiceDescription`].
pub fn parse_wsdl(text: &str) -> Result<ServiceDescription, TransportError> {
    let doc = parse_document(text)?;
    let root = &doc.root;
    if root.local_name() != "definitions" {
        return Err(TransportError::Malformed(format!(
            "expected WSDL <definitions>, found <{}>",
            root.name()
        )));
    }

    let target_namespace = root.attr("targetNamespace").unwrap_or_default().to_owned();
    let request_params = schema_elements(root);
    let messages = message_elements(root);

    let mut seen = HashSet::new();
    let mut operations = Vec::new();
    for port_type in root.child_elements().filter(|e| e.local_name() == "portType") {
        for op in port_type
            .child_elements()
            .filter(|e| e.local_name() == "operation")
        {
            let Some(name) = op.attr("name") else {
                continue;
            };
            if !seen.insert(name.to_owned()) {
                continue;
            }
            let element = op
                .child("input")
                .and_then(|input| input.attr("message"))
                .and_then(|message| messages.get(strip_prefix(message)))
                .map_or(name, String::as_str);
            let parameters = request_params.get(element).cloned().unwrap_or_default();
            operations.push(OperationDescriptor {
                name: name.to_owned(),
                parameters,
            });
        }
    }

    Ok(ServiceDescription {
        target_namespace,
        endpoint: soap_address(root),
        operations,
    })
}

/// Top-level schema element name -> ordered sequence child names.
fn schema_elements(root: &Element) -> HashMap<String, Vec<String>> {
    let mut out = HashMap::new();
    for schema in root.descendants().filter(|e| e.local_name() == "schema") {
        for element in schema
            .child_elements()
            .filter(|e| e.local_name() == "element")
        {
            let Some(name) = element.attr("name") else {
                continue;
            };
            let params = element
                .child("complexType")
                .and_then(|ct| ct.child("sequence"))
                .map(|seq| {
                    seq.child_elements()
                        .filter(|e| e.local_name() == "element")
                        .filter_map(|e| e.attr("name").map(str::to_owned))
                        .collect()
                })
                .unwrap_or_default();
            out.insert(name.to_owned(), params);
        }
    }
    out
}

/// Message name -> local name of the element its first part refers to.
fn message_elements(root: &Element) -> HashMap<String, String> {
    root.child_elements()
        .filter(|e| e.local_name() == "message")
        .filter_map(|message| {
            let name = message.attr("name")?;
            let element = message.child("part")?.attr("element")?;
            Some((name.to_owned(), strip_prefix(element).to_owned()))
        })
        .collect()
}

/// Prefer the SOAP 1.1 address; fall back to any `address` element.
fn soap_address(root: &Element) -> Option<String> {
    let addresses: Vec<&Element> = root
        .descendants()
        .filter(|e| e.local_name() == "address" && e.attr("location").is_some())
        .collect();
    addresses
        .iter()
        .find(|e| e.name() == "soap:address")
        .or_else(|| addresses.first())
        .and_then(|e| e.attr("location"))
        .map(str::to_owned)
}

fn strip_prefix(qualified: &str) -> &str {
    qualified
        .rsplit_once(':')
        .map_or(qualified, |(_, local)| local)
}
