//! SOAP wire binding for the ticketing RPC endpoints
//!
//! Both service generations speak SOAP 1.1 in RPC/encoded style. This module
//! turns a [`Call`] into a request envelope and a response envelope back into
//! a [`Reply`] tree; it knows nothing about HTTP or credentials.
//!
//! # Wire Format
//!
//! ## Request
//! ```text
//! <SOAP-ENV:Envelope ...><SOAP-ENV:Body>
//!   <ns1:Dispatch>
//!     <param0 xsi:type="xsd:string">user</param0>
//!     <param1 xsi:type="xsd:string">secret</param1>
//!     ...
//!   </ns1:Dispatch>
//! </SOAP-ENV:Body></SOAP-ENV:Envelope>
//! ```
//! Positional arguments are named `param0..N`; named parameters use their
//! own names. Lists become `SOAP-ENC:Array`s of `item`s, maps become structs.
//!
//! ## Response
//! ```text
//! <soap:Body><TicketGetResponse> part* </TicketGetResponse></soap:Body>
//! <soap:Body><soap:Fault><faultcode/><faultstring/></soap:Fault></soap:Body>
//! ```

use std::fmt::Write as _;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::value::Value;

const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const ENCODING_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";
const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// A remote invocation in one of the two request shapes
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// Unnamed arguments, in order
    Positional { method: String, args: Vec<Value> },

    /// Explicitly named arguments, in order
    Named {
        method: String,
        params: Vec<(String, Value)>,
    },
}

/// Reply as decoded from the wire, before any dialect-specific interpretation
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Scalar(Value),
    Sequence(Vec<Reply>),
    Record(Vec<(String, Reply)>),
}

/// Remote-side fault carried in a response envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub code: String,
    pub message: String,
}

/// Decoded response envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Reply(Reply),
    Fault(Fault),
}

/// Wire protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("invalid element name: {0:?}")]
    InvalidName(String),
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

impl Call {
    pub fn method(&self) -> &str {
        match self {
            Call::Positional { method, .. } | Call::Named { method, .. } => method,
        }
    }

    /// Check that the method and every parameter or struct field name can be
    /// written as an XML element name
    pub fn validate(&self) -> Result<(), ProtocolError> {
        check_name(self.method())?;
        match self {
            Call::Positional { args, .. } => args.iter().try_for_each(check_value_names),
            Call::Named { params, .. } => params.iter().try_for_each(|(name, value)| {
                check_name(name)?;
                check_value_names(value)
            }),
        }
    }

    /// Encode as a complete SOAP request envelope
    pub fn encode(&self, namespace: &str) -> Result<String, ProtocolError> {
        self.validate()?;
        let method = self.method();

        let mut out = String::with_capacity(512);
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        let _ = write!(
            out,
            r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="{ENVELOPE_NS}" xmlns:ns1="{ns}" xmlns:xsd="{XSD_NS}" xmlns:xsi="{XSI_NS}" xmlns:SOAP-ENC="{ENCODING_NS}" SOAP-ENV:encodingStyle="{ENCODING_NS}">"#,
            ns = escape(namespace),
        );
        let _ = write!(out, "<SOAP-ENV:Body><ns1:{method}>");

        match self {
            Call::Positional { args, .. } => {
                for (i, arg) in args.iter().enumerate() {
                    encode_value(&mut out, &format!("param{i}"), arg);
                }
            }
            Call::Named { params, .. } => {
                for (name, value) in params {
                    encode_value(&mut out, name, value);
                }
            }
        }

        let _ = write!(out, "</ns1:{method}></SOAP-ENV:Body></SOAP-ENV:Envelope>");
        Ok(out)
    }
}

/// Element names must be plain XML names; anything else would corrupt the envelope.
fn check_name(name: &str) -> Result<(), ProtocolError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ProtocolError::InvalidName(name.to_string()))
    }
}

fn check_value_names(value: &Value) -> Result<(), ProtocolError> {
    match value {
        Value::List(items) => items.iter().try_for_each(check_value_names),
        Value::Map(map) => map.iter().try_for_each(|(key, item)| {
            check_name(key)?;
            check_value_names(item)
        }),
        _ => Ok(()),
    }
}

/// Names are checked by [`Call::validate`] before anything is written
fn encode_value(out: &mut String, name: &str, value: &Value) {
    match value {
        Value::Null => {
            let _ = write!(out, r#"<{name} xsi:nil="true"/>"#);
        }
        Value::Bool(b) => {
            let _ = write!(out, r#"<{name} xsi:type="xsd:boolean">{b}</{name}>"#);
        }
        Value::Int(n) => {
            let _ = write!(out, r#"<{name} xsi:type="xsd:int">{n}</{name}>"#);
        }
        Value::Float(f) => {
            let _ = write!(out, r#"<{name} xsi:type="xsd:double">{f}</{name}>"#);
        }
        Value::Str(s) => {
            let _ = write!(out, r#"<{name} xsi:type="xsd:string">{}</{name}>"#, escape(s.as_str()));
        }
        Value::List(items) => {
            let _ = write!(
                out,
                r#"<{name} SOAP-ENC:arrayType="xsd:anyType[{}]" xsi:type="SOAP-ENC:Array">"#,
                items.len()
            );
            for item in items {
                encode_value(out, "item", item);
            }
            let _ = write!(out, "</{name}>");
        }
        Value::Map(map) => {
            let _ = write!(out, r#"<{name} xsi:type="SOAP-ENC:Struct">"#);
            for (key, item) in map {
                encode_value(out, key, item);
            }
            let _ = write!(out, "</{name}>");
        }
    }
}

/// Minimal element tree; namespaces are dropped, only local names are kept
#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self, ProtocolError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            ..Default::default()
        })
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Local part of the `xsi:type` attribute (`xsd:int` -> `int`)
    fn xsi_type(&self) -> Option<&str> {
        self.attr("type")
            .map(|t| t.rsplit_once(':').map_or(t, |(_, local)| local))
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }
}

fn parse_tree(xml: &str) -> Result<Element, ProtocolError> {
    // Text is kept verbatim: leaf values may carry meaningful whitespace, and
    // formatting between child elements is ignored by the decoder.
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<Element> = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(Element::open(&start)?),
            Event::Empty(start) => {
                let element = Element::open(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ProtocolError::Malformed("unbalanced end tag".into()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => {
                return Err(ProtocolError::Malformed("unexpected end of document".into()));
            }
            _ => {}
        }
    }
}

/// Decode a SOAP response envelope
pub fn decode_envelope(xml: &str) -> Result<Envelope, ProtocolError> {
    let root = parse_tree(xml)?;
    if root.name != "Envelope" {
        return Err(ProtocolError::Malformed(format!(
            "expected Envelope, got {}",
            root.name
        )));
    }
    let body = root
        .child("Body")
        .ok_or_else(|| ProtocolError::Malformed("missing Body".into()))?;
    let response = body
        .children
        .first()
        .ok_or_else(|| ProtocolError::Malformed("empty Body".into()))?;

    if response.name == "Fault" {
        let field = |name: &str| {
            response
                .child(name)
                .map(|c| c.text.trim().to_string())
                .unwrap_or_default()
        };
        return Ok(Envelope::Fault(Fault {
            code: field("faultcode"),
            message: field("faultstring"),
        }));
    }

    Ok(Envelope::Reply(Reply::Record(
        response
            .children
            .iter()
            .map(|part| (part.name.clone(), decode_element(part)))
            .collect(),
    )))
}

fn decode_element(element: &Element) -> Reply {
    if matches!(element.attr("nil"), Some("true" | "1")) {
        return Reply::Scalar(Value::Null);
    }

    let ty = element.xsi_type();
    if ty == Some("Array") || element.attr("arrayType").is_some() {
        return Reply::Sequence(element.children.iter().map(decode_element).collect());
    }
    if ty == Some("Struct") || !element.children.is_empty() {
        return Reply::Record(
            element
                .children
                .iter()
                .map(|c| (c.name.clone(), decode_element(c)))
                .collect(),
        );
    }

    Reply::Scalar(decode_scalar(ty, &element.text))
}

fn decode_scalar(ty: Option<&str>, text: &str) -> Value {
    match ty {
        Some(
            "int" | "integer" | "long" | "short" | "byte" | "unsignedInt" | "unsignedLong"
            | "unsignedShort" | "nonNegativeInteger" | "positiveInteger",
        ) => text
            .trim()
            .parse()
            .map_or_else(|_| Value::Str(text.to_string()), Value::Int),
        Some("double" | "float" | "decimal") => text
            .trim()
            .parse()
            .map_or_else(|_| Value::Str(text.to_string()), Value::Float),
        Some("boolean") => Value::Bool(matches!(text.trim(), "true" | "1")),
        _ => Value::Str(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    fn envelope(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><soap:Envelope xmlns:soap="{ENVELOPE_NS}" xmlns:xsi="{XSI_NS}" xmlns:xsd="{XSD_NS}" xmlns:soapenc="{ENCODING_NS}"><soap:Body>{body}</soap:Body></soap:Envelope>"#
        )
    }

    #[test]
    fn encode_positional_names_params_in_order() {
        let call = Call::Positional {
            method: "Dispatch".into(),
            args: vec!["agent".into(), "TicketObject".into(), Value::Int(42)],
        };
        let xml = call.encode("Core").unwrap();
        assert!(xml.contains(r#"xmlns:ns1="Core""#));
        assert!(xml.contains("<ns1:Dispatch>"));
        let p0 = xml.find(r#"<param0 xsi:type="xsd:string">agent</param0>"#).unwrap();
        let p2 = xml.find(r#"<param2 xsi:type="xsd:int">42</param2>"#).unwrap();
        assert!(p0 < p2);
    }

    #[test]
    fn encode_named_nested_struct_and_nil() {
        let call = Call::Named {
            method: "TicketCreate".into(),
            params: vec![
                ("UserLogin".into(), "agent".into()),
                ("Ticket".into(), params! { "Title" => "a < b", "QueueID" => 2 }.into()),
                ("Owner".into(), Value::Null),
            ],
        };
        let xml = call.encode("http://www.otrs.org/TicketConnector/").unwrap();
        assert!(xml.contains(r#"<Ticket xsi:type="SOAP-ENC:Struct"><Title xsi:type="xsd:string">a &lt; b</Title><QueueID xsi:type="xsd:int">2</QueueID></Ticket>"#));
        assert!(xml.contains(r#"<Owner xsi:nil="true"/>"#));
    }

    #[test]
    fn encode_list_as_array() {
        let call = Call::Named {
            method: "TicketSearch".into(),
            params: vec![("StateType".into(), vec!["open".into(), "new".into()].into())],
        };
        let xml = call.encode("ns").unwrap();
        assert!(xml.contains(r#"<StateType SOAP-ENC:arrayType="xsd:anyType[2]" xsi:type="SOAP-ENC:Array"><item xsi:type="xsd:string">open</item>"#));
    }

    #[test]
    fn encode_rejects_bad_names() {
        let call = Call::Named {
            method: "TicketGet".into(),
            params: vec![("bad key".into(), Value::Int(1))],
        };
        assert!(matches!(call.encode("ns"), Err(ProtocolError::InvalidName(_))));
    }

    #[test]
    fn decode_flat_parts_as_record() {
        let xml = envelope(
            r#"<DispatchResponse xmlns="Core"><s-gensym3 xsi:type="xsd:string">TicketID</s-gensym3><s-gensym5 xsi:type="xsd:int">42</s-gensym5></DispatchResponse>"#,
        );
        let Envelope::Reply(reply) = decode_envelope(&xml).unwrap() else {
            panic!("expected reply");
        };
        assert_eq!(
            reply,
            Reply::Record(vec![
                ("s-gensym3".into(), Reply::Scalar("TicketID".into())),
                ("s-gensym5".into(), Reply::Scalar(Value::Int(42))),
            ])
        );
    }

    #[test]
    fn decode_arrays_structs_and_nil() {
        let xml = envelope(
            r#"<TicketGetResponse><Ticket><Title>Broken &amp; bent</Title><Owner xsi:nil="true"/><Flags soapenc:arrayType="xsd:anyType[2]"><item xsi:type="xsd:boolean">true</item><item xsi:type="xsd:double">1.5</item></Flags></Ticket></TicketGetResponse>"#,
        );
        let Envelope::Reply(reply) = decode_envelope(&xml).unwrap() else {
            panic!("expected reply");
        };
        assert_eq!(
            reply,
            Reply::Record(vec![(
                "Ticket".into(),
                Reply::Record(vec![
                    ("Title".into(), Reply::Scalar("Broken & bent".into())),
                    ("Owner".into(), Reply::Scalar(Value::Null)),
                    (
                        "Flags".into(),
                        Reply::Sequence(vec![
                            Reply::Scalar(Value::Bool(true)),
                            Reply::Scalar(Value::Float(1.5)),
                        ])
                    ),
                ])
            )])
        );
    }

    #[test]
    fn decode_empty_response() {
        let xml = envelope("<TicketSearchResponse/>");
        assert_eq!(
            decode_envelope(&xml).unwrap(),
            Envelope::Reply(Reply::Record(vec![]))
        );
    }

    #[test]
    fn decode_fault() {
        let xml = envelope(
            "<soap:Fault><faultcode>soap:Server</faultcode><faultstring>TicketGet.AccessDenied</faultstring></soap:Fault>",
        );
        assert_eq!(
            decode_envelope(&xml).unwrap(),
            Envelope::Fault(Fault {
                code: "soap:Server".into(),
                message: "TicketGet.AccessDenied".into(),
            })
        );
    }

    #[test]
    fn decode_rejects_non_envelope() {
        assert!(matches!(
            decode_envelope("<html><body>502</body></html>"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(decode_envelope(&envelope("")).is_err());
        assert!(decode_envelope("<soap:Envelope><soap:Body>").is_err());
    }

    #[test]
    fn decode_keeps_leaf_text_verbatim() {
        let xml = envelope(
            "<TicketGetResponse><Body>  indented line\n</Body><Blank> </Blank></TicketGetResponse>",
        );
        let Envelope::Reply(reply) = decode_envelope(&xml).unwrap() else {
            panic!("expected reply");
        };
        assert_eq!(
            reply,
            Reply::Record(vec![
                ("Body".into(), Reply::Scalar("  indented line\n".into())),
                ("Blank".into(), Reply::Scalar(" ".into())),
            ])
        );
    }

    #[test]
    fn decode_ignores_formatting_between_elements() {
        let xml = format!(
            "<?xml version=\"1.0\"?>\n<soap:Envelope xmlns:soap=\"{ENVELOPE_NS}\" xmlns:xsi=\"{XSI_NS}\">\n  <soap:Body>\n    <TicketGetResponse>\n      <Ticket>\n        <TicketID xsi:type=\"xsd:int\"> 7 </TicketID>\n      </Ticket>\n    </TicketGetResponse>\n  </soap:Body>\n</soap:Envelope>\n"
        );
        assert_eq!(
            decode_envelope(&xml).unwrap(),
            Envelope::Reply(Reply::Record(vec![(
                "Ticket".into(),
                Reply::Record(vec![("TicketID".into(), Reply::Scalar(Value::Int(7)))])
            )]))
        );
    }

    #[test]
    fn decode_empty_struct_as_record() {
        let xml = envelope(
            r#"<TicketGetResponse><Ticket xsi:type="SOAP-ENC:Struct"/><Empty xsi:type="SOAP-ENC:Struct">  </Empty></TicketGetResponse>"#,
        );
        assert_eq!(
            decode_envelope(&xml).unwrap(),
            Envelope::Reply(Reply::Record(vec![
                ("Ticket".into(), Reply::Record(vec![])),
                ("Empty".into(), Reply::Record(vec![])),
            ]))
        );
    }

    #[test]
    fn validate_checks_nested_names() {
        let call = Call::Named {
            method: "TicketCreate".into(),
            params: vec![("Ticket".into(), params! { "bad key" => 1 }.into())],
        };
        assert!(matches!(call.validate(), Err(ProtocolError::InvalidName(name)) if name == "bad key"));

        let call = Call::Positional {
            method: "Dispatch".into(),
            args: vec![vec![Value::from(params! { "Title" => "ok" })].into()],
        };
        assert!(call.validate().is_ok());
    }
}
