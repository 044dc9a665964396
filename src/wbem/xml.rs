//! CIM-XML codec
//!
//! Encodes the three request shapes the plugin needs (EnumerateInstances,
//! GetInstance, extrinsic method call) and decodes the matching responses
//! into [`CimInstance`] / [`MethodOutput`]. Responses are parsed into a small
//! element tree first, then walked.

use crate::domain::ports::{CimFault, CimInstance, CimValue, InstancePath, MethodOutput};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;

// =============================================================================
// Element Tree
// =============================================================================

/// One XML element with its attributes, children and concatenated text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<XmlNode>,
    pub text: String,
}

impl XmlNode {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, quick_xml::Error> {
        let mut node = XmlNode {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            ..Default::default()
        };
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            node.attrs.insert(key, attr.unescape_value()?.into_owned());
        }
        Ok(node)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn malformed(msg: impl std::fmt::Display) -> CimFault {
    CimFault::Http(format!("Malformed CIM-XML response: {}", msg))
}

/// Parse a document into a synthetic root node holding the top elements
pub fn parse_tree(xml: &str) -> Result<XmlNode, CimFault> {
    let mut reader = Reader::from_str(xml);
    let mut stack = vec![XmlNode::default()];

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(start) => stack.push(XmlNode::from_start(&start).map_err(malformed)?),
            Event::Empty(start) => {
                let node = XmlNode::from_start(&start).map_err(malformed)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(malformed)?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                let data = String::from_utf8_lossy(&data.into_inner()).into_owned();
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&data);
                }
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(malformed("unbalanced end tag"));
                }
                if let Some(node) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(node);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(malformed("unexpected end of document"));
    }
    stack.pop().ok_or_else(|| malformed("empty document"))
}

// =============================================================================
// Request Encoding
// =============================================================================

type XmlWriter = Writer<Vec<u8>>;

fn encode_failed(msg: impl std::fmt::Display) -> CimFault {
    CimFault::Http(format!("Unable to encode CIM-XML request: {}", msg))
}

fn start(w: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> quick_xml::Result<()> {
    let mut elem = BytesStart::new(name);
    for attr in attrs {
        elem.push_attribute(*attr);
    }
    w.write_event(Event::Start(elem))?;
    Ok(())
}

fn end(w: &mut XmlWriter, name: &str) -> quick_xml::Result<()> {
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn empty(w: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> quick_xml::Result<()> {
    let mut elem = BytesStart::new(name);
    for attr in attrs {
        elem.push_attribute(*attr);
    }
    w.write_event(Event::Empty(elem))?;
    Ok(())
}

fn value(w: &mut XmlWriter, text: &str) -> quick_xml::Result<()> {
    start(w, "VALUE", &[])?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    end(w, "VALUE")
}

/// Wrap `body` in the CIM/MESSAGE/SIMPLEREQ envelope
fn message<F>(message_id: u64, body: F) -> Result<String, CimFault>
where
    F: FnOnce(&mut XmlWriter) -> quick_xml::Result<()>,
{
    let mut w = Writer::new(Vec::new());
    let id = message_id.to_string();
    let envelope = |w: &mut XmlWriter| -> quick_xml::Result<()> {
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        start(w, "CIM", &[("CIMVERSION", "2.0"), ("DTDVERSION", "2.0")])?;
        start(w, "MESSAGE", &[("ID", id.as_str()), ("PROTOCOLVERSION", "1.0")])?;
        start(w, "SIMPLEREQ", &[])?;
        body(w)?;
        end(w, "SIMPLEREQ")?;
        end(w, "MESSAGE")?;
        end(w, "CIM")
    };
    envelope(&mut w).map_err(encode_failed)?;
    String::from_utf8(w.into_inner()).map_err(encode_failed)
}

fn write_local_namespace(w: &mut XmlWriter, namespace: &str) -> quick_xml::Result<()> {
    start(w, "LOCALNAMESPACEPATH", &[])?;
    for part in namespace.split('/').filter(|p| !p.is_empty()) {
        empty(w, "NAMESPACE", &[("NAME", part)])?;
    }
    end(w, "LOCALNAMESPACEPATH")
}

fn write_instance_name(w: &mut XmlWriter, path: &InstancePath) -> quick_xml::Result<()> {
    start(w, "INSTANCENAME", &[("CLASSNAME", path.class_name.as_str())])?;
    for (name, key) in &path.keybindings {
        start(w, "KEYBINDING", &[("NAME", name.as_str())])?;
        start(w, "KEYVALUE", &[("VALUETYPE", "string")])?;
        w.write_event(Event::Text(BytesText::new(key)))?;
        end(w, "KEYVALUE")?;
        end(w, "KEYBINDING")?;
    }
    end(w, "INSTANCENAME")
}

fn write_reference(w: &mut XmlWriter, path: &InstancePath) -> quick_xml::Result<()> {
    start(w, "VALUE.REFERENCE", &[])?;
    match &path.namespace {
        Some(ns) => {
            start(w, "LOCALINSTANCEPATH", &[])?;
            write_local_namespace(w, ns)?;
            write_instance_name(w, path)?;
            end(w, "LOCALINSTANCEPATH")?;
        }
        None => write_instance_name(w, path)?,
    }
    end(w, "VALUE.REFERENCE")
}

fn write_param(w: &mut XmlWriter, name: &str, param: &CimValue) -> quick_xml::Result<()> {
    if let CimValue::Null = param {
        return empty(w, "PARAMVALUE", &[("NAME", name)]);
    }

    start(w, "PARAMVALUE", &[("NAME", name), ("PARAMTYPE", param.type_name())])?;
    match param {
        CimValue::Null => {}
        CimValue::String(s) => value(w, s)?,
        CimValue::Uint32(v) => value(w, &v.to_string())?,
        CimValue::Uint64(v) => value(w, &v.to_string())?,
        CimValue::StringArray(items) => {
            start(w, "VALUE.ARRAY", &[])?;
            for item in items {
                value(w, item)?;
            }
            end(w, "VALUE.ARRAY")?;
        }
        CimValue::Reference(path) => write_reference(w, path)?,
        CimValue::ReferenceArray(paths) => {
            start(w, "VALUE.REFARRAY", &[])?;
            for path in paths {
                write_reference(w, path)?;
            }
            end(w, "VALUE.REFARRAY")?;
        }
    }
    end(w, "PARAMVALUE")
}

fn write_local_only(w: &mut XmlWriter) -> quick_xml::Result<()> {
    start(w, "IPARAMVALUE", &[("NAME", "LocalOnly")])?;
    value(w, "FALSE")?;
    end(w, "IPARAMVALUE")
}

/// EnumerateInstances request for every instance of `class_name`
pub fn enumerate_instances_request(
    message_id: u64,
    namespace: &str,
    class_name: &str,
) -> Result<String, CimFault> {
    message(message_id, |w| {
        start(w, "IMETHODCALL", &[("NAME", "EnumerateInstances")])?;
        write_local_namespace(w, namespace)?;
        start(w, "IPARAMVALUE", &[("NAME", "ClassName")])?;
        empty(w, "CLASSNAME", &[("NAME", class_name)])?;
        end(w, "IPARAMVALUE")?;
        write_local_only(w)?;
        end(w, "IMETHODCALL")
    })
}

/// GetInstance request for the instance at `path`
pub fn get_instance_request(
    message_id: u64,
    namespace: &str,
    path: &InstancePath,
) -> Result<String, CimFault> {
    message(message_id, |w| {
        start(w, "IMETHODCALL", &[("NAME", "GetInstance")])?;
        write_local_namespace(w, namespace)?;
        start(w, "IPARAMVALUE", &[("NAME", "InstanceName")])?;
        write_instance_name(w, path)?;
        end(w, "IPARAMVALUE")?;
        write_local_only(w)?;
        end(w, "IMETHODCALL")
    })
}

/// Extrinsic method call on the instance at `target`
pub fn method_call_request(
    message_id: u64,
    namespace: &str,
    method: &str,
    target: &InstancePath,
    params: &[(String, CimValue)],
) -> Result<String, CimFault> {
    message(message_id, |w| {
        start(w, "METHODCALL", &[("NAME", method)])?;
        start(w, "LOCALINSTANCEPATH", &[])?;
        write_local_namespace(w, target.namespace.as_deref().unwrap_or(namespace))?;
        write_instance_name(w, target)?;
        end(w, "LOCALINSTANCEPATH")?;
        for (name, param) in params {
            write_param(w, name, param)?;
        }
        end(w, "METHODCALL")
    })
}

// =============================================================================
// Response Decoding
// =============================================================================

fn namespace_of(local_ns: &XmlNode) -> String {
    local_ns
        .children_named("NAMESPACE")
        .filter_map(|n| n.attr("NAME"))
        .collect::<Vec<_>>()
        .join("/")
}

fn decode_instance_name(node: &XmlNode) -> Result<InstancePath, CimFault> {
    let class_name = node
        .attr("CLASSNAME")
        .ok_or_else(|| malformed("INSTANCENAME without CLASSNAME"))?;
    let mut path = InstancePath::new(class_name);

    for kb in node.children_named("KEYBINDING") {
        let name = kb
            .attr("NAME")
            .ok_or_else(|| malformed("KEYBINDING without NAME"))?;
        let value = match (kb.child("KEYVALUE"), kb.child("VALUE.REFERENCE")) {
            (Some(kv), _) => kv.text.clone(),
            (None, Some(reference)) => decode_reference(reference)?.to_string(),
            (None, None) => String::new(),
        };
        path.keybindings.insert(name.to_string(), value);
    }
    // single unnamed key
    if let Some(kv) = node.child("KEYVALUE") {
        path.keybindings.insert(String::new(), kv.text.clone());
    }
    Ok(path)
}

fn decode_reference(node: &XmlNode) -> Result<InstancePath, CimFault> {
    if let Some(name) = node.child("INSTANCENAME") {
        return decode_instance_name(name);
    }
    if let Some(local) = node.child("LOCALINSTANCEPATH") {
        let name = local
            .child("INSTANCENAME")
            .ok_or_else(|| malformed("LOCALINSTANCEPATH without INSTANCENAME"))?;
        let mut path = decode_instance_name(name)?;
        path.namespace = local.child("LOCALNAMESPACEPATH").map(namespace_of);
        return Ok(path);
    }
    if let Some(full) = node.child("INSTANCEPATH") {
        let name = full
            .child("INSTANCENAME")
            .ok_or_else(|| malformed("INSTANCEPATH without INSTANCENAME"))?;
        let mut path = decode_instance_name(name)?;
        path.namespace = full
            .child("NAMESPACEPATH")
            .and_then(|ns| ns.child("LOCALNAMESPACEPATH"))
            .map(namespace_of);
        return Ok(path);
    }
    Err(malformed("VALUE.REFERENCE without instance path"))
}

/// Decode the value held by a PROPERTY*, PARAMVALUE or RETURNVALUE element
fn decode_value(node: &XmlNode) -> Result<CimValue, CimFault> {
    if let Some(value) = node.child("VALUE") {
        return Ok(CimValue::String(value.text.clone()));
    }
    if let Some(array) = node.child("VALUE.ARRAY") {
        let items = array
            .children_named("VALUE")
            .map(|v| v.text.clone())
            .collect();
        return Ok(CimValue::StringArray(items));
    }
    if let Some(reference) = node.child("VALUE.REFERENCE") {
        return Ok(CimValue::Reference(decode_reference(reference)?));
    }
    if let Some(refs) = node.child("VALUE.REFARRAY") {
        let paths = refs
            .children_named("VALUE.REFERENCE")
            .map(decode_reference)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(CimValue::ReferenceArray(paths));
    }
    Ok(CimValue::Null)
}

fn decode_instance(node: &XmlNode, path: InstancePath) -> Result<CimInstance, CimFault> {
    let mut inst = CimInstance::new(path);
    for prop in &node.children {
        if !matches!(
            prop.name.as_str(),
            "PROPERTY" | "PROPERTY.ARRAY" | "PROPERTY.REFERENCE"
        ) {
            continue;
        }
        let name = prop
            .attr("NAME")
            .ok_or_else(|| malformed("PROPERTY without NAME"))?;
        inst.properties.insert(name.to_string(), decode_value(prop)?);
    }
    Ok(inst)
}

/// Locate the response element, surfacing a CIM `<ERROR>` as a fault
fn response_body<'a>(root: &'a XmlNode, element: &str) -> Result<&'a XmlNode, CimFault> {
    let response = root
        .child("CIM")
        .and_then(|cim| cim.child("MESSAGE"))
        .and_then(|msg| msg.child("SIMPLERSP"))
        .and_then(|rsp| rsp.child(element))
        .ok_or_else(|| malformed(format!("no {} element", element)))?;

    if let Some(error) = response.child("ERROR") {
        let code = error
            .attr("CODE")
            .and_then(|c| c.trim().parse::<u32>().ok())
            .unwrap_or(1);
        return Err(CimFault::Cim {
            code,
            description: error.attr("DESCRIPTION").unwrap_or_default().to_string(),
        });
    }
    Ok(response)
}

/// Decode an EnumerateInstances response
pub fn decode_enumerate_instances(xml: &str) -> Result<Vec<CimInstance>, CimFault> {
    let root = parse_tree(xml)?;
    let response = response_body(&root, "IMETHODRESPONSE")?;
    let ret = match response.child("IRETURNVALUE") {
        Some(ret) => ret,
        None => return Ok(Vec::new()),
    };

    ret.children_named("VALUE.NAMEDINSTANCE")
        .map(|named| {
            let name = named
                .child("INSTANCENAME")
                .ok_or_else(|| malformed("VALUE.NAMEDINSTANCE without INSTANCENAME"))?;
            let inst = named
                .child("INSTANCE")
                .ok_or_else(|| malformed("VALUE.NAMEDINSTANCE without INSTANCE"))?;
            decode_instance(inst, decode_instance_name(name)?)
        })
        .collect()
}

/// Decode a GetInstance response; the path is not echoed back by the CIMOM
pub fn decode_get_instance(xml: &str, path: &InstancePath) -> Result<CimInstance, CimFault> {
    let root = parse_tree(xml)?;
    let response = response_body(&root, "IMETHODRESPONSE")?;
    let inst = response
        .child("IRETURNVALUE")
        .and_then(|ret| ret.child("INSTANCE"))
        .ok_or_else(|| malformed("GetInstance returned no INSTANCE"))?;
    decode_instance(inst, path.clone())
}

/// Decode an extrinsic method response
pub fn decode_method_response(xml: &str) -> Result<MethodOutput, CimFault> {
    let root = parse_tree(xml)?;
    let response = response_body(&root, "METHODRESPONSE")?;

    let return_value = match response.child("RETURNVALUE").map(decode_value).transpose()? {
        Some(CimValue::String(raw)) => raw
            .trim()
            .parse::<u32>()
            .map_err(|e| malformed(format!("return value '{}': {}", raw, e)))?,
        _ => return Err(malformed("METHODRESPONSE without RETURNVALUE")),
    };

    let mut out = MethodOutput {
        return_value,
        out_params: BTreeMap::new(),
    };
    for param in response.children_named("PARAMVALUE") {
        let name = param
            .attr("NAME")
            .ok_or_else(|| malformed("PARAMVALUE without NAME"))?;
        out.out_params.insert(name.to_string(), decode_value(param)?);
    }
    Ok(out)
}
