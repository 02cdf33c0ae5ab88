//! XML serialization of documents
//!
//! The wire shape is the LSX envelope: a `<save>` element holding a
//! `<version/>` header and a single `<region>` wrapping the root node.
//! Attributes are `<attribute id type value/>` elements (or `handle`/`version`
//! for localization-bound ones), children sit under a `<children>` element,
//! and inline comments survive the round trip.

use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::attr::{Attribute, AttrValue, TRANSLATED_STRING};
use crate::document::{DocVersion, Document};
use crate::error::DocumentError;
use crate::node::{ChildEntry, NodeData, NodeEntry, NodeHandle};

fn xml_err(err: impl std::fmt::Display) -> DocumentError {
    DocumentError::Xml(err.to_string())
}

/// Parse a document from LSX text
pub fn from_str(input: &str) -> Result<Document, DocumentError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut version = DocVersion::default();
    let mut region_id = String::new();
    let mut doc: Option<Document> = None;
    // (node, whether the cursor sits inside its <children> container)
    let mut stack: Vec<(NodeHandle, bool)> = Vec::new();

    loop {
        let event = reader.read_event().map_err(xml_err)?;
        match event {
            Event::Decl(_) | Event::Text(_) => {}
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"save" => {}
                    b"version" => version = parse_version(e)?,
                    b"region" => {
                        region_id = element_attr(e, "id")?.unwrap_or_default();
                    }
                    b"children" => {
                        let (handle, in_children) = stack
                            .last_mut()
                            .ok_or_else(|| xml_err("<children> outside of a node"))?;
                        *in_children = !is_empty;
                        let doc = doc
                            .as_mut()
                            .ok_or_else(|| xml_err("<children> before root node"))?;
                        doc.node_mut(*handle).children.get_or_insert_with(Vec::new);
                    }
                    b"node" => {
                        let data = NodeData::new(
                            element_attr(e, "id")?,
                            element_attr(e, "key")?,
                        );
                        let handle = match doc.as_mut() {
                            None => {
                                // First node becomes the document root
                                let mut new_doc = Document::new(
                                    region_id.clone(),
                                    crate::node::NodeSpec::anonymous(),
                                );
                                new_doc.version = version;
                                *new_doc.node_mut(new_doc.root()) = data;
                                let root = new_doc.root();
                                doc = Some(new_doc);
                                root
                            }
                            Some(doc) => {
                                let handle = doc.alloc(data);
                                let (parent, in_children) = stack
                                    .last()
                                    .copied()
                                    .ok_or_else(|| xml_err("second top-level node in region"))?;
                                if !in_children {
                                    return Err(xml_err("node outside a <children> container"));
                                }
                                if let Some(container) = &mut doc.node_mut(parent).children {
                                    container.push(ChildEntry::Node(handle));
                                }
                                handle
                            }
                        };
                        if !is_empty {
                            stack.push((handle, false));
                        }
                    }
                    b"attribute" => {
                        let attr = parse_attribute(e)?;
                        let (handle, _) = stack
                            .last()
                            .copied()
                            .ok_or_else(|| xml_err("<attribute> outside of a node"))?;
                        let doc = doc
                            .as_mut()
                            .ok_or_else(|| xml_err("<attribute> before root node"))?;
                        doc.node_mut(handle).entries.push(NodeEntry::Attribute(attr));
                    }
                    other => {
                        return Err(xml_err(format!(
                            "unexpected element <{}>",
                            String::from_utf8_lossy(other)
                        )));
                    }
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"node" => {
                    stack.pop();
                }
                b"children" => {
                    if let Some((_, in_children)) = stack.last_mut() {
                        *in_children = false;
                    }
                }
                _ => {}
            },
            Event::Comment(ref e) => {
                let text = e.unescape().map_err(xml_err)?.into_owned();
                let doc = match doc.as_mut() {
                    Some(doc) => doc,
                    // comments before the root node are dropped
                    None => continue,
                };
                if let Some((handle, in_children)) = stack.last().copied() {
                    if in_children {
                        let comment = doc.intern_comment(text);
                        if let Some(container) = &mut doc.node_mut(handle).children {
                            container.push(ChildEntry::Comment(comment));
                        }
                    } else {
                        doc.node_mut(handle).entries.push(NodeEntry::Comment(text));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let mut doc = doc.ok_or_else(|| xml_err("document has no root node"))?;
    doc.region_id = region_id;
    doc.version = version;
    Ok(doc)
}

/// Serialize a document to LSX text
pub fn to_string(doc: &Document) -> Result<String, DocumentError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;

    writer
        .write_event(Event::Start(BytesStart::new("save")))
        .map_err(xml_err)?;

    let mut version = BytesStart::new("version");
    version.push_attribute(("major", doc.version.major.to_string().as_str()));
    version.push_attribute(("minor", doc.version.minor.to_string().as_str()));
    version.push_attribute(("revision", doc.version.revision.to_string().as_str()));
    version.push_attribute(("build", doc.version.build.to_string().as_str()));
    writer.write_event(Event::Empty(version)).map_err(xml_err)?;

    let mut region = BytesStart::new("region");
    region.push_attribute(("id", doc.region_id.as_str()));
    writer.write_event(Event::Start(region)).map_err(xml_err)?;

    write_node(&mut writer, doc, doc.root())?;

    writer
        .write_event(Event::End(BytesEnd::new("region")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("save")))
        .map_err(xml_err)?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| DocumentError::Xml(format!("serialized document is not UTF-8: {e}")))
}

fn write_node<W: std::io::Write>(
    writer: &mut Writer<W>,
    doc: &Document,
    handle: NodeHandle,
) -> Result<(), DocumentError> {
    let node = doc.node(handle);
    let mut start = BytesStart::new("node");
    if let Some(id) = &node.id {
        start.push_attribute(("id", id.as_str()));
    }
    if let Some(key) = &node.key {
        start.push_attribute(("key", key.as_str()));
    }

    let empty = node.entries.is_empty() && node.children.is_none();
    if empty {
        writer.write_event(Event::Empty(start)).map_err(xml_err)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(xml_err)?;

    for entry in &node.entries {
        match entry {
            NodeEntry::Attribute(attr) => write_attribute(writer, attr)?,
            NodeEntry::Comment(text) => {
                writer
                    .write_event(Event::Comment(BytesText::new(text)))
                    .map_err(xml_err)?;
            }
        }
    }

    if let Some(container) = &node.children {
        if container.is_empty() {
            writer
                .write_event(Event::Empty(BytesStart::new("children")))
                .map_err(xml_err)?;
        } else {
            writer
                .write_event(Event::Start(BytesStart::new("children")))
                .map_err(xml_err)?;
            for entry in container {
                match entry {
                    ChildEntry::Node(child) => write_node(writer, doc, *child)?,
                    ChildEntry::Comment(comment) => {
                        writer
                            .write_event(Event::Comment(BytesText::new(
                                doc.comment_text(*comment),
                            )))
                            .map_err(xml_err)?;
                    }
                }
            }
            writer
                .write_event(Event::End(BytesEnd::new("children")))
                .map_err(xml_err)?;
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new("node")))
        .map_err(xml_err)?;
    Ok(())
}

fn write_attribute<W: std::io::Write>(
    writer: &mut Writer<W>,
    attr: &Attribute,
) -> Result<(), DocumentError> {
    let mut elem = BytesStart::new("attribute");
    elem.push_attribute(("id", attr.name.as_str()));
    elem.push_attribute(("type", attr.ty.as_str()));
    match &attr.value {
        AttrValue::Literal(value) => {
            elem.push_attribute(("value", value.as_str()));
        }
        AttrValue::Handle { handle, version } => {
            elem.push_attribute(("handle", handle.as_str()));
            elem.push_attribute(("version", version.to_string().as_str()));
        }
    }
    writer.write_event(Event::Empty(elem)).map_err(xml_err)?;
    Ok(())
}

fn element_attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, DocumentError> {
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value().map_err(xml_err)?.into_owned()));
        }
    }
    Ok(None)
}

fn required_element_attr(e: &BytesStart<'_>, name: &str) -> Result<String, DocumentError> {
    element_attr(e, name)?
        .ok_or_else(|| xml_err(format!("<{:?}> is missing '{name}'", e.name())))
}

fn parse_version(e: &BytesStart<'_>) -> Result<DocVersion, DocumentError> {
    let field = |name: &str| -> Result<u32, DocumentError> {
        required_element_attr(e, name)?
            .parse::<u32>()
            .map_err(|err| DocumentError::parse(format!("version {name}: {err}")))
    };
    Ok(DocVersion {
        major: field("major")?,
        minor: field("minor")?,
        revision: field("revision")?,
        build: field("build")?,
    })
}

fn parse_attribute(e: &BytesStart<'_>) -> Result<Attribute, DocumentError> {
    let name = required_element_attr(e, "id")?;
    let ty = required_element_attr(e, "type")?;
    let value = match element_attr(e, "value")? {
        Some(value) => AttrValue::Literal(value),
        None => {
            let handle = element_attr(e, "handle")?.ok_or_else(|| {
                xml_err(format!("attribute '{name}' has neither value nor handle"))
            })?;
            let version = match element_attr(e, "version")? {
                Some(v) => v
                    .parse::<u16>()
                    .map_err(|err| DocumentError::parse(format!("handle version: {err}")))?,
                None => 1,
            };
            AttrValue::Handle { handle, version }
        }
    };
    if ty == TRANSLATED_STRING {
        if let AttrValue::Literal(v) = value {
            // tolerate translated strings serialized in literal form
            return Ok(Attribute {
                name,
                ty,
                value: AttrValue::Handle {
                    handle: v,
                    version: 1,
                },
            });
        }
    }
    Ok(Attribute { name, ty, value })
}

/// Load a document from a file
pub fn load(path: impl AsRef<Path>) -> Result<Document, DocumentError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let doc = from_str(&text)?;
    tracing::info!(path = %path.display(), region = %doc.region_id, "loaded document");
    Ok(doc)
}

/// Persist a document to a file
pub fn save(doc: &Document, path: impl AsRef<Path>) -> Result<(), DocumentError> {
    let path = path.as_ref();
    let text = to_string(doc)?;
    std::fs::write(path, text)?;
    tracing::info!(path = %path.display(), region = %doc.region_id, "saved document");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<save>
	<version major="4" minor="0" revision="9" build="330"/>
	<region id="TLTimeline">
		<node id="Timeline">
			<attribute id="Duration" type="float" value="12.5"/>
			<children>
				<node id="EffectComponent">
					<attribute id="ID" type="guid" value="aaaa-bbbb"/>
					<attribute id="Type" type="LSString" value="TLVoice"/>
					<attribute id="TagText" type="TranslatedString" handle="h09f8c2" version="1"/>
					<children/>
				</node>
				<!-- Edited - Added child node -->
				<node id="EffectComponent">
					<attribute id="ID" type="guid" value="cccc-dddd"/>
				</node>
			</children>
		</node>
	</region>
</save>"#;

    #[test]
    fn test_parse_sample() {
        let doc = from_str(SAMPLE).unwrap();
        assert_eq!(doc.region_id, "TLTimeline");
        assert_eq!(doc.version.build, 330);
        assert_eq!(doc.node_id(doc.root()), Some("Timeline"));
        assert_eq!(doc.attr_value(doc.root(), "Duration").unwrap(), "12.5");

        let components: Vec<_> = doc.children(doc.root()).collect();
        assert_eq!(components.len(), 2);
        assert_eq!(doc.attr_value(components[0], "ID").unwrap(), "aaaa-bbbb");
        // translated string parsed into handle form
        let tag_text = doc.attr_opt(components[0], "TagText").unwrap();
        assert!(matches!(tag_text.value, AttrValue::Handle { version: 1, .. }));
        // first component keeps its explicitly empty container
        assert!(doc.node(components[0]).children.is_some());
        assert!(doc.node(components[1]).children.is_none());
    }

    #[test]
    fn test_round_trip_is_stable() {
        let doc = from_str(SAMPLE).unwrap();
        let once = to_string(&doc).unwrap();
        let doc2 = from_str(&once).unwrap();
        let twice = to_string(&doc2).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_round_trip_preserves_comments() {
        let doc = from_str(SAMPLE).unwrap();
        let out = to_string(&doc).unwrap();
        assert!(out.contains("<!-- Edited - Added child node -->"));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeline.lsx");
        let doc = from_str(SAMPLE).unwrap();
        save(&doc, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.region_id, doc.region_id);
        assert_eq!(to_string(&loaded).unwrap(), to_string(&doc).unwrap());
    }

    #[test]
    fn test_rejects_versionless_header() {
        let bad = r#"<save><version major="4"/><region id="X"><node id="R"/></region></save>"#;
        assert!(from_str(bad).is_err());
    }
}
