//! XML frontend.
//!
//! A schema document nests aggregates the way instances nest. The document
//! element is only a container; each element directly inside it declares a
//! root aggregate (or an enumeration). Inside an aggregate, the attributes of
//! an element decide what it declares:
//!
//! ```text
//! <schema>
//!   <Status enum="true"><Open/><Closed value="9"/></Status>
//!   <Customer>
//!     <code type="identifier" key="true"/>
//!     <name type="word" name="true"/>
//!   </Customer>
//!   <Order>
//!     <id type="identifier" key="true"/>
//!     <status type="Status"/>
//!     <Customer refTo="/Customer"/>
//!     <Lines multiple="true" table="Line">
//!       <qty type="numeric" required="true"/>
//!     </Lines>
//!     <Payment variation="true" abstract="true">
//!       <amount type="numeric"/>
//!       <Cash tag="1"/>
//!       <Card tag="2"><number type="word"/></Card>
//!     </Payment>
//!     <Delivery><city type="word"/></Delivery>
//!   </Order>
//! </schema>
//! ```

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::diagnostic::{CompilerError, ErrorList};
use crate::schema::{
    AggregateDecl, ChildDecl, ChildrenDecl, EnumDecl, ReferenceDecl, ScalarDecl, SchemaBuilder,
    VariantDecl, VariationBase, VariationDecl,
};

use super::{Frontend, ParsedSchema};

/// Attributes an aggregate element must not carry.
const SCALAR_ONLY_ATTRIBUTES: &[&str] = &["type", "key", "name", "refTo"];

/// XML frontend implementation.
#[derive(Debug, Default)]
pub struct XmlFrontend;

impl XmlFrontend {
    pub fn new() -> Self {
        Self
    }

    /// Parses one document held in memory.
    pub fn parse_str(&self, source: &str) -> Result<SchemaBuilder, ErrorList> {
        let (builder, errors) = self.read_str(source);
        errors.into_result(builder)
    }

    /// Reads one document, returning what it declares along with its
    /// problems. Malformed XML declares nothing.
    pub fn read_str(&self, source: &str) -> (SchemaBuilder, ErrorList) {
        let document = match read_tree(source) {
            Ok(document) => document,
            Err(message) => return (SchemaBuilder::new(), ErrorList::from(message)),
        };

        let mut interpreter = Interpreter::default();
        for element in &document.children {
            interpreter.top_level(element);
        }
        (interpreter.builder, interpreter.errors)
    }
}

impl Frontend for XmlFrontend {
    fn language(&self) -> &str {
        "xml"
    }

    fn extensions(&self) -> &[&str] {
        &["xml"]
    }

    fn read_file(&self, path: &Path) -> Result<ParsedSchema, CompilerError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| CompilerError::io(path, e.to_string()))?;
        let (builder, errors) = self.read_str(&source);
        debug!(
            path = %path.display(),
            declarations = builder.declaration_count(),
            problems = errors.len(),
            "read schema file"
        );
        Ok(ParsedSchema {
            builder,
            errors,
            files: 1,
        })
    }
}

/// A parsed element; text content is not part of the format.
#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn has(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// A marker attribute is on unless spelled `false` or `0`.
    fn flag(&self, name: &str) -> bool {
        self.attribute(name)
            .is_some_and(|value| !matches!(value.trim(), "false" | "0"))
    }

    fn table(&self) -> Option<String> {
        self.attribute("table").map(str::to_string)
    }
}

fn read_tree(source: &str) -> Result<Element, String> {
    let mut reader = Reader::from_str(source);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut document: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(element(&start)?),
            Ok(Event::Empty(start)) => {
                let element = element(&start)?;
                attach(&mut stack, &mut document, element)?;
            }
            Ok(Event::End(_)) => {
                let Some(element) = stack.pop() else {
                    return Err("Malformed XML: unexpected closing tag.".to_string());
                };
                attach(&mut stack, &mut document, element)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "Malformed XML at byte {}: {e}",
                    reader.buffer_position()
                ));
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("Malformed XML: element '{}' is not closed.", open.name));
    }
    document.ok_or_else(|| "Malformed XML: the document has no root element.".to_string())
}

fn element(start: &BytesStart<'_>) -> Result<Element, String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute =
            attribute.map_err(|e| format!("Malformed XML in element '{name}': {e}"))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| format!("Malformed XML in attribute '{key}' of '{name}': {e}"))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(stack: &mut [Element], document: &mut Option<Element>, element: Element) -> Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if document.is_some() {
        return Err(format!(
            "Malformed XML: '{}' is a second root element.",
            element.name
        ));
    }
    *document = Some(element);
    Ok(())
}

/// Turns elements into declarations, collecting every problem.
#[derive(Default)]
struct Interpreter {
    builder: SchemaBuilder,
    errors: ErrorList,
}

impl Interpreter {
    fn top_level(&mut self, element: &Element) {
        if element.has("enum") {
            self.enumeration(element);
            return;
        }

        let path = format!("/{}", element.name);
        if element.has("multiple") {
            self.errors
                .push(format!("Root aggregate '{path}' cannot be multiple."));
        }
        if element.has("variation") {
            self.errors
                .push(format!("Root aggregate '{path}' cannot be a variation."));
        }
        self.check_aggregate_attributes(element, &path);

        let members = self.body(element, &path);
        self.builder.add_aggregate(AggregateDecl {
            path,
            type_name: element.table(),
            members,
        });
    }

    fn check_aggregate_attributes(&mut self, element: &Element, path: &str) {
        for attribute in SCALAR_ONLY_ATTRIBUTES {
            if element.has(attribute) {
                self.errors.push(format!(
                    "Aggregate '{path}' cannot have attribute '{attribute}'."
                ));
            }
        }
    }

    /// Declares everything nested in the aggregate at `owner` and returns its
    /// scalar fields. Nested aggregates are declared after their own content,
    /// in document order.
    fn body(&mut self, element: &Element, owner: &str) -> Vec<ScalarDecl> {
        let mut scalars = Vec::new();
        for child in &element.children {
            if child.has("type") {
                scalars.push(scalar(child));
            } else if child.has("enum") {
                self.enumeration(child);
            } else if let Some(target) = child.attribute("refTo") {
                self.builder.add_reference(ReferenceDecl {
                    name: child.name.clone(),
                    owner: owner.to_string(),
                    target: target.to_string(),
                    is_key: child.flag("key"),
                    is_display_name: child.flag("name"),
                });
            } else if child.has("variation") {
                self.variation(child, owner);
            } else if child.has("multiple") {
                let path = format!("{owner}/{}", child.name);
                if child.has("key") {
                    self.errors
                        .push(format!("Children '{}' of '{owner}' cannot be a key.", child.name));
                }
                self.check_aggregate_attributes_except_key(child, &path);
                let members = self.body(child, &path);
                self.builder.add_children(ChildrenDecl {
                    name: child.name.clone(),
                    owner: owner.to_string(),
                    type_name: child.table(),
                    members,
                });
            } else {
                let path = format!("{owner}/{}", child.name);
                self.check_aggregate_attributes_except_key(child, &path);
                let members = self.body(child, &path);
                self.builder.add_child(ChildDecl {
                    name: child.name.clone(),
                    owner: owner.to_string(),
                    type_name: child.table(),
                    is_key: child.flag("key"),
                    members,
                });
            }
        }
        scalars
    }

    /// `key` on a nested aggregate is reported by schema resolution.
    fn check_aggregate_attributes_except_key(&mut self, element: &Element, path: &str) {
        for attribute in SCALAR_ONLY_ATTRIBUTES.iter().filter(|a| **a != "key") {
            if element.has(attribute) {
                self.errors.push(format!(
                    "Aggregate '{path}' cannot have attribute '{attribute}'."
                ));
            }
        }
    }

    fn variation(&mut self, element: &Element, owner: &str) {
        let name = element.name.clone();
        let mut base_members = Vec::new();
        let mut variants = Vec::new();

        for child in &element.children {
            if child.has("type") {
                base_members.push(scalar(child));
                continue;
            }
            let path = format!("{owner}/{}", child.name);
            let Some(raw_tag) = child.attribute("tag") else {
                self.errors.push(format!(
                    "Element '{}' inside variation '{name}' of '{owner}' is neither a field nor a tagged variant.",
                    child.name
                ));
                continue;
            };
            let Ok(tag) = raw_tag.trim().parse::<i64>() else {
                self.errors.push(format!(
                    "Tag '{raw_tag}' of variant '{path}' is not an integer."
                ));
                continue;
            };
            self.check_aggregate_attributes(child, &path);
            let members = self.body(child, &path);
            variants.push(VariantDecl {
                name: child.name.clone(),
                tag,
                type_name: child.table(),
                members,
            });
        }

        let base = (!base_members.is_empty() || element.has("abstract")).then(|| VariationBase {
            name: element.table().unwrap_or_else(|| name.clone()),
            is_abstract: element.flag("abstract"),
            members: base_members,
        });

        // Variants inherit base fields they do not redeclare.
        if let Some(base) = &base {
            for variant in &mut variants {
                let own = std::mem::take(&mut variant.members);
                let mut members: Vec<ScalarDecl> = base
                    .members
                    .iter()
                    .filter(|m| !own.iter().any(|o| o.name == m.name))
                    .cloned()
                    .collect();
                members.extend(own);
                variant.members = members;
            }
        }

        self.builder.add_variation(VariationDecl {
            name,
            owner: owner.to_string(),
            is_key: element.flag("key"),
            base,
            variants,
        });
    }

    fn enumeration(&mut self, element: &Element) {
        let mut items = Vec::with_capacity(element.children.len());
        for item in &element.children {
            let value = match item.attribute("value") {
                None => None,
                Some(raw) => match raw.trim().parse::<i64>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        self.errors.push(format!(
                            "Value '{raw}' of item '{}' in enumeration '{}' is not an integer.",
                            item.name, element.name
                        ));
                        continue;
                    }
                },
            };
            items.push((item.name.clone(), value));
        }
        self.builder.add_enum(EnumDecl {
            name: element.name.clone(),
            items,
        });
    }
}

fn scalar(element: &Element) -> ScalarDecl {
    ScalarDecl {
        name: element.name.clone(),
        type_name: element.attribute("type").unwrap_or_default().to_string(),
        is_key: element.flag("key"),
        is_display_name: element.flag("name"),
        required: element.flag("required"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AggregatePath, MemberTypeResolver};
    use std::fs;
    use tempfile::TempDir;

    const ORDER: &str = r#"<?xml version="1.0"?>
<schema>
  <!-- order management -->
  <Status enum="true"><Open/><Closed value="9"/><Held/></Status>
  <Customer>
    <code type="identifier" key="true"/>
    <name type="word" name="true"/>
  </Customer>
  <Order>
    <id type="identifier" key="true"/>
    <status type="Status"/>
    <Customer refTo="/Customer"/>
    <Lines multiple="true" table="Line">
      <qty type="numeric" required="true"/>
    </Lines>
    <Payment variation="true" abstract="true">
      <amount type="numeric"/>
      <Cash tag="1"/>
      <Card tag="2"><number type="word"/></Card>
    </Payment>
  </Order>
</schema>"#;

    #[test]
    fn test_parse_order_schema() {
        let builder = XmlFrontend::new().parse_str(ORDER).unwrap();
        let schema = builder.try_build(&MemberTypeResolver::default()).unwrap();

        let line = schema.db_entity(&AggregatePath::parse("/Order/Lines")).unwrap();
        assert_eq!(line.table, "Line");
        assert!(!line.column("qty").unwrap().nullable);

        let card = schema.node(&AggregatePath::parse("/Order/Card")).unwrap();
        let card_fields: Vec<_> = card.item().scalars.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(card_fields, vec!["amount", "number"]);

        let order = schema.db_entity(&AggregatePath::parse("/Order")).unwrap();
        assert!(order.column("Customer_code").is_some());
        assert!(order.column("Payment").is_some());
    }

    #[test]
    fn test_enum_values_are_auto_assigned() {
        let builder = XmlFrontend::new().parse_str(ORDER).unwrap();
        let schema = builder.try_build(&MemberTypeResolver::default()).unwrap();
        let order = schema.node(&AggregatePath::parse("/Order")).unwrap();
        let status = order.item().scalars.iter().find(|s| s.name == "status").unwrap();
        let crate::ir::ScalarKind::Enumeration(definition) = &status.kind else {
            panic!("status should be an enumeration");
        };
        assert_eq!(definition.value_of("Open"), Some(0));
        assert_eq!(definition.value_of("Closed"), Some(9));
        assert_eq!(definition.value_of("Held"), Some(1));
    }

    #[test]
    fn test_errors_are_collected() {
        let source = r#"<schema>
  <Order multiple="true" key="true">
    <Payment variation="true">
      <Cash tag="one"/>
    </Payment>
  </Order>
  <Level enum="true"><Low value="x"/></Level>
</schema>"#;
        let errors = XmlFrontend::new().parse_str(source).unwrap_err();
        assert!(errors.contains("Root aggregate '/Order' cannot be multiple."));
        assert!(errors.contains("Aggregate '/Order' cannot have attribute 'key'."));
        assert!(errors.contains("Tag 'one' of variant '/Order/Cash' is not an integer."));
        assert!(errors.contains("Value 'x' of item 'Low'"));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_malformed_xml() {
        let errors = XmlFrontend::new()
            .parse_str("<schema><Order></schema>")
            .unwrap_err();
        assert!(errors.contains("Malformed XML"));
    }

    #[test]
    fn test_parse_directory_merges_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("customer.xml"),
            r#"<schema><Customer><code type="identifier" key="true"/></Customer></schema>"#,
        )
        .unwrap();
        fs::create_dir(dir.path().join("sales")).unwrap();
        fs::write(
            dir.path().join("sales").join("order.xml"),
            r#"<schema><Order><id type="identifier" key="true"/><Customer refTo="/Customer"/></Order></schema>"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a schema").unwrap();

        let parsed = XmlFrontend::new().parse_directory(dir.path()).unwrap();
        assert_eq!(parsed.files, 2);
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.builder.declaration_count(), 3);
        let schema = parsed.try_build(&MemberTypeResolver::default()).unwrap();
        assert_eq!(schema.root_aggregates().count(), 2);
    }

    #[test]
    fn test_bad_file_keeps_its_declarations() {
        let source = r#"<schema>
  <Audit multiple="true"><id type="identifier" key="true"/></Audit>
  <Order><id type="identifier" key="true"/></Order>
</schema>"#;
        let (builder, errors) = XmlFrontend::new().read_str(source);
        assert_eq!(errors.len(), 1);
        assert_eq!(builder.declaration_count(), 2);

        let (builder, errors) = XmlFrontend::new().read_str("<schema><Order></schema>");
        assert!(errors.contains("Malformed XML"));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let err = XmlFrontend::new().parse_directory(dir.path()).unwrap_err();
        assert!(matches!(err, CompilerError::NoSchemaFiles { .. }));
    }

    #[test]
    fn test_parse_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.xml");
        fs::write(&path, "<schema><A multiple=\"true\"/></schema>").unwrap();
        let err = XmlFrontend::new().parse_file(&path).unwrap_err();
        match err {
            CompilerError::ParseFailed { path: reported, errors } => {
                assert_eq!(reported, path);
                assert_eq!(errors.len(), 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
