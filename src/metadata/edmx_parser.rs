//! Parser for OData `$metadata` (EDMX) documents

use roxmltree::{Document, Node};

use crate::edm::EdmType;
use crate::error::IngestError;
use crate::model::{column_description, EntityDescriptor, FieldDescriptor};

/// SAP annotation namespace used for `sap:visible`, `sap:label`, ...
pub const SAP_NAMESPACE: &str = "http://www.sap.com/Protocols/SAPData";

/// Parse a `$metadata` document describing a single entity.
///
/// `entity` is the entity that was requested; it selects the EntitySet when
/// the container lists several, and names the entity in errors.
pub fn parse_metadata(entity: &str, xml: &str) -> Result<EntityDescriptor, IngestError> {
    let doc = Document::parse(xml).map_err(|e| IngestError::MetadataXmlError {
        entity: entity.to_string(),
        source: e,
    })?;

    let missing = |node: &str| IngestError::MetadataParseError {
        entity: entity.to_string(),
        node: node.to_string(),
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Edmx" {
        return Err(missing("edmx:Edmx"));
    }
    let data_services =
        child_element(root, "DataServices").ok_or_else(|| missing("edmx:DataServices"))?;
    let schemas: Vec<Node> = data_services
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Schema")
        .collect();
    if schemas.is_empty() {
        return Err(missing("Schema"));
    }

    // Documentation lives on the EntitySet of the container schema
    let entity_set = find_entity_set(&schemas, entity).ok_or_else(|| missing("EntitySet"))?;
    let documentation = child_element(entity_set, "Documentation")
        .ok_or_else(|| missing("EntitySet/Documentation"))?;
    let description = child_element(documentation, "LongDescription")
        .ok_or_else(|| missing("Documentation/LongDescription"))?
        .text()
        .unwrap_or_default()
        .trim()
        .to_string();
    let module = first_module_tag(documentation).ok_or_else(|| {
        IngestError::ModuleNotFoundError {
            entity: entity.to_string(),
        }
    })?;

    // Fields live on the EntityType of the type schema
    let type_name = entity_set
        .attribute("EntityType")
        .map(|qualified| qualified.rsplit('.').next().unwrap_or(qualified));
    let entity_type =
        find_entity_type(&schemas, type_name).ok_or_else(|| missing("EntityType"))?;
    let name = entity_type
        .attribute("Name")
        .ok_or_else(|| missing("EntityType/@Name"))?
        .to_string();

    let keys = parse_keys(entity_type).map_err(|node| missing(&node))?;
    let fields = parse_fields(entity_type).map_err(|e| match e {
        FieldError::Missing(node) => missing(&node),
        FieldError::Type(err) => err,
    })?;

    EntityDescriptor::new(name, module, description, keys, fields)
}

enum FieldError {
    Missing(String),
    Type(IngestError),
}

/// Collect every `Key/PropertyRef/@Name`, whether the key has one part or many.
fn parse_keys(entity_type: Node) -> Result<Vec<String>, String> {
    let key = child_element(entity_type, "Key").ok_or_else(|| "EntityType/Key".to_string())?;

    let mut keys = Vec::new();
    for property_ref in key
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "PropertyRef")
    {
        let name = property_ref
            .attribute("Name")
            .ok_or_else(|| "Key/PropertyRef/@Name".to_string())?;
        keys.push(name.to_string());
    }

    if keys.is_empty() {
        return Err("Key/PropertyRef".to_string());
    }
    Ok(keys)
}

fn parse_fields(entity_type: Node) -> Result<Vec<FieldDescriptor>, FieldError> {
    let mut fields = Vec::new();

    for property in entity_type
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Property")
    {
        // OData annotations default to visible when the flag is absent
        let visible = sap_attribute(property, "visible")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);
        if !visible {
            continue;
        }

        let name = property
            .attribute("Name")
            .ok_or_else(|| FieldError::Missing("Property/@Name".to_string()))?;
        let type_name = property
            .attribute("Type")
            .ok_or_else(|| FieldError::Missing(format!("Property[{}]/@Type", name)))?;
        let source_type = type_name
            .parse::<EdmType>()
            .map_err(|e| FieldError::Type(e.for_field(name)))?;
        let nullable = property
            .attribute("Nullable")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);
        let label = sap_attribute(property, "label").unwrap_or(name);
        let description = column_description(label, sap_attribute(property, "picklist"));

        fields.push(FieldDescriptor::new(name, source_type, nullable, description));
    }

    Ok(fields)
}

fn find_entity_set<'a, 'input>(
    schemas: &[Node<'a, 'input>],
    entity: &str,
) -> Option<Node<'a, 'input>> {
    let entity_sets: Vec<Node> = schemas
        .iter()
        .filter_map(|schema| child_element(*schema, "EntityContainer"))
        .flat_map(|container| {
            container
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "EntitySet")
        })
        .collect();

    entity_sets
        .iter()
        .find(|set| set.attribute("Name") == Some(entity))
        .or_else(|| entity_sets.first())
        .copied()
}

fn find_entity_type<'a, 'input>(
    schemas: &[Node<'a, 'input>],
    type_name: Option<&str>,
) -> Option<Node<'a, 'input>> {
    let entity_types: Vec<Node> = schemas
        .iter()
        .flat_map(|schema| {
            schema
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "EntityType")
        })
        .collect();

    type_name
        .and_then(|wanted| {
            entity_types
                .iter()
                .find(|t| t.attribute("Name") == Some(wanted))
        })
        .or_else(|| entity_types.first())
        .copied()
}

/// First non-empty `sap:tag` of the documentation's tag collection.
fn first_module_tag(documentation: Node) -> Option<String> {
    let collection = child_element(documentation, "tagcollection")?;
    collection
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "tag")
        .filter_map(|tag| tag.text())
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// Look up a SAP annotation attribute by local name.
///
/// Matches the SAP namespace first, then any namespaced attribute with the
/// same local name (some tenants declare the prefix with a different URI).
fn sap_attribute<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute((SAP_NAMESPACE, name)).or_else(|| {
        node.attributes()
            .find(|a| a.name() == name && a.namespace().is_some())
            .map(|a| a.value())
    })
}
