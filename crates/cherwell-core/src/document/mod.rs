// ── Business object documents ──
//
// A `Document` owns one `<BusinessObject>` tree:
//
//   <BusinessObject Name="Incident" RecID="...">
//     <FieldList><Field Name="IncidentID">51949</Field>...</FieldList>
//     <RelationshipList>
//       <Relationship Name="Incident Has Tasks" TargetObjectName="Task" Type="Owns">
//         <BusinessObject Name="Task">...</BusinessObject>
//       </Relationship>
//     </RelationshipList>
//   </BusinessObject>
//
// The root and its field list are checked when the document is built, and
// no operation removes them, so field access never has to fail.

mod fields;

use std::fmt;

use cherwell_api::xml::{self, Element, XmlDocument};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::datetime::{DEFAULT_UTC_OFFSET_HOURS, format_display, parse_datetime};
use crate::error::CoreError;

pub const BUSINESS_OBJECT: &str = "BusinessObject";
pub const FIELD_LIST: &str = "FieldList";
pub const RELATIONSHIP_LIST: &str = "RelationshipList";
pub const RELATIONSHIP: &str = "Relationship";

/// Field holding the last-modified timestamp.
pub const LAST_MODIFIED: &str = "LastModDateTime";

/// A validated business object tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    xml: XmlDocument,
}

impl Document {
    // ── Construction ─────────────────────────────────────────────────

    /// Parse raw XML, rejecting anything without a `BusinessObject` root
    /// holding a `FieldList`.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let xml = xml::parse_document(text)?;
        Self::from_xml(xml)
    }

    /// Wrap an already-parsed tree after checking its shape.
    pub fn from_xml(xml: XmlDocument) -> Result<Self, CoreError> {
        check_shape(&xml.root)?;
        Ok(Self { xml })
    }

    /// Wrap a lone `BusinessObject` element (e.g. one embedded in a relationship).
    pub fn from_element(root: Element) -> Result<Self, CoreError> {
        Self::from_xml(XmlDocument::new(root))
    }

    /// A fresh record of `type_name` with the given fields and an empty
    /// relationship list.
    pub fn build<I, K, V>(type_name: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: fmt::Display,
    {
        let mut list = Element::new(FIELD_LIST);
        for (name, value) in fields {
            fields::set(&mut list, name.as_ref(), &value.to_string());
        }
        let root = Element::new(BUSINESS_OBJECT)
            .with_attr("Name", type_name)
            .with_child(list)
            .with_child(Element::new(RELATIONSHIP_LIST));
        Self {
            xml: XmlDocument::new(root),
        }
    }

    // ── Shape ────────────────────────────────────────────────────────

    /// Re-check the structural invariant.
    pub fn check_format(&self) -> Result<(), CoreError> {
        check_shape(&self.xml.root)
    }

    /// The `BusinessObject` element.
    pub fn root(&self) -> &Element {
        &self.xml.root
    }

    /// Root `Name` attribute, e.g. `Incident`.
    pub fn record_type(&self) -> Option<&str> {
        self.xml.root.attr("Name")
    }

    /// Root `RecID` attribute (the server's internal key).
    pub fn record_id(&self) -> Option<&str> {
        self.xml.root.attr("RecID")
    }

    // Construction guarantees a FieldList and the root is never handed out
    // mutably, so `None` here only means "no fields".
    fn field_list(&self) -> Option<&Element> {
        self.xml.root.child(FIELD_LIST)
    }

    fn field_list_mut(&mut self) -> &mut Element {
        self.xml.root.child_or_insert(FIELD_LIST)
    }

    // ── Fields ───────────────────────────────────────────────────────

    /// Text of the first top-level field called `name`.
    pub fn get_field(&self, name: &str) -> Option<String> {
        self.field_list()
            .and_then(|list| fields::get(list, name))
            .map(Element::text)
    }

    /// Overwrite the field, or append it when absent.
    pub fn set_field(&mut self, name: &str, value: impl fmt::Display) {
        fields::set(self.field_list_mut(), name, &value.to_string());
    }

    /// Top-level fields only; embedded records are not flattened in.
    pub fn to_map(&self) -> IndexMap<String, String> {
        self.field_list().map(fields::to_map).unwrap_or_default()
    }

    /// Compare the named fields, or every top-level field when `names` is empty.
    pub fn fields_equal(&self, other: &Document, names: &[&str]) -> bool {
        if names.is_empty() {
            return self.to_map() == other.to_map();
        }
        names
            .iter()
            .all(|name| self.get_field(name) == other.get_field(name))
    }

    /// Copy the named fields from `from`; absent source fields become empty.
    pub fn copy_fields(&mut self, from: &Document, names: &[&str]) {
        for name in names {
            let value = from.get_field(name).unwrap_or_default();
            self.set_field(name, value);
        }
    }

    // ── Relationships ────────────────────────────────────────────────

    /// Embedded `child_type` records under relationships named `relation`.
    ///
    /// Recomputed from the live tree on every call.
    pub fn children(&self, relation: &str, child_type: &str) -> Result<Vec<Document>, CoreError> {
        self.relationships(relation)
            .flat_map(Element::child_elements)
            .filter(|e| e.local_name() == BUSINESS_OBJECT && e.attr("Name") == Some(child_type))
            .map(|e| Document::from_element(e.clone()))
            .collect()
    }

    fn relationships<'a>(&'a self, relation: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        let root = &self.xml.root;
        let listed = root
            .child(RELATIONSHIP_LIST)
            .into_iter()
            .flat_map(Element::child_elements);
        root.child_elements()
            .chain(listed)
            .filter(move |e| e.local_name() == RELATIONSHIP && e.attr("Name") == Some(relation))
    }

    /// Append a relationship owning `child`'s tree.
    pub fn add_child(&mut self, relation: &str, target_type: &str, kind: &str, child: Document) {
        let relationship = Element::new(RELATIONSHIP)
            .with_attr("Name", relation)
            .with_attr("TargetObjectName", target_type)
            .with_attr("Type", kind)
            .with_child(child.xml.root);
        self.xml
            .root
            .child_or_insert(RELATIONSHIP_LIST)
            .push_child(relationship);
    }

    // ── Timestamps ───────────────────────────────────────────────────

    /// `LastModDateTime` as UTC, reading offset-less text as UTC.
    pub fn modified(&self) -> Result<DateTime<Utc>, CoreError> {
        self.modified_with_offset(DEFAULT_UTC_OFFSET_HOURS)
    }

    /// `LastModDateTime` as UTC, reading offset-less text as `offset_hours`
    /// east of UTC.
    pub fn modified_with_offset(&self, offset_hours: i32) -> Result<DateTime<Utc>, CoreError> {
        let last_mod = self
            .get_field(LAST_MODIFIED)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                CoreError::MissingData(format!("BusinessObject is missing {LAST_MODIFIED} field."))
            })?;
        parse_datetime(&last_mod, offset_hours).map_err(|_| CoreError::InvalidDate {
            reason: format!("Cannot parse {LAST_MODIFIED}: '{last_mod}'"),
            value: last_mod,
        })
    }

    /// Modification time as `YYYY-MM-DD HH:MM:SS` (UTC).
    pub fn modified_display(&self) -> Result<String, CoreError> {
        Ok(format_display(&self.modified()?))
    }

    /// Whether this record was modified after `other`.
    pub fn newer_than(&self, other: &Document) -> Result<bool, CoreError> {
        Ok(self.modified()? > other.modified()?)
    }

    // ── Output ───────────────────────────────────────────────────────

    /// Serialize the whole tree, declaration included when it was parsed with one.
    pub fn to_xml(&self) -> Result<String, CoreError> {
        Ok(self.xml.to_xml()?)
    }
}

fn check_shape(root: &Element) -> Result<(), CoreError> {
    if root.local_name() != BUSINESS_OBJECT {
        return Err(CoreError::BadFormat(format!("missing '{BUSINESS_OBJECT}'")));
    }
    if root.child(FIELD_LIST).is_none() {
        return Err(CoreError::BadFormat(format!(
            "missing '{BUSINESS_OBJECT} > {FIELD_LIST}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SIMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<BusinessObject Name="Incident" RecID="93cde1ef9d2e7cb2b6de7a4daaa8e4cbb1a62b6c93">
  <FieldList>
    <Field Name="IncidentID">51949</Field>
    <Field Name="Status">Assigned</Field>
    <Field Name="LastModDateTime">2012-02-09T09:42:13</Field>
  </FieldList>
  <RelationshipList>
    <Relationship Name="Incident Has Tasks" TargetObjectName="Task" Type="Owns">
      <BusinessObject Name="Task">
        <FieldList>
          <Field Name="TaskID">12345</Field>
          <Field Name="Status">New</Field>
        </FieldList>
      </BusinessObject>
    </Relationship>
  </RelationshipList>
</BusinessObject>"#;

    #[test]
    fn parse_reads_identity_and_fields() {
        let doc = Document::parse(SIMPLE).unwrap();
        assert_eq!(doc.record_type(), Some("Incident"));
        assert_eq!(doc.record_id(), Some("93cde1ef9d2e7cb2b6de7a4daaa8e4cbb1a62b6c93"));
        assert_eq!(doc.get_field("Status").as_deref(), Some("Assigned"));
        assert_eq!(doc.get_field("Nope"), None);
    }

    #[test]
    fn missing_root_or_field_list_is_bad_format() {
        let err = Document::parse("<Other/>").unwrap_err();
        assert_eq!(err.to_string(), "Bad format: missing 'BusinessObject'");

        let err = Document::parse(r#"<BusinessObject Name="X"/>"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Bad format: missing 'BusinessObject > FieldList'"
        );

        assert!(matches!(
            Document::parse("<BusinessObject>"),
            Err(CoreError::BadFormat(_))
        ));
    }

    #[test]
    fn to_map_ignores_embedded_fields() {
        let doc = Document::parse(SIMPLE).unwrap();
        let map = doc.to_map();
        assert_eq!(
            map.keys().map(String::as_str).collect::<Vec<_>>(),
            ["IncidentID", "Status", "LastModDateTime"]
        );
        assert_eq!(map["Status"], "Assigned");
        assert!(!map.contains_key("TaskID"));
    }

    #[test]
    fn serialize_round_trips() {
        let doc = Document::parse(SIMPLE).unwrap();
        let again = Document::parse(&doc.to_xml().unwrap()).unwrap();
        assert_eq!(again, doc);
        assert!(again.fields_equal(&doc, &[]));
    }

    #[test]
    fn set_field_updates_in_place_or_appends() {
        let mut doc = Document::parse(SIMPLE).unwrap();
        doc.set_field("Status", "Closed");
        doc.set_field("Status", "Closed");
        doc.set_field("Priority", 4);
        assert_eq!(doc.get_field("Status").as_deref(), Some("Closed"));
        assert_eq!(doc.get_field("Priority").as_deref(), Some("4"));
        assert_eq!(doc.to_map().len(), 4);

        // The embedded task keeps its own status.
        let tasks = doc.children("Incident Has Tasks", "Task").unwrap();
        assert_eq!(tasks[0].get_field("Status").as_deref(), Some("New"));
    }

    #[test]
    fn build_makes_a_valid_document() {
        let doc = Document::build("JournalNote", [("Details", "hello"), ("CreatedBy", "odo")]);
        doc.check_format().unwrap();
        assert_eq!(doc.record_type(), Some("JournalNote"));
        assert_eq!(doc.get_field("CreatedBy").as_deref(), Some("odo"));
        assert!(doc.children("anything", "Task").unwrap().is_empty());
    }

    #[test]
    fn fields_equal_and_copy_fields() {
        let a = Document::build("Task", [("Status", "New"), ("Owner", "odo")]);
        let mut b = Document::build("Task", [("Status", "Closed"), ("Owner", "odo")]);
        assert!(a.fields_equal(&b, &["Owner"]));
        assert!(!a.fields_equal(&b, &["Owner", "Status"]));
        assert!(!a.fields_equal(&b, &[]));

        b.copy_fields(&a, &["Status", "Missing"]);
        assert!(a.fields_equal(&b, &["Status"]));
        assert_eq!(b.get_field("Missing").as_deref(), Some(""));
    }

    #[test]
    fn add_child_then_traverse() {
        let mut parent = Document::build("Incident", [("IncidentID", "1")]);
        let child = Document::build("Task", [("TaskID", "7")]);
        parent.add_child("Incident Has Tasks", "Task", "Owns", child);

        let tasks = parent.children("Incident Has Tasks", "Task").unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].get_field("TaskID").as_deref(), Some("7"));
        assert!(parent.children("Incident has Notes", "JournalNote").unwrap().is_empty());

        let rel = parent.root().child(RELATIONSHIP_LIST).unwrap().child(RELATIONSHIP).unwrap();
        assert_eq!(rel.attr("TargetObjectName"), Some("Task"));
        assert_eq!(rel.attr("Type"), Some("Owns"));
    }

    #[test]
    fn modified_handles_missing_bad_and_good_values() {
        let doc = Document::parse(SIMPLE).unwrap();
        assert_eq!(doc.modified_display().unwrap(), "2012-02-09 09:42:13");
        assert_eq!(
            format_display(&doc.modified_with_offset(-5).unwrap()),
            "2012-02-09 14:42:13"
        );

        let missing = Document::build("Task", [("Status", "New")]);
        assert!(matches!(missing.modified(), Err(CoreError::MissingData(_))));

        let bogus = Document::build("Task", [(LAST_MODIFIED, "bogus")]);
        let err = bogus.modified().unwrap_err();
        assert!(err.to_string().contains("Cannot parse LastModDateTime: 'bogus'"));
    }

    #[test]
    fn newer_than_compares_instants() {
        let older = Document::build("Task", [(LAST_MODIFIED, "2012-02-09T09:42:13")]);
        let newer = Document::build("Task", [(LAST_MODIFIED, "2012-02-09T09:42:14")]);
        assert!(newer.newer_than(&older).unwrap());
        assert!(!older.newer_than(&newer).unwrap());
        assert!(!older.newer_than(&older).unwrap());
    }
}
