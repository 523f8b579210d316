// Field store: name/value access over one `FieldList` element.
//
// Only direct `Field` children are visited. Fields of embedded records
// live in their own field lists and are never reached from here.

use cherwell_api::xml::Element;
use indexmap::IndexMap;

pub(crate) const FIELD: &str = "Field";
const NAME: &str = "Name";

fn fields(list: &Element) -> impl Iterator<Item = &Element> {
    list.child_elements().filter(|e| e.local_name() == FIELD)
}

/// First field called `name`.
pub(crate) fn get<'a>(list: &'a Element, name: &str) -> Option<&'a Element> {
    fields(list).find(|f| f.attr(NAME) == Some(name))
}

/// Overwrite the first field called `name`, or append a new one.
pub(crate) fn set(list: &mut Element, name: &str, value: &str) {
    let existing = list
        .child_elements_mut()
        .find(|f| f.local_name() == FIELD && f.attr(NAME) == Some(name));
    match existing {
        Some(field) => field.set_text(value),
        None => list.push_child(Element::new(FIELD).with_attr(NAME, name).with_text(value)),
    }
}

/// Name -> value in document order. A repeated name keeps its first value.
pub(crate) fn to_map(list: &Element) -> IndexMap<String, String> {
    let mut map = IndexMap::new();
    for field in fields(list) {
        if let Some(name) = field.attr(NAME) {
            map.entry(name.to_owned()).or_insert_with(|| field.text());
        }
    }
    map
}
