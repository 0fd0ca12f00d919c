//! Declarative property descriptions for host-side settings UI.
//!
//! Backends describe their adjustable settings as data; the filter assembles
//! the full list, starting with the provider selector. Hosts render this
//! however they like.

use crate::provider::ProviderKind;

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Stable identifier, matching the persisted settings field.
    pub id: &'static str,
    pub label: &'static str,
    pub kind: PropertyKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    /// Integer-valued dropdown.
    Select { options: Vec<(String, i64)> },
    /// Bounded float slider.
    Slider { min: f64, max: f64, step: f64 },
    /// RGB color picker.
    Color,
    /// Named group of nested properties.
    Group { children: Vec<Property> },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyList {
    properties: Vec<Property>,
}

impl PropertyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, property: Property) {
        self.properties.push(property);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    pub fn find(&self, id: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// The provider dropdown: `Automatic` first, then every kind in
    /// `available`, in the order given.
    pub fn provider_selector(available: &[ProviderKind]) -> Property {
        let mut options = vec![(ProviderKind::Automatic.to_string(), i64::from(ProviderKind::Automatic))];
        for kind in available {
            options.push((kind.to_string(), i64::from(*kind)));
        }
        Property {
            id: "provider",
            label: "Provider",
            kind: PropertyKind::Select { options },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_lists_automatic_then_available() {
        let selector =
            PropertyList::provider_selector(&[ProviderKind::OnnxMatting, ProviderKind::ChromaKey]);
        let PropertyKind::Select { options } = &selector.kind else {
            panic!("provider selector must be a select");
        };
        let values: Vec<i64> = options.iter().map(|(_, v)| *v).collect();
        assert_eq!(
            values,
            vec![
                i64::from(ProviderKind::Automatic),
                i64::from(ProviderKind::OnnxMatting),
                i64::from(ProviderKind::ChromaKey),
            ]
        );
    }

    #[test]
    fn find_locates_by_id() {
        let mut list = PropertyList::new();
        list.push(PropertyList::provider_selector(&[]));
        assert!(list.find("provider").is_some());
        assert!(list.find("missing").is_none());
    }
}
