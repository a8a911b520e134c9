//! Ordered object collections

use super::editor::{EditError, Editor};
use super::selector::Selector;
use super::{DynamicObject, ObjectExt};

/// An ordered list of objects
///
/// Identity within a collection is kind (without group or version),
/// namespace and name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    objects: Vec<DynamicObject>,
}

/// Editing stopped on an error after `edited` objects succeeded
#[derive(Debug)]
pub struct EditFailure {
    pub edited: usize,
    pub source: EditError,
}

impl std::fmt::Display for EditFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "edit failed after {} objects: {}", self.edited, self.source)
    }
}

impl std::error::Error for EditFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Apply editors to each object in order
///
/// Type mismatches skip the editor for that object; any other error stops.
pub fn edit_all<'a, I>(objects: I, editors: &[Editor]) -> Result<usize, EditFailure>
where
    I: IntoIterator<Item = &'a mut DynamicObject>,
{
    let mut count = 0;

    for object in objects {
        for editor in editors {
            match editor.edit(object) {
                Ok(()) => {}
                Err(e) if e.is_type_mismatch() => continue,
                Err(source) => {
                    return Err(EditFailure {
                        edited: count,
                        source,
                    });
                }
            }
        }
        count += 1;
    }

    Ok(count)
}

pub(crate) fn same_identity(a: &DynamicObject, b: &DynamicObject) -> bool {
    a.kind() == b.kind()
        && a.metadata.namespace.as_deref().unwrap_or_default()
            == b.metadata.namespace.as_deref().unwrap_or_default()
        && a.metadata.name == b.metadata.name
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn first(&self) -> Option<&DynamicObject> {
        self.objects.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DynamicObject> {
        self.objects.iter()
    }

    pub fn as_slice(&self) -> &[DynamicObject] {
        &self.objects
    }

    pub fn contains(&self, object: &DynamicObject) -> bool {
        self.objects.iter().any(|o| same_identity(o, object))
    }

    pub fn filter(&self, selector: &Selector) -> Collection {
        self.objects
            .iter()
            .filter(|o| selector.matches(o))
            .cloned()
            .collect()
    }

    /// Objects matching all selectors; empty without selectors
    pub fn query(&self, selectors: &[Selector]) -> Collection {
        if selectors.is_empty() {
            return Collection::new();
        }
        self.objects
            .iter()
            .filter(|o| selectors.iter().all(|s| s.matches(o)))
            .cloned()
            .collect()
    }

    /// Objects also present in `other`
    pub fn intersection(&self, other: &Collection) -> Collection {
        self.objects
            .iter()
            .filter(|o| other.contains(o))
            .cloned()
            .collect()
    }

    /// Objects absent from `other`
    pub fn difference(&self, other: &Collection) -> Collection {
        self.objects
            .iter()
            .filter(|o| !other.contains(o))
            .cloned()
            .collect()
    }

    pub fn edit(&mut self, editors: &[Editor]) -> Result<usize, EditFailure> {
        edit_all(self.objects.iter_mut(), editors)
    }

    pub fn append<I>(&mut self, objects: I)
    where
        I: IntoIterator<Item = DynamicObject>,
    {
        self.objects.extend(objects);
    }

    /// Append objects whose identity is not already present
    pub fn append_unique<I>(&mut self, objects: I) -> usize
    where
        I: IntoIterator<Item = DynamicObject>,
    {
        let mut added = 0;
        for object in objects {
            if !self.contains(&object) {
                self.objects.push(object);
                added += 1;
            }
        }
        added
    }

    pub fn into_vec(self) -> Vec<DynamicObject> {
        self.objects
    }
}

impl FromIterator<DynamicObject> for Collection {
    fn from_iter<T: IntoIterator<Item = DynamicObject>>(iter: T) -> Self {
        Self {
            objects: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<DynamicObject>> for Collection {
    fn from(objects: Vec<DynamicObject>) -> Self {
        Self { objects }
    }
}

impl IntoIterator for Collection {
    type Item = DynamicObject;
    type IntoIter = std::vec::IntoIter<DynamicObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a DynamicObject;
    type IntoIter = std::slice::Iter<'a, DynamicObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}
