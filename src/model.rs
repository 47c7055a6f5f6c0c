use std::cmp::Ordering;
use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::error::{Result, StorageError};
use crate::ids::{EdgeTypeId, Gid, LabelId, PropertyId};

/// Property value attached to a vertex or edge.
///
/// Setting a property to `Null` removes it; stored property maps never
/// contain `Null` entries.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PropertyValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// Typed comparison. Int and Double compare numerically across types;
    /// any other cross-type comparison is an error.
    pub fn cmp_typed(&self, other: &PropertyValue) -> Result<Ordering> {
        use PropertyValue::*;
        match (self, other) {
            (Null, Null) => Ok(Ordering::Equal),
            (Bool(a), Bool(b)) => Ok(a.cmp(b)),
            (Int(a), Int(b)) => Ok(a.cmp(b)),
            (Double(a), Double(b)) => Ok(a.total_cmp(b)),
            (Int(a), Double(b)) => Ok((*a as f64).total_cmp(b)),
            (Double(a), Int(b)) => Ok(a.total_cmp(&(*b as f64))),
            (String(a), String(b)) => Ok(a.cmp(b)),
            (List(a), List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.cmp_typed(y)? {
                        Ordering::Equal => continue,
                        other => return Ok(other),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(StorageError::IncomparableValues),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_owned())
    }
}

/// Total-order wrapper over non-null property values, used as the sort key
/// of the label-property index. Values order first by type class (Bool <
/// numeric < String < List < Map), then by value; Int and Double share the
/// numeric class so `2` and `2.0` land in the same equal run.
#[derive(Debug, Clone)]
pub struct OrderedValue(PropertyValue);

impl OrderedValue {
    /// Returns `None` for `Null`: nulls are never indexed and never valid
    /// as index bounds.
    pub fn new(value: PropertyValue) -> Option<Self> {
        if value.is_null() {
            return None;
        }
        Some(Self(value))
    }

    pub fn value(&self) -> &PropertyValue {
        &self.0
    }

    fn type_class(&self) -> u8 {
        match &self.0 {
            PropertyValue::Null => unreachable!("null is never wrapped"),
            PropertyValue::Bool(_) => 0,
            PropertyValue::Int(_) | PropertyValue::Double(_) => 1,
            PropertyValue::String(_) => 2,
            PropertyValue::List(_) => 3,
            PropertyValue::Map(_) => 4,
        }
    }
}

impl PartialEq for OrderedValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedValue {}

impl PartialOrd for OrderedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use PropertyValue::*;
        let by_class = self.type_class().cmp(&other.type_class());
        if by_class != Ordering::Equal {
            return by_class;
        }
        match (&self.0, &other.0) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(_) | Double(_), Int(_) | Double(_)) => {
                let a = match &self.0 {
                    Int(v) => *v as f64,
                    Double(v) => *v,
                    _ => unreachable!(),
                };
                let b = match &other.0 {
                    Int(v) => *v as f64,
                    Double(v) => *v,
                    _ => unreachable!(),
                };
                a.total_cmp(&b)
            }
            (String(a), String(b)) => a.cmp(b),
            (List(a), List(b)) => {
                let a = a.iter().cloned().filter_map(OrderedValue::new);
                let b = b.iter().cloned().filter_map(OrderedValue::new);
                a.cmp(b)
            }
            (Map(a), Map(b)) => {
                let a = a
                    .iter()
                    .map(|(k, v)| (k.clone(), OrderedValue::new(v.clone())));
                let b = b
                    .iter()
                    .map(|(k, v)| (k.clone(), OrderedValue::new(v.clone())));
                a.cmp(b)
            }
            _ => unreachable!("type classes already matched"),
        }
    }
}

pub type PropertyMap = BTreeMap<PropertyId, PropertyValue>;

/// One adjacency entry on a vertex: the edge, the vertex on the other side
/// and the edge type, all by gid so records never own each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEntry {
    pub edge: Gid,
    pub vertex: Gid,
    pub edge_type: EdgeTypeId,
}

/// Vertex record. Immutable once published into a version chain; mutation
/// clones the record into a new version.
#[derive(Debug, Clone, Default)]
pub struct Vertex {
    pub labels: SmallVec<[LabelId; 4]>,
    pub properties: PropertyMap,
    pub out_edges: Vec<EdgeEntry>,
    pub in_edges: Vec<EdgeEntry>,
}

impl Vertex {
    pub fn has_label(&self, label: LabelId) -> bool {
        self.labels.contains(&label)
    }

    pub fn property(&self, key: PropertyId) -> PropertyValue {
        self.properties.get(&key).cloned().unwrap_or_default()
    }
}

/// Edge record. Endpoints are referenced by gid and resolved through the
/// vertex map.
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: Gid,
    pub to: Gid,
    pub edge_type: EdgeTypeId,
    pub properties: PropertyMap,
}

impl Edge {
    pub fn new(from: Gid, to: Gid, edge_type: EdgeTypeId) -> Self {
        Self {
            from,
            to,
            edge_type,
            properties: PropertyMap::new(),
        }
    }

    pub fn property(&self, key: PropertyId) -> PropertyValue {
        self.properties.get(&key).cloned().unwrap_or_default()
    }
}

/// Sets or removes (`Null`) a property, returning the previous value.
pub(crate) fn set_map_property(
    map: &mut PropertyMap,
    key: PropertyId,
    value: PropertyValue,
) -> PropertyValue {
    if value.is_null() {
        map.remove(&key).unwrap_or_default()
    } else {
        map.insert(key, value).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_values_compare_across_types() {
        let two = PropertyValue::Int(2);
        let two_point_five = PropertyValue::Double(2.5);
        assert_eq!(two.cmp_typed(&two_point_five).unwrap(), Ordering::Less);
        assert_eq!(
            PropertyValue::Double(2.0).cmp_typed(&two).unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn mismatched_types_are_incomparable() {
        let err = PropertyValue::Int(1)
            .cmp_typed(&PropertyValue::String("1".into()))
            .unwrap_err();
        assert!(matches!(err, StorageError::IncomparableValues));
    }

    #[test]
    fn ordered_value_rejects_null() {
        assert!(OrderedValue::new(PropertyValue::Null).is_none());
    }

    #[test]
    fn ordered_value_orders_by_type_class_then_value() {
        let bool_true = OrderedValue::new(true.into()).unwrap();
        let int_small = OrderedValue::new((-7i64).into()).unwrap();
        let double_mid = OrderedValue::new(3.5.into()).unwrap();
        let string = OrderedValue::new("a".into()).unwrap();
        assert!(bool_true < int_small);
        assert!(int_small < double_mid);
        assert!(double_mid < string);
    }

    #[test]
    fn ordered_value_unifies_numerics() {
        let int = OrderedValue::new(PropertyValue::Int(2)).unwrap();
        let double = OrderedValue::new(PropertyValue::Double(2.0)).unwrap();
        assert_eq!(int, double);
    }

    #[test]
    fn null_set_removes_property() {
        let mut map = PropertyMap::new();
        set_map_property(&mut map, 1, PropertyValue::Int(1));
        let old = set_map_property(&mut map, 1, PropertyValue::Null);
        assert_eq!(old, PropertyValue::Int(1));
        assert!(map.is_empty());
    }
}
