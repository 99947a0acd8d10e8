use crate::debugger::debugee::dwarf::unit::{DieRef, DieVariant, Unit};
use gimli::DwAte;
use indexmap::IndexMap;
use std::collections::VecDeque;

/// Type identifier, a reference to the defining DIE.
pub type TypeId = DieRef;

/// List of C type modifiers.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum CModifier {
    TypeDef,
    Const,
    Volatile,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructureMember {
    pub name: Option<String>,
    pub byte_offset: Option<i64>,
    pub type_ref: Option<TypeId>,
}

/// A single node in the type graph. All cross references are arena
/// identifiers, so cyclic types (a struct with a pointer to itself) are
/// representable.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeDeclaration {
    Scalar {
        name: Option<String>,
        byte_size: Option<u64>,
        encoding: Option<DwAte>,
    },
    Pointer {
        name: Option<String>,
        target: Option<TypeId>,
    },
    Structure {
        name: Option<String>,
        byte_size: Option<u64>,
        members: Vec<StructureMember>,
    },
    Union {
        name: Option<String>,
        byte_size: Option<u64>,
        members: Vec<StructureMember>,
    },
    Array {
        element: Option<TypeId>,
        byte_size: Option<u64>,
        count: Option<u64>,
    },
    Modified {
        modifier: CModifier,
        name: Option<String>,
        inner: Option<TypeId>,
    },
    Unknown,
}

/// A type with all its transitive dependencies, stored in an append-only
/// arena keyed by [`TypeId`].
#[derive(Debug)]
pub struct ComplexType {
    pub root: TypeId,
    types: IndexMap<TypeId, TypeDeclaration>,
}

impl ComplexType {
    /// Collect the type graph reachable from `root` inside one unit.
    /// References that cannot be resolved become [`TypeDeclaration::Unknown`].
    pub fn parse(unit: &Unit, root: TypeId) -> ComplexType {
        let mut types = IndexMap::new();
        let mut queue = VecDeque::from([root]);

        while let Some(id) = queue.pop_front() {
            if types.contains_key(&id) {
                continue;
            }
            let decl = parse_type_die(unit, id, &mut queue);
            types.insert(id, decl);
        }

        ComplexType { root, types }
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeDeclaration> {
        self.types.get(&id)
    }

    /// Unwrap typedefs and qualifiers down to the canonical type.
    pub fn canonical(&self, id: TypeId) -> (TypeId, &TypeDeclaration) {
        let mut current = id;
        // the chain cannot be longer than the arena itself
        for _ in 0..=self.types.len() {
            match self.types.get(&current) {
                Some(TypeDeclaration::Modified { inner, .. }) => match inner {
                    Some(inner) => current = *inner,
                    None => return (current, &TypeDeclaration::Unknown),
                },
                Some(decl) => return (current, decl),
                None => return (current, &TypeDeclaration::Unknown),
            }
        }
        (current, &TypeDeclaration::Unknown)
    }

    /// Size of the type value in bytes (canonical view).
    pub fn byte_size(&self, id: TypeId) -> Option<u64> {
        match self.canonical(id).1 {
            TypeDeclaration::Scalar { byte_size, .. } => *byte_size,
            TypeDeclaration::Pointer { .. } => Some(8),
            TypeDeclaration::Structure { byte_size, .. } => *byte_size,
            TypeDeclaration::Union { byte_size, .. } => *byte_size,
            TypeDeclaration::Array {
                byte_size,
                element,
                count,
            } => byte_size.or_else(|| {
                let element_size = self.byte_size((*element)?)?;
                Some(element_size * (*count)?)
            }),
            TypeDeclaration::Modified { .. } | TypeDeclaration::Unknown => None,
        }
    }

    /// Human readable type name, preserving the outermost alias.
    pub fn name(&self, id: TypeId) -> Option<String> {
        self.name_with_depth(id, 0)
    }

    fn name_with_depth(&self, id: TypeId, depth: usize) -> Option<String> {
        if depth > self.types.len() {
            return None;
        }
        match self.types.get(&id)? {
            TypeDeclaration::Scalar { name, .. }
            | TypeDeclaration::Structure { name, .. }
            | TypeDeclaration::Union { name, .. } => name.clone(),
            TypeDeclaration::Pointer { name, target } => name.clone().or_else(|| {
                let target_name = target
                    .and_then(|t| self.name_with_depth(t, depth + 1))
                    .unwrap_or_else(|| "void".to_string());
                Some(format!("{target_name} *"))
            }),
            TypeDeclaration::Array { element, .. } => {
                let element_name = element
                    .and_then(|e| self.name_with_depth(e, depth + 1))
                    .unwrap_or_else(|| "unknown".to_string());
                Some(format!("{element_name} []"))
            }
            TypeDeclaration::Modified {
                modifier,
                name,
                inner,
            } => match name {
                Some(name) => Some(name.clone()),
                None => {
                    let inner_name = inner
                        .and_then(|i| self.name_with_depth(i, depth + 1))
                        .unwrap_or_else(|| "unknown".to_string());
                    match modifier {
                        CModifier::Const => Some(format!("const {inner_name}")),
                        CModifier::Volatile => Some(format!("volatile {inner_name}")),
                        CModifier::TypeDef => Some(inner_name),
                    }
                }
            },
            TypeDeclaration::Unknown => None,
        }
    }
}

fn parse_type_die(unit: &Unit, id: TypeId, queue: &mut VecDeque<TypeId>) -> TypeDeclaration {
    let DieRef::Unit(offset) = id else {
        // C compilation units are self contained, cross-unit references are
        // left unresolved
        return TypeDeclaration::Unknown;
    };
    let Some(entry) = unit.find_entry(offset) else {
        return TypeDeclaration::Unknown;
    };

    let mut enqueue = |mb_ref: Option<DieRef>| {
        if let Some(type_ref) = mb_ref {
            queue.push_back(type_ref);
        }
        mb_ref
    };

    match &entry.die {
        DieVariant::BaseType(die) => TypeDeclaration::Scalar {
            name: die.base_attributes.name.clone(),
            byte_size: die.byte_size,
            encoding: die.encoding,
        },
        DieVariant::PointerType(die) => TypeDeclaration::Pointer {
            name: die.base_attributes.name.clone(),
            target: enqueue(die.type_ref),
        },
        DieVariant::StructType(die) => TypeDeclaration::Structure {
            name: die.base_attributes.name.clone(),
            byte_size: die.byte_size,
            members: parse_members(unit, &entry.node.children, &mut enqueue),
        },
        DieVariant::UnionType(die) => TypeDeclaration::Union {
            name: die.base_attributes.name.clone(),
            byte_size: die.byte_size,
            members: parse_members(unit, &entry.node.children, &mut enqueue),
        },
        DieVariant::ArrayType(die) => {
            let count = entry.node.children.iter().find_map(|&child_idx| {
                let DieVariant::ArraySubrange(subrange) = &unit.entry(child_idx).die else {
                    return None;
                };
                let from_count = subrange.count.as_ref().and_then(|attr| attr.udata_value());
                from_count.or_else(|| {
                    let upper = subrange.upper_bound.as_ref()?.udata_value()?;
                    let lower = subrange
                        .lower_bound
                        .as_ref()
                        .and_then(|attr| attr.udata_value())
                        .unwrap_or(0);
                    Some(upper - lower + 1)
                })
            });
            TypeDeclaration::Array {
                element: enqueue(die.type_ref),
                byte_size: die.byte_size,
                count,
            }
        }
        DieVariant::TypeDef(die) => TypeDeclaration::Modified {
            modifier: CModifier::TypeDef,
            name: die.base_attributes.name.clone(),
            inner: enqueue(die.type_ref),
        },
        DieVariant::ConstType(die) => TypeDeclaration::Modified {
            modifier: CModifier::Const,
            name: None,
            inner: enqueue(die.type_ref),
        },
        DieVariant::VolatileType(die) => TypeDeclaration::Modified {
            modifier: CModifier::Volatile,
            name: None,
            inner: enqueue(die.type_ref),
        },
        _ => TypeDeclaration::Unknown,
    }
}

fn parse_members(
    unit: &Unit,
    children: &[usize],
    enqueue: &mut impl FnMut(Option<DieRef>) -> Option<DieRef>,
) -> Vec<StructureMember> {
    children
        .iter()
        .filter_map(|&child_idx| {
            let DieVariant::TypeMember(member) = &unit.entry(child_idx).die else {
                return None;
            };
            let byte_offset = member
                .location
                .as_ref()
                .and_then(|attr| attr.udata_value().map(|v| v as i64).or(attr.sdata_value()));
            Some(StructureMember {
                name: member.base_attributes.name.clone(),
                byte_offset,
                type_ref: enqueue(member.type_ref),
            })
        })
        .collect()
}
