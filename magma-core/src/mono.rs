//! Monomorphization bookkeeping.
//!
//! A generic template is specialized once per distinct tuple of concrete
//! arguments. The checker asks [`Monomorphizer::instantiate`] for a
//! symbol; a fresh key is reserved *before* its body is generated so that
//! recursive uses resolve to the same symbol instead of recursing forever.
//!
//! Symbols use source type names: `Wrapper<I32>` becomes `Wrapper_I32`,
//! a variadic `sum` called with three arguments becomes `sum_3`.

use std::collections::HashMap;

use tracing::trace;

use crate::types::{ArrayDim, TypeRef};

/// One concrete argument of a specialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GenericArg {
    Type(TypeRef),
    /// Value of a `<N : USize>` length parameter.
    Length(u64),
}

impl GenericArg {
    pub fn mangle(&self) -> String {
        match self {
            GenericArg::Type(ty) => ty.mangle(),
            GenericArg::Length(n) => n.to_string(),
        }
    }
}

/// `(template name, concrete arguments)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonoKey {
    pub template: String,
    pub args: Vec<GenericArg>,
}

impl MonoKey {
    pub fn new(template: impl Into<String>, args: Vec<GenericArg>) -> Self {
        MonoKey {
            template: template.into(),
            args,
        }
    }

    pub fn symbol_name(&self) -> String {
        if self.args.is_empty() {
            self.template.clone()
        } else {
            let parts: Vec<String> = self.args.iter().map(GenericArg::mangle).collect();
            format!("{}_{}", self.template, parts.join("_"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instance {
    /// Already generated (or being generated); reuse the symbol.
    Cached(String),
    /// Newly reserved; the caller must generate the definition.
    Fresh(String),
}

impl Instance {
    pub fn symbol(&self) -> &str {
        match self {
            Instance::Cached(symbol) | Instance::Fresh(symbol) => symbol,
        }
    }
}

#[derive(Debug, Clone)]
struct MonoEntry {
    symbol: String,
    ret: Option<TypeRef>,
}

/// Specialization cache for one compilation.
#[derive(Debug, Default)]
pub struct Monomorphizer {
    cache: HashMap<MonoKey, MonoEntry>,
    generated: usize,
}

impl Monomorphizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instantiate(&mut self, key: MonoKey) -> Instance {
        let symbol = key.symbol_name();
        self.instantiate_as(key, symbol)
    }

    /// Like [`Monomorphizer::instantiate`] with a caller-chosen symbol,
    /// used for methods of generic structs.
    pub fn instantiate_as(&mut self, key: MonoKey, symbol: String) -> Instance {
        if let Some(entry) = self.cache.get(&key) {
            trace!(symbol = %entry.symbol, "specialization cache hit");
            return Instance::Cached(entry.symbol.clone());
        }
        trace!(%symbol, "specialization cache miss");
        self.generated += 1;
        self.cache.insert(
            key,
            MonoEntry {
                symbol: symbol.clone(),
                ret: None,
            },
        );
        Instance::Fresh(symbol)
    }

    /// Return type of a function specialization, once known.
    pub fn return_type(&self, key: &MonoKey) -> Option<&TypeRef> {
        self.cache.get(key).and_then(|entry| entry.ret.as_ref())
    }

    pub fn set_return_type(&mut self, key: &MonoKey, ret: TypeRef) {
        if let Some(entry) = self.cache.get_mut(key) {
            entry.ret = Some(ret);
        }
    }

    /// Number of distinct specializations generated so far.
    pub fn generated(&self) -> usize {
        self.generated
    }
}

pub type Bindings = HashMap<String, GenericArg>;

/// Match `pattern` (which may mention type and length parameters) against
/// the concrete `actual`, extending `bindings`. Returns `false` on a
/// structural mismatch or a conflicting binding.
pub fn unify(pattern: &TypeRef, actual: &TypeRef, bindings: &mut Bindings) -> bool {
    match (pattern, actual) {
        (TypeRef::Generic(name), _) => bind(bindings, name, GenericArg::Type(actual.clone())),
        (
            TypeRef::Pointer {
                target: p_target,
                mutable: p_mut,
            },
            TypeRef::Pointer {
                target: a_target,
                mutable: a_mut,
            },
        ) => (*a_mut || !*p_mut) && unify(p_target, a_target, bindings),
        (
            TypeRef::Array {
                element: p_elem,
                dims: p_dims,
            },
            TypeRef::Array {
                element: a_elem,
                dims: a_dims,
            },
        ) => {
            p_dims.len() == a_dims.len()
                && p_dims.iter().zip(a_dims).all(|(p, a)| match (p, a) {
                    (ArrayDim::Param(name), ArrayDim::Known(n)) => {
                        bind(bindings, name, GenericArg::Length(*n))
                    }
                    _ => p == a,
                })
                && unify(p_elem, a_elem, bindings)
        }
        (
            TypeRef::Named {
                name: p_name,
                args: p_args,
            },
            TypeRef::Named {
                name: a_name,
                args: a_args,
            },
        ) => {
            p_name == a_name
                && p_args.len() == a_args.len()
                && p_args.iter().zip(a_args).all(|(p, a)| unify(p, a, bindings))
        }
        (
            TypeRef::Function {
                params: p_params,
                ret: p_ret,
            },
            TypeRef::Function {
                params: a_params,
                ret: a_ret,
            },
        ) => {
            p_params.len() == a_params.len()
                && p_params
                    .iter()
                    .zip(a_params)
                    .all(|(p, a)| unify(p, a, bindings))
                && unify(p_ret, a_ret, bindings)
        }
        _ => pattern == actual,
    }
}

fn bind(bindings: &mut Bindings, name: &str, value: GenericArg) -> bool {
    match bindings.get(name) {
        Some(existing) => *existing == value,
        None => {
            bindings.insert(name.to_string(), value);
            true
        }
    }
}

/// Replace every bound parameter in `ty`.
pub fn substitute(ty: &TypeRef, bindings: &Bindings) -> TypeRef {
    match ty {
        TypeRef::Generic(name) => match bindings.get(name) {
            Some(GenericArg::Type(bound)) => bound.clone(),
            _ => ty.clone(),
        },
        TypeRef::Primitive(_) | TypeRef::CStr => ty.clone(),
        TypeRef::Pointer { target, mutable } => TypeRef::pointer(substitute(target, bindings), *mutable),
        TypeRef::Array { element, dims } => TypeRef::Array {
            element: Box::new(substitute(element, bindings)),
            dims: dims
                .iter()
                .map(|dim| match dim {
                    ArrayDim::Param(name) => match bindings.get(name) {
                        Some(GenericArg::Length(n)) => ArrayDim::Known(*n),
                        _ => dim.clone(),
                    },
                    ArrayDim::Known(_) => dim.clone(),
                })
                .collect(),
        },
        TypeRef::Named { name, args } => TypeRef::Named {
            name: name.clone(),
            args: args.iter().map(|a| substitute(a, bindings)).collect(),
        },
        TypeRef::Function { params, ret } => TypeRef::Function {
            params: params.iter().map(|p| substitute(p, bindings)).collect(),
            ret: Box::new(substitute(ret, bindings)),
        },
        TypeRef::Union { name, members } => TypeRef::Union {
            name: name.clone(),
            members: members.iter().map(|m| substitute(m, bindings)).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Primitive;

    #[test]
    fn symbols_use_source_type_names() {
        let key = MonoKey::new("Wrapper", vec![GenericArg::Type(TypeRef::I32)]);
        assert_eq!(key.symbol_name(), "Wrapper_I32");
        let key = MonoKey::new("sum", vec![GenericArg::Length(3)]);
        assert_eq!(key.symbol_name(), "sum_3");
        let key = MonoKey::new(
            "first",
            vec![GenericArg::Type(TypeRef::pointer(TypeRef::U8, false))],
        );
        assert_eq!(key.symbol_name(), "first_PtrU8");
    }

    #[test]
    fn second_instantiation_hits_the_cache() {
        let mut mono = Monomorphizer::new();
        let key = MonoKey::new("id", vec![GenericArg::Type(TypeRef::BOOL)]);
        assert_eq!(mono.instantiate(key.clone()), Instance::Fresh("id_Bool".into()));
        assert_eq!(mono.instantiate(key), Instance::Cached("id_Bool".into()));
        assert_eq!(mono.generated(), 1);
    }

    #[test]
    fn return_types_are_recorded_per_key() {
        let mut mono = Monomorphizer::new();
        let key = MonoKey::new("id", vec![GenericArg::Type(TypeRef::I32)]);
        mono.instantiate(key.clone());
        assert_eq!(mono.return_type(&key), None);
        mono.set_return_type(&key, TypeRef::I32);
        assert_eq!(mono.return_type(&key), Some(&TypeRef::I32));
    }

    #[test]
    fn unify_binds_types_and_lengths() {
        let pattern = TypeRef::Array {
            element: Box::new(TypeRef::Generic("T".into())),
            dims: vec![ArrayDim::Param("Length".into())],
        };
        let actual = TypeRef::array(TypeRef::Primitive(Primitive::I64), vec![4]);
        let mut bindings = Bindings::new();
        assert!(unify(&pattern, &actual, &mut bindings));
        assert_eq!(
            bindings.get("T"),
            Some(&GenericArg::Type(TypeRef::Primitive(Primitive::I64)))
        );
        assert_eq!(bindings.get("Length"), Some(&GenericArg::Length(4)));
        assert_eq!(substitute(&pattern, &bindings), actual);
    }

    #[test]
    fn unify_rejects_conflicting_bindings() {
        let t = TypeRef::Generic("T".into());
        let mut bindings = Bindings::new();
        assert!(unify(&t, &TypeRef::I32, &mut bindings));
        assert!(!unify(&t, &TypeRef::BOOL, &mut bindings));
    }
}
