//! Record metadata: which column each field maps to and where it lives.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use indexmap::IndexMap;

use crate::sqlite::Field;
use crate::tag::{self, Annotation};

/// Declared name and raw annotation of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: &'static str,
    pub tag: &'static str,
}

/// A structured value whose fields map to table columns.
///
/// Usually implemented with [`record!`](crate::record). The three methods must
/// agree on field count and order.
pub trait Record: 'static {
    fn declared_fields() -> &'static [FieldDecl];

    fn fields(&self) -> Vec<&dyn Field>;

    fn fields_mut(&mut self) -> Vec<&mut dyn Field>;
}

/// Implements [`Record`] for a struct from a list of its fields and their
/// annotations.
///
/// ```
/// #[derive(Debug, Default)]
/// struct Row {
///     sid: i64,
///     name: String,
///     dummy: String,
/// }
///
/// rust_sorm::record!(Row {
///     sid => "fn=id;pk=true",
///     name => "_",
///     dummy,
/// });
/// ```
#[macro_export]
macro_rules! record {
    ($ty:ident { $($field:ident $(=> $tag:literal)?),* $(,)? }) => {
        impl $crate::Record for $ty {
            fn declared_fields() -> &'static [$crate::FieldDecl] {
                const FIELDS: &[$crate::FieldDecl] = &[$(
                    $crate::FieldDecl {
                        name: stringify!($field),
                        tag: $crate::record!(@tag $($tag)?),
                    }
                ),*];
                FIELDS
            }

            fn fields(&self) -> ::std::vec::Vec<&dyn $crate::Field> {
                vec![$(&self.$field as &dyn $crate::Field),*]
            }

            fn fields_mut(&mut self) -> ::std::vec::Vec<&mut dyn $crate::Field> {
                vec![$(&mut self.$field as &mut dyn $crate::Field),*]
            }
        }
    };
    (@tag) => { "" };
    (@tag $tag:literal) => { $tag };
}

/// One mapped field with a live reference to its storage.
#[derive(Debug)]
pub struct FieldMetadata<S> {
    pub column: String,
    pub primary_key: bool,
    pub storage: S,
}

/// Mapped fields keyed by column name, in declaration order.
pub type FieldMap<S> = IndexMap<String, FieldMetadata<S>>;

type Cache = RwLock<HashMap<TypeId, Arc<[Annotation]>>>;

static ANNOTATIONS: OnceLock<Cache> = OnceLock::new();

/// Parses every declared field of `R` without consulting the cache.
pub fn parse_annotations<R: Record>() -> Vec<Annotation> {
    R::declared_fields()
        .iter()
        .map(|decl| {
            let parsed = tag::parse(decl.name, decl.tag);
            for diagnostic in &parsed.diagnostics {
                tracing::warn!(
                    record = type_name::<R>(),
                    field = decl.name,
                    "skipping malformed annotation clause {diagnostic}"
                );
            }
            parsed.annotation
        })
        .collect()
}

/// Annotations of `R`, parsed once per type for the life of the process.
pub fn annotations<R: Record>() -> Arc<[Annotation]> {
    let cache = ANNOTATIONS.get_or_init(Default::default);
    let key = TypeId::of::<R>();

    if let Some(found) = cache
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return found.clone();
    }

    let parsed: Arc<[Annotation]> = parse_annotations::<R>().into();
    cache
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(key)
        .or_insert(parsed)
        .clone()
}

fn build<S>(annotations: &[Annotation], storage: Vec<S>) -> FieldMap<S> {
    debug_assert_eq!(annotations.len(), storage.len());

    let mut map = IndexMap::with_capacity(storage.len());
    for (annotation, storage) in annotations.iter().zip(storage) {
        if annotation.ignored {
            continue;
        }
        map.insert(
            annotation.column.clone(),
            FieldMetadata {
                column: annotation.column.clone(),
                primary_key: annotation.primary_key,
                storage,
            },
        );
    }
    map
}

/// Describes where the mapped fields of `record` live, for reading.
///
/// Ignored fields are skipped. An empty map means the record has nothing to
/// map, which callers treat as an error.
pub fn resolve<R: Record>(record: &R) -> FieldMap<&dyn Field> {
    build(&annotations::<R>(), record.fields())
}

/// Same as [`resolve`], for writing.
pub fn resolve_mut<R: Record>(record: &mut R) -> FieldMap<&mut dyn Field> {
    build(&annotations::<R>(), record.fields_mut())
}
