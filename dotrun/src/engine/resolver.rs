//! Method resolution: turning a call site into a concrete method.
//!
//! Resolution follows a fixed order against the set of loaded assemblies:
//!
//! 1. A site with a nonzero RVA matches a method with the same RVA, name,
//!    signature and declaring-type full name (plus the param-list index
//!    when the site carries one, which disambiguates overloads).
//! 2. `System.Object..ctor` with RVA 0 resolves to a no-op sentinel.
//! 3. Otherwise the (declaring type, name, signature) tuple is looked up.
//! 4. A virtual call re-selects the method of the receiver's declared type
//!    by name and signature when that type provides one; this single lookup
//!    implements both interface-to-concrete redirection and override
//!    dispatch.
//!
//! The indexes are hash maps built once over all loaded images; behaviour
//! is identical to a linear scan of every type of every assembly, just not
//! linear.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::{
    engine::{error::RuntimeError, value::Value},
    metadata::{
        typesystem::{CallSite, MethodDesc, TypeDesc},
        CilImage,
    },
};

/// How a call site is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `call` - static or non-virtual instance call.
    Direct,
    /// `callvirt` - receiver-dispatched call.
    Virtual,
    /// `newobj` - constructor call on a fresh instance.
    Constructor,
}

/// The outcome of resolving a call site.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A concrete method to execute.
    Method(Arc<MethodDesc>),
    /// The `System.Object..ctor` sentinel: nothing to execute.
    ObjectCtorNop,
}

/// Hash-indexed view over every loaded assembly.
pub struct Resolver {
    by_name: FxHashMap<(String, String, String), Arc<MethodDesc>>,
    by_rva: FxHashMap<u32, Vec<Arc<MethodDesc>>>,
    types: FxHashMap<String, Arc<TypeDesc>>,
}

impl Resolver {
    /// Builds the indexes over the given images.
    ///
    /// Later images do not shadow earlier ones: the first registration of
    /// a (type, name, signature) tuple wins, matching load order.
    #[must_use]
    pub fn build(images: &[Arc<CilImage>]) -> Resolver {
        let mut by_name = FxHashMap::default();
        let mut by_rva: FxHashMap<u32, Vec<Arc<MethodDesc>>> = FxHashMap::default();
        let mut types = FxHashMap::default();

        for image in images {
            for ty in image.types() {
                types
                    .entry(ty.full_name())
                    .or_insert_with(|| Arc::clone(ty));

                for method in &ty.methods {
                    by_name
                        .entry((
                            ty.full_name(),
                            method.name.clone(),
                            method.sig_string.clone(),
                        ))
                        .or_insert_with(|| Arc::clone(method));

                    if method.rva != 0 {
                        by_rva.entry(method.rva).or_default().push(Arc::clone(method));
                    }
                }
            }
        }

        Resolver {
            by_name,
            by_rva,
            types,
        }
    }

    /// Finds a loaded type by full name.
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<&Arc<TypeDesc>> {
        self.types.get(full_name)
    }

    /// Resolves a call site to a concrete method.
    ///
    /// # Arguments
    ///
    /// * `site` - The symbolic target from the instruction operand.
    /// * `kind` - Whether the call is direct, virtual or a constructor.
    /// * `receiver` - The would-be receiver (peeked below the parameters),
    ///   consulted only for virtual calls.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::MethodNotFound`] when nothing matches.
    pub fn resolve(
        &self,
        site: &CallSite,
        kind: CallKind,
        receiver: Option<&Value>,
    ) -> Result<Resolution, RuntimeError> {
        let resolved = self.resolve_static(site)?;

        let resolved = match resolved {
            Resolution::ObjectCtorNop => return Ok(Resolution::ObjectCtorNop),
            Resolution::Method(m) => m,
        };

        if kind == CallKind::Virtual {
            if let Some(Value::Object { ty, .. }) = receiver {
                if let Some(overriding) = ty.method(&resolved.name, &resolved.sig_string) {
                    if !Arc::ptr_eq(overriding, &resolved) {
                        return Ok(Resolution::Method(Arc::clone(overriding)));
                    }
                }
            }
        }

        Ok(Resolution::Method(resolved))
    }

    fn resolve_static(&self, site: &CallSite) -> Result<Resolution, RuntimeError> {
        let type_full_name = site.type_full_name();

        if site.rva != 0 {
            if let Some(candidates) = self.by_rva.get(&site.rva) {
                let hit = candidates.iter().find(|m| {
                    m.name == site.method_name
                        && m.sig_string == site.sig_string
                        && m.declaring_full_name() == type_full_name
                        && site.param_list.map_or(true, |p| m.param_list == p)
                });
                if let Some(method) = hit {
                    return Ok(Resolution::Method(Arc::clone(method)));
                }
            }
        }

        if site.rva == 0 && type_full_name == "System.Object" && site.method_name == ".ctor" {
            return Ok(Resolution::ObjectCtorNop);
        }

        if let Some(method) = self.by_name.get(&(
            type_full_name.clone(),
            site.method_name.clone(),
            site.sig_string.clone(),
        )) {
            return Ok(Resolution::Method(Arc::clone(method)));
        }

        Err(RuntimeError::MethodNotFound {
            name: format!("{}.{}", type_full_name, site.method_name),
            sig: site.sig_string.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        signatures::{ElemKind, MethodSig},
        token::Token,
        typesystem::{MethodAttributes, MethodImplAttributes, TypeAttributes},
    };
    use std::sync::OnceLock;

    fn method(
        declaring_ns: &str,
        declaring_name: &str,
        name: &str,
        rva: u32,
        param_list: u32,
    ) -> Arc<MethodDesc> {
        let sig = MethodSig {
            has_this: false,
            params: Vec::new(),
            ret: ElemKind::Void,
        };
        let sig_string = sig.to_string();
        Arc::new(MethodDesc {
            token: Token::new(0x06000001),
            name: name.to_string(),
            declaring_namespace: declaring_ns.to_string(),
            declaring_name: declaring_name.to_string(),
            sig,
            sig_string,
            rva,
            param_list,
            attributes: MethodAttributes::STATIC,
            impl_attributes: MethodImplAttributes::empty(),
            body: OnceLock::new(),
        })
    }

    fn image_with(methods: Vec<Arc<MethodDesc>>) -> Arc<CilImage> {
        let ty = Arc::new(TypeDesc {
            token: Token::new(0x02000002),
            namespace: "Demo".to_string(),
            name: "Program".to_string(),
            attributes: TypeAttributes::empty(),
            assembly: "demo".to_string(),
            fields: Vec::new(),
            methods,
        });
        Arc::new(CilImage::from_parts("demo", vec![ty], None, Vec::new()))
    }

    fn site(ns: &str, ty: &str, name: &str, rva: u32, param_list: Option<u32>) -> CallSite {
        let sig = MethodSig {
            has_this: false,
            params: Vec::new(),
            ret: ElemKind::Void,
        };
        let sig_string = sig.to_string();
        CallSite {
            namespace: ns.to_string(),
            type_name: ty.to_string(),
            method_name: name.to_string(),
            sig,
            sig_string,
            rva,
            param_list,
        }
    }

    #[test]
    fn resolves_by_rva_with_param_list_disambiguation() {
        let a = method("Demo", "Program", "Run", 0x2050, 1);
        let b = method("Demo", "Program", "Run", 0x2050, 3);
        let resolver = Resolver::build(&[image_with(vec![a, b.clone()])]);

        let resolution = resolver
            .resolve(&site("Demo", "Program", "Run", 0x2050, Some(3)), CallKind::Direct, None)
            .unwrap();
        match resolution {
            Resolution::Method(m) => assert!(Arc::ptr_eq(&m, &b)),
            other => panic!("unexpected resolution {other:?}"),
        }
    }

    #[test]
    fn object_ctor_is_a_nop() {
        let resolver = Resolver::build(&[]);
        let resolution = resolver
            .resolve(&site("System", "Object", ".ctor", 0, None), CallKind::Direct, None)
            .unwrap();
        assert!(matches!(resolution, Resolution::ObjectCtorNop));
    }

    #[test]
    fn resolves_by_name_tuple() {
        let m = method("Demo", "Program", "Helper", 0x2010, 1);
        let resolver = Resolver::build(&[image_with(vec![m.clone()])]);

        let resolution = resolver
            .resolve(&site("Demo", "Program", "Helper", 0, None), CallKind::Direct, None)
            .unwrap();
        match resolution {
            Resolution::Method(found) => assert!(Arc::ptr_eq(&found, &m)),
            other => panic!("unexpected resolution {other:?}"),
        }
    }

    #[test]
    fn unresolved_site_errors() {
        let resolver = Resolver::build(&[]);
        let err = resolver
            .resolve(&site("Demo", "Program", "Missing", 0, None), CallKind::Direct, None)
            .unwrap_err();
        assert_eq!(err.kind(), "MethodNotFound");
    }
}
