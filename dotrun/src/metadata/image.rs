//! The per-assembly metadata view: [`CilImage`].
//!
//! `CilImage` turns a parsed [`File`] into the immutable descriptor graph
//! the engine consumes: types with their fields and methods, the entry
//! point, referenced assembly names, and per-method instruction streams
//! with operands resolved against the metadata heaps. Everything is decoded
//! during construction; afterwards the image is self-contained and cheap to
//! share.

use std::sync::{Arc, OnceLock};

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::{
    disassembler::{self, TokenResolver},
    file::File,
    metadata::{
        signatures::{self, ElemKind},
        streams::{Blob, MetadataRoot, Strings, UserStrings},
        tables::{table, Tables},
        token::Token,
        typesystem::{
            CallSite, FieldDesc, FieldSite, MethodAttributes, MethodDesc, MethodImplAttributes,
            TypeAttributes, TypeDesc, TypeSite,
        },
    },
    Error::NotSupported,
    Result,
};

/// A fully loaded assembly: the metadata view the execution engine consumes.
///
/// The image exposes exactly the observable surface the engine relies on:
/// the assembly's simple name, its referenced assembly names, the ordered
/// type list with field/method descriptors, the entry-point method, and a
/// token lookup for methods. Descriptors are immutable and identity-shared.
///
/// # Examples
///
/// ```rust,no_run
/// use dotrun::CilImage;
/// use std::path::Path;
///
/// let image = CilImage::from_file(Path::new("program.exe"))?;
/// println!("{} types in {}", image.types().len(), image.name());
/// # Ok::<(), dotrun::Error>(())
/// ```
pub struct CilImage {
    name: String,
    module_name: String,
    references: Vec<String>,
    types: Vec<Arc<TypeDesc>>,
    entry_point: Option<Arc<MethodDesc>>,
}

impl CilImage {
    /// Loads and fully decodes an assembly from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is not a .NET PE image or its metadata
    /// is malformed.
    pub fn from_file(path: &std::path::Path) -> Result<CilImage> {
        let file = File::from_file(path)?;
        Self::build(&file)
    }

    /// Loads and fully decodes an assembly from a memory buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not a .NET PE image or its
    /// metadata is malformed.
    pub fn from_mem(data: Vec<u8>) -> Result<CilImage> {
        let file = File::from_mem(data)?;
        Self::build(&file)
    }

    /// Assembles an image from pre-built descriptors.
    ///
    /// This bypasses the binary layers entirely; it exists for embedders
    /// and test fixtures that synthesize programs in memory.
    #[must_use]
    pub fn from_parts(
        name: &str,
        types: Vec<Arc<TypeDesc>>,
        entry_point: Option<Arc<MethodDesc>>,
        references: Vec<String>,
    ) -> CilImage {
        CilImage {
            name: name.to_string(),
            module_name: format!("{name}.exe"),
            references,
            types,
            entry_point,
        }
    }

    /// Returns the assembly's simple name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the module file name recorded in the metadata.
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Returns the simple names of all referenced assemblies.
    #[must_use]
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Returns the type descriptors in declaration order.
    #[must_use]
    pub fn types(&self) -> &[Arc<TypeDesc>] {
        &self.types
    }

    /// Returns the entry-point method, if the image has one.
    #[must_use]
    pub fn entry_point(&self) -> Option<&Arc<MethodDesc>> {
        self.entry_point.as_ref()
    }

    /// Finds a type by namespace and simple name.
    #[must_use]
    pub fn find_type(&self, namespace: &str, name: &str) -> Option<&Arc<TypeDesc>> {
        self.types
            .iter()
            .find(|t| t.namespace == namespace && t.name == name)
    }

    /// Iterates over every method of every type.
    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodDesc>> {
        self.types.iter().flat_map(|t| t.methods.iter())
    }

    fn build(file: &File) -> Result<CilImage> {
        let cli = file.cli();
        let meta_offset = file.rva_to_offset(cli.metadata_rva)?;
        let meta = file.data_slice(meta_offset, cli.metadata_size as usize)?;

        let root = MetadataRoot::parse(meta)?;
        if root.stream("#-").is_some() {
            // Uncompressed (indirected) tables are an ENC artifact
            return Err(NotSupported);
        }

        let tables = Tables::parse(stream_slice(&root, meta, "#~")?)?;
        let strings = Strings::new(stream_slice(&root, meta, "#Strings")?);
        let user_strings = match root.stream("#US") {
            Some(_) => Some(UserStrings::new(stream_slice(&root, meta, "#US")?)),
            None => None,
        };
        let blob = Blob::new(stream_slice(&root, meta, "#Blob")?);

        let module_name = strings.get(tables.module(1)?.name)?.to_string();
        let name = if tables.row_count(table::ASSEMBLY) > 0 {
            strings.get(tables.assembly(1)?.name)?.to_string()
        } else {
            module_name
                .trim_end_matches(".dll")
                .trim_end_matches(".exe")
                .to_string()
        };

        let mut references = Vec::new();
        for row in 1..=tables.row_count(table::ASSEMBLY_REF) {
            references.push(strings.get(tables.assembly_ref(row)?.name)?.to_string());
        }

        // TypeRef rows, pre-resolved to (namespace, name)
        let mut type_refs = Vec::new();
        for row in 1..=tables.row_count(table::TYPE_REF) {
            let raw = tables.type_ref(row)?;
            type_refs.push((
                strings.get(raw.namespace)?.to_string(),
                strings.get(raw.name)?.to_string(),
            ));
        }

        // First pass: descriptors for every TypeDef with its field/method runs
        let type_count = tables.row_count(table::TYPE_DEF);
        let field_count = tables.row_count(table::FIELD);
        let method_count = tables.row_count(table::METHOD_DEF);

        let mut types = Vec::with_capacity(type_count as usize);
        let mut field_owner: FxHashMap<u32, FieldSite> = FxHashMap::default();
        let mut methods_by_token: FxHashMap<Token, Arc<MethodDesc>> = FxHashMap::default();

        for row in 1..=type_count {
            let raw = tables.type_def(row)?;
            let namespace = strings.get(raw.namespace)?.to_string();
            let type_name = strings.get(raw.name)?.to_string();

            let field_end = if row < type_count {
                tables.type_def(row + 1)?.field_list
            } else {
                field_count + 1
            };
            let method_end = if row < type_count {
                tables.type_def(row + 1)?.method_list
            } else {
                method_count + 1
            };

            let full_name = if namespace.is_empty() {
                type_name.clone()
            } else {
                format!("{namespace}.{type_name}")
            };

            let mut fields = Vec::new();
            for (ordinal, field_row) in (raw.field_list..field_end).enumerate() {
                let field = tables.field(field_row)?;
                let field_name = strings.get(field.name)?.to_string();
                let kind = match signatures::parse_field_sig(blob.get(field.signature)?) {
                    Ok(kind) => kind,
                    Err(e) => {
                        debug!("skipping field {full_name}::{field_name}: {e}");
                        continue;
                    }
                };
                field_owner.insert(
                    field_row,
                    FieldSite {
                        type_full_name: full_name.clone(),
                        name: field_name.clone(),
                    },
                );
                fields.push(Arc::new(FieldDesc {
                    name: field_name,
                    ordinal,
                    kind,
                }));
            }

            let mut methods = Vec::new();
            for method_row in raw.method_list..method_end {
                let method = tables.method_def(method_row)?;
                let method_name = strings.get(method.name)?.to_string();
                let sig = match signatures::parse_method_sig(blob.get(method.signature)?) {
                    Ok(sig) => sig,
                    Err(e) => {
                        debug!("skipping method {full_name}.{method_name}: {e}");
                        continue;
                    }
                };

                let token = Token::from_parts(0x06, method_row);
                let sig_string = sig.to_string();
                let desc = Arc::new(MethodDesc {
                    token,
                    name: method_name,
                    declaring_namespace: namespace.clone(),
                    declaring_name: type_name.clone(),
                    sig,
                    sig_string,
                    rva: method.rva,
                    param_list: method.param_list,
                    attributes: MethodAttributes::from_bits_truncate(method.flags),
                    impl_attributes: MethodImplAttributes::from_bits_truncate(method.impl_flags),
                    body: OnceLock::new(),
                });
                methods_by_token.insert(token, Arc::clone(&desc));
                methods.push(desc);
            }

            types.push(Arc::new(TypeDesc {
                token: Token::from_parts(0x02, row),
                namespace,
                name: type_name,
                attributes: TypeAttributes::from_bits_truncate(raw.flags),
                assembly: name.clone(),
                fields,
                methods,
            }));
        }

        // Second pass: decode method bodies with full token resolution
        let resolver = ImageResolver {
            tables: &tables,
            strings: &strings,
            user_strings: user_strings.as_ref(),
            blob: &blob,
            type_refs: &type_refs,
            types: &types,
            field_owner: &field_owner,
            methods_by_token: &methods_by_token,
        };

        for method in methods_by_token.values() {
            if method.rva == 0 {
                continue;
            }
            let offset = file.rva_to_offset(method.rva)?;
            let data = file
                .data()
                .get(offset..)
                .ok_or(crate::Error::OutOfBounds)?;
            match disassembler::decode_body(data, &resolver) {
                Ok(body) => {
                    let _ = method.body.set(Arc::new(body));
                }
                Err(e) => {
                    warn!(
                        "could not decode body of {}.{}: {e}",
                        method.declaring_full_name(),
                        method.name
                    );
                }
            }
        }

        let entry_token = Token::new(cli.entry_point_token);
        let entry_point = if entry_token.is_null() {
            None
        } else {
            methods_by_token.get(&entry_token).cloned()
        };

        Ok(CilImage {
            name,
            module_name,
            references,
            types,
            entry_point,
        })
    }
}

/// Returns the bytes of a named stream within the metadata root.
fn stream_slice<'a>(root: &MetadataRoot, meta: &'a [u8], name: &str) -> Result<&'a [u8]> {
    let header = root
        .stream(name)
        .ok_or_else(|| malformed_error!("Metadata stream '{}' is missing", name))?;
    let start = header.offset as usize;
    let end = start + header.size as usize;
    if end > meta.len() {
        return Err(crate::Error::OutOfBounds);
    }
    Ok(&meta[start..end])
}

/// Token resolution against a partially built image.
struct ImageResolver<'a> {
    tables: &'a Tables<'a>,
    strings: &'a Strings<'a>,
    user_strings: Option<&'a UserStrings<'a>>,
    blob: &'a Blob<'a>,
    type_refs: &'a [(String, String)],
    types: &'a [Arc<TypeDesc>],
    field_owner: &'a FxHashMap<u32, FieldSite>,
    methods_by_token: &'a FxHashMap<Token, Arc<MethodDesc>>,
}

impl ImageResolver<'_> {
    fn type_names(&self, table_id: usize, row: u32) -> Result<(String, String)> {
        match table_id {
            table::TYPE_DEF => {
                let ty = self
                    .types
                    .get(row as usize - 1)
                    .ok_or_else(|| malformed_error!("TypeDef row {} out of range", row))?;
                Ok((ty.namespace.clone(), ty.name.clone()))
            }
            table::TYPE_REF => self
                .type_refs
                .get(row as usize - 1)
                .cloned()
                .ok_or_else(|| malformed_error!("TypeRef row {} out of range", row)),
            _ => Err(NotSupported),
        }
    }
}

impl TokenResolver for ImageResolver<'_> {
    fn user_string(&self, token: Token) -> Result<String> {
        if token.table() != 0x70 {
            return Err(malformed_error!("ldstr token {} is not a #US token", token));
        }
        let heap = self
            .user_strings
            .ok_or_else(|| malformed_error!("Image has no #US heap"))?;
        heap.get(token.row())
    }

    fn call_site(&self, token: Token) -> Result<CallSite> {
        match usize::from(token.table()) {
            table::METHOD_DEF => {
                let method = self
                    .methods_by_token
                    .get(&token)
                    .ok_or_else(|| malformed_error!("Method token {} is not loaded", token))?;
                Ok(CallSite {
                    namespace: method.declaring_namespace.clone(),
                    type_name: method.declaring_name.clone(),
                    method_name: method.name.clone(),
                    sig: method.sig.clone(),
                    sig_string: method.sig_string.clone(),
                    rva: method.rva,
                    param_list: Some(method.param_list),
                })
            }
            table::MEMBER_REF => {
                let member = self.tables.member_ref(token.row())?;
                let (namespace, type_name) = self.type_names(member.class.0, member.class.1)?;
                let sig = signatures::parse_method_sig(self.blob.get(member.signature)?)?;
                let sig_string = sig.to_string();
                Ok(CallSite {
                    namespace,
                    type_name,
                    method_name: self.strings.get(member.name)?.to_string(),
                    sig,
                    sig_string,
                    rva: 0,
                    param_list: None,
                })
            }
            _ => Err(malformed_error!("Token {} cannot be a call target", token)),
        }
    }

    fn field_site(&self, token: Token) -> Result<FieldSite> {
        match usize::from(token.table()) {
            table::FIELD => self
                .field_owner
                .get(&token.row())
                .cloned()
                .ok_or_else(|| malformed_error!("Field token {} is not loaded", token)),
            table::MEMBER_REF => {
                let member = self.tables.member_ref(token.row())?;
                let (namespace, type_name) = self.type_names(member.class.0, member.class.1)?;
                let type_full_name = if namespace.is_empty() {
                    type_name
                } else {
                    format!("{namespace}.{type_name}")
                };
                Ok(FieldSite {
                    type_full_name,
                    name: self.strings.get(member.name)?.to_string(),
                })
            }
            _ => Err(malformed_error!("Token {} cannot be a field target", token)),
        }
    }

    fn type_site(&self, token: Token) -> Result<TypeSite> {
        let (namespace, name) = self.type_names(usize::from(token.table()), token.row())?;
        Ok(TypeSite { namespace, name })
    }

    fn locals(&self, token: Token) -> Result<Vec<ElemKind>> {
        if usize::from(token.table()) != table::STAND_ALONE_SIG {
            return Err(malformed_error!(
                "Locals token {} is not a StandAloneSig",
                token
            ));
        }
        let sig = self.tables.stand_alone_sig(token.row())?;
        signatures::parse_locals_sig(self.blob.get(sig.signature)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_surface() {
        let ty = TypeDesc::synthetic("Demo", "Program");
        let image = CilImage::from_parts("demo", vec![ty], None, vec!["mscorlib".to_string()]);
        assert_eq!(image.name(), "demo");
        assert_eq!(image.references(), &["mscorlib".to_string()]);
        assert!(image.find_type("Demo", "Program").is_some());
        assert!(image.find_type("Demo", "Missing").is_none());
        assert!(image.entry_point().is_none());
    }
}
