//! WebAssembly module decoder.
//!
//! Wraps the `wasmparser` crate to extract the typed sections a Go
//! (`GOOS=js GOARCH=wasm`) binary carries, plus the custom name section
//! used for readable identifiers. Function bodies are kept as raw operator
//! bytes and disassembled later by the lowerer.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use wasmparser::{ExternalKind, FuncType, KnownCustom, Name, Parser, Payload, TypeRef, ValType};

/// Parsed constant initializer expression.
/// MVP init expressions are a single `*.const` instruction.
#[derive(Debug, Clone, Copy)]
pub enum InitValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

/// A global variable definition. Mutability plays no role in the emitted
/// C++ (every global becomes a member field), so only type and init are
/// carried.
#[derive(Debug, Clone)]
pub struct GlobalInfo {
    pub val_type: ValType,
    pub init_value: InitValue,
}

/// An active data segment to initialize memory.
#[derive(Debug, Clone)]
pub struct DataSegment {
    /// Byte offset into memory 0, from the segment's const offset expression.
    pub offset: u32,
    pub data: Vec<u8>,
}

/// A function export. Memory exports are recognized and dropped during
/// parsing; any other kind fails the run.
#[derive(Debug, Clone)]
pub struct ExportInfo {
    pub name: String,
    pub func_index: u32,
}

/// A function in the full index space: imports first, then defined.
#[derive(Debug, Clone)]
pub struct FuncInfo {
    pub type_idx: u32,
    /// Import module/field names; present iff this is an import.
    pub import: Option<(String, String)>,
    /// Locals and body bytes; present iff this function is defined.
    pub body: Option<FuncBody>,
    /// Symbol name from the custom name section, when present.
    pub name: Option<String>,
}

impl FuncInfo {
    pub fn is_import(&self) -> bool {
        self.import.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct FuncBody {
    /// Local variable types (parameters live in the function type).
    pub locals: Vec<ValType>,
    /// Raw operator bytes, disassembled by the lowerer.
    pub code: Vec<u8>,
}

/// Decoded module, the unit the emitter consumes.
#[derive(Debug, Clone, Default)]
pub struct ParsedModule {
    pub types: Vec<FuncType>,
    pub funcs: Vec<FuncInfo>,
    pub num_imported_functions: u32,
    pub globals: Vec<GlobalInfo>,
    pub exports: Vec<ExportInfo>,
    /// Function-index tables, element segments already spliced in.
    pub tables: Vec<Vec<u32>>,
    pub data_segments: Vec<DataSegment>,
    /// Initial memory size in 64 KiB pages.
    pub initial_pages: u32,
}

impl ParsedModule {
    pub fn func_type(&self, func_index: u32) -> Result<&FuncType> {
        let func = self
            .funcs
            .get(func_index as usize)
            .with_context(|| format!("function index {} out of range", func_index))?;
        self.types
            .get(func.type_idx as usize)
            .with_context(|| format!("type index {} out of range", func.type_idx))
    }
}

/// Evaluate a const expression into an [`InitValue`].
fn eval_const_expr(const_expr: wasmparser::ConstExpr) -> Result<InitValue> {
    let mut reader = const_expr.get_operators_reader();
    let op = reader.read().context("reading const expr operator")?;
    match op {
        wasmparser::Operator::I32Const { value } => Ok(InitValue::I32(value)),
        wasmparser::Operator::I64Const { value } => Ok(InitValue::I64(value)),
        wasmparser::Operator::F32Const { value } => {
            Ok(InitValue::F32(f32::from_bits(value.bits())))
        }
        wasmparser::Operator::F64Const { value } => {
            Ok(InitValue::F64(f64::from_bits(value.bits())))
        }
        _ => bail!("unsupported const expression operator: {:?}", op),
    }
}

/// Evaluate an element/data offset expression, which must be i32.
fn eval_offset(const_expr: wasmparser::ConstExpr) -> Result<u32> {
    match eval_const_expr(const_expr)? {
        InitValue::I32(v) => Ok(v as u32),
        other => bail!("segment offset must be i32, got {:?}", other),
    }
}

/// Splice an element segment into its table, growing it as needed.
fn splice_element_segment(
    tables: &mut [Vec<u32>],
    element: wasmparser::Element,
) -> Result<()> {
    let (table_index, offset_expr) = match element.kind {
        wasmparser::ElementKind::Active {
            table_index,
            offset_expr,
        } => (table_index.unwrap_or(0), offset_expr),
        // Passive and declared segments never reach the static table.
        wasmparser::ElementKind::Passive | wasmparser::ElementKind::Declared => return Ok(()),
    };
    if table_index != 0 {
        bail!(
            "element segments for table {} are not supported",
            table_index
        );
    }
    let table = tables
        .get_mut(table_index as usize)
        .context("element segment without a table section")?;
    let offset = eval_offset(offset_expr)? as usize;
    let funcs = match element.items {
        wasmparser::ElementItems::Functions(funcs) => funcs,
        wasmparser::ElementItems::Expressions(..) => {
            bail!("expression element segments are not supported")
        }
    };
    let mut idx = offset;
    for func_idx in funcs {
        let func_idx = func_idx.context("reading element function index")?;
        if idx >= table.len() {
            table.resize(idx + 1, 0);
        }
        table[idx] = func_idx;
        idx += 1;
    }
    Ok(())
}

fn parse_data_segment(data: wasmparser::Data) -> Result<Option<DataSegment>> {
    match data.kind {
        wasmparser::DataKind::Active {
            memory_index: 0,
            offset_expr,
        } => Ok(Some(DataSegment {
            offset: eval_offset(offset_expr)?,
            data: data.data.to_vec(),
        })),
        wasmparser::DataKind::Passive => Ok(None),
        wasmparser::DataKind::Active { memory_index, .. } => {
            bail!(
                "data segments for memory {} are not supported",
                memory_index
            );
        }
    }
}

/// Parse a code section entry, expanding the run-length locals list.
fn parse_code_entry(body: wasmparser::FunctionBody) -> Result<FuncBody> {
    let mut locals = Vec::new();
    let locals_reader = body.get_locals_reader().context("getting locals reader")?;
    for local in locals_reader {
        let (count, val_type) = local.context("reading local")?;
        for _ in 0..count {
            locals.push(val_type);
        }
    }

    let operators_reader = body
        .get_operators_reader()
        .context("getting operators reader")?;
    let mut binary_reader = operators_reader.get_binary_reader();
    let remaining = binary_reader.bytes_remaining();
    let code = binary_reader
        .read_bytes(remaining)
        .context("reading body bytes")?;

    Ok(FuncBody {
        locals,
        code: code.to_vec(),
    })
}

/// Merge the custom name section's function names.
///
/// Entries are keyed by absolute function index, so a defined function k
/// resolves to index `num_imported_functions + k`.
fn parse_name_section(
    reader: wasmparser::NameSectionReader,
    names: &mut HashMap<u32, String>,
) -> Result<()> {
    for subsection in reader {
        let subsection = subsection.context("reading name subsection")?;
        if let Name::Function(map) = subsection {
            for naming in map {
                let naming = naming.context("reading function name")?;
                names.insert(naming.index, naming.name.to_string());
            }
        }
    }
    Ok(())
}

/// Decode a WebAssembly binary into a [`ParsedModule`].
pub fn parse_wasm(wasm_bytes: &[u8]) -> Result<ParsedModule> {
    let parser = Parser::new(0);

    let mut types: Vec<FuncType> = Vec::new();
    let mut funcs: Vec<FuncInfo> = Vec::new();
    let mut num_imported_functions: u32 = 0;
    let mut defined_type_indices: Vec<u32> = Vec::new();
    let mut num_bodies: usize = 0;
    let mut globals = Vec::new();
    let mut exports = Vec::new();
    let mut tables: Vec<Vec<u32>> = Vec::new();
    let mut data_segments = Vec::new();
    let mut initial_pages: u32 = 0;
    let mut names: HashMap<u32, String> = HashMap::new();

    for payload in parser.parse_all(wasm_bytes) {
        let payload = payload.context("parsing wasm payload")?;

        match payload {
            Payload::TypeSection(reader) => {
                for rec_group in reader {
                    let rec_group = rec_group.context("reading rec group")?;
                    for sub_type in rec_group.types() {
                        match &sub_type.composite_type.inner {
                            wasmparser::CompositeInnerType::Func(func_ty) => {
                                types.push(func_ty.clone());
                            }
                            other => bail!("unsupported composite type: {:?}", other),
                        }
                    }
                }
            }

            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import.context("reading import")?;
                    match import.ty {
                        TypeRef::Func(type_idx) => {
                            num_imported_functions += 1;
                            funcs.push(FuncInfo {
                                type_idx,
                                import: Some((
                                    import.module.to_string(),
                                    import.name.to_string(),
                                )),
                                body: None,
                                name: None,
                            });
                        }
                        other => bail!("unsupported import kind: {:?}", other),
                    }
                }
            }

            Payload::FunctionSection(reader) => {
                for func_type_idx in reader {
                    let type_idx = func_type_idx.context("reading function type index")?;
                    defined_type_indices.push(type_idx);
                    funcs.push(FuncInfo {
                        type_idx,
                        import: None,
                        body: None,
                        name: None,
                    });
                }
            }

            Payload::CodeSectionEntry(body) => {
                // Bodies align index-by-index with the function section.
                let defined_idx = num_bodies;
                num_bodies += 1;
                if defined_idx >= defined_type_indices.len() {
                    bail!("code section entry {} has no function declaration", defined_idx);
                }
                let func_idx = num_imported_functions as usize + defined_idx;
                funcs[func_idx].body = Some(parse_code_entry(body)?);
            }

            Payload::MemorySection(reader) => {
                if let Some(mem) = reader.into_iter().next() {
                    let memory_type = mem.context("reading memory type")?;
                    initial_pages = memory_type.initial as u32;
                }
            }

            Payload::TableSection(reader) => {
                for table in reader {
                    let table = table.context("reading table type")?;
                    tables.push(vec![0; table.ty.initial as usize]);
                }
            }

            Payload::ElementSection(reader) => {
                for element in reader {
                    let element = element.context("reading element segment")?;
                    splice_element_segment(&mut tables, element)?;
                }
            }

            Payload::GlobalSection(reader) => {
                for global in reader {
                    let global = global.context("reading global")?;
                    let init_value = eval_const_expr(global.init_expr)?;
                    globals.push(GlobalInfo {
                        val_type: global.ty.content_type,
                        init_value,
                    });
                }
            }

            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export.context("reading export")?;
                    match export.kind {
                        ExternalKind::Func => exports.push(ExportInfo {
                            name: export.name.to_string(),
                            func_index: export.index,
                        }),
                        // The host runtime owns the memory object; a memory
                        // export adds nothing.
                        ExternalKind::Memory => {}
                        other => bail!("unsupported export kind: {:?}", other),
                    }
                }
            }

            Payload::StartSection { func, .. } => {
                bail!("start sections are not supported (start function {})", func);
            }

            Payload::DataSection(reader) => {
                for data in reader {
                    let data = data.context("reading data segment")?;
                    if let Some(segment) = parse_data_segment(data)? {
                        data_segments.push(segment);
                    }
                }
            }

            Payload::CustomSection(reader) => {
                if let KnownCustom::Name(name_reader) = reader.as_known() {
                    parse_name_section(name_reader, &mut names)?;
                }
            }

            _ => {}
        }
    }

    if num_bodies != defined_type_indices.len() {
        bail!(
            "code section has {} bodies for {} declared functions",
            num_bodies,
            defined_type_indices.len()
        );
    }
    for (idx, name) in names {
        if let Some(func) = funcs.get_mut(idx as usize) {
            func.name = Some(name);
        }
    }
    for func in &funcs {
        if types.get(func.type_idx as usize).is_none() {
            bail!("function references unknown type index {}", func.type_idx);
        }
    }
    for export in &exports {
        if funcs.get(export.func_index as usize).is_none() {
            bail!(
                "export {:?} references unknown function index {}",
                export.name,
                export.func_index
            );
        }
    }

    Ok(ParsedModule {
        types,
        funcs,
        num_imported_functions,
        globals,
        exports,
        tables,
        data_segments,
        initial_pages,
    })
}
