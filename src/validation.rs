use std::collections::HashMap;

use crate::binary::{
    self,
    section::{Data, ExportDesc, ImportDesc},
    ty::{FunctionType, MemoryType, ValueType},
};
use crate::error::LinkError;

/// A function imported from the host, addressed by `(module, name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import<'a> {
    pub module: &'a str,
    pub name: &'a str,
    pub ty: u32,
}

/// A function defined by the module itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Func<'a> {
    pub ty: u32,
    /// Declared locals, expanded one entry per slot. Parameters are not
    /// included.
    pub locals: Vec<ValueType>,
    pub code: &'a [u8],
}

/// Sections reconciled into one index space. Function indices count
/// imports first, then defined functions.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Module<'a> {
    pub types: Vec<FunctionType>,
    pub imports: Vec<Import<'a>>,
    pub funcs: Vec<Func<'a>>,
    pub exports: HashMap<&'a str, u32>,
    pub memory: Option<MemoryType>,
    pub data: Vec<Data<'a>>,
}

#[derive(Debug, Clone, Copy)]
pub enum Function<'m, 'a> {
    Imported(&'m Import<'a>),
    Defined(&'m Func<'a>),
}

impl<'a> Module<'a> {
    pub fn link(module: binary::Module<'a>) -> Result<Self, LinkError> {
        let types = module.type_section.map(|s| s.0).unwrap_or_default();
        let check_type = |ty: u32| {
            if (ty as usize) < types.len() {
                Ok(ty)
            } else {
                Err(LinkError::TypeIndexOutOfBounds(ty))
            }
        };

        let mut imports = Vec::new();
        for import in module.import_section.map(|s| s.0).unwrap_or_default() {
            match import.desc {
                ImportDesc::Func(ty) => imports.push(Import {
                    module: import.module,
                    name: import.name,
                    ty: check_type(ty)?,
                }),
                desc => log::debug!(
                    "ignoring non-function import {}.{}: {desc:?}",
                    import.module,
                    import.name
                ),
            }
        }

        let declared = module.func_section.map(|s| s.0).unwrap_or_default();
        let bodies = module.code_section.map(|s| s.0).unwrap_or_default();
        if declared.len() != bodies.len() {
            return Err(LinkError::FunctionCountMismatch {
                declared: declared.len(),
                bodies: bodies.len(),
            });
        }
        let funcs = declared
            .into_iter()
            .zip(bodies)
            .map(|(ty, body)| {
                Ok(Func {
                    ty: check_type(ty)?,
                    locals: body
                        .locals
                        .iter()
                        .flat_map(|l| std::iter::repeat_n(l.ty, l.count as usize))
                        .collect(),
                    code: body.code,
                })
            })
            .collect::<Result<Vec<_>, LinkError>>()?;

        let func_count = imports.len() + funcs.len();
        let mut exports = HashMap::new();
        for export in module.export_section.map(|s| s.0).unwrap_or_default() {
            if let ExportDesc::Func(index) = export.desc {
                if index as usize >= func_count {
                    return Err(LinkError::FunctionIndexOutOfBounds(index));
                }
                exports.insert(export.name, index);
            }
        }

        let memory = module
            .memory_section
            .and_then(|s| s.0.into_iter().next());

        log::debug!(
            "linked {} types, {} imported and {} defined functions, {} exports",
            types.len(),
            imports.len(),
            funcs.len(),
            exports.len()
        );

        Ok(Self {
            types,
            imports,
            funcs,
            exports,
            memory,
            data: module.data_section.map(|s| s.0).unwrap_or_default(),
        })
    }

    pub fn function(&self, index: u32) -> Option<Function<'_, 'a>> {
        let index = index as usize;
        match index.checked_sub(self.imports.len()) {
            None => self.imports.get(index).map(Function::Imported),
            Some(defined) => self.funcs.get(defined).map(Function::Defined),
        }
    }

    pub fn func_type(&self, index: u32) -> Option<&FunctionType> {
        let ty = match self.function(index)? {
            Function::Imported(import) => import.ty,
            Function::Defined(func) => func.ty,
        };
        self.types.get(ty as usize)
    }

    pub fn export(&self, name: &str) -> Result<u32, LinkError> {
        self.exports
            .get(name)
            .copied()
            .ok_or_else(|| LinkError::ExportNotFound(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::section::{
        CodeDef, CodeSection, Export, ExportSection, FuncSection, Import as ImportEntry,
        ImportSection, Locals, TypeSection,
    };

    fn binary_module<'a>(func_types: Vec<u32>, bodies: usize) -> binary::Module<'a> {
        binary::Module {
            type_section: Some(TypeSection(vec![FunctionType {
                inputs: vec![ValueType::I32],
                outputs: vec![],
            }])),
            func_section: Some(FuncSection(func_types)),
            code_section: Some(CodeSection(
                (0..bodies)
                    .map(|_| CodeDef {
                        locals: vec![
                            Locals {
                                count: 2,
                                ty: ValueType::I64,
                            },
                            Locals {
                                count: 1,
                                ty: ValueType::F32,
                            },
                        ],
                        code: &[0x01],
                    })
                    .collect(),
            )),
            ..Default::default()
        }
    }

    #[test]
    fn expands_locals() -> anyhow::Result<()> {
        let module = Module::link(binary_module(vec![0], 1))?;
        assert_eq!(
            vec![ValueType::I64, ValueType::I64, ValueType::F32],
            module.funcs[0].locals
        );
        Ok(())
    }

    #[test]
    fn type_index_is_checked() {
        assert_eq!(
            Err(LinkError::TypeIndexOutOfBounds(1)),
            Module::link(binary_module(vec![0, 1], 2))
        );
    }

    #[test]
    fn body_count_must_match() {
        assert_eq!(
            Err(LinkError::FunctionCountMismatch {
                declared: 1,
                bodies: 2
            }),
            Module::link(binary_module(vec![0], 2))
        );
    }

    #[test]
    fn imports_come_first() -> anyhow::Result<()> {
        let mut binary = binary_module(vec![0], 1);
        binary.import_section = Some(ImportSection(vec![ImportEntry {
            module: "env",
            name: "print",
            desc: ImportDesc::Func(0),
        }]));
        binary.export_section = Some(ExportSection(vec![Export {
            name: "run",
            desc: ExportDesc::Func(1),
        }]));
        let module = Module::link(binary)?;
        assert!(matches!(module.function(0), Some(Function::Imported(i)) if i.name == "print"));
        assert!(matches!(module.function(1), Some(Function::Defined(_))));
        assert!(module.function(2).is_none());
        assert!(format!("{:?}", module.function(0)).contains("print"));
        assert_eq!(1, module.export("run")?);
        assert_eq!(
            Err(LinkError::ExportNotFound("walk".into())),
            module.export("walk")
        );
        Ok(())
    }

    #[test]
    fn export_index_is_checked() {
        let mut binary = binary_module(vec![0], 1);
        binary.export_section = Some(ExportSection(vec![Export {
            name: "run",
            desc: ExportDesc::Func(1),
        }]));
        assert_eq!(
            Err(LinkError::FunctionIndexOutOfBounds(1)),
            Module::link(binary)
        );
    }
}
