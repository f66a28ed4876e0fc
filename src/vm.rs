mod exec;
pub mod memory;
pub mod stack;
pub mod value;

use crate::binary;
use crate::error::{Error, LinkError, Trap};
use crate::host::HostRegistry;
use crate::validation::{self, Function};

use memory::Memory;
use stack::Stack;
pub use value::Value;

/// Capacities fixed at instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    pub value_stack_capacity: usize,
    /// Maximum call depth.
    pub call_stack_capacity: usize,
    /// Total local slots (parameters included) across all live frames.
    pub locals_capacity: usize,
    pub max_memory_pages: u32,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            value_stack_capacity: 1024,
            call_stack_capacity: 256,
            locals_capacity: 16384,
            max_memory_pages: 65536,
        }
    }
}

/// Selects the function [`VirtualMachine::call`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee<'n> {
    Export(&'n str),
    Index(u32),
}

impl<'n> From<&'n str> for Callee<'n> {
    fn from(name: &'n str) -> Self {
        Self::Export(name)
    }
}

impl From<u32> for Callee<'_> {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

/// One active function activation.
#[derive(Debug)]
struct CallFrame<'a> {
    func: u32,
    code: &'a [u8],
    ip: usize,
    locals_start: usize,
    locals_len: usize,
    /// Operand stack height when the frame was entered.
    stack_base: usize,
}

/// A single module instance: operand stack, call frames, linear memory and
/// the host functions its imports resolve against.
///
/// Once any call traps the instance is dead; every later call fails with
/// [`Error::Trapped`].
pub struct VirtualMachine<'a> {
    module: validation::Module<'a>,
    config: VmConfig,
    stack: Stack<Value>,
    frames: Stack<CallFrame<'a>>,
    locals: Stack<Value>,
    memory: Memory,
    registry: HostRegistry,
    trapped: bool,
}

impl std::fmt::Debug for VirtualMachine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualMachine")
            .field("config", &self.config)
            .field("stack", &self.stack.as_slice())
            .field("frames", &self.frames.len())
            .field("memory_pages", &self.memory.pages())
            .field("trapped", &self.trapped)
            .finish_non_exhaustive()
    }
}

impl<'a> VirtualMachine<'a> {
    pub fn instantiate(bytes: &'a [u8]) -> Result<Self, Error> {
        Self::instantiate_with(bytes, VmConfig::default(), HostRegistry::default())
    }

    pub fn instantiate_with(
        bytes: &'a [u8],
        config: VmConfig,
        registry: HostRegistry,
    ) -> Result<Self, Error> {
        let module = validation::Module::link(binary::Module::decode(bytes)?)?;
        let mut memory = Memory::new(module.memory, config.max_memory_pages)?;
        memory.initialize(&module.data)?;
        log::debug!(
            "instantiated module with {} functions and {} pages of memory",
            module.imports.len() + module.funcs.len(),
            memory.pages()
        );
        Ok(Self {
            module,
            config,
            stack: Stack::with_capacity(config.value_stack_capacity),
            frames: Stack::with_capacity(config.call_stack_capacity),
            locals: Stack::with_capacity(config.locals_capacity),
            memory,
            registry,
            trapped: false,
        })
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn module(&self) -> &validation::Module<'a> {
        &self.module
    }

    pub fn is_trapped(&self) -> bool {
        self.trapped
    }

    pub fn registry(&self) -> &HostRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut HostRegistry {
        &mut self.registry
    }

    pub fn memory(&self) -> &[u8] {
        self.memory.as_slice()
    }

    pub fn memory_mut(&mut self) -> &mut [u8] {
        self.memory.as_mut_slice()
    }

    /// Pushes onto the operand stack. Meant for host functions returning
    /// results.
    pub fn push(&mut self, value: impl Into<Value>) -> Result<(), Trap> {
        self.stack.push(value.into())
    }

    /// Pops from the operand stack. Meant for host functions taking their
    /// arguments. Operands belonging to frames below the caller stay out of
    /// reach.
    pub fn pop(&mut self) -> Result<Value, Trap> {
        self.pop_operand()
    }

    /// Lowest operand stack height the running frame may pop down to.
    fn stack_floor(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.stack_base)
    }

    fn pop_operand(&mut self) -> Result<Value, Trap> {
        if self.stack.len() <= self.stack_floor() {
            return Err(Trap::StackUnderflow);
        }
        self.stack.pop()
    }

    /// Runs one function to completion and returns its results in
    /// declaration order.
    pub fn call<'n>(
        &mut self,
        callee: impl Into<Callee<'n>>,
        args: &[Value],
    ) -> Result<Vec<Value>, Error> {
        if self.trapped {
            return Err(Error::Trapped);
        }
        let index = match callee.into() {
            Callee::Export(name) => self.module.export(name)?,
            Callee::Index(index) => index,
        };
        let ty = self
            .module
            .func_type(index)
            .ok_or(LinkError::FunctionIndexOutOfBounds(index))?;
        if args.len() != ty.inputs.len() {
            return Err(Error::ArgumentCount {
                expected: ty.inputs.len(),
                actual: args.len(),
            });
        }
        let arity = ty.outputs.len();

        let result = self.invoke(index, args, arity);
        if let Err(trap) = &result {
            log::debug!("function {index} trapped: {trap}");
            self.trapped = true;
        }
        Ok(result?)
    }

    fn invoke(&mut self, index: u32, args: &[Value], arity: usize) -> Result<Vec<Value>, Trap> {
        let base = self.stack.len();
        for arg in args {
            self.stack.push(arg.clone())?;
        }
        // host functions may call back in, so only run frames pushed here
        let depth = self.frames.len();
        self.call_function(index)?;
        self.run(depth)?;

        let results: Vec<Value> = self.stack.pop_n(arity)?.collect();
        let outputs = self
            .module
            .func_type(index)
            .map(|ty| ty.outputs.as_slice())
            .unwrap_or_default();
        if results.iter().map(Value::ty).ne(outputs.iter().copied()) {
            return Err(Trap::BadType);
        }
        self.stack.truncate(base);
        Ok(results)
    }

    /// Calls function `index` with its arguments on top of the operand
    /// stack. Host functions run to completion immediately; defined
    /// functions get a new frame that the dispatch loop picks up.
    fn call_function(&mut self, index: u32) -> Result<(), Trap> {
        match self.module.function(index).ok_or(Trap::FunctionNotFound)? {
            Function::Imported(import) => {
                let (module, name) = (import.module, import.name);
                let func = self.registry.resolve(module, name)?;
                log::trace!("calling host function {module}.{name}");
                match func(self) {
                    0 => Ok(()),
                    status => {
                        log::trace!("host function {module}.{name} failed with {status}");
                        Err(Trap::HostFailure(status))
                    }
                }
            }
            Function::Defined(func) => {
                let ty = self
                    .module
                    .types
                    .get(func.ty as usize)
                    .ok_or(Trap::FunctionNotFound)?;
                let slots = ty.inputs.len() + func.locals.len();
                if self.frames.headroom() == 0 || self.locals.headroom() < slots {
                    return Err(Trap::StackOverflow);
                }

                if self.stack.len().saturating_sub(self.stack_floor()) < ty.inputs.len() {
                    return Err(Trap::StackUnderflow);
                }
                let locals_start = self.locals.len();
                for (arg, ty) in self.stack.pop_n(ty.inputs.len())?.zip(&ty.inputs) {
                    if arg.ty() != *ty {
                        return Err(Trap::BadType);
                    }
                    self.locals.push(arg)?;
                }
                for ty in &func.locals {
                    self.locals.push(Value::default_for(*ty))?;
                }
                self.frames.push(CallFrame {
                    func: index,
                    code: func.code,
                    ip: 0,
                    locals_start,
                    locals_len: slots,
                    stack_base: self.stack.len(),
                })
            }
        }
    }

    /// Pops the current frame, leaving exactly its results above the
    /// caller's operands.
    fn return_from_frame(&mut self) -> Result<(), Trap> {
        let frame = self.frames.pop()?;
        let outputs = self
            .module
            .func_type(frame.func)
            .map(|ty| ty.outputs.as_slice())
            .unwrap_or_default();
        self.stack.unwind(frame.stack_base, outputs.len())?;
        let results = &self.stack.as_slice()[frame.stack_base..];
        if results.iter().map(Value::ty).ne(outputs.iter().copied()) {
            return Err(Trap::BadType);
        }
        self.locals.truncate(frame.locals_start);
        Ok(())
    }
}
