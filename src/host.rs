use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{LinkError, Trap};
use crate::vm::VirtualMachine;

/// A function provided by the embedder. It takes its arguments from and
/// pushes its results onto the VM's operand stack, and returns 0 on success.
/// Any other status traps.
pub type HostFunc = Arc<dyn Fn(&mut VirtualMachine<'_>) -> i32 + Send + Sync>;

/// Host functions keyed by module name, then function name.
///
/// A module namespace must be declared before functions can be registered
/// in it.
#[derive(Default, Clone)]
pub struct HostRegistry {
    modules: HashMap<String, HashMap<String, HostFunc>>,
}

impl std::fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.modules
                    .iter()
                    .map(|(module, funcs)| (module, funcs.keys().collect::<Vec<_>>())),
            )
            .finish()
    }
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an empty module namespace. Declaring an existing one keeps
    /// its functions.
    pub fn declare_module(&mut self, module: impl Into<String>) -> &mut Self {
        self.modules.entry(module.into()).or_default();
        self
    }

    pub fn register<F>(
        &mut self,
        module: &str,
        name: impl Into<String>,
        func: F,
    ) -> Result<&mut Self, LinkError>
    where
        F: Fn(&mut VirtualMachine<'_>) -> i32 + Send + Sync + 'static,
    {
        let funcs = self
            .modules
            .get_mut(module)
            .ok_or_else(|| LinkError::ModuleNotFound(module.to_owned()))?;
        let name = name.into();
        log::trace!("registering host function {module}.{name}");
        funcs.insert(name, Arc::new(func));
        Ok(self)
    }

    pub fn resolve(&self, module: &str, name: &str) -> Result<HostFunc, Trap> {
        self.modules
            .get(module)
            .ok_or(Trap::ModuleNotFound)?
            .get(name)
            .cloned()
            .ok_or(Trap::FunctionNotFound)
    }

    pub fn contains_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }
}
