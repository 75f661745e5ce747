//! IR module
//!
//! The top-level unit: a named collection of functions.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

use crate::error::IrError;
use crate::function::Function;
use crate::instruction::FunctionId;

/// A named unit owning an ordered sequence of functions.
#[derive(Debug, Default)]
pub struct Module {
    pub name: String,
    functions: Vec<Function>,
    next_id: FunctionId,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), functions: Vec::new(), next_id: 0 }
    }

    pub fn create_function(&mut self, name: impl Into<String>, return_ty: crate::types::IrType) -> FunctionId {
        let id = self.next_id;
        self.next_id += 1;
        self.functions.push(Function::new(id, name, return_ty));
        id
    }

    pub fn get_function(&self, id: FunctionId) -> Result<&Function, IrError> {
        self.functions.iter().find(|f| f.id == id).ok_or(IrError::UnknownFunction(id))
    }

    pub fn get_function_mut(&mut self, id: FunctionId) -> Result<&mut Function, IrError> {
        self.functions.iter_mut().find(|f| f.id == id).ok_or(IrError::UnknownFunction(id))
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    pub fn function_ids(&self) -> Vec<FunctionId> {
        self.functions.iter().map(|f| f.id).collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IrType;

    #[test]
    fn create_and_lookup_function() {
        let mut m = Module::new("m");
        let f = m.create_function("main", IrType::Void);
        assert!(m.get_function(f).is_ok());
        assert_eq!(m.len(), 1);
    }
}
