//! Sequenced fallible steps

use std::fmt;

type Step<'a, S, E> = Box<dyn Fn(&mut S) -> Result<(), E> + Send + Sync + 'a>;

/// Steps that must all succeed, in order, for the operation to succeed
///
/// Steps communicate only through the shared state they receive.
pub struct ChainedOperation<'a, S, E> {
    steps: Vec<Step<'a, S, E>>,
}

impl<S, E> fmt::Debug for ChainedOperation<'_, S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainedOperation")
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl<S, E> Default for ChainedOperation<'_, S, E> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<'a, S, E> ChainedOperation<'a, S, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then<F>(mut self, step: F) -> Self
    where
        F: Fn(&mut S) -> Result<(), E> + Send + Sync + 'a,
    {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step; the first failure stops the chain
    pub fn run(&self, state: &mut S) -> Result<(), E> {
        for step in &self.steps {
            step(state)?;
        }
        Ok(())
    }
}
