use std::collections::HashMap;

use crate::backend::Backend;
use crate::engine::Tape;
use crate::error::Result;
use crate::tensor::{Tensor, TensorId};

// Backpropagation — Reverse-mode automatic differentiation
//
// The forward pass (Engine::run_kernel under an active tape) leaves behind
// a chronological log of kernel invocations. This module replays that log
// backwards, applying the chain rule:
//
//   1. Seed: grad(root) = 1 (dL/dL = 1, elementwise ones for the root).
//   2. Walk records newest-first. A record whose output has received no
//      gradient is skipped — nothing downstream of it reached the root.
//   3. For each reached record, build the GradContext (upstream gradient +
//      recorded inputs, saved values, and scalar parameters) and hand it to
//      the record's gradient rule. The rule returns one lazy thunk per
//      named input; each thunk is evaluated here — never earlier — and its
//      result accumulated into that input's gradient.
//
// ACCUMULATION: If a tensor feeds multiple recorded operations, its
// gradient is the SUM of the contributions from each use (multivariate
// chain rule). Accumulation is strict: contributions must agree in shape
// and dtype, which they always do for the elementwise catalogue.
//
// Records without a gradient rule stop the flow: no gradient propagates
// past them. The non-differentiable catalogue entries (ceil, floor, round,
// sign, step) do NOT take that path — they register a rule producing an
// exact zero tensor, so "no local contribution" is an answer, not an error.

/// Stores gradients for all tensors touched by a backward pass.
///
/// After calling `engine.backward(&root)`, use `grads.get(&tensor)` to
/// retrieve the gradient of the root with respect to any recorded tensor.
pub struct GradStore<B: Backend> {
    grads: HashMap<TensorId, Tensor<B>>,
}

impl<B: Backend> Default for GradStore<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> GradStore<B> {
    /// Create a new empty GradStore.
    pub fn new() -> Self {
        GradStore {
            grads: HashMap::new(),
        }
    }

    /// Get the gradient of a tensor (if one was computed).
    pub fn get(&self, tensor: &Tensor<B>) -> Option<&Tensor<B>> {
        self.grads.get(&tensor.id())
    }

    /// Get a gradient by tensor id.
    pub fn get_by_id(&self, id: TensorId) -> Option<&Tensor<B>> {
        self.grads.get(&id)
    }

    /// Number of tensors with a gradient.
    pub fn len(&self) -> usize {
        self.grads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }

    /// Accumulate a gradient contribution for a tensor.
    ///
    /// If a gradient already exists for this tensor, the new contribution
    /// is added to it (strict elementwise add). This handles tensors used
    /// by multiple operations.
    pub fn accumulate(&mut self, id: TensorId, grad: Tensor<B>) -> Result<()> {
        if let Some(existing) = self.grads.get(&id) {
            let summed = existing.add(&grad)?;
            self.grads.insert(id, summed);
        } else {
            self.grads.insert(id, grad);
        }
        Ok(())
    }
}

/// Replay a detached tape in reverse, computing gradients of `root` with
/// respect to every tensor the tape recorded.
///
/// Consumes the tape: records (and the tensors they hold) are released
/// when this function returns, whether it completes or errors out midway.
/// Tensors the caller still references stay valid either way.
pub fn run_backward<B: Backend>(tape: Tape<B>, root: &Tensor<B>) -> Result<GradStore<B>> {
    let mut grads = GradStore::new();
    grads.grads.insert(root.id(), Tensor::ones_like(root)?);

    for record in tape.iter_rev() {
        let dy = match grads.get_by_id(record.output().id()) {
            Some(g) => g.clone(),
            None => continue, // not on any path to the root
        };
        let Some(rule) = record.rule() else {
            continue; // gradient flow stops here
        };
        let ctx = record.grad_context(&dy);
        for (name, thunk) in rule(&ctx).into_thunks() {
            let input = record.input(name).ok_or_else(|| {
                crate::Error::msg(format!(
                    "gradient rule for {} produced a thunk for unknown input '{}'",
                    record.op(),
                    name
                ))
            })?;
            let contribution = thunk()?;
            grads.accumulate(input.id(), contribution)?;
        }
    }

    Ok(grads)
}
