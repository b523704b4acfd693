use std::cell::RefCell;

use crate::backend::Backend;
use crate::bail;
use crate::error::{Error, Result};
use crate::tensor::Tensor;

// Engine — Kernel dispatch and gradient-tape recording
//
// The Engine is the single entry point through which every differentiable
// operation executes. Given a compute thunk, a set of named input tensors,
// and an optional gradient rule, run_kernel():
//
//   1. Executes the thunk against the engine's device (a blocking call —
//      backends may parallelize internally, but that is opaque here).
//   2. If a tape is active, appends exactly one KernelRecord capturing the
//      inputs, any values the thunk chose to save, the scalar parameters,
//      the output, and the gradient rule.
//   3. Returns the output tensor.
//
// When no tape is active, step 2 is skipped entirely — forward-only
// inference pays no recording cost, and saved values are discarded at the
// save hook instead of being retained.
//
// WHY AN EXPLICIT HANDLE AND NOT A GLOBAL?
//
// The engine is constructed explicitly and passed to each operation. This
// keeps the core free of hidden process-wide state: tests construct an
// engine over a mock backend, and two concurrent differentiation sessions
// are simply two engines with independent tapes. The tape itself sits in a
// RefCell — the execution model is single-threaded and synchronous, with a
// single writer per tape.
//
// GRADIENT RULES:
//
// A gradient rule is a plain function, not a capturing closure. Everything
// it needs — the recorded inputs, the saved forward values, the scalar
// parameters — arrives in an explicit GradContext when the backward pass
// reaches its record. The rule returns a map from input name to a *lazy*
// thunk producing that input's gradient contribution. The engine never
// invokes a thunk during the forward pass; the backward walker invokes
// each thunk at replay time.

/// Named input tensors for a kernel invocation.
///
/// Every name the operation's gradient rule references must be present.
pub struct Inputs<B: Backend>(Vec<(&'static str, Tensor<B>)>);

impl<B: Backend> Inputs<B> {
    /// No inputs (constant producers).
    pub fn none() -> Self {
        Inputs(Vec::new())
    }

    /// The common single-input case: one tensor named "x".
    pub fn one(name: &'static str, tensor: Tensor<B>) -> Self {
        Inputs(vec![(name, tensor)])
    }

    /// Add a named input (builder style).
    pub fn with(mut self, name: &'static str, tensor: Tensor<B>) -> Self {
        self.0.push((name, tensor));
        self
    }

    fn into_vec(self) -> Vec<(&'static str, Tensor<B>)> {
        self.0
    }
}

/// The save hook handed to compute thunks.
///
/// `keep()` registers a forward intermediate for reuse during the backward
/// pass and returns it unchanged, so it composes fluently:
///
/// ```ignore
/// |dev, save| Ok(save.keep(forward_output))
/// ```
///
/// When no tape is active nothing is retained — saving is free in
/// forward-only mode.
pub struct SaveCtx<B: Backend> {
    active: bool,
    saved: Vec<Tensor<B>>,
}

impl<B: Backend> SaveCtx<B> {
    fn new(active: bool) -> Self {
        SaveCtx {
            active,
            saved: Vec::new(),
        }
    }

    /// Register `tensor` for backward use and hand it back unchanged.
    pub fn keep(&mut self, tensor: Tensor<B>) -> Tensor<B> {
        if self.active {
            self.saved.push(tensor.clone());
        }
        tensor
    }

    fn into_saved(self) -> Vec<Tensor<B>> {
        self.saved
    }
}

// Gradient-rule protocol

/// The explicit captured context a gradient rule evaluates against: the
/// gradient flowing into the operation's output, plus everything the tape
/// record retained from the forward pass.
pub struct GradContext<'a, B: Backend> {
    op: &'static str,
    /// Gradient of the differentiation root with respect to this
    /// operation's output.
    pub dy: &'a Tensor<B>,
    inputs: &'a [(&'static str, Tensor<B>)],
    saved: &'a [Tensor<B>],
    /// Scalar attributes recorded at dispatch time (clip bounds, slopes).
    pub params: &'a [f64],
}

impl<'a, B: Backend> GradContext<'a, B> {
    /// Look up a recorded input by name.
    pub fn input(&self, name: &'static str) -> Result<&'a Tensor<B>> {
        self.inputs
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| t)
            .ok_or_else(|| {
                Error::msg(format!(
                    "gradient rule for {} references unknown input '{}'",
                    self.op, name
                ))
            })
    }

    /// Look up a recorded input and cast it to the output gradient's dtype.
    ///
    /// Mirrors the forward promotion policy: when an integer input was
    /// promoted to floating point by the kernel, its gradient math must
    /// happen in the promoted dtype as well.
    pub fn input_cast(&self, name: &'static str) -> Result<Tensor<B>> {
        let t = self.input(name)?;
        if t.dtype() == self.dy.dtype() {
            Ok(t.clone())
        } else {
            t.to_dtype(self.dy.dtype())
        }
    }

    /// The i-th value saved by the forward compute thunk.
    pub fn saved_value(&self, i: usize) -> Result<&'a Tensor<B>> {
        self.saved.get(i).ok_or_else(|| {
            Error::msg(format!(
                "gradient rule for {} expected saved value #{} but the forward pass saved {}",
                self.op,
                i,
                self.saved.len()
            ))
        })
    }
}

/// A lazy gradient thunk: evaluated at most once, during backward replay.
pub type GradThunk<'a, B> = Box<dyn FnOnce() -> Result<Tensor<B>> + 'a>;

/// Map from input name to the lazy thunk producing that input's gradient
/// contribution. Thunks borrow the GradContext they were built from.
pub struct InputGrads<'a, B: Backend> {
    thunks: Vec<(&'static str, GradThunk<'a, B>)>,
}

impl<'a, B: Backend> InputGrads<'a, B> {
    pub fn new() -> Self {
        InputGrads { thunks: Vec::new() }
    }

    /// Add a thunk for the named input (builder style).
    pub fn with(
        mut self,
        name: &'static str,
        thunk: impl FnOnce() -> Result<Tensor<B>> + 'a,
    ) -> Self {
        self.thunks.push((name, Box::new(thunk)));
        self
    }

    pub fn into_thunks(self) -> Vec<(&'static str, GradThunk<'a, B>)> {
        self.thunks
    }
}

impl<B: Backend> Default for InputGrads<'_, B> {
    fn default() -> Self {
        Self::new()
    }
}

/// A gradient rule: plain function from context to per-input thunks.
///
/// Rules carry no captured state — the tape record owns the inputs, saved
/// values, and parameters, and hands them over via GradContext.
pub type GradRule<B> = for<'a> fn(&'a GradContext<'a, B>) -> InputGrads<'a, B>;

// Tape — The chronological log of kernel invocations

/// One executed kernel invocation: the operation name, the tensors it
/// consumed, the values it saved for backward use, its scalar parameters,
/// its output, and its gradient rule.
///
/// Records are created only under an active tape, only after the compute
/// thunk succeeds (a failed thunk leaves no partial record), and are
/// dropped when the tape is discarded or the backward pass consuming them
/// completes.
pub struct KernelRecord<B: Backend> {
    op: &'static str,
    inputs: Vec<(&'static str, Tensor<B>)>,
    saved: Vec<Tensor<B>>,
    params: Vec<f64>,
    output: Tensor<B>,
    rule: Option<GradRule<B>>,
}

impl<B: Backend> KernelRecord<B> {
    /// The operation's stable public name.
    pub fn op(&self) -> &'static str {
        self.op
    }

    /// The named inputs this invocation consumed.
    pub fn inputs(&self) -> &[(&'static str, Tensor<B>)] {
        &self.inputs
    }

    /// Look up one input by name.
    pub fn input(&self, name: &str) -> Option<&Tensor<B>> {
        self.inputs
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| t)
    }

    /// The forward values saved for backward use.
    pub fn saved(&self) -> &[Tensor<B>] {
        &self.saved
    }

    /// Scalar attributes recorded at dispatch time.
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// The invocation's output tensor.
    pub fn output(&self) -> &Tensor<B> {
        &self.output
    }

    /// The recorded gradient rule, if the operation is differentiable.
    pub fn rule(&self) -> Option<GradRule<B>> {
        self.rule
    }

    /// Build the context a gradient rule evaluates against.
    pub fn grad_context<'a>(&'a self, dy: &'a Tensor<B>) -> GradContext<'a, B> {
        GradContext {
            op: self.op,
            dy,
            inputs: &self.inputs,
            saved: &self.saved,
            params: &self.params,
        }
    }
}

/// Ordered log of executed kernel invocations, replayed in reverse
/// chronological order by the backward pass.
pub struct Tape<B: Backend> {
    records: Vec<KernelRecord<B>>,
}

impl<B: Backend> Tape<B> {
    fn new() -> Self {
        Tape {
            records: Vec::new(),
        }
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[KernelRecord<B>] {
        &self.records
    }

    /// Records newest first — the order the backward pass consumes them.
    pub fn iter_rev(&self) -> impl Iterator<Item = &KernelRecord<B>> {
        self.records.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// Engine

/// The kernel-dispatch engine: owns the device and the (optional) active
/// gradient tape.
///
/// Single-threaded by design: operations execute to completion on the
/// calling thread and the tape has a single writer. Concurrent
/// differentiation sessions use independent engines.
pub struct Engine<B: Backend> {
    device: B::Device,
    tape: RefCell<Option<Tape<B>>>,
}

impl<B: Backend> Engine<B> {
    /// Create an engine for the given device. No tape is active.
    pub fn new(device: B::Device) -> Self {
        Engine {
            device,
            tape: RefCell::new(None),
        }
    }

    /// The device this engine dispatches to.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Whether a gradient tape is currently recording.
    pub fn is_recording(&self) -> bool {
        self.tape.borrow().is_some()
    }

    /// Open a fresh tape. Subsequent run_kernel calls append records until
    /// the tape is consumed by backward() or discarded by stop_recording().
    pub fn start_recording(&self) -> Result<()> {
        let mut tape = self.tape.borrow_mut();
        if tape.is_some() {
            bail!("a gradient tape is already active on this engine");
        }
        *tape = Some(Tape::new());
        Ok(())
    }

    /// Detach the active tape without running backward, returning it for
    /// inspection (or disposal). Returns None when no tape was active.
    pub fn stop_recording(&self) -> Option<Tape<B>> {
        self.tape.borrow_mut().take()
    }

    /// Execute one kernel invocation.
    ///
    /// - `op` is the operation's stable public name.
    /// - `inputs` are the named tensors the gradient rule may reference.
    /// - `params` are scalar attributes (clip bounds, slopes) recorded
    ///   alongside the inputs.
    /// - `rule` is the operation's gradient rule; None stops gradient flow
    ///   at this record.
    /// - `compute` runs the forward kernel against the engine's device and
    ///   may save intermediates through the SaveCtx hook.
    ///
    /// If `compute` fails, the error propagates unchanged and no record —
    /// not even a partial one — is appended to the tape.
    pub fn run_kernel<F>(
        &self,
        op: &'static str,
        inputs: Inputs<B>,
        params: &[f64],
        rule: Option<GradRule<B>>,
        compute: F,
    ) -> Result<Tensor<B>>
    where
        F: FnOnce(&B::Device, &mut SaveCtx<B>) -> Result<Tensor<B>>,
    {
        let recording = self.is_recording();
        let mut save = SaveCtx::new(recording);
        let output = compute(&self.device, &mut save)?;
        if recording {
            if let Some(tape) = self.tape.borrow_mut().as_mut() {
                tape.records.push(KernelRecord {
                    op,
                    inputs: inputs.into_vec(),
                    saved: save.into_saved(),
                    params: params.to_vec(),
                    output: output.clone(),
                    rule,
                });
            }
        }
        Ok(output)
    }

    /// Consume the active tape and compute gradients of `root` with
    /// respect to every tensor the tape recorded.
    ///
    /// The tape is detached before replay: operations invoked from inside
    /// gradient rules are not re-recorded. Record storage is released as
    /// the tape drops — whether the replay completes or errors out midway,
    /// tensors held by not-yet-visited records stay valid until then.
    pub fn backward(&self, root: &Tensor<B>) -> Result<crate::backprop::GradStore<B>> {
        let tape = self.tape.borrow_mut().take().ok_or_else(|| {
            Error::msg("backward() requires an active tape; call start_recording() first")
        })?;
        crate::backprop::run_backward(tape, root)
    }
}
