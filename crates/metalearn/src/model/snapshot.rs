//! Whole-parameter snapshots for Reptile's interpolation and restore.
//!
//! A snapshot is a rank-erased map from `ParamId` to tensor data, the
//! "named, ordered parameter dict" of the live model. Interpolation and
//! restore build a fresh parameter set and load it through burn's module
//! mapping, so there is never a partially-edited live model.

use std::collections::HashMap;

use burn::module::{AutodiffModule, Module, ModuleMapper, ModuleVisitor, ParamId};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;

/// Captured float parameters of one module.
#[derive(Clone, Debug)]
pub struct ParamSnapshot {
    data: HashMap<ParamId, TensorData>,
}

impl ParamSnapshot {
    /// Capture the current parameter values of `module`.
    pub fn capture<B: AutodiffBackend, M: AutodiffModule<B>>(module: &M) -> Self {
        let mut visitor = Capture { data: HashMap::new() };
        module.visit(&mut visitor);
        Self { data: visitor.data }
    }

    /// Load the snapshot back into `module`, bit-identical to capture time.
    pub fn restore<B: AutodiffBackend, M: AutodiffModule<B>>(&self, module: M) -> M {
        let mut mapper = Restore { snapshot: self };
        module.map(&mut mapper)
    }

    /// Reptile outer update: `new = old + (post_inner - old) * lr`, applied
    /// elementwise with the snapshot as `old` and `module` as `post_inner`.
    pub fn interpolate<B: AutodiffBackend, M: AutodiffModule<B>>(&self, module: M, lr: f64) -> M {
        let mut mapper = Interpolate { snapshot: self, lr };
        module.map(&mut mapper)
    }

    fn stored<B: Backend, const D: usize>(&self, id: ParamId, device: &B::Device) -> Tensor<B, D> {
        let data = self
            .data
            .get(&id)
            .expect("parameter missing from snapshot; snapshot and module must match")
            .clone();
        Tensor::from_data(data, device)
    }
}

struct Capture {
    data: HashMap<ParamId, TensorData>,
}

impl<B: Backend> ModuleVisitor<B> for Capture {
    fn visit_float<const D: usize>(&mut self, id: ParamId, tensor: &Tensor<B, D>) {
        self.data.insert(id, tensor.to_data());
    }
}

struct Restore<'a> {
    snapshot: &'a ParamSnapshot,
}

impl<B: Backend> ModuleMapper<B> for Restore<'_> {
    fn map_float<const D: usize>(&mut self, id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let stored = self.snapshot.stored(id, &tensor.device());
        if tensor.is_require_grad() {
            stored.require_grad()
        } else {
            stored
        }
    }
}

struct Interpolate<'a> {
    snapshot: &'a ParamSnapshot,
    lr: f64,
}

impl<B: Backend> ModuleMapper<B> for Interpolate<'_> {
    fn map_float<const D: usize>(&mut self, id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let is_require_grad = tensor.is_require_grad();
        let old: Tensor<B, D> = self.snapshot.stored(id, &tensor.device());
        let updated = (old.clone() + (tensor - old).mul_scalar(self.lr)).detach();
        if is_require_grad {
            updated.require_grad()
        } else {
            updated
        }
    }
}
