//! A multi-engine tensor backend for finite element computations.
//!
//! `bifrost` lets finite-element numerical code run unmodified over
//! interchangeable tensor-computation engines. Callers select an engine per
//! thread and use one canonical operation surface — array creation, einsum,
//! sparse products, barycentric shape functions, geometric kernels — either
//! through the free functions in [`dispatch`] or directly through an
//! [`engine::Engine`] reference.
//!
//! ```
//! use bifrost::dispatch as bf;
//!
//! bf::select_engine("nalgebra").unwrap();
//! let bc = bifrost::Tensor::from_data(&[1, 3], vec![0.2, 0.3, 0.5]);
//! let phi = bf::simplex_shape_function(&bc, 2, None).unwrap();
//! let total: f64 = phi.data().iter().sum();
//! assert!((total - 1.0).abs() < 1e-12);
//! ```

use nalgebra::RealField;

pub mod device;
pub mod dispatch;
pub mod einsum;
pub mod engine;
pub mod error;
pub mod fem;
pub mod linalg;
pub mod ops;
pub mod random;
pub mod registry;
pub mod tensor;

pub(crate) mod vmap;

pub mod sparse {
    pub use bifrost_sparse::*;
}

pub use device::{Device, DeviceType};
pub use error::{Error, Result};
pub use registry::{active_engine, register_engine, select_engine, with_engine, ScopedEngine};
pub use tensor::{DTensor, ITensor, Tensor};

pub extern crate nalgebra;

/// The scalar types the generic kernels accept.
///
/// Used as a trait alias for the bounds the numerical kernels need; the
/// engine dispatch surface itself is fixed to `f64`.
pub trait Real: RealField + Copy {}

impl<T> Real for T where T: RealField + Copy {}
