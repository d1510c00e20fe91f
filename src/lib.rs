//! `faer-ldr` provides LDR factorizations of square matrices, a representation that keeps the
//! magnitude of a matrix in a separate positive diagonal so that products and inverses of
//! matrices spanning many orders of magnitude can be computed without catastrophic loss of
//! precision.
//!
//! A factorization $AP = LDR$ is stored in an [`Ldr`], which supports:
//! - left and right products with dense matrices and with other factorizations,
//! - determinants, their magnitudes and magnitude ratios, computed in the log domain,
//! - the direct inverse, as well as the stabilized inverses $(I + A)^{-1}$, $(U + V)^{-1}$ and
//!   $(U^{-1} + V)^{-1}$.
//!
//! The dense kernels are provided by [`faer`].
//!
//! # Example
//!
//! ```
//! use faer::Mat;
//! use faer_ldr::Ldr;
//!
//! // a chain of matrices whose product is far too ill-conditioned for a dense representation
//! let n = 4;
//! let b = Mat::<f64>::from_fn(n, n, |i, j| if i == j { 10.0f64.powi(i as i32 * 4 - 6) } else { 0.0 });
//!
//! let mut f = Ldr::<f64>::identity(n);
//! for _ in 0..10 {
//!     f.right_mul_mat(b.as_ref()).unwrap();
//! }
//!
//! // (I + B^10)^-1
//! let mut inv = Mat::<f64>::zeros(n, n);
//! f.inverse_of_i_plus_into(inv.as_mut(), None).unwrap();
//!
//! assert!((inv.read(0, 0) - 1.0).abs() < 1e-12);
//! assert!((inv.read(3, 3) - 1e-60).abs() < 1e-72);
//! ```

#![allow(clippy::too_many_arguments)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

extern crate alloc;

/// Returns `true` the first time it is evaluated at a given call site, so that each layout
/// warning is only logged once.
#[cfg(feature = "perf-warn")]
macro_rules! perf_warn_once {
    ($name: ident) => {{
        #[inline(always)]
        #[allow(non_snake_case)]
        fn $name() -> &'static ::core::sync::atomic::AtomicBool {
            static $name: ::core::sync::atomic::AtomicBool =
                ::core::sync::atomic::AtomicBool::new(false);
            &$name
        }
        ::core::matches!(
            $name().compare_exchange(
                false,
                true,
                ::core::sync::atomic::Ordering::Relaxed,
                ::core::sync::atomic::Ordering::Relaxed,
            ),
            Ok(_)
        )
    }};
}

/// Logs a warning if `mat` is not column-major.
#[cfg(feature = "perf-warn")]
macro_rules! warn_layout {
    ($mat: expr, $name: ident, $op: literal) => {{
        let mat = &$mat;
        if mat.row_stride().unsigned_abs() != 1 && perf_warn_once!($name) {
            if mat.col_stride().unsigned_abs() == 1 {
                log::warn!(target: "faer_ldr", concat!($op, " prefers column-major matrix. Found row-major matrix."));
            } else {
                log::warn!(target: "faer_ldr", concat!($op, " prefers column-major matrix. Found matrix with generic strides."));
            }
        }
    }};
}

mod error;
pub mod ldr;
pub mod perm;
pub mod scale;

#[cfg(test)]
mod test_utils;

pub use error::{LdrError, Result};
pub use ldr::{
    abs_det_ratio, inverse_of_inv_u_plus_v, inverse_of_u_plus_v, log_abs_det_ratio,
    InverseScratch, Ldr, LdrParams,
};
