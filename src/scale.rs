//! Diagonal scaling by the pseudo-eigenvalues of a factorization.
//!
//! The diagonal $D$ is never materialized. Multiplying by it from the left scales rows,
//! from the right scales columns.

use equator::assert;
use faer::{unzipped, zipped_rw, ComplexField, MatMut, MatRef, RealField};

/// Computes $A \leftarrow DA$.
#[track_caller]
pub fn scale_rows<E: ComplexField>(a: MatMut<'_, E>, d: &[E::Real]) {
    assert!(d.len() == a.nrows());
    zipped_rw!(a).for_each_with_index(|i, _, unzipped!(mut x)| {
        x.write(x.read().faer_scale_real(d[i]))
    });
}

/// Computes $A \leftarrow AD$.
#[track_caller]
pub fn scale_cols<E: ComplexField>(a: MatMut<'_, E>, d: &[E::Real]) {
    assert!(d.len() == a.ncols());
    zipped_rw!(a).for_each_with_index(|_, j, unzipped!(mut x)| {
        x.write(x.read().faer_scale_real(d[j]))
    });
}

/// Computes $A \leftarrow D^{-1}A$.
#[track_caller]
pub fn div_rows<E: ComplexField>(a: MatMut<'_, E>, d: &[E::Real]) {
    assert!(d.len() == a.nrows());
    zipped_rw!(a).for_each_with_index(|i, _, unzipped!(mut x)| {
        x.write(x.read().faer_scale_real(d[i].faer_inv()))
    });
}

/// Computes $A \leftarrow AD^{-1}$.
#[track_caller]
pub fn div_cols<E: ComplexField>(a: MatMut<'_, E>, d: &[E::Real]) {
    assert!(d.len() == a.ncols());
    zipped_rw!(a).for_each_with_index(|_, j, unzipped!(mut x)| {
        x.write(x.read().faer_scale_real(d[j].faer_inv()))
    });
}

/// Computes $\text{dst} \leftarrow \text{src} \times D$.
#[track_caller]
pub fn scale_cols_to<E: ComplexField>(dst: MatMut<'_, E>, src: MatRef<'_, E>, d: &[E::Real]) {
    assert!(d.len() == src.ncols());
    zipped_rw!(dst, src).for_each_with_index(|_, j, unzipped!(mut dst, src)| {
        dst.write(src.read().faer_scale_real(d[j]))
    });
}

/// Computes $\text{dst} \leftarrow \text{src} \times D^{-1}$.
#[track_caller]
pub fn div_cols_to<E: ComplexField>(dst: MatMut<'_, E>, src: MatRef<'_, E>, d: &[E::Real]) {
    assert!(d.len() == src.ncols());
    zipped_rw!(dst, src).for_each_with_index(|_, j, unzipped!(mut dst, src)| {
        dst.write(src.read().faer_scale_real(d[j].faer_inv()))
    });
}

/// Computes $\text{dst} \leftarrow \text{dst} + \text{src} \times D$.
#[track_caller]
pub fn add_scaled_cols<E: ComplexField>(dst: MatMut<'_, E>, src: MatRef<'_, E>, d: &[E::Real]) {
    assert!(d.len() == src.ncols());
    zipped_rw!(dst, src).for_each_with_index(|_, j, unzipped!(mut dst, src)| {
        dst.write(dst.read().faer_add(src.read().faer_scale_real(d[j])))
    });
}

/// Splits `d` into `dmin = min(d, 1)` and `dmax = max(d, 1)`, so that `d = dmin * dmax`
/// elementwise, with every entry of `dmin` at most one and every entry of `dmax` at least one.
#[track_caller]
pub fn split<R: RealField>(dmin: &mut [R], dmax: &mut [R], d: &[R]) {
    assert!(all(dmin.len() == d.len(), dmax.len() == d.len()));
    let one = R::faer_one();
    for ((lo, hi), &x) in dmin.iter_mut().zip(dmax.iter_mut()).zip(d) {
        if x < one {
            *lo = x;
            *hi = one;
        } else {
            *lo = one;
            *hi = x;
        }
    }
}
