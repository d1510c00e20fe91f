//! Permutation algebra.
//!
//! Permutations are stored as [`faer::perm::Perm`], a forward array `perm` and its inverse
//! `perm_inv` such that $(AP)_{:, j} = A_{:, \text{perm}_j}$. Products with $P$ and $P^\top$ are
//! realized as row or column gathers, without ever forming the permutation matrix.

use alloc::boxed::Box;
use faer::{
    perm::{permute_cols, permute_rows, Perm, PermRef},
    ComplexField, MatMut, MatRef,
};

/// Computes $P \times \text{src}$ and stores the result in `dst`.
///
/// Row $i$ of the product is row `perm_inv[i]` of `src`.
#[track_caller]
#[inline]
pub fn mul_p_left<E: ComplexField>(
    dst: MatMut<'_, E>,
    perm: PermRef<'_, usize>,
    src: MatRef<'_, E>,
) {
    permute_rows(dst, src, perm.inverse())
}

/// Computes $P^\top \times \text{src}$ and stores the result in `dst`.
///
/// Row $j$ of the product is row `perm[j]` of `src`.
#[track_caller]
#[inline]
pub fn mul_pt_left<E: ComplexField>(
    dst: MatMut<'_, E>,
    perm: PermRef<'_, usize>,
    src: MatRef<'_, E>,
) {
    permute_rows(dst, src, perm)
}

/// Computes $\text{src} \times P$ and stores the result in `dst`.
#[track_caller]
#[inline]
pub fn mul_p_right<E: ComplexField>(
    dst: MatMut<'_, E>,
    src: MatRef<'_, E>,
    perm: PermRef<'_, usize>,
) {
    permute_cols(dst, src, perm)
}

/// Computes $\text{src} \times P^\top$ and stores the result in `dst`.
#[track_caller]
#[inline]
pub fn mul_pt_right<E: ComplexField>(
    dst: MatMut<'_, E>,
    src: MatRef<'_, E>,
    perm: PermRef<'_, usize>,
) {
    permute_cols(dst, src, perm.inverse())
}

/// Builds the permutation with the given forward array, computing its inverse.
///
/// # Panics
///
/// Panics if `forward` is not a bijection on `0..forward.len()`.
#[track_caller]
pub fn from_forward(forward: Box<[usize]>) -> Perm<usize> {
    let n = forward.len();
    let mut inverse = alloc::vec![usize::MAX; n].into_boxed_slice();
    for (j, &p) in forward.iter().enumerate() {
        equator::assert!(p < n);
        inverse[p] = j;
    }
    Perm::new_checked(forward, inverse, n)
}

/// Returns the identity permutation of dimension `dim`.
pub fn identity(dim: usize) -> Perm<usize> {
    let forward: Box<[usize]> = (0..dim).collect();
    let inverse = forward.clone();
    Perm::new_checked(forward, inverse, dim)
}

/// Returns the parity of the permutation, as `1` for an even and `-1` for an odd permutation.
///
/// Every cycle is walked once, from its smallest element, so no scratch memory is needed.
pub fn sign(perm: PermRef<'_, usize>) -> i32 {
    let perm = perm.arrays().0;
    let mut odd = false;
    for start in 0..perm.len() {
        let mut len = 1usize;
        let mut j = perm[start];
        while j > start {
            j = perm[j];
            len += 1;
        }
        // `start` leads its cycle only if the walk came back to it
        if j == start && len % 2 == 0 {
            odd = !odd;
        }
    }
    if odd {
        -1
    } else {
        1
    }
}
