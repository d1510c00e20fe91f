use crate::Ldr;
use equator::assert;
use faer::{
    complex_native::c64,
    linalg::{matmul::matmul, solvers::SolverCore},
    ComplexField, Mat, MatRef, Parallelism,
};
use rand::prelude::*;

pub trait RandomEntity: ComplexField<Real = f64> {
    fn random(rng: &mut StdRng) -> Self;
}

impl RandomEntity for f64 {
    fn random(rng: &mut StdRng) -> Self {
        rng.gen::<f64>() * 2.0 - 1.0
    }
}

impl RandomEntity for c64 {
    fn random(rng: &mut StdRng) -> Self {
        c64::new(rng.gen::<f64>() * 2.0 - 1.0, rng.gen::<f64>() * 2.0 - 1.0)
    }
}

pub fn random_mat<E: RandomEntity>(rng: &mut StdRng, n: usize) -> Mat<E> {
    Mat::from_fn(n, n, |_, _| E::random(rng))
}

pub fn random_unitary<E: RandomEntity>(rng: &mut StdRng, n: usize) -> Mat<E> {
    random_mat::<E>(rng, n).qr().compute_q()
}

/// Returns $Q \operatorname{diag}(s) W$ for random unitary $Q$ and $W$.
pub fn random_with_singular_values<E: RandomEntity>(rng: &mut StdRng, s: &[f64]) -> Mat<E> {
    let n = s.len();
    let q = random_unitary::<E>(rng, n);
    let w = random_unitary::<E>(rng, n);
    let mut qs = q.clone();
    crate::scale::scale_cols(qs.as_mut(), s);
    mul(qs.as_ref(), w.as_ref())
}

pub fn mul<E: ComplexField>(a: MatRef<'_, E>, b: MatRef<'_, E>) -> Mat<E> {
    let mut c = Mat::zeros(a.nrows(), b.ncols());
    matmul(c.as_mut(), a, b, None, E::faer_one(), Parallelism::None);
    c
}

pub fn max_diff<E: ComplexField<Real = f64>>(a: MatRef<'_, E>, b: MatRef<'_, E>) -> f64 {
    assert!(all(a.nrows() == b.nrows(), a.ncols() == b.ncols()));
    let mut err = 0.0f64;
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            err = err.max(a.read(i, j).faer_sub(b.read(i, j)).faer_abs());
        }
    }
    err
}

/// Relative error in the max norm.
pub fn rel_diff<E: ComplexField<Real = f64>>(a: MatRef<'_, E>, b: MatRef<'_, E>) -> f64 {
    let zero = Mat::<E>::zeros(b.nrows(), b.ncols());
    max_diff(a, b) / max_diff(b, zero.as_ref())
}

pub fn orthonormality_error<E: ComplexField<Real = f64>>(l: MatRef<'_, E>) -> f64 {
    let n = l.ncols();
    let mut lhl = Mat::<E>::zeros(n, n);
    matmul(
        lhl.as_mut(),
        l.adjoint(),
        l,
        None,
        E::faer_one(),
        Parallelism::None,
    );
    max_diff(lhl.as_ref(), Mat::<E>::identity(n, n).as_ref())
}

/// Reference inverse, from a partial pivoting LU decomposition.
pub fn dense_inverse<E: ComplexField<Real = f64>>(a: MatRef<'_, E>) -> Mat<E> {
    a.partial_piv_lu().inverse()
}

/// Checks the structural invariants of a factorization.
#[track_caller]
pub fn assert_valid<E: ComplexField<Real = f64>>(f: &Ldr<E>) {
    let n = f.dim();
    assert!(orthonormality_error(f.l()) < 1e-12 * (n.max(1) as f64));
    for &x in f.d() {
        assert!(all(x > 0.0, x.is_finite()));
    }
    let r = f.r();
    for j in 0..n {
        assert!((r.read(j, j).faer_abs() - 1.0).abs() < 1e-12);
        for i in j + 1..n {
            assert!(r.read(i, j).faer_abs() == 0.0);
        }
    }
    for (j, &p) in f.perm().iter().enumerate() {
        assert!(f.perm_inv()[p] == j);
    }
}
