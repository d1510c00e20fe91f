//! Inverses of factorized matrices and of their sums.
//!
//! Sums such as $I + A$ can't be formed directly when $A$ spans many orders of magnitude. Each
//! operand is split as $D = D_{\min} D_{\max}$ with $D_{\min} = \min(D, 1)$ and
//! $D_{\max} = \max(D, 1)$, and the sum is rewritten so that only products with entries of
//! order one are ever added together:
//! $$X^{-1} = P_v R_v^{-1} D_{v,\max}^{-1} M^{-1} W,$$
//! where $M$ is a well scaled sum and $W$ an outer factor specific to each operation.

use super::{fill_identity, Ldr};
use crate::{error::LdrError, perm, scale, Result};
use faer::{
    linalg::{matmul::matmul, triangular_solve::solve_upper_triangular_in_place},
    ComplexField, MatMut,
};
use reborrow::*;

/// Temporary factorizations and scale splits used by the stabilized inverses.
///
/// Can be reused across calls with operands of the same dimension to avoid allocations.
pub struct InverseScratch<E: ComplexField> {
    m: Ldr<E>,
    g: Ldr<E>,
    umin: Vec<E::Real>,
    umax: Vec<E::Real>,
    vmin: Vec<E::Real>,
    vmax: Vec<E::Real>,
}

impl<E: ComplexField> InverseScratch<E> {
    /// Returns scratch memory for operands of dimension `dim`.
    pub fn new(dim: usize) -> Self {
        let one = E::Real::faer_one();
        Self {
            m: Ldr::identity(dim),
            g: Ldr::identity(dim),
            umin: vec![one; dim],
            umax: vec![one; dim],
            vmin: vec![one; dim],
            vmax: vec![one; dim],
        }
    }

    /// Returns the operand dimension this scratch memory was created for.
    #[inline]
    pub fn dim(&self) -> usize {
        self.m.dim()
    }
}

impl<E: ComplexField> core::fmt::Debug for InverseScratch<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InverseScratch")
            .field("dim", &self.dim())
            .finish()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum OuterFactor {
    Identity,
    /// The outer factor is stored in the output matrix.
    InOutput,
}

fn with_scratch<E: ComplexField>(
    dim: usize,
    scratch: Option<&mut InverseScratch<E>>,
    f: impl FnOnce(&mut InverseScratch<E>),
) -> Result<()> {
    match scratch {
        Some(scratch) => {
            LdrError::check_dim(dim, scratch.dim(), scratch.dim())?;
            f(scratch);
        }
        None => f(&mut InverseScratch::new(dim)),
    }
    Ok(())
}

#[track_caller]
fn check_operands<E: ComplexField>(out: &MatMut<'_, E>, u: &Ldr<E>, v: &Ldr<E>) -> Result<()> {
    if core::ptr::eq(u, v) {
        return Err(LdrError::AliasedOperands);
    }
    let n = v.dim();
    LdrError::check_dim(n, u.dim(), u.dim())?;
    LdrError::check_dim(n, out.nrows(), out.ncols())
}

/// Computes $P_v R_v^{-1} D_{v,\max}^{-1} M^{-1} W$ and stores it in `out`.
///
/// $M$ is read from the $L$ slot of `scratch.m`, and $W$ from `out` when `outer` is
/// [`OuterFactor::InOutput`].
fn sandwich<E: ComplexField>(
    out: MatMut<'_, E>,
    v: &Ldr<E>,
    scratch: &mut InverseScratch<E>,
    outer: OuterFactor,
) {
    let mut out = out;
    let par = v.parallelism;
    let one = E::faer_one();
    let InverseScratch { m, g, vmax, .. } = scratch;

    // M = L_m D_m R_m P_m^T
    m.refactor();

    // D_v,max^-1 P_m R_m^-1 D_m^-1 = L_g D_g R_g P_g^T
    fill_identity(m.ws.mat.as_mut());
    solve_upper_triangular_in_place(m.r.as_ref(), m.ws.mat.as_mut(), par);
    scale::div_cols(m.ws.mat.as_mut(), &m.d);
    perm::mul_p_left(g.l.as_mut(), m.perm.as_ref(), m.ws.mat.as_ref());
    scale::div_rows(g.l.as_mut(), vmax.as_slice());
    g.refactor();

    // Z = D_g R_g P_g^T L_m^H W
    match outer {
        OuterFactor::Identity => g.ws.mat.copy_from(m.l.adjoint()),
        OuterFactor::InOutput => matmul(
            g.ws.mat.as_mut(),
            m.l.adjoint(),
            out.rb(),
            None,
            one,
            par,
        ),
    }
    perm::mul_pt_left(g.ws.mat2.as_mut(), g.perm.as_ref(), g.ws.mat.as_ref());
    matmul(
        g.ws.mat.as_mut(),
        g.r.as_ref(),
        g.ws.mat2.as_ref(),
        None,
        one,
        par,
    );
    scale::scale_rows(g.ws.mat.as_mut(), &g.d);

    // Y = P_v R_v^-1 L_g
    m.ws.mat.copy_from(g.l.as_ref());
    solve_upper_triangular_in_place(v.r.as_ref(), m.ws.mat.as_mut(), par);
    perm::mul_p_left(m.ws.mat2.as_mut(), v.perm.as_ref(), m.ws.mat.as_ref());

    matmul(out, m.ws.mat2.as_ref(), g.ws.mat.as_ref(), None, one, par);
}

impl<E: ComplexField> Ldr<E> {
    /// Computes $A^{-1} = P R^{-1} D^{-1} L^H$ and stores it in `out`.
    ///
    /// # Errors
    ///
    /// Returns [`LdrError::DimensionMismatch`] if `out` doesn't have the dimension of `self`.
    #[track_caller]
    pub fn inverse_into(&mut self, out: MatMut<'_, E>) -> Result<()> {
        LdrError::check_dim(self.dim(), out.nrows(), out.ncols())?;
        let ws = &mut self.ws;

        ws.mat.copy_from(self.l.adjoint());
        scale::div_rows(ws.mat.as_mut(), &self.d);
        solve_upper_triangular_in_place(self.r.as_ref(), ws.mat.as_mut(), self.parallelism);
        perm::mul_p_left(out, self.perm.as_ref(), ws.mat.as_ref());
        Ok(())
    }

    /// Overwrites `self` with the factorization of $A^{-1}$.
    pub fn invert(&mut self) {
        let par = self.parallelism;
        let ws = &mut self.ws;

        // M = P R^-1 D^-1
        fill_identity(ws.mat.as_mut());
        solve_upper_triangular_in_place(self.r.as_ref(), ws.mat.as_mut(), par);
        scale::div_cols(ws.mat.as_mut(), &self.d);
        perm::mul_p_left(self.r.as_mut(), self.perm.as_ref(), ws.mat.as_ref());

        self.l_det_neg = ws.qr.factor(
            self.r.as_mut(),
            ws.mat.as_mut(),
            &mut self.d,
            &mut self.perm,
            par,
        );

        // T = R' P'^T L^H
        ws.mat2.copy_from(self.l.adjoint());
        perm::mul_pt_left(self.l.as_mut(), self.perm.as_ref(), ws.mat2.as_ref());
        matmul(
            ws.mat2.as_mut(),
            self.r.as_ref(),
            self.l.as_ref(),
            None,
            E::faer_one(),
            par,
        );
        core::mem::swap(&mut self.l, &mut ws.mat);

        self.renormalize();
    }

    /// Computes $(I + A)^{-1}$ and stores it in `out`.
    ///
    /// If `scratch` is `None`, the temporary factorizations are allocated for the duration of
    /// the call.
    ///
    /// # Errors
    ///
    /// Returns [`LdrError::DimensionMismatch`] if `out` or `scratch` doesn't have the dimension
    /// of `self`.
    #[track_caller]
    pub fn inverse_of_i_plus_into(
        &self,
        out: MatMut<'_, E>,
        scratch: Option<&mut InverseScratch<E>>,
    ) -> Result<()> {
        let v = self;
        let n = v.dim();
        LdrError::check_dim(n, out.nrows(), out.ncols())?;
        let par = v.parallelism;

        with_scratch(n, scratch, move |scratch| {
            let InverseScratch { m, vmin, vmax, .. } = &mut *scratch;
            scale::split(vmin, vmax, &v.d);

            // M = P_v R_v^-1 D_v,max^-1 + L_v D_v,min
            fill_identity(m.ws.mat.as_mut());
            solve_upper_triangular_in_place(v.r.as_ref(), m.ws.mat.as_mut(), par);
            scale::div_cols(m.ws.mat.as_mut(), vmax);
            perm::mul_p_left(m.l.as_mut(), v.perm.as_ref(), m.ws.mat.as_ref());
            scale::add_scaled_cols(m.l.as_mut(), v.l.as_ref(), vmin);

            sandwich(out, v, scratch, OuterFactor::Identity);
        })
    }
}

/// Computes $(U + V)^{-1}$ and stores it in `out`.
///
/// If `scratch` is `None`, the temporary factorizations are allocated for the duration of the
/// call.
///
/// # Errors
///
/// - Returns [`LdrError::AliasedOperands`] if `u` and `v` are the same factorization.
/// - Returns [`LdrError::DimensionMismatch`] if the operands, `out` or `scratch` don't share the
///   same dimension.
#[track_caller]
pub fn inverse_of_u_plus_v<E: ComplexField>(
    out: MatMut<'_, E>,
    u: &Ldr<E>,
    v: &Ldr<E>,
    scratch: Option<&mut InverseScratch<E>>,
) -> Result<()> {
    check_operands(&out, u, v)?;
    let mut out = out;
    let par = v.parallelism;
    let one = E::faer_one();

    with_scratch(v.dim(), scratch, move |scratch| {
        let InverseScratch {
            m,
            umin,
            umax,
            vmin,
            vmax,
            ..
        } = &mut *scratch;
        scale::split(umin, umax, &u.d);
        scale::split(vmin, vmax, &v.d);

        // D_u,min R_u P_u^T P_v R_v^-1 D_v,max^-1
        fill_identity(m.ws.mat.as_mut());
        solve_upper_triangular_in_place(v.r.as_ref(), m.ws.mat.as_mut(), par);
        scale::div_cols(m.ws.mat.as_mut(), vmax);
        perm::mul_p_left(m.ws.mat2.as_mut(), v.perm.as_ref(), m.ws.mat.as_ref());
        perm::mul_pt_left(m.ws.mat.as_mut(), u.perm.as_ref(), m.ws.mat2.as_ref());
        matmul(
            m.l.as_mut(),
            u.r.as_ref(),
            m.ws.mat.as_ref(),
            None,
            one,
            par,
        );
        scale::scale_rows(m.l.as_mut(), umin);

        // + D_u,max^-1 L_u^H L_v D_v,min
        m.ws.mat.copy_from(u.l.adjoint());
        scale::div_rows(m.ws.mat.as_mut(), umax);
        scale::scale_cols_to(m.ws.mat2.as_mut(), v.l.as_ref(), vmin);
        matmul(
            m.l.as_mut(),
            m.ws.mat.as_ref(),
            m.ws.mat2.as_ref(),
            Some(one),
            one,
            par,
        );

        // W = D_u,max^-1 L_u^H
        out.copy_from(m.ws.mat.as_ref());

        sandwich(out, v, scratch, OuterFactor::InOutput);
    })
}

/// Computes $(U^{-1} + V)^{-1}$ and stores it in `out`.
///
/// If `scratch` is `None`, the temporary factorizations are allocated for the duration of the
/// call.
///
/// # Errors
///
/// - Returns [`LdrError::AliasedOperands`] if `u` and `v` are the same factorization.
/// - Returns [`LdrError::DimensionMismatch`] if the operands, `out` or `scratch` don't share the
///   same dimension.
#[track_caller]
pub fn inverse_of_inv_u_plus_v<E: ComplexField>(
    out: MatMut<'_, E>,
    u: &Ldr<E>,
    v: &Ldr<E>,
    scratch: Option<&mut InverseScratch<E>>,
) -> Result<()> {
    check_operands(&out, u, v)?;
    let mut out = out;
    let par = v.parallelism;
    let one = E::faer_one();

    with_scratch(v.dim(), scratch, move |scratch| {
        let InverseScratch {
            m,
            umin,
            umax,
            vmin,
            vmax,
            ..
        } = &mut *scratch;
        scale::split(umin, umax, &u.d);
        scale::split(vmin, vmax, &v.d);

        // D_u,max^-1 L_u^H P_v R_v^-1 D_v,max^-1
        fill_identity(m.ws.mat.as_mut());
        solve_upper_triangular_in_place(v.r.as_ref(), m.ws.mat.as_mut(), par);
        scale::div_cols(m.ws.mat.as_mut(), vmax);
        perm::mul_p_left(m.ws.mat2.as_mut(), v.perm.as_ref(), m.ws.mat.as_ref());
        m.ws.mat.copy_from(u.l.adjoint());
        scale::div_rows(m.ws.mat.as_mut(), umax);
        matmul(
            m.l.as_mut(),
            m.ws.mat.as_ref(),
            m.ws.mat2.as_ref(),
            None,
            one,
            par,
        );

        // + D_u,min R_u P_u^T L_v D_v,min
        perm::mul_pt_left(m.ws.mat.as_mut(), u.perm.as_ref(), v.l.as_ref());
        scale::scale_cols(m.ws.mat.as_mut(), vmin);
        m.ws.mat2.copy_from(u.r.as_ref());
        scale::scale_rows(m.ws.mat2.as_mut(), umin);
        matmul(
            m.l.as_mut(),
            m.ws.mat2.as_ref(),
            m.ws.mat.as_ref(),
            Some(one),
            one,
            par,
        );

        // W = D_u,min R_u P_u^T
        perm::mul_pt_right(out.rb_mut(), m.ws.mat2.as_ref(), u.perm.as_ref());

        sandwich(out, v, scratch, OuterFactor::InOutput);
    })
}
