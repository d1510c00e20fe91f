use super::Ldr;
use crate::{error::LdrError, perm, scale, Result};
use faer::{linalg::matmul::matmul, ComplexField, MatRef};

impl<E: ComplexField> Ldr<E> {
    /// Overwrites `self` with the factorization of $BA$, where $A$ is the matrix currently
    /// factorized by `self`.
    ///
    /// $BLD$ is refactored as $L'D'R'P'^\top$, after which the trailing factor
    /// $R'P'^\top RP^\top$ is absorbed by a second, row graded refactorization.
    ///
    /// # Errors
    ///
    /// Returns [`LdrError::DimensionMismatch`] if `b` doesn't have the dimension of `self`.
    #[track_caller]
    pub fn left_mul_mat(&mut self, b: MatRef<'_, E>) -> Result<()> {
        LdrError::check_dim(self.dim(), b.nrows(), b.ncols())?;
        #[cfg(feature = "perf-warn")]
        warn_layout!(b, LEFT_MUL_WARN, "LDR left product");

        let par = self.parallelism;
        let one = E::faer_one();
        let ws = &mut self.ws;

        // M = B L D
        matmul(ws.mat.as_mut(), b, self.l.as_ref(), None, one, par);
        scale::scale_cols(ws.mat.as_mut(), &self.d);

        // M = L' D' R' P'^T, with R' left in `ws.mat`
        self.l_det_neg = ws.qr.factor(
            ws.mat.as_mut(),
            self.l.as_mut(),
            &mut self.d,
            &mut ws.perm,
            par,
        );

        // T = R' P'^T R P^T
        perm::mul_pt_left(ws.mat2.as_mut(), ws.perm.as_ref(), self.r.as_ref());
        matmul(
            self.r.as_mut(),
            ws.mat.as_ref(),
            ws.mat2.as_ref(),
            None,
            one,
            par,
        );
        perm::mul_pt_right(ws.mat2.as_mut(), self.r.as_ref(), self.perm.as_ref());

        self.renormalize();
        Ok(())
    }

    /// Overwrites `self` with the factorization of $AB$, where $A$ is the matrix currently
    /// factorized by `self`.
    ///
    /// # Errors
    ///
    /// Returns [`LdrError::DimensionMismatch`] if `b` doesn't have the dimension of `self`.
    #[track_caller]
    pub fn right_mul_mat(&mut self, b: MatRef<'_, E>) -> Result<()> {
        LdrError::check_dim(self.dim(), b.nrows(), b.ncols())?;
        #[cfg(feature = "perf-warn")]
        warn_layout!(b, RIGHT_MUL_WARN, "LDR right product");

        let par = self.parallelism;
        let ws = &mut self.ws;

        // T = R P^T B
        perm::mul_pt_left(ws.mat.as_mut(), self.perm.as_ref(), b);
        matmul(
            ws.mat2.as_mut(),
            self.r.as_ref(),
            ws.mat.as_ref(),
            None,
            E::faer_one(),
            par,
        );

        self.renormalize();
        Ok(())
    }

    /// Overwrites `self` with the factorization of $A_2 A_1$, where $A_1$ is the matrix currently
    /// factorized by `self` and $A_2$ is the one factorized by `lhs`.
    ///
    /// # Errors
    ///
    /// Returns [`LdrError::DimensionMismatch`] if the dimensions differ.
    #[track_caller]
    pub fn left_mul(&mut self, lhs: &Self) -> Result<()> {
        LdrError::check_dim(self.dim(), lhs.dim(), lhs.dim())?;
        let par = self.parallelism;
        let one = E::faer_one();
        let ws = &mut self.ws;

        // M = D2 R2 P2^T L1 D1
        perm::mul_pt_left(ws.mat.as_mut(), lhs.perm.as_ref(), self.l.as_ref());
        matmul(
            self.l.as_mut(),
            lhs.r.as_ref(),
            ws.mat.as_ref(),
            None,
            one,
            par,
        );
        scale::scale_rows(self.l.as_mut(), &lhs.d);
        scale::scale_cols(self.l.as_mut(), &self.d);

        let odd = ws.qr.factor(
            self.l.as_mut(),
            ws.mat.as_mut(),
            &mut self.d,
            &mut ws.perm,
            par,
        );
        self.l_det_neg = lhs.l_det_neg ^ odd;

        // T = R' P'^T R1 P1^T
        perm::mul_pt_left(ws.mat2.as_mut(), ws.perm.as_ref(), self.r.as_ref());
        matmul(
            self.r.as_mut(),
            self.l.as_ref(),
            ws.mat2.as_ref(),
            None,
            one,
            par,
        );
        perm::mul_pt_right(ws.mat2.as_mut(), self.r.as_ref(), self.perm.as_ref());

        // L2 L'
        matmul(
            self.l.as_mut(),
            lhs.l.as_ref(),
            ws.mat.as_ref(),
            None,
            one,
            par,
        );

        self.renormalize();
        Ok(())
    }

    /// Overwrites `self` with the factorization of $A_2 A_1$, where $A_2$ is the matrix currently
    /// factorized by `self` and $A_1$ is the one factorized by `rhs`.
    ///
    /// # Errors
    ///
    /// Returns [`LdrError::DimensionMismatch`] if the dimensions differ.
    #[track_caller]
    pub fn right_mul(&mut self, rhs: &Self) -> Result<()> {
        LdrError::check_dim(self.dim(), rhs.dim(), rhs.dim())?;
        let par = self.parallelism;
        let one = E::faer_one();
        let ws = &mut self.ws;

        // M = D2 R2 P2^T L1 D1
        perm::mul_pt_left(ws.mat2.as_mut(), self.perm.as_ref(), rhs.l.as_ref());
        matmul(
            ws.mat.as_mut(),
            self.r.as_ref(),
            ws.mat2.as_ref(),
            None,
            one,
            par,
        );
        scale::scale_rows(ws.mat.as_mut(), &self.d);
        scale::scale_cols(ws.mat.as_mut(), &rhs.d);

        let odd = ws.qr.factor(
            ws.mat.as_mut(),
            ws.mat2.as_mut(),
            &mut self.d,
            &mut ws.perm,
            par,
        );
        self.l_det_neg ^= odd;

        // L2 L'
        matmul(
            self.r.as_mut(),
            self.l.as_ref(),
            ws.mat2.as_ref(),
            None,
            one,
            par,
        );
        core::mem::swap(&mut self.l, &mut self.r);

        // T = R' P'^T R1 P1^T
        perm::mul_pt_left(ws.mat2.as_mut(), ws.perm.as_ref(), rhs.r.as_ref());
        matmul(
            self.r.as_mut(),
            ws.mat.as_ref(),
            ws.mat2.as_ref(),
            None,
            one,
            par,
        );
        perm::mul_pt_right(ws.mat2.as_mut(), self.r.as_ref(), rhs.perm.as_ref());

        self.renormalize();
        Ok(())
    }
}
