//! The LDR factorization and its algebra.
//!
//! An LDR factorization of a square matrix $A$ is a decomposition
//! $$AP = LDR,$$
//! where $L$ is unitary, $D$ is diagonal with strictly positive entries (the pseudo-eigenvalues),
//! $R$ is upper triangular with a unit modulus diagonal and $P$ is a permutation matrix.
//!
//! Separating the magnitude of $A$ into $D$ makes it possible to multiply and invert long
//! chains of ill-conditioned matrices without losing the information carried by their smallest
//! scales: every operation in this module combines only factors of comparable magnitude before
//! handing the result to a column pivoted QR decomposition, which re-establishes the
//! factorization.
//!
//! # Example
//!
//! ```
//! use faer::mat;
//! use faer_ldr::Ldr;
//!
//! let a = mat![[4.0f64, 3.0], [6.0, 3.0]];
//! let b = mat![[1.0f64, 2.0], [0.5, -1.0]];
//!
//! let mut f = Ldr::from_mat(a.as_ref()).unwrap();
//! // f now holds b * a
//! f.left_mul_mat(b.as_ref()).unwrap();
//!
//! let det = f.det();
//! assert!((det - (-2.0 * -6.0)).abs() < 1e-12);
//! ```

use crate::{error::LdrError, perm, scale, Result};
use dyn_stack::{GlobalPodBuffer, PodStack, StackReq};
use faer::{
    linalg::{
        householder::{
            apply_block_householder_sequence_on_the_left_in_place_req,
            apply_block_householder_sequence_on_the_left_in_place_with_conj,
        },
        matmul::matmul,
        qr::col_pivoting::compute::{qr_in_place, qr_in_place_req, recommended_blocksize},
        zip::Diag,
    },
    perm::{Perm, PermRef},
    unzipped, zipped_rw, ComplexField, Conj, Mat, MatMut, MatRef, Parallelism, RealField,
};
use reborrow::*;

mod det;
mod inverse;
mod product;

pub use det::{abs_det_ratio, log_abs_det_ratio};
pub use inverse::{inverse_of_inv_u_plus_v, inverse_of_u_plus_v, InverseScratch};

/// Parameters of an LDR factorization.
#[derive(Copy, Clone, Debug, Default)]
#[non_exhaustive]
pub struct LdrParams {
    /// Parallelism used by the dense kernels. `None` to use the global parallelism of `faer`.
    pub parallelism: Option<Parallelism<'static>>,
}

impl LdrParams {
    fn normalize(self) -> Parallelism<'static> {
        self.parallelism.unwrap_or_else(faer::get_global_parallelism)
    }
}

/// Working state of the column pivoted QR decomposition: the block Householder factor and the
/// stack memory of the in-place kernels.
struct QrWorkspace<E: ComplexField> {
    householder: Mat<E>,
    mem: GlobalPodBuffer,
}

fn qr_req<E: ComplexField>(dim: usize, blocksize: usize, parallelism: Parallelism<'_>) -> StackReq {
    StackReq::any_of([
        qr_in_place_req::<usize, E>(dim, dim, blocksize, parallelism, Default::default())
            .unwrap(),
        apply_block_householder_sequence_on_the_left_in_place_req::<E>(dim, blocksize, dim)
            .unwrap(),
    ])
}

impl<E: ComplexField> QrWorkspace<E> {
    fn new(dim: usize, parallelism: Parallelism<'_>) -> Self {
        let blocksize = recommended_blocksize::<E>(dim, dim);
        Self {
            householder: Mat::zeros(blocksize, dim),
            mem: GlobalPodBuffer::new(qr_req::<E>(dim, blocksize, parallelism)),
        }
    }

    /// Grows the stack memory if `parallelism` needs more of it.
    fn reserve(&mut self, parallelism: Parallelism<'_>) {
        let req = qr_req::<E>(
            self.householder.ncols(),
            self.householder.nrows(),
            parallelism,
        );
        if req.unaligned_bytes_required() > self.mem.len() {
            self.mem = GlobalPodBuffer::new(req);
        }
    }

    /// Computes the column pivoted QR decomposition $AP = QR_{\text{raw}}$ in place.
    ///
    /// On exit `a` holds $R = D^{-1} R_{\text{raw}}$, `q` holds $Q$, `d` holds
    /// $|\text{diag}(R_{\text{raw}})|$ and `perm` holds $P$. Returns `true` if $\det Q = -1$.
    fn factor(
        &mut self,
        a: MatMut<'_, E>,
        q: MatMut<'_, E>,
        d: &mut [E::Real],
        perm: &mut Perm<usize>,
        parallelism: Parallelism<'_>,
    ) -> bool {
        let mut a = a;
        let mut q = q;
        let n = d.len();
        if n == 0 {
            return false;
        }

        let (mut fwd, mut inv) = core::mem::replace(perm, perm::identity(0)).into_arrays();
        qr_in_place(
            a.rb_mut(),
            self.householder.as_mut(),
            &mut fwd[..],
            &mut inv[..],
            parallelism,
            PodStack::new(&mut self.mem),
            Default::default(),
        );
        *perm = Perm::new_checked(fwd, inv, n);

        // every reflector with a finite coefficient is a true reflection, of determinant -1
        let blocksize = self.householder.nrows();
        let mut odd = false;
        for k in 0..n {
            if self.householder.read(k % blocksize, k).faer_is_finite() {
                odd = !odd;
            }
        }

        fill_identity(q.rb_mut());
        apply_block_householder_sequence_on_the_left_in_place_with_conj(
            a.rb(),
            self.householder.as_ref(),
            Conj::No,
            q.rb_mut(),
            parallelism,
            PodStack::new(&mut self.mem),
        );

        zipped_rw!(a.rb_mut())
            .for_each_triangular_lower(Diag::Skip, |unzipped!(mut x)| x.write(E::faer_zero()));

        let zero = E::Real::faer_zero();
        for i in 0..n {
            let di = a.read(i, i).faer_abs();
            let mut row = a.rb_mut().row_mut(i).subcols_mut(i, n - i);
            if di == zero {
                // pivoting guarantees that the trailing block is exactly zero
                log::warn!(target: "faer_ldr", "exactly singular matrix: zero pivot at index {i} of {n}");
                d[i] = E::Real::faer_min_positive();
                row.fill_zero();
                row.write(0, E::faer_one());
            } else {
                d[i] = di;
                let inv = di.faer_inv();
                zipped_rw!(row).for_each(|unzipped!(mut x)| x.write(x.read().faer_scale_real(inv)));
            }
        }

        if log::log_enabled!(target: "faer_ldr", log::Level::Trace) {
            let mut lo = E::Real::faer_one();
            let mut hi = E::Real::faer_one();
            for &x in d.iter() {
                if x < lo {
                    lo = x;
                }
                if x > hi {
                    hi = x;
                }
            }
            log::trace!(target: "faer_ldr", "refactored {n}×{n} matrix, pseudo-eigenvalues in [{lo:?}, {hi:?}]");
        }

        odd
    }
}

/// Scratch memory owned by a factorization. Its contents are only meaningful within a single
/// operation.
struct Workspace<E: ComplexField> {
    mat: Mat<E>,
    mat2: Mat<E>,
    perm: Perm<usize>,
    qr: QrWorkspace<E>,
}

impl<E: ComplexField> Workspace<E> {
    fn new(dim: usize, parallelism: Parallelism<'_>) -> Self {
        Self {
            mat: Mat::zeros(dim, dim),
            mat2: Mat::zeros(dim, dim),
            perm: perm::identity(dim),
            qr: QrWorkspace::new(dim, parallelism),
        }
    }
}

/// LDR factorization $AP = LDR$ of a square matrix.
///
/// The factorization owns its scratch memory, including the working state of the QR
/// decomposition, so that repeated products and inverses do not allocate. Operations that need
/// two distinct operands borrow them separately, so the same factorization can never be mutated
/// through two paths at once.
pub struct Ldr<E: ComplexField> {
    l: Mat<E>,
    d: Vec<E::Real>,
    r: Mat<E>,
    perm: Perm<usize>,
    // det(L) is -1 when set, 1 otherwise
    l_det_neg: bool,
    parallelism: Parallelism<'static>,
    ws: Workspace<E>,
}

impl<E: ComplexField> Ldr<E> {
    /// Returns the factorization of the `dim×dim` identity matrix.
    pub fn identity(dim: usize) -> Self {
        Self::identity_with_params(dim, Default::default())
    }

    /// Returns the factorization of the `dim×dim` identity matrix, using the provided parameters.
    pub fn identity_with_params(dim: usize, params: LdrParams) -> Self {
        let parallelism = params.normalize();
        let mut this = Self {
            l: Mat::zeros(dim, dim),
            d: vec![E::Real::faer_one(); dim],
            r: Mat::zeros(dim, dim),
            perm: perm::identity(dim),
            l_det_neg: false,
            parallelism,
            ws: Workspace::new(dim, parallelism),
        };
        this.set_identity();
        this
    }

    /// Computes the factorization of the square matrix `a`.
    ///
    /// # Errors
    ///
    /// Returns [`LdrError::DimensionMismatch`] if `a` is not square.
    #[track_caller]
    pub fn from_mat(a: MatRef<'_, E>) -> Result<Self> {
        Self::from_mat_with_params(a, Default::default())
    }

    /// Computes the factorization of the square matrix `a`, using the provided parameters.
    ///
    /// # Errors
    ///
    /// Returns [`LdrError::DimensionMismatch`] if `a` is not square.
    #[track_caller]
    pub fn from_mat_with_params(a: MatRef<'_, E>, params: LdrParams) -> Result<Self> {
        LdrError::check_dim(a.nrows(), a.nrows(), a.ncols())?;
        let mut this = Self::identity_with_params(a.nrows(), params);
        this.factorize(a)?;
        Ok(this)
    }

    /// Returns the dimension of the factorized matrix.
    #[inline]
    pub fn dim(&self) -> usize {
        self.d.len()
    }

    /// Returns the unitary factor $L$.
    #[inline]
    pub fn l(&self) -> MatRef<'_, E> {
        self.l.as_ref()
    }

    /// Returns the diagonal of $D$.
    #[inline]
    pub fn d(&self) -> &[E::Real] {
        &self.d
    }

    /// Returns the upper triangular factor $R$.
    #[inline]
    pub fn r(&self) -> MatRef<'_, E> {
        self.r.as_ref()
    }

    /// Returns the permutation $P$.
    #[inline]
    pub fn permutation(&self) -> PermRef<'_, usize> {
        self.perm.as_ref()
    }

    /// Returns the forward array of the permutation $P$, such that column `j` of $AP$ is column
    /// `perm()[j]` of $A$.
    #[inline]
    pub fn perm(&self) -> &[usize] {
        self.perm.as_ref().arrays().0
    }

    /// Returns the inverse array of the permutation $P$.
    #[inline]
    pub fn perm_inv(&self) -> &[usize] {
        self.perm.as_ref().arrays().1
    }

    /// Returns the parallelism used by the dense kernels.
    #[inline]
    pub fn parallelism(&self) -> Parallelism<'static> {
        self.parallelism
    }

    /// Sets the parallelism used by the dense kernels.
    pub fn set_parallelism(&mut self, parallelism: Parallelism<'static>) {
        self.parallelism = parallelism;
        self.ws.qr.reserve(parallelism);
    }

    /// Resets `self` to the factorization of the identity matrix.
    pub fn set_identity(&mut self) {
        fill_identity(self.l.as_mut());
        fill_identity(self.r.as_mut());
        self.d.fill(E::Real::faer_one());
        self.perm = perm::identity(self.dim());
        self.l_det_neg = false;
    }

    /// Overwrites `self` with the factorization of the square matrix `a`.
    ///
    /// A rank deficient input is not an error. It shows up as one or more near-zero
    /// pseudo-eigenvalues.
    ///
    /// # Errors
    ///
    /// Returns [`LdrError::DimensionMismatch`] if `a` doesn't have the dimension of `self`.
    #[track_caller]
    pub fn factorize(&mut self, a: MatRef<'_, E>) -> Result<()> {
        LdrError::check_dim(self.dim(), a.nrows(), a.ncols())?;

        #[cfg(feature = "perf-warn")]
        warn_layout!(a, FACTORIZE_WARN, "LDR factorization");

        self.l.copy_from(a);
        self.refactor();
        Ok(())
    }

    /// Recomputes the factorization from the matrix currently stored in the $L$ slot.
    ///
    /// Used by the algebraic operations once an intermediate product has been written there.
    pub(crate) fn refactor(&mut self) {
        let ws = &mut self.ws;
        self.l_det_neg = ws.qr.factor(
            self.l.as_mut(),
            ws.mat.as_mut(),
            &mut self.d,
            &mut self.perm,
            self.parallelism,
        );
        // the L slot now holds R, and the scratch matrix holds Q
        core::mem::swap(&mut self.r, &mut self.l);
        core::mem::swap(&mut self.l, &mut ws.mat);
    }

    /// Re-normalizes `self` after an update left it in the form $L D T$, where $T$ is an arbitrary
    /// matrix with entries of order one stored in `ws.mat2`.
    ///
    /// $DT$ is row graded, so its column pivoted QR decomposition $DT = L' D' R' P'^\top$ keeps
    /// the small scales intact. The result is $(LL') D' R' P'^\top$.
    pub(crate) fn renormalize(&mut self) {
        let par = self.parallelism;
        let ws = &mut self.ws;

        scale::scale_rows(ws.mat2.as_mut(), &self.d);
        let odd = ws.qr.factor(
            ws.mat2.as_mut(),
            ws.mat.as_mut(),
            &mut self.d,
            &mut self.perm,
            par,
        );
        core::mem::swap(&mut self.r, &mut ws.mat2);

        matmul(
            ws.mat2.as_mut(),
            self.l.as_ref(),
            ws.mat.as_ref(),
            None,
            E::faer_one(),
            par,
        );
        core::mem::swap(&mut self.l, &mut ws.mat2);
        self.l_det_neg ^= odd;
    }

    /// Copies the factorization stored in `other` into `self`, reusing the memory of `self`.
    ///
    /// # Errors
    ///
    /// Returns [`LdrError::DimensionMismatch`] if the dimensions differ.
    pub fn copy_from(&mut self, other: &Self) -> Result<()> {
        LdrError::check_dim(self.dim(), other.dim(), other.dim())?;
        self.l.copy_from(other.l.as_ref());
        self.r.copy_from(other.r.as_ref());
        self.d.copy_from_slice(&other.d);
        self.perm.clone_from(&other.perm);
        self.l_det_neg = other.l_det_neg;
        Ok(())
    }

    /// Computes the dense matrix $A = LDRP^\top$ and stores it in `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`LdrError::DimensionMismatch`] if `dst` doesn't have the dimension of `self`.
    pub fn reconstruct(&mut self, dst: MatMut<'_, E>) -> Result<()> {
        LdrError::check_dim(self.dim(), dst.nrows(), dst.ncols())?;
        reconstruct_impl(
            dst,
            self.ws.mat.as_mut(),
            self.ws.mat2.as_mut(),
            self.l.as_ref(),
            &self.d,
            self.r.as_ref(),
            self.perm.as_ref(),
            self.parallelism,
        );
        Ok(())
    }

    /// Returns the dense matrix $A = LDRP^\top$.
    pub fn to_mat(&self) -> Mat<E> {
        let n = self.dim();
        let mut dst = Mat::zeros(n, n);
        let mut tmp = Mat::zeros(n, n);
        let mut tmp2 = Mat::zeros(n, n);
        reconstruct_impl(
            dst.as_mut(),
            tmp.as_mut(),
            tmp2.as_mut(),
            self.l.as_ref(),
            &self.d,
            self.r.as_ref(),
            self.perm.as_ref(),
            self.parallelism,
        );
        dst
    }
}

impl<E: ComplexField> Clone for Ldr<E> {
    fn clone(&self) -> Self {
        Self {
            l: self.l.clone(),
            d: self.d.clone(),
            r: self.r.clone(),
            perm: self.perm.clone(),
            l_det_neg: self.l_det_neg,
            parallelism: self.parallelism,
            ws: Workspace::new(self.dim(), self.parallelism),
        }
    }
}

impl<E: ComplexField> core::fmt::Debug for Ldr<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Ldr")
            .field("l", &self.l)
            .field("d", &self.d)
            .field("r", &self.r)
            .field("perm", &self.perm)
            .finish()
    }
}

pub(crate) fn fill_identity<E: ComplexField>(m: MatMut<'_, E>) {
    let mut m = m;
    m.fill_zero();
    for i in 0..Ord::min(m.nrows(), m.ncols()) {
        m.write(i, i, E::faer_one());
    }
}

fn reconstruct_impl<E: ComplexField>(
    dst: MatMut<'_, E>,
    tmp: MatMut<'_, E>,
    tmp2: MatMut<'_, E>,
    l: MatRef<'_, E>,
    d: &[E::Real],
    r: MatRef<'_, E>,
    perm: PermRef<'_, usize>,
    parallelism: Parallelism<'_>,
) {
    let mut tmp = tmp;
    let mut tmp2 = tmp2;

    tmp.copy_from(r);
    scale::scale_rows(tmp.rb_mut(), d);
    matmul(
        tmp2.rb_mut(),
        l,
        tmp.rb(),
        None,
        E::faer_one(),
        parallelism,
    );
    perm::mul_pt_right(dst, tmp2.rb(), perm);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use equator::assert;
    use faer::{complex_native::c64, mat};
    use rand::prelude::*;

    fn check_reconstruct<E: RandomEntity>(rng: &mut StdRng) {
        for n in [1, 2, 3, 5, 8, 17, 40] {
            let a = random_mat::<E>(rng, n);
            let mut f = Ldr::from_mat(a.as_ref()).unwrap();
            assert_valid(&f);

            let mut rec = Mat::<E>::zeros(n, n);
            f.reconstruct(rec.as_mut()).unwrap();
            assert!(max_diff(rec.as_ref(), a.as_ref()) < 1e-12 * n as f64);
            assert!(max_diff(f.to_mat().as_ref(), a.as_ref()) < 1e-12 * n as f64);
        }
    }

    #[test]
    fn test_reconstruct_f64() {
        check_reconstruct::<f64>(&mut StdRng::seed_from_u64(0));
    }

    #[test]
    fn test_reconstruct_c64() {
        check_reconstruct::<c64>(&mut StdRng::seed_from_u64(1));
    }

    #[test]
    fn test_pseudo_eigenvalues_sorted() {
        // column pivoting yields non increasing pivots
        let rng = &mut StdRng::seed_from_u64(2);
        let a = random_mat::<f64>(rng, 12);
        let f = Ldr::from_mat(a.as_ref()).unwrap();
        for i in 1..12 {
            assert!(f.d()[i] <= f.d()[i - 1] * (1.0 + 1e-10));
        }
    }

    #[test]
    fn test_identity() {
        let f = Ldr::<f64>::identity(4);
        assert_valid(&f);
        assert!(f.d() == [1.0; 4]);
        assert!(f.to_mat() == Mat::<f64>::identity(4, 4));

        let mut g = Ldr::from_mat(mat![[4.0f64, 3.0], [6.0, 3.0]].as_ref()).unwrap();
        g.set_identity();
        assert!(g.to_mat() == Mat::<f64>::identity(2, 2));
        assert!(g.perm() == [0, 1]);
    }

    #[test]
    fn test_rank_deficient() {
        let zero = Mat::<f64>::zeros(3, 3);
        let f = Ldr::from_mat(zero.as_ref()).unwrap();
        assert_valid(&f);
        assert!(f.d().iter().all(|&x| x > 0.0 && x < 1e-300));
        assert!(f.to_mat().norm_max() < 1e-300);

        // rank one: u * v^T
        let a = Mat::<f64>::from_fn(4, 4, |i, j| (i + 1) as f64 * (j as f64 - 1.5));
        let f = Ldr::from_mat(a.as_ref()).unwrap();
        assert_valid(&f);
        assert!(f.d()[0] > 1.0);
        assert!(f.d()[1..].iter().all(|&x| x < 1e-12 * f.d()[0]));
        assert!(max_diff(f.to_mat().as_ref(), a.as_ref()) < 1e-13);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = Mat::<f64>::zeros(2, 3);
        assert!(
            Ldr::from_mat(a.as_ref()).unwrap_err()
                == LdrError::DimensionMismatch {
                    expected: 2,
                    nrows: 2,
                    ncols: 3,
                }
        );

        let mut f = Ldr::<f64>::identity(3);
        let b = Mat::<f64>::zeros(2, 2);
        assert!(f.factorize(b.as_ref()).is_err());
        let mut dst = Mat::<f64>::zeros(3, 2);
        assert!(f.reconstruct(dst.as_mut()).is_err());
        assert!(f.copy_from(&Ldr::identity(2)).is_err());
    }

    #[test]
    fn test_copy_and_clone() {
        let rng = &mut StdRng::seed_from_u64(3);
        let a = random_mat::<c64>(rng, 6);
        let f = Ldr::from_mat(a.as_ref()).unwrap();

        let g = f.clone();
        let mut h = Ldr::identity(6);
        h.copy_from(&f).unwrap();

        for other in [&g, &h] {
            assert!(other.d() == f.d());
            assert!(other.perm() == f.perm());
            assert!(other.l() == f.l());
            assert!(other.r() == f.r());
        }
    }

    #[test]
    fn test_refactor_l_slot() {
        let rng = &mut StdRng::seed_from_u64(4);
        let a = random_mat::<f64>(rng, 5);
        let mut f = Ldr::<f64>::identity(5);
        f.l.copy_from(a.as_ref());
        f.refactor();
        assert_valid(&f);
        assert!(max_diff(f.to_mat().as_ref(), a.as_ref()) < 1e-12);
    }

    #[test]
    #[cfg(feature = "rayon")]
    fn test_parallelism() {
        // the blocked Householder path is taken for this size
        let rng = &mut StdRng::seed_from_u64(5);
        let n = 70;
        let a = random_mat::<c64>(rng, n);
        let b = random_mat::<c64>(rng, n);

        let seq = LdrParams {
            parallelism: Some(Parallelism::None),
        };
        let mut f = Ldr::from_mat_with_params(a.as_ref(), seq).unwrap();
        f.left_mul_mat(b.as_ref()).unwrap();
        assert_valid(&f);

        let mut g = Ldr::from_mat_with_params(a.as_ref(), seq).unwrap();
        g.set_parallelism(Parallelism::Rayon(4));
        g.left_mul_mat(b.as_ref()).unwrap();
        assert_valid(&g);
        assert!(g.parallelism() == Parallelism::Rayon(4));

        let ba = mul(b.as_ref(), a.as_ref());
        assert!(rel_diff(f.to_mat().as_ref(), ba.as_ref()) < 1e-11);
        assert!(rel_diff(g.to_mat().as_ref(), ba.as_ref()) < 1e-11);
    }

    #[test]
    fn test_empty() {
        let a = Mat::<f64>::zeros(0, 0);
        let mut f = Ldr::from_mat(a.as_ref()).unwrap();
        assert!(f.dim() == 0);
        f.left_mul_mat(a.as_ref()).unwrap();
        f.invert();
        assert!(f.sign_det() == 1.0);
        assert!(f.log_abs_det() == 0.0);
    }
}
