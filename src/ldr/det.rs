use super::Ldr;
use crate::{error::LdrError, perm, Result};
use core::cmp::Ordering;
use faer::{ComplexField, RealField};
use num_traits::Float;

impl<E: ComplexField> Ldr<E> {
    /// Returns the phase of the determinant, a scalar of unit modulus. For real matrices, this
    /// is the sign of the determinant.
    ///
    /// $\det L$ is $\pm 1$, read from the parity of the Householder reflections that built $L$.
    pub fn sign_det(&self) -> E {
        let mut sign = E::faer_one();
        for i in 0..self.dim() {
            sign = sign.faer_mul(self.r.read(i, i));
        }
        if self.l_det_neg != (perm::sign(self.perm.as_ref()) < 0) {
            sign = sign.faer_neg();
        }
        sign.faer_scale_real(sign.faer_abs().faer_inv())
    }
}

impl<E: ComplexField> Ldr<E>
where
    E::Real: Float,
{
    /// Returns $\log |\det A|$.
    pub fn log_abs_det(&self) -> E::Real {
        self.d
            .iter()
            .fold(E::Real::faer_zero(), |acc, &x| acc.faer_add(x.ln()))
    }

    /// Returns $|\det A|$.
    ///
    /// Overflows or underflows when the determinant is not representable, use
    /// [`Ldr::log_abs_det`] in that case.
    pub fn abs_det(&self) -> E::Real {
        self.log_abs_det().exp()
    }

    /// Returns $\det A$.
    pub fn det(&self) -> E {
        self.sign_det().faer_scale_real(self.abs_det())
    }
}

fn sorted<R: RealField>(d: &[R]) -> Vec<R> {
    let mut d = d.to_vec();
    d.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    d
}

/// Returns $\log |\det A_2 / \det A_1|$, where $A_2$ and $A_1$ are the matrices factorized by
/// `num` and `den`.
///
/// Both sets of pseudo-eigenvalues are sorted, and the logarithms are subtracted pairwise by
/// rank, so that terms of comparable magnitude cancel first.
///
/// # Errors
///
/// Returns [`LdrError::DimensionMismatch`] if the dimensions differ.
pub fn log_abs_det_ratio<E: ComplexField>(num: &Ldr<E>, den: &Ldr<E>) -> Result<E::Real>
where
    E::Real: Float,
{
    LdrError::check_dim(den.dim(), num.dim(), num.dim())?;
    let d2 = sorted(&num.d);
    let d1 = sorted(&den.d);
    Ok(d2
        .iter()
        .zip(&d1)
        .fold(E::Real::faer_zero(), |acc, (&x2, &x1)| {
            acc.faer_add(x2.ln().faer_sub(x1.ln()))
        }))
}

/// Returns $|\det A_2 / \det A_1|$, where $A_2$ and $A_1$ are the matrices factorized by `num`
/// and `den`.
///
/// # Errors
///
/// Returns [`LdrError::DimensionMismatch`] if the dimensions differ.
pub fn abs_det_ratio<E: ComplexField>(num: &Ldr<E>, den: &Ldr<E>) -> Result<E::Real>
where
    E::Real: Float,
{
    log_abs_det_ratio(num, den).map(Float::exp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use assert_approx_eq::assert_approx_eq;
    use equator::assert;
    use faer::{complex_native::c64, mat, Mat};
    use rand::prelude::*;

    #[test]
    fn test_2x2() {
        let a = mat![[4.0f64, 3.0], [6.0, 3.0]];
        let f = Ldr::from_mat(a.as_ref()).unwrap();
        assert_approx_eq!(f.abs_det(), 6.0, 1e-13);
        assert_approx_eq!(f.log_abs_det(), 6.0f64.ln(), 1e-13);
        assert_approx_eq!(f.sign_det(), -1.0, 1e-15);
        assert_approx_eq!(f.sign_det() * f.abs_det(), -6.0, 1e-13);
        assert_approx_eq!(f.det(), -6.0, 1e-13);
    }

    fn check_det<E: RandomEntity>(rng: &mut StdRng) {
        for n in 1..=8 {
            for _ in 0..4 {
                let a = random_mat::<E>(rng, n);
                let f = Ldr::from_mat(a.as_ref()).unwrap();
                let expected = a.determinant();

                assert_approx_eq!(f.abs_det(), expected.faer_abs(), 1e-12);
                let diff = f.det().faer_sub(expected).faer_abs();
                assert!(diff < 1e-12 * expected.faer_abs().max(1.0));
                assert_approx_eq!(f.sign_det().faer_abs(), 1.0, 1e-14);
            }
        }
    }

    #[test]
    fn test_det_f64() {
        check_det::<f64>(&mut StdRng::seed_from_u64(0));
    }

    #[test]
    fn test_det_c64() {
        check_det::<c64>(&mut StdRng::seed_from_u64(1));
    }

    #[test]
    fn test_identity_sign() {
        for n in 1..5 {
            let f = Ldr::<f64>::identity(n);
            assert_approx_eq!(f.sign_det(), 1.0, 1e-15);
            assert!(f.log_abs_det() == 0.0);
        }
    }

    #[test]
    fn test_sign_after_products() {
        let rng = &mut StdRng::seed_from_u64(2);
        let a = random_mat::<f64>(rng, 5);
        let b = random_mat::<f64>(rng, 5);
        let mut f = Ldr::from_mat(a.as_ref()).unwrap();
        f.right_mul_mat(b.as_ref()).unwrap();

        let expected = a.determinant() * b.determinant();
        assert_approx_eq!(f.sign_det(), expected.signum(), 1e-14);
        assert_approx_eq!(f.det(), expected, 1e-12 * expected.abs().max(1.0));
    }

    fn check_l_det_tracking<E: RandomEntity>(rng: &mut StdRng) {
        let n = 40;
        let a = random_mat::<E>(rng, n);
        let b = random_mat::<E>(rng, n);
        let fb = Ldr::from_mat(b.as_ref()).unwrap();

        let mut f = Ldr::from_mat(a.as_ref()).unwrap();
        let check = |f: &Ldr<E>| {
            let det_l = f.l().determinant();
            assert!((det_l.faer_real() - if f.l_det_neg { -1.0 } else { 1.0 }).abs() < 1e-10);
            assert!(det_l.faer_imag().abs() < 1e-10);
        };
        check(&f);
        f.left_mul_mat(b.as_ref()).unwrap();
        check(&f);
        f.right_mul_mat(a.as_ref()).unwrap();
        check(&f);
        f.left_mul(&fb).unwrap();
        check(&f);
        f.right_mul(&fb).unwrap();
        check(&f);
        f.invert();
        check(&f);
    }

    #[test]
    fn test_l_det_tracking_f64() {
        check_l_det_tracking::<f64>(&mut StdRng::seed_from_u64(4));
    }

    #[test]
    fn test_l_det_tracking_c64() {
        check_l_det_tracking::<c64>(&mut StdRng::seed_from_u64(5));
    }

    #[test]
    fn test_ratio() {
        // pairing the pseudo-eigenvalues by sorted rank is a heuristic. it is checked
        // empirically on these families, not proven for arbitrary pairs of matrices
        let rng = &mut StdRng::seed_from_u64(3);
        for n in [1, 3, 8] {
            let a1 = random_mat::<c64>(rng, n);
            let a2 = random_mat::<c64>(rng, n);
            let f1 = Ldr::from_mat(a1.as_ref()).unwrap();
            let f2 = Ldr::from_mat(a2.as_ref()).unwrap();

            let expected = a2.determinant().faer_abs() / a1.determinant().faer_abs();
            let ratio = abs_det_ratio(&f2, &f1).unwrap();
            assert!((ratio - expected).abs() < 1e-11 * expected);
            assert_approx_eq!(log_abs_det_ratio(&f2, &f1).unwrap(), expected.ln(), 1e-11);

            assert_approx_eq!(abs_det_ratio(&f1, &f1).unwrap(), 1.0, 1e-15);
            let f1_copy = f1.clone();
            assert!(log_abs_det_ratio(&f1_copy, &f1).unwrap() == 0.0);
        }
    }

    #[test]
    fn test_ratio_beyond_range() {
        // both determinants underflow, their ratio doesn't
        let n = 40;
        let a1 = Mat::<f64>::from_fn(n, n, |i, j| if i == j { 1e-10 } else { 0.0 });
        let a2 = Mat::<f64>::from_fn(n, n, |i, j| if i == j { 2e-10 } else { 0.0 });
        let f1 = Ldr::from_mat(a1.as_ref()).unwrap();
        let f2 = Ldr::from_mat(a2.as_ref()).unwrap();

        assert!(f1.abs_det() == 0.0);
        let expected = 2.0f64.powi(n as i32);
        let ratio = abs_det_ratio(&f2, &f1).unwrap();
        assert!((ratio - expected).abs() < 1e-10 * expected);
    }

    #[test]
    fn test_ratio_dimension_mismatch() {
        let f1 = Ldr::<f64>::identity(2);
        let f2 = Ldr::<f64>::identity(3);
        assert!(
            abs_det_ratio(&f2, &f1)
                == Err(LdrError::DimensionMismatch {
                    expected: 2,
                    nrows: 3,
                    ncols: 3,
                })
        );
    }
}
