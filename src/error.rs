use thiserror::Error;

/// Result type alias used by the fallible operations of this crate.
pub type Result<T> = core::result::Result<T, LdrError>;

/// Errors that can occur when operating on LDR factorizations.
///
/// Numerical degeneracy is not an error: a singular input shows up as near-zero pseudo-eigenvalues,
/// and non-finite values are propagated to the output.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LdrError {
    /// An operand or output does not conform to the dimension of the factorization.
    #[error("dimension mismatch: expected a {expected}×{expected} operand, found {nrows}×{ncols}")]
    DimensionMismatch {
        /// Dimension of the factorization.
        expected: usize,
        /// Number of rows of the offending operand.
        nrows: usize,
        /// Number of columns of the offending operand.
        ncols: usize,
    },

    /// The same factorization was passed for two operands that must be distinct.
    #[error("the same factorization was passed as two distinct operands")]
    AliasedOperands,
}

impl LdrError {
    #[inline]
    pub(crate) fn check_dim(expected: usize, nrows: usize, ncols: usize) -> Result<()> {
        if nrows == expected && ncols == expected {
            Ok(())
        } else {
            Err(LdrError::DimensionMismatch {
                expected,
                nrows,
                ncols,
            })
        }
    }
}
