//! Spectral density mapping of deuterium relaxation
//!
//! The four deuterium rates (R1, R1rho, RQ, Rap) are linear in the spectral density at
//! `0`, `wD` and `2 wD`. Rates measured at several fields share `J(0)`, and a field at
//! twice another shares its `J(2 wD)` with the `J(wD)` of the higher field, so all fields
//! are solved together as one weighted linear least-squares problem.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::relax::QCC2;
use super::ModelFreeError;

/// Coefficients of `[J(0), J(wD), J(2 wD)]` in R1, R1rho, RQ and Rap, in units of `3 QCC^2`
const ELEMENTS: [[f64; 3]; 4] = [
    [0.0, 1.0, 4.0],
    [1.5, 2.5, 1.0],
    [0.0, 3.0, 0.0],
    [1.5, 0.5, 1.0],
];

/// Relative tolerance for treating two frequencies as the same column
const FIELD_TOLERANCE: f64 = 0.01;

const SCALE: f64 = 3.0 * QCC2;

/// Result of a joint mapping over several fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointMapping {
    /// Frequency of each fitted spectral density value, the first is always zero
    pub fit_fields: Vec<f64>,
    pub j_values: Vec<f64>,
    pub j_errors: Vec<f64>,
    /// For each input field, the frequencies `[0, w, 2 w]` of its three values
    pub field_fields: Vec<[f64; 3]>,
    pub field_values: Vec<[f64; 3]>,
    pub field_errors: Vec<[f64; 3]>,
    pub weights: Vec<f64>,
}

impl JointMapping {
    /// Spectral density triple of input field `index`, ready for the deuterium rate
    /// expressions of [super::RelaxEquations]
    pub fn field_j(&self, index: usize) -> Option<[f64; 3]> {
        self.field_values.get(index).copied()
    }
}

struct LeastSquares {
    coefficients: Vec<f64>,
    errors: Vec<f64>,
}

/// Ordinary least squares without intercept through the normal equations
fn solve(design: &DMatrix<f64>, values: &DVector<f64>) -> Result<LeastSquares, ModelFreeError> {
    let (n, p) = design.shape();
    let xtx = design.transpose() * design;
    let inverse = xtx.try_inverse().ok_or(ModelFreeError::SingularDesign)?;
    let beta = &inverse * design.transpose() * values;
    if beta.iter().any(|b| !b.is_finite()) {
        return Err(ModelFreeError::SingularDesign);
    }
    let residuals = values - design * &beta;
    let dof = n.saturating_sub(p).max(1);
    let variance = residuals.norm_squared() / dof as f64;
    let errors = (0..p)
        .map(|i| (variance * inverse[(i, i)]).max(0.0).sqrt())
        .collect();
    Ok(LeastSquares {
        coefficients: beta.iter().copied().collect(),
        errors,
    })
}

/// Map one field's four rates onto `[J(0), J(wD), J(2 wD)]`
///
/// Values are returned as `log10` of the spectral density in ns/rad.
pub fn independent_mapping(
    r1: f64,
    r1rho: f64,
    rq: f64,
    rap: f64,
) -> Result<[f64; 3], ModelFreeError> {
    let design = DMatrix::from_fn(4, 3, |row, col| ELEMENTS[row][col]);
    let values = DVector::from_vec(vec![r1, r1rho, rq, rap]);
    let fit = solve(&design, &values)?;
    let mut result = [0.0; 3];
    for (out, j) in result.iter_mut().zip(fit.coefficients.iter()) {
        *out = (j / SCALE * 1.0e9).log10();
    }
    Ok(result)
}

fn same_field(a: f64, b: f64) -> bool {
    b != 0.0 && ((a - b) / b).abs() < FIELD_TOLERANCE
}

/// Jointly map deuterium rates measured at several fields
///
/// # Arguments
///
/// * `rates` - Four rates (R1, R1rho, RQ, Rap) per field, fields in the order of `fields`
/// * `errors` - Uncertainty of each rate, used as `1/err` row weights
/// * `fields` - The deuterium frequency of each field
pub fn joint_mapping(
    rates: &[f64],
    errors: &[f64],
    fields: &[f64],
) -> Result<JointMapping, ModelFreeError> {
    if rates.is_empty() {
        return Err(ModelFreeError::NoData);
    }
    if rates.len() % 4 != 0 {
        return Err(ModelFreeError::IncompleteRateSet(rates.len()));
    }
    if errors.len() != rates.len() {
        return Err(ModelFreeError::LengthMismatch {
            expected: rates.len(),
            found: errors.len(),
        });
    }
    let n_fields = rates.len() / 4;
    if fields.len() != n_fields {
        return Err(ModelFreeError::LengthMismatch {
            expected: n_fields,
            found: fields.len(),
        });
    }
    if let Some(bad) = errors.iter().find(|e| !(e.is_finite() && **e > 0.0)) {
        return Err(ModelFreeError::InvalidUncertainty(*bad));
    }

    // Column 0 is J(0); every other column is one distinct frequency
    let mut columns = vec![0.0];
    let mut single = Vec::with_capacity(n_fields);
    let mut double = Vec::with_capacity(n_fields);
    for &field in fields {
        let single_match = columns.iter().rposition(|c| same_field(field, *c));
        let double_match = columns.iter().rposition(|c| same_field(2.0 * field, *c));
        single.push(single_match.unwrap_or_else(|| {
            columns.push(field);
            columns.len() - 1
        }));
        double.push(double_match.unwrap_or_else(|| {
            columns.push(2.0 * field);
            columns.len() - 1
        }));
    }

    let n_rows = rates.len();
    let mut design = DMatrix::<f64>::zeros(n_rows, columns.len());
    for i_field in 0..n_fields {
        for (i_type, coefficients) in ELEMENTS.iter().enumerate() {
            let row = i_field * 4 + i_type;
            design[(row, 0)] = coefficients[0];
            design[(row, single[i_field])] += coefficients[1];
            design[(row, double[i_field])] += coefficients[2];
        }
    }
    let mut values = DVector::from_column_slice(rates);
    for (row, err) in errors.iter().enumerate() {
        let weight = 1.0 / err;
        design.row_mut(row).scale_mut(weight);
        values[row] *= weight;
    }

    let fit = solve(&design, &values)?;
    let j_values: Vec<f64> = fit.coefficients.iter().map(|x| x / SCALE).collect();
    let j_errors: Vec<f64> = fit.errors.iter().map(|x| x / SCALE).collect();

    let pick = |values: &[f64], i_field: usize| {
        [
            values[0],
            values[single[i_field]],
            values[double[i_field]],
        ]
    };
    let field_fields = (0..n_fields).map(|i| pick(&columns, i)).collect();
    let field_values = (0..n_fields).map(|i| pick(&j_values, i)).collect();
    let field_errors = (0..n_fields).map(|i| pick(&j_errors, i)).collect();

    tracing::debug!(
        fields = n_fields,
        columns = columns.len(),
        "Deuterium joint mapping solved"
    );

    Ok(JointMapping {
        weights: vec![1.0; columns.len()],
        fit_fields: columns,
        j_values,
        j_errors,
        field_fields,
        field_values,
        field_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_independent_mapping_least_squares() {
        let s = SCALE;
        let j = independent_mapping(3.0 * s, 9.0 * s, 3.0 * s, 1.0 * s).unwrap();
        let expected: [f64; 3] = [17.0 / 11.0, 17.0 / 11.0, 4.0 / 11.0];
        for (value, x) in j.iter().zip(expected.iter()) {
            assert_relative_eq!(*value, (x * 1.0e9).log10(), max_relative = 1e-10);
        }
    }

    #[test]
    fn test_joint_mapping_columns() {
        // 400 and 800 MHz share the 800 MHz column
        let rates = vec![10.0; 8];
        let errors = vec![0.5; 8];
        let result = joint_mapping(&rates, &errors, &[4.0e8, 8.0e8]).unwrap();
        assert_eq!(result.fit_fields, vec![0.0, 4.0e8, 8.0e8, 1.6e9]);
        assert_eq!(result.field_fields[1], [0.0, 8.0e8, 1.6e9]);
        assert_eq!(result.weights.len(), 4);
    }

    #[test]
    fn test_joint_mapping_validates_input() {
        assert_eq!(
            joint_mapping(&[1.0; 6], &[1.0; 6], &[4.0e8]),
            Err(ModelFreeError::IncompleteRateSet(6))
        );
        assert_eq!(
            joint_mapping(&[1.0; 4], &[1.0; 3], &[4.0e8]),
            Err(ModelFreeError::LengthMismatch {
                expected: 4,
                found: 3
            })
        );
        assert_eq!(
            joint_mapping(&[1.0; 4], &[1.0, 0.0, 1.0, 1.0], &[4.0e8]),
            Err(ModelFreeError::InvalidUncertainty(0.0))
        );
        assert_eq!(joint_mapping(&[], &[], &[]), Err(ModelFreeError::NoData));
    }
}
