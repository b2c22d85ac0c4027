use crate::data::{Experiment, ExperimentKind};
use crate::modelfree::Nucleus;
use crate::RelaxError;

/// Builder for [Experiment]
///
/// The heteronucleus frequency follows from the 1H field and the observed nucleus
/// (15N by default) unless it is given explicitly with [ExperimentBuilder::field_x].
pub struct ExperimentBuilder {
    kind: ExperimentKind,
    residue: String,
    field_h: f64,
    field_x: Option<f64>,
    nucleus: Nucleus,
    temperature: f64,
    b1_field: Option<f64>,
    tex: Option<f64>,
    x: Vec<Vec<f64>>,
    y: Vec<f64>,
    err: Vec<Option<f64>>,
}

impl ExperimentBuilder {
    pub(crate) fn new(kind: ExperimentKind, residue: String) -> Self {
        ExperimentBuilder {
            kind,
            residue,
            field_h: 0.0,
            field_x: None,
            nucleus: Nucleus::N,
            temperature: 298.0,
            b1_field: None,
            tex: None,
            x: Vec::new(),
            y: Vec::new(),
            err: Vec::new(),
        }
    }

    /// 1H spectrometer frequency in MHz
    pub fn field(mut self, field_h: f64) -> Self {
        self.field_h = field_h;
        self
    }

    /// Frequency of the observed heteronucleus in MHz
    pub fn field_x(mut self, field_x: f64) -> Self {
        self.field_x = Some(field_x);
        self
    }

    /// The observed heteronucleus, used to derive the X frequency
    pub fn nucleus(mut self, nucleus: Nucleus) -> Self {
        self.nucleus = nucleus;
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn b1_field(mut self, b1_field: f64) -> Self {
        self.b1_field = Some(b1_field);
        self
    }

    pub fn tex(mut self, tex: f64) -> Self {
        self.tex = Some(tex);
        self
    }

    pub fn point(mut self, x: Vec<f64>, y: f64, err: Option<f64>) -> Self {
        self.x.push(x);
        self.y.push(y);
        self.err.push(err);
        self
    }

    /// Add several points sharing one-dimensional independent values
    pub fn points(mut self, x: &[f64], y: &[f64], err: Option<&[f64]>) -> Self {
        for (i, (&xi, &yi)) in x.iter().zip(y.iter()).enumerate() {
            let ei = err.and_then(|err| err.get(i).copied());
            self = self.point(vec![xi], yi, ei);
        }
        self
    }

    pub fn build(self) -> Result<Experiment, RelaxError> {
        if self.y.is_empty() {
            return Err(RelaxError::NoData {
                residue: self.residue,
            });
        }
        if self.kind != ExperimentKind::Noe && self.x.iter().any(|x| x.is_empty()) {
            return Err(RelaxError::Config(format!(
                "{} experiment for residue {} has a point without independent variables",
                self.kind, self.residue
            )));
        }
        let needs_field = matches!(
            self.kind,
            ExperimentKind::Cpmg | ExperimentKind::Cest | ExperimentKind::R1rho
        );
        if needs_field && self.field_h <= 0.0 && self.field_x.is_none() {
            return Err(RelaxError::Config(format!(
                "{} experiment for residue {} needs a spectrometer field",
                self.kind, self.residue
            )));
        }

        let n_err = self.err.iter().filter(|e| e.is_some()).count();
        let err = if n_err == 0 {
            None
        } else if n_err == self.err.len() {
            let err: Vec<f64> = self.err.into_iter().flatten().collect();
            if err.iter().any(|e| !(*e > 0.0)) {
                return Err(RelaxError::Config(format!(
                    "uncertainties for residue {} must be positive",
                    self.residue
                )));
            }
            Some(err)
        } else {
            return Err(RelaxError::Config(format!(
                "residue {} mixes points with and without uncertainties",
                self.residue
            )));
        };

        let field_x = self
            .field_x
            .unwrap_or_else(|| self.field_h * self.nucleus.frequency_ratio());

        Ok(Experiment {
            kind: self.kind,
            residue: self.residue,
            field_h: self.field_h,
            field_x,
            temperature: self.temperature,
            b1_field: self.b1_field,
            tex: self.tex,
            x: self.x,
            y: self.y,
            err,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_derives_nitrogen_field() {
        let experiment = Experiment::builder(ExperimentKind::Cpmg, "5")
            .field(600.0)
            .points(&[100.0, 200.0], &[15.0, 14.0], None)
            .build()
            .unwrap();
        assert!((experiment.field_x() - 60.8).abs() < 0.1);
    }

    #[test]
    fn test_builder_rejects_empty() {
        let result = Experiment::builder(ExperimentKind::Exp, "5").build();
        assert!(matches!(result, Err(RelaxError::NoData { .. })));
    }

    #[test]
    fn test_builder_rejects_mixed_uncertainties() {
        let result = Experiment::builder(ExperimentKind::Exp, "5")
            .point(vec![0.0], 1.0, Some(0.1))
            .point(vec![0.1], 0.8, None)
            .build();
        assert!(matches!(result, Err(RelaxError::Config(_))));
    }

    #[test]
    fn test_cpmg_requires_field() {
        let result = Experiment::builder(ExperimentKind::Cpmg, "5")
            .point(vec![100.0], 12.0, None)
            .build();
        assert!(result.is_err());
    }
}
