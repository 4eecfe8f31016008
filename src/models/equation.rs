//! Equation descriptions handed over by the profiling step.
//!
//! K_i: An equation is identified by its id and owns an ordered list of
//! input (using) variables with bounds and output (iteration) variables.

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Bounds of one input variable.
///
/// K_i: `min <= max`, both finite with a finite width (checked by `validate`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableBound {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

impl VariableBound {
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
        }
    }

    /// Check the bound is usable for sampling.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let width = self.max - self.min;
        if self.min.is_finite() && self.max.is_finite() && width.is_finite() && width >= 0.0 {
            Ok(())
        } else {
            Err(ConfigError::InvalidBound {
                name: self.name.clone(),
                min: self.min,
                max: self.max,
            })
        }
    }

    /// Clamp a value into `[min, max]`.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    /// Whether `value` lies in `[min, max]` inclusive.
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

/// One non-linear equation to generate data for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquationSpec {
    /// Equation id understood by the component's evaluation interface
    pub id: u64,

    /// Input variables with their bounds, in column order
    pub inputs: Vec<VariableBound>,

    /// Output (iteration) variables, in column order
    pub outputs: Vec<String>,

    /// Dataset file name relative to the output dir (default: `eq_<id>.csv`)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl EquationSpec {
    pub fn new(id: u64, inputs: Vec<VariableBound>, outputs: Vec<String>) -> Self {
        Self {
            id,
            inputs,
            outputs,
            file: None,
        }
    }

    /// Dataset header: input names followed by output names.
    pub fn columns(&self) -> Vec<String> {
        self.inputs
            .iter()
            .map(|b| b.name.clone())
            .chain(self.outputs.iter().cloned())
            .collect()
    }

    /// Check bounds and variable lists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inputs.is_empty() {
            return Err(ConfigError::NoVariables {
                equation_id: self.id,
                kind: "input",
            });
        }
        if self.outputs.is_empty() {
            return Err(ConfigError::NoVariables {
                equation_id: self.id,
                kind: "output",
            });
        }
        for bound in &self.inputs {
            bound.validate()?;
        }

        let mut seen = HashSet::new();
        for name in self.columns() {
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateVariable {
                    equation_id: self.id,
                    name,
                });
            }
        }
        Ok(())
    }
}

/// Profiling artifact entry for a single non-linear equation system.
///
/// Mirrors the JSON the profiling step writes; only the fields data
/// generation needs are required.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilingInfo {
    pub eq_info: EqInfo,
    pub iteration_variables: Vec<String>,
    #[serde(default)]
    pub inner_equations: Vec<u64>,
    pub using_vars: Vec<String>,
    pub boundary: Boundary,
}

/// Timing information of the profiled equation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EqInfo {
    pub id: u64,
    #[serde(default)]
    pub ncall: u64,
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub max_time: f64,
    #[serde(default)]
    pub fraction: f64,
}

/// Minimum and maximum values of the using variables, index-aligned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Boundary {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl ProfilingInfo {
    /// Load all entries of a profiling JSON file.
    ///
    /// Accepts either a single object or an array of objects.
    pub fn load_all(path: &Path) -> Result<Vec<Self>, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ProfilingRead {
            path: path.to_owned(),
            source: e,
        })?;

        let parse_err = |e| ConfigError::ProfilingParse {
            path: path.to_owned(),
            source: e,
        };
        let value: serde_json::Value = serde_json::from_str(&content).map_err(parse_err)?;
        let infos: Vec<Self> = if value.is_array() {
            serde_json::from_value(value).map_err(parse_err)?
        } else {
            vec![serde_json::from_value(value).map_err(parse_err)?]
        };

        for info in &infos {
            info.check_boundary()?;
        }
        Ok(infos)
    }

    fn check_boundary(&self) -> Result<(), ConfigError> {
        let names = self.using_vars.len();
        for bounds in [self.boundary.min.len(), self.boundary.max.len()] {
            if bounds != names {
                return Err(ConfigError::BoundCountMismatch {
                    equation_id: self.eq_info.id,
                    names,
                    bounds,
                });
            }
        }
        Ok(())
    }
}

impl From<ProfilingInfo> for EquationSpec {
    fn from(info: ProfilingInfo) -> Self {
        let inputs = info
            .using_vars
            .into_iter()
            .zip(info.boundary.min)
            .zip(info.boundary.max)
            .map(|((name, min), max)| VariableBound { name, min, max })
            .collect();

        Self::new(info.eq_info.id, inputs, info.iteration_variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn simple_loop() -> EquationSpec {
        EquationSpec::new(
            14,
            vec![
                VariableBound::new("s", 0.0, 0.95),
                VariableBound::new("r", 1.5, 3.15),
            ],
            vec!["y".to_string()],
        )
    }

    #[test]
    fn test_columns_are_inputs_then_outputs() {
        assert_eq!(simple_loop().columns(), vec!["s", "r", "y"]);
    }

    #[test]
    fn test_inverted_bound_is_rejected() {
        let mut eq = simple_loop();
        eq.inputs[1] = VariableBound::new("r", 3.15, 1.5);
        assert!(matches!(
            eq.validate(),
            Err(ConfigError::InvalidBound { ref name, .. }) if name == "r"
        ));
    }

    #[test]
    fn test_bound_wider_than_f64_range_is_rejected() {
        let bound = VariableBound::new("s", -1e308, 1e308);
        assert!(matches!(
            bound.validate(),
            Err(ConfigError::InvalidBound { ref name, .. }) if name == "s"
        ));
        assert!(VariableBound::new("s", -1e307, 1e307).validate().is_ok());
    }

    #[test]
    fn test_degenerate_bound_is_allowed() {
        assert!(VariableBound::new("k", 2.0, 2.0).validate().is_ok());
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut eq = simple_loop();
        eq.outputs = vec!["s".to_string()];
        assert!(matches!(
            eq.validate(),
            Err(ConfigError::DuplicateVariable { .. })
        ));
    }

    #[test]
    fn test_profiling_file_loads_into_equations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profilingInfo.json");
        std::fs::write(
            &path,
            r#"[{
                "eqInfo": {"id": 14, "ncall": 2512, "time": 0.00059, "maxTime": 1.2e-5, "fraction": 0.15},
                "iterationVariables": ["y"],
                "innerEquations": [11],
                "usingVars": ["s", "r"],
                "boundary": {"min": [0.0, 1.5], "max": [0.95, 3.15]}
            }]"#,
        )
        .unwrap();

        let infos = ProfilingInfo::load_all(&path).unwrap();
        let eq = EquationSpec::from(infos.into_iter().next().unwrap());
        assert_eq!(eq.id, 14);
        assert_eq!(eq.columns(), vec!["s", "r", "y"]);
        assert_eq!(eq.inputs[1], VariableBound::new("r", 1.5, 3.15));
    }

    #[test]
    fn test_profiling_bound_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profilingInfo.json");
        std::fs::write(
            &path,
            r#"{"eqInfo": {"id": 3}, "iterationVariables": ["y"], "usingVars": ["s", "r"],
                "boundary": {"min": [0.0], "max": [1.0, 2.0]}}"#,
        )
        .unwrap();

        assert!(matches!(
            ProfilingInfo::load_all(&path),
            Err(ConfigError::BoundCountMismatch { equation_id: 3, .. })
        ));
    }
}
