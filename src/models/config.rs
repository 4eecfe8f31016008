//! Configuration models for nlsgen.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The user resolves these unknowns at runtime via config file.

use super::{EquationSpec, ProfilingInfo};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for nlsgen.
///
/// I^R resolved: All configurable parameters are explicit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data generation settings
    #[serde(default)]
    pub generation: DataGenOptions,

    /// Which component binding evaluates the equations
    #[serde(default)]
    pub component: ComponentConfig,

    /// Equations given inline
    #[serde(default)]
    pub equations: Vec<EquationSpec>,

    /// Profiling artifact (JSON) with more equations
    #[serde(default)]
    pub profiling: Option<PathBuf>,

    /// Output settings
    pub output: OutputConfig,
}

/// Settings for one data generation run.
///
/// K_i: `n`, `n_batches` and `n_threads` are positive once validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataGenOptions {
    /// Sampling method
    #[serde(default)]
    pub method: Method,

    /// Number of new data points to request
    #[serde(default = "default_n")]
    pub n: usize,

    /// Number of batches to divide `n` into
    #[serde(default = "default_parallelism")]
    pub n_batches: usize,

    /// Number of batches evaluated concurrently
    #[serde(default = "default_parallelism")]
    pub n_threads: usize,

    /// Append to an already existing dataset
    #[serde(default)]
    pub append: bool,

    /// Remove shard files and the merge log after a successful merge
    #[serde(default = "default_true")]
    pub clean: bool,

    /// Extra attempts per slot after a failed evaluation
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seed for the run; drawn from the OS when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_n() -> usize {
    1000
}

fn default_parallelism() -> usize {
    available_parallelism()
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

impl Default for DataGenOptions {
    fn default() -> Self {
        Self {
            method: Method::default(),
            n: default_n(),
            n_batches: default_parallelism(),
            n_threads: default_parallelism(),
            append: false,
            clean: true,
            max_retries: default_max_retries(),
            seed: None,
        }
    }
}

/// Method used to produce candidate inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Method {
    /// Independent uniform draws within the bounds
    #[default]
    Random,
    /// Brownian-like walk that stays on one solution branch
    RandomWalk {
        /// Maximum absolute step per input
        delta: f64,
        /// Shape of the step distribution
        #[serde(default)]
        step: StepDistribution,
    },
}

impl Method {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::RandomWalk { .. } => "random_walk",
        }
    }
}

/// Distribution of a single random-walk step.
///
/// K_i: Either way a step never exceeds `delta` in magnitude.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepDistribution {
    /// Uniform on `[-delta, delta]`
    #[default]
    Uniform,
    /// Normal with σ = delta/3, truncated to `[-delta, delta]`
    Gaussian,
}

/// Component binding selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Name registered in the `ComponentRegistry`
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    "simple_loop".to_string()
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for datasets
    pub dir: PathBuf,

    /// Directory for shards and merge logs (default: `<dir>/shards`)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Show a progress bar
    #[serde(default = "default_true")]
    pub progress: bool,
}

impl OutputConfig {
    /// Output configuration writing everything under `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            work_dir: None,
            progress: true,
        }
    }

    /// Dataset file for an equation.
    pub fn dataset_path(&self, equation: &EquationSpec) -> PathBuf {
        match &equation.file {
            Some(file) => self.dir.join(file),
            None => self.dir.join(format!("eq_{}.csv", equation.id)),
        }
    }

    /// Shard directory for an equation.
    pub fn work_dir_for(&self, equation: &EquationSpec) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| self.dir.join("shards"))
            .join(format!("eq_{}", equation.id))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Collect inline equations and those of the profiling artifact.
    ///
    /// B_i(profiling file readable) → Result
    pub fn resolve_equations(&self) -> Result<Vec<EquationSpec>, ConfigError> {
        let mut equations = self.equations.clone();

        if let Some(path) = &self.profiling {
            let infos = ProfilingInfo::load_all(path)?;
            equations.extend(infos.into_iter().map(EquationSpec::from));
        }

        if equations.is_empty() {
            return Err(ConfigError::NoEquations);
        }
        for equation in &equations {
            equation.validate()?;
        }
        Ok(equations)
    }

    /// Validate everything that can be checked without touching a component.
    pub fn validate(&self) -> Result<Vec<EquationSpec>, ConfigError> {
        self.generation.validate()?;
        self.resolve_equations()
    }
}

impl DataGenOptions {
    /// Fail fast on options no worker could honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n == 0 {
            return Err(ConfigError::NonPositive("n"));
        }
        if self.n_batches == 0 {
            return Err(ConfigError::NonPositive("n_batches"));
        }
        if self.n_threads == 0 {
            return Err(ConfigError::NonPositive("n_threads"));
        }
        if let Method::RandomWalk { delta, .. } = self.method {
            if !(delta.is_finite() && delta > 0.0) {
                return Err(ConfigError::InvalidDelta(delta));
            }
        }
        Ok(())
    }

    /// Number of batches allowed to run at the same time.
    ///
    /// Never more than there are batches, never more than the machine offers.
    pub fn effective_threads(&self) -> usize {
        self.n_threads
            .min(self.n_batches)
            .min(available_parallelism())
            .max(1)
    }
}

/// Parallelism the machine reports, at least 1.
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error
/// - I^B materialized: Values no run could honor
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to read profiling file {path}: {source}")]
    ProfilingRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse profiling file {path}: {source}")]
    ProfilingParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid bound for '{name}': min {min} > max {max} or not finite")]
    InvalidBound { name: String, min: f64, max: f64 },

    #[error("Option '{0}' must be positive")]
    NonPositive(&'static str),

    #[error("Random walk needs a finite delta > 0, got {0}")]
    InvalidDelta(f64),

    #[error("Equation {equation_id} has no {kind} variables")]
    NoVariables {
        equation_id: u64,
        kind: &'static str,
    },

    #[error("Equation {equation_id} lists variable '{name}' more than once")]
    DuplicateVariable { equation_id: u64, name: String },

    #[error("Profiling info for equation {equation_id} has {names} variables but {bounds} bounds")]
    BoundCountMismatch {
        equation_id: u64,
        names: usize,
        bounds: usize,
    },

    #[error("No equations configured (add [[equations]] or set `profiling`)")]
    NoEquations,

    #[error("Unknown component model: '{0}'")]
    UnknownModel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[output]
dir = "out"

[[equations]]
id = 14
inputs = [{ name = "s", min = 0.0, max = 0.95 }, { name = "r", min = 1.5, max = 3.15 }]
outputs = ["y"]
"#;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.generation.method, Method::Random);
        assert_eq!(config.generation.n, 1000);
        assert_eq!(config.generation.max_retries, 3);
        assert!(config.generation.clean);
        assert!(!config.generation.append);
        assert_eq!(config.component.model, "simple_loop");

        let equations = config.validate().unwrap();
        assert_eq!(equations.len(), 1);
        assert_eq!(
            config.output.dataset_path(&equations[0]),
            PathBuf::from("out/eq_14.csv")
        );
        assert_eq!(
            config.output.work_dir_for(&equations[0]),
            PathBuf::from("out/shards/eq_14")
        );
    }

    #[test]
    fn test_random_walk_method_parses() {
        let toml_str = format!(
            "[generation]\nmethod = {{ kind = \"random_walk\", delta = 0.05, step = \"gaussian\" }}\nn = 5\n{MINIMAL}"
        );
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            config.generation.method,
            Method::RandomWalk {
                delta: 0.05,
                step: StepDistribution::Gaussian
            }
        );
    }

    #[test]
    fn test_random_walk_without_delta_is_rejected() {
        let toml_str = format!("[generation]\nmethod = {{ kind = \"random_walk\" }}\n{MINIMAL}");
        assert!(toml::from_str::<Config>(&toml_str).is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_counts() {
        let mut options = DataGenOptions::default();
        options.n = 0;
        assert!(matches!(options.validate(), Err(ConfigError::NonPositive("n"))));

        let mut options = DataGenOptions::default();
        options.n_batches = 0;
        assert!(matches!(
            options.validate(),
            Err(ConfigError::NonPositive("n_batches"))
        ));

        let mut options = DataGenOptions::default();
        options.n_threads = 0;
        assert!(matches!(
            options.validate(),
            Err(ConfigError::NonPositive("n_threads"))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_delta() {
        for delta in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            let options = DataGenOptions {
                method: Method::RandomWalk {
                    delta,
                    step: StepDistribution::Uniform,
                },
                ..Default::default()
            };
            assert!(matches!(options.validate(), Err(ConfigError::InvalidDelta(_))));
        }
    }

    #[test]
    fn test_effective_threads_never_exceeds_batches() {
        let options = DataGenOptions {
            n_batches: 1,
            n_threads: 8,
            ..Default::default()
        };
        assert_eq!(options.effective_threads(), 1);
    }

    #[test]
    fn test_no_equations_is_an_error() {
        let config: Config = toml::from_str("[output]\ndir = \"out\"\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoEquations)));
    }
}
