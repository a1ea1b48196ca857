use crate::deployment::DeploymentParams;
use crate::tree::CompilerTree;
use crate::unit::ExecutableUnit;

/// Strategy producing deployment parameters for a compiled unit.
///
/// Implementations see both the unit and its compiler tree, so they can
/// size a function by the work it actually does.
pub trait ResourceEstimator: Send + Sync {
  fn estimate(&self, unit: &ExecutableUnit, tree: &CompilerTree) -> DeploymentParams;
}

/// Returns the same parameters for every unit.
#[derive(Debug, Clone, Default)]
pub struct FixedEstimator {
  params: DeploymentParams,
}

impl FixedEstimator {
  pub fn new(params: DeploymentParams) -> Self {
    Self { params }
  }
}

impl ResourceEstimator for FixedEstimator {
  fn estimate(&self, _unit: &ExecutableUnit, _tree: &CompilerTree) -> DeploymentParams {
    self.params.clone()
  }
}
