//! Pre-defined scenarios on the nine-node reference network
//!
//! Each scenario runs the lockstep simulator and records every node's
//! routing table after each phase.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::sync::Arc;

use linkstate_core::{Algorithm, SimulationIdentity};
use linkstate_node::ProtocolConfig;
use linkstate_routing::RoutingTable;
use tracing::info;

use crate::error::SimulationResult;
use crate::lockstep::LockstepSimulation;
use crate::topology;

/// Step limit per phase
const MAX_STEPS: usize = 100_000;

/// Scenarios runnable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioName {
    /// All nodes start together and converge
    InitialConvergence,
    /// F-H fails, then comes back with cost 6
    LinkFailure,
}

/// Routing tables captured after one phase
#[derive(Debug, Clone)]
pub struct Phase {
    pub label: String,
    /// Messages delivered during the phase
    pub steps: usize,
    pub tables: BTreeMap<SimulationIdentity, Arc<RoutingTable<SimulationIdentity>>>,
}

/// Outcome of a scenario run
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: String,
    pub algorithm: Algorithm,
    pub phases: Vec<Phase>,
}

impl ScenarioReport {
    /// Tables after the named phase
    pub fn phase(&self, label: &str) -> Option<&Phase> {
        self.phases.iter().find(|phase| phase.label == label)
    }
}

impl Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ({}) ===", self.name, self.algorithm)?;
        for phase in &self.phases {
            writeln!(f)?;
            writeln!(f, "--- {} ({} messages) ---", phase.label, phase.steps)?;
            for table in phase.tables.values() {
                writeln!(f)?;
                write!(f, "{}", table)?;
            }
        }
        Ok(())
    }
}

fn capture(
    sim: &mut LockstepSimulation<SimulationIdentity>,
    label: &str,
) -> SimulationResult<Phase> {
    let steps = sim.run_until_quiet(MAX_STEPS)?;
    info!(phase = label, steps, converged = sim.is_converged(), "phase complete");
    Ok(Phase {
        label: label.to_string(),
        steps,
        tables: sim.tables(),
    })
}

/// Run a scenario by name
pub fn run(name: ScenarioName, config: ProtocolConfig) -> SimulationResult<ScenarioReport> {
    match name {
        ScenarioName::InitialConvergence => initial_convergence(config),
        ScenarioName::LinkFailure => link_failure_and_recovery(config),
    }
}

/// Every node of the reference network starts at once
pub fn initial_convergence(config: ProtocolConfig) -> SimulationResult<ScenarioReport> {
    info!("=== Running initial convergence scenario ===");
    let algorithm = config.algorithm;
    let mut sim = LockstepSimulation::new(topology::sample()?, config)?;

    sim.initialize();
    let converged = capture(&mut sim, "converged")?;

    Ok(ScenarioReport {
        name: "initial convergence".to_string(),
        algorithm,
        phases: vec![converged],
    })
}

/// F-H fails, leaving H isolated, then returns with cost 6
pub fn link_failure_and_recovery(config: ProtocolConfig) -> SimulationResult<ScenarioReport> {
    info!("=== Running link failure and recovery scenario ===");
    let algorithm = config.algorithm;
    let f = SimulationIdentity('F');
    let h = SimulationIdentity('H');
    let mut sim = LockstepSimulation::new(topology::sample()?, config)?;

    sim.initialize();
    let mut phases = vec![capture(&mut sim, "converged")?];

    sim.fail_link(&f, &h)?;
    phases.push(capture(&mut sim, "after F-H failure")?);

    sim.restore_link(&f, &h, 6.0)?;
    phases.push(capture(&mut sim, "after F-H recovery (cost 6)")?);

    Ok(ScenarioReport {
        name: "link failure and recovery".to_string(),
        algorithm,
        phases,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(c: char) -> SimulationIdentity {
        SimulationIdentity::new(c).unwrap()
    }

    #[test]
    fn test_initial_convergence_report() {
        let report = initial_convergence(ProtocolConfig::fast()).unwrap();
        let phase = report.phase("converged").unwrap();
        assert_eq!(phase.tables.len(), 9);
        assert!(phase.steps > 0);

        let rendered = report.to_string();
        assert!(rendered.contains("initial convergence (link-state)"));
        assert!(rendered.contains("Routing table for H"));
        assert!(rendered.contains("H -> F -> D -> I -> A"));
    }

    #[test]
    fn test_link_failure_phases() {
        let report = run(ScenarioName::LinkFailure, ProtocolConfig::fast()).unwrap();
        assert_eq!(report.phases.len(), 3);

        let h_cost = |label: &str| {
            report.phase(label).unwrap().tables[&id('H')]
                .get(&id('A'))
                .map(|route| route.total_cost.value())
        };
        assert_eq!(h_cost("converged"), Some(12.0));
        assert_eq!(h_cost("after F-H failure"), None);
        assert_eq!(h_cost("after F-H recovery (cost 6)"), Some(14.0));
    }

    #[test]
    fn test_distance_vector_scenario() {
        let config = ProtocolConfig::fast().with_algorithm(Algorithm::DistanceVector);
        let report = run(ScenarioName::LinkFailure, config).unwrap();
        assert_eq!(report.algorithm, Algorithm::DistanceVector);

        let recovered = report.phase("after F-H recovery (cost 6)").unwrap();
        let route = recovered.tables[&id('H')].get(&id('A')).unwrap();
        assert_eq!(route.total_cost.value(), 14.0);
    }
}
