#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use pendulum::Policy;
use rl::{mask_agreement, Experiment, ExperimentConfig};

const CONFIG_ENV: &str = "APPROX_PI_CONFIG";

fn load_config() -> Result<ExperimentConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => {
            tracing::info!("Loading experiment configuration from {:?}", path);
            ExperimentConfig::from_json_file(&path).with_context(|| format!("loading {path:?}"))
        }
        None => {
            tracing::info!("{CONFIG_ENV} not set, using the default configuration");
            Ok(ExperimentConfig::default())
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = load_config()?;
    tracing::info!(
        discount = config.discount,
        iterations = config.iterations,
        linear = config.use_linear_dynamics,
        saturate = config.saturate,
        "Building experiment"
    );
    let mut exp = Experiment::new(config)?;

    let baseline_roa = exp.roa(&exp.baseline)?;
    tracing::info!(
        "LQR baseline ROA covers {}/{} grid points ({:.1}%)",
        baseline_roa.size(),
        exp.grid.len(),
        100.0 * baseline_roa.fraction()
    );

    let history = exp.train()?;
    if let Some(last) = history.last() {
        tracing::info!(
            "Training finished after {} iterations: value loss {:.5}, policy loss {:.5}",
            history.len(),
            last.value_loss,
            last.policy_loss
        );
    }
    if !history.is_finite() {
        tracing::warn!("Training diverged; consider a smaller discount or learning rate");
    }

    let learned_roa = exp.roa(&exp.agent.policy)?;
    tracing::info!(
        "Learned policy ROA covers {}/{} grid points ({:.1}%), agreement with LQR {:.3}",
        learned_roa.size(),
        exp.grid.len(),
        100.0 * learned_roa.fraction(),
        mask_agreement(&learned_roa.mask, &baseline_roa.mask)?
    );

    let level = exp.implicit_roa(&learned_roa)?;
    let level_size = level.mask.iter().filter(|&&m| m).count();
    tracing::info!(
        "Value function level set V > {:.4} certifies {}/{} of the simulated ROA",
        level.threshold,
        level_size,
        learned_roa.size()
    );

    let learned = exp.rollout_values(&exp.agent.policy)?;
    let lqr = exp.rollout_values(&exp.baseline)?;
    let center = exp.grid.len() / 2;
    for i in [center, center + 1, center + exp.config.grid_points] {
        if i >= exp.grid.len() {
            continue;
        }
        let point = exp.grid.point(i);
        tracing::info!(
            "state {:?}: learned return {:.4}, LQR return {:.4}, learned action {:?}",
            point,
            learned[i],
            lqr[i],
            exp.agent.policy.action(&point)
        );
    }

    Ok(())
}
