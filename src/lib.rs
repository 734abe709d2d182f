use crate::config::{AppConfigExt, OutputDir};
use crate::qs::{QueueSystem, StageConfig};
use crate::randvars::{SharedRng, DEFAULT_SEED};
use crate::utils::prelude::*;
use crate::waterfall::Waterfall;

pub mod config;
pub mod output;
pub mod qs;
pub mod randvars;
pub mod servers;
pub mod timeline;
pub mod types;
pub mod utils;
pub mod waterfall;
pub mod wline;

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type")]
pub enum ModelConfig {
    /// One queue in front of a pool of servers
    Single { stage: StageConfig },
    /// Two stages in tandem
    Waterfall { first: StageConfig, second: StageConfig },
}

fn default_resolution() -> usize {
    2
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SimConfig {
    pub seed: Option<String>,
    /// number of agents
    pub size: usize,
    /// timeline samples per agent
    #[serde(default = "default_resolution")]
    pub resolution: usize,
    /// time between two animation frames, no frames when unset
    #[serde(default)]
    pub frame_step: Option<f64>,
    pub model: ModelConfig,
}

impl SimConfig {
    /// Fail before simulating anything
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::invalid_parameter("size", "run length must be positive"));
        }
        if self.resolution == 0 {
            return Err(Error::invalid_parameter("resolution", "must be positive"));
        }
        match &self.model {
            ModelConfig::Single { stage } => {
                if stage.arrival.is_none() {
                    return Err(Error::invalid_parameter("arrival", "a single stage needs an arrival distribution"));
                }
                stage.validate()
            }
            ModelConfig::Waterfall { first, second } => {
                first.validate()?;
                second.validate()
            }
        }
    }

    pub fn rng(&self) -> SharedRng {
        SharedRng::from_seed(self.seed.as_deref().unwrap_or(DEFAULT_SEED))
    }
}

/// Run the model described by `cfg`, writing all tables under `out`
pub fn simulate(cfg: &SimConfig, out: &OutputDir) -> Result<()> {
    cfg.validate()?;
    let rng = cfg.rng();

    match &cfg.model {
        ModelConfig::Single { stage } => {
            let mut qs = QueueSystem::new("stage", stage.clone(), cfg.size, &rng)?;
            {
                let _g = info_span!("simulate").entered();
                qs.pretreat()?;
                qs.run()?;
                qs.posttreat();
            }

            let _g = info_span!("output").entered();
            let (timeline, stats) = qs.timeline(cfg.resolution)?;
            output::render_stage(out, &qs, &timeline, &stats, cfg.frame_step, cfg)?;
        }
        ModelConfig::Waterfall { first, second } => {
            let mut wf = Waterfall::new(first.clone(), second.clone(), cfg.size, &rng)?;
            {
                let _g = info_span!("simulate").entered();
                wf.run()?;
                wf.posttreat_stages();
            }

            let _g = info_span!("output").entered();
            let timelines = wf.timeline(cfg.resolution)?;
            for (qs, stage) in wf.stages().iter().zip(timelines.stages.iter()) {
                output::render_stage(out, qs, &stage.timeline, &stage.stats, cfg.frame_step, cfg)?;
            }
            let file = std::fs::File::create(out.file("combined_timeline.csv")?)?;
            output::write_timeline(std::io::BufWriter::new(file), &timelines.combined)?;
        }
    }
    Ok(())
}

/// Entry point of `queuesim run`: read the global config and simulate
pub fn run_sim() -> Result<()> {
    let _g = info_span!("sim").entered();

    let (cfg, out): (SimConfig, OutputDir) = {
        let config = config();
        (config.fetch()?, config.output_dir()?)
    };
    info!(seed = ?cfg.seed, size = cfg.size, "loaded config");

    simulate(&cfg, &out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::randvars::RandomVariable;

    fn single() -> SimConfig {
        SimConfig {
            seed: Some("lib".into()),
            size: 20,
            resolution: 2,
            frame_step: Some(0.5),
            model: ModelConfig::Single {
                stage: StageConfig::new(Some(RandomVariable::exp(1.0)), RandomVariable::exp(1.5), 1),
            },
        }
    }

    fn scratch(name: &str) -> OutputDir {
        OutputDir::new(std::env::temp_dir().join(format!("queuesim-{}-{}", name, std::process::id())))
    }

    #[test]
    fn validate_config() {
        assert!(single().validate().is_ok());

        let mut cfg = single();
        cfg.size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = single();
        cfg.model = ModelConfig::Single {
            stage: StageConfig::new(None, RandomVariable::exp(1.5), 1),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn single_writes_tables() {
        let out = scratch("single");
        simulate(&single(), &out).unwrap();
        for file in &["stage_agents.csv", "stage_timeline.csv", "stage_stats.csv", "stage_frames.csv", "stage_trace.json"] {
            assert!(out.file(file).unwrap().exists(), "{} missing", file);
        }
    }

    #[test]
    fn waterfall_writes_combined() {
        let out = scratch("waterfall");
        let mut cfg = single();
        cfg.frame_step = None;
        cfg.model = ModelConfig::Waterfall {
            first: StageConfig::new(Some(RandomVariable::exp(1.0)), RandomVariable::exp(1.5), 1).with_capacity(2),
            second: StageConfig::new(None, RandomVariable::exp(2.0), 1),
        };
        simulate(&cfg, &out).unwrap();
        assert!(out.file("combined_timeline.csv").unwrap().exists());
        assert!(out.file("second_stats.csv").unwrap().exists());
        assert!(!out.file("first_frames.csv").unwrap().exists());
    }
}
