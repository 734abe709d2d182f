//! Tables and traces consumed by the external visualization.

use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use serde::Serialize;
use serde_json::json;

use crate::config::OutputDir;
use crate::qs::QueueSystem;
use crate::timeline::{Stats, Timeline};
use crate::types::{Agent, Departure, Time};
use crate::utils::prelude::*;

#[derive(Debug, Serialize)]
struct AgentRow {
    agent: usize,
    arrival_queue: Option<f64>,
    arrival_service: Option<f64>,
    departure: Option<f64>,
    server: Option<usize>,
    sojourn: Option<f64>,
    waiting: Option<f64>,
    service: Option<f64>,
    blocked: bool,
    waited: bool,
}

impl AgentRow {
    fn new(agent: usize, row: &Agent) -> Self {
        Self {
            agent,
            arrival_queue: row.arrival_queue.map(|t| t.0),
            arrival_service: row.arrival_service.map(|t| t.0),
            departure: row.departure_time().map(|t| t.0),
            server: row.server,
            sojourn: row.summary.map(|s| s.sojourn.0),
            waiting: row.summary.map(|s| s.waiting.0),
            service: row.summary.map(|s| s.service.0),
            blocked: row.is_blocked(),
            waited: row.summary.map(|s| s.waited).unwrap_or(false),
        }
    }
}

#[derive(Debug, Serialize)]
struct TimelineRow {
    time: f64,
    in_system: usize,
    in_queue: usize,
    in_service: usize,
}

#[derive(Debug, Serialize)]
struct StatRow {
    metric: String,
    value: String,
}

/// One row per present agent
pub fn write_agents(writer: impl io::Write, agents: &[Agent]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for (id, agent) in agents.iter().enumerate().filter(|(_, a)| a.arrival_queue.is_some()) {
        wtr.serialize(AgentRow::new(id, agent))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_timeline(writer: impl io::Write, timeline: &Timeline) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for (t, c) in timeline.iter() {
        wtr.serialize(TimelineRow {
            time: t.0,
            in_system: c.in_system,
            in_queue: c.in_queue,
            in_service: c.in_service,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_stats(writer: impl io::Write, stats: &Stats) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for (metric, value) in stats.iter() {
        wtr.serialize(StatRow {
            metric: metric.to_string(),
            value: value.to_string(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Upper bound on the animation frames of one stage
pub const MAX_FRAMES: usize = 1_000_000;

/// Animation frames every `step`, from 0 to the last departure
pub fn write_frames(writer: impl io::Write, qs: &QueueSystem, step: f64) -> Result<()> {
    if !(step > 0.0) {
        return Err(Error::invalid_parameter("frame_step", "must be positive"));
    }
    let end = qs.max_departure().unwrap_or_default();
    let last = (end.0 / step).floor();
    if !(last < MAX_FRAMES as f64) {
        return Err(Error::invalid_parameter(
            "frame_step",
            format!("{} is too small for a run ending at {}, over {} frames", step, end, MAX_FRAMES),
        ));
    }
    let frames = last as usize + 1;

    let mut wtr = csv::Writer::from_writer(writer);
    for frame in 0..frames {
        wtr.serialize(qs.snapshot(Time(frame as f64 * step)))?;
    }
    wtr.flush()?;
    Ok(())
}

fn event_line(writer: impl io::Write, val: serde_json::Value) -> Result<()> {
    event_line_with_ending(writer, val, true)
}

fn event_line_with_ending(mut writer: impl io::Write, val: serde_json::Value, ending: bool) -> Result<()> {
    serde_json::to_writer(&mut writer, &val)?;
    if ending {
        writer.write_all(b",\n")?;
    }
    Ok(())
}

/// Chrome trace of a stage: queuing spans on pid 0, service spans per server on pid 1
pub fn write_chrome_trace(mut file: impl io::Write, qs: &QueueSystem, cfg: &impl Serialize) -> Result<()> {
    file.write_all(b"{\"traceEvents\":[\n")?;

    let mut blocked = 0;
    for (id, agent) in qs.agents().iter().enumerate() {
        let arrival = match agent.arrival_queue {
            Some(t) => t.0,
            None => continue,
        };
        match (agent.departure, agent.arrival_service) {
            (Some(Departure::Blocked), _) => {
                blocked += 1;
                event_line(
                    &mut file,
                    json!({
                        "name": format!("Agent {}", id),
                        "ph": "I",
                        "cat": "blocked",
                        "ts": arrival,
                        "tid": 0,
                        "pid": 0,
                        "args": { "agent": id }
                    }),
                )?;
                event_line(
                    &mut file,
                    json!({
                        "name": "Blocked Agents",
                        "ph": "C",
                        "cat": "blocked",
                        "ts": arrival,
                        "pid": 0,
                        "args": { "blocked": blocked }
                    }),
                )?;
            }
            (Some(Departure::Admitted(departure)), Some(start)) => {
                // queuing time
                event_line(
                    &mut file,
                    json!({
                        "name": format!("Agent {}", id),
                        "ph": "X",
                        "cat": "queuing",
                        "ts": arrival,
                        "dur": start.0 - arrival,
                        "tid": id,
                        "pid": 0,
                        "args": { "agent": id }
                    }),
                )?;
                // service on its server
                event_line(
                    &mut file,
                    json!({
                        "name": format!("Agent {}", id),
                        "ph": "X",
                        "cat": "service",
                        "ts": start.0,
                        "dur": (departure - start).0,
                        "tid": agent.server.unwrap_or_default(),
                        "pid": 1,
                        "args": { "agent": id }
                    }),
                )?;
            }
            _ => (),
        }
    }

    event_line(
        &mut file,
        json!({
            "name": "process_name",
            "ph": "M",
            "pid": 0,
            "args": { "name": format!("{} queue", qs.name()) }
        }),
    )?;
    event_line_with_ending(
        &mut file,
        json!({
            "name": "process_name",
            "ph": "M",
            "pid": 1,
            "args": { "name": format!("{} servers", qs.name()) }
        }),
        false,
    )?;
    file.write_all(b"\n],\"config\":")?;
    serde_json::to_writer(&mut file, cfg)?;
    file.write_all(b"\n}")?;
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    debug!(path = %path.display(), "writing");
    Ok(BufWriter::new(File::create(path)?))
}

/// Everything known about one stage, `<stage>_*.{csv,json}` under `dir`
pub fn render_stage(
    dir: &OutputDir,
    qs: &QueueSystem,
    timeline: &Timeline,
    stats: &Stats,
    frame_step: Option<f64>,
    cfg: &impl Serialize,
) -> Result<()> {
    let name = qs.name();
    write_agents(create(&dir.file(format!("{}_agents.csv", name))?)?, qs.agents())?;
    write_timeline(create(&dir.file(format!("{}_timeline.csv", name))?)?, timeline)?;
    write_stats(create(&dir.file(format!("{}_stats.csv", name))?)?, stats)?;
    if let Some(step) = frame_step {
        write_frames(create(&dir.file(format!("{}_frames.csv", name))?)?, qs, step)?;
    }
    write_chrome_trace(create(&dir.file(format!("{}_trace.json", name))?)?, qs, cfg)?;

    info!(
        stage = name,
        stats = %stats.iter().map(|(m, v)| format!("{}={:.4}", m, v)).join(", "),
        "summary"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qs::StageConfig;
    use crate::randvars::{RandomVariable, SharedRng};

    fn served_stage() -> QueueSystem {
        let rng = SharedRng::from_seed("output");
        let cfg = StageConfig::new(Some(RandomVariable::constant(1.0)), RandomVariable::constant(5.0), 1).with_capacity(0);
        let mut qs = QueueSystem::new("out", cfg, 3, &rng).unwrap();
        qs.pretreat().unwrap();
        qs.run().unwrap();
        qs.posttreat();
        qs
    }

    #[test]
    fn agents_table() {
        let qs = served_stage();
        let mut buf = vec![];
        write_agents(&mut buf, qs.agents()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("agent,arrival_queue,arrival_service,departure,server,sojourn,waiting,service,blocked,waited")
        );
        assert_eq!(lines.next(), Some("0,1.0,1.0,6.0,0,5.0,0.0,5.0,false,false"));
        assert_eq!(lines.next(), Some("1,2.0,,,,0.0,0.0,0.0,true,false"));
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn stats_table_spells_undefined() {
        let qs = served_stage();
        let (timeline, stats) = qs.timeline(2).unwrap();
        let mut buf = vec![];
        write_stats(&mut buf, &stats).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("metric,value\nmean_sojourn_time,5\n"));
        // a single admitted agent has no spread
        assert!(text.contains("sojourn_time_std_dev,undefined"));

        let mut buf = vec![];
        write_timeline(&mut buf, &timeline).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap().lines().count(), timeline.len() + 1);
    }

    #[test]
    fn frames_cover_the_run() {
        let qs = served_stage();
        let mut buf = vec![];
        write_frames(&mut buf, &qs, 0.5).unwrap();
        let text = String::from_utf8(buf).unwrap();
        // header + frames at 0, 0.5, ..., 6.0
        assert_eq!(text.lines().count(), 1 + 13);
        assert!(text.starts_with("time,in_queue,in_service,queue_capacity,servers\n"));
        assert!(write_frames(&mut Vec::<u8>::new(), &qs, 0.0).is_err());
        // 6.0 / 1e-12 frames would not fit
        assert!(write_frames(&mut Vec::<u8>::new(), &qs, 1e-12).is_err());
        assert!(write_frames(&mut Vec::<u8>::new(), &qs, f64::MIN_POSITIVE).is_err());
    }

    #[test]
    fn chrome_trace_is_json() {
        let qs = served_stage();
        let mut buf = vec![];
        write_chrome_trace(&mut buf, &qs, &json!({"size": 3})).unwrap();
        let trace: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        let events = trace["traceEvents"].as_array().unwrap();
        assert!(events.iter().any(|e| e["cat"] == "service"));
        assert_eq!(events.iter().filter(|e| e["cat"] == "blocked" && e["ph"] == "I").count(), 2);
        assert_eq!(trace["config"]["size"], 3);
    }
}
