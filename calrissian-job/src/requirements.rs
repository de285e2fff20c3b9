//! Resource limits derived from the `ResourceRequirement` of a CWL document
//!
//! Every `Workflow` in the document contributes its own requirement and the
//! requirement of each step's `run` process. Steps that scatter count twice.
//! The largest value seen wins.

use serde_json::Value;
use tracing::debug;

const RESOURCE_REQUIREMENT: &str = "ResourceRequirement";

const DIMENSIONS: [(&str, &str); 4] = [
    ("coresMin", "coresMax"),
    ("ramMin", "ramMax"),
    ("tmpdirMin", "tmpdirMax"),
    ("outdirMin", "outdirMax"),
];

/// Values collected per CWL resource dimension, RAM and disk sizes in MiB
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceRequirements {
    pub cores: Vec<f64>,
    pub ram: Vec<f64>,
    pub tmpdir: Vec<f64>,
    pub outdir: Vec<f64>,
}

impl ResourceRequirements {
    pub fn evaluate(cwl: &Value) -> Self {
        let processes: Vec<&Value> = match cwl.get("$graph").and_then(Value::as_array) {
            Some(graph) => graph.iter().collect(),
            None => vec![cwl],
        };

        let mut requirements = Self::default();
        for workflow in processes.iter().filter(|p| class_of(p) == Some("Workflow")) {
            if let Some(requirement) = resource_requirement(workflow) {
                requirements.collect(requirement, 1.0);
            }

            for step in steps(workflow) {
                let Some(run) = resolve_run(step, &processes) else {
                    debug!("Skipping step without a resolvable run: {}", step);
                    continue;
                };
                if let Some(requirement) = resource_requirement(run) {
                    let multiplier = if step.get("scatter").is_some() { 2.0 } else { 1.0 };
                    requirements.collect(requirement, multiplier);
                }
            }
        }
        requirements
    }

    fn collect(&mut self, requirement: &Value, multiplier: f64) {
        let targets = [&mut self.cores, &mut self.ram, &mut self.tmpdir, &mut self.outdir];
        for ((min, max), target) in DIMENSIONS.iter().zip(targets) {
            for field in [min, max] {
                // Expressions are not evaluated
                if let Some(value) = requirement
                    .get(*field)
                    .and_then(Value::as_f64)
                    .filter(|value| *value > 0.0)
                {
                    target.push(value * multiplier);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
            && self.ram.is_empty()
            && self.tmpdir.is_empty()
            && self.outdir.is_empty()
    }

    /// Largest core count requested anywhere
    pub fn max_cores(&self) -> Option<u32> {
        largest(&self.cores).map(|cores| cores.ceil() as u32)
    }

    /// Largest RAM requested anywhere, as a quantity in MiB
    pub fn max_ram(&self) -> Option<String> {
        largest(&self.ram).map(|ram| format!("{}Mi", ram.ceil() as u64))
    }

    /// Room for the largest tmpdir plus the largest outdir
    pub fn volume_size(&self) -> Option<String> {
        let tmpdir = largest(&self.tmpdir).unwrap_or(0.0);
        let outdir = largest(&self.outdir).unwrap_or(0.0);
        let total = (tmpdir + outdir).ceil() as u64;
        (total > 0).then(|| format!("{}Mi", total))
    }
}

fn largest(values: &[f64]) -> Option<f64> {
    values.iter().copied().fold(None, |max, value| match max {
        Some(max) if max >= value => Some(max),
        _ => Some(value),
    })
}

fn class_of(process: &Value) -> Option<&str> {
    process.get("class").and_then(Value::as_str)
}

/// Steps in either list form or map-by-id form
fn steps(workflow: &Value) -> Vec<&Value> {
    match workflow.get("steps") {
        Some(Value::Array(steps)) => steps.iter().collect(),
        Some(Value::Object(steps)) => steps.values().collect(),
        _ => Vec::new(),
    }
}

/// The process a step runs: inline, or a `#id` reference into the graph
fn resolve_run<'a>(step: &'a Value, processes: &[&'a Value]) -> Option<&'a Value> {
    match step.get("run")? {
        Value::String(reference) => {
            let id = reference.strip_prefix('#').unwrap_or(reference);
            processes.iter().copied().find(|process| {
                process
                    .get("id")
                    .and_then(Value::as_str)
                    .map(|pid| pid.rsplit('#').next() == Some(id))
                    .unwrap_or(false)
            })
        }
        inline @ Value::Object(_) => Some(inline),
        _ => None,
    }
}

/// The single `ResourceRequirement` among requirements, else among hints
fn resource_requirement(process: &Value) -> Option<&Value> {
    ["requirements", "hints"]
        .into_iter()
        .find_map(|section| match process.get(section) {
            Some(Value::Array(entries)) => single(
                entries
                    .iter()
                    .filter(|entry| class_of(entry) == Some(RESOURCE_REQUIREMENT)),
            ),
            Some(Value::Object(entries)) => entries.get(RESOURCE_REQUIREMENT),
            _ => None,
        })
}

fn single<'a>(mut matches: impl Iterator<Item = &'a Value>) -> Option<&'a Value> {
    let first = matches.next()?;
    matches.next().is_none().then_some(first)
}
