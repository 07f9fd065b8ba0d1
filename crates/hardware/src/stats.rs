//! Simulation statistics collection and reporting.
//!
//! This module turns the counters recorded during a run into a report. It provides:
//! 1. **Energy tree:** [`EnergyReporter`] nodes mirroring the module hierarchy, each
//!    holding the sums of its own counter and its sub-modules.
//! 2. **Core counters:** [`CoreStats`] issue and stall cycles of every core.
//! 3. **Run summary:** [`Reporter`] latency, energy split and average power, printed
//!    as banner sections and serialisable to JSON.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::common::constants::NS_PER_MS;
use crate::core::energy::EnergyCounter;

/// Spaces of indentation per level of the energy table.
const ENERGY_REPORT_INDENT: usize = 4;

/// Width of the banner rule.
const BANNER_WIDTH: usize = 58;

/// Energy of one module and its sub-modules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyReporter {
    /// Static plus dynamic energy in pJ.
    pub total_energy_pj: f64,
    /// Leakage energy over the run in pJ.
    pub static_energy_pj: f64,
    /// Switching energy in pJ.
    pub dynamic_energy_pj: f64,
    /// Time the module was active in ns.
    pub activity_time_ns: f64,
    /// Sub-modules by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_modules: BTreeMap<String, EnergyReporter>,
}

impl EnergyReporter {
    /// Snapshots a counter over a run of `running_time_ns`.
    pub fn from_counter(counter: &EnergyCounter, running_time_ns: f64) -> Self {
        Self {
            total_energy_pj: counter.total_energy_pj(running_time_ns),
            static_energy_pj: counter.static_energy_pj(running_time_ns),
            dynamic_energy_pj: counter.dynamic_energy_pj(),
            activity_time_ns: counter.activity_time_ns(),
            sub_modules: BTreeMap::new(),
        }
    }

    /// Attaches `sub_module` under `name` and adds its values to this node.
    ///
    /// A second sub-module with the same name is merged into the first.
    pub fn add_sub_module(&mut self, name: impl Into<String>, sub_module: Self) {
        self.total_energy_pj += sub_module.total_energy_pj;
        self.static_energy_pj += sub_module.static_energy_pj;
        self.dynamic_energy_pj += sub_module.dynamic_energy_pj;
        self.activity_time_ns += sub_module.activity_time_ns;
        let name = name.into();
        match self.sub_modules.get_mut(&name) {
            Some(existing) => *existing += &sub_module,
            None => {
                let _ = self.sub_modules.insert(name, sub_module);
            }
        }
    }

    fn rows(&self, name: &str, all_energy: f64, latency_ns: f64, level: usize, out: &mut Vec<[String; 5]>) {
        let ratio = |value: f64, all: f64| if all == 0.0 { 0.0 } else { value / all * 100.0 };
        out.push([
            format!("{:indent$}{name}", "", indent = level * ENERGY_REPORT_INDENT),
            format!("{:.3}pJ ({:.2}%)", self.total_energy_pj, ratio(self.total_energy_pj, all_energy)),
            format!("{:.3}pJ ({:.2}%)", self.static_energy_pj, ratio(self.static_energy_pj, all_energy)),
            format!("{:.3}pJ ({:.2}%)", self.dynamic_energy_pj, ratio(self.dynamic_energy_pj, all_energy)),
            format!("{:.3}ns ({:.2}%)", self.activity_time_ns, ratio(self.activity_time_ns, latency_ns)),
        ]);
        for (sub_name, sub_module) in &self.sub_modules {
            sub_module.rows(sub_name, all_energy, latency_ns, level + 1, out);
        }
    }

    /// Renders the tree as an aligned table rooted at `name`.
    pub fn table(&self, name: &str, latency_ns: f64) -> String {
        let mut rows = vec![[
            "module".to_owned(),
            "total energy".to_owned(),
            "static energy".to_owned(),
            "dynamic energy".to_owned(),
            "activity time".to_owned(),
        ]];
        self.rows(name, self.total_energy_pj, latency_ns, 0, &mut rows);

        let mut widths = [0usize; 5];
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }
        let mut table = String::new();
        for row in &rows {
            for (cell, width) in row.iter().zip(widths) {
                let _ = write!(table, "    {cell:<width$}");
            }
            table.push('\n');
        }
        table
    }
}

impl AddAssign<&Self> for EnergyReporter {
    fn add_assign(&mut self, other: &Self) {
        self.total_energy_pj += other.total_energy_pj;
        self.static_energy_pj += other.static_energy_pj;
        self.dynamic_energy_pj += other.dynamic_energy_pj;
        self.activity_time_ns += other.activity_time_ns;
        for (name, sub_module) in &other.sub_modules {
            match self.sub_modules.get_mut(name) {
                Some(existing) => *existing += sub_module,
                None => {
                    let _ = self.sub_modules.insert(name.clone(), sub_module.clone());
                }
            }
        }
    }
}

/// Issue statistics of one core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreStats {
    /// Edges on which an instruction issued.
    pub issue_cycles: u64,
    /// Edges on which the pending instruction was held back.
    pub stall_cycles: u64,
    /// Instructions dispatched to execution units.
    pub dispatched_instructions: u64,
    /// Branches and jumps resolved by the core.
    pub control_instructions: u64,
}

/// Result of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reporter {
    /// Name of the root module.
    pub module_name: String,
    /// Simulated running time in ms.
    pub latency_ms: f64,
    /// Total energy in pJ.
    pub total_energy_pj: f64,
    /// Leakage energy in pJ.
    pub static_energy_pj: f64,
    /// Switching energy in pJ.
    pub dynamic_energy_pj: f64,
    /// Total energy over the running time in mW.
    #[serde(rename = "average_power_mW")]
    pub average_power_mw: f64,
    /// Per-core issue statistics, in core order.
    pub core_stats: Vec<CoreStats>,
    /// Energy tree.
    pub energy_reporter: EnergyReporter,
}

impl Reporter {
    /// Builds the summary of a run lasting `latency_ms`.
    pub fn new(
        module_name: impl Into<String>,
        latency_ms: f64,
        energy_reporter: EnergyReporter,
        core_stats: Vec<CoreStats>,
    ) -> Self {
        let average_power_mw = if latency_ms == 0.0 {
            0.0
        } else {
            energy_reporter.total_energy_pj / (latency_ms * NS_PER_MS)
        };
        Self {
            module_name: module_name.into(),
            latency_ms,
            total_energy_pj: energy_reporter.total_energy_pj,
            static_energy_pj: energy_reporter.static_energy_pj,
            dynamic_energy_pj: energy_reporter.dynamic_energy_pj,
            average_power_mw,
            core_stats,
            energy_reporter,
        }
    }

    /// Simulated running time in ns.
    pub fn latency_ns(&self) -> f64 {
        self.latency_ms * NS_PER_MS
    }

    /// Renders the report sections. An empty `sections` selects all of them.
    ///
    /// Valid sections are listed in [`REPORT_SECTIONS`].
    pub fn render_sections(&self, sections: &[String]) -> String {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let rule = "=".repeat(BANNER_WIDTH);
        let thin = "-".repeat(BANNER_WIDTH);
        let mut out = String::new();

        if want("summary") {
            let _ = writeln!(out, "\n{rule}");
            let _ = writeln!(out, "PIM ACCELERATOR SIMULATION RESULT");
            let _ = writeln!(out, "{rule}");
            let _ = writeln!(out, "latency                  {:.6} ms", self.latency_ms);
            let _ = writeln!(out, "average_power            {:.4} mW", self.average_power_mw);
            let _ = writeln!(out, "total_energy             {:.4} pJ", self.total_energy_pj);
            let _ = writeln!(out, "static_energy            {:.4} pJ", self.static_energy_pj);
            let _ = writeln!(out, "dynamic_energy           {:.4} pJ", self.dynamic_energy_pj);
            let _ = writeln!(out, "{thin}");
        }
        if want("core") {
            let _ = writeln!(out, "CORE ISSUE");
            for (id, stats) in self.core_stats.iter().enumerate() {
                let edges = (stats.issue_cycles + stats.stall_cycles).max(1);
                let _ = writeln!(
                    out,
                    "  core{id:<3} issue {:<10} stall {:<10} ({:.2}%) dispatched {:<8} control {}",
                    stats.issue_cycles,
                    stats.stall_cycles,
                    stats.stall_cycles as f64 / edges as f64 * 100.0,
                    stats.dispatched_instructions,
                    stats.control_instructions,
                );
            }
            let _ = writeln!(out, "{thin}");
        }
        if want("energy") {
            let _ = writeln!(out, "ENERGY BREAKDOWN");
            out.push_str(&self.energy_reporter.table(&self.module_name, self.latency_ns()));
        }
        let _ = writeln!(out, "{rule}");
        out
    }

    /// Prints the requested report sections to stdout.
    pub fn print_sections(&self, sections: &[String]) {
        print!("{}", self.render_sections(sections));
    }

    /// Prints every report section to stdout.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}

/// Section names accepted by [`Reporter::print_sections`].
pub const REPORT_SECTIONS: &[&str] = &["summary", "core", "energy"];
