use std::fs;
use std::path::PathBuf;

use pimsim_core::Simulator;
use pimsim_core::common::SimError;
use pimsim_core::config::SimMode;
use pimsim_core::sim::loader;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const CONFIG: &str = r#"{
    "chip_config": {
        "core_cnt": 2,
        "core_config": {
            "local_memory_unit_config": {
                "local_memory_list": [
                    {
                        "name": "input",
                        "addressing": {"offset_byte": 0, "size_byte": 512},
                        "type": "ram",
                        "hardware_config": {"size_byte": 512, "width_byte": 16}
                    }
                ]
            }
        }
    },
    "sim_config": {"period_ns": 2.0, "sim_mode": "run_one_round", "data_mode": "real_data"}
}"#;

const PROGRAM: &str = r#"[
    {"class": 2, "type": 3, "opcode": 0, "rd": 1, "imm": 40},
    {"class": 2, "type": 1, "opcode": 0, "rd": 2, "rs1": 1, "imm": 2},
    {"class": 2, "type": 2, "opcode": 1, "rs1": 0, "rs2": 2, "offset": 16},
    {"class": 2, "type": 2, "opcode": 0, "rs1": 0, "rs2": 3, "offset": 16}
]"#;

fn write(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_runs_from_json_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(&dir, "config.json", CONFIG);
    let core0 = write(&dir, "core0.json", PROGRAM);
    let core1 = write(&dir, "core1.json", "[]");

    let simulator = Simulator::from_files(&config, &[core0, core1]).unwrap();
    let reporter = simulator.run().unwrap();

    let regs = simulator.chip().cores()[0].reg().general_registers();
    assert_eq!(&regs[1..4], &[40, 42, 42]);
    assert_eq!(reporter.core_stats.len(), 2);
    assert!((reporter.latency_ns() - 4.0 * 2.0).abs() < 1e-9);
}

#[test]
fn test_config_file_fields_survive_loading() {
    let dir = tempfile::tempdir().unwrap();
    let config = loader::load_config(write(&dir, "config.json", CONFIG)).unwrap();

    assert_eq!(config.chip_config.core_cnt, 2);
    assert_eq!(config.sim_config.sim_mode, SimMode::RunOneRound);
    let banks = &config.chip_config.core_config.local_memory_unit_config.local_memory_list;
    assert_eq!(banks.len(), 1);
    assert_eq!(banks[0].name, "input");
    assert_eq!(banks[0].addressing.size_byte, 512);
}

#[test]
fn test_bad_program_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(&dir, "config.json", CONFIG);
    let good = write(&dir, "good.json", PROGRAM);
    let bad = write(&dir, "bad.json", r#"[{"class": 2, "type": 3, "opcode": 0}, {"class": 7, "type": 9}]"#);

    let err = Simulator::from_files(&config, &[good, bad]).unwrap_err();
    assert!(matches!(err, SimError::InvalidInstruction { pc: 2, .. }));
}

#[test]
fn test_missing_program_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(&dir, "config.json", CONFIG);
    let missing = dir.path().join("absent.json");

    let err = Simulator::from_files(&config, &[missing.clone(), missing]).unwrap_err();
    assert!(matches!(err, SimError::Io { .. }));
}
