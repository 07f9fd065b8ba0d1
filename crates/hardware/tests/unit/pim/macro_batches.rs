use std::rc::Rc;

use pimsim_core::config::{PimUnitConfig, SimConfig};
use pimsim_core::core::payload::{ExecuteUnitType, InstructionPayload};
use pimsim_core::core::pim::Macro;
use pimsim_core::core::pim::payload::{MacroPayload, PimInsInfo};
use pimsim_core::sim::SimContext;
use pimsim_core::stats::EnergyReporter;
use pretty_assertions::assert_eq;

fn payload(input_bit_width: usize, inputs: Vec<u64>) -> MacroPayload {
    MacroPayload {
        pim_ins_info: PimInsInfo {
            ins: InstructionPayload {
                pc: 1,
                ins_id: 0,
                unit_type: ExecuteUnitType::PimCompute,
            },
            sub_ins_num: 1,
            last_sub_ins: true,
        },
        row: 0,
        input_bit_width,
        activation_element_col_num: 8,
        bit_sparse: false,
        inputs,
    }
}

/// Runs one payload through a lone macro and returns its energy report.
fn execute(payload: MacroPayload) -> EnergyReporter {
    let ctx = SimContext::new(&SimConfig::default());
    let macro_unit = Macro::new(&ctx, "macro", &Rc::new(PimUnitConfig::default()), true, None);
    let (m, kernel) = (Rc::clone(&macro_unit), ctx.kernel().clone());
    ctx.kernel().spawn("driver", async move {
        m.start_execute(payload).await;
        m.wait_until_finish_if_busy().await;
        kernel.wait_ns(100.0).await;
        kernel.stop();
    });
    let _ = ctx.kernel().run(None);
    macro_unit.energy_reporter(ctx.now_ns())
}

fn dynamic(reporter: &EnergyReporter, stage: &str) -> f64 {
    reporter.sub_modules[stage].dynamic_energy_pj
}

#[test]
fn test_all_zero_inputs_run_no_batch() {
    let zeros = payload(8, vec![0; 16]);
    assert_eq!(Macro::batch_and_compartment_count(&PimUnitConfig::default(), &zeros), (0, 0));

    let reporter = execute(zeros);
    assert_eq!(dynamic(&reporter, "adder tree"), 0.0);
    assert_eq!(dynamic(&reporter, "shift adder"), 0.0);
    assert_eq!(dynamic(&reporter, "result adder"), 0.0);
}

#[test]
fn test_batch_count_follows_input_width() {
    let config = PimUnitConfig::default();
    for width in [1, 4, 8, 16] {
        let dense = payload(width, vec![1; 16]);
        assert_eq!(Macro::batch_and_compartment_count(&config, &dense), (width, 16));
    }
    let one_lane = payload(8, vec![0, 0, 3, 0]);
    assert_eq!(Macro::batch_and_compartment_count(&config, &one_lane), (8, 1));
}

#[test]
fn test_non_zero_inputs_charge_adder_stages() {
    let reporter = execute(payload(4, vec![5; 16]));
    assert!(dynamic(&reporter, "adder tree") > 0.0);
    assert!(dynamic(&reporter, "shift adder") > 0.0);
    assert!(dynamic(&reporter, "result adder") > 0.0);
}

#[test]
fn test_result_adder_energy_scales_with_activation_width() {
    let full = execute(payload(4, vec![5; 16]));
    let half = execute(MacroPayload {
        activation_element_col_num: 4,
        ..payload(4, vec![5; 16])
    });
    let ratio = dynamic(&full, "result adder") / dynamic(&half, "result adder");
    assert!((ratio - 2.0).abs() < 1e-9);
}
