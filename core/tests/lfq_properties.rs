//! End-to-end properties of the quantizer on the CPU device.

use candle_core::{DType, Device, Tensor, Var};
use lfq_core::entropy::{ChunkedBatchEstimator, EntropyEstimator, EntropyParams, VanillaEstimator};
use lfq_core::quantization::{code_to_index, index_to_code};
use lfq_core::synthetic::{normal_batch, uniform_batch};
use lfq_core::{
    full_codebook, hard_quantize, BitCodebook, Lfq, LfqConfig, LfqMode, LossSummary, SubbookPlan,
};

fn cpu() -> Device {
    Device::Cpu
}

#[test]
fn quantize_is_strict_sign() {
    let x = normal_batch(3, 7, 5, 1.0, 17, &cpu()).unwrap();
    let q = hard_quantize(&x).unwrap();

    let xs = x.flatten_all().unwrap().to_vec1::<f32>().unwrap();
    let qs = q.flatten_all().unwrap().to_vec1::<f32>().unwrap();
    for (xv, qv) in xs.iter().zip(qs.iter()) {
        assert!(*qv == 1.0 || *qv == -1.0);
        assert_eq!(*qv == 1.0, *xv > 0.0, "x={} q={}", xv, qv);
    }
}

#[test]
fn inference_returns_exact_zeros_for_every_mode() {
    for (bits, thresholds) in [(4, (8, 12)), (6, (4, 12)), (6, (2, 4))] {
        let config = LfqConfig::with_bits(bits)
            .thresholds(thresholds.0, thresholds.1)
            .chunk_size(4);
        let lfq = Lfq::new(config).unwrap();
        let x = uniform_batch(2, 8, bits as usize, 3, &cpu()).unwrap();

        let out = lfq.run(&x, true, false).unwrap();
        assert!(out.indices.is_none());
        assert_eq!(out.summary().unwrap(), LossSummary::default());
    }
}

#[test]
fn vanilla_and_chunked_agree_on_scenario() {
    // d=4, B=2, S=32, chunk 16, uniform [-1, 1]
    let bits = 4;
    let x = uniform_batch(2, 32, bits, 2024, &cpu()).unwrap();
    let book = full_codebook(bits as u32, &cpu()).unwrap();
    let params = EntropyParams::new(0.005, 1e-10);

    let vanilla = VanillaEstimator::new(&book, &BitCodebook, params)
        .estimate(&x)
        .unwrap()
        .values()
        .unwrap();
    let chunked = ChunkedBatchEstimator::new(&book, params, 16)
        .estimate(&x)
        .unwrap()
        .values()
        .unwrap();

    assert!((vanilla.entro_mean - chunked.entro_mean).abs() < 1e-3);
    assert!((vanilla.mean_entro - chunked.mean_entro).abs() < 1e-3);
}

#[test]
fn vanilla_and_chunked_quantizers_agree() {
    let x = uniform_batch(2, 32, 4, 7, &cpu()).unwrap();

    let vanilla = Lfq::new(LfqConfig::with_bits(4).temperature(0.1)).unwrap();
    let chunked = Lfq::new(LfqConfig::with_bits(4).temperature(0.1).thresholds(2, 8)).unwrap();

    let a = vanilla.run(&x, false, true).unwrap().summary().unwrap();
    let b = chunked.run(&x, false, true).unwrap().summary().unwrap();
    assert_eq!(vanilla.mode(), Some(LfqMode::Vanilla));
    assert_eq!(chunked.mode(), Some(LfqMode::ChunkedBatch));

    assert!((a.entro_mean - b.entro_mean).abs() < 1e-3);
    assert!((a.mean_entro - b.mean_entro).abs() < 1e-3);
    assert!((a.commit_loss - b.commit_loss).abs() < 1e-6);
}

#[test]
fn entropies_are_bounded() {
    let bits = 5u32;
    let ln_k = ((1u64 << bits) as f32).ln();
    for seed in 0..4 {
        let lfq = Lfq::new(LfqConfig::with_bits(bits).temperature(0.3)).unwrap();
        let x = uniform_batch(2, 16, bits as usize, seed, &cpu()).unwrap();
        let s = lfq.run(&x, false, true).unwrap().summary().unwrap();

        assert!(s.entro_mean >= 0.0);
        assert!(s.mean_entro >= 0.0);
        assert!(s.mean_entro <= ln_k + 1e-4, "mean_entro={} ln_k={}", s.mean_entro, ln_k);
    }
}

#[test]
fn decoded_indices_re_expand_to_codes() {
    let bits = 6u32;
    let lfq = Lfq::new(LfqConfig::with_bits(bits).thresholds(3, 10).chunk_size(8)).unwrap();
    let x = normal_batch(2, 16, bits as usize, 0.5, 5, &cpu()).unwrap();

    let out = lfq.run(&x, true, true).unwrap();
    assert_eq!(lfq.mode(), Some(LfqMode::ChunkedBatch));

    let codes = hard_quantize(&x).unwrap().to_vec3::<f32>().unwrap();
    let indices = out.indices.unwrap().to_vec2::<i64>().unwrap();
    for (b, row) in indices.iter().enumerate() {
        for (s, &index) in row.iter().enumerate() {
            assert_eq!(index_to_code(index as u64, bits), codes[b][s]);
            assert_eq!(code_to_index(&codes[b][s]) as i64, index);
        }
    }
}

#[test]
fn block_mode_mass_sums_to_one() {
    let config = LfqConfig::with_bits(8).thresholds(4, 6).chunk_size(4).temperature(0.2);
    let lfq = Lfq::new(config).unwrap();
    let x = uniform_batch(2, 8, 8, 13, &cpu()).unwrap();

    let estimate = lfq.estimate_entropy(&x).unwrap();
    assert_eq!(lfq.mode(), Some(LfqMode::Block));
    // one distribution per sample
    assert_eq!(estimate.row_masses().unwrap().len(), 2);
    assert!(estimate.verify_probability_mass(1e-3).is_ok());
}

#[test]
fn twenty_bit_plan_has_two_subbooks() {
    let plan = SubbookPlan::new(20);
    assert_eq!(plan.subbook_size(), 1 << 19);
    assert_eq!(plan.num_subbooks(), 2);
    let ranges: Vec<_> = plan.ranges().collect();
    assert_eq!(ranges[0], 0..(1 << 19));
    assert_eq!(ranges[1], (1 << 19)..(1 << 20));
}

#[test]
fn constant_input_commit_loss() {
    let lfq = Lfq::new(LfqConfig::with_bits(4)).unwrap();
    let x = Tensor::full(0.5f32, (2, 16, 4), &cpu()).unwrap();

    let out = lfq.run(&x, false, true).unwrap();
    let q = out.quantized.flatten_all().unwrap().to_vec1::<f32>().unwrap();
    assert!(q.iter().all(|&v| v == 1.0));
    assert!((out.summary().unwrap().commit_loss - 0.25).abs() < 1e-6);
}

#[test]
fn straight_through_passes_gradient_to_input() {
    let lfq = Lfq::new(LfqConfig::with_bits(4)).unwrap();
    let x = Var::from_tensor(&uniform_batch(1, 16, 4, 21, &cpu()).unwrap()).unwrap();

    let out = lfq.run(x.as_tensor(), false, true).unwrap();
    let grads = out.quantized.sum_all().unwrap().backward().unwrap();
    let grad = grads.get(x.as_tensor()).expect("input gradient");

    let ones = Tensor::ones((1, 16, 4), DType::F32, &cpu()).unwrap();
    assert_eq!(grad.to_vec3::<f32>().unwrap(), ones.to_vec3::<f32>().unwrap());
}

#[test]
fn commit_loss_gradient_pulls_toward_code() {
    let lfq = Lfq::new(LfqConfig::with_bits(2)).unwrap();
    let x = Var::from_tensor(
        &Tensor::from_vec(vec![0.5f32, -0.25, 2.0, -1.0], (1, 2, 2), &cpu()).unwrap(),
    )
    .unwrap();

    let out = lfq.run(x.as_tensor(), false, true).unwrap();
    let grads = out.commit_loss.backward().unwrap();
    let grad = grads.get(x.as_tensor()).expect("input gradient");

    // d/dx mean((x - q)^2) = 2 (x - q) / n
    let expected = [
        2.0 * (0.5 - 1.0) / 4.0,
        2.0 * (-0.25 + 1.0) / 4.0,
        2.0 * (2.0 - 1.0) / 4.0,
        0.0,
    ];
    let got = grad.flatten_all().unwrap().to_vec1::<f32>().unwrap();
    for (g, e) in got.iter().zip(expected.iter()) {
        assert!((g - e).abs() < 1e-6, "got={} expected={}", g, e);
    }
}

#[test]
fn mode_not_reselected_after_first_call() {
    let lfq = Lfq::new(LfqConfig::with_bits(4)).unwrap();
    let x = uniform_batch(1, 16, 4, 0, &cpu()).unwrap();

    lfq.run(&x, false, false).unwrap();
    let first = lfq.init_state(&cpu()).unwrap();
    lfq.run(&x, false, true).unwrap();
    let second = lfq.init_state(&cpu()).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
}
