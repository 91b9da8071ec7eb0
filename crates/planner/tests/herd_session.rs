//! A full herding session against the wire codec: the lab's M pattern on the
//! 4x8 bed, pulsed to completion, with the formed frame checked against the
//! line the firmware expects.

use std::time::{Duration, Instant};

use coilbed_grid::{GridState, Polarity};
use coilbed_planner::{HerdConfig, HerdFormationEngine, Phase, TargetMask};

const PULSE: Duration = Duration::from_secs(1);

// 0-based version of the lab's 11-cell M.
const M_CELLS: &[(usize, usize)] = &[
    (0, 2),
    (0, 4),
    (1, 2),
    (1, 3),
    (1, 4),
    (1, 5),
    (2, 1),
    (2, 3),
    (2, 5),
    (3, 1),
    (3, 6),
];

#[test]
fn session_converges_to_the_target_frame() {
    let mask = TargetMask::new(4, 8, M_CELLS.iter().copied()).unwrap();
    let config = HerdConfig {
        direction: Polarity::Positive,
        max_intensity: 10.0,
        pulse_interval: PULSE,
        overlap_hold: Some(Duration::from_secs(10)),
    };
    let mut engine = HerdFormationEngine::new(mask, config).unwrap();
    let mut grid = GridState::new(4, 8).unwrap();
    let t0 = Instant::now();

    engine.start(&mut grid, t0).unwrap();
    let dmax = engine.field().max_distance();
    let mut pulses: u32 = 1;
    while engine.phase() != Phase::Form {
        engine.advance(&mut grid, t0 + PULSE * pulses).unwrap();
        pulses += 1;
        assert!(pulses < 100, "engine never reached Form");
    }
    // One pulse per band, plus the final one that enters Form.
    assert_eq!(pulses - 1, dmax + 1);

    // A 4x8 grid is 64 values: an exact multiple of 16, so no padding.
    let frame = coilbed_protocol::encode(&grid);
    assert_eq!(frame.len(), 64);
    assert_eq!(frame.rows().len(), 4);

    let line = coilbed_protocol::serialize(&frame);
    let text = std::str::from_utf8(&line).unwrap();
    assert!(text.ends_with('\n'));
    let values: Vec<u16> = text
        .trim_end()
        .split(',')
        .map(|v| v.parse().unwrap())
        .collect();
    assert_eq!(values.len(), 64);

    // The positive channel of exactly the M cells carries full intensity.
    for row in 0..4 {
        for col in 0..8 {
            let pos = values[(row * 8 + col) * 2];
            let neg = values[(row * 8 + col) * 2 + 1];
            let expect = u16::from(M_CELLS.contains(&(row, col))) * 10;
            assert_eq!(pos, expect, "positive channel of ({row}, {col})");
            assert_eq!(neg, 0, "negative channel of ({row}, {col})");
        }
    }
}
