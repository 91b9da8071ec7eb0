//! Wire format for the coil bed's serial link.
//!
//! The microcontroller accepts one ASCII line per update: the two channel
//! values of every cell, flattened cell-major and regrouped into rows of 16
//! integers, then comma-joined with no row delimiters and terminated by a
//! single newline. The receiver knows the grid geometry out of band, so the
//! line carries no framing beyond the newline.
//!
//! Encoding never fails for a well-formed [`GridState`]; bad dimensions are
//! rejected at grid construction, not here.

use coilbed_grid::GridState;
use serde::{Deserialize, Serialize};

/// Number of integers per frame row. With two channels per cell, an 8-column
/// grid packs each grid row into exactly one frame row.
pub const ROW_WIDTH: usize = 16;

/// The encoded transport unit: fixed-width rows of rounded channel values,
/// zero-padded at the tail. Produced fresh on every send.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFrame {
    rows: Vec<[u16; ROW_WIDTH]>,
}

impl WireFrame {
    pub fn rows(&self) -> &[[u16; ROW_WIDTH]] {
        &self.rows
    }

    /// All values in row-major order, padding included.
    pub fn values(&self) -> impl Iterator<Item = u16> + '_ {
        self.rows.iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len() * ROW_WIDTH
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Flattens (positive, negative) pairs in row-major cell order, rounds each
/// value to the nearest integer, and regroups into rows of [`ROW_WIDTH`].
/// Deterministic: equal grids yield identical frames.
pub fn encode(grid: &GridState) -> WireFrame {
    let flat: Vec<u16> = grid
        .cells()
        .flat_map(|(_, cell)| [cell.positive.round() as u16, cell.negative.round() as u16])
        .collect();

    let mut rows = Vec::with_capacity(flat.len().div_ceil(ROW_WIDTH));
    for chunk in flat.chunks(ROW_WIDTH) {
        let mut row = [0u16; ROW_WIDTH];
        row[..chunk.len()].copy_from_slice(chunk);
        rows.push(row);
    }
    WireFrame { rows }
}

/// The literal line written to the transport: every value comma-joined in
/// row-major order, one trailing newline.
pub fn serialize(frame: &WireFrame) -> Vec<u8> {
    let mut line = String::new();
    for (idx, value) in frame.values().enumerate() {
        if idx > 0 {
            line.push(',');
        }
        line.push_str(&value.to_string());
    }
    line.push('\n');
    line.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use coilbed_grid::Polarity;
    use proptest::prelude::*;

    // The flattening the firmware expects, written out longhand.
    fn reference_flat(grid: &GridState) -> Vec<u16> {
        let mut flat = Vec::new();
        for row in 0..grid.rows() {
            for col in 0..grid.cols() {
                let cell = grid.get(row, col).unwrap();
                flat.push(cell.positive.round() as u16);
                flat.push(cell.negative.round() as u16);
            }
        }
        flat
    }

    #[test]
    fn four_by_eight_packs_into_four_full_rows() {
        let mut grid = GridState::new(4, 8).unwrap();
        grid.set_cell(0, 0, Polarity::Positive, 10.0).unwrap();
        grid.set_cell(3, 7, Polarity::Negative, 10.0).unwrap();

        let frame = encode(&grid);
        assert_eq!(frame.rows().len(), 4);
        assert_eq!(frame.rows()[0][0], 10);
        // Last cell's negative channel is the final value of the last row.
        assert_eq!(frame.rows()[3][15], 10);
    }

    #[test]
    fn tail_row_is_zero_padded() {
        // 3x3 grid: 18 values, so two rows with 14 padding zeros.
        let mut grid = GridState::new(3, 3).unwrap();
        grid.set_cell(2, 2, Polarity::Positive, 5.0).unwrap();

        let frame = encode(&grid);
        assert_eq!(frame.rows().len(), 2);
        assert_eq!(frame.len(), 32);
        // Value 16 is cell (2,2)'s positive channel; everything after is pad.
        let values: Vec<u16> = frame.values().collect();
        assert_eq!(values[16], 5);
        assert!(values[17..].iter().all(|&v| v == 0));
    }

    #[test]
    fn line_is_comma_joined_and_newline_terminated() {
        let grid = GridState::new(1, 2).unwrap();
        let line = serialize(&encode(&grid));
        let text = std::str::from_utf8(&line).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(text.matches('\n').count(), 1);
        assert_eq!(text.trim_end().split(',').count(), 16);
        assert!(text.trim_end().split(',').all(|v| v == "0"));
    }

    #[test]
    fn rounding_is_to_nearest() {
        let mut grid = GridState::new(1, 1).unwrap();
        grid.set_cell(0, 0, Polarity::Positive, 4.6).unwrap();
        assert_eq!(encode(&grid).rows()[0][0], 5);
        grid.set_cell(0, 0, Polarity::Positive, 4.4).unwrap();
        assert_eq!(encode(&grid).rows()[0][0], 4);
    }

    fn arbitrary_grid() -> impl Strategy<Value = GridState> {
        proptest::collection::vec(
            (0usize..4, 0usize..8, prop::bool::ANY, 0.0f32..10.0),
            0..64,
        )
        .prop_map(|writes| {
            let mut grid = GridState::new(4, 8).unwrap();
            for (row, col, positive, intensity) in writes {
                let polarity = if positive {
                    Polarity::Positive
                } else {
                    Polarity::Negative
                };
                grid.set_cell(row, col, polarity, intensity).unwrap();
            }
            grid
        })
    }

    proptest! {
        #[test]
        fn encode_is_deterministic(grid in arbitrary_grid()) {
            let a = encode(&grid);
            let b = encode(&grid.clone());
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(serialize(&a), serialize(&b));
        }

        // The frame's values (minus padding) match an independent flattening.
        #[test]
        fn frame_matches_reference_flattening(grid in arbitrary_grid()) {
            let frame = encode(&grid);
            let flat = reference_flat(&grid);
            let values: Vec<u16> = frame.values().collect();
            prop_assert_eq!(&values[..flat.len()], &flat[..]);
            prop_assert!(values[flat.len()..].iter().all(|&v| v == 0));
        }

        // Parsing the serialized line recovers the frame values.
        #[test]
        fn line_round_trips(grid in arbitrary_grid()) {
            let frame = encode(&grid);
            let line = serialize(&frame);
            let text = std::str::from_utf8(&line).unwrap();
            let parsed: Vec<u16> = text
                .trim_end()
                .split(',')
                .map(|v| v.parse().unwrap())
                .collect();
            let values: Vec<u16> = frame.values().collect();
            prop_assert_eq!(parsed, values);
        }
    }
}
