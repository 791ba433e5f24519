use crate::data::Position;
use serde::{Deserialize, Serialize};

/// Resolution used to quantise orientation quaternion components in grid mode.
const ORIENTATION_RESOLUTION: f64 = 1e-3;

/// Rule deciding which raw captures were recorded "at the same place" and get merged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GroupBy {
    /// Bit-identical coordinates.
    Exact {
        #[serde(default)]
        include_orientation: bool,
    },
    /// Coordinates snapped to a grid of `cell` metres, absorbing capture jitter.
    Grid {
        cell: f64,
        #[serde(default)]
        include_orientation: bool,
    },
    #[serde(skip)]
    Custom(fn(&Position) -> String),
}

impl Default for GroupBy {
    fn default() -> Self {
        GroupBy::Exact {
            include_orientation: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Cells(Vec<i64>),
    Label(String),
}

impl GroupBy {
    pub fn key(&self, position: &Position) -> GroupKey {
        match *self {
            GroupBy::Exact {
                include_orientation,
            } => {
                let mut cells: Vec<i64> = position
                    .coordinates()
                    .iter()
                    .map(|&v| exact_bits(v))
                    .collect();
                if include_orientation {
                    push_orientation(&mut cells, position, exact_bits);
                }
                GroupKey::Cells(cells)
            }
            GroupBy::Grid {
                cell,
                include_orientation,
            } => {
                let mut cells: Vec<i64> = position
                    .coordinates()
                    .iter()
                    .map(|&v| snap(v, cell))
                    .collect();
                if include_orientation {
                    push_orientation(&mut cells, position, |v| snap(v, ORIENTATION_RESOLUTION));
                }
                GroupKey::Cells(cells)
            }
            GroupBy::Custom(label) => GroupKey::Label(label(position)),
        }
    }
}

fn exact_bits(value: f64) -> i64 {
    // -0.0 and 0.0 describe the same place
    let value = if value == 0.0 { 0.0 } else { value };
    value.to_bits() as i64
}

fn snap(value: f64, cell: f64) -> i64 {
    (value / cell).round() as i64
}

fn push_orientation(cells: &mut Vec<i64>, position: &Position, quantise: impl Fn(f64) -> i64) {
    match position.orientation {
        Some(orientation) => {
            cells.push(1);
            cells.extend(orientation.components().iter().map(|&v| quantise(v)));
        }
        None => cells.push(0),
    }
}
