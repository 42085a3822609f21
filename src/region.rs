//! Rectangular regions of interest drawn on a single plane.

use std::ops::Range;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{AbsorptionError, Result};

/// Kind tag of an annotation shape as reported by the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    Polygon,
    Path,
    Line,
}

/// One annotation: its kind and its vertices, one per row. Rows are either
/// `(row, col)` or `(plane, row, col)`.
#[derive(Debug, Clone)]
pub struct Shape {
    pub kind: ShapeKind,
    pub vertices: Array2<f64>,
}

impl Shape {
    pub fn rectangle(vertices: Array2<f64>) -> Self {
        Self {
            kind: ShapeKind::Rectangle,
            vertices,
        }
    }
}

/// Half-open pixel box within one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub row_min: usize,
    pub row_max: usize,
    pub col_min: usize,
    pub col_max: usize,
}

impl Region {
    pub fn new(rows: Range<usize>, cols: Range<usize>) -> Self {
        Self {
            row_min: rows.start,
            row_max: rows.end,
            col_min: cols.start,
            col_max: cols.end,
        }
    }

    /// Bounding box of all vertices, rounded outwards to whole pixels. Only
    /// the last two columns are used.
    pub fn bounding_box(vertices: &Array2<f64>) -> Result<Self> {
        let (n, ncols) = vertices.dim();
        if ncols < 2 {
            return Err(AbsorptionError::InvalidShape(format!(
                "vertices need at least 2 coordinate columns, got {ncols}"
            )));
        }
        if n == 0 {
            return Err(AbsorptionError::InvalidShape("shape has no vertices".into()));
        }

        let (row_min, row_max) = extent("row", vertices.column(ncols - 2))?;
        let (col_min, col_max) = extent("column", vertices.column(ncols - 1))?;
        Ok(Self {
            row_min,
            row_max,
            col_min,
            col_max,
        })
    }

    pub fn rows(&self) -> Range<usize> {
        self.row_min..self.row_max
    }

    pub fn cols(&self) -> Range<usize> {
        self.col_min..self.col_max
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty() || self.cols().is_empty()
    }
}

/// `(floor(min), ceil(max))` of one coordinate column.
fn extent(axis: &str, coords: ArrayView1<f64>) -> Result<(usize, usize)> {
    if coords.iter().any(|c| !c.is_finite()) {
        return Err(AbsorptionError::InvalidShape(format!(
            "non-finite {axis} coordinate"
        )));
    }
    let lo = coords.iter().copied().fold(f64::INFINITY, f64::min).floor();
    let hi = coords.iter().copied().fold(f64::NEG_INFINITY, f64::max).ceil();
    if lo < 0.0 {
        return Err(AbsorptionError::InvalidShape(format!(
            "{axis} coordinate {lo} lies outside the plane"
        )));
    }
    Ok((lo as usize, hi as usize))
}

/// One region per shape, whatever its kind.
pub fn regions(shapes: &[Shape]) -> Result<Vec<Region>> {
    shapes
        .iter()
        .map(|shape| Region::bounding_box(&shape.vertices))
        .collect()
}

/// The region of the only shape, which must be a rectangle.
pub fn single_rectangle(shapes: &[Shape]) -> Result<Region> {
    let [shape] = shapes else {
        return Err(AbsorptionError::InvalidShape(format!(
            "this operation can only be used with 1 rectangle, got {}",
            shapes.len()
        )));
    };
    if shape.kind != ShapeKind::Rectangle {
        return Err(AbsorptionError::InvalidShape(format!(
            "this operation can only be used with a rectangle, got {:?}",
            shape.kind
        )));
    }
    Region::bounding_box(&shape.vertices)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn bounding_box_rounds_outwards() {
        let vertices = array![[1.6, 2.2], [1.6, 9.5], [7.1, 9.5], [7.1, 2.2]];
        let region = Region::bounding_box(&vertices).unwrap();
        assert_eq!(region, Region::new(1..8, 2..10));
        assert!(!region.is_empty());
    }

    #[test]
    fn leading_plane_axis_is_dropped() {
        let vertices = array![[4.0, 10.0, 20.0], [4.0, 30.0, 20.0], [4.0, 30.0, 45.0]];
        let region = Region::bounding_box(&vertices).unwrap();
        assert_eq!(region, Region::new(10..30, 20..45));
    }

    #[test]
    fn polygon_uses_min_max_of_all_points() {
        let vertices = array![[5.0, 5.0], [2.0, 8.0], [9.0, 3.0], [6.0, 12.0], [4.0, 1.0]];
        let region = Region::bounding_box(&vertices).unwrap();
        assert_eq!(region, Region::new(2..9, 1..12));
    }

    #[test]
    fn bad_vertices() {
        let one_col = Array2::<f64>::zeros((4, 1));
        assert!(matches!(
            Region::bounding_box(&one_col),
            Err(AbsorptionError::InvalidShape(_))
        ));
        let none = Array2::<f64>::zeros((0, 2));
        assert!(matches!(
            Region::bounding_box(&none),
            Err(AbsorptionError::InvalidShape(_))
        ));
        let nan = array![[f64::NAN, 1.0], [2.0, 3.0]];
        assert!(matches!(
            Region::bounding_box(&nan),
            Err(AbsorptionError::InvalidShape(_))
        ));
        let negative = array![[-1.5, 1.0], [2.0, 3.0]];
        assert!(matches!(
            Region::bounding_box(&negative),
            Err(AbsorptionError::InvalidShape(_))
        ));
    }

    #[test]
    fn single_rectangle_requires_exactly_one_rectangle() {
        let rect = Shape::rectangle(array![[0.0, 0.0], [4.0, 6.0]]);
        assert_eq!(
            single_rectangle(std::slice::from_ref(&rect)).unwrap(),
            Region::new(0..4, 0..6)
        );

        assert!(matches!(
            single_rectangle(&[]),
            Err(AbsorptionError::InvalidShape(_))
        ));
        assert!(matches!(
            single_rectangle(&[rect.clone(), rect.clone()]),
            Err(AbsorptionError::InvalidShape(_))
        ));

        let ellipse = Shape {
            kind: ShapeKind::Ellipse,
            ..rect
        };
        assert!(matches!(
            single_rectangle(&[ellipse.clone()]),
            Err(AbsorptionError::InvalidShape(_))
        ));
        // any kind is accepted when several regions are analysed at once
        assert_eq!(regions(&[ellipse]).unwrap(), vec![Region::new(0..4, 0..6)]);
    }
}
