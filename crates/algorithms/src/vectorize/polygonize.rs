//! Polygonization of classified rasters.
//!
//! 1. Label connected components of equal class (4- or 8-connected).
//! 2. For each component, emit every pixel side that borders another
//!    component as a directed edge, oriented so the component pixel lies
//!    on the right (clockwise around the pixel, rows growing downward).
//! 3. Chain edges into rings. Where two diagonal pixels touch at a
//!    vertex the chain takes the right turn, which splits the boundary
//!    into rings that meet at a point instead of crossing.
//! 4. Rings with positive pixel-space area are exteriors, the others are
//!    holes; each hole goes to the smallest exterior around its pixels.

use crate::maybe_rayon::*;
use geo::{Coord, LineString, MultiPolygon, Polygon};
use lcmap_core::raster::{GeoTransform, Raster};
use lcmap_core::{AttributeValue, Feature, FeatureCollection, Result};
use std::collections::HashMap;
use tracing::debug;

const NONE: u32 = u32::MAX;

/// Parameters for polygonization
#[derive(Debug, Clone)]
pub struct VectorizeParams {
    /// Join diagonal neighbours (default true); false gives 4-connected regions
    pub eight_connected: bool,
}

impl Default for VectorizeParams {
    fn default() -> Self {
        Self {
            eight_connected: true,
        }
    }
}

/// Convert a classified raster into one polygon feature per connected region.
///
/// NaN / no-data pixels are not vectorized. Each feature has a
/// `MultiPolygon` geometry in the raster CRS and the properties `label`
/// (class) and `count` (pixels in the region).
pub fn raster_to_polygons(
    classified: &Raster<f64>,
    params: VectorizeParams,
) -> Result<FeatureCollection> {
    let (rows, cols) = classified.shape();
    let (components, regions) = label_components(classified, params.eight_connected);
    let transform = *classified.transform();

    let features: Vec<Feature> = regions
        .into_par_iter()
        .enumerate()
        .map(|(id, region)| {
            let rings = trace_rings(&components, rows, cols, id as u32, &region.pixels);
            let mut feature = Feature::new(assemble(rings, &transform));
            feature.id = Some(id.to_string());
            feature.set_property("label", AttributeValue::Int(region.label));
            feature.set_property("count", AttributeValue::Int(region.pixels.len() as i64));
            feature
        })
        .collect();

    debug!(features = features.len(), rows, cols, "vectorized classification");
    Ok(FeatureCollection { features })
}

/// Keep only the features of class `label`
pub fn filter_label(features: FeatureCollection, label: i64) -> FeatureCollection {
    features.filter_eq("label", label)
}

struct Region {
    label: i64,
    pixels: Vec<(usize, usize)>,
}

/// Component id per pixel (`NONE` for no-data) plus the pixels of each component
fn label_components(raster: &Raster<f64>, eight: bool) -> (Vec<u32>, Vec<Region>) {
    let (rows, cols) = raster.shape();
    let mut ids = vec![NONE; rows * cols];
    let mut regions = Vec::new();
    let mut stack = Vec::new();

    let value = |r: usize, c: usize| {
        let v = unsafe { raster.get_unchecked(r, c) };
        (!raster.is_nodata(v)).then(|| v.round() as i64)
    };

    let offsets: &[(isize, isize)] = if eight {
        &[(-1, -1), (-1, 0), (-1, 1), (0, -1), (0, 1), (1, -1), (1, 0), (1, 1)]
    } else {
        &[(-1, 0), (0, -1), (0, 1), (1, 0)]
    };

    for row in 0..rows {
        for col in 0..cols {
            if ids[row * cols + col] != NONE {
                continue;
            }
            let Some(label) = value(row, col) else {
                continue;
            };

            let id = regions.len() as u32;
            let mut pixels = Vec::new();
            ids[row * cols + col] = id;
            stack.push((row, col));
            while let Some((r, c)) = stack.pop() {
                pixels.push((r, c));
                for &(dr, dc) in offsets {
                    let (nr, nc) = (r as isize + dr, c as isize + dc);
                    if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    if ids[nr * cols + nc] == NONE && value(nr, nc) == Some(label) {
                        ids[nr * cols + nc] = id;
                        stack.push((nr, nc));
                    }
                }
            }
            regions.push(Region { label, pixels });
        }
    }

    (ids, regions)
}

/// Vertex in pixel-corner space: (col, row)
type Vertex = (i64, i64);

struct Edge {
    from: Vertex,
    to: Vertex,
}

/// A closed ring in pixel-corner space (first vertex not repeated)
struct Ring {
    vertices: Vec<Vertex>,
    /// Twice the signed area; positive for exteriors
    area2: i64,
    /// A pixel of the region on the ring's inner side
    pixel: (usize, usize),
}

fn trace_rings(
    ids: &[u32],
    rows: usize,
    cols: usize,
    id: u32,
    pixels: &[(usize, usize)],
) -> Vec<Ring> {
    let outside = |r: isize, c: isize| {
        r < 0 || c < 0 || r >= rows as isize || c >= cols as isize || ids[r as usize * cols + c as usize] != id
    };

    let mut edges = Vec::new();
    let mut sources = Vec::new();
    for &(r, c) in pixels {
        let (ri, ci) = (r as isize, c as isize);
        let (x, y) = (c as i64, r as i64);
        if outside(ri - 1, ci) {
            edges.push(Edge { from: (x, y), to: (x + 1, y) });
            sources.push((r, c));
        }
        if outside(ri, ci + 1) {
            edges.push(Edge { from: (x + 1, y), to: (x + 1, y + 1) });
            sources.push((r, c));
        }
        if outside(ri + 1, ci) {
            edges.push(Edge { from: (x + 1, y + 1), to: (x, y + 1) });
            sources.push((r, c));
        }
        if outside(ri, ci - 1) {
            edges.push(Edge { from: (x, y + 1), to: (x, y) });
            sources.push((r, c));
        }
    }

    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::with_capacity(edges.len());
    for (i, e) in edges.iter().enumerate() {
        outgoing.entry(e.from).or_default().push(i);
    }

    let direction = |e: &Edge| (e.to.0 - e.from.0, e.to.1 - e.from.1);
    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        let mut vertices = vec![edges[start].from];
        let mut current = start;
        loop {
            used[current] = true;
            let edge = &edges[current];
            let (dx, dy) = direction(edge);
            let right_turn = (-dy, dx);

            let candidates = outgoing.get(&edge.to).map(Vec::as_slice).unwrap_or(&[]);
            let next = match candidates {
                [only] => Some(*only),
                _ => candidates
                    .iter()
                    .copied()
                    .find(|&i| direction(&edges[i]) == right_turn)
                    .or_else(|| candidates.iter().copied().find(|&i| !used[i] || i == start)),
            };

            match next {
                Some(n) if n != start && !used[n] => {
                    vertices.push(edge.to);
                    current = n;
                }
                _ => break,
            }
        }

        let vertices = drop_collinear(vertices);
        let area2 = shoelace2(&vertices);
        rings.push(Ring {
            vertices,
            area2,
            pixel: sources[start],
        });
    }

    rings
}

/// Remove vertices in the middle of straight runs
fn drop_collinear(vertices: Vec<Vertex>) -> Vec<Vertex> {
    let n = vertices.len();
    if n < 4 {
        return vertices;
    }
    (0..n)
        .filter(|&i| {
            let prev = vertices[(i + n - 1) % n];
            let cur = vertices[i];
            let next = vertices[(i + 1) % n];
            let d1 = ((cur.0 - prev.0).signum(), (cur.1 - prev.1).signum());
            let d2 = ((next.0 - cur.0).signum(), (next.1 - cur.1).signum());
            d1 != d2
        })
        .map(|i| vertices[i])
        .collect()
}

fn shoelace2(vertices: &[Vertex]) -> i64 {
    let n = vertices.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = vertices[i];
            let (x1, y1) = vertices[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum()
}

/// Even-odd test of a pixel centre against a ring
fn contains_centre(ring: &[Vertex], (row, col): (usize, usize)) -> bool {
    let (px, py) = (col as f64 + 0.5, row as f64 + 0.5);
    let n = ring.len();
    let mut inside = false;
    for i in 0..n {
        let (x0, y0) = (ring[i].0 as f64, ring[i].1 as f64);
        let (x1, y1) = (ring[(i + 1) % n].0 as f64, ring[(i + 1) % n].1 as f64);
        if (y0 > py) != (y1 > py) && px < x0 + (py - y0) * (x1 - x0) / (y1 - y0) {
            inside = !inside;
        }
    }
    inside
}

fn assemble(rings: Vec<Ring>, transform: &GeoTransform) -> MultiPolygon<f64> {
    let (exteriors, holes): (Vec<Ring>, Vec<Ring>) = rings.into_iter().partition(|r| r.area2 > 0);

    let mut interiors: Vec<Vec<&Ring>> = vec![Vec::new(); exteriors.len()];
    for hole in &holes {
        let owner = exteriors
            .iter()
            .enumerate()
            .filter(|(_, e)| contains_centre(&e.vertices, hole.pixel))
            .min_by_key(|(_, e)| e.area2)
            .map(|(i, _)| i);
        if let Some(i) = owner {
            interiors[i].push(hole);
        }
    }

    let to_line = |ring: &Ring| {
        let mut coords: Vec<Coord<f64>> = ring
            .vertices
            .iter()
            .map(|&(c, r)| {
                let (x, y) = transform.pixel_to_geo_f(c as f64, r as f64);
                Coord { x, y }
            })
            .collect();
        if let Some(&first) = coords.first() {
            coords.push(first);
        }
        LineString(coords)
    };

    MultiPolygon(
        exteriors
            .iter()
            .zip(interiors)
            .map(|(e, holes)| Polygon::new(to_line(e), holes.into_iter().map(&to_line).collect()))
            .collect(),
    )
}
