//! Primitive (mapped) meshing.
//!
//! Each logical four-sided patch is filled by transfinite interpolation of
//! its boundary nodes. A rectangle is one patch; centre-split shapes get one
//! patch per corner, bounded by two half-sides and two spokes. Perimeter
//! point `i` always becomes mesh node `i`.

use nalgebra::Point2;
use tracing::debug;

use super::classify::{Classification, Shape};
use super::CheckedRegion;
use crate::error::{MeshError, Result};
use crate::mesh::{build_from_quads, Capacity, MeshIndex, NodeOrigin, QuadMesh};

/// Perimeter indices from `from`, `count` intervals forward (inclusive).
fn run(len: usize, from: usize, count: usize) -> Vec<usize> {
    (0..=count).map(|k| (from + k) % len).collect()
}

fn reversed(mut v: Vec<usize>) -> Vec<usize> {
    v.reverse();
    v
}

/// Normalised cumulative arc length along a chain of node indices.
fn arc_params(nodes: &[(Point2<f64>, NodeOrigin)], chain: &[usize]) -> Vec<f64> {
    let mut s = Vec::with_capacity(chain.len());
    let mut total = 0.0;
    s.push(0.0);
    for w in chain.windows(2) {
        total += (nodes[w[1]].0 - nodes[w[0]].0).norm();
        s.push(total);
    }
    if total > 0.0 {
        for v in &mut s {
            *v /= total;
        }
    } else {
        let last = (chain.len() - 1).max(1) as f64;
        for (i, v) in s.iter_mut().enumerate() {
            *v = i as f64 / last;
        }
    }
    s
}

/// Fill one logical patch by transfinite interpolation.
///
/// `bottom` and `top` run in the same direction, as do `left` and `right`;
/// the patch corners are `bottom[0] == left[0]`, `bottom[M] == right[0]`,
/// `top[0] == left[N]` and `top[M] == right[N]`.
fn tfi_patch(
    bottom: &[usize],
    right: &[usize],
    top: &[usize],
    left: &[usize],
    nodes: &mut Vec<(Point2<f64>, NodeOrigin)>,
    faces: &mut Vec<[usize; 4]>,
) -> Result<()> {
    let m = bottom.len() - 1;
    let n = left.len() - 1;
    if top.len() != m + 1 || right.len() != n + 1 || m == 0 || n == 0 {
        return Err(MeshError::classification(format!(
            "patch sides {}x{} do not match {}x{}",
            bottom.len() - 1,
            left.len() - 1,
            top.len().saturating_sub(1),
            right.len().saturating_sub(1)
        )));
    }

    let sb = arc_params(nodes, bottom);
    let st = arc_params(nodes, top);
    let sl = arc_params(nodes, left);
    let sr = arc_params(nodes, right);
    let p00 = nodes[bottom[0]].0.coords;
    let p10 = nodes[bottom[m]].0.coords;
    let p01 = nodes[top[0]].0.coords;
    let p11 = nodes[top[m]].0.coords;

    let mut grid = vec![0usize; (m + 1) * (n + 1)];
    let at = |i: usize, j: usize| j * (m + 1) + i;
    for i in 0..=m {
        grid[at(i, 0)] = bottom[i];
        grid[at(i, n)] = top[i];
    }
    for j in 0..=n {
        grid[at(0, j)] = left[j];
        grid[at(m, j)] = right[j];
    }
    for j in 1..n {
        for i in 1..m {
            let u = 0.5 * (sb[i] + st[i]);
            let v = 0.5 * (sl[j] + sr[j]);
            let b = nodes[bottom[i]].0.coords;
            let t = nodes[top[i]].0.coords;
            let l = nodes[left[j]].0.coords;
            let r = nodes[right[j]].0.coords;
            let p = b * (1.0 - v) + t * v + l * (1.0 - u) + r * u
                - (p00 * ((1.0 - u) * (1.0 - v)) + p10 * (u * (1.0 - v)) + p01 * ((1.0 - u) * v) + p11 * (u * v));
            grid[at(i, j)] = nodes.len();
            nodes.push((Point2::from(p), NodeOrigin::Interior));
        }
    }
    for j in 0..n {
        for i in 0..m {
            faces.push([grid[at(i, j)], grid[at(i + 1, j)], grid[at(i + 1, j + 1)], grid[at(i, j + 1)]]);
        }
    }
    Ok(())
}

/// Mesh a classified region into a fresh topology store.
pub fn mesh_primitive<I: MeshIndex>(
    region: &CheckedRegion,
    class: &Classification,
    capacity: Capacity,
) -> Result<QuadMesh<I>> {
    let perimeter = &region.perimeter;
    let len = perimeter.len();
    let mut nodes: Vec<(Point2<f64>, NodeOrigin)> = perimeter
        .points
        .iter()
        .map(|p| (p.position, p.origin))
        .collect();
    let mut faces = Vec::new();
    let c = &class.corners;
    let m = &class.sides;

    match class.shape {
        Shape::Rectangle => {
            let bottom = run(len, c[0], m[0]);
            let right = run(len, c[1], m[1]);
            let top = reversed(run(len, c[2], m[2]));
            let left = reversed(run(len, c[3], m[3]));
            tfi_patch(&bottom, &right, &top, &left, &mut nodes, &mut faces)?;
        }
        Shape::Triangle | Shape::Pentagon | Shape::Semicircle | Shape::Transition => {
            let center = class
                .center
                .ok_or_else(|| MeshError::classification("centre-split shape without a centre"))?;
            let sides = c.len();
            let center_node = nodes.len();
            nodes.push((center, NodeOrigin::Interior));

            let spokes: Vec<Vec<usize>> = (0..sides)
                .map(|i| {
                    let d = class.divisions[i];
                    let l = class.spokes[i];
                    let start = nodes[d].0;
                    let mut chain = vec![d];
                    for k in 1..l {
                        let p = start + (center - start) * (k as f64 / l as f64);
                        chain.push(nodes.len());
                        nodes.push((p, NodeOrigin::Interior));
                    }
                    chain.push(center_node);
                    chain
                })
                .collect();

            for i in 0..sides {
                let next = (i + 1) % sides;
                let bottom = run(len, class.divisions[i], class.split_after(i));
                let right = run(len, c[next], class.split_before(next));
                let top = reversed(spokes[next].clone());
                let left = spokes[i].clone();
                tfi_patch(&bottom, &right, &top, &left, &mut nodes, &mut faces)?;
            }
        }
    }

    debug!(
        "region {}: {:?} primitive with {} nodes, {} elements",
        region.id,
        class.shape,
        nodes.len(),
        faces.len()
    );

    let segments = &perimeter.segments;
    build_from_quads(
        &nodes,
        &faces,
        |a, b| {
            if a < len && b < len {
                if b == (a + 1) % len {
                    return segments[a].line;
                }
                if a == (b + 1) % len {
                    return segments[b].line;
                }
            }
            None
        },
        capacity,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::NodeId;
    use crate::region::{check_region, classify, Perimeter, Region};

    fn rectangle(w: f64, h: f64, mw: usize, mh: usize) -> CheckedRegion {
        let p = Perimeter::builder(1, Point2::new(0.0, 0.0))
            .line(1, 2, Point2::new(w, 0.0), mw)
            .line(2, 3, Point2::new(w, h), mh)
            .line(3, 4, Point2::new(0.0, h), mw)
            .close(4, mh);
        check_region(&Region::new(1, p)).unwrap()
    }

    #[test]
    fn test_rectangle_grid() {
        let region = rectangle(3.0, 3.0, 3, 3);
        let class = classify(&region, Shape::Rectangle).unwrap();
        let mesh: QuadMesh = mesh_primitive(&region, &class, Capacity::estimate(12)).unwrap();
        assert_eq!(mesh.num_elements(), 9);
        assert_eq!(mesh.num_nodes(), 16);
        assert!(mesh.is_valid());
        let interior: Vec<_> = mesh.node_ids().filter(|&n| !mesh.is_boundary_node(n)).collect();
        assert_eq!(interior.len(), 4);
        for k in mesh.element_ids() {
            assert!((mesh.element_area(k) - 1.0).abs() < 1e-9);
        }
        for i in 0..12 {
            let n = NodeId::new(i);
            assert_eq!(mesh.position(n), region.perimeter.points[i].position);
        }
    }

    #[test]
    fn test_triangle_patches() {
        let h = 3f64.sqrt() * 2.0;
        let p = Perimeter::builder(1, Point2::new(0.0, 0.0))
            .line(1, 2, Point2::new(4.0, 0.0), 4)
            .line(2, 3, Point2::new(2.0, h), 4)
            .close(3, 4);
        let region = check_region(&Region::new(1, p)).unwrap();
        let class = classify(&region, Shape::Triangle).unwrap();
        let mesh: QuadMesh = mesh_primitive(&region, &class, Capacity::estimate(12)).unwrap();
        // three 2x2 corner patches
        assert_eq!(mesh.num_elements(), 12);
        assert!(mesh.is_valid());
        for k in mesh.element_ids() {
            assert!(mesh.element_area(k) > 0.0);
        }
        let loops = mesh.boundary_loops().unwrap();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].lines.len(), 12);
        for &l in &loops[0].lines {
            assert!(mesh.line(l).origin.is_some());
        }
    }
}
