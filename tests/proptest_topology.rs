//! Property-based tests for the topology store and the mesh edits.
//!
//! These tests use proptest to generate jittered quad grids and verify
//! invariants after random edits.
//!
//! Run with: cargo test -- proptest

use nalgebra::Point2;
use proptest::prelude::*;
use quadpave::algo::restructure::{resta, restry};
use quadpave::geom::quad_angles;
use quadpave::algo::smooth::{smooth, SmoothOptions, SmoothingKind};
use quadpave::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

/// An `nx` by `ny` grid with interior nodes moved by up to `jitter`.
fn grid(nx: usize, ny: usize, offsets: &[(f64, f64)]) -> QuadMesh {
    let mut nodes = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            let interior = i > 0 && i < nx && j > 0 && j < ny;
            let (dx, dy) = if interior { offsets[j * (nx + 1) + i] } else { (0.0, 0.0) };
            nodes.push((Point2::new(i as f64 + dx, j as f64 + dy), NodeOrigin::Interior));
        }
    }
    let mut faces = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let a = j * (nx + 1) + i;
            faces.push([a, a + 1, a + nx + 2, a + nx + 1]);
        }
    }
    build_from_quads(&nodes, &faces, |_, _| Some(1), Capacity::estimate(4 * (nx + ny))).unwrap()
}

fn arb_grid() -> impl Strategy<Value = QuadMesh> {
    (1usize..=5, 1usize..=5).prop_flat_map(|(nx, ny)| {
        let offsets = prop::collection::vec((-0.25..0.25f64, -0.25..0.25f64), (nx + 1) * (ny + 1));
        offsets.prop_map(move |o| grid(nx, ny, &o))
    })
}

fn arb_kind() -> impl Strategy<Value = SmoothingKind> {
    (1u32..=7).prop_map(|d| SmoothingKind::from_digit(d).unwrap_or_default())
}

fn boundary_positions(mesh: &QuadMesh) -> Vec<(NodeId, Point2<f64>)> {
    mesh.node_ids()
        .filter(|&n| mesh.is_boundary_node(n))
        .map(|n| (n, mesh.position(n)))
        .collect()
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    /// Every built grid satisfies the line/element agreement checks.
    #[test]
    fn proptest_built_grid_is_consistent(mesh in arb_grid()) {
        prop_assert!(mesh.validate().is_ok());
        let loops = mesh.boundary_loops().unwrap();
        prop_assert_eq!(loops.len(), 1);
        prop_assert!(loops[0].signed_area > 0.0);
    }

    /// Smoothing never moves boundary nodes or changes the topology.
    #[test]
    fn proptest_smoothing_keeps_boundary(mut mesh in arb_grid(), kind in arb_kind()) {
        let before = boundary_positions(&mesh);
        let elements = mesh.num_elements();
        let _ = smooth(&mut mesh, &SmoothOptions::default().with_kind(kind).with_iterations(20));
        prop_assert!(mesh.validate().is_ok());
        prop_assert_eq!(mesh.num_elements(), elements);
        for (n, p) in before {
            prop_assert_eq!(mesh.position(n), p);
        }
    }

    /// A converged Laplacian run does not move any node by more than the
    /// tolerance on one more sweep.
    #[test]
    fn proptest_converged_smoothing_stays_put(mut mesh in arb_grid()) {
        let options = SmoothOptions::default()
            .with_kind(SmoothingKind::Laplacian)
            .with_tolerance(1e-4)
            .with_iterations(2000);
        let report = smooth(&mut mesh, &options);
        prop_assume!(report.converged);
        let again = smooth(&mut mesh, &options.clone().with_iterations(1));
        prop_assert!(again.max_displacement <= 1e-4);
    }

    /// Diagonal swaps keep the mesh consistent and the element count fixed.
    #[test]
    fn proptest_restructure_keeps_topology(mut mesh in arb_grid()) {
        let elements = mesh.num_elements();
        let nodes = mesh.num_nodes();
        let _ = resta(&mut mesh, usize::MAX).unwrap();
        prop_assert!(mesh.validate().is_ok());
        prop_assert_eq!(mesh.num_elements(), elements);
        prop_assert_eq!(mesh.num_nodes(), nodes);
        prop_assert_eq!(mesh.boundary_loops().unwrap().len(), 1);
    }

    /// An applied swap lowers the worse angle ratio of the pair, up to the
    /// 5% slack of the acceptance test.
    #[test]
    fn proptest_swap_improves_angle_ratio(mesh in arb_grid()) {
        let ratio = |m: &QuadMesh, k: ElementId| quad_angles(&m.element_positions(k)).ratio;
        for k in mesh.element_ids() {
            let mut m = mesh.clone();
            if !restry(&mut m, k).unwrap() {
                continue;
            }
            let changed: Vec<ElementId> = mesh
                .element_ids()
                .filter(|&e| mesh.element(e).lines() != m.element(e).lines() || mesh.element_nodes(e) != m.element_nodes(e))
                .collect();
            prop_assert_eq!(changed.len(), 2);
            let before = changed.iter().map(|&e| ratio(&mesh, e)).fold(0.0, f64::max);
            let after = changed.iter().map(|&e| ratio(&m, e)).fold(0.0, f64::max);
            prop_assert!(after <= 0.95 * before + 0.05 + 1e-9, "{} -> {}", before, after);
            prop_assert!(m.validate().is_ok());
        }
    }

    /// A deleted element slot is the next one handed out.
    #[test]
    fn proptest_element_slot_reuse(mut mesh in arb_grid(), pick in 0usize..25) {
        let ids: Vec<ElementId> = mesh.element_ids().collect();
        let k = ids[pick % ids.len()];
        let lines = mesh.element(k).lines();
        mesh.delete_element(k).unwrap();
        let again = mesh.add_element(lines).unwrap();
        prop_assert_eq!(again, k);
        prop_assert!(mesh.validate().is_ok());
    }

    /// Node slots are reused last-freed first.
    #[test]
    fn proptest_node_slot_reuse(mut mesh in arb_grid(), count in 1usize..4) {
        let slots = mesh.node_slots();
        let mut added = Vec::new();
        for i in 0..count {
            added.push(mesh.add_node(Point2::new(-1.0 - i as f64, -1.0), NodeOrigin::Interior).unwrap());
        }
        for &n in &added {
            mesh.delete_node(n).unwrap();
        }
        for &n in added.iter().rev() {
            let again = mesh.add_node(Point2::new(9.0, 9.0), NodeOrigin::Interior).unwrap();
            prop_assert_eq!(again, n);
        }
        prop_assert_eq!(mesh.node_slots(), slots + count);
    }
}
