//! LOD chain generation: repeated halving of a mesh's index list.

use log::{debug, warn};

/// Limits of the LOD chain.
#[derive(Clone, Debug, PartialEq)]
pub struct LodOptions {
    /// Chain length including LOD 0.
    pub max_lods: usize,
    /// Halving continues only while the previous target stays above this many indices.
    pub min_index_count: usize,
    /// Error bound handed to the simplifier, relative to the mesh extent.
    pub target_error: f32,
    /// A pass stalls when `result * stall_ratio` still exceeds its input.
    pub stall_ratio: f32,
}

impl Default for LodOptions {
    fn default() -> Self {
        Self {
            max_lods: lume_mesh::MAX_LODS,
            min_index_count: 1024,
            target_error: 0.02,
            stall_ratio: 1.1,
        }
    }
}

/// The decimation primitives the chain builder relies on.
pub trait SimplifyPass {
    /// Topology-preserving simplification towards `target_count` indices.
    fn simplify(&self, indices: &[u32], positions: &[[f32; 3]], target_count: usize, target_error: f32)
        -> Vec<u32>;
    /// Approximate simplification that may break topology.
    fn simplify_sloppy(
        &self,
        indices: &[u32],
        positions: &[[f32; 3]],
        target_count: usize,
        target_error: f32,
    ) -> Vec<u32>;
    /// Reorders triangles for post-transform vertex cache locality.
    fn optimize_vertex_cache(&self, indices: &mut [u32], vertex_count: usize);
}

/// [`SimplifyPass`] backed by meshoptimizer.
#[derive(Clone, Copy, Debug, Default)]
pub struct Meshopt;

impl Meshopt {
    fn adapter(positions: &[[f32; 3]]) -> Option<meshopt::VertexDataAdapter<'_>> {
        match meshopt::VertexDataAdapter::new(
            bytemuck::cast_slice(positions),
            std::mem::size_of::<[f32; 3]>(),
            0,
        ) {
            Ok(adapter) => Some(adapter),
            Err(e) => {
                warn!("cannot read {} positions: {e:?}", positions.len());
                None
            }
        }
    }
}

impl SimplifyPass for Meshopt {
    fn simplify(&self, indices: &[u32], positions: &[[f32; 3]], target_count: usize, target_error: f32) -> Vec<u32> {
        match Self::adapter(positions) {
            Some(adapter) => meshopt::simplify(
                indices,
                &adapter,
                target_count,
                target_error,
                meshopt::SimplifyOptions::None,
                None,
            ),
            None => indices.to_vec(),
        }
    }

    fn simplify_sloppy(
        &self,
        indices: &[u32],
        positions: &[[f32; 3]],
        target_count: usize,
        target_error: f32,
    ) -> Vec<u32> {
        match Self::adapter(positions) {
            Some(adapter) => {
                meshopt::simplify_sloppy(indices, &adapter, target_count, target_error, None)
            }
            None => indices.to_vec(),
        }
    }

    fn optimize_vertex_cache(&self, indices: &mut [u32], vertex_count: usize) {
        meshopt::optimize_vertex_cache_in_place(indices, vertex_count);
    }
}

/// Builds the LOD chain of one mesh with meshoptimizer. See [`generate_lods_with`].
pub fn generate_lods(indices: &[u32], positions: &[[f32; 3]], options: &LodOptions) -> Vec<Vec<u32>> {
    generate_lods_with(&Meshopt, indices, positions, options)
}

/// Builds the LOD chain of one mesh. Entry 0 is `indices` unchanged; every further entry is
/// the previous one simplified to roughly half its size.
///
/// A first halving that stalls ends the chain at LOD 0. Later stalls retry with the sloppy
/// simplifier, and a sloppy pass that still does not shrink the list ends the chain. An empty
/// result from either simplifier also ends it.
pub fn generate_lods_with<P: SimplifyPass + ?Sized>(
    pass: &P,
    indices: &[u32],
    positions: &[[f32; 3]],
    options: &LodOptions,
) -> Vec<Vec<u32>> {
    let mut lods = vec![indices.to_vec()];
    debug!("LOD0: {} indices", indices.len());

    let mut target = indices.len();
    while target > options.min_index_count && lods.len() < options.max_lods {
        let current = &lods[lods.len() - 1];
        target = current.len() / 2;

        let mut next = pass.simplify(current, positions, target, options.target_error);
        if next.is_empty() {
            debug!("simplification removed every triangle");
            break;
        }
        let stalled = next.len() as f32 * options.stall_ratio > current.len() as f32;
        if stalled {
            if lods.len() == 1 {
                debug!("first halving stalled at {} indices", next.len());
                break;
            }
            next = pass.simplify_sloppy(current, positions, target, options.target_error);
            if next.is_empty() || next.len() >= current.len() {
                debug!("sloppy pass stalled at {} indices", next.len());
                break;
            }
        }

        pass.optimize_vertex_cache(&mut next, positions.len());
        debug!(
            "LOD{}: {} indices{}",
            lods.len(),
            next.len(),
            if stalled { " (sloppy)" } else { "" }
        );
        lods.push(next);
    }
    lods
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Counts calls; hands back prefixes of the input whose lengths come from a script.
    struct ScriptedPass {
        simplify: Vec<usize>,
        sloppy: Vec<usize>,
        simplify_calls: Cell<usize>,
        sloppy_calls: Cell<usize>,
        cache_calls: Cell<usize>,
    }

    impl ScriptedPass {
        fn new(simplify: &[usize], sloppy: &[usize]) -> Self {
            Self {
                simplify: simplify.to_vec(),
                sloppy: sloppy.to_vec(),
                simplify_calls: Cell::new(0),
                sloppy_calls: Cell::new(0),
                cache_calls: Cell::new(0),
            }
        }

        fn next(script: &[usize], calls: &Cell<usize>, indices: &[u32]) -> Vec<u32> {
            let call = calls.get();
            calls.set(call + 1);
            let len = script.get(call).copied().unwrap_or(indices.len());
            indices[..len.min(indices.len())].to_vec()
        }
    }

    impl SimplifyPass for ScriptedPass {
        fn simplify(&self, indices: &[u32], _: &[[f32; 3]], _: usize, _: f32) -> Vec<u32> {
            Self::next(&self.simplify, &self.simplify_calls, indices)
        }

        fn simplify_sloppy(&self, indices: &[u32], _: &[[f32; 3]], _: usize, _: f32) -> Vec<u32> {
            Self::next(&self.sloppy, &self.sloppy_calls, indices)
        }

        fn optimize_vertex_cache(&self, _: &mut [u32], _: usize) {
            self.cache_calls.set(self.cache_calls.get() + 1);
        }
    }

    fn lens(lods: &[Vec<u32>]) -> Vec<usize> {
        lods.iter().map(Vec::len).collect()
    }

    fn indices(n: usize) -> Vec<u32> {
        (0..n as u32).map(|i| i % 3).collect()
    }

    /// `n x n` quads on the XZ plane.
    fn grid(n: u32) -> (Vec<[f32; 3]>, Vec<u32>) {
        let mut positions = Vec::new();
        for z in 0..=n {
            for x in 0..=n {
                positions.push([x as f32, 0.0, z as f32]);
            }
        }
        let mut indices = Vec::new();
        for z in 0..n {
            for x in 0..n {
                let i = z * (n + 1) + x;
                indices.extend_from_slice(&[i, i + n + 1, i + 1, i + 1, i + n + 1, i + n + 2]);
            }
        }
        (positions, indices)
    }

    #[test]
    fn small_mesh_keeps_only_lod0() {
        let pass = ScriptedPass::new(&[], &[]);
        let lods = generate_lods_with(&pass, &indices(1024), &[], &LodOptions::default());
        assert_eq!(lens(&lods), [1024]);
        assert_eq!(pass.simplify_calls.get(), 0);
    }

    #[test]
    fn first_stall_stops_without_sloppy() {
        let pass = ScriptedPass::new(&[2900], &[]);
        let lods = generate_lods_with(&pass, &indices(3000), &[], &LodOptions::default());
        assert_eq!(lens(&lods), [3000]);
        assert_eq!(pass.sloppy_calls.get(), 0);
        assert_eq!(pass.cache_calls.get(), 0);
    }

    #[test]
    fn later_stall_falls_back_to_sloppy() {
        let pass = ScriptedPass::new(&[4800, 4500, 1200, 600], &[2400]);
        let lods = generate_lods_with(&pass, &indices(9600), &[], &LodOptions::default());
        // 4500 is within 10% of 4800, so that step is redone sloppily. A 600 target ends it.
        assert_eq!(lens(&lods), [9600, 4800, 2400, 1200, 600]);
        assert_eq!(pass.sloppy_calls.get(), 1);
        assert_eq!(pass.cache_calls.get(), 4);
    }

    #[test]
    fn sloppy_without_progress_ends_chain() {
        let pass = ScriptedPass::new(&[4800, 4700], &[4800]);
        let lods = generate_lods_with(&pass, &indices(9600), &[], &LodOptions::default());
        assert_eq!(lens(&lods), [9600, 4800]);

        let pass = ScriptedPass::new(&[4800, 4700], &[0]);
        let lods = generate_lods_with(&pass, &indices(9600), &[], &LodOptions::default());
        assert_eq!(lens(&lods), [9600, 4800]);
    }

    #[test]
    fn chain_is_capped() {
        let start = 1 << 20;
        let halves: Vec<usize> = (1..16).map(|k| start >> k).collect();
        let pass = ScriptedPass::new(&halves, &[]);
        let lods = generate_lods_with(&pass, &indices(start), &[], &LodOptions::default());
        assert_eq!(lods.len(), lume_mesh::MAX_LODS);
        assert!(lens(&lods).windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn meshopt_halves_a_flat_grid() {
        let (positions, indices) = grid(48);
        let lods = generate_lods(&indices, &positions, &LodOptions::default());
        assert!(lods.len() >= 2, "got {} lods", lods.len());
        assert!(lods.len() <= lume_mesh::MAX_LODS);
        assert_eq!(lods[0], indices);
        for pair in lods.windows(2) {
            assert!(pair[1].len() < pair[0].len());
        }
        for lod in &lods {
            assert_eq!(lod.len() % 3, 0);
            assert!(lod.iter().all(|&i| (i as usize) < positions.len()));
        }
    }
}
